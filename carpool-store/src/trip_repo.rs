use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use sqlx::{PgPool, Postgres, QueryBuilder};
use carpool_core::repository::TripRepository;
use carpool_core::TripListQuery;
use carpool_shared::{Trip, TripFieldPatch, TripGrab, TripStatus, TripUpdate, UserId};

const TRIP_COLUMNS: &str = "id, user_id, role, departure_city, departure_province, departure_address, \
    departure_lat, departure_lng, destination_city, destination_province, destination_address, \
    destination_lat, destination_lng, departure_time, seats, price, remark, images, status, \
    view_count, created_at, updated_at";

pub struct StoreTripRepository {
    pool: PgPool,
}

impl StoreTripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    user_id: Uuid,
    role: String,
    departure_city: String,
    departure_province: String,
    departure_address: String,
    departure_lat: f64,
    departure_lng: f64,
    destination_city: String,
    destination_province: String,
    destination_address: String,
    destination_lat: f64,
    destination_lng: f64,
    departure_time: DateTime<Utc>,
    seats: i32,
    price: f64,
    remark: String,
    images: String,
    status: String,
    view_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TripRow> for Trip {
    type Error = Box<dyn std::error::Error + Send + Sync>;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        Ok(Trip {
            id: row.id,
            user_id: row.user_id,
            role: row.role.parse()?,
            departure_city: row.departure_city,
            departure_province: row.departure_province,
            departure_address: row.departure_address,
            departure_lat: row.departure_lat,
            departure_lng: row.departure_lng,
            destination_city: row.destination_city,
            destination_province: row.destination_province,
            destination_address: row.destination_address,
            destination_lat: row.destination_lat,
            destination_lng: row.destination_lng,
            departure_time: row.departure_time,
            seats: row.seats,
            price: row.price,
            remark: row.remark,
            images: row.images,
            status: row.status.parse()?,
            view_count: row.view_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GrabRow {
    id: Uuid,
    trip_id: Uuid,
    user_id: Uuid,
    message: String,
    created_at: DateTime<Utc>,
}

fn into_trips(rows: Vec<TripRow>) -> Result<Vec<Trip>, Box<dyn std::error::Error + Send + Sync>> {
    rows.into_iter().map(Trip::try_from).collect()
}

/// Shared WHERE clause of the list and count queries
fn push_list_filter(qb: &mut QueryBuilder<'_, Postgres>, query: &TripListQuery) {
    qb.push(" WHERE status = ").push_bind(TripStatus::Pending.as_str());

    if let Some(role) = query.role {
        qb.push(" AND role = ").push_bind(role.as_str());
    }
    if let Some(city) = &query.departure_city {
        qb.push(" AND departure_city LIKE ").push_bind(format!("%{}%", city));
    }
    if let Some(city) = &query.destination_city {
        qb.push(" AND destination_city LIKE ").push_bind(format!("%{}%", city));
    }
    if let Some((start, end)) = query.departure_window() {
        qb.push(" AND departure_time >= ").push_bind(start);
        qb.push(" AND departure_time < ").push_bind(end);
    }
    if let Some(user_id) = query.exclude_user_id {
        qb.push(" AND user_id <> ").push_bind(user_id);
    }

    if query.user_city.is_some() || query.user_province.is_some() {
        qb.push(" AND (");
        let mut relevance = qb.separated(" OR ");
        if let Some(city) = &query.user_city {
            relevance.push("departure_city = ").push_bind_unseparated(city.clone());
            relevance.push("destination_city = ").push_bind_unseparated(city.clone());
        }
        if let Some(province) = &query.user_province {
            relevance.push("departure_province = ").push_bind_unseparated(province.clone());
            relevance.push("destination_province = ").push_bind_unseparated(province.clone());
        }
        qb.push(")");
    }
}

#[async_trait]
impl TripRepository for StoreTripRepository {
    async fn create_trip(
        &self,
        trip: &Trip,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO trips (id, user_id, role, departure_city, departure_province, departure_address,
                departure_lat, departure_lng, destination_city, destination_province, destination_address,
                destination_lat, destination_lng, departure_time, seats, price, remark, images, status,
                view_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(trip.id)
        .bind(trip.user_id)
        .bind(trip.role.as_str())
        .bind(&trip.departure_city)
        .bind(&trip.departure_province)
        .bind(&trip.departure_address)
        .bind(trip.departure_lat)
        .bind(trip.departure_lng)
        .bind(&trip.destination_city)
        .bind(&trip.destination_province)
        .bind(&trip.destination_address)
        .bind(trip.destination_lat)
        .bind(trip.destination_lng)
        .bind(trip.departure_time)
        .bind(trip.seats)
        .bind(trip.price)
        .bind(&trip.remark)
        .bind(&trip.images)
        .bind(trip.status.as_str())
        .bind(trip.view_count)
        .bind(trip.created_at)
        .bind(trip.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_trip(
        &self,
        id: Uuid,
    ) -> Result<Option<Trip>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query_as::<_, TripRow>(&format!("SELECT {} FROM trips WHERE id = $1", TRIP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Trip::try_from).transpose()
    }

    async fn list_trips(
        &self,
        query: &TripListQuery,
    ) -> Result<(Vec<Trip>, i64), Box<dyn std::error::Error + Send + Sync>> {
        // 1. Count
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM trips");
        push_list_filter(&mut count_qb, query);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        // 2. Page, trips touching the caller's own city first
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM trips", TRIP_COLUMNS));
        push_list_filter(&mut qb, query);
        qb.push(" ORDER BY ");
        if let Some(city) = &query.user_city {
            qb.push("CASE WHEN departure_city = ")
                .push_bind(city.clone())
                .push(" OR destination_city = ")
                .push_bind(city.clone())
                .push(" THEN 0 ELSE 1 END, ");
        }
        qb.push("departure_time ASC");
        qb.push(" LIMIT ").push_bind(query.page_size);
        qb.push(" OFFSET ").push_bind(query.offset());

        let rows: Vec<TripRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok((into_trips(rows)?, total))
    }

    async fn list_user_trips(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Trip>, Box<dyn std::error::Error + Send + Sync>> {
        let rows = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {} FROM trips WHERE user_id = $1 ORDER BY created_at DESC",
            TRIP_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        into_trips(rows)
    }

    async fn update_trip_status(
        &self,
        id: Uuid,
        from: &[TripStatus],
        to: TripStatus,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let result = sqlx::query(
            "UPDATE trips SET status = $1, updated_at = NOW() WHERE id = $2 AND status = ANY($3)",
        )
        .bind(to.as_str())
        .bind(id)
        .bind(from)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_opposite_candidates(
        &self,
        trip: &Trip,
        window: chrono::Duration,
        limit: i64,
    ) -> Result<Vec<Trip>, Box<dyn std::error::Error + Send + Sync>> {
        let rows = sqlx::query_as::<_, TripRow>(&format!(
            r#"
            SELECT {} FROM trips
            WHERE role = $1
              AND status = $2
              AND departure_city = $3
              AND destination_city = $4
              AND departure_time BETWEEN $5 AND $6
              AND user_id <> $7
            ORDER BY ABS(EXTRACT(EPOCH FROM (departure_time - $8))) ASC
            LIMIT $9
            "#,
            TRIP_COLUMNS
        ))
        .bind(trip.role.opposite().as_str())
        .bind(TripStatus::Pending.as_str())
        .bind(&trip.departure_city)
        .bind(&trip.destination_city)
        .bind(trip.departure_time - window)
        .bind(trip.departure_time + window)
        .bind(trip.user_id)
        .bind(trip.departure_time)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        into_trips(rows)
    }

    async fn count_active_trips(
        &self,
        user_id: UserId,
    ) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM trips WHERE user_id = $1 AND status IN ($2, $3)",
        )
        .bind(user_id)
        .bind(TripStatus::Pending.as_str())
        .bind(TripStatus::Matched.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn count_trips_created_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM trips WHERE user_id = $1 AND created_at >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn increment_view_count(
        &self,
        id: Uuid,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query("UPDATE trips SET view_count = view_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_trip(
        &self,
        id: Uuid,
        user_id: UserId,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let result = sqlx::query("DELETE FROM trips WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn patch_trip(
        &self,
        id: Uuid,
        patch: &TripFieldPatch,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            UPDATE trips SET
                images = COALESCE($1, images),
                remark = COALESCE($2, remark),
                seats = COALESCE($3, seats),
                price = COALESCE($4, price),
                updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(patch.images.as_deref())
        .bind(patch.remark.as_deref())
        .bind(patch.seats)
        .bind(patch.price)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_grab(
        &self,
        grab: &TripGrab,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let result = sqlx::query(
            r#"
            INSERT INTO trip_grabs (id, trip_id, user_id, message, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (trip_id, user_id) DO NOTHING
            "#,
        )
        .bind(grab.id)
        .bind(grab.trip_id)
        .bind(grab.user_id)
        .bind(&grab.message)
        .bind(grab.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_grabs(
        &self,
        trip_id: Uuid,
    ) -> Result<Vec<TripGrab>, Box<dyn std::error::Error + Send + Sync>> {
        let rows = sqlx::query_as::<_, GrabRow>(
            "SELECT id, trip_id, user_id, message, created_at FROM trip_grabs WHERE trip_id = $1 ORDER BY created_at ASC",
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| TripGrab {
                id: row.id,
                trip_id: row.trip_id,
                user_id: row.user_id,
                message: row.message,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn create_update_request(
        &self,
        update: &TripUpdate,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO trip_updates (id, trip_id, user_id, kind, old_value, new_value, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(update.id)
        .bind(update.trip_id)
        .bind(update.user_id)
        .bind(update.kind.as_str())
        .bind(&update.old_value)
        .bind(&update.new_value)
        .bind(update.status.as_str())
        .bind(update.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
