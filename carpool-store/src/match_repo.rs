use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use sqlx::PgPool;
use carpool_core::repository::MatchRepository;
use carpool_shared::{Decision, Match, MatchStatus, Side, TripStatus, UserId};

const MATCH_COLUMNS: &str = "id, driver_trip_id, passenger_trip_id, driver_id, passenger_id, score, \
    driver_status, passenger_status, status, created_at, updated_at";

pub struct StoreMatchRepository {
    pool: PgPool,
}

impl StoreMatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MatchRow {
    id: Uuid,
    driver_trip_id: Uuid,
    passenger_trip_id: Uuid,
    driver_id: Uuid,
    passenger_id: Uuid,
    score: f64,
    driver_status: String,
    passenger_status: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MatchRow> for Match {
    type Error = Box<dyn std::error::Error + Send + Sync>;

    fn try_from(row: MatchRow) -> Result<Self, Self::Error> {
        Ok(Match {
            id: row.id,
            driver_trip_id: row.driver_trip_id,
            passenger_trip_id: row.passenger_trip_id,
            driver_id: row.driver_id,
            passenger_id: row.passenger_id,
            score: row.score,
            driver_status: row.driver_status.parse()?,
            passenger_status: row.passenger_status.parse()?,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Trip statuses a successful match may still claim
fn live_statuses() -> Vec<String> {
    [TripStatus::Pending, TripStatus::Matched]
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

#[async_trait]
impl MatchRepository for StoreMatchRepository {
    async fn create_match(
        &self,
        m: &Match,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let result = sqlx::query(
            r#"
            INSERT INTO matches (id, driver_trip_id, passenger_trip_id, driver_id, passenger_id, score,
                driver_status, passenger_status, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (driver_trip_id, passenger_trip_id) DO NOTHING
            "#,
        )
        .bind(m.id)
        .bind(m.driver_trip_id)
        .bind(m.passenger_trip_id)
        .bind(m.driver_id)
        .bind(m.passenger_id)
        .bind(m.score)
        .bind(m.driver_status.as_str())
        .bind(m.passenger_status.as_str())
        .bind(m.status.as_str())
        .bind(m.created_at)
        .bind(m.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_match(
        &self,
        id: Uuid,
    ) -> Result<Option<Match>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query_as::<_, MatchRow>(&format!("SELECT {} FROM matches WHERE id = $1", MATCH_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Match::try_from).transpose()
    }

    async fn get_match_by_trips(
        &self,
        trip_a: Uuid,
        trip_b: Uuid,
    ) -> Result<Option<Match>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query_as::<_, MatchRow>(&format!(
            r#"
            SELECT {} FROM matches
            WHERE (driver_trip_id = $1 AND passenger_trip_id = $2)
               OR (driver_trip_id = $2 AND passenger_trip_id = $1)
            LIMIT 1
            "#,
            MATCH_COLUMNS
        ))
        .bind(trip_a)
        .bind(trip_b)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Match::try_from).transpose()
    }

    async fn list_user_matches(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Match>, Box<dyn std::error::Error + Send + Sync>> {
        let rows = sqlx::query_as::<_, MatchRow>(&format!(
            "SELECT {} FROM matches WHERE driver_id = $1 OR passenger_id = $1 ORDER BY created_at DESC",
            MATCH_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Match::try_from).collect()
    }

    async fn record_decision(
        &self,
        id: Uuid,
        side: Side,
        decision: Decision,
    ) -> Result<Option<Match>, Box<dyn std::error::Error + Send + Sync>> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent answers: the second writer waits here
        // and then sees the first one's decision.
        let row = sqlx::query_as::<_, MatchRow>(&format!(
            "SELECT {} FROM matches WHERE id = $1 FOR UPDATE",
            MATCH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut m = match row.map(Match::try_from).transpose()? {
            Some(m) if m.status == MatchStatus::Pending && m.decision(side) == Decision::Pending => m,
            _ => {
                tx.rollback().await?;
                return Ok(None);
            }
        };
        m.set_decision(side, decision);

        if m.resolved_status() == MatchStatus::Success {
            let live: Vec<Uuid> = sqlx::query_scalar(
                "SELECT id FROM trips WHERE id IN ($1, $2) AND status = ANY($3) FOR UPDATE",
            )
            .bind(m.driver_trip_id)
            .bind(m.passenger_trip_id)
            .bind(live_statuses())
            .fetch_all(&mut *tx)
            .await?;

            for (trip_side, trip_id) in [(Side::Driver, m.driver_trip_id), (Side::Passenger, m.passenger_trip_id)] {
                if !live.contains(&trip_id) {
                    m.set_decision(trip_side, Decision::Rejected);
                }
            }

            if live.len() == 2 {
                sqlx::query("UPDATE trips SET status = $1, updated_at = NOW() WHERE id IN ($2, $3)")
                    .bind(TripStatus::Matched.as_str())
                    .bind(m.driver_trip_id)
                    .bind(m.passenger_trip_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        m.status = m.resolved_status();

        sqlx::query(
            r#"
            UPDATE matches SET driver_status = $1, passenger_status = $2, status = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(m.driver_status.as_str())
        .bind(m.passenger_status.as_str())
        .bind(m.status.as_str())
        .bind(m.updated_at)
        .bind(m.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(m))
    }
}
