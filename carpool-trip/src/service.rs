use std::sync::Arc;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;
use carpool_core::{
    CoreError, CoreResult, MatchTrigger, TripListQuery, TripRepository, UserDirectory,
};
use carpool_hub::Notifier;
use carpool_shared::models::events::{TripGrabbedEvent, TRIP_GRABBED};
use carpool_shared::pii::mask_nickname;
use carpool_shared::{
    Notification, Trip, TripDraft, TripFieldPatch, TripGrab, TripPage, TripPatch, TripRole,
    TripStatus, TripUpdate, TripUpdateKind, UserId,
};

use crate::cache_aside::TripCacheAside;

pub const DEPARTURE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";
pub const MAX_SEATS: i32 = 7;
pub const MAX_REMARK_CHARS: usize = 500;

/// Every status a moderator may ban from
const BANNABLE: [TripStatus; 4] =
    [TripStatus::Pending, TripStatus::Matched, TripStatus::Completed, TripStatus::Cancelled];

#[derive(Debug, Clone)]
pub struct TripRules {
    pub max_active_trips: i64,
    pub max_daily_trips: i64,
    pub default_page_size: i64,
}

impl Default for TripRules {
    fn default() -> Self {
        Self {
            max_active_trips: 2,
            max_daily_trips: 5,
            default_page_size: 20,
        }
    }
}

/// A trip as seen by its owner, with everyone who asked to join it
#[derive(Debug, Clone, Serialize)]
pub struct TripDetail {
    #[serde(flatten)]
    pub trip: Trip,
    pub grabbers: Vec<GrabberView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrabberView {
    pub user_id: UserId,
    pub open_id: String,
    pub nickname: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub review_pending: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrabOutcome {
    pub success: bool,
    pub message: String,
}

#[derive(Clone)]
pub struct TripService {
    trips: TripCacheAside,
    users: Arc<dyn UserDirectory>,
    notifier: Notifier,
    matcher: Arc<dyn MatchTrigger>,
    rules: TripRules,
}

/// Parse a client `YYYY-MM-DD HH:MM` departure time in the server's zone
pub fn parse_departure_time(raw: &str) -> CoreResult<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), DEPARTURE_TIME_FORMAT)
        .map_err(|_| CoreError::ValidationFailed(format!("invalid departure time: {}", raw)))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| CoreError::ValidationFailed(format!("nonexistent local time: {}", raw)))
}

fn parse_future_departure(raw: &str) -> CoreResult<DateTime<Utc>> {
    let departure = parse_departure_time(raw)?;
    if departure < Utc::now() {
        return Err(CoreError::ValidationFailed("departure time is in the past".to_string()));
    }
    Ok(departure)
}

fn start_of_local_day() -> DateTime<Utc> {
    Local::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| Utc::now() - chrono::Duration::hours(24))
}

fn validate_fields(seats: Option<i32>, price: Option<f64>, remark: Option<&str>) -> CoreResult<()> {
    if let Some(seats) = seats {
        if !(1..=MAX_SEATS).contains(&seats) {
            return Err(CoreError::ValidationFailed(format!("seats must be between 1 and {}", MAX_SEATS)));
        }
    }
    if let Some(price) = price {
        if !price.is_finite() || price < 0.0 {
            return Err(CoreError::ValidationFailed("price must not be negative".to_string()));
        }
    }
    if let Some(remark) = remark {
        if remark.chars().count() > MAX_REMARK_CHARS {
            return Err(CoreError::ValidationFailed(format!("remark exceeds {} characters", MAX_REMARK_CHARS)));
        }
    }
    Ok(())
}

fn validate_draft(draft: &TripDraft) -> CoreResult<()> {
    for (field, value) in [
        ("departure_city", &draft.departure_city),
        ("departure_address", &draft.departure_address),
        ("destination_city", &draft.destination_city),
        ("destination_address", &draft.destination_address),
    ] {
        if value.trim().is_empty() {
            return Err(CoreError::ValidationFailed(format!("{} is required", field)));
        }
    }
    validate_fields(Some(draft.seats), Some(draft.price), Some(&draft.remark))
}

fn owned(trip: Option<Trip>, trip_id: Uuid, user_id: UserId) -> CoreResult<Trip> {
    let trip = trip.ok_or_else(|| CoreError::NotFound(format!("trip {}", trip_id)))?;
    if !trip.is_owned_by(user_id) {
        return Err(CoreError::Forbidden("not the owner of this trip".to_string()));
    }
    Ok(trip)
}

impl TripService {
    pub fn new(
        trips: TripCacheAside,
        users: Arc<dyn UserDirectory>,
        notifier: Notifier,
        matcher: Arc<dyn MatchTrigger>,
        rules: TripRules,
    ) -> Self {
        Self { trips, users, notifier, matcher, rules }
    }

    fn store(&self) -> &Arc<dyn TripRepository> {
        self.trips.store()
    }

    /// Ownership and status checks always read the store of record
    async fn load_owned(&self, trip_id: Uuid, user_id: UserId) -> CoreResult<Trip> {
        let trip = self.store().get_trip(trip_id).await?;
        owned(trip, trip_id, user_id)
    }

    // ========================================================================
    // Creation
    // ========================================================================

    pub async fn create(&self, user_id: UserId, draft: TripDraft) -> CoreResult<Trip> {
        // 1. Input
        validate_draft(&draft)?;
        let departure = parse_future_departure(&draft.departure_time)?;

        // 2. Per-user limits
        let active = self.store().count_active_trips(user_id).await?;
        if active >= self.rules.max_active_trips {
            warn!(user_id = %user_id, active, "Active trip limit reached");
            return Err(CoreError::InvalidState(format!(
                "at most {} active trips allowed, cancel or complete one first",
                self.rules.max_active_trips
            )));
        }
        let today = self.store().count_trips_created_since(user_id, start_of_local_day()).await?;
        if today >= self.rules.max_daily_trips {
            warn!(user_id = %user_id, today, "Daily trip limit reached");
            return Err(CoreError::InvalidState(format!(
                "daily limit of {} trips reached, try again tomorrow",
                self.rules.max_daily_trips
            )));
        }

        // 3. Persist; a new pending trip changes list membership
        let trip = Trip::new(user_id, draft, departure);
        self.trips
            .mutate(None, async { self.store().create_trip(&trip).await.map_err(CoreError::from) })
            .await?;

        info!(
            trip_id = %trip.id,
            user_id = %user_id,
            role = %trip.role,
            from = %trip.departure_city,
            to = %trip.destination_city,
            "Trip created"
        );

        // 4. Background matching
        self.matcher.submit(trip.clone());
        Ok(trip)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn get(&self, trip_id: Uuid) -> CoreResult<Trip> {
        self.trips
            .get(trip_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("trip {}", trip_id)))
    }

    /// Read for display. Views by anyone but the owner are counted in the background.
    pub async fn get_and_count_view(&self, trip_id: Uuid, viewer: Option<UserId>) -> CoreResult<Trip> {
        let trip = self.get(trip_id).await?;
        if viewer != Some(trip.user_id) {
            let store = self.store().clone();
            tokio::spawn(async move {
                if let Err(e) = store.increment_view_count(trip_id).await {
                    warn!(trip_id = %trip_id, "Failed to count trip view: {}", e);
                }
            });
        }
        Ok(trip)
    }

    pub async fn get_owned_detail(&self, trip_id: Uuid, user_id: UserId) -> CoreResult<TripDetail> {
        let trip = owned(self.trips.get(trip_id).await?, trip_id, user_id)?;
        let grabs = self.store().list_grabs(trip_id).await?;

        let mut grabbers = Vec::with_capacity(grabs.len());
        for grab in grabs {
            let profile = self.users.profile(grab.user_id).await?;
            let (open_id, nickname) = profile
                .map(|p| (p.open_id, p.nickname))
                .unwrap_or_default();
            grabbers.push(GrabberView {
                user_id: grab.user_id,
                open_id,
                nickname,
                message: grab.message,
                created_at: grab.created_at,
            });
        }
        Ok(TripDetail { trip, grabbers })
    }

    pub async fn list(&self, query: TripListQuery) -> CoreResult<TripPage> {
        let mut query = query.normalized(self.rules.default_page_size);
        if let Some(open_id) = &query.exclude_user {
            query.exclude_user_id = self.users.resolve_open_id(open_id).await?;
        }
        self.trips.list(&query).await
    }

    pub async fn my_trips(&self, user_id: UserId) -> CoreResult<Vec<Trip>> {
        Ok(self.store().list_user_trips(user_id).await?)
    }

    // ========================================================================
    // Owner mutations
    // ========================================================================

    pub async fn cancel(&self, trip_id: Uuid, user_id: UserId) -> CoreResult<()> {
        let trip = self.load_owned(trip_id, user_id).await?;
        if trip.status != TripStatus::Pending {
            return Err(CoreError::InvalidState("only pending trips can be cancelled".to_string()));
        }
        self.set_status(trip_id, &[TripStatus::Pending], TripStatus::Cancelled).await?;
        info!(trip_id = %trip_id, user_id = %user_id, "Trip cancelled");
        Ok(())
    }

    pub async fn complete(&self, trip_id: Uuid, user_id: UserId) -> CoreResult<()> {
        let trip = self.load_owned(trip_id, user_id).await?;
        if !trip.status.is_editable() {
            return Err(CoreError::InvalidState(
                "only pending or matched trips can be completed".to_string(),
            ));
        }
        self.set_status(trip_id, &[TripStatus::Pending, TripStatus::Matched], TripStatus::Completed)
            .await?;
        info!(trip_id = %trip_id, user_id = %user_id, "Trip completed");
        Ok(())
    }

    pub async fn delete(&self, trip_id: Uuid, user_id: UserId) -> CoreResult<()> {
        self.load_owned(trip_id, user_id).await?;
        let deleted = self
            .trips
            .mutate(Some(trip_id), async { self.store().delete_trip(trip_id, user_id).await.map_err(CoreError::from) })
            .await?;
        if !deleted {
            return Err(CoreError::NotFound(format!("trip {}", trip_id)));
        }
        info!(trip_id = %trip_id, user_id = %user_id, "Trip deleted");
        Ok(())
    }

    /// Seats, price, remark and images apply at once. Route and time
    /// changes are filed for review and leave the trip untouched.
    pub async fn update_trip(&self, trip_id: Uuid, user_id: UserId, patch: TripPatch) -> CoreResult<UpdateOutcome> {
        let trip = self.load_owned(trip_id, user_id).await?;
        if !trip.status.is_editable() {
            return Err(CoreError::InvalidState(
                "only pending or matched trips can be edited".to_string(),
            ));
        }
        validate_fields(patch.seats, patch.price, patch.remark.as_deref())?;

        let mut reviews = Vec::new();

        // 1. Route changes
        let changed = |new: &Option<String>, current: &str| {
            new.as_deref().is_some_and(|v| !v.is_empty() && v != current)
        };
        if changed(&patch.departure_city, &trip.departure_city)
            || changed(&patch.departure_address, &trip.departure_address)
            || changed(&patch.destination_city, &trip.destination_city)
            || changed(&patch.destination_address, &trip.destination_address)
        {
            let pick = |new: &Option<String>, current: &str| {
                new.as_deref().filter(|v| !v.is_empty()).unwrap_or(current).to_string()
            };
            reviews.push(TripUpdate::new(
                trip_id,
                user_id,
                TripUpdateKind::Location,
                json!({
                    "departure_city": trip.departure_city,
                    "departure_address": trip.departure_address,
                    "destination_city": trip.destination_city,
                    "destination_address": trip.destination_address,
                }),
                json!({
                    "departure_city": pick(&patch.departure_city, &trip.departure_city),
                    "departure_address": pick(&patch.departure_address, &trip.departure_address),
                    "destination_city": pick(&patch.destination_city, &trip.destination_city),
                    "destination_address": pick(&patch.destination_address, &trip.destination_address),
                }),
            ));
        }

        // 2. Time change
        if let Some(raw) = patch.departure_time.as_deref().filter(|t| !t.trim().is_empty()) {
            let departure = parse_future_departure(raw)?;
            if departure != trip.departure_time {
                let old = trip
                    .departure_time
                    .with_timezone(&Local)
                    .format(DEPARTURE_TIME_FORMAT)
                    .to_string();
                reviews.push(TripUpdate::new(
                    trip_id,
                    user_id,
                    TripUpdateKind::Time,
                    json!({ "departure_time": old }),
                    json!({ "departure_time": raw.trim() }),
                ));
            }
        }

        let mut message = String::new();
        for review in &reviews {
            self.store().create_update_request(review).await?;
            message.push_str(match review.kind {
                TripUpdateKind::Location => "Route change submitted for review. ",
                TripUpdateKind::Time => "Departure time change submitted for review. ",
            });
        }

        // 3. Direct fields; blank strings keep the current value
        let fields = TripFieldPatch {
            images: patch.images.filter(|v| !v.is_empty()),
            remark: patch.remark.filter(|v| !v.is_empty()),
            seats: patch.seats,
            price: patch.price,
        };
        if fields != TripFieldPatch::default() {
            self.trips
                .mutate(Some(trip_id), async { self.store().patch_trip(trip_id, &fields).await.map_err(CoreError::from) })
                .await?;
        }

        info!(trip_id = %trip_id, user_id = %user_id, reviews = reviews.len(), "Trip updated");

        if reviews.is_empty() {
            Ok(UpdateOutcome { review_pending: false, message: "Trip updated".to_string() })
        } else {
            Ok(UpdateOutcome { review_pending: true, message: message.trim_end().to_string() })
        }
    }

    // ========================================================================
    // Grabs
    // ========================================================================

    /// Ask to join someone else's pending trip and tell its owner
    pub async fn grab(&self, trip_id: Uuid, grabber_id: UserId, message: String) -> CoreResult<GrabOutcome> {
        let trip = self
            .store()
            .get_trip(trip_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("trip {}", trip_id)))?;
        if trip.is_owned_by(grabber_id) {
            return Err(CoreError::Forbidden("cannot grab your own trip".to_string()));
        }
        if trip.status != TripStatus::Pending {
            return Err(CoreError::InvalidState("trip is no longer open".to_string()));
        }

        let profile = self.users.profile(grabber_id).await?;
        let grabber_name = mask_nickname(profile.as_ref().map_or("", |p| p.nickname.as_str()));
        let grabber_open_id = profile.map(|p| p.open_id);

        // Repeated grabs by the same user still notify the owner. The grab row
        // is committed before the notification; if that insert fails the
        // caller gets Transient and a retry re-sends without a second row.
        let grab = TripGrab::new(trip_id, grabber_id, message.clone());
        let recorded = self
            .trips
            .mutate(Some(trip_id), async { self.store().create_grab(&grab).await.map_err(CoreError::from) })
            .await?;

        info!(
            trip_id = %trip_id,
            grabber_id = %grabber_id,
            owner_id = %trip.user_id,
            first_grab = recorded,
            "Trip grabbed"
        );

        let (title, who, verb) = match trip.role {
            TripRole::Driver => ("A passenger wants a seat", "Passenger", "wants to ride with you"),
            TripRole::Passenger => ("A driver can take you", "Driver", "offers to drive you"),
        };
        let mut content = format!(
            "{} {} {} ({} → {}). Check the trip and get in touch.",
            who, grabber_name, verb, trip.departure_city, trip.destination_city
        );
        if !message.is_empty() {
            content.push_str(&format!(" Message: {}", message));
        }

        let notification = Notification::about_trip(trip.user_id, trip_id, title, content);
        let stored = self
            .notifier
            .emit(notification, TRIP_GRABBED, |notification| TripGrabbedEvent {
                trip_id,
                grabber_id: grabber_open_id,
                grabber_name,
                notification,
            })
            .await;
        if !stored {
            error!(trip_id = %trip_id, owner_id = %trip.user_id, "Grab notification not delivered");
            return Err(CoreError::Transient("failed to notify the trip owner".to_string()));
        }

        Ok(GrabOutcome { success: true, message: "The trip owner has been notified".to_string() })
    }

    // ========================================================================
    // Moderation
    // ========================================================================

    pub async fn admin_ban(&self, trip_id: Uuid) -> CoreResult<()> {
        self.set_status(trip_id, &BANNABLE, TripStatus::Banned).await?;
        info!(trip_id = %trip_id, "Trip banned");
        Ok(())
    }

    pub async fn admin_unban(&self, trip_id: Uuid) -> CoreResult<()> {
        self.set_status(trip_id, &[TripStatus::Banned], TripStatus::Pending).await?;
        info!(trip_id = %trip_id, "Trip unbanned");
        Ok(())
    }

    /// Conditional transition: the write only lands while the trip is still
    /// in one of `from`, whatever an earlier check saw.
    async fn set_status(&self, trip_id: Uuid, from: &[TripStatus], to: TripStatus) -> CoreResult<()> {
        let moved = self
            .trips
            .mutate(Some(trip_id), async {
                self.store().update_trip_status(trip_id, from, to).await.map_err(CoreError::from)
            })
            .await?;
        if moved {
            return Ok(());
        }
        match self.store().get_trip(trip_id).await? {
            None => Err(CoreError::NotFound(format!("trip {}", trip_id))),
            Some(trip) => Err(CoreError::InvalidState(format!("trip is already {}", trip.status))),
        }
    }
}
