use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use chrono::{DateTime, Days, Local, NaiveDate, TimeZone, Utc};
use carpool_shared::{TripRole, UserId};

use crate::cache::TRIP_LIST_KEY_PREFIX;

pub const MAX_PAGE_SIZE: i64 = 100;

/// Trip list filter as accepted from clients
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TripListQuery {
    pub role: Option<TripRole>,
    pub departure_city: Option<String>,
    pub destination_city: Option<String>,
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub page_size: i64,
    /// Caller's own city and province; matching trips sort first
    pub user_city: Option<String>,
    pub user_province: Option<String>,
    /// Public id of a user whose trips should be hidden
    pub exclude_user: Option<String>,
    /// Resolved from `exclude_user` by the service
    #[serde(skip_deserializing)]
    pub exclude_user_id: Option<UserId>,
}

impl TripListQuery {
    /// Fill paging defaults and drop blank filters
    pub fn normalized(mut self, default_page_size: i64) -> Self {
        if self.page < 1 {
            self.page = 1;
        }
        if self.page_size < 1 {
            self.page_size = default_page_size;
        }
        self.page_size = self.page_size.min(MAX_PAGE_SIZE);
        for field in [
            &mut self.departure_city,
            &mut self.destination_city,
            &mut self.user_city,
            &mut self.user_province,
            &mut self.exclude_user,
        ] {
            if field.as_deref().map(str::trim).is_some_and(str::is_empty) {
                *field = None;
            }
        }
        self
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    /// `[start, end)` of the requested departure day in server local time
    pub fn departure_window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let day = self.date?;
        let next = day.checked_add_days(Days::new(1))?;
        let start = Local.from_local_datetime(&day.and_hms_opt(0, 0, 0)?).earliest()?;
        let end = Local.from_local_datetime(&next.and_hms_opt(0, 0, 0)?).earliest()?;
        Some((start.with_timezone(&Utc), end.with_timezone(&Utc)))
    }

    /// Deterministic list cache key: equal filters give equal keys
    pub fn cache_key(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        format!("{}{:x}", TRIP_LIST_KEY_PREFIX, Sha256::digest(canonical.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_deserialization() {
        let query: TripListQuery =
            serde_urlencoded::from_str("role=DRIVER&departure_city=Hangzhou&date=2030-05-01&page=2")
                .expect("Failed to deserialize");
        assert_eq!(query.role, Some(TripRole::Driver));
        assert_eq!(query.date, NaiveDate::from_ymd_opt(2030, 5, 1));
        assert_eq!(query.page, 2);
        assert_eq!(query.page_size, 0);
    }

    #[test]
    fn test_normalized_defaults() {
        let query = TripListQuery {
            departure_city: Some("  ".to_string()),
            page_size: 500,
            ..Default::default()
        }
        .normalized(20);
        assert_eq!(query.page, 1);
        assert_eq!(query.page_size, MAX_PAGE_SIZE);
        assert!(query.departure_city.is_none());
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn test_departure_window_spans_one_day() {
        let query = TripListQuery {
            date: NaiveDate::from_ymd_opt(2030, 5, 1),
            ..Default::default()
        };
        let (start, end) = query.departure_window().unwrap();
        assert_eq!(end - start, chrono::Duration::hours(24));
        assert!(TripListQuery::default().departure_window().is_none());
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let a = TripListQuery {
            departure_city: Some("Hangzhou".to_string()),
            ..Default::default()
        }
        .normalized(20);
        let b = a.clone();
        let c = TripListQuery {
            departure_city: Some("Shanghai".to_string()),
            ..Default::default()
        }
        .normalized(20);

        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
        assert!(a.cache_key().starts_with("trip_list:"));
    }
}
