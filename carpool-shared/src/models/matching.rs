use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::trip::{Trip, TripRole};
use super::wire_enum;
use crate::pii::Masked;
use crate::UserId;

/// One party's answer to a proposed match
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Pending,
    Accepted,
    Rejected,
}

wire_enum!(Decision {
    Pending => "PENDING",
    Accepted => "ACCEPTED",
    Rejected => "REJECTED",
});

impl Decision {
    pub fn from_accept(accept: bool) -> Self {
        if accept {
            Decision::Accepted
        } else {
            Decision::Rejected
        }
    }
}

/// Overall match status; `Success` and `Failed` are terminal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Pending,
    Success,
    Failed,
}

wire_enum!(MatchStatus {
    Pending => "PENDING",
    Success => "SUCCESS",
    Failed => "FAILED",
});

impl MatchStatus {
    /// Overall status as a pure function of the two per-side decisions
    pub fn resolve(driver: Decision, passenger: Decision) -> Self {
        match (driver, passenger) {
            (Decision::Rejected, _) | (_, Decision::Rejected) => MatchStatus::Failed,
            (Decision::Accepted, Decision::Accepted) => MatchStatus::Success,
            _ => MatchStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, MatchStatus::Pending)
    }
}

/// Which participant of a match is acting
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Driver,
    Passenger,
}

impl Side {
    pub fn other(&self) -> Self {
        match self {
            Side::Driver => Side::Passenger,
            Side::Passenger => Side::Driver,
        }
    }
}

/// A proposed pairing of one driver trip with one passenger trip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Match {
    pub id: Uuid,
    pub driver_trip_id: Uuid,
    pub passenger_trip_id: Uuid,
    pub driver_id: UserId,
    pub passenger_id: UserId,
    pub score: f64,
    pub driver_status: Decision,
    pub passenger_status: Decision,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    /// Pair two trips of opposite roles. Argument order does not matter.
    pub fn pair(a: &Trip, b: &Trip, score: f64) -> Self {
        let (driver, passenger) = match a.role {
            TripRole::Driver => (a, b),
            TripRole::Passenger => (b, a),
        };
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            driver_trip_id: driver.id,
            passenger_trip_id: passenger.id,
            driver_id: driver.user_id,
            passenger_id: passenger.user_id,
            score,
            driver_status: Decision::Pending,
            passenger_status: Decision::Pending,
            status: MatchStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// The side `user_id` plays in this match, if any
    pub fn side_of(&self, user_id: UserId) -> Option<Side> {
        if self.driver_id == user_id {
            Some(Side::Driver)
        } else if self.passenger_id == user_id {
            Some(Side::Passenger)
        } else {
            None
        }
    }

    pub fn decision(&self, side: Side) -> Decision {
        match side {
            Side::Driver => self.driver_status,
            Side::Passenger => self.passenger_status,
        }
    }

    pub fn set_decision(&mut self, side: Side, decision: Decision) {
        match side {
            Side::Driver => self.driver_status = decision,
            Side::Passenger => self.passenger_status = decision,
        }
        self.updated_at = Utc::now();
    }

    pub fn user(&self, side: Side) -> UserId {
        match side {
            Side::Driver => self.driver_id,
            Side::Passenger => self.passenger_id,
        }
    }

    /// Status implied by the current per-side decisions
    pub fn resolved_status(&self) -> MatchStatus {
        MatchStatus::resolve(self.driver_status, self.passenger_status)
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        self.side_of(user_id).is_some()
    }
}

/// Contact details released to both parties once a match succeeds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactInfo {
    pub driver_nickname: String,
    pub driver_phone: Masked<String>,
    pub passenger_nickname: String,
    pub passenger_phone: Masked<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_overall_status() {
        use Decision::*;
        assert_eq!(MatchStatus::resolve(Pending, Pending), MatchStatus::Pending);
        assert_eq!(MatchStatus::resolve(Accepted, Pending), MatchStatus::Pending);
        assert_eq!(MatchStatus::resolve(Pending, Accepted), MatchStatus::Pending);
        assert_eq!(MatchStatus::resolve(Accepted, Accepted), MatchStatus::Success);
        assert_eq!(MatchStatus::resolve(Rejected, Pending), MatchStatus::Failed);
        assert_eq!(MatchStatus::resolve(Accepted, Rejected), MatchStatus::Failed);
        assert_eq!(MatchStatus::resolve(Rejected, Rejected), MatchStatus::Failed);
    }

    #[test]
    fn test_contact_phone_masked_in_debug() {
        let info = ContactInfo {
            driver_nickname: "Lin".to_string(),
            driver_phone: Masked("13800000000".to_string()),
            passenger_nickname: "Wu".to_string(),
            passenger_phone: Masked("13900000000".to_string()),
        };
        let debug = format!("{:?}", info);
        assert!(!debug.contains("13800000000"));

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["driver_phone"], "13800000000");
    }
}
