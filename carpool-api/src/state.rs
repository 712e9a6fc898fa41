use std::sync::Arc;
use std::time::Duration;
use carpool_core::{MatchRepository, NotificationRepository, TripCache, TripRepository, UserDirectory};
use carpool_hub::{Hub, Notifier};
use carpool_match::{MatchEngine, MatchService, NotificationService};
use carpool_store::app_config::Config;
use carpool_store::memory::{MemoryStore, MemoryTripCache};
use carpool_trip::{TripCacheAside, TripRules, TripService};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

/// Storage the services are wired onto
pub struct Backends {
    pub trips: Arc<dyn TripRepository>,
    pub matches: Arc<dyn MatchRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub users: Arc<dyn UserDirectory>,
    pub cache: Arc<dyn TripCache>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub jwt_secret: String,
    pub mailbox_capacity: usize,
    pub trip_ttl: Duration,
    pub list_ttl: Duration,
    pub rules: TripRules,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            jwt_secret: config.auth.jwt_secret.clone(),
            mailbox_capacity: config.hub.mailbox_capacity,
            trip_ttl: config.cache.trip_ttl(),
            list_ttl: config.cache.list_ttl(),
            rules: TripRules {
                max_active_trips: config.business_rules.max_active_trips,
                max_daily_trips: config.business_rules.max_daily_trips,
                default_page_size: config.business_rules.default_page_size,
            },
        }
    }

    /// Defaults for local runs and tests
    pub fn with_secret(jwt_secret: &str) -> Self {
        Self {
            jwt_secret: jwt_secret.to_string(),
            mailbox_capacity: 256,
            trip_ttl: Duration::from_secs(600),
            list_ttl: Duration::from_secs(300),
            rules: TripRules::default(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub trips: TripService,
    pub matches: MatchService,
    pub notifications: NotificationService,
    pub hub: Arc<Hub>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn assemble(backends: Backends, settings: Settings) -> Self {
        let hub = Arc::new(Hub::new(settings.mailbox_capacity));
        let notifier = Notifier::new(backends.notifications.clone(), hub.clone());
        let aside = TripCacheAside::new(
            backends.trips.clone(),
            backends.cache,
            settings.trip_ttl,
            settings.list_ttl,
        );
        let engine = MatchEngine::new(backends.trips, backends.matches.clone(), notifier.clone());

        Self {
            trips: TripService::new(
                aside.clone(),
                backends.users.clone(),
                notifier.clone(),
                Arc::new(engine),
                settings.rules,
            ),
            matches: MatchService::new(backends.matches, aside, backends.users, notifier),
            notifications: NotificationService::new(backends.notifications),
            hub,
            auth: AuthConfig { secret: settings.jwt_secret },
        }
    }

    /// Everything in process memory; nothing survives a restart
    pub fn in_memory(users: Arc<dyn UserDirectory>, settings: Settings) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::assemble(
            Backends {
                trips: store.clone(),
                matches: store.clone(),
                notifications: store,
                users,
                cache: Arc::new(MemoryTripCache::new()),
            },
            settings,
        )
    }
}
