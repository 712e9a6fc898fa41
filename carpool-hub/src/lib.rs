//! Live client sessions and best-effort delivery of addressed events.

pub mod event;
pub mod hub;
pub mod notifier;
pub mod session;
pub mod signaling;

pub use event::Event;
pub use hub::Hub;
pub use notifier::Notifier;
pub use session::{Delivery, Session};
pub use signaling::RelayOutcome;
