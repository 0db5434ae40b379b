pub mod alerts;
pub mod dispatcher;
pub mod remote;
pub mod store;

pub use alerts::AlertSurface;
pub use dispatcher::EventDispatcher;
pub use remote::{HttpEventStore, HttpEventStoreConfig};
pub use store::{DeliveryFailure, EventStore};
