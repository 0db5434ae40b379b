pub mod alert;
pub mod event;
pub mod session;

pub use alert::{Alert, AlertLevel};
pub use event::{EventDetails, EventType, IntegrityEvent};
pub use session::{MonitorSession, SessionIdentity, SessionStatus};
