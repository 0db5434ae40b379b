pub mod controller;
mod loop_worker;
pub mod registry;

pub use controller::{MonitorView, SessionMonitor};
pub use registry::{MonitorRegistry, RegistryError, SessionMetrics};
