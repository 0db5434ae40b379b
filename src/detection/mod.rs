pub mod config;
pub mod engine;
pub mod face;
pub mod geometry;
pub mod objects;

pub use config::{ConfigError, DetectionConfig};
pub use engine::{DebounceEngine, SignalState};
pub use face::{evaluate_faces, FaceSignals};
pub use geometry::BoundingBox;
pub use objects::{evaluate_objects, FlaggedObject};
