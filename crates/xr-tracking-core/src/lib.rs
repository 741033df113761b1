//! Spatial tracking for AR runtimes: coordinate systems, anchors, realities,
//! displays and the per-frame session loop.

pub mod anchor;
pub mod bridge;
pub mod coordinate_system;
pub mod display;
pub mod error;
pub mod logging;
pub mod reality;
pub mod runtime;
pub mod session;
pub mod shared;
pub mod spatial;
pub mod stereo;
pub mod video;

pub use error::{Result, XrError};
pub use runtime::{XrRuntime, XrRuntimeBuilder};
pub use session::{FrameSnapshot, Session, SessionEvent};
pub use xr_tracking_config as config;
