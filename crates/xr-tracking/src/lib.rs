pub use xr_tracking_config as config;
pub use xr_tracking_core::{
    anchor, bridge, coordinate_system, display, error, logging, reality, runtime, session,
    spatial, stereo, video,
};
pub use xr_tracking_core::{FrameSnapshot, Result, Session, SessionEvent, XrError, XrRuntime};
