//! Camera seam
//!
//! ## Responsibilities
//!
//! - Open/grab/close lifecycle of a stereo sensor
//! - Video settings access (LED, gamma, gain, exposure)
//! - Perception results retrieval (tracked object list)
//!
//! The vendor SDK sits behind [`CameraDevice`]; every call returns a
//! status-code-like [`CameraError`] and the agent treats the device as a
//! black box. [`sim::SimulatedCamera`] is the in-tree implementation used
//! by the binary and the tests.

pub mod sim;
mod types;

pub use types::{
    CameraInfo, DepthMode, Detection, Frame, OpenParameters, Resolution, TrackingState,
    VideoSetting,
};

/// Camera status codes surfaced as errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("camera not opened")]
    NotOpened,

    #[error("camera already opened")]
    AlreadyOpened,

    #[error("grab timeout")]
    GrabTimeout,

    #[error("device disconnected")]
    DeviceDisconnected,

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("camera failure: {0}")]
    Failure(String),
}

/// Opaque stereo camera handle.
///
/// Implementations are not required to be internally synchronized; the
/// agent guards the handle with a single mutex shared between the grab
/// loop and parameter callbacks that reconfigure or reopen the device.
pub trait CameraDevice: Send {
    /// Open the device with the given parameters
    fn open(&mut self, params: &OpenParameters) -> Result<(), CameraError>;

    fn is_open(&self) -> bool;

    /// Grab the next frame. An error here is terminal for the loop.
    fn grab(&mut self) -> Result<Frame, CameraError>;

    /// Retrieve perception results for the last grabbed frame
    fn retrieve_detections(&mut self) -> Result<Vec<Detection>, CameraError>;

    /// Current device clock, milliseconds
    fn current_timestamp_ms(&self) -> u64;

    fn get_setting(&self, setting: VideoSetting) -> Result<i32, CameraError>;

    fn set_setting(&mut self, setting: VideoSetting, value: i32) -> Result<(), CameraError>;

    /// Toggle the local side stream (encoder internals are the vendor's)
    fn set_streaming(&mut self, enabled: bool) -> Result<(), CameraError>;

    fn info(&self) -> CameraInfo;

    fn close(&mut self);

    /// Hardware reboot request. The device must be reopened afterwards.
    fn reboot(&mut self) -> Result<(), CameraError>;
}
