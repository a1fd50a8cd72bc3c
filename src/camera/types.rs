//! Camera data types
//!
//! Plain data crossing the camera seam. The perception results mirror
//! what the vendor module reports: a tracked object list with per-object
//! confidence and 3D position.

use serde::{Deserialize, Serialize};

/// Capture resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    Hd2k,
    Hd1080,
    Hd720,
    Wvga,
}

impl Resolution {
    /// Parse the cloud-side string form ("HD2K", "HD1080", "HD720", "WVGA")
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HD2K" => Some(Self::Hd2k),
            "HD1080" => Some(Self::Hd1080),
            "HD720" => Some(Self::Hd720),
            "WVGA" => Some(Self::Wvga),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hd2k => "HD2K",
            Self::Hd1080 => "HD1080",
            Self::Hd720 => "HD720",
            Self::Wvga => "WVGA",
        }
    }

    /// Pixel dimensions (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Hd2k => (2208, 1242),
            Self::Hd1080 => (1920, 1080),
            Self::Hd720 => (1280, 720),
            Self::Wvga => (672, 376),
        }
    }
}

/// Depth computation mode requested at open time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthMode {
    None,
    Performance,
    Quality,
}

/// Parameters applied when (re)opening a camera
#[derive(Debug, Clone)]
pub struct OpenParameters {
    pub resolution: Resolution,
    pub fps: u32,
    pub depth_mode: DepthMode,
    pub image_flip: bool,
}

impl Default for OpenParameters {
    fn default() -> Self {
        Self {
            resolution: Resolution::Hd720,
            fps: 30,
            depth_mode: DepthMode::Performance,
            image_flip: false,
        }
    }
}

/// Adjustable video settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoSetting {
    LedStatus,
    Gamma,
    Gain,
    Exposure,
    AutoExposure,
}

impl VideoSetting {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LedStatus => "led_status",
            Self::Gamma => "gamma",
            Self::Gain => "gain",
            Self::Exposure => "exposure",
            Self::AutoExposure => "auto_exposure",
        }
    }
}

/// Static camera identity, reported to the cloud at registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraInfo {
    pub serial_number: u32,
    pub model: String,
    pub firmware_version: String,
}

/// A grabbed frame. Pixel data transport is the vendor stream path;
/// the agent only carries capture metadata forward.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub width: u32,
    pub height: u32,
}

/// Tracking state of a detected object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    Ok,
    Searching,
    Off,
}

/// One detected object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub id: u32,
    pub label: String,
    pub confidence: f32,
    /// Position in camera frame, meters
    pub position: [f32; 3],
    /// 2D bounding box (top-left, bottom-right), image pixels
    pub bounding_box: Option<[[f32; 2]; 2]>,
    pub tracking_state: TrackingState,
}

impl Detection {
    /// Euclidean distance from the camera, meters
    pub fn distance(&self) -> f32 {
        let [x, y, z] = self.position;
        (x * x + y * y + z * z).sqrt()
    }
}
