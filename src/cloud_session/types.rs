//! Cloud emission payloads

use crate::camera::{Detection, Frame, TrackingState};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Log severity, ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Log record published to the logs topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessage {
    pub application: String,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: String,
}

impl LogMessage {
    pub fn new(application: &str, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            application: application.to_string(),
            level,
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Timestamped free-form metrics payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub label: String,
    pub payload: Value,
    pub timestamp: String,
}

impl TelemetryRecord {
    pub fn new(label: impl Into<String>, payload: Value) -> Self {
        Self {
            label: label.into(),
            payload,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Start vs. continuation of a logical video event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoEventKind {
    Start,
    Update,
}

/// One video-event message. Consecutive messages sharing a `reference`
/// belong to the same logical clip on the cloud side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoEventMessage {
    pub kind: VideoEventKind,
    pub label: String,
    pub reference: String,
    pub timestamp_ms: u64,
    pub payload: Value,
}

/// Frame metadata forwarded at the end of each grab iteration. Pixel
/// transport is the vendor stream path and stays out of this envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameEnvelope {
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub width: u32,
    pub height: u32,
    pub detection_count: usize,
    /// Bounding boxes of reliably tracked objects, present when the
    /// annotation parameter is on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boxes: Option<Vec<[[f32; 2]; 2]>>,
}

impl FrameEnvelope {
    pub fn from_frame(frame: &Frame, detections: &[Detection], draw_boxes: bool) -> Self {
        let reliable: Vec<&Detection> = detections
            .iter()
            .filter(|d| d.tracking_state == TrackingState::Ok)
            .collect();
        let boxes = if draw_boxes {
            Some(reliable.iter().filter_map(|d| d.bounding_box).collect())
        } else {
            None
        };
        Self {
            sequence: frame.sequence,
            timestamp_ms: frame.timestamp_ms,
            width: frame.width,
            height: frame.height,
            detection_count: reliable.len(),
            boxes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
    }

    #[test]
    fn envelope_counts_only_reliable_detections() {
        let frame = Frame {
            sequence: 3,
            timestamp_ms: 1000,
            width: 1280,
            height: 720,
        };
        let detections = vec![
            Detection {
                id: 0,
                label: "person".to_string(),
                confidence: 0.9,
                position: [0.0, 0.0, 2.0],
                bounding_box: Some([[0.0, 0.0], [10.0, 10.0]]),
                tracking_state: TrackingState::Ok,
            },
            Detection {
                id: 1,
                label: "person".to_string(),
                confidence: 0.4,
                position: [1.0, 0.0, 3.0],
                bounding_box: Some([[5.0, 5.0], [15.0, 15.0]]),
                tracking_state: TrackingState::Searching,
            },
        ];

        let envelope = FrameEnvelope::from_frame(&frame, &detections, true);
        assert_eq!(envelope.detection_count, 1);
        assert_eq!(envelope.boxes.as_ref().unwrap().len(), 1);

        let plain = FrameEnvelope::from_frame(&frame, &detections, false);
        assert!(plain.boxes.is_none());
        let encoded = serde_json::to_string(&plain).unwrap();
        assert!(!encoded.contains("boxes"));
    }
}
