//! Cloud session
//!
//! ## Responsibilities
//!
//! - connect / register camera / disconnect lifecycle
//! - Log, telemetry and video-event emission
//! - Remote parameter access and reporting
//! - Frame forwarding at the end of each grab iteration
//!
//! The session is a thin, cloneable facade over the link's command
//! channel: every emission is one serialized publish handed to the
//! publisher task. No call here blocks on the network.

mod parameters;
mod types;

pub use parameters::ParameterStore;
pub use types::{
    FrameEnvelope, LogLevel, LogMessage, TelemetryRecord, VideoEventKind, VideoEventMessage,
};

use crate::camera::CameraInfo;
use crate::error::{Error, Result};
use crate::mqtt_link::{LinkHandle, TopicSet};
use crate::param_dispatch::ParameterScope;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

struct SessionInner {
    app_name: String,
    topics: TopicSet,
    link: LinkHandle,
    params: Arc<ParameterStore>,
    camera: RwLock<Option<CameraInfo>>,
    /// (local threshold, cloud threshold)
    log_thresholds: RwLock<(LogLevel, LogLevel)>,
    frames_forwarded: AtomicU64,
}

/// Handle to the cloud backend. Clones share one underlying session.
#[derive(Clone)]
pub struct CloudSession {
    inner: Arc<SessionInner>,
}

impl CloudSession {
    /// Open the session and announce the application
    pub fn connect(
        app_name: &str,
        link: LinkHandle,
        topics: TopicSet,
        params: Arc<ParameterStore>,
    ) -> Result<Self> {
        let session = Self {
            inner: Arc::new(SessionInner {
                app_name: app_name.to_string(),
                topics,
                link,
                params,
                camera: RwLock::new(None),
                log_thresholds: RwLock::new((LogLevel::Debug, LogLevel::Info)),
                frames_forwarded: AtomicU64::new(0),
            }),
        };
        session.send_log(format!("Application {} connected", app_name), LogLevel::Info)?;
        info!(app_name = %app_name, "Cloud session opened");
        Ok(session)
    }

    /// Register the camera whose frames this session forwards.
    /// Required before any frame can be pushed.
    pub fn register_camera(&self, info: &CameraInfo) -> Result<()> {
        {
            let mut camera = self.inner.camera.write().expect("session lock");
            *camera = Some(info.clone());
        }
        self.send_log(
            format!(
                "Camera {} ({}) registered",
                info.serial_number, info.model
            ),
            LogLevel::Info,
        )?;
        Ok(())
    }

    pub fn registered_camera(&self) -> Option<CameraInfo> {
        self.inner.camera.read().expect("session lock").clone()
    }

    /// Development mode: seed application parameters from the packaged
    /// file instead of the cloud twin.
    pub fn load_application_parameters(&self, path: &std::path::Path) -> Result<usize> {
        self.inner.params.load_application_parameters(path)
    }

    /// Set the local print threshold and the cloud forwarding threshold
    pub fn set_log_level_threshold(&self, local: LogLevel, cloud: LogLevel) {
        let mut thresholds = self.inner.log_thresholds.write().expect("session lock");
        *thresholds = (local, cloud);
    }

    /// Send a log line to the cloud (subject to the cloud threshold)
    /// and mirror it locally (subject to the local threshold).
    pub fn send_log(&self, message: impl Into<String>, level: LogLevel) -> Result<()> {
        let message = message.into();
        let (local, cloud) = *self.inner.log_thresholds.read().expect("session lock");

        if level >= local {
            match level {
                LogLevel::Debug => debug!(target: "cloud_log", "{}", message),
                LogLevel::Info => info!(target: "cloud_log", "{}", message),
                LogLevel::Warning => warn!(target: "cloud_log", "{}", message),
                LogLevel::Error => error!(target: "cloud_log", "{}", message),
            }
        }
        if level < cloud {
            return Ok(());
        }

        let record = LogMessage::new(&self.inner.app_name, level, message);
        self.publish_json(self.inner.topics.logs(), &record)
    }

    pub fn send_telemetry(&self, label: &str, payload: Value) -> Result<()> {
        let record = TelemetryRecord::new(label, payload);
        self.publish_json(self.inner.topics.telemetry(), &record)
    }

    pub fn start_video_event(
        &self,
        label: &str,
        reference: &str,
        timestamp_ms: u64,
        payload: Value,
    ) -> Result<()> {
        self.publish_video_event(VideoEventKind::Start, label, reference, timestamp_ms, payload)
    }

    pub fn update_video_event(
        &self,
        label: &str,
        reference: &str,
        timestamp_ms: u64,
        payload: Value,
    ) -> Result<()> {
        self.publish_video_event(VideoEventKind::Update, label, reference, timestamp_ms, payload)
    }

    pub fn get_parameter_bool(&self, name: &str, scope: ParameterScope, default: bool) -> bool {
        self.inner.params.get_bool(name, scope, default)
    }

    pub fn get_parameter_i64(&self, name: &str, scope: ParameterScope, default: i64) -> i64 {
        self.inner.params.get_i64(name, scope, default)
    }

    pub fn get_parameter_f64(&self, name: &str, scope: ParameterScope, default: f64) -> f64 {
        self.inner.params.get_f64(name, scope, default)
    }

    pub fn get_parameter_string(&self, name: &str, scope: ParameterScope, default: &str) -> String {
        self.inner.params.get_string(name, scope, default)
    }

    /// Acknowledge an applied value back to the twin
    pub fn report_parameter(
        &self,
        name: &str,
        scope: ParameterScope,
        value: Value,
    ) -> Result<()> {
        self.inner.params.record_reported(name, scope, value.clone());
        let patch = json!({ format!("parameters.reported.{}", name): value });
        let body = serde_json::to_vec(&patch)?;
        self.inner.link.publish(self.inner.topics.twin_update(scope), body)
    }

    /// End-of-iteration push with the (possibly annotated) frame
    pub fn update_with_frame(&self, envelope: &FrameEnvelope) -> Result<()> {
        self.require_camera()?;
        self.inner.frames_forwarded.fetch_add(1, Ordering::Relaxed);
        self.publish_json(self.inner.topics.stream("main"), envelope)
    }

    /// Frame push for an additional camera's stream
    pub fn add_secondary_stream(&self, stream_name: &str, envelope: &FrameEnvelope) -> Result<()> {
        self.publish_json(self.inner.topics.stream(stream_name), envelope)
    }

    pub fn frames_forwarded(&self) -> u64 {
        self.inner.frames_forwarded.load(Ordering::Relaxed)
    }

    /// Announce shutdown and close the publisher side
    pub fn disconnect(&self) -> Result<()> {
        self.send_log(
            format!("Application {} disconnecting", self.inner.app_name),
            LogLevel::Info,
        )?;
        self.inner.link.shutdown();
        info!(app_name = %self.inner.app_name, "Cloud session closed");
        Ok(())
    }

    fn publish_video_event(
        &self,
        kind: VideoEventKind,
        label: &str,
        reference: &str,
        timestamp_ms: u64,
        payload: Value,
    ) -> Result<()> {
        let message = VideoEventMessage {
            kind,
            label: label.to_string(),
            reference: reference.to_string(),
            timestamp_ms,
            payload,
        };
        self.publish_json(self.inner.topics.video_events(), &message)
    }

    fn publish_json<T: serde::Serialize>(&self, topic: String, value: &T) -> Result<()> {
        let body = serde_json::to_vec(value)?;
        self.inner.link.publish(topic, body)
    }

    fn require_camera(&self) -> Result<()> {
        if self.inner.camera.read().expect("session lock").is_none() {
            return Err(Error::Internal(
                "no camera registered on the session".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt_link::LinkCommand;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn session() -> (CloudSession, UnboundedReceiver<LinkCommand>) {
        let (link, rx) = LinkHandle::detached();
        let topics = TopicSet::new("dev1", "app1");
        let params = Arc::new(ParameterStore::new());
        let session = CloudSession::connect("test_app", link, topics, params).unwrap();
        (session, rx)
    }

    fn next_publish(rx: &mut UnboundedReceiver<LinkCommand>) -> (String, Value) {
        loop {
            match rx.try_recv().expect("expected a publish") {
                LinkCommand::Publish { topic, payload } => {
                    return (topic, serde_json::from_slice(&payload).unwrap())
                }
                _ => continue,
            }
        }
    }

    #[test]
    fn connect_announces_application() {
        let (_session, mut rx) = session();
        let (topic, body) = next_publish(&mut rx);
        assert_eq!(topic, "/v1/devices/dev1/logs");
        assert_eq!(body["level"], json!("info"));
        assert!(body["message"].as_str().unwrap().contains("connected"));
    }

    #[test]
    fn cloud_log_threshold_filters() {
        let (session, mut rx) = session();
        next_publish(&mut rx); // connect log

        session.set_log_level_threshold(LogLevel::Debug, LogLevel::Warning);
        session.send_log("routine detail", LogLevel::Info).unwrap();
        assert!(rx.try_recv().is_err());

        session.send_log("grab failed", LogLevel::Error).unwrap();
        let (topic, body) = next_publish(&mut rx);
        assert_eq!(topic, "/v1/devices/dev1/logs");
        assert_eq!(body["level"], json!("error"));
    }

    #[test]
    fn telemetry_carries_label_and_payload() {
        let (session, mut rx) = session();
        next_publish(&mut rx);

        session
            .send_telemetry("object_detection", json!({"number_of_detections": 2}))
            .unwrap();
        let (topic, body) = next_publish(&mut rx);
        assert_eq!(topic, "/v1/devices/dev1/telemetry");
        assert_eq!(body["label"], json!("object_detection"));
        assert_eq!(body["payload"]["number_of_detections"], json!(2));
        assert!(body["timestamp"].is_string());
    }

    #[test]
    fn report_parameter_publishes_reported_patch() {
        let (session, mut rx) = session();
        next_publish(&mut rx);

        session
            .report_parameter("led_status", ParameterScope::Device, json!(true))
            .unwrap();
        let (topic, body) = next_publish(&mut rx);
        assert_eq!(topic, "/v1/devices/dev1/twin/update");
        assert_eq!(body["parameters.reported.led_status"], json!(true));
    }

    #[test]
    fn frame_push_requires_registration() {
        let (session, mut rx) = session();
        next_publish(&mut rx);

        let envelope = FrameEnvelope {
            sequence: 0,
            timestamp_ms: 0,
            width: 1280,
            height: 720,
            detection_count: 0,
            boxes: None,
        };
        assert!(session.update_with_frame(&envelope).is_err());

        session
            .register_camera(&CameraInfo {
                serial_number: 1001,
                model: "sim-stereo".to_string(),
                firmware_version: "1.0.0".to_string(),
            })
            .unwrap();
        next_publish(&mut rx); // registration log

        session.update_with_frame(&envelope).unwrap();
        let (topic, _body) = next_publish(&mut rx);
        assert_eq!(topic, "/v1/devices/dev1/streams/main");
        assert_eq!(session.frames_forwarded(), 1);
    }

    #[test]
    fn video_event_kinds() {
        let (session, mut rx) = session();
        next_publish(&mut rx);

        session
            .start_video_event("People Detection", "evt-1000", 1000, json!({"count": 1}))
            .unwrap();
        let (topic, body) = next_publish(&mut rx);
        assert_eq!(topic, "/v1/devices/dev1/video_events");
        assert_eq!(body["kind"], json!("start"));
        assert_eq!(body["reference"], json!("evt-1000"));

        session
            .update_video_event("People Detection", "evt-1000", 12_000, json!({"count": 2}))
            .unwrap();
        let (_, body) = next_publish(&mut rx);
        assert_eq!(body["kind"], json!("update"));
        assert_eq!(body["timestamp_ms"], json!(12_000));
    }
}
