//! Frame loop
//!
//! ## Responsibilities
//!
//! - Grab frames from the camera behind the shared lock
//! - Run event grouping and telemetry gating on the detection results
//! - Forward each frame to the cloud session
//! - Exit on grab failure (one hardware reboot attempt, then close)
//!
//! The camera handle is a plain mutex shared with parameter callbacks:
//! a callback that changes video settings locks the same handle the
//! grab loop uses, and an init-parameter change only sets the reopen
//! flag so the reopen itself happens here, between grabs.

mod event_tracker;
mod telemetry_gate;

pub use event_tracker::{EventAction, EventTracker};
pub use telemetry_gate::TelemetryGate;

use crate::camera::{CameraDevice, Detection, Frame, OpenParameters, TrackingState};
use crate::cloud_session::{CloudSession, FrameEnvelope, LogLevel, ParameterStore};
use crate::error::{Error, Result};
use crate::param_dispatch::ParameterScope;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{info, warn};

/// Camera handle shared between the loop and parameter callbacks
pub type SharedCamera = Arc<Mutex<Box<dyn CameraDevice>>>;

/// Loop behavior controlled by remote application parameters
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub record_video_event: bool,
    pub frames_between_events: u32,
    pub event_update_interval_s: f64,
    pub record_telemetry: bool,
    pub telemetry_frequency_s: f64,
    pub draw_boxes: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            record_video_event: true,
            frames_between_events: 30,
            event_update_interval_s: 10.0,
            record_telemetry: true,
            telemetry_frequency_s: 10.0,
            draw_boxes: true,
        }
    }
}

impl LoopSettings {
    /// Snapshot the application-scope parameters, falling back to the
    /// built-in defaults for anything unset.
    pub fn from_store(params: &ParameterStore) -> Self {
        let d = Self::default();
        let scope = ParameterScope::Application;
        Self {
            record_video_event: params.get_bool("record_video_event", scope, d.record_video_event),
            frames_between_events: params.get_i64(
                "frames_between_events",
                scope,
                d.frames_between_events as i64,
            ) as u32,
            event_update_interval_s: d.event_update_interval_s,
            record_telemetry: params.get_bool("record_telemetry", scope, d.record_telemetry),
            telemetry_frequency_s: params.get_f64(
                "telemetry_frequency",
                scope,
                d.telemetry_frequency_s,
            ),
            draw_boxes: params.get_bool("draw_boxes", scope, d.draw_boxes),
        }
    }
}

/// Per-camera polling loop
pub struct FrameLoop {
    camera: SharedCamera,
    session: CloudSession,
    settings: Arc<RwLock<LoopSettings>>,
    open_params: Arc<RwLock<OpenParameters>>,
    reopen_requested: Arc<AtomicBool>,
    event_label: String,
    frame_interval: Duration,
}

impl FrameLoop {
    pub fn new(
        camera: SharedCamera,
        session: CloudSession,
        settings: Arc<RwLock<LoopSettings>>,
        open_params: Arc<RwLock<OpenParameters>>,
        reopen_requested: Arc<AtomicBool>,
    ) -> Self {
        let fps = open_params.read().expect("open params lock").fps.max(1);
        Self {
            camera,
            session,
            settings,
            open_params,
            reopen_requested,
            event_label: "People Detection".to_string(),
            frame_interval: Duration::from_millis(1000 / fps as u64),
        }
    }

    pub fn with_event_label(mut self, label: impl Into<String>) -> Self {
        self.event_label = label.into();
        self
    }

    /// Pacing between iterations; `Duration::ZERO` disables it (tests)
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Run until the camera fails. The session stays open; the caller
    /// decides when to disconnect.
    pub async fn run(mut self) -> Result<()> {
        let start_ts = {
            let camera = self.camera.lock().expect("camera lock");
            camera.current_timestamp_ms()
        };

        let initial = self.settings.read().expect("loop settings lock").clone();
        let mut tracker = EventTracker::new(
            initial.frames_between_events,
            initial.event_update_interval_s,
        );
        let mut gate = TelemetryGate::new(start_ts);

        info!(event_label = %self.event_label, "Frame loop started");

        loop {
            if self.reopen_requested.swap(false, Ordering::SeqCst) {
                self.reopen()?;
            }

            let grabbed = {
                let mut camera = self.camera.lock().expect("camera lock");
                match camera.grab() {
                    Ok(frame) => camera.retrieve_detections().map(|d| (frame, d)),
                    Err(e) => Err(e),
                }
            };

            let (frame, detections) = match grabbed {
                Ok(pair) => pair,
                Err(e) => {
                    self.handle_grab_failure(&e);
                    return Err(Error::Device(e));
                }
            };

            let settings = self.settings.read().expect("loop settings lock").clone();
            tracker.set_frames_between_events(settings.frames_between_events);

            let reliable = detections
                .iter()
                .filter(|d| d.tracking_state == TrackingState::Ok)
                .count();

            if settings.record_video_event {
                self.emit_event(&mut tracker, &frame, &detections, reliable);
            }

            if settings.record_telemetry && gate.ready(frame.timestamp_ms, settings.telemetry_frequency_s)
            {
                self.emit_telemetry(&detections, reliable);
                gate.mark_sent(frame.timestamp_ms);
            }

            let envelope = FrameEnvelope::from_frame(&frame, &detections, settings.draw_boxes);
            self.session.update_with_frame(&envelope)?;

            if !self.frame_interval.is_zero() {
                tokio::time::sleep(self.frame_interval).await;
            }
        }
    }

    /// One task per additional camera, pushing to its own named stream.
    /// Shares nothing with the main loop but the session's sender.
    pub fn spawn_secondary(
        mut camera: Box<dyn CameraDevice>,
        stream_name: String,
        session: CloudSession,
        frame_interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(stream_name = %stream_name, "Secondary stream started");
            loop {
                match camera.grab() {
                    Ok(frame) => {
                        let envelope = FrameEnvelope::from_frame(&frame, &[], false);
                        if let Err(e) = session.add_secondary_stream(&stream_name, &envelope) {
                            warn!(stream_name = %stream_name, error = %e, "Secondary push failed");
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = session.send_log(
                            format!("Secondary stream {} grab failed: {}", stream_name, e),
                            LogLevel::Warning,
                        );
                        break;
                    }
                }
                if !frame_interval.is_zero() {
                    tokio::time::sleep(frame_interval).await;
                }
            }
            camera.close();
            info!(stream_name = %stream_name, "Secondary stream stopped");
        })
    }

    fn emit_event(
        &self,
        tracker: &mut EventTracker,
        frame: &Frame,
        detections: &[Detection],
        reliable: usize,
    ) {
        let action = tracker.observe(frame.timestamp_ms, reliable);
        let Some(action) = action else { return };

        let payload = json!({
            "message": format!("Current event has reference {}", tracker.reference()),
            "detection_count": detections.len(),
        });
        let result = match &action {
            EventAction::Start(reference) => {
                let _ = self
                    .session
                    .send_log("New video event defined", LogLevel::Info);
                self.session
                    .start_video_event(&self.event_label, reference, frame.timestamp_ms, payload)
            }
            EventAction::Update(reference) => self.session.update_video_event(
                &self.event_label,
                reference,
                frame.timestamp_ms,
                payload,
            ),
        };
        if let Err(e) = result {
            warn!(error = %e, "Video event emission failed");
        }
    }

    fn emit_telemetry(&self, detections: &[Detection], reliable: usize) {
        let mean_distance = if detections.is_empty() {
            0.0
        } else {
            detections.iter().map(|d| d.distance() as f64).sum::<f64>() / detections.len() as f64
        };
        let payload = json!({
            "number_of_detections": reliable,
            "mean_distance_m": mean_distance,
        });
        if let Err(e) = self.session.send_telemetry("object_detection", payload) {
            warn!(error = %e, "Telemetry emission failed");
        }
    }

    /// Close and reopen the camera with the current init parameters.
    /// Runs between grabs, under the same lock the callbacks use.
    fn reopen(&mut self) -> Result<()> {
        let params = self.open_params.read().expect("open params lock").clone();
        let _ = self
            .session
            .send_log("Init parameters changed, reopening the camera", LogLevel::Info);

        let mut camera = self.camera.lock().expect("camera lock");
        camera.close();
        camera.open(&params).map_err(|e| {
            let _ = self.session.send_log(
                format!("Camera reopen failed: {}", e),
                LogLevel::Error,
            );
            Error::Device(e)
        })?;

        self.frame_interval = Duration::from_millis(1000 / params.fps.max(1) as u64);
        info!(
            resolution = params.resolution.as_str(),
            fps = params.fps,
            "Camera reopened"
        );
        Ok(())
    }

    fn handle_grab_failure(&self, error: &crate::camera::CameraError) {
        let _ = self.session.send_log(
            format!("Grab failed, stopping the loop: {}", error),
            LogLevel::Error,
        );

        let mut camera = self.camera.lock().expect("camera lock");
        camera.close();
        match camera.reboot() {
            Ok(()) => {
                let _ = self
                    .session
                    .send_log("Camera reboot requested", LogLevel::Warning);
            }
            Err(e) => {
                let _ = self
                    .session
                    .send_log(format!("Camera reboot failed: {}", e), LogLevel::Error);
            }
        }
    }
}
