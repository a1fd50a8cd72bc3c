//! Simulated stereo camera
//!
//! Deterministic frame source standing in for the vendor SDK. Detection
//! activity is driven by a frame-indexed script so loop behavior (event
//! grouping, telemetry cadence, grab failure) can be exercised without
//! hardware. Positions get a small seeded jitter so telemetry values move.

use super::{
    CameraDevice, CameraError, CameraInfo, Detection, Frame, OpenParameters, TrackingState,
    VideoSetting,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// A window of frames during which objects are visible
#[derive(Debug, Clone)]
pub struct DetectionWindow {
    /// First frame index (inclusive)
    pub from_frame: u64,
    /// Last frame index (inclusive)
    pub to_frame: u64,
    /// Number of tracked objects reported per frame
    pub count: usize,
}

/// Scripted behavior for the simulated device
#[derive(Debug, Clone, Default)]
pub struct SimScript {
    pub windows: Vec<DetectionWindow>,
    /// Grab fails permanently once this frame index is reached
    pub fail_at_frame: Option<u64>,
}

impl SimScript {
    fn detections_at(&self, frame: u64) -> usize {
        self.windows
            .iter()
            .find(|w| frame >= w.from_frame && frame <= w.to_frame)
            .map(|w| w.count)
            .unwrap_or(0)
    }
}

pub struct SimulatedCamera {
    info: CameraInfo,
    script: SimScript,
    params: OpenParameters,
    settings: HashMap<VideoSetting, i32>,
    rng: StdRng,
    opened: bool,
    streaming: bool,
    sequence: u64,
    base_timestamp_ms: u64,
}

impl SimulatedCamera {
    pub fn new(serial_number: u32, script: SimScript) -> Self {
        Self {
            info: CameraInfo {
                serial_number,
                model: "sim-stereo".to_string(),
                firmware_version: "1.0.0-sim".to_string(),
            },
            script,
            params: OpenParameters::default(),
            settings: HashMap::new(),
            rng: StdRng::seed_from_u64(serial_number as u64),
            opened: false,
            streaming: false,
            sequence: 0,
            base_timestamp_ms: 1_700_000_000_000,
        }
    }

    fn frame_interval_ms(&self) -> u64 {
        1000 / self.params.fps.max(1) as u64
    }
}

impl CameraDevice for SimulatedCamera {
    fn open(&mut self, params: &OpenParameters) -> Result<(), CameraError> {
        if self.opened {
            return Err(CameraError::AlreadyOpened);
        }
        self.params = params.clone();
        self.opened = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.opened
    }

    fn grab(&mut self) -> Result<Frame, CameraError> {
        if !self.opened {
            return Err(CameraError::NotOpened);
        }
        if let Some(fail_at) = self.script.fail_at_frame {
            if self.sequence >= fail_at {
                return Err(CameraError::DeviceDisconnected);
            }
        }
        let (width, height) = self.params.resolution.dimensions();
        let frame = Frame {
            sequence: self.sequence,
            timestamp_ms: self.current_timestamp_ms(),
            width,
            height,
        };
        self.sequence += 1;
        Ok(frame)
    }

    fn retrieve_detections(&mut self) -> Result<Vec<Detection>, CameraError> {
        if !self.opened {
            return Err(CameraError::NotOpened);
        }
        // sequence was already advanced by grab()
        let frame = self.sequence.saturating_sub(1);
        let count = self.script.detections_at(frame);
        let mut detections = Vec::with_capacity(count);
        for i in 0..count {
            let base_z = 2.0 + i as f32;
            let jitter: f32 = self.rng.gen_range(-0.1..0.1);
            detections.push(Detection {
                id: i as u32,
                label: "person".to_string(),
                confidence: self.rng.gen_range(0.6..0.99),
                position: [jitter, 0.0, base_z + jitter],
                bounding_box: Some([[100.0 * i as f32, 80.0], [100.0 * i as f32 + 60.0, 220.0]]),
                tracking_state: TrackingState::Ok,
            });
        }
        Ok(detections)
    }

    fn current_timestamp_ms(&self) -> u64 {
        self.base_timestamp_ms + self.sequence * self.frame_interval_ms()
    }

    fn get_setting(&self, setting: VideoSetting) -> Result<i32, CameraError> {
        if !self.opened {
            return Err(CameraError::NotOpened);
        }
        Ok(*self.settings.get(&setting).unwrap_or(&0))
    }

    fn set_setting(&mut self, setting: VideoSetting, value: i32) -> Result<(), CameraError> {
        if !self.opened {
            return Err(CameraError::NotOpened);
        }
        if matches!(setting, VideoSetting::Gamma | VideoSetting::Gain) && value < 0 {
            return Err(CameraError::InvalidSetting(format!(
                "{} must be non-negative",
                setting.as_str()
            )));
        }
        self.settings.insert(setting, value);
        Ok(())
    }

    fn set_streaming(&mut self, enabled: bool) -> Result<(), CameraError> {
        if !self.opened {
            return Err(CameraError::NotOpened);
        }
        self.streaming = enabled;
        Ok(())
    }

    fn info(&self) -> CameraInfo {
        self.info.clone()
    }

    fn close(&mut self) {
        self.opened = false;
        self.streaming = false;
    }

    fn reboot(&mut self) -> Result<(), CameraError> {
        self.opened = false;
        self.streaming = false;
        self.sequence = 0;
        self.script.fail_at_frame = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened(script: SimScript) -> SimulatedCamera {
        let mut cam = SimulatedCamera::new(42, script);
        cam.open(&OpenParameters::default()).unwrap();
        cam
    }

    #[test]
    fn grab_before_open_fails() {
        let mut cam = SimulatedCamera::new(1, SimScript::default());
        assert_eq!(cam.grab().unwrap_err(), CameraError::NotOpened);
    }

    #[test]
    fn timestamps_advance_with_fps() {
        let mut cam = opened(SimScript::default());
        let a = cam.grab().unwrap();
        let b = cam.grab().unwrap();
        // 30 fps default
        assert_eq!(b.timestamp_ms - a.timestamp_ms, 33);
    }

    #[test]
    fn scripted_detections_and_failure() {
        let mut cam = opened(SimScript {
            windows: vec![DetectionWindow {
                from_frame: 1,
                to_frame: 2,
                count: 2,
            }],
            fail_at_frame: Some(4),
        });

        cam.grab().unwrap();
        assert!(cam.retrieve_detections().unwrap().is_empty());

        cam.grab().unwrap();
        assert_eq!(cam.retrieve_detections().unwrap().len(), 2);

        cam.grab().unwrap();
        cam.grab().unwrap();
        assert_eq!(cam.grab().unwrap_err(), CameraError::DeviceDisconnected);
    }

    #[test]
    fn reboot_clears_failure() {
        let mut cam = opened(SimScript {
            windows: vec![],
            fail_at_frame: Some(0),
        });
        assert!(cam.grab().is_err());
        cam.reboot().unwrap();
        cam.open(&OpenParameters::default()).unwrap();
        assert!(cam.grab().is_ok());
    }
}
