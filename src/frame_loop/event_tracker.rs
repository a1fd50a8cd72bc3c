//! Video event grouping
//!
//! Consecutive detections are grouped into one logical clip identified
//! by a reference string. The reference is reused while detections keep
//! arriving; after enough empty frames in a row, the next detection
//! mints a new timestamp-derived reference.

/// Action the loop should take for the current frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    /// Begin a new event with this reference
    Start(String),
    /// Refresh the open event (update cadence elapsed)
    Update(String),
}

/// Tracks the open/closed state of the logical video event
#[derive(Debug)]
pub struct EventTracker {
    reference: String,
    first_event_sent: bool,
    frames_without_detection: u32,
    last_notified_ms: u64,
    /// Empty frames tolerated before the next detection opens a new event
    frames_between_events: u32,
    /// Seconds between update messages while an event stays open
    update_interval_s: f64,
}

impl EventTracker {
    pub fn new(frames_between_events: u32, update_interval_s: f64) -> Self {
        Self {
            reference: String::new(),
            first_event_sent: false,
            frames_without_detection: 0,
            last_notified_ms: 0,
            frames_between_events,
            update_interval_s,
        }
    }

    /// Threshold is a remote parameter; callbacks adjust it live
    pub fn set_frames_between_events(&mut self, frames: u32) {
        self.frames_between_events = frames;
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Feed one frame's detection count. Returns what to emit, if anything.
    pub fn observe(&mut self, timestamp_ms: u64, reliable_detections: usize) -> Option<EventAction> {
        if reliable_detections == 0 {
            self.frames_without_detection += 1;
            return None;
        }

        let quiet_period_over =
            self.frames_without_detection >= self.frames_between_events;
        self.frames_without_detection = 0;

        if !self.first_event_sent || quiet_period_over {
            self.reference = format!("evt-{}", timestamp_ms);
            self.first_event_sent = true;
            self.last_notified_ms = timestamp_ms;
            return Some(EventAction::Start(self.reference.clone()));
        }

        let elapsed_s = (timestamp_ms.saturating_sub(self.last_notified_ms)) as f64 / 1000.0;
        if elapsed_s >= self.update_interval_s {
            self.last_notified_ms = timestamp_ms;
            return Some(EventAction::Update(self.reference.clone()));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_detection_starts_an_event() {
        let mut tracker = EventTracker::new(10, 10.0);
        assert_eq!(tracker.observe(1000, 0), None);
        assert_eq!(
            tracker.observe(2000, 1),
            Some(EventAction::Start("evt-2000".to_string()))
        );
    }

    #[test]
    fn reference_reused_below_threshold() {
        let mut tracker = EventTracker::new(5, 100.0);
        tracker.observe(1000, 1);
        let reference = tracker.reference().to_string();

        // Four empty frames, below the threshold of five
        for ts in [1033, 1066, 1100, 1133] {
            assert_eq!(tracker.observe(ts, 0), None);
        }
        // Detection resumes: same event, no new reference
        assert_eq!(tracker.observe(1166, 2), None);
        assert_eq!(tracker.reference(), reference);
    }

    #[test]
    fn new_reference_once_threshold_met() {
        let mut tracker = EventTracker::new(3, 100.0);
        tracker.observe(1000, 1);
        let first = tracker.reference().to_string();

        for ts in [1033, 1066, 1100] {
            tracker.observe(ts, 0);
        }
        // Counter reached the threshold: next detection mints a new reference
        assert_eq!(
            tracker.observe(5000, 1),
            Some(EventAction::Start("evt-5000".to_string()))
        );
        assert_ne!(tracker.reference(), first);
    }

    #[test]
    fn update_cadence_while_event_open() {
        let mut tracker = EventTracker::new(30, 10.0);
        tracker.observe(1_000, 1);

        // Under ten seconds since the start: nothing to send
        assert_eq!(tracker.observe(6_000, 1), None);
        // Ten seconds elapsed: continuation update
        assert_eq!(
            tracker.observe(11_000, 1),
            Some(EventAction::Update("evt-1000".to_string()))
        );
        // Cadence restarts from the update
        assert_eq!(tracker.observe(15_000, 1), None);
        assert_eq!(
            tracker.observe(21_000, 1),
            Some(EventAction::Update("evt-1000".to_string()))
        );
    }

    #[test]
    fn counter_resets_on_each_detection() {
        let mut tracker = EventTracker::new(4, 100.0);
        tracker.observe(1000, 1);

        // Alternating empty/detected frames never reach the threshold
        for i in 0..20u64 {
            let ts = 1000 + 33 * (i + 1);
            let detections = if i % 2 == 0 { 0 } else { 1 };
            tracker.observe(ts, detections);
        }
        assert_eq!(tracker.reference(), "evt-1000");
    }
}
