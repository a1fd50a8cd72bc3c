//! Telemetry cadence gate
//!
//! Telemetry goes out when the camera clock has advanced at least the
//! configured number of seconds past the previous emission. The stored
//! timestamp moves only when something is actually sent, so a lowered
//! frequency takes effect from the last emission, not from "now".

#[derive(Debug)]
pub struct TelemetryGate {
    previous_timestamp_ms: u64,
}

impl TelemetryGate {
    /// `start_ms` is the camera clock at loop start; the first emission
    /// happens one full period after it.
    pub fn new(start_ms: u64) -> Self {
        Self {
            previous_timestamp_ms: start_ms,
        }
    }

    pub fn ready(&self, current_ms: u64, frequency_s: f64) -> bool {
        let current_s = current_ms as f64 / 1000.0;
        let previous_s = self.previous_timestamp_ms as f64 / 1000.0;
        current_s >= previous_s + frequency_s
    }

    pub fn mark_sent(&mut self, current_ms: u64) {
        self.previous_timestamp_ms = current_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_opens_after_one_period() {
        let gate = TelemetryGate::new(10_000);
        assert!(!gate.ready(10_500, 1.0));
        assert!(!gate.ready(10_999, 1.0));
        assert!(gate.ready(11_000, 1.0));
        assert!(gate.ready(15_000, 1.0));
    }

    #[test]
    fn previous_timestamp_moves_only_on_send() {
        let mut gate = TelemetryGate::new(0);
        assert!(gate.ready(2_000, 2.0));
        // Not sent yet: still ready on the next frame
        assert!(gate.ready(2_033, 2.0));

        gate.mark_sent(2_033);
        assert!(!gate.ready(3_000, 2.0));
        assert!(gate.ready(4_033, 2.0));
    }

    #[test]
    fn fractional_frequency() {
        let mut gate = TelemetryGate::new(1_000);
        assert!(!gate.ready(1_400, 0.5));
        assert!(gate.ready(1_500, 0.5));
        gate.mark_sent(1_500);
        assert!(gate.ready(2_000, 0.5));
    }
}
