use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThreatState {
    pub elapsed_ms: u64,
    pub threshold_ms: u64,
}

/// Raw elapsed time against a failure horizon. Knows nothing about
/// corruption; the controller turns expiry into integrity damage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatClock {
    state: ThreatState,
}

impl ThreatClock {
    pub fn new(threshold_ms: u64) -> Self {
        Self {
            state: ThreatState {
                elapsed_ms: 0,
                threshold_ms,
            },
        }
    }

    pub fn tick(&mut self, delta_ms: u64) {
        self.state.elapsed_ms = self.state.elapsed_ms.saturating_add(delta_ms);
    }

    pub fn reward(&mut self, ms: u64) {
        self.state.elapsed_ms = self.state.elapsed_ms.saturating_sub(ms);
    }

    pub fn reset(&mut self) {
        self.state.elapsed_ms = 0;
    }

    pub fn ratio(&self) -> f32 {
        if self.state.threshold_ms == 0 {
            return 1.0;
        }
        let ratio = self.state.elapsed_ms as f64 / self.state.threshold_ms as f64;
        ratio.min(1.0) as f32
    }

    pub fn is_expired(&self) -> bool {
        self.state.elapsed_ms >= self.state.threshold_ms
    }

    pub fn remaining_ms(&self) -> u64 {
        self.state.threshold_ms.saturating_sub(self.state.elapsed_ms)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.state.elapsed_ms
    }

    pub fn threshold_ms(&self) -> u64 {
        self.state.threshold_ms
    }

    pub fn state(&self) -> ThreatState {
        self.state
    }
}
