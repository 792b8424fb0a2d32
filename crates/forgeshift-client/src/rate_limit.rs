//! Minimum-interval rate gate with Retry-After holds

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct GateState {
    next_allowed: Instant,
}

/// Spaces request dispatches at least `min_interval` apart, and lets a
/// `Retry-After` response push a hard "do not call before" timestamp.
/// Awaited before every request dispatch.
pub struct RateGate {
    min_interval: Duration,
    state: Mutex<GateState>,
}

impl RateGate {
    /// Build a gate from a requests-per-minute ceiling. `None` disables
    /// the interval but still honors holds.
    pub fn new(max_requests_per_minute: Option<u32>) -> Self {
        let min_interval = match max_requests_per_minute {
            Some(rpm) if rpm > 0 => Duration::from_secs_f64(60.0 / rpm as f64),
            _ => Duration::ZERO,
        };
        Self {
            min_interval,
            state: Mutex::new(GateState {
                next_allowed: Instant::now(),
            }),
        }
    }

    /// Wait until dispatch is allowed, then reserve the next slot.
    pub async fn acquire(&self) {
        let wait_until = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let slot = state.next_allowed.max(now);
            state.next_allowed = slot + self.min_interval;
            slot
        };
        tokio::time::sleep_until(wait_until).await;
    }

    /// Push the gate forward: no dispatch before `delay` from now.
    pub async fn hold_for(&self, delay: Duration) {
        let mut state = self.state.lock().await;
        let candidate = Instant::now() + delay;
        if candidate > state.next_allowed {
            state.next_allowed = candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn spaces_dispatches() {
        let gate = RateGate::new(Some(60)); // one per second
        let start = Instant::now();
        gate.acquire().await;
        gate.acquire().await;
        gate.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn hold_blocks_until_deadline() {
        let gate = RateGate::new(None);
        gate.hold_for(Duration::from_secs(5)).await;
        let start = Instant::now();
        gate.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
