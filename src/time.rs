use std::time::{Duration, Instant};

/// Fixed-rate frame pacing for the headless driver.
pub struct Time {
    start: Instant,
    last: Instant,
    frame_budget: Duration,
    pub delta: Duration,
}

impl Time {
    pub fn new(frame_rate: u32) -> Self {
        let now = Instant::now();
        let frame_budget = if frame_rate == 0 { Duration::ZERO } else { Duration::from_secs(1) / frame_rate };
        Self { start: now, last: now, frame_budget, delta: Duration::ZERO }
    }

    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last;
        self.last = now;
    }

    /// Time left in the current frame's budget, measured from the last tick.
    pub fn remaining(&self) -> Duration {
        self.frame_budget.saturating_sub(self.last.elapsed())
    }

    pub fn frame_budget(&self) -> Duration {
        self.frame_budget
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.last.duration_since(self.start).as_secs_f32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_follows_frame_rate() {
        assert_eq!(Time::new(50).frame_budget(), Duration::from_millis(20));
        assert_eq!(Time::new(0).frame_budget(), Duration::ZERO);
    }

    #[test]
    fn remaining_never_exceeds_budget() {
        let mut time = Time::new(60);
        time.tick();
        assert!(time.remaining() <= time.frame_budget());
        assert!(time.elapsed_seconds() >= 0.0);
    }
}
