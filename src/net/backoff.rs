use std::time::Duration;

/// Seconds to wait before each reconnect attempt.
pub const DEFAULT_SCHEDULE_SECS: [u64; 11] = [5, 5, 5, 5, 10, 20, 30, 60, 120, 300, 600];

/// Walks the retry schedule; once it runs off the end there are no more attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    schedule: Vec<Duration>,
    index: usize,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_secs(&DEFAULT_SCHEDULE_SECS)
    }
}

impl Backoff {
    pub fn new(schedule: Vec<Duration>) -> Self {
        Self { schedule, index: 0 }
    }

    pub fn from_secs(schedule: &[u64]) -> Self {
        Self::new(schedule.iter().copied().map(Duration::from_secs).collect())
    }

    /// Delay before the next attempt, or `None` when the schedule is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.index = self.index.saturating_add(1);
        self.schedule.get(self.index - 1).copied()
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> usize {
        self.index
    }

    pub fn is_exhausted(&self) -> bool {
        self.index > self.schedule.len()
    }
}
