use std::time::Duration;

pub const DEFAULT_RECONNECT_DELAYS_MS: [u64; 4] = [0, 2_000, 5_000, 10_000];

/// Lower bound for the repeated delay once the schedule is exhausted.
pub const MIN_REPEAT_DELAY: Duration = Duration::from_secs(1);

/// Reconnect delay schedule. Walks the configured steps and then keeps
/// repeating the last one, never faster than [`MIN_REPEAT_DELAY`]; retries
/// never give up. An empty schedule means the default one.
#[derive(Debug, Clone)]
pub struct Backoff {
    steps: Vec<Duration>,
    attempt: usize,
}

impl Backoff {
    pub fn new(steps_ms: &[u64]) -> Self {
        let steps_ms = if steps_ms.is_empty() {
            &DEFAULT_RECONNECT_DELAYS_MS[..]
        } else {
            steps_ms
        };
        Self {
            steps: steps_ms.iter().copied().map(Duration::from_millis).collect(),
            attempt: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = match self.steps.get(self.attempt) {
            Some(step) => *step,
            None => self
                .steps
                .last()
                .map_or(MIN_REPEAT_DELAY, |last| (*last).max(MIN_REPEAT_DELAY)),
        };
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn attempt(&self) -> usize {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
