//! Trailing-edge debounce driven by caller-supplied timestamps

/// Collapses bursts of signals into one firing `delay_ms` after the last one
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay_ms: f64,
    deadline: Option<f64>,
}

impl Debouncer {
    pub fn new(delay_ms: f64) -> Self {
        Self {
            delay_ms,
            deadline: None,
        }
    }

    /// Record a signal at `now_ms`; returns the new deadline
    pub fn signal(&mut self, now_ms: f64) -> f64 {
        let deadline = now_ms + self.delay_ms;
        self.deadline = Some(deadline);
        deadline
    }

    pub fn delay_ms(&self) -> f64 {
        self.delay_ms
    }

    pub fn pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// True exactly once per burst, when `now_ms` has reached the deadline
    pub fn ready(&mut self, now_ms: f64) -> bool {
        match self.deadline {
            Some(deadline) if now_ms >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}
