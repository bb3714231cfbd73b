use std::time::Duration;

/// Decides how long the driver waits before each reconnect
///
/// Only consulted after a failed connect or a connection the client lost
/// on its own side; a server-initiated disconnect reconnects at once.
/// Returning `None` parks the client until `connect()` or `submit()`.
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay before reconnect attempt `attempt` (0-based), `None` to give up
    fn next_delay(&self, attempt: usize) -> Option<Duration>;

    /// Called once a connection is established
    fn reset(&mut self) {}
}

fn within_limit(limit: Option<usize>, attempt: usize) -> bool {
    limit.map_or(true, |max| attempt < max)
}

/// Doubling delay with a ceiling
///
/// `initial * 2^attempt`, never more than `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<usize>,
}

impl ExponentialBackoff {
    /// `max_attempts: None` keeps retrying forever
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
        }
    }

    /// Retry forever, 1s doubling up to 5s
    pub fn unbounded() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(5), None)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if !within_limit(self.max_attempts, attempt) {
            return None;
        }

        // 2^31 seconds already dwarfs any sane ceiling
        let factor = 1u32.checked_shl(attempt.min(31) as u32).unwrap_or(u32::MAX);
        let grown = self
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);
        Some(grown.min(self.max_delay))
    }
}

/// Same delay before every attempt
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<usize>,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_attempts: Option<usize>) -> Self {
        Self { delay, max_attempts }
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        within_limit(self.max_attempts, attempt).then_some(self.delay)
    }
}

/// Go idle after the first drop
#[derive(Debug, Clone, Copy)]
pub struct NeverReconnect;

impl ReconnectionStrategy for NeverReconnect {
    fn next_delay(&self, _attempt: usize) -> Option<Duration> {
        None
    }
}
