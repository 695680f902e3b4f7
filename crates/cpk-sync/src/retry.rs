//! Bounded retries with capped exponential backoff.

use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;

/// Delay sequence `base, 2*base, 4*base, ...` capped at `max`.
#[derive(Clone, Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        let next = self.current.checked_mul(2).unwrap_or(self.max);
        self.current = next.min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

/// The error a retried call finally failed with.
#[derive(Debug)]
pub struct Attempted<E> {
    pub error: E,
    pub attempts: u32,
}

/// Run `call` until it succeeds, fails with an error `transient` rejects, or
/// `config.max_attempts` is reached.
pub fn retry<T, E, F, P>(
    config: &RetryConfig,
    op: &str,
    mut call: F,
    transient: P,
) -> Result<T, Attempted<E>>
where
    E: fmt::Display,
    F: FnMut() -> Result<T, E>,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut backoff = Backoff::new(config.base_delay(), config.max_delay());
    let mut attempt = 1;
    loop {
        match call() {
            Ok(value) => return Ok(value),
            Err(error) if attempt < max_attempts && transient(&error) => {
                let delay = backoff.next_delay();
                warn!(
                    op,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "transient failure; retrying"
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(error) => {
                return Err(Attempted {
                    error,
                    attempts: attempt,
                })
            }
        }
    }
}
