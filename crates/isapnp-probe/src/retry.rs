//! Bounded busy-poll helper.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::port_io::PortIo;

/// A poll gave up without seeing the condition it waited for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("condition not met after {attempts} attempts")]
pub struct RetryExhausted {
    pub attempts: u32,
}

/// Fixed-ceiling poll: try, and if not ready wait `delay_ms` and try again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_ms: u32,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay_ms: u32) -> Self {
        Self {
            max_attempts,
            delay_ms,
        }
    }

    /// Run `attempt` until it yields a value or the ceiling is reached.
    ///
    /// The delay is spent through the port I/O backend so simulated buses
    /// do not sleep.
    pub fn poll<P, T>(
        &self,
        io: &mut P,
        mut attempt: impl FnMut(&mut P) -> Option<T>,
    ) -> Result<T, RetryExhausted>
    where
        P: PortIo + ?Sized,
    {
        for _ in 0..self.max_attempts {
            if let Some(value) = attempt(io) {
                return Ok(value);
            }
            io.delay_ms(self.delay_ms);
        }
        Err(RetryExhausted {
            attempts: self.max_attempts,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(isapnp_protocol::registers::DEFAULT_READY_RETRIES, 1)
    }
}
