//! Reset policy wrapped around each poll cycle.
//!
//! The policy never retries inside a cycle. It only decides whether the
//! owner must tear down its session before the next poll; the current
//! result goes back to the caller either way.

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Reset,
}

#[derive(Debug)]
pub struct WatchdogResetPolicy {
    scope: &'static str,
    resets: u64,
}

impl WatchdogResetPolicy {
    pub fn new(scope: &'static str) -> Self {
        Self { scope, resets: 0 }
    }

    /// Judge one finished cycle. Configuration errors are not something a
    /// fresh session can fix and never trigger a reset.
    pub fn inspect<T, F>(&mut self, outcome: &Result<T>, is_degenerate: F) -> Verdict
    where
        F: FnOnce(&T) -> bool,
    {
        let verdict = match outcome {
            Ok(value) if is_degenerate(value) => {
                log::warn!("{} poll returned no primary readings, resetting session", self.scope);
                Verdict::Reset
            }
            Ok(_) => Verdict::Keep,
            Err(error) if error.is_configuration() => Verdict::Keep,
            Err(error) => {
                log::warn!("{} poll failed ({}), resetting session", self.scope, error);
                Verdict::Reset
            }
        };

        if verdict == Verdict::Reset {
            self.resets += 1;
        }
        verdict
    }

    /// Resets ordered so far.
    pub fn resets(&self) -> u64 {
        self.resets
    }
}
