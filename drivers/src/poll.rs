use crate::{HwError, HwResult};
use log::warn;
use std::hint::spin_loop;

/// Limits how long a driver busy-waits for a hardware flag.
///
/// The hardware never signals a failure on its own: a disconnected display or an unresponsive
/// I2C device just leaves the flag untouched. [PollPolicy::Bounded] turns that into a
/// [HwError::Timeout], [PollPolicy::Unbounded] spins forever like the bare-metal code does.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PollPolicy {
    /// Poll until the flag changes, however long that takes.
    Unbounded,
    /// Give up after the given amount of polls.
    Bounded { attempts: u32 },
}

impl PollPolicy {
    pub const DEFAULT_ATTEMPTS: u32 = 10_000;

    /// Creates a bounded policy, or an unbounded one for `None`.
    pub fn from_attempts(attempts: Option<u32>) -> Self {
        match attempts {
            Some(attempts) => PollPolicy::Bounded { attempts },
            None => PollPolicy::Unbounded,
        }
    }

    /// Calls `condition` until it returns `true`.
    ///
    /// Returns the number of polls it took, including the successful one. `what` names the
    /// awaited flag in the timeout error.
    pub fn wait_for(
        &self,
        what: &'static str,
        mut condition: impl FnMut() -> HwResult<bool>,
    ) -> HwResult<u32> {
        let mut polls = 0u32;
        loop {
            polls = polls.saturating_add(1);
            if condition()? {
                return Ok(polls);
            }
            if let PollPolicy::Bounded { attempts } = *self {
                if polls >= attempts {
                    warn!("Gave up waiting for {} after {} polls", what, polls);
                    return Err(HwError::Timeout(what));
                }
            }
            spin_loop();
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy::Bounded {
            attempts: Self::DEFAULT_ATTEMPTS,
        }
    }
}
