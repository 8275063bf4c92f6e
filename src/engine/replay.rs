use std::fmt;

/// Why an anti-replay sequence number was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayWindowError {
    /// Sequence number not greater than the last accepted one
    NotIncreasing { received: u32, last_accepted: u32 },

    /// Sequence number jumps past the window
    OutsideWindow {
        received: u32,
        last_accepted: u32,
        window: u32,
    },
}

impl fmt::Display for ReplayWindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayWindowError::NotIncreasing {
                received,
                last_accepted,
            } => write!(
                f,
                "Replay detected: ARSN {} not greater than {}",
                received, last_accepted
            ),
            ReplayWindowError::OutsideWindow {
                received,
                last_accepted,
                window,
            } => write!(
                f,
                "ARSN {} outside window of {} after {}",
                received, window, last_accepted
            ),
        }
    }
}

/// Receive-side anti-replay state of one security association
#[derive(Debug, Clone)]
pub struct ReplayWindow {
    /// Last accepted ARSN, `None` until the first frame
    last_accepted: Option<u32>,

    /// Largest forward jump accepted
    window: u32,
}

impl ReplayWindow {
    pub fn new(window: u32) -> Self {
        Self {
            last_accepted: None,
            window,
        }
    }

    pub fn validate(&self, arsn: u32) -> Result<(), ReplayWindowError> {
        let Some(last) = self.last_accepted else {
            return Ok(());
        };

        if arsn <= last {
            return Err(ReplayWindowError::NotIncreasing {
                received: arsn,
                last_accepted: last,
            });
        }

        if arsn - last > self.window {
            return Err(ReplayWindowError::OutsideWindow {
                received: arsn,
                last_accepted: last,
                window: self.window,
            });
        }

        Ok(())
    }

    pub fn accept(&mut self, arsn: u32) {
        self.last_accepted = Some(match self.last_accepted {
            Some(last) => last.max(arsn),
            None => arsn,
        });
    }

    pub fn last_accepted(&self) -> Option<u32> {
        self.last_accepted
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}
