//! Heartbeat for idle polling loops.
//!
//! An empty long-poll is normal; logging every one is noise, logging none
//! makes a healthy idle loop look dead.

/// Counts consecutive empty polls and fires once every `every` of them.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    every: u32,
    idle: u32,
}

impl Heartbeat {
    pub fn new(every: u32) -> Self {
        Self {
            every: every.max(1),
            idle: 0,
        }
    }

    /// Record one empty poll. Returns `true` when a heartbeat should be logged.
    pub fn idle(&mut self) -> bool {
        self.idle += 1;
        if self.idle >= self.every {
            self.idle = 0;
            true
        } else {
            false
        }
    }

    /// Work arrived; start counting again.
    pub fn reset(&mut self) {
        self.idle = 0;
    }
}
