use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("simulation clock cannot move backwards from {now} to {requested}")]
pub struct ClockRewind {
    pub now: i64,
    pub requested: i64,
}

/// Simulated wall clock in epoch milliseconds. Only the driver advances it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationClock {
    now: i64,
    starting_time: i64,
}

impl SimulationClock {
    pub fn new(starting_time: i64) -> Self {
        Self {
            now: starting_time,
            starting_time,
        }
    }

    pub fn now(&self) -> i64 {
        self.now
    }

    pub fn starting_time(&self) -> i64 {
        self.starting_time
    }

    pub fn advance_to(&mut self, now: i64) -> Result<(), ClockRewind> {
        if now < self.now {
            return Err(ClockRewind {
                now: self.now,
                requested: now,
            });
        }
        self.now = now;
        Ok(())
    }
}
