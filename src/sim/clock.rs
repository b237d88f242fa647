//! Step counter for one episode.

use super::types::SimConfig;

/// A step handed out by [`EpisodeClock::tick`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub step: usize,
    /// Hours since the episode start at the beginning of the step.
    pub time_hr: f64,
    /// Set on the final step of the horizon.
    pub is_last: bool,
}

/// Hands out the steps of an episode in order, once each.
#[derive(Debug, Clone)]
pub struct EpisodeClock {
    next: usize,
    horizon: usize,
    dt_hours: f64,
}

impl EpisodeClock {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            next: 0,
            horizon: config.simulation_length,
            dt_hours: config.dt_hours,
        }
    }

    /// Claims the next step, or `None` once the horizon is exhausted.
    pub fn tick(&mut self) -> Option<Tick> {
        if self.is_finished() {
            return None;
        }
        let step = self.next;
        self.next += 1;
        Some(Tick {
            step,
            time_hr: step as f64 * self.dt_hours,
            is_last: self.next == self.horizon,
        })
    }

    /// Step the next [`tick`](Self::tick) will return.
    pub fn next_step(&self) -> usize {
        self.next
    }

    pub fn remaining(&self) -> usize {
        self.horizon.saturating_sub(self.next)
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.horizon
    }
}
