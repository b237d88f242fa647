use rand::{Rng, rngs::StdRng};

use crate::config::DemandResponseConfig;
use crate::devices::types::gaussian;

use super::types::SimConfig;

/// Latest minute of the day at which an event may start.
const LATEST_START_MINUTE: f64 = 23.0 * 60.0;

/// Demand-response event curtailing transformer capacity for a window of steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandResponseEvent {
    /// Start timestep (inclusive).
    pub start_step: usize,
    /// End timestep (exclusive).
    pub end_step: usize,
    /// Share of the ceiling removed while the event is active, in `[0, 100]`.
    pub capacity_percentage: f64,
}

impl DemandResponseEvent {
    /// Creates a new demand-response event spanning `[start_step, end_step)`.
    ///
    /// # Panics
    ///
    /// Panics if `start_step >= end_step` or `capacity_percentage` is outside `[0, 100]`.
    pub fn new(start_step: usize, end_step: usize, capacity_percentage: f64) -> Self {
        assert!(start_step < end_step);
        assert!((0.0..=100.0).contains(&capacity_percentage));

        Self {
            start_step,
            end_step,
            capacity_percentage,
        }
    }

    /// Draws one event for calendar day `day` of the episode.
    ///
    /// The start minute is normal around `event_start_hour_mean` and clipped to
    /// `[0, 23:00]`; the length is uniform in whole minutes. Both are converted
    /// to steps relative to the episode's start time of day. Returns `None` when
    /// the window falls entirely outside the horizon.
    pub fn sample(
        cfg: &DemandResponseConfig,
        sim: &SimConfig,
        day: usize,
        rng: &mut StdRng,
    ) -> Option<Self> {
        let timescale = i64::from(sim.timescale_minutes);
        let length_minutes = i64::from(
            rng.random_range(cfg.event_length_minutes_min..=cfg.event_length_minutes_max),
        );
        let start_minute = gaussian(
            rng,
            cfg.event_start_hour_mean * 60.0,
            cfg.event_start_hour_std * 60.0,
        )
        .clamp(0.0, LATEST_START_MINUTE) as i64;
        let percentage = gaussian(
            rng,
            cfg.event_capacity_percentage_mean,
            cfg.event_capacity_percentage_std,
        )
        .clamp(0.0, 100.0);

        let day_offset = day as i64 * 1440 / timescale;
        let start = start_minute / timescale + day_offset - sim.start_step_of_day() as i64;
        let end = start + length_minutes / timescale;

        let horizon = sim.simulation_length as i64;
        let start = start.clamp(0, horizon) as usize;
        let end = end.clamp(0, horizon) as usize;
        (start < end).then(|| Self::new(start, end, percentage))
    }

    /// Returns `true` when `timestep` falls within the active window.
    pub fn is_active(&self, timestep: usize) -> bool {
        timestep >= self.start_step && timestep < self.end_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::SeedableRng;

    fn sim(start_hour: u32) -> SimConfig {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(start_hour, 0, 0)
            .unwrap();
        SimConfig::new(96, 15, start, 0)
    }

    fn fixed_cfg() -> DemandResponseConfig {
        DemandResponseConfig {
            include: true,
            events_per_day: 1,
            event_length_minutes_min: 60,
            event_length_minutes_max: 60,
            event_start_hour_mean: 12.0,
            event_start_hour_std: 0.0,
            event_capacity_percentage_mean: 30.0,
            event_capacity_percentage_std: 0.0,
        }
    }

    #[test]
    fn active_only_inside_window() {
        let event = DemandResponseEvent::new(5, 8, 20.0);
        assert!(!event.is_active(4));
        assert!(event.is_active(5));
        assert!(event.is_active(7));
        assert!(!event.is_active(8));
    }

    #[test]
    #[should_panic]
    fn percentage_above_hundred_panics() {
        DemandResponseEvent::new(0, 1, 120.0);
    }

    #[test]
    fn sample_is_relative_to_start_of_day() {
        let mut rng = StdRng::seed_from_u64(1);
        let event = DemandResponseEvent::sample(&fixed_cfg(), &sim(6), 0, &mut rng).unwrap();
        assert_eq!(event.start_step, 24);
        assert_eq!(event.end_step, 28);
        assert_eq!(event.capacity_percentage, 30.0);
    }

    #[test]
    fn sample_before_start_is_dropped() {
        let mut cfg = fixed_cfg();
        cfg.event_start_hour_mean = 2.0;
        let mut rng = StdRng::seed_from_u64(1);
        assert!(DemandResponseEvent::sample(&cfg, &sim(6), 0, &mut rng).is_none());
    }

    #[test]
    fn second_day_event_is_shifted() {
        let mut rng = StdRng::seed_from_u64(1);
        let event = DemandResponseEvent::sample(&fixed_cfg(), &sim(0), 1, &mut rng);
        assert!(event.is_none(), "96 steps of 15 min end before day two");

        let start = NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let two_days = SimConfig::new(192, 15, start, 0);
        let event = DemandResponseEvent::sample(&fixed_cfg(), &two_days, 1, &mut rng).unwrap();
        assert_eq!(event.start_step, 96 + 48);
    }
}
