use crate::devices::types::ceil_tolerant;
use crate::sim::types::Observation;

use super::DispatchStrategy;

/// Postpones charging until the last steps that still fill the battery.
///
/// For each connected vehicle the number of steps needed at the station's
/// full power is `ceil((1 - soc) / (station_kw * dt / capacity))`. The port
/// gets full current once `current_step >= departure - min_steps`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChargeAsLateAsPossible;

impl DispatchStrategy for ChargeAsLateAsPossible {
    fn name(&self) -> &'static str {
        "charge_as_late_as_possible"
    }

    fn get_action(&mut self, observation: &Observation<'_>) -> Vec<f64> {
        let dt_hours = f64::from(observation.timescale_minutes) / 60.0;
        let step = observation.current_step;

        observation
            .ports()
            .map(|(_, cs, _, ev)| {
                let Some(ev) = ev else { return 0.0 };
                if ev.is_full() {
                    return 0.0;
                }
                let soc_per_step = cs.max_power_kw() * dt_hours / ev.battery_capacity;
                if soc_per_step <= 0.0 {
                    return 0.0;
                }
                let min_steps = ceil_tolerant((1.0 - ev.soc()) / soc_per_step) as usize;
                if step + min_steps >= ev.time_of_departure { 1.0 } else { 0.0 }
            })
            .collect()
    }
}
