use crate::sim::types::Observation;

use super::DispatchStrategy;

/// Requests full charging current on every port, every step.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChargeAsFastAsPossible;

impl DispatchStrategy for ChargeAsFastAsPossible {
    fn name(&self) -> &'static str {
        "charge_as_fast_as_possible"
    }

    fn get_action(&mut self, observation: &Observation<'_>) -> Vec<f64> {
        vec![1.0; observation.total_ports()]
    }
}

/// Charges at full current only until each vehicle holds its desired energy.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChargeAsFastAsPossibleToDesiredCapacity;

impl DispatchStrategy for ChargeAsFastAsPossibleToDesiredCapacity {
    fn name(&self) -> &'static str {
        "charge_as_fast_as_possible_to_desired_capacity"
    }

    fn get_action(&mut self, observation: &Observation<'_>) -> Vec<f64> {
        observation
            .ports()
            .map(|(_, _, _, ev)| match ev {
                Some(ev) if ev.current_energy() < ev.desired_capacity => 1.0,
                _ => 0.0,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::fixtures::{observation, park, stations};

    #[test]
    fn every_port_gets_full_current() {
        let cs = stations(2, 3);
        let setpoints = [0.0; 4];
        let actions = ChargeAsFastAsPossible.get_action(&observation(0, &setpoints, &cs, &[]));
        assert_eq!(actions, vec![1.0; 6]);
    }

    #[test]
    fn stops_at_desired_capacity() {
        let mut cs = stations(1, 3);
        let mut evs = Vec::new();
        park(&mut cs, &mut evs, 0, 0, 0.4, 10);
        park(&mut cs, &mut evs, 0, 2, 1.0, 10);
        let setpoints = [0.0; 10];

        let mut heuristic = ChargeAsFastAsPossibleToDesiredCapacity;
        let actions = heuristic.get_action(&observation(1, &setpoints, &cs, &evs));
        assert_eq!(actions, vec![1.0, 0.0, 0.0]);
    }
}
