use serde::{Deserialize, Serialize};

/// Energy values within this distance of a battery bound snap onto it.
const ENERGY_SNAP_KWH: f64 = 1e-9;

/// An electric vehicle parked (or scheduled to park) at one charging port.
///
/// Power sign convention: positive values charge the battery, negative
/// values discharge it back to the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ev {
    /// Port index within the charging station.
    pub id: usize,
    /// Charging station id.
    pub location: usize,
    /// Battery capacity in kWh.
    pub battery_capacity: f64,
    /// Stored energy when the vehicle plugs in (kWh).
    pub battery_capacity_at_arrival: f64,
    /// Energy the driver wants at departure (kWh).
    pub desired_capacity: f64,
    /// Arrival step (the vehicle is connected but draws no current during it).
    pub time_of_arrival: usize,
    /// Departure step; the vehicle leaves at the end of step `time_of_departure - 1`.
    pub time_of_departure: usize,
    /// Maximum AC charging power (kW).
    pub max_ac_charge_power: f64,
    /// Maximum discharging power magnitude (kW).
    pub max_discharge_power: f64,
    current_energy: f64,
    current_power: f64,
    total_energy_charged: f64,
    total_energy_discharged: f64,
}

impl Ev {
    /// Creates a vehicle in its arrival state.
    ///
    /// # Panics
    ///
    /// Panics if capacities are not positive, arrival energy exceeds capacity,
    /// departure is not after arrival, or power limits are negative.
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        location: usize,
        battery_capacity: f64,
        battery_capacity_at_arrival: f64,
        desired_capacity: f64,
        time_of_arrival: usize,
        time_of_departure: usize,
        max_ac_charge_power: f64,
        max_discharge_power: f64,
    ) -> Self {
        assert!(battery_capacity > 0.0);
        assert!((0.0..=battery_capacity).contains(&battery_capacity_at_arrival));
        assert!(desired_capacity >= 0.0);
        assert!(time_of_departure > time_of_arrival);
        assert!(max_ac_charge_power >= 0.0);
        assert!(max_discharge_power >= 0.0);

        Self {
            id,
            location,
            battery_capacity,
            battery_capacity_at_arrival,
            desired_capacity: desired_capacity.min(battery_capacity),
            time_of_arrival,
            time_of_departure,
            max_ac_charge_power,
            max_discharge_power,
            current_energy: battery_capacity_at_arrival,
            current_power: 0.0,
            total_energy_charged: 0.0,
            total_energy_discharged: 0.0,
        }
    }

    /// Returns `true` when the record satisfies the invariants [`Ev::new`]
    /// enforces. Records read from a replay bypass the constructor.
    pub fn is_valid(&self) -> bool {
        let capacity = self.battery_capacity;
        capacity.is_finite()
            && capacity > 0.0
            && (0.0..=capacity).contains(&self.battery_capacity_at_arrival)
            && (0.0..=capacity).contains(&self.desired_capacity)
            && (0.0..=capacity).contains(&self.current_energy)
            && self.time_of_departure > self.time_of_arrival
            && self.max_ac_charge_power >= 0.0
            && self.max_ac_charge_power.is_finite()
            && self.max_discharge_power >= 0.0
            && self.max_discharge_power.is_finite()
    }

    /// Restores the arrival state, discarding any simulated charging.
    pub fn reset(&mut self) {
        self.current_energy = self.battery_capacity_at_arrival;
        self.current_power = 0.0;
        self.total_energy_charged = 0.0;
        self.total_energy_discharged = 0.0;
    }

    /// Moves the departure earlier. Ignored unless `step` lies strictly
    /// inside the stay.
    pub fn depart_earlier(&mut self, step: usize) {
        if step > self.time_of_arrival && step < self.time_of_departure {
            self.time_of_departure = step;
        }
    }

    /// Stored energy in kWh.
    pub fn current_energy(&self) -> f64 {
        self.current_energy
    }

    /// Power applied during the last committed step (kW).
    pub fn current_power(&self) -> f64 {
        self.current_power
    }

    pub fn total_energy_charged(&self) -> f64 {
        self.total_energy_charged
    }

    pub fn total_energy_discharged(&self) -> f64 {
        self.total_energy_discharged
    }

    /// State of charge in `[0, 1]`.
    pub fn soc(&self) -> f64 {
        self.current_energy / self.battery_capacity
    }

    pub fn is_full(&self) -> bool {
        self.current_energy >= self.battery_capacity
    }

    /// Returns `true` while `step` is inside `[arrival, departure)`.
    pub fn is_parked_at(&self, step: usize) -> bool {
        step >= self.time_of_arrival && step < self.time_of_departure
    }

    /// Energy still missing to reach the desired capacity (kWh, never negative).
    pub fn energy_shortfall(&self) -> f64 {
        (self.desired_capacity - self.current_energy).max(0.0)
    }

    /// Fraction of the desired energy delivered, capped at 1.
    pub fn user_satisfaction(&self) -> f64 {
        if self.desired_capacity <= 0.0 {
            1.0
        } else {
            (self.current_energy / self.desired_capacity).min(1.0)
        }
    }

    /// Clamps a requested grid-side power to what the battery accepts in one step.
    ///
    /// # Arguments
    ///
    /// * `requested_kw` - Signed grid-side power request
    /// * `efficiency` - Conversion efficiency for the request's direction
    /// * `dt_hours` - Step length in hours
    pub fn feasible_power_kw(&self, requested_kw: f64, efficiency: f64, dt_hours: f64) -> f64 {
        let scale = efficiency * dt_hours;
        if requested_kw > 0.0 {
            let headroom = (self.battery_capacity - self.current_energy).max(0.0) / scale;
            requested_kw.min(self.max_ac_charge_power).min(headroom)
        } else if requested_kw < 0.0 {
            let available = self.current_energy.max(0.0) / scale;
            requested_kw.max(-self.max_discharge_power).max(-available)
        } else {
            0.0
        }
    }

    /// Commits one step at `power_kw`, moving `power_kw * efficiency * dt` kWh.
    pub fn commit(&mut self, power_kw: f64, efficiency: f64, dt_hours: f64) {
        let delta = power_kw * efficiency * dt_hours;
        let mut energy = (self.current_energy + delta).clamp(0.0, self.battery_capacity);
        if self.battery_capacity - energy < ENERGY_SNAP_KWH {
            energy = self.battery_capacity;
        } else if energy < ENERGY_SNAP_KWH {
            energy = 0.0;
        }

        if power_kw > 0.0 {
            self.total_energy_charged += power_kw * dt_hours;
        } else {
            self.total_energy_discharged += -power_kw * dt_hours;
        }
        self.current_energy = energy;
        self.current_power = power_kw;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ev() -> Ev {
        Ev::new(0, 0, 50.0, 10.0, 40.0, 2, 10, 22.0, 11.0)
    }

    #[test]
    fn new_starts_at_arrival_energy() {
        let ev = ev();
        assert_relative_eq!(ev.soc(), 0.2);
        assert_eq!(ev.current_power(), 0.0);
        assert!(!ev.is_full());
    }

    #[test]
    #[should_panic]
    fn departure_must_follow_arrival() {
        let _ = Ev::new(0, 0, 50.0, 10.0, 40.0, 5, 5, 22.0, 11.0);
    }

    #[test]
    fn validity_mirrors_constructor() {
        assert!(ev().is_valid());

        let mut bad = ev();
        bad.battery_capacity = 0.0;
        assert!(!bad.is_valid());

        let mut bad = ev();
        bad.desired_capacity = 60.0;
        assert!(!bad.is_valid());

        let mut bad = ev();
        bad.time_of_departure = bad.time_of_arrival;
        assert!(!bad.is_valid());

        let mut bad = ev();
        bad.max_discharge_power = f64::NAN;
        assert!(!bad.is_valid());
    }

    #[test]
    fn parked_window_is_half_open() {
        let ev = ev();
        assert!(!ev.is_parked_at(1));
        assert!(ev.is_parked_at(2));
        assert!(ev.is_parked_at(9));
        assert!(!ev.is_parked_at(10));
    }

    #[test]
    fn feasible_power_respects_limits() {
        let ev = ev();
        assert_eq!(ev.feasible_power_kw(30.0, 1.0, 0.25), 22.0);
        assert_eq!(ev.feasible_power_kw(-30.0, 1.0, 0.25), -11.0);

        let nearly_full = Ev::new(0, 0, 50.0, 49.0, 50.0, 0, 4, 22.0, 11.0);
        assert_relative_eq!(nearly_full.feasible_power_kw(22.0, 1.0, 0.25), 4.0);

        let nearly_empty = Ev::new(0, 0, 50.0, 1.0, 50.0, 0, 4, 22.0, 11.0);
        assert_relative_eq!(nearly_empty.feasible_power_kw(-22.0, 0.5, 0.25), -8.0);
    }

    #[test]
    fn commit_tracks_energy_and_totals() {
        let mut ev = ev();
        ev.commit(20.0, 0.9, 0.25);
        assert_relative_eq!(ev.current_energy(), 14.5);
        assert_relative_eq!(ev.total_energy_charged(), 5.0);

        ev.commit(-10.0, 1.0, 0.5);
        assert_relative_eq!(ev.current_energy(), 9.5);
        assert_relative_eq!(ev.total_energy_discharged(), 5.0);
    }

    #[test]
    fn commit_snaps_to_full() {
        let mut ev = Ev::new(0, 0, 50.0, 49.0, 50.0, 0, 4, 22.0, 11.0);
        let p = ev.feasible_power_kw(22.0, 0.9, 0.25);
        ev.commit(p, 0.9, 0.25);
        assert!(ev.is_full());
        assert_eq!(ev.current_energy(), 50.0);
    }

    #[test]
    fn early_departure_only_shortens() {
        let mut ev = ev();
        ev.depart_earlier(12);
        assert_eq!(ev.time_of_departure, 10);
        ev.depart_earlier(2);
        assert_eq!(ev.time_of_departure, 10);
        ev.depart_earlier(6);
        assert_eq!(ev.time_of_departure, 6);
    }

    #[test]
    fn reset_restores_arrival_state() {
        let mut ev = ev();
        ev.commit(22.0, 1.0, 0.25);
        ev.reset();
        assert_eq!(ev.current_energy(), 10.0);
        assert_eq!(ev.total_energy_charged(), 0.0);
    }

    #[test]
    fn satisfaction_is_capped() {
        let mut ev = ev();
        assert_relative_eq!(ev.user_satisfaction(), 0.25);
        ev.commit(22.0, 1.0, 2.0);
        assert_eq!(ev.user_satisfaction(), 1.0);
        assert_eq!(ev.energy_shortfall(), 0.0);
    }
}
