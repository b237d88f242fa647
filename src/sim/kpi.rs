//! Post-hoc episode statistics computed from simulation results.

use std::fmt;

use super::types::StepResult;

/// Aggregate statistics derived from a complete simulation run.
///
/// Computed post-hoc from `Vec<StepResult>` so reported figures always
/// agree with the recorded steps.
#[derive(Debug, Clone, PartialEq)]
pub struct KpiReport {
    /// Vehicles that departed during the run.
    pub total_ev_served: usize,
    /// Departed vehicles whose energy shortfall was within the score threshold.
    pub evs_satisfied: usize,
    /// Grid-side energy delivered to vehicles (kWh).
    pub total_energy_charged: f64,
    /// Grid-side energy returned by vehicles (kWh).
    pub total_energy_discharged: f64,
    /// Discharge revenue minus charging cost.
    pub total_profits: f64,
    /// Mean fraction of the desired energy delivered at departure.
    pub average_user_satisfaction: f64,
    /// Sum of squared setpoint deviations (kW²).
    pub tracking_error: f64,
    /// Sum of absolute setpoint deviations times the step length (kWh).
    pub energy_tracking_error: f64,
    /// Sum of the draw above the setpoint (kW).
    pub power_tracker_violation: f64,
    /// Sum of overload magnitudes over transformers and steps.
    pub total_transformer_overload: f64,
    /// Steps with at least one overloaded transformer.
    pub overload_steps: usize,
}

impl KpiReport {
    /// Computes every statistic from the complete step record vector.
    ///
    /// # Arguments
    ///
    /// * `results` - Complete simulation step results
    /// * `score_threshold` - Shortfall (kWh) up to which a departure counts as satisfied
    pub fn from_results(results: &[StepResult], score_threshold: f64) -> Self {
        let dt_hours = match results {
            [first, second, ..] => second.time_hr - first.time_hr,
            _ => 0.0,
        };

        let mut report = Self {
            total_ev_served: 0,
            evs_satisfied: 0,
            total_energy_charged: 0.0,
            total_energy_discharged: 0.0,
            total_profits: 0.0,
            average_user_satisfaction: 0.0,
            tracking_error: 0.0,
            energy_tracking_error: 0.0,
            power_tracker_violation: 0.0,
            total_transformer_overload: 0.0,
            overload_steps: 0,
        };
        let mut satisfaction_sum = 0.0;

        for r in results {
            let err = r.tracking_error_kw;
            report.tracking_error += err * err;
            report.energy_tracking_error += err.abs() * dt_hours;
            report.power_tracker_violation += err.max(0.0);

            report.total_energy_charged += r.energy_charged_kwh;
            report.total_energy_discharged += r.energy_discharged_kwh;
            report.total_profits += r.discharge_price * r.energy_discharged_kwh
                - r.charge_price * r.energy_charged_kwh;

            report.total_transformer_overload += r.total_overload();
            if r.any_overloaded() {
                report.overload_steps += 1;
            }

            for d in &r.departures {
                report.total_ev_served += 1;
                satisfaction_sum += d.user_satisfaction();
                if d.desired_kwh - d.energy_kwh <= score_threshold {
                    report.evs_satisfied += 1;
                }
            }
        }

        if report.total_ev_served > 0 {
            report.average_user_satisfaction = satisfaction_sum / report.total_ev_served as f64;
        }
        report
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Episode Statistics ---")?;
        writeln!(
            f,
            "EVs served:              {} ({} satisfied)",
            self.total_ev_served, self.evs_satisfied
        )?;
        writeln!(f, "Energy charged:          {:.2} kWh", self.total_energy_charged)?;
        writeln!(f, "Energy discharged:       {:.2} kWh", self.total_energy_discharged)?;
        writeln!(f, "Total profits:           {:.2}", self.total_profits)?;
        writeln!(
            f,
            "User satisfaction:       {:.1}%",
            100.0 * self.average_user_satisfaction
        )?;
        writeln!(f, "Tracking error:          {:.3} kW^2", self.tracking_error)?;
        writeln!(f, "Energy tracking error:   {:.3} kWh", self.energy_tracking_error)?;
        writeln!(f, "Power tracker violation: {:.3} kW", self.power_tracker_violation)?;
        write!(
            f,
            "Transformer overload:    {:.3} ({} steps)",
            self.total_transformer_overload, self.overload_steps
        )
    }
}
