//! Reference power-tracking model of a captured episode.
//!
//! Given an [`EpisodeTrajectory`], the model chooses every port current over
//! the whole horizon so that the aggregate vehicle power follows the
//! setpoints as closely as possible (least squares), subject to the station,
//! vehicle and transformer limits the simulator enforces. Its optimum is the
//! benchmark the dispatch heuristics are compared against.
//!
//! Variables, per port `p` of station `i` at step `t`:
//!
//! * `current_ev_ch.p.i.t` / `current_ev_dis.p.i.t`: charge (>= 0) and
//!   discharge (<= 0) currents,
//! * `omega_ch.p.i.t` / `omega_dis.p.i.t`: binary mode indicators,
//! * `energy.p.i.t`: stored energy at the end of step `t`.
//!
//! Station currents `current_cs_ch.i.t` / `current_cs_dis.i.t`, transformer
//! current and power `current_tr.j.t` / `power_tr.j.t` and the tracking
//! residual `power_error.t` complete the model.

use tracing::info;

use super::miqp::{LinearExpr, MiqpModel, Sense, VarId};
use super::solver::{MiqpSolution, MiqpSolver};
use crate::devices::LimitMode;
use crate::devices::types::{REFERENCE_VOLTAGE, effective_voltage};
use crate::error::{SimError, SolverError};
use crate::sim::replay::{EpisodeTrajectory, PortSeries};
use crate::sim::types::StepResult;

/// Dense variable table over `[port, station, step]`.
#[derive(Debug, Clone)]
struct PortVars {
    n_stations: usize,
    len: usize,
    ids: Vec<VarId>,
}

impl PortVars {
    /// Adds one variable per slot, named `prefix.p.i.t`.
    fn add(
        m: &mut MiqpModel,
        prefix: &str,
        (n_ports, n_stations, len): (usize, usize, usize),
        mut make: impl FnMut(&mut MiqpModel, String, usize) -> VarId,
    ) -> Self {
        let mut ids = Vec::with_capacity(n_ports * n_stations * len);
        for p in 0..n_ports {
            for i in 0..n_stations {
                for t in 0..len {
                    ids.push(make(m, format!("{prefix}.{p}.{i}.{t}"), i));
                }
            }
        }
        Self {
            n_stations,
            len,
            ids,
        }
    }

    fn at(&self, p: usize, i: usize, t: usize) -> VarId {
        self.ids[(p * self.n_stations + i) * self.len + t]
    }
}

/// The reference model together with the handles needed to read solutions.
#[derive(Debug, Clone)]
pub struct PowerTrackerModel {
    model: MiqpModel,
    len: usize,
    n_ports: Vec<usize>,
    max_charge_current: Vec<f64>,
    max_discharge_current: Vec<f64>,
    effective_voltage: Vec<f64>,
    cs_transformer: Vec<usize>,
    n_transformers: usize,
    setpoints: Vec<f64>,
    u: Vec<Vec<Vec<bool>>>,
    t_dep: Vec<Vec<Vec<bool>>>,
    energy: PortVars,
    current_ev_ch: PortVars,
    current_ev_dis: PortVars,
    omega_ch: PortVars,
    omega_dis: PortVars,
    current_cs_ch: Vec<Vec<VarId>>,
    current_cs_dis: Vec<Vec<VarId>>,
    current_tr: Vec<Vec<VarId>>,
    power_tr: Vec<Vec<VarId>>,
    power_error: Vec<VarId>,
}

impl PowerTrackerModel {
    /// Builds the model of a trajectory.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Trajectory` if the trajectory is inconsistent.
    pub fn build(trajectory: &EpisodeTrajectory) -> Result<Self, SimError> {
        trajectory.validate()?;
        let len = trajectory.simulation_length;
        let n_cs = trajectory.n_stations;
        let n_tr = trajectory.n_transformers;
        let max_ports = trajectory.max_n_ports;
        let dt = trajectory.dt_hours();
        let specs = &trajectory.stations;
        let veff: Vec<f64> = specs
            .iter()
            .map(|s| effective_voltage(s.voltage, s.phases))
            .collect();

        let mut m = MiqpModel::new("ev_city_power_tracker");

        let shape = (max_ports, n_cs, len);
        let energy = PortVars::add(&mut m, "energy", shape, |m, name, _| {
            m.add_continuous(name, 0.0, f64::INFINITY)
        });
        let current_ev_ch = PortVars::add(&mut m, "current_ev_ch", shape, |m, name, i| {
            m.add_continuous(name, 0.0, specs[i].max_charge_current)
        });
        let current_ev_dis = PortVars::add(&mut m, "current_ev_dis", shape, |m, name, i| {
            m.add_continuous(name, specs[i].max_discharge_current, 0.0)
        });
        let omega_ch = PortVars::add(&mut m, "omega_ch", shape, |m, name, _| m.add_binary(name));
        let omega_dis = PortVars::add(&mut m, "omega_dis", shape, |m, name, _| m.add_binary(name));

        let current_cs_ch: Vec<Vec<VarId>> = (0..n_cs)
            .map(|i| {
                (0..len)
                    .map(|t| {
                        m.add_continuous(
                            format!("current_cs_ch.{i}.{t}"),
                            0.0,
                            specs[i].max_charge_current,
                        )
                    })
                    .collect()
            })
            .collect();
        let current_cs_dis: Vec<Vec<VarId>> = (0..n_cs)
            .map(|i| {
                (0..len)
                    .map(|t| {
                        m.add_continuous(
                            format!("current_cs_dis.{i}.{t}"),
                            specs[i].max_discharge_current,
                            0.0,
                        )
                    })
                    .collect()
            })
            .collect();
        let free = |m: &mut MiqpModel, name: String| {
            m.add_continuous(name, f64::NEG_INFINITY, f64::INFINITY)
        };
        let current_tr: Vec<Vec<VarId>> = (0..n_tr)
            .map(|j| (0..len).map(|t| free(&mut m, format!("current_tr.{j}.{t}"))).collect())
            .collect();
        let power_tr: Vec<Vec<VarId>> = (0..n_tr)
            .map(|j| (0..len).map(|t| free(&mut m, format!("power_tr.{j}.{t}"))).collect())
            .collect();
        let power_error: Vec<VarId> = (0..len)
            .map(|t| free(&mut m, format!("power_error.{t}")))
            .collect();

        // Transformer aggregation and limits, offset by the background load.
        for j in 0..n_tr {
            let series = &trajectory.transformers[j];
            for t in 0..len {
                let mut amps = LinearExpr::new().term(current_tr[j][t], 1.0);
                let mut power = LinearExpr::new().term(power_tr[j][t], 1.0);
                for i in (0..n_cs).filter(|&i| trajectory.cs_transformer[i] == j) {
                    amps.add_term(current_cs_ch[i][t], -1.0);
                    amps.add_term(current_cs_dis[i][t], -1.0);
                    power.add_term(current_cs_ch[i][t], -veff[i] / 1000.0);
                    power.add_term(current_cs_dis[i][t], -veff[i] / 1000.0);
                }
                m.add_constraint(format!("tr_current.{j}.{t}"), amps, Sense::Eq, 0.0);
                m.add_constraint(format!("power_tr.{j}.{t}"), power, Sense::Eq, 0.0);

                let load = series.inflexible_load[t];
                let (var, lo, hi) = match trajectory.transformer_mode[j] {
                    LimitMode::Current => {
                        let load_amps = load * 1000.0 / REFERENCE_VOLTAGE;
                        (
                            current_tr[j][t],
                            series.min_current[t] - load_amps,
                            series.max_current[t] - load_amps,
                        )
                    }
                    LimitMode::Power => (
                        power_tr[j][t],
                        series.min_power[t] - load,
                        series.max_power[t] - load,
                    ),
                };
                let expr = LinearExpr::new().term(var, 1.0);
                m.add_constraint(format!("tr_limit_max.{j}.{t}"), expr.clone(), Sense::Le, hi);
                m.add_constraint(format!("tr_limit_min.{j}.{t}"), expr, Sense::Ge, lo);
            }
        }

        // Station currents are the sum of their ports.
        for i in 0..n_cs {
            for t in 0..len {
                let mut ch = LinearExpr::new().term(current_cs_ch[i][t], 1.0);
                let mut dis = LinearExpr::new().term(current_cs_dis[i][t], 1.0);
                for p in 0..max_ports {
                    ch.add_term(current_ev_ch.at(p, i, t), -1.0);
                    dis.add_term(current_ev_dis.at(p, i, t), -1.0);
                }
                m.add_constraint(format!("cs_current_output_ch.{i}.{t}"), ch, Sense::Eq, 0.0);
                m.add_constraint(format!("cs_current_output_dis.{i}.{t}"), dis, Sense::Eq, 0.0);
            }
        }

        for p in 0..max_ports {
            for i in 0..n_cs {
                let spec = &specs[i];
                for t in 0..len {
                    let ch = current_ev_ch.at(p, i, t);
                    let dis = current_ev_dis.at(p, i, t);
                    let o_ch = omega_ch.at(p, i, t);
                    let o_dis = omega_dis.at(p, i, t);
                    let e = energy.at(p, i, t);
                    let occupied = trajectory.u.is_set(p, i, t);
                    let arriving = trajectory.ev_arrival.is_set(p, i, t);
                    let departed = trajectory.t_dep.is_set(p, i, t);

                    // Vehicle power limits, only while schedulable.
                    if occupied && !arriving {
                        let ch_limit = trajectory.ev_max_ch_power.get(p, i, t) * 1000.0 / veff[i];
                        let dis_limit = trajectory.ev_max_dis_power.get(p, i, t) * 1000.0 / veff[i];
                        m.add_constraint(
                            format!("ev_ch_power_max.{p}.{i}.{t}"),
                            LinearExpr::new().term(ch, 1.0),
                            Sense::Le,
                            ch_limit,
                        );
                        m.add_constraint(
                            format!("ev_dis_power_max.{p}.{i}.{t}"),
                            LinearExpr::new().term(dis, 1.0),
                            Sense::Ge,
                            dis_limit,
                        );
                    } else {
                        m.add_constraint(
                            format!("ev_empty_port_ch.{p}.{i}.{t}"),
                            LinearExpr::new().term(ch, 1.0),
                            Sense::Eq,
                            0.0,
                        );
                        m.add_constraint(
                            format!("ev_empty_port_dis.{p}.{i}.{t}"),
                            LinearExpr::new().term(dis, 1.0),
                            Sense::Eq,
                            0.0,
                        );
                    }

                    // Mode indicators gate the currents.
                    m.add_constraint(
                        format!("ev_current_ch_on.{p}.{i}.{t}"),
                        LinearExpr::new().term(ch, 1.0).term(o_ch, -spec.max_charge_current),
                        Sense::Le,
                        0.0,
                    );
                    m.add_constraint(
                        format!("ev_current_ch_limit_min.{p}.{i}.{t}"),
                        LinearExpr::new().term(ch, 1.0).term(o_ch, -spec.min_charge_current),
                        Sense::Ge,
                        0.0,
                    );
                    m.add_constraint(
                        format!("ev_current_dis_on.{p}.{i}.{t}"),
                        LinearExpr::new().term(dis, 1.0).term(o_dis, -spec.max_discharge_current),
                        Sense::Ge,
                        0.0,
                    );
                    m.add_constraint(
                        format!("ev_current_dis_limit_min.{p}.{i}.{t}"),
                        LinearExpr::new().term(dis, 1.0).term(o_dis, -spec.min_discharge_current),
                        Sense::Le,
                        0.0,
                    );
                    m.add_constraint(
                        format!("ev_power_mode.{p}.{i}.{t}"),
                        LinearExpr::new().term(o_ch, 1.0).term(o_dis, 1.0),
                        Sense::Le,
                        1.0,
                    );

                    // Energy bookkeeping.
                    if arriving {
                        m.add_constraint(
                            format!("ev_arrival_energy.{p}.{i}.{t}"),
                            LinearExpr::new().term(e, 1.0),
                            Sense::Eq,
                            trajectory.energy_at_arrival.get(p, i, t),
                        );
                    } else if t > 0 && trajectory.u.is_set(p, i, t - 1) {
                        let scale = dt * veff[i] / 1000.0;
                        m.add_constraint(
                            format!("ev_energy.{p}.{i}.{t}"),
                            LinearExpr::new()
                                .term(e, 1.0)
                                .term(energy.at(p, i, t - 1), -1.0)
                                .term(ch, -scale * trajectory.cs_ch_efficiency[i][t])
                                .term(dis, -scale * trajectory.cs_dis_efficiency[i][t]),
                            Sense::Eq,
                            0.0,
                        );
                    } else if !occupied && !departed {
                        m.add_constraint(
                            format!("ev_empty_port_energy.{p}.{i}.{t}"),
                            LinearExpr::new().term(e, 1.0),
                            Sense::Eq,
                            0.0,
                        );
                    }
                    if !departed {
                        m.add_constraint(
                            format!("ev_energy_level_max.{p}.{i}.{t}"),
                            LinearExpr::new().term(e, 1.0),
                            Sense::Le,
                            trajectory.ev_max_energy.get(p, i, t),
                        );
                    }
                }
            }
        }

        // Tracking residual and least-squares objective.
        for t in 0..len {
            let mut expr = LinearExpr::new().term(power_error[t], 1.0);
            for row in &power_tr {
                expr.add_term(row[t], -1.0);
            }
            m.add_constraint(
                format!("power_error.{t}"),
                expr,
                Sense::Eq,
                -trajectory.power_setpoints[t],
            );
            m.add_squared_objective(LinearExpr::new().term(power_error[t], 1.0));
        }

        info!(
            variables = m.num_variables(),
            binaries = m.num_binaries(),
            constraints = m.constraints().len(),
            "reference model built"
        );

        let marks = |series: &PortSeries| -> Vec<Vec<Vec<bool>>> {
            (0..n_cs)
                .map(|i| {
                    (0..max_ports)
                        .map(|p| (0..len).map(|t| series.is_set(p, i, t)).collect())
                        .collect()
                })
                .collect()
        };

        Ok(Self {
            len,
            n_ports: specs.iter().map(|s| s.n_ports).collect(),
            max_charge_current: specs.iter().map(|s| s.max_charge_current).collect(),
            max_discharge_current: specs.iter().map(|s| s.max_discharge_current).collect(),
            effective_voltage: veff,
            cs_transformer: trajectory.cs_transformer.clone(),
            n_transformers: n_tr,
            setpoints: trajectory.power_setpoints.clone(),
            u: marks(&trajectory.u),
            t_dep: marks(&trajectory.t_dep),
            model: m,
            energy,
            current_ev_ch,
            current_ev_dis,
            omega_ch,
            omega_dis,
            current_cs_ch,
            current_cs_dis,
            current_tr,
            power_tr,
            power_error,
        })
    }

    pub fn model(&self) -> &MiqpModel {
        &self.model
    }

    /// Hands the model to a solver and checks the returned dimensions.
    pub fn solve<S: MiqpSolver + ?Sized>(&self, solver: &mut S) -> Result<MiqpSolution, SolverError> {
        let solution = solver.solve(&self.model)?;
        if solution.values.len() != self.model.num_variables() {
            return Err(SolverError::DimensionMismatch {
                expected: self.model.num_variables(),
                actual: solution.values.len(),
            });
        }
        info!(
            solver = solver.name(),
            status = %solution.status,
            objective = solution.objective,
            "reference model solved"
        );
        Ok(solution)
    }

    /// Per-step action vectors (station-major) replaying a solution.
    ///
    /// Port currents are normalized by the station's charge or discharge limit.
    pub fn actions(&self, solution: &MiqpSolution) -> Vec<Vec<f64>> {
        (0..self.len)
            .map(|t| {
                let mut actions = Vec::new();
                for (i, &n_ports) in self.n_ports.iter().enumerate() {
                    for p in 0..n_ports {
                        let ch = solution.value(self.current_ev_ch.at(p, i, t));
                        let dis = solution.value(self.current_ev_dis.at(p, i, t));
                        let action = if ch > 0.0 {
                            ch / self.max_charge_current[i]
                        } else if dis < 0.0 && self.max_discharge_current[i] < 0.0 {
                            dis / self.max_discharge_current[i].abs()
                        } else {
                            0.0
                        };
                        actions.push(action.clamp(-1.0, 1.0));
                    }
                }
                actions
            })
            .collect()
    }

    /// Builds the model assignment matching a simulated run.
    ///
    /// Energies at a departure mark take the value of the last occupied step.
    ///
    /// # Errors
    ///
    /// `SolverError::DimensionMismatch` if the results do not cover the
    /// horizon or the port layout.
    pub fn assignment_from_results(&self, results: &[StepResult]) -> Result<Vec<f64>, SolverError> {
        if results.len() != self.len {
            return Err(SolverError::DimensionMismatch {
                expected: self.len,
                actual: results.len(),
            });
        }
        let total_ports: usize = self.n_ports.iter().sum();
        if let Some(r) = results.iter().find(|r| {
            r.port_currents.len() != total_ports || r.port_energies.len() != total_ports
        }) {
            return Err(SolverError::DimensionMismatch {
                expected: total_ports,
                actual: r.port_currents.len(),
            });
        }

        let mut values = vec![0.0; self.model.num_variables()];
        let mut set = |var: VarId, value: f64| values[var.index()] = value;

        for (t, r) in results.iter().enumerate() {
            let mut tr_amps = vec![0.0; self.n_transformers];
            let mut tr_power = vec![0.0; self.n_transformers];
            let mut offset = 0;
            for (i, &n_ports) in self.n_ports.iter().enumerate() {
                let (mut cs_ch, mut cs_dis) = (0.0, 0.0);
                for p in 0..n_ports {
                    let amps = r.port_currents[offset + p];
                    let (ch, dis) = (amps.max(0.0), amps.min(0.0));
                    cs_ch += ch;
                    cs_dis += dis;
                    set(self.current_ev_ch.at(p, i, t), ch);
                    set(self.current_ev_dis.at(p, i, t), dis);
                    set(self.omega_ch.at(p, i, t), if ch > 0.0 { 1.0 } else { 0.0 });
                    set(self.omega_dis.at(p, i, t), if dis < 0.0 { 1.0 } else { 0.0 });

                    let energy = if self.u[i][p][t] {
                        r.port_energies[offset + p]
                    } else if self.t_dep[i][p][t] && t > 0 {
                        results[t - 1].port_energies[offset + p]
                    } else {
                        0.0
                    };
                    set(self.energy.at(p, i, t), energy);
                }
                set(self.current_cs_ch[i][t], cs_ch);
                set(self.current_cs_dis[i][t], cs_dis);
                let j = self.cs_transformer[i];
                tr_amps[j] += cs_ch + cs_dis;
                tr_power[j] += (cs_ch + cs_dis) * self.effective_voltage[i] / 1000.0;
                offset += n_ports;
            }

            for j in 0..self.n_transformers {
                set(self.current_tr[j][t], tr_amps[j]);
                set(self.power_tr[j][t], tr_power[j]);
            }
            set(self.power_error[t], tr_power.iter().sum::<f64>() - self.setpoints[t]);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{ChargingStation, Ev, StationSpec, Transformer, TransformerSpec};
    use crate::model::solver::{CandidateSolver, SolveStatus};
    use crate::sim::engine::Engine;
    use crate::sim::episode::Episode;
    use crate::sim::types::SimConfig;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    const LEN: usize = 8;

    fn config() -> SimConfig {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        SimConfig::new(LEN, 15, start, 1)
    }

    fn episode(evs: Vec<Ev>) -> Episode {
        let spec = StationSpec {
            n_ports: 2,
            max_charge_current: 32.0,
            min_charge_current: 0.0,
            max_discharge_current: -32.0,
            min_discharge_current: 0.0,
            voltage: 230.0,
            phases: 1,
            charge_efficiency: 0.9,
            discharge_efficiency: 0.9,
        };
        Episode {
            stations: vec![ChargingStation::new(0, 0, spec)],
            transformers: vec![Transformer::new(
                0,
                TransformerSpec {
                    max_current: 500.0,
                    max_power: 200.0,
                    mode: LimitMode::Current,
                },
                vec![0],
                LEN,
            )],
            evs,
            power_setpoints: vec![4.0; LEN],
            charge_prices: vec![0.2; LEN],
            discharge_prices: vec![0.2; LEN],
        }
    }

    fn evs() -> Vec<Ev> {
        vec![
            Ev::new(0, 0, 20.0, 5.0, 20.0, 1, 5, 7.0, 7.0),
            Ev::new(1, 0, 20.0, 18.0, 20.0, 0, 12, 7.0, 7.0),
        ]
    }

    fn names(model: &PowerTrackerModel) -> Vec<&str> {
        model
            .model()
            .constraints()
            .iter()
            .map(|c| c.name.as_str())
            .collect()
    }

    #[test]
    fn constraint_families_follow_occupancy() {
        let t = EpisodeTrajectory::from_episode(&config(), &episode(evs()));
        let model = PowerTrackerModel::build(&t).unwrap();
        let names = names(&model);

        assert!(names.contains(&"ev_arrival_energy.0.0.1"));
        assert!(names.contains(&"ev_empty_port_ch.0.0.1"));
        assert!(names.contains(&"ev_ch_power_max.0.0.2"));
        assert!(names.contains(&"ev_energy.0.0.5"));
        assert!(!names.contains(&"ev_energy_level_max.0.0.5"));
        assert!(!names.contains(&"ev_empty_port_energy.0.0.5"));
        assert!(names.contains(&"ev_empty_port_energy.0.0.6"));
        assert!(names.contains(&"ev_arrival_energy.1.0.0"));
        assert!(names.contains(&"tr_limit_max.0.7"));
        assert!(names.contains(&"power_error.7"));
        assert_eq!(model.model().num_binaries(), 2 * 2 * LEN);
    }

    #[test]
    fn zero_assignment_with_arrival_energies_is_feasible() {
        let t = EpisodeTrajectory::from_episode(&config(), &episode(evs()));
        let model = PowerTrackerModel::build(&t).unwrap();
        let mut engine = Engine::new(config(), episode(evs())).unwrap();
        let mut results: Vec<StepResult> =
            (0..LEN).filter_map(|_| engine.step(&[0.0, 0.0])).collect();
        assert_eq!(results.len(), LEN);
        let values = model.assignment_from_results(&results).unwrap();
        assert!(model.model().violations(&values, 1e-6).is_empty());
        assert_relative_eq!(model.model().objective_value(&values), 16.0 * LEN as f64);

        results.pop();
        assert!(model.assignment_from_results(&results).is_err());
    }

    #[test]
    fn simulated_schedule_is_feasible_and_replays() {
        let t = EpisodeTrajectory::from_episode(&config(), &episode(evs()));
        let model = PowerTrackerModel::build(&t).unwrap();
        let mut engine = Engine::new(config(), episode(evs())).unwrap();
        let results = engine.run(&mut crate::heuristics::ChargeAsFastAsPossible);

        let values = model.assignment_from_results(&results).unwrap();
        let solution = model
            .solve(&mut CandidateSolver::new(values, 1e-6))
            .unwrap();
        assert_eq!(solution.status, SolveStatus::Suboptimal);
        let tracking: f64 = results.iter().map(|r| r.tracking_error_kw.powi(2)).sum();
        assert_relative_eq!(solution.objective, tracking, epsilon = 1e-6);

        // Replaying the extracted actions reproduces the run.
        let actions = model.actions(&solution);
        let mut replay = Engine::new(config(), episode(evs())).unwrap();
        for (step, a) in actions.iter().enumerate() {
            let r = replay.step(a).unwrap();
            assert_relative_eq!(r.ev_power_kw, results[step].ev_power_kw, epsilon = 1e-9);
        }
    }

    #[test]
    fn overcharging_is_infeasible() {
        let t = EpisodeTrajectory::from_episode(&config(), &episode(evs()));
        let model = PowerTrackerModel::build(&t).unwrap();
        let results = Engine::new(config(), episode(evs()))
            .unwrap()
            .run(&mut crate::heuristics::ChargeAsFastAsPossible);
        let mut values = model.assignment_from_results(&results).unwrap();
        values[model.current_ev_ch.at(0, 0, 1).index()] = 10.0;
        let solution = model
            .solve(&mut CandidateSolver::new(values, 1e-6))
            .unwrap();
        assert_eq!(solution.status, SolveStatus::Infeasible);
    }
}
