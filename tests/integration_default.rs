//! End-to-end runs of the step loop with the built-in heuristics.

mod common;

use approx::assert_relative_eq;

use ev_fleet_sim::config::ScenarioConfig;
use ev_fleet_sim::heuristics::{
    ChargeAsFastAsPossible, ChargeAsLateAsPossible, DispatchStrategy, RoundRobin, StrategyKind,
};
use ev_fleet_sim::sim::engine::Engine;
use ev_fleet_sim::sim::kpi::KpiReport;

#[test]
fn fast_charging_fills_the_battery_before_departure() {
    let episode = common::two_by_two_episode(12, vec![common::ev(0, 0, 0, 10)], 0.0);
    let mut engine = Engine::new(common::sim_config(12), episode).unwrap();
    let results = engine.run(&mut ChargeAsFastAsPossible);

    assert_eq!(results.len(), 12);
    assert_eq!(results[0].port_currents[0], 0.0);
    let departure = results
        .iter()
        .flat_map(|r| r.departures.iter().map(move |d| (r.timestep, d)))
        .next()
        .unwrap();
    assert!(departure.0 < 10);
    assert_relative_eq!(departure.1.energy_kwh, 50.0, epsilon = 1e-9);
    assert_relative_eq!(engine.evs()[0].soc(), 1.0, epsilon = 1e-12);
}

#[test]
fn round_robin_at_average_power_serves_one_ev_per_step() {
    let evs = vec![
        common::ev(0, 0, 0, 20),
        common::ev(1, 0, 0, 20),
        common::ev(0, 1, 1, 20),
    ];
    let stations = common::two_by_two_episode(20, Vec::new(), 0.0).stations;
    let mut rr = RoundRobin::new(&stations).unwrap();
    let setpoint = rr.average_power_w() / 1000.0;
    let episode = common::two_by_two_episode(20, evs, setpoint);
    let mut engine = Engine::new(common::sim_config(20), episode).unwrap();

    let mut served = Vec::new();
    while !engine.is_done() {
        let actions = rr.get_action(&engine.observation());
        let active: Vec<usize> = (0..actions.len()).filter(|&i| actions[i] > 0.0).collect();
        if engine.current_step() > 0 {
            assert_eq!(active.len(), 1, "step {}", engine.current_step());
            served.push(active[0]);
        }
        engine.step(&actions);
    }
    // Every parked vehicle gets a turn.
    for port in [0, 1, 2] {
        assert!(served.contains(&port));
    }
}

#[test]
fn late_charging_waits_then_charges_at_full_power() {
    let episode = common::two_by_two_episode(16, vec![common::ev(1, 1, 0, 16)], 0.0);
    let mut engine = Engine::new(common::sim_config(16), episode).unwrap();
    let results = engine.run(&mut ChargeAsLateAsPossible);

    let first = results
        .iter()
        .position(|r| r.port_currents[3] > 0.0)
        .unwrap();
    // 40 kWh at about 22 kW takes 8 steps of 15 minutes.
    assert_eq!(first, 16 - 8);
    assert_relative_eq!(results[15].port_energies[3], 50.0, epsilon = 1e-9);
}

#[test]
fn soc_stays_within_bounds_for_every_heuristic() {
    for kind in StrategyKind::ALL {
        let mut cfg = ScenarioConfig::grid_constrained();
        cfg.simulation.strategy = kind;
        let mut engine = Engine::from_scenario(&cfg).unwrap();
        let mut strategy = kind.build(engine.stations()).unwrap();
        let results = engine.run(&mut strategy);

        assert_eq!(results.len(), cfg.simulation.simulation_length);
        for ev in engine.evs() {
            assert!((0.0..=1.0).contains(&ev.soc()), "{kind}: soc {}", ev.soc());
        }
        for r in &results {
            assert_eq!(r.port_currents.len(), 12);
            assert!(r.port_energies.iter().all(|&e| e >= 0.0));
        }
    }
}

#[test]
fn statistics_are_consistent_with_steps() {
    let mut engine = Engine::from_scenario(&ScenarioConfig::baseline()).unwrap();
    let results = engine.run(&mut ChargeAsFastAsPossible);
    let kpi = KpiReport::from_results(&results, engine.config().score_threshold);

    let departed: usize = results.iter().map(|r| r.departures.len()).sum();
    let arrived = engine
        .evs()
        .iter()
        .filter(|ev| ev.time_of_arrival < engine.config().simulation_length)
        .count();
    assert_eq!(kpi.total_ev_served, departed);
    assert_eq!(departed, arrived);
    assert!(kpi.evs_satisfied <= kpi.total_ev_served);
    assert!(kpi.tracking_error.is_finite());
    assert!((0.0..=1.0).contains(&kpi.average_user_satisfaction));
    assert_eq!(kpi.total_energy_discharged, 0.0);
    let charged: f64 = engine.evs().iter().map(|ev| ev.total_energy_charged()).sum();
    assert_relative_eq!(kpi.total_energy_charged, charged, epsilon = 1e-6);
}

#[test]
fn same_seed_same_run() {
    let cfg = ScenarioConfig::grid_constrained();
    let run = |cfg: &ScenarioConfig| {
        let mut engine = Engine::from_scenario(cfg).unwrap();
        let mut strategy = cfg.simulation.strategy.build(engine.stations()).unwrap();
        engine.run(&mut strategy)
    };
    assert_eq!(run(&cfg), run(&cfg));

    let mut other = cfg.clone();
    other.simulation.seed += 1;
    assert_ne!(run(&cfg), run(&other));
}
