//! Lifecycle Portfolio CLI
//!
//! Solves the stationary base calibration, prints policy-function slices,
//! and runs a small demonstration simulation

use lifecycle_portfolio::{
    simulate, solve, Calibration, GridSpec, SimConfig,
};

fn main() {
    env_logger::init();

    println!("Lifecycle Portfolio v0.1.0");
    println!("==========================\n");

    let mut cal = Calibration::infinite_base();
    cal.grid = GridSpec {
        m_count: 25,
        m_max: 50.0,
        n_count: 25,
        n_max: 50.0,
        a_count: 25,
        a_max: 50.0,
        share_count: 10,
        nest_fac: 3,
    };

    println!("Calibration: stationary base");
    println!("  CRRA: {}", cal.prefs.crra);
    println!("  Discount factor: {}", cal.prefs.disc_fac);
    println!("  Risk-free return: {}", cal.returns.rfree);
    println!("  Risky return: {} +/- {}", cal.returns.risky_avg, cal.returns.risky_std);
    println!("  Adjustment probability: {}", cal.frictions.adjust_prb.at(0));
    println!("  Withdrawal tax: {}", cal.frictions.tau.at(0));
    println!();

    println!("Solving fixed point...");
    let start = std::time::Instant::now();
    let solved = solve(&cal).expect("solve failed");
    let diag = solved.diagnostics().expect("infinite solve carries diagnostics");
    println!(
        "  {} after {} iterations (residual {:.2e}) in {:?}\n",
        if diag.converged { "Converged" } else { "DID NOT CONVERGE" },
        diag.iterations,
        diag.residual,
        start.elapsed()
    );

    // Policy-function slices at a fixed risky position
    let period = solved.period(0);
    let n_fixed = 10.0;
    println!("Policy functions at n = {n_fixed}:");
    println!("{:>8} {:>10} {:>10} {:>10}", "m", "dfrac", "share", "c");
    println!("{}", "-".repeat(42));
    for m in [0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 40.0] {
        let d = period.adjust.reb.dfrac(m, n_fixed);
        let (mt, nt) = lifecycle_portfolio::solver::rebalance_assets(d, m, n_fixed, period.tau);
        let s = period.adjust.sha.share(mt, nt);
        let c = period.adjust.cns.consumption(mt, nt, s);
        println!("{:>8.2} {:>10.4} {:>10.4} {:>10.4}", m, d, s, c);
    }
    println!();

    // Small demonstration simulation
    let config = SimConfig {
        agent_count: 10,
        periods: 40,
        seed: 42,
        ..SimConfig::default()
    };
    println!("Simulating {} agents for {} periods...", config.agent_count, config.periods);
    let history = simulate(&solved, &cal, &config).expect("simulation failed");

    println!("\nAge profiles (population means):");
    println!(
        "{:>6} {:>6} {:>10} {:>10} {:>10} {:>10}",
        "t", "alive", "P", "Mtilde", "Ntilde", "C"
    );
    println!("{}", "-".repeat(58));
    for p in history.age_profiles().iter().step_by(5) {
        println!(
            "{:>6} {:>6} {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
            p.period, p.alive_count, p.p_lvl, p.m_tilde_lvl, p.n_tilde_lvl, p.c_lvl
        );
    }
}
