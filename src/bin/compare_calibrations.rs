//! Compare policy functions across the standard friction parametrizations
//!
//! Solves the Base, Tax, Calvo, and Retirement variants of the life-cycle
//! calibration and tabulates the rebalancing, share, and consumption
//! policies over an m grid at fixed risky positions and share slices.

use anyhow::Context;
use lifecycle_portfolio::{GridSpec, ScenarioRunner};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;

const N_SLICES: [f64; 3] = [0.0, 10.0, 20.0];
const SHARE_SLICES: [f64; 2] = [0.0, 0.5];
const M_POINTS: usize = 50;
const M_MAX: f64 = 40.0;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut runner = ScenarioRunner::lifecycle(25, 65, 90);
    // Sparser grids: four full life-cycle solves
    runner.base_mut().grid = GridSpec {
        m_count: 25,
        m_max: 50.0,
        n_count: 25,
        n_max: 50.0,
        a_count: 25,
        a_max: 50.0,
        share_count: 10,
        nest_fac: 3,
    };

    let output_path = "policy_comparison.csv";
    let mut out = BufWriter::new(File::create(output_path).context("creating output")?);
    writeln!(out, "model,period,control,m,n,share,value")?;

    for (name, cal) in runner.named_variants()? {
        println!("Now solving {name}");
        let start = Instant::now();
        let solved = runner.run(&cal)?;
        println!("Solving {name} took {:?}", start.elapsed());

        // First working period and first retired period
        for period in [0usize, 41] {
            let sol = solved.period(period);
            for i in 0..M_POINTS {
                let m = M_MAX * i as f64 / (M_POINTS - 1) as f64;
                for &n in &N_SLICES {
                    let d = sol.adjust.reb.dfrac(m, n);
                    writeln!(out, "{name},{period},d,{m:.4},{n:.1},,{d:.6}")?;
                    let s = sol.adjust.sha.share(m, n);
                    writeln!(out, "{name},{period},share,{m:.4},{n:.1},,{s:.6}")?;
                    for &share in &SHARE_SLICES {
                        let c = sol.adjust.cns.consumption(m, n, share);
                        writeln!(
                            out,
                            "{name},{period},c,{m:.4},{n:.1},{share:.1},{c:.6}"
                        )?;
                    }
                }
            }
        }
    }

    println!("Policy tables written to {output_path}");
    Ok(())
}
