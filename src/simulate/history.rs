//! Simulation output: per-agent, per-period records and age aggregates

use serde::{Deserialize, Serialize};
use std::io::Write;

/// One agent-period record
///
/// Shock fields hold the draws realized entering the period (NaN at period
/// zero, where nothing has happened yet). After an agent dies its rows stay
/// in the history with `alive = false` and NaN states, so every agent has
/// the same number of rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimRow {
    pub agent_id: usize,
    pub period: usize,
    pub alive: bool,
    pub adjust: bool,

    // Realized shocks entering this period
    pub perm_shk: f64,
    pub tran_shk: f64,
    pub risky_shk: f64,

    // States (normalized by permanent income except p_lvl itself)
    pub p_lvl: f64,
    pub m_nrm: f64,
    pub n_nrm: f64,
    pub m_tilde: f64,
    pub n_tilde: f64,

    // Controls
    pub d_nrm: f64,
    pub share: f64,
    pub c_nrm: f64,
    pub a_nrm: f64,
}

impl SimRow {
    /// Placeholder row for an agent who is no longer simulated
    pub fn dead(agent_id: usize, period: usize) -> Self {
        Self {
            agent_id,
            period,
            alive: false,
            adjust: false,
            perm_shk: f64::NAN,
            tran_shk: f64::NAN,
            risky_shk: f64::NAN,
            p_lvl: f64::NAN,
            m_nrm: f64::NAN,
            n_nrm: f64::NAN,
            m_tilde: f64::NAN,
            n_tilde: f64::NAN,
            d_nrm: f64::NAN,
            share: f64::NAN,
            c_nrm: f64::NAN,
            a_nrm: f64::NAN,
        }
    }
}

/// Population means of levels by period, over agents alive that period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgeProfileRow {
    pub period: usize,
    pub alive_count: usize,
    pub p_lvl: f64,
    pub m_tilde_lvl: f64,
    pub n_tilde_lvl: f64,
    pub c_lvl: f64,
    /// Risky assets as a fraction of total post-rebalancing assets
    pub risky_share: f64,
    /// Mean contribution share
    pub contrib_share: f64,
}

/// Complete simulation history
#[derive(Debug, Clone)]
pub struct SimHistory {
    pub rows: Vec<SimRow>,
    pub agent_count: usize,
    pub periods: usize,
}

impl SimHistory {
    /// Rows belonging to one agent, in period order
    pub fn agent(&self, agent_id: usize) -> impl Iterator<Item = &SimRow> {
        self.rows.iter().filter(move |r| r.agent_id == agent_id)
    }

    /// Average level variables by period over the surviving population
    pub fn age_profiles(&self) -> Vec<AgeProfileRow> {
        let periods = self.rows.iter().map(|r| r.period + 1).max().unwrap_or(0);
        let mut profiles = Vec::with_capacity(periods);
        for t in 0..periods {
            let mut count = 0usize;
            let mut p = 0.0;
            let mut mt = 0.0;
            let mut nt = 0.0;
            let mut c = 0.0;
            let mut share = 0.0;
            for r in self.rows.iter().filter(|r| r.period == t && r.alive) {
                count += 1;
                p += r.p_lvl;
                mt += r.m_tilde * r.p_lvl;
                nt += r.n_tilde * r.p_lvl;
                if r.c_nrm.is_finite() {
                    c += r.c_nrm * r.p_lvl;
                }
                if r.share.is_finite() {
                    share += r.share;
                }
            }
            let nf = count.max(1) as f64;
            let m_mean = mt / nf;
            let n_mean = nt / nf;
            let total = m_mean + n_mean;
            profiles.push(AgeProfileRow {
                period: t,
                alive_count: count,
                p_lvl: p / nf,
                m_tilde_lvl: m_mean,
                n_tilde_lvl: n_mean,
                c_lvl: c / nf,
                risky_share: if total > 0.0 { n_mean / total } else { 0.0 },
                contrib_share: share / nf,
            });
        }
        profiles
    }

    /// Write the full history as CSV
    pub fn write_csv<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(
            out,
            "agent_id,period,alive,adjust,perm_shk,tran_shk,risky_shk,p_lvl,m_nrm,n_nrm,m_tilde,n_tilde,d_nrm,share,c_nrm,a_nrm"
        )?;
        for r in &self.rows {
            writeln!(
                out,
                "{},{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
                r.agent_id,
                r.period,
                r.alive,
                r.adjust,
                r.perm_shk,
                r.tran_shk,
                r.risky_shk,
                r.p_lvl,
                r.m_nrm,
                r.n_nrm,
                r.m_tilde,
                r.n_tilde,
                r.d_nrm,
                r.share,
                r.c_nrm,
                r.a_nrm,
            )?;
        }
        Ok(())
    }

    /// Write the age-profile aggregates as CSV
    pub fn write_age_profiles_csv<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(
            out,
            "period,alive_count,p_lvl,m_tilde_lvl,n_tilde_lvl,c_lvl,risky_share,contrib_share"
        )?;
        for p in self.age_profiles() {
            writeln!(
                out,
                "{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
                p.period,
                p.alive_count,
                p.p_lvl,
                p.m_tilde_lvl,
                p.n_tilde_lvl,
                p.c_lvl,
                p.risky_share,
                p.contrib_share,
            )?;
        }
        Ok(())
    }
}
