//! Tabulated survival probabilities
//!
//! One-year survival probabilities for ages 20 through 99, as used in the
//! life-cycle portfolio-choice literature. Entry `k` is the probability of
//! surviving from age `20 + k` to age `21 + k`.

/// First age covered by [`cgm_survival_probs`]
pub const SURVIVAL_TABLE_FIRST_AGE: u32 = 20;

/// The full survival table for ages 20-99
pub fn cgm_survival_probs() -> Vec<f64> {
    vec![
        // Ages 20-29
        0.99845, 0.99839, 0.99833, 0.9983, 0.99827, 0.99826, 0.99824, 0.9982, 0.99813, 0.99804,
        // Ages 30-39
        0.99795, 0.99785, 0.99776, 0.99766, 0.99755, 0.99743, 0.9973, 0.99718, 0.99707, 0.99696,
        // Ages 40-49
        0.99685, 0.99672, 0.99656, 0.99635, 0.9961, 0.99579, 0.99543, 0.99504, 0.99463, 0.9942,
        // Ages 50-59
        0.9937, 0.99311, 0.99245, 0.99172, 0.99091, 0.99005, 0.98911, 0.98803, 0.9868, 0.98545,
        // Ages 60-69
        0.98409, 0.9827, 0.98123, 0.97961, 0.97786, 0.97603, 0.97414, 0.97207, 0.9697, 0.96699,
        // Ages 70-79
        0.96393, 0.96055, 0.9569, 0.9531, 0.94921, 0.94508, 0.94057, 0.9357, 0.93031, 0.92424,
        // Ages 80-89
        0.91717, 0.90922, 0.90089, 0.89282, 0.88503, 0.87622, 0.86576, 0.8544, 0.8423, 0.82942,
        // Ages 90-99
        0.8154, 0.80002, 0.78404, 0.76842, 0.75382, 0.73996, 0.72464, 0.71057, 0.6961, 0.6809,
    ]
}

/// Survival probabilities for each transition of a life cycle running from
/// age `born` to age `death`: entry `t` is the probability of surviving the
/// transition from age `born + t`. Ages outside the table clamp to its ends.
pub fn survival_slice(born: u32, death: u32) -> Vec<f64> {
    let table = cgm_survival_probs();
    let transitions = (death - born) as usize;
    (0..transitions)
        .map(|t| {
            let age = born as usize + t;
            let idx = age
                .saturating_sub(SURVIVAL_TABLE_FIRST_AGE as usize)
                .min(table.len() - 1);
            table[idx]
        })
        .collect()
}
