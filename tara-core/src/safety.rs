// tara-core/src/safety.rs

use std::collections::BTreeMap;
use tracing::warn;

/// Clamps every goal so it moves at most `max_relative_target` away from the
/// present position. Motors without a present reading pass through.
pub fn ensure_safe_goal_position(
    goal_present: &BTreeMap<String, (f64, f64)>,
    max_relative_target: f64,
) -> BTreeMap<String, f64> {
    goal_present
        .iter()
        .map(|(name, (goal, present))| {
            let safe = goal.clamp(present - max_relative_target, present + max_relative_target);
            if safe != *goal {
                warn!(
                    "Relative goal position magnitude had to be clamped to be safe. {}: requested {:.2}, clipped to {:.2}",
                    name, goal, safe
                );
            }
            (name.clone(), safe)
        })
        .collect()
}
