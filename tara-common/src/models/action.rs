//! tara-common/src/models/action.rs
//!
//! Actions and observations travel as ordered name -> value maps so that
//! they print, serialize and diff deterministically.

use std::collections::BTreeMap;

use crate::models::features::{FeatureKind, Features};

pub type Action = BTreeMap<String, f64>;
pub type Observation = BTreeMap<String, f64>;

/// An action with every float feature set to zero.
pub fn zero_action(features: &Features) -> Action {
    features
        .iter()
        .filter(|(_, kind)| matches!(kind, FeatureKind::Float))
        .map(|(name, _)| (name.clone(), 0.0))
        .collect()
}

/// Reads `key` from an action, defaulting to 0.0 when absent.
pub fn value_or_zero(action: &Action, key: &str) -> f64 {
    action.get(key).copied().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_action_skips_images() {
        let mut features = Features::new();
        features.insert("left_wheel".into(), FeatureKind::Float);
        features.insert("front".into(), FeatureKind::Image { height: 480, width: 640, channels: 3 });

        let action = zero_action(&features);
        assert_eq!(action.len(), 1);
        assert_eq!(action["left_wheel"], 0.0);
    }
}
