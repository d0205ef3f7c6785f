// tara-common/src/models/features.rs

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

/// Shape of a single named feature exposed by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "dtype", rename_all = "snake_case")]
pub enum FeatureKind {
    Float,
    Image { height: u32, width: u32, channels: u32 },
}

pub type Features = BTreeMap<String, FeatureKind>;

/// Builds a feature map where every name is a scalar float.
pub fn float_features<I, S>(names: I) -> Features
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(|n| (n.into(), FeatureKind::Float)).collect()
}
