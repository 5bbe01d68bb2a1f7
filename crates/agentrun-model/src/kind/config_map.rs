use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ObjectMeta, impl_resource};

/// Key-value store object.
///
/// Used both as a context source and as the carrier of a task's aggregated context files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl_resource!(ConfigMap, "ConfigMap");

impl ConfigMap {
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            metadata,
            data: BTreeMap::new(),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}
