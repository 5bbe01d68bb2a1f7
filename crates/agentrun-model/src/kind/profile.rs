use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{DEFAULT_WORKING_DIR, ObjectMeta, impl_resource};
use crate::kind::ContextItem;

/// Reusable execution profile referenced by tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionProfile {
    pub metadata: ObjectMeta,
    pub spec: ExecutionProfileSpec,
}

impl_resource!(ExecutionProfile, "ExecutionProfile");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionProfileSpec {
    /// Agent container image.
    pub image: String,
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    /// Overrides the image entrypoint.
    ///
    /// Required when a task enables keep-alive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Lowest-priority contexts, applied before the task's own.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<ContextItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<Credential>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pod_labels: BTreeMap<String, String>,
    /// If `None`, cluster scheduling defaults apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling: Option<Scheduling>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_class_name: Option<String>,
    /// Execution identity of the unit-of-work.
    pub service_account_name: String,
}

fn default_working_dir() -> String {
    DEFAULT_WORKING_DIR.to_string()
}

impl ExecutionProfileSpec {
    pub fn new(image: impl Into<String>, service_account_name: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            working_dir: default_working_dir(),
            command: None,
            contexts: Vec::new(),
            credentials: Vec::new(),
            pod_labels: BTreeMap::new(),
            scheduling: None,
            runtime_class_name: None,
            service_account_name: service_account_name.into(),
        }
    }
}

/// Secret exposed to the agent as an env var, a file, or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub name: String,
    pub secret_ref: SecretKeyRef,
    /// Env var name; the value is injected by secret reference, never copied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    /// File (when `secret_ref.key` is set) or directory to mount the secret at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,
    /// Permission bits of mounted files; `None` means `0600`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_mode: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Placement constraints copied verbatim onto the unit-of-work pod.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scheduling {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
    /// Opaque affinity document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<i64>,
}
