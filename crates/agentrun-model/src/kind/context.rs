use serde::{Deserialize, Serialize};

use crate::domain::{ObjectMeta, impl_resource};

/// One entry of a task's or profile's context list.
///
/// The item decides *where* content lands (`mount_path`); the [`ContextSource`] decides *what* it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextItem {
    /// Logical name used in aggregation delimiters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Namespace of a referenced [`ReusableContext`]; defaults to the task namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Target path inside the container.
    ///
    /// Relative paths are resolved against the profile working directory.
    /// If `None`, content goes to the default task file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,
    pub source: ContextSource,
}

impl ContextItem {
    pub fn inline(text: impl Into<String>) -> Self {
        Self::from_source(ContextSource::Inline { text: text.into() })
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::from_source(ContextSource::Context { name: name.into() })
    }

    pub fn config_map(name: impl Into<String>, key: Option<&str>) -> Self {
        Self::from_source(ContextSource::ConfigMap(ConfigMapSource {
            name: name.into(),
            key: key.map(str::to_string),
            optional: false,
        }))
    }

    pub fn from_source(source: ContextSource) -> Self {
        Self {
            name: None,
            namespace: None,
            mount_path: None,
            source,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn at(mut self, mount_path: impl Into<String>) -> Self {
        self.mount_path = Some(mount_path.into());
        self
    }
}

/// Where the content of a [`ContextItem`] comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContextSource {
    /// Literal text.
    Inline { text: String },
    /// Named [`ReusableContext`].
    Context { name: String },
    /// Key of a config object, or the whole object as a directory when `key` is absent.
    ConfigMap(ConfigMapSource),
    /// Remote repository cloned into the container.
    Git(GitSource),
    /// Any source type this version does not know; resolution fails on it.
    #[serde(other)]
    Unsupported,
}

impl ContextSource {
    /// Short type tag used in logs and aggregation delimiters.
    pub fn kind(&self) -> &'static str {
        match self {
            ContextSource::Inline { .. } => "inline",
            ContextSource::Context { .. } => "context",
            ContextSource::ConfigMap(_) => "configMap",
            ContextSource::Git(_) => "git",
            ContextSource::Unsupported => "unsupported",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapSource {
    pub name: String,
    /// Key to read; `None` mounts every key as a directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// A missing object or key contributes nothing instead of failing.
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitSource {
    pub repository: String,
    /// Branch or tag; `None` clones `HEAD`.
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Sub-path of the clone exposed at the mount path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Clone depth; `None` means 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    /// Secret with `username` / `password` keys for authenticated clones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
}

/// Named content object without placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReusableContext {
    pub metadata: ObjectMeta,
    pub spec: ReusableContextSpec,
}

impl_resource!(ReusableContext, "ReusableContext");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReusableContextSpec {
    pub source: ReusableSource,
}

/// Source of a [`ReusableContext`]: exactly one of inline, config object or repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReusableSource {
    Inline { text: String },
    ConfigMap(ConfigMapSource),
    Git(GitSource),
    #[serde(other)]
    Unsupported,
}

impl From<ReusableSource> for ContextSource {
    fn from(source: ReusableSource) -> Self {
        match source {
            ReusableSource::Inline { text } => ContextSource::Inline { text },
            ReusableSource::ConfigMap(cm) => ContextSource::ConfigMap(cm),
            ReusableSource::Git(git) => ContextSource::Git(git),
            ReusableSource::Unsupported => ContextSource::Unsupported,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_is_tagged_by_type() {
        let item = ContextItem::config_map("guides", Some("style.md")).at("docs/style.md");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "mountPath": "docs/style.md",
                "source": { "type": "configMap", "name": "guides", "key": "style.md", "optional": false }
            })
        );
    }

    #[test]
    fn unknown_source_type_maps_to_unsupported() {
        let item: ContextItem =
            serde_json::from_str(r#"{"source":{"type":"s3","bucket":"b"}}"#).unwrap();
        assert_eq!(item.source, ContextSource::Unsupported);
        assert_eq!(item.source.kind(), "unsupported");
    }

    #[test]
    fn git_ref_field_is_named_ref() {
        let src: ContextSource = serde_json::from_str(
            r#"{"type":"git","repository":"https://git.example/x.git","ref":"main"}"#,
        )
        .unwrap();
        match src {
            ContextSource::Git(git) => {
                assert_eq!(git.reference.as_deref(), Some("main"));
                assert_eq!(git.depth, None);
            }
            other => panic!("unexpected source: {other:?}"),
        }
    }

    #[test]
    fn reusable_source_converts_without_loss() {
        let src = ReusableSource::Inline { text: "hi".into() };
        assert_eq!(
            ContextSource::from(src),
            ContextSource::Inline { text: "hi".into() }
        );
    }
}
