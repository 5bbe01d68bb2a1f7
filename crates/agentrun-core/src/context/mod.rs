//! Context resolution and aggregation.
//!
//! [`ContextResolver`] turns context items into literal file content, directory mounts or
//! repository mounts. [`ContentAggregator`] folds file content into one string per target path.

mod resolve;
pub use resolve::ContextResolver;

mod aggregate;
pub use aggregate::{ContentAggregator, storage_key};

use std::collections::BTreeMap;

/// Origin of a piece of content, rendered into aggregation delimiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub kind: &'static str,
}

/// Literal content destined for `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub path: String,
    pub content: String,
    pub provenance: Provenance,
}

/// Whole config object mounted as a directory; bypasses aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryMount {
    pub config_map: String,
    pub mount_path: String,
    pub optional: bool,
}

/// Repository cloned by the init stage and exposed at `mount_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryMount {
    pub repository: String,
    pub reference: String,
    pub depth: u32,
    /// Sub-path of the clone exposed at the mount path.
    pub path: Option<String>,
    pub mount_path: String,
    pub secret_ref: Option<String>,
}

/// Outcome of resolving one context item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    File(ResolvedFile),
    Directory(DirectoryMount),
    Repository(RepositoryMount),
}

/// One aggregated file and the config key it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedFile {
    pub path: String,
    pub key: String,
    pub content: String,
}

/// Everything the job builder needs to lay out contexts inside the container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextBundle {
    /// Sorted by path.
    pub files: Vec<AggregatedFile>,
    pub directories: Vec<DirectoryMount>,
    pub repositories: Vec<RepositoryMount>,
}

impl ContextBundle {
    /// Config object payload: storage key → content.
    pub fn config_data(&self) -> BTreeMap<String, String> {
        self.files
            .iter()
            .map(|f| (f.key.clone(), f.content.clone()))
            .collect()
    }

    pub fn file(&self, path: &str) -> Option<&AggregatedFile> {
        self.files.iter().find(|f| f.path == path)
    }
}
