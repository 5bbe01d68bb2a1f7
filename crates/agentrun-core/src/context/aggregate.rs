use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use agentrun_model::DEFAULT_TASK_FILE;

use crate::context::{AggregatedFile, ContextBundle, Provenance, Resolved, ResolvedFile};

const SEPARATOR: &str = "\n\n";

/// Folds resolved contexts into one string per target path.
pub struct ContentAggregator {
    default_file: String,
}

impl ContentAggregator {
    pub fn new(working_dir: &str) -> Self {
        Self {
            default_file: format!("{}/{}", working_dir.trim_end_matches('/'), DEFAULT_TASK_FILE),
        }
    }

    pub fn default_file(&self) -> &str {
        &self.default_file
    }

    /// Merge `resolved` (in increasing priority) and the task `description`.
    ///
    /// A path with a single piece of content receives it verbatim. Otherwise every piece is
    /// wrapped in a `<context>` delimiter, in input order, and the pieces are joined by a blank
    /// line. The description is always first in the default file and never wrapped.
    pub fn aggregate(&self, description: Option<&str>, resolved: Vec<Resolved>) -> ContextBundle {
        let mut by_path: BTreeMap<String, Vec<ResolvedFile>> = BTreeMap::new();
        let mut bundle = ContextBundle::default();

        for r in resolved {
            match r {
                Resolved::File(f) => by_path.entry(f.path.clone()).or_default().push(f),
                Resolved::Directory(d) => bundle.directories.push(d),
                Resolved::Repository(repo) => bundle.repositories.push(repo),
            }
        }

        let description = description.filter(|d| !d.is_empty());
        if description.is_some() {
            by_path.entry(self.default_file.clone()).or_default();
        }

        let mut keys: HashMap<String, String> = HashMap::new();
        for (path, pieces) in by_path {
            let lead = description.filter(|_| path == self.default_file);
            let content = merge(lead, &pieces);
            let key = storage_key(&path);
            if let Some(previous) = keys.insert(key.clone(), path.clone()) {
                warn!(%key, first = %previous, second = %path, "context paths share a storage key");
            }
            debug!(%path, pieces = pieces.len() + usize::from(lead.is_some()), "aggregated context file");
            bundle.files.push(AggregatedFile { path, key, content });
        }
        bundle
    }
}

fn merge(lead: Option<&str>, pieces: &[ResolvedFile]) -> String {
    let total = pieces.len() + usize::from(lead.is_some());
    if total == 1 {
        if let Some(lead) = lead {
            return lead.to_string();
        }
        return pieces[0].content.clone();
    }

    let mut parts: Vec<String> = Vec::with_capacity(total);
    if let Some(lead) = lead {
        parts.push(lead.to_string());
    }
    parts.extend(pieces.iter().map(|p| wrap(&p.provenance, &p.content)));
    parts.join(SEPARATOR)
}

fn wrap(provenance: &Provenance, content: &str) -> String {
    let mut open = String::from("<context");
    if let Some(name) = &provenance.name {
        open.push_str(&format!(" name=\"{name}\""));
    }
    if let Some(ns) = &provenance.namespace {
        open.push_str(&format!(" namespace=\"{ns}\""));
    }
    open.push_str(&format!(" type=\"{}\">", provenance.kind));
    format!("{open}\n{content}\n</context>")
}

/// Config object key for a container path: `/workspace/docs/a.md` → `workspace-docs-a.md`.
///
/// Distinct paths can map to the same key (`/a/b-c` and `/a-b/c`); the aggregator only warns.
pub fn storage_key(path: &str) -> String {
    path.trim_start_matches('/').replace('/', "-")
}
