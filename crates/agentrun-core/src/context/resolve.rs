use std::sync::Arc;

use tracing::{debug, instrument, trace};

use agentrun_model::{
    ConfigMap, ConfigMapSource, ContextItem, ContextSource, DEFAULT_GIT_DEPTH, DEFAULT_GIT_REF,
    GitSource, ReusableContext,
};

use crate::context::{DirectoryMount, Provenance, RepositoryMount, Resolved, ResolvedFile};
use crate::error::CoreError;
use crate::store::{Api, Store};

/// Resolves context items against the store.
pub struct ContextResolver {
    store: Arc<dyn Store>,
}

impl ContextResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Resolve `items` in order; the output keeps the input order.
    ///
    /// Optional references that cannot be resolved are dropped. Any other failure aborts.
    #[instrument(level = "debug", skip(self, items), fields(count = items.len()))]
    pub async fn resolve(
        &self,
        namespace: &str,
        working_dir: &str,
        items: &[ContextItem],
    ) -> Result<Vec<Resolved>, CoreError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match self.resolve_item(namespace, working_dir, item).await? {
                Some(resolved) => out.push(resolved),
                None => trace!(kind = item.source.kind(), "optional context skipped"),
            }
        }
        debug!(resolved = out.len(), "contexts resolved");
        Ok(out)
    }

    async fn resolve_item(
        &self,
        namespace: &str,
        working_dir: &str,
        item: &ContextItem,
    ) -> Result<Option<Resolved>, CoreError> {
        match &item.source {
            ContextSource::Context { name } => {
                let ns = item.namespace.as_deref().unwrap_or(namespace);
                let reusable = Api::<ReusableContext>::namespaced(Arc::clone(&self.store), ns)
                    .get_opt(name)
                    .await?
                    .ok_or_else(|| CoreError::ContextNotFound {
                        namespace: ns.to_string(),
                        name: name.clone(),
                    })?;

                let source = ContextSource::from(reusable.spec.source);
                let provenance_name = item.name.clone().unwrap_or_else(|| name.clone());
                self.resolve_source(namespace, working_dir, item, &source, provenance_name, ns)
                    .await
            }
            source => {
                let name = item.name.clone().unwrap_or_else(|| default_name(source));
                self.resolve_source(namespace, working_dir, item, source, name, namespace)
                    .await
            }
        }
    }

    async fn resolve_source(
        &self,
        namespace: &str,
        working_dir: &str,
        item: &ContextItem,
        source: &ContextSource,
        name: String,
        provenance_ns: &str,
    ) -> Result<Option<Resolved>, CoreError> {
        let provenance = Provenance {
            name: (!name.is_empty()).then_some(name),
            namespace: Some(provenance_ns.to_string()),
            kind: source.kind(),
        };

        match source {
            ContextSource::Inline { text } => Ok(Some(Resolved::File(ResolvedFile {
                path: file_path(working_dir, item.mount_path.as_deref()),
                content: text.clone(),
                provenance,
            }))),
            ContextSource::ConfigMap(cm) => {
                self.resolve_config_map(namespace, working_dir, item, cm, provenance)
                    .await
            }
            ContextSource::Git(git) => Ok(Some(Resolved::Repository(repository_mount(
                working_dir,
                item.mount_path.as_deref(),
                git,
            )))),
            ContextSource::Context { name } => Err(CoreError::InvalidSpec(format!(
                "reusable context cannot reference another context ({name})"
            ))),
            ContextSource::Unsupported => Err(CoreError::UnsupportedSource(
                item.name.clone().unwrap_or_else(|| "unnamed".to_string()),
            )),
        }
    }

    /// Config objects are always read from the task namespace, including those named by a
    /// reusable context from another namespace: the unit-of-work can only mount local objects.
    async fn resolve_config_map(
        &self,
        namespace: &str,
        working_dir: &str,
        item: &ContextItem,
        source: &ConfigMapSource,
        provenance: Provenance,
    ) -> Result<Option<Resolved>, CoreError> {
        let api = Api::<ConfigMap>::namespaced(Arc::clone(&self.store), namespace);
        let object = api.get_opt(&source.name).await?;

        let Some(key) = &source.key else {
            if object.is_none() && !source.optional {
                return Err(CoreError::ConfigMapNotFound {
                    namespace: namespace.to_string(),
                    name: source.name.clone(),
                });
            }
            if object.is_none() {
                return Ok(None);
            }
            let mount_path = match item.mount_path.as_deref() {
                Some(p) => absolute(working_dir, p),
                None => absolute(working_dir, &source.name),
            };
            return Ok(Some(Resolved::Directory(DirectoryMount {
                config_map: source.name.clone(),
                mount_path,
                optional: source.optional,
            })));
        };

        let Some(object) = object else {
            if source.optional {
                return Ok(None);
            }
            return Err(CoreError::ConfigMapNotFound {
                namespace: namespace.to_string(),
                name: source.name.clone(),
            });
        };

        match object.data.get(key) {
            Some(content) => Ok(Some(Resolved::File(ResolvedFile {
                path: file_path(working_dir, item.mount_path.as_deref()),
                content: content.clone(),
                provenance,
            }))),
            None if source.optional => Ok(None),
            None => Err(CoreError::KeyNotFound {
                namespace: namespace.to_string(),
                name: source.name.clone(),
                key: key.clone(),
            }),
        }
    }
}

fn default_name(source: &ContextSource) -> String {
    match source {
        ContextSource::ConfigMap(cm) => cm.name.clone(),
        ContextSource::Git(git) => repo_basename(&git.repository),
        _ => String::new(),
    }
}

/// Target of file content: the default task file when no mount path is given.
fn file_path(working_dir: &str, mount_path: Option<&str>) -> String {
    match mount_path {
        Some(p) => absolute(working_dir, p),
        None => absolute(working_dir, agentrun_model::DEFAULT_TASK_FILE),
    }
}

fn absolute(working_dir: &str, path: &str) -> String {
    if path.starts_with('/') {
        return path.to_string();
    }
    let rel = path.trim_start_matches("./");
    format!("{}/{}", working_dir.trim_end_matches('/'), rel)
}

fn repo_basename(repository: &str) -> String {
    let last = repository
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(repository);
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        "repo".to_string()
    } else {
        name.to_string()
    }
}

fn repository_mount(working_dir: &str, mount_path: Option<&str>, git: &GitSource) -> RepositoryMount {
    let mount_path = match mount_path {
        Some(p) => absolute(working_dir, p),
        None => absolute(working_dir, &repo_basename(&git.repository)),
    };
    RepositoryMount {
        repository: git.repository.clone(),
        reference: git
            .reference
            .clone()
            .unwrap_or_else(|| DEFAULT_GIT_REF.to_string()),
        depth: git.depth.unwrap_or(DEFAULT_GIT_DEPTH).max(1),
        path: git
            .path
            .as_deref()
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty()),
        mount_path,
        secret_ref: git.secret_ref.clone(),
    }
}
