//! Unit-of-work construction.

mod script;

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use agentrun_model::{
    CONTEXT_VOLUME, Container, Credential, DEFAULT_FILE_MODE, DEFAULT_GIT_REF, DEFAULT_WORKING_DIR,
    EnvVar, ExecutionProfile, Job, JobSpec, JobStatus, KeyToPath, LABEL_TASK, ObjectMeta, PodSpec,
    PodTemplate, Resource, Task, Volume, VolumeMount, VolumeSource,
};

use crate::config::ControllerConfig;
use crate::context::{ContextBundle, RepositoryMount};
use crate::error::CoreError;

const AGENT_CONTAINER: &str = "agent";

/// Builds the [`Job`] that runs a task with its profile and resolved contexts.
///
/// The build is pure: the same inputs always produce the same descriptor.
#[derive(Debug, Clone)]
pub struct JobBuilder {
    git_image: String,
    keep_alive_seconds: u64,
}

impl JobBuilder {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            git_image: config.git_image.clone(),
            keep_alive_seconds: config.keep_alive_seconds,
        }
    }

    #[instrument(level = "debug", skip_all, fields(task = %task.name(), profile = %profile.name()))]
    pub fn build(
        &self,
        task: &Task,
        profile: &ExecutionProfile,
        bundle: &ContextBundle,
    ) -> Result<Job, CoreError> {
        let p = &profile.spec;
        if p.image.trim().is_empty() {
            return Err(CoreError::InvalidSpec(format!(
                "profile {} has no image",
                profile.name()
            )));
        }
        if p.service_account_name.trim().is_empty() {
            return Err(CoreError::InvalidSpec(format!(
                "profile {} has no service account",
                profile.name()
            )));
        }

        let working_dir = if p.working_dir.is_empty() {
            DEFAULT_WORKING_DIR
        } else {
            p.working_dir.as_str()
        };
        let keep_alive = task.spec.keep_alive.unwrap_or(false);

        let mut pod = Pod::default();
        pod.env.push(EnvVar::value("TASK_NAME", task.name()));
        pod.env.push(EnvVar::value("TASK_NAMESPACE", task.namespace()));
        pod.env.push(EnvVar::value("WORKSPACE_DIR", working_dir));
        if keep_alive {
            let seconds = task.spec.keep_alive_seconds.unwrap_or(self.keep_alive_seconds);
            pod.env.push(EnvVar::value("KEEP_ALIVE_SECONDS", seconds.to_string()));
        }

        pod.context_files(task, bundle);
        for repo in &bundle.repositories {
            pod.repository(repo, &self.git_image);
        }
        for (i, cred) in p.credentials.iter().enumerate() {
            pod.credential(i, cred)?;
        }

        let command = match (&p.command, keep_alive) {
            (Some(cmd), true) if !cmd.is_empty() => Some(keep_alive_command(cmd)),
            (_, true) => {
                return Err(CoreError::InvalidSpec(format!(
                    "task {} requests keep-alive but profile {} sets no command",
                    task.name(),
                    profile.name()
                )));
            }
            (cmd, false) => cmd.clone(),
        };

        let mut labels: BTreeMap<String, String> = p.pod_labels.clone();
        labels.insert(LABEL_TASK.to_string(), task.name().to_string());

        let scheduling = p.scheduling.clone().unwrap_or_default();
        let agent = Container {
            name: AGENT_CONTAINER.to_string(),
            image: p.image.clone(),
            command,
            args: Vec::new(),
            working_dir: Some(working_dir.to_string()),
            env: pod.env,
            volume_mounts: pod.mounts,
        };

        let job = Job {
            metadata: ObjectMeta::new(task.namespace(), task.job_name())
                .with_label(LABEL_TASK, task.name())
                .with_owner(task.owner_ref()),
            spec: JobSpec {
                template: PodTemplate {
                    labels,
                    spec: PodSpec {
                        service_account_name: p.service_account_name.clone(),
                        init_containers: pod.init,
                        containers: vec![agent],
                        volumes: pod.volumes,
                        node_selector: scheduling.node_selector,
                        tolerations: scheduling.tolerations,
                        affinity: scheduling.affinity,
                        runtime_class_name: p.runtime_class_name.clone(),
                        restart_policy: "Never".to_string(),
                    },
                },
                backoff_limit: 0,
            },
            status: JobStatus::default(),
        };
        debug!(
            volumes = job.spec.template.spec.volumes.len(),
            init = job.spec.template.spec.init_containers.len(),
            "job built"
        );
        Ok(job)
    }
}

fn keep_alive_command(original: &[String]) -> Vec<String> {
    let mut cmd = vec![
        "sh".to_string(),
        "-c".to_string(),
        script::KEEPALIVE.to_string(),
        script::KEEPALIVE_ARG0.to_string(),
    ];
    cmd.extend(original.iter().cloned());
    cmd
}

/// Pieces of the pod accumulated while walking the bundle and credentials.
#[derive(Default)]
struct Pod {
    env: Vec<EnvVar>,
    mounts: Vec<VolumeMount>,
    volumes: Vec<Volume>,
    init: Vec<Container>,
}

impl Pod {
    fn context_files(&mut self, task: &Task, bundle: &ContextBundle) {
        if !bundle.files.is_empty() {
            self.volumes.push(Volume {
                name: CONTEXT_VOLUME.to_string(),
                source: VolumeSource::ConfigMap {
                    name: task.context_name(),
                    optional: false,
                },
            });
            for file in &bundle.files {
                self.mounts.push(VolumeMount {
                    name: CONTEXT_VOLUME.to_string(),
                    mount_path: file.path.clone(),
                    sub_path: Some(file.key.clone()),
                    read_only: true,
                });
            }
        }

        for (i, dir) in bundle.directories.iter().enumerate() {
            let name = format!("ctx-dir-{i}");
            self.volumes.push(Volume {
                name: name.clone(),
                source: VolumeSource::ConfigMap {
                    name: dir.config_map.clone(),
                    optional: dir.optional,
                },
            });
            self.mounts.push(VolumeMount {
                name,
                mount_path: dir.mount_path.clone(),
                sub_path: None,
                read_only: true,
            });
        }
    }

    fn repository(&mut self, repo: &RepositoryMount, git_image: &str) {
        let i = self.init.len();
        let volume = format!("repo-{i}");
        self.volumes.push(Volume {
            name: volume.clone(),
            source: VolumeSource::EmptyDir {},
        });

        let mut env = vec![
            EnvVar::value("GIT_REPO", &repo.repository),
            EnvVar::value("GIT_REF", &repo.reference),
            EnvVar::value("GIT_DEPTH", repo.depth.to_string()),
        ];
        if let Some(secret) = &repo.secret_ref {
            env.push(EnvVar::from_secret("GIT_USERNAME", secret, "username", false));
            env.push(EnvVar::from_secret("GIT_PASSWORD", secret, "password", false));
        }

        let with_branch = repo.reference != DEFAULT_GIT_REF;
        self.init.push(Container {
            name: format!("git-clone-{i}"),
            image: git_image.to_string(),
            command: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                script::clone(with_branch, repo.secret_ref.is_some()),
            ]),
            args: Vec::new(),
            working_dir: None,
            env,
            volume_mounts: vec![VolumeMount {
                name: volume.clone(),
                mount_path: script::CLONE_ROOT.to_string(),
                sub_path: None,
                read_only: false,
            }],
        });

        let sub_path = match &repo.path {
            Some(path) => format!("{}/{path}", script::CLONE_DIR),
            None => script::CLONE_DIR.to_string(),
        };
        self.mounts.push(VolumeMount {
            name: volume,
            mount_path: repo.mount_path.clone(),
            sub_path: Some(sub_path),
            read_only: false,
        });
    }

    fn credential(&mut self, i: usize, cred: &Credential) -> Result<(), CoreError> {
        if cred.env.is_none() && cred.mount_path.is_none() {
            return Err(CoreError::InvalidSpec(format!(
                "credential {} sets neither env nor mountPath",
                cred.name
            )));
        }

        if let Some(env) = &cred.env {
            let key = cred.secret_ref.key.as_deref().ok_or_else(|| {
                CoreError::InvalidSpec(format!(
                    "credential {} exposes env {env} without a secret key",
                    cred.name
                ))
            })?;
            self.env
                .push(EnvVar::from_secret(env, &cred.secret_ref.name, key, false));
        }

        if let Some(mount_path) = &cred.mount_path {
            let volume = format!("cred-{i}");
            let items = cred
                .secret_ref
                .key
                .iter()
                .map(|k| KeyToPath {
                    key: k.clone(),
                    path: k.clone(),
                })
                .collect();
            self.volumes.push(Volume {
                name: volume.clone(),
                source: VolumeSource::Secret {
                    secret_name: cred.secret_ref.name.clone(),
                    items,
                    default_mode: cred.file_mode.unwrap_or(DEFAULT_FILE_MODE),
                },
            });
            self.mounts.push(VolumeMount {
                name: volume,
                mount_path: mount_path.clone(),
                sub_path: cred.secret_ref.key.clone(),
                read_only: true,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_model::{ExecutionProfileSpec, Scheduling, SecretKeyRef, TaskSpec, Toleration};

    use crate::context::{AggregatedFile, DirectoryMount};

    fn task(keep_alive: Option<bool>) -> Task {
        let mut t = Task::new(
            ObjectMeta::new("ns", "review"),
            TaskSpec {
                profile_ref: "claude".into(),
                contexts: vec![],
                description: Some("D".into()),
                keep_alive,
                keep_alive_seconds: None,
                ttl_seconds_after_finished: None,
            },
        );
        t.metadata.uid = "task-uid".into();
        t
    }

    fn profile(command: Option<Vec<&str>>) -> ExecutionProfile {
        let mut spec = ExecutionProfileSpec::new("agent:1", "agent-sa");
        spec.command = command.map(|c| c.into_iter().map(String::from).collect());
        spec.pod_labels.insert("team".into(), "ml".into());
        ExecutionProfile {
            metadata: ObjectMeta::new("ns", "claude"),
            spec,
        }
    }

    fn bundle() -> ContextBundle {
        ContextBundle {
            files: vec![AggregatedFile {
                path: "/workspace/task.md".into(),
                key: "workspace-task.md".into(),
                content: "D".into(),
            }],
            directories: vec![DirectoryMount {
                config_map: "guides".into(),
                mount_path: "/workspace/guides".into(),
                optional: true,
            }],
            repositories: vec![],
        }
    }

    fn builder() -> JobBuilder {
        JobBuilder::new(&ControllerConfig::default())
    }

    fn agent(job: &Job) -> &Container {
        &job.spec.template.spec.containers[0]
    }

    #[test]
    fn identity_env_and_owner() {
        let job = builder().build(&task(None), &profile(None), &bundle()).unwrap();

        assert_eq!(job.metadata.name, "review-job");
        assert!(job.metadata.is_owned_by("task-uid"));
        assert_eq!(job.spec.backoff_limit, 0);
        assert_eq!(job.spec.template.spec.restart_policy, "Never");
        assert_eq!(job.spec.template.labels[LABEL_TASK], "review");
        assert_eq!(job.spec.template.labels["team"], "ml");

        let c = agent(&job);
        assert_eq!(c.env_value("TASK_NAME"), Some("review"));
        assert_eq!(c.env_value("TASK_NAMESPACE"), Some("ns"));
        assert_eq!(c.env_value("WORKSPACE_DIR"), Some("/workspace"));
        assert_eq!(c.env_value("KEEP_ALIVE_SECONDS"), None);
        assert!(c.command.is_none());
    }

    #[test]
    fn context_files_mount_by_storage_key() {
        let job = builder().build(&task(None), &profile(None), &bundle()).unwrap();
        let pod = &job.spec.template.spec;

        assert_eq!(
            pod.volume(CONTEXT_VOLUME).map(|v| &v.source),
            Some(&VolumeSource::ConfigMap {
                name: "review-context".into(),
                optional: false
            })
        );
        let file = agent(&job).mount_at("/workspace/task.md").unwrap();
        assert_eq!(file.sub_path.as_deref(), Some("workspace-task.md"));

        let dir = agent(&job).mount_at("/workspace/guides").unwrap();
        assert_eq!(dir.name, "ctx-dir-0");
        assert!(dir.sub_path.is_none());
    }

    #[test]
    fn keep_alive_wraps_original_command() {
        let job = builder()
            .build(&task(Some(true)), &profile(Some(vec!["agent", "--run"])), &bundle())
            .unwrap();
        let c = agent(&job);
        let cmd = c.command.as_ref().unwrap();

        assert_eq!(&cmd[..2], ["sh", "-c"]);
        assert!(cmd[2].contains("exit \"${code}\""));
        assert_eq!(&cmd[3..], ["agentrun-keepalive", "agent", "--run"]);
        assert_eq!(c.env_value("KEEP_ALIVE_SECONDS"), Some("3600"));
    }

    #[test]
    fn keep_alive_without_command_is_rejected() {
        let err = builder()
            .build(&task(Some(true)), &profile(None), &bundle())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidSpec(_)));
    }

    #[test]
    fn repository_gets_init_clone_and_sub_path_mount() {
        let mut b = bundle();
        b.repositories.push(RepositoryMount {
            repository: "https://git.example/org/svc.git".into(),
            reference: "main".into(),
            depth: 5,
            path: Some("docs".into()),
            mount_path: "/workspace/svc".into(),
            secret_ref: Some("git-creds".into()),
        });
        let job = builder().build(&task(None), &profile(None), &b).unwrap();
        let pod = &job.spec.template.spec;

        let init = &pod.init_containers[0];
        assert_eq!(init.name, "git-clone-0");
        assert_eq!(init.image, "alpine/git:latest");
        assert_eq!(init.env_value("GIT_DEPTH"), Some("5"));
        assert_eq!(init.env_value("GIT_REF"), Some("main"));
        assert!(init.command.as_ref().unwrap()[2].contains("--branch"));
        let password = init.env.iter().find(|e| e.name == "GIT_PASSWORD").unwrap();
        assert!(password.value.is_none() && password.value_from.is_some());

        assert_eq!(pod.volume("repo-0").map(|v| &v.source), Some(&VolumeSource::EmptyDir {}));
        let mount = agent(&job).mount_at("/workspace/svc").unwrap();
        assert_eq!(mount.sub_path.as_deref(), Some("repo/docs"));
    }

    #[test]
    fn credentials_never_carry_plain_values() {
        let mut p = profile(None);
        p.spec.credentials = vec![
            Credential {
                name: "token".into(),
                secret_ref: SecretKeyRef {
                    name: "agent-secrets".into(),
                    key: Some("api-key".into()),
                },
                env: Some("API_KEY".into()),
                mount_path: None,
                file_mode: None,
            },
            Credential {
                name: "ssh".into(),
                secret_ref: SecretKeyRef {
                    name: "ssh-keys".into(),
                    key: None,
                },
                env: None,
                mount_path: Some("/home/agent/.ssh".into()),
                file_mode: Some(0o400),
            },
        ];
        let job = builder().build(&task(None), &p, &bundle()).unwrap();
        let c = agent(&job);

        let api_key = c.env.iter().find(|e| e.name == "API_KEY").unwrap();
        assert!(api_key.value.is_none());

        match &job.spec.template.spec.volume("cred-1").unwrap().source {
            VolumeSource::Secret {
                secret_name,
                items,
                default_mode,
            } => {
                assert_eq!(secret_name, "ssh-keys");
                assert!(items.is_empty());
                assert_eq!(*default_mode, 0o400);
            }
            other => panic!("unexpected volume {other:?}"),
        }
        assert!(c.mount_at("/home/agent/.ssh").unwrap().sub_path.is_none());
    }

    #[test]
    fn scheduling_is_copied_verbatim() {
        let mut p = profile(None);
        p.spec.runtime_class_name = Some("gvisor".into());
        p.spec.scheduling = Some(Scheduling {
            node_selector: BTreeMap::from([("gpu".to_string(), "a100".to_string())]),
            tolerations: vec![Toleration {
                key: Some("gpu".into()),
                operator: Some("Exists".into()),
                value: None,
                effect: Some("NoSchedule".into()),
                toleration_seconds: None,
            }],
            affinity: Some(serde_json::json!({ "nodeAffinity": {} })),
        });
        let job = builder().build(&task(None), &p, &bundle()).unwrap();
        let pod = &job.spec.template.spec;

        assert_eq!(pod.node_selector["gpu"], "a100");
        assert_eq!(pod.tolerations.len(), 1);
        assert_eq!(pod.affinity, Some(serde_json::json!({ "nodeAffinity": {} })));
        assert_eq!(pod.runtime_class_name.as_deref(), Some("gvisor"));
    }
}
