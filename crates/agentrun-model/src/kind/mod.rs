mod context;
pub use context::{
    ConfigMapSource, ContextItem, ContextSource, GitSource, ReusableContext, ReusableContextSpec,
    ReusableSource,
};

mod config_map;
pub use config_map::ConfigMap;

mod profile;
pub use profile::{
    Credential, ExecutionProfile, ExecutionProfileSpec, Scheduling, SecretKeyRef, Toleration,
};

mod task;
pub use task::{Task, TaskPhase, TaskSpec, TaskStatus};

mod batch;
pub use batch::{BatchCounters, BatchPhase, BatchRun, BatchRunSpec, BatchRunStatus, BatchTaskPhase, BatchTaskStatus};

mod cron;
pub use cron::{ConcurrencyPolicy, CronTask, CronTaskSpec, CronTaskStatus};

mod job;
pub use job::{
    Container, EnvVar, EnvVarSource, Job, JobSpec, JobStatus, KeyToPath, PodSpec, PodTemplate,
    Volume, VolumeMount, VolumeSource,
};
