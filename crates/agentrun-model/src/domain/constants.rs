/// Label carried by every generated unit-of-work pod naming its task.
pub const LABEL_TASK: &str = "agentrun.io/task";

/// Label set on tasks created by a batch run.
pub const LABEL_BATCH: &str = "agentrun.io/batch";

/// Label set on tasks created by a cron task.
pub const LABEL_CRON: &str = "agentrun.io/cron";

/// Annotation that pauses a batch run while present (any value except `"false"`).
pub const ANNOTATION_BATCH_PAUSED: &str = "agentrun.io/paused";

/// File name of the default context file inside the working directory.
pub const DEFAULT_TASK_FILE: &str = "task.md";

/// Working directory used when a profile does not set one.
pub const DEFAULT_WORKING_DIR: &str = "/workspace";

/// Volume backing the aggregated context files.
pub const CONTEXT_VOLUME: &str = "context-files";

/// Clone depth for repository contexts without an explicit depth.
pub const DEFAULT_GIT_DEPTH: u32 = 1;

/// Revision for repository contexts without an explicit ref.
pub const DEFAULT_GIT_REF: &str = "HEAD";

/// Permission mode for credential files without an explicit mode (`0600`).
pub const DEFAULT_FILE_MODE: u32 = 0o600;
