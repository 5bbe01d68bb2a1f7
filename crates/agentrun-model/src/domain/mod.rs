mod meta;
pub(crate) use meta::impl_resource;
pub use meta::{ObjectMeta, OwnerReference, Resource};

mod condition;
pub use condition::{Condition, ConditionStatus, set_condition};

mod constants;
pub use constants::{
    ANNOTATION_BATCH_PAUSED, CONTEXT_VOLUME, DEFAULT_FILE_MODE, DEFAULT_GIT_DEPTH, DEFAULT_GIT_REF,
    DEFAULT_TASK_FILE, DEFAULT_WORKING_DIR, LABEL_BATCH, LABEL_CRON, LABEL_TASK,
};
