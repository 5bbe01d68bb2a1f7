pub mod error;
pub use error::CoreError;

pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

pub mod config;
pub use config::ControllerConfig;

pub mod store;
pub use store::{Api, MemoryStore, ObjectKey, Store, StoreError, WatchEvent, WatchOp};

pub mod context;
pub use context::{
    AggregatedFile, ContentAggregator, ContextBundle, ContextResolver, DirectoryMount, Provenance,
    RepositoryMount, Resolved, ResolvedFile, storage_key,
};

pub mod job;
pub use job::JobBuilder;
