//! Core job abstractions: the job record, its queues and executors, and the
//! contracts of the store and hub they rely on.

pub mod error;
pub mod blob;
pub mod store;
pub mod realtime;
pub mod services;
pub mod job;
pub mod executor;
pub mod queue;
pub mod worker_pool;
pub mod broker;
pub mod wait;
pub mod listing;

pub use error::{AppResult, JobError, StoreError};
pub use blob::{Event, Message, Payload};
pub use store::{AllDocsRequest, DocMeta, DocumentStore, FindRequest, Prefixer, Selector, Tenant};
pub use realtime::{Hub, RealtimeEvent, Subscriber, Verb};
pub use services::Services;
pub use job::{get, Job, JobOptions, JobRequest, Origin, State, JOBS_DOCTYPE, JOBS_LOGS_DOCTYPE};
pub use executor::{handler_fn, HandlerError, HandlerFn, LogLevel, WorkerContext, WorkerHandler};
pub use queue::{DebounceKey, JobQueue, Pushed};
pub use worker_pool::{PoolStats, WorkerConfig, WorkerPool, WorkersList};
pub use broker::Broker;
pub use wait::{wait_until_done, wait_until_done_timeout, WAIT_UNTIL_DONE_TIMEOUT};
pub use listing::{
    filter_by_worker_and_state, filter_jobs_before_date, get_all_jobs, get_all_jobs_paged, get_lasts_jobs,
    get_queued_jobs, StateLimits,
};
