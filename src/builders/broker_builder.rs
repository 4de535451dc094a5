//! Builders to construct a broker and its worker list from configuration.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BrokerBackendConfig, JobsConfig};
use crate::core::{
    Broker, HandlerError, JobError, Services, WorkerConfig, WorkerContext, WorkerHandler, WorkersList,
};
use crate::infra::InMemoryBroker;

/// Resolve every configured worker type and attach its handler.
///
/// Disabled worker types (concurrency 0) need no handler: their jobs are
/// accepted and stay queued.
///
/// # Errors
///
/// `JobError::Config` when the configuration is invalid or an enabled worker
/// type has no handler.
pub fn build_workers_list<F>(cfg: &JobsConfig, mut handler_factory: F) -> Result<WorkersList, JobError>
where
    F: FnMut(&str) -> Option<Arc<dyn WorkerHandler>>,
{
    cfg.validate()
        .map_err(|e| JobError::Config(format!("config invalid: {e}")))?;

    let mut workers = Vec::new();
    for resolved in cfg.resolve() {
        let handler: Arc<dyn WorkerHandler> = match handler_factory(&resolved.worker_type) {
            Some(handler) => handler,
            None if resolved.concurrency == 0 => Arc::new(Unavailable),
            None => {
                return Err(JobError::Config(format!(
                    "no handler registered for worker `{}`",
                    resolved.worker_type
                )));
            }
        };
        workers.push(WorkerConfig {
            worker_type: resolved.worker_type,
            concurrency: resolved.concurrency,
            max_exec_count: resolved.max_exec_count,
            timeout: resolved.timeout,
            retry_delay: resolved.retry_delay,
            max_exec_time: resolved.max_exec_time,
            reserved: resolved.reserved,
            handler,
        });
    }
    Ok(workers)
}

/// Build the configured broker backend and start its workers.
///
/// # Errors
///
/// See [`build_workers_list`].
pub fn build_broker<F>(cfg: &JobsConfig, services: Services, handler_factory: F) -> Result<Arc<dyn Broker>, JobError>
where
    F: FnMut(&str) -> Option<Arc<dyn WorkerHandler>>,
{
    let workers = build_workers_list(cfg, handler_factory)?;
    let broker: Arc<dyn Broker> = match cfg.backend {
        BrokerBackendConfig::InMemory => Arc::new(InMemoryBroker::new(services)),
    };
    broker.start_workers(workers)?;
    Ok(broker)
}

/// Handler of disabled worker types; never invoked since they have no slot.
struct Unavailable;

#[async_trait]
impl WorkerHandler for Unavailable {
    async fn execute(&self, ctx: WorkerContext) -> Result<(), HandlerError> {
        Err(HandlerError::permanent(format!(
            "worker `{}` is disabled",
            ctx.job().worker_type
        )))
    }
}
