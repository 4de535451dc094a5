//! # Job Broker
//!
//! Asynchronous job execution core of a multi-tenant platform.
//!
//! Producers (event triggers, webhooks, manual user actions) hand a
//! `JobRequest` to a [`core::Broker`]. The broker persists it as a `Job` in
//! the tenant's document store, queues it per worker type and runs it on a
//! bounded pool of tokio tasks, retrying failures and enforcing a timeout on
//! each attempt. Every state change is announced on the tenant's notification
//! hub so callers can block until a job finishes.
//!
//! ## Lifecycle
//!
//! ```text
//! push_job ──▶ Queued ──▶ Running ──▶ Done
//!                            │
//!                            └──▶ Errored   (attempts exhausted)
//! ```
//!
//! Requests flagged `debounced` with a trigger id are folded into the pending
//! job of the same tenant, worker type and trigger instead of queuing a second
//! job.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use job_broker::builders::build_broker;
//! use job_broker::config::JobsConfig;
//! use job_broker::core::{handler_fn, wait_until_done, JobRequest, Message, Services, Tenant};
//! use job_broker::infra::{InMemoryHub, InMemoryStore};
//!
//! let cfg = JobsConfig::from_json_str(r#"{"workers": {"thumbnail": {"concurrency": 2}}}"#)?;
//! let services = Services::new(Arc::new(InMemoryStore::new()), Arc::new(InMemoryHub::new()));
//! let broker = build_broker(&cfg, services.clone(), |_worker_type| {
//!     Some(handler_fn(|ctx| async move {
//!         ctx.info("resizing");
//!         Ok(())
//!     }))
//! })?;
//!
//! let tenant = Tenant::new("alice.example.net");
//! let req = JobRequest::new("thumbnail").with_message(Message::new(&serde_json::json!({"file": "f1"}))?);
//! let job = broker.push_job(&tenant, req).await?;
//! wait_until_done(&services, &tenant, &job).await?;
//! broker.shutdown_workers(Duration::from_secs(5)).await?;
//! ```

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Job record, queues, executors and collaborator contracts.
pub mod core;
/// Configuration models for worker types and backends.
pub mod config;
/// Builders to construct brokers from configuration.
pub mod builders;
/// In-memory adapters for queues, stores, hubs and brokers.
pub mod infra;
/// Shared utilities.
pub mod util;
