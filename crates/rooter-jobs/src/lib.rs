//! # rooter-jobs
//!
//! Fingerprinting pipeline for rooter.
//!
//! This crate provides:
//! - [`JobIntake`]: accepts payloads and answers polls
//! - [`BatchWorker`]: one locked run over a bounded batch of Pending jobs
//! - [`HasherRegistry`] and [`CommandHasher`]: namespace dispatch to
//!   external hash commands
//! - [`WorkerLock`]: host-local single-writer lock
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rooter_db::{Database, ScratchDir};
//! use rooter_jobs::{BatchWorker, HasherRegistry, HasherSettings, RunOutcome, WorkerConfig};
//!
//! let db = Database::connect("postgres://...").await?;
//! let registry = HasherRegistry::from_settings(&HasherSettings::from_env())?;
//! let worker = BatchWorker::new(
//!     db,
//!     ScratchDir::new("/tmp/rooter-queue"),
//!     Arc::new(registry),
//!     WorkerConfig::from_env(),
//! );
//!
//! if let RunOutcome::Completed(report) = worker.run_once().await? {
//!     println!("{} jobs done", report.completed);
//! }
//! ```

pub mod hasher;
pub mod intake;
pub mod lock;
pub mod registry;
pub mod telemetry;
pub mod worker;

// Re-export core types
pub use rooter_core::*;

pub use hasher::CommandHasher;
pub use intake::{JobIntake, PollStatus};
pub use lock::{WorkerLock, WorkerLockGuard};
pub use registry::{HasherRegistry, HasherSettings};
pub use worker::{BatchWorker, JobFailure, RunOutcome, RunReport, WorkerConfig};
