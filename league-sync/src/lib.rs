//! # league-sync: Fantasy-League Data Synchronization Backend
//!
//! `league-sync` keeps a local source of truth and its caches in step with
//! an upstream fantasy-football data provider. All synchronization runs as
//! background jobs on a durable queue ([`league_queue`]); reads go through
//! a cache-aside layer ([`league_cache`]).
//!
//! - **Typed jobs**: a closed [`JobType`] enum with exhaustive handler
//!   registration - no stringly dispatch
//! - **One pipeline**: every sync is fetch → transform → upsert →
//!   cache-refresh, with step-tagged errors deciding retryability
//! - **Explicit wiring**: collaborators live in a [`Dependencies`] struct
//!   built once at startup; lifecycle is `connect` / `disconnect`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use league_sync::{
//!     Dependencies, EnqueueOptions, JobType, SyncConfig, SyncService, UpstreamClient,
//! };
//!
//! # async fn demo(upstream: Arc<dyn UpstreamClient>) -> league_queue::QueueResult<()> {
//! let deps = Dependencies::in_memory(upstream);
//! let service = SyncService::new(deps, SyncConfig::default())?;
//! service.connect().await?;
//!
//! service
//!     .enqueue_sync(JobType::Bootstrap, EnqueueOptions::default())
//!     .await?;
//!
//! service.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod deps;
pub mod error;
pub mod handlers;
pub mod job;
pub mod model;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod upstream;

pub use config::{CacheTtls, SyncConfig};
pub use deps::{Caches, Dependencies, SyncContext};
pub use error::{StoreError, SyncError, SyncStep, UpstreamError};
pub use handlers::build_dispatcher;
pub use job::{JobType, Operation, SyncPayload};
pub use model::{Entity, Event, LiveStat, Phase, Player, Team};
pub use service::{EnqueueOptions, JobView, SyncService};
pub use store::{EntityStore, MemoryEntityStore};
pub use upstream::{RawBootstrap, UpstreamClient};
