//! # league-cache: Cache-Aside Infrastructure
//!
//! `league-cache` wraps a pluggable key-value backend with the cache-aside
//! pattern: reads consult the cache first and fall back to a caller-supplied
//! loader, population after a miss happens off the request path, and
//! invalidation on write is awaited so readers never see stale entries the
//! writer knew about.
//!
//! - **Storage agnostic**: any backend implementing [`KvStore`] works; an
//!   in-process [`MemoryKv`] is included
//! - **Failure isolation**: a broken cache backend degrades reads to loader
//!   calls instead of failing them
//! - **Typed entries**: payloads are JSON-encoded via serde, one
//!   [`CacheAside`] per entity collection
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use league_cache::{CacheAside, KvStore, MemoryKv};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Team { id: u32, name: String }
//!
//! # async fn demo() -> Result<(), std::convert::Infallible> {
//! let store: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
//! let teams: CacheAside<Team> = CacheAside::new(store, "teams")
//!     .with_ttl(std::time::Duration::from_secs(300));
//!
//! let team = teams
//!     .get_one("7", || async {
//!         // load from the database on a miss
//!         Ok::<Option<Team>, std::convert::Infallible>(None)
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod aside;
pub mod error;
pub mod kv;

pub use aside::CacheAside;
pub use error::{CacheError, CacheResult};
pub use kv::{KvStore, MemoryKv};
