//! A single-node relational database engine's storage core.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Catalog / Executor (catalog/)                │
//! │   databases, tables, primary/foreign keys, dominance, indexes   │
//! │        insert / update / delete / search with constraints       │
//! └─────────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────────┐
//! │      RecordManager (record/)       │     IndexManager (index/)  │
//! │  slotted heap file, typed tuples   │  persistent B+ tree over   │
//! │  (§4.4)                            │  fixed-width int tuples    │
//! └─────────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 BufferPool (buffer/)                            │
//! │   fixed-capacity page cache, LRU victim choice, write-back       │
//! └─────────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 FileStore (storage/)                             │
//! │        durable 8 KiB page I/O, directory management               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - shared primitives: `PageId`, `FrameId`, `FileHandle`,
//!   bit-packing helpers (`bitops`), and engine-wide constants (`config`).
//! - [`storage`] - page buffers and the `FileStore` (§4.1).
//! - [`buffer`] - the `BufferPoolManager` page cache (§4.2).
//! - [`record`] - typed tuples over a slotted heap file (§4.4).
//! - [`index`] - the persistent B+ tree `IndexManager` (§4.5).
//! - [`catalog`] - the `SystemManager` catalog/executor (§4.6).
//! - [`error`] - the crate-wide `DbError`/`Result`.
//!
//! # Quick start
//! ```no_run
//! use dbcore::catalog::SystemManager;
//!
//! let mut system = SystemManager::new().unwrap();
//! system.create_database("shop").unwrap();
//! system.use_database("shop").unwrap();
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod error;
pub mod index;
pub mod record;
pub mod storage;

pub use common::config::PAGE_SIZE;
pub use common::{FileHandle, FrameId, PageId};
pub use error::{DbError, Result};

pub use buffer::{BufferPoolManager, BufferPoolStats, Frame, StatsSnapshot};
pub use catalog::SystemManager;
pub use index::IndexManager;
pub use record::RecordManager;
pub use storage::{FileStore, Page};
