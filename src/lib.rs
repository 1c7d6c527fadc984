//! # canvas_core
//!
//! The local data layer of a capture panel: users collect text snippets,
//! images and links into projects ("canvases"), and everything is kept in an
//! embedded SQLite database.
//!
//! ## Features
//!
//! - **Projects**: create, rename, delete (cascading to their nodes), and list
//!   with node counts; one distinguished Inbox always exists
//! - **Ordering**: nodes are appended to the end of their project and can be
//!   reordered atomically; deleting never renumbers the rest
//! - **Text versions**: each text node keeps its captured original next to
//!   the latest edit
//! - **Undo**: deleted nodes are handed back and can be restored
//! - **Pluggable storage**: all logic runs against the [`store::CanvasRepository`]
//!   trait; a SQLite store and an in-memory fake ship with the crate
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use canvas_core::{CanvasManager, StoreConfig};
//!
//! # async fn run() -> canvas_core::CanvasResult<()> {
//! let manager = CanvasManager::open(&StoreConfig::from_env()?).await?;
//! let inbox = manager.ensure_inbox_exists().await?;
//!
//! let node = manager
//!     .capture_text(inbox.id, "a sentence worth keeping", None, None)
//!     .await?;
//! manager.update_text_node(node.id, "a sentence worth keeping, edited").await?;
//!
//! for node in manager.list_nodes(inbox.id).await? {
//!     println!("{} {:?}", node.order, node.text);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`CanvasResult<T>`]. [`CanvasError::kind`] sorts any
//! failure into not-found, invalid-argument, or storage failure.

pub mod canvas;
pub mod config;
pub mod domain;
pub mod error;
pub mod store;

pub use canvas::CanvasManager;
pub use config::StoreConfig;
pub use error::{CanvasError, CanvasResult, ErrorKind};
