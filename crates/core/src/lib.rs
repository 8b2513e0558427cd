//! PDF view core.
//!
//! Binds the document backend, the geometry engine, the tile scheduler and
//! the document cache into a single controller, [`PdfView`], driven by host
//! property changes and gestures.
//!
//! ```no_run
//! use std::sync::Arc;
//! use pdf_engine::LopdfEngine;
//! use pdfview_cache::{CacheConfig, DocumentCache};
//! use pdfview_core::{PdfView, ViewerConfig};
//! use pdfview_scheduler::{WorkerPool, WorkerPoolConfig};
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::new(2)).unwrap();
//! let mut view = PdfView::new(
//!     ViewerConfig::default(),
//!     Arc::new(LopdfEngine::new()),
//!     Arc::new(DocumentCache::new(CacheConfig::default())),
//!     Arc::new(pool),
//! );
//! view.set_viewport_size(1080.0, 1920.0);
//! view.set_source("/path/to/document.pdf");
//!
//! // In the host's frame callback:
//! view.pump();
//! view.tick();
//! for event in view.drain_events() {
//!     println!("{event:?}");
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod session;
pub mod unlock;
pub mod view;

#[cfg(test)]
mod testing;

pub use config::{ConfigLoadError, ViewerConfig};
pub use error::{FailureKind, ViewerError};
pub use events::ViewerEvent;
pub use session::{DocumentSession, PageDescriptor, PageSelection, ReadyDocument, SessionState};
pub use unlock::{open_document, unlock, DecryptedCopy, OpenedDocument, SharedEngine};
pub use view::PdfView;
