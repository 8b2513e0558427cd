//! Document session state machine.
//!
//! ```text
//! Empty ──source──▶ Loading ──open──▶ Ready
//!                      │                ▲
//!                  encrypted            │ unlocked
//!                      ▼                │
//!                  Unlocking ───────────┘
//!                      │
//!                      └──▶ Failed(PasswordRequired | InvalidPassword)
//! ```
//!
//! Any state returns to `Loading` when a new attempt begins. The session
//! owns the open document handle, the current page and any decrypted copy,
//! and releases all three before the next attempt starts. Results are
//! tagged with a [`Stamp`]; results from superseded attempts are closed and
//! dropped without changing state.

use crate::error::{FailureKind, ViewerError};
use crate::unlock::{DecryptedCopy, OpenedDocument};
use pdf_engine::{DocumentHandle, PageSize, PdfEngine};
use pdfview_scheduler::{Generation, Stamp};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Loading,
    Unlocking,
    Ready,
    Failed(FailureKind),
}

/// Geometry of the page currently shown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageDescriptor {
    pub index: u32,
    pub size: PageSize,
}

/// What a successful load committed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadyDocument {
    pub page_count: u32,
    pub page: PageDescriptor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSelection {
    pub page: PageDescriptor,
    /// False when the same page was selected again.
    pub changed: bool,
}

#[derive(Debug)]
struct LiveDocument {
    handle: DocumentHandle,
    page_count: u32,
    decrypted: Option<DecryptedCopy>,
}

#[derive(Debug)]
pub struct DocumentSession {
    state: SessionState,
    generation: Generation,
    document: Option<LiveDocument>,
    page: Option<PageDescriptor>,
    /// Latest requested page, applied when a load completes.
    requested_page: u32,
}

impl Default for DocumentSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Empty,
            generation: Generation::new(),
            document: None,
            page: None,
            requested_page: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Stamp of the current attempt.
    pub fn stamp(&self) -> Stamp {
        self.generation.stamp()
    }

    pub fn handle(&self) -> Option<DocumentHandle> {
        self.document.as_ref().map(|doc| doc.handle)
    }

    pub fn page_count(&self) -> Option<u32> {
        self.document.as_ref().map(|doc| doc.page_count)
    }

    pub fn page(&self) -> Option<PageDescriptor> {
        self.page
    }

    pub fn requested_page(&self) -> u32 {
        self.requested_page
    }

    pub fn decrypted_path(&self) -> Option<&Path> {
        self.document.as_ref().and_then(|doc| doc.decrypted.as_ref()).map(DecryptedCopy::path)
    }

    /// Releases the current document and enters `Loading`. The returned
    /// stamp tags the new attempt.
    pub fn begin_loading(&mut self, engine: &dyn PdfEngine) -> Stamp {
        self.release(engine);
        self.state = SessionState::Loading;
        let stamp = self.generation.advance();
        log::debug!("session attempt {}: loading", stamp.value());
        stamp
    }

    /// Records that the current attempt is unlocking an encrypted file.
    pub fn mark_unlocking(&mut self, stamp: &Stamp) -> bool {
        if self.is_current(stamp) && self.state == SessionState::Loading {
            self.state = SessionState::Unlocking;
            log::debug!("session attempt {}: unlocking", stamp.value());
            true
        } else {
            false
        }
    }

    /// Commits the outcome of an attempt.
    ///
    /// Returns `None` for a superseded attempt; a document it opened is
    /// closed here. On success the requested page (clamped) is opened before
    /// the session reports `Ready`.
    pub fn complete(
        &mut self,
        stamp: &Stamp,
        result: Result<OpenedDocument, ViewerError>,
        engine: &dyn PdfEngine,
    ) -> Option<Result<ReadyDocument, ViewerError>> {
        let in_flight = matches!(self.state, SessionState::Loading | SessionState::Unlocking);
        if !self.is_current(stamp) || !in_flight {
            if let Ok(opened) = result {
                log::debug!("discarding superseded document {}", opened.handle.raw());
                close_quietly(engine, opened.handle);
            }
            return None;
        }

        let opened = match result {
            Ok(opened) => opened,
            Err(err) => return Some(Err(self.fail(err))),
        };

        let page_count = opened.page_count;
        self.document = Some(LiveDocument {
            handle: opened.handle,
            page_count,
            decrypted: opened.decrypted,
        });

        match self.open_page(engine, self.requested_page) {
            Ok(page) => {
                self.state = SessionState::Ready;
                log::debug!(
                    "session attempt {}: ready with {} pages, showing page {}",
                    stamp.value(),
                    page_count,
                    page.index
                );
                Some(Ok(ReadyDocument { page_count, page }))
            }
            Err(err) => {
                self.release(engine);
                Some(Err(self.fail(err)))
            }
        }
    }

    /// Requests a page. Applied now when `Ready` (returns the selection),
    /// otherwise remembered for the next completed load (returns `None`).
    pub fn select_page(
        &mut self,
        engine: &dyn PdfEngine,
        index: u32,
    ) -> Option<Result<PageSelection, ViewerError>> {
        self.requested_page = index;
        if !self.is_ready() {
            return None;
        }

        let previous = self.page.map(|page| page.index);
        match self.open_page(engine, index) {
            Ok(page) => Some(Ok(PageSelection { page, changed: previous != Some(page.index) })),
            Err(err) => {
                self.release(engine);
                Some(Err(self.fail(err)))
            }
        }
    }

    /// Moves to `Failed` with the kind of `err`, handing `err` back.
    pub fn fail(&mut self, err: ViewerError) -> ViewerError {
        self.state = SessionState::Failed(FailureKind::from(&err));
        log::debug!("session failed: {err}");
        err
    }

    /// Releases everything and returns to `Empty`. Outstanding attempts
    /// become stale.
    pub fn close(&mut self, engine: &dyn PdfEngine) {
        self.release(engine);
        self.generation.advance();
        self.state = SessionState::Empty;
    }

    fn release(&mut self, engine: &dyn PdfEngine) {
        self.page = None;
        if let Some(doc) = self.document.take() {
            close_quietly(engine, doc.handle);
            if let Some(copy) = doc.decrypted {
                log::debug!("removing decrypted copy {}", copy.path().display());
            }
        }
    }

    fn open_page(&mut self, engine: &dyn PdfEngine, index: u32) -> Result<PageDescriptor, ViewerError> {
        let doc = self
            .document
            .as_ref()
            .ok_or_else(|| ViewerError::DocumentCorrupt("no open document".to_string()))?;

        let clamped = index.min(doc.page_count.saturating_sub(1));
        if clamped != index {
            log::debug!("page {index} clamped to {clamped}");
        }

        let size = engine
            .page_size(doc.handle, clamped)
            .map_err(|err| ViewerError::DocumentCorrupt(err.to_string()))?;
        let page = PageDescriptor { index: clamped, size };
        self.page = Some(page);
        Ok(page)
    }

    fn is_current(&self, stamp: &Stamp) -> bool {
        stamp.matches(&self.generation.stamp())
    }
}

fn close_quietly(engine: &dyn PdfEngine, handle: DocumentHandle) {
    if let Err(err) = engine.close(handle) {
        log::warn!("closing document {} failed: {err}", handle.raw());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{encrypted, plain, write_doc, ScriptedEngine};
    use crate::unlock::{open_document, SharedEngine};
    use std::sync::Arc;

    struct Fixture {
        engine: Arc<ScriptedEngine>,
        shared: SharedEngine,
        docs: tempfile::TempDir,
        temp: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let engine = Arc::new(ScriptedEngine::new());
            let shared: SharedEngine = engine.clone();
            Self {
                engine,
                shared,
                docs: tempfile::tempdir().unwrap(),
                temp: tempfile::tempdir().unwrap(),
            }
        }

        fn open(&self, name: &str, contents: &str, password: Option<&str>) -> Result<OpenedDocument, ViewerError> {
            let path = write_doc(self.docs.path(), name, contents);
            open_document(&self.shared, &path, password, self.temp.path(), &mut || {})
        }

        fn load(&self, session: &mut DocumentSession, contents: &str) -> Option<Result<ReadyDocument, ViewerError>> {
            let stamp = session.begin_loading(&*self.engine);
            let result = self.open("doc.pdf", contents, None);
            session.complete(&stamp, result, &*self.engine)
        }

        fn open_documents(&self) -> usize {
            self.engine.open_documents()
        }
    }

    #[test]
    fn test_load_reaches_ready_on_first_page() {
        let fixture = Fixture::new();
        let mut session = DocumentSession::new();
        assert_eq!(session.state(), SessionState::Empty);

        let ready = fixture.load(&mut session, &plain(&[(500.0, 1000.0), (612.0, 792.0)])).unwrap().unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(ready.page_count, 2);
        assert_eq!(ready.page, PageDescriptor { index: 0, size: PageSize::new(500.0, 1000.0) });
        assert_eq!(session.page_count(), Some(2));
    }

    #[test]
    fn test_pending_page_applies_on_completion_latest_wins() {
        let fixture = Fixture::new();
        let mut session = DocumentSession::new();
        let stamp = session.begin_loading(&*fixture.engine);

        assert!(session.select_page(&*fixture.engine, 1).is_none());
        assert!(session.select_page(&*fixture.engine, 2).is_none());

        let result = fixture.open("doc.pdf", &plain(&[(100.0, 100.0), (200.0, 200.0), (300.0, 300.0)]), None);
        let ready = session.complete(&stamp, result, &*fixture.engine).unwrap().unwrap();

        assert_eq!(ready.page.index, 2);
        assert_eq!(ready.page.size, PageSize::new(300.0, 300.0));
    }

    #[test]
    fn test_out_of_range_page_is_clamped() {
        let fixture = Fixture::new();
        let mut session = DocumentSession::new();
        let sizes = vec![(100.0, 100.0); 10];
        fixture.load(&mut session, &plain(&sizes)).unwrap().unwrap();

        let selection = session
            .select_page(&*fixture.engine, 15)
            .unwrap()
            .unwrap();

        assert_eq!(selection.page.index, 9);
        assert!(selection.changed);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn test_reselecting_same_page_is_unchanged() {
        let fixture = Fixture::new();
        let mut session = DocumentSession::new();
        fixture.load(&mut session, &plain(&[(100.0, 100.0), (100.0, 200.0)])).unwrap().unwrap();

        let first = session.select_page(&*fixture.engine, 1).unwrap().unwrap();
        let second = session.select_page(&*fixture.engine, 1).unwrap().unwrap();

        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(first.page, second.page);
    }

    #[test]
    fn test_superseded_attempt_is_closed_and_ignored() {
        let fixture = Fixture::new();
        let mut session = DocumentSession::new();

        let stale = session.begin_loading(&*fixture.engine);
        let current = session.begin_loading(&*fixture.engine);

        let late = fixture.open("old.pdf", &plain(&[(100.0, 100.0)]), None);
        assert!(session.complete(&stale, late, &*fixture.engine).is_none());
        assert_eq!(fixture.open_documents(), 0);
        assert_eq!(session.state(), SessionState::Loading);

        let fresh = fixture.open("new.pdf", &plain(&[(200.0, 100.0)]), None);
        let ready = session.complete(&current, fresh, &*fixture.engine);
        assert!(matches!(ready, Some(Ok(_))));
        assert_eq!(fixture.open_documents(), 1);
    }

    #[test]
    fn test_new_attempt_releases_previous_document() {
        let fixture = Fixture::new();
        let mut session = DocumentSession::new();

        fixture.load(&mut session, &plain(&[(100.0, 100.0)])).unwrap().unwrap();
        fixture.load(&mut session, &plain(&[(100.0, 100.0)])).unwrap().unwrap();
        fixture.load(&mut session, &plain(&[(100.0, 100.0)])).unwrap().unwrap();

        assert_eq!(fixture.open_documents(), 1);
        assert_eq!(fixture.engine.closes(), 2);
    }

    #[test]
    fn test_unlocking_and_password_failure() {
        let fixture = Fixture::new();
        let mut session = DocumentSession::new();
        let stamp = session.begin_loading(&*fixture.engine);

        assert!(session.mark_unlocking(&stamp));
        assert_eq!(session.state(), SessionState::Unlocking);
        assert!(!session.mark_unlocking(&stamp));

        let result = fixture.open("locked.pdf", &encrypted("pw", &[(100.0, 100.0)]), None);
        let outcome = session.complete(&stamp, result, &*fixture.engine).unwrap();

        assert!(matches!(outcome, Err(ViewerError::PasswordRequired)));
        assert_eq!(session.state(), SessionState::Failed(FailureKind::PasswordRequired));
    }

    #[test]
    fn test_decrypted_copy_is_held_and_replaced() {
        let fixture = Fixture::new();
        let mut session = DocumentSession::new();
        let contents = encrypted("pw", &[(100.0, 100.0)]);

        let stamp = session.begin_loading(&*fixture.engine);
        let result = fixture.open("locked.pdf", &contents, Some("pw"));
        session.complete(&stamp, result, &*fixture.engine).unwrap().unwrap();
        let first = session.decrypted_path().unwrap().to_path_buf();
        assert!(first.exists());

        let stamp = session.begin_loading(&*fixture.engine);
        assert!(!first.exists());
        let result = fixture.open("locked.pdf", &contents, Some("pw"));
        session.complete(&stamp, result, &*fixture.engine).unwrap().unwrap();

        assert_eq!(std::fs::read_dir(fixture.temp.path()).unwrap().count(), 1);

        session.close(&*fixture.engine);
        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(std::fs::read_dir(fixture.temp.path()).unwrap().count(), 0);
        assert_eq!(fixture.open_documents(), 0);
    }

    #[test]
    fn test_failed_session_can_load_again() {
        let fixture = Fixture::new();
        let mut session = DocumentSession::new();

        let failed = fixture.load(&mut session, "not a pdf").unwrap();
        assert!(failed.is_err());
        assert_eq!(session.state(), SessionState::Failed(FailureKind::DocumentCorrupt));
        assert!(session.select_page(&*fixture.engine, 0).is_none());

        fixture.load(&mut session, &plain(&[(100.0, 100.0)])).unwrap().unwrap();
        assert!(session.is_ready());
    }

    #[test]
    fn test_completion_after_close_is_ignored() {
        let fixture = Fixture::new();
        let mut session = DocumentSession::new();
        let stamp = session.begin_loading(&*fixture.engine);
        session.close(&*fixture.engine);

        let result = fixture.open("doc.pdf", &plain(&[(100.0, 100.0)]), None);
        assert!(session.complete(&stamp, result, &*fixture.engine).is_none());
        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(fixture.open_documents(), 0);
    }
}
