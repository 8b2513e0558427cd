//! Document backend boundary.
//!
//! Everything above this crate talks to documents through [`PdfEngine`]: open a
//! source, ask for page geometry, rasterize a page region into a caller-owned
//! buffer, and produce a decrypted plaintext copy of an access-restricted file.
//! Handles are plain tokens; the engine owns the parsed state behind them until
//! [`PdfEngine::close`] is called.

use image::{ImageBuffer, Rgba};
use lopdf::encryption::DecryptionError;
use lopdf::{Document, LoadOptions, Object, ObjectId};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(any(test, feature = "test-support"))]
pub mod fixtures;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Fill used for page paper and for tiles that failed to rasterize.
pub const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);

const FRAME: Rgba<u8> = Rgba([220, 220, 220, 255]);
const OUTSIDE_PAGE: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// US Letter, used when a page carries no usable box.
const DEFAULT_PAGE_SIZE: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

/// Guards against cyclic `/Parent` chains in malformed page trees.
const MAX_INHERIT_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    /// For engines implemented outside this crate.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    pub fn new(width_pt: f32, height_pt: f32) -> Self {
        Self { width_pt, height_pt }
    }

    pub fn longest_side(&self) -> f32 {
        self.width_pt.max(self.height_pt)
    }
}

/// Region of a page in page points, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ClipRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn full_page(size: PageSize) -> Self {
        Self { x: 0.0, y: 0.0, width: size.width_pt, height: size.height_pt }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    /// Output pixels per page point.
    pub scale: f32,
    pub clip: Option<ClipRect>,
    pub antialias: bool,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_index: 0, scale: 1.0, clip: None, antialias: true }
    }
}

impl RenderRequest {
    pub fn effective_scale(&self) -> f32 {
        if self.scale.is_finite() && self.scale > 0.0 {
            self.scale
        } else {
            1.0
        }
    }

    /// Pixel dimensions of the output for a page of the given size.
    pub fn output_size(&self, page: PageSize) -> (u32, u32) {
        let scale = self.effective_scale();
        let clip = self.clip.unwrap_or(ClipRect::full_page(page));
        let width = (clip.width * scale).round().max(1.0) as u32;
        let height = (clip.height * scale).round().max(1.0) as u32;
        (width, height)
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("document has no pages")]
    NoPages,
    #[error("document is encrypted and must be unlocked before opening")]
    Encrypted,
    #[error("invalid password")]
    InvalidPassword,
    #[error("unsupported encryption: {0}")]
    UnsupportedEncryption(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// A document backend shared between the host thread and background tasks.
///
/// Every method takes `&self`. Implementations guard their handle table with
/// a short-lived lock and parse, decrypt and rasterize outside it, so a slow
/// open never stalls a page size lookup on another thread.
pub trait PdfEngine: Send + Sync {
    /// Opens a document. Access-restricted documents fail with
    /// [`PdfEngineError::Encrypted`]; callers recover through [`PdfEngine::decrypt_to`].
    fn open(&self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError>;

    /// Rasterizes `request` into `target`. The target's dimensions are the
    /// output size; callers size it with [`RenderRequest::output_size`].
    fn render_into(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
        target: &mut RgbaImage,
    ) -> Result<(), PdfEngineError>;

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError> {
        let page = self.page_size(handle, request.page_index)?;
        let (width, height) = request.output_size(page);
        let mut image = RgbaImage::from_pixel(width, height, PAPER);
        self.render_into(handle, request, &mut image)?;
        Ok(image)
    }

    /// Writes a plaintext copy of `source` to `dest`, unlocking it with `password`.
    ///
    /// A password the security handler rejects is [`PdfEngineError::InvalidPassword`];
    /// a handler that cannot be evaluated at all is
    /// [`PdfEngineError::UnsupportedEncryption`].
    fn decrypt_to(
        &self,
        source: &Path,
        password: &str,
        dest: &Path,
    ) -> Result<(), PdfEngineError>;

    fn close(&self, handle: DocumentHandle) -> Result<(), PdfEngineError>;
}

type HandleTable<T> = Mutex<HashMap<DocumentHandle, T>>;

fn table<T>(docs: &HandleTable<T>) -> MutexGuard<'_, HashMap<DocumentHandle, T>> {
    docs.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_source(source: OpenSource) -> Result<Vec<u8>, PdfEngineError> {
    Ok(match source {
        OpenSource::Path(path) => fs::read(path)?,
        OpenSource::Bytes(bytes) => bytes,
    })
}

fn lookup_size(sizes: &[PageSize], page_index: u32) -> Result<PageSize, PdfEngineError> {
    sizes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
        page: page_index,
        page_count: sizes.len() as u32,
    })
}

/// Pure-Rust backend. Page geometry and decryption come from lopdf; the
/// rasterizer paints the page paper and frame for the requested region.
#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: AtomicU64,
    docs: HandleTable<Vec<PageSize>>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_documents(&self) -> usize {
        table(&self.docs).len()
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, PdfEngineError> {
        // Files whose user password is empty come back already decrypted.
        let doc = Document::load_mem(bytes)?;
        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(PdfEngineError::Encrypted);
        }

        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (_, object_id) in pages {
            let size = inherited(&doc, object_id, b"CropBox")
                .and_then(rect_size)
                .or_else(|| inherited(&doc, object_id, b"MediaBox").and_then(rect_size))
                .unwrap_or(DEFAULT_PAGE_SIZE);

            let rotation = inherited(&doc, object_id, b"Rotate")
                .and_then(|obj| obj.as_i64().ok())
                .unwrap_or(0)
                .rem_euclid(360);

            if rotation == 90 || rotation == 270 {
                sizes.push(PageSize::new(size.height_pt, size.width_pt));
            } else {
                sizes.push(size);
            }
        }

        if sizes.is_empty() {
            return Err(PdfEngineError::NoPages);
        }

        Ok(sizes)
    }

    fn with_sizes<T>(
        &self,
        handle: DocumentHandle,
        f: impl FnOnce(&[PageSize]) -> Result<T, PdfEngineError>,
    ) -> Result<T, PdfEngineError> {
        let docs = table(&self.docs);
        let sizes = docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))?;
        f(sizes)
    }
}

impl PdfEngine for LopdfEngine {
    fn open(&self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = read_source(source)?;
        let page_sizes = Self::parse_sizes(&bytes)?;

        let handle = DocumentHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        log::debug!("opened document {} with {} pages", handle.raw(), page_sizes.len());
        table(&self.docs).insert(handle, page_sizes);

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        self.with_sizes(handle, |sizes| Ok(sizes.len() as u32))
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        self.with_sizes(handle, |sizes| lookup_size(sizes, page_index))
    }

    fn render_into(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
        target: &mut RgbaImage,
    ) -> Result<(), PdfEngineError> {
        let page = self.page_size(handle, request.page_index)?;
        paint_page_frame(page, &request, target);
        Ok(())
    }

    fn decrypt_to(
        &self,
        source: &Path,
        password: &str,
        dest: &Path,
    ) -> Result<(), PdfEngineError> {
        let bytes = fs::read(source)?;
        let loaded = Document::load_mem(&bytes)?;

        let mut doc = if loaded.trailer.get(b"Encrypt").is_ok() {
            authenticate(&loaded, password)?;
            Document::load_mem_with_options(&bytes, LoadOptions::with_password(password)).map_err(
                |err| match err {
                    lopdf::Error::InvalidPassword => PdfEngineError::InvalidPassword,
                    other => PdfEngineError::Parse(other),
                },
            )?
        } else {
            loaded
        };

        // Saved without a security handler.
        doc.encryption_state = None;
        doc.trailer.remove(b"Encrypt");

        let mut file = fs::File::create(dest)?;
        doc.save_to(&mut file).map_err(|err| {
            PdfEngineError::Backend(format!("failed to write decrypted copy: {err}"))
        })?;

        Ok(())
    }

    fn close(&self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        table(&self.docs)
            .remove(&handle)
            .map(|_| ())
            .ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

/// Checks `password` against the document's security handler. Owner and
/// user passwords are both accepted.
fn authenticate(doc: &Document, password: &str) -> Result<(), PdfEngineError> {
    match doc.authenticate_password(password) {
        Ok(()) => Ok(()),
        Err(lopdf::Error::Decryption(
            DecryptionError::IncorrectPassword | DecryptionError::StringPrep(_),
        )) => Err(PdfEngineError::InvalidPassword),
        Err(err) => Err(PdfEngineError::UnsupportedEncryption(err.to_string())),
    }
}

/// Looks up a page attribute, walking `/Parent` links for inheritable keys.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;

    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = current.get(key) {
            return match value {
                Object::Reference(id) => doc.get_object(*id).ok(),
                other => Some(other),
            };
        }

        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }

    None
}

fn rect_size(obj: &Object) -> Option<PageSize> {
    let array = obj.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }

    let x0 = array[0].as_float().ok()?;
    let y0 = array[1].as_float().ok()?;
    let x1 = array[2].as_float().ok()?;
    let y1 = array[3].as_float().ok()?;

    let size = PageSize::new((x1 - x0).abs(), (y1 - y0).abs());
    (size.width_pt > 0.0 && size.height_pt > 0.0).then_some(size)
}

/// Paints paper inside the page bounds, a one pixel frame on the page edge and
/// leaves everything outside the page transparent.
fn paint_page_frame(page: PageSize, request: &RenderRequest, target: &mut RgbaImage) {
    let scale = request.effective_scale();
    let clip = request.clip.unwrap_or(ClipRect::full_page(page));

    let left = (-clip.x * scale).round() as i64;
    let top = (-clip.y * scale).round() as i64;
    let right = ((page.width_pt - clip.x) * scale).round() as i64 - 1;
    let bottom = ((page.height_pt - clip.y) * scale).round() as i64 - 1;
    let framed = right - left >= 3 && bottom - top >= 3;

    for (x, y, pixel) in target.enumerate_pixels_mut() {
        let (x, y) = (x as i64, y as i64);
        let inside = x >= left && x <= right && y >= top && y <= bottom;

        *pixel = if !inside {
            OUTSIDE_PAGE
        } else if framed && (x == left || x == right || y == top || y == bottom) {
            FRAME
        } else {
            PAPER
        };
    }
}

#[cfg(feature = "pdfium")]
pub mod pdfium_backend {
    use super::*;
    use pdfium_render::prelude::*;
    use std::sync::Arc;

    struct PdfiumRecord {
        document: PdfDocument<'static>,
        page_sizes: Vec<PageSize>,
    }

    /// Rasterizes real page content through PDFium. Decryption is shared with
    /// the lopdf backend, which can rewrite files without security.
    ///
    /// Each open document stays loaded until [`PdfEngine::close`]; tiles are
    /// rendered straight into tile-sized bitmaps.
    pub struct PdfiumEngine {
        pdfium: &'static Pdfium,
        next_handle: AtomicU64,
        docs: HandleTable<Arc<PdfiumRecord>>,
        rewriter: LopdfEngine,
    }

    impl PdfiumEngine {
        /// Binds the system PDFium library. The binding lives for the rest of
        /// the process so that loaded documents can outlive any one call.
        pub fn from_system_library() -> Result<Self, PdfEngineError> {
            let bindings = Pdfium::bind_to_system_library().map_err(|err| {
                PdfEngineError::Backend(format!("failed to bind pdfium system library: {err}"))
            })?;

            Ok(Self {
                pdfium: Box::leak(Box::new(Pdfium::new(bindings))),
                next_handle: AtomicU64::new(0),
                docs: Mutex::new(HashMap::new()),
                rewriter: LopdfEngine::default(),
            })
        }

        fn record(&self, handle: DocumentHandle) -> Result<Arc<PdfiumRecord>, PdfEngineError> {
            table(&self.docs)
                .get(&handle)
                .cloned()
                .ok_or(PdfEngineError::InvalidHandle(handle.raw()))
        }
    }

    fn map_pdfium(err: PdfiumError) -> PdfEngineError {
        match err {
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
                PdfEngineError::Encrypted
            }
            other => PdfEngineError::Backend(other.to_string()),
        }
    }

    fn pixels(value: u32) -> Result<Pixels, PdfEngineError> {
        Pixels::try_from(value)
            .map_err(|_| PdfEngineError::Backend(format!("bitmap dimension {value} too large")))
    }

    fn page_index(page: u32, page_count: u32) -> Result<PdfPageIndex, PdfEngineError> {
        PdfPageIndex::try_from(page).map_err(|_| PdfEngineError::PageOutOfRange { page, page_count })
    }

    impl PdfEngine for PdfiumEngine {
        fn open(&self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
            let bytes = read_source(source)?;
            let document = self.pdfium.load_pdf_from_byte_vec(bytes, None).map_err(map_pdfium)?;
            let page_sizes = document
                .pages()
                .iter()
                .map(|page| PageSize::new(page.width().value, page.height().value))
                .collect::<Vec<_>>();

            if page_sizes.is_empty() {
                return Err(PdfEngineError::NoPages);
            }

            let handle = DocumentHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
            table(&self.docs).insert(handle, Arc::new(PdfiumRecord { document, page_sizes }));
            Ok(handle)
        }

        fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
            Ok(self.record(handle)?.page_sizes.len() as u32)
        }

        fn page_size(
            &self,
            handle: DocumentHandle,
            page_index: u32,
        ) -> Result<PageSize, PdfEngineError> {
            lookup_size(&self.record(handle)?.page_sizes, page_index)
        }

        fn render_into(
            &self,
            handle: DocumentHandle,
            request: RenderRequest,
            target: &mut RgbaImage,
        ) -> Result<(), PdfEngineError> {
            let record = self.record(handle)?;
            let page_size = lookup_size(&record.page_sizes, request.page_index)?;
            let index = page_index(request.page_index, record.page_sizes.len() as u32)?;
            let page = record.document.pages().get(index).map_err(map_pdfium)?;

            // Page points are shifted to the clip origin, then scaled to pixels.
            let clip = request.clip.unwrap_or(ClipRect::full_page(page_size));
            let config = PdfRenderConfig::new()
                .set_fixed_size(pixels(target.width())?, pixels(target.height())?)
                .scale_page_by_factor(request.effective_scale())
                .translate(PdfPoints::new(-clip.x), PdfPoints::new(-clip.y))
                .map_err(map_pdfium)?
                .set_text_smoothing(request.antialias)
                .set_image_smoothing(request.antialias)
                .set_path_smoothing(request.antialias);

            let bitmap = page.render_with_config(&config).map_err(map_pdfium)?;
            let rendered = RgbaImage::from_raw(
                bitmap.width() as u32,
                bitmap.height() as u32,
                bitmap.as_rgba_bytes(),
            )
            .ok_or_else(|| PdfEngineError::Backend("pdfium returned a short bitmap".to_string()))?;

            if rendered.dimensions() != target.dimensions() {
                return Err(PdfEngineError::Backend(format!(
                    "pdfium rendered {:?}, expected {:?}",
                    rendered.dimensions(),
                    target.dimensions()
                )));
            }
            *target = rendered;

            Ok(())
        }

        fn decrypt_to(
            &self,
            source: &Path,
            password: &str,
            dest: &Path,
        ) -> Result<(), PdfEngineError> {
            self.rewriter.decrypt_to(source, password, dest)
        }

        fn close(&self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
            table(&self.docs)
                .remove(&handle)
                .map(|_| ())
                .ok_or(PdfEngineError::InvalidHandle(handle.raw()))
        }
    }

}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{
        encrypted_pdf, sample_pdf, sample_pdf_with_inherited_box, unsupported_encryption_pdf,
        Cipher,
    };
    use std::sync::Arc;
    use std::thread;

    const CIPHERS: [Cipher; 4] = [Cipher::Rc4V1, Cipher::Rc4V2, Cipher::Aes128, Cipher::Aes256];

    struct Files {
        dir: tempfile::TempDir,
    }

    impl Files {
        fn new() -> Self {
            Self { dir: tempfile::tempdir().unwrap() }
        }

        fn write(&self, name: &str, bytes: &[u8]) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::write(&path, bytes).unwrap();
            path
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }
    }

    #[test]
    fn opens_pdf_and_reads_page_geometry() {
        let engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(sample_pdf(&[(500.0, 1000.0), (842.0, 595.0)])))
            .expect("open should succeed");

        assert_eq!(engine.page_count(handle).expect("count should succeed"), 2);
        assert_eq!(engine.page_size(handle, 0).unwrap(), PageSize::new(500.0, 1000.0));
        assert_eq!(engine.page_size(handle, 1).unwrap(), PageSize::new(842.0, 595.0));
    }

    #[test]
    fn page_size_inherits_media_box_from_page_tree() {
        let engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(sample_pdf_with_inherited_box(300.0, 400.0, 90)))
            .expect("open should succeed");

        assert_eq!(engine.page_size(handle, 0).unwrap(), PageSize::new(400.0, 300.0));
    }

    #[test]
    fn page_out_of_range_is_reported() {
        let engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(sample_pdf(&[(100.0, 100.0)]))).unwrap();

        let err = engine.page_size(handle, 3).expect_err("page 3 does not exist");
        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 3, page_count: 1 }));
    }

    #[test]
    fn garbage_bytes_fail_to_parse() {
        let engine = LopdfEngine::new();
        let err = engine
            .open(OpenSource::Bytes(b"definitely not a pdf".to_vec()))
            .expect_err("garbage should not open");

        assert!(matches!(err, PdfEngineError::Parse(_)));
    }

    #[test]
    fn corrupt_file_mentioning_encrypt_is_not_treated_as_locked() {
        let engine = LopdfEngine::new();
        let err = engine
            .open(OpenSource::Bytes(b"%PDF-1.4\n1 0 obj << /Encrypt 2 0 R >>\n".to_vec()))
            .expect_err("a truncated file should not open");

        assert!(
            matches!(err, PdfEngineError::Parse(_) | PdfEngineError::NoPages),
            "unexpected error: {err:?}"
        );

        let files = Files::new();
        let source = files.write("truncated.pdf", b"%PDF-1.4\n1 0 obj << /Encrypt 2 0 R >>\n");
        if let Err(err) = engine.decrypt_to(&source, "secret", &files.path("out.pdf")) {
            assert!(
                !matches!(err, PdfEngineError::InvalidPassword | PdfEngineError::Encrypted),
                "unexpected error: {err:?}"
            );
        }
    }

    #[test]
    fn render_clip_matches_requested_output_size() {
        let engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(sample_pdf(&[(200.0, 100.0)]))).unwrap();

        let request = RenderRequest {
            page_index: 0,
            scale: 2.0,
            clip: Some(ClipRect::new(150.0, 0.0, 100.0, 50.0)),
            antialias: true,
        };
        let image = engine.render_page(handle, request).expect("render should succeed");

        assert_eq!((image.width(), image.height()), (200, 100));
        // Left half is page paper, the page ends at x = (200 - 150) * 2 = 100.
        assert_eq!(*image.get_pixel(10, 10), PAPER);
        assert_eq!(*image.get_pixel(99, 10), FRAME);
        assert_eq!(*image.get_pixel(150, 10), OUTSIDE_PAGE);
    }

    #[test]
    fn decrypt_to_rewrites_plain_documents() {
        let files = Files::new();
        let source = files.write("plain.pdf", &sample_pdf(&[(300.0, 300.0), (300.0, 300.0)]));
        let dest = files.path("copy.pdf");

        let engine = LopdfEngine::new();
        engine.decrypt_to(&source, "", &dest).expect("rewrite should succeed");

        let handle = engine.open(OpenSource::from(dest.as_path())).unwrap();
        assert_eq!(engine.page_count(handle).unwrap(), 2);
    }

    #[test]
    fn user_password_documents_report_encrypted() {
        let engine = LopdfEngine::new();

        for cipher in CIPHERS {
            let bytes = encrypted_pdf(&[(300.0, 400.0)], cipher, "secret", "owner");
            let err = engine.open(OpenSource::Bytes(bytes)).expect_err("locked document");
            assert!(matches!(err, PdfEngineError::Encrypted), "{cipher:?}: {err:?}");
        }
        assert_eq!(engine.open_documents(), 0);
    }

    #[test]
    fn empty_user_password_documents_open_directly() {
        let engine = LopdfEngine::new();

        for cipher in CIPHERS {
            let bytes = encrypted_pdf(&[(300.0, 400.0), (500.0, 600.0)], cipher, "", "owner");
            let handle = engine
                .open(OpenSource::Bytes(bytes))
                .unwrap_or_else(|err| panic!("{cipher:?} should open: {err:?}"));
            assert_eq!(engine.page_size(handle, 1).unwrap(), PageSize::new(500.0, 600.0));
        }
    }

    #[test]
    fn correct_password_decrypts_every_cipher() {
        let files = Files::new();
        let engine = LopdfEngine::new();

        for cipher in CIPHERS {
            let source = files.write(
                &format!("{cipher:?}.pdf"),
                &encrypted_pdf(&[(612.0, 792.0), (200.0, 100.0)], cipher, "secret", "owner"),
            );
            let dest = files.path(&format!("{cipher:?}-plain.pdf"));

            engine
                .decrypt_to(&source, "secret", &dest)
                .unwrap_or_else(|err| panic!("{cipher:?} should decrypt: {err:?}"));

            let handle = engine.open(OpenSource::from(dest.as_path())).unwrap();
            assert_eq!(engine.page_count(handle).unwrap(), 2, "{cipher:?}");
            assert_eq!(engine.page_size(handle, 1).unwrap(), PageSize::new(200.0, 100.0));
        }
    }

    #[test]
    fn owner_password_also_unlocks() {
        let files = Files::new();
        let source =
            files.write("aes.pdf", &encrypted_pdf(&[(100.0, 100.0)], Cipher::Aes128, "user", "owner"));
        let dest = files.path("plain.pdf");

        let engine = LopdfEngine::new();
        engine.decrypt_to(&source, "owner", &dest).expect("owner password should unlock");
        assert!(engine.open(OpenSource::from(dest.as_path())).is_ok());
    }

    #[test]
    fn wrong_password_is_invalid_for_every_cipher() {
        let files = Files::new();
        let engine = LopdfEngine::new();

        for cipher in CIPHERS {
            let source = files.write(
                &format!("{cipher:?}.pdf"),
                &encrypted_pdf(&[(100.0, 100.0)], cipher, "secret", "owner"),
            );

            for guess in ["", "guess"] {
                let err = engine
                    .decrypt_to(&source, guess, &files.path("out.pdf"))
                    .expect_err("wrong password should fail");
                assert!(matches!(err, PdfEngineError::InvalidPassword), "{cipher:?}: {err:?}");
            }
        }
    }

    #[test]
    fn unknown_security_handler_is_unsupported() {
        let files = Files::new();
        let source = files.write("v7.pdf", &unsupported_encryption_pdf(&[(100.0, 100.0)], "secret"));
        let engine = LopdfEngine::new();

        let err = engine.open(OpenSource::from(source.as_path())).expect_err("locked document");
        assert!(matches!(err, PdfEngineError::Encrypted));

        let err = engine
            .decrypt_to(&source, "secret", &files.path("out.pdf"))
            .expect_err("unknown handler cannot be unlocked");
        assert!(matches!(err, PdfEngineError::UnsupportedEncryption(_)), "{err:?}");
    }

    #[test]
    fn close_releases_handle() {
        let engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(sample_pdf(&[(100.0, 100.0)]))).unwrap();
        assert_eq!(engine.open_documents(), 1);

        engine.close(handle).expect("close should succeed");
        assert_eq!(engine.open_documents(), 0);
        assert!(matches!(engine.close(handle), Err(PdfEngineError::InvalidHandle(_))));
    }

    #[test]
    fn concurrent_opens_get_distinct_handles() {
        let engine = Arc::new(LopdfEngine::new());
        let bytes = sample_pdf(&[(100.0, 100.0)]);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let bytes = bytes.clone();
                thread::spawn(move || engine.open(OpenSource::Bytes(bytes)).unwrap())
            })
            .collect();
        let mut handles: Vec<u64> =
            workers.into_iter().map(|worker| worker.join().unwrap().raw()).collect();
        handles.sort_unstable();
        handles.dedup();

        assert_eq!(handles.len(), 4);
        assert_eq!(engine.open_documents(), 4);
    }

    #[test]
    fn invalid_handle_returns_error() {
        let engine = LopdfEngine::new();
        let err =
            engine.page_count(DocumentHandle(999)).expect_err("should fail for unknown handle");

        assert!(matches!(err, PdfEngineError::InvalidHandle(999)));
    }
}
