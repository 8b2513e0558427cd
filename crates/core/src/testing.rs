//! Scripted document backend for exercising the session without real PDFs.
//!
//! Documents are small text files:
//! - `pages 612x792 500x1000` opens with those page sizes
//! - `encrypted <password> pages ...` must be decrypted with `<password>`
//!   first (`-` stands for the empty password)
//! - anything else fails to parse

use image::Rgba;
use pdf_engine::{
    DocumentHandle, OpenSource, PageSize, PdfEngine, PdfEngineError, RenderRequest, RgbaImage,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

pub const INK: Rgba<u8> = Rgba([40, 40, 40, 255]);

pub fn plain(sizes: &[(f32, f32)]) -> String {
    let pages: Vec<String> = sizes.iter().map(|(w, h)| format!("{w}x{h}")).collect();
    format!("pages {}", pages.join(" "))
}

pub fn encrypted(password: &str, sizes: &[(f32, f32)]) -> String {
    let password = if password.is_empty() { "-" } else { password };
    format!("encrypted {password} {}", plain(sizes))
}

pub fn write_doc(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write scripted document");
    path
}

enum Script {
    Plain(Vec<PageSize>),
    Encrypted { password: String, body: String },
}

fn parse(text: &str) -> Result<Script, PdfEngineError> {
    let mut words = text.split_whitespace();
    match words.next() {
        Some("pages") => words.map(parse_size).collect::<Result<_, _>>().map(Script::Plain),
        Some("encrypted") => {
            let password = match words.next() {
                Some("-") | None => String::new(),
                Some(password) => password.to_string(),
            };
            Ok(Script::Encrypted { password, body: words.collect::<Vec<_>>().join(" ") })
        }
        _ => Err(PdfEngineError::Backend("not a PDF".to_string())),
    }
}

fn parse_size(word: &str) -> Result<PageSize, PdfEngineError> {
    let invalid = || PdfEngineError::Backend(format!("bad page size {word:?}"));
    let (width, height) = word.split_once('x').ok_or_else(invalid)?;
    Ok(PageSize::new(width.parse().map_err(|_| invalid())?, height.parse().map_err(|_| invalid())?))
}

type Gate = (Sender<()>, Receiver<()>);

#[derive(Debug, Default)]
pub struct ScriptedEngine {
    next_handle: AtomicU64,
    docs: Mutex<HashMap<DocumentHandle, Vec<PageSize>>>,
    gate: Mutex<Option<Gate>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    renders: AtomicUsize,
    fail_render: AtomicBool,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_documents(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn set_fail_render(&self, fail: bool) {
        self.fail_render.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `open` block. The first receiver fires once the open
    /// has started; the open finishes when the sender is used or dropped.
    pub fn pause_next_open(&self) -> (Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.gate.lock().unwrap() = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }

    fn sizes(&self, handle: DocumentHandle) -> Result<Vec<PageSize>, PdfEngineError> {
        self.docs.lock().unwrap().get(&handle).cloned().ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

impl PdfEngine for ScriptedEngine {
    fn open(&self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.recv();
        }

        let text = match source {
            OpenSource::Path(path) => fs::read_to_string(path)?,
            OpenSource::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        };

        match parse(&text)? {
            Script::Plain(sizes) => {
                let handle =
                    DocumentHandle::from_raw(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
                self.docs.lock().unwrap().insert(handle, sizes);
                self.opens.fetch_add(1, Ordering::SeqCst);
                Ok(handle)
            }
            Script::Encrypted { .. } => Err(PdfEngineError::Encrypted),
        }
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.sizes(handle)?.len() as u32)
    }

    fn page_size(&self, handle: DocumentHandle, page_index: u32) -> Result<PageSize, PdfEngineError> {
        let sizes = self.sizes(handle)?;
        sizes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: sizes.len() as u32,
        })
    }

    fn render_into(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
        target: &mut RgbaImage,
    ) -> Result<(), PdfEngineError> {
        self.page_size(handle, request.page_index)?;
        self.renders.fetch_add(1, Ordering::SeqCst);
        if self.fail_render.load(Ordering::SeqCst) {
            return Err(PdfEngineError::Backend("scripted render failure".to_string()));
        }
        target.pixels_mut().for_each(|pixel| *pixel = INK);
        Ok(())
    }

    fn decrypt_to(&self, source: &Path, password: &str, dest: &Path) -> Result<(), PdfEngineError> {
        match parse(&fs::read_to_string(source)?)? {
            Script::Encrypted { password: expected, body } if expected == password => {
                fs::write(dest, body)?;
                Ok(())
            }
            Script::Encrypted { .. } => Err(PdfEngineError::InvalidPassword),
            Script::Plain(_) => {
                fs::copy(source, dest)?;
                Ok(())
            }
        }
    }

    fn close(&self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.docs.lock().unwrap().remove(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))?;
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
