//! Opening documents, unlocking encrypted ones on the way.
//!
//! Backends without an in-place password API report encrypted documents as
//! [`PdfEngineError::Encrypted`]. Those are decrypted into a plaintext copy
//! that is opened instead. The copy lives in a [`DecryptedCopy`] and is
//! deleted when that is dropped.

use crate::error::ViewerError;
use pdf_engine::{DocumentHandle, OpenSource, PdfEngine, PdfEngineError};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempPath;

/// Engine shared between the view and its background tasks.
pub type SharedEngine = Arc<dyn PdfEngine>;

const DECRYPTED_PREFIX: &str = "decrypted_";

/// Temporary plaintext copy of an encrypted document.
#[derive(Debug)]
pub struct DecryptedCopy {
    path: TempPath,
}

impl DecryptedCopy {
    fn create(temp_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(temp_dir)?;
        let file = tempfile::Builder::new()
            .prefix(DECRYPTED_PREFIX)
            .suffix(".pdf")
            .tempfile_in(temp_dir)?;
        Ok(Self { path: file.into_temp_path() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A document the engine has open, ready to be handed to a session.
#[derive(Debug)]
pub struct OpenedDocument {
    pub handle: DocumentHandle,
    pub page_count: u32,
    pub decrypted: Option<DecryptedCopy>,
}

/// Opens `path`, falling back to decrypt-and-rewrite for encrypted files.
///
/// The empty password is always tried before `password`. `on_unlocking`
/// runs once, when the plain open reported encryption.
pub fn open_document(
    engine: &SharedEngine,
    path: &Path,
    password: Option<&str>,
    temp_dir: &Path,
    on_unlocking: &mut dyn FnMut(),
) -> Result<OpenedDocument, ViewerError> {
    match open_plain(engine, path) {
        Err(PdfEngineError::Encrypted) => {}
        result => return result.map_err(|err| ViewerError::from_open(path.to_path_buf(), err)),
    }

    log::debug!("{} is encrypted, unlocking", path.display());
    on_unlocking();

    let copy = unlock(engine, path, password, temp_dir)?;
    let opened = open_plain(engine, copy.path()).map_err(|err| match err {
        PdfEngineError::Encrypted => {
            ViewerError::DecryptFailed("document is still encrypted after decryption".to_string())
        }
        other => ViewerError::from_open(path.to_path_buf(), other),
    })?;

    Ok(OpenedDocument { decrypted: Some(copy), ..opened })
}

/// Writes a plaintext copy of `path`, trying the empty password first.
///
/// Without a usable `password` a wrong-password failure becomes
/// [`ViewerError::PasswordRequired`]; with one it becomes
/// [`ViewerError::InvalidPassword`].
pub fn unlock(
    engine: &SharedEngine,
    path: &Path,
    password: Option<&str>,
    temp_dir: &Path,
) -> Result<DecryptedCopy, ViewerError> {
    let first = match decrypt(engine, path, "", temp_dir) {
        Ok(copy) => return Ok(copy),
        Err(err) => err,
    };

    match password.filter(|password| !password.is_empty()) {
        None => Err(match first {
            PdfEngineError::InvalidPassword => ViewerError::PasswordRequired,
            other => ViewerError::DecryptFailed(other.to_string()),
        }),
        Some(password) => decrypt(engine, path, password, temp_dir).map_err(|err| match err {
            PdfEngineError::InvalidPassword => ViewerError::InvalidPassword,
            other => ViewerError::DecryptFailed(other.to_string()),
        }),
    }
}

fn decrypt(
    engine: &SharedEngine,
    path: &Path,
    password: &str,
    temp_dir: &Path,
) -> Result<DecryptedCopy, PdfEngineError> {
    let copy = DecryptedCopy::create(temp_dir)?;
    engine.decrypt_to(path, password, copy.path())?;
    Ok(copy)
}

fn open_plain(engine: &SharedEngine, path: &Path) -> Result<OpenedDocument, PdfEngineError> {
    let handle = engine.open(OpenSource::Path(path.to_path_buf()))?;

    let page_count = match engine.page_count(handle) {
        Ok(0) => Err(PdfEngineError::NoPages),
        other => other,
    };
    match page_count {
        Ok(page_count) => Ok(OpenedDocument { handle, page_count, decrypted: None }),
        Err(err) => {
            if let Err(close_err) = engine.close(handle) {
                log::warn!("closing unusable document failed: {close_err}");
            }
            Err(err)
        }
    }
}
