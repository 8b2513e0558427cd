//! Load and unlock failures surfaced to the host.

use pdf_engine::PdfEngineError;
use pdfview_cache::CacheError;
use std::io;
use std::path::PathBuf;

/// Why a document session ended up in `Failed`.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    /// No source was given, or it was blank.
    #[error("Invalid PDF source")]
    EmptySource,

    #[error("PDF file not found: {}", .0.display())]
    DocumentNotFound(PathBuf),

    /// The file exists but could not be parsed or has no pages.
    #[error("Failed to load PDF: {0}")]
    DocumentCorrupt(String),

    /// The document is encrypted and no password was supplied.
    #[error("PDF is password protected")]
    PasswordRequired,

    #[error("Invalid password for PDF")]
    InvalidPassword,

    /// Decrypt-and-rewrite failed for a reason other than the password.
    #[error("Failed to decrypt PDF: {0}")]
    DecryptFailed(String),

    #[error("Failed to download PDF: {0}")]
    DownloadFailed(#[from] CacheError),
}

impl ViewerError {
    /// Human-readable text for the error notification.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Whether the host should prompt for a password.
    pub fn is_password_required(&self) -> bool {
        matches!(self, ViewerError::PasswordRequired)
    }

    /// Maps a failed open of `path` to the session failure it represents.
    pub(crate) fn from_open(path: PathBuf, err: PdfEngineError) -> Self {
        match err {
            PdfEngineError::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {
                ViewerError::DocumentNotFound(path)
            }
            PdfEngineError::Encrypted => ViewerError::PasswordRequired,
            PdfEngineError::InvalidPassword => ViewerError::InvalidPassword,
            PdfEngineError::UnsupportedEncryption(reason) => ViewerError::DecryptFailed(reason),
            other => ViewerError::DocumentCorrupt(other.to_string()),
        }
    }
}

/// Coarse classification of a [`ViewerError`], kept in the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    EmptySource,
    DocumentNotFound,
    DocumentCorrupt,
    PasswordRequired,
    InvalidPassword,
    DownloadFailed,
}

impl From<&ViewerError> for FailureKind {
    fn from(err: &ViewerError) -> Self {
        match err {
            ViewerError::EmptySource => FailureKind::EmptySource,
            ViewerError::DocumentNotFound(_) => FailureKind::DocumentNotFound,
            ViewerError::DocumentCorrupt(_) | ViewerError::DecryptFailed(_) => {
                FailureKind::DocumentCorrupt
            }
            ViewerError::PasswordRequired => FailureKind::PasswordRequired,
            ViewerError::InvalidPassword => FailureKind::InvalidPassword,
            ViewerError::DownloadFailed(_) => FailureKind::DownloadFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_host_contract() {
        assert_eq!(ViewerError::PasswordRequired.message(), "PDF is password protected");
        assert_eq!(ViewerError::InvalidPassword.message(), "Invalid password for PDF");
        assert_eq!(ViewerError::EmptySource.message(), "Invalid PDF source");
        assert_eq!(
            ViewerError::DocumentNotFound(PathBuf::from("/tmp/missing.pdf")).message(),
            "PDF file not found: /tmp/missing.pdf"
        );
        assert!(ViewerError::DownloadFailed(CacheError::Network("reset".into()))
            .message()
            .starts_with("Failed to download PDF: "));
    }

    #[test]
    fn test_open_errors_are_classified() {
        let missing = PdfEngineError::Io(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let err = ViewerError::from_open(PathBuf::from("a.pdf"), missing);
        assert_eq!(FailureKind::from(&err), FailureKind::DocumentNotFound);

        let err = ViewerError::from_open(PathBuf::from("a.pdf"), PdfEngineError::NoPages);
        assert_eq!(FailureKind::from(&err), FailureKind::DocumentCorrupt);
        assert!(err.message().starts_with("Failed to load PDF"));

        let err = ViewerError::from_open(PathBuf::from("a.pdf"), PdfEngineError::Encrypted);
        assert!(err.is_password_required());

        let unsupported = PdfEngineError::UnsupportedEncryption("version 7".into());
        let err = ViewerError::from_open(PathBuf::from("a.pdf"), unsupported);
        assert!(matches!(err, ViewerError::DecryptFailed(ref reason) if reason == "version 7"));
    }
}
