use std::path::PathBuf;
use thiserror::Error;

use crate::parser::ReportKind;

/// Caller-visible pipeline failures.
///
/// Everything else (noisy lines, junk numbers, unknown markers) degrades
/// silently into the parse diagnostics instead of surfacing here.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("data not found: no report directory among {candidates:?}")]
    DataDirNotFound { candidates: Vec<PathBuf> },

    #[error("data not found: {} report expected at {}", .kind.name(), .path.display())]
    ReportNotFound { kind: ReportKind, path: PathBuf },

    #[error("data not found: no uploaded file matches report code {}", .0.code())]
    MissingUpload(ReportKind),

    #[error("no files uploaded")]
    NoUploads,
}
