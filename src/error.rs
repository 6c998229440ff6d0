use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed table in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("unreadable workbook {path}: {source}")]
    Workbook {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    #[error("workbook {path} has no worksheets")]
    EmptyWorkbook { path: PathBuf },

    #[error("{path} is missing required column \"{column}\"")]
    MissingColumn { path: PathBuf, column: &'static str },
}

/// Returned by `summarize` when the filtered view has no sessions.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no sessions match the selected filters")]
pub struct EmptyResult;
