pub mod report;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::bruteforcer::TargetResultSet;

pub use report::{CsvReportSink, DEFAULT_OUTPUT_DIR};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot derive a report file name from {target}")]
    MissingHost { target: String },

    #[error("failed to create report directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode report: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },

    #[error("failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Receives each finished target's results as soon as that target is done.
#[async_trait]
pub trait ReportSink: Send {
    async fn write(&mut self, results: &TargetResultSet) -> Result<(), ReportError>;

    /// Called once after every target has finished, with the wall-clock time of the run.
    async fn finish(&mut self, _elapsed: Duration) {}
}

// keeps everything in memory; handy for library callers that format results themselves
#[derive(Debug, Default)]
pub struct MemorySink {
    pub results: Vec<TargetResultSet>,
    pub elapsed: Option<Duration>,
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn write(&mut self, results: &TargetResultSet) -> Result<(), ReportError> {
        self.results.push(results.clone());
        Ok(())
    }

    async fn finish(&mut self, elapsed: Duration) {
        self.elapsed = Some(elapsed);
    }
}
