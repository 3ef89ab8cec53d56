use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use colored::Colorize;
use indicatif::ProgressBar;
use tokio::io::AsyncWriteExt;

use super::{ReportError, ReportSink};
use crate::bruteforcer::{TargetResultSet, RESULT_HEADER};
use crate::probe::ProbeOutcome;
use crate::runner::ScanTarget;

pub const DEFAULT_OUTPUT_DIR: &str = "dirprobe_results";

fn csv_record(outcome: &ProbeOutcome) -> [String; 4] {
    [
        outcome.request_url.clone(),
        outcome
            .status_code()
            .map(|s| s.to_string())
            .unwrap_or_default(),
        outcome
            .body_length()
            .map(|l| l.to_string())
            .unwrap_or_default(),
        outcome.redirect_url().unwrap_or_default().to_string(),
    ]
}

/// Header line, then one record per outcome. Failed outcomes keep only the url.
pub fn render_csv(results: &TargetResultSet) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(RESULT_HEADER)?;
    for outcome in &results.outcomes {
        writer.write_record(csv_record(outcome))?;
    }
    writer.into_inner().map_err(|e| ReportError::Csv {
        source: csv::Error::from(e.into_error()),
    })
}

/// `example.com` on port 8080 becomes `example_com_8080.csv`.
pub fn report_file_name(target: &ScanTarget) -> Result<String, ReportError> {
    let host = target
        .host()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ReportError::MissingHost {
            target: target.to_string(),
        })?;
    let host: String = host
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    match target.port() {
        Some(port) => Ok(format!("{host}_{port}.csv")),
        None => Ok(format!("{host}.csv")),
    }
}

/// Writes one CSV file per target and echoes the rows to the console.
pub struct CsvReportSink {
    dir: PathBuf,
    pb: ProgressBar,
    echo: bool,
    written: Vec<PathBuf>,
}

impl CsvReportSink {
    pub fn new(dir: impl Into<PathBuf>, pb: ProgressBar) -> Self {
        Self {
            dir: dir.into(),
            pb,
            echo: true,
            written: Vec::new(),
        }
    }

    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn echo_rows(&self, results: &TargetResultSet) {
        self.pb.println("");
        for outcome in &results.outcomes {
            let line = outcome.to_string();
            let line = match outcome.status_code() {
                Some(200..=299) => line.bold().green(),
                Some(300..=399) => line.cyan(),
                Some(_) => line.white(),
                None => line.red(),
            };
            self.pb.println(line.to_string());
        }
    }
}

#[async_trait]
impl ReportSink for CsvReportSink {
    async fn write(&mut self, results: &TargetResultSet) -> Result<(), ReportError> {
        let file_name = report_file_name(&results.target)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ReportError::CreateDir {
                path: self.dir.clone(),
                source: e,
            })?;

        let path = self.dir.join(file_name);
        let contents = render_csv(results)?;
        let mut file =
            tokio::fs::File::create(&path)
                .await
                .map_err(|e| ReportError::Write {
                    path: path.clone(),
                    source: e,
                })?;
        file.write_all(&contents)
            .await
            .map_err(|e| ReportError::Write {
                path: path.clone(),
                source: e,
            })?;
        file.flush().await.map_err(|e| ReportError::Write {
            path: path.clone(),
            source: e,
        })?;

        if self.echo {
            self.pb.println(format!(
                "\n{} {}",
                "[*] Results file written to".bold().white(),
                format!("{}.", path.display()).bold().cyan()
            ));
            self.echo_rows(results);
        }
        if !results.is_complete() {
            self.pb.println(format!(
                "{} {} ({} of {} segments not probed)",
                "[!] partial results for".bold().yellow(),
                results.target.as_str().bold().white(),
                results.abandoned,
                results.abandoned + results.len()
            ));
        }
        self.written.push(path);
        Ok(())
    }

    async fn finish(&mut self, elapsed: Duration) {
        if self.echo {
            self.pb.println(format!(
                "\n{} {:.5}",
                "Time taken =".bold().white(),
                elapsed.as_secs_f64()
            ));
        }
    }
}
