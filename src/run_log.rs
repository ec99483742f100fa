//! Per-run log artifact.
//!
//! Every run writes one Markdown file named after its start time, e.g.
//! `logs/2024-12-01_07-30-00.md`. Each appended line is prefixed with the
//! local wall-clock time and bare URLs are turned into `<url>` autolinks so the
//! log can be browsed next to the rendered site.
//!
//! The [`RunLog`] is created once in `main` and lent to every component that
//! needs to report progress. Lines are also mirrored to `tracing` so console
//! output and the artifact stay in sync.

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{error, info, warn};

static RE_BARE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"]*[^\s<>".,;:!?)\]']"#).unwrap());

/// Severity of a run log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

/// Append-only log of one run.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: usize,
}

impl RunLog {
    /// Create the log file for a run started at `started` inside `dir`.
    pub async fn create(dir: &Path, started: DateTime<Local>) -> Result<Self, Box<dyn Error>> {
        fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.md", started.format("%Y-%m-%d_%H-%M-%S")));
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        let mut writer = BufWriter::new(file);
        let header = format!("# Run {}\n\n", started.format("%Y-%m-%d %H:%M:%S"));
        writer.write_all(header.as_bytes()).await?;
        writer.flush().await?;
        Ok(Self {
            path,
            writer,
            lines: 0,
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of lines appended so far.
    pub fn lines(&self) -> usize {
        self.lines
    }

    pub async fn info(&mut self, message: impl AsRef<str>) {
        self.append(Level::Info, message.as_ref()).await;
    }

    pub async fn warn(&mut self, message: impl AsRef<str>) {
        self.append(Level::Warn, message.as_ref()).await;
    }

    pub async fn error(&mut self, message: impl AsRef<str>) {
        self.append(Level::Error, message.as_ref()).await;
    }

    /// Append one line and flush it to disk.
    ///
    /// A failing write is reported through `tracing` and otherwise ignored;
    /// losing a log line never aborts the run.
    pub async fn append(&mut self, level: Level, message: &str) {
        match level {
            Level::Info => info!(target: "run_log", "{message}"),
            Level::Warn => warn!(target: "run_log", "{message}"),
            Level::Error => error!(target: "run_log", "{message}"),
        }

        let prefix = match level {
            Level::Info => "",
            Level::Warn => "**WARN** ",
            Level::Error => "**ERROR** ",
        };
        let line = format!(
            "- `{}` {}{}\n",
            Local::now().format("%H:%M:%S"),
            prefix,
            autolink(message)
        );
        let written = match self.writer.write_all(line.as_bytes()).await {
            Ok(()) => self.writer.flush().await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => self.lines += 1,
            Err(e) => error!(
                path = %self.path.display(),
                error = %e,
                "Failed to write run log line"
            ),
        }
    }

    /// Write the closing line and flush, returning the log path.
    pub async fn finish(mut self) -> Result<PathBuf, Box<dyn Error>> {
        let footer = format!(
            "\n_{} lines, closed at {}_\n",
            self.lines,
            Local::now().format("%H:%M:%S")
        );
        self.writer.write_all(footer.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(self.path)
    }
}

/// Wrap every bare `http(s)://` URL in `<...>` so Markdown renders it as a link.
pub fn autolink(message: &str) -> String {
    RE_BARE_URL.replace_all(message, "<$0>").into_owned()
}
