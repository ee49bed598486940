use std::fmt::Display;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::error::LogError;
use crate::sink::{default_sink, Level, Sink};
use crate::types::ScanBatchResult;

/// Base directory used when none is configured.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Serialization of a log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[serde(alias = "txt", alias = "plaintext")]
    Text,
    #[serde(alias = "md")]
    Markdown,
}

impl LogFormat {
    pub fn extension(self) -> &'static str {
        match self {
            LogFormat::Json => "json",
            LogFormat::Text => "txt",
            LogFormat::Markdown => "md",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "txt" | "text" | "plaintext" => Ok(LogFormat::Text),
            "md" | "markdown" => Ok(LogFormat::Markdown),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// What to do when `<prefix>_<HHMMSS>.<ext>` already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collision {
    /// Replace the earlier file. Two logs with the same prefix within one
    /// second therefore keep only the later one.
    #[default]
    Overwrite,
    /// Refuse with [`LogError::Exists`].
    Fail,
}

/// Writes results under `<base>/<YYYY-MM-DD>/<prefix>_<HHMMSS>.<ext>`.
#[derive(Clone)]
pub struct ResultLogger {
    base_dir: PathBuf,
    offset: UtcOffset,
    collision: Collision,
    sink: Arc<dyn Sink>,
}

impl ResultLogger {
    /// Create the logger, creating `base_dir` if it does not exist yet.
    ///
    /// Names use local time when the local offset can be determined, else UTC.
    /// The `time` crate cannot read the offset once a process has several
    /// threads, so multi-threaded callers should read it early and pass it to
    /// [`with_offset`](Self::with_offset).
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, LogError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| LogError::io(&base_dir, e))?;
        Ok(Self {
            base_dir,
            offset: UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
            collision: Collision::default(),
            sink: default_sink(),
        })
    }

    /// Offset applied to the wall clock when naming directories and files.
    pub fn with_offset(mut self, offset: UtcOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_collision(mut self, collision: Collision) -> Self {
        self.collision = collision;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn log<T>(&self, data: &T, prefix: &str, format: LogFormat) -> Result<PathBuf, LogError>
    where
        T: Serialize + Display + ?Sized,
    {
        let now = OffsetDateTime::now_utc().to_offset(self.offset);
        self.log_at(data, prefix, format, now)
    }

    /// Same as [`log`](Self::log) with an explicit timestamp.
    pub fn log_at<T>(
        &self,
        data: &T,
        prefix: &str,
        format: LogFormat,
        at: OffsetDateTime,
    ) -> Result<PathBuf, LogError>
    where
        T: Serialize + Display + ?Sized,
    {
        let content = render(data, format)?;
        let dir = self.date_dir(at)?;
        let path = dir.join(format!(
            "{prefix}_{}.{}",
            format_time(at),
            format.extension()
        ));

        if self.collision == Collision::Fail && path.exists() {
            return Err(LogError::Exists(path));
        }
        write_atomic(&path, content.as_bytes())?;

        self.sink.emit(
            Level::Info,
            &format!("{} log saved to {}", format_label(format), path.display()),
        );
        Ok(path)
    }

    /// Log every target of a batch in every requested format.
    ///
    /// Targets without a result are skipped unless `log_failures` is set, in
    /// which case a `{"target", "error"}` record is written in their place.
    pub fn log_batch(
        &self,
        batch: &ScanBatchResult,
        formats: &[LogFormat],
        log_failures: bool,
    ) -> Result<Vec<PathBuf>, LogError> {
        let now = OffsetDateTime::now_utc().to_offset(self.offset);
        let mut written = Vec::new();
        for (target, result) in batch {
            let prefix = target_prefix(target);
            for &format in formats {
                match result {
                    Some(r) => written.push(self.log_at(r, &prefix, format, now)?),
                    None if log_failures => {
                        let record = serde_json::json!({
                            "target": target,
                            "error": "no results",
                        });
                        written.push(self.log_at(&record, &prefix, format, now)?);
                    }
                    None => {}
                }
            }
        }
        Ok(written)
    }

    fn date_dir(&self, at: OffsetDateTime) -> Result<PathBuf, LogError> {
        let dir = self.base_dir.join(format_date(at));
        // create_dir_all tolerates a concurrent creator winning the race.
        fs::create_dir_all(&dir).map_err(|e| LogError::io(&dir, e))?;
        Ok(dir)
    }
}

/// File prefix for a target: `scan_` plus the target with `.`, `:` and `/`
/// replaced by `_`.
pub fn target_prefix(target: &str) -> String {
    format!("scan_{}", target.trim().replace(['.', ':', '/'], "_"))
}

/// Serialize `data` the way it is written to disk.
pub fn render<T>(data: &T, format: LogFormat) -> Result<String, LogError>
where
    T: Serialize + Display + ?Sized,
{
    Ok(match format {
        LogFormat::Json => serde_json::to_string_pretty(data)?,
        LogFormat::Text => data.to_string(),
        LogFormat::Markdown => format!(
            "# Scan Results\n```\n{}\n```\n",
            serde_json::to_string_pretty(data)?
        ),
    })
}

fn format_label(format: LogFormat) -> &'static str {
    match format {
        LogFormat::Json => "JSON",
        LogFormat::Text => "Plaintext",
        LogFormat::Markdown => "Markdown",
    }
}

fn format_date(at: OffsetDateTime) -> String {
    let fmt = format_description!("[year]-[month]-[day]");
    at.format(&fmt)
        .unwrap_or_else(|_| String::from("1970-01-01"))
}

fn format_time(at: OffsetDateTime) -> String {
    let fmt = format_description!("[hour][minute][second]");
    at.format(&fmt).unwrap_or_else(|_| String::from("000000"))
}

/// Write to a uniquely named hidden file in the same directory, then rename it
/// into place, so readers never see a partial file and concurrent writers of
/// the same name each replace it whole.
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), LogError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| LogError::io(dir, e))?;
    tmp.write_all(content)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| LogError::io(tmp.path(), e))?;
    // A failed persist drops the temp file, which removes it.
    tmp.persist(path)
        .map(|_| ())
        .map_err(|e| LogError::io(path, e.error))
}
