//! Size-capped log-file writer.
//!
//! The destination is a single file, not a rotation set: once the file has
//! grown past the configured cap it is cleared before the next append.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use tracing_subscriber::fmt::MakeWriter;

/// `MakeWriter` appending to one log file, truncating it first whenever it
/// has grown past `max_bytes`.
#[derive(Debug, Clone)]
pub struct CappedLogFile {
    path: PathBuf,
    max_bytes: u64,
}

impl CappedLogFile {
    /// Create the writer, making sure the parent directory exists.
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path, max_bytes })
    }

    fn open(&self) -> io::Result<File> {
        let over_cap = fs::metadata(&self.path)
            .map(|m| m.len() > self.max_bytes)
            .unwrap_or(false);
        if over_cap {
            // Cap exceeded: clear the destination before appending.
            return OpenOptions::new()
                .write(true)
                .truncate(true)
                .create(true)
                .open(&self.path);
        }
        OpenOptions::new().append(true).create(true).open(&self.path)
    }
}

impl<'a> MakeWriter<'a> for CappedLogFile {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        // Logging must never take the process down: an unopenable log file
        // degrades to a writer that swallows output.
        LogFileWriter(self.open().ok())
    }
}

/// Writer handed out per event. `None` when the file could not be opened.
pub struct LogFileWriter(Option<File>);

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.0 {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.0 {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Local-time stamp with UTC offset for log lines, e.g.
/// `2026-08-06 14:03:22.117 +0200`.
pub struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(
        &self,
        w: &mut tracing_subscriber::fmt::format::Writer<'_>,
    ) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f %z"))
    }
}
