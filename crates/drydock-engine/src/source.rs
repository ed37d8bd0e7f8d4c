//! Install-script source.

use std::io;
use std::path::PathBuf;

/// Provides the maintenance-routine install script as lines of text.
pub trait ScriptSource: Send + Sync {
    fn read_lines(&self) -> io::Result<Vec<String>>;

    /// Human-readable location for error messages.
    fn describe(&self) -> String;
}

/// Reads the script from a file on disk.
pub struct FileScriptSource {
    path: PathBuf,
}

impl FileScriptSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScriptSource for FileScriptSource {
    fn read_lines(&self) -> io::Result<Vec<String>> {
        let text = std::fs::read_to_string(&self.path)?;
        Ok(text.lines().map(str::to_string).collect())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
