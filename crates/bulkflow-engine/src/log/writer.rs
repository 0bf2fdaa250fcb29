//! Lazy, mutex-guarded file appenders for the operation directory.
//!
//! Each artifact gets one appender; the file is created on first write
//! so a clean run leaves no empty bad files behind. Appenders hold the
//! mutex only while writing one entry.

use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub(crate) struct LazyAppender {
    path: PathBuf,
    writer: Mutex<Option<LineWriter<File>>>,
}

impl LazyAppender {
    pub(crate) fn new(directory: &Path, file_name: &str) -> Self {
        Self {
            path: directory.join(file_name),
            writer: Mutex::new(None),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Append one LF-terminated line.
    pub(crate) fn append_line(&self, line: &str) -> io::Result<()> {
        self.append(&format!("{line}\n"))
    }

    /// Append raw text, opening the file on first use.
    pub(crate) fn append(&self, text: &str) -> io::Result<()> {
        let mut guard = self.writer.lock().expect("appender mutex poisoned");
        if guard.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            *guard = Some(LineWriter::new(file));
        }
        guard
            .as_mut()
            .expect("writer just opened")
            .write_all(text.as_bytes())
    }

    /// Flush and close the underlying file, if it was ever opened.
    pub(crate) fn close(&self) -> io::Result<()> {
        let mut guard = self.writer.lock().expect("appender mutex poisoned");
        if let Some(mut writer) = guard.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_is_created_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let appender = LazyAppender::new(dir.path(), "connector.bad");
        assert!(!appender.path().exists());
        appender.append_line("line1").unwrap();
        appender.close().unwrap();
        assert_eq!(
            std::fs::read_to_string(appender.path()).unwrap(),
            "line1\n"
        );
    }

    #[test]
    fn close_without_writes_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let appender = LazyAppender::new(dir.path(), "mapping.bad");
        appender.close().unwrap();
        assert!(!appender.path().exists());
    }

    #[test]
    fn appends_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let appender = LazyAppender::new(dir.path(), "load.bad");
        appender.append_line("a").unwrap();
        appender.append_line("b").unwrap();
        appender.close().unwrap();
        assert_eq!(std::fs::read_to_string(appender.path()).unwrap(), "a\nb\n");
    }
}
