use anyhow::Result;
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Append-only text log of cycle failures.
///
/// Each entry is one `"{timestamp} - Error: {message}"` line followed by the
/// indented cause chain (and backtrace, when `RUST_BACKTRACE` captured one).
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, err: &anyhow::Error) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut w = BufWriter::new(file);

        let ts = Local::now().format("%Y-%m-%d %H:%M:%S%.6f");
        let message = format!("{err:#}").replace(['\r', '\n'], " ");
        writeln!(w, "{ts} - Error: {message}")?;
        for line in format!("{err:?}").lines() {
            writeln!(w, "    {line}")?;
        }
        w.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn entry_lines(s: &str) -> usize {
        s.lines().filter(|l| l.contains(" - Error: ")).count()
    }

    #[test]
    fn appends_one_entry_per_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("logs").join("errores.log"));

        log.record(&anyhow!("boom").context("outer")).unwrap();
        log.record(&anyhow!("multi\nline")).unwrap();

        let s = fs::read_to_string(log.path()).unwrap();
        assert_eq!(entry_lines(&s), 2);
        let first = s.lines().next().unwrap();
        assert!(first.ends_with(" - Error: outer: boom"));
        assert!(s.contains("Caused by:"));
        assert!(s.contains(" - Error: multi line"));
        // continuation lines never look like entries
        assert!(s.lines().skip(1).filter(|l| !l.contains(" - Error: ")).all(|l| l.starts_with("    ")));
    }
}
