//! Metrics and per-epoch log files for training runs.
//!
//! Three CSV scalar streams under the metrics directory (`train_loss.csv`,
//! `train_accuracy.csv`, `test_accuracy.csv`), each with a header row, opened
//! in append mode so resumed runs extend them. Per-epoch human-readable logs
//! (`epoch{N}_log.txt`) carry an elapsed-time stamp per line.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use anyhow::Context;

// ── MetricsWriter ───────────────────────────────────────────────────────────

/// CSV scalar streams for one training run.
pub struct MetricsWriter {
    train_loss: File,
    train_accuracy: File,
    test_accuracy: File,
}

impl MetricsWriter {
    /// Open (or create) the three CSV streams under `metrics_dir`.
    pub fn open(metrics_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(metrics_dir)
            .with_context(|| format!("create metrics dir {}", metrics_dir.display()))?;
        Ok(Self {
            train_loss: open_csv(&metrics_dir.join("train_loss.csv"), "step,loss")?,
            train_accuracy: open_csv(&metrics_dir.join("train_accuracy.csv"), "step,accuracy")?,
            test_accuracy: open_csv(&metrics_dir.join("test_accuracy.csv"), "epoch,accuracy")?,
        })
    }

    pub fn record_train_loss(&mut self, step: usize, loss: f32) -> anyhow::Result<()> {
        writeln!(self.train_loss, "{step},{loss}")?;
        Ok(())
    }

    pub fn record_train_accuracy(&mut self, step: usize, accuracy: f32) -> anyhow::Result<()> {
        writeln!(self.train_accuracy, "{step},{accuracy}")?;
        Ok(())
    }

    pub fn record_test_accuracy(&mut self, epoch: usize, accuracy: f32) -> anyhow::Result<()> {
        writeln!(self.test_accuracy, "{epoch},{accuracy}")?;
        Ok(())
    }
}

/// Append-mode CSV stream; the header row is written only for a new file.
fn open_csv(path: &Path, header: &str) -> anyhow::Result<File> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    if f.metadata()?.len() == 0 {
        writeln!(f, "{header}")?;
    }
    Ok(f)
}

// ── EpochLog ────────────────────────────────────────────────────────────────

/// Human-readable per-epoch log file (`epoch{N}_log.txt`).
pub struct EpochLog {
    file: File,
    started: Instant,
}

impl EpochLog {
    pub fn create(log_dir: &Path, epoch: usize) -> anyhow::Result<Self> {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("create log dir {}", log_dir.display()))?;
        let path = log_dir.join(format!("epoch{epoch}_log.txt"));
        let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        Ok(Self {
            file,
            started: Instant::now(),
        })
    }

    /// Append one line, stamped with the time elapsed since the log opened.
    pub fn info(&mut self, msg: &str) -> anyhow::Result<()> {
        let secs = self.started.elapsed().as_secs();
        writeln!(
            self.file,
            "Train time {:02}h {:02}m {:02}s, {msg}",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        )?;
        Ok(())
    }
}

// ── Fresh-run cleanup ───────────────────────────────────────────────────────

/// Delete the files (not subdirectories) inside `dir`, if it exists.
///
/// Fresh training runs call this on the log and metrics directories so old
/// runs do not bleed into the new one.
pub fn clear_dir_files(dir: &Path) -> anyhow::Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let p = entry?.path();
        if p.is_file() {
            std::fs::remove_file(&p).with_context(|| format!("remove {}", p.display()))?;
        }
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_streams_have_headers_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = MetricsWriter::open(dir.path()).unwrap();
        m.record_train_loss(10, 0.75).unwrap();
        m.record_train_accuracy(100, 0.6).unwrap();
        m.record_test_accuracy(1, 0.55).unwrap();

        let loss = std::fs::read_to_string(dir.path().join("train_loss.csv")).unwrap();
        assert_eq!(loss, "step,loss\n10,0.75\n");
        let acc = std::fs::read_to_string(dir.path().join("train_accuracy.csv")).unwrap();
        assert_eq!(acc, "step,accuracy\n100,0.6\n");
        let test = std::fs::read_to_string(dir.path().join("test_accuracy.csv")).unwrap();
        assert_eq!(test, "epoch,accuracy\n1,0.55\n");
    }

    #[test]
    fn reopening_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut m = MetricsWriter::open(dir.path()).unwrap();
            m.record_train_loss(10, 0.9).unwrap();
        }
        {
            let mut m = MetricsWriter::open(dir.path()).unwrap();
            m.record_train_loss(20, 0.8).unwrap();
        }
        let loss = std::fs::read_to_string(dir.path().join("train_loss.csv")).unwrap();
        assert_eq!(loss, "step,loss\n10,0.9\n20,0.8\n");
    }

    #[test]
    fn epoch_log_lines_are_stamped() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = EpochLog::create(dir.path(), 3).unwrap();
        log.info("Training started.").unwrap();
        let text = std::fs::read_to_string(dir.path().join("epoch3_log.txt")).unwrap();
        assert!(text.starts_with("Train time 00h 00m 00s, Training started."));
    }

    #[test]
    fn clear_dir_files_spares_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.csv"), "x").unwrap();
        std::fs::create_dir(dir.path().join("keep")).unwrap();
        std::fs::write(dir.path().join("keep/inner.txt"), "y").unwrap();

        clear_dir_files(dir.path()).unwrap();

        assert!(!dir.path().join("old.csv").exists());
        assert!(dir.path().join("keep/inner.txt").exists());
    }

    #[test]
    fn clear_dir_files_tolerates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        clear_dir_files(&dir.path().join("nope")).unwrap();
    }
}
