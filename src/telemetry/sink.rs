//! Telemetry sinks.
//!
//! A sink only needs to append a batch and flush. Durability is best effort.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::{SinkConfig, SinkFormat, SinkKind};
use crate::error::SinkError;
use crate::telemetry::record::TelemetryRecord;

/// Destination for telemetry batches. Owned by the consumer task.
pub trait TelemetrySink: Send + 'static {
    fn name(&self) -> &'static str;

    /// Append a batch. The batch is cleared by the caller whatever the outcome.
    fn write_batch(&mut self, batch: &[TelemetryRecord]) -> Result<(), SinkError>;

    /// Push buffered bytes to the destination.
    fn flush(&mut self) -> Result<(), SinkError>;
}

/// Build the sink described by the configuration.
pub fn build_sink(config: &SinkConfig) -> Result<Box<dyn TelemetrySink>, SinkError> {
    Ok(match config.kind {
        SinkKind::File => Box::new(FileSink::open(
            Path::new(&config.path),
            config.format,
            config.buffer_bytes,
        )?),
        SinkKind::Stdout => Box::new(TracingSink),
        SinkKind::None => Box::new(NullSink),
    })
}

/// Append-only file with a large write buffer.
pub struct FileSink {
    writer: BufWriter<File>,
    format: SinkFormat,
}

const CSV_HEADER: &str = "timestamp,backend,latency_ms,status";

impl FileSink {
    /// Open (or create) `path` in append mode, creating parent directories.
    pub fn open(path: &Path, format: SinkFormat, buffer_bytes: usize) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_empty = file.metadata()?.len() == 0;

        let mut writer = BufWriter::with_capacity(buffer_bytes.max(1024), file);
        if format == SinkFormat::Csv && is_empty {
            writeln!(writer, "{}", CSV_HEADER)?;
        }

        tracing::info!(path = %path.display(), format = ?format, "Telemetry file sink opened");
        Ok(Self { writer, format })
    }

    fn write_record(&mut self, record: &TelemetryRecord) -> Result<(), SinkError> {
        match self.format {
            SinkFormat::Text => writeln!(
                self.writer,
                "{} server={} latency={:?}",
                record.timestamp.format("%Y/%m/%d %H:%M:%S"),
                record.backend,
                record.latency
            )?,
            SinkFormat::Csv => writeln!(
                self.writer,
                "{},{},{:.3},{}",
                record.timestamp.to_rfc3339(),
                record.backend,
                record.latency_ms(),
                record.status
            )?,
            SinkFormat::Json => {
                serde_json::to_writer(&mut self.writer, record)?;
                self.writer.write_all(b"\n")?;
            }
        }
        Ok(())
    }
}

impl TelemetrySink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn write_batch(&mut self, batch: &[TelemetryRecord]) -> Result<(), SinkError> {
        for record in batch {
            self.write_record(record)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Emits each record as a structured `tracing` event.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn name(&self) -> &'static str {
        "stdout"
    }

    fn write_batch(&mut self, batch: &[TelemetryRecord]) -> Result<(), SinkError> {
        for record in batch {
            tracing::info!(
                target: "telemetry",
                backend = %record.backend,
                latency_ms = record.latency_ms(),
                status = record.status,
                timestamp = %record.timestamp.to_rfc3339(),
                "request"
            );
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn name(&self) -> &'static str {
        "none"
    }

    fn write_batch(&mut self, _batch: &[TelemetryRecord]) -> Result<(), SinkError> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    batches: Vec<Vec<TelemetryRecord>>,
    flushes: usize,
    failing: bool,
}

/// In-memory sink that records every batch it receives.
///
/// Clones share state, so a test keeps one handle and gives the other to the
/// pipeline.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reject every following write until turned off again.
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    pub fn batches(&self) -> Vec<Vec<TelemetryRecord>> {
        self.state().batches.clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state().batches.iter().map(Vec::len).collect()
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.state().batches.iter().flatten().cloned().collect()
    }

    pub fn flushes(&self) -> usize {
        self.state().flushes
    }
}

impl TelemetrySink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn write_batch(&mut self, batch: &[TelemetryRecord]) -> Result<(), SinkError> {
        let mut state = self.state();
        if state.failing {
            return Err(SinkError::Rejected(format!("{} records", batch.len())));
        }
        state.batches.push(batch.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.state().flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn batch() -> Vec<TelemetryRecord> {
        vec![
            TelemetryRecord::new("backend1:8080".into(), Duration::from_millis(2), 200),
            TelemetryRecord::new("backend2:8080".into(), Duration::from_micros(750), 503),
        ]
    }

    #[test]
    fn text_format_matches_log_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/load_balancer.log");
        let mut sink = FileSink::open(&path, SinkFormat::Text, 4096).unwrap();
        sink.write_batch(&batch()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("server=backend1:8080 latency=2ms"), "{}", lines[0]);
        assert!(lines[1].ends_with("server=backend2:8080 latency=750µs"), "{}", lines[1]);
    }

    #[test]
    fn csv_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latency.csv");

        let mut sink = FileSink::open(&path, SinkFormat::Csv, 4096).unwrap();
        sink.write_batch(&batch()).unwrap();
        drop(sink);
        let mut sink = FileSink::open(&path, SinkFormat::Csv, 4096).unwrap();
        sink.write_batch(&batch()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches(CSV_HEADER).count(), 1);
        assert_eq!(content.lines().count(), 5);
        assert!(content.lines().nth(1).unwrap().contains(",backend1:8080,2.000,200"));
    }

    #[test]
    fn json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latency.jsonl");
        let mut sink = FileSink::open(&path, SinkFormat::Json, 4096).unwrap();
        sink.write_batch(&batch()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let second: serde_json::Value = serde_json::from_str(content.lines().nth(1).unwrap()).unwrap();
        assert_eq!(second["backend"], "backend2:8080");
        assert_eq!(second["status"], 503);
    }

    #[test]
    fn memory_sink_can_fail() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.write_batch(&batch()).unwrap();
        sink.set_failing(true);
        assert!(writer.write_batch(&batch()).is_err());
        assert_eq!(sink.batch_sizes(), vec![2]);
    }
}
