//! # JSONL Broadcast Sink
//!
//! Writes every published frame as one JSON line, rotating to a new file
//! after `max_records_per_file` records and keeping only the newest
//! `max_files_to_keep` files.

use chrono::Utc;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::broadcast::BroadcastProfile;
use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::protocol::decoder::hex;
use crate::protocol::{encode_power_only_page, BroadcastFrame};

const FILE_PREFIX: &str = "telemetry_";
const FILE_EXTENSION: &str = "jsonl";

/// One line of the telemetry log
#[derive(Debug, Serialize)]
struct FrameRecord<'a> {
    timestamp: String,
    #[serde(flatten)]
    frame: &'a BroadcastFrame,
    page: String,
}

/// Broadcast profile that records frames to rotating JSONL files
#[derive(Debug)]
pub struct JsonlBroadcaster {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    records_in_file: usize,
    sequence: u32,
}

impl JsonlBroadcaster {
    /// Create the sink, making the log directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the log directory cannot be created
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.log_dir);
        fs::create_dir_all(&dir)?;
        info!("Telemetry log directory: {}", dir.display());

        Ok(Self {
            dir,
            max_records_per_file: config.max_records_per_file,
            max_files_to_keep: config.max_files_to_keep,
            writer: None,
            current_path: None,
            records_in_file: 0,
            sequence: 0,
        })
    }

    /// File currently being written, if any
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// Flush buffered records to disk
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        self.flush()?;

        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.sequence,
            FILE_EXTENSION
        );
        self.sequence = self.sequence.wrapping_add(1);

        let path = self.dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Opened telemetry file {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.current_path = Some(path);
        self.records_in_file = 0;

        self.prune()
    }

    /// Delete the oldest telemetry files beyond the retention limit
    fn prune(&self) -> Result<()> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_telemetry_file(path))
            .collect();

        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        // Names embed timestamp and sequence, so lexical order is age order
        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove old telemetry file {}: {}", path.display(), e);
            }
        }

        Ok(())
    }
}

fn is_telemetry_file(path: &Path) -> bool {
    let name_matches = path
        .file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| name.starts_with(FILE_PREFIX));

    name_matches && path.extension().map_or(false, |ext| ext == FILE_EXTENSION)
}

impl BroadcastProfile for JsonlBroadcaster {
    fn publish(&mut self, frame: &BroadcastFrame) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let record = FrameRecord {
            timestamp: Utc::now().to_rfc3339(),
            frame,
            page: hex(&encode_power_only_page(frame)),
        };
        let line = serde_json::to_string(&record)?;

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
            self.records_in_file += 1;
        }

        Ok(())
    }
}

impl Drop for JsonlBroadcaster {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush telemetry log: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &Path, records: usize, files: usize) -> TelemetryConfig {
        TelemetryConfig {
            enabled: true,
            log_dir: dir.to_string_lossy().into_owned(),
            max_records_per_file: records,
            max_files_to_keep: files,
        }
    }

    fn frame(event_count: u8) -> BroadcastFrame {
        BroadcastFrame {
            instant_power: 200,
            accumulated_power: 200 * u16::from(event_count),
            event_count,
            instant_cadence: 90,
        }
    }

    fn telemetry_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| is_telemetry_file(p))
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_writes_one_json_line_per_frame() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonlBroadcaster::new(&config(dir.path(), 100, 5)).unwrap();

        sink.publish(&frame(1)).unwrap();
        sink.publish(&frame(2)).unwrap();
        sink.flush().unwrap();

        let contents = fs::read_to_string(sink.current_path().unwrap()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let value: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(value["instant_power"], 200);
        assert_eq!(value["accumulated_power"], 400);
        assert_eq!(value["event_count"], 2);
        assert_eq!(value["instant_cadence"], 90);
        assert_eq!(value["page"], "10 02 FF 5A 90 01 C8 00");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_rotates_after_record_limit() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonlBroadcaster::new(&config(dir.path(), 3, 10)).unwrap();

        for i in 0..7 {
            sink.publish(&frame(i)).unwrap();
        }
        sink.flush().unwrap();

        let files = telemetry_files(dir.path());
        assert_eq!(files.len(), 3);
        let counts: Vec<usize> = files
            .iter()
            .map(|p| fs::read_to_string(p).unwrap().lines().count())
            .collect();
        assert_eq!(counts, vec![3, 3, 1]);
    }

    #[test]
    fn test_keeps_only_newest_files() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonlBroadcaster::new(&config(dir.path(), 1, 2)).unwrap();

        for i in 0..5 {
            sink.publish(&frame(i)).unwrap();
        }
        sink.flush().unwrap();

        let files = telemetry_files(dir.path());
        assert_eq!(files.len(), 2);
        assert_eq!(files.last().map(PathBuf::as_path), sink.current_path());
    }

    #[test]
    fn test_ignores_unrelated_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();
        let mut sink = JsonlBroadcaster::new(&config(dir.path(), 1, 1)).unwrap();

        for i in 0..3 {
            sink.publish(&frame(i)).unwrap();
        }

        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let _sink = JsonlBroadcaster::new(&config(&nested, 10, 1)).unwrap();
        assert!(nested.is_dir());
    }
}
