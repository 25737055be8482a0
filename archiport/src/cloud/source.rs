//! Upload sources and progress metering.
//!
//! Both cloud drivers consume the same [`UploadSource`] shape: a sequential
//! byte producer with a known total length. A source is either a local file
//! or a live HTTP response body being relayed without touching disk.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::export::{percent_of, EmitGate, SpeedTracker};

use super::error::{CloudError, CloudResult};

/// Progress callback shared by both drivers.
///
/// Arguments: percent (capped at 100), bytes sent, total bytes, bytes/sec.
/// Returning `false` cancels the upload; this is the only cancellation
/// channel the drivers have.
pub type ProgressCallback = Box<dyn FnMut(f64, u64, u64, f64) -> bool + Send>;

/// A sequential byte producer with a known total length.
pub trait UploadSource: Read + Send {
    /// Total number of bytes the source will yield.
    fn total_size(&self) -> u64;

    /// Whether the source is a local file whose remote copy can be
    /// size-verified after upload.
    fn is_local_file(&self) -> bool {
        false
    }
}

/// Upload source backed by a local file.
#[derive(Debug)]
pub struct LocalFileSource {
    file: File,
    size: u64,
    path: PathBuf,
}

impl LocalFileSource {
    /// Open a local file for upload.
    ///
    /// Missing and empty files are rejected up front; an empty PUT would
    /// otherwise create a useless remote object.
    pub fn open(path: impl AsRef<Path>) -> CloudResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            CloudError::Source(format!("local file not found: {}: {}", path.display(), e))
        })?;
        let size = file
            .metadata()
            .map_err(|e| CloudError::Source(e.to_string()))?
            .len();
        if size == 0 {
            return Err(CloudError::Source(format!(
                "cannot upload empty file: {}",
                path.display()
            )));
        }
        Ok(Self {
            file,
            size,
            path: path.to_path_buf(),
        })
    }

    /// The path the source reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for LocalFileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl UploadSource for LocalFileSource {
    fn total_size(&self) -> u64 {
        self.size
    }

    fn is_local_file(&self) -> bool {
        true
    }
}

/// Upload source backed by a live byte stream of known length.
pub struct StreamSource {
    reader: Box<dyn Read + Send>,
    size: u64,
}

impl StreamSource {
    /// Wrap a reader that will yield exactly `size` bytes.
    pub fn new(reader: Box<dyn Read + Send>, size: u64) -> Self {
        Self { reader, size }
    }
}

impl Read for StreamSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl UploadSource for StreamSource {
    fn total_size(&self) -> u64 {
        self.size
    }
}

/// Progress bookkeeping shared by both drivers.
///
/// Invokes the callback at a bounded rate (~100 ms) and records whether the
/// callback asked for cancellation.
pub(crate) struct UploadMeter {
    progress: ProgressCallback,
    total: u64,
    sent: u64,
    speed: SpeedTracker,
    gate: EmitGate,
    cancelled: bool,
}

impl UploadMeter {
    pub(crate) fn new(progress: ProgressCallback, total: u64) -> Self {
        Self {
            progress,
            total,
            sent: 0,
            speed: SpeedTracker::new(),
            gate: EmitGate::new(),
            cancelled: false,
        }
    }

    /// Record `n` freshly-sent bytes. Returns `false` when the callback
    /// requested cancellation.
    pub(crate) fn tick(&mut self, n: usize) -> bool {
        self.sent += n as u64;
        if self.gate.ready() {
            let speed = self.speed.sample(self.sent);
            let percent = percent_of(self.sent, self.total);
            if !(self.progress)(percent, self.sent, self.total, speed) {
                self.cancelled = true;
                return false;
            }
        }
        true
    }

    pub(crate) fn sent(&self) -> u64 {
        self.sent
    }

    pub(crate) fn was_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// Reader adapter that meters progress while a driver streams a source out.
///
/// A cancellation request from the callback surfaces as an `io::Error`,
/// which aborts the in-flight HTTP request; the driver then maps it back to
/// [`CloudError::Cancelled`] via [`UploadMeter::was_cancelled`] state shared
/// through `cancel_note`.
pub(crate) struct MeteredReader {
    source: Box<dyn UploadSource>,
    meter: UploadMeter,
    cancel_note: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl MeteredReader {
    pub(crate) fn new(
        source: Box<dyn UploadSource>,
        meter: UploadMeter,
        cancel_note: std::sync::Arc<std::sync::atomic::AtomicBool>,
    ) -> Self {
        Self {
            source,
            meter,
            cancel_note,
        }
    }
}

impl Read for MeteredReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.source.read(buf)?;
        if read > 0 && !self.meter.tick(read) {
            self.cancel_note
                .store(true, std::sync::atomic::Ordering::SeqCst);
            return Err(io::Error::other("upload cancelled by user"));
        }
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_local_file_source_missing_file() {
        let result = LocalFileSource::open("/definitely/not/here.zip");
        assert!(matches!(result, Err(CloudError::Source(_))));
    }

    #[test]
    fn test_local_file_source_rejects_empty_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("empty.zip");
        std::fs::write(&path, b"").unwrap();

        let result = LocalFileSource::open(&path);
        assert!(matches!(result, Err(CloudError::Source(_))));
    }

    #[test]
    fn test_local_file_source_reports_size() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.zip");
        std::fs::write(&path, vec![1u8; 2048]).unwrap();

        let source = LocalFileSource::open(&path).unwrap();
        assert_eq!(source.total_size(), 2048);
        assert!(source.is_local_file());
    }

    #[test]
    fn test_stream_source_reads_through() {
        let mut source = StreamSource::new(Box::new(Cursor::new(vec![7u8; 100])), 100);
        assert_eq!(source.total_size(), 100);
        assert!(!source.is_local_file());

        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 100);
    }

    #[test]
    fn test_upload_meter_counts_and_reports() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_cl = Arc::clone(&seen);
        let progress: ProgressCallback = Box::new(move |percent, bytes, total, _speed| {
            seen_cl.lock().unwrap().push((percent, bytes, total));
            true
        });

        let mut meter = UploadMeter::new(progress, 1000);
        assert!(meter.tick(400));
        assert_eq!(meter.sent(), 400);
        assert!(!meter.was_cancelled());

        let seen = seen.lock().unwrap();
        // First tick always reports (gate starts open).
        assert_eq!(seen[0], (40.0, 400, 1000));
    }

    #[test]
    fn test_metered_reader_cancellation() {
        let cancel_note = Arc::new(AtomicBool::new(false));
        let progress: ProgressCallback = Box::new(|_, _, _, _| false);
        let meter = UploadMeter::new(progress, 100);
        let source = StreamSource::new(Box::new(Cursor::new(vec![1u8; 100])), 100);
        let mut reader = MeteredReader::new(Box::new(source), meter, Arc::clone(&cancel_note));

        let mut buf = [0u8; 64];
        let err = reader.read(&mut buf).unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert!(cancel_note.load(Ordering::SeqCst));
    }
}
