//! Progress events and throughput tracking for transfers.

use std::time::{Duration, Instant};

/// Which half of the pipeline an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    /// Downloading from the photo server to local disk.
    Download,
    /// Uploading to a cloud target.
    Upload,
}

/// A single progress observation for one archive.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Name of the archive being transferred.
    pub archive_name: String,
    /// Stage the archive is in.
    pub stage: TransferStage,
    /// Completion percentage, capped at 100.
    pub percent: f64,
    /// Bytes transferred so far.
    pub bytes: u64,
    /// Expected total bytes.
    pub total_bytes: u64,
    /// Instantaneous throughput in bytes per second.
    pub bytes_per_sec: f64,
}

impl ProgressEvent {
    /// Build an event, deriving the capped percentage.
    pub fn new(
        archive_name: impl Into<String>,
        stage: TransferStage,
        bytes: u64,
        total_bytes: u64,
        bytes_per_sec: f64,
    ) -> Self {
        Self {
            archive_name: archive_name.into(),
            stage,
            percent: percent_of(bytes, total_bytes),
            bytes,
            total_bytes,
            bytes_per_sec,
        }
    }
}

/// Completion percentage, capped at 100.
///
/// An unknown total reports 0 rather than guessing.
pub fn percent_of(bytes: u64, total_bytes: u64) -> f64 {
    if total_bytes == 0 {
        return 0.0;
    }
    ((bytes as f64 / total_bytes as f64) * 100.0).min(100.0)
}

/// Instantaneous throughput tracker.
///
/// Speed is computed from the byte delta since the previous sample, so it
/// reflects the current transfer rate rather than the lifetime average.
#[derive(Debug)]
pub struct SpeedTracker {
    last_instant: Instant,
    last_bytes: u64,
    last_speed: f64,
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeedTracker {
    /// Create a tracker starting at zero bytes now.
    pub fn new() -> Self {
        Self {
            last_instant: Instant::now(),
            last_bytes: 0,
            last_speed: 0.0,
        }
    }

    /// Record the current byte count and return bytes/sec since last sample.
    ///
    /// Samples closer together than 10ms return the previous reading to
    /// avoid wild spikes from sub-millisecond intervals.
    pub fn sample(&mut self, bytes: u64) -> f64 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_instant);
        if elapsed < Duration::from_millis(10) {
            return self.last_speed;
        }
        let delta = bytes.saturating_sub(self.last_bytes);
        self.last_speed = delta as f64 / elapsed.as_secs_f64();
        self.last_instant = now;
        self.last_bytes = bytes;
        self.last_speed
    }
}

/// Minimum interval gate for progress emission.
///
/// Transfers move in small chunks; reporting every chunk floods the caller.
/// `ready()` answers whether enough time has passed since the last accepted
/// emission (~100ms by default, matching the upload drivers' cadence).
#[derive(Debug)]
pub struct EmitGate {
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl EmitGate {
    /// Create a gate with the default 100ms interval.
    pub fn new() -> Self {
        Self::with_interval(Duration::from_millis(100))
    }

    /// Create a gate with a custom interval.
    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            last_emit: None,
            min_interval,
        }
    }

    /// Whether an emission is due; records the emission when it is.
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

impl Default for EmitGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a byte count for humans, e.g. `1.50 MB`.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let bytes = bytes as f64;
    if bytes >= GB {
        format!("{:.2} GB", bytes / GB)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes / KB)
    } else {
        format!("{} B", bytes as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_percent_of_caps_at_100() {
        assert_eq!(percent_of(50, 100), 50.0);
        assert_eq!(percent_of(100, 100), 100.0);
        assert_eq!(percent_of(150, 100), 100.0);
    }

    #[test]
    fn test_percent_of_unknown_total_is_zero() {
        assert_eq!(percent_of(50, 0), 0.0);
    }

    #[test]
    fn test_progress_event_derives_percent() {
        let event = ProgressEvent::new("june", TransferStage::Download, 512, 1024, 100.0);
        assert_eq!(event.percent, 50.0);
        assert_eq!(event.bytes, 512);
    }

    #[test]
    fn test_speed_tracker_measures_delta() {
        let mut tracker = SpeedTracker::new();
        thread::sleep(Duration::from_millis(20));
        let speed = tracker.sample(10_000);
        assert!(speed > 0.0);

        // No new bytes: speed drops toward zero.
        thread::sleep(Duration::from_millis(20));
        let speed = tracker.sample(10_000);
        assert_eq!(speed, 0.0);
    }

    #[test]
    fn test_emit_gate_limits_rate() {
        let mut gate = EmitGate::with_interval(Duration::from_millis(50));
        assert!(gate.ready());
        assert!(!gate.ready());
        thread::sleep(Duration::from_millis(60));
        assert!(gate.ready());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
        assert_eq!(format_size(2 * 1024 * 1024 * 1024), "2.00 GB");
    }
}
