//! Integration tests for the export pipeline.
//!
//! These tests drive the full plan → download → resume flow through the
//! orchestrator against an in-memory server fake, verifying:
//! - Interrupted downloads resume to a byte-identical file
//! - Servers that ignore `Range` still produce correct output
//! - Parameter changes between pause and resume force a clean restart
//! - Existing files within tolerance short-circuit the network entirely
//!
//! Run with: `cargo test --test export_pipeline`

use std::fs;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use archiport::api::{ApiResult, ArchivePlan, ArchivePlanner, ArchiveResponse, ArchiveStream, ExportScope};
use archiport::orchestrator::{ArchiveState, Destination, ExportRequest, TransferOrchestrator};

// ============================================================================
// Helper Functions
// ============================================================================

/// Deterministic payload so byte-identity checks are meaningful.
fn archive_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + 7) % 251) as u8).collect()
}

/// Reader that trips a shared cancel flag after `remaining` bytes.
struct TrippingReader {
    inner: Cursor<Vec<u8>>,
    remaining: usize,
    flag: Arc<AtomicBool>,
}

impl Read for TrippingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let cap = buf.len().min(self.remaining.max(1));
        let read = self.inner.read(&mut buf[..cap])?;
        self.remaining = self.remaining.saturating_sub(read);
        if self.remaining == 0 {
            self.flag.store(true, Ordering::SeqCst);
        }
        Ok(read)
    }
}

/// In-memory archive server fake.
struct FakeServer {
    plan: ArchivePlan,
    data: Vec<u8>,
    honor_range: bool,
    /// Trip this cancel flag after N bytes of the next opened stream.
    trip: Mutex<Option<(usize, Arc<AtomicBool>)>>,
    opens: Arc<Mutex<Vec<Option<u64>>>>,
}

impl FakeServer {
    fn new(plan_json: serde_json::Value, data: Vec<u8>, honor_range: bool) -> Self {
        Self {
            plan: ArchivePlan::from_json(&plan_json),
            data,
            honor_range,
            trip: Mutex::new(None),
            opens: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn trip_after(&self, bytes: usize, flag: Arc<AtomicBool>) {
        *self.trip.lock().unwrap() = Some((bytes, flag));
    }

    /// Handle to the log of `open` calls, usable after the server has been
    /// moved into an orchestrator.
    fn opens_handle(&self) -> Arc<Mutex<Vec<Option<u64>>>> {
        Arc::clone(&self.opens)
    }
}

impl ArchivePlanner for FakeServer {
    fn prepare(&self, _scope: &ExportScope, _max: u64) -> ApiResult<ArchivePlan> {
        Ok(self.plan.clone())
    }
}

impl ArchiveStream for FakeServer {
    fn open(&self, _asset_ids: &[String], offset: Option<u64>) -> ApiResult<ArchiveResponse> {
        self.opens.lock().unwrap().push(offset);

        let total = self.data.len() as u64;
        let (bytes, partial, content_range) = match offset {
            Some(off) if self.honor_range => (
                self.data[off as usize..].to_vec(),
                true,
                Some(format!("bytes {}-{}/{}", off, total - 1, total)),
            ),
            _ => (self.data.clone(), false, None),
        };
        let content_length = Some(bytes.len() as u64);

        let body: Box<dyn Read + Send> = match self.trip.lock().unwrap().take() {
            Some((after, flag)) => Box::new(TrippingReader {
                inner: Cursor::new(bytes),
                remaining: after,
                flag,
            }),
            None => Box::new(Cursor::new(bytes)),
        };

        Ok(ArchiveResponse {
            body,
            partial,
            content_range,
            content_length,
        })
    }

    fn server_identity(&self) -> &str {
        "http://photo-server/api"
    }
}

/// The §-scenario plan: one 3 MiB archive of assets "a" and "b".
fn three_mib_plan() -> serde_json::Value {
    serde_json::json!({
        "totalSize": 3_145_728,
        "archives": [
            {"assetIds": ["a", "b"], "size": 3_145_728}
        ]
    })
}

fn request() -> ExportRequest {
    ExportRequest::new(
        ExportScope::Assets(vec!["a".to_string(), "b".to_string()]),
        "june",
        4 * 1024 * 1024 * 1024u64,
        Destination::Local,
    )
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Baseline: an uninterrupted export lands the exact payload on disk.
#[test]
fn uninterrupted_export_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let data = archive_bytes(3_145_728);
    let server = FakeServer::new(three_mib_plan(), data.clone(), true);

    let orchestrator = TransferOrchestrator::new(server, dir.path());
    let report = orchestrator.run(&request(), |_| {});

    assert!(report.all_succeeded());
    assert_eq!(report.total_size, 3_145_728);
    let on_disk = fs::read(dir.path().join("june.zip")).unwrap();
    assert_eq!(on_disk.len(), 3_145_728);
    assert_eq!(on_disk, data);
}

/// A download interrupted after 1,000,000 bytes resumes from the partial
/// file and finishes byte-identical to an uninterrupted download.
#[test]
fn interrupted_download_resumes_to_identical_file() {
    let dir = TempDir::new().unwrap();
    let data = archive_bytes(3_145_728);

    // First run: cancellation trips after exactly 1,000,000 bytes.
    {
        let server = FakeServer::new(three_mib_plan(), data.clone(), true);
        let cancel = Arc::new(AtomicBool::new(false));
        server.trip_after(1_000_000, Arc::clone(&cancel));

        let orchestrator =
            TransferOrchestrator::new(server, dir.path()).with_cancel_flag(cancel);
        let report = orchestrator.run(&request(), |_| {});

        assert!(report.is_resumable());
        assert_eq!(report.archives[0].state, ArchiveState::Paused);
        assert_eq!(report.archives[0].bytes_transferred, 1_000_000);

        let partial = dir.path().join("june.zip.partial");
        assert_eq!(fs::metadata(&partial).unwrap().len(), 1_000_000);
        assert!(orchestrator.resume_store().has_any());
    }

    // Second run: a fresh orchestrator resumes from the partial file.
    {
        let server = FakeServer::new(three_mib_plan(), data.clone(), true);
        let opens = server.opens_handle();
        let orchestrator = TransferOrchestrator::new(server, dir.path());
        let report = orchestrator.run(&request(), |_| {});

        assert!(report.all_succeeded());
        // The resumed request carried the byte offset of the partial file.
        assert_eq!(*opens.lock().unwrap(), vec![Some(1_000_000)]);
        let on_disk = fs::read(dir.path().join("june.zip")).unwrap();
        assert_eq!(on_disk.len(), 3_145_728);
        assert_eq!(on_disk, data);
        assert!(!dir.path().join("june.zip.partial").exists());
        assert!(!orchestrator.resume_store().has_any());
    }
}

/// A server that ignores `Range` forces a clean full restart, which still
/// produces a correctly-sized, byte-identical file.
#[test]
fn range_ignoring_server_still_produces_correct_file() {
    let dir = TempDir::new().unwrap();
    let data = archive_bytes(3_145_728);

    // Interrupt a first download to leave resume state behind.
    {
        let server = FakeServer::new(three_mib_plan(), data.clone(), true);
        let cancel = Arc::new(AtomicBool::new(false));
        server.trip_after(1_000_000, Arc::clone(&cancel));
        let orchestrator =
            TransferOrchestrator::new(server, dir.path()).with_cancel_flag(cancel);
        assert!(orchestrator.run(&request(), |_| {}).is_resumable());
    }

    // Resume against a server that ignores ranges.
    let server = FakeServer::new(three_mib_plan(), data.clone(), false);
    let opens = server.opens_handle();
    let orchestrator = TransferOrchestrator::new(server, dir.path());
    let report = orchestrator.run(&request(), |_| {});

    assert!(report.all_succeeded());
    // The range was attempted, not honored, and retried as a full request.
    assert_eq!(*opens.lock().unwrap(), vec![Some(1_000_000), None]);
    let on_disk = fs::read(dir.path().join("june.zip")).unwrap();
    assert_eq!(on_disk, data);
}

/// Changing the asset set between pause and resume invalidates the resume
/// record: the engine restarts from scratch instead of appending.
#[test]
fn changed_asset_ids_force_full_restart() {
    let dir = TempDir::new().unwrap();
    let data = archive_bytes(3_145_728);

    {
        let server = FakeServer::new(three_mib_plan(), data.clone(), true);
        let cancel = Arc::new(AtomicBool::new(false));
        server.trip_after(1_000_000, Arc::clone(&cancel));
        let orchestrator =
            TransferOrchestrator::new(server, dir.path()).with_cancel_flag(cancel);
        assert!(orchestrator.run(&request(), |_| {}).is_resumable());
    }

    // Same archive name, different asset set.
    let plan = serde_json::json!({
        "totalSize": 3_145_728,
        "archives": [
            {"assetIds": ["c", "d"], "size": 3_145_728}
        ]
    });
    let server = FakeServer::new(plan, data.clone(), true);
    let opens = server.opens_handle();
    let orchestrator = TransferOrchestrator::new(server, dir.path());
    let report = orchestrator.run(&request(), |_| {});

    assert!(report.all_succeeded());
    // No range request was attempted: the mismatch purged the record.
    assert_eq!(*opens.lock().unwrap(), vec![None]);
    assert_eq!(fs::read(dir.path().join("june.zip")).unwrap(), data);
}

/// An existing final file within tolerance short-circuits the download;
/// one byte past tolerance forces a re-download.
#[test]
fn tolerance_boundary_gates_skip_behavior() {
    let data = archive_bytes(3_145_728);
    let tolerance = 3_145_728u64 / 1000;

    // Exactly at tolerance: accepted, no network call.
    {
        let dir = TempDir::new().unwrap();
        let short = (3_145_728 - tolerance) as usize;
        fs::write(dir.path().join("june.zip"), &data[..short]).unwrap();

        let server = FakeServer::new(three_mib_plan(), data.clone(), true);
        let opens = server.opens_handle();
        let orchestrator = TransferOrchestrator::new(server, dir.path());
        let report = orchestrator.run(&request(), |_| {});

        assert_eq!(report.archives[0].state, ArchiveState::SkippedExisting);
        assert!(opens.lock().unwrap().is_empty());
    }

    // One byte beyond tolerance: the stale file is replaced.
    {
        let dir = TempDir::new().unwrap();
        let short = (3_145_728 - tolerance - 1) as usize;
        fs::write(dir.path().join("june.zip"), &data[..short]).unwrap();

        let server = FakeServer::new(three_mib_plan(), data.clone(), true);
        let orchestrator = TransferOrchestrator::new(server, dir.path());
        let report = orchestrator.run(&request(), |_| {});

        assert_eq!(report.archives[0].state, ArchiveState::Completed);
        assert_eq!(fs::read(dir.path().join("june.zip")).unwrap(), data);
    }
}

/// Multi-archive plans download in order under `_partN` names.
#[test]
fn multi_archive_plan_downloads_in_order() {
    let dir = TempDir::new().unwrap();
    // Two archives served from the same byte pool; sizes differ so the
    // fake serves each open from its own descriptor-sized prefix.
    let data = archive_bytes(200_000);
    let plan = serde_json::json!({
        "totalSize": 400_000,
        "archives": [
            {"assetIds": ["a"], "size": 200_000},
            {"assetIds": ["b"], "size": 200_000}
        ]
    });

    let server = FakeServer::new(plan, data.clone(), true);
    let orchestrator = TransferOrchestrator::new(server, dir.path());
    let report = orchestrator.run(&request(), |_| {});

    assert!(report.all_succeeded());
    assert_eq!(report.archives[0].archive_name, "june_part1");
    assert_eq!(report.archives[1].archive_name, "june_part2");
    assert_eq!(
        fs::read(dir.path().join("june_part1.zip")).unwrap(),
        data
    );
    assert_eq!(
        fs::read(dir.path().join("june_part2.zip")).unwrap(),
        data
    );
}

/// Progress events climb monotonically and cap at 100 percent.
#[test]
fn progress_events_are_monotonic_and_capped() {
    let dir = TempDir::new().unwrap();
    let data = archive_bytes(512 * 1024);
    let plan = serde_json::json!({
        "totalSize": 524_288,
        "archives": [{"assetIds": ["a"], "size": 524_288}]
    });

    let server = FakeServer::new(plan, data, true);
    let orchestrator = TransferOrchestrator::new(server, dir.path());

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let report = orchestrator.run(&request(), move |event| {
        sink.lock().unwrap().push((event.percent, event.bytes));
    });

    assert!(report.all_succeeded());
    let events = events.lock().unwrap();
    assert!(!events.is_empty());
    let mut last = (0.0, 0u64);
    for &(percent, bytes) in events.iter() {
        assert!(percent >= last.0 && bytes >= last.1);
        assert!(percent <= 100.0);
        last = (percent, bytes);
    }
    assert_eq!(events.last().unwrap().0, 100.0);
}
