use chrono::{DateTime, TimeZone, Utc};
use nsg_harvester::pipeline::{HarvestJob, JobOptions};
use nsg_harvester::record::RecordKind;
use nsg_harvester::sink::FileSink;
use nsg_harvester::source::MemoryBlobStore;
use nsg_harvester::storage::CheckpointStore;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const RESOURCE_ID: &str = "/SUBSCRIPTIONS/SUBI/RESOURCEGROUPS/RGNAME/PROVIDERS/MICROSOFT.NETWORK/NETWORKSECURITYGROUPS/RGNAME-NSG";

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2017, 6, 9, hour, minute, 0).unwrap()
}

fn key(hour: u32) -> String {
    format!(
        "resourceId={}/y=2017/m=06/d=09/h={:02}/m=00/PT1H.json",
        RESOURCE_ID, hour
    )
}

fn tuple(time: DateTime<Utc>, dest_port: u16) -> String {
    format!(
        "{},10.199.1.8,10.193.160.4,15425,{},T,I,A",
        time.timestamp(),
        dest_port
    )
}

fn record(time: DateTime<Utc>, tuples: &[String]) -> String {
    let tuples = tuples
        .iter()
        .map(|t| format!("\"{}\"", t))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        r#"{{ "time": "{}", "systemId": "5f0d1c5e-0000-0000-0000-000000000000", "category": "NetworkSecurityGroupFlowEvent", "resourceId": "{}", "operationName": "NetworkSecurityGroupFlowEvents", "properties": {{"Version": 1, "flows": [{{"rule": "UserRule_HTTP", "flows": [{{"mac": "000D3AF33854", "flowTuples": [{}]}}]}}]}}}}"#,
        time.to_rfc3339(),
        RESOURCE_ID,
        tuples
    )
}

fn document(records: &[String]) -> String {
    format!("{{\"records\": [{}]}}", records.join("\n,"))
}

/// The bytes an append adds when read from the previous end of the object.
fn appended(records: &[String]) -> String {
    format!(",{}]}}", records.join("\n,"))
}

struct Harness {
    store: Arc<MemoryBlobStore>,
    state: TempDir,
    out: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryBlobStore::new()),
            state: TempDir::new().unwrap(),
            out: TempDir::new().unwrap(),
        }
    }

    fn job(&self, concurrency: usize, begin_time: Option<DateTime<Utc>>) -> HarvestJob {
        let options = JobOptions {
            name: "test".to_string(),
            record_kind: RecordKind::NsgFlow,
            prefix: "resourceId=".to_string(),
            concurrency,
            begin_time,
            data_dir: self.state.path().to_path_buf(),
        };
        let sink = Arc::new(FileSink::new(self.out.path()).unwrap());
        HarvestJob::new(options, self.store.clone(), sink)
    }

    fn checkpoints(&self) -> CheckpointStore {
        CheckpointStore::load(self.state.path(), "file").unwrap()
    }

    fn emitted_events(&self) -> usize {
        count_events(self.out.path())
    }
}

fn count_events(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let bytes = std::fs::read(entry.unwrap().path()).unwrap();
            let events: Vec<serde_json::Value> = serde_json::from_slice(&bytes).unwrap();
            events.len()
        })
        .sum()
}

fn seed_two_hours(harness: &Harness) {
    harness.store.put(
        &key(20),
        document(&[record(at(20, 1), &[tuple(at(20, 1), 80)])]),
        at(20, 2),
    );
    harness.store.put(
        &key(21),
        document(&[
            record(at(21, 1), &[tuple(at(21, 1), 80)]),
            record(at(21, 2), &[tuple(at(21, 2), 443)]),
        ]),
        at(21, 3),
    );
}

#[tokio::test]
async fn test_first_run_emits_everything_and_commits() {
    let harness = Harness::new();
    seed_two_hours(&harness);

    let report = harness.job(2, None).run().await.unwrap();
    assert_eq!(report.discovered, 2);
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.records, 3);
    assert_eq!(report.events, 3);
    assert_eq!(harness.emitted_events(), 3);

    let store = harness.checkpoints();
    assert!(harness.state.path().join("nsg-harvester-status-file.json").exists());
    assert_eq!(store.len(), 2);

    let latest = store.get(&key(21)).unwrap();
    assert_eq!(latest.last_processed_record_time, Some(at(21, 2)));
    assert_eq!(latest.last_processed_timestamp, at(21, 2).timestamp());
    assert_eq!(latest.last_record_count, 2);
    assert_eq!(latest.log_time, Some(at(21, 0)));
    assert!(latest.last_processed_byte_offset > 0);
}

#[tokio::test]
async fn test_unchanged_objects_are_skipped() {
    let harness = Harness::new();
    seed_two_hours(&harness);
    let job = harness.job(1, None);

    job.run().await.unwrap();
    let before = harness.checkpoints();

    let report = job.run().await.unwrap();
    assert_eq!(report.unchanged, 2);
    assert_eq!(report.dispatched, 0);
    assert_eq!(report.events, 0);
    assert_eq!(harness.emitted_events(), 3);
    assert_eq!(harness.checkpoints(), before);
}

#[tokio::test]
async fn test_appended_records_resume_from_offset() {
    let harness = Harness::new();
    seed_two_hours(&harness);
    harness.job(1, None).run().await.unwrap();

    let first_length = harness
        .checkpoints()
        .get(&key(21))
        .unwrap()
        .last_processed_byte_offset;

    let tail = appended(&[record(
        at(21, 5),
        &[tuple(at(21, 5), 22), tuple(at(21, 5), 3389)],
    )]);
    harness.store.append(&key(21), tail.as_bytes(), at(21, 6));

    let report = harness.job(1, None).run().await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.records, 1);
    assert_eq!(report.events, 2);
    assert_eq!(harness.emitted_events(), 5);

    let checkpoint = harness.checkpoints().get(&key(21)).cloned().unwrap();
    assert_eq!(
        checkpoint.last_processed_byte_offset,
        first_length + tail.len() as u64
    );
    assert_eq!(checkpoint.last_processed_record_time, Some(at(21, 5)));
    assert_eq!(checkpoint.last_modified, Some(at(21, 6)));
}

#[tokio::test]
async fn test_reread_records_are_not_emitted_twice() {
    let harness = Harness::new();
    seed_two_hours(&harness);
    harness.job(1, None).run().await.unwrap();

    // Forget the offset but keep the watermark, as when an object is replaced.
    let mut store = harness.checkpoints();
    let mut checkpoint = store.get(&key(21)).cloned().unwrap();
    checkpoint.last_processed_byte_offset = 0;
    checkpoint.last_modified = Some(at(21, 0));
    store.insert(checkpoint);
    store.save(harness.state.path(), "file").unwrap();

    let report = harness.job(1, None).run().await.unwrap();
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.records, 2);
    assert_eq!(report.events, 0);
    assert_eq!(harness.emitted_events(), 3);

    let checkpoint = harness.checkpoints().get(&key(21)).cloned().unwrap();
    assert!(checkpoint.last_processed_byte_offset > 0);
    assert_eq!(checkpoint.last_modified, Some(at(21, 3)));
}

#[tokio::test]
async fn test_begin_time_excludes_older_hours() {
    let harness = Harness::new();
    seed_two_hours(&harness);

    let report = harness.job(1, Some(at(20, 0))).run().await.unwrap();
    assert_eq!(report.before_floor, 1);
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.events, 2);

    let store = harness.checkpoints();
    assert!(store.get(&key(20)).is_none());
    assert!(store.get(&key(21)).is_some());
}

#[tokio::test]
async fn test_malformed_key_is_skipped() {
    let harness = Harness::new();
    seed_two_hours(&harness);
    harness
        .store
        .put("resourceId=/not/an/hourly/object.json", "{}", at(21, 0));

    let report = harness.job(1, None).run().await.unwrap();
    assert_eq!(report.discovered, 3);
    assert_eq!(report.malformed_keys, 1);
    assert_eq!(report.succeeded, 2);
    assert_eq!(harness.checkpoints().len(), 2);
}

#[tokio::test]
async fn test_failed_object_keeps_prior_checkpoint() {
    let harness = Harness::new();
    seed_two_hours(&harness);
    harness
        .store
        .put(&key(22), "this object holds no records", at(22, 1));

    let report = harness.job(3, None).run().await.unwrap();
    assert_eq!(report.dispatched, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);

    let store = harness.checkpoints();
    assert_eq!(store.len(), 2);
    assert!(store.get(&key(22)).is_none());

    // Fixed on the next run.
    harness.store.put(
        &key(22),
        document(&[record(at(22, 3), &[tuple(at(22, 3), 80)])]),
        at(22, 4),
    );
    let report = harness.job(3, None).run().await.unwrap();
    assert_eq!(report.failed, 0);
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.events, 1);
    assert_eq!(harness.checkpoints().len(), 3);
}

#[tokio::test]
async fn test_error_budget_does_not_stop_the_run() {
    let harness = Harness::new();
    for hour in 0..15 {
        harness.store.put(&key(hour), "garbage", at(hour, 1));
    }
    harness.store.put(
        &key(20),
        document(&[record(at(20, 1), &[tuple(at(20, 1), 80)])]),
        at(20, 2),
    );

    let report = harness.job(4, None).run().await.unwrap();
    assert_eq!(report.failed, 15);
    assert_eq!(report.succeeded, 1);
    assert_eq!(harness.checkpoints().len(), 1);
}

#[tokio::test]
async fn test_concurrent_runs_do_not_overlap() {
    let harness = Harness::new();
    seed_two_hours(&harness);
    let job = Arc::new(harness.job(2, None));

    let (a, b) = tokio::join!(job.run(), job.run());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.events + b.events, 3);
    assert_eq!(a.unchanged + b.unchanged, 2);
    assert_eq!(harness.emitted_events(), 3);
    assert_eq!(job.emitted(), 3);
}

#[tokio::test]
async fn test_status_reflects_last_run() {
    let harness = Harness::new();
    seed_two_hours(&harness);
    let job = harness.job(1, None);

    let status = job.status().await;
    assert!(status.last_report.is_none());
    assert!(status.checkpoints.is_empty());

    job.run().await.unwrap();
    let status = job.status().await;
    assert_eq!(status.last_report.unwrap().events, 3);
    assert!(status.last_error.is_none());
    assert_eq!(status.checkpoints.len(), 2);
}

#[tokio::test]
async fn test_corrupt_checkpoint_store_fails_the_run() {
    let harness = Harness::new();
    seed_two_hours(&harness);
    std::fs::write(
        harness.state.path().join("nsg-harvester-status-file.json"),
        "{ not json",
    )
    .unwrap();

    let job = harness.job(1, None);
    assert!(job.run().await.is_err());
    assert!(job.status().await.last_error.is_some());
    assert_eq!(harness.emitted_events(), 0);
}

#[tokio::test]
async fn test_stored_entry_without_inner_key_is_updated_in_place() {
    let harness = Harness::new();
    harness.store.put(
        &key(20),
        document(&[record(at(20, 1), &[tuple(at(20, 1), 80)])]),
        at(20, 2),
    );

    let mut entries = serde_json::Map::new();
    entries.insert(
        key(20),
        serde_json::json!({
            "etag": "0x0",
            "last_modified": "2017-06-09T20:01:00Z",
            "last_processed_byte_offset": 0
        }),
    );
    std::fs::write(
        harness.state.path().join("nsg-harvester-status-file.json"),
        serde_json::to_vec(&entries).unwrap(),
    )
    .unwrap();

    let report = harness.job(1, None).run().await.unwrap();
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.events, 1);

    let report = harness.job(1, None).run().await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.dispatched, 0);

    let store = harness.checkpoints();
    assert_eq!(store.len(), 1);
    assert!(store.get("").is_none());
    let checkpoint = store.get(&key(20)).unwrap();
    assert_eq!(checkpoint.key, key(20));
    assert_eq!(checkpoint.last_modified, Some(at(20, 2)));
}
