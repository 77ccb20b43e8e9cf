//! Integration tests for batch coordination.

mod common;

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::*;
use image::metadata::Orientation;
use image::{DynamicImage, RgbImage};
use rawbatch_core::types::new_batch_id;
use rawbatch_events::EventBus;
use rawbatch_pipeline::{
    build_archive, ConversionJob, DecodeError, DecodedImage, ImageOrigin, RawDecoder, RawSource,
    ValidationError,
};

fn job(name: &str, bytes: Vec<u8>) -> ConversionJob {
    ConversionJob::new(name, bytes, false)
}

// ---------------------------------------------------------------------------
// End to end with the real decoder
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mixed_batch_converts_filters_and_reports() {
    let staging = tempfile::tempdir().unwrap();
    let coordinator = real_coordinator(staging.path());
    let bus = EventBus::default();
    let mut rx = bus.subscribe();
    let batch_id = new_batch_id();

    let jobs = vec![
        ConversionJob::new("a.CR2", synthetic_raw(480, 320), true),
        ConversionJob::new("b.txt", b"notes".to_vec(), true),
        ConversionJob::new("c.NEF", corrupt_raw(), true),
    ];

    let state = coordinator.run_batch(batch_id, jobs, &bus).await.unwrap();

    assert_eq!(state.total, 2);
    assert_eq!(state.completed, 2);
    assert_eq!(state.success_count(), 1);
    assert_eq!(state.failure_count(), 1);
    assert_eq!(state.failures[0].original_name, "c.NEF");
    assert!(state.failures[0].message.contains("c.NEF"));

    let converted = &state.results["a.jpg"];
    let image = image::load_from_memory(converted).unwrap();
    assert_eq!((image.width(), image.height()), (1920, 1280));

    let progress = progress_of(&drain(&mut rx));
    assert_eq!(progress.len(), 2);
    assert_eq!(progress.last().unwrap().1, 100.0);
    assert_eq!(progress.iter().filter(|p| p.2).count(), 1);

    let archive = build_archive(&state.results).unwrap();
    let zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
    assert_eq!(zip.file_names().collect::<Vec<_>>(), vec!["a.jpg"]);

    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_batch_fails_validation() {
    let staging = tempfile::tempdir().unwrap();
    let bus = EventBus::default();

    let result = scripted_coordinator(staging.path(), 2)
        .run_batch(new_batch_id(), vec![], &bus)
        .await;

    assert_matches!(result, Err(ValidationError::NoFiles));
}

#[tokio::test]
async fn batch_without_raw_files_publishes_nothing() {
    let staging = tempfile::tempdir().unwrap();
    let bus = EventBus::default();
    let mut rx = bus.subscribe();

    let result = scripted_coordinator(staging.path(), 2)
        .run_batch(
            new_batch_id(),
            vec![job("x.jpg", b"ok".to_vec()), job("y.png", b"ok".to_vec())],
            &bus,
        )
        .await;

    assert_matches!(result, Err(ValidationError::NoRawFiles));
    assert!(drain(&mut rx).is_empty());
}

// ---------------------------------------------------------------------------
// Ordering and progress
// ---------------------------------------------------------------------------

#[tokio::test]
async fn events_follow_completion_order() {
    let staging = tempfile::tempdir().unwrap();
    let bus = EventBus::default();
    let mut rx = bus.subscribe();

    let jobs = vec![
        job("slow.CR2", sleep_payload(400)),
        job("fast.NEF", sleep_payload(10)),
    ];
    scripted_coordinator(staging.path(), 2)
        .run_batch(new_batch_id(), jobs, &bus)
        .await
        .unwrap();

    let progress = progress_of(&drain(&mut rx));
    assert_eq!(progress[0].0, "Converted: fast.jpg");
    assert_eq!(progress[0].1, 50.0);
    assert_eq!(progress[1].0, "Converted: slow.jpg");
    assert_eq!(progress[1].1, 100.0);
}

#[tokio::test]
async fn progress_is_strictly_increasing_and_ends_at_100() {
    let staging = tempfile::tempdir().unwrap();
    let bus = EventBus::default();
    let mut rx = bus.subscribe();

    let jobs: Vec<_> = (0..7)
        .map(|i| job(&format!("img_{i}.cr3"), sleep_payload(5 * (7 - i))))
        .collect();
    let state = scripted_coordinator(staging.path(), 3)
        .run_batch(new_batch_id(), jobs, &bus)
        .await
        .unwrap();

    let progress = progress_of(&drain(&mut rx));
    assert_eq!(progress.len(), state.total);
    assert!(progress.windows(2).all(|w| w[0].1 < w[1].1));
    assert_eq!(progress.last().unwrap().1, 100.0);
}

#[tokio::test]
async fn k_of_n_failures_are_counted_exactly() {
    let staging = tempfile::tempdir().unwrap();
    let bus = EventBus::default();
    let mut rx = bus.subscribe();

    let jobs = vec![
        job("1.CR2", b"ok".to_vec()),
        job("2.CR2", b"BAD".to_vec()),
        job("3.CR2", b"ok".to_vec()),
        job("4.CR2", b"BAD".to_vec()),
        job("5.CR2", b"BAD".to_vec()),
    ];
    let state = scripted_coordinator(staging.path(), 2)
        .run_batch(new_batch_id(), jobs, &bus)
        .await
        .unwrap();

    assert_eq!(state.success_count(), 2);
    assert_eq!(state.failure_count(), 3);
    assert!(state.results.contains_key("1.jpg"));
    assert!(state.results.contains_key("3.jpg"));

    let progress = progress_of(&drain(&mut rx));
    let errors: Vec<_> = progress.iter().filter(|p| p.2).collect();
    assert_eq!(errors.len(), 3);
    for name in ["2.CR2", "4.CR2", "5.CR2"] {
        assert!(errors.iter().any(|p| p.0.contains(name)), "no error naming {name}");
    }
}

// ---------------------------------------------------------------------------
// Fault containment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn decoder_panic_becomes_a_failure() {
    let staging = tempfile::tempdir().unwrap();
    let bus = EventBus::default();

    let jobs = vec![job("boom.NEF", b"PANIC".to_vec()), job("fine.NEF", b"ok".to_vec())];
    let state = scripted_coordinator(staging.path(), 2)
        .run_batch(new_batch_id(), jobs, &bus)
        .await
        .unwrap();

    assert!(state.is_finished());
    assert_eq!(state.success_count(), 1);
    assert_eq!(state.failures[0].original_name, "boom.NEF");
    assert!(state.failures[0].message.contains("boom.NEF"));
}

#[tokio::test]
async fn hung_job_times_out_and_the_batch_still_finishes() {
    let staging = tempfile::tempdir().unwrap();
    let bus = EventBus::default();
    let coordinator = coordinator_with(
        ScriptedDecoder,
        staging.path(),
        1,
        Duration::from_millis(100),
    );

    let jobs = vec![job("stuck.CR2", sleep_payload(1_000)), job("next.CR2", b"ok".to_vec())];
    let state = coordinator
        .run_batch(new_batch_id(), jobs, &bus)
        .await
        .unwrap();

    assert!(state.is_finished());
    assert_eq!(state.success_count(), 1);
    assert_eq!(state.failures[0].original_name, "stuck.CR2");
    assert!(state.failures[0].message.contains("timed out"));
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

/// Records the highest number of decodes running at the same time.
struct CountingDecoder {
    hold: Duration,
    running: AtomicUsize,
    peak: Arc<AtomicUsize>,
}

impl CountingDecoder {
    fn new(hold: Duration) -> Self {
        Self {
            hold,
            running: AtomicUsize::new(0),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl RawDecoder for CountingDecoder {
    fn decode(&self, _source: &RawSource<'_>) -> Result<DecodedImage, DecodeError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.hold);
        self.running.fetch_sub(1, Ordering::SeqCst);

        Ok(DecodedImage {
            image: DynamicImage::ImageRgb8(RgbImage::new(8, 8)),
            orientation: Orientation::NoTransforms,
            origin: ImageOrigin::Developed,
        })
    }
}

#[tokio::test]
async fn concurrency_limit_is_respected() {
    let staging = tempfile::tempdir().unwrap();
    let bus = EventBus::default();
    let decoder = CountingDecoder::new(Duration::from_millis(30));
    let peak = Arc::clone(&decoder.peak);
    let coordinator = coordinator_with(decoder, staging.path(), 2, Duration::from_secs(30));

    let jobs: Vec<_> = (0..6).map(|i| job(&format!("{i}.NEF"), Vec::new())).collect();
    coordinator.run_batch(new_batch_id(), jobs, &bus).await.unwrap();

    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn timed_out_decodes_keep_their_slot() {
    let staging = tempfile::tempdir().unwrap();
    let bus = EventBus::default();
    let decoder = CountingDecoder::new(Duration::from_millis(150));
    let peak = Arc::clone(&decoder.peak);
    let coordinator = coordinator_with(decoder, staging.path(), 1, Duration::from_millis(50));

    let jobs: Vec<_> = (0..4).map(|i| job(&format!("{i}.CR2"), Vec::new())).collect();
    let state = coordinator.run_batch(new_batch_id(), jobs, &bus).await.unwrap();

    assert!(state.is_finished());
    assert_eq!(state.failure_count(), 4);
    assert!(state.failures.iter().all(|f| f.message.contains("timed out")));
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Output naming
// ---------------------------------------------------------------------------

/// Payload `<width>:<sleep ms>`: sleeps, then returns a `width`x10 image.
struct WidthDecoder;

impl RawDecoder for WidthDecoder {
    fn decode(&self, source: &RawSource<'_>) -> Result<DecodedImage, DecodeError> {
        let script = String::from_utf8_lossy(source.bytes);
        let (width, ms) = script
            .split_once(':')
            .ok_or_else(|| DecodeError::new(source.name, "bad script"))?;
        std::thread::sleep(Duration::from_millis(ms.parse().unwrap()));

        Ok(DecodedImage {
            image: DynamicImage::ImageRgb8(RgbImage::new(width.parse().unwrap(), 10)),
            orientation: Orientation::NoTransforms,
            origin: ImageOrigin::Developed,
        })
    }
}

#[tokio::test]
async fn colliding_names_do_not_depend_on_completion_order() {
    let staging = tempfile::tempdir().unwrap();
    let bus = EventBus::default();
    let coordinator = coordinator_with(WidthDecoder, staging.path(), 2, Duration::from_secs(30));

    for (cr2_sleep, nef_sleep) in [(10, 200), (200, 10)] {
        let jobs = vec![
            job("a.CR2", format!("100:{cr2_sleep}").into_bytes()),
            job("a.nef", format!("200:{nef_sleep}").into_bytes()),
        ];
        let state = coordinator.run_batch(new_batch_id(), jobs, &bus).await.unwrap();

        let width_of = |name: &str| image::load_from_memory(&state.results[name]).unwrap().width();
        assert_eq!(width_of("a.jpg"), 100, "a.CR2 finished after {cr2_sleep}ms");
        assert_eq!(width_of("a-2.jpg"), 200, "a.nef finished after {nef_sleep}ms");
    }
}

// ---------------------------------------------------------------------------
// Isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_batches_stay_isolated() {
    let staging = tempfile::tempdir().unwrap();
    let coordinator = scripted_coordinator(staging.path(), 4);
    let bus = EventBus::default();
    let mut rx = bus.subscribe();
    let (first_id, second_id) = (new_batch_id(), new_batch_id());

    let first_jobs = vec![job("a.CR2", sleep_payload(30)), job("b.CR2", b"BAD".to_vec())];
    let second_jobs = vec![
        job("x.NEF", sleep_payload(10)),
        job("y.NEF", b"ok".to_vec()),
        job("z.NEF", sleep_payload(20)),
    ];

    let (first, second) = tokio::join!(
        coordinator.run_batch(first_id, first_jobs, &bus),
        coordinator.run_batch(second_id, second_jobs, &bus),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.results.keys().collect::<Vec<_>>(), vec!["a.jpg"]);
    assert_eq!(
        second.results.keys().collect::<Vec<_>>(),
        vec!["x.jpg", "y.jpg", "z.jpg"]
    );

    let events = drain(&mut rx);
    let count_for = |id| events.iter().filter(|e| e.batch_id == id).count();
    assert_eq!(count_for(first_id), 2);
    assert_eq!(count_for(second_id), 3);

    let last_percent = |id| {
        let own: Vec<_> = events.iter().filter(|e| e.batch_id == id).cloned().collect();
        progress_of(&own).last().map(|p| p.1)
    };
    assert_eq!(last_percent(first_id), Some(100.0));
    assert_eq!(last_percent(second_id), Some(100.0));
}
