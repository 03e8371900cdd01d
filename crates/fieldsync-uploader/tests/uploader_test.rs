use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fieldsync_core::{Config, DeviceInfo, UploadError};
use fieldsync_storage::{MemoryRemoteStore, MemoryStaging, StagingQueue};
use fieldsync_uploader::uploader::YieldFuture;
use fieldsync_uploader::{PhotoUploader, SyncClient, WatchConnectivity};

struct Harness {
    uploader: PhotoUploader,
    staging: Arc<MemoryStaging>,
    network: Arc<WatchConnectivity>,
    remote: Arc<MemoryRemoteStore>,
}

fn harness(connected: bool, config: Config) -> Harness {
    harness_with_staging(connected, config, Arc::new(MemoryStaging::new()))
}

fn harness_with_staging(
    connected: bool,
    config: Config,
    staging: Arc<MemoryStaging>,
) -> Harness {
    let network = Arc::new(WatchConnectivity::new(connected));
    let remote = Arc::new(MemoryRemoteStore::new());
    let sync = Arc::new(SyncClient::new(
        &config,
        DeviceInfo::detect(),
        Arc::clone(&remote) as Arc<dyn fieldsync_storage::RemoteStore>,
    ));
    let uploader = PhotoUploader::new(
        &config,
        Arc::clone(&staging) as Arc<dyn StagingQueue>,
        Arc::clone(&network) as Arc<dyn fieldsync_uploader::Connectivity>,
        sync,
    );
    Harness {
        uploader,
        staging,
        network,
        remote,
    }
}

/// Polls `condition` until it holds. Under paused time the sleeps
/// auto-advance, so this also lets the retry timer fire.
async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(600), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test(start_paused = true)]
async fn idle_means_all_enqueued_work_is_done() {
    let h = harness(true, Config::default());

    h.uploader
        .enqueue_file_contents("p1", "/captures/p1.jpg")
        .await
        .unwrap();
    h.uploader.wait_for_idle(None).await.unwrap();

    assert!(!h.uploader.has_pending_photos().await.unwrap());
    assert_eq!(h.staging.uploaded().await, vec!["p1"]);
    assert!(h.remote.get("photos", "p1").await.is_some());
}

#[tokio::test(start_paused = true)]
async fn offline_items_upload_when_connectivity_returns() {
    let h = harness(false, Config::default());

    h.uploader
        .enqueue_file_contents("p1", "/captures/p1.jpg")
        .await
        .unwrap();
    h.uploader.wait_for_idle(None).await.unwrap();

    // Staged but held back while offline.
    assert!(h.uploader.has_pending_photos().await.unwrap());
    assert!(h.staging.uploaded().await.is_empty());

    h.network.set_connected(true);
    wait_until(|| async { h.staging.uploaded().await == vec!["p1"] }).await;
    assert!(!h.uploader.has_pending_photos().await.unwrap());
    assert!(h.remote.get("photos", "p1").await.is_some());
}

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_until_uploaded_once() {
    let h = harness(true, Config::default());
    h.staging.fail_upload("p1", 2).await;

    h.uploader
        .enqueue_file_contents("p1", "/captures/p1.jpg")
        .await
        .unwrap();

    // The retry timer keeps the cycle alive across both failures.
    wait_until(|| async { h.staging.uploaded().await == vec!["p1"] }).await;
    assert!(!h.uploader.has_pending_photos().await.unwrap());

    // Settled: no duplicate upload on later timer fires.
    tokio::time::sleep(Duration::from_secs(180)).await;
    assert_eq!(h.staging.uploaded().await, vec!["p1"]);
}

#[tokio::test(start_paused = true)]
async fn one_failing_item_does_not_block_the_rest() {
    let h = harness(true, Config::default());
    h.staging.always_fail_upload("p1").await;

    for id in ["p0", "p1", "p2"] {
        h.uploader
            .enqueue_file_contents(id, format!("/captures/{id}.jpg"))
            .await
            .unwrap();
    }

    wait_until(|| async {
        let uploaded = h.staging.uploaded().await;
        uploaded.contains(&"p0".to_string()) && uploaded.contains(&"p2".to_string())
    })
    .await;
    assert_eq!(h.staging.list().await.unwrap(), vec!["p1"]);

    // The stuck item stays staged and succeeds once the fault clears.
    h.staging.clear_upload_failure("p1").await;
    wait_until(|| async { h.staging.uploaded().await.contains(&"p1".to_string()) }).await;
    assert!(!h.uploader.has_pending_photos().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn items_staged_before_startup_are_retried() {
    let staging = Arc::new(MemoryStaging::new());
    staging
        .add("old1", std::path::Path::new("/captures/old1.jpg"), false)
        .await
        .unwrap();
    staging
        .add("old2", std::path::Path::new("/captures/old2.jpg"), false)
        .await
        .unwrap();

    let h = harness_with_staging(true, Config::default(), staging);

    wait_until(|| async { h.staging.uploaded().await == vec!["old1", "old2"] }).await;
    assert!(!h.uploader.has_pending_photos().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn preview_frames_are_sampled() {
    let config = Config {
        preview_sample_rate: 10,
        ..Config::default()
    };
    let h = harness(true, config);

    for i in 0..30u32 {
        h.uploader
            .enqueue_preview_contents(&format!("f{i}"), format!("/frames/f{i}.jpg"), i)
            .await
            .unwrap();
    }

    wait_until(|| async {
        h.staging.deleted_files().await.len() == 27 && h.staging.uploaded().await.len() == 3
    })
    .await;

    let uploaded = h.staging.uploaded().await;
    for id in ["f0", "f10", "f20"] {
        assert!(uploaded.contains(&id.to_string()), "missing {id}");
    }
    // On-sample frames hand ownership of the source file to the queue.
    assert_eq!(h.staging.removed_originals().await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn sample_rate_zero_discards_every_preview_frame() {
    let config = Config {
        preview_sample_rate: 0,
        ..Config::default()
    };
    let h = harness(true, config);

    for i in 0..5u32 {
        h.uploader
            .enqueue_preview_contents(&format!("f{i}"), format!("/frames/f{i}.jpg"), i)
            .await
            .unwrap();
    }
    h.uploader.wait_for_idle(None).await.unwrap();

    assert_eq!(h.staging.deleted_files().await.len(), 5);
    assert!(h.staging.uploaded().await.is_empty());
    assert!(!h.uploader.has_pending_photos().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn bounded_idle_wait_times_out_without_breaking_the_queue() {
    let config = Config::default();
    let staging = Arc::new(MemoryStaging::new());
    let network = Arc::new(WatchConnectivity::new(true));
    let remote = Arc::new(MemoryRemoteStore::new());
    let sync = Arc::new(SyncClient::new(
        &config,
        DeviceInfo::detect(),
        Arc::clone(&remote) as Arc<dyn fieldsync_storage::RemoteStore>,
    ));
    // A slow yield keeps the drain busy long enough to observe the timeout.
    let uploader = PhotoUploader::with_yield(
        &config,
        Arc::clone(&staging) as Arc<dyn StagingQueue>,
        network,
        sync,
        Arc::new(|| {
            Box::pin(tokio::time::sleep(Duration::from_millis(100))) as YieldFuture
        }),
    );

    uploader
        .enqueue_file_contents("p1", "/captures/p1.jpg")
        .await
        .unwrap();

    let result = uploader.wait_for_idle(Some(Duration::from_millis(1))).await;
    assert!(matches!(result, Err(UploadError::IdleTimeout(_))));

    // The timed-out wait observed, not interrupted: work still completes.
    uploader.wait_for_idle(None).await.unwrap();
    assert_eq!(staging.uploaded().await, vec!["p1"]);
}

#[tokio::test(start_paused = true)]
async fn failed_staging_does_not_wedge_the_pipeline() {
    let h = harness(true, Config::default());
    h.staging.always_fail_add("bad").await;

    h.uploader
        .enqueue_file_contents("bad", "/captures/bad.jpg")
        .await
        .unwrap();

    // The staging failure is logged and skipped; the drain still quiesces
    // instead of leaving the pipeline busy forever.
    h.uploader
        .wait_for_idle(Some(Duration::from_secs(300)))
        .await
        .unwrap();
    assert!(!h.uploader.has_pending_photos().await.unwrap());

    // Later work proceeds normally.
    h.staging.clear_add_failure("bad").await;
    h.uploader
        .enqueue_file_contents("p1", "/captures/p1.jpg")
        .await
        .unwrap();
    wait_until(|| async { h.staging.uploaded().await == vec!["p1"] }).await;
}

#[tokio::test(start_paused = true)]
async fn each_upload_writes_a_photo_document() {
    let h = harness(true, Config::default());

    for id in ["p0", "p1"] {
        h.uploader
            .enqueue_file_contents(id, format!("/captures/{id}.jpg"))
            .await
            .unwrap();
    }
    wait_until(|| async { h.staging.uploaded().await.len() == 2 }).await;

    assert_eq!(h.remote.collection_len("photos").await, 2);
    let doc = h.remote.get("photos", "p0").await.unwrap();
    assert_eq!(doc["documentType"], "PHOTO");
    assert_eq!(doc["photo"]["photoId"], "p0");
    assert_eq!(doc["_transport"]["lastWriter"], "sender");
}
