use std::{sync::Arc, time::Duration};

use super::{
    BrokenDecoder, Fixture, RecordingReporter, StalledDecoder, USER, assert_newest_first, clip,
    photo,
};
use crate::{
    ErrorDetail,
    job::{Orchestrator, uploader},
    metadata,
    progress::{BatchPhase, EntryStatus},
    record::{RawFile, UploadContext},
};

#[tokio::test]
async fn partial_batch_keeps_successful_records() {
    let fixture = Fixture::new().await;
    let mut store = fixture.store();
    store.fail_put = Some("beta.jpg");
    let gallery = Orchestrator::new(
        fixture.catalog_client(Some(USER)),
        store,
        super::StillDecoder,
        Some(USER),
        UploadContext::Personal,
    );

    let outcome = gallery
        .submit(vec![photo("alpha.jpg"), photo("beta.jpg"), photo("gamma.jpg")])
        .await;

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    let failure = &outcome.failures[0];
    assert!(matches!(*failure.detail, ErrorDetail::Transfer(_)));
    assert_eq!(failure.context.file_name.as_deref(), Some("beta.jpg"));
    assert!(failure.context.id.is_some());
    assert_newest_first(&outcome.records);

    let state = gallery.snapshot();
    assert!(!state.loading);
    assert!(state.progress.is_empty());
    let mut names = state
        .records
        .iter()
        .map(|record| record.name.as_str())
        .collect::<Vec<_>>();
    names.sort();
    assert_eq!(names, ["alpha.jpg", "gamma.jpg"]);
    assert_newest_first(state.records.iter());

    // registration precedes the transfer, so the failed file stays catalogued
    assert_eq!(fixture.stored_files().await.len(), 3);
    assert!(fixture.storage.get("images/42/beta.jpg").await.unwrap().is_none());
    assert!(fixture.storage.get("images/42/alpha.jpg").await.unwrap().is_some());
}

#[tokio::test]
async fn record_carries_paths_and_download_url() {
    let fixture = Fixture::new().await;
    let gallery = fixture.orchestrator(Some(USER), UploadContext::Personal);

    let outcome = gallery.submit(vec![photo("harbour.jpg")]).await;

    assert!(outcome.failures.is_empty());
    let record = &outcome.records[0];
    assert_eq!(record.name, "harbour.jpg");
    assert_eq!(record.author_id, USER);
    assert_eq!(record.storage_path, "images/42/harbour.jpg");
    assert_eq!(record.download_url, "local:///images/42/harbour.jpg");
    assert_eq!(record.preview_path, None);
    assert_eq!(record.geo_data, None);
    let (content_type, body) = fixture
        .storage
        .get("images/42/harbour.jpg")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(content_type, "image/jpeg");
    assert_eq!(body.len(), 40);
}

#[tokio::test]
async fn geo_data_is_registered_with_the_file() {
    let fixture = Fixture::new().await;
    let gallery = fixture.orchestrator(Some(USER), UploadContext::Personal);
    let tagged = RawFile::new(
        "nevsky.tiff",
        "image/tiff".parse().unwrap(),
        metadata::test::tiff_with_gps([59, 57, 0], "N", [30, 18, 36], "E"),
    );

    let outcome = gallery.submit(vec![tagged, photo("plain.jpg")]).await;

    assert!(outcome.failures.is_empty());
    let tagged = outcome
        .records
        .iter()
        .find(|record| record.name == "nevsky.tiff")
        .unwrap();
    let geo = tagged.geo_data.unwrap();
    assert!((geo.latitude - 59.95).abs() < 1e-9);
    assert!((geo.longitude - 30.31).abs() < 1e-9);
    let plain = outcome
        .records
        .iter()
        .find(|record| record.name == "plain.jpg")
        .unwrap();
    assert_eq!(plain.geo_data, None);

    let catalogued = fixture.stored_files().await;
    let entry = catalogued.iter().find(|file| file.id == tagged.id).unwrap();
    assert_eq!(entry.geodata, tagged.geo_data);
}

#[tokio::test]
async fn video_preview_is_stored_and_registered() {
    let fixture = Fixture::new().await;
    let gallery = fixture.orchestrator(Some(USER), UploadContext::Personal);

    let outcome = gallery.submit(vec![clip("dive.mp4")]).await;

    assert!(outcome.failures.is_empty());
    let record = &outcome.records[0];
    assert_eq!(record.preview_path.as_deref(), Some("previews/42/dive.mp4.jpeg"));
    let (content_type, body) = fixture
        .storage
        .get("previews/42/dive.mp4.jpeg")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(content_type, "image/jpeg");
    assert_eq!(&body[..2], [0xFF, 0xD8]);
}

#[tokio::test]
async fn failed_preview_degrades_to_no_preview() {
    let fixture = Fixture::new().await;
    let gallery = Orchestrator::new(
        fixture.catalog_client(Some(USER)),
        fixture.store(),
        BrokenDecoder,
        Some(USER),
        UploadContext::Personal,
    );

    let outcome = gallery.submit(vec![clip("corrupt.mov")]).await;

    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.records[0].preview_path, None);
    assert_eq!(fixture.stored_files().await[0].preview, None);
}

#[tokio::test]
async fn slow_preview_does_not_hold_registration() {
    let fixture = Fixture::new().await;
    let gallery = Orchestrator::new(
        fixture.catalog_client(Some(USER)),
        fixture.store(),
        StalledDecoder,
        Some(USER),
        UploadContext::Personal,
    )
    .with_preview_wait(Duration::from_millis(50));

    let outcome = gallery.submit(vec![clip("long.mp4")]).await;

    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.records[0].preview_path, None);
}

#[tokio::test]
async fn progress_is_reported_per_file_and_never_regresses() {
    let fixture = Fixture::new().await;
    let reporter = Arc::new(RecordingReporter::default());
    let gallery = fixture
        .orchestrator(Some(USER), UploadContext::Personal)
        .with_reporter(reporter.clone());
    let large = RawFile::new("large.jpg", mime::IMAGE_JPEG, vec![1; 100]);

    let outcome = gallery.submit(vec![large, photo("small.jpg")]).await;

    assert!(outcome.failures.is_empty());
    for name in ["large.jpg", "small.jpg"] {
        let percents = reporter.upload_percents(name);
        assert_eq!(percents.first(), Some(&0), "{name}");
        assert_eq!(percents.last(), Some(&100), "{name}");
        assert!(percents.is_sorted(), "{name}: {percents:?}");
        assert_eq!(reporter.statuses(name).last(), Some(&EntryStatus::Done));
    }
    assert!(reporter.upload_percents("large.jpg").len() > 3);
    assert_eq!(
        reporter.phases.lock().unwrap().as_slice(),
        [BatchPhase::Uploading, BatchPhase::Completed]
    );
    assert!(gallery.snapshot().progress.is_empty());
}

#[tokio::test]
async fn upload_streams_progress_until_settled() {
    let fixture = Fixture::new().await;
    let file = RawFile::new("stream.bin", mime::APPLICATION_OCTET_STREAM, vec![7; 100]);
    let mut events = Vec::new();

    let url = uploader::upload(&fixture.storage, &file, "images/42/stream.bin")
        .drive(|event| events.push(event.percent))
        .await
        .unwrap();

    assert_eq!(url, "local:///images/42/stream.bin");
    assert_eq!(events, [0, 16, 32, 48, 64, 80, 96, 100]);
}

#[tokio::test]
async fn submit_without_user_does_no_io() {
    let fixture = Fixture::new().await;
    let gallery = fixture.orchestrator(None, UploadContext::Personal);

    let outcome = gallery
        .submit(vec![photo("one.jpg"), clip("two.mp4")])
        .await;

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.failures.len(), 2);
    assert!(
        outcome
            .failures
            .iter()
            .all(|failure| matches!(*failure.detail, ErrorDetail::Unauthenticated))
    );
    assert!(fixture.stored_files().await.is_empty());
    assert!(fixture.storage.get("images/42/one.jpg").await.unwrap().is_none());
    assert!(!gallery.snapshot().loading);
}
