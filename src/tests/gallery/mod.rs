use std::sync::{Arc, atomic::Ordering};

use tokio::sync::Notify;

use super::{Fixture, StillDecoder, USER, assert_newest_first, photo};
use crate::{
    ErrorDetail,
    job::{Orchestrator, storage::catalog::Client as _},
    record::{FileId, UploadContext},
};

#[tokio::test]
async fn fetch_loads_base_set_and_merges_idempotently() {
    let fixture = Fixture::new().await;
    let uploader = fixture.orchestrator(Some(USER), UploadContext::Personal);
    let earlier = uploader
        .submit(vec![photo("one.jpg"), photo("two.jpg")])
        .await;
    assert!(earlier.failures.is_empty());

    let gallery = fixture.orchestrator(Some(USER), UploadContext::Personal);
    let mut changes = gallery.subscribe();
    assert_eq!(gallery.fetch_context().await.unwrap(), 2);
    assert!(changes.has_changed().unwrap());
    let state = changes.borrow_and_update().clone();
    assert!(!state.loading);
    assert_eq!(state.records.len(), 2);
    assert_newest_first(state.records.iter());

    let later = gallery.submit(vec![photo("three.jpg")]).await;
    assert_eq!(later.records.len(), 1);
    assert_eq!(gallery.snapshot().records.len(), 3);
    assert_eq!(
        gallery.snapshot().records.iter().next().map(|r| r.id),
        Some(later.records[0].id)
    );

    assert_eq!(gallery.fetch_context().await.unwrap(), 3);
    let records = gallery.snapshot().records;
    assert_eq!(records.len(), 3);
    assert_newest_first(records.iter());
}

#[tokio::test]
async fn fetch_failure_keeps_last_known_view() {
    let fixture = Fixture::new().await;
    let catalog = fixture.catalog_client(Some(USER));
    let fail_listing = catalog.fail_listing.clone();
    let gallery = Orchestrator::new(
        catalog,
        fixture.store(),
        StillDecoder,
        Some(USER),
        UploadContext::Personal,
    );
    gallery.submit(vec![photo("kept.jpg")]).await;
    let before = gallery.snapshot().records;
    assert_eq!(before.len(), 1);

    fail_listing.store(true, Ordering::SeqCst);
    let error = gallery.fetch_context().await.unwrap_err();

    assert!(matches!(*error.detail, ErrorDetail::Fetch(_)));
    let state = gallery.snapshot();
    assert!(!state.loading);
    assert_eq!(state.records, before);
}

#[tokio::test]
async fn remove_prunes_view_and_tolerates_unknown_ids() {
    let fixture = Fixture::new().await;
    let catalog = fixture.catalog_client(Some(USER));
    let deletes = catalog.deletes.clone();
    let gallery = Orchestrator::new(
        catalog,
        fixture.store(),
        StillDecoder,
        Some(USER),
        UploadContext::Personal,
    );
    let outcome = gallery
        .submit(vec![photo("keep.jpg"), photo("drop.jpg")])
        .await;
    let dropped = outcome
        .records
        .iter()
        .find(|record| record.name == "drop.jpg")
        .unwrap()
        .id;

    gallery.remove(dropped).await.unwrap();
    assert_eq!(deletes.load(Ordering::SeqCst), 1);
    let records = gallery.snapshot().records;
    assert!(!records.contains(dropped));
    assert_eq!(records.len(), 1);
    assert_eq!(fixture.stored_files().await.len(), 1);

    gallery.remove(FileId(9_999)).await.unwrap();
    assert_eq!(deletes.load(Ordering::SeqCst), 2);
    assert_eq!(gallery.snapshot().records, records);

    // a later fetch does not bring the removed file back
    gallery.fetch_context().await.unwrap();
    assert!(!gallery.snapshot().records.contains(dropped));
}

#[tokio::test]
async fn failed_removal_leaves_view_unchanged() {
    let fixture = Fixture::new().await;
    let mut catalog = fixture.catalog_client(Some(USER));
    catalog.fail_delete = true;
    let gallery = Orchestrator::new(
        catalog,
        fixture.store(),
        StillDecoder,
        Some(USER),
        UploadContext::Personal,
    );
    let outcome = gallery.submit(vec![photo("stuck.jpg")]).await;
    let id = outcome.records[0].id;

    let error = gallery.remove(id).await.unwrap_err();

    assert!(matches!(*error.detail, ErrorDetail::Removal(_)));
    assert_eq!(error.context.id, Some(id));
    let state = gallery.snapshot();
    assert!(state.records.contains(id));
    assert!(!state.loading);
}

#[tokio::test]
async fn cancelled_batch_is_not_merged() {
    let fixture = Fixture::new().await;
    let entered = Arc::new(Notify::new());
    let mut store = fixture.store();
    store.stall_put = Some(("stalled.jpg", entered.clone()));
    let gallery = Orchestrator::new(
        fixture.catalog_client(Some(USER)),
        store,
        StillDecoder,
        Some(USER),
        UploadContext::Personal,
    );

    let (outcome, ()) = tokio::join!(
        gallery.submit(vec![photo("quick.jpg"), photo("stalled.jpg")]),
        async {
            entered.notified().await;
            gallery.cancel();
        }
    );

    assert!(outcome.failures.iter().any(crate::Error::is_cancelled));
    let state = gallery.snapshot();
    assert!(state.records.is_empty());
    assert!(state.progress.is_empty());
    assert!(!state.loading);
}

#[tokio::test]
async fn operations_after_cancel_run_normally() {
    let fixture = Fixture::new().await;
    let gallery = fixture.orchestrator(Some(USER), UploadContext::Personal);
    gallery.cancel();

    let outcome = gallery.submit(vec![photo("after.jpg")]).await;

    assert!(outcome.failures.is_empty());
    assert_eq!(gallery.snapshot().records.len(), 1);
    assert_eq!(gallery.fetch_context().await.unwrap(), 1);
}

#[tokio::test]
async fn full_fetch_drops_records_deleted_elsewhere() {
    let fixture = Fixture::new().await;
    let gallery = fixture.orchestrator(Some(USER), UploadContext::Personal);
    let outcome = gallery
        .submit(vec![photo("gone.jpg"), photo("stays.jpg")])
        .await;
    let gone = outcome
        .records
        .iter()
        .find(|record| record.name == "gone.jpg")
        .unwrap()
        .id;
    assert!(gallery.snapshot().records.contains(gone));

    fixture
        .catalog
        .client(Some(USER))
        .delete_file(gone)
        .await
        .unwrap();
    assert_eq!(gallery.fetch_context().await.unwrap(), 1);

    let records = gallery.snapshot().records;
    assert!(!records.contains(gone));
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn anonymous_fetch_shows_first_album() {
    let fixture = Fixture::new().await;
    let first = fixture.catalog.create_album("First", USER).await.unwrap();
    let second = fixture.catalog.create_album("Second", USER).await.unwrap();
    let into_first = fixture.orchestrator(Some(USER), UploadContext::Album(first.id));
    let shared = into_first.submit(vec![photo("shared.jpg")]).await;
    let into_second = fixture.orchestrator(Some(USER), UploadContext::Album(second.id));
    into_second.submit(vec![photo("other.jpg")]).await;

    let visitor = fixture.orchestrator(None, UploadContext::Personal);
    assert_eq!(visitor.fetch_context().await.unwrap(), 1);
    let records = visitor.snapshot().records;
    assert_eq!(records.ids().collect::<Vec<_>>(), [shared.records[0].id]);
}

#[tokio::test]
async fn anonymous_fetch_without_albums_is_empty() {
    let fixture = Fixture::new().await;
    let visitor = fixture.orchestrator(None, UploadContext::Personal);
    assert_eq!(visitor.fetch_context().await.unwrap(), 0);
    assert!(visitor.snapshot().records.is_empty());
}
