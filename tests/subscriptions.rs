//! Subscription service behavior with in-process delivery.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use xds_mediator::{
    ChannelNotifier, CreateOutcome, NotificationHandle, PullPointRegistry, SubscriptionService,
    SubscriptionStore, Timestamp,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_service() -> (Arc<SubscriptionService>, NotificationHandle) {
    init_tracing();
    let (notifier, handle) = ChannelNotifier::new(100);
    let service = SubscriptionService::new(
        Arc::new(SubscriptionStore::in_memory()),
        Arc::new(PullPointRegistry::in_memory(None)),
        Arc::new(notifier),
    );
    (Arc::new(service), handle)
}

// --- Administration ---

#[test]
fn test_invalid_url_performs_no_insert() {
    let (service, _handle) = test_service();

    let outcome = service.create_subscription("not a url", None, None).unwrap();
    assert!(matches!(outcome, CreateOutcome::InvalidUrl(_)));
    assert!(service.store().is_empty());
}

#[test]
fn test_unscoped_subscription_is_active_everywhere() {
    let (service, _handle) = test_service();
    service
        .create_subscription("http://a.example/x", None, None)
        .unwrap();

    let active = service
        .store()
        .find_active(Some("anyFacility"), Timestamp::now());
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].url, "http://a.example/x");
}

#[test]
fn test_expired_subscription_is_inactive() {
    let (service, _handle) = test_service();
    let past = Timestamp::now().saturating_sub(Duration::from_secs(1));
    service
        .create_subscription("http://a.example/x", Some("fq".into()), Some(past))
        .unwrap();

    assert_eq!(service.store().len(), 1);
    assert!(service.store().find_active(Some("fq"), Timestamp::now()).is_empty());
}

#[test]
fn test_duplicate_save_is_a_silent_no_op() {
    let (service, _handle) = test_service();

    let first = service
        .create_subscription("http://a.example/x", Some("facilityA".into()), None)
        .unwrap();
    let second = service
        .create_subscription("http://a.example/x", Some("facilityB".into()), None)
        .unwrap();

    let CreateOutcome::Created(id) = first else {
        panic!("first create should succeed, got {:?}", first);
    };
    assert_eq!(second, CreateOutcome::Duplicate { existing: id.clone() });

    let stored = service.store().list();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, id);
    assert_eq!(stored[0].facility_query.as_deref(), Some("facilityA"));
}

#[test]
fn test_concurrent_saves_for_same_url() {
    let (service, _handle) = test_service();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                service
                    .create_subscription("http://race.example/x", None, None)
                    .unwrap()
            })
        })
        .collect();

    let created = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|o| matches!(o, CreateOutcome::Created(_)))
        .count();

    assert_eq!(created, 1);
    assert_eq!(service.store().len(), 1);
}

// --- Fan-out ---

#[test]
fn test_notify_invokes_notifier_per_subscription() {
    let (service, handle) = test_service();
    service
        .create_subscription("http://a.example/1", Some("facilityA".into()), None)
        .unwrap();
    service
        .create_subscription("http://a.example/2", Some("facilityA".into()), None)
        .unwrap();

    let report = service.notify_new_document("doc123", "facilityA");
    assert_eq!(report.delivered, 2);

    let events = handle.drain();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.document_id == "doc123"));

    let mut urls: Vec<_> = events.iter().map(|e| e.url.as_str()).collect();
    urls.sort();
    assert_eq!(urls, vec!["http://a.example/1", "http://a.example/2"]);
}

#[test]
fn test_full_buffer_is_isolated_per_subscriber() {
    init_tracing();
    let (notifier, handle) = ChannelNotifier::new(1);
    let service = SubscriptionService::new(
        Arc::new(SubscriptionStore::in_memory()),
        Arc::new(PullPointRegistry::in_memory(None)),
        Arc::new(notifier),
    );
    for i in 0..3 {
        service
            .create_subscription(&format!("http://s{i}.example/x"), None, None)
            .unwrap();
    }

    // Only one fits in the buffer; the other two fail without aborting
    let report = service.notify_new_document("doc1", "facilityA");
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(handle.drain().len(), 1);
}

#[test]
fn test_deleted_subscription_is_not_notified() {
    let (service, handle) = test_service();
    let CreateOutcome::Created(id) = service
        .create_subscription("http://a.example/x", None, None)
        .unwrap()
    else {
        panic!("create failed");
    };

    assert_eq!(service.delete_subscription(&id).unwrap(), 1);
    let report = service.notify_new_document("doc1", "facilityA");
    assert_eq!(report.delivered, 0);
    assert!(handle.try_recv().is_err());
}

// --- Pull points ---

#[test]
fn test_pull_point_order() {
    let (service, _handle) = test_service();
    service.notify_pull_point("docA", "loc1").unwrap();
    service.notify_pull_point("docB", "loc1").unwrap();

    assert_eq!(service.list_pull_point_documents("loc1"), vec!["docA", "docB"]);
}
