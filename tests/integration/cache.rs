use schema_linker::core::SchemaError;
use schema_linker::linker::LinkError;
use schema_linker::source::{Revision, SourceIdentifier};
use schema_linker::test_utils::{CountingLinker, init_test_logging};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{TextProvider, factory, id};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_link() {
    init_test_logging(None);
    let linker = Arc::new(CountingLinker::with_delay(Duration::from_millis(50)));
    let factory = factory(&linker, TextProvider::new(&["module a", "module b\nimport a"]));

    let mut handles = Vec::new();
    for _ in 0..100 {
        let factory = factory.clone();
        handles.push(tokio::spawn(async move { factory.create_model([id("b"), id("a")]).await }));
    }

    let mut models = Vec::new();
    for handle in handles {
        models.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(linker.link_count(), 1);
    assert!(models.iter().all(|m| m.ptr_eq(&models[0])));
    assert_eq!(models[0].sources, vec![id("a"), id("b")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_reaches_every_waiter_and_is_not_cached() {
    let linker = Arc::new(CountingLinker::with_delay(Duration::from_millis(20)));
    linker.fail_with(Some(LinkError::in_source(id("a"), "bad leafref")));
    let factory = factory(&linker, TextProvider::new(&["module a"]));

    let waiters: Vec<_> = (0..10).map(|_| factory.create_model([id("a")])).collect();
    for outcome in futures::future::join_all(waiters).await {
        let err = outcome.unwrap_err();
        assert!(matches!(err, SchemaError::Structural { .. }));
        assert_eq!(err.source_id(), Some(&id("a")));
    }
    assert_eq!(linker.link_count(), 1);
    assert!(factory.is_empty());

    // the very next request starts over
    linker.fail_with(None);
    let model = factory.create_model([id("a")]).await.unwrap();
    assert_eq!(model.sources, vec![id("a")]);
    assert_eq!(linker.link_count(), 2);
}

#[tokio::test]
async fn test_model_is_evicted_once_released() {
    let linker = Arc::new(CountingLinker::new());
    let factory = factory(&linker, TextProvider::new(&["module a"]));

    let first = factory.create_model([id("a")]).await.unwrap();
    let again = factory.create_model([id("a")]).await.unwrap();
    assert!(first.ptr_eq(&again));
    assert_eq!(factory.len(), 1);

    let serial = first.serial;
    drop(first);
    assert!(factory.contains([id("a")]));
    drop(again);
    assert!(!factory.contains([id("a")]));
    assert!(factory.is_empty());

    let fresh = factory.create_model([id("a")]).await.unwrap();
    assert_ne!(fresh.serial, serial);
    assert_eq!(linker.link_count(), 2);
}

#[tokio::test]
async fn test_duplicate_identifiers_collapse_into_one_key() {
    let linker = Arc::new(CountingLinker::new());
    let factory = factory(&linker, TextProvider::new(&["module a", "module b"]));

    let model = factory.create_model([id("a"), id("a"), id("b")]).await.unwrap();

    assert_eq!(model.sources().len(), 2);
    assert!(factory.contains([id("b"), id("a")]));
    let same = factory.create_model([id("b"), id("a")]).await.unwrap();
    assert!(model.ptr_eq(&same));
    assert_eq!(linker.link_count(), 1);
}

#[tokio::test]
async fn test_unresolved_request_reports_resolvable_subset() {
    let linker = Arc::new(CountingLinker::new());
    let factory =
        factory(&linker, TextProvider::new(&["module types", "module app\nimport types", "module other"]));

    // `types` exists but is not part of the request
    let err = factory.create_model([id("app"), id("other")]).await.unwrap_err();

    let SchemaError::Unresolved(failure) = err else {
        panic!("expected unresolved failure, got {err:?}");
    };
    assert_eq!(failure.resolved_sources, vec![id("other")]);
    assert_eq!(failure.unresolved_sources, vec![id("app")]);
    assert_eq!(failure.unsatisfied_imports[&id("app")].len(), 1);
    assert_eq!(linker.link_count(), 0);
    assert!(factory.is_empty());
}

#[tokio::test]
async fn test_requested_identifier_is_corrected_to_declared_one() {
    let linker = Arc::new(CountingLinker::new());
    let provider = TextProvider::new(&[]).with_alias(id("foo"), "module foo@2020-01-01");
    let factory = factory(&linker, provider);

    let model = factory.create_model([id("foo")]).await.unwrap();

    let declared = SourceIdentifier::with_revision("foo", Revision::parse("2020-01-01").unwrap());
    assert_eq!(model.sources, vec![declared]);
    assert!(model.sources().contains(&id("foo")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_request_still_completes_for_late_waiters() {
    let (linker, gate) = CountingLinker::gated();
    let linker = Arc::new(linker);
    let factory = factory(&linker, TextProvider::new(&["module a"]));

    let abandoned = factory.create_model([id("a")]);
    gate.wait_entered().await;
    drop(abandoned);

    let late = factory.create_model([id("a")]);
    gate.release(1);

    let model = late.await.unwrap();
    assert_eq!(model.sources, vec![id("a")]);
    assert_eq!(linker.link_count(), 1);
}
