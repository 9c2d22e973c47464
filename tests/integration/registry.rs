use schema_linker::config::RegistryConfig;
use schema_linker::core::{SchemaError, SourceError};
use schema_linker::linker::{LinkError, ParserMode};
use schema_linker::registry::TextSchemaRegistry;
use schema_linker::source::{Revision, SourceIdentifier};
use schema_linker::test_utils::{CountingLinker, MockParser, init_test_logging};
use std::sync::Arc;
use tempfile::TempDir;

use crate::common::id;

fn registry_with(linker: CountingLinker) -> TextSchemaRegistry<CountingLinker> {
    TextSchemaRegistry::new("test", Arc::new(MockParser), Arc::new(linker))
}

fn registry() -> TextSchemaRegistry<CountingLinker> {
    registry_with(CountingLinker::new())
}

fn link_count(registry: &TextSchemaRegistry<CountingLinker>) -> usize {
    registry.repository().linker().link_count()
}

#[tokio::test]
async fn test_content_identifier_wins_over_requested() {
    init_test_logging(None);
    let registry = registry();

    let registration = registry.register_source(id("foo"), "module foo@2020-01-01").unwrap();

    let declared = SourceIdentifier::with_revision("foo", Revision::parse("2020-01-01").unwrap());
    assert_eq!(registration.id(), &declared);
    assert!(registry.available_sources().contains(&declared));
    assert!(registry.get_source(&id("foo")).await.unwrap_err().is_missing());

    let model = registry.current_model().await.unwrap();
    assert_eq!(model.sources, vec![declared]);
}

#[tokio::test]
async fn test_unresolvable_sources_are_narrowed_away() {
    let registry = registry();
    let _a = registry.register_source(id("a"), "module a").unwrap();
    let _b = registry.register_source(id("b"), "module b\nimport missing").unwrap();

    let model = registry.current_model().await.unwrap();
    assert_eq!(model.sources, vec![id("a")]);
    assert_eq!(link_count(&registry), 1);

    // the single-attempt read surfaces the gap instead
    let err = registry.try_model().await.unwrap_err();
    let SchemaError::Unresolved(failure) = err else {
        panic!("expected unresolved failure, got {err:?}");
    };
    assert_eq!(failure.resolved_sources, vec![id("a")]);

    let _missing = registry.register_source(id("missing"), "module missing").unwrap();
    let model = registry.current_model().await.unwrap();
    assert_eq!(model.sources, vec![id("a"), id("missing"), id("b")]);
}

#[tokio::test]
async fn test_nothing_resolvable_is_a_final_failure() {
    let registry = registry();
    let _b = registry.register_source(id("b"), "module b\nimport missing").unwrap();

    let err = registry.current_model().await.unwrap_err();
    assert!(err.is_unresolved());
    assert!(registry.cached_model().is_none());
    assert_eq!(link_count(&registry), 0);
}

#[tokio::test]
async fn test_structural_failure_is_not_retried() {
    let linker = CountingLinker::new();
    linker.fail_with(Some(LinkError::in_source(id("a"), "type mismatch")));
    let registry = registry_with(linker);
    let _a = registry.register_source(id("a"), "module a").unwrap();

    let err = registry.current_model().await.unwrap_err();
    assert!(matches!(err, SchemaError::Structural { .. }));
    assert_eq!(link_count(&registry), 1);

    registry.repository().linker().fail_with(None);
    assert!(registry.current_model().await.is_ok());
    assert_eq!(link_count(&registry), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mutation_during_link_discards_stale_result() {
    init_test_logging(None);
    let (linker, gate) = CountingLinker::gated();
    let registry = Arc::new(registry_with(linker));
    let _a = registry.register_source(id("a"), "module a").unwrap();

    let reader = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.current_model().await })
    };

    gate.wait_entered().await;
    let _b = registry.register_source(id("b"), "module b").unwrap();
    gate.release(2);

    let model = reader.await.unwrap().unwrap();
    assert_eq!(model.sources, vec![id("a"), id("b")]);
    assert_eq!(link_count(&registry), 2);
    assert!(registry.cached_model().unwrap().ptr_eq(&model));

    // published for the current version, so no further link
    let again = registry.current_model().await.unwrap();
    assert!(again.ptr_eq(&model));
    assert_eq!(link_count(&registry), 2);
}

#[tokio::test]
async fn test_cached_model_is_best_effort() {
    let registry = registry();
    let _a = registry.register_source(id("a"), "module a").unwrap();
    let first = registry.current_model().await.unwrap();

    let b = registry.register_source(id("b"), "module b").unwrap();
    // state moved on, the cached read still answers with the old model
    assert!(registry.cached_model().unwrap().ptr_eq(&first));

    let second = registry.current_model().await.unwrap();
    assert_eq!(second.sources, vec![id("a"), id("b")]);

    b.unregister();
    let third = registry.current_model().await.unwrap();
    assert_eq!(third.sources, vec![id("a")]);
    // `first` is still held, so the {a} model comes from cache
    assert!(third.ptr_eq(&first));
    assert_eq!(link_count(&registry), 2);
}

#[tokio::test]
async fn test_submodules_link_with_their_parent() {
    let registry = registry();
    let _main = registry.register_source(id("main"), "module main\ninclude main-types").unwrap();
    let _sub = registry.register_source(id("main-types"), "submodule main-types\nbelongs-to main").unwrap();
    let _orphan = registry.register_source(id("extra"), "submodule extra\nbelongs-to gone").unwrap();

    let model = registry.current_model().await.unwrap();
    assert_eq!(model.sources, vec![id("main-types"), id("main")]);
}

#[tokio::test]
async fn test_register_file_guesses_identifier_from_name() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("inet@2013-07-15.yang");
    tokio::fs::write(&path, "module inet@2013-07-15\n").await.unwrap();

    let registry = registry();
    let registration = registry.register_file(&path).await.unwrap();
    assert_eq!(registration.id().to_file_name(), "inet@2013-07-15.yang");

    let err = registry.register_file(temp.path().join("absent.yang")).await.unwrap_err();
    assert!(err.to_string().contains("Failed to read schema source"));

    let bad = temp.path().join("broken.yang");
    tokio::fs::write(&bad, "not a module").await.unwrap();
    let err = registry.register_file(&bad).await.unwrap_err();
    assert!(err.to_string().contains("Failed to register schema source"));
    assert!(matches!(
        err.downcast_ref::<SchemaError>(),
        Some(SchemaError::Source(SourceError::Parse { .. }))
    ));
}

#[tokio::test]
async fn test_registry_from_config() {
    let config = RegistryConfig::from_toml_str(
        r#"
        name = "device"
        parser-mode = "semver"

        [features]
        a = ["fast"]
        "#,
    )
    .unwrap();
    let registry =
        TextSchemaRegistry::from_config(&config, Arc::new(MockParser), Arc::new(CountingLinker::new()));
    assert_eq!(registry.name(), "device");

    let _a = registry.register_source(id("a"), "module a").unwrap();
    let model = registry.current_model().await.unwrap();
    assert_eq!(model.config.mode, ParserMode::Semver);
    assert!(model.config.is_feature_supported("a", "fast"));
    assert!(!model.config.is_feature_supported("a", "slow"));
}
