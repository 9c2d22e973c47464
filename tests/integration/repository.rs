use schema_linker::constants::{COST_IMMEDIATE, COST_REMOTE_IO};
use schema_linker::linker::{LinkConfig, ParserMode};
use schema_linker::registry::TextSchemaRegistry;
use schema_linker::repository::SchemaRepository;
use schema_linker::test_utils::{CountingLinker, MockParser};
use std::sync::Arc;

use crate::common::{TextProvider, id};

#[tokio::test]
async fn test_registries_sharing_a_repository_share_models() {
    let repository = Arc::new(SchemaRepository::new("shared", Arc::new(CountingLinker::new())));
    let left = TextSchemaRegistry::with_repository("left", Arc::new(MockParser), Arc::clone(&repository));
    let right = TextSchemaRegistry::with_repository("right", Arc::new(MockParser), Arc::clone(&repository));

    let _l = left.register_source(id("a"), "module a").unwrap();
    let _r = right.register_source(id("a"), "module a").unwrap();

    let from_left = left.current_model().await.unwrap();
    let from_right = right.current_model().await.unwrap();

    assert!(from_left.ptr_eq(&from_right));
    assert_eq!(repository.linker().link_count(), 1);
    assert_eq!(repository.provider_count(), 2);
}

#[tokio::test]
async fn test_models_are_cached_per_configuration() {
    let repository = SchemaRepository::new("repo", Arc::new(CountingLinker::new()));
    let _provider = repository.register_provider(Arc::new(TextProvider::new(&["module a"])), COST_IMMEDIATE);

    let plain = repository.create_model(&LinkConfig::default(), [id("a")]).await.unwrap();
    let semver = repository
        .create_model(&LinkConfig::with_mode(ParserMode::Semver), [id("a")])
        .await
        .unwrap();

    assert!(!plain.ptr_eq(&semver));
    assert_eq!(semver.config.mode, ParserMode::Semver);
    assert_eq!(repository.linker().link_count(), 2);

    let again = repository.create_model(&LinkConfig::default(), [id("a")]).await.unwrap();
    assert!(again.ptr_eq(&plain));
    assert_eq!(repository.factory_count(), 2);
}

#[tokio::test]
async fn test_provider_registration_controls_availability() {
    let repository = SchemaRepository::new("repo", Arc::new(CountingLinker::new()));
    let remote = repository.register_provider(Arc::new(TextProvider::new(&["module a"])), COST_REMOTE_IO);

    assert!(repository.create_model(&LinkConfig::default(), [id("a")]).await.is_ok());

    remote.close();
    let err = repository.create_model(&LinkConfig::default(), [id("a")]).await.unwrap_err();
    assert!(err.to_string().contains("not registered"));
}
