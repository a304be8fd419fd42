//! Tests for the concurrent operation guard.

use chrono::Utc;
use director_core::context::default_tenant_loader;
use director_core::operation::{ConcurrencyArgs, ConcurrencyDirective, ResolverContext};
use director_core::test_utils::{
    failing_tenant_loader, fixture_context, ready_lifecycle, MockTransactioner, StaticFetcher,
};
use director_core::{Lifecycle, OperationError, OperationType, TenantLoaderFn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const APP_ID: &str = "6bc9d3a5-7e3c-4b83-a1bf-09d0b2bb7c54";

struct Harness {
    transact: Arc<MockTransactioner>,
    fetcher: Arc<StaticFetcher>,
    directive: ConcurrencyDirective,
}

fn harness_with(
    transact: MockTransactioner,
    fetcher: StaticFetcher,
    tenant_loader: TenantLoaderFn,
) -> Harness {
    let transact = Arc::new(transact);
    let fetcher = Arc::new(fetcher);
    let directive = ConcurrencyDirective::new(transact.clone(), fetcher.clone(), tenant_loader);
    Harness {
        transact,
        fetcher,
        directive,
    }
}

fn harness(fetcher: StaticFetcher) -> Harness {
    harness_with(
        MockTransactioner::that_succeeds(),
        fetcher,
        default_tenant_loader(),
    )
}

fn add_webhook_rctx() -> ResolverContext {
    ResolverContext::new("Mutation", "addWebhook")
        .with_arg("applicationID", APP_ID)
        .unwrap()
}

fn add_webhook_args() -> ConcurrencyArgs {
    ConcurrencyArgs::new(OperationType::Create).parent_id_field("applicationID")
}

fn create_in_progress() -> Lifecycle {
    Lifecycle {
        created_at: Some(Utc::now()),
        ..Default::default()
    }
}

fn delete_in_progress() -> Lifecycle {
    let now = Utc::now();
    Lifecycle {
        created_at: Some(now),
        updated_at: Some(now),
        deleted_at: Some(now),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_without_parent_skips_check() {
    let h = harness(StaticFetcher::found(create_in_progress()));

    let result = h
        .directive
        .handle(
            &fixture_context(),
            &ResolverContext::new("Mutation", "registerApplication"),
            &ConcurrencyArgs::new(OperationType::Create),
            |ctx| async move {
                assert!(ctx.transaction().is_ok());
                Ok("created")
            },
        )
        .await
        .unwrap();

    assert_eq!(result, "created");
    assert_eq!(h.fetcher.calls(), 0);
    assert_eq!(h.transact.counters.commits(), 1);
}

#[tokio::test]
async fn test_ready_parent_allows_mutation() {
    let h = harness(StaticFetcher::found(ready_lifecycle()));

    let result = h
        .directive
        .handle(
            &fixture_context(),
            &add_webhook_rctx(),
            &add_webhook_args(),
            |_ctx| async { Ok(42) },
        )
        .await
        .unwrap();

    assert_eq!(result, 42);
    assert_eq!(h.fetcher.calls(), 1);
    assert_eq!(h.transact.counters.commits(), 1);
}

#[tokio::test]
async fn test_create_in_progress_is_rejected() {
    let h = harness(StaticFetcher::found(create_in_progress()));
    let flag = AtomicBool::new(false);
    let called = &flag;

    let err = h
        .directive
        .handle(
            &fixture_context(),
            &add_webhook_rctx(),
            &add_webhook_args(),
            move |_ctx| async move {
                called.store(true, Ordering::SeqCst);
                Ok(())
            },
        )
        .await
        .unwrap_err();

    match &err {
        OperationError::ConcurrentOperationInProgress(reason) => {
            assert_eq!(reason, "create operation is in progress")
        }
        other => panic!("Expected concurrent operation error, got {:?}", other),
    }
    assert!(!called.load(Ordering::SeqCst));
    assert_eq!(h.transact.counters.rollbacks(), 1);
    assert_eq!(h.transact.counters.commits(), 0);
}

#[tokio::test]
async fn test_delete_in_progress_is_rejected() {
    let h = harness(StaticFetcher::found(delete_in_progress()));

    let err = h
        .directive
        .handle(
            &fixture_context(),
            &ResolverContext::new("Mutation", "updateApplication")
                .with_arg("id", APP_ID)
                .unwrap(),
            &ConcurrencyArgs::new(OperationType::Update).id_field("id"),
            |_ctx| async { Ok(()) },
        )
        .await
        .unwrap_err();

    assert!(err.is_concurrent_operation());
    assert!(err.to_string().contains("delete operation is in progress"));
}

#[tokio::test]
async fn test_failed_delete_allows_retry() {
    let mut lifecycle = delete_in_progress();
    lifecycle.ready = true;
    lifecycle.error = Some(r#"{"error":"webhook failed"}"#.to_string());
    let h = harness(StaticFetcher::found(lifecycle));

    h.directive
        .handle(
            &fixture_context(),
            &ResolverContext::new("Mutation", "unregisterApplication")
                .with_arg("id", APP_ID)
                .unwrap(),
            &ConcurrencyArgs::new(OperationType::Delete).id_field("id"),
            |_ctx| async { Ok(()) },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_not_found_is_returned_verbatim() {
    let h = harness(StaticFetcher::not_found());

    let err = h
        .directive
        .handle(
            &fixture_context(),
            &add_webhook_rctx(),
            &add_webhook_args(),
            |_ctx| async { Ok(()) },
        )
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(h.transact.counters.rollbacks(), 1);
}

#[tokio::test]
async fn test_fetch_error_is_wrapped() {
    let h = harness(StaticFetcher::failing("connection reset"));

    let err = h
        .directive
        .handle(
            &fixture_context(),
            &add_webhook_rctx(),
            &add_webhook_args(),
            |_ctx| async { Ok(()) },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OperationError::Internal(_)));
    assert!(err
        .to_string()
        .contains(&format!("failed to fetch resource with id {}", APP_ID)));
}

#[tokio::test]
async fn test_missing_tenant_is_tenant_required() {
    let h = harness_with(
        MockTransactioner::that_succeeds(),
        StaticFetcher::found(ready_lifecycle()),
        failing_tenant_loader(),
    );

    let err = h
        .directive
        .handle(
            &fixture_context(),
            &add_webhook_rctx(),
            &add_webhook_args(),
            |_ctx| async { Ok(()) },
        )
        .await
        .unwrap_err();

    assert!(err.is_tenant_required());
    assert_eq!(h.fetcher.calls(), 0);
}

#[tokio::test]
async fn test_missing_id_argument_is_internal() {
    let h = harness(StaticFetcher::found(ready_lifecycle()));

    let err = h
        .directive
        .handle(
            &fixture_context(),
            &ResolverContext::new("Mutation", "addWebhook"),
            &add_webhook_args(),
            |_ctx| async { Ok(()) },
        )
        .await
        .unwrap_err();

    assert!(err
        .to_string()
        .contains("could not get idField: \"applicationID\" from request context"));
}

#[tokio::test]
async fn test_resolver_error_is_wrapped_and_rolled_back() {
    let h = harness(StaticFetcher::found(ready_lifecycle()));

    let err = h
        .directive
        .handle(
            &fixture_context(),
            &add_webhook_rctx(),
            &add_webhook_args(),
            |_ctx| async { Err::<(), _>(OperationError::InvalidData("bad url".to_string())) },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OperationError::Internal(_)));
    assert!(err.to_string().contains("bad url"));
    assert_eq!(h.transact.counters.rollbacks(), 1);
    assert_eq!(h.transact.counters.commits(), 0);
}

#[tokio::test]
async fn test_commit_failure_is_internal() {
    let h = harness_with(
        MockTransactioner::that_fails_on_commit(),
        StaticFetcher::found(ready_lifecycle()),
        default_tenant_loader(),
    );

    let err = h
        .directive
        .handle(
            &fixture_context(),
            &add_webhook_rctx(),
            &add_webhook_args(),
            |_ctx| async { Ok(()) },
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Unable to finalize database operation"));
}

#[tokio::test]
async fn test_begin_failure_is_internal() {
    let h = harness_with(
        MockTransactioner::that_fails_on_begin(),
        StaticFetcher::found(ready_lifecycle()),
        default_tenant_loader(),
    );

    let err = h
        .directive
        .handle(
            &fixture_context(),
            &add_webhook_rctx(),
            &add_webhook_args(),
            |_ctx| async { Ok(()) },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OperationError::Internal(_)));
    assert_eq!(h.fetcher.calls(), 0);
}
