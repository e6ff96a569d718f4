//! End-to-end lifecycle tests against the in-memory control plane.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use ratewall_resource::control_plane::ControlPlane;
use ratewall_resource::control_plane::memory::{Fault, InMemoryControlPlane};
use ratewall_resource::error::Result;
use ratewall_resource::event::{FAIL_CREATE, RPS_LIMIT, RequestType};
use ratewall_resource::outcome::{RULE_ADD_STATUS, ResponseStatus};
use ratewall_resource::rule::{RateRule, RuleSummary};
use ratewall_test_utils::{EventFactory, HandlerHarness, default_target, init_test_logging};
use serde_json::json;

const URL: &str = "http://127.0.0.1:9/callbacks/unused";

#[tokio::test]
async fn create_installs_rule_and_reports_status_code() -> Result<()> {
    init_test_logging();
    let harness = HandlerHarness::new();
    assert_eq!(
        harness.control_plane.current_token(&default_target())?.as_deref(),
        Some("tok-1")
    );

    let event = EventFactory::create(URL);
    let outcome = harness.handler.handle(&event).await;

    assert_eq!(outcome.status, ResponseStatus::Success);
    assert_eq!(outcome.data.len(), 1);
    assert_eq!(outcome.attribute(RULE_ADD_STATUS), Some("HTTPStatusCode-200"));
    assert_eq!(outcome.physical_id, "WafRateRuleCreatorResource");

    let applied = harness.control_plane.applied()?;
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].0, default_target());
    assert_eq!(applied[0].1.name, "limit_rps_to_110");
    assert_eq!(applied[0].1.priority, 133);

    let reports = harness.reporter.reports()?;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, outcome);
    assert_eq!(reports[0].event.request_id, event.request_id);
    Ok(())
}

#[tokio::test]
async fn create_replaces_existing_rules() -> Result<()> {
    let harness = HandlerHarness::new();
    harness.control_plane.seed_rule(
        &default_target(),
        RuleSummary {
            name: "geo_block".into(),
            priority: 1,
            rate_limit: None,
        },
    )?;

    let outcome = harness
        .handler
        .handle(&EventFactory::create_with(URL, RPS_LIMIT, 2000))
        .await;
    assert!(outcome.is_success());

    let rules = harness.control_plane.rules(&default_target())?.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].name, "limit_rps_to_2000");
    assert_eq!(rules[0].rate_limit, Some(2000));
    Ok(())
}

#[tokio::test]
async fn fail_injection_fails_without_mutation() {
    let harness = HandlerHarness::new();
    let outcome = harness
        .handler
        .handle(&EventFactory::create_with(URL, FAIL_CREATE, "true"))
        .await;

    assert_eq!(outcome.status, ResponseStatus::Failed);
    assert_eq!(outcome.failure_kind(), Some("injected_failure"));
    assert_eq!(harness.control_plane.apply_calls(), 0);
    assert_eq!(harness.reporter.calls(), 1);
}

#[tokio::test]
async fn any_fail_create_string_injects_failure() {
    for value in ["false", "yes", "1"] {
        let harness = HandlerHarness::new();
        let outcome = harness
            .handler
            .handle(&EventFactory::create_with(URL, FAIL_CREATE, value))
            .await;

        assert_eq!(outcome.failure_kind(), Some("injected_failure"), "FailCreate={value:?}");
        assert_eq!(harness.control_plane.apply_calls(), 0);
    }
}

#[tokio::test]
async fn empty_fail_create_does_not_inject() {
    let harness = HandlerHarness::new();
    let outcome = harness
        .handler
        .handle(&EventFactory::create_with(URL, FAIL_CREATE, ""))
        .await;

    assert!(outcome.is_success());
    assert_eq!(harness.control_plane.apply_calls(), 1);
}

#[tokio::test]
async fn update_and_delete_do_not_mutate() {
    let harness = HandlerHarness::new();

    let update = harness.handler.handle(&EventFactory::update(URL)).await;
    let delete = harness.handler.handle(&EventFactory::delete(URL)).await;

    assert!(update.is_success());
    assert_eq!(
        update.attribute(RULE_ADD_STATUS),
        Some("HTTPStatusCode-no_updates_made")
    );
    assert!(delete.is_success());
    assert_eq!(
        delete.attribute(RULE_ADD_STATUS),
        Some("HTTPStatusCode-delete_triggered")
    );
    assert_eq!(delete.physical_id, "WafRateRuleCreatorResource");

    assert_eq!(harness.control_plane.apply_calls(), 0);
    assert_eq!(harness.control_plane.fetch_calls(), 2);
    assert_eq!(harness.reporter.calls(), 2);
}

#[tokio::test]
async fn unknown_request_type_fails_without_control_plane() {
    let harness = HandlerHarness::new();
    let outcome = harness
        .handler
        .handle(&EventFactory::of_type("Rollback", URL))
        .await;

    assert_eq!(outcome.status, ResponseStatus::Failed);
    assert_eq!(outcome.failure_kind(), Some("unsupported_request_type"));
    assert_eq!(harness.control_plane.fetch_calls(), 0);
    assert_eq!(harness.control_plane.apply_calls(), 0);
    assert_eq!(harness.reporter.calls(), 1);
}

#[tokio::test]
async fn repeated_create_with_fresh_tokens_converges() -> Result<()> {
    let harness = HandlerHarness::with_control_plane(
        InMemoryControlPlane::new()
            .with_acl(default_target())
            .with_token_rotation_on_fetch(),
    );

    let first = harness.handler.handle(&EventFactory::create(URL)).await;
    let rules_after_first = harness.control_plane.rules(&default_target())?;
    let second = harness.handler.handle(&EventFactory::create(URL)).await;
    let rules_after_second = harness.control_plane.rules(&default_target())?;

    assert!(first.is_success());
    assert!(second.is_success());
    assert_eq!(rules_after_first, rules_after_second);
    assert_eq!(harness.control_plane.apply_calls(), 2);
    Ok(())
}

#[tokio::test]
async fn transport_error_on_update_fails_and_reports_once() -> Result<()> {
    let harness = HandlerHarness::new();
    harness.control_plane.fail_next_apply(Fault::Transport)?;

    let outcome = harness.handler.handle(&EventFactory::create(URL)).await;

    assert_eq!(outcome.status, ResponseStatus::Failed);
    assert_eq!(outcome.failure_kind(), Some("control_plane_unavailable"));
    assert_eq!(harness.reporter.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn lost_lock_race_is_distinguishable() -> Result<()> {
    let harness = HandlerHarness::new();
    harness.control_plane.fail_next_apply(Fault::ConcurrentWrite)?;

    let outcome = harness.handler.handle(&EventFactory::create(URL)).await;

    assert_eq!(outcome.failure_kind(), Some("lock_token_stale"));
    assert!(harness.control_plane.applied()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn missing_acl_is_unreadable() -> Result<()> {
    let harness = HandlerHarness::with_control_plane(InMemoryControlPlane::new());
    let outcome = harness.handler.handle(&EventFactory::create(URL)).await;

    assert_eq!(outcome.failure_kind(), Some("resource_unreadable"));
    assert_eq!(harness.control_plane.apply_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn panic_in_control_plane_is_reported_as_internal() -> Result<()> {
    let harness = HandlerHarness::new();
    harness.control_plane.fail_next_fetch(Fault::Panic)?;

    let outcome = harness.handler.handle(&EventFactory::create(URL)).await;

    assert_eq!(outcome.status, ResponseStatus::Failed);
    assert_eq!(outcome.failure_kind(), Some("internal"));
    assert!(outcome.reason.as_deref().unwrap().contains("panicked"));
    assert_eq!(harness.reporter.calls(), 1);

    // The handler stays usable after a panic.
    let retry = harness.handler.handle(&EventFactory::create(URL)).await;
    assert!(retry.is_success());
    Ok(())
}

#[tokio::test]
async fn redelivered_create_refetches_and_converges() -> Result<()> {
    let harness = HandlerHarness::new();
    let event = EventFactory::create(URL);

    let first = harness.handler.handle(&event).await;
    assert!(first.is_success());

    // Another writer replaces the rule between deliveries.
    let target = default_target();
    let state = harness.control_plane.fetch(&target).await?;
    harness
        .control_plane
        .apply_rate_limit(&target, &RateRule::block_by_ip(500), state.lock_token)
        .await?;
    let fetches_before = harness.control_plane.fetch_calls();

    let second = harness.handler.handle(&event).await;

    assert!(second.is_success());
    assert_eq!(harness.control_plane.fetch_calls(), fetches_before + 1);
    let rules = harness.control_plane.rules(&target)?.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].name, "limit_rps_to_110");
    assert_eq!(harness.reporter.calls(), 2);
    assert_eq!(harness.guard.active_targets()?, 0);
    Ok(())
}

#[tokio::test]
async fn redelivered_failure_is_retried() -> Result<()> {
    let harness = HandlerHarness::new();
    harness.control_plane.fail_next_apply(Fault::Transport)?;
    let event = EventFactory::create(URL);

    let first = harness.handler.handle(&event).await;
    let second = harness.handler.handle(&event).await;

    assert!(!first.is_success());
    assert!(second.is_success());
    assert_eq!(harness.control_plane.apply_calls(), 2);
    Ok(())
}

#[tokio::test]
async fn reporter_failure_does_not_change_outcome() {
    let harness = HandlerHarness::new();
    harness.reporter.fail_deliveries(true);

    let outcome = harness.handler.handle(&EventFactory::create(URL)).await;

    assert!(outcome.is_success());
    assert_eq!(harness.reporter.calls(), 1);
}

#[tokio::test]
async fn concurrent_creates_on_one_acl_both_succeed() {
    let harness = Arc::new(HandlerHarness::new());

    let first = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move { harness.handler.handle(&EventFactory::create(URL)).await })
    };
    let second = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move { harness.handler.handle(&EventFactory::create(URL)).await })
    };

    let first = first.await.unwrap();
    let second = second.await.unwrap();

    assert!(first.is_success());
    assert!(second.is_success());
    assert_eq!(harness.control_plane.apply_calls(), 2);
}

#[tokio::test]
async fn malformed_payload_with_url_is_answered() {
    let harness = HandlerHarness::new();
    let payload = json!({
        "RequestType": "Create",
        "ResponseURL": URL,
        "RequestId": "req-malformed",
        "ResourceProperties": ["not", "a", "map"]
    });

    let outcome = harness.handler.handle_value(payload).await.unwrap();

    assert_eq!(outcome.failure_kind(), Some("invalid_event"));
    assert_eq!(harness.reporter.calls(), 1);
    assert_eq!(harness.control_plane.fetch_calls(), 0);
}

#[tokio::test]
async fn malformed_payload_without_url_is_rejected() {
    let harness = HandlerHarness::new();
    let result = harness.handler.handle_value(json!({"hello": "world"})).await;

    assert!(result.is_err());
    assert_eq!(harness.reporter.calls(), 0);
}

#[tokio::test]
async fn raw_payload_runs_the_full_path() {
    let harness = HandlerHarness::new();
    let payload = EventFactory::payload("Create", URL);

    let outcome = harness.handler.handle_value(payload).await.unwrap();

    assert!(outcome.is_success());
    let reports = harness.reporter.reports().unwrap();
    assert_eq!(reports[0].event.request_type, RequestType::Create);
}
