//! Integration tests for push channel lifecycle

mod support;

use calbridge_core::{
    AccountRepository, CalendarRepository, ChannelManager, ChannelOutcome, SyncCursorRepository,
};
use calbridge_domain::{
    Account, Calendar, CalbridgeError, Credential, Subscription, SyncCursor, SyncTarget,
};
use chrono::{Duration, Utc};
use support::{Harness, MemoryCursors, RemoteCall};

const LEAD_HOURS: i64 = 48;

fn manager() -> ChannelManager {
    ChannelManager::new("https://hooks.example.test/google/webhook".to_string(), LEAD_HOURS)
}

fn account(id: &str) -> Account {
    Account {
        id: id.to_string(),
        google_id: format!("g-{id}"),
        name: "Test User".to_string(),
        credential: Credential {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Utc::now() + Duration::hours(1),
        },
        scopes: Vec::new(),
        active: true,
        reauth_required: false,
    }
}

fn calendar(id: &str, account_id: &str) -> Calendar {
    Calendar {
        id: id.to_string(),
        account_id: account_id.to_string(),
        google_id: format!("g-{id}"),
        name: "Work".to_string(),
        color: None,
        timezone: None,
        primary: false,
    }
}

fn subscription(channel_id: &str, expires_in_hours: i64) -> Subscription {
    Subscription {
        channel_id: channel_id.to_string(),
        resource_id: format!("res-{channel_id}"),
        expires_at: Utc::now() + Duration::hours(expires_in_hours),
    }
}

fn calendars_target(account_id: &str) -> SyncTarget {
    SyncTarget::Calendars { account_id: account_id.to_string() }
}

#[tokio::test]
async fn fresh_cursor_gets_a_channel() {
    let harness = Harness::new();
    harness.accounts.upsert(&account("acc-1")).await.unwrap();

    let target = calendars_target("acc-1");
    let outcome = manager().ensure_watch(&harness.ctx, &target).await.unwrap();

    assert_eq!(outcome, ChannelOutcome::Started);
    let cursor = harness.cursors.get(&target).unwrap();
    let sub = cursor.subscription.expect("subscription persisted");
    assert!(!sub.channel_id.is_empty());
    assert_eq!(sub.resource_id, format!("res-{}", sub.channel_id));

    let calls = harness.remote.recorded_calls();
    assert_eq!(calls, vec![RemoteCall::Watch { channel_id: sub.channel_id }]);
}

#[tokio::test]
async fn healthy_channel_is_left_alone() {
    let target = calendars_target("acc-1");
    let harness = Harness::build(
        support::MemoryAccounts::default().with_account(account("acc-1")),
        support::MemoryCalendars::default(),
        support::MemoryEvents::default(),
        MemoryCursors::default().with_cursor({
            let mut cursor = SyncCursor::new(target.clone());
            cursor.subscription = Some(subscription("chan-live", LEAD_HOURS + 24));
            cursor
        }),
    );

    let outcome = manager().ensure_watch(&harness.ctx, &target).await.unwrap();

    assert_eq!(outcome, ChannelOutcome::AlreadyActive);
    assert!(harness.remote.recorded_calls().is_empty());
    let cursor = harness.cursors.get(&target).unwrap();
    assert_eq!(cursor.subscription.unwrap().channel_id, "chan-live");
}

#[tokio::test]
async fn expiring_channel_rotates_start_before_stop() {
    let target = calendars_target("acc-1");
    let harness = Harness::build(
        support::MemoryAccounts::default().with_account(account("acc-1")),
        support::MemoryCalendars::default(),
        support::MemoryEvents::default(),
        MemoryCursors::default().with_cursor({
            let mut cursor = SyncCursor::new(target.clone());
            cursor.subscription = Some(subscription("chan-old", LEAD_HOURS - 12));
            cursor
        }),
    );

    let outcome = manager().ensure_watch(&harness.ctx, &target).await.unwrap();

    assert_eq!(outcome, ChannelOutcome::Rotated);
    let cursor = harness.cursors.get(&target).unwrap();
    let sub = cursor.subscription.expect("rotation must keep a subscription");
    assert_ne!(sub.channel_id, "chan-old", "channel ids are never reused");

    // The replacement is registered before the old channel is stopped.
    let calls = harness.remote.recorded_calls();
    assert_eq!(
        calls,
        vec![
            RemoteCall::Watch { channel_id: sub.channel_id },
            RemoteCall::StopWatch { channel_id: "chan-old".to_string() },
        ],
    );
}

#[tokio::test]
async fn rotation_survives_a_failing_stop() {
    let target = calendars_target("acc-1");
    let harness = Harness::build(
        support::MemoryAccounts::default().with_account(account("acc-1")),
        support::MemoryCalendars::default(),
        support::MemoryEvents::default(),
        MemoryCursors::default().with_cursor({
            let mut cursor = SyncCursor::new(target.clone());
            cursor.subscription = Some(subscription("chan-old", 1));
            cursor
        }),
    );
    harness.remote.fail_stops_with(CalbridgeError::Network("connection reset".to_string()));

    let outcome = manager().ensure_watch(&harness.ctx, &target).await.unwrap();

    assert_eq!(outcome, ChannelOutcome::Rotated);
    let cursor = harness.cursors.get(&target).unwrap();
    assert!(cursor.subscription.is_some());
}

#[tokio::test]
async fn failed_watch_keeps_the_old_subscription() {
    let target = calendars_target("acc-1");
    let harness = Harness::build(
        support::MemoryAccounts::default().with_account(account("acc-1")),
        support::MemoryCalendars::default(),
        support::MemoryEvents::default(),
        MemoryCursors::default().with_cursor({
            let mut cursor = SyncCursor::new(target.clone());
            cursor.subscription = Some(subscription("chan-old", 1));
            cursor
        }),
    );
    harness.remote.push_watch(Err(CalbridgeError::RateLimited("quota exceeded".to_string())));

    let result = manager().ensure_watch(&harness.ctx, &target).await;

    assert!(matches!(result, Err(CalbridgeError::RateLimited(_))));
    // The old channel was neither stopped nor overwritten.
    let cursor = harness.cursors.get(&target).unwrap();
    assert_eq!(cursor.subscription.unwrap().channel_id, "chan-old");
    assert!(!harness
        .remote
        .recorded_calls()
        .iter()
        .any(|call| matches!(call, RemoteCall::StopWatch { .. })));
}

#[tokio::test]
async fn inactive_cursor_is_not_watched() {
    let target = calendars_target("acc-1");
    let harness = Harness::build(
        support::MemoryAccounts::default().with_account(account("acc-1")),
        support::MemoryCalendars::default(),
        support::MemoryEvents::default(),
        MemoryCursors::default().with_cursor({
            let mut cursor = SyncCursor::new(target.clone());
            cursor.active = false;
            cursor
        }),
    );

    let outcome = manager().ensure_watch(&harness.ctx, &target).await.unwrap();

    assert_eq!(outcome, ChannelOutcome::Skipped);
    assert!(harness.remote.recorded_calls().is_empty());
}

#[tokio::test]
async fn event_channels_watch_under_the_owning_account() {
    let harness = Harness::new();
    harness.accounts.upsert(&account("acc-1")).await.unwrap();
    harness.calendars.upsert(&calendar("cal-1", "acc-1")).await.unwrap();

    let target = SyncTarget::Events { calendar_id: "cal-1".to_string() };
    let outcome = manager().ensure_watch(&harness.ctx, &target).await.unwrap();

    assert_eq!(outcome, ChannelOutcome::Started);
    assert!(harness.cursors.get(&target).unwrap().subscription.is_some());
}

#[tokio::test]
async fn teardown_clears_subscription_even_when_stop_fails() {
    let target = calendars_target("acc-1");
    let harness = Harness::build(
        support::MemoryAccounts::default().with_account(account("acc-1")),
        support::MemoryCalendars::default(),
        support::MemoryEvents::default(),
        MemoryCursors::default().with_cursor({
            let mut cursor = SyncCursor::new(target.clone());
            cursor.subscription = Some(subscription("chan-old", 100));
            cursor
        }),
    );
    harness.remote.fail_stops_with(CalbridgeError::Network("timeout".to_string()));

    manager().teardown(&harness.ctx, &target).await.unwrap();

    let cursor = harness.cursors.get(&target).unwrap();
    assert!(cursor.subscription.is_none());
    assert_eq!(
        harness.remote.recorded_calls(),
        vec![RemoteCall::StopWatch { channel_id: "chan-old".to_string() }],
    );
}

#[tokio::test]
async fn teardown_without_cursor_or_subscription_is_a_noop() {
    let harness = Harness::new();
    let target = calendars_target("acc-1");

    manager().teardown(&harness.ctx, &target).await.unwrap();
    assert!(harness.remote.recorded_calls().is_empty());

    harness.cursors.ensure(&target).await.unwrap();
    manager().teardown(&harness.ctx, &target).await.unwrap();
    assert!(harness.remote.recorded_calls().is_empty());
}
