//! Integration tests for webhook notification dispatch

mod support;

use std::sync::Arc;

use calbridge_core::{
    ChannelManager, DispatchOutcome, LeaseRegistry, SyncEngine, SyncPolicy, TaskKind,
    WebhookDispatcher,
};
use calbridge_domain::{
    Account, Calendar, Credential, Event, Notification, ResourceState, Subscription, SyncCursor,
    SyncTarget,
};
use chrono::{Duration, Utc};
use support::{Harness, MemoryCursors, MemoryEvents};

fn dispatcher(harness: &Harness) -> WebhookDispatcher {
    let engine = Arc::new(SyncEngine::new(
        LeaseRegistry::new(),
        harness.queue.clone(),
        Arc::new(ChannelManager::new("https://hooks.example.test/google/webhook".into(), 48)),
        SyncPolicy::default(),
    ));
    WebhookDispatcher::new(harness.queue.clone(), engine)
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

fn notification(channel_id: &str, resource_id: &str, state: ResourceState) -> Notification {
    Notification {
        channel_id: channel_id.to_string(),
        resource_id: resource_id.to_string(),
        state,
    }
}

fn watched_cursor(target: SyncTarget, channel_id: &str) -> SyncCursor {
    let mut cursor = SyncCursor::new(target);
    cursor.subscription = Some(Subscription {
        channel_id: channel_id.to_string(),
        resource_id: format!("res-{channel_id}"),
        expires_at: Utc::now() + Duration::days(5),
    });
    cursor
}

#[tokio::test]
async fn handshake_is_acknowledged_without_side_effects() {
    let harness = Harness::new();

    let outcome = dispatcher(&harness)
        .dispatch(&harness.ctx, &notification("chan-1", "res-chan-1", ResourceState::Sync))
        .await
        .unwrap();

    assert_eq!(outcome, DispatchOutcome::Acknowledged);
    assert!(harness.queue.drained().is_empty());
}

#[tokio::test]
async fn change_notification_enqueues_a_pass_for_the_watched_target() {
    let target = SyncTarget::Events { calendar_id: "cal-1".to_string() };
    let harness = Harness::build(
        support::MemoryAccounts::default().with_account(account("acc-1")),
        support::MemoryCalendars::default().with_calendar(calendar("cal-1", "acc-1")),
        MemoryEvents::default(),
        MemoryCursors::default().with_cursor(watched_cursor(target.clone(), "chan-1")),
    );

    let outcome = dispatcher(&harness)
        .dispatch(&harness.ctx, &notification("chan-1", "res-chan-1", ResourceState::Exists))
        .await
        .unwrap();

    assert_eq!(outcome, DispatchOutcome::Enqueued);
    let tasks = harness.queue.drained();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].kind, TaskKind::Synchronize(target));
    assert_eq!(tasks[0].tenant, harness.ctx.tenant);
}

#[tokio::test]
async fn unknown_channel_pair_is_dropped_without_creating_state() {
    let target = SyncTarget::Events { calendar_id: "cal-1".to_string() };
    let harness = Harness::build(
        support::MemoryAccounts::default().with_account(account("acc-1")),
        support::MemoryCalendars::default().with_calendar(calendar("cal-1", "acc-1")),
        MemoryEvents::default(),
        MemoryCursors::default().with_cursor(watched_cursor(target, "chan-live")),
    );

    // Stale notification from a channel rotated away.
    let outcome = dispatcher(&harness)
        .dispatch(&harness.ctx, &notification("chan-dead", "res-chan-dead", ResourceState::Exists))
        .await
        .unwrap();

    assert_eq!(outcome, DispatchOutcome::Unknown);
    assert!(harness.queue.drained().is_empty());
}

#[tokio::test]
async fn channel_id_alone_is_not_enough_to_match() {
    let target = SyncTarget::Events { calendar_id: "cal-1".to_string() };
    let harness = Harness::build(
        support::MemoryAccounts::default().with_account(account("acc-1")),
        support::MemoryCalendars::default().with_calendar(calendar("cal-1", "acc-1")),
        MemoryEvents::default(),
        MemoryCursors::default().with_cursor(watched_cursor(target, "chan-1")),
    );

    let outcome = dispatcher(&harness)
        .dispatch(&harness.ctx, &notification("chan-1", "res-other", ResourceState::Exists))
        .await
        .unwrap();

    assert_eq!(outcome, DispatchOutcome::Unknown);
}

#[tokio::test]
async fn list_removal_queues_child_channel_stops_instead_of_calling_the_remote() {
    let list_target = SyncTarget::Calendars { account_id: "acc-1".to_string() };
    let events_target = SyncTarget::Events { calendar_id: "cal-1".to_string() };
    let harness = Harness::build(
        support::MemoryAccounts::default().with_account(account("acc-1")),
        support::MemoryCalendars::default().with_calendar(calendar("cal-1", "acc-1")),
        MemoryEvents::default(),
        MemoryCursors::default()
            .with_cursor(watched_cursor(list_target.clone(), "chan-list"))
            .with_cursor(watched_cursor(events_target.clone(), "chan-events")),
    );

    let outcome = dispatcher(&harness)
        .dispatch(
            &harness.ctx,
            &notification("chan-list", "res-chan-list", ResourceState::NotExists),
        )
        .await
        .unwrap();

    assert_eq!(outcome, DispatchOutcome::Deactivated);
    assert!(harness.calendars.all().is_empty());
    assert!(harness.cursors.get(&events_target).is_none());
    let list_cursor = harness.cursors.get(&list_target).unwrap();
    assert!(!list_cursor.active);
    assert!(list_cursor.subscription.is_none());

    // The child channel's stop must not run on the notification path.
    assert!(harness.remote.recorded_calls().is_empty());
    let tasks = harness.queue.drained();
    assert_eq!(tasks.len(), 1);
    match &tasks[0].kind {
        TaskKind::StopChannel(channel) => {
            assert_eq!(channel.account_id, "acc-1");
            assert_eq!(channel.subscription.channel_id, "chan-events");
        }
        other => panic!("expected a queued channel stop, got {other:?}"),
    }
}

#[tokio::test]
async fn resource_removal_drops_mirrors_and_deactivates_the_cursor() {
    let target = SyncTarget::Events { calendar_id: "cal-1".to_string() };
    let starts_at = Utc::now() + Duration::hours(6);
    let harness = Harness::build(
        support::MemoryAccounts::default().with_account(account("acc-1")),
        support::MemoryCalendars::default().with_calendar(calendar("cal-1", "acc-1")),
        MemoryEvents::default().with_event(Event {
            id: "e1".to_string(),
            calendar_id: "cal-1".to_string(),
            google_id: "ev-a".to_string(),
            starts_at,
            ends_at: starts_at + Duration::hours(1),
            activity_id: None,
        }),
        MemoryCursors::default().with_cursor(watched_cursor(target.clone(), "chan-1")),
    );

    let outcome = dispatcher(&harness)
        .dispatch(&harness.ctx, &notification("chan-1", "res-chan-1", ResourceState::NotExists))
        .await
        .unwrap();

    assert_eq!(outcome, DispatchOutcome::Deactivated);
    assert!(harness.events.for_calendar("cal-1").is_empty());
    let cursor = harness.cursors.get(&target).unwrap();
    assert!(!cursor.active);
    assert!(cursor.subscription.is_none());
    assert!(harness.queue.drained().is_empty());
}
