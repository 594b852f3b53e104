//! Integration tests for the rotation engine
//!
//! Exercises the public API end to end over the in-memory store:
//! selection precedence, strategy ranking, capacity and warmup gating,
//! auto-pause thresholds, throttle adjustment, and the daily reset.

use std::sync::Arc;

use chrono::{Days, Duration, Utc};
use rotary_common::Domain;
use rotary_engine::{
    EngineConfig, IdentityId, MatchedBy, MemoryIdentityStore, PauseReason, RotationEngine,
    SelectOptions, SendOutcome, SendingIdentity, Strategy,
};

fn engine() -> RotationEngine {
    RotationEngine::new(
        Arc::new(MemoryIdentityStore::new()),
        EngineConfig::default(),
    )
}

/// An identity past its warmup, so the configured max applies.
fn warmed(domain: &str, from_name: &str, max_daily: u32, sent_today: u32) -> SendingIdentity {
    let mut identity = SendingIdentity::new(
        Domain::new(domain),
        format!("hello@{domain}"),
        from_name,
        max_daily,
    );
    identity.warmup_started = Utc::now() - Duration::days(30);
    identity.sent_today = sent_today;
    identity
}

#[tokio::test]
async fn test_capacity_based_default_picks_highest_remaining() {
    let engine = engine();

    // A: remaining 5, B: remaining 50, C: paused
    let a = warmed("a.example.com", "Team A", 100, 95);
    let b = warmed("b.example.com", "Team B", 100, 50);
    let mut c = warmed("c.example.com", "Team C", 100, 0);
    c.pause(PauseReason::Manual);
    let b_id = b.id;

    engine.register(a).await.unwrap();
    engine.register(b).await.unwrap();
    engine.register(c).await.unwrap();

    let selected = engine.select(&SelectOptions::new()).await.unwrap();
    assert_eq!(selected.identity_id, b_id);
    assert_eq!(selected.matched_by, MatchedBy::Strategy);
}

#[tokio::test]
async fn test_signature_match_beats_capacity() {
    let engine = engine();

    let acme = warmed("acme.example.com", "Acme Sales", 100, 95); // remaining 5
    let kanishk = warmed("ks.example.com", "Kanishk Sharma", 100, 50); // remaining 50
    let kanishk_id = kanishk.id;

    engine.register(acme).await.unwrap();
    engine.register(kanishk).await.unwrap();

    let selected = engine
        .select(&SelectOptions {
            signature_name: Some("Kanishk".to_string()),
            ..SelectOptions::new()
        })
        .await
        .unwrap();

    assert_eq!(selected.identity_id, kanishk_id);
    assert_eq!(selected.matched_by, MatchedBy::Signature);
    assert_eq!(selected.from_name, "Kanishk Sharma");
}

#[tokio::test]
async fn test_signature_matches_email_too() {
    let engine = engine();

    let sales = warmed("a.example.com", "Outbound", 100, 0);
    let sales_id = sales.id;
    engine.register(sales).await.unwrap();

    // from_email is hello@a.example.com
    let selected = engine
        .select(&SelectOptions {
            signature_name: Some("HELLO@A.EXAMPLE".to_string()),
            ..SelectOptions::new()
        })
        .await
        .unwrap();

    assert_eq!(selected.identity_id, sales_id);
    assert_eq!(selected.matched_by, MatchedBy::Signature);
}

#[tokio::test]
async fn test_unmatched_signature_falls_back_to_strategy() {
    let engine = engine();
    engine
        .register(warmed("a.example.com", "Acme", 100, 0))
        .await
        .unwrap();

    let selected = engine
        .select(&SelectOptions {
            signature_name: Some("nobody-by-this-name".to_string()),
            ..SelectOptions::new()
        })
        .await
        .unwrap();

    assert_eq!(selected.matched_by, MatchedBy::Strategy);
}

#[tokio::test]
async fn test_preferred_identity_wins_when_eligible() {
    let engine = engine();

    let big = warmed("big.example.com", "Big", 100, 0);
    let small = warmed("small.example.com", "Small", 100, 90);
    let small_id = small.id;

    engine.register(big).await.unwrap();
    engine.register(small).await.unwrap();

    let selected = engine
        .select(&SelectOptions {
            preferred_id: Some(small_id),
            ..SelectOptions::new()
        })
        .await
        .unwrap();

    assert_eq!(selected.identity_id, small_id);
    assert_eq!(selected.matched_by, MatchedBy::Preferred);
}

#[tokio::test]
async fn test_unknown_preferred_falls_back_to_strategy() {
    let engine = engine();

    let only = warmed("only.example.com", "Only", 100, 0);
    let only_id = only.id;
    engine.register(only).await.unwrap();

    let selected = engine
        .select(&SelectOptions {
            preferred_id: Some(IdentityId::generate()),
            ..SelectOptions::new()
        })
        .await
        .unwrap();

    assert_eq!(selected.identity_id, only_id);
    assert_eq!(selected.matched_by, MatchedBy::Strategy);
}

#[tokio::test]
async fn test_round_robin_picks_lowest_sent() {
    let engine = engine();

    let busy = warmed("busy.example.com", "Busy", 100, 60);
    let idle = warmed("idle.example.com", "Idle", 100, 10);
    let idle_id = idle.id;

    engine.register(busy).await.unwrap();
    engine.register(idle).await.unwrap();

    let selected = engine
        .select(&SelectOptions {
            strategy: Some(Strategy::RoundRobin),
            ..SelectOptions::new()
        })
        .await
        .unwrap();

    assert_eq!(selected.identity_id, idle_id);
}

#[tokio::test]
async fn test_health_based_ranks_unprobed_last() {
    let engine = engine();

    let mut probed = warmed("probed.example.com", "Probed", 100, 0);
    probed.health.score = Some(75);
    let probed_id = probed.id;
    let unprobed = warmed("unprobed.example.com", "Unprobed", 100, 0);

    engine.register(probed).await.unwrap();
    engine.register(unprobed).await.unwrap();

    let selected = engine
        .select(&SelectOptions {
            strategy: Some(Strategy::HealthBased),
            ..SelectOptions::new()
        })
        .await
        .unwrap();

    assert_eq!(selected.identity_id, probed_id);
}

#[tokio::test]
async fn test_no_eligible_domain_when_exhausted() {
    let engine = engine();

    let spent = warmed("spent.example.com", "Spent", 50, 50);
    engine.register(spent).await.unwrap();

    let err = engine.select(&SelectOptions::new()).await.unwrap_err();
    assert!(err.is_no_eligible());
}

#[tokio::test]
async fn test_no_eligible_domain_when_empty() {
    let engine = engine();
    let err = engine.select(&SelectOptions::new()).await.unwrap_err();
    assert!(err.is_no_eligible());
}

#[tokio::test]
async fn test_warmup_caps_fresh_identity() {
    let engine = engine();

    // Day 0 on the standard curve allows 10 sends regardless of the
    // configured maximum
    let mut fresh = SendingIdentity::new(
        Domain::new("fresh.example.com"),
        "hello@fresh.example.com",
        "Fresh",
        1_000,
    );
    fresh.sent_today = 10;
    engine.register(fresh).await.unwrap();

    let err = engine.select(&SelectOptions::new()).await.unwrap_err();
    assert!(err.is_no_eligible());
}

#[tokio::test]
async fn test_bounces_tighten_throttle_geometrically() {
    let engine = engine();
    let identity = warmed("throttle.example.com", "Throttle", 100, 0);
    let id = identity.id;
    engine.register(identity).await.unwrap();

    let store = engine.state_store();

    engine.record_outcome(&id, SendOutcome::Bounced).await.unwrap();
    assert_eq!(store.get(&id).await.unwrap().unwrap().throttle_delay_ms, 45_000);

    engine
        .record_outcome(&id, SendOutcome::Complained)
        .await
        .unwrap();
    assert_eq!(store.get(&id).await.unwrap().unwrap().throttle_delay_ms, 90_000);

    engine.record_outcome(&id, SendOutcome::Bounced).await.unwrap();
    assert_eq!(
        store.get(&id).await.unwrap().unwrap().throttle_delay_ms,
        120_000
    );
}

#[tokio::test]
async fn test_selection_carries_recommended_delay() {
    let engine = engine();
    let mut identity = warmed("delay.example.com", "Delay", 100, 0);
    identity.throttle_delay_ms = 60_000;
    let id = identity.id;
    engine.register(identity).await.unwrap();

    let selected = engine.select(&SelectOptions::new()).await.unwrap();
    assert_eq!(selected.identity_id, id);
    assert_eq!(selected.recommended_delay_ms, 60_000);
}

#[tokio::test]
async fn test_high_bounce_rate_pauses_identity() {
    let engine = engine();

    // 5 bounces over 100 sends; the sixth crosses 5%
    let mut identity = warmed("bouncy.example.com", "Bouncy", 500, 100);
    identity.bounced_today = 5;
    let id = identity.id;
    engine.register(identity).await.unwrap();

    engine.record_outcome(&id, SendOutcome::Bounced).await.unwrap();

    let paused = engine.state_store().get(&id).await.unwrap().unwrap();
    assert!(paused.is_paused());
    assert_eq!(paused.pause_reason(), Some(PauseReason::HighBounceRate));

    let err = engine.select(&SelectOptions::new()).await.unwrap_err();
    assert!(err.is_no_eligible());
}

#[tokio::test]
async fn test_low_bounce_rate_does_not_pause() {
    let engine = engine();

    // 4 bounces over 100 sends stays under the 5% threshold
    let mut identity = warmed("fine.example.com", "Fine", 500, 100);
    identity.bounced_today = 3;
    let id = identity.id;
    engine.register(identity).await.unwrap();

    engine.record_outcome(&id, SendOutcome::Bounced).await.unwrap();

    let current = engine.state_store().get(&id).await.unwrap().unwrap();
    assert!(!current.is_paused());
    assert!(engine.select(&SelectOptions::new()).await.is_ok());
}

#[tokio::test]
async fn test_second_complaint_pauses() {
    let engine = engine();
    let identity = warmed("complaints.example.com", "Complaints", 100, 10);
    let id = identity.id;
    engine.register(identity).await.unwrap();

    engine
        .record_outcome(&id, SendOutcome::Complained)
        .await
        .unwrap();
    assert!(
        !engine
            .state_store()
            .get(&id)
            .await
            .unwrap()
            .unwrap()
            .is_paused()
    );

    engine
        .record_outcome(&id, SendOutcome::Complained)
        .await
        .unwrap();
    let paused = engine.state_store().get(&id).await.unwrap().unwrap();
    assert!(paused.is_paused());
    assert_eq!(paused.pause_reason(), Some(PauseReason::ComplaintThreshold));
}

#[tokio::test]
async fn test_outcome_for_unknown_identity_is_ignored() {
    let engine = engine();
    engine
        .register(warmed("known.example.com", "Known", 100, 0))
        .await
        .unwrap();

    // Unknown ids are logged and dropped, never an error
    let unknown = IdentityId::generate();
    engine
        .record_outcome(&unknown, SendOutcome::Sent)
        .await
        .unwrap();
    engine
        .record_outcome(&unknown, SendOutcome::Bounced)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_stale_counters_reset_on_first_touch() {
    let engine = engine();

    let mut stale = warmed("stale.example.com", "Stale", 100, 80);
    stale.bounced_today = 7;
    stale.last_counter_reset = Utc::now()
        .date_naive()
        .checked_sub_days(Days::new(1))
        .unwrap();
    let id = stale.id;
    engine.register(stale).await.unwrap();

    // First selection of the new day sees fresh counters
    let selected = engine.select(&SelectOptions::new()).await.unwrap();
    assert_eq!(selected.identity_id, id);

    let current = engine.state_store().get(&id).await.unwrap().unwrap();
    assert_eq!(current.sent_today, 0);
    assert_eq!(current.bounced_today, 0);
    assert_eq!(current.last_counter_reset, Utc::now().date_naive());
}

#[tokio::test]
async fn test_automatic_pause_lifts_at_day_boundary() {
    let engine = engine();

    let mut damaged = warmed("damaged.example.com", "Damaged", 100, 50);
    damaged.pause(PauseReason::HighBounceRate);
    damaged.last_counter_reset = Utc::now()
        .date_naive()
        .checked_sub_days(Days::new(1))
        .unwrap();
    let id = damaged.id;
    engine.register(damaged).await.unwrap();

    // The cool-down cycle ends with the daily reset
    let selected = engine.select(&SelectOptions::new()).await.unwrap();
    assert_eq!(selected.identity_id, id);
}

#[tokio::test]
async fn test_summary_reports_capacity_and_pause_state() {
    let engine = engine();

    let live = warmed("live.example.com", "Live", 100, 30);
    let live_id = live.id;
    let mut paused = warmed("paused.example.com", "Paused", 100, 0);
    paused.pause(PauseReason::Manual);
    let paused_id = paused.id;

    engine.register(live).await.unwrap();
    engine.register(paused).await.unwrap();

    let summary = engine.summary().await.unwrap();
    assert_eq!(summary.len(), 2);

    let live = &summary[&live_id];
    assert_eq!(live.sent_today, 30);
    assert_eq!(live.effective_cap, 100);
    assert_eq!(live.remaining_capacity, 70);
    assert!(!live.is_paused);
    assert_eq!(live.throttle_delay_ms, 30_000);

    let paused = &summary[&paused_id];
    assert!(paused.is_paused);
    assert_eq!(paused.pause_reason, Some(PauseReason::Manual));
}

#[tokio::test]
async fn test_operator_pause_and_resume() {
    let engine = engine();
    let identity = warmed("ops.example.com", "Ops", 100, 0);
    let id = identity.id;
    engine.register(identity).await.unwrap();

    engine.pause(&id, PauseReason::Manual).await.unwrap();
    assert!(engine.select(&SelectOptions::new()).await.is_err());

    engine.resume(&id).await.unwrap();
    assert!(engine.select(&SelectOptions::new()).await.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_outcomes_lose_no_counts() {
    let engine = engine();
    let identity = warmed("hot.example.com", "Hot", 10_000, 0);
    let id = identity.id;
    engine.register(identity).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..25 {
                engine.record_outcome(&id, SendOutcome::Sent).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let current = engine.state_store().get(&id).await.unwrap().unwrap();
    assert_eq!(current.sent_today, 200);
}

#[tokio::test]
async fn test_deterministic_tie_break() {
    let engine = engine();

    let first = warmed("tie-a.example.com", "Tie A", 100, 0);
    let second = warmed("tie-b.example.com", "Tie B", 100, 0);
    let winner = first.id.min(second.id);

    engine.register(first).await.unwrap();
    engine.register(second).await.unwrap();

    // Equal remaining capacity: the lower id must win every time
    for _ in 0..5 {
        let selected = engine.select(&SelectOptions::new()).await.unwrap();
        assert_eq!(selected.identity_id, winner);
    }
}
