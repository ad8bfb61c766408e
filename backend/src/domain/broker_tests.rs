//! Broker coverage: the code flow, origin refusal with its access-context
//! audit trail, token replacement, service tokens, and callback fan-out.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use zeroize::Zeroizing;

use super::*;
use crate::domain::identity::User;
use crate::domain::oauth::token_ttl;
use crate::domain::ports::FixedClock;
use crate::domain::questionnaire::InterventionId;
use crate::domain::ErrorCode;
use crate::outbound::memory::MemoryStore;

const PATIENT: UserId = UserId::new(1);
const OWNER: UserId = UserId::new(50);
const SERVICE_USER: UserId = UserId::new(7);
const CLIENT_ID: &str = "decision_support";
const REDIRECT: &str = "https://intervention.example/cb";

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

struct Harness {
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    broker: OAuthBroker,
}

async fn harness(now: DateTime<Utc>) -> Harness {
    let store = MemoryStore::new();
    let clock = Arc::new(FixedClock::at(now));
    let broker = OAuthBroker::new(BrokerDeps {
        oauth: Arc::clone(&store) as Arc<dyn OAuthStore>,
        users: Arc::clone(&store) as Arc<dyn UserRepository>,
        consents: Arc::clone(&store) as Arc<dyn ConsentRepository>,
        interventions: Arc::clone(&store) as Arc<dyn InterventionRepository>,
        audit: Arc::clone(&store) as Arc<dyn AuditLog>,
        tasks: Arc::clone(&store) as Arc<dyn TaskQueue>,
        clock: Arc::clone(&clock) as Arc<dyn Clock>,
        trusted_origins: vec!["https://portal.example".to_owned()],
    });
    let h = Harness {
        store,
        clock,
        broker,
    };
    seed_client(&h).await;
    h
}

async fn seed_client(h: &Harness) {
    h.store.seed_user(User::with_id(PATIENT), Vec::new());
    h.store.seed_user(User::with_id(OWNER), Vec::new());
    h.store.seed_user(User::with_id(SERVICE_USER), Vec::new());
    h.store.seed_sponsorship(OWNER, SERVICE_USER);
    h.store
        .save_client(Client {
            client_id: CLIENT_ID.to_owned(),
            client_secret: Zeroizing::new("s3cret".to_owned()),
            redirect_origins: vec!["https://intervention.example".to_owned()],
            callback_url: Some("https://intervention.example/callback".to_owned()),
            owner_user_id: OWNER,
            intervention_id: Some(InterventionId::new(1)),
        })
        .await
        .expect("seed client");
    InterventionRepository::save(
        h.store.as_ref(),
        Intervention {
            id: InterventionId::new(1),
            name: CLIENT_ID.to_owned(),
            description: None,
            public_access: false,
            promote_granted_to_subscribed: false,
            card_html: None,
            link_url: None,
            status_text: None,
        },
    )
    .await
    .expect("seed intervention");
}

async fn full_code_flow(h: &Harness) -> Token {
    let grant = h
        .broker
        .authorize(PATIENT, CLIENT_ID, REDIRECT, vec!["email".to_owned()])
        .await
        .expect("authorize");
    h.broker
        .exchange(CLIENT_ID, "s3cret", &grant.code, REDIRECT)
        .await
        .expect("exchange")
}

#[tokio::test]
async fn codes_are_single_use() {
    let h = harness(at(2025, 1, 1)).await;
    let grant = h
        .broker
        .authorize(PATIENT, CLIENT_ID, REDIRECT, vec!["email".to_owned()])
        .await
        .expect("authorize");

    let token = h
        .broker
        .exchange(CLIENT_ID, "s3cret", &grant.code, REDIRECT)
        .await
        .expect("first exchange");
    assert_eq!(token.user_id, PATIENT);
    assert_eq!(token.scopes, vec!["email".to_owned()]);
    assert!(!token.service);

    let err = h
        .broker
        .exchange(CLIENT_ID, "s3cret", &grant.code, REDIRECT)
        .await
        .expect_err("replay refused");
    assert_eq!(err.code(), ErrorCode::Unauthorized);
}

#[tokio::test]
async fn foreign_redirect_origin_is_refused_and_audited() {
    let h = harness(at(2025, 1, 1)).await;
    let grant = h
        .broker
        .authorize(PATIENT, CLIENT_ID, REDIRECT, Vec::new())
        .await
        .expect("authorize");

    let err = h
        .broker
        .exchange(CLIENT_ID, "s3cret", &grant.code, "https://attacker.example/cb")
        .await
        .expect_err("foreign origin refused");
    assert_eq!(err.code(), ErrorCode::Unauthorized);

    let audits = h.store.for_subject(PATIENT).await.expect("audits");
    let refusal = audits
        .iter()
        .find(|a| a.context == AuditContext::Access)
        .expect("access-context entry");
    assert!(refusal
        .comment
        .as_deref()
        .expect("comment")
        .contains("attacker.example"));

    // The same check guards code issuance.
    let err = h
        .broker
        .authorize(PATIENT, CLIENT_ID, "https://attacker.example/cb", Vec::new())
        .await
        .expect_err("foreign origin refused at authorize");
    assert_eq!(err.code(), ErrorCode::Unauthorized);
}

#[tokio::test]
async fn reissue_replaces_the_previous_token() {
    let h = harness(at(2025, 1, 1)).await;
    let first = full_code_flow(&h).await;
    let second = full_code_flow(&h).await;
    assert_ne!(first.access_token, second.access_token);

    let live = h
        .store
        .tokens_for(CLIENT_ID, PATIENT)
        .await
        .expect("tokens");
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].access_token, second.access_token);
}

#[tokio::test]
async fn expired_codes_and_wrong_secrets_are_rejected() {
    let h = harness(at(2025, 1, 1)).await;
    let grant = h
        .broker
        .authorize(PATIENT, CLIENT_ID, REDIRECT, Vec::new())
        .await
        .expect("authorize");

    // A bad secret fails before the code is consumed.
    let err = h
        .broker
        .exchange(CLIENT_ID, "wrong", &grant.code, REDIRECT)
        .await
        .expect_err("secret mismatch");
    assert_eq!(err.code(), ErrorCode::Unauthorized);

    h.clock.advance(Duration::seconds(100));
    let err = h
        .broker
        .exchange(CLIENT_ID, "s3cret", &grant.code, REDIRECT)
        .await
        .expect_err("expired code");
    assert_eq!(err.code(), ErrorCode::Unauthorized);
}

#[tokio::test]
async fn service_tokens_are_sponsor_gated_and_single() {
    let h = harness(at(2025, 1, 1)).await;

    let err = h
        .broker
        .mint_service_token(PATIENT, CLIENT_ID, SERVICE_USER)
        .await
        .expect_err("non-owner refused");
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let err = h
        .broker
        .mint_service_token(OWNER, CLIENT_ID, PATIENT)
        .await
        .expect_err("unsponsored user refused");
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let token = h
        .broker
        .mint_service_token(OWNER, CLIENT_ID, SERVICE_USER)
        .await
        .expect("mint");
    assert!(token.service);
    assert!(token.scopes.is_empty());

    let err = h
        .broker
        .mint_service_token(OWNER, CLIENT_ID, SERVICE_USER)
        .await
        .expect_err("second mint refused");
    assert_eq!(err.code(), ErrorCode::Conflict);
}

#[tokio::test]
async fn authentication_prefers_the_session_then_verifies_bearers() {
    let h = harness(at(2025, 1, 1)).await;
    let token = full_code_flow(&h).await;

    let user = h
        .broker
        .authenticate(Some(PATIENT), None, &[])
        .await
        .expect("session wins");
    assert_eq!(user, PATIENT);

    let user = h
        .broker
        .authenticate(None, Some(&token.access_token), &["email".to_owned()])
        .await
        .expect("bearer accepted");
    assert_eq!(user, PATIENT);

    let err = h
        .broker
        .authenticate(None, Some(&token.access_token), &["admin".to_owned()])
        .await
        .expect_err("missing scope");
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let err = h
        .broker
        .authenticate(None, None, &[])
        .await
        .expect_err("no credentials");
    assert_eq!(err.code(), ErrorCode::Unauthorized);

    h.clock.advance(token_ttl());
    let err = h
        .broker
        .authenticate(None, Some(&token.access_token), &[])
        .await
        .expect_err("expired bearer");
    assert_eq!(err.code(), ErrorCode::Unauthorized);
}

#[tokio::test]
async fn display_decisions_challenge_deny_or_allow() {
    let h = harness(at(2025, 1, 1)).await;

    let decision = h
        .broker
        .display_decision(UserId::new(99), CLIENT_ID)
        .await
        .expect("unknown user");
    assert_eq!(decision, AccessDecision::Challenge("/oauth/authorize".to_owned()));

    let decision = h
        .broker
        .display_decision(PATIENT, CLIENT_ID)
        .await
        .expect("no strategy");
    assert!(matches!(decision, AccessDecision::Deny(_)));

    h.broker
        .append_access_rule(
            OWNER,
            CLIENT_ID,
            AccessStrategy {
                name: "everyone".to_owned(),
                rank: 0,
                kind: crate::domain::intervention::StrategyKind::AllowAll,
            },
        )
        .await
        .expect("append strategy");
    let decision = h
        .broker
        .display_decision(PATIENT, CLIENT_ID)
        .await
        .expect("matching strategy");
    assert_eq!(decision, AccessDecision::Allow);

    let err = h
        .broker
        .append_access_rule(
            OWNER,
            CLIENT_ID,
            AccessStrategy {
                name: "duplicate".to_owned(),
                rank: 0,
                kind: crate::domain::intervention::StrategyKind::NotDeceased,
            },
        )
        .await
        .expect_err("duplicate rank refused");
    assert_eq!(err.code(), ErrorCode::Conflict);
}

#[tokio::test]
async fn logout_fans_out_to_subscribers_and_revokes_tokens() {
    let h = harness(at(2025, 1, 1)).await;
    let _token = full_code_flow(&h).await;
    h.store
        .save_user_row(UserIntervention {
            user_id: PATIENT,
            intervention_id: InterventionId::new(1),
            access: InterventionAccess::Subscribed,
            card_html: None,
            link_url: None,
            status_text: None,
        })
        .await
        .expect("subscribe");

    let enqueued = h
        .broker
        .notify_event(CallbackEvent::Logout, PATIENT)
        .await
        .expect("notify");
    assert_eq!(enqueued, 1);

    let due = h
        .store
        .claim_due(h.clock.now(), 10)
        .await
        .expect("claim tasks");
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].kind, TaskKind::DeliverCallback);
    let job: CallbackJob = serde_json::from_value(due[0].payload.clone()).expect("job payload");
    assert_eq!(
        job,
        CallbackJob {
            client_id: CLIENT_ID.to_owned(),
            event: CallbackEvent::Logout,
            user_id: PATIENT,
        }
    );

    assert!(h
        .store
        .tokens_for(CLIENT_ID, PATIENT)
        .await
        .expect("tokens")
        .is_empty());

    // An unsubscribed user produces no delivery.
    let enqueued = h
        .broker
        .notify_event(CallbackEvent::Logout, SERVICE_USER)
        .await
        .expect("notify unsubscribed");
    assert_eq!(enqueued, 0);
}

#[tokio::test]
async fn origin_validation_spans_trusted_and_client_origins() {
    let h = harness(at(2025, 1, 1)).await;

    h.broker
        .validate_origin(PATIENT, "https://portal.example/next")
        .await
        .expect("server origin");
    h.broker
        .validate_origin(PATIENT, "https://intervention.example/deep/link")
        .await
        .expect("client origin");

    let err = h
        .broker
        .validate_origin(PATIENT, "https://attacker.example/next")
        .await
        .expect_err("unknown origin refused");
    assert_eq!(err.code(), ErrorCode::Unauthorized);
    let audits = h.store.for_subject(PATIENT).await.expect("audits");
    assert!(audits.iter().any(|a| a.context == AuditContext::Access));
}
