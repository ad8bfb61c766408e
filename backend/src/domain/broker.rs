//! OAuth broker: authorization-code flow, service tokens, access-strategy
//! evaluation, origin validation, and callback fan-out.
//!
//! Token issuance is serialised per (client, user) so the one-token
//! invariant holds under concurrent exchanges. Callback delivery never runs
//! inline; the broker enqueues a persisted task for the worker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::audit::{Audit, AuditContext};
use super::error::Error;
use super::identity::UserId;
use super::intervention::{
    has_display_access, is_subscribed, AccessStrategy, Intervention, InterventionAccess,
    StrategyContext, UserIntervention,
};
use super::oauth::{
    grant_ttl, mint_secret, origin_registered, same_origin, service_token_ttl, token_ttl,
    AccessDecision, CallbackEvent, Client, Grant, Token,
};
use super::ports::{
    AuditLog, Clock, ConsentRepository, InterventionRepository, OAuthStore, TaskQueue,
    UserRepository,
};
use super::task::{Task, TaskKind};

/// Payload of one `deliver_callback` task. The worker signs at delivery
/// time so the client secret never sits in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackJob {
    pub client_id: String,
    pub event: CallbackEvent,
    pub user_id: UserId,
}

pub struct BrokerDeps {
    pub oauth: Arc<dyn OAuthStore>,
    pub users: Arc<dyn UserRepository>,
    pub consents: Arc<dyn ConsentRepository>,
    pub interventions: Arc<dyn InterventionRepository>,
    pub audit: Arc<dyn AuditLog>,
    pub tasks: Arc<dyn TaskQueue>,
    pub clock: Arc<dyn Clock>,
    /// Origins trusted besides registered client origins: the server's own
    /// public origin plus the configured CORS whitelist.
    pub trusted_origins: Vec<String>,
}

type IssuanceLocks = Mutex<HashMap<(String, i64), Arc<tokio::sync::Mutex<()>>>>;

pub struct OAuthBroker {
    oauth: Arc<dyn OAuthStore>,
    users: Arc<dyn UserRepository>,
    consents: Arc<dyn ConsentRepository>,
    interventions: Arc<dyn InterventionRepository>,
    audit: Arc<dyn AuditLog>,
    tasks: Arc<dyn TaskQueue>,
    clock: Arc<dyn Clock>,
    trusted_origins: Vec<String>,
    issuance_locks: IssuanceLocks,
}

impl OAuthBroker {
    pub fn new(deps: BrokerDeps) -> Self {
        Self {
            oauth: deps.oauth,
            users: deps.users,
            consents: deps.consents,
            interventions: deps.interventions,
            audit: deps.audit,
            tasks: deps.tasks,
            clock: deps.clock,
            trusted_origins: deps.trusted_origins,
            issuance_locks: Mutex::new(HashMap::new()),
        }
    }

    fn issuance_lock(&self, client_id: &str, user: UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.issuance_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            locks
                .entry((client_id.to_owned(), user.value()))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    async fn require_client(&self, client_id: &str) -> Result<Client, Error> {
        self.oauth
            .client(client_id)
            .await?
            .ok_or_else(|| Error::unauthorized("unknown client"))
    }

    /// Record a refused origin in the access context before failing.
    async fn refuse_origin(&self, user: UserId, candidate: &str) -> Result<Error, Error> {
        self.audit
            .append(Audit::record(
                user,
                user,
                AuditContext::Access,
                self.clock.now(),
                format!("origin refused: {candidate}"),
            ))
            .await?;
        Ok(Error::unauthorized("redirect origin is not registered"))
    }

    /// Mint a single-use authorization code for an authenticated session.
    pub async fn authorize(
        &self,
        user: UserId,
        client_id: &str,
        redirect_uri: &str,
        scopes: Vec<String>,
    ) -> Result<Grant, Error> {
        let client = self.require_client(client_id).await?;
        if !origin_registered(&client.redirect_origins, redirect_uri) {
            return Err(self.refuse_origin(user, redirect_uri).await?);
        }
        let now = self.clock.now();
        let grant = Grant {
            code: mint_secret(40),
            client_id: client.client_id.clone(),
            user_id: user,
            scopes,
            redirect_uri: redirect_uri.to_owned(),
            expires: now + grant_ttl(),
        };
        self.oauth.insert_grant(grant.clone()).await?;
        self.audit
            .append(Audit::record(
                user,
                user,
                AuditContext::Authentication,
                now,
                format!("authorization code issued to {client_id}"),
            ))
            .await?;
        Ok(grant)
    }

    /// Exchange a code for a bearer token, replacing any predecessor for
    /// the same (client, user).
    pub async fn exchange(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Token, Error> {
        let client = self.require_client(client_id).await?;
        if client.client_secret.as_str() != client_secret {
            return Err(Error::unauthorized("client secret mismatch"));
        }
        let now = self.clock.now();
        let grant = self
            .oauth
            .take_grant(code)
            .await?
            .ok_or_else(|| Error::unauthorized("unknown or already exchanged code"))?;
        if grant.client_id != client_id {
            return Err(Error::unauthorized("code was issued to a different client"));
        }
        if !origin_registered(&client.redirect_origins, redirect_uri) {
            return Err(self.refuse_origin(grant.user_id, redirect_uri).await?);
        }
        if !same_origin(&grant.redirect_uri, redirect_uri) {
            return Err(self.refuse_origin(grant.user_id, redirect_uri).await?);
        }
        if grant.is_expired(now) {
            return Err(Error::unauthorized("authorization code expired"));
        }

        let lock = self.issuance_lock(client_id, grant.user_id);
        let _guard = lock.lock().await;
        self.oauth.delete_tokens(client_id, grant.user_id).await?;
        let token = Token {
            access_token: mint_secret(32),
            refresh_token: mint_secret(32),
            client_id: client_id.to_owned(),
            user_id: grant.user_id,
            scopes: grant.scopes,
            expires: now + token_ttl(),
            service: false,
        };
        self.oauth.insert_token(token.clone()).await?;
        self.audit
            .append(Audit::record(
                grant.user_id,
                grant.user_id,
                AuditContext::Authentication,
                now,
                format!("access token issued to {client_id}"),
            ))
            .await?;
        Ok(token)
    }

    /// Mint a long-lived token for a sponsor-owned service account. At most
    /// one live service token per (client, user).
    pub async fn mint_service_token(
        &self,
        actor: UserId,
        client_id: &str,
        service_user: UserId,
    ) -> Result<Token, Error> {
        let client = self.require_client(client_id).await?;
        if client.owner_user_id != actor {
            return Err(Error::forbidden("only the client owner may mint service tokens"));
        }
        let sponsored = self.users.sponsored_service_users(actor).await?;
        if !sponsored.contains(&service_user) {
            return Err(Error::forbidden(format!(
                "user {service_user} is not sponsored by the client owner"
            )));
        }
        let now = self.clock.now();
        let lock = self.issuance_lock(client_id, service_user);
        let _guard = lock.lock().await;
        let existing = self.oauth.tokens_for(client_id, service_user).await?;
        if existing.iter().any(|t| t.service && !t.is_expired(now)) {
            return Err(Error::conflict("a service token is already issued"));
        }
        let token = Token {
            access_token: mint_secret(32),
            refresh_token: mint_secret(32),
            client_id: client_id.to_owned(),
            user_id: service_user,
            scopes: Vec::new(),
            expires: now + service_token_ttl(),
            service: true,
        };
        self.oauth.insert_token(token.clone()).await?;
        self.audit
            .append(Audit::record(
                actor,
                service_user,
                AuditContext::Authentication,
                now,
                format!("service token issued to {client_id}"),
            ))
            .await?;
        Ok(token)
    }

    /// Resolve the acting user: an authenticated portal session wins (the
    /// local-login backdoor), otherwise the bearer token must verify.
    pub async fn authenticate(
        &self,
        session_user: Option<UserId>,
        bearer: Option<&str>,
        scopes: &[String],
    ) -> Result<UserId, Error> {
        if let Some(user) = session_user {
            return Ok(user);
        }
        let bearer = bearer.ok_or_else(|| Error::unauthorized("credentials required"))?;
        let now = self.clock.now();
        let token = self
            .oauth
            .token_by_access(bearer)
            .await?
            .ok_or_else(|| Error::unauthorized("unknown bearer token"))?;
        if token.is_expired(now) {
            return Err(Error::unauthorized("bearer token expired"));
        }
        if !token.covers(scopes) {
            return Err(Error::forbidden("token lacks a required scope"));
        }
        Ok(token.user_id)
    }

    /// Display-access evaluation for one (user, intervention).
    pub async fn display_decision(
        &self,
        user: UserId,
        intervention_name: &str,
    ) -> Result<AccessDecision, Error> {
        let intervention = self.require_intervention(intervention_name).await?;
        let Some(record) = self.users.find(user).await? else {
            return Ok(AccessDecision::Challenge("/oauth/authorize".to_owned()));
        };
        let organizations = self.users.organizations_of(user).await?;
        let consents = self.consents.consents_for(user).await?;
        let ctx = StrategyContext::for_user(&record, organizations, consents);
        let user_row = self.interventions.user_row(user, intervention.id).await?;
        let strategies = self.interventions.strategies_for(intervention.id).await?;
        if has_display_access(&intervention, user_row.as_ref(), &strategies, &ctx) {
            Ok(AccessDecision::Allow)
        } else {
            Ok(AccessDecision::Deny("no matching access strategy".to_owned()))
        }
    }

    async fn require_intervention(&self, name: &str) -> Result<Intervention, Error> {
        self.interventions
            .by_name(name)
            .await?
            .ok_or_else(|| Error::not_found(format!("intervention {name} is not registered")))
    }

    /// Validate a caller-supplied URL against the trusted-origin union:
    /// server origin, CORS whitelist, and every registered client origin.
    pub async fn validate_origin(&self, actor: UserId, url: &str) -> Result<(), Error> {
        if origin_registered(&self.trusted_origins, url) {
            return Ok(());
        }
        let clients = self.oauth.clients().await?;
        let known = clients
            .iter()
            .any(|c| origin_registered(&c.redirect_origins, url));
        if known {
            return Ok(());
        }
        Err(self.refuse_origin(actor, url).await?)
    }

    /// Update the per-user row for one intervention. A supplied link URL
    /// must validate as a known origin.
    pub async fn set_user_access(
        &self,
        actor: UserId,
        intervention_name: &str,
        subject: UserId,
        access: InterventionAccess,
        card_html: Option<String>,
        link_url: Option<String>,
        status_text: Option<String>,
    ) -> Result<UserIntervention, Error> {
        let intervention = self.require_intervention(intervention_name).await?;
        if self.users.find(subject).await?.is_none() {
            return Err(Error::not_found(format!("user {subject} does not exist")));
        }
        if let Some(url) = link_url.as_deref() {
            self.validate_origin(actor, url).await?;
        }
        let row = UserIntervention {
            user_id: subject,
            intervention_id: intervention.id,
            access,
            card_html,
            link_url,
            status_text,
        };
        let saved = self.interventions.save_user_row(row).await?;
        self.audit
            .append(Audit::record(
                actor,
                subject,
                AuditContext::Intervention,
                self.clock.now(),
                format!("intervention {intervention_name} access set"),
            ))
            .await?;
        Ok(saved)
    }

    /// Append a ranked access strategy to an intervention.
    pub async fn append_access_rule(
        &self,
        actor: UserId,
        intervention_name: &str,
        strategy: AccessStrategy,
    ) -> Result<AccessStrategy, Error> {
        let intervention = self.require_intervention(intervention_name).await?;
        let existing = self.interventions.strategies_for(intervention.id).await?;
        if existing.iter().any(|s| s.rank == strategy.rank) {
            return Err(Error::conflict(format!(
                "intervention {intervention_name} already has a strategy at rank {}",
                strategy.rank
            )));
        }
        let saved = self
            .interventions
            .append_strategy(intervention.id, strategy)
            .await?;
        self.audit
            .append(Audit::record(
                actor,
                actor,
                AuditContext::Intervention,
                self.clock.now(),
                format!("access rule appended to {intervention_name}"),
            ))
            .await?;
        Ok(saved)
    }

    /// Fan an event out to every subscribed client with a callback URL.
    /// Delivery happens on the worker; a logout also revokes the user's
    /// tokens immediately.
    pub async fn notify_event(&self, event: CallbackEvent, user: UserId) -> Result<usize, Error> {
        let now = self.clock.now();
        let mut enqueued = 0;
        for client in self.oauth.clients().await? {
            if client.callback_url.is_none() {
                continue;
            }
            let Some(intervention_id) = client.intervention_id else {
                continue;
            };
            let Some(intervention) = self.interventions.by_id(intervention_id).await? else {
                continue;
            };
            let user_row = self.interventions.user_row(user, intervention_id).await?;
            if !is_subscribed(&intervention, user_row.as_ref()) {
                continue;
            }
            let job = CallbackJob {
                client_id: client.client_id.clone(),
                event,
                user_id: user,
            };
            let payload = serde_json::to_value(&job)
                .map_err(|e| Error::internal(format!("callback job serialisation failed: {e}")))?;
            self.tasks
                .enqueue(Task::new(TaskKind::DeliverCallback, payload, now))
                .await?;
            enqueued += 1;
        }
        if event == CallbackEvent::Logout {
            self.oauth.delete_user_tokens(user).await?;
        }
        Ok(enqueued)
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod broker_tests;
