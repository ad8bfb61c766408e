//! Assessment service: composes the trigger resolver, timeline, and status
//! engine over the ports, and owns timeline persistence and invalidation.
//!
//! Refreshes of the materialised timeline are serialised per (user, study)
//! with an async keyed mutex so concurrent readers never interleave a
//! replace. Reads of a backdated instant recompute on the fly and leave the
//! persisted rows alone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::assessment::{assess, select_governing, AssessmentReport};
use super::audit::{Audit, AuditContext};
use super::consent::{ConsentOptions, StudyId, UserConsent};
use super::error::Error;
use super::identity::UserId;
use super::organization::{OrganizationId, OrgTree};
use super::ports::{
    AuditLog, CatalogRepository, ClinicalRepository, Clock, ConsentRepository,
    QuestionnaireRepository, ResponseRepository, TimelineCache, TimelineRepository,
    UserRepository,
};
use super::protocol::{protocol_epochs, ProtocolEpoch, ProtocolId};
use super::questionnaire::QuestionnaireBank;
use super::response::QuestionnaireResponse;
use super::timeline::{build_timeline, QbDescriptor, QbTimelineRow, TimelineState};
use super::trigger::{resolve_consent_trigger, TriggerDate};

/// Collaborators the service is built over.
pub struct AssessmentDeps {
    pub users: Arc<dyn UserRepository>,
    pub consents: Arc<dyn ConsentRepository>,
    pub clinical: Arc<dyn ClinicalRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub questionnaires: Arc<dyn QuestionnaireRepository>,
    pub responses: Arc<dyn ResponseRepository>,
    pub timelines: Arc<dyn TimelineRepository>,
    pub cache: Arc<dyn TimelineCache>,
    pub audit: Arc<dyn AuditLog>,
    pub clock: Arc<dyn Clock>,
}

type KeyedLocks = Mutex<HashMap<(i64, i64), Arc<tokio::sync::Mutex<()>>>>;

pub struct AssessmentService {
    users: Arc<dyn UserRepository>,
    consents: Arc<dyn ConsentRepository>,
    clinical: Arc<dyn ClinicalRepository>,
    catalog: Arc<dyn CatalogRepository>,
    questionnaires: Arc<dyn QuestionnaireRepository>,
    responses: Arc<dyn ResponseRepository>,
    timelines: Arc<dyn TimelineRepository>,
    cache: Arc<dyn TimelineCache>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    refresh_locks: KeyedLocks,
}

/// Everything needed to derive a report at one instant.
struct TimelineSnapshot {
    descriptors: Vec<QbDescriptor>,
    responses: Vec<QuestionnaireResponse>,
    withdrawn_at: Option<DateTime<Utc>>,
}

impl AssessmentService {
    pub fn new(deps: AssessmentDeps) -> Self {
        Self {
            users: deps.users,
            consents: deps.consents,
            clinical: deps.clinical,
            catalog: deps.catalog,
            questionnaires: deps.questionnaires,
            responses: deps.responses,
            timelines: deps.timelines,
            cache: deps.cache,
            audit: deps.audit,
            clock: deps.clock,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, user: UserId, study: StudyId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.refresh_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            locks
                .entry((user.value(), study.value()))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    async fn require_user(&self, user: UserId) -> Result<(), Error> {
        match self.users.find(user).await? {
            Some(found) if !found.deleted => Ok(()),
            _ => Err(Error::not_found(format!("user {user} does not exist"))),
        }
    }

    /// Protocol epochs of the user's top-level organization.
    async fn epochs_for(&self, user: UserId) -> Result<Vec<ProtocolEpoch>, Error> {
        let orgs = self.users.organizations_of(user).await?;
        let Some(first) = orgs.first().copied() else {
            return Ok(Vec::new());
        };
        let tree = OrgTree::build(self.catalog.organizations().await?)?;
        let top = tree.top_level(first)?;
        let rows = self.catalog.protocol_rows(top).await?;
        Ok(protocol_epochs(&rows)?)
    }

    /// Active or suspended consent governing one study, if any.
    async fn consent_for(
        &self,
        user: UserId,
        study: StudyId,
    ) -> Result<Option<UserConsent>, Error> {
        Ok(self.consents.latest_for_study(user, study).await?)
    }

    /// Resolve the trigger anchor for one (user, study).
    pub async fn trigger_for(
        &self,
        user: UserId,
        study: StudyId,
    ) -> Result<Option<TriggerDate>, Error> {
        let consent = self.consent_for(user, study).await?;
        let procedures = self.clinical.procedures_for(user).await?;
        Ok(resolve_consent_trigger(consent.as_ref(), &procedures))
    }

    async fn snapshot(
        &self,
        user: UserId,
        study: StudyId,
        as_of: DateTime<Utc>,
    ) -> Result<TimelineSnapshot, Error> {
        let consent = self.consent_for(user, study).await?;
        let withdrawn_at = consent.as_ref().and_then(|c| c.suspended_at);
        let procedures = self.clinical.procedures_for(user).await?;
        let trigger = resolve_consent_trigger(consent.as_ref(), &procedures);
        let responses = self.responses.responses_for(user).await?;
        let epochs = self.epochs_for(user).await?;

        let banks = self.questionnaires.banks().await?;
        let mut by_protocol: HashMap<ProtocolId, Vec<Arc<QuestionnaireBank>>> = HashMap::new();
        let mut by_name: HashMap<String, Arc<QuestionnaireBank>> = HashMap::new();
        for bank in banks {
            if let Some(protocol) = bank.research_protocol_id {
                by_protocol.entry(protocol).or_default().push(Arc::clone(&bank));
            }
            by_name.insert(bank.name.clone(), bank);
        }

        let descriptors = build_timeline(
            trigger.as_ref(),
            &epochs,
            as_of,
            &|protocol| by_protocol.get(&protocol).cloned().unwrap_or_default(),
            &|name| by_name.get(name).cloned(),
            &responses,
        );
        Ok(TimelineSnapshot {
            descriptors,
            responses,
            withdrawn_at,
        })
    }

    /// Full report for one (user, study, as_of) query.
    pub async fn assessment_status(
        &self,
        user: UserId,
        study: StudyId,
        as_of: DateTime<Utc>,
    ) -> Result<AssessmentReport, Error> {
        self.require_user(user).await?;
        let snapshot = self.snapshot(user, study, as_of).await?;
        let governing = select_governing(&snapshot.descriptors, &snapshot.responses, as_of)
            .ok_or_else(|| {
                Error::not_found("no scheduled questionnaire bank at the requested instant")
            })?;
        Ok(assess(
            governing,
            &snapshot.responses,
            as_of,
            snapshot.withdrawn_at,
        ))
    }

    /// Governing timeline row only, for registry-style introspection.
    pub async fn governing_row(
        &self,
        user: UserId,
        study: StudyId,
        as_of: DateTime<Utc>,
    ) -> Result<QbTimelineRow, Error> {
        self.require_user(user).await?;
        let snapshot = self.snapshot(user, study, as_of).await?;
        let governing = select_governing(&snapshot.descriptors, &snapshot.responses, as_of)
            .ok_or_else(|| {
                Error::not_found("no scheduled questionnaire bank at the requested instant")
            })?;
        let report = assess(governing, &snapshot.responses, as_of, snapshot.withdrawn_at);
        Ok(QbTimelineRow::from_descriptor(
            user,
            study,
            governing,
            report.overall_status.timeline_state(),
            as_of,
        ))
    }

    /// Recompute and persist the materialised timeline for one (user, study).
    ///
    /// Serialised per key; rebuilding an unchanged user replaces the rows
    /// with identical ones.
    pub async fn refresh_timeline(
        &self,
        user: UserId,
        study: StudyId,
    ) -> Result<Vec<QbTimelineRow>, Error> {
        let lock = self.lock_for(user, study);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let snapshot = self.snapshot(user, study, now).await?;
        let rows: Vec<QbTimelineRow> = snapshot
            .descriptors
            .iter()
            .map(|descriptor| {
                let state = if descriptor.start > now {
                    TimelineState::Unstarted
                } else {
                    assess(descriptor, &snapshot.responses, now, snapshot.withdrawn_at)
                        .overall_status
                        .timeline_state()
                };
                QbTimelineRow::from_descriptor(user, study, descriptor, state, now)
            })
            .collect();
        self.timelines.replace(user, study, rows.clone()).await?;
        self.cache.put(user, study, rows.clone());
        Ok(rows)
    }

    /// Cached read of the materialised timeline, refreshing on a miss.
    pub async fn timeline_rows(
        &self,
        user: UserId,
        study: StudyId,
    ) -> Result<Vec<QbTimelineRow>, Error> {
        self.require_user(user).await?;
        if let Some(rows) = self.cache.get(user, study) {
            return Ok(rows);
        }
        self.refresh_timeline(user, study).await
    }

    /// Persist a questionnaire response and invalidate the user's timeline.
    pub async fn submit_response(
        &self,
        actor: UserId,
        study: StudyId,
        response: QuestionnaireResponse,
    ) -> Result<QuestionnaireResponse, Error> {
        let user = response.user_id;
        self.require_user(user).await?;
        if self
            .questionnaires
            .questionnaire_by_name(&response.questionnaire_name, None)
            .await?
            .is_none()
        {
            return Err(Error::not_found(format!(
                "questionnaire {} is not registered",
                response.questionnaire_name
            )));
        }
        let saved = self.responses.save(response).await?;
        self.cache.invalidate(user);
        self.refresh_timeline(user, study).await?;
        self.audit
            .append(Audit::record(
                actor,
                user,
                AuditContext::Assessment,
                self.clock.now(),
                format!(
                    "questionnaire response for {} ({} iteration {})",
                    saved.questionnaire_name, saved.bank_ref.bank_name, saved.bank_ref.iteration
                ),
            ))
            .await?;
        Ok(saved)
    }

    /// Accept a consent, deactivating any active predecessor for the study.
    pub async fn accept_consent(
        &self,
        actor: UserId,
        user: UserId,
        organization: OrganizationId,
        study: StudyId,
        acceptance_date: DateTime<Utc>,
        options: ConsentOptions,
        agreement_url: String,
    ) -> Result<UserConsent, Error> {
        self.require_user(user).await?;
        if let Some(mut prior) = self.consent_for(user, study).await? {
            if prior.is_active() {
                prior.deactivate(actor)?;
                self.consents.save(prior).await?;
            }
        }
        let consent = UserConsent::accept(
            user,
            organization,
            study,
            acceptance_date,
            options,
            agreement_url,
        );
        let saved = self.consents.save(consent).await?;
        self.cache.invalidate(user);
        self.refresh_timeline(user, study).await?;
        self.audit
            .append(Audit::record(
                actor,
                user,
                AuditContext::Consent,
                self.clock.now(),
                format!("consent accepted for study {study}"),
            ))
            .await?;
        Ok(saved)
    }

    /// Withdraw the active consent, suspending the schedule at "now".
    pub async fn withdraw_consent(
        &self,
        actor: UserId,
        user: UserId,
        study: StudyId,
    ) -> Result<UserConsent, Error> {
        self.require_user(user).await?;
        let mut consent = self
            .consent_for(user, study)
            .await?
            .filter(UserConsent::is_active)
            .ok_or_else(|| {
                Error::not_found(format!("user {user} holds no active consent for study {study}"))
            })?;
        let now = self.clock.now();
        consent.withdraw(now)?;
        let saved = self.consents.save(consent).await?;
        self.cache.invalidate(user);
        self.refresh_timeline(user, study).await?;
        self.audit
            .append(Audit::record(
                actor,
                user,
                AuditContext::Consent,
                now,
                format!("consent withdrawn for study {study}"),
            ))
            .await?;
        Ok(saved)
    }

    /// Reverse a deceased marking through an explicit audited transition.
    pub async fn clear_deceased(&self, actor: UserId, user: UserId) -> Result<(), Error> {
        let mut record = self
            .users
            .find(user)
            .await?
            .filter(|u| !u.deleted)
            .ok_or_else(|| Error::not_found(format!("user {user} does not exist")))?;
        record.clear_deceased()?;
        self.users.save(record).await?;
        self.cache.invalidate(user);
        self.audit
            .append(Audit::record(
                actor,
                user,
                AuditContext::User,
                self.clock.now(),
                "deceased flag cleared",
            ))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "assessment_service_tests.rs"]
mod assessment_service_tests;
