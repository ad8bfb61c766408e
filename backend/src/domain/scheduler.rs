//! Communication scheduler: emits at-most-once reminder messages for due
//! questionnaire work.
//!
//! `tick()` is idempotent. The at-most-once rule rests on the communication
//! store's uniqueness constraint for completed rows per (user, request,
//! iteration); a concurrent tick losing that race records nothing extra.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use super::assessment::OverallStatus;
use super::audit::{Audit, AuditContext};
use super::communication::{Communication, CommunicationRequest, CommunicationStatus, RequestStatus};
use super::consent::StudyId;
use super::error::Error;
use super::identity::{User, UserId};
use super::organization::OrgTree;
use super::ports::{
    AuditLog, CatalogRepository, Clock, CommunicationRepository, ConsentRepository, Mailer,
    MessageTemplates, StoreError, TimelineRepository, UserRepository,
};
use super::assessment_service::AssessmentService;

/// Locale applied when neither the user nor any ancestor organization sets
/// one.
const DEFAULT_LOCALE: &str = "en";

pub struct SchedulerDeps {
    pub assessments: Arc<AssessmentService>,
    pub communications: Arc<dyn CommunicationRepository>,
    pub timelines: Arc<dyn TimelineRepository>,
    pub users: Arc<dyn UserRepository>,
    pub consents: Arc<dyn ConsentRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub templates: Arc<dyn MessageTemplates>,
    pub mailer: Arc<dyn Mailer>,
    pub audit: Arc<dyn AuditLog>,
    pub clock: Arc<dyn Clock>,
}

/// Counters from one scheduler pass, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub emitted: usize,
    pub suspended: usize,
    pub skipped: usize,
}

pub struct CommunicationScheduler {
    assessments: Arc<AssessmentService>,
    communications: Arc<dyn CommunicationRepository>,
    timelines: Arc<dyn TimelineRepository>,
    users: Arc<dyn UserRepository>,
    consents: Arc<dyn ConsentRepository>,
    catalog: Arc<dyn CatalogRepository>,
    templates: Arc<dyn MessageTemplates>,
    mailer: Arc<dyn Mailer>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
}

impl CommunicationScheduler {
    pub fn new(deps: SchedulerDeps) -> Self {
        Self {
            assessments: deps.assessments,
            communications: deps.communications,
            timelines: deps.timelines,
            users: deps.users,
            consents: deps.consents,
            catalog: deps.catalog,
            templates: deps.templates,
            mailer: deps.mailer,
            audit: deps.audit,
            clock: deps.clock,
        }
    }

    /// One scheduler pass over every active request.
    pub async fn tick(&self) -> Result<TickSummary, Error> {
        let now = self.clock.now();
        let mut summary = TickSummary::default();

        let requests = self.communications.active_requests().await?;
        let mut by_target: HashMap<(String, u32), Vec<CommunicationRequest>> = HashMap::new();
        for request in requests {
            if request.status != RequestStatus::Active {
                continue;
            }
            by_target
                .entry((request.qb_name.clone(), request.qb_iteration))
                .or_default()
                .push(request);
        }

        for ((qb_name, iteration), mut group) in by_target {
            // Largest notify offset first: when several requests qualify at
            // once, the latest one wins and earlier ones are suspended.
            group.sort_by_key(|r| std::cmp::Reverse(fires_offset(r)));
            let pairs = self.timelines.users_with_bank(&qb_name).await?;
            for (user, study) in pairs {
                self.process_user(&mut summary, &group, &qb_name, iteration, user, study, now)
                    .await?;
            }
        }
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_user(
        &self,
        summary: &mut TickSummary,
        group: &[CommunicationRequest],
        qb_name: &str,
        iteration: u32,
        user: UserId,
        study: StudyId,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let rows = self.timelines.rows(user, study).await?;
        let Some(row) = rows
            .iter()
            .find(|r| r.qb_name == qb_name && r.iteration == iteration)
        else {
            return Ok(());
        };

        let due: Vec<&CommunicationRequest> = group
            .iter()
            .filter(|r| now >= r.fires_at(row.start))
            .collect();
        let Some(winner) = due.first() else {
            return Ok(());
        };

        let existing = self.communications.communications_for(user).await?;
        let completed_already = existing.iter().any(|c| {
            c.request_id == winner.id
                && c.qb_iteration == iteration
                && c.status == CommunicationStatus::Completed
        });
        if completed_already {
            summary.skipped += 1;
            return Ok(());
        }

        // Work already finished: nothing to remind about. Pending rows are
        // parked so later ticks stop retrying them.
        let status = self
            .assessments
            .assessment_status(user, study, now)
            .await
            .map(|report| report.overall_status)
            .unwrap_or(OverallStatus::Expired);
        if matches!(status, OverallStatus::Completed | OverallStatus::Withdrawn) {
            for pending in existing.iter().filter(|c| {
                c.qb_iteration == iteration && c.status == CommunicationStatus::Preparation
            }) {
                self.communications
                    .update_status(pending.id, CommunicationStatus::Suspended, None)
                    .await?;
                summary.suspended += 1;
            }
            return Ok(());
        }

        let Some(recipient) = self.reminder_recipient(user, study).await? else {
            summary.skipped += 1;
            return Ok(());
        };

        // Losing requests are recorded suspended so the per-iteration
        // at-most-once bookkeeping stays visible.
        for loser in &due[1..] {
            let seen = existing
                .iter()
                .any(|c| c.request_id == loser.id && c.qb_iteration == iteration);
            if !seen {
                self.communications
                    .insert(Communication {
                        id: 0,
                        user_id: user,
                        request_id: loser.id,
                        qb_iteration: iteration,
                        status: CommunicationStatus::Suspended,
                        message_ref: None,
                    })
                    .await?;
                summary.suspended += 1;
            }
        }

        let pending = existing.iter().find(|c| {
            c.request_id == winner.id
                && c.qb_iteration == iteration
                && c.status == CommunicationStatus::Preparation
        });
        let communication = match pending {
            Some(found) => found.clone(),
            None => {
                match self
                    .communications
                    .insert(Communication {
                        id: 0,
                        user_id: user,
                        request_id: winner.id,
                        qb_iteration: iteration,
                        status: CommunicationStatus::Preparation,
                        message_ref: None,
                    })
                    .await
                {
                    Ok(created) => created,
                    // A concurrent tick claimed this slot.
                    Err(StoreError::Conflict(_)) => {
                        summary.skipped += 1;
                        return Ok(());
                    }
                    Err(other) => return Err(other.into()),
                }
            }
        };

        let locale = self.locale_for(user).await?;
        let message = self.templates.render(
            &winner.template,
            &locale,
            &serde_json::json!({
                "recipient": recipient,
                "qb_name": qb_name,
                "iteration": iteration,
                "due": row.due,
                "expired": row.expired,
            }),
        );
        let message = match message {
            Ok(rendered) => rendered,
            Err(err) => {
                // Leave the row in preparation; the next tick retries.
                tracing::warn!(user = %user, template = %winner.template, error = %err, "reminder render failed");
                return Ok(());
            }
        };

        match self.mailer.send(&message).await {
            Ok(()) => {
                self.communications
                    .update_status(
                        communication.id,
                        CommunicationStatus::Completed,
                        Some(format!("{}:{}", winner.template, message.recipient)),
                    )
                    .await?;
                self.audit
                    .append(Audit::record(
                        user,
                        user,
                        AuditContext::Other,
                        now,
                        format!("reminder sent for {qb_name} iteration {iteration}"),
                    ))
                    .await?;
                summary.emitted += 1;
            }
            Err(err) => {
                tracing::warn!(user = %user, error = %err, "reminder dispatch failed; left in preparation");
            }
        }
        Ok(())
    }

    /// Deliverable address, gated by consent options and the deceased flag.
    async fn reminder_recipient(
        &self,
        user: UserId,
        study: StudyId,
    ) -> Result<Option<String>, Error> {
        let consent = self.consents.latest_for_study(user, study).await?;
        let reminders_on = consent
            .as_ref()
            .is_some_and(|c| c.is_active() && c.options.send_reminders());
        if !reminders_on {
            return Ok(None);
        }
        let Some(record) = self.users.find(user).await? else {
            return Ok(None);
        };
        if record.deceased || record.deleted {
            return Ok(None);
        }
        Ok(record.deliverable_email().map(str::to_owned))
    }

    async fn locale_for(&self, user: UserId) -> Result<String, Error> {
        let record = self.users.find(user).await?;
        if let Some(locale) = record.as_ref().and_then(|u: &User| u.locale.clone()) {
            return Ok(locale);
        }
        let orgs = self.users.organizations_of(user).await?;
        if let Some(first) = orgs.first().copied() {
            let tree = OrgTree::build(self.catalog.organizations().await?)?;
            if let Some(locale) = tree.inherited_locale(first) {
                return Ok(locale.to_owned());
            }
        }
        Ok(DEFAULT_LOCALE.to_owned())
    }
}

/// Stable ordering key for notify offsets: the offset applied to a fixed
/// epoch. Valid because recur-safe deltas are associative.
fn fires_offset(request: &CommunicationRequest) -> DateTime<Utc> {
    let epoch = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).single().unwrap_or_default();
    request.notify_post_qb_start.apply(epoch)
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod scheduler_tests;
