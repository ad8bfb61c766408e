//! In-memory adapter implementing every persistence port.
//!
//! Backs the test suite and the database-less development mode. Uniqueness
//! rules the relational schema would enforce are mirrored here so domain
//! code observes the same conflicts either way.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::audit::Audit;
use crate::domain::clinical::{Observation, Procedure};
use crate::domain::communication::{
    Communication, CommunicationRequest, CommunicationStatus, RequestStatus,
};
use crate::domain::consent::{ConsentStatus, StudyId, UserConsent};
use crate::domain::identity::{User, UserId};
use crate::domain::intervention::{AccessStrategy, Intervention, UserIntervention};
use crate::domain::oauth::{Client, Grant, Token};
use crate::domain::organization::{Organization, OrganizationId};
use crate::domain::ports::{
    AuditLog, CatalogRepository, ClinicalRepository, CommunicationRepository, ConsentRepository,
    InterventionRepository, OAuthStore, QuestionnaireRepository, ResponseRepository, StoreError,
    TaskQueue, TimelineRepository, UserRepository,
};
use crate::domain::protocol::{OrgProtocolRow, ProtocolId, ResearchProtocol};
use crate::domain::questionnaire::{InterventionId, Questionnaire, QuestionnaireBank};
use crate::domain::response::QuestionnaireResponse;
use crate::domain::task::Task;
use crate::domain::timeline::QbTimelineRow;

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    user_organizations: HashMap<i64, Vec<OrganizationId>>,
    sponsorships: HashMap<i64, Vec<UserId>>,
    consents: Vec<UserConsent>,
    observations: Vec<Observation>,
    procedures: Vec<Procedure>,
    organizations: Vec<Organization>,
    protocol_rows: Vec<OrgProtocolRow>,
    protocols: Vec<ResearchProtocol>,
    questionnaires: Vec<Questionnaire>,
    banks: Vec<Arc<QuestionnaireBank>>,
    responses: Vec<QuestionnaireResponse>,
    timelines: HashMap<(i64, i64), Vec<QbTimelineRow>>,
    requests: Vec<CommunicationRequest>,
    communications: Vec<Communication>,
    clients: Vec<Client>,
    grants: Vec<Grant>,
    tokens: Vec<Token>,
    interventions: Vec<Intervention>,
    user_interventions: Vec<UserIntervention>,
    strategies: HashMap<i64, Vec<AccessStrategy>>,
    audits: Vec<Audit>,
    tasks: Vec<Task>,
    claimed_tasks: HashSet<i64>,
    next_id: i64,
}

impl Inner {
    fn assign_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Shared in-memory store. Cloneable handle; all clones see one state.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Seed a user together with its organization associations.
    pub fn seed_user(&self, user: User, organizations: Vec<OrganizationId>) {
        let mut inner = self.lock();
        inner.user_organizations.insert(user.id.value(), organizations);
        inner.users.retain(|u| u.id != user.id);
        inner.users.push(user);
    }

    /// Record that `sponsor` sponsors `service_user` as a service account.
    pub fn seed_sponsorship(&self, sponsor: UserId, service_user: UserId) {
        self.lock()
            .sponsorships
            .entry(sponsor.value())
            .or_default()
            .push(service_user);
    }

    /// Seed a questionnaire definition.
    pub fn seed_questionnaire(&self, questionnaire: Questionnaire) {
        self.lock().questionnaires.push(questionnaire);
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.id == id && !u.deleted)
            .cloned())
    }

    async fn find_by_identifier(
        &self,
        system: &str,
        value: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| {
                !u.deleted
                    && u.identifiers
                        .iter()
                        .any(|i| i.system == system && i.value == value)
            })
            .cloned())
    }

    async fn save(&self, user: User) -> Result<User, StoreError> {
        let mut inner = self.lock();
        for other in &inner.users {
            if other.id == user.id {
                continue;
            }
            for identifier in &user.identifiers {
                if other.identifiers.contains(identifier) {
                    return Err(StoreError::conflict(format!(
                        "identifier {}|{} already belongs to user {}",
                        identifier.system, identifier.value, other.id
                    )));
                }
            }
        }
        inner.users.retain(|u| u.id != user.id);
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn organizations_of(&self, user: UserId) -> Result<Vec<OrganizationId>, StoreError> {
        Ok(self
            .lock()
            .user_organizations
            .get(&user.value())
            .cloned()
            .unwrap_or_default())
    }

    async fn sponsored_service_users(&self, sponsor: UserId) -> Result<Vec<UserId>, StoreError> {
        Ok(self
            .lock()
            .sponsorships
            .get(&sponsor.value())
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ConsentRepository for MemoryStore {
    async fn consents_for(&self, user: UserId) -> Result<Vec<UserConsent>, StoreError> {
        Ok(self
            .lock()
            .consents
            .iter()
            .filter(|c| c.user_id == user)
            .cloned()
            .collect())
    }

    async fn latest_for_study(
        &self,
        user: UserId,
        study: StudyId,
    ) -> Result<Option<UserConsent>, StoreError> {
        Ok(self
            .lock()
            .consents
            .iter()
            .filter(|c| {
                c.user_id == user && c.study_id == study && c.status != ConsentStatus::Deleted
            })
            .max_by_key(|c| (c.acceptance_date, c.id))
            .cloned())
    }

    async fn save(&self, mut consent: UserConsent) -> Result<UserConsent, StoreError> {
        let mut inner = self.lock();
        if consent.id == 0 {
            consent.id = inner.assign_id();
        }
        inner.consents.retain(|c| c.id != consent.id);
        inner.consents.push(consent.clone());
        Ok(consent)
    }
}

#[async_trait]
impl ClinicalRepository for MemoryStore {
    async fn observations_for(&self, user: UserId) -> Result<Vec<Observation>, StoreError> {
        Ok(self
            .lock()
            .observations
            .iter()
            .filter(|o| o.user_id == user)
            .cloned()
            .collect())
    }

    async fn procedures_for(&self, user: UserId) -> Result<Vec<Procedure>, StoreError> {
        Ok(self
            .lock()
            .procedures
            .iter()
            .filter(|p| p.user_id == user)
            .cloned()
            .collect())
    }

    async fn save_observation(
        &self,
        mut observation: Observation,
    ) -> Result<Observation, StoreError> {
        let mut inner = self.lock();
        if observation.id == 0 {
            observation.id = inner.assign_id();
        }
        inner.observations.retain(|o| o.id != observation.id);
        inner.observations.push(observation.clone());
        Ok(observation)
    }

    async fn save_procedure(&self, mut procedure: Procedure) -> Result<Procedure, StoreError> {
        let mut inner = self.lock();
        if procedure.id == 0 {
            procedure.id = inner.assign_id();
        }
        inner.procedures.retain(|p| p.id != procedure.id);
        inner.procedures.push(procedure.clone());
        Ok(procedure)
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn organizations(&self) -> Result<Vec<Organization>, StoreError> {
        Ok(self.lock().organizations.clone())
    }

    async fn protocol_rows(
        &self,
        org: OrganizationId,
    ) -> Result<Vec<OrgProtocolRow>, StoreError> {
        Ok(self
            .lock()
            .protocol_rows
            .iter()
            .filter(|r| r.organization_id == org)
            .cloned()
            .collect())
    }

    async fn protocols(&self) -> Result<Vec<ResearchProtocol>, StoreError> {
        Ok(self.lock().protocols.clone())
    }

    async fn save_organization(&self, org: Organization) -> Result<Organization, StoreError> {
        let mut inner = self.lock();
        inner.organizations.retain(|o| o.id != org.id);
        inner.organizations.push(org.clone());
        Ok(org)
    }

    async fn save_protocol_row(
        &self,
        row: OrgProtocolRow,
    ) -> Result<OrgProtocolRow, StoreError> {
        let mut inner = self.lock();
        if !inner.protocols.iter().any(|p| p.id == row.protocol_id) {
            inner.protocols.push(ResearchProtocol {
                id: row.protocol_id,
                name: format!("protocol-{}", row.protocol_id),
            });
        }
        inner
            .protocol_rows
            .retain(|r| !(r.organization_id == row.organization_id && r.protocol_id == row.protocol_id));
        inner.protocol_rows.push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl QuestionnaireRepository for MemoryStore {
    async fn questionnaire_by_name(
        &self,
        name: &str,
        system: Option<&str>,
    ) -> Result<Option<Questionnaire>, StoreError> {
        Ok(self
            .lock()
            .questionnaires
            .iter()
            .find(|q| {
                q.name == name
                    && system.is_none_or(|s| q.identifiers.iter().any(|i| i.system == s))
            })
            .cloned())
    }

    async fn banks(&self) -> Result<Vec<Arc<QuestionnaireBank>>, StoreError> {
        Ok(self.lock().banks.clone())
    }

    async fn banks_for_protocol(
        &self,
        protocol: ProtocolId,
    ) -> Result<Vec<Arc<QuestionnaireBank>>, StoreError> {
        Ok(self
            .lock()
            .banks
            .iter()
            .filter(|b| b.research_protocol_id == Some(protocol))
            .cloned()
            .collect())
    }

    async fn bank_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Arc<QuestionnaireBank>>, StoreError> {
        Ok(self.lock().banks.iter().find(|b| b.name == name).cloned())
    }

    async fn register_bank(
        &self,
        mut bank: QuestionnaireBank,
    ) -> Result<Arc<QuestionnaireBank>, StoreError> {
        let mut inner = self.lock();
        if inner.banks.iter().any(|b| b.name == bank.name) {
            return Err(StoreError::conflict(format!(
                "questionnaire bank {} already registered",
                bank.name
            )));
        }
        if bank.id.value() == 0 {
            bank.id = crate::domain::questionnaire::QuestionnaireBankId::new(inner.assign_id());
        }
        let bank = Arc::new(bank);
        inner.banks.push(Arc::clone(&bank));
        Ok(bank)
    }
}

#[async_trait]
impl ResponseRepository for MemoryStore {
    async fn responses_for(
        &self,
        user: UserId,
    ) -> Result<Vec<QuestionnaireResponse>, StoreError> {
        Ok(self
            .lock()
            .responses
            .iter()
            .filter(|r| r.user_id == user)
            .cloned()
            .collect())
    }

    async fn save(
        &self,
        mut response: QuestionnaireResponse,
    ) -> Result<QuestionnaireResponse, StoreError> {
        let mut inner = self.lock();
        if response.id == 0 {
            response.id = inner.assign_id();
        }
        inner.responses.retain(|r| r.id != response.id);
        inner.responses.push(response.clone());
        Ok(response)
    }
}

#[async_trait]
impl TimelineRepository for MemoryStore {
    async fn replace(
        &self,
        user: UserId,
        study: StudyId,
        rows: Vec<QbTimelineRow>,
    ) -> Result<(), StoreError> {
        self.lock()
            .timelines
            .insert((user.value(), study.value()), rows);
        Ok(())
    }

    async fn rows(
        &self,
        user: UserId,
        study: StudyId,
    ) -> Result<Vec<QbTimelineRow>, StoreError> {
        Ok(self
            .lock()
            .timelines
            .get(&(user.value(), study.value()))
            .cloned()
            .unwrap_or_default())
    }

    async fn users_with_bank(
        &self,
        qb_name: &str,
    ) -> Result<Vec<(UserId, StudyId)>, StoreError> {
        let inner = self.lock();
        let mut pairs: Vec<(UserId, StudyId)> = inner
            .timelines
            .iter()
            .filter(|(_, rows)| rows.iter().any(|r| r.qb_name == qb_name))
            .map(|((user, study), _)| (UserId::new(*user), StudyId::new(*study)))
            .collect();
        pairs.sort();
        Ok(pairs)
    }
}

#[async_trait]
impl CommunicationRepository for MemoryStore {
    async fn active_requests(&self) -> Result<Vec<CommunicationRequest>, StoreError> {
        Ok(self
            .lock()
            .requests
            .iter()
            .filter(|r| r.status == RequestStatus::Active)
            .cloned()
            .collect())
    }

    async fn communications_for(
        &self,
        user: UserId,
    ) -> Result<Vec<Communication>, StoreError> {
        Ok(self
            .lock()
            .communications
            .iter()
            .filter(|c| c.user_id == user)
            .cloned()
            .collect())
    }

    async fn insert(
        &self,
        mut communication: Communication,
    ) -> Result<Communication, StoreError> {
        let mut inner = self.lock();
        let clash = inner.communications.iter().any(|c| {
            c.user_id == communication.user_id
                && c.request_id == communication.request_id
                && c.qb_iteration == communication.qb_iteration
                && (c.status == CommunicationStatus::Completed
                    || c.status == communication.status)
        });
        if clash {
            return Err(StoreError::conflict(format!(
                "communication already recorded for user {} request {} iteration {}",
                communication.user_id, communication.request_id, communication.qb_iteration
            )));
        }
        communication.id = inner.assign_id();
        inner.communications.push(communication.clone());
        Ok(communication)
    }

    async fn update_status(
        &self,
        id: i64,
        status: CommunicationStatus,
        message_ref: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let Some(row) = inner.communications.iter_mut().find(|c| c.id == id) else {
            return Err(StoreError::not_found(format!("communication {id}")));
        };
        row.status = status;
        if message_ref.is_some() {
            row.message_ref = message_ref;
        }
        Ok(())
    }

    async fn save_request(
        &self,
        mut request: CommunicationRequest,
    ) -> Result<CommunicationRequest, StoreError> {
        let mut inner = self.lock();
        if request.id == 0 {
            request.id = inner.assign_id();
        }
        inner.requests.retain(|r| r.id != request.id);
        inner.requests.push(request.clone());
        Ok(request)
    }
}

#[async_trait]
impl InterventionRepository for MemoryStore {
    async fn by_name(&self, name: &str) -> Result<Option<Intervention>, StoreError> {
        Ok(self
            .lock()
            .interventions
            .iter()
            .find(|i| i.name == name)
            .cloned())
    }

    async fn by_id(&self, id: InterventionId) -> Result<Option<Intervention>, StoreError> {
        Ok(self.lock().interventions.iter().find(|i| i.id == id).cloned())
    }

    async fn save(&self, intervention: Intervention) -> Result<Intervention, StoreError> {
        let mut inner = self.lock();
        inner.interventions.retain(|i| i.id != intervention.id);
        inner.interventions.push(intervention.clone());
        Ok(intervention)
    }

    async fn user_row(
        &self,
        user: UserId,
        intervention: InterventionId,
    ) -> Result<Option<UserIntervention>, StoreError> {
        Ok(self
            .lock()
            .user_interventions
            .iter()
            .find(|r| r.user_id == user && r.intervention_id == intervention)
            .cloned())
    }

    async fn save_user_row(
        &self,
        row: UserIntervention,
    ) -> Result<UserIntervention, StoreError> {
        let mut inner = self.lock();
        inner
            .user_interventions
            .retain(|r| !(r.user_id == row.user_id && r.intervention_id == row.intervention_id));
        inner.user_interventions.push(row.clone());
        Ok(row)
    }

    async fn strategies_for(
        &self,
        intervention: InterventionId,
    ) -> Result<Vec<AccessStrategy>, StoreError> {
        Ok(self
            .lock()
            .strategies
            .get(&intervention.value())
            .cloned()
            .unwrap_or_default())
    }

    async fn append_strategy(
        &self,
        intervention: InterventionId,
        strategy: AccessStrategy,
    ) -> Result<AccessStrategy, StoreError> {
        self.lock()
            .strategies
            .entry(intervention.value())
            .or_default()
            .push(strategy.clone());
        Ok(strategy)
    }
}

#[async_trait]
impl OAuthStore for MemoryStore {
    async fn client(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        Ok(self
            .lock()
            .clients
            .iter()
            .find(|c| c.client_id == client_id)
            .cloned())
    }

    async fn clients(&self) -> Result<Vec<Client>, StoreError> {
        Ok(self.lock().clients.clone())
    }

    async fn save_client(&self, client: Client) -> Result<Client, StoreError> {
        let mut inner = self.lock();
        inner.clients.retain(|c| c.client_id != client.client_id);
        inner.clients.push(client.clone());
        Ok(client)
    }

    async fn insert_grant(&self, grant: Grant) -> Result<(), StoreError> {
        self.lock().grants.push(grant);
        Ok(())
    }

    async fn take_grant(&self, code: &str) -> Result<Option<Grant>, StoreError> {
        let mut inner = self.lock();
        let found = inner.grants.iter().position(|g| g.code == code);
        Ok(found.map(|index| inner.grants.remove(index)))
    }

    async fn tokens_for(
        &self,
        client_id: &str,
        user: UserId,
    ) -> Result<Vec<Token>, StoreError> {
        Ok(self
            .lock()
            .tokens
            .iter()
            .filter(|t| t.client_id == client_id && t.user_id == user)
            .cloned()
            .collect())
    }

    async fn token_by_access(&self, access_token: &str) -> Result<Option<Token>, StoreError> {
        Ok(self
            .lock()
            .tokens
            .iter()
            .find(|t| t.access_token == access_token)
            .cloned())
    }

    async fn insert_token(&self, token: Token) -> Result<(), StoreError> {
        self.lock().tokens.push(token);
        Ok(())
    }

    async fn delete_tokens(&self, client_id: &str, user: UserId) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let before = inner.tokens.len();
        inner
            .tokens
            .retain(|t| !(t.client_id == client_id && t.user_id == user));
        Ok((before - inner.tokens.len()) as u64)
    }

    async fn delete_user_tokens(&self, user: UserId) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let before = inner.tokens.len();
        inner.tokens.retain(|t| t.user_id != user);
        Ok((before - inner.tokens.len()) as u64)
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn append(&self, mut audit: Audit) -> Result<Audit, StoreError> {
        let mut inner = self.lock();
        audit.id = inner.assign_id();
        inner.audits.push(audit.clone());
        Ok(audit)
    }

    async fn for_subject(&self, user: UserId) -> Result<Vec<Audit>, StoreError> {
        Ok(self
            .lock()
            .audits
            .iter()
            .filter(|a| a.subject_user_id == user)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TaskQueue for MemoryStore {
    async fn enqueue(&self, mut task: Task) -> Result<Task, StoreError> {
        let mut inner = self.lock();
        task.id = inner.assign_id();
        inner.tasks.push(task.clone());
        Ok(task)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        let mut inner = self.lock();
        let mut due: Vec<Task> = Vec::new();
        let claimed: Vec<i64> = inner
            .tasks
            .iter()
            .filter(|t| t.next_attempt_at <= now && !inner.claimed_tasks.contains(&t.id))
            .take(limit)
            .map(|t| {
                due.push(t.clone());
                t.id
            })
            .collect();
        inner.claimed_tasks.extend(claimed);
        Ok(due)
    }

    async fn complete(&self, id: i64) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.tasks.retain(|t| t.id != id);
        inner.claimed_tasks.remove(&id);
        Ok(())
    }

    async fn reschedule(&self, task: Task) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.claimed_tasks.remove(&task.id);
        let Some(row) = inner.tasks.iter_mut().find(|t| t.id == task.id) else {
            return Err(StoreError::not_found(format!("task {}", task.id)));
        };
        *row = task;
        Ok(())
    }

    async fn abandon(&self, id: i64) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.tasks.retain(|t| t.id != id);
        inner.claimed_tasks.remove(&id);
        Ok(())
    }
}
