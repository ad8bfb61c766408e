//! Row types and their mappings to domain values.
//!
//! Every table gets a `Queryable` row struct plus, where the primary key is
//! assigned by the database, an insertable `New*` struct without the id.
//! Nested shapes travel as `jsonb`; enumerations travel as their serde wire
//! strings. Mapping functions are free functions so they unit test without
//! a database.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use zeroize::Zeroizing;

use super::schema;
use crate::domain::audit::Audit;
use crate::domain::clinical::Observation;
use crate::domain::clinical::Procedure;
use crate::domain::communication::{Communication, CommunicationRequest};
use crate::domain::consent::{ConsentOptions, StudyId, UserConsent};
use crate::domain::identity::{User, UserId};
use crate::domain::intervention::{AccessStrategy, Intervention, UserIntervention};
use crate::domain::oauth::{Client, Grant, Token};
use crate::domain::organization::{Organization, OrganizationId};
use crate::domain::ports::StoreError;
use crate::domain::protocol::{OrgProtocolRow, ProtocolId, ResearchProtocol};
use crate::domain::questionnaire::{
    InterventionId, Questionnaire, QuestionnaireBank, QuestionnaireBankId,
};
use crate::domain::response::{QnrBankRef, QuestionnaireResponse};
use crate::domain::task::Task;
use crate::domain::timeline::QbTimelineRow;

pub(super) fn to_json<T: Serialize>(value: &T, what: &str) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|err| StoreError::malformed(format!("{what}: {err}")))
}

pub(super) fn from_json<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|err| StoreError::malformed(format!("{what}: {err}")))
}

/// Serialise a string-valued enum to its wire form for a `varchar` column.
pub(super) fn enum_to_db<T: Serialize>(value: &T, what: &str) -> Result<String, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::String(raw)) => Ok(raw),
        _ => Err(StoreError::malformed(format!(
            "{what} does not serialise to a string"
        ))),
    }
}

pub(super) fn enum_from_db<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T, StoreError> {
    serde_json::from_value(Value::String(raw.to_owned()))
        .map_err(|err| StoreError::malformed(format!("{what} {raw:?}: {err}")))
}

pub(super) fn count_from_db(raw: i64, what: &str) -> Result<u32, StoreError> {
    u32::try_from(raw).map_err(|_| StoreError::malformed(format!("{what} {raw} out of range")))
}

pub(super) fn index_from_db(raw: i64, what: &str) -> Result<usize, StoreError> {
    usize::try_from(raw).map_err(|_| StoreError::malformed(format!("{what} {raw} out of range")))
}

pub(super) fn index_to_db(value: usize, what: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::malformed(format!("{what} {value} out of range")))
}

pub(super) fn options_from_db(raw: i64, what: &str) -> Result<ConsentOptions, StoreError> {
    let bits =
        u32::try_from(raw).map_err(|_| StoreError::malformed(format!("{what} {raw} out of range")))?;
    Ok(ConsentOptions::from_bits(bits))
}

// ---- users ----

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: i64,
    pub email: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub deceased: bool,
    pub practitioner_id: Option<i64>,
    pub deleted: bool,
    pub locale: Option<String>,
    pub identifiers: Value,
    pub roles: Value,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = schema::users)]
#[diesel(treat_none_as_null = true)]
pub struct NewUserRow {
    pub email: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub deceased: bool,
    pub practitioner_id: Option<i64>,
    pub deleted: bool,
    pub locale: Option<String>,
    pub identifiers: Value,
    pub roles: Value,
}

pub(super) fn row_to_user(row: UserRow) -> Result<User, StoreError> {
    Ok(User {
        id: UserId::new(row.id),
        identifiers: from_json(row.identifiers, "user identifiers")?,
        email: row.email,
        birthdate: row.birthdate,
        deceased: row.deceased,
        practitioner_id: row.practitioner_id.map(UserId::new),
        deleted: row.deleted,
        locale: row.locale,
        roles: from_json(row.roles, "user roles")?,
    })
}

pub(super) fn user_to_row(user: &User) -> Result<NewUserRow, StoreError> {
    Ok(NewUserRow {
        email: user.email.clone(),
        birthdate: user.birthdate,
        deceased: user.deceased,
        practitioner_id: user.practitioner_id.map(UserId::value),
        deleted: user.deleted,
        locale: user.locale.clone(),
        identifiers: to_json(&user.identifiers, "user identifiers")?,
        roles: to_json(&user.roles, "user roles")?,
    })
}

// ---- catalog ----

#[derive(Debug, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = schema::organizations)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrganizationRow {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub email: Option<String>,
    pub default_locale: Option<String>,
    pub inherit_codings: bool,
}

pub(super) fn row_to_organization(row: OrganizationRow) -> Organization {
    Organization {
        id: OrganizationId::new(row.id),
        name: row.name,
        parent_id: row.parent_id.map(OrganizationId::new),
        email: row.email,
        default_locale: row.default_locale,
        inherit_codings: row.inherit_codings,
    }
}

pub(super) fn organization_to_row(org: &Organization) -> OrganizationRow {
    OrganizationRow {
        id: org.id.value(),
        name: org.name.clone(),
        parent_id: org.parent_id.map(OrganizationId::value),
        email: org.email.clone(),
        default_locale: org.default_locale.clone(),
        inherit_codings: org.inherit_codings,
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = schema::research_protocols)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProtocolRow {
    pub id: i64,
    pub name: String,
}

pub(super) fn row_to_protocol(row: ProtocolRow) -> ResearchProtocol {
    ResearchProtocol {
        id: ProtocolId::new(row.id),
        name: row.name,
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = schema::org_protocols)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrgProtocolDbRow {
    pub id: i64,
    pub organization_id: i64,
    pub protocol_id: i64,
    pub retired_as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schema::org_protocols)]
pub struct NewOrgProtocolRow {
    pub organization_id: i64,
    pub protocol_id: i64,
    pub retired_as_of: Option<DateTime<Utc>>,
}

pub(super) fn row_to_org_protocol(row: OrgProtocolDbRow) -> OrgProtocolRow {
    OrgProtocolRow {
        organization_id: OrganizationId::new(row.organization_id),
        protocol_id: ProtocolId::new(row.protocol_id),
        retired_as_of: row.retired_as_of,
    }
}

pub(super) fn org_protocol_to_row(row: &OrgProtocolRow) -> NewOrgProtocolRow {
    NewOrgProtocolRow {
        organization_id: row.organization_id.value(),
        protocol_id: row.protocol_id.value(),
        retired_as_of: row.retired_as_of,
    }
}

// ---- consents ----

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = schema::user_consents)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ConsentRow {
    pub id: i64,
    pub user_id: i64,
    pub organization_id: i64,
    pub study_id: i64,
    pub acceptance_date: DateTime<Utc>,
    pub options: i64,
    pub agreement_url: String,
    pub status: String,
    pub suspended_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<i64>,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = schema::user_consents)]
#[diesel(treat_none_as_null = true)]
pub struct NewConsentRow {
    pub user_id: i64,
    pub organization_id: i64,
    pub study_id: i64,
    pub acceptance_date: DateTime<Utc>,
    pub options: i64,
    pub agreement_url: String,
    pub status: String,
    pub suspended_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<i64>,
}

pub(super) fn row_to_consent(row: ConsentRow) -> Result<UserConsent, StoreError> {
    Ok(UserConsent {
        id: row.id,
        user_id: UserId::new(row.user_id),
        organization_id: OrganizationId::new(row.organization_id),
        study_id: StudyId::new(row.study_id),
        acceptance_date: row.acceptance_date,
        options: options_from_db(row.options, "consent options")?,
        agreement_url: row.agreement_url,
        status: enum_from_db(&row.status, "consent status")?,
        suspended_at: row.suspended_at,
        deleted_by: row.deleted_by.map(UserId::new),
    })
}

pub(super) fn consent_to_row(consent: &UserConsent) -> Result<NewConsentRow, StoreError> {
    Ok(NewConsentRow {
        user_id: consent.user_id.value(),
        organization_id: consent.organization_id.value(),
        study_id: consent.study_id.value(),
        acceptance_date: consent.acceptance_date,
        options: i64::from(consent.options.bits()),
        agreement_url: consent.agreement_url.clone(),
        status: enum_to_db(&consent.status, "consent status")?,
        suspended_at: consent.suspended_at,
        deleted_by: consent.deleted_by.map(UserId::value),
    })
}

// ---- clinical ----

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = schema::observations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ObservationRow {
    pub id: i64,
    pub user_id: i64,
    pub concept: Value,
    pub value: Option<String>,
    pub issued: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schema::observations)]
pub struct NewObservationRow {
    pub user_id: i64,
    pub concept: Value,
    pub value: Option<String>,
    pub issued: DateTime<Utc>,
}

pub(super) fn row_to_observation(row: ObservationRow) -> Result<Observation, StoreError> {
    Ok(Observation {
        id: row.id,
        user_id: UserId::new(row.user_id),
        concept: from_json(row.concept, "observation concept")?,
        value: row.value,
        issued: row.issued,
    })
}

pub(super) fn observation_to_row(
    observation: &Observation,
) -> Result<NewObservationRow, StoreError> {
    Ok(NewObservationRow {
        user_id: observation.user_id.value(),
        concept: to_json(&observation.concept, "observation concept")?,
        value: observation.value.clone(),
        issued: observation.issued,
    })
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = schema::procedures)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProcedureRow {
    pub id: i64,
    pub user_id: i64,
    pub code: Value,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub encounter_id: Option<i64>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schema::procedures)]
pub struct NewProcedureRow {
    pub user_id: i64,
    pub code: Value,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub encounter_id: Option<i64>,
}

pub(super) fn row_to_procedure(row: ProcedureRow) -> Result<Procedure, StoreError> {
    Ok(Procedure {
        id: row.id,
        user_id: UserId::new(row.user_id),
        code: from_json(row.code, "procedure code")?,
        start_time: row.start_time,
        end_time: row.end_time,
        encounter_id: row.encounter_id,
    })
}

pub(super) fn procedure_to_row(procedure: &Procedure) -> Result<NewProcedureRow, StoreError> {
    Ok(NewProcedureRow {
        user_id: procedure.user_id.value(),
        code: to_json(&procedure.code, "procedure code")?,
        start_time: procedure.start_time,
        end_time: procedure.end_time,
        encounter_id: procedure.encounter_id,
    })
}

// ---- questionnaires and banks ----

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = schema::questionnaires)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct QuestionnaireRow {
    pub id: i64,
    pub name: String,
    pub identifiers: Value,
}

pub(super) fn row_to_questionnaire(row: QuestionnaireRow) -> Result<Questionnaire, StoreError> {
    Ok(Questionnaire {
        id: row.id,
        name: row.name,
        identifiers: from_json(row.identifiers, "questionnaire identifiers")?,
    })
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = schema::questionnaire_banks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BankRow {
    pub id: i64,
    pub name: String,
    pub classification: String,
    pub research_protocol_id: Option<i64>,
    pub intervention_id: Option<i64>,
    pub start: Value,
    pub due: Value,
    pub overdue: Value,
    pub expired: Value,
    pub recurs: Value,
    pub questionnaires: Value,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schema::questionnaire_banks)]
pub struct NewBankRow {
    pub name: String,
    pub classification: String,
    pub research_protocol_id: Option<i64>,
    pub intervention_id: Option<i64>,
    pub start: Value,
    pub due: Value,
    pub overdue: Value,
    pub expired: Value,
    pub recurs: Value,
    pub questionnaires: Value,
}

pub(super) fn row_to_bank(row: BankRow) -> Result<QuestionnaireBank, StoreError> {
    Ok(QuestionnaireBank {
        id: QuestionnaireBankId::new(row.id),
        name: row.name,
        classification: enum_from_db(&row.classification, "bank classification")?,
        research_protocol_id: row.research_protocol_id.map(ProtocolId::new),
        intervention_id: row.intervention_id.map(InterventionId::new),
        start: from_json(row.start, "bank start delta")?,
        due: from_json(row.due, "bank due delta")?,
        overdue: from_json(row.overdue, "bank overdue delta")?,
        expired: from_json(row.expired, "bank expired delta")?,
        recurs: from_json(row.recurs, "bank recurs")?,
        questionnaires: from_json(row.questionnaires, "bank questionnaires")?,
    })
}

pub(super) fn bank_to_row(bank: &QuestionnaireBank) -> Result<NewBankRow, StoreError> {
    Ok(NewBankRow {
        name: bank.name.clone(),
        classification: enum_to_db(&bank.classification, "bank classification")?,
        research_protocol_id: bank.research_protocol_id.map(ProtocolId::value),
        intervention_id: bank.intervention_id.map(InterventionId::value),
        start: to_json(&bank.start, "bank start delta")?,
        due: to_json(&bank.due, "bank due delta")?,
        overdue: to_json(&bank.overdue, "bank overdue delta")?,
        expired: to_json(&bank.expired, "bank expired delta")?,
        recurs: to_json(&bank.recurs, "bank recurs")?,
        questionnaires: to_json(&bank.questionnaires, "bank questionnaires")?,
    })
}

// ---- responses ----

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = schema::questionnaire_responses)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ResponseRow {
    pub id: i64,
    pub user_id: i64,
    pub bank_name: String,
    pub iteration: i64,
    pub protocol_id: Option<i64>,
    pub questionnaire_name: String,
    pub authored: DateTime<Utc>,
    pub status: String,
    pub document: Value,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = schema::questionnaire_responses)]
#[diesel(treat_none_as_null = true)]
pub struct NewResponseRow {
    pub user_id: i64,
    pub bank_name: String,
    pub iteration: i64,
    pub protocol_id: Option<i64>,
    pub questionnaire_name: String,
    pub authored: DateTime<Utc>,
    pub status: String,
    pub document: Value,
}

pub(super) fn row_to_response(row: ResponseRow) -> Result<QuestionnaireResponse, StoreError> {
    Ok(QuestionnaireResponse {
        id: row.id,
        user_id: UserId::new(row.user_id),
        bank_ref: QnrBankRef {
            bank_name: row.bank_name,
            iteration: count_from_db(row.iteration, "response iteration")?,
            protocol_id: row.protocol_id.map(ProtocolId::new),
        },
        questionnaire_name: row.questionnaire_name,
        authored: row.authored,
        status: enum_from_db(&row.status, "response status")?,
        document: row.document,
    })
}

pub(super) fn response_to_row(
    response: &QuestionnaireResponse,
) -> Result<NewResponseRow, StoreError> {
    Ok(NewResponseRow {
        user_id: response.user_id.value(),
        bank_name: response.bank_ref.bank_name.clone(),
        iteration: i64::from(response.bank_ref.iteration),
        protocol_id: response.bank_ref.protocol_id.map(ProtocolId::value),
        questionnaire_name: response.questionnaire_name.clone(),
        authored: response.authored,
        status: enum_to_db(&response.status, "response status")?,
        document: response.document.clone(),
    })
}

// ---- timeline ----

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = schema::qb_timeline)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TimelineRow {
    pub id: i64,
    pub user_id: i64,
    pub study_id: i64,
    pub qb_name: String,
    pub iteration: i64,
    pub recur_index: Option<i64>,
    pub classification: String,
    pub start: DateTime<Utc>,
    pub due: DateTime<Utc>,
    pub overdue: DateTime<Utc>,
    pub expired: DateTime<Utc>,
    pub state: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schema::qb_timeline)]
pub struct NewTimelineRow {
    pub user_id: i64,
    pub study_id: i64,
    pub qb_name: String,
    pub iteration: i64,
    pub recur_index: Option<i64>,
    pub classification: String,
    pub start: DateTime<Utc>,
    pub due: DateTime<Utc>,
    pub overdue: DateTime<Utc>,
    pub expired: DateTime<Utc>,
    pub state: String,
    pub at: DateTime<Utc>,
}

pub(super) fn row_to_timeline(row: TimelineRow) -> Result<QbTimelineRow, StoreError> {
    let recur_index = row
        .recur_index
        .map(|raw| index_from_db(raw, "timeline recur index"))
        .transpose()?;
    Ok(QbTimelineRow {
        user_id: UserId::new(row.user_id),
        study_id: StudyId::new(row.study_id),
        qb_name: row.qb_name,
        iteration: count_from_db(row.iteration, "timeline iteration")?,
        recur_index,
        classification: enum_from_db(&row.classification, "timeline classification")?,
        start: row.start,
        due: row.due,
        overdue: row.overdue,
        expired: row.expired,
        state: enum_from_db(&row.state, "timeline state")?,
        at: row.at,
    })
}

pub(super) fn timeline_to_row(row: &QbTimelineRow) -> Result<NewTimelineRow, StoreError> {
    let recur_index = row
        .recur_index
        .map(|index| index_to_db(index, "timeline recur index"))
        .transpose()?;
    Ok(NewTimelineRow {
        user_id: row.user_id.value(),
        study_id: row.study_id.value(),
        qb_name: row.qb_name.clone(),
        iteration: i64::from(row.iteration),
        recur_index,
        classification: enum_to_db(&row.classification, "timeline classification")?,
        start: row.start,
        due: row.due,
        overdue: row.overdue,
        expired: row.expired,
        state: enum_to_db(&row.state, "timeline state")?,
        at: row.at,
    })
}

// ---- communications ----

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = schema::communication_requests)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CommunicationRequestRow {
    pub id: i64,
    pub status: String,
    pub notify_post_qb_start: Value,
    pub qb_id: i64,
    pub qb_name: String,
    pub qb_iteration: i64,
    pub identifiers: Value,
    pub template: String,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = schema::communication_requests)]
pub struct NewCommunicationRequestRow {
    pub status: String,
    pub notify_post_qb_start: Value,
    pub qb_id: i64,
    pub qb_name: String,
    pub qb_iteration: i64,
    pub identifiers: Value,
    pub template: String,
}

pub(super) fn row_to_request(
    row: CommunicationRequestRow,
) -> Result<CommunicationRequest, StoreError> {
    Ok(CommunicationRequest {
        id: row.id,
        status: enum_from_db(&row.status, "request status")?,
        notify_post_qb_start: from_json(row.notify_post_qb_start, "request notify delta")?,
        qb_id: QuestionnaireBankId::new(row.qb_id),
        qb_name: row.qb_name,
        qb_iteration: count_from_db(row.qb_iteration, "request iteration")?,
        identifiers: from_json(row.identifiers, "request identifiers")?,
        template: row.template,
    })
}

pub(super) fn request_to_row(
    request: &CommunicationRequest,
) -> Result<NewCommunicationRequestRow, StoreError> {
    Ok(NewCommunicationRequestRow {
        status: enum_to_db(&request.status, "request status")?,
        notify_post_qb_start: to_json(&request.notify_post_qb_start, "request notify delta")?,
        qb_id: request.qb_id.value(),
        qb_name: request.qb_name.clone(),
        qb_iteration: i64::from(request.qb_iteration),
        identifiers: to_json(&request.identifiers, "request identifiers")?,
        template: request.template.clone(),
    })
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = schema::communications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CommunicationRow {
    pub id: i64,
    pub user_id: i64,
    pub request_id: i64,
    pub qb_iteration: i64,
    pub status: String,
    pub message_ref: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schema::communications)]
pub struct NewCommunicationRow {
    pub user_id: i64,
    pub request_id: i64,
    pub qb_iteration: i64,
    pub status: String,
    pub message_ref: Option<String>,
}

pub(super) fn row_to_communication(row: CommunicationRow) -> Result<Communication, StoreError> {
    Ok(Communication {
        id: row.id,
        user_id: UserId::new(row.user_id),
        request_id: row.request_id,
        qb_iteration: count_from_db(row.qb_iteration, "communication iteration")?,
        status: enum_from_db(&row.status, "communication status")?,
        message_ref: row.message_ref,
    })
}

pub(super) fn communication_to_row(
    communication: &Communication,
) -> Result<NewCommunicationRow, StoreError> {
    Ok(NewCommunicationRow {
        user_id: communication.user_id.value(),
        request_id: communication.request_id,
        qb_iteration: i64::from(communication.qb_iteration),
        status: enum_to_db(&communication.status, "communication status")?,
        message_ref: communication.message_ref.clone(),
    })
}

// ---- oauth ----

#[derive(Debug, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = schema::oauth_clients)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ClientRow {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_origins: Value,
    pub callback_url: Option<String>,
    pub owner_user_id: i64,
    pub intervention_id: Option<i64>,
}

pub(super) fn row_to_client(row: ClientRow) -> Result<Client, StoreError> {
    Ok(Client {
        client_id: row.client_id,
        client_secret: Zeroizing::new(row.client_secret),
        redirect_origins: from_json(row.redirect_origins, "client redirect origins")?,
        callback_url: row.callback_url,
        owner_user_id: UserId::new(row.owner_user_id),
        intervention_id: row.intervention_id.map(InterventionId::new),
    })
}

pub(super) fn client_to_row(client: &Client) -> Result<ClientRow, StoreError> {
    Ok(ClientRow {
        client_id: client.client_id.clone(),
        client_secret: client.client_secret.as_str().to_owned(),
        redirect_origins: to_json(&client.redirect_origins, "client redirect origins")?,
        callback_url: client.callback_url.clone(),
        owner_user_id: client.owner_user_id.value(),
        intervention_id: client.intervention_id.map(InterventionId::value),
    })
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::oauth_grants)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GrantRow {
    pub code: String,
    pub client_id: String,
    pub user_id: i64,
    pub scopes: Value,
    pub redirect_uri: String,
    pub expires: DateTime<Utc>,
}

pub(super) fn row_to_grant(row: GrantRow) -> Result<Grant, StoreError> {
    Ok(Grant {
        code: row.code,
        client_id: row.client_id,
        user_id: UserId::new(row.user_id),
        scopes: from_json(row.scopes, "grant scopes")?,
        redirect_uri: row.redirect_uri,
        expires: row.expires,
    })
}

pub(super) fn grant_to_row(grant: &Grant) -> Result<GrantRow, StoreError> {
    Ok(GrantRow {
        code: grant.code.clone(),
        client_id: grant.client_id.clone(),
        user_id: grant.user_id.value(),
        scopes: to_json(&grant.scopes, "grant scopes")?,
        redirect_uri: grant.redirect_uri.clone(),
        expires: grant.expires,
    })
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::oauth_tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TokenRow {
    pub access_token: String,
    pub refresh_token: String,
    pub client_id: String,
    pub user_id: i64,
    pub scopes: Value,
    pub expires: DateTime<Utc>,
    pub service: bool,
}

pub(super) fn row_to_token(row: TokenRow) -> Result<Token, StoreError> {
    Ok(Token {
        access_token: row.access_token,
        refresh_token: row.refresh_token,
        client_id: row.client_id,
        user_id: UserId::new(row.user_id),
        scopes: from_json(row.scopes, "token scopes")?,
        expires: row.expires,
        service: row.service,
    })
}

pub(super) fn token_to_row(token: &Token) -> Result<TokenRow, StoreError> {
    Ok(TokenRow {
        access_token: token.access_token.clone(),
        refresh_token: token.refresh_token.clone(),
        client_id: token.client_id.clone(),
        user_id: token.user_id.value(),
        scopes: to_json(&token.scopes, "token scopes")?,
        expires: token.expires,
        service: token.service,
    })
}

// ---- interventions ----

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = schema::interventions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct InterventionRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub public_access: bool,
    pub promote_granted_to_subscribed: bool,
    pub card_html: Option<String>,
    pub link_url: Option<String>,
    pub status_text: Option<String>,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = schema::interventions)]
#[diesel(treat_none_as_null = true)]
pub struct NewInterventionRow {
    pub name: String,
    pub description: Option<String>,
    pub public_access: bool,
    pub promote_granted_to_subscribed: bool,
    pub card_html: Option<String>,
    pub link_url: Option<String>,
    pub status_text: Option<String>,
}

pub(super) fn row_to_intervention(row: InterventionRow) -> Intervention {
    Intervention {
        id: InterventionId::new(row.id),
        name: row.name,
        description: row.description,
        public_access: row.public_access,
        promote_granted_to_subscribed: row.promote_granted_to_subscribed,
        card_html: row.card_html,
        link_url: row.link_url,
        status_text: row.status_text,
    }
}

pub(super) fn intervention_to_row(intervention: &Intervention) -> NewInterventionRow {
    NewInterventionRow {
        name: intervention.name.clone(),
        description: intervention.description.clone(),
        public_access: intervention.public_access,
        promote_granted_to_subscribed: intervention.promote_granted_to_subscribed,
        card_html: intervention.card_html.clone(),
        link_url: intervention.link_url.clone(),
        status_text: intervention.status_text.clone(),
    }
}

#[derive(Debug, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = schema::user_interventions)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserInterventionRow {
    pub user_id: i64,
    pub intervention_id: i64,
    pub access: String,
    pub card_html: Option<String>,
    pub link_url: Option<String>,
    pub status_text: Option<String>,
}

pub(super) fn row_to_user_intervention(
    row: UserInterventionRow,
) -> Result<UserIntervention, StoreError> {
    Ok(UserIntervention {
        user_id: UserId::new(row.user_id),
        intervention_id: InterventionId::new(row.intervention_id),
        access: enum_from_db(&row.access, "intervention access")?,
        card_html: row.card_html,
        link_url: row.link_url,
        status_text: row.status_text,
    })
}

pub(super) fn user_intervention_to_row(
    row: &UserIntervention,
) -> Result<UserInterventionRow, StoreError> {
    Ok(UserInterventionRow {
        user_id: row.user_id.value(),
        intervention_id: row.intervention_id.value(),
        access: enum_to_db(&row.access, "intervention access")?,
        card_html: row.card_html.clone(),
        link_url: row.link_url.clone(),
        status_text: row.status_text.clone(),
    })
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = schema::access_strategies)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AccessStrategyRow {
    pub id: i64,
    pub intervention_id: i64,
    pub rank: i64,
    pub strategy: Value,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schema::access_strategies)]
pub struct NewAccessStrategyRow {
    pub intervention_id: i64,
    pub rank: i64,
    pub strategy: Value,
}

pub(super) fn row_to_strategy(row: AccessStrategyRow) -> Result<AccessStrategy, StoreError> {
    from_json(row.strategy, "access strategy")
}

pub(super) fn strategy_to_row(
    intervention: InterventionId,
    strategy: &AccessStrategy,
) -> Result<NewAccessStrategyRow, StoreError> {
    Ok(NewAccessStrategyRow {
        intervention_id: intervention.value(),
        rank: i64::from(strategy.rank),
        strategy: to_json(strategy, "access strategy")?,
    })
}

// ---- audit ----

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = schema::audit_log)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AuditRow {
    pub id: i64,
    pub actor_user_id: i64,
    pub subject_user_id: i64,
    pub context: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub comment: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schema::audit_log)]
pub struct NewAuditRow {
    pub actor_user_id: i64,
    pub subject_user_id: i64,
    pub context: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub comment: Option<String>,
}

pub(super) fn row_to_audit(row: AuditRow) -> Result<Audit, StoreError> {
    Ok(Audit {
        id: row.id,
        actor_user_id: UserId::new(row.actor_user_id),
        subject_user_id: UserId::new(row.subject_user_id),
        context: enum_from_db(&row.context, "audit context")?,
        version: row.version,
        timestamp: row.timestamp,
        comment: row.comment,
    })
}

pub(super) fn audit_to_row(audit: &Audit) -> Result<NewAuditRow, StoreError> {
    Ok(NewAuditRow {
        actor_user_id: audit.actor_user_id.value(),
        subject_user_id: audit.subject_user_id.value(),
        context: enum_to_db(&audit.context, "audit context")?,
        version: audit.version.clone(),
        timestamp: audit.timestamp,
        comment: audit.comment.clone(),
    })
}

// ---- tasks ----

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = schema::tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    pub id: i64,
    pub kind: String,
    pub payload: Value,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub claimed_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schema::tasks)]
pub struct NewTaskRow {
    pub kind: String,
    pub payload: Value,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub claimed_until: Option<DateTime<Utc>>,
}

pub(super) fn row_to_task(row: TaskRow) -> Result<Task, StoreError> {
    let kind = crate::domain::task::TaskKind::parse(&row.kind)
        .ok_or_else(|| StoreError::malformed(format!("unknown task kind {:?}", row.kind)))?;
    Ok(Task {
        id: row.id,
        kind,
        payload: row.payload,
        attempts: row.attempts,
        next_attempt_at: row.next_attempt_at,
    })
}

pub(super) fn task_to_row(task: &Task) -> NewTaskRow {
    NewTaskRow {
        kind: task.kind.as_str().to_owned(),
        payload: task.payload.clone(),
        attempts: task.attempts,
        next_attempt_at: task.next_attempt_at,
        claimed_until: None,
    }
}
