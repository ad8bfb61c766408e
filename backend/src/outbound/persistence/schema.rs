//! Diesel table definitions for the portal database.
//!
//! Nested value shapes (identifiers, relative deltas, recur rules, strategy
//! definitions, response documents) are stored as `jsonb` and mapped through
//! serde in [`super::models`]. Enumerations are stored as their wire strings.

diesel::table! {
    /// Portal user accounts. Deletion is a soft flag.
    users (id) {
        id -> BigInt,
        email -> Nullable<Varchar>,
        birthdate -> Nullable<Date>,
        deceased -> Bool,
        practitioner_id -> Nullable<BigInt>,
        deleted -> Bool,
        locale -> Nullable<Varchar>,
        identifiers -> Jsonb,
        roles -> Jsonb,
    }
}

diesel::table! {
    /// Direct user-to-organization associations.
    user_organizations (user_id, organization_id) {
        user_id -> BigInt,
        organization_id -> BigInt,
    }
}

diesel::table! {
    /// Service accounts a sponsor may mint tokens for.
    sponsorships (sponsor_user_id, service_user_id) {
        sponsor_user_id -> BigInt,
        service_user_id -> BigInt,
    }
}

diesel::table! {
    /// Organization forest; `parent_id` is null at roots.
    organizations (id) {
        id -> BigInt,
        name -> Varchar,
        parent_id -> Nullable<BigInt>,
        email -> Nullable<Varchar>,
        default_locale -> Nullable<Varchar>,
        inherit_codings -> Bool,
    }
}

diesel::table! {
    research_protocols (id) {
        id -> BigInt,
        name -> Varchar,
    }
}

diesel::table! {
    /// Protocol-to-organization rows; null `retired_as_of` marks the
    /// current protocol.
    org_protocols (id) {
        id -> BigInt,
        organization_id -> BigInt,
        protocol_id -> BigInt,
        retired_as_of -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Consent rows; withdrawal and deactivation are recorded in place.
    user_consents (id) {
        id -> BigInt,
        user_id -> BigInt,
        organization_id -> BigInt,
        study_id -> BigInt,
        acceptance_date -> Timestamptz,
        options -> BigInt,
        agreement_url -> Varchar,
        status -> Varchar,
        suspended_at -> Nullable<Timestamptz>,
        deleted_by -> Nullable<BigInt>,
    }
}

diesel::table! {
    observations (id) {
        id -> BigInt,
        user_id -> BigInt,
        concept -> Jsonb,
        value -> Nullable<Varchar>,
        issued -> Timestamptz,
    }
}

diesel::table! {
    procedures (id) {
        id -> BigInt,
        user_id -> BigInt,
        code -> Jsonb,
        start_time -> Timestamptz,
        end_time -> Nullable<Timestamptz>,
        encounter_id -> Nullable<BigInt>,
    }
}

diesel::table! {
    questionnaires (id) {
        id -> BigInt,
        name -> Varchar,
        identifiers -> Jsonb,
    }
}

diesel::table! {
    /// Bank definitions; names are unique.
    questionnaire_banks (id) {
        id -> BigInt,
        name -> Varchar,
        classification -> Varchar,
        research_protocol_id -> Nullable<BigInt>,
        intervention_id -> Nullable<BigInt>,
        start -> Jsonb,
        due -> Jsonb,
        overdue -> Jsonb,
        expired -> Jsonb,
        recurs -> Jsonb,
        questionnaires -> Jsonb,
    }
}

diesel::table! {
    questionnaire_responses (id) {
        id -> BigInt,
        user_id -> BigInt,
        bank_name -> Varchar,
        iteration -> BigInt,
        protocol_id -> Nullable<BigInt>,
        questionnaire_name -> Varchar,
        authored -> Timestamptz,
        status -> Varchar,
        document -> Jsonb,
    }
}

diesel::table! {
    /// Materialised timeline rows, replaced wholesale per (user, study).
    qb_timeline (id) {
        id -> BigInt,
        user_id -> BigInt,
        study_id -> BigInt,
        qb_name -> Varchar,
        iteration -> BigInt,
        recur_index -> Nullable<BigInt>,
        classification -> Varchar,
        start -> Timestamptz,
        due -> Timestamptz,
        overdue -> Timestamptz,
        expired -> Timestamptz,
        state -> Varchar,
        at -> Timestamptz,
    }
}

diesel::table! {
    communication_requests (id) {
        id -> BigInt,
        status -> Varchar,
        notify_post_qb_start -> Jsonb,
        qb_id -> BigInt,
        qb_name -> Varchar,
        qb_iteration -> BigInt,
        identifiers -> Jsonb,
        template -> Varchar,
    }
}

diesel::table! {
    /// Emitted communications; unique per (user, request, iteration).
    communications (id) {
        id -> BigInt,
        user_id -> BigInt,
        request_id -> BigInt,
        qb_iteration -> BigInt,
        status -> Varchar,
        message_ref -> Nullable<Varchar>,
    }
}

diesel::table! {
    oauth_clients (client_id) {
        client_id -> Varchar,
        client_secret -> Varchar,
        redirect_origins -> Jsonb,
        callback_url -> Nullable<Varchar>,
        owner_user_id -> BigInt,
        intervention_id -> Nullable<BigInt>,
    }
}

diesel::table! {
    /// Single-use authorization codes.
    oauth_grants (code) {
        code -> Varchar,
        client_id -> Varchar,
        user_id -> BigInt,
        scopes -> Jsonb,
        redirect_uri -> Varchar,
        expires -> Timestamptz,
    }
}

diesel::table! {
    oauth_tokens (access_token) {
        access_token -> Varchar,
        refresh_token -> Varchar,
        client_id -> Varchar,
        user_id -> BigInt,
        scopes -> Jsonb,
        expires -> Timestamptz,
        service -> Bool,
    }
}

diesel::table! {
    interventions (id) {
        id -> BigInt,
        name -> Varchar,
        description -> Nullable<Varchar>,
        public_access -> Bool,
        promote_granted_to_subscribed -> Bool,
        card_html -> Nullable<Varchar>,
        link_url -> Nullable<Varchar>,
        status_text -> Nullable<Varchar>,
    }
}

diesel::table! {
    /// Per-user access rows; one row per (user, intervention).
    user_interventions (user_id, intervention_id) {
        user_id -> BigInt,
        intervention_id -> BigInt,
        access -> Varchar,
        card_html -> Nullable<Varchar>,
        link_url -> Nullable<Varchar>,
        status_text -> Nullable<Varchar>,
    }
}

diesel::table! {
    /// Ranked access strategies; ranks are unique per intervention.
    access_strategies (id) {
        id -> BigInt,
        intervention_id -> BigInt,
        rank -> BigInt,
        strategy -> Jsonb,
    }
}

diesel::table! {
    /// Append-only audit trail.
    audit_log (id) {
        id -> BigInt,
        actor_user_id -> BigInt,
        subject_user_id -> BigInt,
        context -> Varchar,
        version -> Varchar,
        timestamp -> Timestamptz,
        comment -> Nullable<Varchar>,
    }
}

diesel::table! {
    /// Persisted background tasks; `claimed_until` leases a task to one
    /// worker at a time.
    tasks (id) {
        id -> BigInt,
        kind -> Varchar,
        payload -> Jsonb,
        attempts -> Integer,
        next_attempt_at -> Timestamptz,
        claimed_until -> Nullable<Timestamptz>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    users,
    user_organizations,
    sponsorships,
    organizations,
    research_protocols,
    org_protocols,
    user_consents,
    observations,
    procedures,
    questionnaires,
    questionnaire_banks,
    questionnaire_responses,
    qb_timeline,
    communication_requests,
    communications,
    oauth_clients,
    oauth_grants,
    oauth_tokens,
    interventions,
    user_interventions,
    access_strategies,
    audit_log,
    tasks,
);
