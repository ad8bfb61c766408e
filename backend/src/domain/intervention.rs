//! Satellite intervention applications and their per-user access rules.
//!
//! Display access is granted when any of the intervention's ordered access
//! strategies matches, when a per-user row grants it explicitly, or when the
//! intervention is public. Subscription grants event delivery only. Whether
//! an explicit grant also implies subscription is a per-intervention policy
//! flag, never a name-based special case.

use serde::{Deserialize, Serialize};

use super::consent::{StudyId, UserConsent};
use super::identity::User;
use super::organization::OrganizationId;
use super::questionnaire::InterventionId;

/// Registered intervention application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub id: InterventionId,
    pub name: String,
    pub description: Option<String>,
    /// Everyone may see the intervention card.
    #[serde(default)]
    pub public_access: bool,
    /// Policy: an explicit `granted` row also implies `subscribed`.
    #[serde(default)]
    pub promote_granted_to_subscribed: bool,
    pub card_html: Option<String>,
    pub link_url: Option<String>,
    pub status_text: Option<String>,
}

/// Per-user access level to one intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InterventionAccess {
    /// Visible to the user.
    Granted,
    /// Event delivery only; no visibility.
    Subscribed,
    /// Neither visible nor subscribed.
    NotGranted,
}

/// Per-user intervention row with display overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIntervention {
    pub user_id: super::identity::UserId,
    pub intervention_id: InterventionId,
    pub access: InterventionAccess,
    pub card_html: Option<String>,
    pub link_url: Option<String>,
    pub status_text: Option<String>,
}

/// Facts an access strategy may consult about one user.
#[derive(Debug, Clone, Default)]
pub struct StrategyContext {
    pub organizations: Vec<OrganizationId>,
    pub consents: Vec<UserConsent>,
    pub deceased: bool,
}

impl StrategyContext {
    /// Snapshot the relevant facts from a user record plus associations.
    pub fn for_user(
        user: &User,
        organizations: Vec<OrganizationId>,
        consents: Vec<UserConsent>,
    ) -> Self {
        Self {
            organizations,
            consents,
            deceased: user.deceased,
        }
    }
}

/// Predicate evaluated by an access strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyKind {
    /// Matches every user.
    AllowAll,
    /// User is associated with the organization (or any descendant the
    /// caller expanded before evaluation).
    InOrganization { organization_id: OrganizationId },
    /// User holds an active consent for the study.
    ActiveConsent { study_id: StudyId },
    /// User is not marked deceased.
    NotDeceased,
}

/// Named, ranked access strategy attached to an intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AccessStrategy {
    pub name: String,
    pub rank: u32,
    #[serde(flatten)]
    pub kind: StrategyKind,
}

impl AccessStrategy {
    /// Evaluate the predicate against one user's facts.
    pub fn evaluate(&self, ctx: &StrategyContext) -> bool {
        match &self.kind {
            StrategyKind::AllowAll => true,
            StrategyKind::InOrganization { organization_id } => {
                ctx.organizations.contains(organization_id)
            }
            StrategyKind::ActiveConsent { study_id } => ctx
                .consents
                .iter()
                .any(|c| c.study_id == *study_id && c.is_active()),
            StrategyKind::NotDeceased => !ctx.deceased,
        }
    }
}

/// Display access evaluation: ANY strategy, an explicit grant, or public
/// access suffices. Subscription never grants visibility.
pub fn has_display_access(
    intervention: &Intervention,
    user_row: Option<&UserIntervention>,
    strategies: &[AccessStrategy],
    ctx: &StrategyContext,
) -> bool {
    if intervention.public_access {
        return true;
    }
    if user_row.is_some_and(|row| row.access == InterventionAccess::Granted) {
        return true;
    }
    let mut ordered: Vec<&AccessStrategy> = strategies.iter().collect();
    ordered.sort_by_key(|s| s.rank);
    ordered.iter().any(|s| s.evaluate(ctx))
}

/// Event-delivery evaluation. An explicit grant counts when the intervention
/// opted into promotion.
pub fn is_subscribed(intervention: &Intervention, user_row: Option<&UserIntervention>) -> bool {
    match user_row.map(|row| row.access) {
        Some(InterventionAccess::Subscribed) => true,
        Some(InterventionAccess::Granted) => intervention.promote_granted_to_subscribed,
        _ => false,
    }
}
