//! Organizations and the cached tree built over their parent references.
//!
//! Organizations form a forest. Children inherit a locale and research
//! protocol from the nearest ancestor that sets one. The [`OrgTree`] is a
//! pure snapshot; callers rebuild it when organization rows change rather
//! than mutating it in place.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::Error;

/// Identifier for an organization.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(transparent)]
pub struct OrganizationId(i64);

impl OrganizationId {
    /// Wrap a raw database identifier.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Underlying integer value.
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Organization row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub parent_id: Option<OrganizationId>,
    pub email: Option<String>,
    pub default_locale: Option<String>,
    /// When set, children pick up this org's coding attributes if their own
    /// are unset.
    #[serde(default)]
    pub inherit_codings: bool,
}

/// Immutable snapshot of the organization forest.
///
/// Descendant and leaf queries are pure functions over this snapshot.
/// Adapters cache the tree and invalidate it when organization rows change.
#[derive(Debug, Clone, Default)]
pub struct OrgTree {
    orgs: HashMap<OrganizationId, Organization>,
    children: HashMap<OrganizationId, Vec<OrganizationId>>,
}

impl OrgTree {
    /// Build a tree from organization rows. Rejects rows whose parent walk
    /// never terminates (a cycle), which indicates corrupted data.
    pub fn build(rows: Vec<Organization>) -> Result<Self, Error> {
        let mut orgs = HashMap::with_capacity(rows.len());
        let mut children: HashMap<OrganizationId, Vec<OrganizationId>> = HashMap::new();
        for org in rows {
            if let Some(parent) = org.parent_id {
                children.entry(parent).or_default().push(org.id);
            }
            orgs.insert(org.id, org);
        }
        for list in children.values_mut() {
            list.sort();
        }
        let tree = Self { orgs, children };
        for id in tree.orgs.keys() {
            // top_level errors on cycles
            tree.top_level(*id)?;
        }
        Ok(tree)
    }

    /// Look up one organization.
    pub fn get(&self, id: OrganizationId) -> Option<&Organization> {
        self.orgs.get(&id)
    }

    /// All organizations, unordered.
    pub fn all(&self) -> impl Iterator<Item = &Organization> {
        self.orgs.values()
    }

    /// Root of the subtree containing `id`.
    pub fn top_level(&self, id: OrganizationId) -> Result<OrganizationId, Error> {
        let mut current = id;
        // Bounded by the org count; anything longer is a cycle.
        for _ in 0..=self.orgs.len() {
            match self.orgs.get(&current) {
                None => return Err(Error::not_found(format!("organization {current} missing"))),
                Some(org) => match org.parent_id {
                    None => return Ok(current),
                    Some(parent) => current = parent,
                },
            }
        }
        Err(Error::conflict(format!(
            "organization {id} participates in a parent cycle"
        )))
    }

    /// `id` plus every organization below it, depth first.
    pub fn descendants(&self, id: OrganizationId) -> Vec<OrganizationId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if !self.orgs.contains_key(&next) {
                continue;
            }
            out.push(next);
            if let Some(kids) = self.children.get(&next) {
                stack.extend(kids.iter().copied());
            }
        }
        out
    }

    /// Leaf organizations at or below `id`.
    pub fn leaves(&self, id: OrganizationId) -> Vec<OrganizationId> {
        self.descendants(id)
            .into_iter()
            .filter(|d| self.children.get(d).is_none_or(Vec::is_empty))
            .collect()
    }

    /// Locale for `id`, walking ancestors until one sets a default.
    pub fn inherited_locale(&self, id: OrganizationId) -> Option<&str> {
        let mut current = Some(id);
        for _ in 0..=self.orgs.len() {
            let org = self.orgs.get(&current?)?;
            if let Some(locale) = org.default_locale.as_deref() {
                return Some(locale);
            }
            current = org.parent_id;
        }
        None
    }
}
