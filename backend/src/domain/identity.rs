//! Users and the identifiers that name them.
//!
//! Users are never hard-deleted; a soft-delete flag hides them from queries.
//! A masked email (the unused-prefix sentinel) means "no email on file" and
//! must never be dispatched to.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::Error;

/// Sentinel prefix marking a masked, undeliverable email address.
pub const NO_EMAIL_PREFIX: &str = "__no_email__";

/// Earliest plausible birthdate accepted by validation.
const MIN_BIRTH_YEAR: i32 = 1900;

/// Identifier for a portal user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Wrap a raw database identifier.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Underlying integer value.
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External identifier attached to a user, unique per (system, value).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Identifier {
    pub system: String,
    pub value: String,
}

/// Portal user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    pub email: Option<String>,
    pub birthdate: Option<NaiveDate>,
    #[serde(default)]
    pub deceased: bool,
    pub practitioner_id: Option<UserId>,
    /// Soft-delete marker; deleted users stay in the store.
    #[serde(default)]
    pub deleted: bool,
    /// Locale override; organizations supply a default when unset.
    pub locale: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl User {
    /// Minimal user with only an id, for construction in services and tests.
    pub fn with_id(id: UserId) -> Self {
        Self {
            id,
            identifiers: Vec::new(),
            email: None,
            birthdate: None,
            deceased: false,
            practitioner_id: None,
            deleted: false,
            locale: None,
            roles: Vec::new(),
        }
    }

    /// Deliverable email address, treating the masked sentinel as absent.
    pub fn deliverable_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .filter(|e| !e.starts_with(NO_EMAIL_PREFIX))
    }

    /// Validate a birthdate before accepting it onto the record.
    pub fn validate_birthdate(date: NaiveDate) -> Result<(), Error> {
        use chrono::Datelike;
        if date.year() < MIN_BIRTH_YEAR {
            return Err(Error::invalid_request(format!(
                "birthdate {date} predates {MIN_BIRTH_YEAR}"
            )));
        }
        Ok(())
    }

    /// Record time of death. Returns an error when the user is already
    /// marked deceased so callers audit each transition exactly once.
    pub fn mark_deceased(&mut self) -> Result<(), Error> {
        if self.deceased {
            return Err(Error::conflict("user is already marked deceased"));
        }
        self.deceased = true;
        Ok(())
    }

    /// Reverse a deceased marking. Callers must write an `user`-context
    /// audit entry alongside this transition.
    pub fn clear_deceased(&mut self) -> Result<(), Error> {
        if !self.deceased {
            return Err(Error::conflict("user is not marked deceased"));
        }
        self.deceased = false;
        Ok(())
    }

    /// True when the user holds the named role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
