//! OAuth broker primitives: clients, grants, tokens, origin matching, and
//! the HMAC-signed callback wire format.
//!
//! Redirect URIs are compared by origin (scheme + host + port) only. Grants
//! are single-use and short-lived; tokens live four hours, service tokens a
//! year. Callback payloads are signed with the client secret so interventions
//! can verify provenance without a shared session.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::error::Error;
use super::identity::UserId;
use super::questionnaire::InterventionId;

type HmacSha256 = Hmac<Sha256>;

/// Authorization codes expire quickly; the exchange happens immediately
/// after the redirect.
pub fn grant_ttl() -> Duration {
    Duration::seconds(100)
}

/// Interactive access tokens.
pub fn token_ttl() -> Duration {
    Duration::hours(4)
}

/// Service tokens for sponsor-owned accounts.
pub fn service_token_ttl() -> Duration {
    Duration::days(365)
}

/// Registered OAuth client owned by an intervention.
#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    pub client_id: String,
    pub client_secret: Zeroizing<String>,
    /// Registered origins; comparisons use scheme + host + port only.
    pub redirect_origins: Vec<String>,
    /// Endpoint receiving signed event notifications, when registered.
    pub callback_url: Option<String>,
    pub owner_user_id: UserId,
    pub intervention_id: Option<InterventionId>,
}

/// Single-use authorization code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub code: String,
    pub client_id: String,
    pub user_id: UserId,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    pub expires: DateTime<Utc>,
}

impl Grant {
    /// True once the code may no longer be exchanged.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires
    }
}

/// Bearer token issued to a client on behalf of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub client_id: String,
    pub user_id: UserId,
    pub scopes: Vec<String>,
    pub expires: DateTime<Utc>,
    /// Long-lived token minted for a sponsor-owned service account.
    #[serde(default)]
    pub service: bool,
}

impl Token {
    /// True once the token no longer authenticates requests.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires
    }

    /// True when every requested scope was granted to this token.
    pub fn covers(&self, requested: &[String]) -> bool {
        requested.iter().all(|s| self.scopes.contains(s))
    }
}

/// Random URL-safe secret of `len` characters for codes and tokens.
pub fn mint_secret(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Outcome of an access-control check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// The caller may proceed.
    Allow,
    /// The caller is known but refused; the reason stays server-side.
    Deny(String),
    /// The caller must authenticate; redirect to the given location.
    Challenge(String),
}

/// Compare two URLs by origin: scheme, host, and effective port.
pub fn same_origin(a: &str, b: &str) -> bool {
    let (Ok(a), Ok(b)) = (url::Url::parse(a), url::Url::parse(b)) else {
        return false;
    };
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

/// True when `candidate` shares an origin with any registered origin.
pub fn origin_registered(registered: &[String], candidate: &str) -> bool {
    registered.iter().any(|origin| same_origin(origin, candidate))
}

/// Event kinds interventions may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackEvent {
    Logout,
    UserDocumentUpload,
}

impl CallbackEvent {
    /// Wire name carried in the signed payload.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::UserDocumentUpload => "user_document_upload",
        }
    }
}

/// Signed callback payload. Field order is part of the wire format; the
/// signature covers the serialised JSON byte-for-byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub event: String,
    pub user_id: i64,
    pub algorithm: String,
    pub issued_at: i64,
}

impl CallbackPayload {
    /// Payload for an event concerning one user, issued at `issued_at`
    /// (seconds since the epoch).
    pub fn new(event: CallbackEvent, user_id: UserId, issued_at: i64) -> Self {
        Self {
            event: event.as_str().to_owned(),
            user_id: user_id.value(),
            algorithm: "HMAC-SHA256".to_owned(),
            issued_at,
        }
    }
}

/// Encode `signed_request = b64url(hmac(secret, b64url(payload))) "." b64url(payload)`
/// with the URL-safe alphabet and no padding.
pub fn encode_signed_request(secret: &str, payload: &CallbackPayload) -> Result<String, Error> {
    let json = serde_json::to_string(payload)
        .map_err(|e| Error::internal(format!("callback payload serialisation failed: {e}")))?;
    let encoded_payload = URL_SAFE_NO_PAD.encode(json.as_bytes());
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::internal(format!("hmac key rejected: {e}")))?;
    mac.update(encoded_payload.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{signature}.{encoded_payload}"))
}

/// Verify and decode a `signed_request` produced by [`encode_signed_request`].
pub fn decode_signed_request(secret: &str, signed: &str) -> Result<CallbackPayload, Error> {
    let (signature, encoded_payload) = signed
        .split_once('.')
        .ok_or_else(|| Error::invalid_request("malformed signed_request"))?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::internal(format!("hmac key rejected: {e}")))?;
    mac.update(encoded_payload.as_bytes());
    let expected = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    if expected != signature {
        return Err(Error::unauthorized("signed_request signature mismatch"));
    }
    let raw = URL_SAFE_NO_PAD
        .decode(encoded_payload.as_bytes())
        .map_err(|_| Error::invalid_request("signed_request payload is not base64url"))?;
    serde_json::from_slice(&raw)
        .map_err(|_| Error::invalid_request("signed_request payload is not valid JSON"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case("https://intervention.example/cb", "https://intervention.example", true)]
    #[case("https://intervention.example:443/cb", "https://intervention.example", true)]
    #[case("http://intervention.example/cb", "https://intervention.example", false)]
    #[case("https://attacker.example/cb", "https://intervention.example", false)]
    #[case("https://intervention.example:8443/cb", "https://intervention.example", false)]
    #[case("not a url", "https://intervention.example", false)]
    fn origin_comparison_ignores_path_only(
        #[case] candidate: &str,
        #[case] registered: &str,
        #[case] matches: bool,
    ) {
        assert_eq!(
            origin_registered(&[registered.to_owned()], candidate),
            matches
        );
    }

    #[rstest]
    fn signed_request_matches_known_answer() {
        // client_secret "s3cret", logout event for user 42 at 1700000000.
        let payload = CallbackPayload::new(CallbackEvent::Logout, UserId::new(42), 1_700_000_000);
        let signed = encode_signed_request("s3cret", &payload).expect("encodes");
        assert_eq!(
            signed,
            "_TUYPNpzJsMPNsaa9CqiI2WOvb309QXhDuOLxGLADZk.\
             eyJldmVudCI6ImxvZ291dCIsInVzZXJfaWQiOjQyLCJhbGdvcml0aG0iOiJITUFDLVNIQTI1NiIsImlzc3VlZF9hdCI6MTcwMDAwMDAwMH0"
        );
        assert!(!signed.contains('='), "no padding allowed");
    }

    #[rstest]
    fn signed_request_round_trips_and_rejects_tampering() {
        let payload = CallbackPayload::new(
            CallbackEvent::UserDocumentUpload,
            UserId::new(7),
            1_700_000_123,
        );
        let signed = encode_signed_request("topsecret", &payload).expect("encodes");
        let decoded = decode_signed_request("topsecret", &signed).expect("verifies");
        assert_eq!(decoded, payload);

        let err = decode_signed_request("wrong-secret", &signed).expect_err("rejected");
        assert_eq!(err.code(), crate::domain::ErrorCode::Unauthorized);
    }

    #[rstest]
    fn grant_and_token_expiry_are_inclusive_at_bound() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let grant = Grant {
            code: mint_secret(40),
            client_id: "client".to_owned(),
            user_id: UserId::new(1),
            scopes: vec!["email".to_owned()],
            redirect_uri: "https://intervention.example/cb".to_owned(),
            expires: now + grant_ttl(),
        };
        assert!(!grant.is_expired(now + Duration::seconds(99)));
        assert!(grant.is_expired(now + Duration::seconds(100)));
    }

    #[rstest]
    fn token_scope_coverage() {
        let token = Token {
            access_token: mint_secret(32),
            refresh_token: mint_secret(32),
            client_id: "client".to_owned(),
            user_id: UserId::new(1),
            scopes: vec!["email".to_owned(), "assessment".to_owned()],
            expires: Utc::now() + token_ttl(),
            service: false,
        };
        assert!(token.covers(&["email".to_owned()]));
        assert!(!token.covers(&["admin".to_owned()]));
    }

    #[rstest]
    fn minted_secrets_are_distinct() {
        assert_ne!(mint_secret(32), mint_secret(32));
        assert_eq!(mint_secret(40).len(), 40);
    }
}
