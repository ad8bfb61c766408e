//! Trace identifier correlating logs, errors, and responses.
//!
//! The id travels in tokio task-local storage rather than as a parameter,
//! so any code running inside the request scope can read it. Spawned tasks
//! start without one; wrap their future in [`TraceId::scope`] to carry the
//! id across.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use uuid::Uuid;

/// Response header carrying the request's trace identifier.
pub const TRACE_ID_HEADER: &str = "trace-id";

tokio::task_local! {
    pub(crate) static TRACE_ID: TraceId;
}

/// Random identifier minted once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceId(Uuid);

impl TraceId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The identifier active in the current task scope, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        TRACE_ID.try_with(|id| *id).ok()
    }

    /// Run `fut` with `trace_id` active in its task scope.
    pub async fn scope<Fut>(trace_id: Self, fut: Fut) -> Fut::Output
    where
        Fut: Future,
    {
        TRACE_ID.scope(trace_id, fut).await
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TraceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scoped_futures_see_their_own_id() {
        let minted = TraceId::generate();
        let seen = TraceId::scope(minted, async move { TraceId::current() }).await;
        assert_eq!(seen, Some(minted));
    }

    #[tokio::test]
    async fn no_id_leaks_outside_a_scope() {
        assert!(TraceId::current().is_none());
    }

    #[tokio::test]
    async fn parses_back_from_its_display_form() {
        let id = TraceId::generate();
        let reparsed: TraceId = id.to_string().parse().expect("uuid text");
        assert_eq!(reparsed, id);
    }
}
