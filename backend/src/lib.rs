//! Patient-portal backend: questionnaire scheduling, assessment status, and
//! the OAuth broker for satellite interventions.
//!
//! The crate is organised hexagonally. [`domain`] holds entities, the
//! scheduling and status engines, the services, and the ports they need.
//! [`inbound`] adapts HTTP onto the services; [`outbound`] implements the
//! ports over Postgres, an in-process cache, SMTP-shaped mail, and the
//! persisted task queue. [`server`] wires configuration into a running
//! application and [`doc`] carries the OpenAPI description.

pub mod doc;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
pub mod server;
