//! Server configuration parsed from the command line and environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use actix_web::cookie::Key;
use clap::{ArgAction, Parser};

/// Runtime configuration for the portal backend.
///
/// Every flag has an environment-variable fallback so container deployments
/// can run the binary without arguments. Without `DATABASE_URL` the server
/// falls back to the in-memory store, which only suits local development.
#[derive(Debug, Parser)]
#[command(name = "portal-backend", about = "Patient portal backend server")]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// File holding the session key material.
    #[arg(
        long,
        env = "SESSION_KEY_FILE",
        default_value = "/var/run/secrets/session_key"
    )]
    pub session_key_file: PathBuf,

    /// Permit an ephemeral session key when the key file is unreadable.
    /// Sessions do not survive a restart with an ephemeral key.
    #[arg(long, env = "SESSION_ALLOW_EPHEMERAL", action = ArgAction::SetTrue)]
    pub session_allow_ephemeral: bool,

    /// Set the `Secure` attribute on the session cookie.
    #[arg(
        long,
        env = "SESSION_COOKIE_SECURE",
        action = ArgAction::Set,
        default_value_t = true
    )]
    pub cookie_secure: bool,

    /// Origins OAuth clients may use as redirect targets, comma separated.
    #[arg(long, env = "TRUSTED_ORIGINS", value_delimiter = ',')]
    pub trusted_origins: Vec<String>,

    /// Minutes between reminder scheduler passes.
    #[arg(long, env = "REMINDER_TICK_MINUTES", default_value_t = 15)]
    pub reminder_tick_minutes: u32,

    /// Seconds the task worker sleeps between queue polls.
    #[arg(long, env = "WORKER_POLL_SECONDS", default_value_t = 5)]
    pub worker_poll_seconds: u64,
}

impl ServerConfig {
    /// Load the session key from [`Self::session_key_file`].
    ///
    /// Debug builds and deployments that opted in via
    /// `SESSION_ALLOW_EPHEMERAL` fall back to a freshly generated key when
    /// the file cannot be read.
    ///
    /// # Errors
    /// Returns [`std::io::Error`] when the key file is unreadable and no
    /// ephemeral fallback applies.
    pub fn session_key(&self) -> std::io::Result<Key> {
        match std::fs::read(&self.session_key_file) {
            Ok(bytes) => Ok(Key::derive_from(&bytes)),
            Err(err) => {
                if cfg!(debug_assertions) || self.session_allow_ephemeral {
                    tracing::warn!(
                        path = %self.session_key_file.display(),
                        error = %err,
                        "using temporary session key (dev only)"
                    );
                    Ok(Key::generate())
                } else {
                    Err(std::io::Error::other(format!(
                        "failed to read session key at {}: {err}",
                        self.session_key_file.display()
                    )))
                }
            }
        }
    }
}
