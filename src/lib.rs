//! Recruiter AI Client Library
//!
//! This library talks to the Recruiter AI backend: it submits
//! natural-language hiring queries, follows the resulting jobs until they
//! finish, and manages the ranked company leads they produce.
//!
//! # Modules
//!
//! - `api_client`: HTTP wrapper for every backend endpoint.
//! - `auth`: Auth state container (login, logout, session check).
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `leads`: Lead state container (leads, queries, feedback, export).
//! - `models`: Data models and backend payloads.
//! - `poller`: Cancellable status polling for submitted queries.
//! - `session_store`: Persisted token and recruiter id.

pub mod api_client;
pub mod auth;
pub mod config;
pub mod errors;
pub mod leads;
pub mod models;
pub mod poller;
pub mod session_store;

use std::sync::Arc;

/// Everything a front end needs, wired from one `Config`.
///
/// Both containers share the same HTTP client, so logging in through
/// `auth` authenticates every later `leads` call.
pub struct App {
    pub config: config::Config,
    pub auth: auth::AuthStore,
    pub leads: leads::LeadStore,
}

impl App {
    pub fn new(
        config: config::Config,
        storage: Arc<dyn session_store::SessionStore>,
    ) -> Result<Self, errors::AppError> {
        let client = api_client::RecruiterApiClient::from_config(&config)?;
        let auth = auth::AuthStore::new(client.clone(), storage);
        let leads = leads::LeadStore::new(client, poller::PollConfig::from(&config));
        Ok(Self {
            config,
            auth,
            leads,
        })
    }

    /// Builds the app with the session file named in `config`.
    pub fn with_file_storage(config: config::Config) -> Result<Self, errors::AppError> {
        let storage = Arc::new(session_store::FileSessionStore::new(
            config.session_file.clone(),
        ));
        Self::new(config, storage)
    }
}
