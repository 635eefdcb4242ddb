//! Outreach relay: a durable job orchestrator for session-mediated outreach.
//!
//! Jobs enter as `pending`, pass a preflight gate (session health + daily
//! quota), get dispatched through the extension bridge, and either confirm
//! delivery or walk a fixed backoff ladder until they dead-letter. Periodic
//! sweeps drive pending, retry-due, and unconfirmed jobs; an append-only
//! audit trail records every transition.

pub mod assets;
pub mod config;
pub mod database;
pub mod errors;
pub mod models;
pub mod services;
pub mod session;
pub mod utils;
pub mod web;
