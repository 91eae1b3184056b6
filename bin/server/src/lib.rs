//! gatehouse web server.
//!
//! This crate wires the OIDC login flow and the session middleware from
//! `gatehouse-platform-access` into an Axum application: routes, cookies,
//! the openidconnect provider, and the Postgres user directory.

pub mod app;
pub mod auth;
pub mod config;
