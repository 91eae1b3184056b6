//! Core types shared by the gatehouse crates.
//!
//! This crate provides the foundational identifier types and the
//! `Result` alias used by the authentication layers above it.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, UserId};
