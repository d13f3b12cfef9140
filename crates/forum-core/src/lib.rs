//! Core types, gateway ports and client-side state containers for the forum.
//!
//! This crate knows nothing about any particular backend. Storage and
//! authentication are reached through the [`gateway::DocumentStore`] and
//! [`gateway::AuthService`] traits; `forum-store-sqlite` and the in-process
//! [`memory::MemoryGateway`] implement them.

pub mod error;
pub mod event;
pub mod events;
pub mod gateway;
pub mod guard;
pub mod memory;
pub mod session;
pub mod tree;
pub mod user;
pub mod vote;
pub mod votes;

mod listener;

pub use error::{AuthFailure, Error, Result};

/// Root of the events collection in the gateway namespace.
pub const EVENTS: &str = "events";

/// Root of the votes collection in the gateway namespace.
pub const VOTES: &str = "votes";
