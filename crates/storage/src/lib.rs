//! Persistence for attempts, mastery records and difficulty state.
//!
//! `repository` defines the async contracts plus an in-memory adapter;
//! `sqlite` provides the `sqlx`-backed implementation.

pub mod repository;
pub mod sqlite;
