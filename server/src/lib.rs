//! Presence and call-signaling relay library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod chat;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod push;
pub mod routes;
pub mod state;
pub mod voice;
pub mod ws;

#[cfg(test)]
pub(crate) mod test_support;
