//! Tracker library
//!
//! Offline-first tasks, notes, habits and focus sessions. The same crate
//! provides the device side (local store, services, sync orchestrator) and
//! the reconciliation server.

pub mod app;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod remote;
pub mod server;
pub mod services;
pub mod sync;
