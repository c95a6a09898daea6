//! Personal cloud drive that stores file bytes as size-capped chunks on a
//! remote document backend and keeps folder, file, and chunk metadata in SQLite.

pub mod blob;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
