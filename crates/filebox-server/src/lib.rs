//! Filebox Server Library
//!
//! File metadata service: read-through cached listing and lookup, owner-scoped
//! writes that invalidate the cache, time-limited public share links and a
//! background sweep that retires expired files.

pub mod auth;
pub mod blob;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod service;
pub mod share;
pub mod state;
pub mod store;
pub mod sweeper;

#[cfg(test)]
mod testing;

pub use config::{Config, CoreConfig};
pub use error::{AppError, Result, ServerError};
pub use server::{create_router, start_server};
pub use state::AppState;
