//! # vigil-store
//!
//! `SQLite` persistence for the live test-session server.
//!
//! - **[`connection`]**: `r2d2` pool with WAL mode, foreign keys, and
//!   performance pragmas applied to every connection.
//! - **[`migrations`]**: Version-tracked schema evolution, embedded at
//!   compile time and run transactionally.
//! - **[`row_types`]**: Raw row structs plus conversions to and from the
//!   domain aggregates.
//! - **[`repositories`]**: Stateless repository structs — each method takes
//!   `&Connection` and executes SQL. No shared mutable state.
//! - **[`store`]**: The [`SessionStore`] facade the rest of the system
//!   talks to. Updates are guarded by an optimistic version column.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
pub mod row_types;
pub mod store;

pub use connection::{
    new_file, new_in_memory, verify_pragmas, ConnectionConfig, ConnectionPool, PooledConnection,
    PragmaState,
};
pub use errors::{Result, StoreError};
pub use migrations::{current_version, latest_version, run_migrations};
pub use repositories::session::ListSessionsOptions;
pub use store::SessionStore;
