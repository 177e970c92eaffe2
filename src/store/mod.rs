//! Durable store — PostgreSQL backend for storage credentials and users.
//!
//! Shares the same database as the main Formora backend; the tables here
//! are only ever touched through single-row keyed reads and updates.

pub mod db;

pub use db::{CredentialRecord, Store, UserRecord, UserStatus};
