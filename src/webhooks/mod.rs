//! Inbound webhook handlers.

pub mod clerk;
