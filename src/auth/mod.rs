//! # Authentication Module
//!
//! Guest token issuance and validation, the bearer-token middleware that gates
//! protected endpoints, and the reference guard applied inside them.

pub mod guard;
pub mod jwt;
pub mod middleware;
pub mod models;
