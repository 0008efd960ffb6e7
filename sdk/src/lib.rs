//! Building blocks shared by the toolbelt server and its clients.
//!
//! [`crypto`] protects user fields before they reach the database and
//! [`token`] issues and verifies the JWTs that identify a caller. The two
//! modules are independent; the server composes them when it refreshes an
//! access token.

pub mod client;
pub mod crypto;
mod error;
pub mod server;
pub mod signal;
pub mod token;

pub use error::{Error, Result};
