//! Outbound side of the Fiscal Harmony bridge.
//!
//! [`client::FiscalHarmonyClient`] wraps the remote HTTP API, [`payload`]
//! builds the submission bodies, and [`signing`] implements the shared
//! HMAC request-signature scheme (also used by the inbound webhook).

pub mod client;
pub mod payload;
pub mod signing;

pub use client::{CredentialCheckError, FiscalHarmonyClient, MappingKind};
pub use payload::{build_payload, PayloadError};
pub use signing::{canonical_body, sign_payload, verify_signature};
