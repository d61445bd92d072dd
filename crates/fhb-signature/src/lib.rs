//! Signature lifecycle tracker.
//!
//! A [`fhb_schemas::SignatureRecord`] never stores its state; the state is
//! derived from the record's fields on every read. This crate owns that
//! derivation, the display classification used by record listings, the
//! rule for which remote actions a viewer may trigger, the merge rule for
//! remote status updates, and the per-record dispatch guard that enforces
//! "one in-flight action, reload before the next".
//!
//! # State diagram (derived)
//!
//! ```text
//!   Pending ──submission accepted──► AwaitingSigningData ──QR data──► Fiscalised (term.)
//!      │                                     │
//!      │ actionable failure                  │ actionable failure
//!      ▼                                     ▼
//!   RetryPending ──retry accepted──► Pending          Failed (error set, no retry flag)
//! ```
//!
//! Transitions are driven only by applying remote status updates; this
//! crate reads state and offers the triggering actions, nothing more.

pub mod actions;
pub mod classify;
pub mod dispatch;
pub mod state;
pub mod store;

pub use actions::{available_actions, Action, Role};
pub use classify::{classify, ListFilter, StatusColor, StatusIndicator};
pub use dispatch::{DispatchError, DispatchGuard};
pub use state::{apply_status_update, InvalidRecord, SignatureState, UpdateError};
pub use store::{MemoryStore, SignatureStore, StoreError};
