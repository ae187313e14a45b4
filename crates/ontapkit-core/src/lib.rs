//! Connection management and the generic reconciliation lifecycle for
//! ONTAP-style clusters, layered on `ontapkit-api`.
//!
//! - **[`ProfileRegistry`]**: Named [`ConnectionProfile`]s; an empty name
//!   selects the only configured profile.
//!
//! - **[`ClientFactory`]**: Builds and caches [`RestClient`]s per
//!   `(profile, purpose tag)` and hands every client of one profile the same
//!   concurrency limiter.
//!
//! - **[`Poller`]**: Waits for asynchronous jobs with doubling backoff,
//!   capped interval, deadline, and cancellation.
//!
//! - **[`Reconciler`]**: Drives create / read / update / delete / import for
//!   any [`Resource`], sending only changed fields and applying one uniform
//!   not-found policy.
//!
//! - **[`Diagnostics`]**: Caller-owned sink; each failure is recorded once
//!   and surfaces as a [`Halt`].
//!
//! The crate never reads files or installs a tracing subscriber;
//! `ontapkit-config` builds the [`ProviderContext`] from disk.
//!
//! [`RestClient`]: ontapkit_api::RestClient

pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod factory;
pub mod poller;
pub mod reconcile;
pub mod registry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ClientSettings, ConnectionProfile, PollPolicy};
pub use context::ProviderContext;
pub use diagnostics::{Diagnostic, Diagnostics, Halt, Severity};
pub use error::{CoreError, ErrorKind};
pub use factory::ClientFactory;
pub use poller::{AsyncJob, JobPhase, PollState, Poller};
pub use reconcile::{
    ClusterVersion, Created, DeleteOutcome, FieldRule, ImportFormat, Mutability, ReadOutcome,
    ReconcileIdentity, Reconciler, Resource, StateMap, Updated, check_update,
    check_version_gates, diff, present,
};
pub use registry::ProfileRegistry;
