//! Data-acquisition core for MOOX Track.
//!
//! This crate sits between [`moox_api`] and whatever presents the data
//! (the `moox` CLI here, or any host integration):
//!
//! - **[`Coordinator`]** — Runs the poll cycle: fans out the three data
//!   fetches concurrently, classifies failures by severity, consults the
//!   grace policy, and publishes an atomically-replaced [`Snapshot`]
//!   through a `watch` channel. Event import runs on its own timer and
//!   broadcasts [`EventNotification`]s.
//!
//! - **[`GracePolicy`]** — Converts sustained failures into a single
//!   escalate/serve-stale decision, anchored to the *first* failure of
//!   the current outage. That timestamp is the one durable fact of the
//!   whole system, persisted through [`StateStore`].
//!
//! - **Domain model** ([`model`]) — The per-device merge of device,
//!   position, geofence, and computed attributes, plus alarm/warning
//!   decoding of the raw attribute maps.
//!
//! Brief blips never reach the consumer: the API client retries
//! transient failures internally, and the coordinator keeps serving the
//! last-known snapshot through the grace window. Only sustained outages
//! escalate, and they distinguish "re-enter credentials" from "will
//! retry on its own".

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod grace;
pub mod model;
pub mod persist;
pub mod snapshot;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::TrackerConfig;
pub use coordinator::{Coordinator, CoordinatorStatus};
pub use error::CoreError;
pub use events::{EventNotification, event_display_name};
pub use grace::{FailureKind, GraceDecision, GracePolicy};
pub use model::{Snapshot, TrackedDevice};
pub use persist::{FileStateStore, MemoryStateStore, StateStore};

// Re-export wire models at the crate root for ergonomics.
pub use moox_api::{Device, DeviceStatus, Event, Geofence, Position};
