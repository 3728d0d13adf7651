// ── Domain model ──
//
// The merged per-device view assembled by the coordinator, plus
// decoding of the server's raw attribute maps into human-readable
// alarms and warnings.

pub mod alerts;
pub mod tracked;

pub use tracked::{Snapshot, TrackedDevice};
