//! Async client for the MOOX Track fleet-tracking server.
//!
//! The server speaks a small cookie-authenticated REST API:
//! `POST /api/session` to log in, then plain JSON `GET` endpoints for
//! devices, positions, geofences, server info, and event reports.
//!
//! [`MooxClient`] owns the HTTP session and handles the whole
//! authentication lifecycle transparently: login on first use, session
//! re-establishment when the server invalidates cookies, exponential
//! backoff between login attempts, and bounded retries for transient
//! failures. Callers see a flat [`Error`] taxonomy instead of HTTP
//! status codes: credential failures, expired sessions, transient
//! connection errors, and non-retriable API errors are distinct
//! variants so the policy layer can react to each differently.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod models;
pub mod transport;

pub use client::MooxClient;
pub use error::Error;
pub use models::{Device, DeviceStatus, Event, Geofence, Position, Server};
pub use transport::{SessionJar, TransportConfig};
