//! # SWMS
//!
//! Tracks contractor compliance with Safe Work Method Statements (SWMS): the
//! safety document every contractor has to lodge before working on a job.
//!
//! The system consists of two crates:
//!
//! * [`swms-core`][c] (this one) – Provides the pure building blocks: the
//!   status enums, the compliance engine and the timeline merge.
//! * [`swms-server`][s] – A server application with a command endpoint to run
//!   campaign actions, a GraphQL API for the admin console, and persistent
//!   storage.
//!
//! [c]: https://docs.rs/swms-core
//! [s]: https://docs.rs/swms-server
//!
//! # Core
//!
//! Nothing in this crate touches a database or the network. The server reads
//! rows, converts them into the types of this crate and asks it for figures:
//!
//! * [`compliance`] computes per-job completion metrics and the system-wide
//!   compliance rate.
//! * [`timeline`] merges the different event sources into one feed.
//!
//! # Package Features
//!
//! * `diesel` – maps the status enums onto Postgres enum types.
//! * `juniper` – exposes the enums and metrics as GraphQL types.
#![deny(nonstandard_style, rust_2018_idioms, unsafe_code)]
#![warn(
    clippy::all,
    future_incompatible,
    clippy::pedantic,
    missing_docs,
    missing_debug_implementations,
    unused_qualifications,
    unused_import_braces
)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]
#![doc(html_root_url = "https://docs.rs/swms-core/0.1.0")]

pub mod compliance;
pub mod status;
pub mod timeline;

pub use compliance::{
    compliance_rate, job_metrics, ComplianceCounts, JobMetrics, OverdueThreshold,
    SubmissionRecord,
};
pub use status::{AuditResult, CampaignStatus, DeliveryStatus, JobStatus, SubmissionStatus};
pub use timeline::{Category, Event, Filter, Outcome, Timeline};

#[cfg(feature = "diesel")]
pub use status::{
    AuditResultMapping, CampaignStatusMapping, DeliveryStatusMapping, JobStatusMapping,
    SubmissionStatusMapping,
};
