//! The SWMS compliance server.
//!
//! This server performs several tasks in the SWMS compliance workflow:
//!
//! * Run the campaign actions of the admin console (reminders, bulk
//!   approvals, compliance checks, alerts, broadcasts and reports) as single
//!   transactions, each with an audit record.
//! * Expose a GraphQL API to read and maintain jobs, contractors,
//!   submissions and campaigns, including the activity timeline.
//! * Serve the admin console assets and the generated reports.
//!
//! Run `swms server` to start serving, or `swms migrate` to only bring the
//! database schema up to date.
#![deny(
    clippy::all,
    clippy::nursery,
    deprecated_in_future,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms,
    unused_results,
    unused_qualifications,
    unused_import_braces,
    unsafe_code,
    unreachable_pub,
    trivial_casts,
    trivial_numeric_casts
)]
#![warn(variant_size_differences)]
#![allow(clippy::multiple_crate_versions)]
#![doc(html_root_url = "https://docs.rs/swms-server/0.1.0")]

// This is needed for statically linking.
//
// see: https://git.io/fj2CG
#[allow(unused_extern_crates)]
extern crate openssl;

mod admin;
mod command;
mod config;
mod dispatch;
mod graphql;
mod handlers;
mod models;
mod orchestrator;
mod report;
mod resources;
#[allow(unused_qualifications)]
mod schema;
mod server;
mod store;

use crate::server::Server;
use diesel_migrations::{embed_migrations, EmbeddedMigrations};
use std::env;
use tracing_subscriber::EnvFilter;

// Embeds all migrations inside the binary, so that they can be run when needed
// on startup.
pub(crate) const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

const DEFAULT_LOG_FILTER: &str = "swms=info,actix_web=info";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let run = || match args.get(1).map(String::as_str) {
        Some("server") => Server::from_environment()?.run_to_completion(),
        Some("migrate") => server::migrate(),
        _ => Err("usage: swms [server|migrate]".into()),
    };

    if let Err(err) = run() {
        tracing::error!(error = %err, "exiting");
        std::process::exit(1);
    }
}
