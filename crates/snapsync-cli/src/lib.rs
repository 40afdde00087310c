#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::redundant_pub_crate)]

//! Command-line client that asks a storage cluster to resume SnapMirror
//! replication for one relationship.
//!
//! Layout:
//! - `cli.rs`: argument parsing, logging setup, and the top-level error handler
//! - `context.rs`: validated, immutable connection settings
//! - `client.rs`: REST client for the relationship endpoint
//! - `resync.rs`: lookup-then-trigger orchestration
//! - `error.rs`: error taxonomy and exit-code mapping
//! - `main.rs`: thin entrypoint delegating to `run()`

pub(crate) mod cli;
pub(crate) mod client;
pub(crate) mod context;
pub(crate) mod error;
pub(crate) mod resync;

pub use cli::run;
