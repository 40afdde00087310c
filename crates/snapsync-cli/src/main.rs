#![forbid(unsafe_code)]

//! Binary entrypoint for the `snapsync` command.

use std::process;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    process::exit(snapsync_cli::run().await);
}
