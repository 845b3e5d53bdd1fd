//! busybus daemon binary.
//!
//! # Usage
//!
//! ```bash
//! busybusd --sockpath /tmp/bbus.sock
//! ```

use std::process::ExitCode;

use busybusd::cli::Args;
use busybusd::{event_loop, logging};
use clap::Parser;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    logging::init();

    let args = Args::parse();
    let sockpath = args.resolve_sockpath();

    tracing::info!("busybusd starting");

    match event_loop::run(&sockpath).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "busybusd exiting on error");
            ExitCode::FAILURE
        },
    }
}
