//! Wirechat - terminal chat client
//!
//! Sends every line read from stdin as a message frame and prints the body
//! of every frame received.

use std::io::BufRead;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wirechat_net::{resolve, Client, ClientHandle, CloseReason};

mod cli;
mod error;
mod output;

use cli::Args;
use error::{Error, Result};
use output::{spawn_printer, PrintSink};

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging; stdout is reserved for message bodies
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let session = args.session()?;

    let runtime = tokio::runtime::Runtime::new().map_err(Error::Runtime)?;
    let (bodies_tx, printer) = spawn_printer(std::io::stdout());
    let result = runtime.block_on(async {
        let endpoints = resolve(&args.host, args.port).await?;

        let (closed_tx, closed_rx) = oneshot::channel();
        let sink = PrintSink::new(bodies_tx, closed_tx);
        let client = Client::connect(endpoints, session, sink)?;

        let handle = client.handle();
        std::thread::spawn(move || forward_stdin(handle));

        client.join().await;
        match closed_rx.await {
            Ok(CloseReason::ConnectFailed(reason)) => Err(Error::ConnectFailed(reason)),
            Ok(reason) => {
                info!(reason = %reason, "Connection closed");
                Ok(())
            }
            Err(_) => Ok(()),
        }
    });

    // The stdin thread may still be blocked on a read
    runtime.shutdown_background();

    // Every sender is gone with the connection task; let the printer drain
    if printer.join().is_err() {
        warn!("Output thread panicked");
    }
    result
}

/// Send each stdin line until EOF, then request close.
///
/// Runs on its own thread; the handle posts into the connection task.
fn forward_stdin(handle: ClientHandle) {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut line = Vec::new();

    loop {
        line.clear();
        match input.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                if line.last() == Some(&b'\n') {
                    line.pop();
                }
                if let Err(e) = handle.send_line(&line) {
                    debug!(error = %e, "Connection gone, stopping input");
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        }
    }

    debug!("Input closed");
    handle.close();
}
