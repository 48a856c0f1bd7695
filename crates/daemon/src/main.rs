// kzrnote: claim the session or forward the command line to its owner.

use std::process::ExitCode;

use kzrnote_daemon::runtime::{self, Invocation};

fn main() -> ExitCode {
    // stdout carries relayed command-line output only.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("kzrnote: failed to start the async runtime: {error}");
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(runtime::run(Invocation::from_env()))
}
