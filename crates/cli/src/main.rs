// kzrnote-ctl: script a running kzrnote coordinator over its socket.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod client;
mod commands;
mod exit_code;
mod output;

use client::CoordinatorClient;
use commands::Context;
use exit_code::ExitCode;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "kzrnote-ctl", version, about = "Script a running kzrnote")]
struct Cli {
    /// Force JSON output even on a terminal.
    #[arg(long, global = true)]
    json: bool,

    /// Coordinator socket. Defaults to $KZRNOTE_SOCKET, then the session socket.
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Seconds to wait for each response.
    #[arg(long, global = true, default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> std::process::ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            let code = if error.use_stderr() { ExitCode::Usage } else { ExitCode::Success };
            return code.into();
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let format = OutputFormat::detect(cli.json);
    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(anyhow::Error::from)
        .and_then(|runtime| runtime.block_on(run(cli)));

    match result {
        Ok(()) => ExitCode::Success.into(),
        Err(error) => {
            output::print_anyhow_error(format, &error);
            ExitCode::from_error(&error).into()
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = CoordinatorClient::for_session(cli.socket)?
        .with_timeout(Duration::from_secs(cli.timeout.max(1)));
    debug!(socket_path = %client.socket_path().display(), "using coordinator socket");

    let ctx = Context { client, format: OutputFormat::detect(cli.json) };
    commands::run(cli.command, &ctx).await
}
