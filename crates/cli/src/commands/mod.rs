// CLI subcommand dispatch.

use clap::Subcommand;

use crate::client::CoordinatorClient;
use crate::output::OutputFormat;

pub mod app;
pub mod ls;
pub mod new;
pub mod note;
pub mod search;

/// What every subcommand runs against.
pub struct Context {
    pub client: CoordinatorClient,
    pub format: OutputFormat,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a note, optionally with a title
    New(new::NewArgs),
    /// List every note, newest first
    Ls(ls::LsArgs),
    /// Print the text of a note
    Cat(note::UriArgs),
    /// Print the title of a note
    Title(note::UriArgs),
    /// Replace the text of a note with stdin
    Set(note::UriArgs),
    /// Move a note to the attic
    Rm(note::UriArgs),
    /// Open a note in its editor window
    Show(note::UriArgs),
    /// Search note text with the configured grep
    Search(search::SearchArgs),
    /// Look up a note by its exact title
    Find(search::FindArgs),
    /// Print the coordinator version
    Version,
    /// Ask the coordinator to exit
    Quit,
}

pub async fn run(cmd: Command, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        Command::New(args) => new::run(args, ctx).await,
        Command::Ls(args) => ls::run(args, ctx).await,
        Command::Cat(args) => note::cat(args, ctx).await,
        Command::Title(args) => note::title(args, ctx).await,
        Command::Set(args) => note::set(args, ctx).await,
        Command::Rm(args) => note::rm(args, ctx).await,
        Command::Show(args) => note::show(args, ctx).await,
        Command::Search(args) => search::run(args, ctx).await,
        Command::Find(args) => search::find(args, ctx).await,
        Command::Version => app::version(ctx).await,
        Command::Quit => app::quit(ctx).await,
    }
}
