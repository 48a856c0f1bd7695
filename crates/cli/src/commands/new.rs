// `kzrnote-ctl new`: create a note.

use clap::Args;
use kzrnote_common::protocol::rpc_methods::{NOTE_CREATE, NOTE_CREATE_NAMED};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Context;
use crate::output;

#[derive(Debug, Args)]
pub struct NewArgs {
    /// Title of the new note. Without one the note starts empty.
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewResult {
    pub uri: String,
}

pub async fn run(args: NewArgs, ctx: &Context) -> anyhow::Result<()> {
    let uri: String = match &args.title {
        Some(title) => ctx.client.call(NOTE_CREATE_NAMED, Some(json!({ "title": title }))).await?,
        None => ctx.client.call(NOTE_CREATE, None).await?,
    };
    output::print_output(ctx.format, &NewResult { uri }, format_human)?;
    Ok(())
}

fn format_human(result: &NewResult) -> String {
    result.uri.clone()
}
