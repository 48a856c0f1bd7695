// `kzrnote-ctl ls`: list every note.

use clap::Args;
use kzrnote_common::protocol::rpc_methods::{NOTE_LIST, NOTE_TITLE};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Context;
use crate::output;

#[derive(Debug, Args)]
pub struct LsArgs {
    /// Print URIs only, skipping the title lookups.
    #[arg(long)]
    pub uris: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LsResult {
    #[serde(default)]
    pub notes: Vec<NoteEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteEntry {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

pub async fn run(args: LsArgs, ctx: &Context) -> anyhow::Result<()> {
    let uris: Vec<String> = ctx.client.call(NOTE_LIST, None).await?;
    let mut notes = Vec::with_capacity(uris.len());
    for uri in uris {
        let title = if args.uris {
            None
        } else {
            Some(ctx.client.call::<String>(NOTE_TITLE, Some(json!({ "uri": uri }))).await?)
        };
        notes.push(NoteEntry { uri, title });
    }
    output::print_output(ctx.format, &LsResult { notes }, format_human)?;
    Ok(())
}

fn format_human(result: &LsResult) -> String {
    result
        .notes
        .iter()
        .map(|note| match &note.title {
            Some(title) => format!("{}\t{title}", note.uri),
            None => note.uri.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
