// `kzrnote-ctl search` and `kzrnote-ctl find`.

use anyhow::bail;
use clap::Args;
use kzrnote_common::protocol::rpc_methods::{NOTE_FIND, NOTE_SEARCH};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Context;
use crate::output;

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Fixed string to look for in note text.
    pub query: String,

    /// Match case exactly.
    #[arg(long)]
    pub case_sensitive: bool,
}

#[derive(Debug, Args)]
pub struct FindArgs {
    /// Exact, case-sensitive title.
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    #[serde(default)]
    pub uris: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindResult {
    pub title: String,
    pub uri: String,
}

pub async fn run(args: SearchArgs, ctx: &Context) -> anyhow::Result<()> {
    let uris: Vec<String> = ctx
        .client
        .call(NOTE_SEARCH, Some(json!({ "query": args.query, "case_sensitive": args.case_sensitive })))
        .await?;
    let result = SearchResult { query: args.query, uris };
    output::print_output(ctx.format, &result, format_human)?;
    Ok(())
}

pub async fn find(args: FindArgs, ctx: &Context) -> anyhow::Result<()> {
    let uri: String = ctx.client.call(NOTE_FIND, Some(json!({ "title": args.title }))).await?;
    if uri.is_empty() {
        bail!("no note titled \"{}\"", args.title);
    }
    output::print_output(ctx.format, &FindResult { title: args.title, uri }, |r| r.uri.clone())?;
    Ok(())
}

fn format_human(result: &SearchResult) -> String {
    result.uris.join("\n")
}
