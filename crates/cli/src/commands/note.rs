// Per-note subcommands: `cat`, `title`, `set`, `rm`, `show`.

use anyhow::{bail, Context as _};
use clap::Args;
use kzrnote_common::protocol::rpc_methods::{
    NOTE_CONTENTS, NOTE_DELETE, NOTE_DISPLAY, NOTE_EXISTS, NOTE_SET_CONTENTS, NOTE_TITLE,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::Context;
use crate::output;

#[derive(Debug, Args)]
pub struct UriArgs {
    /// Note URI, as printed by `ls` or `new`.
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentsResult {
    pub uri: String,
    pub contents: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleResult {
    pub uri: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub uri: String,
    pub ok: bool,
}

pub async fn cat(args: UriArgs, ctx: &Context) -> anyhow::Result<()> {
    ensure_exists(ctx, &args.uri).await?;
    let contents: String = ctx.client.call(NOTE_CONTENTS, Some(json!({ "uri": args.uri }))).await?;
    let result = ContentsResult { uri: args.uri, contents };
    output::print_output(ctx.format, &result, format_contents)?;
    Ok(())
}

pub async fn title(args: UriArgs, ctx: &Context) -> anyhow::Result<()> {
    ensure_exists(ctx, &args.uri).await?;
    let title: String = ctx.client.call(NOTE_TITLE, Some(json!({ "uri": args.uri }))).await?;
    let result = TitleResult { uri: args.uri, title };
    output::print_output(ctx.format, &result, |r| r.title.clone())?;
    Ok(())
}

pub async fn set(args: UriArgs, ctx: &Context) -> anyhow::Result<()> {
    let contents = read_contents(tokio::io::stdin()).await?;
    let ok: bool = ctx
        .client
        .call(NOTE_SET_CONTENTS, Some(json!({ "uri": args.uri, "contents": contents })))
        .await?;
    finish_action(ctx, args.uri, ok, "could not write")
}

pub async fn rm(args: UriArgs, ctx: &Context) -> anyhow::Result<()> {
    let ok: bool = ctx.client.call(NOTE_DELETE, Some(json!({ "uri": args.uri }))).await?;
    finish_action(ctx, args.uri, ok, "no such note")
}

pub async fn show(args: UriArgs, ctx: &Context) -> anyhow::Result<()> {
    let ok: bool = ctx.client.call(NOTE_DISPLAY, Some(json!({ "uri": args.uri }))).await?;
    finish_action(ctx, args.uri, ok, "could not open")
}

async fn ensure_exists(ctx: &Context, uri: &str) -> anyhow::Result<()> {
    let exists: bool = ctx.client.call(NOTE_EXISTS, Some(json!({ "uri": uri }))).await?;
    if !exists {
        bail!("no such note: {uri}");
    }
    Ok(())
}

fn finish_action(ctx: &Context, uri: String, ok: bool, failure: &str) -> anyhow::Result<()> {
    if !ok {
        bail!("{failure}: {uri}");
    }
    output::print_output(ctx.format, &ActionResult { uri, ok }, |_| String::new())?;
    Ok(())
}

async fn read_contents<R>(mut reader: R) -> anyhow::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut contents = String::new();
    reader.read_to_string(&mut contents).await.context("failed to read note text from stdin")?;
    Ok(contents)
}

/// Note text already ends in a newline most of the time; don't add another.
fn format_contents(result: &ContentsResult) -> String {
    result.contents.strip_suffix('\n').unwrap_or(&result.contents).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;

    #[test]
    fn contents_drop_one_trailing_newline() {
        let result = ContentsResult { uri: "note://kzrnote/a".into(), contents: "Title\nbody\n".into() };
        assert_eq!(format_contents(&result), "Title\nbody");

        let bare = ContentsResult { uri: "note://kzrnote/a".into(), contents: "Title".into() };
        assert_eq!(format_contents(&bare), "Title");
    }

    #[test]
    fn json_contents_keep_the_exact_text() {
        let result = ContentsResult { uri: "note://kzrnote/a".into(), contents: "Title\n\n".into() };
        let mut buf = Vec::new();
        output::write_output(&mut buf, OutputFormat::Json, &result, format_contents).unwrap();
        let parsed: ContentsResult = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed.contents, "Title\n\n");
    }

    #[tokio::test]
    async fn reads_contents_verbatim() {
        let contents = read_contents(&b"Shopping\n- milk\n"[..]).await.unwrap();
        assert_eq!(contents, "Shopping\n- milk\n");
    }

    #[tokio::test]
    async fn rejects_non_utf8_input() {
        let error = read_contents(&[0xff, 0xfe][..]).await.unwrap_err();
        assert!(error.to_string().contains("stdin"));
    }
}
