// `kzrnote-ctl version` and `kzrnote-ctl quit`.

use kzrnote_common::protocol::rpc_methods::{APP_QUIT, APP_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Context;
use crate::output;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResult {
    pub coordinator: String,
    pub ctl: String,
}

pub async fn version(ctx: &Context) -> anyhow::Result<()> {
    let coordinator: String = ctx.client.call(APP_VERSION, None).await?;
    let result = VersionResult { coordinator, ctl: env!("CARGO_PKG_VERSION").to_string() };
    output::print_output(ctx.format, &result, format_version)?;
    Ok(())
}

pub async fn quit(ctx: &Context) -> anyhow::Result<()> {
    let result: Value = ctx.client.call(APP_QUIT, None).await?;
    output::print_output(ctx.format, &result, |_| String::new())?;
    Ok(())
}

fn format_version(result: &VersionResult) -> String {
    result.coordinator.clone()
}
