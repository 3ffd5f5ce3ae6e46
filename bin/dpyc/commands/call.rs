//! Call command - invoke a tool on a running oracle

use crate::output::{self, Tone};
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::time::Duration;

pub async fn run(url: &str, tool: &str, args: Option<String>) -> Result<()> {
    let args: Value = match args {
        Some(raw) => serde_json::from_str(&raw).context("--args must be a JSON object")?,
        None => Value::Object(Default::default()),
    };
    if !args.is_object() {
        bail!("--args must be a JSON object");
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;

    let endpoint = format!("{}/tools/{}", url.trim_end_matches('/'), tool);
    let response = client
        .post(&endpoint)
        .json(&args)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", endpoint))?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .context("Oracle returned a non-JSON response")?;

    if let Some(error) = body.get("error").and_then(Value::as_str) {
        if body.get("success") == Some(&Value::Bool(false)) {
            output::status(Tone::Fail, error);
            if !status.is_success() {
                bail!("{} failed with HTTP {}", tool, status);
            }
            return Ok(());
        }
    }

    match &body {
        Value::String(text) => println!("{}", text),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }

    if body.get("status").and_then(Value::as_str) == Some("admitted") {
        println!();
        output::status(Tone::Ok, "Admitted to the Honor Chain");
    }
    Ok(())
}
