//! Reading invocations and manifests
//!
//! Accepted inputs:
//! - a single JSON invocation object
//! - a JSON array of invocations
//! - a TOML manifest of `[[resource]]` tables

use anyhow::{Context, Result, bail};
use declarative::{Invocation, ReconcilePlan};
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
}

/// TOML manifest
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    resource: Vec<Invocation>,
}

/// A parsed input
#[derive(Debug)]
pub struct Loaded {
    pub plan: ReconcilePlan,
    /// Input was one invocation object rather than a manifest
    pub single: bool,
}

/// Load a file, or stdin when `path` is `-`.
pub fn load(path: &Path) -> Result<Loaded> {
    let (content, source) = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Could not read invocation from stdin")?;
        (buf, "stdin".to_string())
    } else {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        (content, path.display().to_string())
    };

    let format = detect_format(path, &content);
    log::debug!("Reading {source} as {format:?}");
    parse(&content, format).with_context(|| format!("Invalid invocation in {source}"))
}

/// Pick a format from the file extension, else from the leading characters.
pub fn detect_format(path: &Path, content: &str) -> Format {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Format::Toml,
        Some("json") => Format::Json,
        _ => {
            let head = content.trim_start();
            // `[[resource]]` opens a TOML manifest
            if head.starts_with('{') || (head.starts_with('[') && !head.starts_with("[[")) {
                Format::Json
            } else {
                Format::Toml
            }
        }
    }
}

pub fn parse(content: &str, format: Format) -> Result<Loaded> {
    let (invocations, single) = match format {
        Format::Json => {
            let value: Value = serde_json::from_str(content).context("Invalid JSON")?;
            match value {
                Value::Array(_) => (
                    serde_json::from_value::<Vec<Invocation>>(value)
                        .context("Invalid invocation list")?,
                    false,
                ),
                Value::Object(_) => (
                    vec![serde_json::from_value::<Invocation>(value).context("Invalid invocation")?],
                    true,
                ),
                _ => bail!("Expected an invocation object or an array of invocations"),
            }
        }
        Format::Toml => {
            let manifest: Manifest = toml::from_str(content).context("Invalid TOML manifest")?;
            (manifest.resource, false)
        }
    };

    if invocations.is_empty() {
        bail!("No resources declared");
    }
    for invocation in &invocations {
        if invocation.identity.trim().is_empty() {
            bail!("A {} invocation has an empty identity", invocation.kind);
        }
    }

    let plan = ReconcilePlan::from_invocations(invocations)?;
    Ok(Loaded { plan, single })
}
