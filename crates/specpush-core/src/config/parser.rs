//! TOML parser with helpful error messages

use super::schema::ProvisionerConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse specpush.toml with detailed error messages
pub fn parse_config(path: &Path) -> Result<ProvisionerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse specpush.toml content from string
pub fn parse_config_str(content: &str) -> Result<ProvisionerConfig> {
    toml::from_str(content).map_err(|e| enhance_toml_error(e, content))
}

/// Point at the offending line when the TOML error carries a span.
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message().to_string();
    match error.span() {
        Some(span) => {
            let line_num = content[..span.start.min(content.len())]
                .matches('\n')
                .count()
                + 1;
            anyhow::anyhow!(
                "TOML parsing error at line {line_num}:\n{}\n\nError: {message}",
                line_context(content, line_num)
            )
        }
        None => anyhow::anyhow!("TOML parsing error: {message}"),
    }
}

fn line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());

    lines[start.min(end)..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{marker} {num:4} | {line}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
