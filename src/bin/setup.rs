//! linerelay setup helper.
//!
//! Asks a few questions on the terminal and writes `config.toml` into the
//! project root (`LINERELAY_ROOT`, default the current directory). Secrets
//! are never written; the generated file lists the environment variables
//! the relay expects instead.
//!
//! With `--print`: writes the generated config to stdout instead of a file.

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;

// ── Config formatting ──────────────────────────────────────────────────────────

struct ConfigParams<'a> {
    provider: &'a str,
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    timeout_secs: u64,
    host: &'a str,
    fallback: &'a str,
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
fn format_config(p: &ConfigParams<'_>) -> String {
    let fallback_line = if p.fallback.is_empty() {
        "# fallback = \"我現在有點不太舒服，晚點回覆你喔！\"".to_owned()
    } else {
        format!("fallback = {}", toml_string(p.fallback))
    };

    let provider = p.provider;
    let model = toml_string(p.model);
    let max_tokens = p.max_tokens;
    let temperature = p.temperature;
    let timeout_secs = p.timeout_secs;
    let host = toml_string(p.host);

    format!(
        r#"# Secrets are read from the environment (or a .env file):
#   LINE_CHANNEL_SECRET        webhook signing key (required)
#   LINE_CHANNEL_ACCESS_TOKEN  reply API credential (required)
#   OPENAI_API_KEY             completion API key

[server]
host = {host}

[llm]
provider = "{provider}"
model = {model}
max_tokens = {max_tokens}
temperature = {temperature:?}
timeout_secs = {timeout_secs}

[replies]
{fallback_line}
"#
    )
}

/// Quote a value as a TOML basic string.
fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_owned()).to_string()
}

fn parse_provider(input: &str) -> Result<&'static str> {
    match input.to_ascii_lowercase().as_str() {
        "" | "openai" => Ok("openai"),
        "openrouter" => Ok("openrouter"),
        "ollama" => Ok("ollama"),
        other => anyhow::bail!("Unknown provider '{other}' (expected openai, openrouter or ollama)"),
    }
}

fn parse_temperature(input: &str) -> Result<f32> {
    if input.is_empty() {
        return Ok(0.7);
    }
    let value: f32 = input
        .parse()
        .with_context(|| format!("Not a number: {input}"))?;
    if !(0.0..=2.0).contains(&value) {
        anyhow::bail!("Temperature must be between 0.0 and 2.0");
    }
    Ok(value)
}

/// Parse a count that the relay requires to be non-zero. Empty input takes
/// `default`; `key` names the config key in error messages.
fn parse_nonzero<T>(input: &str, default: T, key: &str) -> Result<T>
where
    T: FromStr + PartialEq + Default,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if input.is_empty() {
        return Ok(default);
    }
    let value: T = input
        .parse()
        .with_context(|| format!("{key} must be a positive integer, got {input}"))?;
    if value == T::default() {
        anyhow::bail!("{key} must be greater than zero");
    }
    Ok(value)
}

// ── CLI mode ───────────────────────────────────────────────────────────────────

fn run_cli() -> Result<String> {
    println!("=== linerelay setup ===\n");

    let read_line = |prompt: &str| -> Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut buf = String::new();
        io::stdin().read_line(&mut buf)?;
        Ok(buf.trim().to_owned())
    };

    let or_default = |s: String, default: &str| {
        if s.is_empty() {
            default.to_owned()
        } else {
            s
        }
    };

    let provider = parse_provider(&read_line("Provider (openai/openrouter/ollama) [openai]: ")?)?;
    let model = or_default(read_line("Model [gpt-4]: ")?, "gpt-4");
    let max_tokens: u32 =
        parse_nonzero(&read_line("Max output tokens [150]: ")?, 150, "llm.max_tokens")?;
    let temperature = parse_temperature(&read_line("Temperature [0.7]: ")?)?;
    let timeout_secs: u64 = parse_nonzero(
        &read_line("Completion timeout seconds [30]: ")?,
        30,
        "llm.timeout_secs",
    )?;
    let host = or_default(read_line("Listen host [127.0.0.1]: ")?, "127.0.0.1");
    let fallback = read_line("Fallback reply (empty keeps the default): ")?;

    Ok(format_config(&ConfigParams {
        provider,
        model: &model,
        max_tokens,
        temperature,
        timeout_secs,
        host: &host,
        fallback: &fallback,
    }))
}

// ── Entry point ────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Resolve project root: prefer LINERELAY_ROOT env, fall back to cwd.
    let project_root =
        PathBuf::from(std::env::var("LINERELAY_ROOT").unwrap_or_else(|_| ".".to_string()));

    let config = run_cli()?;

    if args.iter().any(|a| a == "--print") {
        println!("\n{config}");
        return Ok(());
    }

    let config_path = project_root.join("config.toml");
    std::fs::write(&config_path, &config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;

    println!("\n✓  config.toml saved to {}", config_path.display());
    println!("   Export LINE_CHANNEL_SECRET and LINE_CHANNEL_ACCESS_TOKEN, then run:  cargo run");
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
