//! Shared output layer for pretty/text/JSON parity across `ft` commands.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--json` flag
//! 2. `FORMAT` env var → `"pretty"` | `"text"` | `"json"`
//! 3. `output` key in `fibertrack.toml`
//! 4. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.

use fibertrack_core::{ErrorCode, ServiceError};
use serde::Serialize;
use std::io::{self, IsTerminal, Write};

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by pretty human output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-optimized output (sections, visual framing).
    Pretty,
    /// Tab-separated rows for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "text" => Some(Self::Text),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

fn resolve_output_mode_inner(
    json_flag: bool,
    format_env: Option<&str>,
    config_output: Option<&str>,
    is_tty: bool,
) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    // Unknown values fall through to the next source.
    if let Some(mode) = format_env.and_then(OutputMode::parse) {
        return mode;
    }
    if let Some(mode) = config_output.and_then(OutputMode::parse) {
        return mode;
    }

    if is_tty {
        OutputMode::Pretty
    } else {
        OutputMode::Text
    }
}

/// Resolve the output mode from the `--json` flag, `FORMAT`, config, and TTY.
pub fn resolve_output_mode(json_flag: bool, config_output: Option<&str>) -> OutputMode {
    let env_val = std::env::var("FORMAT").ok();
    let is_tty = io::stdout().is_terminal();
    resolve_output_mode_inner(json_flag, env_val.as_deref(), config_output, is_tty)
}

/// Render a serializable value with explicit pretty/text renderers.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, &mut out)?,
        OutputMode::Pretty => pretty_fn(value, &mut out)?,
    }
    Ok(())
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Stable `E####` code when the failure came from a service call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            error_code: None,
        }
    }
}

impl CliError {
    fn with_code(message: String, code: ErrorCode) -> Self {
        Self {
            message,
            suggestion: code.hint().map(str::to_string),
            error_code: Some(code.code().to_string()),
        }
    }
}

impl From<&anyhow::Error> for CliError {
    fn from(error: &anyhow::Error) -> Self {
        if let Some(service) = error.downcast_ref::<ServiceError>() {
            return Self::with_code(service.to_string(), service.code());
        }
        if error.downcast_ref::<toml::de::Error>().is_some() {
            return Self::with_code(format!("{error:#}"), ErrorCode::ConfigParseError);
        }
        Self::new(format!("{error:#}"))
    }
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            writeln!(out, "error: {}", error.message)?;
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  hint: {suggestion}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_wins_over_everything() {
        assert_eq!(
            resolve_output_mode_inner(true, Some("pretty"), Some("text"), true),
            OutputMode::Json
        );
    }

    #[test]
    fn env_beats_config() {
        assert_eq!(
            resolve_output_mode_inner(false, Some("TEXT"), Some("json"), true),
            OutputMode::Text
        );
    }

    #[test]
    fn config_used_when_env_unknown() {
        assert_eq!(
            resolve_output_mode_inner(false, Some("fancy"), Some("json"), true),
            OutputMode::Json
        );
    }

    #[test]
    fn tty_decides_default() {
        assert_eq!(
            resolve_output_mode_inner(false, None, None, true),
            OutputMode::Pretty
        );
        assert_eq!(
            resolve_output_mode_inner(false, None, None, false),
            OutputMode::Text
        );
    }

    #[test]
    fn service_errors_carry_their_code() {
        let error = anyhow::Error::new(ServiceError::not_found("project", "p-9"));
        let cli = CliError::from(&error);
        assert_eq!(
            cli.error_code.as_deref(),
            Some(ErrorCode::RecordNotFound.code())
        );
        assert!(cli.message.contains("p-9"));
    }

    #[test]
    fn config_parse_errors_carry_their_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fibertrack.toml");
        std::fs::write(&path, "[database\npath = 3\n").unwrap();

        let error = fibertrack_core::config::load_config_file(&path).unwrap_err();
        let cli = CliError::from(&error);

        assert_eq!(
            cli.error_code.as_deref(),
            Some(ErrorCode::ConfigParseError.code())
        );
        assert!(cli.message.contains("fibertrack.toml"));
        assert!(cli.suggestion.is_some());
    }

    #[test]
    fn plain_errors_have_no_code() {
        let error = anyhow::anyhow!("disk full");
        let cli = CliError::from(&error);
        assert!(cli.error_code.is_none());
        assert_eq!(cli.message, "disk full");
    }

    #[test]
    fn pretty_kv_aligns_keys() {
        let mut buf = Vec::new();
        pretty_kv(&mut buf, "id", "p-1").unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "id:          p-1\n");
    }
}
