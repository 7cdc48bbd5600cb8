//! # Output Configuration
//!
//! Terminal output helpers for the `unit-mirror` CLI: colour detection,
//! emoji fallbacks and rendering of severities and status entries.
//!
//! ## Respecting User Preferences
//!
//! - `--color=never|always|auto` - CLI flag for color control
//! - `NO_COLOR` - Disables colors when set (per https://no-color.org/)
//! - `CLICOLOR=0` - Disables colors
//! - `CLICOLOR_FORCE=1` - Forces colors even in non-TTY
//! - `TERM=dumb` - Disables colors for dumb terminals
//!
//! ## Usage
//!
//! ```rust,ignore
//! use unit_mirror::output::{emoji, OutputConfig};
//!
//! let config = OutputConfig::from_env_and_flag("auto");
//! println!("{} Mirroring...", emoji(&config, "📦", "[MIRROR]"));
//! ```

use std::env;

use console::style;

use crate::status::{Severity, StatusEntry};

/// Output configuration for controlling colors and emojis.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
}

impl OutputConfig {
    /// Create an output configuration from environment and CLI flag.
    ///
    /// `always` forces colours on (overriding `NO_COLOR`), `never` forces
    /// them off, anything else detects support from the environment and
    /// whether stdout is a terminal.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self { use_color }
    }

    fn detect_color_support() -> bool {
        // The presence of the variable (even if empty) disables colors
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }

        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }

        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }

        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }

        console::Term::stdout().features().colors_supported()
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// Returns `emoji_str` when colors are enabled, `plain` otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// Marker printed in front of a line of the given severity.
pub fn severity_marker(config: &OutputConfig, severity: Severity) -> &'static str {
    match severity {
        Severity::Ok => emoji(config, "✅", "[OK]"),
        Severity::Info => emoji(config, "ℹ️", "[INFO]"),
        Severity::Warning => emoji(config, "⚠️", "[WARN]"),
        Severity::Error => emoji(config, "❌", "[ERR]"),
    }
}

/// The severity label, coloured when colors are enabled.
pub fn severity_label(config: &OutputConfig, severity: Severity) -> String {
    let label = severity.label();
    if !config.use_color {
        return label.to_string();
    }
    match severity {
        Severity::Ok => style(label).green().to_string(),
        Severity::Info => style(label).cyan().to_string(),
        Severity::Warning => style(label).yellow().to_string(),
        Severity::Error => style(label).red().bold().to_string(),
    }
}

/// One line for a status entry: `<marker> <message>`.
pub fn format_entry(config: &OutputConfig, entry: &StatusEntry) -> String {
    format!("{} {}", severity_marker(config, entry.severity), entry.message)
}
