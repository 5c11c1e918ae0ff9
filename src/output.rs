//! Terminal presentation for the CLI: colors, emoji fallbacks and the
//! spinner shown while a run is fetching.
//!
//! Color is decided once per process from `--color` and the usual
//! environment switches (`NO_COLOR`, `CLICOLOR`, `CLICOLOR_FORCE`,
//! `TERM=dumb`); `console` is told the result so styled text and the
//! spinner agree. Vendor file output on stdout is never styled.

use std::env;
use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

/// Whether stderr decorations are enabled
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub use_color: bool,
}

impl OutputConfig {
    /// `always` and `never` are absolute; anything else inspects the environment.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };
        console::set_colors_enabled(use_color);
        console::set_colors_enabled_stderr(use_color);

        Self { use_color }
    }

    fn detect_color_support() -> bool {
        // NO_COLOR counts even when empty
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

        console::Term::stderr().features().colors_supported()
    }

    /// Create a configuration with colors always enabled.
    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    /// Create a configuration with colors always disabled.
    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }

    /// Green text for successful outcomes
    pub fn success(&self, text: &str) -> String {
        self.paint(Style::new().green(), text)
    }

    /// Yellow text for warnings
    pub fn warning(&self, text: &str) -> String {
        self.paint(Style::new().yellow(), text)
    }

    /// Dimmed text for secondary detail
    pub fn dim(&self, text: &str) -> String {
        self.paint(Style::new().dim(), text)
    }

    fn paint(&self, style: Style, text: &str) -> String {
        if self.use_color {
            style.force_styling(true).apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// Returns the emoji when colors are enabled, the plain alternative otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// A stderr spinner, or a hidden bar when `quiet`.
pub fn spinner(quiet: bool, message: &str) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    bar.set_style(style);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}
