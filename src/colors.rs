//! Terminal color policy.
//!
//! Precedence, highest first:
//! - `--color always|never` on the command line
//! - `NO_COLOR` set to anything disables colors (https://no-color.org/)
//! - `CLICOLOR_FORCE` set to non-zero forces colors, even when piped
//! - `CLICOLOR=0` disables colors
//! - otherwise colors follow whether stdout is a terminal
use colored::control;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

/// Decide whether to color, given an environment lookup and TTY status
fn should_color(choice: ColorChoice, var: impl Fn(&str) -> Option<String>, is_tty: bool) -> bool {
    match choice {
        ColorChoice::Always => return true,
        ColorChoice::Never => return false,
        ColorChoice::Auto => {}
    }

    if var("NO_COLOR").is_some() {
        return false;
    }
    if var("CLICOLOR_FORCE").is_some_and(|v| v != "0") {
        return true;
    }
    if var("CLICOLOR").is_some_and(|v| v == "0") {
        return false;
    }
    is_tty
}

/// Configure `colored` for the whole process. Call once, early in main().
pub fn init_colors(choice: ColorChoice) {
    let is_tty = std::io::IsTerminal::is_terminal(&std::io::stdout());
    let enabled = should_color(choice, |key| std::env::var(key).ok(), is_tty);
    control::set_override(enabled);
}
