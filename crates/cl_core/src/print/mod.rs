use std::sync::{LazyLock, RwLock};

use regex::Regex;

pub mod macros;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogType {
    Info,
    Error,
    Point,
}

impl std::fmt::Display for LogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                LogType::Info => "[info]",
                LogType::Error => "[error]",
                LogType::Point => "-",
            }
        )
    }
}

#[derive(Default)]
pub struct LoggingState {
    pub terminal: bool,
    pub text: Vec<(String, LogType)>,
}

pub static LOGGER: LazyLock<RwLock<LoggingState>> = LazyLock::new(|| {
    RwLock::new(LoggingState {
        terminal: true,
        text: Vec::new(),
    })
});

/// Whether the macros should also print to the terminal.
pub fn set_terminal_output(enabled: bool) {
    if let Ok(mut lock) = LOGGER.write() {
        lock.terminal = enabled;
    }
}

#[must_use]
pub fn is_print() -> bool {
    LOGGER.read().map(|l| l.terminal).unwrap_or(true)
}

pub fn print_to_memory(msg: &str, t: LogType) {
    if let Ok(mut lock) = LOGGER.write() {
        lock.text.push((strip_ansi_codes(msg), t));
    }
}

/// Drains a copy of everything logged so far. Frontends poll this to
/// render an in-app log view.
#[must_use]
pub fn get() -> Vec<(String, LogType)> {
    LOGGER.read().map_or(Vec::new(), |l| l.text.clone())
}

/// Regex: ESC [ ... letters
static ANSI_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1B\[[0-9;]*[A-Za-z]").unwrap());

/// Removes ANSI escape codes (colors, formatting, cursor moves) from a string.
#[must_use]
pub fn strip_ansi_codes(input: &str) -> String {
    ANSI_REGEX.replace_all(input, "").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_color_codes() {
        let colored = "\x1B[31mred\x1B[0m plain";
        assert_eq!(strip_ansi_codes(colored), "red plain");
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(strip_ansi_codes("hello - [info]"), "hello - [info]");
    }
}
