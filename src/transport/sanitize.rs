//! Text cleanup applied to buffered transport output before it reaches a
//! device driver: ANSI escape stripping and DOS→Unix newline conversion.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches leading carriage-return/backspace runs that otherwise confuse
/// line-oriented prompt matching.
pub static IGNORE_START_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\r+(\s+\r+)*)|(\u{8}+(\s+\u{8}+)*)").unwrap());

static ANSI_CSI: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap());
static CONTROL_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\x00-\x08\x0b\x0c\x0e-\x1f]").unwrap());

/// Strip ANSI CSI sequences and stray control characters from a chunk of
/// terminal output. Applied only when a driver's `ansi_strip` flag is set.
pub fn strip_ansi(input: &str) -> String {
    let without_csi = ANSI_CSI.replace_all(input, "");
    CONTROL_CHARS.replace_all(&without_csi, "").into_owned()
}

/// Convert `\r\n` to `\n` and drop stray `\r`.
pub fn dos_to_unix(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_csi_color_codes() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m"), "red");
    }

    #[test]
    fn converts_dos_newlines() {
        assert_eq!(dos_to_unix("a\r\nb\rc"), "a\nbc");
    }

    #[test]
    fn ignore_start_line_matches_leading_backspaces() {
        assert!(IGNORE_START_LINE.is_match("\u{8}\u{8}\u{8}prompt>"));
    }
}
