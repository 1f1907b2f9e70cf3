use chrono::Local;

use crate::agent::sink::StatusLine;

const RESET: &str = "\x1b[0m";
const SUCCESS_COLOR: &str = "\x1b[32m";
const ERROR_COLOR: &str = "\x1b[31m";

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Local wall-clock time, second resolution.
pub fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

pub fn format_status_line(line: &StatusLine, ansi: bool) -> String {
    let symbol = if line.ok { "✓" } else { "✗" };
    if !ansi {
        return format!("{symbol} {}", line.text);
    }

    let color = if line.ok { SUCCESS_COLOR } else { ERROR_COLOR };
    format!("{color}{symbol}{RESET} {}", line.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[test]
    fn test_timestamp_format() {
        let ts = timestamp();
        assert_eq!(ts.len(), 19);
        assert!(NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn test_format_status_line_without_ansi() {
        let ok = StatusLine::new(true, "2024-01-01 12:00:00 OK 200: {} GPUs: no GPU");
        assert_eq!(
            format_status_line(&ok, false),
            "✓ 2024-01-01 12:00:00 OK 200: {} GPUs: no GPU"
        );

        let err = StatusLine::new(false, "2024-01-01 12:00:00 Timeout after 10s");
        let rendered = format_status_line(&err, false);
        assert!(rendered.starts_with("✗ "));
        assert!(!rendered.contains("\x1b["));
    }

    #[test]
    fn test_format_status_line_with_ansi() {
        let ok = format_status_line(&StatusLine::new(true, "fine"), true);
        assert!(ok.contains(SUCCESS_COLOR));
        assert!(ok.contains(RESET));
        assert!(ok.ends_with("fine"));

        let err = format_status_line(&StatusLine::new(false, "broken"), true);
        assert!(err.contains(ERROR_COLOR));
    }
}
