// Console front ends for the runlink binary
// `script` streams a run's history to stdout/stderr; `shell` is a raw-mode
// passthrough to a remote terminal

mod script;
mod shell;

pub use script::{Input, attach, run_script};
pub use shell::run_terminal;

use crate::executor::{Line, LineKind};

/// Exit code reported when a run ends without a return code
pub const UNKNOWN_EXIT_CODE: i32 = 1;

/// Text printed for one history line. System lines are marked so they
/// stand out from program output; ANSI sequences are removed in `plain` mode.
pub fn render_line(line: &Line, plain: bool) -> String {
    let text = if plain {
        line.stripped_text()
    } else {
        line.text.clone()
    };
    let text = text.trim_end_matches(['\r', '\n']);
    match line.kind {
        LineKind::System => format!("[{}] -- {}", line.formatted_timestamp(), text),
        LineKind::Stdout | LineKind::Stderr => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use insta::assert_snapshot;

    fn at_noon(kind: LineKind, text: &str) -> Line {
        let time = Local.with_ymd_and_hms(2024, 12, 10, 12, 0, 0).unwrap();
        Line::new_with_time(kind, text, time)
    }

    #[test]
    fn test_system_lines_are_marked() {
        let line = at_noon(LineKind::System, "run ended: status=ok code=0 elapsed=12ms");
        assert_snapshot!(render_line(&line, true), @"[12:00:00] -- run ended: status=ok code=0 elapsed=12ms");
    }

    #[test]
    fn test_output_lines_lose_trailing_newline() {
        let line = at_noon(LineKind::Stdout, "hello\r\n");
        assert_eq!(render_line(&line, false), "hello");
    }

    #[test]
    fn test_plain_mode_strips_ansi() {
        let line = at_noon(LineKind::Stderr, "\x1b[1;31mTraceback\x1b[0m");
        assert_eq!(render_line(&line, true), "Traceback");
        assert_eq!(render_line(&line, false), "\x1b[1;31mTraceback\x1b[0m");
    }
}
