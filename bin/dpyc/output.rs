//! Console output for dpyc
//!
//! Everything is built as a `String` first so the layout can be tested;
//! ANSI color is dropped when `NO_COLOR` is set.

use std::fmt;

const RESET: &str = "\x1b[0m";
const BOLD_CYAN: &str = "\x1b[1;36m";
const DIM: &str = "\x1b[90m";

/// Outcome a status line reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Ok,
    Fail,
    Warn,
    Note,
}

impl Tone {
    fn glyph(self) -> char {
        match self {
            Tone::Ok => '✓',
            Tone::Fail => '✗',
            Tone::Warn => '⚠',
            Tone::Note => 'ℹ',
        }
    }

    fn color(self) -> &'static str {
        match self {
            Tone::Ok => "\x1b[32m",
            Tone::Fail => "\x1b[31m",
            Tone::Warn => "\x1b[33m",
            Tone::Note => "\x1b[34m",
        }
    }
}

/// How a field value is highlighted; secrets stand out as a warning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Plain,
    Public,
    Secret,
}

fn color_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

fn paint(color: bool, code: &str, text: impl fmt::Display) -> String {
    if color {
        format!("{}{}{}", code, text, RESET)
    } else {
        text.to_string()
    }
}

fn status_line(color: bool, tone: Tone, msg: &str) -> String {
    format!("{} {}", paint(color, tone.color(), tone.glyph()), msg)
}

fn section_line(color: bool, title: &str) -> String {
    let rule = "─".repeat(50usize.saturating_sub(title.chars().count()));
    paint(color, BOLD_CYAN, format_args!(" {} {}", title, rule))
}

fn field_line(color: bool, key: &str, value: &str, kind: Field) -> String {
    let value = match kind {
        Field::Plain => value.to_string(),
        Field::Public => paint(color, Tone::Ok.color(), value),
        Field::Secret => paint(color, Tone::Warn.color(), value),
    };
    format!("  {} {}", paint(color, DIM, format_args!("{}:", key)), value)
}

/// Status line; failures go to stderr
pub fn status(tone: Tone, msg: &str) {
    let line = status_line(color_enabled(), tone, msg);
    if tone == Tone::Fail {
        eprintln!("{}", line);
    } else {
        println!("{}", line);
    }
}

pub fn section(title: &str) {
    println!();
    println!("{}", section_line(color_enabled(), title));
    println!();
}

pub fn field(key: &str, value: &str, kind: Field) {
    println!("{}", field_line(color_enabled(), key, value, kind));
}
