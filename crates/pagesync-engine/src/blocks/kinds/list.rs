use std::sync::LazyLock;

use regex::Regex;

static NUMBERED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\. ").unwrap_or_else(|e| unreachable!("numbered marker pattern: {e}"))
});

/// Bulleted list item markup. `*` is accepted on input, `-` is rendered.
pub struct Bullet;

impl Bullet {
    pub const PREFIX: &'static str = "- ";
    pub const ALT_PREFIX: &'static str = "* ";

    pub fn strip(line: &str) -> Option<&str> {
        line.strip_prefix(Self::PREFIX)
            .or_else(|| line.strip_prefix(Self::ALT_PREFIX))
    }
}

/// Numbered list item markup. Any `N. ` is accepted, `1. ` is rendered and
/// the remote store does the numbering.
pub struct Numbered;

impl Numbered {
    pub const PREFIX: &'static str = "1. ";

    pub fn strip(line: &str) -> Option<&str> {
        NUMBERED.find(line).map(|m| &line[m.end()..])
    }
}

/// To-do markup: a bullet followed by a checkbox.
pub struct ToDo;

impl ToDo {
    pub const UNCHECKED: &'static str = "- [ ] ";
    pub const CHECKED: &'static str = "- [x] ";
    const CHECKED_UPPER: &'static str = "- [X] ";

    pub fn prefix(checked: bool) -> &'static str {
        if checked {
            Self::CHECKED
        } else {
            Self::UNCHECKED
        }
    }

    /// Returns `(checked, rest)` if the line opens a to-do item.
    pub fn strip(line: &str) -> Option<(bool, &str)> {
        if let Some(rest) = line.strip_prefix(Self::UNCHECKED) {
            return Some((false, rest));
        }
        line.strip_prefix(Self::CHECKED)
            .or_else(|| line.strip_prefix(Self::CHECKED_UPPER))
            .map(|rest| (true, rest))
    }
}
