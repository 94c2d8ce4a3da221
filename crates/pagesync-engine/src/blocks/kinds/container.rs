/// Toggle markup. A toggle is a collapsible container; its children render
/// indented below it.
pub struct Toggle;

impl Toggle {
    pub const PREFIX: &'static str = "> ";

    pub fn strip(line: &str) -> Option<&str> {
        line.strip_prefix(Self::PREFIX)
    }
}

/// Quote markup.
pub struct Quote;

impl Quote {
    pub const PREFIX: &'static str = "| ";

    pub fn strip(line: &str) -> Option<&str> {
        line.strip_prefix(Self::PREFIX)
    }
}

/// Divider markup. Dividers always render as the same literal line.
pub struct Divider;

impl Divider {
    pub const SHAPE: &'static str = "---";

    pub fn matches(line: &str) -> bool {
        line.trim() == Self::SHAPE
    }
}
