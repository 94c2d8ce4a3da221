/// Fenced code block markup.
///
/// Code blocks render as an opening fence carrying the language, the raw
/// code lines, and a closing fence. Code content is never run through the
/// rich-text grammar.
pub struct CodeFence;

impl CodeFence {
    pub const BACKTICKS: &'static str = "```";

    /// Returns the language of an opening fence line, or `None` if the line
    /// is not a fence.
    pub fn opens(line: &str) -> Option<&str> {
        let t = line.trim_end_matches(['\r', '\n']);
        t.strip_prefix(Self::BACKTICKS).map(str::trim)
    }

    pub fn closes(line: &str) -> bool {
        line.trim_end() == Self::BACKTICKS
    }

    pub fn open_line(language: &str) -> String {
        format!("{}{}", Self::BACKTICKS, language)
    }

    /// Splits rendered code lines into `(language, body)`.
    ///
    /// A missing opening fence leaves the language empty and keeps every
    /// line as code; a missing closing fence keeps the last line.
    pub fn split(lines: &[String]) -> (String, Vec<String>) {
        let Some((first, rest)) = lines.split_first() else {
            return (String::new(), Vec::new());
        };
        let Some(language) = Self::opens(first) else {
            return (String::new(), lines.to_vec());
        };
        let body = match rest.split_last() {
            Some((last, inner)) if Self::closes(last) => inner.to_vec(),
            _ => rest.to_vec(),
        };
        (language.to_string(), body)
    }
}
