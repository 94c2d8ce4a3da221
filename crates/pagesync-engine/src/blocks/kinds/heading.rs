/// Heading markup: one `#` per level followed by a space.
pub struct Heading;

impl Heading {
    pub const MARK: char = '#';
    pub const MAX_LEVEL: u8 = 3;

    pub fn prefix(level: u8) -> String {
        let mut p = String::with_capacity(level as usize + 1);
        for _ in 0..level {
            p.push(Self::MARK);
        }
        p.push(' ');
        p
    }

    /// Returns `(level, rest)` if the line opens a supported heading.
    pub fn strip(line: &str) -> Option<(u8, &str)> {
        let hashes = line.bytes().take_while(|&b| b == Self::MARK as u8).count();
        if hashes == 0 || hashes > Self::MAX_LEVEL as usize {
            return None;
        }
        line[hashes..].strip_prefix(' ').map(|rest| (hashes as u8, rest))
    }
}
