use super::{Annotations, RichText, Segment, cursor::Cursor};

/// Inline marker grammar: `**bold**`, `*italic*`, `***both***`,
/// `~~strike~~`, `` `code` `` and `[text](url)`.
///
/// Unclosed markers are kept as literal text.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkerRichText;

impl MarkerRichText {
    pub const TICK: &'static str = "`";
    pub const BOLD_ITALIC: &'static str = "***";
    pub const BOLD: &'static str = "**";
    pub const ITALIC: &'static str = "*";
    pub const STRIKE: &'static str = "~~";
    pub const LINK_OPEN: &'static str = "[";
    pub const LINK_MID: &'static str = "](";
    pub const LINK_CLOSE: &'static str = ")";
}

impl RichText for MarkerRichText {
    fn parse(&self, text: &str) -> Vec<Segment> {
        let mut out = Vec::new();
        parse_into(text, &Annotations::default(), None, &mut out);
        merge_adjacent(out)
    }

    fn render(&self, segments: &[Segment]) -> String {
        segments.iter().map(render_segment).collect()
    }
}

fn render_segment(seg: &Segment) -> String {
    if seg.text.is_empty() {
        return String::new();
    }
    let a = &seg.annotations;
    let mut t = seg.text.clone();
    if a.code {
        t = wrap(&t, MarkerRichText::TICK);
    }
    if a.strikethrough {
        t = wrap(&t, MarkerRichText::STRIKE);
    }
    if a.italic {
        t = wrap(&t, MarkerRichText::ITALIC);
    }
    if a.bold {
        t = wrap(&t, MarkerRichText::BOLD);
    }
    match &seg.link {
        Some(url) => format!(
            "{}{t}{}{url}{}",
            MarkerRichText::LINK_OPEN,
            MarkerRichText::LINK_MID,
            MarkerRichText::LINK_CLOSE
        ),
        None => t,
    }
}

fn wrap(text: &str, marker: &str) -> String {
    format!("{marker}{text}{marker}")
}

fn parse_into(s: &str, ann: &Annotations, link: Option<&str>, out: &mut Vec<Segment>) {
    let mut cur = Cursor::new(s);
    let mut text_start = 0;

    fn flush_text(
        out: &mut Vec<Segment>,
        text: &str,
        ann: &Annotations,
        link: Option<&str>,
    ) {
        if !text.is_empty() {
            out.push(Segment {
                text: text.to_string(),
                annotations: ann.clone(),
                link: link.map(String::from),
            });
        }
    }

    while !cur.eof() {
        let at = cur.i;

        if let Some(inner) = try_parse_code(&mut cur) {
            flush_text(out, &s[text_start..at], ann, link);
            let code = Annotations {
                code: true,
                ..ann.clone()
            };
            flush_text(out, inner, &code, link);
            text_start = cur.i;
            continue;
        }
        if let Some((inner, url)) = try_parse_link(&mut cur) {
            flush_text(out, &s[text_start..at], ann, link);
            parse_into(inner, ann, Some(url), out);
            text_start = cur.i;
            continue;
        }
        if let Some((inner, nested)) = try_parse_emphasis(&mut cur, ann) {
            flush_text(out, &s[text_start..at], ann, link);
            parse_into(inner, &nested, link, out);
            text_start = cur.i;
            continue;
        }
        cur.bump();
    }

    flush_text(out, &s[text_start..], ann, link);
}

/// On failure the cursor is left untouched.
fn try_parse_code<'a>(cur: &mut Cursor<'a>) -> Option<&'a str> {
    try_delimited(cur, MarkerRichText::TICK)
}

fn try_parse_link<'a>(cur: &mut Cursor<'a>) -> Option<(&'a str, &'a str)> {
    if !cur.starts_with(MarkerRichText::LINK_OPEN.as_bytes()) {
        return None;
    }
    let s: &'a str = cur.s;
    let saved = cur.clone();
    cur.bump_n(MarkerRichText::LINK_OPEN.len());
    let text_start = cur.i;

    let result = (|| {
        let mid = cur.find(MarkerRichText::LINK_MID)?;
        let text = &s[text_start..mid];
        if text.is_empty() || text.contains('\n') {
            return None;
        }
        cur.i = mid + MarkerRichText::LINK_MID.len();
        let url_start = cur.i;
        let close = cur.find(MarkerRichText::LINK_CLOSE)?;
        let url = &s[url_start..close];
        if url.is_empty() || url.contains(char::is_whitespace) {
            return None;
        }
        cur.i = close + MarkerRichText::LINK_CLOSE.len();
        Some((text, url))
    })();

    if result.is_none() {
        *cur = saved;
    }
    result
}

/// Emphasis markers in precedence order, longest first so `***` is not read
/// as `**` followed by `*`.
fn try_parse_emphasis<'a>(
    cur: &mut Cursor<'a>,
    ann: &Annotations,
) -> Option<(&'a str, Annotations)> {
    let table: [(&str, fn(&mut Annotations)); 4] = [
        (MarkerRichText::BOLD_ITALIC, |a| {
            a.bold = true;
            a.italic = true;
        }),
        (MarkerRichText::BOLD, |a| a.bold = true),
        (MarkerRichText::STRIKE, |a| a.strikethrough = true),
        (MarkerRichText::ITALIC, |a| a.italic = true),
    ];
    for (marker, apply) in table {
        if let Some(inner) = try_delimited(cur, marker) {
            let mut nested = ann.clone();
            apply(&mut nested);
            return Some((inner, nested));
        }
    }
    None
}

/// Parses `marker inner marker` with a non-empty inner part.
fn try_delimited<'a>(cur: &mut Cursor<'a>, marker: &str) -> Option<&'a str> {
    if !cur.starts_with(marker.as_bytes()) {
        return None;
    }
    let saved = cur.clone();
    cur.bump_n(marker.len());
    let inner_start = cur.i;

    match cur.find(marker) {
        Some(close) if close > inner_start => {
            cur.i = close;
            let inner = cur.since(inner_start);
            cur.bump_n(marker.len());
            Some(inner)
        }
        _ => {
            *cur = saved;
            None
        }
    }
}

fn merge_adjacent(segments: Vec<Segment>) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::with_capacity(segments.len());
    for seg in segments {
        match out.last_mut() {
            Some(prev) if prev.annotations == seg.annotations && prev.link == seg.link => {
                prev.text.push_str(&seg.text);
            }
            _ => out.push(seg),
        }
    }
    out
}
