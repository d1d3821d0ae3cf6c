//! Lexical splitting of html into literal text and tag fragments.
//!
//! No tree is built and nesting is never checked: sanitizing only depends on
//! whitelist enforcement per tag occurrence.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Text,
    Tag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    pub kind: SegmentKind,
    /// Source text, including the `<` and `>` delimiters for tags
    pub content: &'a str,
    /// Byte offset of `content` in the scanned input
    pub start: usize,
    pub is_closing: bool,
}

impl<'a> Segment<'a> {
    fn text(content: &'a str, start: usize) -> Self {
        Segment { kind: SegmentKind::Text, content, start, is_closing: false }
    }
    fn tag(content: &'a str, start: usize) -> Self {
        Segment { kind: SegmentKind::Tag, content, start, is_closing: content.starts_with("</") }
    }

    /// Lowercased tag name, empty for text segments
    pub fn name(&self) -> String {
        match self.kind {
            SegmentKind::Text => String::new(),
            SegmentKind::Tag => tag_name(self.content),
        }
    }
}

/// A `<` only opens a tag when followed by a letter, `/` or `!`.
/// Anything else (`<3`, `<_<`, a trailing `<`) is literal text.
fn opens_tag(bytes: &[u8], i: usize) -> bool {
    matches!(bytes.get(i + 1), Some(c) if c.is_ascii_alphabetic() || *c == b'/' || *c == b'!')
}

/// Whether the quote at `i` starts an attribute value (`=` before it, whitespace allowed)
fn follows_equals(bytes: &[u8], tag_start: usize, i: usize) -> bool {
    let mut j = i;
    while j > tag_start + 1 {
        j -= 1;
        match bytes[j] {
            b'=' => return true,
            c if c.is_ascii_whitespace() => continue,
            _ => return false,
        }
    }
    false
}

fn push_text<'a>(segments: &mut Vec<Segment<'a>>, html: &'a str, from: usize, to: usize) {
    if from < to {
        segments.push(Segment::text(&html[from..to], from));
    }
}

pub fn split_tags(html: &str) -> Vec<Segment<'_>> {
    let bytes = html.as_bytes();
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut tag_start: Option<usize> = None;
    let mut quote: Option<u8> = None;

    for (i, &c) in bytes.iter().enumerate() {
        match (tag_start, quote) {
            (None, _) => {
                if c == b'<' && opens_tag(bytes, i) {
                    tag_start = Some(i);
                }
            }
            (Some(start), None) => {
                if c == b'<' && opens_tag(bytes, i) {
                    // The unfinished fragment falls back into the text run
                    tag_start = Some(i);
                } else if c == b'>' {
                    push_text(&mut segments, html, text_start, start);
                    segments.push(Segment::tag(&html[start..=i], start));
                    text_start = i + 1;
                    tag_start = None;
                } else if (c == b'"' || c == b'\'') && follows_equals(bytes, start, i) {
                    quote = Some(c);
                }
            }
            (Some(_), Some(q)) => {
                if c == q {
                    quote = None;
                }
            }
        }
    }
    // An unterminated tag at the end of input is only text
    push_text(&mut segments, html, text_start, html.len());
    segments
}

fn first_whitespace(fragment: &str) -> Option<usize> {
    fragment.find(|c: char| c.is_ascii_whitespace())
}

/// Name of a tag fragment such as `<A href=...>` or `</b>` or `<br/>`, lowercased.
pub fn tag_name(fragment: &str) -> String {
    let inner = match first_whitespace(fragment) {
        Some(i) => &fragment[1..i],
        None => fragment.get(1..fragment.len().saturating_sub(1)).unwrap_or(""),
    };
    let inner = inner.trim();
    let inner = inner.strip_prefix('/').unwrap_or(inner);
    let inner = inner.strip_suffix('/').unwrap_or(inner);
    inner.to_ascii_lowercase()
}

fn body(fragment: &str) -> &str {
    fragment
        .strip_suffix('>')
        .unwrap_or(fragment)
}

pub fn is_self_closing(fragment: &str) -> bool {
    body(fragment).trim_end().ends_with('/')
}

/// The attribute text between the tag name and the closing `>` (or `/>`).
pub fn attribute_source(fragment: &str) -> &str {
    let body = body(fragment);
    let Some(i) = first_whitespace(body) else {
        return "";
    };
    let attrs = body[i..].trim();
    match attrs.strip_suffix('/') {
        Some(a) => a.trim_end(),
        None => attrs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds<'a>(segments: &[Segment<'a>]) -> Vec<(SegmentKind, &'a str)> {
        segments.iter().map(|s| (s.kind, s.content)).collect()
    }

    #[test]
    fn splits_text_and_tags() {
        let segments = split_tags("a <b>bold</b> c");
        assert_eq!(kinds(&segments), vec![
            (SegmentKind::Text, "a "),
            (SegmentKind::Tag, "<b>"),
            (SegmentKind::Text, "bold"),
            (SegmentKind::Tag, "</b>"),
            (SegmentKind::Text, " c"),
        ]);
        assert!(segments[3].is_closing);
        assert!(!segments[1].is_closing);
        assert_eq!(segments[3].start, 9);
    }

    #[test]
    fn quoted_gt_does_not_end_tag() {
        let segments = split_tags(r#"<a title="x > y">t</a>"#);
        assert_eq!(segments[0].content, r#"<a title="x > y">"#);
        assert_eq!(segments[1].content, "t");
    }

    #[test]
    fn quote_without_equals_is_not_a_value() {
        let segments = split_tags(r#"<a b"c>d"#);
        assert_eq!(segments[0].content, r#"<a b"c>"#);
    }

    #[test]
    fn literal_lt_is_text() {
        let segments = split_tags("I <3 you <_< <");
        assert_eq!(kinds(&segments), vec![(SegmentKind::Text, "I <3 you <_< <")]);
    }

    #[test]
    fn restarted_tag_folds_into_text() {
        let segments = split_tags("<a <b>x");
        assert_eq!(kinds(&segments), vec![
            (SegmentKind::Text, "<a "),
            (SegmentKind::Tag, "<b>"),
            (SegmentKind::Text, "x"),
        ]);
    }

    #[test]
    fn unterminated_tag_is_text() {
        let segments = split_tags("x <img src='a");
        assert_eq!(kinds(&segments), vec![(SegmentKind::Text, "x <img src='a")]);
    }

    #[test]
    fn tag_names() {
        assert_eq!(tag_name("<B>"), "b");
        assert_eq!(tag_name("</Div>"), "div");
        assert_eq!(tag_name("<br/>"), "br");
        assert_eq!(tag_name("<img\tsrc=x>"), "img");
        assert_eq!(tag_name("<a href='x'>"), "a");
        assert_eq!(tag_name("<!-- c -->"), "!--");
    }

    #[test]
    fn attribute_sources() {
        assert_eq!(attribute_source("<br/>"), "");
        assert!(is_self_closing("<br/>"));
        assert!(is_self_closing("<img src=\"x\" />"));
        assert_eq!(attribute_source("<img src=\"x\" />"), "src=\"x\"");
        assert_eq!(attribute_source("<a  href=x  title=y>"), "href=x  title=y");
        assert!(!is_self_closing("<a href=x>"));
    }
}
