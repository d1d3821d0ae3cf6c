//! Attribute splitting and value normalization.

use std::sync::LazyLock;

use regex::{Captures, Regex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// Entity-decoded value, `""` for bare attributes
    pub value: String,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '.' | '-')
}

/// Strip characters outside `[A-Za-z0-9_:.-]`, lowercased.
pub fn clean_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| is_name_char(*c))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Split the text between `<tag ` and `>` into ordered attributes.
///
/// Handles `name="v"`, `name='v'`, `name=v` and bare `name`. An attribute
/// whose quoted value is never closed ends parsing; everything before it is kept.
pub fn split_attributes(source: &str) -> Vec<Attribute> {
    let mut attrs = Vec::new();
    let mut rest = source;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == '/');
        if rest.is_empty() {
            break;
        }

        let name_end = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '=')
            .unwrap_or(rest.len());
        let raw_name = &rest[..name_end];
        rest = &rest[name_end..];

        let mut value = "";
        if let Some(after_eq) = rest.trim_start().strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            match after_eq.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    let quoted = &after_eq[1..];
                    let Some(end) = quoted.find(q) else {
                        break;
                    };
                    value = quoted[..end].trim();
                    rest = &quoted[end + 1..];
                }
                _ => {
                    let end = after_eq
                        .find(|c: char| c.is_ascii_whitespace())
                        .unwrap_or(after_eq.len());
                    value = &after_eq[..end];
                    rest = &after_eq[end..];
                }
            }
        }

        let name = clean_name(raw_name);
        if name.is_empty() {
            continue;
        }
        attrs.push(Attribute { name, value: friendly_attr_value(value) });
    }
    attrs
}

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)&(?:#x([0-9a-f]+);?|#([0-9]+);?|(amp|lt|gt|quot|apos|colon|newline|tab|nbsp|sol|bsol);)").unwrap()
});

fn named_entity(name: &str) -> &'static str {
    match name.to_ascii_lowercase().as_str() {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "colon" => ":",
        "newline" => "\n",
        "tab" => "\t",
        "nbsp" => "\u{a0}",
        "sol" => "/",
        _ => "\\",
    }
}

/// Decode numeric entities and the html5 names used to disguise schemes and
/// hosts (`&colon;`, `&Tab;`, `&sol;`), drop tab and newline characters the
/// way url parsers do, blank out other control characters, trim.
///
/// Decoding is a single pass; [`escape_attr_value`] escapes every `&`, so a
/// nested `&#38;#106;` comes out as the literal text `&#106;` both here and in
/// the browser.
pub fn friendly_attr_value(value: &str) -> String {
    let decoded = ENTITY.replace_all(value, |caps: &Captures| {
        let code = if let Some(hex) = caps.get(1) {
            u32::from_str_radix(hex.as_str(), 16).ok()
        } else if let Some(dec) = caps.get(2) {
            dec.as_str().parse::<u32>().ok()
        } else {
            return named_entity(&caps[3]).to_string();
        };
        code.and_then(char::from_u32)
            .unwrap_or(char::REPLACEMENT_CHARACTER)
            .to_string()
    });
    let cleaned: String = decoded
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r'))
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    cleaned.trim().to_string()
}

/// Escape a decoded value for a double-quoted attribute.
pub fn escape_attr_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(source: &str) -> Vec<(String, String)> {
        split_attributes(source).into_iter().map(|a| (a.name, a.value)).collect()
    }

    fn p(name: &str, value: &str) -> (String, String) {
        (name.into(), value.into())
    }

    #[test]
    fn quoting_styles() {
        assert_eq!(
            pairs(r#"href="a b" title='c "d"' width=20 controls"#),
            vec![p("href", "a b"), p("title", "c \"d\""), p("width", "20"), p("controls", "")],
        );
    }

    #[test]
    fn whitespace_around_equals() {
        assert_eq!(pairs("a = \"1\"  b= 2"), vec![p("a", "1"), p("b", "2")]);
    }

    #[test]
    fn names_are_filtered_not_rejected() {
        assert_eq!(pairs(r#"On"Click=x DATA-foo=1"#), vec![p("onclick", "x"), p("data-foo", "1")]);
        assert_eq!(pairs("=foo ()=bar"), vec![]);
    }

    #[test]
    fn unterminated_quote_stops_parsing() {
        assert_eq!(pairs(r#"a=1 b="oops c=2"#), vec![p("a", "1")]);
    }

    #[test]
    fn values_are_trimmed() {
        assert_eq!(pairs(r#"title="  x  ""#), vec![p("title", "x")]);
    }

    #[test]
    fn decodes_scheme_disguises() {
        assert_eq!(friendly_attr_value("&#106;avascript&colon;alert(1)"), "javascript:alert(1)");
        assert_eq!(friendly_attr_value("&#x6A;ava&#115cript:"), "javascript:");
        assert_eq!(friendly_attr_value("java&NewLine;script:"), "javascript:");
        assert_eq!(friendly_attr_value("&quot;hi&quot;"), "\"hi\"");
        assert_eq!(friendly_attr_value("java\tscript:"), "javascript:");
        assert_eq!(friendly_attr_value("/&Tab;/evil.example"), "//evil.example");
        assert_eq!(friendly_attr_value("/&bsol;evil&sol;x"), "/\\evil/x");
        assert_eq!(friendly_attr_value("a\u{0}b"), "a b");
    }

    #[test]
    fn named_entities() {
        assert_eq!(friendly_attr_value("a&amp;b&lt;c&GT;"), "a&b<c>");
        assert_eq!(friendly_attr_value("&copy;"), "&copy;");
        assert_eq!(friendly_attr_value("&#xFFFFFFFF;"), "\u{FFFD}");
    }

    #[test]
    fn nested_entities_decode_one_level() {
        assert_eq!(friendly_attr_value("&#38;#106;"), "&#106;");
        assert_eq!(escape_attr_value(&friendly_attr_value("&#38;#106;")), "&amp;#106;");

        let chain = format!("&{}#106;", "#38;".repeat(50_000));
        let value = friendly_attr_value(&chain);
        assert_eq!(value.len(), chain.len() - 4);
        assert!(value.starts_with("&#38;#38;"));
        let escaped = escape_attr_value(&value);
        assert_eq!(escape_attr_value(&friendly_attr_value(&escaped)), escaped);
    }

    #[test]
    fn escapes_for_double_quotes() {
        assert_eq!(escape_attr_value(r#"a"<b>'&"#), "a&quot;&lt;b&gt;'&amp;");
    }
}
