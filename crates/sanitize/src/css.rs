//! `style` attribute filtering and the cross-cutting dangerous-value checks.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// How a CSS property's value is judged.
pub enum CssRule {
    Allow,
    Deny,
    Pattern(Regex),
    Check(fn(&str) -> bool),
}

impl CssRule {
    fn accepts(&self, value: &str) -> bool {
        match self {
            CssRule::Allow => true,
            CssRule::Deny => false,
            CssRule::Pattern(re) => re.is_match(value),
            CssRule::Check(f) => f(value),
        }
    }
}

impl std::fmt::Debug for CssRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CssRule::Allow => f.write_str("Allow"),
            CssRule::Deny => f.write_str("Deny"),
            CssRule::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            CssRule::Check(_) => f.write_str("Check(..)"),
        }
    }
}

/// Property name (case-sensitive) to rule. Unlisted properties are denied.
#[derive(Debug, Default)]
pub struct CssWhitelist {
    properties: HashMap<String, CssRule>,
}

impl CssWhitelist {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set(&mut self, property: impl Into<String>, rule: CssRule) -> &mut Self {
        self.properties.insert(property.into(), rule);
        self
    }

    pub fn rule(&self, property: &str) -> Option<&CssRule> {
        self.properties.get(property)
    }

    pub fn accepts(&self, property: &str, value: &str) -> bool {
        self.rule(property).is_some_and(|r| r.accepts(value))
    }
}

/// Prebuilt default table, shared by every whitelist that doesn't bring its own.
pub static DEFAULT_CSS: LazyLock<std::sync::Arc<CssWhitelist>> =
    LazyLock::new(|| std::sync::Arc::new(crate::defaults::default_css()));

static SCRIPT_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)((j\s*a\s*v\s*a|v\s*b|l\s*i\s*v\s*e)\s*s\s*c\s*r\s*i\s*p\s*t\s*|m\s*o\s*c\s*h\s*a):").unwrap()
});
static EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)e\s*x\s*p\s*r\s*e\s*s\s*s\s*i\s*o\s*n\s*\(").unwrap());
static URL_CALL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)u\s*r\s*l\s*\(").unwrap());

pub fn has_script_scheme(value: &str) -> bool {
    SCRIPT_SCHEME.is_match(value)
}

pub fn has_expression(value: &str) -> bool {
    EXPRESSION.is_match(value)
}

pub fn has_url_call(value: &str) -> bool {
    URL_CALL.is_match(value)
}

/// Checks applied to `style`, `href`, `src` and `background` before any per-tag
/// rule. Returns the value to emit, or `None` when the attribute must be dropped.
pub fn safe_attr_value(name: &str, value: &str, css: &CssWhitelist) -> Option<String> {
    match name {
        "href" | "src" | "background" => {
            let value = value.trim();
            if has_script_scheme(value) {
                return None;
            }
            Some(value.to_string())
        }
        "style" => {
            if has_expression(value) {
                return None;
            }
            if has_url_call(value) && has_script_scheme(value) {
                return None;
            }
            let filtered = filter_declaration_block(value, css);
            (!filtered.is_empty()).then_some(filtered)
        }
        _ => Some(value.to_string()),
    }
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        // The space keeps `/` and `*` on either side from forming a new comment
        out.push(' ');
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => rest = "",
        }
    }
    out.push_str(rest);
    out
}

/// Split on `;` outside parentheses and quotes.
fn split_declarations(css: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote = None;
    let mut last = 0;
    for (i, c) in css.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => (),
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                parts.push(&css[last..i]);
                last = i + 1;
            }
            _ => (),
        }
    }
    parts.push(&css[last..]);
    parts
}

/// Characters that never appear in a declaration this filter emits. Keeping
/// them out means the emitted block escapes to itself inside an attribute.
fn has_markup_chars(value: &str) -> bool {
    value.contains(|c| matches!(c, '<' | '>' | '&' | '"' | '\\'))
}

/// Keep only allow-listed `name: value` declarations, joined by `"; "`.
pub fn filter_declaration_block(css: &str, whitelist: &CssWhitelist) -> String {
    let css = strip_comments(css);
    let mut kept = Vec::new();
    for declaration in split_declarations(&css) {
        let Some((name, value)) = declaration.split_once(':') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() || value.is_empty() {
            continue;
        }
        if has_markup_chars(value) || has_expression(value) || has_script_scheme(value) {
            trace!(property = name, "dangerous css value dropped");
            continue;
        }
        if whitelist.accepts(name, value) {
            kept.push(format!("{name}:{value}"));
        }
    }
    kept.join("; ")
}
