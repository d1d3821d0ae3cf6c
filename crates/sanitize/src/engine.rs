//! Rebuilds html from its tag fragments, keeping only what the whitelist allows.

use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::attrs::{escape_attr_value, split_attributes, Attribute};
use crate::css::safe_attr_value;
use crate::tags::{attribute_source, split_tags, Segment, SegmentKind};
use crate::whitelist::Whitelist;

/// Attribute marking an iframe whose `src` was rejected. Never produced by
/// attribute parsing, which lowercases names.
const IFRAME_STRIP: &str = "-STRIP-";

static STRIPPED_IFRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<iframe[^>]*\s-STRIP-[^>]*>.*?</iframe>").unwrap());
static STRIPPED_IFRAME_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<iframe[^>]*\s-STRIP-[^>]*>").unwrap());
static AMPERSAND: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&([#\w]+;)?").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SanitizeOptions {
    /// Non-whitelisted tags whose body is removed along with the tag.
    pub strip_body_tags: Vec<String>,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        SanitizeOptions { strip_body_tags: vec!["script".into(), "table".into()] }
    }
}

/// A tag occurrence as seen by [`SanitizeHooks::on_tag`].
#[derive(Debug, Clone, Copy)]
pub struct TagInfo<'a> {
    pub name: &'a str,
    pub source: &'a str,
    pub is_closing: bool,
    pub whitelisted: bool,
    /// Offset in the output built so far
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrDecision {
    /// Emit the value, subject to the dangerous-value checks.
    Keep,
    Drop,
    /// Emit this value instead, subject to the same checks.
    Replace(String),
}

/// Overrides consulted before the whitelist. Returning `None` falls through
/// to the default behavior.
pub trait SanitizeHooks {
    /// Replacement markup for the whole tag. The result is emitted as-is.
    fn on_tag(&self, _tag: &TagInfo<'_>) -> Option<String> {
        None
    }

    fn on_tag_attr(&self, _tag: &str, _name: &str, _value: &str) -> Option<AttrDecision> {
        None
    }
}

pub(crate) fn escape_text_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

/// Regions of the output to cut for strip-body tags. One open position is
/// shared by every tag name, and the first closer ends the region.
#[derive(Default)]
struct BodyCuts {
    open: Option<usize>,
    cuts: Vec<Range<usize>>,
}

impl BodyCuts {
    fn tag(&mut self, is_closing: bool, position: usize) {
        if is_closing {
            let start = self.open.take().unwrap_or(position);
            self.cuts.push(start..position);
        } else if self.open.is_none() {
            self.open = Some(position);
        }
    }

    fn apply(self, out: String) -> String {
        if self.cuts.is_empty() {
            return out;
        }
        let mut kept = String::with_capacity(out.len());
        let mut last = 0;
        for cut in self.cuts {
            kept.push_str(&out[last..cut.start]);
            last = cut.end;
        }
        kept.push_str(&out[last..]);
        kept
    }
}

pub struct Sanitizer<'a> {
    whitelist: &'a Whitelist,
    options: SanitizeOptions,
    hooks: Option<&'a dyn SanitizeHooks>,
}

impl<'a> Sanitizer<'a> {
    pub fn new(whitelist: &'a Whitelist) -> Self {
        Sanitizer { whitelist, options: SanitizeOptions::default(), hooks: None }
    }

    pub fn with_options(mut self, options: SanitizeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_hooks(mut self, hooks: &'a dyn SanitizeHooks) -> Self {
        self.hooks = Some(hooks);
        self
    }

    fn strips_body(&self, name: &str) -> bool {
        self.options.strip_body_tags.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    pub fn sanitize(&self, html: &str) -> String {
        let mut out = String::with_capacity(html.len());
        let mut cuts = BodyCuts::default();

        for segment in split_tags(html) {
            if segment.kind == SegmentKind::Text {
                escape_text_into(&mut out, segment.content);
                continue;
            }
            let name = segment.name();
            let whitelisted = self.whitelist.tag_allowed(&name);
            if let Some(hooks) = self.hooks {
                let info = TagInfo {
                    name: &name,
                    source: segment.content,
                    is_closing: segment.is_closing,
                    whitelisted,
                    position: out.len(),
                };
                if let Some(replacement) = hooks.on_tag(&info) {
                    out.push_str(&replacement);
                    continue;
                }
            }

            if !whitelisted {
                if self.strips_body(&name) {
                    cuts.tag(segment.is_closing, out.len());
                } else {
                    escape_text_into(&mut out, segment.content);
                }
            } else if segment.is_closing {
                out.push_str("</");
                out.push_str(&name);
                out.push('>');
            } else {
                self.open_tag(&mut out, &name, &segment);
            }
        }

        let out = cuts.apply(out);
        let out = STRIPPED_IFRAME.replace_all(&out, "");
        let out = STRIPPED_IFRAME_OPEN.replace_all(&out, "");
        AMPERSAND
            .replace_all(&out, |caps: &Captures| match caps.get(1) {
                Some(_) => caps[0].to_string(),
                None => "&amp;".to_string(),
            })
            .into_owned()
    }

    fn open_tag(&self, out: &mut String, name: &str, segment: &Segment<'_>) {
        out.push('<');
        out.push_str(name);
        let mut seen: Vec<String> = Vec::new();
        for attr in split_attributes(attribute_source(segment.content)) {
            if seen.contains(&attr.name) {
                continue;
            }
            seen.push(attr.name.clone());
            match self.decide(name, &attr) {
                Emit::Value(value) if value.is_empty() => {
                    out.push(' ');
                    out.push_str(&attr.name);
                }
                Emit::Value(value) => {
                    out.push(' ');
                    out.push_str(&attr.name);
                    out.push_str("=\"");
                    out.push_str(&escape_attr_value(&value));
                    out.push('"');
                }
                Emit::Drop => trace!(tag = name, attr = attr.name.as_str(), "attribute dropped"),
                Emit::StripTag => {
                    trace!(tag = name, "iframe src rejected");
                    out.push(' ');
                    out.push_str(IFRAME_STRIP);
                }
            }
        }
        out.push('>');
    }

    fn decide(&self, tag: &str, attr: &Attribute) -> Emit {
        let mut value = attr.value.clone();
        if let Some(hooks) = self.hooks {
            match hooks.on_tag_attr(tag, &attr.name, &attr.value) {
                Some(AttrDecision::Drop) => return Emit::Drop,
                Some(AttrDecision::Keep) => return self.checked(&attr.name, &value),
                Some(AttrDecision::Replace(replacement)) => return self.checked(&attr.name, &replacement),
                None => (),
            }
        }
        if attr.name.starts_with("on") {
            return Emit::Drop;
        }

        let whitelist = self.whitelist;
        let name = attr.name.as_str();
        match safe_attr_value(name, &value, whitelist.css()) {
            Some(safe) => value = safe,
            None if tag == "iframe" && name == "src" => return Emit::StripTag,
            None => return Emit::Drop,
        }

        if name == "class" {
            let kept: Vec<&str> = value
                .split_ascii_whitespace()
                .filter(|class| whitelist.class_allowed(tag, class) || whitelist.custom_allows(tag, name, class))
                .collect();
            if kept.is_empty() {
                return Emit::Drop;
            }
            return Emit::Value(kept.join(" "));
        }

        let is_link = matches!(name, "href" | "src");
        if let Some(rule) = whitelist.attr_rule(tag, name) {
            if rule.allows(&value) && (!is_link || whitelist.href_allowed(&value, true)) {
                return Emit::Value(value);
            }
        }
        match (tag, name) {
            ("a", "href") | ("img", "src") if whitelist.href_allowed(&value, tag == "img") => {
                return Emit::Value(value)
            }
            ("iframe", "src") if whitelist.iframe_allowed(&value) => return Emit::Value(value),
            ("iframe", "src") => return Emit::StripTag,
            (_, "id") if Whitelist::heading_id_allowed(tag, &value) => return Emit::Value(value),
            _ => (),
        }
        if whitelist.custom_allows(tag, name, &value) {
            return Emit::Value(value);
        }
        Emit::Drop
    }

    /// Hook-approved values still pass the dangerous-value checks.
    fn checked(&self, name: &str, value: &str) -> Emit {
        if name.starts_with("on") {
            return Emit::Drop;
        }
        match safe_attr_value(name, value, self.whitelist.css()) {
            Some(safe) => Emit::Value(safe),
            None => Emit::Drop,
        }
    }
}

enum Emit {
    Value(String),
    Drop,
    StripTag,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whitelist::{WhitelistOptions, Whitelister};

    fn default_list() -> std::sync::Arc<Whitelist> {
        Whitelister::new(WhitelistOptions {
            allowed_iframes: vec!["https://www.youtube.com".into()],
            ..Default::default()
        })
        .whitelist()
    }

    fn clean(html: &str) -> String {
        Sanitizer::new(&default_list()).sanitize(html)
    }

    fn with(specs: &[&str], html: &str) -> String {
        let mut w = Whitelister::new(WhitelistOptions::default());
        w.whitelist_feature("test", specs.iter().copied()).enable("test");
        Sanitizer::new(&w.whitelist()).sanitize(html)
    }

    #[test]
    fn javascript_href_is_dropped() {
        assert_eq!(clean(r#"<a href="javascript:alert(1)">x</a>"#), "<a>x</a>");
        assert_eq!(clean(r#"<a href="&#106;avascript&colon;alert(1)">x</a>"#), "<a>x</a>");
        assert_eq!(clean(r#"<a href="https://x.example/?a=1&b=2">x</a>"#), r#"<a href="https://x.example/?a=1&amp;b=2">x</a>"#);
    }

    #[test]
    fn disguised_paths_show_their_host() {
        assert_eq!(clean(r#"<a href="/\evil.example">x</a>"#), "<a>x</a>");
        assert_eq!(clean(r#"<a href="/&bsol;evil.example">x</a>"#), "<a>x</a>");
        assert_eq!(clean(r#"<a href="/&Tab;/evil.example">x</a>"#), r#"<a href="//evil.example">x</a>"#);
        assert_eq!(clean("<a href=\"&#38;#106;avascript:x\" title=\"&#38;#106;\">x</a>"), r#"<a title="&amp;#106;">x</a>"#);
    }

    #[test]
    fn style_with_script_url_is_dropped() {
        let html = r#"<div style="color:red;background:url(javascript:alert(1))">t</div>"#;
        assert_eq!(with(&["div[style]"], html), "<div>t</div>");
        let html = r#"<div style="color:red;background:url(/a.png)">t</div>"#;
        assert_eq!(with(&["div[style]"], html), r#"<div style="color:red">t</div>"#);
        assert_eq!(clean(r#"<div style="color:red">t</div>"#), "<div>t</div>");
    }

    #[test]
    fn rejected_iframe_is_removed() {
        assert_eq!(clean("<iframe src='https://evil.example/x'></iframe>"), "");
        assert_eq!(clean("a<iframe src='https://evil.example/x'><b>body</b></iframe>b"), "ab");
        assert_eq!(clean("<iframe src='javascript:alert(1)'>"), "");
        assert_eq!(
            clean(r#"<iframe src="https://www.youtube.com/embed/x" width="560"></iframe>"#),
            r#"<iframe src="https://www.youtube.com/embed/x" width="560"></iframe>"#,
        );
    }

    #[test]
    fn unknown_tags_are_escaped() {
        assert_eq!(clean("<marquee>hi</marquee>"), "&lt;marquee&gt;hi&lt;/marquee&gt;");
        assert_eq!(clean("<!-- c -->x"), "&lt;!-- c --&gt;x");
        assert_eq!(clean("I <3 you"), "I &lt;3 you");
    }

    #[test]
    fn strip_body_tags() {
        assert_eq!(clean("a<script>alert(1)</script>b"), "ab");
        assert_eq!(clean("a<table><tr><td>x</td></tr></table>b"), "ab");
        assert_eq!(clean("a</script>b"), "ab");
        assert_eq!(clean("a<script>b"), "ab");
        // first closer ends the region, the rest is plain text
        assert_eq!(clean("<script><script>x</script>y</script>z"), "yz");
        assert_eq!(with(&["table", "tr", "td"], "<table><tr><td>x</td></tr></table>"), "<table><tr><td>x</td></tr></table>");
    }

    #[test]
    fn event_handlers_never_survive() {
        assert_eq!(clean(r#"<img src="/a.png" onerror="alert(1)">"#), r#"<img src="/a.png">"#);
        assert_eq!(with(&["img[onerror]"], r#"<img onerror="alert(1)">"#), "<img>");
    }

    #[test]
    fn classes_are_filtered_per_token() {
        assert_eq!(clean(r#"<span class="mention evil">@a</span>"#), r#"<span class="mention">@a</span>"#);
        assert_eq!(clean(r#"<span class="evil">x</span>"#), "<span>x</span>");
    }

    #[test]
    fn literal_values_and_data_attributes() {
        assert_eq!(clean(r#"<a target="_blank" rel="nofollow noopener">x</a>"#), r#"<a target="_blank">x</a>"#);
        assert_eq!(clean(r#"<div data-foo="1" data-html-x="2">x</div>"#), r#"<div data-foo="1">x</div>"#);
    }

    #[test]
    fn heading_ids() {
        assert_eq!(clean(r#"<h2 id="heading--intro">x</h2>"#), r#"<h2 id="heading--intro">x</h2>"#);
        assert_eq!(clean(r#"<h2 id="intro">x</h2>"#), "<h2>x</h2>");
        assert_eq!(clean(r#"<p id="heading--intro">x</p>"#), "<p>x</p>");
    }

    #[test]
    fn self_closing_is_void_form() {
        assert_eq!(clean("a<br/>b<br />"), "a<br>b<br>");
        assert_eq!(clean(r#"<img src="/a.png" alt="x"/>"#), r#"<img src="/a.png" alt="x">"#);
        assert_eq!(clean("<video controls></video>"), "<video controls></video>");
    }

    #[test]
    fn data_image_sources() {
        assert_eq!(clean(r#"<img src="data:image/png;base64,AA">"#), r#"<img src="data:image/png;base64,AA">"#);
        assert_eq!(clean(r#"<a href="data:image/png;base64,AA">x</a>"#), "<a>x</a>");
    }

    #[test]
    fn ampersands() {
        assert_eq!(clean("a & b &amp; &#39; &nbsp;"), "a &amp; b &amp; &#39; &nbsp;");
        assert_eq!(clean(r#"<a title="1 &amp; 2 & 3">x</a>"#), r#"<a title="1 &amp; 2 &amp; 3">x</a>"#);
    }

    #[test]
    fn duplicate_attributes_keep_the_first() {
        assert_eq!(clean(r#"<a title="a" title="b">x</a>"#), r#"<a title="a">x</a>"#);
    }

    #[test]
    fn idempotent_on_samples() {
        for html in [
            r#"<a href="/x" title='say "hi" <now>'>x &copy; <b>y</b></a>"#,
            "<p>1 < 2 && 3 > 2</p><script>x",
            r#"<img src="https://a.example/b.png?x=1&y=2" width=20 class="emoji evil">"#,
            "<div data-x=\"&#34;&#60;\">t</div>",
        ] {
            let once = clean(html);
            assert_eq!(clean(&once), once, "{html}");
        }
    }

    struct Hooks;

    impl SanitizeHooks for Hooks {
        fn on_tag(&self, tag: &TagInfo<'_>) -> Option<String> {
            (tag.name == "hr" && !tag.whitelisted).then(|| "<hr>".into())
        }

        fn on_tag_attr(&self, tag: &str, name: &str, value: &str) -> Option<AttrDecision> {
            match (tag, name) {
                ("a", "title") if value == "secret" => Some(AttrDecision::Drop),
                ("a", "data-x") => Some(AttrDecision::Keep),
                ("a", "href") => Some(AttrDecision::Replace(format!("/redirect?to={value}"))),
                ("b", "style") => Some(AttrDecision::Keep),
                _ => None,
            }
        }
    }

    #[test]
    fn hooks_override_rules() {
        let list = default_list();
        let sanitizer = Sanitizer::new(&list).with_hooks(&Hooks);
        assert_eq!(
            sanitizer.sanitize(r#"<a title="secret" data-x="1" href="https://x.example">x</a>"#),
            r#"<a data-x="1" href="/redirect?to=https://x.example">x</a>"#,
        );
        // hooks cannot let a dangerous value through
        assert_eq!(sanitizer.sanitize(r#"<b style="width:expression(1)">x</b>"#), "<b>x</b>");
        assert_eq!(sanitizer.sanitize(r#"<b style="color:red">x</b>"#), r#"<b style="color:red">x</b>"#);
    }

    #[test]
    fn custom_strip_set() {
        let list = default_list();
        let sanitizer = Sanitizer::new(&list).with_options(SanitizeOptions { strip_body_tags: vec!["style".into()] });
        assert_eq!(sanitizer.sanitize("a<style>b{}</style>c"), "ac");
        assert_eq!(sanitizer.sanitize("<script>x</script>"), "&lt;script&gt;x&lt;/script&gt;");
    }
}
