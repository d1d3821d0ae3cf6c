//! Default tag/attribute table and CSS property table.
//!
//! Both are data contracts: existing cooked content depends on exactly these
//! entries surviving, so additions belong in a feature bundle instead.

use regex::Regex;

use crate::css::{CssRule, CssWhitelist};

/// Tag specs of the always-enabled `default` feature.
pub const DEFAULT_LIST: &[&str] = &[
    "a.attachment",
    "a.hashtag",
    "a.mention",
    "a.mention-group",
    "a.onebox",
    "a.inline-onebox",
    "a.inline-onebox-loading",
    "a[data-bbcode]",
    "a[name]",
    "a[rel=nofollow]",
    "a[rel=ugc]",
    "a[target=_blank]",
    "a[title]",
    "abbr[title]",
    "aside.quote",
    "aside[data-*]",
    "b",
    "big",
    "blockquote",
    "br",
    "code",
    "dd",
    "del",
    "div",
    "div.quote-controls",
    "div.title",
    "div[align]",
    "div[lang]",
    "div[data-*]",
    "div[dir]",
    "dl",
    "dt",
    "em",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "hr",
    "i",
    "iframe",
    "iframe[frameborder]",
    "iframe[height]",
    "iframe[marginheight]",
    "iframe[marginwidth]",
    "iframe[width]",
    "iframe[allowfullscreen]",
    "img.emoji",
    "img.emoji-custom",
    "img[alt]",
    "img[height]",
    "img[loading=lazy]",
    "img[title]",
    "img[width]",
    "ins",
    "kbd",
    "li",
    "mark",
    "ol",
    "ol[start]",
    "p",
    "p[lang]",
    "picture",
    "pre",
    "rp",
    "rt",
    "ruby",
    "s",
    "small",
    "source[data-orig-src]",
    "source[src]",
    "source[srcset]",
    "source[type]",
    "span.excerpt",
    "span.hashtag",
    "span.mention",
    "span[lang]",
    "strike",
    "strong",
    "sub",
    "sup",
    "track",
    "track[default]",
    "track[kind]",
    "track[label]",
    "track[src]",
    "track[srclang]",
    "ul",
    "video",
    "video[controls]",
    "video[controlslist]",
    "video[height]",
    "video[loop]",
    "video[muted]",
    "video[playsinline]",
    "video[poster]",
    "video[preload]",
    "video[width]",
    "audio",
    "audio[controls]",
    "audio[preload]",
];

fn length(re: &str) -> CssRule {
    CssRule::Pattern(Regex::new(re).unwrap())
}

fn no_url(value: &str) -> bool {
    !crate::css::has_url_call(value)
}

const LENGTH: &str = r"^(auto|0|-?\d+(\.\d+)?(px|em|rem|%|vh|vw|pt|ex|ch))$";

pub fn default_css() -> CssWhitelist {
    let mut css = CssWhitelist::empty();
    for allowed in [
        "color",
        "background-color",
        "border",
        "border-bottom",
        "border-collapse",
        "border-color",
        "border-left",
        "border-radius",
        "border-right",
        "border-style",
        "border-top",
        "border-width",
        "font",
        "font-family",
        "font-style",
        "font-variant",
        "font-weight",
        "letter-spacing",
        "line-height",
        "list-style-type",
        "margin",
        "margin-bottom",
        "margin-left",
        "margin-right",
        "margin-top",
        "padding",
        "padding-bottom",
        "padding-left",
        "padding-right",
        "padding-top",
        "text-decoration",
        "text-indent",
        "text-transform",
        "vertical-align",
        "white-space",
        "word-break",
        "word-wrap",
    ] {
        css.set(allowed, CssRule::Allow);
    }
    for sized in ["width", "height", "max-width", "max-height", "min-width", "min-height", "font-size"] {
        css.set(sized, length(LENGTH));
    }
    css.set("text-align", length(r"^(left|right|center|justify|start|end|inherit)$"));
    css.set("float", length(r"^(left|right|none)$"));
    css.set("display", length(r"^(none|inline|block|inline-block)$"));
    css.set("background", CssRule::Check(no_url));
    css.set("background-image", CssRule::Check(no_url));
    for denied in ["position", "behavior", "-moz-binding", "z-index", "content", "cursor", "filter"] {
        css.set(denied, CssRule::Deny);
    }
    css
}
