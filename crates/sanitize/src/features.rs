//! Rule bundles for the markdown extensions that emit extra markup. Each is
//! registered disabled; configuration turns them on by name.

use std::sync::LazyLock;

use regex::Regex;

use crate::whitelist::Whitelister;

pub const TABLE: &[&str] = &[
    "table", "thead", "tbody", "tr", "th", "td", "th[style]", "td[style]", "th[align]", "td[align]",
];

pub const CODE_BLOCKS: &[&str] = &["pre", "code"];

pub const DETAILS: &[&str] = &["details", "details[open]", "summary"];

pub const ONEBOX: &[&str] = &[
    "aside.onebox",
    "aside[data-onebox-src]",
    "header.source",
    "article.onebox-body",
    "img.thumbnail",
    "h3",
    "a.onebox",
];

pub const LIGHTBOX: &[&str] = &[
    "div.lightbox-wrapper",
    "a.lightbox",
    "a[data-download-href]",
    "img[data-orig-src]",
    "img[data-base62-sha1]",
];

pub const MENTIONS: &[&str] = &["span.mention", "a.mention", "a.mention-group", "a.hashtag"];

static LANG_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(lang|language)-[A-Za-z0-9_+#-]+$").unwrap());

/// `code class="lang-rust"` and `class="language-rust"`.
fn code_lang_class(tag: &str, attr: &str, value: &str) -> bool {
    tag == "code" && attr == "class" && LANG_CLASS.is_match(value)
}

pub fn register_builtin(whitelister: &mut Whitelister) {
    whitelister
        .whitelist_feature("table", TABLE.iter().copied())
        .whitelist_feature("code-blocks", CODE_BLOCKS.iter().copied())
        .whitelist_custom("code-blocks", code_lang_class)
        .whitelist_feature("details", DETAILS.iter().copied())
        .whitelist_feature("onebox", ONEBOX.iter().copied())
        .whitelist_feature("lightbox", LIGHTBOX.iter().copied())
        .whitelist_feature("mentions", MENTIONS.iter().copied());
}

#[cfg(test)]
mod tests {
    use crate::whitelist::{Whitelister, WhitelistOptions};

    #[test]
    fn bundles_are_off_until_enabled() {
        let mut w = Whitelister::new(WhitelistOptions::default());
        assert!(!w.whitelist().tag_allowed("summary"));
        w.enable("details");
        assert!(w.whitelist().tag_allowed("summary"));
        assert!(w.whitelist().attr_rule("details", "open").is_some());
    }

    #[test]
    fn code_language_classes() {
        let mut w = Whitelister::new(WhitelistOptions::default());
        assert!(!w.whitelist().custom_allows("code", "class", "lang-rust"));
        w.enable("code-blocks");
        let list = w.whitelist();
        assert!(list.custom_allows("code", "class", "lang-rust"));
        assert!(list.custom_allows("code", "class", "language-c++"));
        assert!(!list.custom_allows("code", "class", "lang-a b"));
        assert!(!list.custom_allows("pre", "class", "lang-rust"));
    }
}
