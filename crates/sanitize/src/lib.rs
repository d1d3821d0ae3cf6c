
#[macro_use]
extern crate tracing;

pub mod attrs;
pub mod css;
pub mod defaults;
pub mod engine;
pub mod features;
pub mod tags;
pub mod whitelist;

use std::sync::Arc;

pub use css::{filter_declaration_block, CssRule, CssWhitelist};
pub use engine::{AttrDecision, SanitizeHooks, SanitizeOptions, Sanitizer, TagInfo};
pub use whitelist::{AttrPredicate, AttrRule, SpecError, TagSpec, Whitelist, WhitelistOptions, Whitelister};

/// Compose the default whitelist plus every enabled feature into a shareable handle.
pub fn build_whitelist(options: WhitelistOptions) -> Arc<Whitelist> {
    Whitelister::new(options).whitelist()
}

/// Filter `html` against `whitelist` with the default body-strip tags.
pub fn sanitize(html: &str, whitelist: &Whitelist) -> String {
    Sanitizer::new(whitelist).sanitize(html)
}

/// Filter a `style` attribute value against the given property table.
pub fn filter_css(declaration_block: &str, css: &CssWhitelist) -> String {
    filter_declaration_block(declaration_block, css)
}

/// Escape the characters that would otherwise start or end markup in body text.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    engine::escape_text_into(&mut out, text);
    out
}
