#[macro_use]
extern crate tracing;

pub mod data;
mod pattern;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::data::DICTIONARY;
use crate::pattern::{Patterns, UNICODE};

/// Cache-busting suffix of bundled emoji image urls.
pub const IMAGE_VERSION: u32 = 12;

/// Characters after which a shortcode may start when emoji are not inline.
const BOUNDARY_PUNCTUATION: &[char] = &[':', '.', ',', ';', '!', '?', '(', ')', '[', ']', '{', '}', '"', '\'', '-', '*', '_', '~', '/'];

/// Post-processing applied to every generated image url, e.g. to point at a CDN.
#[derive(Clone)]
pub struct UrlMapper(pub Arc<dyn Fn(&str) -> String + Send + Sync>);

impl fmt::Debug for UrlMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UrlMapper(..)")
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct EmojiOptions {
    /// Allow shortcodes directly after a word character, as in `abc:smile:`
    pub inline: bool,
    /// Translate emoticons such as `:)` and `<3`
    pub shortcuts: bool,
    pub set: String,
    /// Prefix of generated urls, such as a subfolder
    pub base_url: String,
    pub skip_title: bool,
    pub lazy: bool,
    /// Extra class on generated images
    pub class: Option<String>,
    /// Per-render overrides, code to image url
    pub custom_emoji: BTreeMap<String, String>,
    #[serde(skip)]
    pub get_url: Option<UrlMapper>,
}

impl Default for EmojiOptions {
    fn default() -> Self {
        EmojiOptions {
            inline: false,
            shortcuts: true,
            set: "twitter".into(),
            base_url: String::new(),
            skip_title: false,
            lazy: false,
            class: None,
            custom_emoji: BTreeMap::new(),
            get_url: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// `None` is unlimited
    pub max_results: Option<usize>,
    /// Suffix tonable results with `:tN`
    pub tone: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomEmoji {
    pub name: String,
    pub url: String,
    pub group: Option<String>,
}

/// Append the cache-busting version to `url`.
fn versioned(url: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}v={IMAGE_VERSION}")
}

/// Split `name:tN` into its parts. Surrounding colons are ignored.
fn split_tone(code: &str) -> (&str, Option<u8>) {
    let code = code.trim_matches(':');
    match code.rsplit_once(":t") {
        Some((name, tone)) if !tone.is_empty() && tone.bytes().all(|b| b.is_ascii_digit()) => {
            (name, tone.parse().ok().or(Some(u8::MAX)))
        }
        _ => (code, None),
    }
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

fn boundary_before(text: &str, start: usize, last_emoji_end: Option<usize>) -> bool {
    if last_emoji_end == Some(start) {
        return true;
    }
    match text[..start].chars().next_back() {
        None => true,
        Some(c) => c.is_whitespace() || BOUNDARY_PUNCTUATION.contains(&c),
    }
}

fn boundary_after(text: &str, end: usize) -> bool {
    text[end..].chars().next().map_or(true, |c| !c.is_alphanumeric())
}

static EMOJI_IMG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<img\s[^>]*>").unwrap());
static EMOJI_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bclass=['"][^'"]*\bemoji\b"#).unwrap());
static ALT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?i)\balt=['"]:?([^'":]+(?::t\d)?):?['"]"#).unwrap());

/// Emoji lookup and substitution, with site registrations on top of the
/// bundled dictionary.
pub struct EmojiEngine {
    custom: BTreeMap<String, CustomEmoji>,
    extra_translations: BTreeMap<String, String>,
    translations: BTreeMap<String, String>,
    patterns: Patterns,
}

impl fmt::Debug for EmojiEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmojiEngine")
            .field("custom", &self.custom)
            .field("extra_translations", &self.extra_translations)
            .finish_non_exhaustive()
    }
}

static SHARED: LazyLock<EmojiEngine> = LazyLock::new(EmojiEngine::new);

impl Default for EmojiEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EmojiEngine {
    pub fn new() -> Self {
        EmojiEngine {
            custom: BTreeMap::new(),
            extra_translations: BTreeMap::new(),
            translations: DICTIONARY.translations.clone(),
            patterns: Patterns::default(),
        }
    }

    /// Engine with no registrations, shared process-wide.
    pub fn shared() -> &'static EmojiEngine {
        &SHARED
    }

    pub fn register(&mut self, name: impl Into<String>, url: impl Into<String>, group: Option<String>) -> &mut Self {
        let name = name.into().to_lowercase();
        let emoji = CustomEmoji { name: name.clone(), url: url.into(), group };
        self.custom.insert(name, emoji);
        self
    }

    /// Registered custom emoji, sorted by name.
    pub fn custom_emoji(&self) -> impl Iterator<Item = &CustomEmoji> {
        self.custom.values()
    }

    /// Map an emoticon to an emoji code. Invalidates the compiled scanners.
    pub fn add_translation(&mut self, emoticon: impl Into<String>, code: impl Into<String>) -> &mut Self {
        let (emoticon, code) = (emoticon.into(), code.into());
        self.extra_translations.insert(emoticon.clone(), code.clone());
        self.translations.insert(emoticon, code);
        self.patterns = Patterns::default();
        self
    }

    pub fn exists(&self, code: &str) -> bool {
        let code = code.to_lowercase();
        let (name, tone) = split_tone(&code);
        if tone.is_none() && self.custom.contains_key(name) {
            return true;
        }
        match (DICTIONARY.canonical(name), tone) {
            (Some(_), None | Some(1)) => true,
            (Some(canonical), Some(t)) => (2..=6).contains(&t) && DICTIONARY.tonable.contains(canonical),
            (None, _) => false,
        }
    }

    pub fn is_toneable(&self, code: &str) -> bool {
        let code = code.to_lowercase();
        let (name, _) = split_tone(&code);
        DICTIONARY.canonical(name).is_some_and(|c| DICTIONARY.tonable.contains(c))
    }

    /// Image url for `code`, `name:tN`, or either wrapped in colons. Codes
    /// are case-insensitive.
    pub fn url(&self, code: &str, options: &EmojiOptions) -> Option<String> {
        let code = code.to_lowercase();
        let (name, tone) = split_tone(&code);
        let custom = options
            .custom_emoji
            .get(name)
            .or_else(|| self.custom.get(name).map(|e| &e.url));
        if let Some(url) = custom {
            return tone.is_none().then(|| versioned(url));
        }

        let canonical = DICTIONARY.canonical(name)?;
        let segment = match tone {
            None | Some(1) => String::new(),
            Some(t @ 2..=6) if DICTIONARY.tonable.contains(canonical) => format!("/{t}"),
            Some(_) => return None,
        };
        let url = format!(
            "{}/images/emoji/{}/{canonical}{segment}.png?v={IMAGE_VERSION}",
            options.base_url, options.set,
        );
        Some(match &options.get_url {
            Some(UrlMapper(map)) => map(&url),
            None => url,
        })
    }

    fn image(&self, code: &str, url: &str, options: &EmojiOptions) -> String {
        let (name, _) = split_tone(code);
        let is_custom = options.custom_emoji.contains_key(name) || self.custom.contains_key(name);
        let code = escape_attr(code);
        let mut class = String::from("emoji");
        if is_custom {
            class.push_str(" emoji-custom");
        }
        if let Some(extra) = &options.class {
            class.push(' ');
            class.push_str(&escape_attr(extra));
        }
        let title = if options.skip_title { String::new() } else { format!(" title='{code}'") };
        let lazy = if options.lazy { " loading='lazy'" } else { "" };
        format!(
            "<img width=\"20\" height=\"20\" src='{}'{title} alt='{code}' class='{class}'{lazy}>",
            escape_attr(url),
        )
    }

    /// Length of the longest emoticon starting at `start` that stands alone.
    fn emoticon_at(&self, text: &str, start: usize, last_emoji_end: Option<usize>) -> Option<(usize, &str)> {
        if !boundary_before(text, start, last_emoji_end) {
            return None;
        }
        let rest = &text[start..];
        self.translations
            .iter()
            .filter(|(emoticon, _)| rest.starts_with(emoticon.as_str()))
            .filter(|(emoticon, _)| boundary_after(text, start + emoticon.len()))
            .max_by_key(|(emoticon, _)| emoticon.len())
            .map(|(emoticon, code)| (emoticon.len(), code.as_str()))
    }

    /// Consumed length and emoji code for a scanner match.
    fn resolve(
        &self,
        text: &str,
        start: usize,
        token: &str,
        options: &EmojiOptions,
        last_emoji_end: Option<usize>,
    ) -> Option<(usize, String)> {
        if options.shortcuts {
            if let Some((len, code)) = self.emoticon_at(text, start, last_emoji_end) {
                return Some((len, code.to_string()));
            }
        }
        if let Some(code) = DICTIONARY.replacements.get(token) {
            return Some((token.len(), code.clone()));
        }
        let closed = token.len() > 2 && token.starts_with(':') && token.ends_with(':');
        if !closed || (!options.inline && !boundary_before(text, start, last_emoji_end)) {
            return None;
        }
        Some((token.len(), token[1..token.len() - 1].to_lowercase()))
    }

    /// Replace shortcodes, emoticons and unicode emoji in `text` with images.
    pub fn unescape(&self, text: &str, options: &EmojiOptions) -> String {
        let mut out = String::with_capacity(text.len());
        self.unescape_into(&mut out, text, options, |out, literal| out.push_str(literal));
        out
    }

    /// Like [`Self::unescape`], passing text between emoji through `literal`
    /// so the caller can escape it.
    pub fn unescape_into<F>(&self, out: &mut String, text: &str, options: &EmojiOptions, mut literal: F)
    where
        F: FnMut(&mut String, &str),
    {
        let scanner = self.patterns.get(options.inline, &self.translations);
        let mut pos = 0;
        let mut flushed = 0;
        let mut last_emoji_end = None;
        while let Some(m) = scanner.find_at(text, pos) {
            let start = m.start();
            let resolved = self
                .resolve(text, start, m.as_str(), options, last_emoji_end)
                .and_then(|(len, code)| Some((len, self.url(&code, options)?, code)));
            match resolved {
                Some((len, url, code)) => {
                    literal(out, &text[flushed..start]);
                    out.push_str(&self.image(&code, &url, options));
                    flushed = start + len;
                    pos = flushed;
                    last_emoji_end = Some(pos);
                }
                None => {
                    // Retry from the next character, a shorter token may start inside this one
                    pos = start + text[start..].chars().next().map_or(1, char::len_utf8);
                }
            }
        }
        literal(out, &text[flushed..]);
    }

    /// Turn emoji images and unicode emoji back into `:code:` shortcodes.
    pub fn escape(&self, html: &str, options: &EmojiOptions) -> String {
        let images = EMOJI_IMG.replace_all(html, |caps: &regex::Captures| {
            let tag = &caps[0];
            match (EMOJI_CLASS.is_match(tag), ALT.captures(tag)) {
                (true, Some(alt)) => format!(":{}:", &alt[1]),
                _ => tag.to_string(),
            }
        });

        let mut out = String::with_capacity(images.len());
        let mut last = 0;
        for m in UNICODE.find_iter(&images) {
            let glued = images[..m.start()].chars().next_back().is_some_and(char::is_alphanumeric);
            if glued && !options.inline {
                continue;
            }
            let Some(code) = DICTIONARY.replacements.get(m.as_str()) else {
                continue;
            };
            out.push_str(&images[last..m.start()]);
            out.push(':');
            out.push_str(code);
            out.push(':');
            last = m.end();
        }
        out.push_str(&images[last..]);
        out
    }

    /// Prefix matches, then substring matches, then search-alias and alias
    /// expansions, deduplicated.
    pub fn search(&self, term: &str, options: &SearchOptions) -> Vec<String> {
        let term = term.trim().trim_matches(':').to_lowercase();
        if term.is_empty() {
            return Vec::new();
        }

        let mut names: Vec<&str> = DICTIONARY.names.iter().map(String::as_str).collect();
        names.extend(self.custom.keys().map(String::as_str));
        names.sort_unstable();
        names.dedup();

        let mut found: Vec<&str> = names.iter().copied().filter(|n| n.starts_with(&term)).collect();
        found.extend(names.iter().copied().filter(|n| !n.starts_with(&term) && n.contains(&term)));
        for (key, targets) in &DICTIONARY.search_aliases {
            if key.starts_with(&term) {
                found.extend(targets.iter().map(String::as_str));
            }
        }
        for (canonical, aliases) in &DICTIONARY.aliases {
            if aliases.iter().any(|a| a.contains(&term)) {
                found.push(canonical);
            }
        }

        let mut seen = std::collections::HashSet::new();
        found.retain(|name| seen.insert(*name));
        if let Some(max) = options.max_results {
            found.truncate(max);
        }

        found
            .into_iter()
            .map(|name| match options.tone {
                Some(t @ 2..=6) if DICTIONARY.tonable.contains(name) => format!("{name}:t{t}"),
                _ => name.to_string(),
            })
            .collect()
    }
}

/// [`EmojiEngine::unescape`] on the shared engine.
pub fn unescape_emoji(text: &str, options: &EmojiOptions) -> String {
    EmojiEngine::shared().unescape(text, options)
}

pub fn escape_emoji(html: &str, options: &EmojiOptions) -> String {
    EmojiEngine::shared().escape(html, options)
}

pub fn emoji_url(code: &str, options: &EmojiOptions) -> Option<String> {
    EmojiEngine::shared().url(code, options)
}

pub fn emoji_exists(code: &str) -> bool {
    EmojiEngine::shared().exists(code)
}

/// `max_results` of `None` is unlimited.
pub fn search_emoji(term: &str, max_results: Option<usize>) -> Vec<String> {
    EmojiEngine::shared().search(term, &SearchOptions { max_results, tone: None })
}
