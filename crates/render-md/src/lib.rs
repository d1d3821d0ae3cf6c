
#[macro_use]
extern crate tracing;

pub mod cache;
pub mod config;
pub mod markdown;
pub mod render;

use std::collections::HashMap;
use std::sync::Arc;

use emoji::{EmojiEngine, EmojiOptions};
use pulldown_cmark::{Event, Parser, TextMergeStream};
use sanitize::{SanitizeOptions, Sanitizer, Whitelist, Whitelister};

pub use cache::{OneboxCache, ShortUrl, ShortUrlCache};
pub use config::{CookConfig, EmojiConfig, MarkdownConfig};

type UploadLookup = Box<dyn Fn(&[String]) -> HashMap<String, ShortUrl> + Send + Sync>;

pub(crate) fn parser_options() -> pulldown_cmark::Options {
    pulldown_cmark::Options::empty()
        | pulldown_cmark::Options::ENABLE_STRIKETHROUGH
        | pulldown_cmark::Options::ENABLE_TABLES
        | pulldown_cmark::Options::ENABLE_FOOTNOTES
        | pulldown_cmark::Options::ENABLE_TASKLISTS
        | pulldown_cmark::Options::ENABLE_HEADING_ATTRIBUTES
        | pulldown_cmark::Options::ENABLE_SMART_PUNCTUATION
}

/// Markdown to sanitized HTML, with the whitelist and emoji engine built
/// once up front.
pub struct Cooker {
    whitelist: Arc<Whitelist>,
    sanitize_options: SanitizeOptions,
    emoji: EmojiEngine,
    /// `None` when emoji are disabled
    emoji_options: Option<EmojiOptions>,
    markdown: MarkdownConfig,
    oneboxes: Arc<OneboxCache>,
    short_urls: Arc<ShortUrlCache>,
    upload_lookup: Option<UploadLookup>,
}

impl Cooker {
    #[tracing::instrument(skip_all)]
    pub fn new(config: CookConfig) -> Self {
        let mut whitelister = Whitelister::new(config.whitelist_options());
        for (name, specs) in &config.extra_features {
            whitelister.whitelist_feature(name, specs.iter().map(String::as_str)).enable(name);
        }

        let mut emoji = EmojiEngine::new();
        for (name, url) in &config.emoji.custom {
            emoji.register(name.as_str(), url.as_str(), None);
        }
        let emoji_options = config.emoji.enabled.then(|| config.emoji_options());

        Cooker {
            whitelist: whitelister.whitelist(),
            sanitize_options: config.sanitize_options(),
            emoji,
            emoji_options,
            markdown: config.markdown,
            oneboxes: Arc::default(),
            short_urls: Arc::default(),
            upload_lookup: None,
        }
    }

    /// Share a preview cache with whatever fetches oneboxes.
    pub fn with_onebox_cache(mut self, cache: Arc<OneboxCache>) -> Self {
        self.oneboxes = cache;
        self
    }

    pub fn with_short_url_cache(mut self, cache: Arc<ShortUrlCache>) -> Self {
        self.short_urls = cache;
        self
    }

    /// Resolve `upload://` references missing from the short-url cache. The
    /// lookup gets every uncached reference of one document at once.
    pub fn with_upload_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&[String]) -> HashMap<String, ShortUrl> + Send + Sync + 'static,
    {
        self.upload_lookup = Some(Box::new(lookup));
        self
    }

    pub fn emoji_mut(&mut self) -> &mut EmojiEngine {
        &mut self.emoji
    }

    pub fn whitelist(&self) -> &Arc<Whitelist> {
        &self.whitelist
    }

    pub fn oneboxes(&self) -> &OneboxCache {
        &self.oneboxes
    }

    pub fn short_urls(&self) -> &ShortUrlCache {
        &self.short_urls
    }

    #[tracing::instrument(skip_all, fields(len = markdown.len()))]
    pub fn cook(&self, markdown: &str) -> String {
        let events: Vec<Event> = TextMergeStream::new(Parser::new_ext(markdown, parser_options())).collect();

        if let Some(lookup) = &self.upload_lookup {
            self.short_urls.resolve_uncached(markdown::upload_references(&events), |shorts| lookup(shorts));
        }

        let options = markdown::Options {
            soft_breaks_as_hard: self.markdown.soft_breaks_as_hard,
            heading_ids: self.markdown.heading_ids,
            emoji: self.emoji_options.as_ref().map(|options| (&self.emoji, options)),
            uploads: Some(&self.short_urls),
        };
        let mut html = String::with_capacity(markdown.len() * 3 / 2);
        if let Err(err) = markdown::push_html(&mut html, markdown::onebox_links(events.into_iter()), options) {
            warn!(%err, "markdown rendering stopped early");
        }

        let html = match render::rewrite_oneboxes(&html, &self.oneboxes) {
            Ok(rewritten) => rewritten,
            Err(err) => {
                warn!(%err, "onebox rewrite failed, keeping placeholders");
                html
            }
        };

        Sanitizer::new(&self.whitelist)
            .with_options(self.sanitize_options.clone())
            .sanitize(&html)
    }
}

impl Default for Cooker {
    fn default() -> Self {
        Cooker::new(CookConfig::default())
    }
}
