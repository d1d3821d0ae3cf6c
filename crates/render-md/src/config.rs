use std::collections::BTreeMap;
use std::path::Path;

use emoji::EmojiOptions;
use sanitize::{SanitizeOptions, WhitelistOptions};

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct CookConfig {
    /// Whitelist feature toggles, on top of the always-enabled `default`
    pub features: BTreeMap<String, bool>,
    pub allowed_href_schemes: Vec<String>,
    /// Host prefixes accepted for `iframe[src]`
    pub allowed_iframes: Vec<String>,
    /// Site-supplied tag spec bundles, enabled as soon as they're listed
    pub extra_features: BTreeMap<String, Vec<String>>,
    pub strip_body_tags: Vec<String>,
    pub emoji: EmojiConfig,
    pub markdown: MarkdownConfig,
}

impl Default for CookConfig {
    fn default() -> Self {
        let features = ["table", "code-blocks", "lightbox"]
            .into_iter()
            .map(|name| (name.to_string(), true))
            .collect();
        CookConfig {
            features,
            allowed_href_schemes: Vec::new(),
            allowed_iframes: Vec::new(),
            extra_features: BTreeMap::new(),
            strip_body_tags: SanitizeOptions::default().strip_body_tags,
            emoji: EmojiConfig::default(),
            markdown: MarkdownConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct EmojiConfig {
    pub enabled: bool,
    pub inline: bool,
    pub shortcuts: bool,
    pub set: String,
    pub base_url: String,
    pub lazy: bool,
    /// Site custom emoji, name to image url
    pub custom: BTreeMap<String, String>,
}

impl Default for EmojiConfig {
    fn default() -> Self {
        let base = EmojiOptions::default();
        EmojiConfig {
            enabled: true,
            inline: base.inline,
            shortcuts: base.shortcuts,
            set: base.set,
            base_url: base.base_url,
            lazy: base.lazy,
            custom: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct MarkdownConfig {
    pub soft_breaks_as_hard: bool,
    pub heading_ids: bool,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        MarkdownConfig { soft_breaks_as_hard: false, heading_ids: true }
    }
}

impl CookConfig {
    #[tracing::instrument]
    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let text = fs_err::read_to_string(path)?;
        let config = Self::from_yaml(&text)?;
        debug!(features = ?config.features, "loaded cook config");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        // An empty file is a valid, all-defaults config
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn whitelist_options(&self) -> WhitelistOptions {
        WhitelistOptions {
            features: self.features.clone(),
            allowed_href_schemes: self.allowed_href_schemes.clone(),
            allowed_iframes: self.allowed_iframes.clone(),
        }
    }

    pub fn sanitize_options(&self) -> SanitizeOptions {
        SanitizeOptions { strip_body_tags: self.strip_body_tags.clone() }
    }

    pub fn emoji_options(&self) -> EmojiOptions {
        EmojiOptions {
            inline: self.emoji.inline,
            shortcuts: self.emoji.shortcuts,
            set: self.emoji.set.clone(),
            base_url: self.emoji.base_url.clone(),
            lazy: self.emoji.lazy,
            ..EmojiOptions::default()
        }
    }
}
