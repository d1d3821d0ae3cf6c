//! Tag-spec parsing and composition of feature contributions into one
//! effective whitelist.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, LazyLock, OnceLock};

use regex::Regex;
use thiserror::Error;

use crate::css::{CssWhitelist, DEFAULT_CSS};

/// Name of the feature holding [`crate::defaults::DEFAULT_LIST`]. Always enabled.
pub const DEFAULT_FEATURE: &str = "default";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("empty tag spec")]
    Empty,
    #[error("invalid tag name {0:?}")]
    BadTagName(String),
    #[error("invalid attribute name {0:?}")]
    BadAttrName(String),
    #[error("unbalanced bracket in {0:?}")]
    UnbalancedBracket(String),
    #[error("trailing characters after ']' in {0:?}")]
    TrailingGarbage(String),
}

/// One parsed shorthand: `tag`, `tag.class.other`, `tag[attr]`, `tag[attr=value]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSpec {
    pub tag: String,
    pub classes: Vec<String>,
    /// Attribute name and, when restricted, its literal value
    pub attr: Option<(String, Option<String>)>,
}

static TAG_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").unwrap());
static ATTR_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z_:][a-z0-9_:.-]*\*?$").unwrap());
static CLASS_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

impl TagSpec {
    pub fn parse(spec: &str) -> Result<Self, SpecError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(SpecError::Empty);
        }

        let (head, attr) = match spec.find('[') {
            None if spec.contains(']') => return Err(SpecError::UnbalancedBracket(spec.into())),
            None => (spec, None),
            Some(open) => {
                let Some(close) = spec[open..].find(']').map(|i| open + i) else {
                    return Err(SpecError::UnbalancedBracket(spec.into()));
                };
                if close + 1 != spec.len() {
                    return Err(SpecError::TrailingGarbage(spec.into()));
                }
                let inner = &spec[open + 1..close];
                let (name, value) = match inner.split_once('=') {
                    Some((n, v)) => (n.trim(), Some(v.trim())),
                    None => (inner.trim(), None),
                };
                let name = name.to_ascii_lowercase();
                if !ATTR_NAME.is_match(&name) {
                    return Err(SpecError::BadAttrName(name));
                }
                // `[attr=*]` is the explicit form of `[attr]`
                let value = value.filter(|v| *v != "*").map(str::to_string);
                (&spec[..open], Some((name, value)))
            }
        };

        let mut parts = head.split('.');
        let tag = parts.next().unwrap_or("").to_ascii_lowercase();
        if !TAG_NAME.is_match(&tag) {
            return Err(SpecError::BadTagName(tag));
        }
        let mut classes = Vec::new();
        for class in parts {
            if !CLASS_NAME.is_match(class) {
                return Err(SpecError::BadTagName(head.into()));
            }
            classes.push(class.to_string());
        }
        Ok(TagSpec { tag, classes, attr })
    }
}

/// Either any value, or a set of literal values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrRule {
    pub any_value: bool,
    pub values: BTreeSet<String>,
}

impl AttrRule {
    pub fn allows(&self, value: &str) -> bool {
        self.any_value || self.values.contains(value)
    }

    fn merge(&mut self, other: &AttrRule) {
        self.any_value |= other.any_value;
        self.values.extend(other.values.iter().cloned());
    }

    /// Whether everything this rule accepts is also accepted by `other`.
    fn within(&self, other: &AttrRule) -> bool {
        other.any_value || (!self.any_value && self.values.is_subset(&other.values))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagRules {
    /// Exact attribute names
    pub attrs: BTreeMap<String, AttrRule>,
    /// Attribute name prefixes, from specs such as `div[data-*]`
    pub prefixes: BTreeMap<String, AttrRule>,
}

impl TagRules {
    fn rule(&self, attr: &str) -> Option<&AttrRule> {
        if let Some(rule) = self.attrs.get(attr) {
            return Some(rule);
        }
        if attr.starts_with("data-html-") {
            return None;
        }
        self.prefixes
            .iter()
            .find(|(prefix, _)| attr.len() > prefix.len() && attr.starts_with(prefix.as_str()))
            .map(|(_, rule)| rule)
    }

    fn within(&self, other: &TagRules) -> bool {
        let covered = |mine: &BTreeMap<String, AttrRule>, theirs: &BTreeMap<String, AttrRule>| {
            mine.iter()
                .all(|(name, rule)| theirs.get(name).is_some_and(|o| rule.within(o)))
        };
        covered(&self.attrs, &other.attrs) && covered(&self.prefixes, &other.prefixes)
    }
}

/// `(tag, attribute, value) -> allowed`, consulted after every table rule declined.
pub type AttrPredicate = Arc<dyn Fn(&str, &str, &str) -> bool + Send + Sync>;

/// What a feature adds to the whitelist.
#[derive(Clone)]
pub enum Contribution {
    Specs(Vec<String>),
    Predicate(AttrPredicate),
}

impl fmt::Debug for Contribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Contribution::Specs(specs) => f.debug_tuple("Specs").field(specs).finish(),
            Contribution::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

static HREF_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^(https?:)?//[^\s/?#]+",
        r"^/([^/\\]|$)",
        r"^#",
        r"(?i)^mailto:\S+",
        r"(?i)^tel:\+?[0-9 ().-]+$",
    ]
    .into_iter()
    .map(|re| Regex::new(re).unwrap())
    .collect()
});

static HEADING_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^heading--[a-zA-Z0-9_-]+$").unwrap());

/// The composed, immutable result handed to the engine.
#[derive(Clone)]
pub struct Whitelist {
    tags: BTreeMap<String, TagRules>,
    predicates: Vec<AttrPredicate>,
    href_schemes: Vec<String>,
    iframe_hosts: Vec<String>,
    css: Arc<CssWhitelist>,
}

impl fmt::Debug for Whitelist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Whitelist")
            .field("tags", &self.tags)
            .field("predicates", &self.predicates.len())
            .field("href_schemes", &self.href_schemes)
            .field("iframe_hosts", &self.iframe_hosts)
            .finish_non_exhaustive()
    }
}

impl Whitelist {
    pub fn tags(&self) -> &BTreeMap<String, TagRules> {
        &self.tags
    }

    pub fn css(&self) -> &CssWhitelist {
        &self.css
    }

    /// Replace the CSS property table used for `style` values.
    pub fn with_css(mut self, css: Arc<CssWhitelist>) -> Self {
        self.css = css;
        self
    }

    pub fn tag_allowed(&self, tag: &str) -> bool {
        self.tags.contains_key(tag)
    }

    pub fn attr_rule(&self, tag: &str, attr: &str) -> Option<&AttrRule> {
        self.tags.get(tag)?.rule(attr)
    }

    pub fn class_allowed(&self, tag: &str, class: &str) -> bool {
        self.attr_rule(tag, "class").is_some_and(|rule| rule.allows(class))
    }

    pub fn custom_allows(&self, tag: &str, attr: &str, value: &str) -> bool {
        self.predicates.iter().any(|p| p(tag, attr, value))
    }

    /// Link and image targets. `data:image/` is only accepted when `image` is set.
    pub fn href_allowed(&self, value: &str, image: bool) -> bool {
        if HREF_PATTERNS.iter().any(|re| re.is_match(value)) {
            return true;
        }
        if image && value.get(..11).is_some_and(|p| p.eq_ignore_ascii_case("data:image/")) {
            return true;
        }
        let lower = value.to_ascii_lowercase();
        self.href_schemes.iter().any(|scheme| {
            lower
                .strip_prefix(scheme.as_str())
                .and_then(|rest| rest.strip_prefix("://"))
                .is_some_and(|rest| !rest.is_empty())
        })
    }

    pub fn iframe_allowed(&self, src: &str) -> bool {
        self.iframe_hosts
            .iter()
            .any(|host| !host.is_empty() && src.starts_with(host.as_str()))
    }

    pub fn heading_id_allowed(tag: &str, value: &str) -> bool {
        matches!(tag, "h1" | "h2" | "h3" | "h4" | "h5" | "h6") && HEADING_ID.is_match(value)
    }

    /// Every tag and attribute value `other` accepts is also accepted here.
    pub fn is_superset_of(&self, other: &Whitelist) -> bool {
        other
            .tags
            .iter()
            .all(|(tag, rules)| self.tags.get(tag).is_some_and(|mine| rules.within(mine)))
    }

    fn apply(&mut self, spec: &TagSpec) {
        let rules = self.tags.entry(spec.tag.clone()).or_default();
        if !spec.classes.is_empty() {
            let class = rules.attrs.entry("class".into()).or_default();
            class.values.extend(spec.classes.iter().cloned());
        }
        if let Some((name, value)) = &spec.attr {
            let addition = match value {
                Some(v) => AttrRule { any_value: false, values: BTreeSet::from([v.clone()]) },
                None => AttrRule { any_value: true, values: BTreeSet::new() },
            };
            let table = match name.strip_suffix('*') {
                Some(prefix) => rules.prefixes.entry(prefix.to_string()),
                None => rules.attrs.entry(name.clone()),
            };
            table.or_default().merge(&addition);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WhitelistOptions {
    /// Feature name to enabled flag. Features not listed are off.
    pub features: BTreeMap<String, bool>,
    pub allowed_href_schemes: Vec<String>,
    /// Prefixes an iframe `src` must start with, such as `https://www.youtube.com/embed/`
    pub allowed_iframes: Vec<String>,
}

/// Registry of named features, memoizing the composed whitelist until the
/// next mutation.
#[derive(Debug)]
pub struct Whitelister {
    features: Vec<(String, Vec<Contribution>)>,
    enabled: BTreeMap<String, bool>,
    href_schemes: Vec<String>,
    iframe_hosts: Vec<String>,
    cache: OnceLock<Arc<Whitelist>>,
}

impl Whitelister {
    /// The default feature, the shipped bundles, and `options` applied on top.
    pub fn new(options: WhitelistOptions) -> Self {
        let mut whitelister = Whitelister {
            features: Vec::new(),
            enabled: options.features,
            href_schemes: Vec::new(),
            iframe_hosts: Vec::new(),
            cache: OnceLock::new(),
        };
        whitelister.whitelist_feature(DEFAULT_FEATURE, crate::defaults::DEFAULT_LIST.iter().copied());
        crate::features::register_builtin(&mut whitelister);
        for scheme in options.allowed_href_schemes {
            whitelister.allow_href_scheme(scheme);
        }
        for host in options.allowed_iframes {
            whitelister.allow_iframe(host);
        }
        whitelister
    }

    fn contributions(&mut self, feature: &str) -> &mut Vec<Contribution> {
        self.cache = OnceLock::new();
        let index = match self.features.iter().position(|(name, _)| name == feature) {
            Some(i) => i,
            None => {
                self.features.push((feature.to_string(), Vec::new()));
                self.features.len() - 1
            }
        };
        &mut self.features[index].1
    }

    /// Add tag specs to `feature`, creating it if needed. The feature is only
    /// composed while enabled.
    pub fn whitelist_feature<I, S>(&mut self, feature: &str, specs: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let specs = specs.into_iter().map(Into::into).collect();
        self.contributions(feature).push(Contribution::Specs(specs));
        self
    }

    pub fn whitelist_custom<F>(&mut self, feature: &str, predicate: F) -> &mut Self
    where
        F: Fn(&str, &str, &str) -> bool + Send + Sync + 'static,
    {
        self.contributions(feature).push(Contribution::Predicate(Arc::new(predicate)));
        self
    }

    pub fn enable(&mut self, feature: &str) -> &mut Self {
        self.cache = OnceLock::new();
        self.enabled.insert(feature.to_string(), true);
        self
    }

    /// Has no effect on the default feature.
    pub fn disable(&mut self, feature: &str) -> &mut Self {
        if feature == DEFAULT_FEATURE {
            debug!("default whitelist feature cannot be disabled");
            return self;
        }
        self.cache = OnceLock::new();
        self.enabled.insert(feature.to_string(), false);
        self
    }

    pub fn is_enabled(&self, feature: &str) -> bool {
        feature == DEFAULT_FEATURE || self.enabled.get(feature).copied().unwrap_or(false)
    }

    pub fn allow_href_scheme(&mut self, scheme: impl Into<String>) -> &mut Self {
        self.cache = OnceLock::new();
        self.href_schemes.push(scheme.into().to_ascii_lowercase());
        self
    }

    pub fn allow_iframe(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.cache = OnceLock::new();
        self.iframe_hosts.push(prefix.into());
        self
    }

    /// The composed whitelist, rebuilt on first read after any mutation.
    pub fn whitelist(&self) -> Arc<Whitelist> {
        self.cache.get_or_init(|| Arc::new(self.build())).clone()
    }

    fn build(&self) -> Whitelist {
        let mut whitelist = Whitelist {
            tags: BTreeMap::new(),
            predicates: Vec::new(),
            href_schemes: self.href_schemes.clone(),
            iframe_hosts: self.iframe_hosts.clone(),
            css: DEFAULT_CSS.clone(),
        };
        for (feature, contributions) in &self.features {
            if !self.is_enabled(feature) {
                continue;
            }
            for contribution in contributions {
                match contribution {
                    Contribution::Specs(specs) => {
                        for spec in specs {
                            match TagSpec::parse(spec) {
                                Ok(parsed) => whitelist.apply(&parsed),
                                Err(err) => warn!(feature = feature.as_str(), %err, "skipping tag spec"),
                            }
                        }
                    }
                    Contribution::Predicate(p) => whitelist.predicates.push(p.clone()),
                }
            }
        }
        debug!(tags = whitelist.tags.len(), "whitelist rebuilt");
        whitelist
    }
}
