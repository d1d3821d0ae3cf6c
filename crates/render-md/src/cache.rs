//! Caches the pipeline consults instead of doing network or database work.
//!
//! Both are filled by the embedding application; the pipeline only reads
//! them, apart from recording references a lookup could not resolve.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Preview HTML for onebox urls. No eviction.
#[derive(Debug, Default)]
pub struct OneboxCache {
    previews: RwLock<HashMap<String, String>>,
    failed: RwLock<HashSet<String>>,
}

impl OneboxCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<String> {
        read(&self.previews).get(url).cloned()
    }

    pub fn set(&self, url: impl Into<String>, html: impl Into<String>) {
        let url = url.into();
        write(&self.failed).remove(&url);
        write(&self.previews).insert(url, html.into());
    }

    /// Remember that fetching `url` failed so it isn't retried.
    pub fn mark_failed(&self, url: impl Into<String>) {
        write(&self.failed).insert(url.into());
    }

    pub fn is_failed(&self, url: &str) -> bool {
        read(&self.failed).contains(url)
    }

    pub fn reset(&self) {
        write(&self.previews).clear();
        write(&self.failed).clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortUrl {
    Resolved { url: String, short_path: String },
    /// The upload doesn't exist, don't look it up again
    Missing,
}

/// Resolution of `upload://<sha1>.<ext>` references.
#[derive(Debug, Default)]
pub struct ShortUrlCache {
    entries: RwLock<HashMap<String, ShortUrl>>,
}

impl ShortUrlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, short: &str) -> Option<ShortUrl> {
        read(&self.entries).get(short).cloned()
    }

    pub fn cache(&self, short: impl Into<String>, entry: ShortUrl) {
        write(&self.entries).insert(short.into(), entry);
    }

    pub fn reset(&self) {
        write(&self.entries).clear();
    }

    /// Call `lookup` with every reference not cached yet, then cache its
    /// answers. Requested references it leaves out are cached as missing.
    /// `lookup` is not called when everything is already cached.
    pub fn resolve_uncached<'s, I, F>(&self, shorts: I, lookup: F)
    where
        I: IntoIterator<Item = &'s str>,
        F: FnOnce(&[String]) -> HashMap<String, ShortUrl>,
    {
        let mut uncached: Vec<String> = {
            let entries = read(&self.entries);
            shorts.into_iter().filter(|s| !entries.contains_key(*s)).map(str::to_string).collect()
        };
        uncached.sort();
        uncached.dedup();
        if uncached.is_empty() {
            return;
        }

        let mut found = lookup(&uncached);
        let mut entries = write(&self.entries);
        for short in uncached {
            let entry = found.remove(&short).unwrap_or_else(|| {
                debug!(short = short.as_str(), "upload reference not found");
                ShortUrl::Missing
            });
            entries.insert(short, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(url: &str) -> ShortUrl {
        ShortUrl::Resolved { url: url.into(), short_path: format!("/uploads/short-url/{url}") }
    }

    #[test]
    fn onebox_entries() {
        let cache = OneboxCache::new();
        assert_eq!(cache.get("https://a.example/"), None);
        cache.mark_failed("https://a.example/");
        assert!(cache.is_failed("https://a.example/"));
        cache.set("https://a.example/", "<aside>a</aside>");
        assert!(!cache.is_failed("https://a.example/"));
        assert_eq!(cache.get("https://a.example/").as_deref(), Some("<aside>a</aside>"));
        cache.reset();
        assert_eq!(cache.get("https://a.example/"), None);
    }

    #[test]
    fn resolves_only_uncached() {
        let cache = ShortUrlCache::new();
        cache.cache("upload://a.png", resolved("a"));

        let mut asked = Vec::new();
        cache.resolve_uncached(["upload://a.png", "upload://b.png", "upload://c.png", "upload://b.png"], |shorts| {
            asked = shorts.to_vec();
            HashMap::from([("upload://b.png".to_string(), resolved("b"))])
        });
        assert_eq!(asked, vec!["upload://b.png", "upload://c.png"]);
        assert_eq!(cache.lookup("upload://b.png"), Some(resolved("b")));
        assert_eq!(cache.lookup("upload://c.png"), Some(ShortUrl::Missing));

        let mut called = false;
        cache.resolve_uncached(["upload://a.png", "upload://c.png"], |_| {
            called = true;
            HashMap::new()
        });
        assert!(!called);
    }

    #[test]
    fn lookup_extras_are_ignored() {
        let cache = ShortUrlCache::new();
        cache.resolve_uncached(["upload://a.png"], |_| {
            HashMap::from([
                ("upload://a.png".to_string(), resolved("a")),
                ("upload://z.png".to_string(), resolved("z")),
            ])
        });
        assert_eq!(cache.lookup("upload://z.png"), None);
        cache.reset();
        assert_eq!(cache.lookup("upload://a.png"), None);
    }
}
