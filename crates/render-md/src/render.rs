use lol_html::html_content::ContentType;
use lol_html::{element, rewrite_str, RewriteStrSettings};

use crate::cache::OneboxCache;

/// Replace `a.onebox` placeholders whose url has a cached preview with that
/// preview. Placeholders without one are left as plain links.
pub fn rewrite_oneboxes(html: &str, cache: &OneboxCache) -> Result<String, lol_html::errors::RewritingError> {
    let element_content_handlers = vec![
        element!("a.onebox[href]", |el| {
            if let Some(href) = el.get_attribute("href") {
                let url = href.replace("&amp;", "&");
                if let Some(preview) = cache.get(&url) {
                    el.replace(&preview, ContentType::Html);
                } else if cache.is_failed(&url) {
                    trace!(url = url.as_str(), "onebox previously failed");
                } else {
                    debug!(url = url.as_str(), "no cached onebox");
                }
            }
            Ok(())
        }),
    ];

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers,
            ..RewriteStrSettings::default()
        },
    )
}
