use proptest::prelude::*;

use sanitize::attrs::split_attributes;
use sanitize::css::DEFAULT_CSS;
use sanitize::tags::{attribute_source, split_tags, SegmentKind};
use sanitize::{filter_css, sanitize, Whitelist, WhitelistOptions, Whitelister};

const FRAGMENTS: &[&str] = &[
    "<script>",
    "</script>",
    "<table>",
    "</table>",
    "<iframe src='https://evil.example/'>",
    "<iframe src=\"https://www.youtube.com/embed/a\">",
    "</iframe>",
    "<img src=x onerror=alert(1)>",
    "<img src=\"/a.png\" class=\"emoji\" />",
    "<a href=\"javascript:alert(1)\">",
    "<a href=\"&#106;avascript&colon;x\">",
    "<a href=\"https://x.example/?a=1&b=2\" title='\"q\"'>",
    "</a>",
    "<div style=\"color:red;background:url(javascript:alert(1))\">",
    "<div data-x=\"&#34;&#60;\" data-html-y=1>",
    "</div>",
    "<span class=\"mention evil\">",
    "<h2 id=\"heading--x\">",
    "<br/>",
    "<!-- c -->",
    "&amp;",
    "&#39;",
    "&",
    "<",
    ">",
    "\"",
    "<3",
];

const PROPERTIES: &[&str] = &["color", "width", "position", "font-family", "background", "Color"];

fn html() -> impl Strategy<Value = String> {
    let piece = prop_oneof![
        prop::sample::select(FRAGMENTS).prop_map(str::to_string),
        "[a-z <>&\"'=/:;#]{0,10}",
    ];
    prop::collection::vec(piece, 0..16).prop_map(|pieces| pieces.concat())
}

fn whitelist() -> std::sync::Arc<Whitelist> {
    Whitelister::new(WhitelistOptions {
        features: [("table".to_string(), false), ("details".to_string(), true)].into(),
        allowed_iframes: vec!["https://www.youtube.com".into()],
        ..Default::default()
    })
    .whitelist()
}

proptest! {
    #[test]
    fn sanitize_is_idempotent(input in html()) {
        let list = whitelist();
        let once = sanitize(&input, &list);
        prop_assert_eq!(sanitize(&once, &list), once);
    }

    #[test]
    fn no_script_vectors(input in html()) {
        let out = sanitize(&input, &whitelist());
        prop_assert!(!out.to_ascii_lowercase().contains("<script"));
        for segment in split_tags(&out) {
            if segment.kind != SegmentKind::Tag {
                continue;
            }
            for attr in split_attributes(attribute_source(segment.content)) {
                let value = attr.value.to_ascii_lowercase();
                prop_assert!(!attr.name.starts_with("on"), "{}", segment.content);
                if matches!(attr.name.as_str(), "href" | "src") {
                    prop_assert!(!value.contains("javascript:") && !value.contains("vbscript:"), "{}", segment.content);
                }
                if attr.name == "style" {
                    prop_assert!(!value.contains("expression("), "{}", segment.content);
                }
            }
        }
    }

    #[test]
    fn css_filter_is_idempotent(
        decls in prop::collection::vec(
            (
                prop::sample::select(PROPERTIES),
                "[a-z0-9 #%(),.'/*:;-]{0,12}",
            ),
            0..6,
        )
    ) {
        let block: Vec<String> = decls.iter().map(|(n, v)| format!("{n}: {v}")).collect();
        let once = filter_css(&block.join(";"), &DEFAULT_CSS);
        prop_assert_eq!(filter_css(&once, &DEFAULT_CSS), once);
    }
}

const POOL: &[&str] = &[
    "mark", "mark[title]", "abbr[lang=en]", "abbr[lang=fr]", "section.box", "section.card",
    "figure", "figcaption[data-*]", "cite", "q[cite]",
];

proptest! {
    #[test]
    fn enabling_features_is_a_union(picks in prop::collection::vec(any::<bool>(), POOL.len())) {
        let (a, b): (Vec<_>, Vec<_>) = POOL.iter().zip(&picks).partition(|(_, in_a)| **in_a);
        let a: Vec<&str> = a.into_iter().map(|(s, _)| *s).collect();
        let b: Vec<&str> = b.into_iter().map(|(s, _)| *s).collect();

        let composed = |enable: &[&str]| {
            let mut w = Whitelister::new(WhitelistOptions::default());
            w.whitelist_feature("a", a.iter().copied()).whitelist_feature("b", b.iter().copied());
            for feature in enable {
                w.enable(feature);
            }
            w.whitelist()
        };
        let both = composed(&["a", "b"]);
        prop_assert!(both.is_superset_of(&composed(&["a"])));
        prop_assert!(both.is_superset_of(&composed(&["b"])));
    }

    #[test]
    fn disable_reverses_enable(picks in prop::sample::subsequence(POOL, 0..POOL.len())) {
        let mut never = Whitelister::new(WhitelistOptions::default());
        never.enable("details");
        let baseline = never.whitelist();

        let mut toggled = Whitelister::new(WhitelistOptions::default());
        toggled.enable("details").whitelist_feature("x", picks.iter().copied()).enable("x");
        let _ = toggled.whitelist();
        toggled.disable("x");
        let rebuilt = toggled.whitelist();
        prop_assert_eq!(rebuilt.tags(), baseline.tags());
    }
}
