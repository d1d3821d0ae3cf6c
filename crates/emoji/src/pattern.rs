use std::collections::BTreeMap;
use std::sync::{LazyLock, OnceLock};

use regex::{Regex, RegexBuilder};

use crate::data::DICTIONARY;

/// Loose shortcode form. Also matches colon emoticons such as `:D`, which are
/// told apart when the match is resolved.
const SHORTCODE: &str = r":[^\s:]+(?::t\d)?:?";

/// Every known unicode sequence as one alternation, longest first so a
/// sequence always wins over its own prefix.
static UNICODE_ALTERNATION: LazyLock<String> = LazyLock::new(|| {
    let sequences = DICTIONARY.sequences_longest_first();
    let escaped: Vec<String> = sequences.iter().map(|s| regex::escape(s)).collect();
    escaped.join("|")
});

pub static UNICODE: LazyLock<Regex> = LazyLock::new(|| compile(&UNICODE_ALTERNATION));

fn compile(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .size_limit(1 << 24)
        .build()
        .expect("pattern is built from escaped literals")
}

fn build(inline: bool, translations: &BTreeMap<String, String>) -> Regex {
    let mut keys: Vec<&str> = translations.keys().map(String::as_str).collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

    let mut pattern = format!("{}|", *UNICODE_ALTERNATION);
    if !inline {
        // Shortcodes only start after a non-word character
        pattern.push_str(r"\B");
    }
    pattern.push_str(SHORTCODE);
    for key in keys {
        pattern.push('|');
        pattern.push_str(&regex::escape(key));
    }
    debug!(inline, "compiling emoji pattern");
    compile(&pattern)
}

/// Compiled scanners, one per inline mode, dropped whenever the
/// translation table changes.
#[derive(Default)]
pub struct Patterns {
    inline: OnceLock<Regex>,
    guarded: OnceLock<Regex>,
}

impl Patterns {
    pub fn get(&self, inline: bool, translations: &BTreeMap<String, String>) -> &Regex {
        let slot = if inline { &self.inline } else { &self.guarded };
        slot.get_or_init(|| build(inline, translations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches<'a>(re: &Regex, text: &'a str) -> Vec<&'a str> {
        re.find_iter(text).map(|m| m.as_str()).collect()
    }

    #[test]
    fn longest_sequence_wins() {
        let farmer = "\u{1F468}\u{1F3FD}\u{200D}\u{1F33E}";
        let text = format!("{farmer} \u{1F468}");
        assert_eq!(matches(&UNICODE, &text), vec![farmer, "\u{1F468}"]);
        assert_eq!(matches(&UNICODE, "\u{1F1FA}\u{1F1F8}\u{1F1EB}\u{1F1F7}"), vec!["\u{1F1FA}\u{1F1F8}", "\u{1F1EB}\u{1F1F7}"]);
    }

    #[test]
    fn shortcode_forms() {
        let patterns = Patterns::default();
        let re = patterns.get(true, &DICTIONARY.translations);
        assert_eq!(matches(re, ":smile::heart:"), vec![":smile:", ":heart:"]);
        assert_eq!(matches(re, ":man_farmer:t4: x"), vec![":man_farmer:t4:"]);
        assert_eq!(matches(re, "a:smile:"), vec![":smile:"]);
    }

    #[test]
    fn guarded_needs_non_word_before() {
        let patterns = Patterns::default();
        let re = patterns.get(false, &DICTIONARY.translations);
        assert_eq!(matches(re, "a:smile:"), Vec::<&str>::new());
        assert_eq!(matches(re, "x :smile:"), vec![":smile:"]);
        // `(:` is an emoticon; whether it stands alone is decided on resolution
        assert_eq!(matches(re, "(:smile:"), vec!["(:"]);
        assert_eq!(matches(re, "hi <3"), vec!["<3"]);
    }
}
