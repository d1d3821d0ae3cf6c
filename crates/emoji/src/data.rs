//! The bundled emoji dictionary and the lookup indexes derived from it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use serde::Deserialize;

/// Skin tone modifiers for tones 2 through 6. Tone 1 is the unmodified emoji.
pub const TONE_MODIFIERS: [char; 5] = ['\u{1F3FB}', '\u{1F3FC}', '\u{1F3FD}', '\u{1F3FE}', '\u{1F3FF}'];

const VARIATION_SELECTOR: char = '\u{FE0F}';

#[derive(Deserialize)]
struct RawEmoji {
    name: String,
    code: String,
}

#[derive(Deserialize)]
struct RawDictionary {
    emojis: Vec<RawEmoji>,
    tonable: Vec<String>,
    /// Canonical name to its aliases
    aliases: BTreeMap<String, Vec<String>>,
    search_aliases: BTreeMap<String, Vec<String>>,
    translations: BTreeMap<String, String>,
}

pub struct Dictionary {
    /// Canonical names, sorted
    pub names: Vec<String>,
    pub tonable: HashSet<String>,
    /// Canonical name to aliases
    pub aliases: BTreeMap<String, Vec<String>>,
    alias_to_canonical: HashMap<String, String>,
    pub search_aliases: BTreeMap<String, Vec<String>>,
    /// Emoticon text to canonical name
    pub translations: BTreeMap<String, String>,
    /// Unicode sequence to `name` or `name:tN`
    pub replacements: HashMap<String, String>,
}

pub static DICTIONARY: LazyLock<Dictionary> = LazyLock::new(|| {
    Dictionary::from_json(include_str!("../data/emoji.json")).expect("bundled emoji dictionary is valid json")
});

/// Insert the tone modifier after the first scalar, dropping a variation
/// selector that followed it.
pub fn toned(sequence: &str, tone: u8) -> Option<String> {
    let modifier = *TONE_MODIFIERS.get(usize::from(tone).checked_sub(2)?)?;
    let mut chars = sequence.chars();
    let first = chars.next()?;
    let rest = chars.as_str();
    let rest = rest.strip_prefix(VARIATION_SELECTOR).unwrap_or(rest);
    Some(format!("{first}{modifier}{rest}"))
}

/// A presentation-less variant is only indexed when it's unambiguous as an
/// emoji; `©` or `#` alone should stay text.
fn plain_variant(sequence: &str) -> Option<String> {
    if !sequence.contains(VARIATION_SELECTOR) {
        return None;
    }
    let plain: String = sequence.chars().filter(|c| *c != VARIATION_SELECTOR).collect();
    let mut chars = plain.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if (c as u32) < 0x2300 => None,
        (Some(_), _) => Some(plain),
        (None, _) => None,
    }
}

impl Dictionary {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: RawDictionary = serde_json::from_str(json)?;

        let mut names: Vec<String> = raw.emojis.iter().map(|e| e.name.clone()).collect();
        names.sort();
        let canonical: HashSet<&str> = names.iter().map(String::as_str).collect();
        let tonable: HashSet<String> = raw.tonable.into_iter().collect();

        let mut alias_to_canonical = HashMap::new();
        let mut aliases = BTreeMap::new();
        for (name, list) in raw.aliases {
            let mut kept = Vec::new();
            for alias in list {
                // One level only: an alias may never shadow a canonical name
                if canonical.contains(alias.as_str()) || alias_to_canonical.contains_key(&alias) {
                    warn!(alias = alias.as_str(), "ignoring conflicting emoji alias");
                    continue;
                }
                alias_to_canonical.insert(alias.clone(), name.clone());
                kept.push(alias);
            }
            aliases.insert(name, kept);
        }

        let mut replacements = HashMap::new();
        for emoji in &raw.emojis {
            replacements.insert(emoji.code.clone(), emoji.name.clone());
            if let Some(plain) = plain_variant(&emoji.code) {
                replacements.entry(plain).or_insert_with(|| emoji.name.clone());
            }
            if tonable.contains(&emoji.name) {
                for tone in 2..=6 {
                    if let Some(sequence) = toned(&emoji.code, tone) {
                        replacements.insert(sequence, format!("{}:t{tone}", emoji.name));
                    }
                }
            }
        }

        Ok(Dictionary {
            names,
            tonable,
            aliases,
            alias_to_canonical,
            search_aliases: raw.search_aliases,
            translations: raw.translations,
            replacements,
        })
    }

    /// `name` itself when canonical, its target when an alias.
    pub fn canonical<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if self.names.binary_search_by(|n| n.as_str().cmp(name)).is_ok() {
            return Some(name);
        }
        self.alias_to_canonical.get(name).map(String::as_str)
    }

    /// Known unicode sequences, longest first.
    pub fn sequences_longest_first(&self) -> Vec<&str> {
        let mut sequences: Vec<&str> = self.replacements.keys().map(String::as_str).collect();
        sequences.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        sequences
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_dictionary_loads() {
        let dict = &*DICTIONARY;
        assert!(dict.names.len() > 100);
        assert_eq!(dict.canonical("+1"), Some("thumbsup"));
        assert_eq!(dict.canonical("thumbsup"), Some("thumbsup"));
        assert_eq!(dict.canonical("nope"), None);
        assert!(dict.tonable.contains("man_farmer"));
        assert_eq!(dict.translations.get(":)").map(String::as_str), Some("slight_smile"));
    }

    #[test]
    fn aliases_never_shadow_canonical_names() {
        for (alias, target) in &DICTIONARY.alias_to_canonical {
            assert!(DICTIONARY.names.binary_search(alias).is_err(), "{alias}");
            assert!(DICTIONARY.names.binary_search(target).is_ok(), "{target}");
        }
    }

    #[test]
    fn tone_variants() {
        assert_eq!(toned("\u{1F44D}", 4).as_deref(), Some("\u{1F44D}\u{1F3FD}"));
        assert_eq!(toned("\u{261D}\u{FE0F}", 2).as_deref(), Some("\u{261D}\u{1F3FB}"));
        assert_eq!(
            toned("\u{1F468}\u{200D}\u{1F33E}", 6).as_deref(),
            Some("\u{1F468}\u{1F3FF}\u{200D}\u{1F33E}"),
        );
        assert_eq!(toned("\u{1F44D}", 1), None);
        assert_eq!(toned("\u{1F44D}", 7), None);
        assert_eq!(
            DICTIONARY.replacements.get("\u{1F468}\u{1F3FD}\u{200D}\u{1F33E}").map(String::as_str),
            Some("man_farmer:t4"),
        );
    }

    #[test]
    fn plain_variants() {
        assert_eq!(DICTIONARY.replacements.get("\u{2764}").map(String::as_str), Some("heart"));
        assert!(!DICTIONARY.replacements.contains_key("\u{00A9}"));
        assert!(!DICTIONARY.replacements.contains_key("#"));
    }

    #[test]
    fn sequences_sort_longest_first() {
        let sequences = DICTIONARY.sequences_longest_first();
        assert!(sequences.windows(2).all(|w| w[0].len() >= w[1].len()));
    }

    #[test]
    fn rejects_alias_cycles() {
        let json = r#"{"emojis":[{"name":"a","code":"x"},{"name":"b","code":"y"}],
            "tonable":[],"aliases":{"a":["b","c"],"b":["c"]},"search_aliases":{},"translations":{}}"#;
        let dict = Dictionary::from_json(json).unwrap();
        assert_eq!(dict.canonical("c"), Some("a"));
        assert_eq!(dict.canonical("b"), Some("b"));
        assert_eq!(dict.aliases["a"], vec!["c".to_string()]);
        assert!(dict.aliases["b"].is_empty());
    }
}
