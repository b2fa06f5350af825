//! Plate text canonicalization.
//!
//! `normalize` is total: anything that cannot be turned into an uppercase
//! ASCII alphanumeric key becomes [`Plate::empty`]. Fuzzy folding of
//! look-alike glyphs trades false negatives for false positives, so it is
//! off unless the configuration asks for it.

use crate::config::GateConfig;
use crate::types::Plate;
use std::collections::HashMap;

/// Letter -> digit folding for glyphs recognizers commonly confuse.
pub(crate) fn confusable_digit(c: char) -> Option<char> {
    match c {
        'O' | 'Q' => Some('0'),
        'I' | 'L' => Some('1'),
        'Z' => Some('2'),
        'S' => Some('5'),
        'B' => Some('8'),
        _ => None,
    }
}

fn is_separator(c: char) -> bool {
    c == '.' || c == '-'
}

/// Deterministic, pure `raw text -> Plate` mapping.
#[derive(Debug, Clone, Default)]
pub struct PlateNormalizer {
    fold_confusables: bool,
    strip_separators: bool,
    /// Canonical prefix-less key -> canonical prefix.
    known_prefixes: HashMap<String, String>,
}

impl PlateNormalizer {
    /// Exact canonicalization: trim, uppercase, drop internal whitespace.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new()
            .with_confusable_folding(config.fold_confusables)
            .with_separator_stripping(config.strip_separators)
            .with_known_prefixes(
                config
                    .known_prefixes
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str())),
            )
    }

    pub fn with_confusable_folding(mut self, enabled: bool) -> Self {
        self.fold_confusables = enabled;
        self.rebuild_prefixes();
        self
    }

    pub fn with_separator_stripping(mut self, enabled: bool) -> Self {
        self.strip_separators = enabled;
        self.rebuild_prefixes();
        self
    }

    /// Registers `(plate without prefix, missing prefix)` repairs, e.g.
    /// `("3944FG", "R")`. Entries that do not canonicalize are skipped.
    pub fn with_known_prefixes<'a>(
        mut self,
        entries: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        for (key, prefix) in entries {
            self.known_prefixes.insert(key.to_string(), prefix.to_string());
        }
        self.rebuild_prefixes();
        self
    }

    // Keys and prefixes must live in the same canonical space as the
    // plates they are compared against.
    fn rebuild_prefixes(&mut self) {
        let raw = std::mem::take(&mut self.known_prefixes);
        for (key, prefix) in raw {
            match (self.canonicalize(&key), self.canonicalize(&prefix)) {
                (Some(k), Some(p)) if !k.is_empty() && !p.is_empty() => {
                    self.known_prefixes.insert(k, p);
                }
                _ => tracing::warn!(key, prefix, "ignoring unusable known prefix"),
            }
        }
    }

    pub fn normalize(&self, raw: &str) -> Plate {
        let Some(mut key) = self.canonicalize(raw) else {
            return Plate::empty();
        };

        if key.starts_with(|c: char| c.is_ascii_digit()) {
            if let Some(prefix) = self.known_prefixes.get(&key) {
                key.insert_str(0, prefix);
            }
        }

        Plate::from_canonical(key)
    }

    fn canonicalize(&self, raw: &str) -> Option<String> {
        let mut key = String::with_capacity(raw.len());
        for c in raw.chars() {
            if c.is_whitespace() || (self.strip_separators && is_separator(c)) {
                continue;
            }
            let c = c.to_ascii_uppercase();
            if !c.is_ascii_alphanumeric() {
                return None;
            }
            let c = if self.fold_confusables {
                confusable_digit(c).unwrap_or(c)
            } else {
                c
            };
            key.push(c);
        }
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "R3944FG",
        " r 3944 fg ",
        "R-3944.FG",
        "3944FG",
        "b1234 oq",
        "",
        "   ",
        "R3944FG!",
        "ñ123",
        "\tAB 1234\nCD",
        "S0L1Z",
    ];

    fn configurations() -> Vec<PlateNormalizer> {
        let mut out = Vec::new();
        for fold in [false, true] {
            for strip in [false, true] {
                out.push(
                    PlateNormalizer::new()
                        .with_confusable_folding(fold)
                        .with_separator_stripping(strip)
                        .with_known_prefixes([("3944FG", "R"), ("5477DP", "R")]),
                );
            }
        }
        out
    }

    #[test]
    fn exact_canonicalization() {
        let n = PlateNormalizer::new();
        assert_eq!(n.normalize(" r 3944 fg ").as_str(), "R3944FG");
        assert_eq!(n.normalize("ab1234cd").as_str(), "AB1234CD");
    }

    #[test]
    fn malformed_input_is_empty() {
        let n = PlateNormalizer::new();
        assert!(n.normalize("").is_empty());
        assert!(n.normalize("R-3944").is_empty());
        assert!(n.normalize("R3944FG!").is_empty());
        assert!(n.normalize("ñ123").is_empty());
    }

    #[test]
    fn separators_only_stripped_when_enabled() {
        let n = PlateNormalizer::new().with_separator_stripping(true);
        assert_eq!(n.normalize("R-3944.FG").as_str(), "R3944FG");
    }

    #[test]
    fn folding_is_opt_in() {
        let exact = PlateNormalizer::new();
        assert_ne!(exact.normalize("B0I"), exact.normalize("8O1"));

        let fuzzy = PlateNormalizer::new().with_confusable_folding(true);
        assert_eq!(fuzzy.normalize("B0I"), fuzzy.normalize("8O1"));
        assert_eq!(fuzzy.normalize("B0I").as_str(), "801");
    }

    #[test]
    fn known_prefix_repairs_missing_letter() {
        let n = PlateNormalizer::new().with_known_prefixes([("3944FG", "R")]);
        assert_eq!(n.normalize("3944 fg").as_str(), "R3944FG");
        // Only exact matches on digit-leading plates are repaired.
        assert_eq!(n.normalize("13944FG").as_str(), "13944FG");
    }

    #[test]
    fn normalization_is_idempotent() {
        for n in configurations() {
            for raw in SAMPLES {
                let once = n.normalize(raw);
                let twice = n.normalize(once.as_str());
                assert_eq!(once, twice, "not idempotent for {raw:?} with {n:?}");
            }
        }
    }
}
