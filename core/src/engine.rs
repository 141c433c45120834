// core/src/engine.rs
//
// Correction engine: boundary auto-replacement and ranked suggestions over
// the loaded language sets plus the personal dictionary.

use crate::candidate::Suggestion;
use crate::corrections::LanguageCorrectionSet;
use crate::dictionary::{DictionaryEntry, Source, DEFAULT_MAX_EDIT_DISTANCE};
use crate::distance;
use crate::settings::CorrectionSettings;
use crate::userdict::UserDict;
use crate::utils::{apply_case, fold_accents, normalize_word};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_CACHE_SIZE: usize = 512;

/// Correction engine for one input session.
///
/// Dictionaries are read-only here; the only mutable state is the suggestion
/// cache and the personal dictionary handle. Language sets are passed per
/// call, active language first, so a configuration swap never leaves the
/// engine holding stale tables.
pub struct CorrectionEngine {
    userdict: UserDict,
    cache: RefCell<lru::LruCache<String, Vec<Suggestion>>>,
    cache_hits: Cell<usize>,
    cache_misses: Cell<usize>,
    /// Personal dictionary generation the cached entries were ranked against.
    cache_generation: Cell<u64>,
}

impl CorrectionEngine {
    pub fn new(userdict: UserDict) -> Self {
        Self::with_cache_size(userdict, DEFAULT_CACHE_SIZE)
    }

    pub fn with_cache_size(userdict: UserDict, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache_generation: Cell::new(userdict.generation()),
            userdict,
            cache: RefCell::new(lru::LruCache::new(capacity)),
            cache_hits: Cell::new(0),
            cache_misses: Cell::new(0),
        }
    }

    pub fn userdict(&self) -> &UserDict {
        &self.userdict
    }

    /// Add a word to the personal dictionary.
    pub fn add_to_personal(&self, word: &str) {
        self.userdict.add(word);
        self.clear_cache();
    }

    pub fn remove_from_personal(&self, word: &str) -> bool {
        let removed = self.userdict.remove(word);
        self.clear_cache();
        removed
    }

    fn is_known(&self, word: &str, sets: &[Arc<LanguageCorrectionSet>]) -> bool {
        let lower = word.to_lowercase();
        sets.iter()
            .filter_map(|s| s.dictionary())
            .any(|d| d.contains_word(word))
            || self
                .userdict
                .snapshot()
                .keys()
                .any(|w| w.to_lowercase() == lower)
    }

    /// Replacement for `word` at a word boundary, or `None` to leave it.
    ///
    /// Order: exact-match maps (custom before bundled, per language), then,
    /// for words not in any dictionary, an accent-folded dictionary match
    /// and finally the closest dictionary entry within
    /// `max_auto_replace_distance`.
    pub fn apply_boundary_correction(
        &self,
        word: &str,
        sets: &[Arc<LanguageCorrectionSet>],
        settings: &CorrectionSettings,
    ) -> Option<String> {
        if !settings.enabled || !settings.auto_replace_on_boundary || word.is_empty() {
            return None;
        }

        for set in sets {
            if let Some(corrected) = set.exact(word) {
                let replacement = apply_case(word, corrected);
                if replacement == word {
                    return None;
                }
                debug!(language = set.language(), word, replacement = %replacement, "exact correction");
                return Some(replacement);
            }
        }

        if self.is_known(word, sets) {
            return None;
        }

        let norm = normalize_word(word);
        if norm.is_empty() {
            return None;
        }

        let max = settings.auto_replace_distance();
        if max == 0 {
            return None;
        }
        let mut pool = self.entries_for(&norm, max, sets);
        if settings.accent_matching {
            let folded = fold_accents(word).to_lowercase();
            let accented = pool
                .iter()
                .filter(|(_, d, _)| *d == 0)
                .filter(|(e, _, _)| fold_accents(&e.word).to_lowercase() == folded)
                .min_by(|a, b| {
                    settings
                        .tie_break
                        .compare((a.0.frequency, a.0.source), (b.0.frequency, b.0.source))
                });
            if let Some((entry, _, _)) = accented {
                return Some(apply_case(word, &entry.word));
            }
        }

        let lower = word.to_lowercase();
        pool.retain(|(entry, d, _)| {
            *d > 0 || (!settings.accent_matching && entry.word.to_lowercase() != lower)
        });
        let best = pool
            .into_iter()
            .filter_map(|(entry, d, _)| {
                let d = if settings.accent_matching {
                    d
                } else {
                    distance::within(&lower, &entry.word.to_lowercase(), max)?
                };
                (d > 0 && d <= max).then_some((entry, d))
            })
            .min_by(|(a, da), (b, db)| {
                da.cmp(db)
                    .then_with(|| {
                        settings
                            .tie_break
                            .compare((a.frequency, a.source), (b.frequency, b.source))
                    })
                    .then_with(|| a.word.cmp(&b.word))
            })?;
        debug!(word, replacement = %best.0.word, distance = best.1, "distance correction");
        Some(apply_case(word, &best.0.word))
    }

    /// Dictionary and personal entries within `max` of the normalized query,
    /// tagged with normalized distance and language.
    fn entries_for(
        &self,
        norm: &str,
        max: usize,
        sets: &[Arc<LanguageCorrectionSet>],
    ) -> Vec<(DictionaryEntry, usize, String)> {
        let mut out = Vec::new();
        for set in sets {
            let Some(dict) = set.dictionary() else {
                continue;
            };
            for entry in dict.lookup(norm) {
                out.push((entry.clone(), 0, set.language().to_string()));
            }
            for (term, d) in dict.typo_terms(norm, max) {
                for entry in dict.lookup(&term) {
                    out.push((entry.clone(), d, set.language().to_string()));
                }
            }
        }
        for (word, freq) in self.userdict.snapshot() {
            let user_norm = normalize_word(&word);
            if let Some(d) = distance::within(norm, &user_norm, max) {
                let freq = u32::try_from(freq).unwrap_or(u32::MAX);
                out.push((DictionaryEntry::user(&word, freq), d, String::new()));
            }
        }
        out
    }

    /// Ranked suggestions for the word being typed. Empty when correction is
    /// disabled or nothing is loaded.
    pub fn suggest(
        &self,
        query: &str,
        sets: &[Arc<LanguageCorrectionSet>],
        settings: &CorrectionSettings,
    ) -> Vec<Suggestion> {
        if !settings.enabled || settings.max_suggestions == 0 || query.is_empty() {
            return Vec::new();
        }
        let has_dictionary = sets.iter().any(|s| s.dictionary().is_some());
        if !has_dictionary && self.userdict.snapshot().is_empty() {
            return Vec::new();
        }

        // Other sessions may share the personal dictionary.
        let generation = self.userdict.generation();
        if generation != self.cache_generation.get() {
            self.clear_cache();
            self.cache_generation.set(generation);
        }

        let key = cache_key(query, sets, settings);
        if let Some(cached) = self.cache.borrow_mut().get(&key) {
            self.cache_hits.set(self.cache_hits.get() + 1);
            return cached.clone();
        }
        self.cache_misses.set(self.cache_misses.get() + 1);

        let result = self.rank(query, sets, settings);
        self.cache.borrow_mut().put(key, result.clone());
        result
    }

    fn rank(
        &self,
        query: &str,
        sets: &[Arc<LanguageCorrectionSet>],
        settings: &CorrectionSettings,
    ) -> Vec<Suggestion> {
        let norm = normalize_word(query);
        if norm.is_empty() {
            return Vec::new();
        }
        let lower = query.to_lowercase();
        let max = DEFAULT_MAX_EDIT_DISTANCE;

        // Without accent matching, distances are measured on the raw words.
        let measure = |entry_word: &str, normalized_distance: usize| -> Option<usize> {
            if settings.accent_matching {
                Some(normalized_distance)
            } else {
                distance::within(&lower, &entry_word.to_lowercase(), max)
            }
        };
        let extends = |entry_word: &str| -> bool {
            if settings.accent_matching {
                let n = normalize_word(entry_word);
                n.len() > norm.len() && n.starts_with(&norm)
            } else {
                let w = entry_word.to_lowercase();
                w.len() > lower.len() && w.starts_with(&lower)
            }
        };

        let mut best: HashMap<String, Suggestion> = HashMap::new();
        let mut offer = |s: Suggestion| {
            let key = s.word.to_lowercase();
            match best.get_mut(&key) {
                Some(existing) => existing.absorb(s),
                None => {
                    best.insert(key, s);
                }
            }
        };

        for (entry, d, language) in self.entries_for(&norm, max, sets) {
            if let Some(d) = measure(&entry.word, d) {
                offer(
                    Suggestion::new(entry.word.clone(), d, entry.frequency, entry.source)
                        .in_language(&language),
                );
            }
        }

        let completion_limit = settings.max_suggestions.saturating_mul(4).max(8);
        for set in sets {
            let Some(dict) = set.dictionary() else {
                continue;
            };
            for entry in dict.completions(&norm, completion_limit) {
                if extends(&entry.word) {
                    offer(
                        Suggestion::new(entry.word.clone(), 0, entry.frequency, entry.source)
                            .completion()
                            .in_language(set.language()),
                    );
                }
            }
        }
        for (word, freq) in self.userdict.snapshot() {
            if extends(&word) {
                let freq = u32::try_from(freq).unwrap_or(u32::MAX);
                offer(Suggestion::new(word.clone(), 0, freq, Source::User).completion());
            }
        }

        let mut ranked: Vec<Suggestion> = best.into_values().collect();
        ranked.sort_by(|a, b| a.rank(b, settings.tie_break));
        ranked.truncate(settings.max_suggestions);
        for s in &mut ranked {
            s.word = apply_case(query, &s.word);
        }
        ranked
    }

    /// (hits, misses)
    pub fn cache_stats(&self) -> (usize, usize) {
        (self.cache_hits.get(), self.cache_misses.get())
    }

    pub fn cache_size(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
        self.cache_hits.set(0);
        self.cache_misses.set(0);
    }
}

fn cache_key(query: &str, sets: &[Arc<LanguageCorrectionSet>], settings: &CorrectionSettings) -> String {
    let langs: Vec<&str> = sets.iter().map(|s| s.language()).collect();
    format!(
        "{}|{}|{}|{}|{:?}",
        langs.join(","),
        query,
        settings.accent_matching,
        settings.max_suggestions,
        settings.tie_break
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corrections::CorrectionMap;
    use crate::dictionary::Dictionary;
    use crate::settings::TieBreak;

    fn english() -> Arc<LanguageCorrectionSet> {
        let mut custom = CorrectionMap::new();
        custom.insert("teh", "the");
        let dict = Dictionary::from_words(
            "en",
            [("the", 100), ("world", 50), ("word", 80), ("work", 60), ("Rome", 30)],
        );
        Arc::new(LanguageCorrectionSet::with_maps("en", custom, CorrectionMap::new()).with_dictionary(dict))
    }

    fn italian() -> Arc<LanguageCorrectionSet> {
        let dict = Dictionary::from_words("it", [("caffè", 40), ("perché", 70), ("casa", 90)]);
        Arc::new(LanguageCorrectionSet::new("it").with_dictionary(dict))
    }

    fn words(s: &[Suggestion]) -> Vec<&str> {
        s.iter().map(|s| s.word.as_str()).collect()
    }

    #[test]
    fn exact_override_wins_over_distance_search() {
        let engine = CorrectionEngine::new(UserDict::new_in_memory());
        let settings = CorrectionSettings::default();
        assert_eq!(
            engine.apply_boundary_correction("teh", &[english()], &settings),
            Some("the".to_string())
        );
        assert_eq!(
            engine.apply_boundary_correction("Teh", &[english()], &settings),
            Some("The".to_string())
        );
    }

    #[test]
    fn dictionary_words_are_left_alone() {
        let engine = CorrectionEngine::new(UserDict::new_in_memory());
        let settings = CorrectionSettings::default();
        assert_eq!(engine.apply_boundary_correction("word", &[english()], &settings), None);
    }

    #[test]
    fn distance_correction_respects_bound_and_case() {
        let engine = CorrectionEngine::new(UserDict::new_in_memory());
        let mut settings = CorrectionSettings::default();
        assert_eq!(
            engine.apply_boundary_correction("WROLD", &[english()], &settings),
            Some("WORLD".to_string())
        );
        assert_eq!(engine.apply_boundary_correction("wrld", &[english()], &settings), Some("world".to_string()));
        settings.max_auto_replace_distance = 0;
        assert_eq!(engine.apply_boundary_correction("wrold", &[english()], &settings), None);
        settings.max_auto_replace_distance = 1;
        settings.auto_replace_on_boundary = false;
        assert_eq!(engine.apply_boundary_correction("teh", &[english()], &settings), None);
    }

    #[test]
    fn accent_folded_match_restores_accents() {
        let engine = CorrectionEngine::new(UserDict::new_in_memory());
        let settings = CorrectionSettings::default();
        assert_eq!(
            engine.apply_boundary_correction("perche", &[italian()], &settings),
            Some("perché".to_string())
        );
    }

    #[test]
    fn wide_auto_replace_bound_reaches_beyond_precomputed_deletes() {
        let engine = CorrectionEngine::new(UserDict::new_in_memory());
        let dict = Dictionary::from_words("en", [("abcdef", 10)]);
        let set = Arc::new(LanguageCorrectionSet::new("en").with_dictionary(dict));
        let mut settings = CorrectionSettings {
            max_auto_replace_distance: 3,
            ..Default::default()
        };
        assert_eq!(
            engine.apply_boundary_correction("xyzdef", &[set.clone()], &settings),
            Some("abcdef".to_string())
        );
        settings.max_auto_replace_distance = 2;
        assert_eq!(engine.apply_boundary_correction("xyzdef", &[set], &settings), None);
    }

    #[test]
    fn zero_bound_disables_accent_restoration() {
        let engine = CorrectionEngine::new(UserDict::new_in_memory());
        let settings = CorrectionSettings {
            max_auto_replace_distance: 0,
            ..Default::default()
        };
        assert_eq!(engine.apply_boundary_correction("perche", &[italian()], &settings), None);
    }

    #[test]
    fn suggestions_order_by_distance_then_frequency() {
        let engine = CorrectionEngine::new(UserDict::new_in_memory());
        let settings = CorrectionSettings::default();
        let s = engine.suggest("wrold", &[english()], &settings);
        // world is one transposition away, word needs two edits.
        assert_eq!(words(&s)[..2], ["world", "word"]);
        assert_eq!(s[0].distance, 1);
        assert_eq!(s[1].distance, 2);
    }

    #[test]
    fn completions_follow_exact_match() {
        let engine = CorrectionEngine::new(UserDict::new_in_memory());
        let settings = CorrectionSettings {
            max_suggestions: 5,
            ..Default::default()
        };
        let s = engine.suggest("Wor", &[english()], &settings);
        assert_eq!(words(&s)[..3], ["Word", "Work", "World"]);
        assert!(s.iter().take(3).all(|s| s.completion));
    }

    #[test]
    fn personal_entries_win_ties_and_collapse_duplicates() {
        let engine = CorrectionEngine::new(UserDict::new_in_memory());
        engine.add_to_personal("wordle");
        engine.userdict().add_with_frequency("world", 50);
        let settings = CorrectionSettings {
            max_suggestions: 10,
            ..Default::default()
        };
        let s = engine.suggest("world", &[english()], &settings);
        let world: Vec<&Suggestion> = s.iter().filter(|s| s.word == "world").collect();
        assert_eq!(world.len(), 1);
        assert_eq!(world[0].source, Source::User);
        assert!(s.iter().any(|s| s.word == "wordle"));

        let tie = CorrectionSettings {
            tie_break: TieBreak::SourceThenFrequency,
            ..settings
        };
        engine.clear_cache();
        let s = engine.suggest("wor", &[english()], &tie);
        assert_eq!(s[0].source, Source::User);
    }

    #[test]
    fn accent_matching_controls_distance() {
        let engine = CorrectionEngine::new(UserDict::new_in_memory());
        let mut settings = CorrectionSettings::default();
        let s = engine.suggest("caffe", &[italian()], &settings);
        assert_eq!(s[0].word, "caffè");
        assert_eq!(s[0].distance, 0);
        settings.accent_matching = false;
        let s = engine.suggest("caffe", &[italian()], &settings);
        assert_eq!(s[0].word, "caffè");
        assert_eq!(s[0].distance, 1);
    }

    #[test]
    fn disabled_or_empty_engine_returns_nothing() {
        let engine = CorrectionEngine::new(UserDict::new_in_memory());
        let mut settings = CorrectionSettings::default();
        assert!(engine.suggest("wrold", &[], &settings).is_empty());
        settings.enabled = false;
        assert!(engine.suggest("wrold", &[english()], &settings).is_empty());
    }

    #[test]
    fn suggestions_are_cached_until_personal_change() {
        let engine = CorrectionEngine::new(UserDict::new_in_memory());
        let settings = CorrectionSettings::default();
        engine.suggest("wrold", &[english()], &settings);
        engine.suggest("wrold", &[english()], &settings);
        assert_eq!(engine.cache_stats(), (1, 1));
        engine.add_to_personal("wrolds");
        assert_eq!(engine.cache_size(), 0);
    }

    #[test]
    fn shared_personal_dictionary_invalidates_other_sessions() {
        let userdict = UserDict::new_in_memory();
        let first = CorrectionEngine::new(userdict.clone());
        let second = CorrectionEngine::new(userdict);
        let settings = CorrectionSettings {
            max_suggestions: 10,
            ..Default::default()
        };
        let before = first.suggest("wor", &[english()], &settings);
        assert!(!words(&before).contains(&"worzel"));

        second.add_to_personal("worzel");
        let after = first.suggest("wor", &[english()], &settings);
        assert!(words(&after).contains(&"worzel"));
        assert_eq!(first.cache_stats(), (0, 1));
    }
}
