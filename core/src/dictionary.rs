//! Per-language word lists and their lookup indexes.
//!
//! A dictionary maps normalized terms (lowercase, accents stripped, letters
//! only) to the original entries, keeps a prefix cache for completions and a
//! SymSpell delete index for typo candidates. Three on-disk forms load into
//! the same structure:
//! - base word list `<lang>_base.json`: `[{"w": "Roma", "f": 120}, ...]`
//! - serialized index `<lang>_base.dict` (JSON, see `DictionaryIndexFile`)
//! - compact binary `<lang>.fst` + `<lang>.bincode`
//!
//! In the binary form an FST maps each normalized
//! term to an index into a bincode `Vec<Vec<DictionaryEntry>>`.

use crate::config_source::{LayeredSource, DICTIONARIES_DIR};
use crate::distance;
use crate::error::{Error, Result};
use crate::utils::normalize_word;
use ahash::{AHashMap, AHashSet};
use fst::{Map, MapBuilder, Streamer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const DEFAULT_MAX_EDIT_DISTANCE: usize = 2;
pub const DEFAULT_PREFIX_LENGTH: usize = 4;
/// Longest prefix kept in the prefix cache.
pub const PREFIX_CACHE_LENGTH: usize = 4;

/// Where an entry came from. Serialized as `0` (main) / `1` (user).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Source {
    Main,
    User,
}

impl Source {
    /// Higher ranks first on ties.
    pub fn rank(self) -> u8 {
        match self {
            Source::Main => 0,
            Source::User => 1,
        }
    }
}

impl From<u8> for Source {
    fn from(v: u8) -> Self {
        if v == 1 {
            Source::User
        } else {
            Source::Main
        }
    }
}

impl From<Source> for u8 {
    fn from(s: Source) -> Self {
        s.rank()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub word: String,
    pub frequency: u32,
    pub source: Source,
}

impl DictionaryEntry {
    pub fn main(word: &str, frequency: u32) -> Self {
        Self {
            word: word.to_string(),
            frequency,
            source: Source::Main,
        }
    }

    pub fn user(word: &str, frequency: u32) -> Self {
        Self {
            word: word.to_string(),
            frequency,
            source: Source::User,
        }
    }
}

/// One record of a base word list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseEntry {
    pub w: String,
    #[serde(default = "default_frequency")]
    pub f: u32,
}

fn default_frequency() -> u32 {
    1
}

/// Keep the `max_words` most frequent entries, most frequent first. Ties keep
/// their original order.
pub fn truncate_top_n(mut entries: Vec<BaseEntry>, max_words: usize) -> Vec<BaseEntry> {
    entries.sort_by(|a, b| b.f.cmp(&a.f));
    entries.truncate(max_words);
    entries
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymMeta {
    pub max_edit_distance: usize,
    pub prefix_length: usize,
}

impl Default for SymMeta {
    fn default() -> Self {
        Self {
            max_edit_distance: DEFAULT_MAX_EDIT_DISTANCE,
            prefix_length: DEFAULT_PREFIX_LENGTH,
        }
    }
}

/// Serialized `.dict` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryIndexFile {
    pub normalized_index: BTreeMap<String, Vec<DictionaryEntry>>,
    #[serde(default)]
    pub prefix_cache: BTreeMap<String, Vec<DictionaryEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sym_deletes: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sym_meta: Option<SymMeta>,
}

/// All strings reachable from `term` by deleting 1..=`max_distance` chars.
pub fn generate_deletes(term: &str, max_distance: usize) -> AHashSet<String> {
    fn recurse(current: &[char], d: usize, out: &mut AHashSet<String>) {
        if d == 0 {
            return;
        }
        for i in 0..current.len() {
            let mut deleted = current.to_vec();
            deleted.remove(i);
            let key: String = deleted.iter().collect();
            if out.insert(key) {
                recurse(&deleted, d - 1, out);
            }
        }
    }
    let chars: Vec<char> = term.chars().collect();
    let mut out = AHashSet::new();
    recurse(&chars, max_distance, &mut out);
    out
}

fn prefix(term: &str, len: usize) -> String {
    term.chars().take(len).collect()
}

/// SymSpell delete index over term prefixes.
#[derive(Debug, Clone, Default)]
pub struct SymSpellIndex {
    meta: SymMeta,
    deletes: AHashMap<String, Vec<String>>,
    /// Prefix → terms having exactly that prefix.
    by_prefix: AHashMap<String, Vec<String>>,
}

impl SymSpellIndex {
    pub fn build<'a, I: IntoIterator<Item = &'a str>>(terms: I, meta: SymMeta) -> Self {
        let mut index = Self {
            meta,
            ..Self::default()
        };
        for term in terms {
            let key = prefix(term, meta.prefix_length);
            for d in generate_deletes(&key, meta.max_edit_distance) {
                index.deletes.entry(d).or_default().push(term.to_string());
            }
            index.by_prefix.entry(key).or_default().push(term.to_string());
        }
        index
    }

    /// Reuse precomputed deletes; only the exact-prefix table is rebuilt.
    pub fn from_parts<'a, I: IntoIterator<Item = &'a str>>(
        terms: I,
        deletes: BTreeMap<String, Vec<String>>,
        meta: SymMeta,
    ) -> Self {
        let mut by_prefix: AHashMap<String, Vec<String>> = AHashMap::new();
        for term in terms {
            by_prefix
                .entry(prefix(term, meta.prefix_length))
                .or_default()
                .push(term.to_string());
        }
        Self {
            meta,
            deletes: deletes.into_iter().collect(),
            by_prefix,
        }
    }

    pub fn meta(&self) -> SymMeta {
        self.meta
    }

    pub fn deletes(&self) -> &AHashMap<String, Vec<String>> {
        &self.deletes
    }

    /// Terms whose prefix is within `max_distance` deletes of the query prefix.
    /// Callers filter with the true distance.
    pub fn candidates(&self, query: &str, max_distance: usize) -> AHashSet<String> {
        let max_distance = max_distance.min(self.meta.max_edit_distance);
        let key = prefix(query, self.meta.prefix_length);
        let mut variants = generate_deletes(&key, max_distance);
        variants.insert(key);

        let mut out = AHashSet::new();
        for v in &variants {
            for table in [&self.by_prefix, &self.deletes] {
                if let Some(terms) = table.get(v) {
                    out.extend(terms.iter().cloned());
                }
            }
        }
        out
    }
}

/// Loaded dictionary for one language.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    language: String,
    index: AHashMap<String, Vec<DictionaryEntry>>,
    prefix_cache: AHashMap<String, Vec<DictionaryEntry>>,
    symspell: SymSpellIndex,
}

impl Dictionary {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            ..Self::default()
        }
    }

    /// Build from `(word, frequency)` pairs. All entries are `main`.
    pub fn from_words<'a, I>(language: &str, words: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, u32)>,
    {
        let mut index: AHashMap<String, Vec<DictionaryEntry>> = AHashMap::new();
        for (word, freq) in words {
            let norm = normalize_word(word);
            if norm.is_empty() {
                continue;
            }
            index
                .entry(norm)
                .or_default()
                .push(DictionaryEntry::main(word, freq));
        }
        Self::from_index(language, index, None, None)
    }

    fn from_index(
        language: &str,
        index: AHashMap<String, Vec<DictionaryEntry>>,
        prefix_cache: Option<AHashMap<String, Vec<DictionaryEntry>>>,
        sym: Option<(BTreeMap<String, Vec<String>>, SymMeta)>,
    ) -> Self {
        let prefix_cache = match prefix_cache {
            Some(cache) if !cache.is_empty() => cache,
            _ => build_prefix_cache(&index),
        };
        let terms = index.keys().map(String::as_str);
        let symspell = match sym {
            Some((deletes, meta)) if !deletes.is_empty() => {
                SymSpellIndex::from_parts(terms, deletes, meta)
            }
            Some((_, meta)) => SymSpellIndex::build(terms, meta),
            None => SymSpellIndex::build(terms, SymMeta::default()),
        };
        Self {
            language: language.to_string(),
            index,
            prefix_cache,
            symspell,
        }
    }

    pub fn from_base_json(language: &str, json: &str) -> Result<Self> {
        let entries: Vec<BaseEntry> = serde_json::from_str(json)
            .map_err(|e| Error::parse(base_json_path(language), e))?;
        Ok(Self::from_words(
            language,
            entries.iter().map(|e| (e.w.as_str(), e.f)),
        ))
    }

    pub fn from_index_file(language: &str, file: DictionaryIndexFile) -> Self {
        let sym = file
            .sym_deletes
            .map(|deletes| (deletes, file.sym_meta.unwrap_or_default()));
        Self::from_index(
            language,
            file.normalized_index.into_iter().collect(),
            Some(file.prefix_cache.into_iter().collect()),
            sym,
        )
    }

    pub fn from_dict_json(language: &str, json: &str) -> Result<Self> {
        let file: DictionaryIndexFile =
            serde_json::from_str(json).map_err(|e| Error::parse(dict_path(language), e))?;
        Ok(Self::from_index_file(language, file))
    }

    /// Load the compact binary form: FST term → index, bincode payloads.
    pub fn from_fst_bincode(language: &str, fst_bytes: Vec<u8>, payload: &[u8]) -> Result<Self> {
        let map = Map::new(fst_bytes)?;
        let payloads: Vec<Vec<DictionaryEntry>> = bincode::deserialize(payload)?;
        let mut index = AHashMap::with_capacity(map.len());
        let mut stream = map.stream();
        while let Some((key, idx)) = stream.next() {
            let term = String::from_utf8_lossy(key).into_owned();
            match payloads.get(idx as usize) {
                Some(entries) => {
                    index.insert(term, entries.clone());
                }
                None => warn!(language, term = %term, idx, "fst index out of payload range"),
            }
        }
        Ok(Self::from_index(language, index, None, None))
    }

    /// Serialize to the `.dict` document, optionally with SymSpell deletes.
    pub fn to_index_file(&self, with_deletes: bool) -> DictionaryIndexFile {
        let (sym_deletes, sym_meta) = if with_deletes {
            let deletes = self
                .symspell
                .deletes()
                .iter()
                .map(|(k, v)| {
                    let mut terms = v.clone();
                    terms.sort();
                    terms.dedup();
                    (k.clone(), terms)
                })
                .collect();
            (Some(deletes), Some(self.symspell.meta()))
        } else {
            (None, None)
        };
        DictionaryIndexFile {
            normalized_index: self.index.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            prefix_cache: self
                .prefix_cache
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            sym_deletes,
            sym_meta,
        }
    }

    /// Build the compact binary form. Returns `(fst_bytes, bincode_bytes)`.
    pub fn to_fst_bincode(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut terms: Vec<&String> = self.index.keys().collect();
        terms.sort();
        let mut builder = MapBuilder::memory();
        let mut payloads: Vec<Vec<DictionaryEntry>> = Vec::with_capacity(terms.len());
        for (i, term) in terms.iter().enumerate() {
            builder.insert(term.as_bytes(), i as u64)?;
            payloads.push(self.index.get(*term).cloned().unwrap_or_default());
        }
        let fst_bytes = builder.into_inner()?;
        let payload = bincode::serialize(&payloads)?;
        Ok((fst_bytes, payload))
    }

    /// Try each on-disk form in turn: binary, serialized index, base list.
    /// Custom files shadow bundled ones per file. Returns `None` (with a
    /// warning per failed form) when nothing usable is found.
    pub fn load(source: &LayeredSource, language: &str) -> Option<Self> {
        let fst = read_optional(source, &fst_path(language));
        let payload = read_optional(source, &bincode_path(language));
        if let (Some(fst), Some(payload)) = (fst, payload) {
            match Self::from_fst_bincode(language, fst, &payload) {
                Ok(dict) => return Some(loaded(dict, "fst")),
                Err(e) => warn!(language, error = %e, "compact dictionary unusable"),
            }
        }

        if let Some(bytes) = read_optional(source, &dict_path(language)) {
            match String::from_utf8(bytes)
                .map_err(|e| Error::parse(dict_path(language), e))
                .and_then(|json| Self::from_dict_json(language, &json))
            {
                Ok(dict) => return Some(loaded(dict, "dict")),
                Err(e) => warn!(language, error = %e, "serialized dictionary unusable"),
            }
        }

        if let Some(bytes) = read_optional(source, &base_json_path(language)) {
            match String::from_utf8(bytes)
                .map_err(|e| Error::parse(base_json_path(language), e))
                .and_then(|json| Self::from_base_json(language, &json))
            {
                Ok(dict) => return Some(loaded(dict, "json")),
                Err(e) => warn!(language, error = %e, "base word list unusable"),
            }
        }
        None
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Number of distinct normalized terms.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn lookup(&self, normalized: &str) -> &[DictionaryEntry] {
        self.index.get(normalized).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `word` is in the dictionary, ignoring case but not accents.
    pub fn contains_word(&self, word: &str) -> bool {
        let lower = word.to_lowercase();
        self.lookup(&normalize_word(word))
            .iter()
            .any(|e| e.word.to_lowercase() == lower)
    }

    /// Entries whose normalized form starts with `normalized_prefix`, most
    /// frequent first.
    pub fn completions(&self, normalized_prefix: &str, limit: usize) -> Vec<DictionaryEntry> {
        if normalized_prefix.is_empty() || limit == 0 {
            return Vec::new();
        }
        let head = prefix(normalized_prefix, PREFIX_CACHE_LENGTH);
        let Some(cached) = self.prefix_cache.get(&head) else {
            return Vec::new();
        };
        let mut out: Vec<DictionaryEntry> = if head.chars().count() == normalized_prefix.chars().count() {
            cached.clone()
        } else {
            cached
                .iter()
                .filter(|e| normalize_word(&e.word).starts_with(normalized_prefix))
                .cloned()
                .collect()
        };
        out.sort_by(|a, b| b.frequency.cmp(&a.frequency));
        out.truncate(limit);
        out
    }

    /// Normalized terms within `max_distance` of `normalized`, with distances.
    pub fn typo_terms(&self, normalized: &str, max_distance: usize) -> Vec<(String, usize)> {
        if max_distance == 0 {
            return Vec::new();
        }
        // Deletes only reach the indexed distance; wider bounds scan every term.
        let candidates = if max_distance > self.symspell.meta().max_edit_distance {
            self.index.keys().cloned().collect()
        } else {
            self.symspell.candidates(normalized, max_distance)
        };
        let mut out: Vec<(String, usize)> = candidates
            .into_iter()
            .filter_map(|term| distance::within(normalized, &term, max_distance).map(|d| (term, d)))
            .collect();
        out.sort();
        out
    }

    /// Iterate every entry.
    pub fn entries(&self) -> impl Iterator<Item = &DictionaryEntry> {
        self.index.values().flatten()
    }
}

fn loaded(dict: Dictionary, form: &str) -> Dictionary {
    debug!(language = dict.language(), form, terms = dict.len(), "dictionary loaded");
    dict
}

fn read_optional(source: &LayeredSource, path: &str) -> Option<Vec<u8>> {
    match source.read_bytes(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path, error = %e, "cannot read dictionary file");
            None
        }
    }
}

fn build_prefix_cache(
    index: &AHashMap<String, Vec<DictionaryEntry>>,
) -> AHashMap<String, Vec<DictionaryEntry>> {
    let mut cache: AHashMap<String, Vec<DictionaryEntry>> = AHashMap::new();
    for (norm, entries) in index {
        let chars: Vec<char> = norm.chars().collect();
        for len in 1..=chars.len().min(PREFIX_CACHE_LENGTH) {
            let key: String = chars[..len].iter().collect();
            cache.entry(key).or_default().extend(entries.iter().cloned());
        }
    }
    for entries in cache.values_mut() {
        entries.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.word.cmp(&b.word)));
    }
    cache
}

pub fn base_json_path(language: &str) -> String {
    format!("{}/{}_base.json", DICTIONARIES_DIR, language)
}

pub fn dict_path(language: &str) -> String {
    format!("{}/{}_base.dict", DICTIONARIES_DIR, language)
}

pub fn fst_path(language: &str) -> String {
    format!("{}/{}.fst", DICTIONARIES_DIR, language)
}

pub fn bincode_path(language: &str) -> String {
    format!("{}/{}.bincode", DICTIONARIES_DIR, language)
}

/// Language code encoded in a dictionary file name, if any.
pub fn language_of_file(file: &str) -> Option<&str> {
    file.strip_suffix("_base.json")
        .or_else(|| file.strip_suffix("_base.dict"))
        .or_else(|| file.strip_suffix(".fst"))
}
