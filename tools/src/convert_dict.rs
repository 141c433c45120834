use anyhow::{Context, Result};
use fst::{Map, Streamer};
use keypipe_core::dictionary::{truncate_top_n, BaseEntry, Dictionary, DictionaryEntry};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

fn read_base(input: &Path) -> Result<Vec<BaseEntry>> {
    let json = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing {}", input.display()))
}

fn load_base(language: &str, input: &Path) -> Result<Dictionary> {
    let json = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    Ok(Dictionary::from_base_json(language, &json)?)
}

fn write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}

/// Keep the `max_words` most frequent entries of a base list.
pub fn truncate(input: &Path, output: &Path, max_words: usize) -> Result<usize> {
    let entries = truncate_top_n(read_base(input)?, max_words);
    write(output, serde_json::to_string_pretty(&entries)?.as_bytes())?;
    Ok(entries.len())
}

/// Build `<language>_base.dict` (normalized index, prefix cache and,
/// optionally, SymSpell deletes) from a base list.
pub fn build(language: &str, input: &Path, out_dir: &Path, with_deletes: bool) -> Result<PathBuf> {
    let dict = load_base(language, input)?;
    let file = dict.to_index_file(with_deletes);
    let out = out_dir.join(format!("{language}_base.dict"));
    write(&out, serde_json::to_string(&file)?.as_bytes())?;
    Ok(out)
}

/// Build the compact `<language>.fst` + `<language>.bincode` pair.
pub fn compact(language: &str, input: &Path, out_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let dict = load_base(language, input)?;
    let (fst_bytes, payload) = dict.to_fst_bincode()?;
    let fst_out = out_dir.join(format!("{language}.fst"));
    let payload_out = out_dir.join(format!("{language}.bincode"));
    write(&fst_out, &fst_bytes)?;
    write(&payload_out, &payload)?;
    Ok((fst_out, payload_out))
}

#[derive(Debug, Serialize)]
pub struct CompactStats {
    pub terms: usize,
    pub entries: usize,
    pub sample: Vec<String>,
}

/// Summarize a compact pair without building a dictionary.
pub fn inspect(fst_path: &Path, payload_path: &Path, sample: usize) -> Result<CompactStats> {
    let map = Map::new(fs::read(fst_path)?)
        .with_context(|| format!("opening {}", fst_path.display()))?;
    let payloads: Vec<Vec<DictionaryEntry>> = bincode::deserialize(&fs::read(payload_path)?)
        .with_context(|| format!("decoding {}", payload_path.display()))?;

    let mut stats = CompactStats {
        terms: 0,
        entries: 0,
        sample: Vec::new(),
    };
    let mut stream = map.stream();
    while let Some((key, idx)) = stream.next() {
        stats.terms += 1;
        stats.entries += payloads.get(idx as usize).map_or(0, Vec::len);
        if stats.sample.len() < sample {
            stats.sample.push(String::from_utf8_lossy(key).into_owned());
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"[
        {"w": "the", "f": 100},
        {"w": "The", "f": 3},
        {"w": "word", "f": 80},
        {"w": "world", "f": 50},
        {"w": "rare"}
    ]"#;

    fn base_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("en_base.json");
        fs::write(&path, BASE).unwrap();
        path
    }

    #[test]
    fn truncate_keeps_most_frequent() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("small.json");
        assert_eq!(truncate(&base_file(&dir), &out, 2).unwrap(), 2);
        let kept: Vec<String> = read_base(&out).unwrap().into_iter().map(|e| e.w).collect();
        assert_eq!(kept, vec!["the", "word"]);
    }

    #[test]
    fn built_dict_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let out = build("en", &base_file(&dir), dir.path(), true).unwrap();
        let dict = Dictionary::from_dict_json("en", &fs::read_to_string(out).unwrap()).unwrap();
        assert!(dict.contains_word("world"));
        assert_eq!(dict.lookup("the").len(), 2);
        assert!(!dict.typo_terms("wrld", 1).is_empty());
    }

    #[test]
    fn compact_pair_is_inspectable() {
        let dir = tempfile::tempdir().unwrap();
        let (fst_out, payload_out) = compact("en", &base_file(&dir), dir.path()).unwrap();
        let stats = inspect(&fst_out, &payload_out, 2).unwrap();
        assert_eq!(stats.terms, 4);
        assert_eq!(stats.entries, 5);
        assert_eq!(stats.sample, vec!["rare", "the"]);

        let dict = Dictionary::from_fst_bincode(
            "en",
            fs::read(&fst_out).unwrap(),
            &fs::read(&payload_out).unwrap(),
        )
        .unwrap();
        assert_eq!(dict.len(), 4);
        assert_eq!(dict.entries().count(), 5);
    }
}
