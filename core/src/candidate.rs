//! Ranked suggestion type.

use crate::dictionary::Source;
use crate::settings::TieBreak;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A suggestion for the word being typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Text to insert, with the typed word's casing applied.
    pub word: String,
    /// Edit distance between the typed word and this entry.
    pub distance: usize,
    pub frequency: u32,
    pub source: Source,
    /// The entry extends the typed word rather than matching it.
    pub completion: bool,
    pub language: String,
}

impl Suggestion {
    pub fn new<T: Into<String>>(word: T, distance: usize, frequency: u32, source: Source) -> Self {
        Suggestion {
            word: word.into(),
            distance,
            frequency,
            source,
            completion: false,
            language: String::new(),
        }
    }

    pub fn completion(mut self) -> Self {
        self.completion = true;
        self
    }

    pub fn in_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    /// Fold a duplicate of the same word into this one: user source wins,
    /// the higher frequency and lower distance are kept.
    pub fn absorb(&mut self, other: Suggestion) {
        if other.source == Source::User {
            self.source = Source::User;
        }
        self.frequency = self.frequency.max(other.frequency);
        if other.distance < self.distance
            || (other.distance == self.distance && !other.completion)
        {
            self.distance = other.distance;
            self.completion = other.completion;
        }
    }

    /// Ranking order: distance, exact before completion, then `tie_break`,
    /// then alphabetical for determinism.
    pub fn rank(&self, other: &Suggestion, tie_break: TieBreak) -> Ordering {
        self.distance
            .cmp(&other.distance)
            .then(self.completion.cmp(&other.completion))
            .then_with(|| {
                tie_break.compare(
                    (self.frequency, self.source),
                    (other.frequency, other.source),
                )
            })
            .then_with(|| self.word.cmp(&other.word))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_prefers_user_and_max_frequency() {
        let mut main = Suggestion::new("word", 1, 80, Source::Main);
        main.absorb(Suggestion::new("word", 1, 5, Source::User));
        assert_eq!(main.source, Source::User);
        assert_eq!(main.frequency, 80);
    }

    #[test]
    fn exact_beats_completion_at_equal_distance() {
        let exact = Suggestion::new("wor", 0, 1, Source::Main);
        let completion = Suggestion::new("world", 0, 500, Source::Main).completion();
        assert_eq!(
            exact.rank(&completion, TieBreak::default()),
            Ordering::Less
        );
    }
}
