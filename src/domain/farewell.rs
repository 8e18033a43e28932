//! Farewell phrase detection on committed utterances

use regex::Regex;
use std::sync::OnceLock;

/// How many characters past the end of a phrase may still trail it in the
/// utterance. Tunable; the value carries no deeper meaning.
pub const DEFAULT_END_TOLERANCE: usize = 5;

fn non_word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\w\s]").expect("non-word pattern is valid"))
}

/// Lowercase, trim, replace punctuation with spaces and collapse whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let spaced = non_word_pattern().replace_all(&lowered, " ");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ordered set of normalized closing phrases
#[derive(Debug, Clone)]
pub struct FarewellPhraseSet {
    phrases: Vec<String>,
    end_tolerance: usize,
}

impl FarewellPhraseSet {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for phrase in phrases {
            let phrase = normalize(phrase.as_ref());
            if !phrase.is_empty() && !normalized.contains(&phrase) {
                normalized.push(phrase);
            }
        }

        Self {
            phrases: normalized,
            end_tolerance: DEFAULT_END_TOLERANCE,
        }
    }

    pub fn with_end_tolerance(mut self, end_tolerance: usize) -> Self {
        self.end_tolerance = end_tolerance;
        self
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// First phrase found near the end of the utterance, if any.
    pub fn matching_phrase(&self, utterance: &str) -> Option<&str> {
        let text = normalize(utterance);
        if text.is_empty() {
            return None;
        }

        self.phrases
            .iter()
            .find(|phrase| {
                let Some(start) = text.find(phrase.as_str()) else {
                    return false;
                };
                // Distances are in characters, not bytes
                let tail = text[start..].chars().count();
                text.ends_with(phrase.as_str())
                    || tail < phrase.chars().count() + self.end_tolerance
            })
            .map(String::as_str)
    }

    pub fn is_farewell(&self, utterance: &str) -> bool {
        self.matching_phrase(utterance).is_some()
    }
}

/// Whether the utterance ends the conversation according to `phrases`
pub fn is_farewell(utterance: &str, phrases: &FarewellPhraseSet) -> bool {
    phrases.is_farewell(utterance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases() -> FarewellPhraseSet {
        FarewellPhraseSet::new([
            "спасибо за обращение",
            "до свидания",
            "Спасибо, хорошего дня",
            "пока",
        ])
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Спасибо,   за обращение!! "), "спасибо за обращение");
        assert_eq!(normalize("Good-bye."), "good bye");
        assert_eq!(normalize("?!"), "");
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let set = phrases();
        assert!(is_farewell("Спасибо за обращение!", &set));
        assert!(is_farewell("спасибо за обращение", &set));
        assert!(is_farewell("СПАСИБО ЗА ОБРАЩЕНИЕ...", &set));
    }

    #[test]
    fn test_phrase_far_from_end_does_not_match() {
        let set = phrases();
        assert!(!is_farewell("спасибо за обращение, а теперь по теме оплаты", &set));
    }

    #[test]
    fn test_short_trailing_filler_tolerated() {
        let set = phrases();
        // "до свидания" (11 chars) followed by " да" leaves 14 < 16 characters
        assert!(is_farewell("До свидания, да", &set));
        assert!(!is_farewell("до свидания и ещё одно", &set));
    }

    #[test]
    fn test_phrases_are_normalized() {
        let set = phrases();
        assert!(set.phrases().contains(&"спасибо хорошего дня".to_string()));
        assert_eq!(
            set.matching_phrase("Ну что ж, спасибо, хорошего дня!"),
            Some("спасибо хорошего дня")
        );
    }

    #[test]
    fn test_no_match() {
        let set = phrases();
        assert!(!is_farewell("", &set));
        assert!(!is_farewell("Запишите меня к терапевту", &set));
        assert!(!FarewellPhraseSet::new(Vec::<String>::new()).is_farewell("до свидания"));
    }

    #[test]
    fn test_end_tolerance_is_tunable() {
        let strict = phrases().with_end_tolerance(0);
        assert!(strict.is_farewell("пока"));
        assert!(!strict.is_farewell("пока да"));
    }

    #[test]
    fn test_duplicates_collapse() {
        let set = FarewellPhraseSet::new(["Пока", "пока!", "пока"]);
        assert_eq!(set.len(), 1);
    }
}
