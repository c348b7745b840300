use regex::Regex;

use crate::error::{SessionError, SessionResult};

/// Splits recognized text into sentences on a configured punctuation class.
///
/// A sentence is a maximal run of non-punctuation followed by a run of
/// punctuation (`[^P]+[P]+`).
#[derive(Debug, Clone)]
pub struct SentenceSplitter {
    pattern: Option<Regex>,
}

impl SentenceSplitter {
    pub fn new(punctuation: &str) -> SessionResult<Self> {
        if punctuation.is_empty() {
            return Ok(Self { pattern: None });
        }

        let class = regex::escape(punctuation);
        let pattern = Regex::new(&format!("[^{class}]+[{class}]+")).map_err(|e| {
            SessionError::Config(format!("invalid punctuation class {punctuation:?}: {e}"))
        })?;

        Ok(Self {
            pattern: Some(pattern),
        })
    }

    /// Sentences of `text`, or `None` when nothing matches.
    ///
    /// Text after the last punctuation run is kept as a trailing sentence.
    pub fn split(&self, text: &str) -> Option<Vec<String>> {
        let pattern = self.pattern.as_ref()?;

        let mut sentences = Vec::new();
        let mut consumed = 0;
        for m in pattern.find_iter(text) {
            let sentence = m.as_str().trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            consumed = m.end();
        }

        if sentences.is_empty() {
            return None;
        }

        let rest = text[consumed..].trim();
        if !rest.is_empty() {
            sentences.push(rest.to_string());
        }

        Some(sentences)
    }
}
