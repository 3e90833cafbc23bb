//! Markov text synthesizer: corpus ingestion, walks, and persistence.

use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand::Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarkovError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON serialization error: {0}")]
    RonSer(#[from] ron::Error),
}

const SENTENCE_ENDERS: &[char] = &['.', '!', '?'];
/// Punctuation characters that are tokenized as separate tokens.
const PUNCTUATION: &[char] = &['.', '!', '?', ',', ';', ':', '"'];

/// Successor table: window → [(next_token, count)].
pub type TransitionTable = FxHashMap<Vec<String>, Vec<(String, u32)>>;

/// An n-gram model over a sentence corpus.
///
/// Successor frequencies are stored as explicit counts. Windows are kept in
/// first-seen order so seeding a walk is reproducible for a given RNG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextSynthesizer {
    /// Window length in tokens.
    pub state_size: usize,
    pub transitions: TransitionTable,
    windows: Vec<Vec<String>>,
    sentences: Vec<String>,
}

impl Default for TextSynthesizer {
    fn default() -> Self {
        Self::new(2)
    }
}

impl TextSynthesizer {
    pub fn new(state_size: usize) -> Self {
        Self {
            state_size: state_size.max(1),
            transitions: TransitionTable::default(),
            windows: Vec::new(),
            sentences: Vec::new(),
        }
    }

    /// Add sentences to the corpus and rebuild the transition table.
    pub fn ingest<S: AsRef<str>>(&mut self, sentences: &[S]) {
        self.sentences.extend(
            sentences
                .iter()
                .map(|s| s.as_ref().trim().to_string())
                .filter(|s| !s.is_empty()),
        );
        self.rebuild();
    }

    /// Ingest raw text, splitting it into sentences first.
    pub fn ingest_text(&mut self, text: &str) {
        let sentences: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .flat_map(|line| {
                split_into_sentences(&tokenize(line))
                    .into_iter()
                    .map(|tokens| reassemble_tokens(&tokens))
                    .collect::<Vec<_>>()
            })
            .collect();
        self.ingest(&sentences);
    }

    fn rebuild(&mut self) {
        self.transitions.clear();
        self.windows.clear();
        let n = self.state_size;

        for sentence in &self.sentences {
            let tokens: Vec<String> = tokenize(&sentence.to_lowercase());
            if tokens.len() < n {
                continue;
            }
            for i in 0..=tokens.len() - n {
                let window = tokens[i..i + n].to_vec();
                if !self.transitions.contains_key(&window) && !is_punctuation(&window[0]) {
                    self.windows.push(window.clone());
                }
                let entries = self.transitions.entry(window).or_default();
                if let Some(next) = tokens.get(i + n) {
                    add_transition(entries, next.clone());
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn corpus(&self) -> &[String] {
        &self.sentences
    }

    /// Successors observed after a space-separated window, case-insensitive.
    pub fn successors(&self, window: &str) -> Option<&[(String, u32)]> {
        let key: Vec<String> = window
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        self.transitions.get(&key).map(Vec::as_slice)
    }

    /// Random walk bounded by word counts.
    ///
    /// A walk that dead-ends short of `min_words`, or runs past `max_words`,
    /// is rejected and retried. After `max_tries` rejections, two or three
    /// corpus sentences are stitched together instead. Returns an empty
    /// string only when the corpus is empty.
    pub fn generate(
        &self,
        rng: &mut StdRng,
        min_words: usize,
        max_words: usize,
        max_tries: usize,
    ) -> String {
        if self.windows.is_empty() {
            return self.fallback(rng);
        }
        let max_words = max_words.max(min_words);

        for _ in 0..max_tries {
            if let Some(tokens) = self.walk(rng, max_words) {
                let words = word_count(&tokens);
                if words >= min_words && words <= max_words {
                    return finish_sentence(&reassemble_tokens(&tokens));
                }
            }
        }

        tracing::debug!(max_tries, "synthesizer exhausted, stitching corpus fragments");
        self.fallback(rng)
    }

    /// A short title-cased line without terminal punctuation, capped at
    /// `max_chars` with a trailing ellipsis.
    pub fn generate_title(
        &self,
        rng: &mut StdRng,
        min_words: usize,
        max_words: usize,
        max_tries: usize,
        max_chars: usize,
    ) -> String {
        let text = self.generate(rng, min_words, max_words, max_tries);
        let trimmed = text.trim_end_matches(|c: char| PUNCTUATION.contains(&c));
        let title: String = trimmed
            .split_whitespace()
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" ");
        truncate_with_ellipsis(&title, max_chars)
    }

    fn walk(&self, rng: &mut StdRng, max_words: usize) -> Option<Vec<String>> {
        let seed = &self.windows[rng.gen_range(0..self.windows.len())];
        let mut tokens = seed.clone();
        let mut state = seed.clone();
        // Punctuation tokens don't count as words, so a punctuation cycle
        // needs its own cap.
        let max_steps = max_words.saturating_add(1).saturating_mul(4);

        while word_count(&tokens) <= max_words {
            if tokens.len() > max_steps {
                return None;
            }
            let Some(next) = pick_next(&self.transitions, &state, rng) else {
                return Some(tokens);
            };
            tokens.push(next.clone());
            state.push(next);
            state.remove(0);
        }
        // Ran past the upper bound.
        None
    }

    fn fallback(&self, rng: &mut StdRng) -> String {
        if self.sentences.is_empty() {
            return String::new();
        }
        let count = rng.gen_range(2..=3);
        let parts: Vec<String> = (0..count)
            .map(|_| {
                let sentence = &self.sentences[rng.gen_range(0..self.sentences.len())];
                finish_sentence(sentence)
            })
            .collect();
        parts.join(" ")
    }
}

/// Pick the next token from transitions given a state window.
fn pick_next(transitions: &TransitionTable, state: &[String], rng: &mut StdRng) -> Option<String> {
    let options = transitions.get(state)?;
    if options.is_empty() {
        return None;
    }

    let weights: Vec<u32> = options.iter().map(|(_, count)| *count).collect();
    let dist = WeightedIndex::new(&weights).ok()?;
    Some(options[dist.sample(rng)].0.clone())
}

fn add_transition(entries: &mut Vec<(String, u32)>, next: String) {
    if let Some(entry) = entries.iter_mut().find(|(tok, _)| tok == &next) {
        entry.1 += 1;
    } else {
        entries.push((next, 1));
    }
}

fn is_punctuation(token: &str) -> bool {
    let mut chars = token.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if PUNCTUATION.contains(&c))
}

fn word_count(tokens: &[String]) -> usize {
    tokens.iter().filter(|t| !is_punctuation(t)).count()
}

/// Reassemble tokens into natural text (attach punctuation to previous word).
fn reassemble_tokens(tokens: &[String]) -> String {
    let mut result = String::new();
    for (i, tok) in tokens.iter().enumerate() {
        if i > 0 && !is_punctuation(tok) {
            result.push(' ');
        }
        result.push_str(tok);
    }
    result
}

/// Tokenize text: split on whitespace, separate punctuation as individual tokens.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split_whitespace() {
        let mut remaining = word;
        while let Some(first) = remaining.chars().next() {
            if PUNCTUATION.contains(&first) {
                tokens.push(first.to_string());
                remaining = &remaining[first.len_utf8()..];
                continue;
            }

            if let Some(pos) = remaining.find(|c: char| PUNCTUATION.contains(&c)) {
                tokens.push(remaining[..pos].to_string());
                remaining = &remaining[pos..];
            } else {
                tokens.push(remaining.to_string());
                break;
            }
        }
    }
    tokens
}

/// Split a token sequence into sentences at sentence-ending punctuation.
fn split_into_sentences(tokens: &[String]) -> Vec<Vec<String>> {
    let mut sentences = Vec::new();
    let mut current = Vec::new();

    for tok in tokens {
        current.push(tok.clone());
        if tok.len() == 1 && tok.chars().all(|c| SENTENCE_ENDERS.contains(&c)) {
            sentences.push(std::mem::take(&mut current));
        }
    }

    // Don't discard trailing tokens without sentence ender
    if !current.is_empty() {
        sentences.push(current);
    }

    sentences
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Capitalize the first letter and make sure the text ends a sentence.
pub fn finish_sentence(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut out = capitalize(trimmed);
    let ends_sentence = out.chars().last().is_some_and(|c| SENTENCE_ENDERS.contains(&c));
    if !ends_sentence {
        out = out.trim_end_matches(|c: char| PUNCTUATION.contains(&c)).to_string();
        out.push('.');
    }
    out
}

/// Cut `text` to at most `max_chars` characters, ending in `...` when cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let cut: String = text.chars().take(keep).collect();
    format!("{}...", cut.trim_end())
}

/// Save a synthesizer to a RON file.
pub fn save_model(model: &TextSynthesizer, path: &std::path::Path) -> Result<(), MarkovError> {
    let serialized = ron::ser::to_string_pretty(model, ron::ser::PrettyConfig::default())?;
    std::fs::write(path, serialized)?;
    Ok(())
}

/// Load a synthesizer from a RON file.
pub fn load_model(path: &std::path::Path) -> Result<TextSynthesizer, MarkovError> {
    let contents = std::fs::read_to_string(path)?;
    let model: TextSynthesizer = ron::from_str(&contents)?;
    Ok(model)
}
