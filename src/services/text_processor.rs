// Text Processing Service
// Normalization and statistical feature extraction for text samples

use crate::models::TextFeatures;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Share of all words the most frequent word must exceed to count as repetitive.
const REPETITION_SHARE: f64 = 0.10;

fn space_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\u{3000}\u{00A0}]").expect("valid space regex"))
}

fn horizontal_ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\x0C\x0B]+").expect("valid whitespace regex"))
}

fn sentence_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+").expect("valid sentence regex"))
}

fn paragraph_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").expect("valid paragraph regex"))
}

/// Formal discourse connectives typical of generated prose (English and Spanish).
fn connective_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(furthermore|moreover|additionally|consequently|nevertheless|nonetheless|in conclusion|in summary|it is important to note|además|asimismo|por lo tanto|sin embargo|no obstante|por consiguiente|en conclusión|en resumen|cabe destacar)\b",
        )
        .expect("valid connective regex")
    })
}

/// Normalize punctuation and whitespace in extracted text.
/// Blank lines are preserved so paragraph structure survives.
pub fn normalize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut s = text
        .replace(['\u{201c}', '\u{201d}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{2014}', "-");

    s = space_re().replace_all(&s, " ").to_string();
    s = s.replace("\r\n", "\n").replace('\r', "\n");
    s = horizontal_ws_re().replace_all(&s, " ").to_string();

    s.lines()
        .map(|ln| ln.trim())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// First `max_chars` characters of the text on one line, with an ellipsis when cut.
pub fn text_preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let mut out: String = trimmed.chars().take(max_chars).collect();
    if trimmed.chars().count() > max_chars {
        out.push_str("...");
    }
    out.replace('\n', " ")
}

pub fn split_words(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

pub fn split_sentences(text: &str) -> Vec<&str> {
    sentence_end_re()
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn split_paragraphs(text: &str) -> Vec<&str> {
    paragraph_break_re()
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Crude syllable estimate: one per three letters, at least one per word.
pub fn estimate_syllables(word: &str) -> usize {
    let letters = word.chars().filter(|c| c.is_alphabetic()).count();
    (letters / 3).max(1)
}

fn normalize_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase()
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation() || matches!(c, '¿' | '¡' | '«' | '»' | '…' | '–' | '—')
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Compute the fixed feature set for a text sample. Never fails; degenerate
/// input yields zero ratios.
pub fn extract_features(text: &str) -> TextFeatures {
    let words = split_words(text);
    let word_count = words.len();
    let sentence_count = split_sentences(text).len();
    let paragraph_count = split_paragraphs(text).len();

    let mut freq: HashMap<String, usize> = HashMap::new();
    for w in &words {
        let norm = normalize_word(w);
        if !norm.is_empty() {
            *freq.entry(norm).or_insert(0) += 1;
        }
    }
    let unique_word_count = freq.len();
    let max_freq = freq.values().copied().max().unwrap_or(0);

    let total_chars = text.chars().count();
    let punct_count = text.chars().filter(|c| is_punctuation(*c)).count();
    let upper_count = text.chars().filter(|c| c.is_uppercase()).count();

    let total_word_chars: usize = words.iter().map(|w| w.chars().count()).sum();
    let total_syllables: usize = words.iter().map(|w| estimate_syllables(w)).sum();

    let average_words_per_sentence = ratio(word_count as f64, sentence_count as f64);
    let average_syllables_per_word = ratio(total_syllables as f64, word_count as f64);

    TextFeatures {
        word_count,
        sentence_count,
        paragraph_count,
        average_words_per_sentence,
        average_sentences_per_paragraph: ratio(sentence_count as f64, paragraph_count as f64),
        unique_word_count,
        vocabulary_diversity: ratio(unique_word_count as f64, word_count as f64),
        average_word_length: ratio(total_word_chars as f64, word_count as f64),
        punctuation_density: ratio(punct_count as f64, total_chars as f64),
        capitalization_ratio: ratio(upper_count as f64, total_chars as f64),
        has_repetitive_patterns: ratio(max_freq as f64, word_count as f64) > REPETITION_SHARE,
        has_unusual_transitions: connective_re().is_match(text),
        complexity_score: 0.39 * average_words_per_sentence + 11.8 * average_syllables_per_word
            - 15.59,
    }
}
