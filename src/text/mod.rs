//! Post-transcription text transformations
//!
//! Applied to final results only, in this order:
//! 1. Spoken punctuation ("period" -> ".")
//! 2. Custom word replacements from the config
//! 3. Case mode (lowercase / uppercase / sentence)
//! 4. Prefix and suffix
//!
//! Partials are shown raw; they are about to be replaced anyway.

use crate::config::{CaseMode, TextConfig};
use regex::{NoExpand, Regex};

/// Spoken-word to symbol table. Longer phrases first so "question mark"
/// wins over "mark" style collisions.
const PUNCTUATION: &[(&str, &str)] = &[
    // Multi-word phrases first
    ("question mark", "?"),
    ("exclamation mark", "!"),
    ("exclamation point", "!"),
    ("open parenthesis", "("),
    ("close parenthesis", ")"),
    ("open paren", "("),
    ("close paren", ")"),
    ("open bracket", "["),
    ("close bracket", "]"),
    ("open brace", "{"),
    ("close brace", "}"),
    ("at sign", "@"),
    ("at symbol", "@"),
    ("dollar sign", "$"),
    ("percent sign", "%"),
    ("plus sign", "+"),
    ("equals sign", "="),
    ("forward slash", "/"),
    ("single quote", "'"),
    ("double quote", "\""),
    ("new paragraph", "\n\n"),
    ("new line", "\n"),
    // Single words
    ("period", "."),
    ("comma", ","),
    ("colon", ":"),
    ("semicolon", ";"),
    ("dash", "-"),
    ("hyphen", "-"),
    ("underscore", "_"),
    ("hash", "#"),
    ("hashtag", "#"),
    ("percent", "%"),
    ("ampersand", "&"),
    ("asterisk", "*"),
    ("plus", "+"),
    ("equals", "="),
    ("slash", "/"),
    ("backslash", "\\"),
    ("pipe", "|"),
    ("tilde", "~"),
    ("backtick", "`"),
    ("tab", "\t"),
];

/// Applies the configured transformations to transcribed text
///
/// All patterns are compiled once at construction; `process` runs per
/// final result.
pub struct TextProcessor {
    punctuation: Vec<(Regex, &'static str)>,
    replacements: Vec<(Regex, String)>,
    case: CaseMode,
    prefix: String,
    suffix: String,
}

impl TextProcessor {
    pub fn new(config: &TextConfig) -> Self {
        let punctuation = if config.spoken_punctuation {
            PUNCTUATION
                .iter()
                .filter_map(|(phrase, symbol)| word_pattern(phrase).map(|re| (re, *symbol)))
                .collect()
        } else {
            Vec::new()
        };

        let replacements = config
            .replacements
            .iter()
            .filter_map(|(word, replacement)| {
                word_pattern(word).map(|re| (re, replacement.clone()))
            })
            .collect();

        Self {
            punctuation,
            replacements,
            case: config.case,
            prefix: config.prefix.clone(),
            suffix: config.suffix.clone(),
        }
    }

    pub fn process(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut result = text.to_string();

        if !self.punctuation.is_empty() {
            for (re, symbol) in &self.punctuation {
                result = re.replace_all(&result, NoExpand(symbol)).into_owned();
            }
            result = clean_punctuation_spacing(&result);
        }

        for (re, replacement) in &self.replacements {
            result = re
                .replace_all(&result, NoExpand(replacement.as_str()))
                .into_owned();
        }

        result = match self.case {
            CaseMode::Normal => result,
            CaseMode::Lowercase => result.to_lowercase(),
            CaseMode::Uppercase => result.to_uppercase(),
            CaseMode::Sentence => sentence_case(&result),
        };

        if !self.prefix.is_empty() || !self.suffix.is_empty() {
            result = format!("{}{}{}", self.prefix, result, self.suffix);
        }

        result
    }
}

/// Case-insensitive whole-word pattern for a phrase
fn word_pattern(phrase: &str) -> Option<Regex> {
    let pattern = format!(r"(?i)\b{}\b", regex::escape(phrase));
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("Skipping unusable replacement '{}': {}", phrase, e);
            None
        }
    }
}

/// Uppercase the first letter of the text and of each sentence
///
/// Only raises case; acronyms and proper nouns elsewhere are left
/// alone.
fn sentence_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut capitalize_next = true;
    for c in text.chars() {
        if capitalize_next && c.is_alphabetic() {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
            if matches!(c, '.' | '!' | '?') {
                capitalize_next = true;
            }
        }
    }
    out
}

/// Clean up spacing around punctuation marks
fn clean_punctuation_spacing(text: &str) -> String {
    let mut result = text.to_string();

    // Remove space before punctuation that shouldn't have it
    for punct in ['.', ',', '?', '!', ':', ';', ')', ']', '}'] {
        result = result.replace(&format!(" {}", punct), &punct.to_string());
    }

    // Remove space after opening brackets
    for punct in ['(', '[', '{'] {
        result = result.replace(&format!("{} ", punct), &punct.to_string());
    }

    // Remove space before opening brackets (for function calls, array access, etc.)
    for punct in ['(', '[', '{'] {
        result = result.replace(&format!(" {}", punct), &punct.to_string());
    }

    // Symbols that attach to the neighboring word (emails, hashtags, prices)
    for sym in ['#', '@', '$'] {
        result = result.replace(&format!(" {}", sym), &sym.to_string());
        result = result.replace(&format!("{} ", sym), &sym.to_string());
    }

    // Remove spaces around newlines and tabs
    result = result.replace(" \n", "\n");
    result = result.replace("\n ", "\n");
    result = result.replace(" \t", "\t");
    result = result.replace("\t ", "\t");

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(spoken_punctuation: bool, replacements: &[(&str, &str)]) -> TextConfig {
        TextConfig {
            spoken_punctuation,
            replacements: replacements
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..TextConfig::default()
        }
    }

    #[test]
    fn test_spoken_punctuation_basic() {
        let processor = TextProcessor::new(&make_config(true, &[]));

        assert_eq!(processor.process("hello period"), "hello.");
        assert_eq!(processor.process("hello comma world"), "hello, world");
        assert_eq!(processor.process("what question mark"), "what?");
    }

    #[test]
    fn test_spoken_punctuation_multi_word() {
        let processor = TextProcessor::new(&make_config(true, &[]));

        assert_eq!(processor.process("open paren test close paren"), "(test)");
        assert_eq!(processor.process("hello exclamation mark"), "hello!");
    }

    #[test]
    fn test_spoken_punctuation_case_insensitive() {
        let processor = TextProcessor::new(&make_config(true, &[]));

        assert_eq!(processor.process("hello PERIOD"), "hello.");
        assert_eq!(processor.process("hello Period"), "hello.");
    }

    #[test]
    fn test_word_replacements() {
        let processor = TextProcessor::new(&make_config(false, &[("vox key", "voxkey")]));

        assert_eq!(
            processor.process("I use vox key for dictation"),
            "I use voxkey for dictation"
        );
    }

    #[test]
    fn test_word_replacements_case_insensitive() {
        let processor = TextProcessor::new(&make_config(false, &[("rust", "Rust")]));

        assert_eq!(processor.process("I love RUST"), "I love Rust");
        assert_eq!(processor.process("rust is great"), "Rust is great");
    }

    #[test]
    fn test_disabled_processing() {
        let processor = TextProcessor::new(&make_config(false, &[]));

        assert_eq!(processor.process("hello period"), "hello period");
    }

    #[test]
    fn test_combined_processing() {
        let processor = TextProcessor::new(&make_config(true, &[("voxkey", "Voxkey")]));

        assert_eq!(processor.process("I use voxkey period"), "I use Voxkey.");
    }

    #[test]
    fn test_developer_punctuation() {
        let processor = TextProcessor::new(&make_config(true, &[]));

        assert_eq!(
            processor.process("function open paren close paren"),
            "function()"
        );
        assert_eq!(
            processor.process("array open bracket close bracket"),
            "array[]"
        );
        assert_eq!(processor.process("hash include"), "#include");
        assert_eq!(processor.process("user at sign example"), "user@example");
    }

    #[test]
    fn test_newline_and_tab() {
        let processor = TextProcessor::new(&make_config(true, &[]));

        assert_eq!(
            processor.process("line one new line line two"),
            "line one\nline two"
        );
        assert_eq!(processor.process("col one tab col two"), "col one\tcol two");
    }

    #[test]
    fn test_replacement_with_dollar_is_literal() {
        let processor = TextProcessor::new(&make_config(false, &[("price", "$5")]));

        assert_eq!(processor.process("the price is right"), "the $5 is right");
    }

    #[test]
    fn test_case_modes() {
        let lower = TextProcessor::new(&TextConfig {
            case: CaseMode::Lowercase,
            ..TextConfig::default()
        });
        assert_eq!(lower.process("Hello World"), "hello world");

        let upper = TextProcessor::new(&TextConfig {
            case: CaseMode::Uppercase,
            ..TextConfig::default()
        });
        assert_eq!(upper.process("hello"), "HELLO");
    }

    #[test]
    fn test_sentence_case() {
        let processor = TextProcessor::new(&TextConfig {
            case: CaseMode::Sentence,
            ..TextConfig::default()
        });

        assert_eq!(
            processor.process("hello. world? yes! indeed"),
            "Hello. World? Yes! Indeed"
        );
        // Existing capitals are kept
        assert_eq!(processor.process("using NASA data"), "Using NASA data");
    }

    #[test]
    fn test_prefix_and_suffix() {
        let processor = TextProcessor::new(&TextConfig {
            suffix: " ".to_string(),
            ..TextConfig::default()
        });

        assert_eq!(processor.process("hello"), "hello ");
        // Empty input produces no output at all
        assert_eq!(processor.process(""), "");
    }
}
