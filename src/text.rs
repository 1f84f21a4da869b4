use once_cell::sync::Lazy;
use regex::Regex;

/// Runs of Hiragana, Katakana (incl. half-width) and Kanji.
pub static JAPANESE_RUN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\u{3040}-\u{309F}\u{30A0}-\u{30FF}\u{3400}-\u{4DBF}\u{4E00}-\u{9FFF}\u{FF66}-\u{FF9F}]+")
        .expect("japanese run regex")
});

pub fn is_japanese(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{309F}'
        | '\u{30A0}'..='\u{30FF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{FF66}'..='\u{FF9F}')
}

pub fn contains_japanese(text: &str) -> bool {
    text.chars().any(is_japanese)
}

pub fn contains_latin(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_alphabetic())
}

/// Length in characters, the unit every threshold here is expressed in.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_japanese() {
        assert!(contains_japanese("これは"));
        assert!(contains_japanese("カタカナ"));
        assert!(contains_japanese("漢字"));
        assert!(contains_japanese("ｱｲｳ"));
        assert!(!contains_japanese("It's raining"));
        // CJK punctuation alone is not dialogue
        assert!(!contains_japanese("。、「」"));
    }

    #[test]
    fn test_run_regex_splits_on_latin() {
        let runs: Vec<_> = JAPANESE_RUN_RE
            .find_iter("He said あいう and 漢字")
            .map(|m| m.as_str())
            .collect();
        assert_eq!(runs, vec!["あいう", "漢字"]);
    }

    #[test]
    fn test_char_len() {
        assert_eq!(char_len("これは雨だ"), 5);
        assert_eq!(char_len("It's raining"), 12);
    }
}
