use std::collections::HashSet;

use serde::Serialize;

use crate::model::entry::{DialogueEntry, DialogueSet};
use crate::model::report::MatchedPair;
use crate::text::{char_len, contains_japanese};

/// A fuzzy candidate must score strictly above this.
pub const MIN_SIMILARITY: f64 = 0.3;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub exact: usize,
    pub fuzzy: usize,
    pub dropped: usize,
}

/// Character-length ratio in `[0, 1]`; symmetric in its arguments.
pub fn length_similarity(a: &str, b: &str) -> f64 {
    let (la, lb) = (char_len(a), char_len(b));
    let longest = la.max(lb);
    if longest == 0 {
        return 0.0;
    }
    la.min(lb) as f64 / longest as f64
}

pub fn match_sets(source: &DialogueSet, translated: &DialogueSet) -> Vec<MatchedPair> {
    match_sets_with_stats(source, translated).0
}

pub fn match_sets_with_stats(
    source: &DialogueSet,
    translated: &DialogueSet,
) -> (Vec<MatchedPair>, MatchStats) {
    let mut pairs = Vec::new();
    let mut stats = MatchStats::default();
    let mut unmatched_source: Vec<&DialogueEntry> = Vec::new();

    for src in source.iter() {
        match translated.get(&src.identity) {
            Some(tl) => {
                push_pair(&mut pairs, src, tl);
                stats.exact += 1;
            }
            None => unmatched_source.push(src),
        }
    }

    let pool: Vec<&DialogueEntry> = translated
        .iter()
        .filter(|tl| !source.contains(&tl.identity))
        .filter(|tl| !contains_japanese(&tl.text))
        .collect();
    let mut taken: HashSet<usize> = HashSet::new();

    for src in unmatched_source {
        if !contains_japanese(&src.text) {
            stats.dropped += 1;
            continue;
        }

        let mut best: Option<(usize, f64)> = None;
        for (i, candidate) in pool.iter().enumerate() {
            if taken.contains(&i) {
                continue;
            }
            let score = length_similarity(&src.text, &candidate.text);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }

        match best {
            Some((i, score)) if score > MIN_SIMILARITY => {
                taken.insert(i);
                push_pair(&mut pairs, src, pool[i]);
                stats.fuzzy += 1;
            }
            _ => stats.dropped += 1,
        }
    }

    (pairs, stats)
}

fn push_pair(pairs: &mut Vec<MatchedPair>, src: &DialogueEntry, tl: &DialogueEntry) {
    // Pairs without source text never reach the analyzer
    if src.text.trim().is_empty() {
        return;
    }
    pairs.push(MatchedPair {
        identity: src.identity.clone(),
        source_line: src.line_number,
        source_text: src.text.clone(),
        translated_line: tl.line_number,
        translated_text: tl.text.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entry::IdentityPolicy;
    use pretty_assertions::assert_eq;

    fn set(items: &[(&str, usize, &str)]) -> DialogueSet {
        let mut s = DialogueSet::new(IdentityPolicy::LastWins);
        for (id, ln, text) in items {
            s.insert(id.to_string(), *ln, text.to_string());
        }
        s
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let a = "これは雨だ";
        let b = "It's raining";
        assert_eq!(length_similarity(a, b), length_similarity(b, a));
        assert!((length_similarity(a, b) - 5.0 / 12.0).abs() < 1e-9);
        assert_eq!(length_similarity("", ""), 0.0);
    }

    #[test]
    fn test_exact_identity_match() {
        let src = set(&[("1", 1, "おはよう"), ("2", 2, "こんにちは")]);
        let tl = set(&[("2", 2, "Hello"), ("1", 1, "Good morning")]);
        let pairs = match_sets(&src, &tl);

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].identity, "1");
        assert_eq!(pairs[0].translated_text, "Good morning");
        assert_eq!(pairs[1].translated_text, "Hello");
    }

    #[test]
    fn test_fuzzy_match_when_identities_drift() {
        let src = set(&[("3", 3, "これは雨だ")]);
        let tl = set(&[("4", 4, "It's raining")]);
        let (pairs, stats) = match_sets_with_stats(&src, &tl);

        assert_eq!(stats, MatchStats { exact: 0, fuzzy: 1, dropped: 0 });
        assert_eq!(pairs[0].identity, "3");
        assert_eq!(pairs[0].source_line, 3);
        assert_eq!(pairs[0].translated_line, 4);
        assert_eq!(pairs[0].translated_text, "It's raining");
    }

    #[test]
    fn test_exact_wins_over_fuzzy() {
        let src = set(&[("1", 1, "はい"), ("2", 2, "これは雨だ")]);
        let tl = set(&[("1", 1, "Yes"), ("9", 9, "It's raining")]);
        let pairs = match_sets(&src, &tl);

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].translated_text, "Yes");
        assert_eq!(pairs[1].translated_text, "It's raining");
    }

    #[test]
    fn test_fuzzy_never_pairs_japanese_translation() {
        let src = set(&[("1", 1, "これは雨だ")]);
        let tl = set(&[("5", 5, "これは雨だ")]);
        let pairs = match_sets(&src, &tl);
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_latin_only_source_is_skipped() {
        let src = set(&[("1", 1, "BGM01")]);
        let tl = set(&[("2", 2, "BGM01")]);
        let (pairs, stats) = match_sets_with_stats(&src, &tl);
        assert!(pairs.is_empty());
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_below_threshold_is_dropped() {
        let src = set(&[("1", 1, "あ、")]);
        let tl = set(&[("2", 2, "A very long sentence about nothing")]);
        assert!(match_sets(&src, &tl).is_empty());
    }

    #[test]
    fn test_candidates_are_not_reused() {
        let src = set(&[("1", 1, "雨だね"), ("2", 2, "晴れた")]);
        let tl = set(&[("7", 7, "Wet"), ("8", 8, "Rain!")]);
        let pairs = match_sets(&src, &tl);

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].translated_line, 7);
        assert_eq!(pairs[1].translated_line, 8);
    }

    #[test]
    fn test_ties_go_to_first_scanned() {
        let src = set(&[("1", 1, "雨だね")]);
        let tl = set(&[("7", 7, "Rain"), ("8", 8, "Snow")]);
        let pairs = match_sets(&src, &tl);
        assert_eq!(pairs[0].translated_line, 7);
    }
}
