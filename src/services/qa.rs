//! Defect analysis of one matched pair.
//!
//! Rules run in a fixed priority order and the first one that fires decides the
//! result; a pair no rule objects to is `Ok`.

use std::panic;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::report::{AnalysisResult, DefectKind, Highlight, HighlightColor, MatchedPair};
use crate::services::suggest::Suggester;
use crate::text::JAPANESE_RUN_RE;

pub const FIX_SYMBOLS: &str = "Fix symbols";
pub const USE_CASUAL: &str = "Use casual language";

pub const FORMAL_WORDS: &[&str] = &[
    "therefore",
    "thus",
    "consequently",
    "furthermore",
    "moreover",
    "nevertheless",
    "henceforth",
    "wherein",
    "hereby",
    "whilst",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gender {
    Male,
    Female,
}

const PRONOUNS: &[(&str, Gender)] = &[
    ("he", Gender::Male),
    ("his", Gender::Male),
    ("she", Gender::Female),
    ("her", Gender::Female),
];

static PRONOUN_RES: Lazy<Vec<(Regex, Gender)>> = Lazy::new(|| {
    PRONOUNS
        .iter()
        .map(|(p, g)| (Regex::new(&format!(r"(?i)\b{p}\b")).expect("pronoun regex"), *g))
        .collect()
});

static FORMAL_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    FORMAL_WORDS
        .iter()
        .map(|w| Regex::new(&format!(r"(?i)\b{w}\b")).expect("formal regex"))
        .collect()
});

// 彼 on its own, not the first half of 彼女
static MALE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"彼(?:[^女]|$)").expect("male regex"));

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\w+\]").expect("tag regex"));

static QUOTE_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["“”„'‘’「」『』]{3,}"#).expect("quote run regex"));

static TERMINATOR_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[。！？]{2,}").expect("terminator run regex"));

/// Where the suggestion of a finding comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionSource {
    Provider,
    Fixed(&'static str),
    ProviderOr(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub kind: DefectKind,
    pub severity: u8,
    pub highlights: Vec<Highlight>,
    pub suggestion: SuggestionSource,
}

type Check = fn(&str, &str) -> Option<(Vec<Highlight>, SuggestionSource)>;

struct Rule {
    kind: DefectKind,
    severity: u8,
    check: Check,
}

static RULES: &[Rule] = &[
    Rule {
        kind: DefectKind::NotTranslated,
        severity: 3,
        check: check_not_translated,
    },
    Rule {
        kind: DefectKind::LeftoverSource,
        severity: 3,
        check: check_leftover_source,
    },
    Rule {
        kind: DefectKind::PronounMismatch,
        severity: 2,
        check: check_pronouns,
    },
    Rule {
        kind: DefectKind::SymbolAnomaly,
        severity: 2,
        check: check_symbols,
    },
    Rule {
        kind: DefectKind::TooFormal,
        severity: 1,
        check: check_formal,
    },
];

/// Runs the rule chain. `None` means no defect.
pub fn classify(source: &str, translated: &str) -> Option<Finding> {
    RULES.iter().find_map(|rule| {
        (rule.check)(source, translated).map(|(highlights, suggestion)| Finding {
            kind: rule.kind,
            severity: rule.severity,
            highlights,
            suggestion,
        })
    })
}

fn check_not_translated(_: &str, translated: &str) -> Option<(Vec<Highlight>, SuggestionSource)> {
    translated
        .trim()
        .is_empty()
        .then(|| (Vec::new(), SuggestionSource::Provider))
}

fn check_leftover_source(
    _: &str,
    translated: &str,
) -> Option<(Vec<Highlight>, SuggestionSource)> {
    let highlights: Vec<Highlight> = JAPANESE_RUN_RE
        .find_iter(translated)
        .map(|m| Highlight::from_bytes(translated, m.start(), m.end(), HighlightColor::Critical))
        .collect();

    (!highlights.is_empty()).then_some((highlights, SuggestionSource::Provider))
}

fn check_pronouns(source: &str, translated: &str) -> Option<(Vec<Highlight>, SuggestionSource)> {
    let male = MALE_RE.is_match(source);
    let female = source.contains("彼女");

    let mut highlights: Vec<Highlight> = PRONOUN_RES
        .iter()
        .filter(|(_, gender)| match gender {
            Gender::Male => female && !male,
            Gender::Female => male && !female,
        })
        .filter_map(|(re, _)| re.find(translated))
        .map(|m| Highlight::from_bytes(translated, m.start(), m.end(), HighlightColor::Warning))
        .collect();
    highlights.sort_by_key(|h| h.start);

    (!highlights.is_empty()).then_some((highlights, SuggestionSource::Provider))
}

fn check_symbols(_: &str, translated: &str) -> Option<(Vec<Highlight>, SuggestionSource)> {
    let tags: Vec<(usize, usize)> = TAG_RE
        .find_iter(translated)
        .map(|m| (m.start(), m.end()))
        .collect();

    let mut spans: Vec<(usize, usize)> = translated
        .char_indices()
        .filter(|(_, c)| *c == '[' || *c == ']')
        .map(|(i, _)| i)
        .filter(|i| !tags.iter().any(|(s, e)| i >= s && i < e))
        .map(|i| (i, i + 1))
        .collect();

    spans.extend(QUOTE_RUN_RE.find_iter(translated).map(|m| (m.start(), m.end())));
    spans.extend(TERMINATOR_RUN_RE.find_iter(translated).map(|m| (m.start(), m.end())));
    spans.sort_unstable();
    spans.dedup();

    let highlights: Vec<Highlight> = spans
        .into_iter()
        .map(|(s, e)| Highlight::from_bytes(translated, s, e, HighlightColor::Warning))
        .collect();

    (!highlights.is_empty()).then_some((highlights, SuggestionSource::Fixed(FIX_SYMBOLS)))
}

fn check_formal(_: &str, translated: &str) -> Option<(Vec<Highlight>, SuggestionSource)> {
    let mut highlights: Vec<Highlight> = FORMAL_RES
        .iter()
        .filter_map(|re| re.find(translated))
        .map(|m| Highlight::from_bytes(translated, m.start(), m.end(), HighlightColor::Info))
        .collect();
    highlights.sort_by_key(|h| h.start);

    (!highlights.is_empty()).then_some((highlights, SuggestionSource::ProviderOr(USE_CASUAL)))
}

/// Classifies pairs and attaches suggestions for one language direction.
pub struct Analyzer {
    suggester: Arc<Suggester>,
    source_lang: String,
    target_lang: String,
}

impl Analyzer {
    pub fn new(suggester: Arc<Suggester>, source_lang: &str, target_lang: &str) -> Self {
        Self {
            suggester,
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
        }
    }

    pub fn suggester(&self) -> &Arc<Suggester> {
        &self.suggester
    }

    pub fn analyze(&self, source: &str, translated: &str) -> AnalysisResult {
        let finding = match panic::catch_unwind(|| classify(source, translated)) {
            Ok(f) => f,
            Err(_) => {
                tracing::error!("analysis failed for {source:?}; treating pair as ok");
                None
            }
        };

        let Some(finding) = finding else {
            return AnalysisResult::ok();
        };

        let suggestion = match finding.suggestion {
            SuggestionSource::Provider => self.suggest(source),
            SuggestionSource::Fixed(text) => Some(text.to_string()),
            SuggestionSource::ProviderOr(fallback) => {
                self.suggest(source).or_else(|| Some(fallback.to_string()))
            }
        };

        AnalysisResult {
            kind: finding.kind,
            severity: finding.severity,
            suggestion,
            highlights: finding.highlights,
        }
    }

    pub fn analyze_pair(&self, pair: &MatchedPair) -> AnalysisResult {
        self.analyze(&pair.source_text, &pair.translated_text)
    }

    fn suggest(&self, source: &str) -> Option<String> {
        self.suggester
            .suggest(source, &self.source_lang, &self.target_lang)
    }
}
