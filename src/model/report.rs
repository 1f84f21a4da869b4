use serde::{Deserialize, Serialize};

/// A source line paired with its translated counterpart.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MatchedPair {
    pub identity: String,
    pub source_line: usize,
    pub source_text: String,

    #[serde(default)]
    pub translated_line: usize,

    #[serde(default)]
    pub translated_text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum DefectKind {
    #[default]
    Ok,
    NotTranslated,
    LeftoverSource,
    PronounMismatch,
    SymbolAnomaly,
    TooFormal,
}

impl DefectKind {
    pub fn label(self) -> &'static str {
        match self {
            DefectKind::Ok => "OK",
            DefectKind::NotTranslated => "Not translated",
            DefectKind::LeftoverSource => "Leftover Japanese",
            DefectKind::PronounMismatch => "Pronoun mismatch",
            DefectKind::SymbolAnomaly => "Symbol anomaly",
            DefectKind::TooFormal => "Too formal",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HighlightColor {
    Critical,
    Warning,
    Info,
}

/// A span of the translated text to paint. Offsets count characters, not bytes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub color: HighlightColor,
}

impl Highlight {
    /// Builds a highlight from a byte range of `haystack`.
    pub fn from_bytes(haystack: &str, start: usize, end: usize, color: HighlightColor) -> Self {
        let char_start = haystack[..start].chars().count();
        let text = haystack[start..end].to_string();
        let char_end = char_start + text.chars().count();
        Self {
            text,
            start: char_start,
            end: char_end,
            color,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct AnalysisResult {
    pub kind: DefectKind,
    pub severity: u8,

    #[serde(default)]
    pub suggestion: Option<String>,

    #[serde(default)]
    pub highlights: Vec<Highlight>,
}

impl AnalysisResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn is_defect(&self) -> bool {
        self.severity > 0
    }
}

/// One reported defect, with everything the export table needs.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DefectRecord {
    pub file: String,
    pub source_line: usize,
    pub translated_line: usize,
    pub kind: DefectKind,
    pub severity: u8,
    pub source_text: String,
    pub translated_text: String,

    #[serde(default)]
    pub suggestion: Option<String>,

    #[serde(default)]
    pub highlights: Vec<Highlight>,
}

impl DefectRecord {
    pub const EXPORT_COLUMNS: [&'static str; 8] = [
        "File",
        "Source Line",
        "Translated Line",
        "Issue",
        "Source Text",
        "Translated Text",
        "Suggestion",
        "Severity",
    ];

    pub fn new(file: &str, pair: &MatchedPair, result: AnalysisResult) -> Self {
        Self {
            file: file.to_string(),
            source_line: pair.source_line,
            translated_line: pair.translated_line,
            kind: result.kind,
            severity: result.severity,
            source_text: pair.source_text.clone(),
            translated_text: pair.translated_text.clone(),
            suggestion: result.suggestion,
            highlights: result.highlights,
        }
    }

    /// Values in `EXPORT_COLUMNS` order.
    pub fn export_row(&self) -> [String; 8] {
        [
            self.file.clone(),
            self.source_line.to_string(),
            self.translated_line.to_string(),
            self.kind.label().to_string(),
            self.source_text.clone(),
            self.translated_text.clone(),
            self.suggestion.clone().unwrap_or_default(),
            self.severity.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_offsets_count_chars() {
        let text = "これは彼のだ (pending)";
        let byte_start = text.find('(').unwrap();
        let h = Highlight::from_bytes(text, byte_start, text.len(), HighlightColor::Info);
        assert_eq!(h.start, 7);
        assert_eq!(h.end, 16);
        assert_eq!(h.text, "(pending)");
    }

    #[test]
    fn test_export_row_follows_columns() {
        let pair = MatchedPair {
            identity: "3".into(),
            source_line: 3,
            source_text: "ただいま".into(),
            translated_line: 4,
            translated_text: "I have returned".into(),
        };
        let result = AnalysisResult {
            kind: DefectKind::TooFormal,
            severity: 1,
            suggestion: None,
            highlights: Vec::new(),
        };
        let record = DefectRecord::new("scenario/a.ks", &pair, result);
        let row = record.export_row();

        assert_eq!(row.len(), DefectRecord::EXPORT_COLUMNS.len());
        assert_eq!(row[0], "scenario/a.ks");
        assert_eq!(row[3], "Too formal");
        assert_eq!(row[6], "");
        assert_eq!(row[7], "1");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let v = serde_json::to_value(DefectKind::LeftoverSource).unwrap();
        assert_eq!(v, serde_json::json!("leftover_source"));
    }
}
