use std::borrow::Cow;
use std::fs;
use std::path::Path;

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, SHIFT_JIS, UTF_8};
use serde::Serialize;

use crate::error::{CoreError, Result};

/// Only the head of a file is sniffed.
pub const SNIFF_LEN: usize = 8 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ResolvedEncoding {
    pub label: &'static str,
    pub encoding: &'static Encoding,
}

impl ResolvedEncoding {
    const UTF8: ResolvedEncoding = ResolvedEncoding {
        label: "utf-8",
        encoding: UTF_8,
    };

    /// Decodes the whole buffer; malformed sequences become U+FFFD.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let (text, _, _) = self.encoding.decode(bytes);
        text
    }
}

#[derive(Debug, Serialize)]
pub struct EncodingCandidate {
    pub name: String,
    pub confidence: f32,
}

#[derive(Debug, Serialize)]
pub struct EncodingDetectionResult {
    pub best: String,
    pub confidence: f32,
    pub candidates: Vec<EncodingCandidate>,
}

/// Picks a decoding for a script buffer. Never fails; falls back to UTF-8.
pub fn resolve(bytes: &[u8]) -> ResolvedEncoding {
    if bytes.is_empty() {
        return ResolvedEncoding::UTF8;
    }

    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return ResolvedEncoding {
            label: label_for(encoding),
            encoding,
        };
    }

    let truncated = bytes.len() > SNIFF_LEN;
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];

    // A cut in the middle of a multibyte char still counts as UTF-8.
    let valid = Encoding::utf8_valid_up_to(head);
    if valid == head.len() || (truncated && head.len() - valid < 4) {
        return ResolvedEncoding::UTF8;
    }

    let mut detector = EncodingDetector::new();
    detector.feed(head, !truncated);
    let encoding = detector.guess(None, true);

    ResolvedEncoding {
        label: label_for(encoding),
        encoding,
    }
}

/// Resolves and decodes in one go.
pub fn decode(bytes: &[u8]) -> (ResolvedEncoding, String) {
    let resolved = resolve(bytes);
    let text = resolved.decode(bytes).into_owned();
    (resolved, text)
}

fn label_for(encoding: &'static Encoding) -> &'static str {
    // encoding_rs' Shift_JIS is the Windows-31J superset.
    if encoding == SHIFT_JIS {
        return "cp932";
    }
    match encoding.name() {
        "UTF-8" => "utf-8",
        "UTF-16LE" => "utf-16le",
        "UTF-16BE" => "utf-16be",
        "EUC-JP" => "euc-jp",
        "ISO-2022-JP" => "iso-2022-jp",
        "Big5" => "big5",
        "EUC-KR" => "euc-kr",
        "GBK" => "gbk",
        "IBM866" => "ibm866",
        "KOI8-R" => "koi8-r",
        "KOI8-U" => "koi8-u",
        "ISO-8859-2" => "iso-8859-2",
        "ISO-8859-3" => "iso-8859-3",
        "ISO-8859-4" => "iso-8859-4",
        "ISO-8859-5" => "iso-8859-5",
        "ISO-8859-6" => "iso-8859-6",
        "ISO-8859-7" => "iso-8859-7",
        "ISO-8859-8" => "iso-8859-8",
        "ISO-8859-8-I" => "iso-8859-8-i",
        "ISO-8859-10" => "iso-8859-10",
        "ISO-8859-13" => "iso-8859-13",
        "ISO-8859-14" => "iso-8859-14",
        "ISO-8859-15" => "iso-8859-15",
        "ISO-8859-16" => "iso-8859-16",
        "" => "utf-8",
        // the remaining encoding_rs names are already lower-case
        other => other,
    }
}

pub fn detect_from_file(path: &Path) -> Result<EncodingDetectionResult> {
    let bytes = fs::read(path).map_err(|e| CoreError::io(path, e))?;
    Ok(detect_from_bytes(&bytes))
}

pub fn detect_from_bytes(bytes: &[u8]) -> EncodingDetectionResult {
    let resolved = resolve(bytes);
    let best = resolved.label.to_string();
    let confidence = estimate_confidence(bytes, resolved.encoding);

    let mut candidates = vec![EncodingCandidate {
        name: best.clone(),
        confidence,
    }];

    // Common ambiguities in VN scripts
    if best == "cp932" {
        candidates.push(EncodingCandidate {
            name: "shift_jis".into(),
            confidence: (confidence - 0.05).max(0.0),
        });
        candidates.push(EncodingCandidate {
            name: "euc-jp".into(),
            confidence: (confidence - 0.30).max(0.0),
        });
    }

    if best == "utf-8" && !bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        candidates.push(EncodingCandidate {
            name: "cp932".into(),
            confidence: (confidence - 0.40).max(0.0),
        });
    }

    EncodingDetectionResult {
        best,
        confidence,
        candidates,
    }
}

fn estimate_confidence(bytes: &[u8], encoding: &'static Encoding) -> f32 {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    let (text, _, had_errors) = encoding.decode(head);

    if had_errors {
        return 0.35;
    }

    let len = text.len();
    if len < 64 {
        0.55
    } else if len < 512 {
        0.70
    } else if len < 4096 {
        0.82
    } else {
        0.90
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "彼女は来た。「おはよう、今日はいい天気ですね」と彼は言った。\n\
                          それから二人は学校へ向かって歩き始めた。桜の花びらが舞っている。\n";

    #[test]
    fn test_empty_buffer_is_utf8() {
        assert_eq!(resolve(&[]).label, "utf-8");
    }

    #[test]
    fn test_utf8_japanese() {
        let resolved = resolve(SAMPLE.as_bytes());
        assert_eq!(resolved.label, "utf-8");
        assert_eq!(resolved.decode(SAMPLE.as_bytes()), SAMPLE);
    }

    #[test]
    fn test_shift_jis_normalizes_to_cp932() {
        let text = SAMPLE.repeat(8);
        let (bytes, _, _) = SHIFT_JIS.encode(&text);
        let (resolved, decoded) = decode(&bytes);
        assert_eq!(resolved.label, "cp932");
        assert_eq!(decoded, text);
    }

    #[test]
    fn test_bom_wins() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("テスト".as_bytes());
        let (resolved, decoded) = decode(&bytes);
        assert_eq!(resolved.label, "utf-8");
        assert_eq!(decoded, "テスト");
    }

    #[test]
    fn test_garbage_never_fails() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
        let (resolved, _) = decode(&bytes);
        assert!(!resolved.label.is_empty());
    }

    #[test]
    fn test_truncated_utf8_prefix() {
        let text = "あ".repeat(SNIFF_LEN);
        assert_eq!(resolve(text.as_bytes()).label, "utf-8");
    }

    #[test]
    fn test_detection_report_lists_candidates() {
        let text = SAMPLE.repeat(8);
        let (bytes, _, _) = SHIFT_JIS.encode(&text);
        let report = detect_from_bytes(&bytes);
        assert_eq!(report.best, "cp932");
        assert!(report.candidates.iter().any(|c| c.name == "shift_jis"));
    }

    #[test]
    fn test_labels_are_lower_case() {
        for encoding in [
            encoding_rs::GBK,
            encoding_rs::BIG5,
            encoding_rs::EUC_KR,
            encoding_rs::KOI8_R,
            encoding_rs::ISO_8859_5,
            encoding_rs::IBM866,
            encoding_rs::GB18030,
            encoding_rs::WINDOWS_1251,
            encoding_rs::MACINTOSH,
            encoding_rs::X_MAC_CYRILLIC,
        ] {
            let label = label_for(encoding);
            assert_eq!(label, label.to_lowercase(), "{}", encoding.name());
        }
        assert_eq!(label_for(encoding_rs::GBK), "gbk");
        assert_eq!(label_for(SHIFT_JIS), "cp932");
    }
}
