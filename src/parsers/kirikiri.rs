//! Dialogue extraction for KiriKiri/KAG-style scripts (`.ks`, `.tjs`, plain `.txt`).
//!
//! Engine markup and code lines are dropped, inline control tags are stripped,
//! and every remaining spoken line gets an identity used later for pairing.

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CoreError, Result};
use crate::model::entry::{DialogueSet, IdentityPolicy};
use crate::services::encoding;
use crate::text::{char_len, contains_japanese, contains_latin};

/// Inline tags that live inside dialogue and are safe to strip.
pub const INLINE_TAGS: &[&str] = &[
    "r", "np", "cm", "l", "p", "er", "lr", "resetfont", "font", "wait", "quake", "se", "delay",
    "nowait", "rclick", "image", "layopt", "trans", "wt", "wa", "eval",
];

const MARKER_TOKEN: &str = r"(p|l|line|msg|dialog|mes)(\d*)";

static MARKER_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // ; msg12   // line 3   # p
        format!(r"(?i)^\s*(?:;|//|#|\*)\s*{MARKER_TOKEN}\b"),
        // [msg12]  [line id=3]
        format!(r"(?i)^\s*\[{MARKER_TOKEN}(?:\s[^\]]*)?\]"),
        // msg12: ...   mes001 ...
        format!(r"(?i)^\s*{MARKER_TOKEN}\s*[:：]"),
        r"(?i)^\s*(p|l|line|msg|dialog|mes)(\d+)(?:\s|$)".to_string(),
    ]
    .iter()
    .map(|p| Regex::new(p).expect("marker regex"))
    .collect()
});

static CODE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^[@#*;]",
        r"^[A-Za-z_][\w.]*\s*=[^=]",
        r"^[{}]\s*;?$",
        r"^(?:if|elsif|else|endif|macro|endmacro|call|jump|return|iscript|endscript)\b(?:\s*[({;]|\s*$|\s+\w+\s*=)",
        r"^(?:kag|tf|sf|f|global|System|Storages|Scripts|Debug)\.\w",
        r"^//",
        r"^(?:function|var)\s",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("code regex"))
    .collect()
});

static LEADING_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[\s*([A-Za-z_][\w.]*)").expect("leading tag regex"));

static INLINE_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\[(?:{})(?:\s[^\]]*)?\]", INLINE_TAGS.join("|")))
        .expect("inline tag regex")
});

static EMB_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[emb\s+exp=[^\]]*\]").expect("emb regex"));

static QUOTES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"["“”「」『』]"#).expect("quote regex"));

/// Marker token of the line and what follows the marker. A comment-form
/// marker keeps the whole line so it is still classified as code.
fn split_marker(line: &str) -> Option<(String, &str)> {
    MARKER_RES.iter().enumerate().find_map(|(i, re)| {
        re.captures(line).map(|caps| {
            let token = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let digits = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let rest = match (i, caps.get(0)) {
                (0, _) | (_, None) => line,
                (_, Some(m)) => &line[m.end()..],
            };
            (format!("{}{}", token.to_lowercase(), digits), rest)
        })
    })
}

/// Marker token of the line, if it opens a dialogue block.
pub fn detect_marker(line: &str) -> Option<String> {
    split_marker(line).map(|(token, _)| token)
}

pub fn is_code_line(line: &str) -> bool {
    let logical = line.trim();

    if char_len(logical) < 2 {
        return true;
    }

    if let Some(caps) = LEADING_TAG_RE.captures(logical) {
        let tag = caps[1].to_lowercase();
        if tag != "emb" && !INLINE_TAGS.contains(&tag.as_str()) {
            return true;
        }
    }

    CODE_RES.iter().any(|re| re.is_match(logical))
}

/// Strips inline markup and quote glyphs from a dialogue line.
pub fn clean_line(line: &str) -> String {
    let s = INLINE_TAG_RE.replace_all(line, "");
    let s = EMB_RE.replace_all(&s, "");
    let s = QUOTES_RE.replace_all(&s, "");
    s.trim().to_string()
}

fn is_dialogue(cleaned: &str) -> bool {
    char_len(cleaned) >= 2 && (contains_japanese(cleaned) || contains_latin(cleaned))
}

pub fn extract_text(text: &str, policy: IdentityPolicy) -> DialogueSet {
    let mut set = DialogueSet::new(policy);
    let mut current_marker: Option<String> = None;

    for (i, line) in text.lines().enumerate() {
        let ln = i + 1;
        let line = line.trim_end_matches('\r');

        let line = match split_marker(line) {
            Some((token, rest)) => {
                current_marker = Some(format!("{token}:{ln}"));
                rest
            }
            None => line,
        };

        if is_code_line(line) {
            continue;
        }

        let cleaned = clean_line(line);
        if !is_dialogue(&cleaned) {
            continue;
        }

        let identity = current_marker.clone().unwrap_or_else(|| ln.to_string());
        set.insert(identity, ln, cleaned);
    }

    set
}

/// Reads, decodes and extracts one script file.
pub fn read_dialogue(path: &Path, policy: IdentityPolicy) -> Result<DialogueSet> {
    let bytes = fs::read(path).map_err(|e| CoreError::io(path, e))?;
    let (resolved, text) = encoding::decode(&bytes);
    tracing::debug!(path = %path.display(), encoding = resolved.label, "decoded script");
    Ok(extract_text(&text, policy))
}

/// Like [`read_dialogue`], but a read failure only costs a warning.
pub fn extract_file(path: &Path, policy: IdentityPolicy) -> DialogueSet {
    match read_dialogue(path, policy) {
        Ok(set) => set,
        Err(e) => {
            tracing::warn!("{e}");
            DialogueSet::new(policy)
        }
    }
}
