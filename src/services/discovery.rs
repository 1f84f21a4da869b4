use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// File name endings recognized as script files.
pub const SCRIPT_EXTENSIONS: &[&str] = &[".ks", ".tjs", ".txt", ".ks.scn", ".txt.scn"];

pub fn is_script_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_lowercase();
    SCRIPT_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Relative path (with `/` separators) -> absolute path of every script under `root`.
pub fn collect_scripts(root: &Path) -> BTreeMap<String, PathBuf> {
    let mut files = BTreeMap::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                tracing::debug!("skipping unreadable entry: {err}");
                None
            }
        })
    {
        if !entry.file_type().is_file() || !is_script_file(entry.path()) {
            continue;
        }

        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        files.insert(rel, entry.path().to_path_buf());
    }

    files
}

/// A source script and its translated counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePair {
    pub relative: String,
    pub source: PathBuf,
    pub translated: PathBuf,
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub pairs: Vec<FilePair>,
    /// Source scripts with no translated counterpart.
    pub missing: Vec<String>,
    pub total_sources: usize,
}

/// Pairs every source script with the same relative path under `translated_root`.
pub fn pair_files(source_root: &Path, translated_root: &Path) -> Discovery {
    let sources = collect_scripts(source_root);
    let total = sources.len();
    let mut pairs = Vec::new();
    let mut missing = Vec::new();

    for (relative, source) in sources {
        let translated = translated_root.join(&relative);
        if translated.is_file() {
            pairs.push(FilePair {
                relative,
                source,
                translated,
            });
        } else {
            missing.push(relative);
        }
    }

    Discovery {
        pairs,
        missing,
        total_sources: total,
    }
}
