use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::model::entry::IdentityPolicy;
use crate::services::pipeline::{ScanOptions, DEFAULT_BATCH_SIZE, DEFAULT_WORKERS};
use crate::services::suggest::cache::{self, write_atomic, SuggestionCache};
use crate::services::suggest::provider::{ChatProvider, ProviderConfig, SuggestionProvider};
use crate::services::suggest::Suggester;

fn default_source_language() -> String {
    "ja".to_string()
}

fn default_target_language() -> String {
    "en".to_string()
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct QaConfig {
    #[serde(default, alias = "source_lang")]
    pub source_language: String,

    #[serde(default, alias = "target_lang")]
    pub target_language: String,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub identity_policy: IdentityPolicy,

    #[serde(default)]
    pub cache_path: Option<PathBuf>,

    #[serde(default)]
    pub provider: Option<ProviderConfig>,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            source_language: default_source_language(),
            target_language: default_target_language(),
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            identity_policy: IdentityPolicy::LastWins,
            cache_path: None,
            provider: None,
        }
    }
}

impl QaConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        let cfg: QaConfig = serde_json::from_str(&data)?;
        cfg.normalized()
    }

    /// Loads `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<QaConfig> {
        let cfg = self.clone().normalized()?;
        let json = serde_json::to_string_pretty(&cfg)?;
        write_atomic(path, json.as_bytes())?;
        Ok(cfg)
    }

    /// Fills empty fields with defaults and rejects values a scan cannot run with.
    pub fn normalized(mut self) -> Result<Self> {
        if self.source_language.trim().is_empty() {
            self.source_language = default_source_language();
        }
        if self.target_language.trim().is_empty() {
            self.target_language = default_target_language();
        }
        if self.workers == 0 {
            return Err(CoreError::Config("workers must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(CoreError::Config("batch_size must be at least 1".into()));
        }
        if let Some(p) = &self.provider {
            if p.provider.trim().is_empty() || p.model.trim().is_empty() {
                return Err(CoreError::Config(
                    "provider.provider and provider.model are required".into(),
                ));
            }
        }
        Ok(self)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_path.clone().unwrap_or_else(cache::default_cache_path)
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            workers: self.workers,
            batch_size: self.batch_size,
            identity_policy: self.identity_policy,
            source_lang: self.source_language.clone(),
        }
    }

    /// Loads the suggestion cache and connects the provider, if one is configured.
    /// A provider that cannot be built leaves the suggester offline.
    pub fn build_suggester(&self, offline: bool) -> Suggester {
        let cache = SuggestionCache::load(self.cache_path());

        let provider: Option<Box<dyn SuggestionProvider>> = match &self.provider {
            Some(p) if !offline => match ChatProvider::new(p) {
                Ok(chat) => Some(Box::new(chat)),
                Err(e) => {
                    tracing::warn!("suggestions disabled: {e}");
                    None
                }
            },
            _ => None,
        };

        Suggester::new(cache, provider)
    }
}
