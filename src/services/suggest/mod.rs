//! Translation suggestions: a provider call behind a shared, persisted cache.

pub mod cache;
pub mod hash;
pub mod provider;
pub mod soften;

use std::sync::{Mutex, MutexGuard};

use cache::SuggestionCache;
use provider::SuggestionProvider;

pub struct Suggester {
    cache: Mutex<SuggestionCache>,
    provider: Option<Box<dyn SuggestionProvider>>,
}

impl Suggester {
    pub fn new(cache: SuggestionCache, provider: Option<Box<dyn SuggestionProvider>>) -> Self {
        Self {
            cache: Mutex::new(cache),
            provider,
        }
    }

    /// No provider: only what is already cached is ever returned.
    pub fn offline(cache: SuggestionCache) -> Self {
        Self::new(cache, None)
    }

    pub fn is_online(&self) -> bool {
        self.provider.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, SuggestionCache> {
        // A worker that panicked mid-insert leaves a usable map behind.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn suggest(&self, source_text: &str, source_lang: &str, target_lang: &str) -> Option<String> {
        let key = hash::hash_source(source_text);

        if let Some(hit) = self.lock().get(&key) {
            return Some(hit.to_string());
        }

        let provider = self.provider.as_ref()?;

        // The lock is not held across the provider call.
        let raw = match provider.translate(source_text, source_lang, target_lang) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!("suggestion unavailable: {e}");
                return None;
            }
        };

        let suggestion = soften::soften(&raw);
        if suggestion.is_empty() {
            return None;
        }

        let mut cache = self.lock();
        if cache.insert(key, suggestion.clone()) {
            if let Err(e) = cache.save() {
                tracing::warn!("failed to persist suggestion cache: {e}");
            }
        }

        Some(suggestion)
    }

    /// Writes pending entries out. Called once when a run ends.
    pub fn flush(&self) {
        let mut cache = self.lock();
        if !cache.is_dirty() {
            return;
        }
        if let Err(e) = cache.save() {
            tracing::warn!("failed to persist suggestion cache: {e}");
        }
    }

    pub fn cached(&self) -> usize {
        self.lock().len()
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::testing::{EchoProvider, FailingProvider};
    use super::*;

    #[test]
    fn test_cache_hit_skips_provider() {
        let provider = EchoProvider::default();
        let calls = provider.calls.clone();
        let suggester = Suggester::new(SuggestionCache::in_memory(), Some(Box::new(provider)));

        let first = suggester.suggest("ただいま", "ja", "en");
        let second = suggester.suggest("ただいま", "ja", "en");

        assert_eq!(first.as_deref(), Some("MT: ただいま"));
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(suggester.cached(), 1);
    }

    #[test]
    fn test_provider_failure_is_swallowed() {
        let suggester = Suggester::new(SuggestionCache::in_memory(), Some(Box::new(FailingProvider)));
        assert_eq!(suggester.suggest("ただいま", "ja", "en"), None);
        assert_eq!(suggester.cached(), 0);
    }

    #[test]
    fn test_offline_returns_cached_only() {
        let mut cache = SuggestionCache::in_memory();
        cache.insert(hash::hash_source("はい"), "Yeah".into());
        let suggester = Suggester::offline(cache);

        assert!(!suggester.is_online());
        assert_eq!(suggester.suggest("はい", "ja", "en").as_deref(), Some("Yeah"));
        assert_eq!(suggester.suggest("いいえ", "ja", "en"), None);
    }

    #[test]
    fn test_shared_across_threads() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("suggestions.json");
        let provider = EchoProvider::default();
        let calls = provider.calls.clone();
        let suggester = Suggester::new(SuggestionCache::load(&path), Some(Box::new(provider)));

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let suggester = &suggester;
                scope.spawn(move || {
                    for i in 0..25 {
                        let text = format!("台詞{worker}-{i}");
                        assert_eq!(
                            suggester.suggest(&text, "ja", "en"),
                            Some(format!("MT: {text}"))
                        );
                    }
                });
            }
        });
        suggester.flush();

        assert_eq!(calls.load(Ordering::SeqCst), 200);
        assert_eq!(suggester.cached(), 200);
        assert_eq!(SuggestionCache::load(&path).len(), 200);
    }

    #[test]
    fn test_periodic_and_final_flush() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("suggestions.json");
        let suggester = Suggester::new(
            SuggestionCache::load(&path),
            Some(Box::new(EchoProvider::default())),
        );

        for i in 0..cache::FLUSH_EVERY {
            suggester.suggest(&format!("行{i}"), "ja", "en");
        }
        assert_eq!(SuggestionCache::load(&path).len(), cache::FLUSH_EVERY);

        suggester.suggest("最後", "ja", "en");
        assert_eq!(SuggestionCache::load(&path).len(), cache::FLUSH_EVERY);
        suggester.flush();
        assert_eq!(SuggestionCache::load(&path).len(), cache::FLUSH_EVERY + 1);
    }
}
