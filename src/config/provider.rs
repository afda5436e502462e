// mongobackup/src/config/provider.rs
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

use super::decoder::decode_environment_variable;

/// Source of configuration values by key.
pub trait ConfigProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    #[allow(dead_code)]
    fn has(&self, key: &str) -> bool;
}

/// Environment-backed provider with per-key base64 decoding and memoisation.
pub struct EnvironmentConfigProvider {
    variables: HashMap<String, String>,
    cache: Mutex<HashMap<(String, bool), Option<String>>>,
}

impl EnvironmentConfigProvider {
    /// Loads `.env` from the working directory (if any), then snapshots the
    /// process environment.
    pub fn load() -> Self {
        load_dotenv(Path::new(".env"));
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            variables: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Looks up `key`, decoding it unless `decode` is false or the key is plain text.
    pub fn get_with(&self, key: &str, decode: bool) -> Option<String> {
        let cache_key = (key.to_string(), decode);
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(value) = cache.get(&cache_key) {
            return value.clone();
        }

        let value = decode_environment_variable(
            key,
            self.variables.get(key).map(String::as_str),
            decode,
        );
        cache.insert(cache_key, value.clone());
        value
    }

    #[cfg(test)]
    fn cached_entries(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

impl ConfigProvider for EnvironmentConfigProvider {
    fn get(&self, key: &str) -> Option<String> {
        self.get_with(key, true)
    }

    fn has(&self, key: &str) -> bool {
        self.variables.get(key).is_some_and(|v| !v.is_empty())
    }
}

fn load_dotenv(path: &Path) {
    match dotenv::from_path(path) {
        Ok(()) => debug!("Loaded environment file {}", path.display()),
        Err(dotenv::Error::Io(_)) => debug!("No environment file at {}", path.display()),
        Err(e) => warn!("Environment file {} cannot be parsed: {}", path.display(), e),
    }
}
