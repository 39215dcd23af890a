use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

/// CORS origins handed to the backend through its environment.
///
/// Cloning shares the underlying set, so origins added at runtime are
/// picked up by the next launch.
#[derive(Debug, Clone, Default)]
pub struct AllowedOrigins {
    origins: Arc<RwLock<BTreeSet<String>>>,
}

impl AllowedOrigins {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = origins
            .into_iter()
            .map(|o| {
                let o: String = o.into();
                o.trim().trim_end_matches('/').to_string()
            })
            .filter(|o| !o.is_empty())
            .collect();
        Self {
            origins: Arc::new(RwLock::new(set)),
        }
    }

    /// Add an origin. Returns false if it was already present.
    pub fn insert(&self, origin: &str) -> bool {
        let origin = origin.trim().trim_end_matches('/');
        if origin.is_empty() {
            return false;
        }
        self.origins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(origin.to_string())
    }

    pub fn contains(&self, origin: &str) -> bool {
        self.origins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(origin.trim_end_matches('/'))
    }

    pub fn len(&self) -> usize {
        self.origins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Comma-joined value for the backend environment.
    pub fn to_env_value(&self) -> String {
        self.origins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(",")
    }
}
