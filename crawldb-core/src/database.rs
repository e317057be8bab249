//! Named database handles.

use crate::{
    backend::{Namespace, StoreBackend},
    collection::Collection,
    context::ExecutionContext,
    error::StoreResult,
};

/// Database name used when neither the caller nor the configuration names one.
pub const DEFAULT_DATABASE: &str = "test";

/// Picks the database name: explicit, then configured, then [`DEFAULT_DATABASE`].
pub fn resolve_database_name(explicit: Option<&str>, configured: Option<&str>) -> String {
    explicit
        .filter(|name| !name.is_empty())
        .or(configured.filter(|name| !name.is_empty()))
        .unwrap_or(DEFAULT_DATABASE)
        .to_string()
}

/// A handle onto one database of the shared client.
#[derive(Debug, Clone)]
pub struct Database<B: StoreBackend> {
    backend: B,
    name: String,
}

impl<B: StoreBackend> Database<B> {
    pub fn new(backend: B, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn namespace(&self, collection: &str) -> Namespace {
        Namespace::new(&self.name, collection)
    }

    /// A collection handle with a detached execution context.
    pub fn collection(&self, name: impl Into<String>) -> Collection<B> {
        Collection::new(self.clone(), name, ExecutionContext::detached())
    }

    /// A collection handle whose operations run inside `context`.
    pub fn collection_with_context(
        &self,
        name: impl Into<String>,
        context: ExecutionContext<B>,
    ) -> Collection<B> {
        Collection::new(self.clone(), name, context)
    }

    pub async fn create_collection(&self, name: &str) -> StoreResult<()> {
        self.backend.create_collection(&self.namespace(name)).await
    }

    pub async fn list_collection_names(&self) -> StoreResult<Vec<String>> {
        self.backend.list_collection_names(&self.name).await
    }

    /// Drops the database with all its collections.
    pub async fn drop(&self) -> StoreResult<()> {
        self.backend.drop_database(&self.name).await
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Some("crawler"), Some("configured"), "crawler")]
    #[case(None, Some("configured"), "configured")]
    #[case(Some(""), Some("configured"), "configured")]
    #[case(None, None, "test")]
    #[case(None, Some(""), "test")]
    fn database_name_precedence(
        #[case] explicit: Option<&str>,
        #[case] configured: Option<&str>,
        #[case] expected: &str,
    ) {
        assert_eq!(resolve_database_name(explicit, configured), expected);
    }
}
