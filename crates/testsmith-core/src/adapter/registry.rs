//! Registry for looking up [`LanguageAdapter`] implementations by name.

use std::collections::HashMap;
use std::sync::Arc;

use super::LanguageAdapter;
use super::types::Language;

/// A collection of registered adapters, keyed by canonical language name.
///
/// # Example
///
/// ```ignore
/// let mut registry = AdapterRegistry::new();
/// registry.register(PythonAdapter::new(engine, PythonConfig::default()));
/// let adapter = registry.get("py").unwrap();
/// ```
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn LanguageAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its language's canonical name.
    ///
    /// Returns the adapter previously registered for that language, if any.
    pub fn register(
        &mut self,
        adapter: impl LanguageAdapter + 'static,
    ) -> Option<Arc<dyn LanguageAdapter>> {
        let name = adapter.language().as_str().to_string();
        self.adapters.insert(name, Arc::new(adapter))
    }

    /// Look up an adapter by canonical name or alias (`py`, `cs`, `c#`).
    pub fn get(&self, name: &str) -> Option<Arc<dyn LanguageAdapter>> {
        let key = name
            .parse::<Language>()
            .map(|l| l.as_str().to_string())
            .unwrap_or_else(|_| name.to_string());
        self.adapters.get(&key).cloned()
    }

    /// Sorted names of every registered adapter.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::types::{FileSlot, PreparedFile, ProjectLayout, RawTestResult};
    use crate::adapter::AdapterError;
    use async_trait::async_trait;
    use std::path::Path;

    /// Adapter that only knows its language.
    struct FakeAdapter {
        language: Language,
        tag: &'static str,
    }

    #[async_trait]
    impl LanguageAdapter for FakeAdapter {
        fn language(&self) -> Language {
            self.language
        }

        fn init_project(&self, work_dir: &Path) -> Result<ProjectLayout, AdapterError> {
            Ok(ProjectLayout {
                root: work_dir.to_path_buf(),
                app_dir: work_dir.to_path_buf(),
                tests_dir: work_dir.to_path_buf(),
            })
        }

        fn prepare_app_code(&self, snippet: &str, _slot: FileSlot) -> PreparedFile {
            PreparedFile::new(snippet, self.tag)
        }

        async fn generate_tests(&self, snippet: &str) -> Result<String, AdapterError> {
            Ok(snippet.to_string())
        }

        fn prepare_test_code(
            &self,
            test_code: &str,
            _app: &PreparedFile,
            _slot: FileSlot,
        ) -> PreparedFile {
            PreparedFile::new(test_code, self.tag)
        }

        async fn execute_tests(
            &self,
            _project: &ProjectLayout,
        ) -> Result<RawTestResult, AdapterError> {
            Ok(RawTestResult::default())
        }
    }

    fn fake(language: Language, tag: &'static str) -> FakeAdapter {
        FakeAdapter { language, tag }
    }

    #[test]
    fn registry_starts_empty() {
        let registry = AdapterRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.list().is_empty());
    }

    #[test]
    fn register_and_get_by_alias() {
        let mut registry = AdapterRegistry::new();
        assert!(registry.register(fake(Language::Csharp, "cs")).is_none());

        for name in ["csharp", "cs", "C#"] {
            let adapter = registry.get(name).expect("alias should resolve");
            assert_eq!(adapter.language(), Language::Csharp);
        }
    }

    #[test]
    fn register_replaces_existing() {
        let mut registry = AdapterRegistry::new();
        registry.register(fake(Language::Python, "first"));
        let old = registry.register(fake(Language::Python, "second"));
        assert!(old.is_some());
        assert_eq!(registry.len(), 1);

        let current = registry.get("python").unwrap();
        assert_eq!(
            current.prepare_app_code("", FileSlot::Single).filename,
            "second"
        );
    }

    #[test]
    fn unknown_name_returns_none() {
        let mut registry = AdapterRegistry::new();
        registry.register(fake(Language::Python, "py"));
        assert!(registry.get("cobol").is_none());
        assert!(registry.get("csharp").is_none());
    }

    #[test]
    fn list_is_sorted() {
        let mut registry = AdapterRegistry::new();
        registry.register(fake(Language::Python, "py"));
        registry.register(fake(Language::Csharp, "cs"));
        assert_eq!(registry.list(), vec!["csharp", "python"]);
        assert!(format!("{registry:?}").contains("python"));
    }
}
