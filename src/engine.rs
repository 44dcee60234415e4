//! Name-level facade: resolve a class through a provider, run the extractors,
//! release the class.

use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;

use crate::classfile::CompiledClass;
use crate::error::ExtractError;
use crate::extract::{self, DependencyCategory, DependencySet, PartialDependencies, TypeNames};
use crate::provider::{ClassProvider, acquire};

#[derive(Debug, Clone, Serialize)]
pub struct ClassReport {
    pub class_name: String,
    pub origin: Option<PathBuf>,
    pub content_hash: String,
    pub major_version: u16,
    pub dependencies: DependencySet,
    pub all: TypeNames,
}

#[derive(Debug)]
pub struct BatchEntry {
    pub class_name: String,
    pub result: Result<ClassReport, ExtractError>,
}

#[derive(Debug)]
pub struct DependencyEngine<P> {
    provider: P,
}

impl<P: ClassProvider> DependencyEngine<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn with_class<T>(
        &self,
        name: &str,
        f: impl FnOnce(&CompiledClass) -> Result<T, ExtractError>,
    ) -> Result<T, ExtractError> {
        let class = acquire(&self.provider, name)?;
        f(&class)
    }

    /// Every dependency of `name`, all categories merged.
    pub fn all_dependencies(&self, name: &str) -> Result<TypeNames, ExtractError> {
        Ok(self.dependencies(name)?.merged())
    }

    pub fn dependencies(&self, name: &str) -> Result<DependencySet, ExtractError> {
        self.with_class(name, DependencySet::extract)
    }

    pub fn dependencies_of(
        &self,
        name: &str,
        categories: &[DependencyCategory],
    ) -> Result<DependencySet, ExtractError> {
        self.with_class(name, |class| DependencySet::extract_only(class, categories))
    }

    /// Resolution failures still propagate; only per-category failures are
    /// collected.
    pub fn dependencies_partial(&self, name: &str) -> Result<PartialDependencies, ExtractError> {
        self.with_class(name, |class| Ok(DependencySet::extract_partial(class)))
    }

    pub fn class_annotations(&self, name: &str) -> Result<TypeNames, ExtractError> {
        self.with_class(name, extract::class_annotations)
    }

    pub fn superclass(&self, name: &str) -> Result<Option<String>, ExtractError> {
        self.with_class(name, |class| Ok(extract::superclass(class)))
    }

    pub fn interfaces(&self, name: &str) -> Result<TypeNames, ExtractError> {
        self.with_class(name, |class| Ok(extract::interfaces(class)))
    }

    pub fn field_types(&self, name: &str) -> Result<TypeNames, ExtractError> {
        self.with_class(name, extract::field_types)
    }

    pub fn method_signature_types(&self, name: &str) -> Result<TypeNames, ExtractError> {
        self.with_class(name, extract::method_signature_types)
    }

    pub fn method_signature_class(
        &self,
        name: &str,
        method: &str,
    ) -> Result<TypeNames, ExtractError> {
        self.with_class(name, |class| {
            extract::method_signature_types_named(class, method)
        })
    }

    pub fn method_signature_class_exact(
        &self,
        name: &str,
        method: &str,
        descriptor: &str,
    ) -> Result<TypeNames, ExtractError> {
        self.with_class(name, |class| {
            extract::method_signature_types_exact(class, method, descriptor)
        })
    }

    pub fn body_references(&self, name: &str) -> Result<TypeNames, ExtractError> {
        self.with_class(name, extract::body_references)
    }

    pub fn analyze(&self, name: &str) -> Result<ClassReport, ExtractError> {
        self.with_class(name, |class| {
            let dependencies = DependencySet::extract(class)?;
            Ok(ClassReport {
                class_name: class.binary_name(),
                origin: class.origin.clone(),
                content_hash: class.content_hash.clone(),
                major_version: class.major_version,
                all: dependencies.merged(),
                dependencies,
            })
        })
    }
}

impl<P: ClassProvider + Sync> DependencyEngine<P> {
    /// Analyzes each class independently on the rayon pool. Results keep the
    /// input order and one failure never hides another class's result.
    pub fn analyze_batch(&self, names: &[String]) -> Vec<BatchEntry> {
        names
            .par_iter()
            .map(|name| {
                let result = self.analyze(name);
                if let Err(err) = &result {
                    tracing::warn!(class = %name, error = %err, "dependency extraction failed");
                }
                BatchEntry {
                    class_name: name.clone(),
                    result,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::tests::service_class_bytes;
    use crate::provider::MemoryProvider;

    fn engine() -> DependencyEngine<MemoryProvider> {
        let mut provider = MemoryProvider::new();
        provider.insert_bytes(&service_class_bytes(true)).unwrap();
        provider.insert(
            CompiledClass::new("org/example/Broken")
                .with_super_class("java/lang/Object")
                .with_method("run", "(Ljava/lang/Runnable)V"),
        );
        provider.insert(CompiledClass::new("java/lang/Object"));
        DependencyEngine::new(provider)
    }

    #[test]
    fn all_dependencies_of_parsed_class() {
        let engine = engine();
        let all = engine.all_dependencies("org.example.Service").unwrap();
        let expected: TypeNames = [
            "java.io.Serializable",
            "java.lang.String",
            "java.lang.Thread",
            "java.util.List",
            "java.util.Optional",
            "javax.annotation.Generated",
            "org.example.Base",
            "org.example.Marker",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert_eq!(all, expected);
        assert_eq!(engine.provider().release_count(), 1);
    }

    #[test]
    fn per_category_queries_release_every_time() {
        let engine = engine();
        assert_eq!(
            engine.superclass("org.example.Service").unwrap().as_deref(),
            Some("org.example.Base")
        );
        assert_eq!(engine.superclass("java.lang.Object").unwrap(), None);
        assert!(
            engine
                .method_signature_class("org.example.Service", "handle")
                .unwrap()
                .contains("java.util.Optional")
        );
        assert!(
            engine
                .body_references("org.example.Service")
                .unwrap()
                .contains("java.lang.Thread")
        );
        assert_eq!(engine.provider().release_count(), 4);
    }

    #[test]
    fn descriptor_failure_propagates_and_still_releases() {
        let engine = engine();
        let err = engine.all_dependencies("org.example.Broken").unwrap_err();
        assert!(matches!(
            err,
            ExtractError::DescriptorParse {
                category: DependencyCategory::MethodSignature,
                ..
            }
        ));
        assert_eq!(engine.provider().release_count(), 1);

        let partial = engine.dependencies_partial("org.example.Broken").unwrap();
        assert_eq!(partial.failures.len(), 1);
        assert_eq!(
            partial
                .dependencies
                .get(DependencyCategory::SuperClass)
                .cloned()
                .unwrap_or_default(),
            TypeNames::from(["java.lang.Object".to_string()])
        );
    }

    #[test]
    fn missing_class_fails_without_extraction() {
        let engine = engine();
        let err = engine.all_dependencies("org.example.Nope").unwrap_err();
        assert!(err.is_not_found());
        assert!(engine.dependencies_partial("org.example.Nope").is_err());
        assert_eq!(engine.provider().release_count(), 0);
    }

    #[test]
    fn batch_keeps_order_and_isolates_failures() {
        let engine = engine();
        let names = vec![
            "org.example.Service".to_string(),
            "org.example.Nope".to_string(),
            "java.lang.Object".to_string(),
        ];
        let entries = engine.analyze_batch(&names);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].class_name, "org.example.Service");
        assert!(entries[0].result.is_ok());
        assert!(entries[1].result.as_ref().unwrap_err().is_not_found());
        let object = entries[2].result.as_ref().unwrap();
        assert!(object.all.is_empty());
    }
}
