//! Resolution of class names to [`CompiledClass`] values.
//!
//! Providers are explicit objects configured with their search scope; the
//! engine never consults ambient global state. Every resolved class is handed
//! out through a [`ClassHandle`] that releases it when dropped, so a provider's
//! cache does not outlive the extraction on any exit path.

use memmap2::Mmap;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{Cursor, Read};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::classfile::{CompiledClass, parse_class};
use crate::error::ExtractError;

pub trait ClassProvider {
    fn resolve(&self, name: &str) -> Result<Arc<CompiledClass>, ExtractError>;

    /// Drops any state held for `class`. Calling it twice is harmless.
    fn release(&self, class: &CompiledClass);
}

pub struct ClassHandle<'p, P: ClassProvider + ?Sized> {
    provider: &'p P,
    class: Arc<CompiledClass>,
}

impl<P: ClassProvider + ?Sized> Deref for ClassHandle<'_, P> {
    type Target = CompiledClass;

    fn deref(&self) -> &CompiledClass {
        &self.class
    }
}

impl<P: ClassProvider + ?Sized> Drop for ClassHandle<'_, P> {
    fn drop(&mut self) {
        self.provider.release(&self.class);
    }
}

pub fn acquire<'p, P: ClassProvider + ?Sized>(
    provider: &'p P,
    name: &str,
) -> Result<ClassHandle<'p, P>, ExtractError> {
    let class = provider.resolve(name)?;
    Ok(ClassHandle { provider, class })
}

/// `org.example.Foo`, `org/example/Foo` and `org/example/Foo.class` all map
/// to `org/example/Foo`.
pub fn internal_name(name: &str) -> String {
    let name = name.trim();
    let name = name.strip_suffix(".class").unwrap_or(name);
    name.replace('.', "/")
}

/// A name that stays inside whatever search entry it is joined onto: no empty
/// segments (so no leading `/` and no `..`) and no other path separators.
fn is_searchable(internal: &str) -> bool {
    !internal.contains(['\\', ':']) && internal.split('/').all(|segment| !segment.is_empty())
}

/// Ordered search locations: directories of class files, jar/zip archives
/// and individual `.class` files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClasspathConfig {
    pub entries: Vec<PathBuf>,
}

impl ClasspathConfig {
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Parses a platform path list such as `a.jar:classes/`.
    pub fn from_path_list(list: &OsStr) -> Self {
        Self::new(std::env::split_paths(list).filter(|p| !p.as_os_str().is_empty()))
    }

    pub fn add_entries<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        for entry in entries {
            if !self.entries.contains(&entry) {
                self.entries.push(entry);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug)]
pub struct ClasspathProvider {
    config: ClasspathConfig,
    loaded: Mutex<HashMap<String, Arc<CompiledClass>>>,
}

impl ClasspathProvider {
    pub fn new(config: ClasspathConfig) -> Self {
        Self {
            config,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ClasspathConfig {
        &self.config
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn load(&self, internal: &str) -> Result<Option<CompiledClass>, ExtractError> {
        let class_path = format!("{internal}.class");

        for entry in &self.config.entries {
            let found = if entry.is_dir() {
                let candidate = entry.join(&class_path);
                if candidate.is_file() {
                    Some(parse_at(&read_file(&candidate)?, &candidate)?)
                } else {
                    None
                }
            } else if is_archive(entry) {
                match read_from_archive(entry, &class_path)? {
                    Some(bytes) => Some(parse_at(&bytes, entry)?),
                    None => None,
                }
            } else if is_class_file(entry) {
                Some(parse_at(&read_file(entry)?, entry)?)
            } else {
                tracing::debug!(entry = %entry.display(), "skipping unusable classpath entry");
                None
            };

            match found {
                Some(class) if class.name == internal => return Ok(Some(class)),
                Some(class) if !is_class_file(entry) => {
                    tracing::warn!(
                        requested = internal,
                        found = %class.name,
                        origin = ?class.origin,
                        "class file does not declare the requested class"
                    );
                }
                _ => {}
            }
        }

        Ok(None)
    }
}

impl ClassProvider for ClasspathProvider {
    fn resolve(&self, name: &str) -> Result<Arc<CompiledClass>, ExtractError> {
        let internal = internal_name(name);
        if !is_searchable(&internal) {
            return Err(ExtractError::ClassNotFound {
                name: name.trim().to_string(),
            });
        }
        if let Some(hit) = self
            .loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&internal)
        {
            return Ok(Arc::clone(hit));
        }

        let class = self
            .load(&internal)?
            .ok_or_else(|| ExtractError::ClassNotFound {
                name: name.trim().to_string(),
            })?;
        tracing::debug!(
            class = %class.binary_name(),
            origin = ?class.origin,
            "resolved class"
        );

        let class = Arc::new(class);
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(internal, Arc::clone(&class));
        Ok(class)
    }

    fn release(&self, class: &CompiledClass) {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&class.name);
    }
}

/// Serves classes that are already in memory.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    classes: HashMap<String, Arc<CompiledClass>>,
    releases: AtomicUsize,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class: CompiledClass) {
        self.classes.insert(class.name.clone(), Arc::new(class));
    }

    pub fn insert_bytes(&mut self, bytes: &[u8]) -> Result<(), ExtractError> {
        let class = parse_class(bytes).map_err(|source| ExtractError::ClassFormat {
            location: "<memory>".to_string(),
            source,
        })?;
        self.insert(class);
        Ok(())
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::Relaxed)
    }
}

impl ClassProvider for MemoryProvider {
    fn resolve(&self, name: &str) -> Result<Arc<CompiledClass>, ExtractError> {
        self.classes
            .get(&internal_name(name))
            .cloned()
            .ok_or_else(|| ExtractError::ClassNotFound {
                name: name.trim().to_string(),
            })
    }

    fn release(&self, _class: &CompiledClass) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn is_archive(path: &Path) -> bool {
    has_extension(path, &["jar", "zip"]) && path.is_file()
}

fn is_class_file(path: &Path) -> bool {
    has_extension(path, &["class"]) && path.is_file()
}

fn has_extension(path: &Path, wanted: &[&str]) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| wanted.iter().any(|w| ext.eq_ignore_ascii_case(w)))
}

fn parse_at(bytes: &[u8], origin: &Path) -> Result<CompiledClass, ExtractError> {
    let mut class = parse_class(bytes).map_err(|source| ExtractError::ClassFormat {
        location: origin.display().to_string(),
        source,
    })?;
    class.origin = Some(origin.to_path_buf());
    Ok(class)
}

fn read_file(path: &Path) -> Result<Vec<u8>, ExtractError> {
    std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_from_archive(jar_path: &Path, class_path: &str) -> Result<Option<Vec<u8>>, ExtractError> {
    let io_error = |source| ExtractError::Io {
        path: jar_path.to_path_buf(),
        source,
    };
    let archive_error = |source| ExtractError::Archive {
        path: jar_path.to_path_buf(),
        source,
    };

    let file = File::open(jar_path).map_err(io_error)?;
    // SAFETY: The file is opened read-only and outlives the map, which is
    // dropped at the end of this function.
    let mmap = unsafe { Mmap::map(&file) }.map_err(io_error)?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..])).map_err(archive_error)?;

    let mut entry = match archive.by_name(class_path) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(source) => return Err(archive_error(source)),
    };
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes).map_err(io_error)?;
    Ok(Some(bytes))
}

/// Joins entries back into a platform path list, for diagnostics.
pub fn join_path_list(config: &ClasspathConfig) -> OsString {
    std::env::join_paths(&config.entries).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::tests::service_class_bytes;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};
    use zip::write::FileOptions;

    fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "class_deps_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn write_jar(path: &Path, entries: &[(&str, &[u8])]) -> anyhow::Result<()> {
        let file = File::create(path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in entries {
            zip.start_file(*name, options)?;
            zip.write_all(content)?;
        }
        zip.finish()?;
        Ok(())
    }

    #[test]
    fn internal_name_accepts_dotted_slashed_and_file_forms() {
        assert_eq!(internal_name("org.example.Service"), "org/example/Service");
        assert_eq!(internal_name(" org/example/Service "), "org/example/Service");
        assert_eq!(internal_name("org/example/Service.class"), "org/example/Service");
        assert_eq!(internal_name("a.Outer$Inner"), "a/Outer$Inner");
    }

    #[test]
    fn resolves_from_directory_and_releases_on_drop() -> anyhow::Result<()> {
        let dir = temp_path("classes_dir");
        let class_file = dir.join("org/example/Service.class");
        std::fs::create_dir_all(class_file.parent().unwrap())?;
        std::fs::write(&class_file, service_class_bytes(true))?;

        let provider = ClasspathProvider::new(ClasspathConfig::new([dir.clone()]));
        {
            let handle = acquire(&provider, "org.example.Service")?;
            assert_eq!(handle.name, "org/example/Service");
            assert_eq!(handle.origin.as_deref(), Some(class_file.as_path()));
            assert_eq!(provider.loaded_count(), 1);
        }
        assert_eq!(provider.loaded_count(), 0);

        std::fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn resolves_from_jar_after_missing_entries() -> anyhow::Result<()> {
        let jar = temp_path("deps.jar");
        let bytes = service_class_bytes(false);
        write_jar(
            &jar,
            &[
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n".as_slice()),
                ("org/example/Service.class", bytes.as_slice()),
            ],
        )?;

        let missing = temp_path("does_not_exist");
        let provider = ClasspathProvider::new(ClasspathConfig::new([missing, jar.clone()]));
        let handle = acquire(&provider, "org/example/Service")?;
        assert_eq!(handle.super_class.as_deref(), Some("org/example/Base"));
        assert_eq!(handle.origin.as_deref(), Some(jar.as_path()));
        drop(handle);

        std::fs::remove_file(jar)?;
        Ok(())
    }

    #[test]
    fn single_class_file_entry_matches_by_parsed_name() -> anyhow::Result<()> {
        let file = temp_path("Service.class");
        std::fs::write(&file, service_class_bytes(true))?;

        let provider = ClasspathProvider::new(ClasspathConfig::new([file.clone()]));
        assert!(acquire(&provider, "org.example.Service").is_ok());
        let err = acquire(&provider, "org.example.Other").err().unwrap();
        assert!(err.is_not_found());

        std::fs::remove_file(file)?;
        Ok(())
    }

    #[test]
    fn class_file_declaring_another_name_is_not_found() -> anyhow::Result<()> {
        let dir = temp_path("misplaced_dir");
        let misplaced = dir.join("org/example/Other.class");
        std::fs::create_dir_all(misplaced.parent().unwrap())?;
        std::fs::write(&misplaced, service_class_bytes(false))?;
        let jar = temp_path("misplaced.jar");
        let bytes = service_class_bytes(false);
        write_jar(&jar, &[("org/example/Other.class", bytes.as_slice())])?;

        let provider = ClasspathProvider::new(ClasspathConfig::new([dir.clone(), jar.clone()]));
        let err = acquire(&provider, "org.example.Other").err().unwrap();
        assert!(err.is_not_found());
        assert_eq!(provider.loaded_count(), 0);

        std::fs::remove_dir_all(dir)?;
        std::fs::remove_file(jar)?;
        Ok(())
    }

    #[test]
    fn names_cannot_leave_the_search_entries() -> anyhow::Result<()> {
        let dir = temp_path("scoped_dir");
        std::fs::create_dir_all(&dir)?;
        let outside = temp_path("outside");
        std::fs::create_dir_all(&outside)?;
        std::fs::write(outside.join("Service.class"), service_class_bytes(false))?;

        let provider = ClasspathProvider::new(ClasspathConfig::new([dir.clone()]));
        let absolute = outside.join("Service").to_string_lossy().replace('/', ".");
        for name in [absolute.as_str(), "org..example.Service", "org.example.", ""] {
            let err = acquire(&provider, name).err().unwrap();
            assert!(err.is_not_found(), "{name}: {err}");
        }
        assert_eq!(provider.loaded_count(), 0);

        std::fs::remove_dir_all(dir)?;
        std::fs::remove_dir_all(outside)?;
        Ok(())
    }

    #[test]
    fn unknown_class_is_not_found_and_nothing_is_cached() {
        let provider = ClasspathProvider::new(ClasspathConfig::default());
        let err = acquire(&provider, "com.nowhere.Missing").err().unwrap();
        assert!(matches!(err, ExtractError::ClassNotFound { ref name } if name == "com.nowhere.Missing"));
        assert_eq!(provider.loaded_count(), 0);
    }

    #[test]
    fn corrupt_class_in_jar_is_a_format_error() -> anyhow::Result<()> {
        let jar = temp_path("corrupt.jar");
        write_jar(&jar, &[("a/B.class", b"not a class".as_slice())])?;

        let provider = ClasspathProvider::new(ClasspathConfig::new([jar.clone()]));
        let err = acquire(&provider, "a.B").err().unwrap();
        assert!(matches!(err, ExtractError::ClassFormat { .. }));

        std::fs::remove_file(jar)?;
        Ok(())
    }

    #[test]
    fn path_list_round_trips() {
        let config = ClasspathConfig::new([PathBuf::from("a.jar"), PathBuf::from("classes")]);
        let joined = join_path_list(&config);
        assert_eq!(ClasspathConfig::from_path_list(&joined), config);
    }

    #[test]
    fn memory_provider_counts_releases() {
        let mut provider = MemoryProvider::new();
        provider.insert(CompiledClass::new("a/B"));
        {
            let _handle = acquire(&provider, "a.B").unwrap();
        }
        assert_eq!(provider.release_count(), 1);
        assert!(acquire(&provider, "a.C").is_err());
        assert_eq!(provider.release_count(), 1);
    }
}
