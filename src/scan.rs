use anyhow::Result;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

pub fn default_m2_repository() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Failed to resolve home directory"))?;
    Ok(home.join(".m2").join("repository"))
}

/// Narrows a Maven repository root to the deepest existing directory named
/// after a package prefix of `class_name`, e.g. `org/apache/commons` for
/// `org.apache.commons.lang3.StringUtils`.
pub fn infer_scan_path(m2_repo: &Path, class_name: &str) -> PathBuf {
    let parts: Vec<&str> = class_name.split(['.', '/']).collect();
    if parts.len() < 3 {
        return m2_repo.to_path_buf();
    }

    for i in (2..parts.len().saturating_sub(1)).rev() {
        let prefix = parts[..i].join("/");
        let path = m2_repo.join(prefix);
        if path.exists() {
            return path;
        }
    }

    m2_repo.to_path_buf()
}

/// Every `.jar` below `base_path`, sorted so classpath order is stable.
pub fn scan_jars(base_path: &Path) -> Result<Vec<PathBuf>> {
    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(base_path)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            if let Ok(entry) = entry {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "jar") {
                    let _ = tx.send(path.to_path_buf());
                }
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut jars: Vec<PathBuf> = rx.iter().collect();
    jars.sort();
    tracing::debug!(root = %base_path.display(), jars = jars.len(), "scanned for jars");
    Ok(jars)
}
