use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use zip::ZipArchive;

/// Dotted names of the classes stored in an archive. Nested classes (`$` in
/// the name) are listed only when `include_nested` is set; module and package
/// descriptors and multi-release overlays are never listed.
pub fn catalog(artifact_path: &Path, include_nested: bool) -> Result<Vec<String>> {
    let file = File::open(artifact_path)
        .with_context(|| format!("Failed to open jar: {}", artifact_path.display()))?;
    // SAFETY: The file is opened read-only and remains valid for the lifetime of the mmap.
    // The mmap is dropped before the file, ensuring memory safety.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to mmap jar: {}", artifact_path.display()))?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to read zip structure: {}", artifact_path.display()))?;

    let mut classes = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let name = entry.name();
        let Some(stem) = name.strip_suffix(".class") else {
            continue;
        };
        if name.starts_with("META-INF/") {
            continue;
        }
        if stem.ends_with("module-info") || stem.ends_with("package-info") {
            continue;
        }
        if !include_nested && stem.contains('$') {
            continue;
        }
        classes.push(stem.replace(['/', '\\'], "."));
    }

    classes.sort();
    classes.dedup();
    Ok(classes)
}
