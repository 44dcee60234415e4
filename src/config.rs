use anyhow::Result;
use std::env;
use std::path::PathBuf;

use crate::cli::Cli;
use crate::provider::ClasspathConfig;
use crate::scan::{default_m2_repository, infer_scan_path, scan_jars};

pub const CLASSPATH_ENV: &str = "CLASS_DEPS_CLASSPATH";

pub fn resolve_m2_repo(cli: &Cli) -> Result<Option<PathBuf>> {
    if let Some(p) = cli.m2.clone() {
        return Ok(Some(p));
    }
    if cli.maven {
        return default_m2_repository().map(Some);
    }
    Ok(None)
}

/// Search scope for one invocation: explicit `--classpath` entries (or the
/// environment fallback), then `archives` named by the command itself, then
/// jars from the Maven repository when asked.
pub fn resolve_classpath(
    cli: &Cli,
    class_names: &[String],
    archives: &[PathBuf],
) -> Result<ClasspathConfig> {
    let mut config = ClasspathConfig::default();

    if !cli.classpath.is_empty() {
        for list in &cli.classpath {
            config.add_entries(ClasspathConfig::from_path_list(list).entries);
        }
    } else if let Some(list) = env::var_os(CLASSPATH_ENV) {
        config.add_entries(ClasspathConfig::from_path_list(&list).entries);
    }
    config.add_entries(archives.iter().cloned());

    if let Some(m2) = resolve_m2_repo(cli)? {
        let mut roots: Vec<PathBuf> = class_names
            .iter()
            .map(|name| infer_scan_path(&m2, name))
            .collect();
        roots.sort();
        roots.dedup();
        for root in roots {
            config.add_entries(scan_jars(&root)?);
        }
    }

    if config.is_empty() {
        tracing::warn!("classpath is empty; pass --classpath or set {CLASSPATH_ENV}");
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn classpath_lists_are_split_and_deduplicated() {
        let list = env::join_paths(["a.jar", "classes"]).unwrap();
        let cli = Cli::try_parse_from([
            "class-deps".into(),
            "-c".into(),
            list,
            "-c".into(),
            "a.jar".into(),
            "list".into(),
            "x.jar".into(),
        ])
        .unwrap();

        let config = resolve_classpath(&cli, &[], &[]).unwrap();
        assert_eq!(
            config.entries,
            vec![PathBuf::from("a.jar"), PathBuf::from("classes")]
        );
    }

    #[test]
    fn m2_jars_follow_explicit_entries() {
        let base = std::env::temp_dir().join(format!(
            "class_deps_config_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let jar = base.join("org/example/demo/1.0/demo-1.0.jar");
        std::fs::create_dir_all(jar.parent().unwrap()).unwrap();
        std::fs::write(&jar, b"stub").unwrap();

        let cli = Cli::try_parse_from([
            "class-deps".into(),
            "-c".into(),
            std::ffi::OsString::from("first.jar"),
            "--m2".into(),
            base.clone().into_os_string(),
            "deps".into(),
            "org.example.demo.Thing".into(),
        ])
        .unwrap();

        let config =
            resolve_classpath(&cli, &["org.example.demo.Thing".to_string()], &[]).unwrap();
        assert_eq!(config.entries, vec![PathBuf::from("first.jar"), jar]);

        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn command_archives_join_the_classpath() {
        let cli = Cli::try_parse_from(["class-deps", "batch", "--jar", "lib/a.jar"]).unwrap();
        let config = resolve_classpath(&cli, &[], &[PathBuf::from("lib/a.jar")]).unwrap();
        assert_eq!(config.entries, vec![PathBuf::from("lib/a.jar")]);
    }
}
