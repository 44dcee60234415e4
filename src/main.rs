use anyhow::{Context, Result};
use class_deps::catalog::catalog;
use class_deps::cli::{Cli, Commands, OutputFormat};
use class_deps::config::resolve_classpath;
use class_deps::engine::{ClassReport, DependencyEngine};
use class_deps::extract::{DependencyCategory, TypeNames};
use class_deps::provider::{ClasspathProvider, join_path_list};
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = parse_cli()?;
    init_tracing(cli.verbose);

    match cli.command.clone() {
        Commands::Deps {
            class_name,
            category,
            method,
            descriptor,
            partial,
            format,
            output,
        } => {
            let class_name = normalize_class_name(&class_name);
            let engine = build_engine(&cli, std::slice::from_ref(&class_name))?;
            let query = DepsQuery {
                category,
                method,
                descriptor,
                partial,
            };
            let result = run_deps(&engine, &class_name, &query)?;
            write_output(&render_deps(&result, format)?, output.as_deref())?;
        }
        Commands::Batch {
            class_names,
            jar,
            nested,
            output,
        } => {
            let mut names: Vec<String> = class_names.iter().map(|n| normalize_class_name(n)).collect();
            if let Some(jar) = jar.as_deref() {
                names.extend(catalog(jar, nested)?);
            }
            if names.is_empty() {
                anyhow::bail!("No classes to analyze; pass class names or --jar");
            }

            let archives: Vec<PathBuf> = jar.into_iter().collect();
            let engine_classpath = resolve_classpath(&cli, &names, &archives)?;
            tracing::debug!(classpath = ?join_path_list(&engine_classpath), "batch classpath");
            let engine = DependencyEngine::new(ClasspathProvider::new(engine_classpath));

            let result = run_batch(&engine, &names);
            write_output(&serde_json::to_string_pretty(&result)?, output.as_deref())?;
            if result.failed > 0 {
                anyhow::bail!("{} of {} classes failed", result.failed, result.classes);
            }
        }
        Commands::List { jar, nested } => {
            let classes = catalog(&jar, nested)?;
            write_output(&classes.join("\n"), None)?;
        }
    }

    Ok(())
}

fn parse_cli() -> Result<Cli> {
    let args: Vec<String> = std::env::args().collect();
    Ok(Cli::parse_from(rewrite_args_for_implicit_deps(args)))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // stdout carries the report; logs go to stderr.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,class_deps={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// `class-deps org.example.Foo` means `class-deps deps org.example.Foo`.
fn rewrite_args_for_implicit_deps(mut args: Vec<String>) -> Vec<String> {
    if args.len() <= 1 {
        return args;
    }

    let subcommands = ["deps", "batch", "list", "help"];

    let mut idx = 1usize;
    while idx < args.len() {
        let a = args[idx].as_str();
        if a == "--" {
            idx += 1;
            break;
        }

        if a == "-c" || a == "--classpath" || a == "--m2" {
            idx += 2;
            continue;
        }

        if a.starts_with('-') {
            idx += 1;
            continue;
        }

        break;
    }

    if idx < args.len() {
        let token = args[idx].as_str();
        if !subcommands.contains(&token) {
            args.insert(idx, "deps".to_string());
        }
    }

    args
}

fn normalize_class_name(raw: &str) -> String {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("import") {
        s = rest.trim();
    }
    if s.ends_with(';') {
        s = s.trim_end_matches(';').trim();
    }
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn build_engine(cli: &Cli, class_names: &[String]) -> Result<DependencyEngine<ClasspathProvider>> {
    let classpath = resolve_classpath(cli, class_names, &[])?;
    tracing::debug!(classpath = ?join_path_list(&classpath), "resolved classpath");
    Ok(DependencyEngine::new(ClasspathProvider::new(classpath)))
}

struct DepsQuery {
    category: Option<DependencyCategory>,
    method: Option<String>,
    descriptor: Option<String>,
    partial: bool,
}

#[derive(Debug, Serialize)]
struct DepsResult {
    class_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    origin: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    duration_ms: u64,
    dependencies: BTreeMap<DependencyCategory, TypeNames>,
    all: TypeNames,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    failures: BTreeMap<DependencyCategory, String>,
}

impl DepsResult {
    fn new(class_name: &str, dependencies: BTreeMap<DependencyCategory, TypeNames>) -> Self {
        let all = dependencies.values().flatten().cloned().collect();
        Self {
            class_name: class_name.to_string(),
            origin: None,
            content_hash: None,
            method: None,
            duration_ms: 0,
            dependencies,
            all,
            failures: BTreeMap::new(),
        }
    }
}

fn run_deps(
    engine: &DependencyEngine<ClasspathProvider>,
    class_name: &str,
    query: &DepsQuery,
) -> Result<DepsResult> {
    let start = Instant::now();

    let mut result = if let Some(method) = query.method.as_deref() {
        let types = match query.descriptor.as_deref() {
            Some(descriptor) => engine.method_signature_class_exact(class_name, method, descriptor)?,
            None => engine.method_signature_class(class_name, method)?,
        };
        let mut result = DepsResult::new(
            class_name,
            BTreeMap::from([(DependencyCategory::MethodSignature, types)]),
        );
        result.method = Some(match query.descriptor.as_deref() {
            Some(descriptor) => format!("{method}{descriptor}"),
            None => method.to_string(),
        });
        result
    } else if let Some(category) = query.category {
        let set = engine.dependencies_of(class_name, &[category])?;
        DepsResult::new(class_name, collect_categories(set.categories()))
    } else if query.partial {
        let partial = engine.dependencies_partial(class_name)?;
        let mut result = DepsResult::new(class_name, collect_categories(partial.dependencies.categories()));
        result.failures = partial
            .failures
            .iter()
            .map(|(category, err)| (*category, err.to_string()))
            .collect();
        result
    } else {
        from_report(engine.analyze(class_name)?)
    };

    result.duration_ms = start.elapsed().as_millis() as u64;
    Ok(result)
}

fn collect_categories<'a>(
    categories: impl Iterator<Item = (DependencyCategory, &'a TypeNames)>,
) -> BTreeMap<DependencyCategory, TypeNames> {
    categories
        .map(|(category, names)| (category, names.clone()))
        .collect()
}

fn from_report(report: ClassReport) -> DepsResult {
    let mut result = DepsResult::new(
        &report.class_name,
        collect_categories(report.dependencies.categories()),
    );
    result.origin = report.origin;
    result.content_hash = Some(report.content_hash);
    result
}

fn render_deps(result: &DepsResult, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(result)?,
        OutputFormat::Text => {
            let mut out = String::new();
            out.push_str(&format!("class_name: {}\n", result.class_name));
            if let Some(origin) = &result.origin {
                out.push_str(&format!("origin: {}\n", origin.display()));
            }
            if let Some(method) = &result.method {
                out.push_str(&format!("method: {method}\n"));
            }
            out.push_str(&format!("duration_ms: {}\n", result.duration_ms));
            for (category, names) in &result.dependencies {
                out.push_str(&format!("{category}: {}\n", names.len()));
                for name in names {
                    out.push_str(&format!("- {name}\n"));
                }
            }
            for (category, err) in &result.failures {
                out.push_str(&format!("failed {category}: {err}\n"));
            }
            out
        }
    })
}

#[derive(Debug, Serialize)]
struct BatchRow {
    class_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<ClassReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchResult {
    classes: usize,
    failed: usize,
    duration_ms: u64,
    results: Vec<BatchRow>,
}

fn run_batch(engine: &DependencyEngine<ClasspathProvider>, names: &[String]) -> BatchResult {
    let start = Instant::now();
    let results: Vec<BatchRow> = engine
        .analyze_batch(names)
        .into_iter()
        .map(|entry| match entry.result {
            Ok(report) => BatchRow {
                class_name: entry.class_name,
                report: Some(report),
                error: None,
            },
            Err(err) => BatchRow {
                class_name: entry.class_name,
                report: None,
                error: Some(err.to_string()),
            },
        })
        .collect();

    BatchResult {
        classes: results.len(),
        failed: results.iter().filter(|r| r.error.is_some()).count(),
        duration_ms: start.elapsed().as_millis() as u64,
        results,
    }
}

fn write_output(content: &str, output: Option<&Path>) -> Result<()> {
    if let Some(path) = output {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write output: {}", path.display()))?;
    } else {
        print!("{content}");
        if !content.ends_with('\n') {
            println!();
        }
    }

    Ok(())
}
