//! # class-deps
//!
//! Extracts the types a compiled Java class depends on, straight from its
//! `.class` bytes.
//!
//! ## Architecture
//!
//! - **descriptor**: Field and method descriptor decoding into dotted type names
//! - **classfile**: Class file reader (constant pool, members, annotations)
//! - **extract**: Per-category dependency rules and the aggregated dependency set
//! - **provider**: Class lookup over an explicit classpath of directories and jars
//! - **engine**: Name-based facade over a provider, with parallel batch analysis
//! - **error**: Library error type
//! - **scan**: Jar discovery in Maven repository structure
//! - **catalog**: Class listing for a jar
//! - **cli** / **config**: Command line surface and classpath resolution

pub mod catalog;
pub mod classfile;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod extract;
pub mod provider;
pub mod scan;

pub use classfile::CompiledClass;
pub use engine::{ClassReport, DependencyEngine};
pub use error::ExtractError;
pub use extract::{DependencyCategory, DependencySet, TypeNames};
pub use provider::{ClassProvider, ClasspathConfig, ClasspathProvider, MemoryProvider};
