use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::extract::DependencyCategory;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-deps", version)]
#[command(about = "Extract the type dependencies of compiled Java classes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Class search path (directories, jars, .class files); repeatable.
    #[arg(short = 'c', long = "classpath", value_name = "PATHS", global = true)]
    pub classpath: Vec<OsString>,

    /// Add jars from this Maven repository, narrowed by the queried package.
    #[arg(long, value_name = "DIR", global = true)]
    pub m2: Option<PathBuf>,

    /// Like --m2 with the default ~/.m2/repository.
    #[arg(long, global = true, conflicts_with = "m2")]
    pub maven: bool,

    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Dependencies of one class
    Deps {
        class_name: String,

        #[arg(long, value_enum, conflicts_with = "method")]
        category: Option<DependencyCategory>,

        /// Only the signature types of this method (every overload)
        #[arg(short = 'm', long, value_name = "NAME")]
        method: Option<String>,

        /// Select a single overload of --method
        #[arg(long, value_name = "DESCRIPTOR", requires = "method")]
        descriptor: Option<String>,

        /// Keep the categories that succeed when another one fails
        #[arg(long, conflicts_with_all = ["method", "category"])]
        partial: bool,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Dependencies of many classes, analyzed in parallel
    Batch {
        class_names: Vec<String>,

        /// Analyze every class in this archive (it is added to the classpath)
        #[arg(long, value_name = "JAR")]
        jar: Option<PathBuf>,

        /// Include nested classes when cataloging --jar
        #[arg(long, requires = "jar")]
        nested: bool,

        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Classes stored in an archive
    List {
        jar: PathBuf,

        #[arg(long)]
        nested: bool,
    },
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
