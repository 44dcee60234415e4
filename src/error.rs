use std::path::PathBuf;
use thiserror::Error;

use crate::classfile::ClassFormatError;
use crate::descriptor::DescriptorError;
use crate::extract::DependencyCategory;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("class not found: {name}")]
    ClassNotFound { name: String },
    #[error("malformed {category} descriptor in {class}: {source}")]
    DescriptorParse {
        class: String,
        category: DependencyCategory,
        #[source]
        source: DescriptorError,
    },
    #[error("method {method} is not declared in {class}")]
    MethodNotFound { class: String, method: String },
    #[error("malformed class file {location}: {source}")]
    ClassFormat {
        location: String,
        #[source]
        source: ClassFormatError,
    },
    #[error("IO error while reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("archive error while reading {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

impl ExtractError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ClassNotFound { .. })
    }
}
