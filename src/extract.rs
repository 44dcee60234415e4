//! Dependency extraction rules over a [`CompiledClass`].
//!
//! Each category extractor reads the same immutable class independently; the
//! [`DependencySet`] aggregator runs them and keeps the per-category view.
//! Names are always dotted, and the analyzed class never lists itself.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::classfile::{CompiledClass, MemberInfo};
use crate::descriptor::{DescriptorError, decode, decode_object_type, internal_to_binary};
use crate::error::ExtractError;

pub type TypeNames = BTreeSet<String>;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum DependencyCategory {
    Annotation,
    SuperClass,
    Interface,
    FieldType,
    MethodSignature,
    BodyReference,
}

impl DependencyCategory {
    pub const ALL: [DependencyCategory; 6] = [
        DependencyCategory::Annotation,
        DependencyCategory::SuperClass,
        DependencyCategory::Interface,
        DependencyCategory::FieldType,
        DependencyCategory::MethodSignature,
        DependencyCategory::BodyReference,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Annotation => "annotation",
            Self::SuperClass => "super_class",
            Self::Interface => "interface",
            Self::FieldType => "field_type",
            Self::MethodSignature => "method_signature",
            Self::BodyReference => "body_reference",
        }
    }
}

impl fmt::Display for DependencyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulates names for one class, dropping references to the class itself.
struct Collector {
    own_name: String,
    names: TypeNames,
}

impl Collector {
    fn new(class: &CompiledClass) -> Self {
        Self {
            own_name: class.binary_name(),
            names: TypeNames::new(),
        }
    }

    fn insert(&mut self, name: String) {
        if name != self.own_name {
            self.names.insert(name);
        }
    }

    fn extend(&mut self, names: impl IntoIterator<Item = String>) {
        for name in names {
            self.insert(name);
        }
    }

    fn finish(self) -> TypeNames {
        self.names
    }
}

fn descriptor_error(
    class: &CompiledClass,
    category: DependencyCategory,
) -> impl FnOnce(DescriptorError) -> ExtractError + '_ {
    move |source| ExtractError::DescriptorParse {
        class: class.binary_name(),
        category,
        source,
    }
}

pub fn class_annotations(class: &CompiledClass) -> Result<TypeNames, ExtractError> {
    let mut out = Collector::new(class);
    for annotation in class.visible_annotations.iter().flatten() {
        let name = decode_object_type(&annotation.type_descriptor)
            .map_err(descriptor_error(class, DependencyCategory::Annotation))?;
        out.insert(name);
    }
    Ok(out.finish())
}

pub fn superclass(class: &CompiledClass) -> Option<String> {
    class
        .super_class
        .as_deref()
        .filter(|name| !name.is_empty())
        .map(internal_to_binary)
}

pub fn interfaces(class: &CompiledClass) -> TypeNames {
    let mut out = Collector::new(class);
    out.extend(class.interfaces.iter().map(|name| internal_to_binary(name)));
    out.finish()
}

pub fn field_types(class: &CompiledClass) -> Result<TypeNames, ExtractError> {
    decode_members(class, &class.fields, DependencyCategory::FieldType)
}

/// Parameter and return types of every declared method, each overload
/// included. Constructors and static initializers are not methods here.
pub fn method_signature_types(class: &CompiledClass) -> Result<TypeNames, ExtractError> {
    decode_members(class, declared_methods(class), DependencyCategory::MethodSignature)
}

fn declared_methods(class: &CompiledClass) -> impl Iterator<Item = &MemberInfo> {
    class.methods.iter().filter(|m| !m.is_initializer())
}

/// Union over every overload named `method`.
pub fn method_signature_types_named(
    class: &CompiledClass,
    method: &str,
) -> Result<TypeNames, ExtractError> {
    let overloads: Vec<&MemberInfo> = declared_methods(class)
        .filter(|m| m.name == method)
        .collect();
    if overloads.is_empty() {
        return Err(ExtractError::MethodNotFound {
            class: class.binary_name(),
            method: method.to_string(),
        });
    }
    decode_members(class, overloads, DependencyCategory::MethodSignature)
}

pub fn method_signature_types_exact(
    class: &CompiledClass,
    method: &str,
    descriptor: &str,
) -> Result<TypeNames, ExtractError> {
    let found = declared_methods(class)
        .find(|m| m.name == method && m.descriptor == descriptor)
        .ok_or_else(|| ExtractError::MethodNotFound {
            class: class.binary_name(),
            method: format!("{method}{descriptor}"),
        })?;
    decode_members(class, [found], DependencyCategory::MethodSignature)
}

/// Types referenced from `CONSTANT_Class` entries, which is where casts,
/// instantiations and static member owners used only in method bodies show up.
pub fn body_references(class: &CompiledClass) -> Result<TypeNames, ExtractError> {
    let mut out = Collector::new(class);
    for entry in &class.class_references {
        if entry.starts_with('[') {
            let names =
                decode(entry).map_err(descriptor_error(class, DependencyCategory::BodyReference))?;
            out.extend(names);
        } else {
            out.insert(internal_to_binary(entry));
        }
    }
    Ok(out.finish())
}

pub fn extract_category(
    class: &CompiledClass,
    category: DependencyCategory,
) -> Result<TypeNames, ExtractError> {
    let names = match category {
        DependencyCategory::Annotation => class_annotations(class)?,
        DependencyCategory::SuperClass => superclass(class).into_iter().collect(),
        DependencyCategory::Interface => interfaces(class),
        DependencyCategory::FieldType => field_types(class)?,
        DependencyCategory::MethodSignature => method_signature_types(class)?,
        DependencyCategory::BodyReference => body_references(class)?,
    };
    tracing::trace!(
        class = %class.binary_name(),
        %category,
        count = names.len(),
        "extracted dependency category"
    );
    Ok(names)
}

fn decode_members<'a>(
    class: &CompiledClass,
    members: impl IntoIterator<Item = &'a MemberInfo>,
    category: DependencyCategory,
) -> Result<TypeNames, ExtractError> {
    let mut out = Collector::new(class);
    for member in members {
        let names = decode(&member.descriptor).map_err(descriptor_error(class, category))?;
        out.extend(names);
    }
    Ok(out.finish())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DependencySet {
    by_category: BTreeMap<DependencyCategory, TypeNames>,
}

#[derive(Debug, Default)]
pub struct PartialDependencies {
    pub dependencies: DependencySet,
    pub failures: BTreeMap<DependencyCategory, ExtractError>,
}

impl DependencySet {
    /// All six categories; the first failing category aborts the extraction.
    pub fn extract(class: &CompiledClass) -> Result<Self, ExtractError> {
        Self::extract_only(class, &DependencyCategory::ALL)
    }

    pub fn extract_only(
        class: &CompiledClass,
        categories: &[DependencyCategory],
    ) -> Result<Self, ExtractError> {
        let mut set = Self::default();
        for &category in categories {
            set.by_category
                .insert(category, extract_category(class, category)?);
        }
        Ok(set)
    }

    /// All six categories, keeping whatever succeeded alongside the failures.
    pub fn extract_partial(class: &CompiledClass) -> PartialDependencies {
        let mut partial = PartialDependencies::default();
        for category in DependencyCategory::ALL {
            match extract_category(class, category) {
                Ok(names) => {
                    partial.dependencies.by_category.insert(category, names);
                }
                Err(err) => {
                    partial.failures.insert(category, err);
                }
            }
        }
        partial
    }

    pub fn get(&self, category: DependencyCategory) -> Option<&TypeNames> {
        self.by_category.get(&category)
    }

    pub fn categories(&self) -> impl Iterator<Item = (DependencyCategory, &TypeNames)> {
        self.by_category.iter().map(|(c, names)| (*c, names))
    }

    pub fn merged(&self) -> TypeNames {
        self.by_category.values().flatten().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.values().all(BTreeSet::is_empty)
    }
}

impl PartialDependencies {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
