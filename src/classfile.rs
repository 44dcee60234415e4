//! Reader for the binary class-file format.
//!
//! Produces a [`CompiledClass`]: the read-only view the extractors walk. Only
//! what dependency extraction needs is kept (class names from the constant
//! pool, member descriptors, visible class annotations); code and other
//! attributes are skipped.

use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;

use crate::descriptor::internal_to_binary;

const MAGIC: u32 = 0xCAFE_BABE;
const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassFormatError {
    #[error("unexpected end of class file at offset {offset}")]
    UnexpectedEof { offset: usize },
    #[error("invalid class file magic {found:#010x}")]
    InvalidMagic { found: u32 },
    #[error("unsupported constant pool tag {tag} at index {index}")]
    UnsupportedConstant { tag: u8, index: u16 },
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex { index: u16 },
    #[error("constant pool entry {index} is not a {expected} entry")]
    UnexpectedConstant { index: u16, expected: &'static str },
    #[error("malformed modified UTF-8 in constant pool entry {index}")]
    InvalidString { index: u16 },
    #[error("unknown annotation element tag `{tag}`")]
    UnknownElementTag { tag: char },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
}

impl MemberInfo {
    /// `<init>` or `<clinit>`.
    pub fn is_initializer(&self) -> bool {
        self.name == "<init>" || self.name == "<clinit>"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationInfo {
    pub type_descriptor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledClass {
    /// Internal (slash-separated) name of this class.
    pub name: String,
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    /// `None` when the class has no `RuntimeVisibleAnnotations` attribute.
    pub visible_annotations: Option<Vec<AnnotationInfo>>,
    /// Every `CONSTANT_Class` entry, in pool order, as raw internal names.
    pub class_references: Vec<String>,
    pub content_hash: String,
    pub origin: Option<PathBuf>,
}

impl CompiledClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_super_class(mut self, name: impl Into<String>) -> Self {
        self.super_class = Some(name.into());
        self
    }

    pub fn with_interface(mut self, name: impl Into<String>) -> Self {
        self.interfaces.push(name.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        self.fields.push(MemberInfo {
            access_flags: 0,
            name: name.into(),
            descriptor: descriptor.into(),
        });
        self
    }

    pub fn with_method(mut self, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        self.methods.push(MemberInfo {
            access_flags: 0,
            name: name.into(),
            descriptor: descriptor.into(),
        });
        self
    }

    pub fn with_annotation(mut self, type_descriptor: impl Into<String>) -> Self {
        self.visible_annotations
            .get_or_insert_with(Vec::new)
            .push(AnnotationInfo {
                type_descriptor: type_descriptor.into(),
            });
        self
    }

    pub fn with_class_reference(mut self, name: impl Into<String>) -> Self {
        self.class_references.push(name.into());
        self
    }

    /// Dotted name, e.g. `java.util.Map$Entry`.
    pub fn binary_name(&self) -> String {
        internal_to_binary(&self.name)
    }
}

pub fn parse_class(bytes: &[u8]) -> Result<CompiledClass, ClassFormatError> {
    let mut reader = ClassReader::new(bytes);
    reader.expect_magic()?;
    let minor_version = reader.read_u2()?;
    let major_version = reader.read_u2()?;
    let pool = ConstantPool::parse(&mut reader)?;

    let access_flags = reader.read_u2()?;
    let this_class = reader.read_u2()?;
    let super_index = reader.read_u2()?;
    let name = pool.class_name(this_class)?.to_string();
    // Only java/lang/Object has no superclass entry.
    let super_class = match super_index {
        0 => None,
        index => Some(pool.class_name(index)?.to_string()),
    };

    let interfaces_count = reader.read_u2()?;
    let mut interfaces = Vec::with_capacity(interfaces_count as usize);
    for _ in 0..interfaces_count {
        let index = reader.read_u2()?;
        interfaces.push(pool.class_name(index)?.to_string());
    }

    let fields = read_members(&mut reader, &pool)?;
    let methods = read_members(&mut reader, &pool)?;

    let mut visible_annotations = None;
    let attributes_count = reader.read_u2()?;
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let body = reader.read_slice(length)?;
        if pool.utf8(name_index)? == RUNTIME_VISIBLE_ANNOTATIONS {
            visible_annotations = Some(read_annotations(body, &pool)?);
        }
    }

    Ok(CompiledClass {
        name,
        minor_version,
        major_version,
        access_flags,
        super_class,
        interfaces,
        fields,
        methods,
        visible_annotations,
        class_references: pool.class_references()?,
        content_hash: hash_content(bytes),
        origin: None,
    })
}

pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hasher.finalize();
    hex::encode(digest)
}

fn read_members(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<MemberInfo>, ClassFormatError> {
    let count = reader.read_u2()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access_flags = reader.read_u2()?;
        let name_index = reader.read_u2()?;
        let descriptor_index = reader.read_u2()?;
        let attributes_count = reader.read_u2()?;
        skip_attributes(reader, attributes_count)?;

        members.push(MemberInfo {
            access_flags,
            name: pool.utf8(name_index)?.to_string(),
            descriptor: pool.utf8(descriptor_index)?.to_string(),
        });
    }
    Ok(members)
}

fn skip_attributes(reader: &mut ClassReader<'_>, count: u16) -> Result<(), ClassFormatError> {
    for _ in 0..count {
        reader.read_u2()?; // attribute_name_index
        let length = reader.read_u4()? as usize;
        reader.skip(length)?;
    }
    Ok(())
}

fn read_annotations(
    body: &[u8],
    pool: &ConstantPool,
) -> Result<Vec<AnnotationInfo>, ClassFormatError> {
    let mut reader = ClassReader::new(body);
    let count = reader.read_u2()?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let type_index = reader.read_u2()?;
        skip_element_value_pairs(&mut reader)?;
        annotations.push(AnnotationInfo {
            type_descriptor: pool.utf8(type_index)?.to_string(),
        });
    }
    Ok(annotations)
}

fn skip_element_value_pairs(reader: &mut ClassReader<'_>) -> Result<(), ClassFormatError> {
    let pairs = reader.read_u2()?;
    for _ in 0..pairs {
        reader.read_u2()?; // element_name_index
        skip_element_value(reader)?;
    }
    Ok(())
}

fn skip_element_value(reader: &mut ClassReader<'_>) -> Result<(), ClassFormatError> {
    match reader.read_u1()? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => reader.skip(2),
        b'e' => reader.skip(4),
        b'@' => {
            reader.read_u2()?; // type_index
            skip_element_value_pairs(reader)
        }
        b'[' => {
            let values = reader.read_u2()?;
            for _ in 0..values {
                skip_element_value(reader)?;
            }
            Ok(())
        }
        tag => Err(ClassFormatError::UnknownElementTag { tag: tag as char }),
    }
}

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Class { name_index: u16 },
    Other,
    Unusable,
}

struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassFormatError> {
        let count = reader.read_u2()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable); // index 0 unused

        let mut index: u16 = 1;
        while index < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u2()? as usize;
                    let bytes = reader.read_slice(length)?;
                    let value = decode_modified_utf8(bytes)
                        .ok_or(ClassFormatError::InvalidString { index })?;
                    Constant::Utf8(value)
                }
                3 | 4 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                // Long and double take two slots.
                5 | 6 => {
                    if index + 1 >= count {
                        return Err(ClassFormatError::InvalidConstantIndex { index: index + 1 });
                    }
                    reader.skip(8)?;
                    entries.push(Constant::Other);
                    index += 1;
                    Constant::Unusable
                }
                7 => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                8 | 16 | 19 | 20 => {
                    reader.skip(2)?;
                    Constant::Other
                }
                9 | 10 | 11 | 12 | 17 | 18 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                15 => {
                    reader.skip(3)?;
                    Constant::Other
                }
                other => return Err(ClassFormatError::UnsupportedConstant { tag: other, index }),
            };

            entries.push(entry);
            index += 1;
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant, ClassFormatError> {
        self.entries
            .get(index as usize)
            .ok_or(ClassFormatError::InvalidConstantIndex { index })
    }

    fn utf8(&self, index: u16) -> Result<&str, ClassFormatError> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value.as_str()),
            _ => Err(ClassFormatError::UnexpectedConstant {
                index,
                expected: "Utf8",
            }),
        }
    }

    fn class_name(&self, index: u16) -> Result<&str, ClassFormatError> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(ClassFormatError::UnexpectedConstant {
                index,
                expected: "Class",
            }),
        }
    }

    fn class_references(&self) -> Result<Vec<String>, ClassFormatError> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                Constant::Class { name_index } => Some(self.utf8(*name_index).map(str::to_string)),
                _ => None,
            })
            .collect()
    }
}

/// Class files store strings as "modified UTF-8": NUL is written as `C0 80`
/// and supplementary characters as two encoded surrogates.
fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return Some(s.to_string());
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            0x01..=0x7F => {
                units.push(u16::from(b));
                i += 1;
            }
            0xC0..=0xDF => {
                let b2 = continuation(bytes, i + 1)?;
                units.push((u16::from(b & 0x1F) << 6) | b2);
                i += 2;
            }
            0xE0..=0xEF => {
                let b2 = continuation(bytes, i + 1)?;
                let b3 = continuation(bytes, i + 2)?;
                units.push((u16::from(b & 0x0F) << 12) | (b2 << 6) | b3);
                i += 3;
            }
            _ => return None,
        }
    }
    String::from_utf16(&units).ok()
}

fn continuation(bytes: &[u8], at: usize) -> Option<u16> {
    let b = *bytes.get(at)?;
    (b & 0xC0 == 0x80).then(|| u16::from(b & 0x3F))
}

struct ClassReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn expect_magic(&mut self) -> Result<(), ClassFormatError> {
        let magic = self.read_u4()?;
        if magic != MAGIC {
            return Err(ClassFormatError::InvalidMagic { found: magic });
        }
        Ok(())
    }

    fn read_u1(&mut self) -> Result<u8, ClassFormatError> {
        Ok(self.read_slice(1)?[0])
    }

    fn read_u2(&mut self) -> Result<u16, ClassFormatError> {
        let b = self.read_slice(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u4(&mut self) -> Result<u32, ClassFormatError> {
        let b = self.read_slice(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ClassFormatError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(ClassFormatError::UnexpectedEof { offset: self.pos })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), ClassFormatError> {
        self.read_slice(len).map(|_| ())
    }
}
