//! Decoder for JVM type descriptors.
//!
//! A field descriptor is zero or more `[` markers followed by a primitive code
//! or an object reference `L<internal-name>;`. A method descriptor wraps its
//! parameter descriptors in parentheses and ends with a return descriptor or
//! `V`. Only object references name a dependency; array markers change the
//! arity, not the referenced type.

use thiserror::Error;

const PRIMITIVE_CODES: &[char] = &['B', 'C', 'D', 'F', 'I', 'J', 'S', 'Z'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("empty descriptor")]
    Empty,
    #[error("unterminated object type at offset {offset} in `{descriptor}`")]
    Unterminated { descriptor: String, offset: usize },
    #[error("empty object type at offset {offset} in `{descriptor}`")]
    EmptyObjectType { descriptor: String, offset: usize },
    #[error("unexpected `{found}` at offset {offset} in `{descriptor}`")]
    UnexpectedChar {
        descriptor: String,
        offset: usize,
        found: char,
    },
    #[error("array marker without element type in `{descriptor}`")]
    DanglingArray { descriptor: String },
    #[error("unbalanced parameter list in `{descriptor}`")]
    UnbalancedParameters { descriptor: String },
    #[error("missing return type in `{descriptor}`")]
    MissingReturnType { descriptor: String },
    #[error("expected a single object type, found `{descriptor}`")]
    NotObjectType { descriptor: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Type,
    Array,
    Object { start: usize },
}

/// Position within the descriptor as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Start,
    Params,
    Return,
    Done,
}

/// Decodes every object reference in a field or method descriptor, left to
/// right. Primitives, `void` and arrays of primitives contribute nothing.
pub fn decode(descriptor: &str) -> Result<Vec<String>, DescriptorError> {
    if descriptor.is_empty() {
        return Err(DescriptorError::Empty);
    }

    let mut names = Vec::new();
    let mut state = State::Type;
    let mut shape = Shape::Start;

    for (offset, ch) in descriptor.char_indices() {
        if let State::Object { start } = state {
            if ch != ';' {
                continue;
            }
            if offset == start {
                return Err(DescriptorError::EmptyObjectType {
                    descriptor: descriptor.to_string(),
                    offset: start - 1,
                });
            }
            names.push(internal_to_binary(&descriptor[start..offset]));
            complete_type(&mut shape);
            state = State::Type;
            continue;
        }

        let unexpected = || DescriptorError::UnexpectedChar {
            descriptor: descriptor.to_string(),
            offset,
            found: ch,
        };

        if shape == Shape::Done {
            return Err(unexpected());
        }

        match ch {
            '[' => state = State::Array,
            'L' => state = State::Object { start: offset + 1 },
            c if PRIMITIVE_CODES.contains(&c) => {
                complete_type(&mut shape);
                state = State::Type;
            }
            // void only names a return type
            'V' if state == State::Type && shape == Shape::Return => shape = Shape::Done,
            '(' if state == State::Type && shape == Shape::Start => shape = Shape::Params,
            ')' if state == State::Type && shape == Shape::Params => shape = Shape::Return,
            _ => return Err(unexpected()),
        }
    }

    match (state, shape) {
        (State::Object { start }, _) => Err(DescriptorError::Unterminated {
            descriptor: descriptor.to_string(),
            offset: start - 1,
        }),
        (State::Array, _) => Err(DescriptorError::DanglingArray {
            descriptor: descriptor.to_string(),
        }),
        (State::Type, Shape::Params) => Err(DescriptorError::UnbalancedParameters {
            descriptor: descriptor.to_string(),
        }),
        (State::Type, Shape::Return) => Err(DescriptorError::MissingReturnType {
            descriptor: descriptor.to_string(),
        }),
        _ => Ok(names),
    }
}

/// Decodes a descriptor that must be exactly one non-array object reference,
/// such as the type of an annotation.
pub fn decode_object_type(descriptor: &str) -> Result<String, DescriptorError> {
    if descriptor.is_empty() {
        return Err(DescriptorError::Empty);
    }
    let Some(body) = descriptor.strip_prefix('L') else {
        return Err(DescriptorError::NotObjectType {
            descriptor: descriptor.to_string(),
        });
    };

    match body.find(';') {
        None => Err(DescriptorError::Unterminated {
            descriptor: descriptor.to_string(),
            offset: 0,
        }),
        Some(0) => Err(DescriptorError::EmptyObjectType {
            descriptor: descriptor.to_string(),
            offset: 0,
        }),
        Some(end) if end + 1 != body.len() => Err(DescriptorError::NotObjectType {
            descriptor: descriptor.to_string(),
        }),
        Some(end) => Ok(internal_to_binary(&body[..end])),
    }
}

/// `java/util/Map$Entry` -> `java.util.Map$Entry`
pub fn internal_to_binary(name: &str) -> String {
    name.replace('/', ".")
}

fn complete_type(shape: &mut Shape) {
    if matches!(shape, Shape::Start | Shape::Return) {
        *shape = Shape::Done;
    }
}
