//! Field and method descriptors
//!
//! Grammar: `B C D F I J S Z` primitives, `L<slash/name>;` objects, `[` array
//! prefix, and `(<params>)<return>` for methods where `V` is void.

use std::fmt;
use thiserror::Error;

/// Malformed descriptor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid descriptor `{descriptor}` at position {position}")]
pub struct DescriptorError {
    /// Descriptor text
    pub descriptor: String,
    /// Byte position where parsing failed
    pub position: usize,
}

/// Type of a field, parameter, local or array element
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `D`
    Double,
    /// `F`
    Float,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `S`
    Short,
    /// `Z`
    Boolean,
    /// `L<name>;` with the name in slash form
    Object(String),
    /// `[<element>`
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse a complete field descriptor
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let (ty, end) = Self::parse_at(descriptor, 0)?;
        if end != descriptor.len() {
            return Err(DescriptorError {
                descriptor: descriptor.to_string(),
                position: end,
            });
        }
        Ok(ty)
    }

    fn parse_at(descriptor: &str, position: usize) -> Result<(Self, usize), DescriptorError> {
        let error = |position| DescriptorError {
            descriptor: descriptor.to_string(),
            position,
        };
        let bytes = descriptor.as_bytes();
        let ty = match bytes.get(position).ok_or_else(|| error(position))? {
            b'B' => Self::Byte,
            b'C' => Self::Char,
            b'D' => Self::Double,
            b'F' => Self::Float,
            b'I' => Self::Int,
            b'J' => Self::Long,
            b'S' => Self::Short,
            b'Z' => Self::Boolean,
            b'L' => {
                let end = descriptor[position..]
                    .find(';')
                    .map(|rel| position + rel)
                    .ok_or_else(|| error(position))?;
                if end == position + 1 {
                    return Err(error(position));
                }
                return Ok((Self::Object(descriptor[position + 1..end].to_string()), end + 1));
            }
            b'[' => {
                let (element, end) = Self::parse_at(descriptor, position + 1)?;
                return Ok((Self::Array(Box::new(element)), end));
            }
            _ => return Err(error(position)),
        };
        Ok((ty, position + 1))
    }

    /// Type named by a Class symbol: either a slash name or an array descriptor
    pub fn from_class_name(name: &str) -> Result<Self, DescriptorError> {
        if name.starts_with('[') {
            Self::parse(name)
        } else {
            Ok(Self::Object(name.to_string()))
        }
    }

    /// Inverse of [`FieldType::from_class_name`]
    pub fn class_name(&self) -> String {
        match self {
            Self::Object(name) => name.clone(),
            other => other.to_string(),
        }
    }

    /// Underlying element type of a (possibly nested) array, or the type itself
    pub fn scalar(&self) -> &FieldType {
        match self {
            Self::Array(element) => element.scalar(),
            other => other,
        }
    }

    /// Number of array dimensions
    pub fn dimensions(&self) -> usize {
        match self {
            Self::Array(element) => 1 + element.dimensions(),
            _ => 0,
        }
    }

    /// Class name of the scalar, if it is an object type
    pub fn object_name(&self) -> Option<&str> {
        match self.scalar() {
            Self::Object(name) => Some(name),
            _ => None,
        }
    }

    /// Substitute object names; `rename` returns `None` to keep a name
    pub fn map_objects<F>(&self, rename: &mut F) -> FieldType
    where
        F: FnMut(&str) -> Option<String>,
    {
        match self {
            Self::Object(name) => Self::Object(rename(name).unwrap_or_else(|| name.clone())),
            Self::Array(element) => Self::Array(Box::new(element.map_objects(rename))),
            other => other.clone(),
        }
    }

    /// Source-like rendering, e.g. `int[]` or `pkg.Outer.Inner`
    pub fn human(&self) -> String {
        match self {
            Self::Byte => "byte".into(),
            Self::Char => "char".into(),
            Self::Double => "double".into(),
            Self::Float => "float".into(),
            Self::Int => "int".into(),
            Self::Long => "long".into(),
            Self::Short => "short".into(),
            Self::Boolean => "boolean".into(),
            Self::Object(name) => human_class_name(name),
            Self::Array(element) => format!("{}[]", element.human()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte => f.write_str("B"),
            Self::Char => f.write_str("C"),
            Self::Double => f.write_str("D"),
            Self::Float => f.write_str("F"),
            Self::Int => f.write_str("I"),
            Self::Long => f.write_str("J"),
            Self::Short => f.write_str("S"),
            Self::Boolean => f.write_str("Z"),
            Self::Object(name) => write!(f, "L{name};"),
            Self::Array(element) => write!(f, "[{element}"),
        }
    }
}

/// Parameter and return types of a method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types in order
    pub params: Vec<FieldType>,
    /// Return type, `None` for void
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parse a method descriptor
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let error = |position| DescriptorError {
            descriptor: descriptor.to_string(),
            position,
        };
        if !descriptor.starts_with('(') {
            return Err(error(0));
        }
        let mut position = 1;
        let mut params = Vec::new();
        loop {
            match descriptor.as_bytes().get(position) {
                Some(b')') => break,
                Some(_) => {
                    let (param, end) = FieldType::parse_at(descriptor, position)?;
                    params.push(param);
                    position = end;
                }
                None => return Err(error(position)),
            }
        }
        let rest = &descriptor[position + 1..];
        let ret = if rest == "V" {
            None
        } else {
            let (ty, end) = FieldType::parse_at(descriptor, position + 1)?;
            if end != descriptor.len() {
                return Err(error(end));
            }
            Some(ty)
        };
        Ok(Self { params, ret })
    }

    /// Substitute object names in every parameter and the return type
    pub fn map_objects<F>(&self, rename: &mut F) -> MethodDescriptor
    where
        F: FnMut(&str) -> Option<String>,
    {
        Self {
            params: self.params.iter().map(|p| p.map_objects(rename)).collect(),
            ret: self.ret.as_ref().map(|r| r.map_objects(rename)),
        }
    }

    /// Source-like parameter list, e.g. `int, java.lang.String`
    pub fn human_params(&self) -> String {
        self.params
            .iter()
            .map(FieldType::human)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            write!(f, "{param}")?;
        }
        f.write_str(")")?;
        match &self.ret {
            Some(ret) => write!(f, "{ret}"),
            None => f.write_str("V"),
        }
    }
}

/// Rewrite object names inside a field or method descriptor
pub fn remap_descriptor<F>(descriptor: &str, mut rename: F) -> Result<String, DescriptorError>
where
    F: FnMut(&str) -> Option<String>,
{
    if descriptor.starts_with('(') {
        Ok(MethodDescriptor::parse(descriptor)?
            .map_objects(&mut rename)
            .to_string())
    } else {
        Ok(FieldType::parse(descriptor)?
            .map_objects(&mut rename)
            .to_string())
    }
}

/// Rewrite the object name inside a Class symbol name (plain or array form)
pub fn remap_class_name<F>(name: &str, mut rename: F) -> Result<String, DescriptorError>
where
    F: FnMut(&str) -> Option<String>,
{
    Ok(FieldType::from_class_name(name)?
        .map_objects(&mut rename)
        .class_name())
}

/// `pkg/Outer$Inner` -> `pkg.Outer.Inner`
pub fn human_class_name(name: &str) -> String {
    name.replace(['/', '$'], ".")
}

/// Outermost enclosing name: everything before the first `$`
pub fn outermost_name(name: &str) -> &str {
    name.split_once('$').map_or(name, |(outer, _)| outer)
}

/// Nesting path after the first `$`, if the name is nested
pub fn nested_path(name: &str) -> Option<&str> {
    name.split_once('$').map(|(_, path)| path)
}
