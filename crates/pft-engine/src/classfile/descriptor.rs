//! Field and method descriptors (JVMS 4.3)

use super::class::ClassFileError;
use std::fmt;

/// A field type
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
    /// `L<internal name>;`
    Object(String),
    /// `[<component>`
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse a complete field descriptor
    pub fn parse(descriptor: &str) -> Result<Self, ClassFileError> {
        let (ty, rest) = parse_field_type(descriptor, descriptor)?;
        if !rest.is_empty() {
            return Err(invalid(descriptor));
        }
        Ok(ty)
    }

    /// Operand stack / local slots taken by a value of this type
    pub fn slots(&self) -> u16 {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }

    /// Check for reference types
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Byte => write!(f, "B"),
            FieldType::Char => write!(f, "C"),
            FieldType::Double => write!(f, "D"),
            FieldType::Float => write!(f, "F"),
            FieldType::Int => write!(f, "I"),
            FieldType::Long => write!(f, "J"),
            FieldType::Short => write!(f, "S"),
            FieldType::Boolean => write!(f, "Z"),
            FieldType::Object(name) => write!(f, "L{};", name),
            FieldType::Array(component) => write!(f, "[{}", component),
        }
    }
}

/// A parsed method descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types in order
    pub params: Vec<FieldType>,
    /// Return type, `None` for `V`
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parse a method descriptor such as `(ILjava/lang/String;)V`
    pub fn parse(descriptor: &str) -> Result<Self, ClassFileError> {
        let mut rest = descriptor
            .strip_prefix('(')
            .ok_or_else(|| invalid(descriptor))?;

        let mut params = Vec::new();
        while !rest.starts_with(')') {
            if rest.is_empty() {
                return Err(invalid(descriptor));
            }
            let (ty, next) = parse_field_type(rest, descriptor)?;
            params.push(ty);
            rest = next;
        }
        rest = &rest[1..];

        let ret = if rest == "V" {
            None
        } else {
            Some(FieldType::parse(rest).map_err(|_| invalid(descriptor))?)
        };

        Ok(Self { params, ret })
    }

    /// Slots taken by the parameters, excluding any receiver
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(FieldType::slots).sum()
    }

    /// Slots pushed by the return value
    pub fn return_slots(&self) -> u16 {
        self.ret.as_ref().map_or(0, FieldType::slots)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        write!(f, ")")?;
        match &self.ret {
            Some(ret) => write!(f, "{}", ret),
            None => write!(f, "V"),
        }
    }
}

fn invalid(descriptor: &str) -> ClassFileError {
    ClassFileError::InvalidDescriptor(descriptor.to_string())
}

fn parse_field_type<'a>(input: &'a str, whole: &str) -> Result<(FieldType, &'a str), ClassFileError> {
    let mut chars = input.chars();
    let ty = match chars.next() {
        Some('B') => FieldType::Byte,
        Some('C') => FieldType::Char,
        Some('D') => FieldType::Double,
        Some('F') => FieldType::Float,
        Some('I') => FieldType::Int,
        Some('J') => FieldType::Long,
        Some('S') => FieldType::Short,
        Some('Z') => FieldType::Boolean,
        Some('L') => {
            let body = &input[1..];
            let end = body.find(';').ok_or_else(|| invalid(whole))?;
            let name = &body[..end];
            if name.is_empty() || name.contains(['.', '[']) {
                return Err(invalid(whole));
            }
            return Ok((FieldType::Object(name.to_string()), &body[end + 1..]));
        }
        Some('[') => {
            let (component, rest) = parse_field_type(&input[1..], whole)?;
            return Ok((FieldType::Array(Box::new(component)), rest));
        }
        _ => return Err(invalid(whole)),
    };
    Ok((ty, chars.as_str()))
}

/// Internal name (`a/b/C`) to binary name (`a.b.C`)
pub fn external_name(internal: &str) -> String {
    internal.replace('/', ".")
}

/// Binary name (`a.b.C`) to internal name (`a/b/C`)
pub fn internal_name(external: &str) -> String {
    external.replace('.', "/")
}

/// Package part of an internal name, empty for the default package
pub fn package_of(internal: &str) -> &str {
    internal.rfind('/').map_or("", |i| &internal[..i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_descriptor() {
        let desc = MethodDescriptor::parse("(IJ[Ljava/lang/String;D)Ljava/lang/Object;").unwrap();
        assert_eq!(desc.params.len(), 4);
        assert_eq!(desc.param_slots(), 1 + 2 + 1 + 2);
        assert_eq!(desc.return_slots(), 1);
        assert_eq!(
            desc.params[2],
            FieldType::Array(Box::new(FieldType::Object("java/lang/String".into())))
        );
        assert_eq!(desc.to_string(), "(IJ[Ljava/lang/String;D)Ljava/lang/Object;");
    }

    #[test]
    fn test_void_and_long_return() {
        assert_eq!(MethodDescriptor::parse("()V").unwrap().return_slots(), 0);
        assert_eq!(MethodDescriptor::parse("()J").unwrap().return_slots(), 2);
    }

    #[test]
    fn test_invalid_descriptors() {
        for bad in ["", "I", "(", "(I", "(Q)V", "()", "(Ljava/lang/String)V", "(L;)V", "()VV", "Ia"] {
            let method = MethodDescriptor::parse(bad);
            let field = FieldType::parse(bad);
            assert!(method.is_err() || field.is_err(), "{} accepted", bad);
        }
        assert!(matches!(
            MethodDescriptor::parse("(X)V"),
            Err(ClassFileError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_names() {
        assert_eq!(external_name("a/b/C"), "a.b.C");
        assert_eq!(internal_name("a.b.C"), "a/b/C");
        assert_eq!(package_of("a/b/C"), "a/b");
        assert_eq!(package_of("C"), "");
    }
}
