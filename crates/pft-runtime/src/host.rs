//! Host natives
//!
//! Methods of platform types that installed classes call into: the
//! `java/lang/Object` constructor and identity methods, common `String`
//! methods, primitive boxing, and `StringConcatFactory` recipes.

use crate::defaults::OBJECT_CLASS;
use crate::error::{RuntimeError, RuntimeResult};
use crate::value::Value;
use pft_engine::classfile::{external_name, FieldType, MethodDescriptor};
use std::sync::Arc;

const RECIPE_ARGUMENT: char = '\u{1}';
const RECIPE_CONSTANT: char = '\u{2}';

fn no_such_method(owner: &str, name: &str, descriptor: &str) -> RuntimeError {
    RuntimeError::NoSuchMethod(format!("{}.{}{}", owner, name, descriptor))
}

fn string_arg<'a>(args: &'a [Value], index: usize, method: &str) -> RuntimeResult<&'a str> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s),
        Some(Value::Null) => Err(RuntimeError::NullPointer(format!("String.{} argument", method))),
        _ => Err(RuntimeError::TypeError(format!("String.{} expects a string argument", method))),
    }
}

/// `hashCode` of a string: `s[0]*31^(n-1) + ... + s[n-1]` over UTF-16 units
pub fn string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Identity hash of a reference
pub fn identity_hash(value: &Value) -> i32 {
    let address = match value {
        Value::Object(object) => Arc::as_ptr(object) as *const u8 as usize,
        Value::Lambda(lambda) => Arc::as_ptr(lambda) as *const u8 as usize,
        Value::Str(s) => return string_hash(s),
        _ => 0,
    };
    (address >> 3) as i32
}

/// Text form used by `String.valueOf` and string concatenation
pub fn to_display_string(value: &Value, ty: Option<&FieldType>) -> String {
    match (value, ty) {
        (Value::Int(v), Some(FieldType::Boolean)) => (*v != 0).to_string(),
        (Value::Int(v), Some(FieldType::Char)) => char::from_u32(*v as u32 & 0xFFFF)
            .map(String::from)
            .unwrap_or_default(),
        (Value::Int(v), _) => v.to_string(),
        (Value::Long(v), _) => v.to_string(),
        (Value::Float(v), _) => format!("{:?}", v),
        (Value::Double(v), _) => format!("{:?}", v),
        (Value::Null, _) => "null".to_string(),
        (Value::Str(s), _) => s.to_string(),
        (other, _) => default_to_string(other),
    }
}

fn default_to_string(value: &Value) -> String {
    let class = value.class_name().unwrap_or(OBJECT_CLASS);
    format!("{}@{:x}", external_name(class), identity_hash(value))
}

/// `java/lang/Object.<init>`
pub fn constructor(owner: &str, descriptor: &str, receiver: &Value) -> RuntimeResult<()> {
    if owner != OBJECT_CLASS || descriptor != "()V" {
        return Err(no_such_method(owner, "<init>", descriptor));
    }
    if receiver.is_null() {
        return Err(RuntimeError::NullPointer("Object.<init> on null".into()));
    }
    Ok(())
}

/// Methods every reference inherits from `java/lang/Object`
pub fn object_method(receiver: &Value, name: &str, descriptor: &str, args: &[Value]) -> RuntimeResult<Option<Value>> {
    let result = match (name, descriptor) {
        ("hashCode", "()I") => Value::Int(identity_hash(receiver)),
        ("equals", "(Ljava/lang/Object;)Z") => {
            let other = args.first().cloned().unwrap_or(Value::Null);
            Value::from(receiver.same_reference(&other))
        }
        ("toString", "()Ljava/lang/String;") => Value::from(default_to_string(receiver)),
        _ => return Err(no_such_method(OBJECT_CLASS, name, descriptor)),
    };
    Ok(Some(result))
}

/// Instance methods of `java/lang/String`
pub fn string_method(receiver: &Arc<str>, name: &str, descriptor: &str, args: &[Value]) -> RuntimeResult<Option<Value>> {
    let s: &str = receiver;
    let result = match (name, descriptor) {
        ("length", "()I") => Value::Int(s.encode_utf16().count() as i32),
        ("isEmpty", "()Z") => Value::from(s.is_empty()),
        ("trim", "()Ljava/lang/String;") => Value::from(s.trim_matches(|c: char| c <= ' ')),
        ("strip", "()Ljava/lang/String;") => Value::from(s.trim()),
        ("toUpperCase", "()Ljava/lang/String;") => Value::from(s.to_uppercase()),
        ("toLowerCase", "()Ljava/lang/String;") => Value::from(s.to_lowercase()),
        ("toString", "()Ljava/lang/String;") => Value::Str(Arc::clone(receiver)),
        ("hashCode", "()I") => Value::Int(string_hash(s)),
        ("concat", "(Ljava/lang/String;)Ljava/lang/String;") => {
            let other = string_arg(args, 0, name)?;
            Value::from(format!("{}{}", s, other))
        }
        ("equals", "(Ljava/lang/Object;)Z") => {
            Value::from(matches!(args.first(), Some(Value::Str(other)) if **other == *s))
        }
        ("contains", "(Ljava/lang/CharSequence;)Z") => Value::from(s.contains(string_arg(args, 0, name)?)),
        ("startsWith", "(Ljava/lang/String;)Z") => Value::from(s.starts_with(string_arg(args, 0, name)?)),
        ("endsWith", "(Ljava/lang/String;)Z") => Value::from(s.ends_with(string_arg(args, 0, name)?)),
        ("charAt", "(I)C") => {
            let index = args.first().map(Value::as_int).transpose()?.unwrap_or(0);
            let unit = usize::try_from(index)
                .ok()
                .and_then(|i| s.encode_utf16().nth(i))
                .ok_or_else(|| RuntimeError::TypeError(format!("String index out of range: {}", index)))?;
            Value::Int(unit as i32)
        }
        _ => return object_method(&Value::Str(Arc::clone(receiver)), name, descriptor, args)
            .map_err(|_| no_such_method("java/lang/String", name, descriptor)),
    };
    Ok(Some(result))
}

/// Unboxing methods on boxed primitives, which are represented unboxed
pub fn primitive_method(receiver: &Value, owner: &str, name: &str, descriptor: &str) -> RuntimeResult<Option<Value>> {
    match (receiver, name) {
        (Value::Int(_), "intValue" | "booleanValue" | "charValue")
        | (Value::Long(_), "longValue")
        | (Value::Float(_), "floatValue")
        | (Value::Double(_), "doubleValue") => Ok(Some(receiver.clone())),
        (_, "toString") => Ok(Some(Value::from(to_display_string(receiver, None)))),
        _ => Err(no_such_method(owner, name, descriptor)),
    }
}

/// Static methods of host classes
pub fn static_method(owner: &str, name: &str, descriptor: &str, args: &[Value]) -> RuntimeResult<Option<Value>> {
    let desc = MethodDescriptor::parse(descriptor)?;
    let first = args.first().cloned().unwrap_or(Value::Null);
    let result = match (owner, name) {
        ("java/lang/String", "valueOf") if desc.params.len() == 1 => {
            Value::from(to_display_string(&first, desc.params.first()))
        }
        ("java/util/Objects", "requireNonNull") if !desc.params.is_empty() => {
            if first.is_null() {
                return Err(RuntimeError::NullPointer("Objects.requireNonNull".into()));
            }
            first
        }
        (
            "java/lang/Integer" | "java/lang/Long" | "java/lang/Boolean" | "java/lang/Character"
            | "java/lang/Float" | "java/lang/Double",
            "valueOf",
        ) if desc.params.len() == 1 && !desc.params[0].is_reference() => first,
        _ => return Err(no_such_method(owner, name, descriptor)),
    };
    Ok(Some(result))
}

/// Apply a `makeConcatWithConstants` recipe
///
/// `\u{1}` takes the next argument, `\u{2}` the next static constant.
pub fn concat(recipe: &str, constants: &[String], descriptor: &MethodDescriptor, args: &[Value]) -> RuntimeResult<Value> {
    let mut out = String::new();
    let mut args = args.iter().zip(&descriptor.params);
    let mut constants = constants.iter();
    for c in recipe.chars() {
        match c {
            RECIPE_ARGUMENT => {
                let (value, ty) = args
                    .next()
                    .ok_or_else(|| RuntimeError::TypeError("concat recipe has more arguments than the call site".into()))?;
                out.push_str(&to_display_string(value, Some(ty)));
            }
            RECIPE_CONSTANT => {
                let constant = constants
                    .next()
                    .ok_or_else(|| RuntimeError::TypeError("concat recipe has more constants than the bootstrap".into()))?;
                out.push_str(constant);
            }
            c => out.push(c),
        }
    }
    Ok(Value::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(receiver: &str, name: &str, descriptor: &str, args: &[Value]) -> Option<Value> {
        string_method(&Arc::from(receiver), name, descriptor, args).unwrap()
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(call("  hi \n", "trim", "()Ljava/lang/String;", &[]), Some(Value::from("hi")));
        assert_eq!(call("héllo", "length", "()I", &[]), Some(Value::Int(5)));
        assert_eq!(call("ab", "toUpperCase", "()Ljava/lang/String;", &[]), Some(Value::from("AB")));
        assert_eq!(
            call("ab", "concat", "(Ljava/lang/String;)Ljava/lang/String;", &[Value::from("cd")]),
            Some(Value::from("abcd"))
        );
        assert_eq!(
            call("ab", "equals", "(Ljava/lang/Object;)Z", &[Value::from("ab")]),
            Some(Value::Int(1))
        );
        assert_eq!(call("abc", "charAt", "(I)C", &[Value::Int(1)]), Some(Value::Int('b' as i32)));
    }

    #[test]
    fn test_string_hash_matches_platform() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        assert_eq!(string_hash("hello"), 99162322);
    }

    #[test]
    fn test_unknown_method() {
        let err = string_method(&Arc::from("x"), "intern", "()Ljava/lang/String;", &[]).unwrap_err();
        assert_eq!(err, RuntimeError::NoSuchMethod("java/lang/String.intern()Ljava/lang/String;".into()));
    }

    #[test]
    fn test_static_natives() {
        assert_eq!(
            static_method("java/lang/String", "valueOf", "(I)Ljava/lang/String;", &[Value::Int(42)]).unwrap(),
            Some(Value::from("42"))
        );
        assert_eq!(
            static_method("java/lang/String", "valueOf", "(Z)Ljava/lang/String;", &[Value::Int(1)]).unwrap(),
            Some(Value::from("true"))
        );
        assert!(matches!(
            static_method("java/util/Objects", "requireNonNull", "(Ljava/lang/Object;)Ljava/lang/Object;", &[Value::Null]),
            Err(RuntimeError::NullPointer(_))
        ));
    }

    #[test]
    fn test_concat_recipe() {
        let descriptor = MethodDescriptor::parse("(ILjava/lang/String;C)Ljava/lang/String;").unwrap();
        let args = [Value::Int(3), Value::from("x"), Value::Int('!' as i32)];
        let result = concat("n=\u{1} \u{2} \u{1}\u{1}", &["and".to_string()], &descriptor, &args).unwrap();
        assert_eq!(result, Value::from("n=3 and x!"));
    }
}
