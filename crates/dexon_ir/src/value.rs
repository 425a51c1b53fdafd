//! Encoded constant values and annotations.

use crate::refs::{FieldRef, MethodHandle, MethodRef, Prototype};
use serde::{Deserialize, Serialize};

/// A constant value as it appears in static initializers, annotations and
/// call-site arguments.
///
/// Floating point values are stored as their IEEE bit patterns so that values
/// can be hashed and compared exactly.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncodedValue {
    /// A `byte` constant.
    Byte(i8),
    /// A `short` constant.
    Short(i16),
    /// A `char` constant.
    Char(u16),
    /// An `int` constant.
    Int(i32),
    /// A `long` constant.
    Long(i64),
    /// A `float` constant, as raw bits.
    Float(u32),
    /// A `double` constant, as raw bits.
    Double(u64),
    /// A method type constant.
    MethodType(Prototype),
    /// A method handle constant.
    MethodHandle(MethodHandle),
    /// A string constant.
    String(String),
    /// A class literal, as a descriptor.
    Type(String),
    /// A field reference.
    Field(FieldRef),
    /// A method reference.
    Method(MethodRef),
    /// An enum constant, referenced through its field.
    Enum(FieldRef),
    /// An array of values.
    Array(Vec<EncodedValue>),
    /// A nested annotation.
    Annotation(EncodedAnnotation),
    /// `null`.
    Null,
    /// A `boolean` constant.
    Boolean(bool),
}

impl EncodedValue {
    /// Returns the default value of a field of the given type.
    pub fn default_for(type_desc: &str) -> Self {
        match type_desc {
            "Z" => EncodedValue::Boolean(false),
            "B" => EncodedValue::Byte(0),
            "S" => EncodedValue::Short(0),
            "C" => EncodedValue::Char(0),
            "I" => EncodedValue::Int(0),
            "J" => EncodedValue::Long(0),
            "F" => EncodedValue::Float(0),
            "D" => EncodedValue::Double(0),
            _ => EncodedValue::Null,
        }
    }

    /// Creates a `float` constant.
    pub fn float(value: f32) -> Self {
        EncodedValue::Float(value.to_bits())
    }

    /// Creates a `double` constant.
    pub fn double(value: f64) -> Self {
        EncodedValue::Double(value.to_bits())
    }
}

/// Retention of an annotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// Visible only at build time.
    Build,
    /// Visible at runtime.
    Runtime,
    /// Used by the runtime itself (signatures, inner classes).
    System,
}

impl Visibility {
    /// Returns the dex visibility byte.
    pub fn code(self) -> u8 {
        match self {
            Visibility::Build => 0x00,
            Visibility::Runtime => 0x01,
            Visibility::System => 0x02,
        }
    }
}

/// One `name = value` pair of an annotation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotationElement {
    /// Element name.
    pub name: String,
    /// Element value.
    pub value: EncodedValue,
}

/// An annotation without retention, as nested in values.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncodedAnnotation {
    /// Descriptor of the annotation type.
    pub type_: String,
    /// Elements, in any order.
    pub elements: Vec<AnnotationElement>,
}

/// An annotation attached to a class, field, method or parameter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Annotation {
    /// Retention.
    pub visibility: Visibility,
    /// The annotation itself.
    pub annotation: EncodedAnnotation,
}

impl Annotation {
    /// Creates an annotation without elements.
    pub fn marker(visibility: Visibility, type_: impl Into<String>) -> Self {
        Self {
            visibility,
            annotation: EncodedAnnotation {
                type_: type_.into(),
                elements: Vec::new(),
            },
        }
    }

    /// Returns the annotation type descriptor.
    pub fn type_(&self) -> &str {
        &self.annotation.type_
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(EncodedValue::default_for("I"), EncodedValue::Int(0));
        assert_eq!(EncodedValue::default_for("Z"), EncodedValue::Boolean(false));
        assert_eq!(EncodedValue::default_for("[I"), EncodedValue::Null);
        assert_eq!(EncodedValue::default_for("LFoo;"), EncodedValue::Null);
    }

    #[test]
    fn floats_compare_by_bits() {
        assert_eq!(EncodedValue::float(1.5), EncodedValue::float(1.5));
        assert_ne!(EncodedValue::double(0.0), EncodedValue::double(-0.0));
    }

    #[test]
    fn marker_annotation() {
        let a = Annotation::marker(Visibility::Build, "Lcom/example/MainDex;");
        assert_eq!(a.type_(), "Lcom/example/MainDex;");
        assert!(a.annotation.elements.is_empty());
        assert_eq!(a.visibility.code(), 0);
    }
}
