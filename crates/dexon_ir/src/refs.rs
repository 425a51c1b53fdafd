//! Symbolic references to fields, methods, prototypes, method handles and call sites.
//!
//! References are value types: two references naming the same member compare
//! equal, which is what lets a constant pool collapse duplicates.

use crate::descriptor;
use crate::value::EncodedValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A field reference: declaring class, name and type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    /// Descriptor of the declaring class.
    pub class: String,
    /// Field name.
    pub name: String,
    /// Descriptor of the field type.
    pub type_: String,
}

impl FieldRef {
    /// Creates a field reference.
    pub fn new(class: impl Into<String>, name: impl Into<String>, type_: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            type_: type_.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}:{}", self.class, self.name, self.type_)
    }
}

/// A method prototype: return type and parameter types.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prototype {
    /// Descriptor of the return type (`V` for void).
    pub return_type: String,
    /// Descriptors of the parameter types, in order.
    pub parameters: Vec<String>,
}

impl Prototype {
    /// Creates a prototype.
    pub fn new(return_type: impl Into<String>, parameters: Vec<String>) -> Self {
        Self {
            return_type: return_type.into(),
            parameters,
        }
    }

    /// Returns the shorty descriptor, e.g. `VIL` for `(ILjava/lang/String;)V`.
    pub fn shorty(&self) -> String {
        std::iter::once(&self.return_type)
            .chain(&self.parameters)
            .map(|d| descriptor::shorty_char(d))
            .collect()
    }

    /// Returns the number of registers the parameters occupy, excluding `this`.
    pub fn parameter_registers(&self) -> u16 {
        self.parameters
            .iter()
            .map(|p| descriptor::register_width(p))
            .sum()
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}){}", self.parameters.concat(), self.return_type)
    }
}

/// A method reference: declaring class, name and prototype.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    /// Descriptor of the declaring class.
    pub class: String,
    /// Method name.
    pub name: String,
    /// Method prototype.
    pub proto: Prototype,
}

impl MethodRef {
    /// Creates a method reference.
    pub fn new(class: impl Into<String>, name: impl Into<String>, proto: Prototype) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            proto,
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{}", self.class, self.name, self.proto)
    }
}

/// The operation a method handle performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodHandleKind {
    /// Static field setter.
    StaticPut,
    /// Static field getter.
    StaticGet,
    /// Instance field setter.
    InstancePut,
    /// Instance field getter.
    InstanceGet,
    /// Static method invoker.
    InvokeStatic,
    /// Instance method invoker.
    InvokeInstance,
    /// Constructor invoker.
    InvokeConstructor,
    /// Direct method invoker.
    InvokeDirect,
    /// Interface method invoker.
    InvokeInterface,
}

impl MethodHandleKind {
    /// Returns the dex `method_handle_type` code.
    pub fn code(self) -> u16 {
        match self {
            MethodHandleKind::StaticPut => 0x00,
            MethodHandleKind::StaticGet => 0x01,
            MethodHandleKind::InstancePut => 0x02,
            MethodHandleKind::InstanceGet => 0x03,
            MethodHandleKind::InvokeStatic => 0x04,
            MethodHandleKind::InvokeInstance => 0x05,
            MethodHandleKind::InvokeConstructor => 0x06,
            MethodHandleKind::InvokeDirect => 0x07,
            MethodHandleKind::InvokeInterface => 0x08,
        }
    }

    /// Returns `true` for the field accessor kinds.
    pub fn is_field_access(self) -> bool {
        matches!(
            self,
            MethodHandleKind::StaticPut
                | MethodHandleKind::StaticGet
                | MethodHandleKind::InstancePut
                | MethodHandleKind::InstanceGet
        )
    }
}

/// What a method handle points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodHandleTarget {
    /// A field, for accessor handles.
    Field(FieldRef),
    /// A method, for invoker handles.
    Method(MethodRef),
}

/// A method handle constant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodHandle {
    /// Handle kind.
    pub kind: MethodHandleKind,
    /// Referenced member; must agree with `kind`.
    pub target: MethodHandleTarget,
}

/// An `invoke-custom` call site.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSite {
    /// Bootstrap method handle.
    pub bootstrap: MethodHandle,
    /// Name passed to the bootstrap method.
    pub method_name: String,
    /// Type of the dynamically linked method.
    pub method_type: Prototype,
    /// Extra static arguments to the bootstrap method.
    pub extra_args: Vec<EncodedValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proto(ret: &str, params: &[&str]) -> Prototype {
        Prototype::new(ret, params.iter().map(|p| p.to_string()).collect())
    }

    #[test]
    fn shorty() {
        assert_eq!(proto("V", &[]).shorty(), "V");
        assert_eq!(
            proto("Ljava/lang/String;", &["I", "[J", "D"]).shorty(),
            "LILD"
        );
    }

    #[test]
    fn parameter_registers_count_wide() {
        assert_eq!(proto("V", &["J", "I", "D", "LFoo;"]).parameter_registers(), 6);
    }

    #[test]
    fn display() {
        let m = MethodRef::new("LFoo;", "run", proto("V", &["I", "LBar;"]));
        assert_eq!(m.to_string(), "LFoo;->run(ILBar;)V");
        let f = FieldRef::new("LFoo;", "count", "I");
        assert_eq!(f.to_string(), "LFoo;->count:I");
    }

    #[test]
    fn handle_kinds() {
        assert_eq!(MethodHandleKind::InvokeInterface.code(), 8);
        assert!(MethodHandleKind::StaticGet.is_field_access());
        assert!(!MethodHandleKind::InvokeStatic.is_field_access());
    }

    #[test]
    fn equal_refs_hash_equal() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(MethodRef::new("LFoo;", "a", proto("V", &[])));
        set.insert(MethodRef::new("LFoo;", "a", proto("V", &[])));
        assert_eq!(set.len(), 1);
    }
}
