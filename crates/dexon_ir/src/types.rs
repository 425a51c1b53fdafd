//! The compiled form of one class or interface.

use crate::access::{ACC_CONSTRUCTOR, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC};
use crate::code::{Code, Instruction};
use crate::descriptor;
use crate::refs::{CallSite, FieldRef, MethodHandle, MethodHandleTarget, MethodRef, Prototype};
use crate::value::{Annotation, EncodedAnnotation, EncodedValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Descriptor of the root class.
pub const OBJECT: &str = "Ljava/lang/Object;";

/// A field declared by a compiled type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Field type descriptor.
    pub type_: String,
    /// Access flags.
    pub access_flags: u32,
    /// Initial value of a static field.
    pub initial_value: Option<EncodedValue>,
    /// Field annotations.
    pub annotations: Vec<Annotation>,
}

impl FieldDef {
    /// Creates a field without initial value or annotations.
    pub fn new(name: impl Into<String>, type_: impl Into<String>, access_flags: u32) -> Self {
        Self {
            name: name.into(),
            type_: type_.into(),
            access_flags,
            initial_value: None,
            annotations: Vec::new(),
        }
    }

    /// Returns `true` for static fields.
    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }
}

/// A method declared by a compiled type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDef {
    /// Method name.
    pub name: String,
    /// Method prototype.
    pub proto: Prototype,
    /// Access flags.
    pub access_flags: u32,
    /// Body; `None` for abstract and native methods.
    pub code: Option<Code>,
    /// Method annotations.
    pub annotations: Vec<Annotation>,
    /// Per-parameter annotations; empty if none.
    pub parameter_annotations: Vec<Vec<Annotation>>,
}

impl MethodDef {
    /// Creates a method without annotations.
    pub fn new(
        name: impl Into<String>,
        proto: Prototype,
        access_flags: u32,
        code: Option<Code>,
    ) -> Self {
        Self {
            name: name.into(),
            proto,
            access_flags,
            code,
            annotations: Vec::new(),
            parameter_annotations: Vec::new(),
        }
    }

    /// Returns `true` for static methods.
    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    /// Returns `true` for methods dispatched without a vtable: static,
    /// private and constructors.
    pub fn is_direct(&self) -> bool {
        self.access_flags & (ACC_STATIC | ACC_PRIVATE | ACC_CONSTRUCTOR) != 0
    }
}

/// One class or interface, fully compiled.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompiledType {
    /// Class descriptor, e.g. `Lcom/example/App;`.
    pub descriptor: String,
    /// Access flags.
    pub access_flags: u32,
    /// Superclass descriptor; `None` only for `java.lang.Object`.
    pub superclass: Option<String>,
    /// Implemented interfaces, in declaration order.
    pub interfaces: Vec<String>,
    /// Source file name for stack traces.
    pub source_file: Option<String>,
    /// Class annotations.
    pub annotations: Vec<Annotation>,
    /// Declared fields.
    pub fields: Vec<FieldDef>,
    /// Declared methods.
    pub methods: Vec<MethodDef>,
}

impl CompiledType {
    /// Creates a public class extending `java.lang.Object` with no members.
    pub fn new(descriptor: impl Into<String>) -> Self {
        let descriptor = descriptor.into();
        let superclass = (descriptor != OBJECT).then(|| OBJECT.to_string());
        Self {
            descriptor,
            access_flags: ACC_PUBLIC,
            superclass,
            interfaces: Vec::new(),
            source_file: None,
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Sets the superclass.
    pub fn with_superclass(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    /// Adds an implemented interface.
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Adds a field.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a method.
    pub fn with_method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    /// Adds a class annotation.
    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Sets the source file name.
    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }

    /// Returns the reference to one of this type's fields.
    pub fn field_ref(&self, field: &FieldDef) -> FieldRef {
        FieldRef::new(&self.descriptor, &field.name, &field.type_)
    }

    /// Returns the reference to one of this type's methods.
    pub fn method_ref(&self, method: &MethodDef) -> MethodRef {
        MethodRef::new(&self.descriptor, &method.name, method.proto.clone())
    }

    /// Returns `true` if the type carries an annotation of the given type.
    pub fn has_annotation(&self, type_: &str) -> bool {
        self.annotations.iter().any(|a| a.type_() == type_)
    }

    /// Returns every class descriptor this type mentions, excluding itself.
    ///
    /// Array types contribute their element class; primitives contribute
    /// nothing.
    pub fn referenced_types(&self) -> BTreeSet<String> {
        let mut refs = ClassRefs::default();
        refs.add_type(self.superclass.as_deref().unwrap_or(""));
        for interface in &self.interfaces {
            refs.add_type(interface);
        }
        refs.add_annotations(&self.annotations);
        for field in &self.fields {
            refs.add_type(&field.type_);
            refs.add_annotations(&field.annotations);
            if let Some(value) = &field.initial_value {
                refs.add_value(value);
            }
        }
        for method in &self.methods {
            refs.add_proto(&method.proto);
            refs.add_annotations(&method.annotations);
            for params in &method.parameter_annotations {
                refs.add_annotations(params);
            }
            if let Some(code) = &method.code {
                refs.add_code(code);
            }
        }
        refs.0.remove(&self.descriptor);
        refs.0
    }

    /// Returns the superclass and interfaces, superclass first.
    pub fn supertypes(&self) -> impl Iterator<Item = &str> {
        self.superclass
            .iter()
            .chain(&self.interfaces)
            .map(String::as_str)
    }
}

#[derive(Default)]
struct ClassRefs(BTreeSet<String>);

impl ClassRefs {
    fn add_type(&mut self, desc: &str) {
        if let Some(class) = descriptor::referenced_class(desc) {
            if !self.0.contains(class) {
                self.0.insert(class.to_string());
            }
        }
    }

    fn add_proto(&mut self, proto: &Prototype) {
        self.add_type(&proto.return_type);
        for param in &proto.parameters {
            self.add_type(param);
        }
    }

    fn add_field(&mut self, field: &FieldRef) {
        self.add_type(&field.class);
        self.add_type(&field.type_);
    }

    fn add_method(&mut self, method: &MethodRef) {
        self.add_type(&method.class);
        self.add_proto(&method.proto);
    }

    fn add_handle(&mut self, handle: &MethodHandle) {
        match &handle.target {
            MethodHandleTarget::Field(f) => self.add_field(f),
            MethodHandleTarget::Method(m) => self.add_method(m),
        }
    }

    fn add_call_site(&mut self, site: &CallSite) {
        self.add_handle(&site.bootstrap);
        self.add_proto(&site.method_type);
        for arg in &site.extra_args {
            self.add_value(arg);
        }
    }

    fn add_annotations(&mut self, annotations: &[Annotation]) {
        for a in annotations {
            self.add_encoded_annotation(&a.annotation);
        }
    }

    fn add_encoded_annotation(&mut self, a: &EncodedAnnotation) {
        self.add_type(&a.type_);
        for element in &a.elements {
            self.add_value(&element.value);
        }
    }

    fn add_value(&mut self, value: &EncodedValue) {
        match value {
            EncodedValue::MethodType(p) => self.add_proto(p),
            EncodedValue::MethodHandle(h) => self.add_handle(h),
            EncodedValue::Type(t) => self.add_type(t),
            EncodedValue::Field(f) | EncodedValue::Enum(f) => self.add_field(f),
            EncodedValue::Method(m) => self.add_method(m),
            EncodedValue::Array(values) => {
                for v in values {
                    self.add_value(v);
                }
            }
            EncodedValue::Annotation(a) => self.add_encoded_annotation(a),
            _ => {}
        }
    }

    fn add_code(&mut self, code: &Code) {
        for insn in &code.instructions {
            match insn {
                Instruction::ConstClass { type_, .. }
                | Instruction::CheckCast { type_, .. }
                | Instruction::InstanceOf { type_, .. }
                | Instruction::NewInstance { type_, .. }
                | Instruction::NewArray { type_, .. } => self.add_type(type_),
                Instruction::ConstMethodHandle { handle, .. } => self.add_handle(handle),
                Instruction::ConstMethodType { proto, .. } => self.add_proto(proto),
                Instruction::InstanceField { field, .. } | Instruction::StaticField { field, .. } => {
                    self.add_field(field)
                }
                Instruction::Invoke { method, .. } | Instruction::InvokeRange { method, .. } => {
                    self.add_method(method)
                }
                Instruction::InvokeCustom { call_site, .. } => self.add_call_site(call_site),
                _ => {}
            }
        }
        for try_block in &code.tries {
            for handler in &try_block.handlers {
                self.add_type(&handler.exception_type);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::ACC_FINAL;
    use crate::code::{FieldOp, InvokeKind, ValueKind};
    use crate::value::Visibility;

    fn void_proto() -> Prototype {
        Prototype::new("V", vec![])
    }

    #[test]
    fn new_extends_object() {
        let ty = CompiledType::new("LFoo;");
        assert_eq!(ty.superclass.as_deref(), Some(OBJECT));
        assert!(CompiledType::new(OBJECT).superclass.is_none());
    }

    #[test]
    fn direct_and_static() {
        let ctor = MethodDef::new("<init>", void_proto(), ACC_PUBLIC | ACC_CONSTRUCTOR, None);
        let run = MethodDef::new("run", void_proto(), ACC_PUBLIC, None);
        assert!(ctor.is_direct());
        assert!(!run.is_direct());
        let field = FieldDef::new("X", "I", ACC_STATIC | ACC_FINAL);
        assert!(field.is_static());
    }

    #[test]
    fn referenced_types_cover_code_and_signatures() {
        let code = Code {
            registers: 2,
            ins: 1,
            outs: 1,
            instructions: vec![
                Instruction::NewInstance {
                    dst: 0,
                    type_: "Lcom/example/Helper;".to_string(),
                },
                Instruction::StaticField {
                    op: FieldOp::Get,
                    kind: ValueKind::Object,
                    value: 0,
                    field: FieldRef::new("Lcom/example/Config;", "INSTANCE", "[Lcom/example/Item;"),
                },
                Instruction::Invoke {
                    kind: InvokeKind::Static,
                    method: MethodRef::new("Lcom/example/Log;", "d", Prototype::new("V", vec!["I".into()])),
                    args: vec![0],
                },
                Instruction::ReturnVoid,
            ],
            tries: vec![],
            debug_info: None,
        };
        let ty = CompiledType::new("Lcom/example/App;")
            .with_interface("Ljava/lang/Runnable;")
            .with_field(FieldDef::new("self", "Lcom/example/App;", 0))
            .with_annotation(Annotation::marker(Visibility::Build, "Lcom/example/Keep;"))
            .with_method(MethodDef::new("run", void_proto(), ACC_PUBLIC, Some(code)));

        let refs: Vec<String> = ty.referenced_types().into_iter().collect();
        assert_eq!(
            refs,
            vec![
                "Lcom/example/Config;",
                "Lcom/example/Helper;",
                "Lcom/example/Item;",
                "Lcom/example/Keep;",
                "Lcom/example/Log;",
                "Ljava/lang/Object;",
                "Ljava/lang/Runnable;",
            ]
        );
    }

    #[test]
    fn bincode_roundtrip() {
        let ty = CompiledType::new("LFoo;")
            .with_source_file("Foo.java")
            .with_field(FieldDef {
                initial_value: Some(EncodedValue::double(2.5)),
                ..FieldDef::new("D", "D", ACC_STATIC)
            });
        let bytes = bincode::serde::encode_to_vec(&ty, bincode::config::standard()).unwrap();
        let (back, _): (CompiledType, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(back, ty);
    }
}
