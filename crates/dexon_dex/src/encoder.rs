//! Dex item encoding: validation and constant-pool collection for one type.
//!
//! [`encode_type`] walks a [`CompiledType`] once, checking that it is
//! internally consistent and collecting every string, type, prototype,
//! member reference, method handle and call site it mentions into a private
//! [`ConstantPool`]. Nothing shared is touched; the merger unions the pool into
//! a file only when the type is accepted. Encoding the same type twice yields
//! equal pools.

use crate::error::{DexError, DexResult};
use crate::pool::ConstantPool;
use dexon_ir::access::{ACC_ABSTRACT, ACC_NATIVE};
use dexon_ir::descriptor;
use dexon_ir::{
    Annotation, CallSite, Code, CompiledType, EncodedAnnotation, EncodedValue, FieldOp, FieldRef,
    Instruction, InvokeKind, MethodDef, MethodHandle, MethodHandleTarget, MethodRef, MoveKind,
    Prototype, ValueKind, OBJECT,
};
use std::collections::HashSet;
use std::sync::Arc;

/// A compiled type together with everything it references.
#[derive(Clone, Debug)]
pub struct EncodedType {
    pub(crate) ty: Arc<CompiledType>,
    pub(crate) sequence: u32,
    pub(crate) refs: ConstantPool,
}

impl EncodedType {
    /// Descriptor of the encoded type.
    pub fn descriptor(&self) -> &str {
        &self.ty.descriptor
    }

    /// The compiled type.
    pub fn compiled_type(&self) -> &Arc<CompiledType> {
        &self.ty
    }

    /// Position of the type in the writer's input order.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Constant-pool entries the type needs.
    pub fn refs(&self) -> &ConstantPool {
        &self.refs
    }
}

/// Validates a compiled type and collects its constant-pool entries.
pub fn encode_type(ty: Arc<CompiledType>, sequence: u32) -> DexResult<EncodedType> {
    let refs = Encoder::new(&ty.descriptor).encode(&ty)?;
    Ok(EncodedType { ty, sequence, refs })
}

struct Encoder<'a> {
    owner: &'a str,
    pool: ConstantPool,
}

impl<'a> Encoder<'a> {
    fn new(owner: &'a str) -> Self {
        Self {
            owner,
            pool: ConstantPool::new(),
        }
    }

    fn fail<T>(&self, reason: impl Into<String>) -> DexResult<T> {
        Err(DexError::malformed(self.owner, reason))
    }

    fn encode(mut self, ty: &CompiledType) -> DexResult<ConstantPool> {
        if !descriptor::is_class(&ty.descriptor) {
            return self.fail("not a class descriptor");
        }
        self.pool.add_type(&ty.descriptor);

        match &ty.superclass {
            Some(superclass) => self.class_type(superclass, "superclass")?,
            None if ty.descriptor == OBJECT => {}
            None => return self.fail("only java.lang.Object may omit its superclass"),
        }
        for interface in &ty.interfaces {
            self.class_type(interface, "interface")?;
        }
        if let Some(source) = &ty.source_file {
            self.pool.add_string(source);
        }
        self.annotations(&ty.annotations)?;

        let mut seen_fields = HashSet::new();
        for field in &ty.fields {
            if !descriptor::is_valid_simple_name(&field.name) {
                return self.fail(format!("invalid field name {:?}", field.name));
            }
            if !descriptor::is_valid_type(&field.type_) {
                return self.fail(format!("field {} has invalid type {}", field.name, field.type_));
            }
            if !seen_fields.insert((&field.name, &field.type_)) {
                return self.fail(format!("field {}:{} declared twice", field.name, field.type_));
            }
            self.pool.add_field(&ty.field_ref(field));
            if let Some(value) = &field.initial_value {
                if !field.is_static() {
                    return self.fail(format!(
                        "instance field {} has an initial value",
                        field.name
                    ));
                }
                self.value(value)?;
            }
            self.annotations(&field.annotations)?;
        }

        let mut seen_methods = HashSet::new();
        for method in &ty.methods {
            if !descriptor::is_valid_method_name(&method.name) {
                return self.fail(format!("invalid method name {:?}", method.name));
            }
            self.proto(&method.proto)?;
            if !seen_methods.insert((&method.name, &method.proto)) {
                return self.fail(format!("method {}{} declared twice", method.name, method.proto));
            }
            self.pool.add_method(&ty.method_ref(method));
            self.annotations(&method.annotations)?;
            if method.parameter_annotations.len() > method.proto.parameters.len() {
                return self.fail(format!(
                    "method {} has more parameter annotation lists than parameters",
                    method.name
                ));
            }
            for params in &method.parameter_annotations {
                self.annotations(params)?;
            }
            self.method_body(method)?;
        }
        Ok(self.pool)
    }

    fn class_type(&mut self, desc: &str, role: &str) -> DexResult<()> {
        if !descriptor::is_class(desc) {
            return self.fail(format!("{role} {desc} is not a class descriptor"));
        }
        self.pool.add_type(desc);
        Ok(())
    }

    fn proto(&mut self, proto: &Prototype) -> DexResult<()> {
        if !descriptor::is_valid_return_type(&proto.return_type) {
            return self.fail(format!("invalid return type {}", proto.return_type));
        }
        if let Some(bad) = proto.parameters.iter().find(|p| !descriptor::is_valid_type(p)) {
            return self.fail(format!("invalid parameter type {bad}"));
        }
        self.pool.add_proto(proto);
        Ok(())
    }

    fn field_ref(&mut self, field: &FieldRef) -> DexResult<()> {
        if !descriptor::is_class(&field.class) || !descriptor::is_valid_type(&field.type_) {
            return self.fail(format!("invalid field reference {field}"));
        }
        self.pool.add_field(field);
        Ok(())
    }

    fn method_ref(&mut self, method: &MethodRef) -> DexResult<()> {
        // Array classes declare `clone`, so array descriptors are valid owners.
        let owner_ok = descriptor::is_class(&method.class)
            || (descriptor::is_array(&method.class) && descriptor::is_valid_type(&method.class));
        if !owner_ok || !descriptor::is_valid_method_name(&method.name) {
            return self.fail(format!("invalid method reference {method}"));
        }
        self.proto(&method.proto)?;
        self.pool.add_method(method);
        Ok(())
    }

    fn method_handle(&mut self, handle: &MethodHandle) -> DexResult<()> {
        match &handle.target {
            MethodHandleTarget::Field(field) if handle.kind.is_field_access() => {
                self.field_ref(field)?
            }
            MethodHandleTarget::Method(method) if !handle.kind.is_field_access() => {
                self.method_ref(method)?
            }
            _ => {
                return self.fail(format!(
                    "method handle kind {:?} does not match its target",
                    handle.kind
                ))
            }
        }
        self.pool.insert_method_handle(handle);
        Ok(())
    }

    fn call_site(&mut self, site: &CallSite) -> DexResult<()> {
        self.method_handle(&site.bootstrap)?;
        self.pool.add_string(&site.method_name);
        self.proto(&site.method_type)?;
        for arg in &site.extra_args {
            self.value(arg)?;
        }
        self.pool.insert_call_site(site);
        Ok(())
    }

    fn value(&mut self, value: &EncodedValue) -> DexResult<()> {
        match value {
            EncodedValue::MethodType(proto) => self.proto(proto),
            EncodedValue::MethodHandle(handle) => self.method_handle(handle),
            EncodedValue::String(s) => {
                self.pool.add_string(s);
                Ok(())
            }
            EncodedValue::Type(t) => {
                if !descriptor::is_valid_type(t) {
                    return self.fail(format!("invalid class literal {t}"));
                }
                self.pool.add_type(t);
                Ok(())
            }
            EncodedValue::Field(f) | EncodedValue::Enum(f) => self.field_ref(f),
            EncodedValue::Method(m) => self.method_ref(m),
            EncodedValue::Array(values) => values.iter().try_for_each(|v| self.value(v)),
            EncodedValue::Annotation(a) => self.encoded_annotation(a),
            _ => Ok(()),
        }
    }

    fn annotations(&mut self, annotations: &[Annotation]) -> DexResult<()> {
        let mut seen = HashSet::new();
        for annotation in annotations {
            if !seen.insert(annotation.type_()) {
                return self.fail(format!("annotation {} applied twice", annotation.type_()));
            }
            self.encoded_annotation(&annotation.annotation)?;
        }
        Ok(())
    }

    fn encoded_annotation(&mut self, annotation: &EncodedAnnotation) -> DexResult<()> {
        self.class_type(&annotation.type_, "annotation type")?;
        let mut names = HashSet::new();
        for element in &annotation.elements {
            if !descriptor::is_valid_simple_name(&element.name) || !names.insert(&element.name) {
                return self.fail(format!(
                    "bad element {:?} in annotation {}",
                    element.name, annotation.type_
                ));
            }
            self.pool.add_string(&element.name);
            self.value(&element.value)?;
        }
        Ok(())
    }

    fn method_body(&mut self, method: &MethodDef) -> DexResult<()> {
        let bodiless = method.access_flags & (ACC_ABSTRACT | ACC_NATIVE) != 0;
        let code = match (&method.code, bodiless) {
            (Some(_), true) => {
                return self.fail(format!("abstract or native method {} has code", method.name))
            }
            (None, false) => return self.fail(format!("method {} has no code", method.name)),
            (None, true) => return Ok(()),
            (Some(code), false) => code,
        };

        let expected_ins =
            method.proto.parameter_registers() + if method.is_static() { 0 } else { 1 };
        if code.ins != expected_ins {
            return self.fail(format!(
                "method {}{} declares {} in-registers, its prototype needs {}",
                method.name, method.proto, code.ins, expected_ins
            ));
        }
        if code.registers < code.ins {
            return self.fail(format!(
                "method {} uses {} registers but takes {} arguments",
                method.name, code.registers, code.ins
            ));
        }
        if code.instructions.is_empty() {
            return self.fail(format!("method {} has an empty body", method.name));
        }

        let mut checker = CodeChecker {
            encoder: self,
            method,
            code,
            index: 0,
        };
        for (index, insn) in code.instructions.iter().enumerate() {
            checker.index = index;
            checker.instruction(insn)?;
        }
        checker.tries()?;
        checker.debug_info()
    }
}

struct CodeChecker<'e, 'a, 'm> {
    encoder: &'e mut Encoder<'a>,
    method: &'m MethodDef,
    code: &'m Code,
    index: usize,
}

impl CodeChecker<'_, '_, '_> {
    fn fail<T>(&self, reason: impl std::fmt::Display) -> DexResult<T> {
        self.encoder.fail(format!(
            "{}{} instruction {}: {}",
            self.method.name, self.method.proto, self.index, reason
        ))
    }

    fn reg(&self, reg: u32, width: u32) -> DexResult<()> {
        if reg + width > u32::from(self.code.registers) {
            return self.fail(format!(
                "register v{reg} is out of range ({} registers)",
                self.code.registers
            ));
        }
        Ok(())
    }

    fn nibble(&self, reg: u8, width: u32) -> DexResult<()> {
        if reg > 15 {
            return self.fail(format!("register v{reg} does not fit a 4-bit operand"));
        }
        self.reg(u32::from(reg), width)
    }

    fn target(&self, target: u32) -> DexResult<()> {
        if target as usize >= self.code.instructions.len() {
            return self.fail(format!("branch target {target} is past the end"));
        }
        Ok(())
    }

    fn object_type(&mut self, desc: &str) -> DexResult<()> {
        if !descriptor::is_valid_type(desc) || descriptor::shorty_char(desc) != 'L' {
            return self.fail(format!("{desc} is not a reference type"));
        }
        self.encoder.pool.add_type(desc);
        Ok(())
    }

    fn instruction(&mut self, insn: &Instruction) -> DexResult<()> {
        match insn {
            Instruction::Nop | Instruction::ReturnVoid => {
                if matches!(insn, Instruction::ReturnVoid) && self.method.proto.return_type != "V" {
                    return self.fail("return-void in a method returning a value");
                }
                Ok(())
            }
            Instruction::Move { kind, dst, src } => {
                let width = move_width(*kind);
                self.reg(u32::from(*dst), width)?;
                self.reg(u32::from(*src), width)
            }
            Instruction::MoveResult { kind, dst } => self.reg(u32::from(*dst), move_width(*kind)),
            Instruction::MoveException { dst } => self.reg(u32::from(*dst), 1),
            Instruction::Return { kind, src } => {
                let expected = match self.method.proto.return_type.as_str() {
                    "V" => return self.fail("return with a value in a void method"),
                    "J" | "D" => MoveKind::Wide,
                    t if descriptor::shorty_char(t) == 'L' => MoveKind::Object,
                    _ => MoveKind::Single,
                };
                if *kind != expected {
                    return self.fail(format!(
                        "return kind {:?} does not match return type {}",
                        kind, self.method.proto.return_type
                    ));
                }
                self.reg(u32::from(*src), move_width(*kind))
            }
            Instruction::Const { dst, .. } => self.reg(u32::from(*dst), 1),
            Instruction::ConstWide { dst, .. } => self.reg(u32::from(*dst), 2),
            Instruction::ConstString { dst, value } => {
                self.encoder.pool.add_string(value);
                self.reg(u32::from(*dst), 1)
            }
            Instruction::ConstClass { dst, type_ } => {
                self.object_type(type_)?;
                self.reg(u32::from(*dst), 1)
            }
            Instruction::ConstMethodHandle { dst, handle } => {
                self.encoder.method_handle(handle)?;
                self.reg(u32::from(*dst), 1)
            }
            Instruction::ConstMethodType { dst, proto } => {
                self.encoder.proto(proto)?;
                self.reg(u32::from(*dst), 1)
            }
            Instruction::CheckCast { reg, type_ } => {
                self.object_type(type_)?;
                self.reg(u32::from(*reg), 1)
            }
            Instruction::InstanceOf {
                dst,
                object,
                type_,
            } => {
                self.object_type(type_)?;
                self.nibble(*dst, 1)?;
                self.nibble(*object, 1)
            }
            Instruction::ArrayLength { dst, array } => {
                self.nibble(*dst, 1)?;
                self.nibble(*array, 1)
            }
            Instruction::NewInstance { dst, type_ } => {
                if !descriptor::is_class(type_) {
                    return self.fail(format!("new-instance of non-class {type_}"));
                }
                self.encoder.pool.add_type(type_);
                self.reg(u32::from(*dst), 1)
            }
            Instruction::NewArray { dst, size, type_ } => {
                if !descriptor::is_array(type_) || !descriptor::is_valid_type(type_) {
                    return self.fail(format!("new-array of non-array {type_}"));
                }
                self.encoder.pool.add_type(type_);
                self.nibble(*dst, 1)?;
                self.nibble(*size, 1)
            }
            Instruction::Throw { src } => self.reg(u32::from(*src), 1),
            Instruction::Goto { target } => self.target(*target),
            Instruction::If { a, b, target, .. } => {
                if *target as usize == self.index {
                    return self.fail("conditional branch to itself");
                }
                self.nibble(*a, 1)?;
                self.nibble(*b, 1)?;
                self.target(*target)
            }
            Instruction::IfZero { reg, target, .. } => {
                if *target as usize == self.index {
                    return self.fail("conditional branch to itself");
                }
                self.reg(u32::from(*reg), 1)?;
                self.target(*target)
            }
            Instruction::InstanceField {
                kind,
                value,
                object,
                field,
                ..
            } => {
                self.field_kind(*kind, field)?;
                self.encoder.field_ref(field)?;
                self.nibble(*value, value_width(*kind))?;
                self.nibble(*object, 1)
            }
            Instruction::StaticField {
                op: _,
                kind,
                value,
                field,
            } => {
                self.field_kind(*kind, field)?;
                self.encoder.field_ref(field)?;
                self.reg(u32::from(*value), value_width(*kind))
            }
            Instruction::Invoke { kind, method, args } => {
                self.encoder.method_ref(method)?;
                self.arg_count(*kind, &method.proto, args.len())?;
                if args.len() > 5 {
                    return self.fail("invoke takes at most 5 argument registers; use the range form");
                }
                args.iter().try_for_each(|&r| self.nibble(r, 1))
            }
            Instruction::InvokeRange {
                kind,
                method,
                first,
                count,
            } => {
                self.encoder.method_ref(method)?;
                self.arg_count(*kind, &method.proto, usize::from(*count))?;
                if *count > 0 {
                    self.reg(u32::from(*first), u32::from(*count))?;
                }
                Ok(())
            }
            Instruction::InvokeCustom { call_site, args } => {
                self.encoder.call_site(call_site)?;
                let expected = usize::from(call_site.method_type.parameter_registers());
                if args.len() != expected {
                    return self.fail(format!(
                        "invoke-custom passes {} registers, call site type needs {expected}",
                        args.len()
                    ));
                }
                if args.len() > 5 {
                    return self.fail("invoke-custom takes at most 5 argument registers");
                }
                args.iter().try_for_each(|&r| self.nibble(r, 1))
            }
            Instruction::BinaryOp { dst, a, b, .. } => {
                self.reg(u32::from(*dst), 1)?;
                self.reg(u32::from(*a), 1)?;
                self.reg(u32::from(*b), 1)
            }
        }
    }

    fn field_kind(&self, kind: ValueKind, field: &FieldRef) -> DexResult<()> {
        let expected = ValueKind::for_type(&field.type_);
        if kind != expected {
            return self.fail(format!("{kind:?} access to field {field} of kind {expected:?}"));
        }
        Ok(())
    }

    fn arg_count(&self, kind: InvokeKind, proto: &Prototype, actual: usize) -> DexResult<()> {
        let expected =
            usize::from(proto.parameter_registers()) + usize::from(kind.has_receiver());
        if actual != expected {
            return self.fail(format!(
                "invoke passes {actual} registers, prototype {proto} needs {expected}"
            ));
        }
        Ok(())
    }

    fn tries(&mut self) -> DexResult<()> {
        let len = self.code.instructions.len() as u32;
        let mut previous_end = 0;
        for block in &self.code.tries {
            if block.start >= block.end || block.end > len {
                return self.fail(format!("try range {}..{} is invalid", block.start, block.end));
            }
            if block.start < previous_end {
                return self.fail("try ranges overlap or are unsorted");
            }
            previous_end = block.end;
            if block.handlers.is_empty() && block.catch_all.is_none() {
                return self.fail("try block without handlers");
            }
            for handler in &block.handlers {
                if handler.target >= len {
                    return self.fail(format!("handler target {} is past the end", handler.target));
                }
                if !descriptor::is_class(&handler.exception_type) {
                    return self.fail(format!(
                        "caught type {} is not a class",
                        handler.exception_type
                    ));
                }
                self.encoder.pool.add_type(&handler.exception_type);
            }
            if let Some(target) = block.catch_all {
                if target >= len {
                    return self.fail(format!("catch-all target {target} is past the end"));
                }
            }
        }
        Ok(())
    }

    fn debug_info(&mut self) -> DexResult<()> {
        let Some(debug) = &self.code.debug_info else {
            return Ok(());
        };
        if debug.parameter_names.len() != self.method.proto.parameters.len() {
            return self.fail(format!(
                "debug info names {} parameters, prototype has {}",
                debug.parameter_names.len(),
                self.method.proto.parameters.len()
            ));
        }
        for name in debug.parameter_names.iter().flatten() {
            self.encoder.pool.add_string(name);
        }
        let len = self.code.instructions.len() as u32;
        let mut previous = 0;
        for position in &debug.positions {
            if position.insn >= len || position.insn < previous {
                return self.fail(format!(
                    "line position at instruction {} is out of order or range",
                    position.insn
                ));
            }
            previous = position.insn;
        }
        Ok(())
    }
}

fn move_width(kind: MoveKind) -> u32 {
    match kind {
        MoveKind::Wide => 2,
        MoveKind::Single | MoveKind::Object => 1,
    }
}

fn value_width(kind: ValueKind) -> u32 {
    match kind {
        ValueKind::Wide => 2,
        _ => 1,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use dexon_ir::access::{ACC_PUBLIC, ACC_STATIC};
    use dexon_ir::{
        CatchHandler, DebugInfo, FieldDef, IfTest, LinePosition, MethodHandleKind, TryBlock,
        Visibility,
    };

    pub(crate) fn void_proto() -> Prototype {
        Prototype::new("V", vec![])
    }

    pub(crate) fn code(registers: u16, ins: u16, instructions: Vec<Instruction>) -> Code {
        Code {
            registers,
            ins,
            outs: 0,
            instructions,
            tries: vec![],
            debug_info: None,
        }
    }

    fn with_static_method(ty: CompiledType, body: Code) -> CompiledType {
        ty.with_method(MethodDef::new("run", void_proto(), ACC_PUBLIC | ACC_STATIC, Some(body)))
    }

    fn encode(ty: CompiledType) -> DexResult<EncodedType> {
        encode_type(Arc::new(ty), 0)
    }

    fn reason(result: DexResult<EncodedType>) -> String {
        match result {
            Err(DexError::Malformed { reason, .. }) => reason,
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn empty_class_refs() {
        let encoded = encode(CompiledType::new("Lcom/example/A;")).unwrap();
        let counts = encoded.refs().counts();
        assert_eq!(counts.types, 2);
        assert_eq!(counts.strings, 2);
        assert_eq!(counts.methods, 0);
        assert_eq!(encoded.descriptor(), "Lcom/example/A;");
    }

    #[test]
    fn encoding_is_idempotent() {
        let ty = Arc::new(
            with_static_method(
                CompiledType::new("LA;").with_field(FieldDef::new("x", "I", ACC_STATIC)),
                code(
                    1,
                    0,
                    vec![
                        Instruction::ConstString {
                            dst: 0,
                            value: "hello".into(),
                        },
                        Instruction::ReturnVoid,
                    ],
                ),
            ),
        );
        let a = encode_type(Arc::clone(&ty), 0).unwrap();
        let b = encode_type(ty, 7).unwrap();
        assert_eq!(a.refs(), b.refs());
        assert_eq!(b.sequence(), 7);
    }

    #[test]
    fn invoke_argument_count_checked() {
        let call = Instruction::Invoke {
            kind: InvokeKind::Virtual,
            method: MethodRef::new("LB;", "f", Prototype::new("V", vec!["J".into()])),
            args: vec![0, 1],
        };
        let ty = with_static_method(CompiledType::new("LA;"), code(3, 0, vec![call, Instruction::ReturnVoid]));
        assert!(reason(encode(ty)).contains("needs 3"));
    }

    #[test]
    fn ins_must_match_prototype() {
        let method = MethodDef::new(
            "f",
            Prototype::new("V", vec!["I".into()]),
            ACC_PUBLIC,
            Some(code(2, 1, vec![Instruction::ReturnVoid])),
        );
        let ty = CompiledType::new("LA;").with_method(method);
        assert!(reason(encode(ty)).contains("in-registers"));
    }

    #[test]
    fn four_bit_registers_enforced() {
        let insn = Instruction::ArrayLength { dst: 16, array: 0 };
        let ty = with_static_method(CompiledType::new("LA;"), code(20, 0, vec![insn, Instruction::ReturnVoid]));
        assert!(reason(encode(ty)).contains("4-bit"));
    }

    #[test]
    fn field_kind_must_match() {
        let insn = Instruction::StaticField {
            op: FieldOp::Get,
            kind: ValueKind::Int,
            value: 0,
            field: FieldRef::new("LB;", "x", "J"),
        };
        let ty = with_static_method(CompiledType::new("LA;"), code(2, 0, vec![insn, Instruction::ReturnVoid]));
        assert!(reason(encode(ty)).contains("of kind Wide"));
    }

    #[test]
    fn branch_target_in_range() {
        let insn = Instruction::IfZero {
            test: IfTest::Eq,
            reg: 0,
            target: 9,
        };
        let ty = with_static_method(CompiledType::new("LA;"), code(1, 0, vec![insn, Instruction::ReturnVoid]));
        assert!(reason(encode(ty)).contains("past the end"));
    }

    #[test]
    fn abstract_method_without_code_is_fine() {
        let method = MethodDef::new("f", void_proto(), ACC_PUBLIC | ACC_ABSTRACT, None);
        assert!(encode(CompiledType::new("LA;").with_method(method)).is_ok());
        let concrete = MethodDef::new("g", void_proto(), ACC_PUBLIC, None);
        assert!(reason(encode(CompiledType::new("LA;").with_method(concrete))).contains("no code"));
    }

    #[test]
    fn instance_field_initial_value_rejected() {
        let field = FieldDef {
            initial_value: Some(EncodedValue::Int(1)),
            ..FieldDef::new("x", "I", ACC_PUBLIC)
        };
        assert!(reason(encode(CompiledType::new("LA;").with_field(field))).contains("initial value"));
    }

    #[test]
    fn missing_superclass_rejected() {
        let mut ty = CompiledType::new("LA;");
        ty.superclass = None;
        assert!(reason(encode(ty)).contains("superclass"));
        assert!(encode(CompiledType::new(OBJECT)).is_ok());
    }

    #[test]
    fn method_handle_kind_must_match_target() {
        let handle = MethodHandle {
            kind: MethodHandleKind::InvokeStatic,
            target: MethodHandleTarget::Field(FieldRef::new("LB;", "x", "I")),
        };
        let insn = Instruction::ConstMethodHandle { dst: 0, handle };
        let ty = with_static_method(CompiledType::new("LA;"), code(1, 0, vec![insn, Instruction::ReturnVoid]));
        assert!(reason(encode(ty)).contains("does not match"));
    }

    #[test]
    fn call_site_collects_bootstrap_and_type() {
        let bootstrap = MethodHandle {
            kind: MethodHandleKind::InvokeStatic,
            target: MethodHandleTarget::Method(MethodRef::new(
                "LBoot;",
                "bsm",
                Prototype::new("Ljava/lang/invoke/CallSite;", vec![]),
            )),
        };
        let site = CallSite {
            bootstrap,
            method_name: "apply".into(),
            method_type: Prototype::new("V", vec!["I".into()]),
            extra_args: vec![EncodedValue::String("extra".into())],
        };
        let insn = Instruction::InvokeCustom {
            call_site: site,
            args: vec![0],
        };
        let ty = with_static_method(CompiledType::new("LA;"), code(1, 0, vec![insn, Instruction::ReturnVoid]));
        let counts = encode(ty).unwrap().refs().counts();
        assert_eq!(counts.call_sites, 1);
        assert_eq!(counts.method_handles, 1);
        // run, bsm
        assert_eq!(counts.methods, 2);
    }

    #[test]
    fn try_and_debug_validation() {
        let mut body = code(
            1,
            0,
            vec![
                Instruction::Nop,
                Instruction::ReturnVoid,
                Instruction::MoveException { dst: 0 },
                Instruction::ReturnVoid,
            ],
        );
        body.tries.push(TryBlock {
            start: 0,
            end: 2,
            handlers: vec![CatchHandler {
                exception_type: "Ljava/lang/Exception;".into(),
                target: 2,
            }],
            catch_all: None,
        });
        body.debug_info = Some(DebugInfo {
            line_start: 10,
            parameter_names: vec![],
            positions: vec![
                LinePosition { insn: 0, line: 10 },
                LinePosition { insn: 2, line: 12 },
            ],
        });
        let ok = with_static_method(CompiledType::new("LA;"), body.clone());
        assert!(encode(ok).is_ok());

        body.tries[0].end = 9;
        let bad = with_static_method(CompiledType::new("LA;"), body);
        assert!(reason(encode(bad)).contains("try range"));
    }

    #[test]
    fn duplicate_annotation_rejected() {
        let ty = CompiledType::new("LA;")
            .with_annotation(Annotation::marker(Visibility::Build, "LKeep;"))
            .with_annotation(Annotation::marker(Visibility::Runtime, "LKeep;"));
        assert!(reason(encode(ty)).contains("applied twice"));
    }
}
