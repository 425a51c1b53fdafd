//! Compiled-type model consumed by the dex writer and the incremental engine.
//!
//! A [`CompiledType`] is one class or interface in its fully compiled form:
//! declared fields and methods, code bodies over a closed [`Instruction`] set,
//! debug line tables, annotations and static initial values. Types are
//! immutable once produced and are owned by a [`CompilationSession`] until the
//! writer consumes them. Every reference to another type or member is spelled
//! out as descriptors so that a compiled type can be persisted and reloaded by
//! a later incremental run without any shared lookup table.

#![warn(missing_docs)]

pub mod access;
pub mod arena;
pub mod code;
pub mod descriptor;
pub mod refs;
pub mod session;
pub mod types;
pub mod value;

pub use arena::{TypeArena, TypeId};
pub use code::{
    BinaryOp, CatchHandler, Code, DebugInfo, FieldOp, IfTest, Instruction, InvokeKind, LinePosition,
    MoveKind, TryBlock, ValueKind,
};
pub use refs::{
    CallSite, FieldRef, MethodHandle, MethodHandleKind, MethodHandleTarget, MethodRef, Prototype,
};
pub use session::CompilationSession;
pub use types::{CompiledType, FieldDef, MethodDef, OBJECT};
pub use value::{Annotation, AnnotationElement, EncodedAnnotation, EncodedValue, Visibility};
