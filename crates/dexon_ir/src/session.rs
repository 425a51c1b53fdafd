//! Session-scoped ownership of compiled types.

use crate::arena::{TypeArena, TypeId};
use crate::types::CompiledType;
use dexon_common::{DexonResult, Ident, Interner, InternalError};
use std::collections::HashMap;
use std::sync::Arc;

/// Owns the compiled types of one compilation and the name interner used to
/// look them up.
///
/// Nothing here is process-wide: independent sessions can run side by side
/// in one process.
#[derive(Default)]
pub struct CompilationSession {
    interner: Interner,
    types: TypeArena,
    by_name: HashMap<Ident, TypeId>,
}

impl CompilationSession {
    /// Creates an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a compiled type. Defining the same descriptor twice is an
    /// internal error.
    pub fn add_type(&mut self, ty: CompiledType) -> DexonResult<TypeId> {
        self.add_shared(Arc::new(ty))
    }

    /// Adds a type that is already shared, e.g. one loaded from a previous
    /// build.
    pub fn add_shared(&mut self, ty: Arc<CompiledType>) -> DexonResult<TypeId> {
        let name = self.interner.get_or_intern(&ty.descriptor);
        if self.by_name.contains_key(&name) {
            return Err(InternalError::new(format!(
                "type {} is defined twice in one session",
                ty.descriptor
            )));
        }
        let id = self.types.alloc(ty);
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// Looks up a type by descriptor.
    pub fn lookup(&self, descriptor: &str) -> Option<TypeId> {
        let name = self.interner.get(descriptor)?;
        self.by_name.get(&name).copied()
    }

    /// Returns `true` if the session defines `descriptor`.
    pub fn defines(&self, descriptor: &str) -> bool {
        self.lookup(descriptor).is_some()
    }

    /// Returns the type with the given ID.
    pub fn get(&self, id: TypeId) -> Option<&Arc<CompiledType>> {
        self.types.get(id)
    }

    /// Returns the type with the given descriptor.
    pub fn get_by_name(&self, descriptor: &str) -> Option<&Arc<CompiledType>> {
        self.lookup(descriptor).and_then(|id| self.types.get(id))
    }

    /// Iterates over all types in insertion order.
    pub fn types(&self) -> impl Iterator<Item = &Arc<CompiledType>> {
        self.types.iter().map(|(_, ty)| ty)
    }

    /// Returns the number of types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if the session holds no types.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Returns the session's interner.
    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Hands the types over to the writer, in insertion order.
    pub fn into_types(self) -> Vec<Arc<CompiledType>> {
        self.types.into_types()
    }
}
