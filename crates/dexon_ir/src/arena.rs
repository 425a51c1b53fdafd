//! Append-only storage for the compiled types of one session.

use crate::types::CompiledType;
use std::fmt;
use std::sync::Arc;

/// Position of a type in a [`TypeArena`]. Only meaningful for the arena
/// that handed it out.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TypeId(u32);

impl TypeId {
    /// The position as an index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// Compiled types in the order they were added. Types are shared, so the
/// arena never copies one.
#[derive(Debug, Default)]
pub struct TypeArena {
    types: Vec<Arc<CompiledType>>,
}

impl TypeArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `ty`.
    pub fn alloc(&mut self, ty: Arc<CompiledType>) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    /// The type at `id`.
    pub fn get(&self, id: TypeId) -> Option<&Arc<CompiledType>> {
        self.types.get(id.index())
    }

    /// Number of types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if no type was added.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Types with their ids, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &Arc<CompiledType>)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, ty)| (TypeId(i as u32), ty))
    }

    /// The types in insertion order.
    pub fn into_types(self) -> Vec<Arc<CompiledType>> {
        self.types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_insertion() {
        let mut arena = TypeArena::new();
        let a = arena.alloc(Arc::new(CompiledType::new("LA;")));
        let b = arena.alloc(Arc::new(CompiledType::new("LB;")));
        assert!(a < b);
        assert_eq!(b.index(), 1);
        assert_eq!(b.to_string(), "type#1");
        assert_eq!(arena.get(a).map(|t| t.descriptor.as_str()), Some("LA;"));
        let ids: Vec<TypeId> = arena.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn foreign_id_is_none() {
        let mut other = TypeArena::new();
        other.alloc(Arc::new(CompiledType::new("LA;")));
        let id = other.alloc(Arc::new(CompiledType::new("LB;")));
        let arena = TypeArena::new();
        assert!(arena.is_empty());
        assert!(arena.get(id).is_none());
    }
}
