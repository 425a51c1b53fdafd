//! Interned constant pool tables and their final ordering.
//!
//! A [`ConstantPool`] is an insertion-ordered set per table. Encoding a type
//! yields the pool of everything that type references; merging unions those
//! pools into the per-file pool. [`ConstantPool::into_sorted`] applies the
//! format's required ordering and assigns final indices.

use crate::error::{DexError, DexResult};
use crate::limits::IdCounts;
use dexon_common::InternalError;
use dexon_ir::{CallSite, FieldRef, MethodHandle, MethodRef, Prototype};
use indexmap::IndexSet;
use std::cmp::Ordering;
use std::hash::Hash;

/// Interned tables of strings, types, prototypes, field and method
/// references, call sites and method handles.
///
/// Each distinct value appears at most once per table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConstantPool {
    pub(crate) strings: IndexSet<String>,
    pub(crate) types: IndexSet<String>,
    pub(crate) protos: IndexSet<Prototype>,
    pub(crate) fields: IndexSet<FieldRef>,
    pub(crate) methods: IndexSet<MethodRef>,
    pub(crate) call_sites: IndexSet<CallSite>,
    pub(crate) method_handles: IndexSet<MethodHandle>,
}

fn added<T: Hash + Eq>(base: &IndexSet<T>, extra: &IndexSet<T>) -> usize {
    base.len() + extra.iter().filter(|v| !base.contains(*v)).count()
}

fn union<T: Hash + Eq + Clone>(base: &mut IndexSet<T>, extra: &IndexSet<T>) {
    for v in extra {
        if !base.contains(v) {
            base.insert(v.clone());
        }
    }
}

impl ConstantPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the size of every table.
    pub fn counts(&self) -> IdCounts {
        IdCounts {
            strings: self.strings.len(),
            types: self.types.len(),
            protos: self.protos.len(),
            fields: self.fields.len(),
            methods: self.methods.len(),
            call_sites: self.call_sites.len(),
            method_handles: self.method_handles.len(),
        }
    }

    /// Returns the table sizes this pool would have after absorbing `other`,
    /// without changing anything.
    pub fn prospective_counts(&self, other: &ConstantPool) -> IdCounts {
        IdCounts {
            strings: added(&self.strings, &other.strings),
            types: added(&self.types, &other.types),
            protos: added(&self.protos, &other.protos),
            fields: added(&self.fields, &other.fields),
            methods: added(&self.methods, &other.methods),
            call_sites: added(&self.call_sites, &other.call_sites),
            method_handles: added(&self.method_handles, &other.method_handles),
        }
    }

    /// Adds every entry of `other` that is not present yet.
    pub fn absorb(&mut self, other: &ConstantPool) {
        union(&mut self.strings, &other.strings);
        union(&mut self.types, &other.types);
        union(&mut self.protos, &other.protos);
        union(&mut self.fields, &other.fields);
        union(&mut self.methods, &other.methods);
        union(&mut self.call_sites, &other.call_sites);
        union(&mut self.method_handles, &other.method_handles);
    }

    /// Returns `true` if the pool references nothing.
    pub fn is_empty(&self) -> bool {
        self.counts() == IdCounts::default()
    }

    pub(crate) fn add_string(&mut self, s: &str) {
        if !self.strings.contains(s) {
            self.strings.insert(s.to_string());
        }
    }

    pub(crate) fn add_type(&mut self, desc: &str) {
        self.add_string(desc);
        if !self.types.contains(desc) {
            self.types.insert(desc.to_string());
        }
    }

    pub(crate) fn add_proto(&mut self, proto: &Prototype) {
        self.add_string(&proto.shorty());
        self.add_type(&proto.return_type);
        for param in &proto.parameters {
            self.add_type(param);
        }
        if !self.protos.contains(proto) {
            self.protos.insert(proto.clone());
        }
    }

    pub(crate) fn add_field(&mut self, field: &FieldRef) {
        self.add_type(&field.class);
        self.add_type(&field.type_);
        self.add_string(&field.name);
        if !self.fields.contains(field) {
            self.fields.insert(field.clone());
        }
    }

    pub(crate) fn add_method(&mut self, method: &MethodRef) {
        self.add_type(&method.class);
        self.add_string(&method.name);
        self.add_proto(&method.proto);
        if !self.methods.contains(method) {
            self.methods.insert(method.clone());
        }
    }

    pub(crate) fn insert_method_handle(&mut self, handle: &MethodHandle) {
        if !self.method_handles.contains(handle) {
            self.method_handles.insert(handle.clone());
        }
    }

    pub(crate) fn insert_call_site(&mut self, site: &CallSite) {
        if !self.call_sites.contains(site) {
            self.call_sites.insert(site.clone());
        }
    }

    /// Applies the final ordering and assigns indices.
    ///
    /// Strings sort by UTF-16 code units, types by their string index,
    /// prototypes by return type then parameter list, fields by
    /// (class, name, type) and methods by (class, name, proto). Call sites
    /// and method handles keep insertion order.
    pub fn into_sorted(self) -> SortedPool {
        let mut strings = self.strings;
        strings.sort_by(|a, b| utf16_cmp(a, b));
        let mut types = self.types;
        types.sort_by(|a, b| utf16_cmp(a, b));

        let type_key = |t: &str| types.get_index_of(t).unwrap_or(usize::MAX);
        let string_key = |s: &str| strings.get_index_of(s).unwrap_or(usize::MAX);

        let protos = sorted_by_key(self.protos, |p| {
            (
                type_key(&p.return_type),
                p.parameters.iter().map(|t| type_key(t)).collect::<Vec<_>>(),
            )
        });
        let proto_key = |p: &Prototype| protos.get_index_of(p).unwrap_or(usize::MAX);
        let fields = sorted_by_key(self.fields, |f| {
            (type_key(&f.class), string_key(&f.name), type_key(&f.type_))
        });
        let methods = sorted_by_key(self.methods, |m| {
            (type_key(&m.class), string_key(&m.name), proto_key(&m.proto))
        });

        SortedPool {
            strings,
            types,
            protos,
            fields,
            methods,
            call_sites: self.call_sites,
            method_handles: self.method_handles,
        }
    }
}

fn utf16_cmp(a: &str, b: &str) -> Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

fn sorted_by_key<T, K, F>(set: IndexSet<T>, mut key: F) -> IndexSet<T>
where
    T: Hash + Eq,
    K: Ord,
    F: FnMut(&T) -> K,
{
    let mut items: Vec<(K, T)> = set.into_iter().map(|v| (key(&v), v)).collect();
    items.sort_by(|a, b| a.0.cmp(&b.0));
    items.into_iter().map(|(_, v)| v).collect()
}

/// A pool with final indices, ready for serialization.
#[derive(Debug)]
pub struct SortedPool {
    pub(crate) strings: IndexSet<String>,
    pub(crate) types: IndexSet<String>,
    pub(crate) protos: IndexSet<Prototype>,
    pub(crate) fields: IndexSet<FieldRef>,
    pub(crate) methods: IndexSet<MethodRef>,
    pub(crate) call_sites: IndexSet<CallSite>,
    pub(crate) method_handles: IndexSet<MethodHandle>,
}

fn missing(what: &str, value: impl std::fmt::Display) -> DexError {
    DexError::Internal(InternalError::new(format!(
        "{what} {value} is referenced but was never added to the pool"
    )))
}

impl SortedPool {
    /// Index of a string.
    pub fn string(&self, s: &str) -> DexResult<u32> {
        self.strings
            .get_index_of(s)
            .map(|i| i as u32)
            .ok_or_else(|| missing("string", format!("{s:?}")))
    }

    /// Index of a type descriptor.
    pub fn type_(&self, desc: &str) -> DexResult<u32> {
        self.types
            .get_index_of(desc)
            .map(|i| i as u32)
            .ok_or_else(|| missing("type", desc))
    }

    /// Index of a prototype.
    pub fn proto(&self, proto: &Prototype) -> DexResult<u32> {
        self.protos
            .get_index_of(proto)
            .map(|i| i as u32)
            .ok_or_else(|| missing("proto", proto))
    }

    /// Index of a field reference.
    pub fn field(&self, field: &FieldRef) -> DexResult<u32> {
        self.fields
            .get_index_of(field)
            .map(|i| i as u32)
            .ok_or_else(|| missing("field", field))
    }

    /// Index of a method reference.
    pub fn method(&self, method: &MethodRef) -> DexResult<u32> {
        self.methods
            .get_index_of(method)
            .map(|i| i as u32)
            .ok_or_else(|| missing("method", method))
    }

    /// Index of a call site.
    pub fn call_site(&self, site: &CallSite) -> DexResult<u32> {
        self.call_sites
            .get_index_of(site)
            .map(|i| i as u32)
            .ok_or_else(|| missing("call site", &site.method_name))
    }

    /// Index of a method handle.
    pub fn method_handle(&self, handle: &MethodHandle) -> DexResult<u32> {
        self.method_handles
            .get_index_of(handle)
            .map(|i| i as u32)
            .ok_or_else(|| missing("method handle", format!("{:?}", handle.kind)))
    }
}
