//! Transactional accumulation of encoded types into one dex image.
//!
//! A [`DexMerger`] is empty until its first accepted append, accepts types
//! while every id table stays within its limit, and is sealed by
//! [`DexMerger::finish`], which consumes it. [`DexMerger::try_append`]
//! computes the table sizes the append would produce before touching
//! anything, so a rejected type leaves the merger exactly as it was and can
//! be redirected into another file. A type already defined in the file is
//! rejected the same way.

use crate::encoder::{encode_type, EncodedType};
use crate::error::{DexError, DexResult};
use crate::limits::{IdCounts, IdTable};
use crate::pool::ConstantPool;
use crate::{writer, DexOptions};
use dexon_common::InternalError;
use dexon_ir::CompiledType;
use std::collections::HashSet;
use std::sync::Arc;

/// An append refused because an id table would exceed its limit.
///
/// Carries the rejected item back to the caller.
#[derive(Debug, thiserror::Error)]
#[error("{table} ids would reach {required} (limit {limit}) when adding {}", .item.descriptor())]
pub struct Overflow {
    /// The table that would overflow.
    pub table: IdTable,
    /// Entries the table would have needed.
    pub required: usize,
    /// The limit of the table.
    pub limit: usize,
    item: Box<EncodedType>,
}

impl Overflow {
    /// Returns the rejected item.
    pub fn into_item(self) -> EncodedType {
        *self.item
    }

    /// Descriptor of the rejected type.
    pub fn descriptor(&self) -> &str {
        self.item.descriptor()
    }
}

/// Why [`DexMerger::try_append`] refused a type.
#[derive(Debug, thiserror::Error)]
pub enum AppendError {
    /// An id table would exceed its limit.
    #[error(transparent)]
    Overflow(Overflow),
    /// The file already defines a type with this descriptor.
    #[error("type {0} is already defined in this dex file")]
    Duplicate(String),
}

impl AppendError {
    /// Returns the overflow; a duplicate definition is an internal error.
    pub fn into_overflow(self) -> DexResult<Overflow> {
        match self {
            AppendError::Overflow(overflow) => Ok(overflow),
            duplicate @ AppendError::Duplicate(_) => Err(DexError::Internal(InternalError::new(
                duplicate.to_string(),
            ))),
        }
    }
}

/// The merge state of one output file.
pub struct DexMerger {
    options: DexOptions,
    pool: ConstantPool,
    types: Vec<EncodedType>,
    defined: HashSet<String>,
}

impl DexMerger {
    /// Creates an empty merger.
    pub fn new(options: DexOptions) -> Self {
        Self {
            options,
            pool: ConstantPool::new(),
            types: Vec::new(),
            defined: HashSet::new(),
        }
    }

    /// Appends a type if every id table stays within its limit and the
    /// file does not define it yet.
    ///
    /// On rejection nothing is changed. An overflow hands the item back
    /// inside the error.
    pub fn try_append(&mut self, item: EncodedType) -> Result<(), AppendError> {
        if self.defined.contains(item.descriptor()) {
            return Err(AppendError::Duplicate(item.descriptor().to_string()));
        }
        let prospective = self.pool.prospective_counts(item.refs());
        if let Some((table, required, limit)) = self.options.limits.first_exceeded(&prospective) {
            tracing::trace!(
                descriptor = item.descriptor(),
                %table,
                required,
                limit,
                "append refused"
            );
            return Err(AppendError::Overflow(Overflow {
                table,
                required,
                limit,
                item: Box::new(item),
            }));
        }
        self.defined.insert(item.descriptor().to_string());
        self.pool.absorb(item.refs());
        self.types.push(item);
        Ok(())
    }

    /// Returns `true` if no type was accepted yet.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Returns the number of accepted types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns the current size of every id table.
    pub fn counts(&self) -> IdCounts {
        self.pool.counts()
    }

    /// Returns the accumulated constant pool.
    pub fn pool(&self) -> &ConstantPool {
        &self.pool
    }

    /// Descriptors of the accepted types, in append order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(EncodedType::descriptor)
    }

    /// Seals the file: sorts the pools, assigns final indices and serializes
    /// the image with its signature and checksum.
    pub fn finish(self) -> DexResult<Vec<u8>> {
        let counts = self.pool.counts();
        let classes: Vec<Arc<CompiledType>> =
            self.types.into_iter().map(|item| item.ty).collect();
        let sorted = self.pool.into_sorted();
        let image = writer::write_image(&classes, &sorted, &self.options)?;
        tracing::debug!(
            classes = classes.len(),
            strings = counts.strings,
            types = counts.types,
            fields = counts.fields,
            methods = counts.methods,
            bytes = image.len(),
            "sealed dex image"
        );
        Ok(image)
    }
}

/// Encodes one type into a dex image of its own.
///
/// Incremental builds keep one such fragment per compiled type.
pub fn dex_fragment(ty: Arc<CompiledType>, options: &DexOptions) -> DexResult<Vec<u8>> {
    let encoded = encode_type(ty, 0)?;
    let mut merger = DexMerger::new(options.clone());
    if let Err(rejected) = merger.try_append(encoded) {
        let overflow = rejected.into_overflow()?;
        return Err(DexError::Internal(InternalError::new(format!(
            "type {} alone exceeds the {} id limit ({} > {})",
            overflow.descriptor(),
            overflow.table,
            overflow.required,
            overflow.limit
        ))));
    }
    merger.finish()
}
