//! Per-file id table limits.

use std::fmt;

/// The hard per-file ceiling of the dex format for 16-bit indexed tables.
pub const MAX_IDS: usize = 65536;

/// An id table with a per-file ceiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdTable {
    /// `method_ids`.
    Methods,
    /// `field_ids`.
    Fields,
    /// `type_ids`.
    Types,
    /// `proto_ids`.
    Protos,
    /// `call_site_ids`.
    CallSites,
    /// `method_handles`.
    MethodHandles,
}

impl fmt::Display for IdTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IdTable::Methods => "method",
            IdTable::Fields => "field",
            IdTable::Types => "type",
            IdTable::Protos => "proto",
            IdTable::CallSites => "call site",
            IdTable::MethodHandles => "method handle",
        })
    }
}

/// Number of entries in each table of a constant pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IdCounts {
    /// Strings (unbounded thanks to jumbo string constants).
    pub strings: usize,
    /// Type descriptors.
    pub types: usize,
    /// Prototypes.
    pub protos: usize,
    /// Field references.
    pub fields: usize,
    /// Method references.
    pub methods: usize,
    /// Call sites.
    pub call_sites: usize,
    /// Method handles.
    pub method_handles: usize,
}

impl IdCounts {
    fn get(&self, table: IdTable) -> usize {
        match table {
            IdTable::Methods => self.methods,
            IdTable::Fields => self.fields,
            IdTable::Types => self.types,
            IdTable::Protos => self.protos,
            IdTable::CallSites => self.call_sites,
            IdTable::MethodHandles => self.method_handles,
        }
    }
}

/// Per-file ceilings applied by the merger.
///
/// Defaults to the format's limits; tests lower them to exercise overflow
/// with small inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DexLimits {
    /// Maximum method ids.
    pub methods: usize,
    /// Maximum field ids.
    pub fields: usize,
    /// Maximum type ids.
    pub types: usize,
    /// Maximum proto ids.
    pub protos: usize,
    /// Maximum call site ids.
    pub call_sites: usize,
    /// Maximum method handles.
    pub method_handles: usize,
}

impl Default for DexLimits {
    fn default() -> Self {
        Self::uniform(MAX_IDS)
    }
}

impl DexLimits {
    /// Applies the same ceiling to every table.
    pub fn uniform(max: usize) -> Self {
        Self {
            methods: max,
            fields: max,
            types: max,
            protos: max,
            call_sites: max,
            method_handles: max,
        }
    }

    fn get(&self, table: IdTable) -> usize {
        match table {
            IdTable::Methods => self.methods,
            IdTable::Fields => self.fields,
            IdTable::Types => self.types,
            IdTable::Protos => self.protos,
            IdTable::CallSites => self.call_sites,
            IdTable::MethodHandles => self.method_handles,
        }
    }

    /// Returns the first table whose count exceeds its ceiling, with the
    /// count and the ceiling.
    pub fn first_exceeded(&self, counts: &IdCounts) -> Option<(IdTable, usize, usize)> {
        [
            IdTable::Methods,
            IdTable::Fields,
            IdTable::Types,
            IdTable::Protos,
            IdTable::CallSites,
            IdTable::MethodHandles,
        ]
        .into_iter()
        .map(|table| (table, counts.get(table), self.get(table)))
        .find(|&(_, count, limit)| count > limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_limit_is_fine() {
        let counts = IdCounts {
            methods: MAX_IDS,
            fields: MAX_IDS,
            types: MAX_IDS,
            ..IdCounts::default()
        };
        assert!(DexLimits::default().first_exceeded(&counts).is_none());
    }

    #[test]
    fn methods_reported_first() {
        let counts = IdCounts {
            methods: 5,
            types: 9,
            ..IdCounts::default()
        };
        assert_eq!(
            DexLimits::uniform(4).first_exceeded(&counts),
            Some((IdTable::Methods, 5, 4))
        );
    }

    #[test]
    fn strings_are_unbounded() {
        let counts = IdCounts {
            strings: 1_000_000,
            ..IdCounts::default()
        };
        assert!(DexLimits::uniform(1).first_exceeded(&counts).is_none());
    }

    #[test]
    fn table_names() {
        assert_eq!(IdTable::CallSites.to_string(), "call site");
        assert_eq!(IdTable::Methods.to_string(), "method");
    }
}
