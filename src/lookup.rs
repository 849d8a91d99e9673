//! Symbolic name resolution through the per-axis rename table.
//!
//! Multi-axis boards expose identical logical objects per axis under
//! display names like `"Controlword 1"`, `"Controlword 2"` and so on, often
//! at manufacturer specific index offsets. The rename table retargets
//! logical names per motor, so the table *is* the axis selector; nothing
//! else in the crate hard-codes address offsets.

use crate::{
    error::{Error, bounded_name},
    node::{Node, ObjectId, Slot, SubIndex},
};
use std::collections::HashMap;

/// What a logical name maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alias {
    /// A device display name, to be looked up in the object dictionary.
    Name(String),
    /// A concrete slot. Still validated against the dictionary on use.
    Slot(Slot),
}

/// Per-motor mapping from logical names to device-specific targets.
///
/// An empty table is valid: names then pass straight through to the object
/// dictionary.
///
/// ```
/// use axis402::RenameTable;
///
/// let axis2 = RenameTable::from_iter([
///     ("controlword", "Controlword 2"),
///     ("statusword", "Statusword 2"),
///     ("operating_mode", "Modes of Operation 2"),
///     ("target_position", "Target Position 2"),
/// ]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameTable {
    map: HashMap<String, Alias>,
}

impl RenameTable {
    /// An empty table: no renaming.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a logical name onto a device display name.
    pub fn alias(&mut self, logical: impl Into<String>, display: impl Into<String>) {
        self.map
            .insert(logical.into(), Alias::Name(display.into()));
    }

    /// Map a logical name straight onto a slot.
    pub fn alias_slot(&mut self, logical: impl Into<String>, slot: Slot) {
        self.map.insert(logical.into(), Alias::Slot(slot));
    }

    fn get(&self, name: &str) -> Option<&Alias> {
        self.map.get(name)
    }

    /// Resolve a caller-supplied object reference to its canonical slot.
    ///
    /// Both the object and a symbolic subindex go through the rename table
    /// before the object dictionary is consulted; the dictionary's answer
    /// is canonical.
    pub fn resolve<N: Node + ?Sized>(
        &self,
        node: &N,
        object: &ObjectId,
        subindex: &SubIndex,
    ) -> Result<Slot, Error> {
        let mut object = object.clone();
        let mut subindex = subindex.clone();

        if let ObjectId::Name(name) = &object {
            match self.get(name) {
                Some(Alias::Name(display)) => object = ObjectId::Name(display.clone()),
                Some(Alias::Slot(slot)) => {
                    object = ObjectId::Index(slot.index);

                    // The aliased subindex only applies when the caller
                    // did not ask for a specific one.
                    if subindex == SubIndex::Zero {
                        subindex = SubIndex::Number(slot.subindex);
                    }
                }
                None => {}
            }
        }

        if let SubIndex::Name(name) = &subindex {
            match self.get(name) {
                Some(Alias::Name(display)) => subindex = SubIndex::Name(display.clone()),
                Some(Alias::Slot(slot)) => subindex = SubIndex::Number(slot.subindex),
                None => {}
            }
        }

        node.find(&object, &subindex).ok_or_else(|| {
            log::debug!("lookup failed for {}", object);

            Error::UnknownVariable {
                name: bounded_name(&object.to_string()),
            }
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RenameTable {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            map: iter
                .into_iter()
                .map(|(k, v)| (k.into(), Alias::Name(v.into())))
                .collect(),
        }
    }
}
