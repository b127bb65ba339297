//! Row fingerprints
//!
//! A partner re-plates our samples under its own plate and well numbers,
//! and may permute the wells within a row. What survives is the *set* of
//! identifiers in each row, so a row is matched by the sorted tuple of its
//! twelve slots rather than by any coordinate.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::identifier::Identifier;
use crate::plate::well::{PartnerWell, PlateWell, WellAddress, COLUMNS};

/// Twelve identifier slots indexed by column - 1
pub type Slots = [Option<Identifier>; COLUMNS];

/// Grouping key for a row: (plate, row letter)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey {
    pub plate: String,
    pub row: char,
}

impl RowKey {
    pub fn new(plate: impl Into<String>, row: char) -> Self {
        RowKey { plate: plate.into(), row }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} row {}", self.plate, self.row)
    }
}

/// Order-independent signature of a row: its slots sorted, empties first
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowFingerprint(Slots);

impl RowFingerprint {
    pub fn from_slots(slots: &Slots) -> Self {
        let mut sorted = *slots;
        sorted.sort();
        RowFingerprint(sorted)
    }

    /// No identifiers at all; such rows match everything and are not indexed
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    pub fn slots(&self) -> &Slots {
        &self.0
    }
}

/// A row as it actually sits on its plate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDescriptor {
    pub key: RowKey,
    /// Unsorted slots; consumed slots are blanked
    pub slots: Slots,
}

impl RowDescriptor {
    /// Take the leftmost remaining slot holding `id`, returning its well
    pub fn consume(&mut self, id: &Identifier) -> Option<WellAddress> {
        let index = self.slots.iter().position(|slot| slot.as_ref() == Some(id))?;
        self.slots[index] = None;
        WellAddress::new(self.key.row, index as u8 + 1).ok()
    }
}

/// A well that can be placed into a row fingerprint
pub trait RowSlot {
    fn row_key(&self) -> RowKey;
    fn address(&self) -> WellAddress;
    fn identifier(&self) -> Option<Identifier>;
}

impl RowSlot for PlateWell {
    fn row_key(&self) -> RowKey {
        RowKey::new(self.plate_id.clone(), self.well.row())
    }

    fn address(&self) -> WellAddress {
        self.well
    }

    fn identifier(&self) -> Option<Identifier> {
        self.identifier
    }
}

impl RowSlot for PartnerWell {
    fn row_key(&self) -> RowKey {
        RowKey::new(self.plate.clone(), self.well.row())
    }

    fn address(&self) -> WellAddress {
        self.well
    }

    fn identifier(&self) -> Option<Identifier> {
        self.identifier
    }
}

/// Fingerprints of every informative row on one side of a reconciliation
#[derive(Debug, Clone, Default)]
pub struct FingerprintIndex {
    by_fingerprint: BTreeMap<RowFingerprint, RowDescriptor>,
    by_key: BTreeMap<RowKey, RowFingerprint>,
    collisions: BTreeMap<RowFingerprint, Vec<RowKey>>,
}

impl FingerprintIndex {
    /// Group wells by `key_fn`, place each identifier at its column and
    /// index the sorted rows.
    ///
    /// Rows are visited in key order, so when two rows share a fingerprint
    /// the lower (plate, row) key owns it and the other is recorded as a
    /// collision. A later identifier in the same slot replaces an earlier
    /// one; wells without an identifier leave the slot as it is.
    pub fn build<'a, W, I, F>(wells: I, key_fn: F) -> Self
    where
        W: RowSlot + 'a,
        I: IntoIterator<Item = &'a W>,
        F: Fn(&W) -> RowKey,
    {
        let mut rows: BTreeMap<RowKey, Slots> = BTreeMap::new();
        for well in wells {
            let slots = rows.entry(key_fn(well)).or_insert([None; COLUMNS]);
            // a blank or invalid sample never clears an identifier already placed
            if let Some(id) = well.identifier() {
                slots[well.address().column() as usize - 1] = Some(id);
            }
        }

        let mut index = FingerprintIndex::default();
        for (key, slots) in rows {
            let fingerprint = RowFingerprint::from_slots(&slots);
            if fingerprint.is_empty() {
                continue;
            }

            index.by_key.insert(key.clone(), fingerprint.clone());
            if index.by_fingerprint.contains_key(&fingerprint) {
                index.collisions.entry(fingerprint).or_default().push(key);
            } else {
                index.by_fingerprint.insert(fingerprint, RowDescriptor { key, slots });
            }
        }

        for (fingerprint, others) in &index.collisions {
            if let Some(owner) = index.by_fingerprint.get(fingerprint) {
                warn!(
                    owner = %owner.key,
                    others = ?others.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
                    "Rows share one fingerprint; matches against it are ambiguous"
                );
            }
        }

        index
    }

    /// Index wells under their natural (plate, row) key
    pub fn from_wells<'a, W: RowSlot + 'a>(wells: impl IntoIterator<Item = &'a W>) -> Self {
        Self::build(wells, |well: &W| well.row_key())
    }

    pub fn fingerprint_of(&self, key: &RowKey) -> Option<&RowFingerprint> {
        self.by_key.get(key)
    }

    pub fn row(&self, fingerprint: &RowFingerprint) -> Option<&RowDescriptor> {
        self.by_fingerprint.get(fingerprint)
    }

    pub fn row_mut(&mut self, fingerprint: &RowFingerprint) -> Option<&mut RowDescriptor> {
        self.by_fingerprint.get_mut(fingerprint)
    }

    /// Rows other than the owner that carry `fingerprint`
    pub fn collisions(&self, fingerprint: &RowFingerprint) -> &[RowKey] {
        self.collisions.get(fingerprint).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_fingerprint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fingerprint.is_empty()
    }
}
