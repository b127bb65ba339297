//! Plate reconciliation
//!
//! Map every partner-reported well back to a canonical plate and well.
//!
//! **Algorithm:**
//! 1. Index canonical positions by identifier
//! 2. Fingerprint canonical rows and partner rows
//! 3. For each partner well, in (partner plate, well) order:
//!    - identifier plated exactly once: take that position
//!    - otherwise: find the canonical row with the same fingerprint as the
//!      partner row and consume the leftmost remaining slot holding the
//!      identifier
//!
//! The walk order is fixed so the consume step gives the same answer on
//! every run over the same inputs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::identifier::Identifier;
use crate::plate::fingerprint::{FingerprintIndex, RowKey, RowSlot};
use crate::plate::well::{PartnerWell, PlateWell, WellAddress};

/// How a partner well was placed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMethod {
    /// The identifier occupies exactly one canonical well
    Direct,
    /// Placed through the row fingerprint; `alternatives` lists other
    /// canonical rows with the same fingerprint (non-empty = ambiguous)
    Fingerprint { alternatives: Vec<RowKey> },
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Direct => "direct",
            MatchMethod::Fingerprint { .. } => "fingerprint",
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, MatchMethod::Fingerprint { alternatives } if !alternatives.is_empty())
    }
}

/// A partner well placed on a canonical plate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWell {
    pub external: PartnerWell,
    pub plate_id: String,
    pub well: WellAddress,
    pub method: MatchMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnresolvedReason {
    /// The partner reported no valid identifier for the well
    NoIdentifier,
    /// No canonical row has the partner row's fingerprint
    NoFingerprintMatch,
    /// The matching canonical row has no unconsumed slot for the identifier
    RowExhausted,
}

impl UnresolvedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnresolvedReason::NoIdentifier => "no_identifier",
            UnresolvedReason::NoFingerprintMatch => "no_fingerprint_match",
            UnresolvedReason::RowExhausted => "row_exhausted",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "no_identifier" => Some(UnresolvedReason::NoIdentifier),
            "no_fingerprint_match" => Some(UnresolvedReason::NoFingerprintMatch),
            "row_exhausted" => Some(UnresolvedReason::RowExhausted),
            _ => None,
        }
    }
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A partner well that could not be placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedWell {
    pub external: PartnerWell,
    pub reason: UnresolvedReason,
}

/// Output of one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub resolved: Vec<ResolvedWell>,
    pub unresolved: Vec<UnresolvedWell>,
}

impl Reconciliation {
    pub fn ambiguous(&self) -> impl Iterator<Item = &ResolvedWell> {
        self.resolved.iter().filter(|r| r.method.is_ambiguous())
    }
}

/// Place every partner well on the canonical plates.
///
/// Inputs are not modified. Partner wells come back in (plate, well) order.
pub fn reconcile(canonical: &[PlateWell], external: &[PartnerWell]) -> Reconciliation {
    let mut locations: BTreeMap<Identifier, BTreeSet<(String, WellAddress)>> = BTreeMap::new();
    for well in canonical {
        if let Some(id) = well.identifier {
            locations.entry(id).or_default().insert((well.plate_id.clone(), well.well));
        }
    }

    let mut canonical_rows = FingerprintIndex::from_wells(canonical);
    let partner_rows = FingerprintIndex::from_wells(external);

    let mut ordered: Vec<&PartnerWell> = external.iter().collect();
    ordered.sort_by(|a, b| (&a.plate, a.well).cmp(&(&b.plate, b.well)));

    let mut result = Reconciliation::default();
    for partner in ordered {
        let Some(id) = partner.identifier else {
            result.unresolved.push(UnresolvedWell {
                external: partner.clone(),
                reason: UnresolvedReason::NoIdentifier,
            });
            continue;
        };

        if let Some(found) = locations.get(&id).filter(|found| found.len() == 1) {
            if let Some((plate_id, well)) = found.iter().next() {
                result.resolved.push(ResolvedWell {
                    external: partner.clone(),
                    plate_id: plate_id.clone(),
                    well: *well,
                    method: MatchMethod::Direct,
                });
                continue;
            }
        }

        match place_by_fingerprint(partner, &id, &partner_rows, &mut canonical_rows) {
            Ok(resolved) => result.resolved.push(resolved),
            Err(reason) => {
                warn!(
                    plate = %partner.plate,
                    well = %partner.well,
                    identifier = %id,
                    %reason,
                    "Partner well unresolved"
                );
                result.unresolved.push(UnresolvedWell {
                    external: partner.clone(),
                    reason,
                });
            }
        }
    }

    info!(
        resolved = result.resolved.len(),
        unresolved = result.unresolved.len(),
        ambiguous = result.ambiguous().count(),
        "Reconciliation complete"
    );

    result
}

fn place_by_fingerprint(
    partner: &PartnerWell,
    id: &Identifier,
    partner_rows: &FingerprintIndex,
    canonical_rows: &mut FingerprintIndex,
) -> Result<ResolvedWell, UnresolvedReason> {
    let fingerprint = partner_rows
        .fingerprint_of(&partner.row_key())
        .ok_or(UnresolvedReason::NoFingerprintMatch)?;

    let alternatives = canonical_rows.collisions(fingerprint).to_vec();
    let row = canonical_rows
        .row_mut(fingerprint)
        .ok_or(UnresolvedReason::NoFingerprintMatch)?;
    let well = row.consume(id).ok_or(UnresolvedReason::RowExhausted)?;

    Ok(ResolvedWell {
        external: partner.clone(),
        plate_id: row.key.plate.clone(),
        well,
        method: MatchMethod::Fingerprint { alternatives },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> Identifier {
        Identifier::parse(&format!("00000000-0000-4000-8000-0000000000{:02x}", n)).unwrap()
    }

    fn canonical(plate: &str, well: &str, sample: Option<Identifier>) -> PlateWell {
        PlateWell {
            plate_id: plate.to_string(),
            well: WellAddress::parse(well).unwrap(),
            identifier: sample,
        }
    }

    fn partner(plate: &str, well: &str, sample: Option<Identifier>) -> PartnerWell {
        PartnerWell {
            plate: plate.to_string(),
            well: WellAddress::parse(well).unwrap(),
            identifier: sample,
        }
    }

    /// Row A of P1: [id1, id2, '', id2, '', ...]
    fn duplicated_row() -> Vec<PlateWell> {
        vec![
            canonical("P1", "A01", Some(id(1))),
            canonical("P1", "A02", Some(id(2))),
            canonical("P1", "A03", None),
            canonical("P1", "A04", Some(id(2))),
        ]
    }

    #[test]
    fn test_direct_lookup_for_single_plating() {
        let canonical = vec![canonical("P1", "B07", Some(id(5)))];
        let external = vec![partner("Q9", "H01", Some(id(5)))];

        let result = reconcile(&canonical, &external);
        assert!(result.unresolved.is_empty());
        let resolved = &result.resolved[0];
        assert_eq!(resolved.plate_id, "P1");
        assert_eq!(resolved.well.to_string(), "B07");
        assert_eq!(resolved.method, MatchMethod::Direct);
    }

    #[test]
    fn test_duplicate_in_row_consumed_once_each() {
        // partner permuted the row: id2 lands in A01 and A03, id1 in A02
        let external = vec![
            partner("Q1", "A03", Some(id(2))),
            partner("Q1", "A02", Some(id(1))),
            partner("Q1", "A01", Some(id(2))),
        ];

        let result = reconcile(&duplicated_row(), &external);
        assert!(result.unresolved.is_empty());

        let dupes: Vec<String> = result
            .resolved
            .iter()
            .filter(|r| r.external.identifier == Some(id(2)))
            .map(|r| format!("{} {}", r.plate_id, r.well))
            .collect();
        // partner wells walk in well order, canonical columns are taken left to right
        assert_eq!(dupes, vec!["P1 A02", "P1 A04"]);

        let single = result.resolved.iter().find(|r| r.external.identifier == Some(id(1))).unwrap();
        assert_eq!(single.well.to_string(), "A01");
        assert_eq!(single.method, MatchMethod::Direct);
    }

    #[test]
    fn test_result_reflects_true_column_not_sorted_position() {
        let canonical = vec![
            canonical("P1", "C12", Some(id(3))),
            canonical("P1", "C06", Some(id(3))),
        ];
        let external = vec![partner("Q1", "F01", Some(id(3))), partner("Q1", "F02", Some(id(3)))];

        let result = reconcile(&canonical, &external);
        let wells: Vec<String> = result.resolved.iter().map(|r| r.well.to_string()).collect();
        assert_eq!(wells, vec!["C06", "C12"]);
    }

    #[test]
    fn test_no_identifier_is_unresolved() {
        let external = vec![partner("Q1", "A01", None)];
        let result = reconcile(&duplicated_row(), &external);
        assert!(result.resolved.is_empty());
        assert_eq!(result.unresolved[0].reason, UnresolvedReason::NoIdentifier);
    }

    #[test]
    fn test_fingerprint_miss_is_unresolved() {
        // partner row is missing id1, so its fingerprint differs
        let external = vec![partner("Q1", "A01", Some(id(2))), partner("Q1", "A02", Some(id(2)))];
        let result = reconcile(&duplicated_row(), &external);
        assert_eq!(result.resolved.len(), 0);
        assert!(result.unresolved.iter().all(|u| u.reason == UnresolvedReason::NoFingerprintMatch));
        assert_eq!(result.unresolved.len(), 2);
    }

    #[test]
    fn test_unknown_identifier_is_unresolved() {
        let external = vec![partner("Q1", "A01", Some(id(42)))];
        let result = reconcile(&duplicated_row(), &external);
        assert_eq!(result.unresolved[0].reason, UnresolvedReason::NoFingerprintMatch);
    }

    #[test]
    fn test_row_exhausted() {
        // two partner rows with the same fingerprint both point at P1 row C
        let canonical = vec![
            canonical("P1", "C01", Some(id(4))),
            canonical("P1", "C02", Some(id(4))),
        ];
        let external = vec![
            partner("Q1", "A01", Some(id(4))),
            partner("Q1", "A02", Some(id(4))),
            partner("Q2", "A01", Some(id(4))),
            partner("Q2", "A02", Some(id(4))),
        ];

        let result = reconcile(&canonical, &external);
        assert_eq!(result.resolved.len(), 2);
        assert_eq!(result.unresolved.len(), 2);
        assert!(result
            .unresolved
            .iter()
            .all(|u| u.reason == UnresolvedReason::RowExhausted && u.external.plate == "Q2"));
    }

    #[test]
    fn test_ambiguous_fingerprint_is_exposed() {
        let canonical = vec![
            canonical("P1", "A01", Some(id(6))),
            canonical("P1", "A02", Some(id(6))),
            canonical("P2", "D01", Some(id(6))),
            canonical("P2", "D02", Some(id(6))),
        ];
        let external = vec![partner("Q1", "B01", Some(id(6))), partner("Q1", "B02", Some(id(6)))];

        let result = reconcile(&canonical, &external);
        assert_eq!(result.resolved.len(), 2);
        let resolved = &result.resolved[0];
        assert_eq!(resolved.plate_id, "P1");
        assert!(resolved.method.is_ambiguous());
        assert_eq!(
            resolved.method,
            MatchMethod::Fingerprint { alternatives: vec![RowKey::new("P2", 'D')] }
        );
        assert_eq!(result.ambiguous().count(), 2);
    }

    #[test]
    fn test_reproducible_across_input_order() {
        let mut external = vec![
            partner("Q1", "A01", Some(id(2))),
            partner("Q1", "A02", Some(id(1))),
            partner("Q1", "A03", Some(id(2))),
        ];
        let first = reconcile(&duplicated_row(), &external);
        external.reverse();
        let second = reconcile(&duplicated_row(), &external);
        assert_eq!(first, second);
    }
}
