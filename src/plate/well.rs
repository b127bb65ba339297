//! Wells on the canonical sample plates and on partner plates

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identifier::Identifier;

/// Plate row letters, top to bottom
pub const ROW_LETTERS: [char; 8] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H'];

/// Wells per plate row
pub const COLUMNS: usize = 12;

/// A well position: row A-H, column 1-12.
///
/// Ordering is row-major (A01, A02, ... A12, B01, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WellAddress {
    row: char,
    column: u8,
}

impl WellAddress {
    pub fn new(row: char, column: u8) -> Result<Self> {
        let row = row.to_ascii_uppercase();
        if !ROW_LETTERS.contains(&row) {
            return Err(Error::InvalidInput(format!("well row {:?} is not A-H", row)));
        }
        if column == 0 || column as usize > COLUMNS {
            return Err(Error::InvalidInput(format!("well column {} is not 1-12", column)));
        }
        Ok(WellAddress { row, column })
    }

    /// Parse `A1`, `a01`, `H12`
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let mut chars = text.chars();
        let row = chars
            .next()
            .ok_or_else(|| Error::InvalidInput("empty well address".into()))?;
        let column: u8 = chars
            .as_str()
            .parse()
            .map_err(|_| Error::InvalidInput(format!("bad well address {:?}", text)))?;
        WellAddress::new(row, column)
    }

    pub fn row(&self) -> char {
        self.row
    }

    /// 1-based column
    pub fn column(&self) -> u8 {
        self.column
    }

    /// 0-based row index (A = 0)
    pub fn row_index(&self) -> usize {
        (self.row as u8 - b'A') as usize
    }

    /// 1-based position in row-major order (A01 = 1, H12 = 96)
    pub fn well_no(&self) -> usize {
        self.row_index() * COLUMNS + self.column as usize
    }
}

impl fmt::Display for WellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}", self.row, self.column)
    }
}

impl FromStr for WellAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        WellAddress::parse(s)
    }
}

impl TryFrom<String> for WellAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        WellAddress::parse(&value)
    }
}

impl From<WellAddress> for String {
    fn from(well: WellAddress) -> Self {
        well.to_string()
    }
}

/// A well in the canonical plate registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateWell {
    pub plate_id: String,
    pub well: WellAddress,
    pub identifier: Option<Identifier>,
}

impl PlateWell {
    /// `sample` is the raw registry cell; anything that is not an identifier is an empty well
    pub fn new(plate_id: impl Into<String>, well: WellAddress, sample: &str) -> Self {
        PlateWell {
            plate_id: plate_id.into(),
            well,
            identifier: Identifier::parse(sample.trim()),
        }
    }
}

/// A well as reported by a processing partner, in the partner's own numbering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerWell {
    pub plate: String,
    pub well: WellAddress,
    pub identifier: Option<Identifier>,
}

impl PartnerWell {
    pub fn new(plate: impl Into<String>, well: WellAddress, sample: &str) -> Self {
        PartnerWell {
            plate: plate.into(),
            well,
            identifier: Identifier::parse(sample.trim()),
        }
    }

    /// Build from a partner sample token such as `FMN_131001_P3_WA01`
    pub fn from_partner_id(token: &str, sample: &str) -> Result<Self> {
        let (plate, well) = parse_partner_id(token)?;
        Ok(PartnerWell::new(plate, well, sample))
    }
}

/// Split `<letters>_<digits>_P<digits>_W<well>` into (`P<digits>`, well)
pub fn parse_partner_id(token: &str) -> Result<(String, WellAddress)> {
    let bad = || Error::InvalidInput(format!("unrecognised partner well id {:?}", token));

    let parts: Vec<&str> = token.trim().splitn(4, '_').collect();
    let [prefix, batch, plate, well] = parts.as_slice() else {
        return Err(bad());
    };

    let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(bad());
    }
    if !all_digits(batch) {
        return Err(bad());
    }
    if !plate.strip_prefix('P').is_some_and(all_digits) {
        return Err(bad());
    }
    let well = well.strip_prefix('W').ok_or_else(bad)?;
    let well = WellAddress::parse(well).map_err(|_| bad())?;

    Ok((plate.to_string(), well))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let well = WellAddress::parse("a1").unwrap();
        assert_eq!(well.to_string(), "A01");
        assert_eq!(WellAddress::parse("H12").unwrap().to_string(), "H12");
        assert_eq!(WellAddress::parse(" C07 ").unwrap(), WellAddress::new('C', 7).unwrap());
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(WellAddress::parse("I01").is_err());
        assert!(WellAddress::parse("A00").is_err());
        assert!(WellAddress::parse("A13").is_err());
        assert!(WellAddress::parse("").is_err());
        assert!(WellAddress::parse("A").is_err());
        assert!(WellAddress::parse("AB").is_err());
    }

    #[test]
    fn test_well_no() {
        assert_eq!(WellAddress::parse("A01").unwrap().well_no(), 1);
        assert_eq!(WellAddress::parse("B01").unwrap().well_no(), 13);
        assert_eq!(WellAddress::parse("H12").unwrap().well_no(), 96);
    }

    #[test]
    fn test_row_major_order() {
        let mut wells: Vec<WellAddress> =
            ["B01", "A12", "A02"].iter().map(|w| WellAddress::parse(w).unwrap()).collect();
        wells.sort();
        let names: Vec<String> = wells.iter().map(|w| w.to_string()).collect();
        assert_eq!(names, vec!["A02", "A12", "B01"]);
    }

    #[test]
    fn test_blank_sample_is_empty_well() {
        let well = PlateWell::new("P1", WellAddress::parse("A01").unwrap(), "  ");
        assert_eq!(well.identifier, None);
        let well = PlateWell::new("P1", WellAddress::parse("A01").unwrap(), "EMPTY");
        assert_eq!(well.identifier, None);
    }

    #[test]
    fn test_partner_sample_is_trimmed() {
        let well = PartnerWell::new(
            "Q1",
            WellAddress::parse("A01").unwrap(),
            " 8b6e0223-7fbe-4efc-a1e2-6c934da06685\n",
        );
        assert!(well.identifier.is_some());
    }

    #[test]
    fn test_partner_id() {
        let (plate, well) = parse_partner_id("FMN_131001_P3_WA01").unwrap();
        assert_eq!(plate, "P3");
        assert_eq!(well.to_string(), "A01");

        let well = PartnerWell::from_partner_id("FMN_131001_P12_WH12", "").unwrap();
        assert_eq!(well.plate, "P12");
        assert_eq!(well.well.well_no(), 96);
        assert_eq!(well.identifier, None);
    }

    #[test]
    fn test_bad_partner_ids() {
        for token in [
            "",
            "FMN_131001_P3",
            "FMN_13a_P3_WA01",
            "FMN_131001_Q3_WA01",
            "FMN_131001_P3_A01",
            "1_131001_P3_WA01",
            "FMN_131001_P3_WZ01",
        ] {
            assert!(parse_partner_id(token).is_err(), "{}", token);
        }
    }
}
