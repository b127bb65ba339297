use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::data::{IdentifierRecord, PhotoPath};
use super::ledger::{ErrorCode, IngestError, IngestErrorKind, Ledger, WellError};
use crate::error::{Error, Result};
use crate::identifier::Identifier;
use crate::plate::reconcile::{MatchMethod, Reconciliation, UnresolvedReason};
use crate::plate::well::{PartnerWell, PlateWell, WellAddress};

/// The Catalog manages the SQLite database behind the ledger.
///
/// It holds accepted identifiers, ingest errors, the canonical plate
/// registry, partner plate reports and the latest reconciliation. The
/// ledger and reconciler never touch it directly; the driver loads,
/// computes and saves.
pub struct Catalog {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl Catalog {
    /// Open (or create) the catalog at `path`, creating parent directories
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let mut catalog = Catalog { conn, db_path: Some(path.to_path_buf()) };
        catalog.init_schema()?;

        info!(path = %path.display(), "Catalog opened");
        Ok(catalog)
    }

    /// A throwaway catalog, for tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut catalog = Catalog { conn, db_path: None };
        catalog.init_schema()?;
        Ok(catalog)
    }

    /// Create all tables and indexes if they don't exist
    fn init_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS images (
                image_file      TEXT PRIMARY KEY,
                sample_id       TEXT NOT NULL UNIQUE,
                forced          INTEGER NOT NULL DEFAULT 0,
                imported_at     INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS image_errors (
                image_file      TEXT PRIMARY KEY,
                reason          TEXT NOT NULL,
                msg             TEXT NOT NULL,
                sample_id       TEXT,
                prior_file      TEXT,
                detail          TEXT,
                ok              INTEGER NOT NULL DEFAULT 0,
                resolution      TEXT
            );

            CREATE TABLE IF NOT EXISTS sample_wells (
                plate_id        TEXT NOT NULL,
                well            TEXT NOT NULL,
                sample_id       TEXT,
                PRIMARY KEY (plate_id, well)
            );

            CREATE TABLE IF NOT EXISTS partner_wells (
                partner_plate   TEXT NOT NULL,
                partner_well    TEXT NOT NULL,
                sample_id       TEXT,
                PRIMARY KEY (partner_plate, partner_well)
            );

            CREATE TABLE IF NOT EXISTS reconciled_wells (
                partner_plate   TEXT NOT NULL,
                partner_well    TEXT NOT NULL,
                sample_id       TEXT,
                plate_id        TEXT NOT NULL,
                well            TEXT NOT NULL,
                method          TEXT NOT NULL,
                alternatives    TEXT NOT NULL,
                reconciled_at   INTEGER NOT NULL,
                PRIMARY KEY (partner_plate, partner_well)
            );

            CREATE TABLE IF NOT EXISTS well_errors (
                partner_plate   TEXT NOT NULL,
                partner_well    TEXT NOT NULL,
                sample_id       TEXT,
                reason          TEXT NOT NULL,
                ok              INTEGER NOT NULL DEFAULT 0,
                resolution      TEXT,
                PRIMARY KEY (partner_plate, partner_well)
            );

            CREATE INDEX IF NOT EXISTS idx_sample_wells_sample_id ON sample_wells(sample_id);
            CREATE INDEX IF NOT EXISTS idx_image_errors_reason ON image_errors(reason);",
        )?;

        debug!("Catalog schema initialized");
        Ok(())
    }

    /// Path of the database file; `None` for in-memory catalogs
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Number of accepted identifier records
    pub fn record_count(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count)
    }

    /// When a photograph's record was first stored, as a Unix timestamp
    pub fn imported_at(&self, photo: &PhotoPath) -> Result<Option<i64>> {
        let at = self
            .conn
            .query_row(
                "SELECT imported_at FROM images WHERE image_file = ?1",
                [photo.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(at)
    }

    /// Read the whole ledger back
    pub fn load_ledger(&self) -> Result<Ledger> {
        let mut stmt = self
            .conn
            .prepare("SELECT image_file, sample_id, forced FROM images ORDER BY image_file")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, bool>(2)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (file, sample_id, forced) = row?;
            records.push(IdentifierRecord {
                photo: PhotoPath::parse(&file),
                identifier: stored_identifier(&sample_id)?,
                forced,
            });
        }

        let mut stmt = self.conn.prepare(
            "SELECT image_file, reason, sample_id, prior_file, detail, ok, resolution
             FROM image_errors ORDER BY image_file",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredImageError {
                file: row.get(0)?,
                reason: row.get(1)?,
                sample_id: row.get(2)?,
                prior_file: row.get(3)?,
                detail: row.get(4)?,
                ok: row.get(5)?,
                resolution: row.get(6)?,
            })
        })?;

        let mut errors = Vec::new();
        for row in rows {
            errors.push(row?.into_error()?);
        }

        let mut stmt = self.conn.prepare(
            "SELECT partner_plate, partner_well, sample_id, reason, ok, resolution
             FROM well_errors ORDER BY partner_plate, partner_well",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, bool>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut well_errors = Vec::new();
        for row in rows {
            let (plate, well, sample_id, reason, ok, resolution) = row?;
            let reason = UnresolvedReason::parse(&reason).ok_or_else(|| {
                Error::InvalidInput(format!("unknown unresolved reason {:?}", reason))
            })?;
            let sample = sample_id.as_deref().unwrap_or("");
            well_errors.push(WellError {
                well: PartnerWell::new(plate, WellAddress::parse(&well)?, sample),
                reason,
                resolved: ok,
                resolution,
            });
        }

        let ledger = Ledger::from_parts(records, errors, well_errors)?;
        debug!(
            records = ledger.records().count(),
            errors = ledger.errors().count(),
            well_errors = ledger.well_errors().count(),
            "Ledger loaded"
        );
        Ok(ledger)
    }

    /// Replace the stored ledger in one transaction.
    ///
    /// Records keep their original import time.
    pub fn save_ledger(&mut self, ledger: &Ledger) -> Result<()> {
        let now = Utc::now().timestamp();
        let tx = self.conn.transaction()?;

        let imported: HashMap<String, i64> = {
            let mut stmt = tx.prepare("SELECT image_file, imported_at FROM images")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            let imported = rows.collect::<rusqlite::Result<HashMap<_, _>>>()?;
            imported
        };

        tx.execute("DELETE FROM images", [])?;
        tx.execute("DELETE FROM image_errors", [])?;
        tx.execute("DELETE FROM well_errors", [])?;

        {
            let mut insert = tx.prepare(
                "INSERT INTO images (image_file, sample_id, forced, imported_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for record in ledger.records() {
                let at = imported.get(record.photo.as_str()).copied().unwrap_or(now);
                insert.execute(params![
                    record.photo.as_str(),
                    record.identifier.to_string(),
                    record.forced,
                    at,
                ])?;
            }

            let mut insert = tx.prepare(
                "INSERT INTO image_errors
                 (image_file, reason, msg, sample_id, prior_file, detail, ok, resolution)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for error in ledger.errors() {
                let (sample_id, prior_file, detail) = match &error.kind {
                    IngestErrorKind::MissingIdentifier => (None, None, None),
                    IngestErrorKind::DuplicateIdentifier { identifier, prior } => {
                        (Some(identifier.to_string()), Some(prior.to_string()), None)
                    }
                    IngestErrorKind::UnreadableFile { detail } => {
                        (None, None, Some(detail.clone()))
                    }
                };
                insert.execute(params![
                    error.photo.as_str(),
                    error.code().as_str(),
                    error.to_string(),
                    sample_id,
                    prior_file,
                    detail,
                    error.resolved,
                    error.resolution,
                ])?;
            }

            let mut insert = tx.prepare(
                "INSERT INTO well_errors
                 (partner_plate, partner_well, sample_id, reason, ok, resolution)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for error in ledger.well_errors() {
                insert.execute(params![
                    error.well.plate,
                    error.well.well.to_string(),
                    error.well.identifier.map(|id| id.to_string()),
                    error.reason.as_str(),
                    error.resolved,
                    error.resolution,
                ])?;
            }
        }

        tx.commit()?;
        info!(path = ?self.db_path, open_errors = ledger.open_error_count(), "Ledger saved");
        Ok(())
    }

    pub fn load_canonical_wells(&self) -> Result<Vec<PlateWell>> {
        let rows = self.well_rows(
            "SELECT plate_id, well, sample_id FROM sample_wells ORDER BY plate_id, well",
        )?;
        rows.into_iter()
            .map(|(plate, well, sample)| {
                let sample = sample.as_deref().unwrap_or("");
                Ok(PlateWell::new(plate, WellAddress::parse(&well)?, sample))
            })
            .collect()
    }

    /// Replace the canonical plate registry
    pub fn save_canonical_wells(&mut self, wells: &[PlateWell]) -> Result<()> {
        let rows = wells.iter().map(|w| (w.plate_id.as_str(), w.well, w.identifier));
        self.replace_wells("sample_wells", "plate_id, well, sample_id", rows)
    }

    pub fn load_partner_wells(&self) -> Result<Vec<PartnerWell>> {
        let rows = self.well_rows(
            "SELECT partner_plate, partner_well, sample_id FROM partner_wells
             ORDER BY partner_plate, partner_well",
        )?;
        rows.into_iter()
            .map(|(plate, well, sample)| {
                let sample = sample.as_deref().unwrap_or("");
                Ok(PartnerWell::new(plate, WellAddress::parse(&well)?, sample))
            })
            .collect()
    }

    /// Replace the partner plate reports
    pub fn save_partner_wells(&mut self, wells: &[PartnerWell]) -> Result<()> {
        let rows = wells.iter().map(|w| (w.plate.as_str(), w.well, w.identifier));
        self.replace_wells("partner_wells", "partner_plate, partner_well, sample_id", rows)
    }

    /// Replace the stored reconciliation with `result.resolved`.
    ///
    /// Unresolved wells live in the ledger (`well_errors`), not here.
    pub fn save_reconciliation(&mut self, result: &Reconciliation) -> Result<()> {
        let now = Utc::now().timestamp();
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM reconciled_wells", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO reconciled_wells
                 (partner_plate, partner_well, sample_id, plate_id, well, method, alternatives,
                  reconciled_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for resolved in &result.resolved {
                let alternatives = match &resolved.method {
                    MatchMethod::Direct => serde_json::to_string(&Vec::<()>::new())?,
                    MatchMethod::Fingerprint { alternatives } => {
                        serde_json::to_string(alternatives)?
                    }
                };
                insert.execute(params![
                    resolved.external.plate,
                    resolved.external.well.to_string(),
                    resolved.external.identifier.map(|id| id.to_string()),
                    resolved.plate_id,
                    resolved.well.to_string(),
                    resolved.method.as_str(),
                    alternatives,
                    now,
                ])?;
            }
        }
        tx.commit()?;

        info!(resolved = result.resolved.len(), "Reconciliation saved");
        Ok(())
    }

    /// Canonical position recorded for a partner well by the last reconciliation
    pub fn reconciled_position(
        &self,
        plate: &str,
        well: WellAddress,
    ) -> Result<Option<(String, WellAddress, String)>> {
        let row: Option<(String, String, String)> = self
            .conn
            .query_row(
                "SELECT plate_id, well, method FROM reconciled_wells
                 WHERE partner_plate = ?1 AND partner_well = ?2",
                params![plate, well.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            Some((plate_id, well, method)) => {
                Ok(Some((plate_id, WellAddress::parse(&well)?, method)))
            }
            None => Ok(None),
        }
    }

    fn well_rows(&self, sql: &str) -> Result<Vec<(String, String, Option<String>)>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;
        let mut wells = Vec::new();
        for row in rows {
            wells.push(row?);
        }
        Ok(wells)
    }

    fn replace_wells<'a>(
        &mut self,
        table: &str,
        columns: &str,
        rows: impl Iterator<Item = (&'a str, WellAddress, Option<Identifier>)>,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(&format!("DELETE FROM {}", table), [])?;
        let mut count = 0;
        {
            let sql = format!("INSERT INTO {} ({}) VALUES (?1, ?2, ?3)", table, columns);
            let mut insert = tx.prepare(&sql)?;
            for (plate, well, identifier) in rows {
                let sample = identifier.map(|id| id.to_string());
                insert.execute(params![plate, well.to_string(), sample])?;
                count += 1;
            }
        }
        tx.commit()?;

        debug!(table, wells = count, "Wells saved");
        Ok(())
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").field("db_path", &self.db_path).finish()
    }
}

fn stored_identifier(text: &str) -> Result<Identifier> {
    Identifier::parse(text)
        .ok_or_else(|| Error::InvalidInput(format!("stored sample id {:?} is not a UUID", text)))
}

/// One `image_errors` row before it is turned back into an error entry
struct StoredImageError {
    file: String,
    reason: String,
    sample_id: Option<String>,
    prior_file: Option<String>,
    detail: Option<String>,
    ok: bool,
    resolution: Option<String>,
}

impl StoredImageError {
    fn into_error(self) -> Result<IngestError> {
        let photo = PhotoPath::parse(&self.file);
        let mut error = if self.reason == ErrorCode::MissingIdentifier.as_str() {
            IngestError::missing(photo)
        } else if self.reason == ErrorCode::DuplicateIdentifier.as_str() {
            let identifier = stored_identifier(self.sample_id.as_deref().unwrap_or(""))?;
            let prior = PhotoPath::parse(self.prior_file.as_deref().unwrap_or(""));
            IngestError::duplicate(photo, identifier, prior)
        } else if self.reason == ErrorCode::UnreadableFile.as_str() {
            IngestError::unreadable(photo, self.detail.unwrap_or_default())
        } else {
            let reason = self.reason;
            return Err(Error::InvalidInput(format!("unknown image error reason {:?}", reason)));
        };
        error.resolved = self.ok;
        error.resolution = self.resolution;
        Ok(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::batch::IngestReport;
    use crate::plate::reconcile::reconcile;
    use crate::state::ledger::ErrorKey;

    fn id(n: u8) -> Identifier {
        Identifier::parse(&format!("00000000-0000-4000-8000-0000000000{:02x}", n)).unwrap()
    }

    fn photo(name: &str) -> PhotoPath {
        PhotoPath::new("MO-DOE", name)
    }

    fn well(w: &str) -> WellAddress {
        WellAddress::parse(w).unwrap()
    }

    fn sample_ledger() -> Ledger {
        let mut ledger = Ledger::new();
        ledger.merge(IngestReport {
            accepted: vec![IdentifierRecord::decoded(photo("R1.JPG"), id(1))],
            errors: vec![
                IngestError::missing(photo("R2.JPG")),
                IngestError::duplicate(photo("R3.JPG"), id(1), photo("R1.JPG")),
                IngestError::unreadable(photo("R4.JPG"), "truncated JPEG"),
            ],
        });
        ledger
            .resolve_error(&ErrorKey::Photograph(photo("R2.JPG")), "ERROR: Blurry image")
            .unwrap();
        ledger.force_identifier(photo("R2.JPG"), id(2)).unwrap();
        ledger
    }

    #[test]
    fn test_ledger_round_trip() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        let ledger = sample_ledger();
        catalog.save_ledger(&ledger).unwrap();

        let loaded = catalog.load_ledger().unwrap();
        assert_eq!(loaded, ledger);
        assert_eq!(catalog.record_count().unwrap(), 2);
    }

    #[test]
    fn test_save_keeps_import_time() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        let ledger = sample_ledger();
        catalog.save_ledger(&ledger).unwrap();

        catalog
            .conn
            .execute("UPDATE images SET imported_at = 42 WHERE image_file = 'MO-DOE/R1.JPG'", [])
            .unwrap();
        catalog.save_ledger(&ledger).unwrap();
        assert_eq!(catalog.imported_at(&photo("R1.JPG")).unwrap(), Some(42));
        assert_eq!(catalog.imported_at(&photo("missing.JPG")).unwrap(), None);
    }

    #[test]
    fn test_unique_sample_id_enforced() {
        let catalog = Catalog::open_in_memory().unwrap();
        let insert = "INSERT INTO images (image_file, sample_id, forced, imported_at)
                      VALUES (?1, ?2, 0, 0)";
        catalog.conn.execute(insert, params!["a/1.jpg", id(1).to_string()]).unwrap();
        assert!(catalog.conn.execute(insert, params!["a/2.jpg", id(1).to_string()]).is_err());
    }

    #[test]
    fn test_wells_and_reconciliation() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        let canonical = vec![
            PlateWell::new("P1", well("A01"), &id(1).to_string()),
            PlateWell::new("P1", well("A02"), &id(2).to_string()),
            PlateWell::new("P1", well("A03"), &id(2).to_string()),
            PlateWell::new("P1", well("A04"), ""),
        ];
        let partner = vec![
            PartnerWell::new("Q9", well("C01"), &id(2).to_string()),
            PartnerWell::new("Q9", well("C02"), &id(1).to_string()),
            PartnerWell::new("Q9", well("C03"), &id(2).to_string()),
        ];
        catalog.save_canonical_wells(&canonical).unwrap();
        catalog.save_partner_wells(&partner).unwrap();

        let canonical = catalog.load_canonical_wells().unwrap();
        let partner = catalog.load_partner_wells().unwrap();
        assert_eq!(canonical.len(), 4);
        assert_eq!(canonical[3].identifier, None);
        assert_eq!(partner.len(), 3);

        let result = reconcile(&canonical, &partner);
        assert!(result.unresolved.is_empty());
        catalog.save_reconciliation(&result).unwrap();

        let (plate, position, method) =
            catalog.reconciled_position("Q9", well("C03")).unwrap().unwrap();
        assert_eq!(
            (plate.as_str(), position.to_string().as_str(), method.as_str()),
            ("P1", "A03", "fingerprint")
        );
        let (_, position, method) =
            catalog.reconciled_position("Q9", well("C02")).unwrap().unwrap();
        assert_eq!((position.to_string().as_str(), method.as_str()), ("A01", "direct"));
        assert!(catalog.reconciled_position("Q9", well("C04")).unwrap().is_none());
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.db");
        {
            let mut catalog = Catalog::open(&path).unwrap();
            catalog.save_ledger(&sample_ledger()).unwrap();
            assert_eq!(catalog.path(), Some(path.as_path()));
        }

        let catalog = Catalog::open(&path).unwrap();
        assert_eq!(catalog.load_ledger().unwrap(), sample_ledger());
    }
}
