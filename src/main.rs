use std::path::PathBuf;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use specimen_ledger::{
    reconcile, scan_photo_dirs, BatchIngestor, Catalog, Config, IdentifierReader, Result,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(err) = run(std::env::args_os().nth(1).map(PathBuf::from)).await {
        tracing::error!(error = %err, "Run failed");
        std::process::exit(1);
    }
}

/// One full pass: ingest new photographs, then reconcile partner wells
async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = match &config_path {
        Some(path) => Config::load(path)?,
        None => {
            let config = Config::default();
            config.validate()?;
            config
        }
    };
    info!(
        config = ?config_path,
        catalog = %config.catalog_path.display(),
        "Starting specimen ledger run"
    );

    let mut catalog = Catalog::open(&config.catalog_path)?;
    let mut ledger = catalog.load_ledger()?;

    // Identifier ingest
    for dir in config.image_dir_paths() {
        info!(dir = %dir.display(), "Photograph directory");
    }
    let photos = scan_photo_dirs(&config.photos_root, &config.image_dirs, &config.extensions)?;
    let ingestor = BatchIngestor::new(IdentifierReader::new(config.scan.clone()), &config.ingest);
    let report = ingestor.ingest(photos, &ledger.already_seen()).await?;
    let (records, errors) = ledger.merge(report);
    info!(records, errors, "Ingest merged into ledger");

    // Plate reconciliation
    let canonical = catalog.load_canonical_wells()?;
    let partner = catalog.load_partner_wells()?;
    if canonical.is_empty() || partner.is_empty() {
        info!(
            canonical = canonical.len(),
            partner = partner.len(),
            "Skipping reconciliation, no wells on one side"
        );
    } else {
        let result = reconcile(&canonical, &partner);
        for ambiguous in result.ambiguous() {
            warn!(
                partner_plate = %ambiguous.external.plate,
                partner_well = %ambiguous.external.well,
                plate = %ambiguous.plate_id,
                well = %ambiguous.well,
                "Ambiguous fingerprint placement"
            );
        }
        ledger.record_reconciliation(&result);
        catalog.save_reconciliation(&result)?;
    }

    catalog.save_ledger(&ledger)?;
    info!(
        records = ledger.records().count(),
        open_errors = ledger.open_error_count(),
        "Run complete"
    );
    Ok(())
}
