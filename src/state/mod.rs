/// State management module
///
/// This module handles everything the pipeline persists:
/// - Photograph keys and identifier records (data.rs)
/// - The identifier table and error ledger (ledger.rs)
/// - The SQLite catalog behind it (library.rs)

pub mod data;
pub mod ledger;
pub mod library;
