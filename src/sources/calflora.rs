// 🌼 Calflora Reconciler - Regional flora database
// Two tab-separated feeds (active and inactive species) are merged into
// one store with last-wins overwrite to maximize coverage; a name seen in
// both feeds is worth a log line. Comparison covers nativity, the active
// flag, and both the Calflora and Jepson identifier columns.

use crate::catalog::Catalog;
use crate::exceptions::Exceptions;
use crate::normalize::{is_genus_only, is_placeholder, Normalizer};
use crate::report::ErrorLog;
use crate::rows::{field, Row};
use crate::sources::Source;
use crate::store::{DuplicatePolicy, ExternalRecord, InsertOutcome, RecordStore};
use anyhow::{bail, Result};

/// Exception codes curators may register for Calflora
pub const EXCEPTION_CODES: &[&str] = &[
    "notincalflora",
    "non-native",
    "notactive",
    "badjepsonid",
    "badid",
];

// ============================================================================
// STATUS VOCABULARY
// ============================================================================

/// Calflora's "Native Status" vocabulary, mapped to our nativity flag.
/// The table is closed: a value outside it is a schema violation and
/// aborts the run rather than defaulting.
const NATIVE_STATUS: &[(&str, bool)] = &[
    ("native", true),
    ("rare", true),
    ("naturalized", false),
    ("non-native", false),
    ("waif", false),
];

fn is_native_status(status: &str) -> Result<bool> {
    for (code, is_native) in NATIVE_STATUS {
        if *code == status {
            return Ok(*is_native);
        }
    }
    bail!("unrecognized Calflora native status: \"{}\"", status)
}

fn normalizer() -> Normalizer {
    Normalizer::new().with_infraspecific_expansion()
}

// ============================================================================
// STORE BUILD
// ============================================================================

/// Merge the active and inactive feeds into one store. The inactive feed
/// is ingested second so its rows win, matching how the feeds are
/// published; a replacement across feeds is logged.
pub fn build_store(
    active_rows: &[Row],
    inactive_rows: &[Row],
    log: &mut ErrorLog,
) -> Result<RecordStore> {
    let mut store = RecordStore::new(DuplicatePolicy::Overwrite);

    for row in active_rows {
        ingest_row(&mut store, row, false, log)?;
    }
    for row in inactive_rows {
        ingest_row(&mut store, row, true, log)?;
    }

    Ok(store)
}

fn ingest_row(
    store: &mut RecordStore,
    row: &Row,
    second_feed: bool,
    log: &mut ErrorLog,
) -> Result<()> {
    let name = match field(row, "Taxon") {
        Some(name) => name,
        None => return Ok(()),
    };

    let status = match field(row, "Native Status") {
        Some(status) => status,
        None => bail!("Calflora row for {} has no Native Status", name),
    };
    // Validate the vocabulary up front so a bad feed aborts before any
    // comparisons run.
    is_native_status(status)?;

    let mut record = ExternalRecord::new()
        .with_status(status)
        .with_active(field(row, "Active in Calflora?") == Some("YES"));
    if let Some(id) = field(row, "Calrecnum") {
        record = record.with_id(id);
    }
    if let Some(id) = field(row, "TJMTID") {
        record = record.with_xref_id(id);
    }

    if store.insert(name, record) == InsertOutcome::Replaced && second_feed {
        log.log(name, "is in both active and inactive Calflora files");
    }
    Ok(())
}

// ============================================================================
// RECONCILIATION
// ============================================================================

/// Forward pass over the catalog, then reverse validation of every
/// registered Calflora exception.
pub fn analyze(
    catalog: &Catalog,
    exceptions: &Exceptions,
    store: &RecordStore,
    log: &mut ErrorLog,
) -> Result<()> {
    let normalizer = normalizer();

    for taxon in catalog.taxa() {
        let name = taxon.name.as_str();
        if is_placeholder(name) || is_genus_only(name) {
            continue;
        }

        let record = match normalizer.resolve(store, name) {
            Some(record) => record,
            None => {
                if !exceptions.has(name, Source::Calflora, "notincalflora") {
                    log.log(name, "not found in Calflora");
                }
                continue;
            }
        };

        // Nativity, via the closed status vocabulary.
        let status = record.status.as_deref().unwrap_or("");
        let cf_native = is_native_status(status)?;
        if cf_native != taxon.is_native()
            && !exceptions.has(name, Source::Calflora, "non-native")
        {
            log.log_with(
                name,
                "nativity in Calflora is different than taxa.csv",
                &[Some(status), Some(taxon.status.as_str())],
            );
        }

        if record.active != Some(true) && !exceptions.has(name, Source::Calflora, "notactive") {
            log.log(name, "is not active in Calflora");
        }

        if record.xref_id.as_deref() != taxon.jepson_id()
            && !exceptions.has(name, Source::Calflora, "badjepsonid")
        {
            log.log_with(
                name,
                "Jepson ID in Calflora is different than taxa.csv",
                &[record.xref_id.as_deref(), taxon.jepson_id()],
            );
        }

        if record.id.as_deref() != taxon.calflora_id()
            && !exceptions.has(name, Source::Calflora, "badid")
        {
            log.log_with(
                name,
                "Calflora ID in Calflora is different than taxa.csv",
                &[record.id.as_deref(), taxon.calflora_id()],
            );
        }
    }

    verify_exceptions(catalog, exceptions, store, log)
}

// ============================================================================
// REVERSE VALIDATION
// ============================================================================

/// Every Calflora exception must still describe reality; one that no
/// longer does is stale and gets its own log entry so a curator can
/// remove it.
fn verify_exceptions(
    catalog: &Catalog,
    exceptions: &Exceptions,
    store: &RecordStore,
    log: &mut ErrorLog,
) -> Result<()> {
    let normalizer = normalizer();

    for (name, codes) in exceptions.for_source(Source::Calflora) {
        let taxon = match catalog.get(name) {
            Some(taxon) => taxon,
            None => {
                log.log(name, "has Calflora exceptions but is not in taxa.csv");
                continue;
            }
        };
        let record = normalizer.resolve(store, name);

        for code in codes.keys() {
            match code.as_str() {
                "notincalflora" => {
                    if record.is_some() {
                        log.log(name, "has notincalflora exception but is in Calflora");
                    }
                }
                "non-native" => {
                    let stale = match record {
                        Some(record) => {
                            let status = record.status.as_deref().unwrap_or("");
                            is_native_status(status)? == taxon.is_native()
                        }
                        None => true,
                    };
                    if stale {
                        log.log(name, "has non-native exception but nativity matches");
                    }
                }
                "notactive" => {
                    if record.map(|r| r.active) != Some(Some(false)) {
                        log.log(name, "has notactive exception but is active in Calflora");
                    }
                }
                "badjepsonid" => {
                    let stale = match record {
                        Some(record) => record.xref_id.as_deref() == taxon.jepson_id(),
                        None => true,
                    };
                    if stale {
                        log.log(name, "has badjepsonid exception but IDs match");
                    }
                }
                "badid" => {
                    let stale = match record {
                        Some(record) => record.id.as_deref() == taxon.calflora_id(),
                        None => true,
                    };
                    if stale {
                        log.log(name, "has badid exception but IDs match");
                    }
                }
                _ => bail!("{}: unrecognized Calflora exception \"{}\"", name, code),
            }
        }
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Taxon;
    use crate::exceptions::{CodeMap, SourceMap};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn active_row(name: &str, status: &str, calrecnum: &str, jepson_id: &str) -> Row {
        row(&[
            ("Taxon", name),
            ("Native Status", status),
            ("Active in Calflora?", "YES"),
            ("Calrecnum", calrecnum),
            ("TJMTID", jepson_id),
        ])
    }

    fn exceptions_with(name: &str, code: &str) -> Exceptions {
        let mut codes = CodeMap::new();
        codes.insert(code.to_string(), json!(true));
        let mut sources = SourceMap::new();
        sources.insert("calflora".to_string(), codes);
        let mut entries = BTreeMap::new();
        entries.insert(name.to_string(), sources);
        Exceptions::from_entries(entries).unwrap()
    }

    fn catalog_with(taxon: Taxon) -> Catalog {
        Catalog::from_taxa(vec![taxon]).unwrap()
    }

    #[test]
    fn test_missing_taxon_logged_once() {
        let catalog = catalog_with(Taxon::new("Carex serratodens", "N"));
        let store = RecordStore::new(DuplicatePolicy::Overwrite);
        let mut log = ErrorLog::new(false);

        analyze(&catalog, &Exceptions::new(), &store, &mut log).unwrap();

        assert_eq!(log.count_for("Carex serratodens"), 1);
        assert_eq!(log.entries()[0].message, "not found in Calflora");
    }

    #[test]
    fn test_notincalflora_exception_suppresses_missing() {
        let catalog = catalog_with(Taxon::new("Carex serratodens", "N"));
        let store = RecordStore::new(DuplicatePolicy::Overwrite);
        let exceptions = exceptions_with("Carex serratodens", "notincalflora");
        let mut log = ErrorLog::new(false);

        analyze(&catalog, &exceptions, &store, &mut log).unwrap();

        assert!(log.is_empty());
    }

    #[test]
    fn test_matching_record_logs_nothing() {
        let catalog = catalog_with(
            Taxon::new("Carex serratodens", "N")
                .with_calflora_id("8110")
                .with_jepson_id("17538"),
        );
        let active = vec![active_row("Carex serratodens", "native", "8110", "17538")];
        let mut log = ErrorLog::new(false);
        let store = build_store(&active, &[], &mut log).unwrap();

        analyze(&catalog, &Exceptions::new(), &store, &mut log).unwrap();

        assert!(log.is_empty());
    }

    #[test]
    fn test_nativity_mismatch_logged_with_both_values() {
        let catalog = catalog_with(Taxon::new("Avena barbata", "N").with_calflora_id("700"));
        let active = vec![active_row("Avena barbata", "naturalized", "700", "")];
        let mut log = ErrorLog::new(false);
        let store = build_store(&active, &[], &mut log).unwrap();

        analyze(&catalog, &Exceptions::new(), &store, &mut log).unwrap();

        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].details, vec!["naturalized", "N"]);
    }

    #[test]
    fn test_rare_counts_as_native() {
        let catalog = catalog_with(Taxon::new("Carex serratodens", "N").with_calflora_id("8110"));
        let active = vec![active_row("Carex serratodens", "rare", "8110", "")];
        let mut log = ErrorLog::new(false);
        let store = build_store(&active, &[], &mut log).unwrap();

        analyze(&catalog, &Exceptions::new(), &store, &mut log).unwrap();

        assert!(log.is_empty());
    }

    #[test]
    fn test_unmapped_native_status_is_fatal() {
        let active = vec![active_row("Avena barbata", "cryptogenic", "700", "")];
        let mut log = ErrorLog::new(false);

        assert!(build_store(&active, &[], &mut log).is_err());
    }

    #[test]
    fn test_infraspecific_fallback_match() {
        let catalog = catalog_with(Taxon::new("Juncus bufonius", "N").with_calflora_id("4001"));
        let active = vec![active_row("Juncus bufonius var. bufonius", "native", "4001", "")];
        let mut log = ErrorLog::new(false);
        let store = build_store(&active, &[], &mut log).unwrap();

        analyze(&catalog, &Exceptions::new(), &store, &mut log).unwrap();

        assert!(log.is_empty());
    }

    #[test]
    fn test_name_in_both_feeds_logged() {
        let active = vec![active_row("Avena barbata", "naturalized", "700", "")];
        let inactive = vec![row(&[
            ("Taxon", "Avena barbata"),
            ("Native Status", "naturalized"),
            ("Active in Calflora?", "NO"),
            ("Calrecnum", "701"),
        ])];
        let mut log = ErrorLog::new(false);
        let store = build_store(&active, &inactive, &mut log).unwrap();

        assert_eq!(log.len(), 1);
        assert_eq!(
            log.entries()[0].message,
            "is in both active and inactive Calflora files"
        );
        // Last wins.
        assert_eq!(
            store.lookup("Avena barbata").unwrap().id.as_deref(),
            Some("701")
        );
    }

    #[test]
    fn test_stale_notincalflora_exception() {
        let catalog = catalog_with(Taxon::new("Carex serratodens", "N").with_calflora_id("8110"));
        let active = vec![active_row("Carex serratodens", "native", "8110", "")];
        let exceptions = exceptions_with("Carex serratodens", "notincalflora");
        let mut log = ErrorLog::new(false);
        let store = build_store(&active, &[], &mut log).unwrap();

        analyze(&catalog, &exceptions, &store, &mut log).unwrap();

        assert_eq!(log.len(), 1);
        assert_eq!(
            log.entries()[0].message,
            "has notincalflora exception but is in Calflora"
        );
    }

    #[test]
    fn test_repeated_runs_produce_identical_logs() {
        let catalog = Catalog::from_taxa(vec![
            Taxon::new("Carex serratodens", "N").with_calflora_id("8110"),
            Taxon::new("Avena barbata", "N").with_calflora_id("700"),
            Taxon::new("Juncus bufonius", "N"),
        ])
        .unwrap();
        let active = vec![
            active_row("Carex serratodens", "native", "8110", ""),
            active_row("Avena barbata", "naturalized", "700", ""),
        ];
        let mut setup = ErrorLog::new(false);
        let store = build_store(&active, &[], &mut setup).unwrap();

        let mut first = ErrorLog::new(false);
        let mut second = ErrorLog::new(false);
        analyze(&catalog, &Exceptions::new(), &store, &mut first).unwrap();
        analyze(&catalog, &Exceptions::new(), &store, &mut second).unwrap();

        assert_eq!(first.entries(), second.entries());
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_exception_for_unknown_taxon_logged() {
        let catalog = catalog_with(Taxon::new("Carex serratodens", "N"));
        let exceptions = exceptions_with("Carex praegracilis", "notincalflora");
        let store = RecordStore::new(DuplicatePolicy::Overwrite);
        let mut log = ErrorLog::new(false);

        analyze(&catalog, &exceptions, &store, &mut log).unwrap();

        // One entry for the missing catalog taxon, one for the exception
        // that references a taxon we no longer track.
        assert_eq!(log.count_for("Carex serratodens"), 1);
        assert_eq!(log.count_for("Carex praegracilis"), 1);
        assert_eq!(
            log.entries()[1].message,
            "has Calflora exceptions but is not in taxa.csv"
        );
    }
}
