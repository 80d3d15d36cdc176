// 🌺 Rare Plant Inventory Reconciler - Rare-plant registry
// The registry is geography-scoped: a record is expected in the catalog
// only when its county list touches the configured local counties. The
// forward pass is record-driven (every RPI row is checked against the
// catalog), followed by a completeness sweep over catalog taxa carrying
// RPI attributes and the reverse validation of the exception ledger.

use crate::catalog::Catalog;
use crate::config::Config;
use crate::exceptions::Exceptions;
use crate::normalize::Normalizer;
use crate::report::ErrorLog;
use crate::rows::{field, Row};
use crate::sources::Source;
use crate::store::{DuplicatePolicy, ExternalRecord, InsertOutcome, RecordStore};
use anyhow::{bail, Result};
use std::collections::HashMap;

/// Exception codes curators may register for the Rare Plant Inventory
pub const EXCEPTION_CODES: &[&str] = &[
    "translation",
    "notingeo",
    "outsidegeo",
    "extirpated",
    "non-native",
    "badid",
    "badcesa",
];

/// Codes describing RPI records intentionally absent from the catalog;
/// the reverse pass does not require a catalog taxon for these.
pub const OUTSIDE_CATALOG_CODES: &[&str] = &["translation", "notingeo", "extirpated"];

/// Ranks meaning "presumed extinct or extirpated"
const EXTIRPATED_RANKS: &[&str] = &["1A", "2A"];

fn normalizer() -> Normalizer {
    // RPI spells infraspecific names with "ssp.".
    Normalizer::new().with_substitution(" ssp. ", " subsp. ")
}

// ============================================================================
// STORE BUILD
// ============================================================================

/// Ingest the inventory export, keyed by the canonicalized RPI name.
pub fn build_store(rows: &[Row], log: &mut ErrorLog) -> RecordStore {
    let normalizer = normalizer();
    let mut store = RecordStore::new(DuplicatePolicy::Discard);

    for row in rows {
        let name = match field(row, "ScientificName") {
            Some(name) => normalizer.canonical(name),
            None => continue,
        };

        let mut record = ExternalRecord::new();
        if let Some(rank) = field(row, "CRPR") {
            record = record.with_rank(rank);
        }
        // "None" is the export's spelling of "not listed".
        if let Some(cesa) = field(row, "CESA") {
            if cesa != "None" {
                record = record.with_listing(cesa);
            }
        }
        if let Some(id) = field(row, "ID") {
            record = record.with_id(id);
        }
        if let Some(counties) = field(row, "Counties") {
            record.regions = counties
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
        }

        if store.insert(&name, record) == InsertOutcome::Ambiguous {
            log.log(&name, "has multiple entries in RPI");
        }
    }

    store
}

// ============================================================================
// RECONCILIATION
// ============================================================================

/// Record-driven forward pass, completeness sweep, reverse validation.
pub fn analyze(
    catalog: &Catalog,
    config: &Config,
    exceptions: &Exceptions,
    store: &RecordStore,
    log: &mut ErrorLog,
) -> Result<()> {
    // translation exceptions map RPI-side names to catalog names; the
    // sweep and the reverse pass need the mapping in both directions.
    let mut to_catalog: HashMap<&str, &str> = HashMap::new();
    let mut to_rpi: HashMap<&str, &str> = HashMap::new();
    for (rpi_name, codes) in exceptions.for_source(Source::Rpi) {
        if let Some(value) = codes.get("translation").and_then(|v| v.as_str()) {
            to_catalog.insert(rpi_name, value);
            to_rpi.insert(value, rpi_name);
        }
    }

    for (rpi_name, record) in store.iter() {
        let name = *to_catalog.get(rpi_name).unwrap_or(&rpi_name);
        let expected_locally = config.is_local(&record.regions);

        let taxon = match catalog.get(name) {
            Some(taxon) => taxon,
            None => {
                if let Some(listing) = record.listing.as_deref() {
                    log.log_with(
                        name,
                        "is CESA listed but not found in taxa.csv",
                        &[Some(listing)],
                    );
                }
                if !expected_locally {
                    // Absence of an out-of-area record is consistent.
                    continue;
                }
                if exceptions.has(name, Source::Rpi, "notingeo") {
                    continue;
                }
                let extirpated = record
                    .rank
                    .as_deref()
                    .map(|rank| EXTIRPATED_RANKS.contains(&rank))
                    .unwrap_or(false);
                if extirpated && exceptions.has(name, Source::Rpi, "extirpated") {
                    continue;
                }
                log.log_with(name, "in RPI but not found in taxa.csv", &[record.rank.as_deref()]);
                continue;
            }
        };

        if !expected_locally && !exceptions.has(name, Source::Rpi, "outsidegeo") {
            let counties = record.regions.join(", ");
            log.log_with(
                name,
                "is in taxa.csv but RPI does not list it for any local county",
                &[Some(counties.as_str())],
            );
        }

        if record.rank.as_deref() != taxon.rank_threat()
            && !exceptions.has(name, Source::Rpi, "non-native")
        {
            log.log_with(
                name,
                "rank in taxa.csv is different than rank in RPI",
                &[taxon.rank_threat(), record.rank.as_deref()],
            );
        }

        if record.listing.as_deref() != taxon.cesa()
            && !exceptions.has(name, Source::Rpi, "badcesa")
        {
            log.log_with(
                name,
                "CESA status in taxa.csv is different than status in RPI",
                &[taxon.cesa(), record.listing.as_deref()],
            );
        }

        if record.id.as_deref() != taxon.rpi_id() && !exceptions.has(name, Source::Rpi, "badid") {
            log.log_with(
                name,
                "RPI ID in RPI is different than taxa.csv",
                &[record.id.as_deref(), taxon.rpi_id()],
            );
        }
    }

    check_completeness(catalog, store, &to_rpi, log);
    verify_exceptions(catalog, config, exceptions, store, &to_rpi, log)
}

// ============================================================================
// COMPLETENESS SWEEP
// ============================================================================

/// Every catalog taxon carrying an RPI rank must still have an RPI
/// record; a rank with no record behind it is residual data.
fn check_completeness(
    catalog: &Catalog,
    store: &RecordStore,
    to_rpi: &HashMap<&str, &str>,
    log: &mut ErrorLog,
) {
    let normalizer = normalizer();

    for taxon in catalog.taxa() {
        if taxon.rank_threat().is_none() {
            continue;
        }
        let name = taxon.name.as_str();
        let rpi_name = to_rpi.get(name).copied().unwrap_or(name);
        if store.lookup(&normalizer.canonical(rpi_name)).is_none() {
            log.log_with(name, "has RPI rank but not found in RPI", &[taxon.rank_threat()]);
        }
    }
}

// ============================================================================
// REVERSE VALIDATION
// ============================================================================

fn verify_exceptions(
    catalog: &Catalog,
    config: &Config,
    exceptions: &Exceptions,
    store: &RecordStore,
    to_rpi: &HashMap<&str, &str>,
    log: &mut ErrorLog,
) -> Result<()> {
    let normalizer = normalizer();

    for (name, codes) in exceptions.for_source(Source::Rpi) {
        let taxon = catalog.get(name);
        if taxon.is_none()
            && codes
                .keys()
                .any(|code| !OUTSIDE_CATALOG_CODES.contains(&code.as_str()))
        {
            log.log(name, "has RPI exceptions but is not in taxa.csv");
        }

        let rpi_name = to_rpi.get(name).copied().unwrap_or(name);
        let record = store.lookup(&normalizer.canonical(rpi_name));

        for (code, value) in codes {
            match code.as_str() {
                "translation" => {
                    // Here the exception key is the RPI-side name.
                    let target = match value.as_str() {
                        Some(target) => target,
                        None => bail!("{}: translation exception has no target name", name),
                    };
                    if store.lookup(&normalizer.canonical(name)).is_none() {
                        log.log(name, "has translation exception but is not in RPI");
                    } else if !catalog.contains(target) {
                        log.log_with(
                            name,
                            "has translation exception but target is not in taxa.csv",
                            &[Some(target)],
                        );
                    }
                }
                "notingeo" => {
                    if taxon.is_some() {
                        log.log(name, "has notingeo exception but is in taxa.csv");
                    } else if record.is_none() {
                        log.log(name, "has notingeo exception but is not in RPI");
                    }
                }
                "extirpated" => {
                    if taxon.is_some() {
                        log.log(name, "has extirpated exception but is in taxa.csv");
                    } else {
                        match record {
                            None => log.log(name, "has extirpated exception but is not in RPI"),
                            Some(record) => {
                                let rank = record.rank.as_deref().unwrap_or("");
                                if !EXTIRPATED_RANKS.contains(&rank) {
                                    log.log_with(
                                        name,
                                        "has extirpated exception but rank is not 1A or 2A",
                                        &[record.rank.as_deref()],
                                    );
                                }
                            }
                        }
                    }
                }
                "outsidegeo" => {
                    if let Some(_taxon) = taxon {
                        match record {
                            None => log.log(name, "has outsidegeo exception but is not in RPI"),
                            Some(record) => {
                                if config.is_local(&record.regions) {
                                    log.log(
                                        name,
                                        "has outsidegeo exception but RPI lists it for a local county",
                                    );
                                }
                            }
                        }
                    }
                }
                "non-native" => {
                    if let Some(taxon) = taxon {
                        if taxon.is_native() {
                            log.log(name, "has non-native exception but is native in taxa.csv");
                        }
                    }
                }
                "badid" => {
                    if let Some(taxon) = taxon {
                        match record {
                            None => log.log(name, "has badid exception but is not in RPI"),
                            Some(record) => {
                                if record.id.as_deref() == taxon.rpi_id() {
                                    log.log(name, "has badid exception but IDs match");
                                }
                            }
                        }
                    }
                }
                "badcesa" => {
                    if let Some(taxon) = taxon {
                        match record {
                            None => log.log(name, "has badcesa exception but is not in RPI"),
                            Some(record) => {
                                if record.listing.as_deref() == taxon.cesa() {
                                    log.log(name, "has badcesa exception but CESA statuses match");
                                }
                            }
                        }
                    }
                }
                _ => bail!("{}: unrecognized RPI exception \"{}\"", name, code),
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
    use serde_json::{json, Value};
    use std::collections::BTreeMap;

    fn inventory_row(name: &str, rank: &str, cesa: &str, counties: &str, id: &str) -> Row {
        [
            ("ScientificName", name),
            ("CRPR", rank),
            ("CESA", cesa),
            ("Counties", counties),
            ("ID", id),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn exceptions_with(name: &str, code: &str, value: Value) -> Exceptions {
        let mut codes = CodeMap::new();
        codes.insert(code.to_string(), value);
        let mut sources = SourceMap::new();
        sources.insert("rpi".to_string(), codes);
        let mut entries = BTreeMap::new();
        entries.insert(name.to_string(), sources);
        Exceptions::from_entries(entries).unwrap()
    }

    fn local_config(counties: &[&str]) -> Config {
        Config {
            local_counties: counties.iter().map(|c| c.to_string()).collect(),
            ..Config::default()
        }
    }

    fn rare_taxon() -> Taxon {
        Taxon::new("Carex serratodens", "N")
            .with_rank_threat("2B.2")
            .with_rpi_id("1042")
    }

    #[test]
    fn test_matching_record_logs_nothing() {
        let catalog = Catalog::from_taxa(vec![rare_taxon()]).unwrap();
        let rows = vec![inventory_row("Carex serratodens", "2B.2", "None", "ALA, SCL", "1042")];
        let mut log = ErrorLog::new(false);
        let store = build_store(&rows, &mut log);

        analyze(&catalog, &local_config(&["SCL"]), &Exceptions::new(), &store, &mut log).unwrap();

        assert!(log.is_empty());
    }

    #[test]
    fn test_local_record_missing_from_catalog_logged() {
        let catalog = Catalog::from_taxa(vec![]).unwrap();
        let rows = vec![inventory_row("Carex serratodens", "2B.2", "None", "ALA, CCA", "1042")];
        let mut log = ErrorLog::new(false);
        let store = build_store(&rows, &mut log);

        analyze(&catalog, &local_config(&["CCA"]), &Exceptions::new(), &store, &mut log).unwrap();

        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].message, "in RPI but not found in taxa.csv");
        assert_eq!(log.entries()[0].details, vec!["2B.2"]);
    }

    #[test]
    fn test_out_of_area_record_missing_from_catalog_is_consistent() {
        let catalog = Catalog::from_taxa(vec![]).unwrap();
        let rows = vec![inventory_row("Carex serratodens", "2B.2", "None", "ALA, CCA", "1042")];
        let mut log = ErrorLog::new(false);
        let store = build_store(&rows, &mut log);

        analyze(&catalog, &local_config(&["SCL"]), &Exceptions::new(), &store, &mut log).unwrap();

        assert!(log.is_empty());
    }

    #[test]
    fn test_notingeo_exception_suppresses_missing_taxon() {
        let catalog = Catalog::from_taxa(vec![]).unwrap();
        let rows = vec![inventory_row("Carex serratodens", "2B.2", "None", "ALA, CCA", "1042")];
        let exceptions = exceptions_with("Carex serratodens", "notingeo", json!(true));
        let mut log = ErrorLog::new(false);
        let store = build_store(&rows, &mut log);

        analyze(&catalog, &local_config(&["CCA"]), &exceptions, &store, &mut log).unwrap();

        assert!(log.is_empty());
    }

    #[test]
    fn test_no_county_filter_expects_every_record() {
        let catalog = Catalog::from_taxa(vec![]).unwrap();
        let rows = vec![inventory_row("Carex serratodens", "2B.2", "None", "ALA", "1042")];
        let mut log = ErrorLog::new(false);
        let store = build_store(&rows, &mut log);

        analyze(&catalog, &Config::default(), &Exceptions::new(), &store, &mut log).unwrap();

        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].message, "in RPI but not found in taxa.csv");
    }

    #[test]
    fn test_cesa_listed_but_missing_always_logged() {
        let catalog = Catalog::from_taxa(vec![]).unwrap();
        let rows = vec![inventory_row("Carex serratodens", "1B.1", "Endangered", "ALA", "1042")];
        let exceptions = exceptions_with("Carex serratodens", "notingeo", json!(true));
        let mut log = ErrorLog::new(false);
        let store = build_store(&rows, &mut log);

        analyze(&catalog, &local_config(&["ALA"]), &exceptions, &store, &mut log).unwrap();

        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].message, "is CESA listed but not found in taxa.csv");
    }

    #[test]
    fn test_extirpated_exception_needs_extirpated_rank() {
        let catalog = Catalog::from_taxa(vec![]).unwrap();
        let exceptions = exceptions_with("Carex serratodens", "extirpated", json!(true));

        // Rank 1A: suppressed.
        let rows = vec![inventory_row("Carex serratodens", "1A", "None", "ALA", "1042")];
        let mut log = ErrorLog::new(false);
        let store = build_store(&rows, &mut log);
        analyze(&catalog, &local_config(&["ALA"]), &exceptions, &store, &mut log).unwrap();
        assert!(log.is_empty());

        // Rank 1B.1: not an extirpated rank, so the missing-taxon entry
        // fires and the exception itself is stale.
        let rows = vec![inventory_row("Carex serratodens", "1B.1", "None", "ALA", "1042")];
        let mut log = ErrorLog::new(false);
        let store = build_store(&rows, &mut log);
        analyze(&catalog, &local_config(&["ALA"]), &exceptions, &store, &mut log).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].message, "in RPI but not found in taxa.csv");
        assert_eq!(
            log.entries()[1].message,
            "has extirpated exception but rank is not 1A or 2A"
        );
    }

    #[test]
    fn test_rank_mismatch_logged_with_both_values() {
        let catalog = Catalog::from_taxa(vec![rare_taxon()]).unwrap();
        let rows = vec![inventory_row("Carex serratodens", "4.2", "None", "SCL", "1042")];
        let mut log = ErrorLog::new(false);
        let store = build_store(&rows, &mut log);

        analyze(&catalog, &local_config(&["SCL"]), &Exceptions::new(), &store, &mut log).unwrap();

        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].message, "rank in taxa.csv is different than rank in RPI");
        assert_eq!(log.entries()[0].details, vec!["2B.2", "4.2"]);
    }

    #[test]
    fn test_non_native_exception_exempts_rank_mismatch_only() {
        let taxon = Taxon::new("Avena barbata", "X")
            .with_rank_threat("2B.2")
            .with_rpi_id("7")
            .with_cesa("Threatened");
        let catalog = Catalog::from_taxa(vec![taxon]).unwrap();
        let rows = vec![inventory_row("Avena barbata", "4.2", "Endangered", "SCL", "7")];
        let exceptions = exceptions_with("Avena barbata", "non-native", json!(true));
        let mut log = ErrorLog::new(false);
        let store = build_store(&rows, &mut log);

        analyze(&catalog, &local_config(&["SCL"]), &exceptions, &store, &mut log).unwrap();

        // Rank mismatch suppressed; CESA mismatch still reported.
        assert_eq!(log.len(), 1);
        assert_eq!(
            log.entries()[0].message,
            "CESA status in taxa.csv is different than status in RPI"
        );
        assert_eq!(log.entries()[0].details, vec!["Threatened", "Endangered"]);
    }

    #[test]
    fn test_none_cesa_reads_as_unset() {
        let catalog = Catalog::from_taxa(vec![rare_taxon()]).unwrap();
        let rows = vec![inventory_row("Carex serratodens", "2B.2", "None", "SCL", "1042")];
        let mut log = ErrorLog::new(false);
        let store = build_store(&rows, &mut log);

        analyze(&catalog, &local_config(&["SCL"]), &Exceptions::new(), &store, &mut log).unwrap();

        assert!(log.is_empty());
    }

    #[test]
    fn test_ssp_spelling_canonicalized_at_ingest() {
        let taxon = Taxon::new("Arctostaphylos glauca subsp. puberula", "N")
            .with_rank_threat("1B.2")
            .with_rpi_id("88");
        let catalog = Catalog::from_taxa(vec![taxon]).unwrap();
        let rows = vec![inventory_row(
            "Arctostaphylos glauca ssp. puberula",
            "1B.2",
            "None",
            "SCL",
            "88",
        )];
        let mut log = ErrorLog::new(false);
        let store = build_store(&rows, &mut log);

        analyze(&catalog, &local_config(&["SCL"]), &Exceptions::new(), &store, &mut log).unwrap();

        assert!(log.is_empty());
    }

    #[test]
    fn test_translation_exception_maps_rpi_name() {
        let taxon = Taxon::new("Dichelostemma capitatum", "N")
            .with_rank_threat("4.2")
            .with_rpi_id("55");
        let catalog = Catalog::from_taxa(vec![taxon]).unwrap();
        let rows = vec![inventory_row("Dipterostemon capitatus", "4.2", "None", "SCL", "55")];
        let exceptions = exceptions_with(
            "Dipterostemon capitatus",
            "translation",
            json!("Dichelostemma capitatum"),
        );
        let mut log = ErrorLog::new(false);
        let store = build_store(&rows, &mut log);

        analyze(&catalog, &local_config(&["SCL"]), &exceptions, &store, &mut log).unwrap();

        assert!(log.is_empty());
    }

    #[test]
    fn test_out_of_area_record_for_catalog_taxon_logged() {
        let catalog = Catalog::from_taxa(vec![rare_taxon()]).unwrap();
        let rows = vec![inventory_row("Carex serratodens", "2B.2", "None", "ALA, CCA", "1042")];
        let mut log = ErrorLog::new(false);
        let store = build_store(&rows, &mut log);

        analyze(&catalog, &local_config(&["SCL"]), &Exceptions::new(), &store, &mut log).unwrap();

        assert_eq!(log.len(), 1);
        assert_eq!(
            log.entries()[0].message,
            "is in taxa.csv but RPI does not list it for any local county"
        );
        assert_eq!(log.entries()[0].details, vec!["ALA, CCA"]);
    }

    #[test]
    fn test_completeness_sweep_flags_residual_rank() {
        let catalog = Catalog::from_taxa(vec![rare_taxon()]).unwrap();
        let store = build_store(&[], &mut ErrorLog::new(false));
        let mut log = ErrorLog::new(false);

        analyze(&catalog, &local_config(&["SCL"]), &Exceptions::new(), &store, &mut log).unwrap();

        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].message, "has RPI rank but not found in RPI");
        assert_eq!(log.entries()[0].details, vec!["2B.2"]);
    }

    #[test]
    fn test_duplicate_rows_discarded_with_one_log_line() {
        let rows = vec![
            inventory_row("Carex serratodens", "2B.2", "None", "SCL", "1042"),
            inventory_row("Carex serratodens", "4.2", "None", "SCL", "1042"),
        ];
        let mut log = ErrorLog::new(false);
        let store = build_store(&rows, &mut log);

        assert!(store.is_empty());
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].message, "has multiple entries in RPI");
    }

    #[test]
    fn test_stale_notingeo_when_taxon_now_in_catalog() {
        let catalog = Catalog::from_taxa(vec![rare_taxon()]).unwrap();
        let rows = vec![inventory_row("Carex serratodens", "2B.2", "None", "SCL", "1042")];
        let exceptions = exceptions_with("Carex serratodens", "notingeo", json!(true));
        let mut log = ErrorLog::new(false);
        let store = build_store(&rows, &mut log);

        analyze(&catalog, &local_config(&["SCL"]), &exceptions, &store, &mut log).unwrap();

        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].message, "has notingeo exception but is in taxa.csv");
    }
}
