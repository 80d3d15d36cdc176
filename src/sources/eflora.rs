// 📖 Jepson eFlora Reconciler - Botanical monographic index
// Rows come from the eFlora alphabetical index pages (parsed upstream).
// Every entry carries a type string from a closed vocabulary; synonym
// entries file under an accepted name, and nativity is derived from the
// type of the entry (or of its synonym target). Duplicate names are
// ambiguous and excluded from comparison rather than guessed at.

use crate::catalog::Catalog;
use crate::exceptions::Exceptions;
use crate::normalize::{is_genus_only, is_placeholder, Normalizer};
use crate::report::ErrorLog;
use crate::rows::{field, Row};
use crate::sources::Source;
use crate::store::{DuplicatePolicy, ExternalRecord, InsertOutcome, RecordStore};
use anyhow::{bail, Result};

/// Exception codes curators may register for Jepson eFlora
pub const EXCEPTION_CODES: &[&str] = &["notineflora", "allowsynonym", "badid", "badstatus"];

// ============================================================================
// TYPE VOCABULARY
// ============================================================================

const TYPE_NATIVE: &str = "Native";
const TYPE_NATIVITY_UNCERTAIN: &str = "Native or naturalized";
const TYPE_SYNONYM: &str = "Synonym";
const TYPE_WEED: &str = "* weed*";

/// Entry types that are notes about a name rather than an active taxon or
/// usable synonym; they never enter the store.
const NOTE_TYPES: &[&str] = &[
    "Illegitimate name",
    "Invalid name",
    "Noted name",
    "Superfluous name",
    "Misapplied name",
    "Misapplied name, in part",
    "Unabridged misapplied name",
    "Synonym ined.",
    "Orthographic variant",
    "Synonym, in part",
    "Unabridged synonym, in part",
    "Mentioned in a note",
];

/// The complete published vocabulary. A type outside this list means the
/// index format changed and the run must stop.
const VALID_TYPES: &[&str] = &[
    "Extirpated alien",
    "Spontaneous hybrid",
    "Illegitimate name",
    "Invalid name",
    "Noted name",
    "Superfluous name",
    "Mentioned in a note",
    "Misapplied name",
    "Misapplied name, in part",
    "Unabridged misapplied name",
    TYPE_NATIVE,
    TYPE_NATIVITY_UNCERTAIN,
    "Naturalized",
    "Possibly in ca",
    TYPE_SYNONYM,
    "Synonym ined.",
    "Orthographic variant",
    "Synonym, in part",
    "Unabridged synonym, in part",
    "Waif",
    "Extirpated waif",
    "Historical waif",
    TYPE_WEED,
];

fn is_synonym(record: &ExternalRecord) -> bool {
    record.category.as_deref() == Some(TYPE_SYNONYM)
}

/// Nativity code for an entry: N, U or X. Synonyms take their target's
/// status; an unresolvable target yields no code.
fn status_code(store: &RecordStore, record: &ExternalRecord) -> Option<&'static str> {
    let mut current = record;
    let mut hops = 0;
    while is_synonym(current) {
        current = store.lookup(current.under.as_deref()?)?;
        hops += 1;
        if hops > 8 {
            // Synonym chains are short; a longer walk means bad data.
            return None;
        }
    }
    match current.category.as_deref() {
        Some(TYPE_NATIVE) => Some("N"),
        Some(TYPE_NATIVITY_UNCERTAIN) => Some("U"),
        _ => Some("X"),
    }
}

fn normalizer() -> Normalizer {
    // Hybrids are formatted differently in the index.
    Normalizer::new().with_substitution("×", "X ")
}

// ============================================================================
// STORE BUILD
// ============================================================================

/// Ingest externally parsed index rows. Only names we track (directly or
/// as a synonym target) are kept. When `log_notes` is set, note-type
/// entries about tracked names are logged for investigation.
pub fn build_store(
    rows: &[Row],
    catalog: &Catalog,
    log_notes: bool,
    log: &mut ErrorLog,
) -> Result<RecordStore> {
    let mut store = RecordStore::new(DuplicatePolicy::Discard);

    for row in rows {
        let name = match field(row, "name") {
            Some(name) => name,
            None => continue,
        };
        if is_genus_only(name) {
            continue;
        }
        // Some entries lack a type; if we track the name, errors will
        // show elsewhere.
        let mut entry_type = match field(row, "type") {
            Some(entry_type) => entry_type,
            None => continue,
        };
        if entry_type.contains(" weed") {
            entry_type = TYPE_WEED;
        }
        if !VALID_TYPES.contains(&entry_type) {
            bail!("unrecognized eFlora type for {}: {}", name, entry_type);
        }

        let under = field(row, "under");
        let tracks_under = under.map(|u| catalog.contains(u)).unwrap_or(false);
        if !catalog.contains(name) && !tracks_under {
            continue;
        }

        if NOTE_TYPES.contains(&entry_type) {
            if log_notes {
                log_note(catalog, name, entry_type, under, log);
            }
            continue;
        }

        let mut record = ExternalRecord::new().with_category(entry_type);
        if let Some(id) = field(row, "id") {
            record = record.with_id(id);
        }
        if let Some(under) = under {
            record = record.with_under(under);
        }
        if store.insert(name, record) == InsertOutcome::Ambiguous {
            log.log(name, "has multiple entries in eFlora");
        }
    }

    Ok(store)
}

fn log_note(catalog: &Catalog, name: &str, entry_type: &str, under: Option<&str>, log: &mut ErrorLog) {
    let note = format!("{} for", entry_type);
    if catalog.contains(name) {
        log.log_with(name, "has eFlora note (as source)", &[Some(note.as_str()), under]);
    }
    if let Some(under) = under {
        if catalog.contains(under) {
            log.log_with(
                under,
                "has eFlora note (as target)",
                &[Some(note.as_str()), Some(name)],
            );
        }
    }
}

// ============================================================================
// RECONCILIATION
// ============================================================================

/// Forward pass, the two synonym sweeps, then reverse validation.
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
                if !exceptions.has(name, Source::JepsonEflora, "notineflora") {
                    log.log(name, "not found in eFlora index");
                }
                continue;
            }
        };

        if taxon.jepson_id() != record.id.as_deref()
            && !exceptions.has(name, Source::JepsonEflora, "badid")
        {
            log.log_with(
                name,
                "Jepson ID does not match ID from eFlora index",
                &[taxon.jepson_id(), record.id.as_deref()],
            );
        }

        if is_synonym(record) && !exceptions.has(name, Source::JepsonEflora, "allowsynonym") {
            log.log_with(name, "is synonym for", &[record.under.as_deref()]);
        }

        if let Some(ef_status) = status_code(store, record) {
            if ef_status != taxon.status
                && !(taxon.status == "NC" && ef_status == "N")
                && !exceptions.has(name, Source::JepsonEflora, "badstatus")
            {
                log.log_with(
                    name,
                    "eFlora index has different nativity status than taxa.csv",
                    &[Some(ef_status), Some(taxon.status.as_str())],
                );
            }
        }
    }

    check_synonyms(catalog, store, log);
    verify_exceptions(catalog, exceptions, store, log)
}

// ============================================================================
// SYNONYM SWEEPS
// ============================================================================

/// Cross-check the synonym lists in both directions: every eFlora synonym
/// of a tracked target should be in the catalog's synonym list, and every
/// catalog synonym should be a synonym in eFlora.
fn check_synonyms(catalog: &Catalog, store: &RecordStore, log: &mut ErrorLog) {
    for (name, record) in store.iter() {
        if !is_synonym(record) {
            continue;
        }
        let target = match record.under.as_deref() {
            Some(target) => target,
            None => continue,
        };
        let taxon = match catalog.get(target) {
            Some(taxon) => taxon,
            // We're not tracking the target.
            None => continue,
        };
        if taxon.synonyms.iter().any(|s| s == name) {
            continue;
        }
        let detail = format!("{},{}", name, target);
        log.log_with(target, "does not have synonym", &[Some(detail.as_str())]);
    }

    for taxon in catalog.taxa() {
        for synonym in &taxon.synonyms {
            let is_eflora_synonym = store
                .lookup(synonym)
                .map(is_synonym)
                .unwrap_or(false);
            if !is_eflora_synonym && *synonym != taxon.inat_name {
                // iNat alternates live in the synonym list too; skip them.
                log.log(synonym, "is in synonyms.csv but is not a synonym in eFlora");
            }
        }
    }
}

// ============================================================================
// REVERSE VALIDATION
// ============================================================================

fn verify_exceptions(
    catalog: &Catalog,
    exceptions: &Exceptions,
    store: &RecordStore,
    log: &mut ErrorLog,
) -> Result<()> {
    let normalizer = normalizer();

    for (name, codes) in exceptions.for_source(Source::JepsonEflora) {
        let taxon = match catalog.get(name) {
            Some(taxon) => taxon,
            None => {
                log.log(name, "has Jepson exceptions but is not in taxa.csv");
                continue;
            }
        };
        let record = normalizer.resolve(store, name);

        for code in codes.keys() {
            match code.as_str() {
                "notineflora" => {
                    if record.is_some() {
                        log.log(name, "has notineflora exception but is in eFlora");
                    }
                }
                "allowsynonym" => {
                    if !record.map(is_synonym).unwrap_or(false) {
                        log.log(name, "has allowsynonym exception but is not a synonym");
                    }
                }
                "badid" => {
                    let stale = match record {
                        Some(record) => record.id.as_deref() == taxon.jepson_id(),
                        None => true,
                    };
                    if stale {
                        log.log(name, "has badid exception but IDs match");
                    }
                }
                "badstatus" => {
                    let still_differs = record
                        .and_then(|record| status_code(store, record))
                        .map(|ef_status| {
                            ef_status != taxon.status
                                && !(taxon.status == "NC" && ef_status == "N")
                        })
                        .unwrap_or(false);
                    if !still_differs {
                        log.log(name, "has badstatus exception but nativity matches");
                    }
                }
                _ => bail!("{}: unrecognized Jepson exception \"{}\"", name, code),
            }
        }
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
