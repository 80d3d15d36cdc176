// 🐦 iNaturalist Reconciler - Citizen-science observation platform
// Compares taxon ids against the iNaturalist taxonomy export. Taxa
// missing from the export get one last-resort lookup each against the
// iNaturalist name-search API, issued strictly sequentially with a fixed
// delay between calls to respect the service's rate limits.

use crate::catalog::Catalog;
use crate::exceptions::Exceptions;
use crate::normalize::{is_genus_only, is_placeholder};
use crate::report::ErrorLog;
use crate::rows::{field, Row};
use crate::sources::Source;
use crate::store::{DuplicatePolicy, ExternalRecord, RecordStore};
use anyhow::{bail, Context, Result};
use std::thread;
use std::time::Duration;

/// Exception codes curators may register for iNaturalist
pub const EXCEPTION_CODES: &[&str] = &["notininat", "badid"];

// ============================================================================
// NAME SEARCH API
// ============================================================================

/// One candidate match from the remote name-search API
#[derive(Debug, Clone)]
pub struct NameSearchResult {
    /// The currently accepted name
    pub name: String,

    /// The term the query matched against (a synonym, usually)
    pub matched_term: String,

    /// Taxonomic rank as reported by the API
    pub rank: String,
}

/// Remote name search, behind a trait so tests can script responses.
/// Best-effort only: a failed or empty lookup is logged, never retried.
pub trait NameSearch {
    fn search(&self, query: &str) -> Result<Vec<NameSearchResult>>;
}

#[derive(serde::Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResponseResult>,
}

#[derive(serde::Deserialize)]
struct SearchResponseResult {
    name: String,
    #[serde(default)]
    matched_term: String,
    #[serde(default)]
    rank: String,
}

/// The real iNaturalist API client
pub struct InatApi {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl InatApi {
    pub fn new() -> Self {
        Self::with_base_url("https://api.inaturalist.org/v1")
    }

    pub fn with_base_url(base_url: &str) -> Self {
        InatApi {
            base_url: base_url.to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for InatApi {
    fn default() -> Self {
        Self::new()
    }
}

impl NameSearch for InatApi {
    fn search(&self, query: &str) -> Result<Vec<NameSearchResult>> {
        let url = format!("{}/taxa", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", query)])
            .send()
            .with_context(|| format!("iNat taxa search failed for \"{}\"", query))?
            .error_for_status()
            .context("iNat taxa search returned an error status")?;

        let body: SearchResponse = response
            .json()
            .context("Failed to parse iNat taxa search response")?;

        Ok(body
            .results
            .into_iter()
            .map(|r| NameSearchResult {
                name: r.name,
                matched_term: r.matched_term,
                rank: r.rank,
            })
            .collect())
    }
}

// ============================================================================
// STORE BUILD
// ============================================================================

/// Ingest the taxonomy export, keeping only vascular plants identified to
/// at least species level.
pub fn build_store(rows: &[Row]) -> RecordStore {
    let mut store = RecordStore::new(DuplicatePolicy::Overwrite);

    for row in rows {
        if field(row, "phylum") != Some("Tracheophyta") {
            continue;
        }
        if field(row, "specificEpithet").is_none() {
            continue;
        }
        let name = match field(row, "scientificName") {
            Some(name) => name,
            None => continue,
        };
        let mut record = ExternalRecord::new();
        if let Some(id) = field(row, "id") {
            record = record.with_id(id);
        }
        store.insert(name, record);
    }

    store
}

// ============================================================================
// RECONCILIATION
// ============================================================================

/// Forward pass, optional remote lookup for the misses, then reverse
/// validation. `search` is `None` in offline runs.
pub fn analyze(
    catalog: &Catalog,
    exceptions: &Exceptions,
    store: &RecordStore,
    log: &mut ErrorLog,
    search: Option<&dyn NameSearch>,
    throttle: Duration,
) -> Result<()> {
    let mut missing: Vec<(&str, &str)> = Vec::new();

    for taxon in catalog.taxa() {
        let name = taxon.name.as_str();
        if is_placeholder(name) || is_genus_only(name) {
            continue;
        }

        let lookup_name = taxon.inat_lookup_name();
        let record = match store.lookup(lookup_name) {
            Some(record) => record,
            None => {
                if !exceptions.has(name, Source::INaturalist, "notininat") {
                    log.log_with(name, "not found in iNaturalist taxonomy", &[Some(lookup_name)]);
                    missing.push((name, lookup_name));
                }
                continue;
            }
        };

        if record.id.as_deref() != taxon.inat_id()
            && !exceptions.has(name, Source::INaturalist, "badid")
        {
            log.log_with(
                name,
                "iNat ID in taxonomy file does not match ID in taxa.csv",
                &[record.id.as_deref(), taxon.inat_id()],
            );
        }
    }

    if let Some(search) = search {
        for (name, lookup_name) in &missing {
            lookup_missing(search, name, lookup_name, log);
            // Throttle queries to the iNat API.
            thread::sleep(throttle);
        }
    }

    verify_exceptions(catalog, exceptions, store, log)
}

// ============================================================================
// REMOTE LOOKUP
// ============================================================================

fn lookup_missing(search: &dyn NameSearch, name: &str, inat_name: &str, log: &mut ErrorLog) {
    let results = match search.search(inat_name) {
        Ok(results) => results,
        Err(err) => {
            let reason = err.to_string();
            log.log_with(name, "iNat lookup failed", &[Some(reason.as_str())]);
            return;
        }
    };

    let mut result = find_matching_result(&results, inat_name, log);
    if result.is_none() {
        let parts: Vec<&str> = inat_name.split(' ').collect();
        match parts.len() {
            2 => {
                // "Genus epithet" may be filed as "Genus epithet epithet".
                let variant = format!("{} {} {}", parts[0], parts[1], parts[1]);
                result = find_matching_result(&results, &variant, log);
            }
            3 => {
                // And the reverse.
                if parts[1] == parts[2] {
                    let variant = format!("{} {}", parts[0], parts[1]);
                    result = find_matching_result(&results, &variant, log);
                }
            }
            _ => {}
        }
    }

    match result {
        None => log.log(name, "iNat lookup found no results"),
        Some(result) => {
            let synonym = format!("{},{},INAT", synonym_name(result, log), name);
            log.log_with(name, "found iNat synonym", &[Some(synonym.as_str())]);
        }
    }
}

/// A single result is trusted as is; otherwise the matched term must
/// identify exactly one candidate.
fn find_matching_result<'a>(
    results: &'a [NameSearchResult],
    name: &str,
    log: &mut ErrorLog,
) -> Option<&'a NameSearchResult> {
    if results.len() == 1 {
        return Some(&results[0]);
    }
    let mut matched: Option<&NameSearchResult> = None;
    for result in results {
        if result.matched_term == name {
            if let Some(previous) = matched {
                log.log_with(
                    name,
                    "found more than one matched_term",
                    &[
                        Some(previous.matched_term.as_str()),
                        Some(result.matched_term.as_str()),
                    ],
                );
                return None;
            }
            matched = Some(result);
        }
    }
    matched
}

/// Render the accepted name in our spelling conventions. iNaturalist
/// reports trinomials without an infraspecific marker; the reported rank
/// says which marker to insert.
fn synonym_name(result: &NameSearchResult, log: &mut ErrorLog) -> String {
    let parts: Vec<&str> = result.name.split(' ').collect();
    if parts.len() != 3 {
        return result.name.clone();
    }
    match result.rank.as_str() {
        "subspecies" => format!("{} {} subsp. {}", parts[0], parts[1], parts[2]),
        "variety" => format!("{} {} var. {}", parts[0], parts[1], parts[2]),
        "hybrid" => result.name.clone(),
        _ => {
            log.log_with(&result.name, "unrecognized iNat rank", &[Some(result.rank.as_str())]);
            result.name.clone()
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
    for (name, codes) in exceptions.for_source(Source::INaturalist) {
        let taxon = match catalog.get(name) {
            Some(taxon) => taxon,
            None => {
                log.log(name, "has iNat exceptions but is not in taxa.csv");
                continue;
            }
        };
        let record = store.lookup(taxon.inat_lookup_name());

        for code in codes.keys() {
            match code.as_str() {
                "notininat" => {
                    if record.is_some() {
                        log.log(name, "has notininat exception but is in iNaturalist taxonomy");
                    }
                }
                "badid" => {
                    let stale = match record {
                        Some(record) => record.id.as_deref() == taxon.inat_id(),
                        None => true,
                    };
                    if stale {
                        log.log(name, "has badid exception but IDs match");
                    }
                }
                _ => bail!("{}: unrecognized iNat exception \"{}\"", name, code),
            }
        }
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
