// 🗃️ Source Record Store - Per-source canonical name → record map
// Built fresh each run from externally parsed rows and discarded at run
// end. Duplicate handling is source-specific: feeds that combine several
// files overwrite with last-wins, indexes that must be unambiguous flag
// and discard duplicate entries instead of picking one.

use std::collections::{BTreeMap, HashSet};

// ============================================================================
// EXTERNAL RECORD
// ============================================================================

/// One external source's published record for one canonical name.
/// A bag of optional fields; each source fills in the subset it publishes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalRecord {
    /// Source-assigned identifier
    pub id: Option<String>,

    /// Identifier the source publishes for a sister index (e.g. the
    /// Jepson id column in the Calflora feed)
    pub xref_id: Option<String>,

    /// Native/status code as published, in the source's own vocabulary
    pub status: Option<String>,

    /// Active/retired flag, where the source has one
    pub active: Option<bool>,

    /// Rarity rank-and-threat code
    pub rank: Option<String>,

    /// Conservation listing code
    pub listing: Option<String>,

    /// County/region codes the source reports the taxon from
    pub regions: Vec<String>,

    /// Synonym target: the accepted name this entry files under
    pub under: Option<String>,

    /// Free-text type/category as published
    pub category: Option<String>,
}

impl ExternalRecord {
    pub fn new() -> Self {
        ExternalRecord::default()
    }

    /// Builder pattern: source identifier
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Builder pattern: sister-index identifier
    pub fn with_xref_id(mut self, id: &str) -> Self {
        self.xref_id = Some(id.to_string());
        self
    }

    /// Builder pattern: status code
    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    /// Builder pattern: active flag
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    /// Builder pattern: rank-and-threat code
    pub fn with_rank(mut self, rank: &str) -> Self {
        self.rank = Some(rank.to_string());
        self
    }

    /// Builder pattern: conservation listing
    pub fn with_listing(mut self, listing: &str) -> Self {
        self.listing = Some(listing.to_string());
        self
    }

    /// Builder pattern: region list
    pub fn with_regions(mut self, regions: &[&str]) -> Self {
        self.regions = regions.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Builder pattern: synonym target
    pub fn with_under(mut self, under: &str) -> Self {
        self.under = Some(under.to_string());
        self
    }

    /// Builder pattern: type/category text
    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }
}

// ============================================================================
// DUPLICATE POLICY
// ============================================================================

/// What to do when a second record arrives under a name already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Last wins. Used when several feeds are merged to maximize coverage.
    Overwrite,

    /// Both entries are dropped and the name is poisoned for the rest of
    /// the run. Used when picking one of the duplicates would be a guess.
    Discard,
}

/// Outcome of a single insert, so the caller can decide what to log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Name was new
    Inserted,

    /// Overwrite policy: an earlier record was replaced
    Replaced,

    /// Discard policy: first duplicate seen; both entries dropped.
    /// Callers log exactly one "multiple entries" line on this outcome.
    Ambiguous,

    /// Discard policy: the name was already poisoned; nothing to log
    Ignored,
}

// ============================================================================
// RECORD STORE
// ============================================================================

/// Canonical name → ExternalRecord map for one source, one run.
/// Backed by a BTreeMap so iteration order is deterministic, which keeps
/// the run log identical across runs on unchanged inputs.
pub struct RecordStore {
    policy: DuplicatePolicy,
    records: BTreeMap<String, ExternalRecord>,
    ambiguous: HashSet<String>,
}

impl RecordStore {
    pub fn new(policy: DuplicatePolicy) -> Self {
        RecordStore {
            policy,
            records: BTreeMap::new(),
            ambiguous: HashSet::new(),
        }
    }

    pub fn insert(&mut self, name: &str, record: ExternalRecord) -> InsertOutcome {
        if self.ambiguous.contains(name) {
            return InsertOutcome::Ignored;
        }
        match self.policy {
            DuplicatePolicy::Overwrite => {
                if self.records.insert(name.to_string(), record).is_some() {
                    InsertOutcome::Replaced
                } else {
                    InsertOutcome::Inserted
                }
            }
            DuplicatePolicy::Discard => {
                if self.records.remove(name).is_some() {
                    self.ambiguous.insert(name.to_string());
                    InsertOutcome::Ambiguous
                } else {
                    self.records.insert(name.to_string(), record);
                    InsertOutcome::Inserted
                }
            }
        }
    }

    /// Look up a record by canonical name. Ambiguous names never resolve.
    pub fn lookup(&self, name: &str) -> Option<&ExternalRecord> {
        self.records.get(name)
    }

    /// Iterate records in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExternalRecord)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
