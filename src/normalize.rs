// 🔤 Name Normalizer - Canonical name candidates per source
// Each external source has its own spelling conventions (ssp. vs subsp.,
// hybrid markers, infraspecific type listed as a repeated epithet). The
// normalizer turns a catalog name into the ordered list of candidate
// strings to probe against that source's record store.

use crate::store::{ExternalRecord, RecordStore};

// ============================================================================
// NAME PREDICATES
// ============================================================================

/// Placeholder entries ("Carex unknown") are provisional and excluded from
/// all reconciliation.
pub fn is_placeholder(name: &str) -> bool {
    name.contains(" unknown")
}

/// Genus-only entries are never valid taxa; callers skip them before
/// probing a store.
pub fn is_genus_only(name: &str) -> bool {
    !name.contains(' ')
}

// ============================================================================
// NORMALIZER
// ============================================================================

/// Candidate-name generator for one source.
///
/// Candidates are tried in order and the first store hit wins; there is no
/// scoring. The rule list is:
/// 1. the name itself, after the source's static substitutions;
/// 2. for a two-word name, `{genus} {epithet} subsp. {epithet}`;
/// 3. for a two-word name, `{genus} {epithet} var. {epithet}`.
/// Steps 2 and 3 apply only when infraspecific expansion is enabled for
/// the source, and model indexes that list the infraspecific type under a
/// repeated epithet.
pub struct Normalizer {
    substitutions: Vec<(String, String)>,
    infraspecific_expansion: bool,
}

impl Normalizer {
    pub fn new() -> Self {
        Normalizer {
            substitutions: Vec::new(),
            infraspecific_expansion: false,
        }
    }

    /// Builder pattern: add a static text substitution applied to every name
    pub fn with_substitution(mut self, from: &str, to: &str) -> Self {
        self.substitutions.push((from.to_string(), to.to_string()));
        self
    }

    /// Builder pattern: enable the two-word subsp./var. candidate expansion
    pub fn with_infraspecific_expansion(mut self) -> Self {
        self.infraspecific_expansion = true;
        self
    }

    /// Apply the source's static substitutions only
    pub fn canonical(&self, name: &str) -> String {
        let mut result = name.to_string();
        for (from, to) in &self.substitutions {
            result = result.replace(from.as_str(), to.as_str());
        }
        result
    }

    /// Produce the full candidate list, in priority order
    pub fn candidates(&self, name: &str) -> Vec<String> {
        let canonical = self.canonical(name);
        let mut candidates = vec![canonical.clone()];

        if self.infraspecific_expansion {
            let parts: Vec<&str> = canonical.split(' ').collect();
            if parts.len() == 2 {
                candidates.push(format!("{} {} subsp. {}", parts[0], parts[1], parts[1]));
                candidates.push(format!("{} {} var. {}", parts[0], parts[1], parts[1]));
            }
        }

        candidates
    }

    /// Try each candidate against the store; first present match wins
    pub fn resolve<'a>(&self, store: &'a RecordStore, name: &str) -> Option<&'a ExternalRecord> {
        for candidate in self.candidates(name) {
            if let Some(record) = store.lookup(&candidate) {
                return Some(record);
            }
        }
        None
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
