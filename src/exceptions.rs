// 📒 Exception Ledger - Curated suppressions for known discrepancies
// Each entry is a permanent, hand-curated statement that a specific
// discrepancy for a specific taxon/source is expected and should not be
// logged. Entries are validated against each source's closed code
// vocabulary at load time, and re-validated against reality by each
// source's reverse pass.

use crate::sources::Source;
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// code → value for one taxon and one source. The value is `true` for a
/// plain suppression, or a string payload (e.g. an RPI name translation).
pub type CodeMap = BTreeMap<String, Value>;

/// source code → CodeMap for one taxon
pub type SourceMap = BTreeMap<String, CodeMap>;

// ============================================================================
// EXCEPTION LEDGER
// ============================================================================

/// In-memory index of all curated exceptions, keyed by taxon name.
/// BTreeMaps keep the reverse-validation pass in a deterministic order.
///
/// File format (`exceptions.json`):
/// ```json
/// {
///     "Carex serratodens": {
///         "jepson": { "notineflora": true },
///         "rpi": { "translation": "Carex serratodens var. serratodens" }
///     }
/// }
/// ```
pub struct Exceptions {
    entries: BTreeMap<String, SourceMap>,
}

impl Exceptions {
    /// Create an empty ledger
    pub fn new() -> Self {
        Exceptions {
            entries: BTreeMap::new(),
        }
    }

    /// Load and validate the ledger from a JSON file. An unknown source
    /// name or exception code fails the load; silently ignoring a typo
    /// would leave a real discrepancy unsuppressed or unsuppressable.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read exceptions file: {:?}", path.as_ref()))?;

        let entries: BTreeMap<String, SourceMap> =
            serde_json::from_str(&content).context("Failed to parse exceptions JSON")?;

        let ledger = Exceptions { entries };
        ledger.validate()?;
        Ok(ledger)
    }

    /// Build from already-parsed entries (tests, alternate loaders)
    pub fn from_entries(entries: BTreeMap<String, SourceMap>) -> Result<Self> {
        let ledger = Exceptions { entries };
        ledger.validate()?;
        Ok(ledger)
    }

    fn validate(&self) -> Result<()> {
        for (name, sources) in &self.entries {
            for (source_code, codes) in sources {
                let source = match Source::from_code(source_code) {
                    Some(source) => source,
                    None => bail!("{}: unrecognized exception source \"{}\"", name, source_code),
                };
                for code in codes.keys() {
                    if !source.exception_codes().contains(&code.as_str()) {
                        bail!(
                            "{}: unrecognized {} exception \"{}\"",
                            name,
                            source.name(),
                            code
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// True iff a curated entry exists for exactly this triple
    pub fn has(&self, name: &str, source: Source, code: &str) -> bool {
        self.entries
            .get(name)
            .and_then(|sources| sources.get(source.code()))
            .map(|codes| codes.contains_key(code))
            .unwrap_or(false)
    }

    /// True iff an entry exists for any of the given codes
    pub fn has_any(&self, name: &str, source: Source, codes: &[&str]) -> bool {
        codes.iter().any(|code| self.has(name, source, code))
    }

    /// The string payload associated with an entry, if present
    pub fn value(&self, name: &str, source: Source, code: &str) -> Option<&str> {
        self.entries
            .get(name)?
            .get(source.code())?
            .get(code)?
            .as_str()
    }

    /// Iterate every taxon that has exceptions registered for the given
    /// source, in name order. Used by the reverse-validation pass.
    pub fn for_source(&self, source: Source) -> impl Iterator<Item = (&str, &CodeMap)> {
        self.entries.iter().filter_map(move |(name, sources)| {
            sources
                .get(source.code())
                .map(|codes| (name.as_str(), codes))
        })
    }

    /// Iterate every curated taxon record
    pub fn all_entries(&self) -> impl Iterator<Item = (&str, &SourceMap)> {
        self.entries.iter().map(|(name, sources)| (name.as_str(), sources))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Exceptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
