// 🌿 Local Catalog - Authoritative taxon list
// Loaded once per run from taxa.csv (+ synonyms.csv) and read-only from
// then on; the reconcilers never mutate it.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

// ============================================================================
// TAXON
// ============================================================================

/// One catalog entry. Core fields come straight from taxa.csv; optional
/// fields are empty strings in the file and exposed as Option accessors.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Taxon {
    /// Scientific name, the unique catalog key
    #[serde(rename = "taxon_name")]
    pub name: String,

    /// Nativity status code: N (native), NC (native, California
    /// endemic), U (nativity uncertain), X (introduced)
    #[serde(rename = "status")]
    pub status: String,

    /// Jepson eFlora taxon id
    #[serde(rename = "jepson_id", default)]
    pub jepson_id: String,

    /// Calflora record number
    #[serde(rename = "calrecnum", default)]
    pub calflora_id: String,

    /// iNaturalist taxon id
    #[serde(rename = "inat_id", default)]
    pub inat_id: String,

    /// Name iNaturalist files this taxon under, when it differs from ours
    #[serde(rename = "inat_name", default)]
    pub inat_name: String,

    /// Rare Plant Inventory id
    #[serde(rename = "rpi_id", default)]
    pub rpi_id: String,

    /// CNPS rank-and-threat code (e.g. "1B.2")
    #[serde(rename = "CRPR", default)]
    pub rank_threat: String,

    /// California Endangered Species Act listing
    #[serde(rename = "CESA", default)]
    pub cesa: String,

    /// Federal Endangered Species Act listing
    #[serde(rename = "FESA", default)]
    pub fesa: String,

    /// NatureServe global rank
    #[serde(rename = "GRank", default)]
    pub global_rank: String,

    /// NatureServe state rank
    #[serde(rename = "SRank", default)]
    pub state_rank: String,

    /// Known synonym names, filled in from synonyms.csv after load
    #[serde(skip)]
    pub synonyms: Vec<String>,
}

impl Taxon {
    /// Create a taxon with the two required fields
    pub fn new(name: &str, status: &str) -> Self {
        Taxon {
            name: name.to_string(),
            status: status.to_string(),
            jepson_id: String::new(),
            calflora_id: String::new(),
            inat_id: String::new(),
            inat_name: String::new(),
            rpi_id: String::new(),
            rank_threat: String::new(),
            cesa: String::new(),
            fesa: String::new(),
            global_rank: String::new(),
            state_rank: String::new(),
            synonyms: Vec::new(),
        }
    }

    /// Builder pattern: Jepson eFlora id
    pub fn with_jepson_id(mut self, id: &str) -> Self {
        self.jepson_id = id.to_string();
        self
    }

    /// Builder pattern: Calflora record number
    pub fn with_calflora_id(mut self, id: &str) -> Self {
        self.calflora_id = id.to_string();
        self
    }

    /// Builder pattern: iNaturalist id
    pub fn with_inat_id(mut self, id: &str) -> Self {
        self.inat_id = id.to_string();
        self
    }

    /// Builder pattern: alternate iNaturalist lookup name
    pub fn with_inat_name(mut self, name: &str) -> Self {
        self.inat_name = name.to_string();
        self
    }

    /// Builder pattern: Rare Plant Inventory id
    pub fn with_rpi_id(mut self, id: &str) -> Self {
        self.rpi_id = id.to_string();
        self
    }

    /// Builder pattern: CNPS rank-and-threat code
    pub fn with_rank_threat(mut self, rank: &str) -> Self {
        self.rank_threat = rank.to_string();
        self
    }

    /// Builder pattern: CESA listing
    pub fn with_cesa(mut self, cesa: &str) -> Self {
        self.cesa = cesa.to_string();
        self
    }

    /// Builder pattern: synonym list
    pub fn with_synonyms(mut self, synonyms: &[&str]) -> Self {
        self.synonyms = synonyms.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn is_native(&self) -> bool {
        self.status == "N" || self.status == "NC"
    }

    /// The name to probe iNaturalist with
    pub fn inat_lookup_name(&self) -> &str {
        if self.inat_name.is_empty() {
            &self.name
        } else {
            &self.inat_name
        }
    }

    pub fn jepson_id(&self) -> Option<&str> {
        none_if_empty(&self.jepson_id)
    }

    pub fn calflora_id(&self) -> Option<&str> {
        none_if_empty(&self.calflora_id)
    }

    pub fn inat_id(&self) -> Option<&str> {
        none_if_empty(&self.inat_id)
    }

    pub fn rpi_id(&self) -> Option<&str> {
        none_if_empty(&self.rpi_id)
    }

    pub fn rank_threat(&self) -> Option<&str> {
        none_if_empty(&self.rank_threat)
    }

    pub fn cesa(&self) -> Option<&str> {
        none_if_empty(&self.cesa)
    }
}

fn none_if_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

// ============================================================================
// SYNONYM ROW
// ============================================================================

#[derive(Debug, Deserialize)]
struct SynonymRow {
    #[serde(rename = "synonym")]
    synonym: String,

    #[serde(rename = "taxon_name")]
    taxon_name: String,
}

// ============================================================================
// CATALOG
// ============================================================================

/// The immutable taxon collection for one run. Iteration order is the
/// file order, so the forward passes are deterministic.
pub struct Catalog {
    taxa: Vec<Taxon>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    /// Load taxa.csv and synonyms.csv from a data directory
    pub fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let taxa = load_taxa(&data_dir.join("taxa.csv"))?;
        let mut catalog = Catalog::from_taxa(taxa)?;

        let synonyms_path = data_dir.join("synonyms.csv");
        if synonyms_path.exists() {
            catalog.load_synonyms(&synonyms_path)?;
        }

        Ok(catalog)
    }

    /// Build a catalog from already-loaded taxa (tests, alternate loaders)
    pub fn from_taxa(taxa: Vec<Taxon>) -> Result<Self> {
        let mut by_name = HashMap::new();
        for (index, taxon) in taxa.iter().enumerate() {
            if by_name.insert(taxon.name.clone(), index).is_some() {
                bail!("duplicate catalog entry: {}", taxon.name);
            }
        }
        Ok(Catalog { taxa, by_name })
    }

    fn load_synonyms(&mut self, path: &Path) -> Result<()> {
        let mut rdr = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open synonyms file: {:?}", path))?;
        for result in rdr.deserialize() {
            let row: SynonymRow = result.context("Failed to deserialize synonym row")?;
            if let Some(&index) = self.by_name.get(&row.taxon_name) {
                self.taxa[index].synonyms.push(row.synonym);
            } else {
                bail!("synonym target not in catalog: {}", row.taxon_name);
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Taxon> {
        self.by_name.get(name).map(|&index| &self.taxa[index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn taxa(&self) -> &[Taxon] {
        &self.taxa
    }

    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }
}

fn load_taxa(path: &Path) -> Result<Vec<Taxon>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open taxa file: {:?}", path))?;

    let mut taxa = Vec::new();
    for result in rdr.deserialize() {
        let taxon: Taxon = result.context("Failed to deserialize taxon row")?;
        taxa.push(taxon);
    }

    Ok(taxa)
}

// ============================================================================
// TESTS
// ============================================================================
