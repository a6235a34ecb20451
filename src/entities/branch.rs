// 🏪 Branch Entity - canonical names + region grouping
//
// Problem solved:
// - "Stories - Bir Hasan", "Stories Bir Hasan" → one physical location
// - "Stories alay" → "Stories Aley" (casing/spelling drift between exports)
// - Canonical name → fixed region, "Unknown" when not on the roster
//
// Lookups are trim + exact match only. The roster is small and curated by
// hand; fuzzy matching could fold two real locations into one.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// REGION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "Beirut Central")]
    BeirutCentral,
    #[serde(rename = "Greater Beirut")]
    GreaterBeirut,
    North,
    Metn,
    South,
    Mountains,
    #[serde(rename = "Malls & Special")]
    MallsAndSpecial,
    Unknown,
}

impl Region {
    pub const ALL: [Region; 8] = [
        Region::BeirutCentral,
        Region::GreaterBeirut,
        Region::North,
        Region::Metn,
        Region::South,
        Region::Mountains,
        Region::MallsAndSpecial,
        Region::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::BeirutCentral => "Beirut Central",
            Region::GreaterBeirut => "Greater Beirut",
            Region::North => "North",
            Region::Metn => "Metn",
            Region::South => "South",
            Region::Mountains => "Mountains",
            Region::MallsAndSpecial => "Malls & Special",
            Region::Unknown => "Unknown",
        }
    }

    /// Inverse of `as_str`; unlabeled text becomes `Unknown`.
    pub fn from_label(label: &str) -> Region {
        Region::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == label)
            .unwrap_or(Region::Unknown)
    }
}

// ============================================================================
// BRANCH ENTITY
// ============================================================================

/// One physical location and every raw spelling the exports use for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub canonical_name: String,

    /// Raw spellings seen in the exports. May include the canonical name itself.
    pub variants: Vec<String>,

    pub region: Region,
}

impl Branch {
    pub fn new(canonical_name: &str, region: Region) -> Self {
        Branch {
            canonical_name: canonical_name.to_string(),
            variants: Vec::new(),
            region,
        }
    }

    /// Add a raw spelling (duplicates ignored)
    pub fn add_variant(&mut self, variant: &str) {
        let variant = variant.trim().to_string();
        if !self.variants.contains(&variant) {
            self.variants.push(variant);
        }
    }

    /// Builder pattern: add a raw spelling
    pub fn with_variant(mut self, variant: &str) -> Self {
        self.add_variant(variant);
        self
    }
}

// ============================================================================
// BRANCH REGISTRY
// ============================================================================

/// (canonical name, region, raw variants) for every branch on the roster.
const ROSTER: &[(&str, Region, &[&str])] = &[
    ("Stories Bir Hasan", Region::GreaterBeirut, &["Stories - Bir Hasan", "Stories Bir Hasan"]),
    ("Stories Ain El Mreisseh", Region::BeirutCentral, &["Stories Ain El Mreisseh"]),
    ("Stories Airport", Region::MallsAndSpecial, &["Stories Airport"]),
    ("Stories Antelias", Region::Metn, &["Stories Antelias"]),
    ("Stories Batroun", Region::North, &["Stories Batroun"]),
    ("Stories Bayada", Region::BeirutCentral, &["Stories Bayada"]),
    ("Stories Centro Mall", Region::MallsAndSpecial, &["Stories Centro Mall"]),
    ("Stories Event Starco", Region::MallsAndSpecial, &["Stories Event Starco"]),
    ("Stories Faqra", Region::Mountains, &["Stories Faqra"]),
    ("Stories Khaldeh", Region::GreaterBeirut, &["Stories Khaldeh"]),
    ("Stories LAU", Region::MallsAndSpecial, &["Stories LAU"]),
    ("Stories Le Mall", Region::MallsAndSpecial, &["Stories Le Mall"]),
    ("Stories Mansourieh", Region::GreaterBeirut, &["Stories Mansourieh"]),
    ("Stories Ramlet El Bayda", Region::BeirutCentral, &["Stories Ramlet El Bayda"]),
    ("Stories Saida", Region::South, &["Stories Saida"]),
    ("Stories Sour 2", Region::South, &["Stories Sour 2"]),
    ("Stories Verdun", Region::BeirutCentral, &["Stories Verdun"]),
    ("Stories Zalka", Region::Metn, &["Stories Zalka"]),
    ("Stories Aley", Region::Mountains, &["Stories alay"]),
    ("Stories Amioun", Region::North, &["Stories amioun"]),
    ("Stories Jbeil", Region::North, &["Stories jbeil"]),
    ("Stories Kaslik", Region::Metn, &["Stories kaslik"]),
    ("Stories Raouche", Region::BeirutCentral, &["Stories raouche"]),
    ("Stories Sin El Fil", Region::GreaterBeirut, &["Stories sin el fil"]),
    ("Stories Unknown (Closed)", Region::Unknown, &["Stories."]),
];

/// Registry of the chain's branches.
///
/// `normalize` and `region` are total: unseen names pass through unchanged,
/// unmapped canonical names fall into `Region::Unknown`.
#[derive(Debug, Clone)]
pub struct BranchRegistry {
    branches: Vec<Branch>,

    /// raw variant → index into `branches`
    by_variant: HashMap<String, usize>,

    /// canonical name → index into `branches`
    by_canonical: HashMap<String, usize>,
}

impl BranchRegistry {
    /// Registry preloaded with the chain's roster
    pub fn new() -> Self {
        let mut registry = BranchRegistry::empty();

        for (canonical, region, variants) in ROSTER {
            let branch = variants
                .iter()
                .fold(Branch::new(canonical, *region), |b, v| b.with_variant(v));
            registry.register(branch);
        }

        registry
    }

    /// Registry with no branches at all
    pub fn empty() -> Self {
        BranchRegistry {
            branches: Vec::new(),
            by_variant: HashMap::new(),
            by_canonical: HashMap::new(),
        }
    }

    /// Register a branch. A variant already claimed by another branch is
    /// re-pointed at the new one so every variant keeps exactly one owner.
    pub fn register(&mut self, branch: Branch) {
        let idx = self.branches.len();
        for variant in &branch.variants {
            self.by_variant.insert(variant.clone(), idx);
        }
        self.by_canonical.insert(branch.canonical_name.clone(), idx);
        self.branches.push(branch);
    }

    /// Raw spelling → canonical name.
    ///
    /// Example: "Stories alay" → "Stories Aley"; "Stories Nowhere" → "Stories Nowhere"
    pub fn normalize(&self, raw_name: &str) -> String {
        let name = raw_name.trim();
        match self.by_variant.get(name) {
            Some(&idx) => self.branches[idx].canonical_name.clone(),
            None => name.to_string(),
        }
    }

    /// Canonical name → region label
    pub fn region(&self, canonical_name: &str) -> Region {
        self.by_canonical
            .get(canonical_name.trim())
            .map(|&idx| self.branches[idx].region)
            .unwrap_or(Region::Unknown)
    }

    /// Region for an optional branch context (no branch → `Unknown`)
    pub fn region_of(&self, canonical_name: Option<&str>) -> Region {
        canonical_name
            .map(|name| self.region(name))
            .unwrap_or(Region::Unknown)
    }

    /// Does this exact text name a branch as the exports spell it?
    pub fn is_known_variant(&self, text: &str) -> bool {
        self.by_variant.contains_key(text)
    }

    pub fn find_by_variant(&self, raw_name: &str) -> Option<&Branch> {
        self.by_variant
            .get(raw_name.trim())
            .map(|&idx| &self.branches[idx])
    }

    /// Every raw spelling on the roster, in registration order
    pub fn variants(&self) -> Vec<&str> {
        self.branches
            .iter()
            .flat_map(|b| b.variants.iter().map(|v| v.as_str()))
            .collect()
    }

    pub fn canonical_names(&self) -> Vec<&str> {
        self.branches
            .iter()
            .map(|b| b.canonical_name.as_str())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.branches.len()
    }
}

impl Default for BranchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_initialization() {
        let registry = BranchRegistry::new();

        assert_eq!(registry.count(), 25);
        assert_eq!(registry.variants().len(), 26);
        assert!(registry.canonical_names().contains(&"Stories Verdun"));
    }

    #[test]
    fn test_normalize_variants() {
        let registry = BranchRegistry::new();

        assert_eq!(registry.normalize("Stories - Bir Hasan"), "Stories Bir Hasan");
        assert_eq!(registry.normalize("Stories alay"), "Stories Aley");
        assert_eq!(registry.normalize("Stories sin el fil"), "Stories Sin El Fil");
        assert_eq!(registry.normalize("Stories."), "Stories Unknown (Closed)");
        assert_eq!(registry.normalize("  Stories Verdun  "), "Stories Verdun");
    }

    #[test]
    fn test_normalize_unknown_passes_through() {
        let registry = BranchRegistry::new();

        assert_eq!(registry.normalize("Stories Tripoli"), "Stories Tripoli");
        assert_eq!(registry.normalize("Total"), "Total");
    }

    #[test]
    fn test_normalize_is_exact_match_only() {
        let registry = BranchRegistry::new();

        // No case folding: "stories verdun" is not on the roster
        assert_eq!(registry.normalize("stories verdun"), "stories verdun");
        assert!(!registry.is_known_variant("STORIES ALAY"));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let registry = BranchRegistry::new();

        for variant in registry.variants() {
            let once = registry.normalize(variant);
            let twice = registry.normalize(&once);
            assert_eq!(once, twice, "normalize not idempotent for {:?}", variant);
        }
    }

    #[test]
    fn test_every_canonical_name_has_one_region() {
        let registry = BranchRegistry::new();

        for variant in registry.variants() {
            let canonical = registry.normalize(variant);
            let branch = registry.find_by_variant(variant).unwrap();
            assert_eq!(registry.region(&canonical), branch.region);
        }
    }

    #[test]
    fn test_region_lookup() {
        let registry = BranchRegistry::new();

        assert_eq!(registry.region("Stories Verdun"), Region::BeirutCentral);
        assert_eq!(registry.region("Stories Aley"), Region::Mountains);
        assert_eq!(registry.region("Stories Airport"), Region::MallsAndSpecial);
        assert_eq!(registry.region("Stories Tripoli"), Region::Unknown);
        assert_eq!(registry.region_of(None), Region::Unknown);
    }

    #[test]
    fn test_region_requires_canonical_name() {
        let registry = BranchRegistry::new();

        // Raw variant that differs from its canonical name has no region of its own
        assert_eq!(registry.region("Stories alay"), Region::Unknown);
    }

    #[test]
    fn test_region_labels_round_trip() {
        for region in Region::ALL {
            assert_eq!(Region::from_label(region.as_str()), region);
        }
        assert_eq!(Region::from_label("Atlantis"), Region::Unknown);
    }

    #[test]
    fn test_region_serializes_as_label() {
        let json = serde_json::to_string(&Region::MallsAndSpecial).unwrap();
        assert_eq!(json, "\"Malls & Special\"");
    }

    #[test]
    fn test_register_new_branch() {
        let mut registry = BranchRegistry::new();
        registry.register(
            Branch::new("Stories Tripoli", Region::North).with_variant("Stories tripoli"),
        );

        assert_eq!(registry.normalize("Stories tripoli"), "Stories Tripoli");
        assert_eq!(registry.region("Stories Tripoli"), Region::North);
        assert!(registry.is_known_variant("Stories tripoli"));
    }

    #[test]
    fn test_branch_add_variant_dedup() {
        let mut branch = Branch::new("Stories Bir Hasan", Region::GreaterBeirut);
        branch.add_variant("Stories - Bir Hasan");
        branch.add_variant("Stories - Bir Hasan");

        assert_eq!(branch.variants.len(), 1);
    }
}
