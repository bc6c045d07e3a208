//! Variant documents
//!
//! A variant is identified by its genomic coordinates on one genome build.
//! The stored document carries the ClinVar classification (current record
//! plus append-only history) and the subscription state owned by the
//! web-facing subscription feature.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

use super::category::{categorize, Category};

/// Separator between coordinate fields in a [`VariantKey`]
pub const VARIANT_KEY_DELIMITER: char = '-';

/// Highest ClinVar review star rating
pub const MAX_STAR_RATING: u8 = 4;

/// Deterministic variant identity, e.g. `b37-1-55518071-G-A`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantKey(String);

impl VariantKey {
    /// Join the five coordinate fields into a key.
    ///
    /// Fields are not escaped. A field that itself contains the delimiter
    /// makes the key ambiguous; this is logged, not corrected.
    pub fn new(build: &str, chrom: &str, pos: u64, reference: &str, alternate: &str) -> Self {
        let pos = pos.to_string();
        let parts = [build, chrom, pos.as_str(), reference, alternate];

        if parts.iter().any(|p| p.contains(VARIANT_KEY_DELIMITER)) {
            warn!(
                build,
                chrom,
                pos = %pos,
                reference,
                alternate,
                "Coordinate field contains key delimiter; variant key may be ambiguous"
            );
        }

        let delimiter = VARIANT_KEY_DELIMITER.to_string();
        Self(parts.join(&delimiter))
    }

    /// Wrap an already-joined key (as read back from the store)
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Genomic coordinates of a variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    pub build: String,
    pub chrom: String,
    pub pos: u64,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(rename = "alt")]
    pub alternate: String,
}

impl Coordinates {
    pub fn key(&self) -> VariantKey {
        VariantKey::new(&self.build, &self.chrom, self.pos, &self.reference, &self.alternate)
    }
}

impl fmt::Display for Coordinates {
    /// `chrom:pos ref>alt (build)`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {}>{} ({})",
            self.chrom, self.pos, self.reference, self.alternate, self.build
        )
    }
}

/// One point-in-time clinical significance annotation. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    /// Significance text exactly as reported
    pub clinical_significance: String,
    pub category: Category,
    /// Review status stars (0-4); absent when the feed had none
    pub gold_stars: Option<u8>,
    pub review_status: Option<String>,
    pub last_evaluated: Option<String>,
}

impl ClassificationRecord {
    /// Build a record, deriving the category from the significance text
    pub fn new(
        clinical_significance: impl Into<String>,
        gold_stars: Option<u8>,
        review_status: Option<String>,
        last_evaluated: Option<String>,
    ) -> Self {
        let clinical_significance = clinical_significance.into();
        let category = categorize(&clinical_significance);
        Self {
            clinical_significance,
            category,
            gold_stars: gold_stars.map(|s| s.min(MAX_STAR_RATING)),
            review_status,
            last_evaluated,
        }
    }

    /// Star rating with absent treated as zero
    pub fn stars(&self) -> u8 {
        self.gold_stars.unwrap_or(0)
    }
}

/// ClinVar annotation state of a variant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// ClinVar variation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation_id: Option<String>,
    #[serde(default)]
    pub current: Option<ClassificationRecord>,
    /// Prior records, oldest first; never shrinks
    #[serde(default)]
    pub history: Vec<ClassificationRecord>,
}

impl Classification {
    pub fn category(&self) -> Category {
        self.current
            .as_ref()
            .map(|c| c.category)
            .unwrap_or_default()
    }
}

/// Stored variant document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDocument {
    pub key: VariantKey,
    pub coordinates: Coordinates,
    pub classification: Classification,
    /// Subscribed user ids
    pub subscribers: BTreeSet<String>,
    /// User id -> free-text label
    pub tags: BTreeMap<String, String>,
}

impl VariantDocument {
    /// Fresh document with no classification and no subscription state
    pub fn new(coordinates: Coordinates) -> Self {
        Self {
            key: coordinates.key(),
            coordinates,
            classification: Classification::default(),
            subscribers: BTreeSet::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Category of the current classification (absent -> unknown)
    pub fn category(&self) -> Category {
        self.classification.category()
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    pub fn tag_for(&self, user_id: &str) -> Option<&str> {
        self.tags.get(user_id).map(String::as_str)
    }
}

/// Category of an optional document (absent -> unknown)
pub fn category_of(doc: Option<&VariantDocument>) -> Category {
    doc.map(VariantDocument::category).unwrap_or_default()
}

/// Keys ticked in a "remove variants" selection
///
/// The subscription page offers one checkbox per subscribed variant; the
/// selection arrives as a key -> checked map.
pub fn selected_for_removal(selection: &BTreeMap<VariantKey, bool>) -> Vec<VariantKey> {
    selection
        .iter()
        .filter(|(_, checked)| **checked)
        .map(|(key, _)| key.clone())
        .collect()
}
