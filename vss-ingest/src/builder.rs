//! Feed record to variant document conversion

use vss_common::models::{ClassificationRecord, Coordinates, VariantDocument};

use crate::feed::FeedRecord;

/// Builds canonical variant documents for one genome build
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    genome_build: String,
}

impl RecordBuilder {
    pub fn new(genome_build: impl Into<String>) -> Self {
        Self {
            genome_build: genome_build.into(),
        }
    }

    pub fn genome_build(&self) -> &str {
        &self.genome_build
    }

    /// Document shell for a feed row.
    ///
    /// Subscribers, tags and history start empty. `current` is set only when
    /// the row carries significance text.
    pub fn build(&self, record: &FeedRecord) -> VariantDocument {
        let mut doc = VariantDocument::new(Coordinates {
            build: self.genome_build.clone(),
            chrom: record.chrom.clone(),
            pos: record.pos,
            reference: record.reference.clone(),
            alternate: record.alternate.clone(),
        });

        doc.classification.variation_id = record
            .variation_id
            .clone()
            .filter(|id| !id.trim().is_empty());

        if let Some(significance) = record
            .clinical_significance
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            doc.classification.current = Some(ClassificationRecord::new(
                significance,
                record.gold_stars,
                record.review_status.clone(),
                record.last_evaluated.clone(),
            ));
        }

        doc
    }
}
