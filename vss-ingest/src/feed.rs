//! ClinVar allele feed adapter
//!
//! Reads the tab-separated `clinvar_alleles` table (optionally gzip
//! compressed) and yields one [`FeedRecord`] per row. Columns are matched by
//! header name; columns not listed on [`FeedRecord`] are ignored.
//!
//! Row-level problems are yielded as errors and reading continues with the
//! next row. An I/O error ends the iteration.

use flate2::read::MultiGzDecoder;
use serde::Deserialize;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::FeedError;

/// Columns every feed must have
const REQUIRED_COLUMNS: [&str; 4] = ["chrom", "pos", "ref", "alt"];

/// One parsed feed row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRecord {
    pub chrom: String,
    pub pos: u64,
    pub reference: String,
    pub alternate: String,
    pub clinical_significance: Option<String>,
    pub gold_stars: Option<u8>,
    pub review_status: Option<String>,
    pub last_evaluated: Option<String>,
    /// ClinVar variation id
    pub variation_id: Option<String>,
}

impl FeedRecord {
    /// Unclassified record at the given coordinates
    pub fn new(chrom: &str, pos: u64, reference: &str, alternate: &str) -> Self {
        Self {
            chrom: chrom.to_string(),
            pos,
            reference: reference.to_string(),
            alternate: alternate.to_string(),
            clinical_significance: None,
            gold_stars: None,
            review_status: None,
            last_evaluated: None,
            variation_id: None,
        }
    }

    pub fn with_classification(mut self, significance: &str, gold_stars: Option<u8>) -> Self {
        self.clinical_significance = Some(significance.to_string());
        self.gold_stars = gold_stars;
        self
    }

    pub fn with_variation_id(mut self, variation_id: &str) -> Self {
        self.variation_id = Some(variation_id.to_string());
        self
    }
}

/// Row as it appears in the file, before validation
#[derive(Debug, Deserialize)]
struct FeedRow {
    chrom: String,
    pos: String,
    #[serde(rename = "ref")]
    reference: String,
    #[serde(rename = "alt")]
    alternate: String,
    #[serde(default)]
    clinical_significance: String,
    #[serde(default)]
    gold_stars: String,
    #[serde(default)]
    review_status: String,
    #[serde(default)]
    last_evaluated: String,
    #[serde(default)]
    variation_id: String,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn required(value: String, field: &'static str, line: u64) -> Result<String, FeedError> {
    non_empty(value).ok_or(FeedError::MissingField { line, field })
}

impl FeedRow {
    fn into_record(self, line: u64) -> Result<FeedRecord, FeedError> {
        let chrom = required(self.chrom, "chrom", line)?;
        let reference = required(self.reference, "ref", line)?;
        let alternate = required(self.alternate, "alt", line)?;

        let pos_text = required(self.pos, "pos", line)?;
        let pos = pos_text
            .parse::<u64>()
            .map_err(|_| FeedError::InvalidPosition {
                line,
                value: pos_text.clone(),
            })?;

        let gold_stars = match non_empty(self.gold_stars) {
            Some(text) => Some(
                text.parse::<u8>()
                    .map_err(|_| FeedError::InvalidStars { line, value: text })?,
            ),
            None => None,
        };

        Ok(FeedRecord {
            chrom,
            pos,
            reference,
            alternate,
            clinical_significance: non_empty(self.clinical_significance),
            gold_stars,
            review_status: non_empty(self.review_status),
            last_evaluated: non_empty(self.last_evaluated),
            variation_id: non_empty(self.variation_id),
        })
    }
}

/// Open a file for reading, decompressing `.gz` files transparently
pub fn get_dynamic_reader(path: &Path) -> Result<BufReader<Box<dyn Read>>, FeedError> {
    let is_gzipped = path.extension() == Some(OsStr::new("gz"));
    let file = File::open(path)?;

    let file: Box<dyn Read> = match is_gzipped {
        true => Box::new(MultiGzDecoder::new(file)),
        false => Box::new(file),
    };

    Ok(BufReader::new(file))
}

/// Tab-separated feed reader
pub struct FeedReader<R: Read> {
    inner: csv::Reader<R>,
    headers: csv::StringRecord,
}

impl FeedReader<BufReader<Box<dyn Read>>> {
    /// Open a feed file (`.tsv` or `.tsv.gz`)
    pub fn open(path: &Path) -> Result<Self, FeedError> {
        Self::from_reader(get_dynamic_reader(path)?)
    }
}

impl<R: Read> FeedReader<R> {
    /// Read the header row and check the required columns are present
    pub fn from_reader(reader: R) -> Result<Self, FeedError> {
        let mut inner = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .from_reader(reader);

        let headers = inner.headers().map_err(FeedError::from_csv)?.clone();

        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(FeedError::Malformed {
                    line: 1,
                    message: format!("missing required column '{}'", column),
                });
            }
        }

        Ok(Self { inner, headers })
    }

    pub fn records(self) -> FeedRecords<R> {
        FeedRecords {
            records: self.inner.into_records(),
            headers: self.headers,
            finished: false,
        }
    }
}

/// Iterator over the rows of a feed
pub struct FeedRecords<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    headers: csv::StringRecord,
    finished: bool,
}

impl<R: Read> Iterator for FeedRecords<R> {
    type Item = Result<FeedRecord, FeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => {
                let err = FeedError::from_csv(e);
                if matches!(err, FeedError::Io(_)) {
                    self.finished = true;
                }
                return Some(Err(err));
            }
        };

        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let row = record
            .deserialize::<FeedRow>(Some(&self.headers))
            .map_err(FeedError::from_csv);

        Some(row.and_then(|row| row.into_record(line)))
    }
}
