/// Row-index tables and the reach <-> gauge crosswalk.
///
/// The HAND array files are indexed by row, not by COMID. Two small CSV
/// tables (`comid,index`) map a COMID to its row in each file, and the
/// stream gage table maps COMIDs (`FLComID`) to USGS site numbers
/// (`SOURCE_FEA`).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::model::{RcError, ReachId};

// ---------------------------------------------------------------------------
// Identifier parsing
// ---------------------------------------------------------------------------

/// Parses a COMID cell. Spreadsheet exports sometimes write integers as
/// `5781373.0`, so integral floats are accepted.
pub fn parse_reach_id(raw: &str) -> Result<ReachId, RcError> {
    let trimmed = raw.trim();
    if let Ok(id) = trimmed.parse::<ReachId>() {
        return Ok(id);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => Ok(v as ReachId),
        _ => Err(RcError::Parse(format!("invalid COMID '{}'", raw))),
    }
}

/// Left-pads a USGS site number with zeros to 8 characters. Site numbers
/// read back from numeric columns lose their leading zero.
pub fn pad_site_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let digits = match trimmed.strip_suffix(".0") {
        Some(stripped) if stripped.chars().all(|c| c.is_ascii_digit()) => stripped,
        _ => trimmed,
    };
    format!("{:0>8}", digits)
}

// ---------------------------------------------------------------------------
// Row index
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IndexRow {
    comid: String,
    index: String,
}

/// COMID -> row position in one array file.
#[derive(Debug, Clone)]
pub struct RowIndex {
    table: String,
    rows: Vec<(ReachId, usize)>,
}

impl RowIndex {
    pub fn from_path(path: &Path) -> Result<Self, RcError> {
        let file = File::open(path)?;
        Self::from_reader(&path.display().to_string(), file)
    }

    pub fn from_reader<R: Read>(table: &str, reader: R) -> Result<Self, RcError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows = Vec::new();
        for record in rdr.deserialize::<IndexRow>() {
            let record = record?;
            let comid = parse_reach_id(&record.comid)?;
            let index = record.index.parse::<usize>().map_err(|e| {
                RcError::Parse(format!("invalid row index '{}' in {}: {}", record.index, table, e))
            })?;
            rows.push((comid, index));
        }

        Ok(RowIndex {
            table: table.to_string(),
            rows,
        })
    }

    /// Returns the row for `reach_id`. The reach must appear exactly once.
    pub fn row_for(&self, reach_id: ReachId) -> Result<usize, RcError> {
        let matches: Vec<usize> = self
            .rows
            .iter()
            .filter(|(comid, _)| *comid == reach_id)
            .map(|(_, index)| *index)
            .collect();

        match matches.as_slice() {
            [row] => Ok(*row),
            [] => Err(RcError::IndexMissing {
                table: self.table.clone(),
                reach_id,
            }),
            many => Err(RcError::IndexDuplicate {
                table: self.table.clone(),
                reach_id,
                rows: many.len(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Crosswalk
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CrosswalkRow {
    #[serde(rename = "SOURCE_FEA")]
    source_fea: String,
    #[serde(rename = "FLComID")]
    fl_comid: String,
}

/// COMID -> USGS site numbers, in file order.
#[derive(Debug, Clone, Default)]
pub struct Crosswalk {
    entries: Vec<(ReachId, String)>,
}

impl Crosswalk {
    pub fn from_path(path: &Path) -> Result<Self, RcError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Rows with an empty `FLComID` or `SOURCE_FEA` are skipped; other
    /// columns are ignored.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RcError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries = Vec::new();
        for record in rdr.deserialize::<CrosswalkRow>() {
            let record = record?;
            if record.fl_comid.is_empty() || record.source_fea.is_empty() {
                continue;
            }
            entries.push((parse_reach_id(&record.fl_comid)?, pad_site_id(&record.source_fea)));
        }

        Ok(Crosswalk { entries })
    }

    pub fn from_pairs(pairs: &[(ReachId, &str)]) -> Self {
        Crosswalk {
            entries: pairs
                .iter()
                .map(|(reach_id, site)| (*reach_id, pad_site_id(site)))
                .collect(),
        }
    }

    /// All site numbers mapped to `reach_id`. No mapping is a lookup failure.
    pub fn site_ids(&self, reach_id: ReachId) -> Result<Vec<String>, RcError> {
        let sites: Vec<String> = self
            .entries
            .iter()
            .filter(|(comid, _)| *comid == reach_id)
            .map(|(_, site)| site.clone())
            .collect();

        if sites.is_empty() {
            Err(RcError::NoObservationSite(reach_id))
        } else {
            Ok(sites)
        }
    }

    /// Unique reach ids in first-seen order.
    pub fn reach_ids(&self) -> Vec<ReachId> {
        let mut seen = Vec::new();
        for (comid, _) in &self.entries {
            if !seen.contains(comid) {
                seen.push(*comid);
            }
        }
        seen
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
