/// USGS NWIS text endpoints.
///
/// Two endpoints are used per site:
/// - `get_ratings?file_type=exsa`: the expanded shift-adjusted rating table,
///   tab-delimited, columns INDEP (stage ft), SHIFT (ft), DEP (discharge cfs).
/// - `measurements?format=rdb_expanded`: field measurements as RDB: `#`
///   comment block, a header row, a column-format row, then data rows.
///
/// Fetching goes through the `TextFetcher` trait so parsing can be tested
/// against canned responses and the pipeline can prove it made no request.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::logging::{self, DataSource};
use crate::model::{MIN_OBSERVED_DISCHARGE_CFS, ObservedRating, RcError};

pub const DEFAULT_RATING_URL: &str =
    "https://waterdata.usgs.gov/nwisweb/get_ratings?file_type=exsa&site_no={site}";

pub const DEFAULT_MEASUREMENTS_URL: &str =
    "https://waterdata.usgs.gov/tx/nwis/measurements?site_no={site}&agency_cd=USGS&format=rdb_expanded";

/// RDB column names used for cross-section geometry.
pub const COL_WIDTH: &str = "chan_width";
pub const COL_GAGE_HEIGHT: &str = "gage_height_va";
pub const COL_RATING: &str = "current_rating_nu";

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Fetches a URL as text.
pub trait TextFetcher {
    fn get_text(&self, url: &str) -> Result<String, RcError>;
}

impl TextFetcher for reqwest::blocking::Client {
    fn get_text(&self, url: &str) -> Result<String, RcError> {
        let response = self.get(url).send()?;

        if !response.status().is_success() {
            return Err(RcError::Http {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response.text()?)
    }
}

/// Blocking client with a request timeout.
pub fn http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client, RcError> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RcError::Request(format!("could not build HTTP client: {}", e)))
}

/// Substitutes `{site}` in an endpoint template.
pub fn build_site_url(template: &str, site_id: &str) -> String {
    template.replace("{site}", site_id)
}

// ---------------------------------------------------------------------------
// Observed rating (exsa)
// ---------------------------------------------------------------------------

/// Shifts every height so the first reads zero.
pub fn rebase_heights(heights: &[f64]) -> Vec<f64> {
    match heights.first() {
        Some(&base) => heights.iter().map(|h| h - base).collect(),
        None => Vec::new(),
    }
}

fn is_header_line(line: &str) -> bool {
    line.starts_with('#') || line.chars().any(|c| c.is_ascii_alphabetic())
}

fn parse_field(site_id: &str, line_no: usize, name: &str, raw: Option<&str>) -> Result<f64, RcError> {
    let raw = raw.ok_or_else(|| {
        RcError::Parse(format!("site {} line {}: missing {} column", site_id, line_no, name))
    })?;
    raw.trim().parse::<f64>().map_err(|e| {
        RcError::Parse(format!(
            "site {} line {}: invalid {} '{}': {}",
            site_id,
            line_no,
            name,
            raw.trim(),
            e
        ))
    })
}

/// Parses an exsa rating table.
///
/// Lines before the first purely numeric line are header. From there on,
/// every non-blank line must parse. Rows with discharge below 1 cfs are
/// dropped; each kept height is `stage - shift`, then the series is re-based
/// on its first kept row.
pub fn parse_exsa_rating(site_id: &str, text: &str) -> Result<ObservedRating, RcError> {
    let mut in_data = false;
    let mut heights = Vec::new();
    let mut discharges = Vec::new();

    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        if !in_data {
            if is_header_line(line) {
                continue;
            }
            in_data = true;
        }

        let mut fields = line.split('\t');
        let stage = parse_field(site_id, line_no, "stage", fields.next())?;
        let shift = parse_field(site_id, line_no, "shift", fields.next())?;
        let discharge = parse_field(site_id, line_no, "discharge", fields.next())?;

        if discharge >= MIN_OBSERVED_DISCHARGE_CFS {
            heights.push(stage - shift);
            discharges.push(discharge);
        }
    }

    if heights.is_empty() {
        return Err(RcError::NoObservedData(site_id.to_string()));
    }

    Ok(ObservedRating {
        site_id: site_id.to_string(),
        height_ft: rebase_heights(&heights),
        discharge_cfs: discharges,
    })
}

/// Fetches and parses the observed rating for one site.
pub fn fetch_observed_rating(
    fetcher: &dyn TextFetcher,
    url_template: &str,
    site_id: &str,
) -> Result<ObservedRating, RcError> {
    let url = build_site_url(url_template, site_id);
    logging::debug(DataSource::Nwis, Some(site_id), &format!("GET {}", url));

    let text = fetcher.get_text(&url)?;
    let rating = parse_exsa_rating(site_id, &text)?;

    logging::debug(
        DataSource::Nwis,
        Some(site_id),
        &format!("{} rating rows retained", rating.height_ft.len()),
    );
    Ok(rating)
}

// ---------------------------------------------------------------------------
// Field measurements (rdb_expanded)
// ---------------------------------------------------------------------------

/// Column-oriented RDB table: column name -> cell strings.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementTable {
    pub site_id: String,
    columns: BTreeMap<String, Vec<String>>,
    rows: usize,
}

impl MeasurementTable {
    pub fn column(&self, name: &str) -> Result<&[String], RcError> {
        self.columns.get(name).map(|v| v.as_slice()).ok_or_else(|| {
            RcError::Geometry(format!(
                "measurements for site {} have no '{}' column",
                self.site_id, name
            ))
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }
}

/// Parses an RDB measurement table. The row after the header (column
/// widths/types, e.g. `5s	15s	...`) is discarded. Short data rows are
/// padded with empty cells.
pub fn parse_measurements(site_id: &str, text: &str) -> Result<MeasurementTable, RcError> {
    let mut lines = text
        .lines()
        .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
        .map(|line| line.split('\t').map(|s| s.trim().to_string()).collect::<Vec<_>>());

    let header = lines
        .next()
        .ok_or_else(|| RcError::NoRatingData(site_id.to_string()))?;
    lines
        .next()
        .ok_or_else(|| RcError::NoRatingData(site_id.to_string()))?;

    let data: Vec<Vec<String>> = lines.collect();

    let mut columns = BTreeMap::new();
    for (j, key) in header.iter().enumerate() {
        let values = data
            .iter()
            .map(|row| row.get(j).cloned().unwrap_or_default())
            .collect();
        columns.insert(key.clone(), values);
    }

    Ok(MeasurementTable {
        site_id: site_id.to_string(),
        columns,
        rows: data.len(),
    })
}

/// Fetches and parses the field measurements for one site.
pub fn fetch_measurements(
    fetcher: &dyn TextFetcher,
    url_template: &str,
    site_id: &str,
) -> Result<MeasurementTable, RcError> {
    let url = build_site_url(url_template, site_id);
    logging::debug(DataSource::Nwis, Some(site_id), &format!("GET {}", url));

    let text = fetcher.get_text(&url)?;
    parse_measurements(site_id, &text)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
