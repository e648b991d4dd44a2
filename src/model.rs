/// Core data types for the HAND vs. USGS rating curve comparison.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no I/O: reach records, observed ratings, cross-sections,
/// roughness samples, and the error types every stage of the pipeline returns.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Unit conversion
// ---------------------------------------------------------------------------

/// Feet per meter.
pub const FT_PER_M: f64 = 3.28084;

/// Square feet per square meter.
pub const SQFT_PER_SQM: f64 = FT_PER_M * FT_PER_M;

/// Observed rating rows below this discharge (cfs) are dropped.
pub const MIN_OBSERVED_DISCHARGE_CFS: f64 = 1.0;

/// NHDPlus COMID identifying a modeled stream reach.
pub type ReachId = i64;

// ---------------------------------------------------------------------------
// Model (HAND) records
// ---------------------------------------------------------------------------

/// Hydraulic properties for one reach, converted to US customary units.
///
/// Every per-step array has the length of `stage_ft`, the geometry stage
/// axis shared by all reaches in the properties file.
#[derive(Debug, Clone, PartialEq)]
pub struct HydraulicProperties {
    pub reach_id: ReachId,
    /// Wet area per stage step, sqft.
    pub wet_area_sqft: Vec<f64>,
    /// Hydraulic radius per stage step, ft.
    pub hydraulic_radius_ft: Vec<f64>,
    /// Bed slope, unitless.
    pub slope: f64,
    /// Channel length, ft.
    pub length_ft: f64,
    /// Channel top width per stage step, ft.
    pub width_ft: Vec<f64>,
    /// Geometry stage axis, ft, rounded to the nearest integer foot.
    pub stage_ft: Vec<f64>,
}

/// HAND rating curve for one reach.
///
/// `height_ft` comes from the rating-curve file, not from the properties
/// file. It is a separate axis from `HydraulicProperties::stage_ft`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRatingCurve {
    pub reach_id: ReachId,
    pub discharge_cfs: Vec<f64>,
    pub height_ft: Vec<f64>,
}

/// How the geometry stage axis relates to the rating-curve height axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AxisAgreement {
    /// Same length and every value within half a foot.
    Aligned,
    /// Same length, values diverge; `max_diff_ft` is the largest gap.
    Offset { max_diff_ft: f64 },
    /// Different lengths; positional pairing is meaningless.
    LengthMismatch { geometry: usize, rating: usize },
}

impl AxisAgreement {
    pub fn between(geometry_stage_ft: &[f64], rating_height_ft: &[f64]) -> Self {
        if geometry_stage_ft.len() != rating_height_ft.len() {
            return AxisAgreement::LengthMismatch {
                geometry: geometry_stage_ft.len(),
                rating: rating_height_ft.len(),
            };
        }
        let max_diff_ft = geometry_stage_ft
            .iter()
            .zip(rating_height_ft)
            .map(|(g, r)| (g - r).abs())
            .fold(0.0, f64::max);
        if max_diff_ft <= 0.5 {
            AxisAgreement::Aligned
        } else {
            AxisAgreement::Offset { max_diff_ft }
        }
    }
}

// ---------------------------------------------------------------------------
// Observed (USGS) records
// ---------------------------------------------------------------------------

/// Observed stage-discharge series for one USGS site, datum-aligned so the
/// first retained sample reads zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedRating {
    /// 8-digit USGS site number.
    pub site_id: String,
    pub height_ft: Vec<f64>,
    pub discharge_cfs: Vec<f64>,
}

/// Mirrored cross-section path: negative side, origin, positive side.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossSection {
    pub label: String,
    /// (width ft, height ft) vertices in drawing order.
    pub points: Vec<(f64, f64)>,
}

/// One back-calculated roughness value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoughnessSample {
    pub height_ft: f64,
    pub discharge_cfs: f64,
    pub n: f64,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// The two failure kinds the batch driver recognizes, plus everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Malformed or missing geometry / cross-section data ("XS Error").
    Geometry,
    /// The reach id could not be resolved to rating data ("RC Error").
    Lookup,
    /// Network, parse, I/O and other failures.
    Unclassified,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Geometry => write!(f, "XS Error"),
            ErrorClass::Lookup => write!(f, "RC Error"),
            ErrorClass::Unclassified => write!(f, "Error"),
        }
    }
}

/// Errors raised while fitting a curve.
#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    LengthMismatch { xs: usize, ys: usize },
    InsufficientSamples { needed: usize, got: usize },
    /// A log was requested of a value <= 0.
    NonPositiveSample { x: f64, y: f64 },
    /// Interpolants require strictly increasing x after sorting.
    DuplicateX(f64),
    NonFinite,
    OutOfDomain { x: f64, min: f64, max: f64 },
}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitError::LengthMismatch { xs, ys } => {
                write!(f, "x and y lengths differ ({} vs {})", xs, ys)
            }
            FitError::InsufficientSamples { needed, got } => {
                write!(f, "need at least {} samples, got {}", needed, got)
            }
            FitError::NonPositiveSample { x, y } => {
                write!(f, "power-law fit needs positive samples, got ({}, {})", x, y)
            }
            FitError::DuplicateX(x) => write!(f, "duplicate x value {}", x),
            FitError::NonFinite => write!(f, "samples contain NaN or infinity"),
            FitError::OutOfDomain { x, min, max } => {
                write!(f, "{} is outside the sampled domain [{}, {}]", x, min, max)
            }
        }
    }
}

impl std::error::Error for FitError {}

/// Errors that can arise while assembling or analyzing one reach.
#[derive(Debug)]
pub enum RcError {
    /// The reach id has no row in an index table.
    IndexMissing { table: String, reach_id: ReachId },
    /// The reach id appears more than once in an index table.
    IndexDuplicate { table: String, reach_id: ReachId, rows: usize },
    /// The `COMID` stored at the indexed row is a different reach.
    StaleIndex { dataset: String, row: usize, expected: ReachId, found: ReachId },
    /// The reach id has no USGS site in the crosswalk.
    NoObservationSite(ReachId),
    /// A USGS site yielded no usable rating rows.
    NoObservedData(String),
    /// A site's measurements carry no rating identifier at all.
    NoRatingData(String),
    /// A model array has the wrong length or shape.
    Geometry(String),
    /// Non-2xx HTTP response.
    Http { url: String, status: u16 },
    /// Transport-level request failure.
    Request(String),
    /// Text could not be parsed.
    Parse(String),
    /// Array-data file failure.
    Dataset(String),
    Fit(FitError),
    Plot(String),
    Config(String),
    Io(std::io::Error),
}

impl RcError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RcError::IndexMissing { .. }
            | RcError::IndexDuplicate { .. }
            | RcError::NoObservationSite(_)
            | RcError::NoObservedData(_) => ErrorClass::Lookup,
            RcError::StaleIndex { dataset, .. } => {
                if dataset == crate::ingest::hand::CURVES_DATASET {
                    ErrorClass::Lookup
                } else {
                    ErrorClass::Geometry
                }
            }
            RcError::NoRatingData(_) | RcError::Geometry(_) => ErrorClass::Geometry,
            RcError::Http { .. }
            | RcError::Request(_)
            | RcError::Parse(_)
            | RcError::Dataset(_)
            | RcError::Fit(_)
            | RcError::Plot(_)
            | RcError::Config(_)
            | RcError::Io(_) => ErrorClass::Unclassified,
        }
    }
}

impl std::fmt::Display for RcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RcError::IndexMissing { table, reach_id } => {
                write!(f, "COMID {} not found in index {}", reach_id, table)
            }
            RcError::IndexDuplicate { table, reach_id, rows } => {
                write!(f, "COMID {} appears {} times in index {}", reach_id, rows, table)
            }
            RcError::StaleIndex { dataset, row, expected, found } => write!(
                f,
                "Stale index for {}: row {} holds COMID {}, expected {}",
                dataset, row, found, expected
            ),
            RcError::NoObservationSite(reach_id) => {
                write!(f, "No USGS site mapped to COMID {}", reach_id)
            }
            RcError::NoObservedData(site) => write!(f, "No observed rating data for site {}", site),
            RcError::NoRatingData(site) => write!(f, "No rating data for site {}", site),
            RcError::Geometry(msg) => write!(f, "Geometry error: {}", msg),
            RcError::Http { url, status } => write!(f, "HTTP error: {} from {}", status, url),
            RcError::Request(msg) => write!(f, "Request failed: {}", msg),
            RcError::Parse(msg) => write!(f, "Parse error: {}", msg),
            RcError::Dataset(msg) => write!(f, "Dataset error: {}", msg),
            RcError::Fit(e) => write!(f, "Fit error: {}", e),
            RcError::Plot(msg) => write!(f, "Plot error: {}", msg),
            RcError::Config(msg) => write!(f, "Config error: {}", msg),
            RcError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for RcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RcError::Fit(e) => Some(e),
            RcError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RcError {
    fn from(e: std::io::Error) -> Self {
        RcError::Io(e)
    }
}

impl From<FitError> for RcError {
    fn from(e: FitError) -> Self {
        RcError::Fit(e)
    }
}

impl From<csv::Error> for RcError {
    fn from(e: csv::Error) -> Self {
        RcError::Parse(format!("csv: {}", e))
    }
}

impl From<toml::de::Error> for RcError {
    fn from(e: toml::de::Error) -> Self {
        RcError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for RcError {
    fn from(e: reqwest::Error) -> Self {
        match (e.status(), e.url()) {
            (Some(status), Some(url)) => RcError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            },
            _ => RcError::Request(e.to_string()),
        }
    }
}
