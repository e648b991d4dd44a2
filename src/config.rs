/// Run configuration.
///
/// Everything a batch run needs (file locations, reach ids, endpoints,
/// plot options) is read from one TOML file. Every section and field is
/// optional; missing values take the defaults below.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::fit::FitKind;
use crate::ingest::nwis::{DEFAULT_MEASUREMENTS_URL, DEFAULT_RATING_URL};
use crate::logging::LogLevel;
use crate::model::{RcError, ReachId};

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "HAND_RC_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "./hand_rc.toml";

/// Products a reach analysis can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Product {
    /// Cross-section overlay (SVG)
    Xsect,
    /// Rating curve overlay (SVG)
    Rating,
    /// Manning n table (CSV)
    Roughness,
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Product::Xsect => write!(f, "xsect"),
            Product::Rating => write!(f, "rating"),
            Product::Roughness => write!(f, "roughness"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hand: HandConfig,
    pub crosswalk: CrosswalkConfig,
    pub nwis: NwisConfig,
    pub run: RunConfig,
    pub plot: PlotConfig,
    pub logging: LoggingConfig,
}

/// HAND array files and their row-index tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandConfig {
    pub curves: PathBuf,
    pub curves_index: PathBuf,
    pub properties: PathBuf,
    pub properties_index: PathBuf,
}

impl Default for HandConfig {
    fn default() -> Self {
        HandConfig {
            curves: PathBuf::from("data/handratingcurves.nc"),
            curves_index: PathBuf::from("data/handrc_idx.csv"),
            properties: PathBuf::from("data/hydroprop.nc"),
            properties_index: PathBuf::from("data/handnc_idx.csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrosswalkConfig {
    /// CSV with `SOURCE_FEA` (USGS site) and `FLComID` (reach id) columns.
    pub path: PathBuf,
}

impl Default for CrosswalkConfig {
    fn default() -> Self {
        CrosswalkConfig {
            path: PathBuf::from("data/streamgages.csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NwisConfig {
    /// Rating table endpoint; `{site}` is replaced by the site number.
    pub rating_url: String,
    /// Field measurement endpoint; `{site}` is replaced by the site number.
    pub measurements_url: String,
    pub timeout_secs: u64,
}

impl Default for NwisConfig {
    fn default() -> Self {
        NwisConfig {
            rating_url: DEFAULT_RATING_URL.to_string(),
            measurements_url: DEFAULT_MEASUREMENTS_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Reaches to analyze. Empty means every reach in the crosswalk.
    pub reach_ids: Vec<ReachId>,
    pub output_dir: PathBuf,
    pub products: Vec<Product>,
    /// Stop the batch on the first failure outside the XS / RC classes.
    pub abort_on_unclassified: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            reach_ids: Vec::new(),
            output_dir: PathBuf::from("results"),
            products: vec![Product::Xsect, Product::Rating, Product::Roughness],
            abort_on_unclassified: false,
        }
    }
}

impl RunConfig {
    pub fn wants(&self, product: Product) -> bool {
        self.products.contains(&product)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub kind: FitKind,
    /// Clamp cross-section axes to this geometry stage step.
    pub xsect_limit_stage_index: Option<usize>,
    pub show_model: bool,
    pub show_observed: bool,
    pub width: u32,
    pub height: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        PlotConfig {
            kind: FitKind::Power,
            xsect_limit_stage_index: None,
            show_model: true,
            show_observed: true,
            width: 2000,
            height: 1600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: None,
            timestamps: false,
        }
    }
}

impl LoggingConfig {
    pub fn min_level(&self) -> Result<LogLevel, RcError> {
        self.level.parse().map_err(RcError::Config)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parses a config document.
pub fn parse_config(text: &str) -> Result<Config, RcError> {
    let config: Config = toml::from_str(text)?;
    config.logging.min_level()?;
    if config.nwis.timeout_secs == 0 {
        return Err(RcError::Config("nwis.timeout_secs must be positive".to_string()));
    }
    Ok(config)
}

/// Reads and parses a config file.
pub fn load_config(path: &Path) -> Result<Config, RcError> {
    let text = fs::read_to_string(path).map_err(|e| {
        RcError::Config(format!("could not read {}: {}", path.display(), e))
    })?;
    parse_config(&text)
}

/// Config path from `HAND_RC_CONFIG` (a `.env` file is honored), or
/// `./hand_rc.toml`.
pub fn config_path() -> PathBuf {
    dotenv::dotenv().ok();
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = parse_config("").expect("empty config is valid");
        assert_eq!(config, Config::default());
        assert_eq!(config.nwis.timeout_secs, 30);
        assert_eq!(config.run.output_dir, PathBuf::from("results"));
        assert!(config.run.reach_ids.is_empty());
        assert!(!config.run.abort_on_unclassified);
        assert_eq!(config.plot.kind, FitKind::Power);
        assert_eq!((config.plot.width, config.plot.height), (2000, 1600));
        assert!(config.plot.xsect_limit_stage_index.is_none());
    }

    #[test]
    fn test_default_products_are_all_three() {
        let run = RunConfig::default();
        assert!(run.wants(Product::Xsect));
        assert!(run.wants(Product::Rating));
        assert!(run.wants(Product::Roughness));
    }

    #[test]
    fn test_partial_document_overrides_only_named_fields() {
        let config = parse_config(
            r#"
[hand]
curves = "oniondata/handratingcurves.nc"

[run]
reach_ids = [5781373, 5781407]
products = ["roughness"]

[plot]
kind = "cubic"
xsect_limit_stage_index = 11
show_observed = false

[logging]
level = "debug"
"#,
        )
        .expect("config should parse");

        assert_eq!(config.hand.curves, PathBuf::from("oniondata/handratingcurves.nc"));
        assert_eq!(config.hand.curves_index, HandConfig::default().curves_index);
        assert_eq!(config.run.reach_ids, vec![5781373, 5781407]);
        assert!(config.run.wants(Product::Roughness));
        assert!(!config.run.wants(Product::Xsect));
        assert_eq!(config.plot.kind, FitKind::Cubic);
        assert_eq!(config.plot.xsect_limit_stage_index, Some(11));
        assert!(config.plot.show_model);
        assert!(!config.plot.show_observed);
        assert_eq!(config.logging.min_level().unwrap(), LogLevel::Debug);
    }

    #[test]
    fn test_unknown_fit_kind_is_config_error() {
        let err = parse_config("[plot]\nkind = \"spline\"\n").unwrap_err();
        assert!(matches!(err, RcError::Config(_)), "got {:?}", err);
    }

    #[test]
    fn test_bad_log_level_is_config_error() {
        let err = parse_config("[logging]\nlevel = \"loud\"\n").unwrap_err();
        assert!(matches!(err, RcError::Config(_)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(parse_config("[nwis]\ntimeout_secs = 0\n").is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = load_config(Path::new("/nonexistent/hand_rc.toml")).unwrap_err();
        assert!(matches!(err, RcError::Config(_)));
    }
}
