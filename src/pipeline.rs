//! Batch driver.
//!
//! Each reach id is analyzed independently: load the HAND records, resolve
//! the USGS sites, fetch the observed ratings, then emit the configured
//! products. Failures are typed per reach so one bad reach never hides the
//! rest of the batch.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::analysis::roughness::optimize_n;
use crate::analysis::xsect::{model_cross_section, observed_cross_section};
use crate::config::{Config, CrosswalkConfig, HandConfig, NwisConfig, Product};
use crate::ingest::hand::{
    ArrayDataset, check_axes, load_hydraulic_properties, load_model_rating_curve, open_dataset,
};
use crate::ingest::nwis::{TextFetcher, fetch_measurements, fetch_observed_rating};
use crate::ingest::tables::{Crosswalk, RowIndex};
use crate::logging::{self, DataSource};
use crate::model::{
    AxisAgreement, ErrorClass, HydraulicProperties, ModelRatingCurve, ObservedRating, RcError,
    ReachId, RoughnessSample,
};
use crate::plot::{self, PlotTarget, RatingPlotOptions};

// ============================================================================
// Inputs
// ============================================================================

/// The local inputs shared by every reach in a batch.
pub struct Sources {
    pub properties: Box<dyn ArrayDataset>,
    pub properties_index: RowIndex,
    pub curves: Box<dyn ArrayDataset>,
    pub curves_index: RowIndex,
    pub crosswalk: Crosswalk,
}

impl Sources {
    pub fn open(hand: &HandConfig, crosswalk: &CrosswalkConfig) -> Result<Self, RcError> {
        Ok(Sources {
            properties: open_dataset(&hand.properties)?,
            properties_index: RowIndex::from_path(&hand.properties_index)?,
            curves: open_dataset(&hand.curves)?,
            curves_index: RowIndex::from_path(&hand.curves_index)?,
            crosswalk: Crosswalk::from_path(&crosswalk.path)?,
        })
    }

    /// The configured reach ids, or every reach in the crosswalk.
    pub fn batch_reach_ids(&self, configured: &[ReachId]) -> Vec<ReachId> {
        if configured.is_empty() {
            self.crosswalk.reach_ids()
        } else {
            configured.to_vec()
        }
    }
}

// ============================================================================
// Per-reach analysis
// ============================================================================

/// Everything known about one reach before any product is emitted.
#[derive(Debug, Clone)]
pub struct ReachAnalysis {
    pub reach_id: ReachId,
    pub properties: HydraulicProperties,
    pub curve: ModelRatingCurve,
    pub axes: AxisAgreement,
    pub site_ids: Vec<String>,
    pub observed: Vec<ObservedRating>,
}

impl ReachAnalysis {
    /// Local lookups (index tables, array files, crosswalk) happen before
    /// the first network request.
    pub fn load(
        reach_id: ReachId,
        sources: &Sources,
        fetcher: &dyn TextFetcher,
        nwis: &NwisConfig,
    ) -> Result<Self, RcError> {
        let properties =
            load_hydraulic_properties(sources.properties.as_ref(), &sources.properties_index, reach_id)?;
        let curve = load_model_rating_curve(sources.curves.as_ref(), &sources.curves_index, reach_id)?;
        let site_ids = sources.crosswalk.site_ids(reach_id)?;
        let axes = check_axes(&properties, &curve);

        let observed = site_ids
            .iter()
            .map(|site| fetch_observed_rating(fetcher, &nwis.rating_url, site))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ReachAnalysis {
            reach_id,
            properties,
            curve,
            axes,
            site_ids,
            observed,
        })
    }
}

fn product_path(output_dir: &Path, product: Product, reach_id: ReachId) -> PathBuf {
    let ext = match product {
        Product::Xsect | Product::Rating => "svg",
        Product::Roughness => "csv",
    };
    output_dir.join(format!("{}_{}.{}", product, reach_id, ext))
}

#[derive(Serialize)]
struct RoughnessRow {
    height_ft: f64,
    discharge_cfs: f64,
    mannings_n: f64,
}

/// Writes roughness samples as `height_ft,discharge_cfs,mannings_n`.
pub fn write_roughness<W: Write>(writer: W, samples: &[RoughnessSample]) -> Result<(), RcError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for s in samples {
        wtr.serialize(RoughnessRow {
            height_ft: s.height_ft,
            discharge_cfs: s.discharge_cfs,
            mannings_n: s.n,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Emits the configured products for a loaded reach.
fn emit_products(
    analysis: &ReachAnalysis,
    fetcher: &dyn TextFetcher,
    config: &Config,
) -> Result<(Vec<String>, Vec<RoughnessSample>), RcError> {
    let reach_id = analysis.reach_id;
    let out = &config.run.output_dir;
    let size = (config.plot.width, config.plot.height);
    let mut products = Vec::new();
    let mut roughness = Vec::new();

    if config.run.wants(Product::Xsect) {
        let limits =
            plot::xsect_limits(&analysis.properties, config.plot.xsect_limit_stage_index)?;
        let mut observed = Vec::new();
        if config.plot.show_observed {
            for site in &analysis.site_ids {
                let table = fetch_measurements(fetcher, &config.nwis.measurements_url, site)?;
                observed.push(observed_cross_section(&table)?);
            }
        }
        let model = model_cross_section(&analysis.properties);
        let path = product_path(out, Product::Xsect, reach_id);
        plot::draw_xsect(
            reach_id,
            config.plot.show_model.then_some(&model),
            &observed,
            limits,
            size,
            &PlotTarget::File(path.clone()),
        )?;
        products.push(path.display().to_string());
    }

    if config.run.wants(Product::Rating) {
        let path = product_path(out, Product::Rating, reach_id);
        let options = RatingPlotOptions {
            kind: config.plot.kind,
            show_model: config.plot.show_model,
            show_observed: config.plot.show_observed,
        };
        plot::plot_rc(
            &analysis.curve,
            &analysis.observed,
            options,
            size,
            &PlotTarget::File(path.clone()),
        )?;
        products.push(path.display().to_string());
    }

    if config.run.wants(Product::Roughness) {
        roughness = optimize_n(&analysis.properties, &analysis.observed)?;
        let path = product_path(out, Product::Roughness, reach_id);
        write_roughness(fs::File::create(&path)?, &roughness)?;
        products.push(path.display().to_string());
    }

    Ok((products, roughness))
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ReachStatus {
    Completed {
        sites: Vec<String>,
        axes: AxisAgreement,
        products: Vec<String>,
        roughness: Vec<RoughnessSample>,
    },
    Skipped {
        class: ErrorClass,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReachOutcome {
    pub reach_id: ReachId,
    pub status: ReachStatus,
}

impl ReachOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, ReachStatus::Completed { .. })
    }
}

/// Loads one reach and emits its products.
pub fn run_reach(
    reach_id: ReachId,
    sources: &Sources,
    fetcher: &dyn TextFetcher,
    config: &Config,
) -> Result<ReachOutcome, RcError> {
    let analysis = ReachAnalysis::load(reach_id, sources, fetcher, &config.nwis)?;
    let (products, roughness) = emit_products(&analysis, fetcher, config)?;

    Ok(ReachOutcome {
        reach_id,
        status: ReachStatus::Completed {
            sites: analysis.site_ids,
            axes: analysis.axes,
            products,
            roughness,
        },
    })
}

// ============================================================================
// Batch
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub timestamp: String,
    pub outcomes: Vec<ReachOutcome>,
    pub summary: BatchSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub skipped_geometry: usize,
    pub skipped_lookup: usize,
    pub skipped_other: usize,
}

impl BatchSummary {
    fn from_outcomes(outcomes: &[ReachOutcome]) -> Self {
        let mut summary = BatchSummary {
            total: outcomes.len(),
            completed: 0,
            skipped_geometry: 0,
            skipped_lookup: 0,
            skipped_other: 0,
        };
        for outcome in outcomes {
            match &outcome.status {
                ReachStatus::Completed { .. } => summary.completed += 1,
                ReachStatus::Skipped { class: ErrorClass::Geometry, .. } => {
                    summary.skipped_geometry += 1
                }
                ReachStatus::Skipped { class: ErrorClass::Lookup, .. } => {
                    summary.skipped_lookup += 1
                }
                ReachStatus::Skipped { class: ErrorClass::Unclassified, .. } => {
                    summary.skipped_other += 1
                }
            }
        }
        summary
    }

    pub fn skipped(&self) -> usize {
        self.skipped_geometry + self.skipped_lookup + self.skipped_other
    }
}

/// Runs every reach in order. XS and RC failures skip the reach; other
/// failures skip it too unless `run.abort_on_unclassified` is set, in
/// which case the batch stops with that error.
pub fn run_batch(
    reach_ids: &[ReachId],
    sources: &Sources,
    fetcher: &dyn TextFetcher,
    config: &Config,
) -> Result<BatchReport, RcError> {
    fs::create_dir_all(&config.run.output_dir)?;

    let mut outcomes = Vec::with_capacity(reach_ids.len());
    for &reach_id in reach_ids {
        logging::info(
            DataSource::System,
            None,
            &format!("Retrieving data for COMID {}...", reach_id),
        );

        match run_reach(reach_id, sources, fetcher, config) {
            Ok(outcome) => {
                logging::info(
                    DataSource::System,
                    None,
                    &format!("COMID {} collected successfully", reach_id),
                );
                outcomes.push(outcome);
            }
            Err(e) => {
                logging::log_reach_failure(reach_id, "analysis", &e);
                let class = e.class();
                if class == ErrorClass::Unclassified && config.run.abort_on_unclassified {
                    return Err(e);
                }
                outcomes.push(ReachOutcome {
                    reach_id,
                    status: ReachStatus::Skipped {
                        class,
                        message: e.to_string(),
                    },
                });
            }
        }
    }

    let summary = BatchSummary::from_outcomes(&outcomes);
    logging::log_batch_summary(summary.total, summary.completed, summary.skipped());

    Ok(BatchReport {
        timestamp: Utc::now().to_rfc3339(),
        outcomes,
        summary,
    })
}

/// Writes `report.json` into `output_dir`.
pub fn write_report(report: &BatchReport, output_dir: &Path) -> Result<PathBuf, RcError> {
    let path = output_dir.join("report.json");
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    fs::write(&path, json)?;
    Ok(path)
}

pub fn print_summary(report: &BatchReport) {
    let s = &report.summary;
    println!("\n═══════════════════════════════════════════════════════════");
    println!("📊 RATING CURVE COMPARISON SUMMARY");
    println!("═══════════════════════════════════════════════════════════");
    println!();
    println!("Reaches analyzed:  {}/{}", s.completed, s.total);
    println!("XS errors:         {}", s.skipped_geometry);
    println!("RC errors:         {}", s.skipped_lookup);
    println!("Other errors:      {}", s.skipped_other);
    println!();

    for outcome in &report.outcomes {
        match &outcome.status {
            ReachStatus::Completed { sites, products, .. } => println!(
                "   ✓ COMID {}  sites [{}]  {} product(s)",
                outcome.reach_id,
                sites.join(", "),
                products.len()
            ),
            ReachStatus::Skipped { class, message } => {
                println!("   ✗ COMID {} {}: {}", outcome.reach_id, class, message)
            }
        }
    }
    println!("═══════════════════════════════════════════════════════════");
}
