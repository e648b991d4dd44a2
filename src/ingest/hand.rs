/// HAND array-file access.
///
/// The hydraulic-properties file holds per-reach geometry (`WetArea`,
/// `HydraulicRadius`, `Width` by stage step; `Slope`, `Length` scalars)
/// and a `StageHeight` axis shared by every reach, all in SI units. The
/// rating-curve file holds `Q_cfs` by stage step and a shared `H_ft` axis.
/// Both carry a `COMID` variable used to detect stale row-index tables.
///
/// Files are read through the `ArrayDataset` trait. The NetCDF reader is
/// compiled with the `netcdf` feature; `MemoryDataset` backs tests.

use std::collections::HashMap;
use std::path::Path;

use crate::ingest::tables::RowIndex;
use crate::logging::{self, DataSource};
use crate::model::{
    AxisAgreement, FT_PER_M, HydraulicProperties, ModelRatingCurve, RcError, ReachId,
    SQFT_PER_SQM,
};

/// Dataset label used in errors raised against the properties file.
pub const PROPERTIES_DATASET: &str = "HAND hydraulic properties";

/// Dataset label used in errors raised against the rating-curve file.
pub const CURVES_DATASET: &str = "HAND rating curves";

// ---------------------------------------------------------------------------
// Dataset seam
// ---------------------------------------------------------------------------

/// Read-only access to named numeric variables, indexed by first dimension.
pub trait ArrayDataset {
    /// Every value of `var`, flattened in row-major order.
    fn values(&self, var: &str) -> Result<Vec<f64>, RcError>;

    /// The slice of `var` at first-dimension index `row`. For a 1-D
    /// variable this is a single value.
    fn row(&self, var: &str, row: usize) -> Result<Vec<f64>, RcError>;
}

/// Single value of a 1-D variable at `row`.
pub fn scalar_at(ds: &dyn ArrayDataset, var: &str, row: usize) -> Result<f64, RcError> {
    match ds.row(var, row)?.as_slice() {
        [value] => Ok(*value),
        other => Err(RcError::Geometry(format!(
            "{} is not a scalar per row ({} values at row {})",
            var,
            other.len(),
            row
        ))),
    }
}

/// In-memory dataset: variable name -> (shape, row-major data).
#[derive(Debug, Clone, Default)]
pub struct MemoryDataset {
    variables: HashMap<String, (Vec<usize>, Vec<f64>)>,
}

impl MemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable. Panics if `data` does not fill `shape`.
    pub fn with_variable(mut self, name: &str, shape: &[usize], data: Vec<f64>) -> Self {
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "data for {} does not match shape {:?}",
            name,
            shape
        );
        self.variables
            .insert(name.to_string(), (shape.to_vec(), data));
        self
    }

    fn variable(&self, var: &str) -> Result<&(Vec<usize>, Vec<f64>), RcError> {
        self.variables
            .get(var)
            .ok_or_else(|| RcError::Dataset(format!("variable {} not found", var)))
    }
}

impl ArrayDataset for MemoryDataset {
    fn values(&self, var: &str) -> Result<Vec<f64>, RcError> {
        Ok(self.variable(var)?.1.clone())
    }

    fn row(&self, var: &str, row: usize) -> Result<Vec<f64>, RcError> {
        let (shape, data) = self.variable(var)?;
        let rows = shape.first().copied().unwrap_or(0);
        if row >= rows {
            return Err(RcError::Dataset(format!(
                "row {} out of range for {} ({} rows)",
                row, var, rows
            )));
        }
        let width: usize = shape[1..].iter().product();
        Ok(data[row * width..(row + 1) * width].to_vec())
    }
}

#[cfg(feature = "netcdf")]
mod nc {
    use super::ArrayDataset;
    use crate::model::RcError;
    use std::path::Path;

    /// NetCDF-backed dataset.
    pub struct NetcdfDataset {
        path: String,
        file: netcdf::File,
    }

    impl NetcdfDataset {
        pub fn open(path: &Path) -> Result<Self, RcError> {
            let file = netcdf::open(path)
                .map_err(|e| RcError::Dataset(format!("{}: {}", path.display(), e)))?;
            Ok(NetcdfDataset {
                path: path.display().to_string(),
                file,
            })
        }

        fn variable(&self, var: &str) -> Result<netcdf::Variable<'_>, RcError> {
            self.file
                .variable(var)
                .ok_or_else(|| RcError::Dataset(format!("{}: variable {} not found", self.path, var)))
        }

        fn wrap(&self, var: &str, e: netcdf::Error) -> RcError {
            RcError::Dataset(format!("{}: reading {}: {}", self.path, var, e))
        }
    }

    impl ArrayDataset for NetcdfDataset {
        fn values(&self, var: &str) -> Result<Vec<f64>, RcError> {
            self.variable(var)?
                .get_values::<f64, _>(..)
                .map_err(|e| self.wrap(var, e))
        }

        fn row(&self, var: &str, row: usize) -> Result<Vec<f64>, RcError> {
            let variable = self.variable(var)?;
            let dims = variable.dimensions();
            let rows = dims.first().map(|d| d.len()).unwrap_or(0);
            if row >= rows {
                return Err(RcError::Dataset(format!(
                    "{}: row {} out of range for {} ({} rows)",
                    self.path, row, var, rows
                )));
            }
            let values = match dims.len() {
                1 => variable.get_values::<f64, _>(row..row + 1),
                2 => variable.get_values::<f64, _>((row, ..)),
                n => {
                    return Err(RcError::Dataset(format!(
                        "{}: {} has {} dimensions, expected 1 or 2",
                        self.path, var, n
                    )));
                }
            };
            values.map_err(|e| self.wrap(var, e))
        }
    }
}

#[cfg(feature = "netcdf")]
pub use nc::NetcdfDataset;

/// Opens an array-data file.
pub fn open_dataset(path: &Path) -> Result<Box<dyn ArrayDataset>, RcError> {
    #[cfg(feature = "netcdf")]
    {
        Ok(Box::new(NetcdfDataset::open(path)?))
    }
    #[cfg(not(feature = "netcdf"))]
    {
        Err(RcError::Dataset(format!(
            "{}: built without the `netcdf` feature (rebuild with --features netcdf)",
            path.display()
        )))
    }
}

// ---------------------------------------------------------------------------
// Unit handling
// ---------------------------------------------------------------------------

pub fn meters_to_feet(values: &[f64]) -> Vec<f64> {
    values.iter().map(|v| v * FT_PER_M).collect()
}

pub fn sqmeters_to_sqfeet(values: &[f64]) -> Vec<f64> {
    values.iter().map(|v| v * SQFT_PER_SQM).collect()
}

/// Rounds to whole feet, half-to-even.
pub fn round_feet(values_ft: &[f64]) -> Vec<f64> {
    values_ft.iter().map(|v| v.round_ties_even()).collect()
}

/// Converts the shared stage axis from meters and rounds to whole feet.
pub fn stage_axis_ft(stage_m: &[f64]) -> Vec<f64> {
    round_feet(&meters_to_feet(stage_m))
}

// ---------------------------------------------------------------------------
// Loaders
// ---------------------------------------------------------------------------

fn check_comid(
    ds: &dyn ArrayDataset,
    dataset: &str,
    row: usize,
    reach_id: ReachId,
) -> Result<(), RcError> {
    let found = scalar_at(ds, "COMID", row)?.round() as ReachId;
    if found != reach_id {
        return Err(RcError::StaleIndex {
            dataset: dataset.to_string(),
            row,
            expected: reach_id,
            found,
        });
    }
    Ok(())
}

fn expect_len(var: &str, values: &[f64], expected: usize) -> Result<(), RcError> {
    if values.len() != expected {
        return Err(RcError::Geometry(format!(
            "{} has {} steps, stage axis has {}",
            var,
            values.len(),
            expected
        )));
    }
    Ok(())
}

/// Loads and converts the hydraulic properties of `reach_id`.
pub fn load_hydraulic_properties(
    ds: &dyn ArrayDataset,
    index: &RowIndex,
    reach_id: ReachId,
) -> Result<HydraulicProperties, RcError> {
    let row = index.row_for(reach_id)?;
    check_comid(ds, PROPERTIES_DATASET, row, reach_id)?;

    let stage_ft = stage_axis_ft(&ds.values("StageHeight")?);
    let wet_area_sqft = sqmeters_to_sqfeet(&ds.row("WetArea", row)?);
    let hydraulic_radius_ft = meters_to_feet(&ds.row("HydraulicRadius", row)?);
    let width_ft = meters_to_feet(&ds.row("Width", row)?);
    let slope = scalar_at(ds, "Slope", row)?;
    let length_ft = scalar_at(ds, "Length", row)? * FT_PER_M;

    expect_len("WetArea", &wet_area_sqft, stage_ft.len())?;
    expect_len("HydraulicRadius", &hydraulic_radius_ft, stage_ft.len())?;
    expect_len("Width", &width_ft, stage_ft.len())?;

    Ok(HydraulicProperties {
        reach_id,
        wet_area_sqft,
        hydraulic_radius_ft,
        slope,
        length_ft,
        width_ft,
        stage_ft,
    })
}

/// Loads the HAND rating curve of `reach_id`. The height axis is the file's
/// shared `H_ft` variable, already in feet.
pub fn load_model_rating_curve(
    ds: &dyn ArrayDataset,
    index: &RowIndex,
    reach_id: ReachId,
) -> Result<ModelRatingCurve, RcError> {
    let row = index.row_for(reach_id)?;
    check_comid(ds, CURVES_DATASET, row, reach_id)?;

    let discharge_cfs = ds.row("Q_cfs", row)?;
    let height_ft = ds.values("H_ft")?;
    if discharge_cfs.len() != height_ft.len() {
        return Err(RcError::Geometry(format!(
            "Q_cfs has {} steps, H_ft has {}",
            discharge_cfs.len(),
            height_ft.len()
        )));
    }

    Ok(ModelRatingCurve {
        reach_id,
        discharge_cfs,
        height_ft,
    })
}

/// Compares the two model-side height axes and logs any divergence.
pub fn check_axes(props: &HydraulicProperties, curve: &ModelRatingCurve) -> AxisAgreement {
    let agreement = AxisAgreement::between(&props.stage_ft, &curve.height_ft);
    let reach = props.reach_id.to_string();
    match agreement {
        AxisAgreement::Aligned => {}
        AxisAgreement::Offset { max_diff_ft } => logging::warn(
            DataSource::Hand,
            Some(reach.as_str()),
            &format!(
                "StageHeight and H_ft axes diverge by up to {:.2} ft",
                max_diff_ft
            ),
        ),
        AxisAgreement::LengthMismatch { geometry, rating } => logging::warn(
            DataSource::Hand,
            Some(reach.as_str()),
            &format!(
                "StageHeight has {} steps but H_ft has {}; curves are paired by their own axes",
                geometry, rating
            ),
        ),
    }
    agreement
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::ErrorClass;
    use approx::assert_relative_eq;

    pub(crate) const REACH: ReachId = 5781373;
    pub(crate) const OTHER_REACH: ReachId = 5781407;

    /// Two reaches, four stage steps (0.0 .. 0.9144 m == 0 .. 3 ft).
    pub(crate) fn properties_dataset() -> MemoryDataset {
        MemoryDataset::new()
            .with_variable("COMID", &[2], vec![OTHER_REACH as f64, REACH as f64])
            .with_variable("StageHeight", &[4], vec![0.0, 0.3048, 0.6096, 0.9144])
            .with_variable("Slope", &[2], vec![0.002, 0.0001])
            .with_variable("Length", &[2], vec![500.0, 1000.0])
            .with_variable(
                "WetArea",
                &[2, 4],
                vec![0.0, 1.0, 2.0, 3.0, 0.0, 10.0, 20.0, 30.0],
            )
            .with_variable(
                "HydraulicRadius",
                &[2, 4],
                vec![0.0, 0.1, 0.2, 0.3, 0.0, 0.5, 1.0, 1.5],
            )
            .with_variable(
                "Width",
                &[2, 4],
                vec![1.0, 2.0, 3.0, 4.0, 4.0, 8.0, 12.0, 16.0],
            )
    }

    pub(crate) fn curves_dataset() -> MemoryDataset {
        MemoryDataset::new()
            .with_variable("COMID", &[2], vec![REACH as f64, OTHER_REACH as f64])
            .with_variable("H_ft", &[4], vec![0.0, 1.0, 2.0, 3.0])
            .with_variable(
                "Q_cfs",
                &[2, 4],
                vec![0.0, 15.0, 60.0, 140.0, 0.0, 5.0, 20.0, 45.0],
            )
    }

    pub(crate) fn properties_index() -> RowIndex {
        RowIndex::from_reader("handnc_idx.csv", "comid,index\n5781407,0\n5781373,1\n".as_bytes())
            .unwrap()
    }

    pub(crate) fn curves_index() -> RowIndex {
        RowIndex::from_reader("handrc_idx.csv", "comid,index\n5781373,0\n5781407,1\n".as_bytes())
            .unwrap()
    }

    #[test]
    fn test_unit_conversion_is_exact_per_variable() {
        let props =
            load_hydraulic_properties(&properties_dataset(), &properties_index(), REACH)
                .expect("reach should load");

        assert_eq!(props.wet_area_sqft[1], 10.0 * (3.28084 * 3.28084));
        assert_eq!(props.hydraulic_radius_ft[2], 1.0 * 3.28084);
        assert_eq!(props.width_ft[3], 16.0 * 3.28084);
        assert_eq!(props.length_ft, 1000.0 * 3.28084);
        assert_eq!(props.slope, 0.0001, "slope is unitless and must not be converted");
    }

    #[test]
    fn test_stage_axis_is_rounded_to_whole_feet() {
        let props =
            load_hydraulic_properties(&properties_dataset(), &properties_index(), REACH).unwrap();
        assert_eq!(props.stage_ft, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_stage_axis_rounds_half_to_even() {
        assert_eq!(round_feet(&[2.5, 3.5, 4.4999]), vec![2.0, 4.0, 4.0]);
    }

    #[test]
    fn test_loaded_arrays_match_shared_axis_lengths() {
        let props =
            load_hydraulic_properties(&properties_dataset(), &properties_index(), REACH).unwrap();
        let curve =
            load_model_rating_curve(&curves_dataset(), &curves_index(), REACH).unwrap();

        let n = props.stage_ft.len();
        assert_eq!(props.wet_area_sqft.len(), n);
        assert_eq!(props.hydraulic_radius_ft.len(), n);
        assert_eq!(props.width_ft.len(), n);
        assert_eq!(curve.discharge_cfs.len(), curve.height_ft.len());
        assert_eq!(curve.discharge_cfs, vec![0.0, 15.0, 60.0, 140.0]);
    }

    #[test]
    fn test_each_file_uses_its_own_row() {
        // The reach is row 1 in the properties file and row 0 in the curves file.
        let props =
            load_hydraulic_properties(&properties_dataset(), &properties_index(), OTHER_REACH)
                .unwrap();
        let curve =
            load_model_rating_curve(&curves_dataset(), &curves_index(), OTHER_REACH).unwrap();
        assert_relative_eq!(props.slope, 0.002);
        assert_eq!(curve.discharge_cfs[3], 45.0);
    }

    #[test]
    fn test_stale_properties_index_is_geometry_failure() {
        let stale =
            RowIndex::from_reader("handnc_idx.csv", "comid,index\n5781373,0\n".as_bytes()).unwrap();
        let err = load_hydraulic_properties(&properties_dataset(), &stale, REACH).unwrap_err();
        assert!(matches!(
            err,
            RcError::StaleIndex { row: 0, found: OTHER_REACH, .. }
        ));
        assert_eq!(err.class(), ErrorClass::Geometry);
    }

    #[test]
    fn test_stale_curves_index_is_lookup_failure() {
        let stale =
            RowIndex::from_reader("handrc_idx.csv", "comid,index\n5781373,1\n".as_bytes()).unwrap();
        let err = load_model_rating_curve(&curves_dataset(), &stale, REACH).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Lookup);
    }

    #[test]
    fn test_short_geometry_row_is_rejected() {
        let ds = properties_dataset().with_variable("Width", &[2, 3], vec![0.0; 6]);
        let err = load_hydraulic_properties(&ds, &properties_index(), REACH).unwrap_err();
        assert!(matches!(err, RcError::Geometry(_)));
    }

    #[test]
    fn test_axis_check_reports_alignment() {
        let props =
            load_hydraulic_properties(&properties_dataset(), &properties_index(), REACH).unwrap();
        let curve =
            load_model_rating_curve(&curves_dataset(), &curves_index(), REACH).unwrap();
        assert_eq!(check_axes(&props, &curve), AxisAgreement::Aligned);
    }

    #[test]
    fn test_memory_dataset_row_out_of_range() {
        let ds = curves_dataset();
        assert!(matches!(ds.row("Q_cfs", 2), Err(RcError::Dataset(_))));
        assert!(matches!(ds.values("missing"), Err(RcError::Dataset(_))));
    }

    #[cfg(not(feature = "netcdf"))]
    #[test]
    fn test_open_dataset_without_netcdf_names_the_feature() {
        let err = open_dataset(Path::new("data/hydroprop.nc")).err().expect("no backend");
        assert!(matches!(err, RcError::Dataset(ref msg) if msg.contains("--features netcdf")));
    }

    #[cfg(feature = "netcdf")]
    #[test]
    fn test_netcdf_open_missing_file_is_dataset_error() {
        let path = std::env::temp_dir().join("hand_rc_missing_hydroprop.nc");
        let err = open_dataset(&path).err().expect("file does not exist");
        assert!(matches!(err, RcError::Dataset(_)));
    }
}
