//! Channel cross-section geometry.
//!
//! USGS field measurements record a channel width and gage height per
//! visit. Assuming a symmetric channel, each (width, height) pair gives two
//! banks at +-width/2. Only measurements taken under the latest rating are
//! used, since older ratings describe an older channel.

use crate::ingest::nwis::{COL_GAGE_HEIGHT, COL_RATING, COL_WIDTH, MeasurementTable};
use crate::model::{CrossSection, HydraulicProperties, RcError};

/// The rating identifier in force at the end of the record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatestRating {
    pub value: f64,
    /// Row position of the last occurrence of `value`.
    pub index: usize,
}

fn parse_cell(site_id: &str, column: &str, row: usize, raw: &str) -> Result<f64, RcError> {
    raw.parse::<f64>().map_err(|e| {
        RcError::Parse(format!(
            "site {} row {}: invalid {} '{}': {}",
            site_id, row, column, raw, e
        ))
    })
}

/// Finds the final rating identifier and the row of its last occurrence.
/// Empty cells are skipped. No identifier at all is `NoRatingData`.
pub fn latest_rating(site_id: &str, ratings: &[String]) -> Result<LatestRating, RcError> {
    let mut latest = None;
    for (index, raw) in ratings.iter().enumerate() {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let value = parse_cell(site_id, COL_RATING, index, raw)?;
        latest = Some(LatestRating { value, index });
    }
    latest.ok_or_else(|| RcError::NoRatingData(site_id.to_string()))
}

/// Mirrors (half-width, height) pairs into a path: descending negative
/// bank, the origin, ascending positive bank.
pub fn mirror(half_widths: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut pos = half_widths.to_vec();
    pos.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.total_cmp(&b.0)));

    let mut path: Vec<(f64, f64)> = pos.iter().rev().map(|(w, h)| (-w, *h)).collect();
    path.push((0.0, 0.0));
    path.extend(pos);
    path
}

/// Cross-section from the measurements taken under the latest rating.
pub fn observed_cross_section(table: &MeasurementTable) -> Result<CrossSection, RcError> {
    let site_id = &table.site_id;
    let widths = table.column(COL_WIDTH)?;
    let heights = table.column(COL_GAGE_HEIGHT)?;
    let ratings = table.column(COL_RATING)?;

    let latest = latest_rating(site_id, ratings)?;

    let mut half_widths = Vec::new();
    for (row, ((w, h), r)) in widths.iter().zip(heights).zip(ratings).enumerate() {
        let (w, h, r) = (w.trim(), h.trim(), r.trim());
        if w.is_empty() || h.is_empty() || r.is_empty() {
            continue;
        }
        if parse_cell(site_id, COL_RATING, row, r)? != latest.value {
            continue;
        }
        let width = parse_cell(site_id, COL_WIDTH, row, w)?;
        let height = parse_cell(site_id, COL_GAGE_HEIGHT, row, h)?;
        half_widths.push((width / 2.0, height));
    }

    if half_widths.is_empty() {
        return Err(RcError::Geometry(format!(
            "site {}: no measurement under rating {} has both width and gage height",
            site_id, latest.value
        )));
    }

    Ok(CrossSection {
        label: format!("USGS {}", site_id),
        points: mirror(&half_widths),
    })
}

/// HAND cross-section: half the top width at each stage step, built
/// outward from the origin.
pub fn model_cross_section(props: &HydraulicProperties) -> CrossSection {
    let banks: Vec<(f64, f64)> = props
        .width_ft
        .iter()
        .zip(&props.stage_ft)
        .map(|(w, h)| (w / 2.0, *h))
        .collect();

    let mut points: Vec<(f64, f64)> = banks.iter().rev().map(|(w, h)| (-w, *h)).collect();
    points.push((0.0, 0.0));
    points.extend(banks);

    CrossSection {
        label: format!("HAND {}", props.reach_id),
        points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::nwis::parse_measurements;
    use crate::ingest::nwis::tests::RDB_SAMPLE;
    use crate::model::ErrorClass;

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_latest_rating_is_final_value_at_last_occurrence() {
        let ratings = cells(&["1", "1", "2", "2", "1"]);
        let latest = latest_rating("08158700", &ratings).unwrap();
        assert_eq!(latest.value, 1.0, "final value wins, not the numeric maximum");
        assert_eq!(latest.index, 4, "last occurrence, not the first");
    }

    #[test]
    fn test_latest_rating_skips_trailing_blanks() {
        let ratings = cells(&["3", "4", "", " "]);
        assert_eq!(
            latest_rating("08158700", &ratings).unwrap(),
            LatestRating { value: 4.0, index: 1 }
        );
    }

    #[test]
    fn test_latest_rating_without_values_is_explicit() {
        let err = latest_rating("08158700", &cells(&["", ""])).unwrap_err();
        assert!(matches!(err, RcError::NoRatingData(ref s) if s == "08158700"));
        assert_eq!(err.class(), ErrorClass::Geometry);
    }

    #[test]
    fn test_mirror_orders_banks_around_origin() {
        let path = mirror(&[(20.0, 3.0), (10.0, 1.0), (15.0, 1.0)]);
        assert_eq!(
            path,
            vec![
                (-20.0, 3.0),
                (-15.0, 1.0),
                (-10.0, 1.0),
                (0.0, 0.0),
                (10.0, 1.0),
                (15.0, 1.0),
                (20.0, 3.0),
            ]
        );
    }

    #[test]
    fn test_observed_cross_section_keeps_latest_rating_only() {
        let table = parse_measurements("08158700", RDB_SAMPLE).unwrap();
        let xs = observed_cross_section(&table).expect("sample has rating data");
        // Latest rating is 17 (last row). Rows with 17: widths 30, 44, 20.
        assert_eq!(
            xs.points,
            vec![
                (-22.0, 3.4),
                (-15.0, 2.1),
                (-10.0, 1.5),
                (0.0, 0.0),
                (10.0, 1.5),
                (15.0, 2.1),
                (22.0, 3.4),
            ]
        );
    }

    #[test]
    fn test_model_cross_section_builds_outward() {
        let props = HydraulicProperties {
            reach_id: 1,
            wet_area_sqft: vec![0.0; 3],
            hydraulic_radius_ft: vec![0.0; 3],
            slope: 0.001,
            length_ft: 100.0,
            width_ft: vec![2.0, 4.0, 8.0],
            stage_ft: vec![0.0, 1.0, 2.0],
        };
        let xs = model_cross_section(&props);
        assert_eq!(
            xs.points,
            vec![
                (-4.0, 2.0),
                (-2.0, 1.0),
                (-1.0, 0.0),
                (0.0, 0.0),
                (1.0, 0.0),
                (2.0, 1.0),
                (4.0, 2.0),
            ]
        );
    }

    #[test]
    fn test_observed_cross_section_without_complete_rows_is_geometry_failure() {
        let text = "\
agency_cd\tsite_no\tmeasurement_nu\tgage_height_va\tchan_width\tcurrent_rating_nu
5s\t15s\t6s\t12s\t12s\t4s
USGS\t08158700\t101\t2.10\t30\t17
USGS\t08158700\t102\t\t\t18
";
        let table = parse_measurements("08158700", text).unwrap();
        let err = observed_cross_section(&table).unwrap_err();
        assert!(matches!(err, RcError::Geometry(ref msg) if msg.contains("rating 18")), "got {:?}", err);
        assert_eq!(err.class(), ErrorClass::Geometry);
    }

    #[test]
    fn test_model_cross_section_heights_follow_stage_axis() {
        // Two-foot stage steps: heights are the stage values, not step numbers.
        let props = HydraulicProperties {
            reach_id: 1,
            wet_area_sqft: vec![0.0; 3],
            hydraulic_radius_ft: vec![0.0; 3],
            slope: 0.001,
            length_ft: 100.0,
            width_ft: vec![2.0, 4.0, 8.0],
            stage_ft: vec![0.0, 2.0, 4.0],
        };
        let xs = model_cross_section(&props);
        let heights: Vec<f64> = xs.points.iter().skip(4).map(|p| p.1).collect();
        assert_eq!(heights, vec![0.0, 2.0, 4.0]);
        assert_ne!(heights, vec![0.0, 1.0, 2.0]);
    }
}
