//! Manning roughness back-calculation.
//!
//! For each HAND stage step, pick the closest observed height, and solve
//! Manning's equation for the n that makes the HAND geometry carry the
//! observed discharge at that height:
//!
//!   n = 1.49 * A * R^(2/3) * sqrt(S) / Q      (US customary units)

use crate::model::{HydraulicProperties, ObservedRating, RcError, RoughnessSample};

/// Unit conversion constant of Manning's equation in US customary units.
pub const MANNING_K_US: f64 = 1.49;

/// Element-wise Manning n. `slope` applies to every element.
pub fn mannings_n(
    area_sqft: &[f64],
    hydraulic_radius_ft: &[f64],
    slope: f64,
    discharge_cfs: &[f64],
) -> Result<Vec<f64>, RcError> {
    if area_sqft.len() != discharge_cfs.len() || hydraulic_radius_ft.len() != discharge_cfs.len() {
        return Err(RcError::Geometry(format!(
            "Manning inputs differ in length: area {}, radius {}, discharge {}",
            area_sqft.len(),
            hydraulic_radius_ft.len(),
            discharge_cfs.len()
        )));
    }

    let sqrt_slope = slope.sqrt();
    Ok(area_sqft
        .iter()
        .zip(hydraulic_radius_ft)
        .zip(discharge_cfs)
        .map(|((a, r), q)| MANNING_K_US * a * r.powf(2.0 / 3.0) * sqrt_slope / q)
        .collect())
}

/// Index of the value closest to `target`. Ties go to the earliest index.
pub fn nearest_index(values: &[f64], target: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values.iter().enumerate() {
        let diff = (v - target).abs();
        match best {
            Some((_, best_diff)) if diff >= best_diff => {}
            _ => best = Some((i, diff)),
        }
    }
    best.map(|(i, _)| i)
}

/// Observed (height, discharge) pairs matched to each stage step,
/// deduplicated by height in first-seen order, with the last pair dropped.
pub fn matched_observations(stage_ft: &[f64], observed: &ObservedRating) -> Vec<(f64, f64)> {
    let mut matched: Vec<(f64, f64)> = Vec::new();
    for &h in stage_ft {
        let Some(i) = nearest_index(&observed.height_ft, h) else {
            break;
        };
        let height = observed.height_ft[i];
        if !matched.iter().any(|(seen, _)| *seen == height) {
            matched.push((height, observed.discharge_cfs[i]));
        }
    }
    matched.pop();
    matched
}

/// Roughness required for the HAND curve to match the first observed
/// rating at each matched stage step.
pub fn optimize_n(
    props: &HydraulicProperties,
    observed: &[ObservedRating],
) -> Result<Vec<RoughnessSample>, RcError> {
    let rating = observed
        .first()
        .ok_or_else(|| RcError::NoObservedData(format!("COMID {}", props.reach_id)))?;

    let matched = matched_observations(&props.stage_ft, rating);
    let len = matched.len();
    if props.wet_area_sqft.len() < len || props.hydraulic_radius_ft.len() < len {
        return Err(RcError::Geometry(format!(
            "{} matched observations but only {} geometry steps",
            len,
            props.wet_area_sqft.len().min(props.hydraulic_radius_ft.len())
        )));
    }

    let (heights, discharges): (Vec<f64>, Vec<f64>) = matched.into_iter().unzip();
    let n = mannings_n(
        &props.wet_area_sqft[..len],
        &props.hydraulic_radius_ft[..len],
        props.slope,
        &discharges,
    )?;

    Ok(heights
        .into_iter()
        .zip(discharges)
        .zip(n)
        .map(|((height_ft, discharge_cfs), n)| RoughnessSample {
            height_ft,
            discharge_cfs,
            n,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn observed(heights: &[f64], discharges: &[f64]) -> ObservedRating {
        ObservedRating {
            site_id: "08158700".to_string(),
            height_ft: heights.to_vec(),
            discharge_cfs: discharges.to_vec(),
        }
    }

    fn props(stage: &[f64], area: &[f64], radius: &[f64], slope: f64) -> HydraulicProperties {
        HydraulicProperties {
            reach_id: 5781373,
            wet_area_sqft: area.to_vec(),
            hydraulic_radius_ft: radius.to_vec(),
            slope,
            length_ft: 1000.0,
            width_ft: vec![10.0; stage.len()],
            stage_ft: stage.to_vec(),
        }
    }

    #[test]
    fn test_mannings_n_single_step() {
        let n = mannings_n(&[10.0], &[2.0], 0.0001, &[50.0]).unwrap();
        let expected = 1.49 * 10.0 * 2f64.powf(2.0 / 3.0) * 0.0001f64.sqrt() / 50.0;
        assert_relative_eq!(n[0], expected, epsilon = 1e-15);
    }

    #[test]
    fn test_mannings_n_broadcasts_slope() {
        let n = mannings_n(&[10.0, 20.0], &[1.0, 1.0], 0.04, &[1.49, 1.49]).unwrap();
        assert_relative_eq!(n[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(n[1], 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mannings_n_rejects_mismatched_lengths() {
        assert!(matches!(
            mannings_n(&[1.0, 2.0], &[1.0], 0.01, &[1.0, 2.0]),
            Err(RcError::Geometry(_))
        ));
    }

    #[test]
    fn test_nearest_index_first_minimum_wins() {
        // 1.0 and 3.0 are both 1.0 away from 2.0.
        assert_eq!(nearest_index(&[1.0, 3.0, 5.0], 2.0), Some(0));
        assert_eq!(nearest_index(&[0.0, 2.0, 2.0], 2.0), Some(1));
        assert_eq!(nearest_index(&[], 2.0), None);
    }

    #[test]
    fn test_matches_are_deduplicated_and_trimmed() {
        // Stage steps 0..=4 map to observed heights 0, 0, 2, 2, 5.
        let obs = observed(&[0.0, 2.0, 5.0], &[1.0, 20.0, 90.0]);
        let matched = matched_observations(&[0.0, 1.0, 2.0, 3.0, 4.0], &obs);
        // Unique: (0, 1), (2, 20), (5, 90); last dropped.
        assert_eq!(matched, vec![(0.0, 1.0), (2.0, 20.0)]);
    }

    #[test]
    fn test_optimize_n_pairs_truncated_geometry_with_matches() {
        let obs = observed(&[0.0, 1.0, 2.0, 3.0], &[2.0, 10.0, 30.0, 70.0]);
        let p = props(
            &[0.0, 1.0, 2.0, 3.0],
            &[10.0, 20.0, 30.0, 40.0],
            &[2.0, 2.5, 3.0, 3.5],
            0.0001,
        );
        let samples = optimize_n(&p, &[obs]).expect("roughness should compute");

        assert_eq!(samples.len(), 3, "last match is trimmed");
        for (i, s) in samples.iter().enumerate() {
            let expected = 1.49
                * p.wet_area_sqft[i]
                * p.hydraulic_radius_ft[i].powf(2.0 / 3.0)
                * p.slope.sqrt()
                / s.discharge_cfs;
            assert_relative_eq!(s.n, expected, epsilon = 1e-12);
        }
        assert_eq!(samples[2].height_ft, 2.0);
        assert_eq!(samples[2].discharge_cfs, 30.0);
    }

    #[test]
    fn test_optimize_n_uses_first_site_only() {
        let first = observed(&[0.0, 1.0, 2.0], &[5.0, 10.0, 15.0]);
        let second = observed(&[0.0, 1.0, 2.0], &[500.0, 1000.0, 1500.0]);
        let p = props(&[0.0, 1.0, 2.0], &[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0], 0.01);
        let samples = optimize_n(&p, &[first, second]).unwrap();
        assert_eq!(samples[0].discharge_cfs, 5.0);
    }

    #[test]
    fn test_optimize_n_without_observations_is_lookup_failure() {
        let p = props(&[0.0, 1.0], &[1.0, 2.0], &[1.0, 1.0], 0.01);
        let err = optimize_n(&p, &[]).unwrap_err();
        assert_eq!(err.class(), crate::model::ErrorClass::Lookup);
    }
}
