//! SVG rendering of the cross-section and rating curve overlays.
//!
//! Model layers are drawn in blue, observed layers in green. A plot goes
//! either to an SVG file or is returned as an SVG string.

use std::path::PathBuf;

use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;

use crate::analysis::fit::{FitKind, fit};
use crate::logging::{self, DataSource};
use crate::model::{
    CrossSection, HydraulicProperties, ModelRatingCurve, ObservedRating, RcError, ReachId,
};

const MODEL_COLOR: RGBColor = BLUE;
const OBSERVED_COLOR: RGBColor = RGBColor(0, 128, 0);
const LINE_WIDTH: u32 = 5;

/// Where a plot goes.
#[derive(Debug, Clone, PartialEq)]
pub enum PlotTarget {
    File(PathBuf),
    /// Render to an in-memory SVG document.
    Inline,
}

/// What a render produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    File(PathBuf),
    Inline(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisLimits {
    pub x: (f64, f64),
    pub y: (f64, f64),
}

impl AxisLimits {
    /// Widens a collapsed or inverted range so the chart stays drawable.
    fn drawable(self) -> Self {
        fn span((lo, hi): (f64, f64)) -> (f64, f64) {
            if hi > lo { (lo, hi) } else { (lo, lo + 1.0) }
        }
        AxisLimits {
            x: span(self.x),
            y: span(self.y),
        }
    }
}

// ---------------------------------------------------------------------------
// Axis limits
// ---------------------------------------------------------------------------

/// Cross-section limits from the model geometry: `+-width[last]` by
/// `stage[0]..stage[last]`, or with a stage index `i`, `+-width[i]` by
/// `-1..stage[i]`.
pub fn xsect_limits(
    props: &HydraulicProperties,
    stage_index: Option<usize>,
) -> Result<AxisLimits, RcError> {
    let steps = props.width_ft.len().min(props.stage_ft.len());
    if steps == 0 {
        return Err(RcError::Geometry(format!(
            "COMID {} has an empty stage axis",
            props.reach_id
        )));
    }

    match stage_index {
        Some(i) if i < steps => Ok(AxisLimits {
            x: (-props.width_ft[i], props.width_ft[i]),
            y: (-1.0, props.stage_ft[i]),
        }),
        Some(i) => Err(RcError::Geometry(format!(
            "plot stage index {} is beyond the {} stage steps of COMID {}",
            i, steps, props.reach_id
        ))),
        None => {
            let last = steps - 1;
            Ok(AxisLimits {
                x: (-props.width_ft[last], props.width_ft[last]),
                y: (props.stage_ft[0], props.stage_ft[last]),
            })
        }
    }
}

/// Rating overlay limits: `0..Q[last]` by `0..H[last]` of the model curve.
pub fn rating_limits(curve: &ModelRatingCurve) -> AxisLimits {
    let q_max = curve.discharge_cfs.last().copied().unwrap_or(1.0);
    let h_max = curve.height_ft.last().copied().unwrap_or(1.0);
    AxisLimits {
        x: (0.0, q_max),
        y: (0.0, h_max),
    }
}

// ---------------------------------------------------------------------------
// Rating curve series
// ---------------------------------------------------------------------------

/// Observed curves cannot take a cubic spline; they fall back to power.
pub fn observed_fit_kind(requested: FitKind) -> FitKind {
    if requested == FitKind::Cubic {
        logging::info(
            DataSource::Plot,
            None,
            "USGS interpolation plotted as power-law fit",
        );
        FitKind::Power
    } else {
        requested
    }
}

/// Height fitted against discharge, evaluated at the sample discharges.
/// Non-finite values (a power curve at Q = 0 with b < 0) are dropped.
pub fn fitted_series(
    discharge_cfs: &[f64],
    height_ft: &[f64],
    kind: FitKind,
) -> Result<Vec<(f64, f64)>, RcError> {
    let curve = fit(discharge_cfs, height_ft, kind)?;
    let fitted = curve.eval_many(discharge_cfs)?;
    Ok(discharge_cfs
        .iter()
        .copied()
        .zip(fitted)
        .filter(|(_, h)| h.is_finite())
        .collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingPlotOptions {
    pub kind: FitKind,
    pub show_model: bool,
    pub show_observed: bool,
}

// ---------------------------------------------------------------------------
// Public plot operations
// ---------------------------------------------------------------------------

/// Cross-section overlay of the model polygon and one polygon per site.
pub fn draw_xsect(
    reach_id: ReachId,
    model: Option<&CrossSection>,
    observed: &[CrossSection],
    limits: AxisLimits,
    size: (u32, u32),
    target: &PlotTarget,
) -> Result<Rendered, RcError> {
    let title = format!("COMID {}", reach_id);
    let mut layers: Vec<(Series, RGBColor)> = Vec::new();
    if let Some(xs) = model {
        layers.push((series_of(xs), MODEL_COLOR));
    }
    layers.extend(observed.iter().map(|xs| (series_of(xs), OBSERVED_COLOR)));

    render(target, size, |root| {
        draw_chart(root, &title, ("Width (ft)", "Height (ft)"), &layers, limits.drawable())
    })
}

/// Rating curve overlay: observed ratings and the model curve, each fitted
/// with `options.kind` and drawn at its own sample discharges.
pub fn plot_rc(
    model: &ModelRatingCurve,
    observed: &[ObservedRating],
    options: RatingPlotOptions,
    size: (u32, u32),
    target: &PlotTarget,
) -> Result<Rendered, RcError> {
    let mut layers: Vec<(Series, RGBColor)> = Vec::new();

    if options.show_observed {
        let kind = if observed.is_empty() {
            options.kind
        } else {
            observed_fit_kind(options.kind)
        };
        for rating in observed {
            let points = fitted_series(&rating.discharge_cfs, &rating.height_ft, kind)?;
            layers.push((
                Series {
                    label: format!("USGS {}", rating.site_id),
                    points,
                },
                OBSERVED_COLOR,
            ));
        }
    }

    if options.show_model {
        let points = fitted_series(&model.discharge_cfs, &model.height_ft, options.kind)?;
        layers.push((
            Series {
                label: format!("HAND {}", model.reach_id),
                points,
            },
            MODEL_COLOR,
        ));
    }

    let title = format!("COMID {}", model.reach_id);
    let limits = rating_limits(model).drawable();
    render(target, size, |root| {
        draw_chart(root, &title, ("Q (cfs)", "H (ft)"), &layers, limits)
    })
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn series_of(xs: &CrossSection) -> Series {
    Series {
        label: xs.label.clone(),
        points: xs.points.clone(),
    }
}

fn plot_error<E>(e: DrawingAreaErrorKind<E>) -> RcError
where
    E: std::error::Error + Send + Sync,
{
    RcError::Plot(e.to_string())
}

fn render<F>(target: &PlotTarget, size: (u32, u32), draw: F) -> Result<Rendered, RcError>
where
    F: for<'a> FnOnce(
        DrawingArea<SVGBackend<'a>, Shift>,
    ) -> Result<(), DrawingAreaErrorKind<std::io::Error>>,
{
    match target {
        PlotTarget::File(path) => {
            let root = SVGBackend::new(path, size).into_drawing_area();
            draw(root).map_err(plot_error)?;
            logging::debug(
                DataSource::Plot,
                None,
                &format!("wrote {}", path.display()),
            );
            Ok(Rendered::File(path.clone()))
        }
        PlotTarget::Inline => {
            let mut svg = String::new();
            {
                let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
                draw(root).map_err(plot_error)?;
            }
            Ok(Rendered::Inline(svg))
        }
    }
}

fn draw_chart<DB>(
    root: DrawingArea<DB, Shift>,
    title: &str,
    (x_desc, y_desc): (&str, &str),
    layers: &[(Series, RGBColor)],
    limits: AxisLimits,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>>
where
    DB: DrawingBackend,
{
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 56))
        .margin(25)
        .x_label_area_size(90)
        .y_label_area_size(110)
        .build_cartesian_2d(limits.x.0..limits.x.1, limits.y.0..limits.y.1)?;

    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .x_labels(6)
        .y_labels(6)
        .label_style(("sans-serif", 32))
        .axis_desc_style(("sans-serif", 40))
        .draw()?;

    for (series, color) in layers {
        let color = *color;
        chart
            .draw_series(LineSeries::new(
                series.points.iter().copied(),
                color.stroke_width(LINE_WIDTH),
            ))?
            .label(series.label.as_str())
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 30, y)], color.stroke_width(LINE_WIDTH))
            });
    }

    if !layers.is_empty() {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .label_font(("sans-serif", 32))
            .position(SeriesLabelPosition::UpperLeft)
            .draw()?;
    }

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn props() -> HydraulicProperties {
        HydraulicProperties {
            reach_id: 5781373,
            wet_area_sqft: vec![0.0; 4],
            hydraulic_radius_ft: vec![0.0; 4],
            slope: 0.001,
            length_ft: 100.0,
            width_ft: vec![2.0, 4.0, 8.0, 16.0],
            stage_ft: vec![0.0, 1.0, 2.0, 3.0],
        }
    }

    fn curve() -> ModelRatingCurve {
        ModelRatingCurve {
            reach_id: 5781373,
            discharge_cfs: vec![0.0, 1.0, 4.0, 9.0],
            height_ft: vec![0.0, 1.0, 2.0, 3.0],
        }
    }

    #[test]
    fn test_xsect_limits_default_to_last_step() {
        let limits = xsect_limits(&props(), None).unwrap();
        assert_eq!(limits.x, (-16.0, 16.0));
        assert_eq!(limits.y, (0.0, 3.0));
    }

    #[test]
    fn test_xsect_limits_override_uses_stage_index() {
        let limits = xsect_limits(&props(), Some(2)).unwrap();
        assert_eq!(limits.x, (-8.0, 8.0));
        assert_eq!(limits.y, (-1.0, 2.0));
    }

    #[test]
    fn test_xsect_limits_override_out_of_range() {
        let err = xsect_limits(&props(), Some(11)).unwrap_err();
        assert!(matches!(err, RcError::Geometry(_)));
    }

    #[test]
    fn test_rating_limits_follow_model_curve() {
        let limits = rating_limits(&curve());
        assert_eq!(limits.x, (0.0, 9.0));
        assert_eq!(limits.y, (0.0, 3.0));
    }

    #[test]
    fn test_collapsed_limits_are_widened() {
        let limits = AxisLimits { x: (0.0, 0.0), y: (2.0, 1.0) }.drawable();
        assert_eq!(limits.x, (0.0, 1.0));
        assert_eq!(limits.y, (2.0, 3.0));
    }

    #[test]
    fn test_cubic_observed_request_falls_back_to_power() {
        assert_eq!(observed_fit_kind(FitKind::Cubic), FitKind::Power);
        assert_eq!(observed_fit_kind(FitKind::Linear), FitKind::Linear);
    }

    #[test]
    fn test_fitted_series_square_root_rating() {
        // H = Q^0.5 through the non-zero samples.
        let c = curve();
        let points = fitted_series(&c.discharge_cfs, &c.height_ft, FitKind::Power).unwrap();
        assert_eq!(points.len(), 4);
        assert_relative_eq!(points[0].1, 0.0, epsilon = 1e-12);
        assert_relative_eq!(points[3].1, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_inline_xsect_renders_svg_markup() {
        let model = crate::analysis::xsect::model_cross_section(&props());
        let observed = CrossSection {
            label: "USGS 08158700".to_string(),
            points: vec![(-5.0, 2.0), (0.0, 0.0), (5.0, 2.0)],
        };
        let limits = xsect_limits(&props(), None).unwrap();
        let rendered = draw_xsect(
            5781373,
            Some(&model),
            &[observed],
            limits,
            (800, 600),
            &PlotTarget::Inline,
        )
        .expect("inline render should succeed");

        match rendered {
            Rendered::Inline(svg) => {
                assert!(svg.contains("<svg"), "not an SVG document");
                assert!(svg.contains("COMID 5781373"));
            }
            other => panic!("expected inline SVG, got {:?}", other),
        }
    }

    #[test]
    fn test_inline_rating_renders_svg_markup() {
        let observed = ObservedRating {
            site_id: "08158700".to_string(),
            height_ft: vec![0.0, 1.0, 2.0, 3.0],
            discharge_cfs: vec![1.0, 2.0, 5.0, 10.0],
        };
        let options = RatingPlotOptions {
            kind: FitKind::Cubic,
            show_model: true,
            show_observed: true,
        };
        let rendered =
            plot_rc(&curve(), &[observed], options, (800, 600), &PlotTarget::Inline).unwrap();
        assert!(matches!(rendered, Rendered::Inline(ref svg) if svg.contains("<svg")));
    }
}
