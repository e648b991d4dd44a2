/// Numerical analysis of HAND and USGS rating data.
///
/// Everything here is pure: inputs are the records produced by `ingest`,
/// outputs are new values.
///
/// Submodules:
/// - `fit`      : power-law, linear and cubic curve fitting.
/// - `roughness`: Manning n back-calculated from observed discharge.
/// - `xsect`    : latest-rating filter and mirrored cross-sections.

pub mod fit;
pub mod roughness;
pub mod xsect;
