//! HAND model rating curves compared against USGS observed ratings.
//!
//! Loads HAND hydraulic properties and rating curves for NHDPlus reaches,
//! fetches the matching USGS ratings and field measurements, back-calculates
//! Manning roughness, and renders cross-section and rating curve overlays.

pub mod analysis;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod plot;
