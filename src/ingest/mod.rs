/// Data retrieval for one reach.
///
/// Submodules:
/// - `hand`  : HAND hydraulic properties and rating curves from array files.
/// - `tables`: row-index tables and the COMID <-> USGS site crosswalk.
/// - `nwis`  : USGS NWIS rating and field-measurement text endpoints.

pub mod hand;
pub mod nwis;
pub mod tables;
