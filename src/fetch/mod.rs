/// Forecast acquisition from the NCEP NOMADS archive.
///
/// Submodules:
/// - `nomads` — URL construction, cycle download planning, per-hour download.

pub mod nomads;
