//! Selection of the baseline kWh cumac value for a building.
use crate::product::KwhCumacValue;
use crate::units::Kwh;

/// Surface (m²) from which the "large building" value applies
pub const DEFAULT_SURFACE_THRESHOLD_M2: f64 = 400.0;

/// Pick the baseline value for `building_type` from a product's kWh table.
///
/// Buildings of at least `threshold_m2` use the large-building value, falling back to the
/// small-building one. Smaller buildings, or ones with an unknown surface, prefer the
/// small-building value. `None` means the base is missing, which callers report as a warning
/// rather than an error.
pub fn select_kwh_base(
    values: &[KwhCumacValue],
    building_type: &str,
    surface_m2: Option<f64>,
    threshold_m2: f64,
) -> Option<Kwh> {
    let value = values
        .iter()
        .find(|value| value.building_type.matches(building_type))?;
    let (small, large) = (value.kwh_cumac_lt_400, value.kwh_cumac_gte_400);

    let is_large = surface_m2.is_some_and(|surface| surface.is_finite() && surface >= threshold_m2);
    let selected = if is_large {
        large.filter(|kwh| kwh.is_finite()).or(small)
    } else {
        small.filter(|kwh| kwh.is_finite()).or(large)
    };

    selected.filter(|kwh| kwh.is_finite())
}
