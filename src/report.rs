use itertools::Itertools;

use crate::error::{Error, Result};
use crate::store::{AggregateStore, Measurement};

/// Renders a value with one fractional digit, rounding half away from zero.
/// Values that round to zero print as `0.0`, never `-0.0`.
pub fn format_value(value: f64) -> String {
    let scaled = value * 10.0;
    if !scaled.is_finite() {
        // Beyond 2^53 there is no fractional part left to round.
        return format!("{value:.1}");
    }
    let rounded = scaled.round() / 10.0;
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{rounded:.1}")
}

/// `key=min/max/mean`
pub fn format_entry(key: &str, m: &Measurement) -> String {
    format!(
        "{key}={}/{}/{}",
        format_value(m.min),
        format_value(m.max),
        format_value(m.mean())
    )
}

/// `{k1=min/max/mean, k2=min/max/mean}` in the order given.
pub fn format_report<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, Measurement)>,
{
    let body = entries
        .into_iter()
        .map(|(key, m)| format_entry(key, &m))
        .join(", ");
    format!("{{{body}}}")
}

/// Looks up each sorted key in the store, failing if one is missing.
pub fn collect_entries<'a>(
    keys: &'a [String],
    store: &AggregateStore,
) -> Result<Vec<(&'a str, Measurement)>> {
    keys.iter()
        .map(|key| {
            store
                .get(key)
                .map(|m| (key.as_str(), m))
                .ok_or_else(|| Error::Invariant(format!("registered key '{key}' missing from store")))
        })
        .collect()
}
