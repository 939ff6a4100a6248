//! Comparators for [`SelectionIndex::sort`](crate::index::SelectionIndex::sort).

use std::sync::Arc;

use coverage_types::geo::{Datum, GeoPoint, GeoPoint2d};

use crate::index::Comparator;
use crate::selection::Selection;

/// Orders selections by name.
pub fn by_name<T: 'static>() -> Comparator<T> {
    Arc::new(|a: &Selection<T>, b: &Selection<T>| a.name().cmp(b.name()))
}

/// Orders selections by name ignoring the letter case. Names equal up to the case are ordered by [`by_name`].
pub fn by_name_ignore_case<T: 'static>() -> Comparator<T> {
    Arc::new(|a: &Selection<T>, b: &Selection<T>| {
        let a_name = a.name().to_lowercase();
        let b_name = b.name().to_lowercase();
        a_name.cmp(&b_name).then_with(|| a.name().cmp(b.name()))
    })
}

/// Orders selections by descending maximum resolution value, then by name.
pub fn by_max_resolution<T: 'static>() -> Comparator<T> {
    Arc::new(|a: &Selection<T>, b: &Selection<T>| {
        b.max_resolution()
            .total_cmp(&a.max_resolution())
            .then_with(|| a.name().cmp(b.name()))
    })
}

/// Orders selections by the distance from the reference point to the center of their bounds, then by name.
pub fn by_distance_to<T: 'static>(point: GeoPoint2d) -> Comparator<T> {
    Arc::new(move |a: &Selection<T>, b: &Selection<T>| {
        let distance = |s: &Selection<T>| {
            s.bounds()
                .center()
                .distance(&point, &Datum::WGS84)
                .unwrap_or(f64::INFINITY)
        };

        distance(a)
            .total_cmp(&distance(b))
            .then_with(|| a.name().cmp(b.name()))
    })
}

/// Reverses the order of the comparator.
pub fn reversed<T: 'static>(comparator: Comparator<T>) -> Comparator<T> {
    Arc::new(move |a: &Selection<T>, b: &Selection<T>| comparator(a, b).reverse())
}
