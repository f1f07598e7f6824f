//! Equal-width binning of sparse message size histograms.

use std::collections::BTreeMap;

use serde::Serialize;

/// Default number of bins for message size plots
pub const DEFAULT_BINS: usize = 50;

/// One equal-width bin; `upper` is exclusive except for the last bin
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
}

/// Spread the weighted sizes over `bins` equal-width bins between the
/// smallest and largest size. A single distinct size gets a unit-wide range
/// centred on it. Returns no bins for an empty histogram or `bins == 0`.
pub fn bin_histogram(sizes: &BTreeMap<u64, u64>, bins: usize) -> Vec<HistogramBin> {
    let (Some((&min, _)), Some((&max, _))) = (sizes.first_key_value(), sizes.last_key_value())
    else {
        return Vec::new();
    };
    if bins == 0 {
        return Vec::new();
    }

    let (lower, upper) = if min == max {
        (min as f64 - 0.5, max as f64 + 0.5)
    } else {
        (min as f64, max as f64)
    };
    let width = (upper - lower) / bins as f64;

    let mut result: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lower: lower + width * i as f64,
            upper: if i + 1 == bins {
                upper
            } else {
                lower + width * (i + 1) as f64
            },
            count: 0,
        })
        .collect();

    for (&size, &frequency) in sizes {
        let index = (((size as f64 - lower) / width) as usize).min(bins - 1);
        result[index].count = result[index].count.saturating_add(frequency);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert!(bin_histogram(&BTreeMap::new(), DEFAULT_BINS).is_empty());
        assert!(bin_histogram(&BTreeMap::from([(8, 1)]), 0).is_empty());
    }

    #[test]
    fn test_single_size() {
        let bins = bin_histogram(&BTreeMap::from([(64, 6)]), 4);
        assert_eq!(bins.len(), 4);
        assert_eq!(bins[0].lower, 63.5);
        assert_eq!(bins[3].upper, 64.5);
        assert_eq!(bins.iter().map(|b| b.count).sum::<u64>(), 6);
        assert_eq!(bins[2].count, 6);
    }

    #[test]
    fn test_weights_and_edges() {
        let sizes = BTreeMap::from([(0, 3), (49, 1), (50, 2), (100, 5)]);
        let bins = bin_histogram(&sizes, 2);
        assert_eq!(bins[0], HistogramBin { lower: 0.0, upper: 50.0, count: 4 });
        // The maximum lands in the last bin, not past it
        assert_eq!(bins[1], HistogramBin { lower: 50.0, upper: 100.0, count: 7 });
    }

    #[test]
    fn test_bin_counts_saturate() {
        let sizes = BTreeMap::from([(8, u64::MAX), (9, 1), (100, 1)]);
        let bins = bin_histogram(&sizes, 2);
        assert_eq!(bins[0].count, u64::MAX);
        assert_eq!(bins[1].count, 1);
    }
}
