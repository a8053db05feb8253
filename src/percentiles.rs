//! Exact rank-interpolation percentiles.
//!
//! Deliberately not HdrHistogram-style bucketed approximation: the original
//! implementation this was ported from computes an exact linear
//! interpolation between ranks, and that exactness is a testable property
//! of the percentile function.

/// Computes the `p`-th percentile (`p` in `[0, 1]`) of `sorted` using linear
/// interpolation at rank `k = (n - 1) * p`. `sorted` must already be sorted
/// ascending. Returns `None` for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    if sorted.len() == 1 {
        return Some(sorted[0]);
    }

    let k = (sorted.len() - 1) as f64 * p;
    let lo = k.floor() as usize;
    let hi = k.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = k - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Standard percentile set reported by the aggregator.
pub const REPORTED_PERCENTILES: &[f64] = &[0.50, 0.6667, 0.75, 0.80, 0.85, 0.90, 0.95, 1.0];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_none() {
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn p0_is_min_p1_is_max() {
        let xs = vec![3.0, 1.0, 2.0, 5.0, 4.0];
        let mut xs = xs;
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(percentile(&xs, 0.0), Some(1.0));
        assert_eq!(percentile(&xs, 1.0), Some(5.0));
    }

    #[test]
    fn monotonic_in_p() {
        let xs: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let ps = [0.0, 0.1, 0.5, 0.9, 1.0];
        let mut last = f64::MIN;
        for p in ps {
            let v = percentile(&xs, p).unwrap();
            assert!(v >= last);
            last = v;
        }
    }

    #[test]
    fn interpolates_between_ranks() {
        let xs = vec![1.0, 2.0, 3.0, 4.0];
        // k = (4-1)*0.5 = 1.5 -> interpolate between xs[1]=2 and xs[2]=3
        assert_eq!(percentile(&xs, 0.5), Some(2.5));
    }

    #[test]
    fn single_element() {
        assert_eq!(percentile(&[42.0], 0.0), Some(42.0));
        assert_eq!(percentile(&[42.0], 1.0), Some(42.0));
    }

    #[test]
    fn median_of_odd_length_is_middle_element() {
        let xs = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&xs, 0.5), Some(3.0));
    }
}
