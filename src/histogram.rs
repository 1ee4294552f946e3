//! Cumulative histogram with quantile queries
//!
//! Bins are ordered by ascending value; bin `i` stands for every sample whose
//! value falls in `[i, i + 1)`. Quantile positions are expressed as fractions of
//! the total count.
//!
//! An empty histogram (every bin zero) answers every query with bin 0.

/// Cumulative view over a fixed set of bin counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    /// `cumulative[i]` is the number of samples in bins `0..i`
    cumulative: Vec<u64>,
}

impl Histogram {
    pub fn new(bins: &[u32]) -> Self {
        let mut cumulative = Vec::with_capacity(bins.len() + 1);
        cumulative.push(0u64);
        let mut running = 0u64;
        for &count in bins {
            running += u64::from(count);
            cumulative.push(running);
        }
        Self { cumulative }
    }

    pub fn bins(&self) -> usize {
        self.cumulative.len() - 1
    }

    pub fn total(&self) -> u64 {
        self.cumulative.last().copied().unwrap_or(0)
    }

    /// First bin at which the cumulative count reaches `q` of the total.
    ///
    /// Only populated bins qualify, so `quantile(0.0)` is the lowest occupied
    /// bin and `quantile(1.0)` the highest one.
    pub fn quantile(&self, q: f64) -> usize {
        let total = self.total();
        if total == 0 {
            return 0;
        }

        let item = q.clamp(0.0, 1.0) * total as f64;
        self.cumulative[1..].partition_point(|&count| count == 0 || (count as f64) < item)
    }

    /// Count-weighted mean bin index over the cumulative range `[low, high)`.
    ///
    /// Bins straddling a boundary contribute only the part of their count that
    /// lies inside the range. With `low >= high` the range is a single point and
    /// the bin at `low` is returned.
    pub fn inter_quantile_mean(&self, low: f64, high: f64) -> f64 {
        let total = self.total() as f64;
        if total == 0.0 {
            return 0.0;
        }

        let low_item = low.clamp(0.0, 1.0) * total;
        let high_item = high.clamp(0.0, 1.0) * total;

        let mut weighted_sum = 0.0;
        let mut weight = 0.0;
        for (bin, edges) in self.cumulative.windows(2).enumerate() {
            let start = (edges[0] as f64).max(low_item);
            let end = (edges[1] as f64).min(high_item);
            if end > start {
                weighted_sum += bin as f64 * (end - start);
                weight += end - start;
            }
        }

        if weight == 0.0 {
            return self.quantile(low) as f64;
        }

        weighted_sum / weight
    }
}
