//! Exact summary statistics over a bounded batch of samples.

/// Samples for one rollup group. The buffer holds exactly the group's
/// values; the batch size bounds it.
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    values: Vec<f64>,
}

/// Count, mean, 95th percentile and maximum of a sample buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub p95: f64,
    pub max: f64,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.values.push(value);
    }

    /// Summarize the buffer, or `None` if it is empty.
    ///
    /// Values are sorted first and the mean is accumulated in sorted order,
    /// so the result does not depend on insertion order.
    pub fn summarize(mut self) -> Option<Summary> {
        if self.values.is_empty() {
            return None;
        }
        self.values.sort_by(f64::total_cmp);
        let count = self.values.len();
        let mean = self.values.iter().sum::<f64>() / count as f64;
        Some(Summary {
            count,
            mean,
            p95: nearest_rank(&self.values, 0.95),
            max: self.values[count - 1],
        })
    }
}

impl FromIterator<f64> for SampleBuffer {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Nearest-rank percentile of an ascending slice:
/// `sorted[ceil(q * n) - 1]`, clamped to the slice. Returns 0.0 when empty.
pub fn nearest_rank(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (q * n as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(n - 1);
    sorted[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let buf: SampleBuffer = (1..=20).map(|v| v as f64).collect();
        let s = buf.summarize().unwrap();
        assert_eq!(s.count, 20);
        assert_eq!(s.mean, 10.5);
        // ceil(0.95 * 20) - 1 = 18 -> 19.0
        assert_eq!(s.p95, 19.0);
        assert_eq!(s.max, 20.0);
    }

    #[test]
    fn test_nearest_rank_edges() {
        assert_eq!(nearest_rank(&[], 0.95), 0.0);
        assert_eq!(nearest_rank(&[7.0], 0.95), 7.0);
        // ceil(0.95 * 5) - 1 = 4
        assert_eq!(nearest_rank(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.95), 5.0);
        assert_eq!(nearest_rank(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.0), 1.0);
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let forward: SampleBuffer = [0.1, 0.2, 0.3, 1e16, -1e16].into_iter().collect();
        let backward: SampleBuffer = [-1e16, 1e16, 0.3, 0.2, 0.1].into_iter().collect();
        assert_eq!(forward.summarize(), backward.summarize());
    }

    #[test]
    fn test_empty_buffer() {
        assert!(SampleBuffer::new().summarize().is_none());
    }
}
