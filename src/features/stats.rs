/// Streaming mean and population standard deviation (Welford).
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub(crate) fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    pub(crate) fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub(crate) fn std(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).max(0.0).sqrt()
        }
    }
}

/// One accumulator per column of a frame-major matrix.
pub(crate) struct ColumnStats {
    columns: Vec<RunningStats>,
}

impl ColumnStats {
    pub(crate) fn new(width: usize) -> Self {
        Self {
            columns: vec![RunningStats::default(); width],
        }
    }

    pub(crate) fn push_row(&mut self, row: &[f64]) {
        for (acc, &v) in self.columns.iter_mut().zip(row) {
            acc.push(v);
        }
    }

    pub(crate) fn means(&self) -> impl Iterator<Item = f64> + '_ {
        self.columns.iter().map(RunningStats::mean)
    }

    pub(crate) fn stds(&self) -> impl Iterator<Item = f64> + '_ {
        self.columns.iter().map(RunningStats::std)
    }
}
