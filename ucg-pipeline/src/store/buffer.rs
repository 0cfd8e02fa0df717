//! Adaptive per-table row buffer: rolls on row count or estimated byte size,
//! the latter sampled every 1000 rows rather than on every `add`, mirroring
//! `_AdaptiveRowBuffer` in `ucg_store.py`.

const BYTE_SAMPLE_INTERVAL: usize = 1000;

pub struct AdaptiveRowBuffer<T> {
    rows: Vec<T>,
    roll_rows: usize,
    max_bytes: Option<usize>,
    estimated_bytes: usize,
    since_last_sample: usize,
}

impl<T> AdaptiveRowBuffer<T> {
    pub fn new(roll_rows: usize, max_bytes: Option<usize>) -> Self {
        Self {
            rows: Vec::new(),
            roll_rows,
            max_bytes,
            estimated_bytes: 0,
            since_last_sample: 0,
        }
    }

    /// `size_hint` is a cheap estimate of the row's serialized size (e.g.
    /// summed string lengths); only consulted every `BYTE_SAMPLE_INTERVAL`
    /// rows to keep `add` itself allocation-free.
    pub fn add(&mut self, row: T, size_hint: impl FnOnce() -> usize) {
        self.rows.push(row);
        self.since_last_sample += 1;
        if self.max_bytes.is_some() && self.since_last_sample >= BYTE_SAMPLE_INTERVAL {
            self.estimated_bytes += size_hint();
            self.since_last_sample = 0;
        }
    }

    pub fn should_roll(&self) -> bool {
        if self.rows.len() >= self.roll_rows {
            return true;
        }
        match self.max_bytes {
            Some(cap) => self.estimated_bytes >= cap,
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.estimated_bytes = 0;
        self.since_last_sample = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolls_on_row_count() {
        let mut buf: AdaptiveRowBuffer<u32> = AdaptiveRowBuffer::new(3, None);
        buf.add(1, || 0);
        buf.add(2, || 0);
        assert!(!buf.should_roll());
        buf.add(3, || 0);
        assert!(buf.should_roll());
    }

    #[test]
    fn rolls_on_sampled_byte_estimate() {
        let mut buf: AdaptiveRowBuffer<u32> = AdaptiveRowBuffer::new(1_000_000, Some(10));
        for i in 0..BYTE_SAMPLE_INTERVAL {
            buf.add(i as u32, || 20);
        }
        assert!(buf.should_roll());
    }

    #[test]
    fn clear_resets_estimate() {
        let mut buf: AdaptiveRowBuffer<u32> = AdaptiveRowBuffer::new(2, None);
        buf.add(1, || 0);
        buf.add(2, || 0);
        buf.clear();
        assert!(buf.is_empty());
        assert!(!buf.should_roll());
    }
}
