//! Rolling history of the mixed output for visualisation.

/// Frames kept in the history ring.
pub const SCOPE_LEN: usize = 32768;

/// Fixed-size ring of recent output frames.
#[derive(Debug)]
pub struct Oscilloscope {
    left: Box<[f32]>,
    right: Box<[f32]>,
    /// Next write position
    pos: usize,
}

impl Default for Oscilloscope {
    fn default() -> Self {
        Self::new()
    }
}

impl Oscilloscope {
    pub fn new() -> Self {
        Self {
            left: vec![0.0; SCOPE_LEN].into_boxed_slice(),
            right: vec![0.0; SCOPE_LEN].into_boxed_slice(),
            pos: 0,
        }
    }

    /// Append a block, overwriting the oldest frames.
    pub fn push(&mut self, left: &[f32], right: &[f32]) {
        for (&l, &r) in left.iter().zip(right) {
            self.left[self.pos] = l;
            self.right[self.pos] = r;
            self.pos = (self.pos + 1) % SCOPE_LEN;
        }
    }

    /// Copy the most recent `out_l.len()` frames, oldest first.
    pub fn latest(&self, out_l: &mut [f32], out_r: &mut [f32]) {
        let n = out_l.len().min(out_r.len()).min(SCOPE_LEN);
        let start = (self.pos + SCOPE_LEN - n) % SCOPE_LEN;
        for i in 0..n {
            let j = (start + i) % SCOPE_LEN;
            out_l[i] = self.left[j];
            out_r[i] = self.right[j];
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn clear(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
        self.pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_returns_newest_in_order() {
        let mut scope = Oscilloscope::new();
        let data: Vec<f32> = (0..10).map(|i| i as f32).collect();
        scope.push(&data, &data);
        let mut l = [0.0; 3];
        let mut r = [0.0; 3];
        scope.latest(&mut l, &mut r);
        assert_eq!(l, [7.0, 8.0, 9.0]);
    }

    #[test]
    fn ring_wraps() {
        let mut scope = Oscilloscope::new();
        let block = vec![1.0f32; SCOPE_LEN - 2];
        scope.push(&block, &block);
        scope.push(&[2.0, 3.0, 4.0], &[2.0, 3.0, 4.0]);
        assert_eq!(scope.position(), 1);
        let mut l = [0.0; 4];
        let mut r = [0.0; 4];
        scope.latest(&mut l, &mut r);
        assert_eq!(l, [1.0, 2.0, 3.0, 4.0]);
    }
}
