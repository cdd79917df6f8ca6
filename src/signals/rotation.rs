/// Round-robin choice of which pool sources run on a given collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRotation {
    pool: Vec<String>,
    pick: usize,
    index: usize,
}

impl SourceRotation {
    pub fn new(pool: Vec<String>, pick: usize, index: usize) -> Self {
        let index = if pool.is_empty() { 0 } else { index % pool.len() };
        Self { pool, pick, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The next `pick` sources, wrapping around the pool, and advance.
    pub fn advance(&mut self) -> Vec<String> {
        if self.pool.is_empty() {
            return Vec::new();
        }
        let take = self.pick.min(self.pool.len());
        let picked = (0..take)
            .map(|i| self.pool[(self.index + i) % self.pool.len()].clone())
            .collect();
        self.index = (self.index + take) % self.pool.len();
        picked
    }
}
