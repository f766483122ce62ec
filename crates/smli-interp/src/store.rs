use crate::value::Value;
use std::collections::BTreeSet;

/// Reference cells. Addresses are indices and are never reused; every write
/// is journaled so callers can ask what changed since a mark.
#[derive(Debug, Clone, Default)]
pub struct Store {
    cells: Vec<Value>,
    journal: Vec<usize>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, v: Value) -> usize {
        let addr = self.cells.len();
        self.cells.push(v);
        self.journal.push(addr);
        addr
    }

    pub fn get(&self, addr: usize) -> Option<&Value> {
        self.cells.get(addr)
    }

    /// Returns `false` if `addr` was never allocated.
    pub fn set(&mut self, addr: usize, v: Value) -> bool {
        match self.cells.get_mut(addr) {
            Some(cell) => {
                *cell = v;
                self.journal.push(addr);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn mark(&self) -> usize {
        self.journal.len()
    }

    /// Drops the journal; earlier marks become meaningless.
    pub fn forget_changes(&mut self) {
        self.journal.clear();
    }

    /// Current contents of every cell written or allocated since `mark`, by address.
    pub fn changes_since(&self, mark: usize) -> Vec<(usize, Value)> {
        let touched: BTreeSet<usize> = self.journal.iter().skip(mark).copied().collect();
        touched
            .into_iter()
            .filter_map(|addr| self.cells.get(addr).map(|v| (addr, v.clone())))
            .collect()
    }
}
