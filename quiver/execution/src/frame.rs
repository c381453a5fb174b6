use quiver_planner::SymbolId;

use crate::value::Value;

/// A fixed-slot row: one slot per symbol the planner assigned.
#[derive(Debug, Clone)]
pub struct Frame {
    slots: Vec<Value>,
}

impl Frame {
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![Value::NULL; size],
        }
    }

    pub fn get(&self, symbol: SymbolId) -> &Value {
        &self.slots[symbol]
    }

    pub fn set(&mut self, symbol: SymbolId, value: Value) {
        self.slots[symbol] = value;
    }

    /// Snapshot of selected slots, used by materializing operators.
    pub fn save(&self, symbols: &[SymbolId]) -> Vec<Value> {
        symbols.iter().map(|s| self.slots[*s].clone()).collect()
    }

    /// Restores a snapshot taken with [`Self::save`] over the same symbols.
    pub fn restore(&mut self, symbols: &[SymbolId], values: &[Value]) {
        debug_assert_eq!(symbols.len(), values.len());
        for (symbol, value) in symbols.iter().zip(values.iter()) {
            self.slots[*symbol] = value.clone();
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
