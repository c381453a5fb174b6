use std::collections::HashMap;

use crate::error::{PlanError, PlanResult};

pub type SymbolId = usize;

/// What a frame slot holds at runtime. `Any` covers values that flow
/// through projections untyped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Vertex,
    Edge,
    EdgeList,
    Path,
    Any,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub id: SymbolId,
    pub kind: SymbolKind,
}

/// Assigns frame slots to query variables during semantic analysis.
///
/// Slots are never recycled: `WITH` narrows the *visible* name set but the
/// frame keeps its width for the whole query, so operators on either side
/// of the projection address the same frame layout.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    visible: HashMap<String, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a fresh symbol, failing on a visible duplicate.
    pub fn declare(&mut self, name: &str, kind: SymbolKind) -> PlanResult<SymbolId> {
        if self.visible.contains_key(name) {
            return Err(PlanError::Redeclaration(name.to_string()));
        }
        Ok(self.insert(name, kind))
    }

    /// Resolves `name`, or declares it when unseen. Re-mentioning a pattern
    /// variable is how Cypher joins, so patterns use this instead of
    /// [`Self::declare`].
    pub fn get_or_declare(&mut self, name: &str, kind: SymbolKind) -> PlanResult<(SymbolId, bool)> {
        if let Some(&id) = self.visible.get(name) {
            let existing = &self.symbols[id];
            if existing.kind != kind && existing.kind != SymbolKind::Any && kind != SymbolKind::Any
            {
                return Err(PlanError::TypeMismatch {
                    name: name.to_string(),
                    expected: kind_name(kind),
                    actual: kind_name(existing.kind),
                });
            }
            return Ok((id, false));
        }
        Ok((self.insert(name, kind), true))
    }

    /// Declares an anonymous symbol (unnamed pattern parts, aggregate
    /// outputs). Anonymous symbols are never visible by name.
    pub fn declare_anonymous(&mut self, kind: SymbolKind) -> SymbolId {
        let id = self.symbols.len();
        self.symbols.push(Symbol {
            name: format!("@anon{id}"),
            id,
            kind,
        });
        id
    }

    pub fn resolve(&self, name: &str) -> PlanResult<SymbolId> {
        self.visible
            .get(name)
            .copied()
            .ok_or_else(|| PlanError::UnknownIdentifier(name.to_string()))
    }

    pub fn kind(&self, id: SymbolId) -> SymbolKind {
        self.symbols[id].kind
    }

    pub fn name(&self, id: SymbolId) -> &str {
        &self.symbols[id].name
    }

    /// Replaces the visible name set; `WITH`/`RETURN` projections call this
    /// with their output bindings.
    pub fn restrict_visible(&mut self, bindings: &[(String, SymbolId)]) {
        self.visible = bindings.iter().cloned().map(|(n, s)| (n, s)).collect();
    }

    pub fn visible_symbols(&self) -> Vec<SymbolId> {
        let mut ids: Vec<SymbolId> = self.visible.values().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Total number of slots a frame needs.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    fn insert(&mut self, name: &str, kind: SymbolKind) -> SymbolId {
        let id = self.symbols.len();
        self.symbols.push(Symbol {
            name: name.to_string(),
            id,
            kind,
        });
        self.visible.insert(name.to_string(), id);
        id
    }
}

fn kind_name(kind: SymbolKind) -> &'static str {
    match kind {
        SymbolKind::Vertex => "vertex",
        SymbolKind::Edge => "edge",
        SymbolKind::EdgeList => "edge list",
        SymbolKind::Path => "path",
        SymbolKind::Any => "value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redeclaration_is_an_error() {
        let mut table = SymbolTable::new();
        table.declare("n", SymbolKind::Vertex).unwrap();
        assert!(matches!(
            table.declare("n", SymbolKind::Vertex),
            Err(PlanError::Redeclaration(_))
        ));
    }

    #[test]
    fn pattern_reuse_joins_on_the_same_slot() {
        let mut table = SymbolTable::new();
        let (a, fresh) = table.get_or_declare("n", SymbolKind::Vertex).unwrap();
        assert!(fresh);
        let (b, fresh) = table.get_or_declare("n", SymbolKind::Vertex).unwrap();
        assert!(!fresh);
        assert_eq!(a, b);
        assert!(matches!(
            table.get_or_declare("n", SymbolKind::Edge),
            Err(PlanError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn with_narrows_visibility_but_keeps_slots() {
        let mut table = SymbolTable::new();
        let n = table.declare("n", SymbolKind::Vertex).unwrap();
        let m = table.declare("m", SymbolKind::Vertex).unwrap();
        table.restrict_visible(&[("m".to_string(), m)]);
        assert!(table.resolve("n").is_err());
        assert_eq!(table.resolve("m").unwrap(), m);
        assert_eq!(table.len(), 2);
        assert!(n < table.len());
    }
}
