use hashbrown::{HashMap, HashSet};

use crate::{
    intern::InternedSymbol,
    ir::{NodeId, NodeKind},
};

/// The declaration a use site resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDeclaration {
    pub id: NodeId,
    pub name: InternedSymbol,
    pub kind: NodeKind,
}

/// Maps use sites (path expressions, by node id) to the declarations they
/// denote.
///
/// The map describes one tree shape. Passes that add or remove declarations
/// or copy code invalidate it, and the pipeline rebuilds it by running
/// resolution again rather than patching it.
///
/// It also hands out fresh names: every name declared anywhere in the last
/// resolved program is remembered, and [`ReferenceMap::new_name`] never
/// returns one of them twice.
#[derive(Debug, Default)]
pub struct ReferenceMap {
    resolutions: HashMap<NodeId, ResolvedDeclaration>,
    /// Number of use sites per declaration id
    uses: HashMap<NodeId, usize>,
    /// Number of use sites per declaration name
    name_uses: HashMap<InternedSymbol, usize>,
    used_names: HashSet<InternedSymbol>,
    name_counters: HashMap<InternedSymbol, usize>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every resolution. Names handed out so far stay reserved.
    pub fn clear(&mut self) {
        self.resolutions.clear();
        self.uses.clear();
        self.name_uses.clear();
    }

    pub fn set_declaration(&mut self, use_site: NodeId, declaration: ResolvedDeclaration) {
        if let Some(previous) = self.resolutions.insert(use_site, declaration) {
            // Re-resolving a site must not count it twice
            self.forget_use(previous);
        }

        *self.uses.entry(declaration.id).or_default() += 1;
        *self.name_uses.entry(declaration.name).or_default() += 1;
    }

    fn forget_use(&mut self, declaration: ResolvedDeclaration) {
        if let Some(count) = self.uses.get_mut(&declaration.id) {
            *count = count.saturating_sub(1);
        }

        if let Some(count) = self.name_uses.get_mut(&declaration.name) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn get_declaration(&self, use_site: NodeId) -> Option<&ResolvedDeclaration> {
        self.resolutions.get(&use_site)
    }

    pub fn is_used(&self, declaration: NodeId) -> bool {
        self.use_count(declaration) > 0
    }

    pub fn use_count(&self, declaration: NodeId) -> usize {
        self.uses.get(&declaration).copied().unwrap_or(0)
    }

    /// Number of use sites resolving to any declaration called `name`
    pub fn uses_of_name(&self, name: InternedSymbol) -> usize {
        self.name_uses.get(&name).copied().unwrap_or(0)
    }

    pub fn resolution_count(&self) -> usize {
        self.resolutions.len()
    }

    /// Reserves a name that exists in the program
    pub fn note_name(&mut self, name: InternedSymbol) {
        self.used_names.insert(name);
    }

    /// Returns a name derived from `base` that is not declared anywhere and
    /// was never returned before
    pub fn new_name(&mut self, base: InternedSymbol) -> InternedSymbol {
        loop {
            let counter = self.name_counters.entry(base).or_default();
            let candidate = InternedSymbol::new(&format!("{base}_{counter}"));
            *counter += 1;

            if self.used_names.insert(candidate) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declaration(name: &str) -> ResolvedDeclaration {
        ResolvedDeclaration {
            id: NodeId::fresh(),
            name: InternedSymbol::new(name),
            kind: NodeKind::Variable,
        }
    }

    #[test]
    fn counts_uses_per_declaration_and_name() {
        let mut map = ReferenceMap::new();
        let x = declaration("x");
        let y = declaration("y");

        let site = NodeId::fresh();
        map.set_declaration(site, x);
        map.set_declaration(NodeId::fresh(), x);
        assert_eq!(map.use_count(x.id), 2);
        assert_eq!(map.uses_of_name(x.name), 2);
        assert!(!map.is_used(y.id));

        // Re-resolving a site moves its use
        map.set_declaration(site, y);
        assert_eq!(map.use_count(x.id), 1);
        assert_eq!(map.use_count(y.id), 1);
        assert_eq!(map.get_declaration(site), Some(&y));

        map.clear();
        assert_eq!(map.resolution_count(), 0);
        assert!(!map.is_used(x.id));
    }

    #[test]
    fn new_names_skip_declared_ones() {
        let mut map = ReferenceMap::new();
        let base = InternedSymbol::new("tmp");
        map.note_name(InternedSymbol::new("tmp_0"));

        assert_eq!(map.new_name(base).value(), "tmp_1");
        assert_eq!(map.new_name(base).value(), "tmp_2");

        map.clear();
        assert_eq!(map.new_name(base).value(), "tmp_3");
    }
}
