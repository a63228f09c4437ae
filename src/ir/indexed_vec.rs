//! An ordered container of IR nodes that also indexes its declarations by
//! name.
//!
//! The sequence is the source of truth for order and ownership. The index
//! holds shared handles to elements that are also in the sequence, keyed by
//! declaration name, and is kept in step with every mutation:
//!
//! - every indexed entry refers to an element currently in the sequence
//! - a declaration whose name is already indexed is reported as a duplicate;
//!   it is kept in the sequence but the original entry stays in the index
//! - removing a declaration that was never indexed, or popping from an empty
//!   container, is an internal fault
//!
//! The sequence can only be changed through the methods below; read access is
//! through `Deref<Target = [T]>`.

use std::collections::BTreeMap;

use hashbrown::HashMap;

use super::{IrNode, NodeId};
use crate::{
    diagnostics::{Diagnostics, bug, report_error},
    intern::InternedSymbol,
};

#[derive(Debug, Clone)]
pub struct IndexedVec<T> {
    elements: Vec<T>,
    declarations: HashMap<InternedSymbol, IndexEntry<T>>,
    /// Index entries in insertion order, for deterministic iteration
    order: BTreeMap<u64, InternedSymbol>,
    next_order: u64,
}

#[derive(Debug, Clone)]
struct IndexEntry<T> {
    order: u64,
    node: T,
}

impl<T> Default for IndexedVec<T> {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
            declarations: HashMap::new(),
            order: BTreeMap::new(),
            next_order: 0,
        }
    }
}

impl<T: IrNode> IndexedVec<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a container from a plain sequence, indexing each element in
    /// order exactly as repeated insertion would
    pub fn from_vec(elements: Vec<T>, diagnostics: &Diagnostics) -> Self {
        let mut vec = Self::new();
        vec.insert_all(0, elements, diagnostics);
        vec
    }

    pub fn as_slice(&self) -> &[T] {
        &self.elements
    }

    pub fn into_vec(self) -> Vec<T> {
        self.elements
    }

    /// Looks up the declaration indexed under `name`
    pub fn get_declaration(&self, name: InternedSymbol) -> Option<&T> {
        self.declarations.get(&name).map(|entry| &entry.node)
    }

    /// The indexed declarations in the order they entered the index. Each
    /// call starts a fresh iteration over the index as it is now.
    pub fn declarations(&self) -> impl Iterator<Item = &T> + '_ {
        self.order
            .values()
            .filter_map(|name| self.declarations.get(name))
            .map(|entry| &entry.node)
    }

    /// Position of the element indexed under `name`
    pub fn position_of(&self, name: InternedSymbol) -> Option<usize> {
        let id = self.get_declaration(name)?.id();
        self.position_of_id(id)
    }

    pub fn position_of_id(&self, id: NodeId) -> Option<usize> {
        self.elements.iter().position(|e| e.id() == id)
    }

    /// Inserts `value` before `position`, returning the position just after
    /// it
    pub fn insert(&mut self, position: usize, value: T, diagnostics: &Diagnostics) -> usize {
        if position > self.elements.len() {
            bug!(
                "insert of {} (node {}) at {position} past the end of a container of {} elements",
                value.kind(),
                value.id(),
                self.elements.len()
            );
        }

        self.insert_in_map(&value, diagnostics);
        self.elements.insert(position, value);
        position + 1
    }

    /// Inserts every value before `position`. Values are indexed in order
    /// before any is spliced in, so a later duplicate within the batch is
    /// reported against the earlier one.
    pub fn insert_all(
        &mut self,
        position: usize,
        values: impl IntoIterator<Item = T>,
        diagnostics: &Diagnostics,
    ) -> usize {
        if position > self.elements.len() {
            bug!(
                "bulk insert at {position} past the end of a container of {} elements",
                self.elements.len()
            );
        }

        let values = values.into_iter().collect::<Vec<_>>();

        for value in &values {
            self.insert_in_map(value, diagnostics);
        }

        let inserted = values.len();
        self.elements.splice(position..position, values);
        position + inserted
    }

    pub fn push(&mut self, value: T, diagnostics: &Diagnostics) {
        self.insert_in_map(&value, diagnostics);
        self.elements.push(value);
    }

    /// Appends every element of `other`, merging its declarations into this
    /// container's scope
    pub fn append(&mut self, other: &IndexedVec<T>, diagnostics: &Diagnostics) -> usize {
        self.insert_all(self.elements.len(), other.elements.iter().cloned(), diagnostics)
    }

    /// Removes and returns the element at `position`
    pub fn erase(&mut self, position: usize) -> T {
        if position >= self.elements.len() {
            bug!(
                "erase at {position} in a container of {} elements",
                self.elements.len()
            );
        }

        let element = self.elements.remove(position);
        self.remove_from_map(&element);
        element
    }

    /// Replaces the element at `position` without moving any other element.
    /// The old element's index entry is dropped before the new one is
    /// indexed. Returns the old element.
    pub fn replace(&mut self, position: usize, value: T, diagnostics: &Diagnostics) -> T {
        if position >= self.elements.len() {
            bug!(
                "replace at {position} in a container of {} elements",
                self.elements.len()
            );
        }

        let old = std::mem::replace(&mut self.elements[position], value);
        self.remove_from_map(&old);

        let new = self.elements[position].clone();
        self.insert_in_map(&new, diagnostics);

        old
    }

    pub fn pop(&mut self) -> T {
        let Some(last) = self.elements.pop() else {
            bug!("pop from empty IndexedVec");
        };

        self.remove_from_map(&last);
        last
    }

    /// Erases every element for which `keep` returns false
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        let mut position = 0;

        while position < self.elements.len() {
            if keep(&self.elements[position]) {
                position += 1;
            } else {
                self.erase(position);
            }
        }
    }

    pub fn clear(&mut self) {
        self.elements.clear();
        self.declarations.clear();
        self.order.clear();
    }

    /// Panics if the index and sequence disagree
    pub fn check_valid(&self) {
        for (name, entry) in &self.declarations {
            let Some(declaration) = entry.node.as_declaration() else {
                bug!("index entry `{name}` holds non-declaration {}", entry.node.kind());
            };

            if declaration.name() != *name {
                bug!(
                    "index entry `{name}` holds {} `{}`",
                    entry.node.kind(),
                    declaration.name()
                );
            }

            if self.position_of_id(entry.node.id()).is_none() {
                bug!(
                    "index entry `{name}` refers to node {} which is not in the sequence",
                    entry.node.id()
                );
            }

            if self.order.get(&entry.order) != Some(name) {
                bug!("index entry `{name}` is missing from the insertion order");
            }
        }

        if self.order.len() != self.declarations.len() {
            bug!(
                "insertion order has {} names but the index has {} entries",
                self.order.len(),
                self.declarations.len()
            );
        }

        for element in &self.elements {
            if let Some(declaration) = element.as_declaration() {
                if !self.declarations.contains_key(&declaration.name()) {
                    bug!(
                        "{} `{}` (node {}) is not indexed",
                        element.kind(),
                        declaration.name(),
                        element.id()
                    );
                }
            }
        }
    }

    fn insert_in_map(&mut self, value: &T, diagnostics: &Diagnostics) {
        let Some(declaration) = value.as_declaration() else {
            return;
        };
        let name = declaration.name();

        if let Some(previous) = self.declarations.get(&name) {
            report_error!(
                diagnostics,
                "{} `{name}` duplicates declaration {} `{name}`",
                value.kind(),
                previous.node.kind()
            );
            return;
        }

        let order = self.next_order;
        self.next_order += 1;

        self.declarations.insert(
            name,
            IndexEntry {
                order,
                node: value.clone(),
            },
        );
        self.order.insert(order, name);
    }

    fn remove_from_map(&mut self, element: &T) {
        let Some(declaration) = element.as_declaration() else {
            return;
        };
        let name = declaration.name();

        let indexed_here = match self.declarations.get(&name) {
            Some(entry) => entry.node.id() == element.id(),
            None => bug!(
                "{} `{name}` (node {}) does not exist in the declaration index",
                element.kind(),
                element.id()
            ),
        };

        // A duplicate never owned the entry; the earlier declaration keeps it
        if !indexed_here {
            return;
        }

        if let Some(entry) = self.declarations.remove(&name) {
            self.order.remove(&entry.order);
        }
    }
}

impl<T> core::ops::Deref for IndexedVec<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.elements
    }
}

impl<'a, T> IntoIterator for &'a IndexedVec<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl<T> IntoIterator for IndexedVec<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Statement, Type, build::IrBuilder};

    fn names(vec: &IndexedVec<Statement>) -> Vec<&'static str> {
        vec.declarations()
            .filter_map(|s| s.as_declaration())
            .map(|d| d.name().value())
            .collect()
    }

    #[test]
    fn lookup_finds_declarations_and_skips_statements() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let x = b.var("x", Type::Bits(8), None);
        let vec = IndexedVec::from_vec(
            vec![x.clone(), b.assign("x", b.int(1)), b.var("y", Type::Bool, None)],
            &diagnostics,
        );

        assert_eq!(vec.len(), 3);
        assert_eq!(vec.get_declaration(b.sym("x")).map(IrNode::id), Some(x.id()));
        assert!(vec.get_declaration(b.sym("z")).is_none());
        assert_eq!(names(&vec), vec!["x", "y"]);
        assert_eq!(diagnostics.error_count(), 0);
        vec.check_valid();
    }

    #[test]
    fn duplicate_keeps_first_entry_and_both_elements() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let first = b.var("x", Type::Bits(8), None);
        let second = b.var("x", Type::Bool, None);

        let mut vec = IndexedVec::new();
        vec.push(first.clone(), &diagnostics);
        vec.push(second.clone(), &diagnostics);

        assert_eq!(diagnostics.error_count(), 1);
        assert!(diagnostics.errors()[0].contains("duplicates declaration"));
        assert_eq!(vec.get_declaration(b.sym("x")).map(IrNode::id), Some(first.id()));
        assert_eq!(
            vec.iter().map(IrNode::id).collect::<Vec<_>>(),
            vec![first.id(), second.id()]
        );
        vec.check_valid();

        // Erasing the dead duplicate leaves the live entry alone
        vec.erase(1);
        assert_eq!(vec.get_declaration(b.sym("x")).map(IrNode::id), Some(first.id()));
        vec.check_valid();
    }

    #[test]
    fn duplicates_within_one_batch_are_reported() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let mut vec = IndexedVec::from_vec(vec![b.var("a", Type::Bool, None)], &diagnostics);
        let next = vec.insert_all(
            0,
            vec![b.var("b", Type::Bool, None), b.var("b", Type::Bool, None)],
            &diagnostics,
        );

        assert_eq!(next, 2);
        assert_eq!(vec.len(), 3);
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(names(&vec), vec!["a", "b"]);
    }

    #[test]
    fn replace_renames_in_place() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let a = b.var("x", Type::Bool, None);
        let bb = b.var("y", Type::Bool, None);
        let c = b.var("z", Type::Bool, None);
        let mut vec = IndexedVec::from_vec(vec![a.clone(), bb.clone(), c], &diagnostics);

        let renamed = b.var("x", Type::Bool, None);
        vec.replace(2, renamed.clone(), &diagnostics);

        assert_eq!(diagnostics.error_count(), 1);
        assert!(vec.get_declaration(b.sym("z")).is_none());
        assert_eq!(vec.get_declaration(b.sym("x")).map(IrNode::id), Some(a.id()));
        assert_eq!(
            vec.iter().map(IrNode::id).collect::<Vec<_>>(),
            vec![a.id(), bb.id(), renamed.id()]
        );
        assert_eq!(names(&vec), vec!["x", "y"]);
        vec.check_valid();
    }

    #[test]
    fn replace_moves_entry_to_end_of_declaration_order() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let mut vec = IndexedVec::from_vec(
            vec![b.var("x", Type::Bool, None), b.var("y", Type::Bool, None)],
            &diagnostics,
        );
        vec.replace(0, b.var("w", Type::Bool, None), &diagnostics);

        assert_eq!(diagnostics.error_count(), 0);
        assert_eq!(names(&vec), vec!["y", "w"]);
        assert_eq!(vec.position_of(b.sym("w")), Some(0));
    }

    #[test]
    fn erase_pop_retain_and_clear_keep_index_in_sync() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let mut vec = IndexedVec::from_vec(
            vec![
                b.var("a", Type::Bool, None),
                b.exit(),
                b.var("b", Type::Bool, None),
                b.var("c", Type::Bool, None),
            ],
            &diagnostics,
        );

        let erased = vec.erase(0);
        assert_eq!(erased.as_declaration().map(|d| d.name()), Some(b.sym("a")));
        assert!(vec.get_declaration(b.sym("a")).is_none());

        vec.pop();
        assert!(vec.get_declaration(b.sym("c")).is_none());

        vec.retain(|s| s.as_declaration().is_some());
        assert_eq!(vec.len(), 1);
        assert_eq!(names(&vec), vec!["b"]);
        vec.check_valid();

        vec.clear();
        assert!(vec.is_empty());
        assert_eq!(vec.declarations().count(), 0);
    }

    #[test]
    fn append_merges_scopes() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let mut outer = IndexedVec::from_vec(vec![b.var("a", Type::Bool, None)], &diagnostics);
        let inner = IndexedVec::from_vec(
            vec![b.var("b", Type::Bool, None), b.var("a", Type::Bool, None)],
            &diagnostics,
        );

        outer.append(&inner, &diagnostics);

        assert_eq!(outer.len(), 3);
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(names(&outer), vec!["a", "b"]);
    }

    #[test]
    #[should_panic(expected = "pop from empty IndexedVec")]
    fn pop_from_empty_is_a_bug() {
        let mut vec: IndexedVec<Statement> = IndexedVec::new();
        vec.pop();
    }

    #[test]
    #[should_panic(expected = "does not exist in the declaration index")]
    fn erasing_unindexed_declaration_is_a_bug() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let mut vec = IndexedVec::from_vec(vec![b.var("a", Type::Bool, None)], &diagnostics);
        // Corrupt the index behind the container's back
        vec.declarations.clear();
        vec.order.clear();
        vec.erase(0);
    }
}
