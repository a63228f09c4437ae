use pktc::{
    diagnostics::Diagnostics,
    intern::InternedSymbol,
    ir::{IndexedVec, IrNode, Item, Type, build::IrBuilder},
};
use proptest::prelude::*;

const NAMES: [&str; 5] = ["a", "b", "c", "d", "e"];

#[derive(Debug, Clone)]
enum Op {
    Insert { at: usize, name: usize },
    Push { name: usize },
    Erase { at: usize },
    Replace { at: usize, name: usize },
    Pop,
    Clear,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (any::<usize>(), 0..NAMES.len()).prop_map(|(at, name)| Op::Insert { at, name }),
        2 => (0..NAMES.len()).prop_map(|name| Op::Push { name }),
        2 => any::<usize>().prop_map(|at| Op::Erase { at }),
        2 => (any::<usize>(), 0..NAMES.len()).prop_map(|(at, name)| Op::Replace { at, name }),
        1 => Just(Op::Pop),
        1 => Just(Op::Clear),
    ]
}

fn holds(vec: &IndexedVec<Item>, name: &str, except: Option<usize>) -> bool {
    vec.iter()
        .enumerate()
        .any(|(position, item)| Some(position) != except && item.name().value() == name)
}

/// Applies `op` unless it would create a duplicate or act on an empty
/// container
fn apply(vec: &mut IndexedVec<Item>, op: &Op, b: &IrBuilder<'_>, diagnostics: &Diagnostics) {
    let item = |name: usize| b.global_var(NAMES[name], Type::Bool, None);

    match *op {
        Op::Insert { at, name } if !holds(vec, NAMES[name], None) => {
            let at = at % (vec.len() + 1);
            vec.insert(at, item(name), diagnostics);
        }
        Op::Push { name } if !holds(vec, NAMES[name], None) => vec.push(item(name), diagnostics),
        Op::Erase { at } if !vec.is_empty() => {
            vec.erase(at % vec.len());
        }
        Op::Replace { at, name } if !vec.is_empty() => {
            let at = at % vec.len();
            if !holds(vec, NAMES[name], Some(at)) {
                vec.replace(at, item(name), diagnostics);
            }
        }
        Op::Pop if !vec.is_empty() => {
            vec.pop();
        }
        Op::Clear => vec.clear(),
        _ => {}
    }
}

proptest! {
    #[test]
    fn index_matches_sequence_after_every_operation(ops in prop::collection::vec(op(), 0..40)) {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);
        let mut vec = IndexedVec::<Item>::new();

        for op in &ops {
            apply(&mut vec, op, &b, &diagnostics);
            vec.check_valid();

            for item in vec.iter() {
                let indexed = vec.get_declaration(item.name());
                prop_assert_eq!(indexed.map(|i| i.id()), Some(item.id()));
            }

            for name in NAMES {
                if !holds(&vec, name, None) {
                    prop_assert!(vec.get_declaration(InternedSymbol::new(name)).is_none());
                }
            }

            prop_assert_eq!(vec.declarations().count(), vec.len());
        }

        prop_assert_eq!(diagnostics.error_count(), 0);
    }

    #[test]
    fn duplicates_are_reported_once_and_keep_the_first(
        first in 0..NAMES.len(),
        position in 0..NAMES.len(),
    ) {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let items = NAMES
            .iter()
            .map(|name| b.global_var(name, Type::Bool, None))
            .collect::<Vec<_>>();
        let original = items[first].clone();
        let mut vec = IndexedVec::from_vec(items, &diagnostics);

        let duplicate = b.global_var(NAMES[first], Type::Bits(8), None);
        vec.insert(position, duplicate.clone(), &diagnostics);

        prop_assert_eq!(diagnostics.error_count(), 1);
        prop_assert_eq!(vec.len(), NAMES.len() + 1);
        prop_assert_eq!(
            vec.get_declaration(original.name()).map(|i| i.id()),
            Some(original.id())
        );
        prop_assert!(vec.iter().any(|item| item.id() == duplicate.id()));
        vec.check_valid();
    }
}

#[test]
fn renaming_onto_an_existing_name_leaves_a_dead_duplicate() {
    let diagnostics = Diagnostics::silent();
    let b = IrBuilder::new(&diagnostics);

    let a = b.global_var("x", Type::Bool, None);
    let bb = b.global_var("y", Type::Bool, None);
    let c = b.global_var("z", Type::Bool, None);
    let mut vec = IndexedVec::from_vec(vec![a.clone(), bb.clone(), c], &diagnostics);

    let renamed = b.global_var("x", Type::Bits(8), None);
    vec.replace(2, renamed.clone(), &diagnostics);

    assert_eq!(diagnostics.error_count(), 1);
    assert_eq!(
        vec.iter().map(|item| item.id()).collect::<Vec<_>>(),
        vec![a.id(), bb.id(), renamed.id()]
    );
    assert_eq!(
        vec.declarations().map(|item| item.id()).collect::<Vec<_>>(),
        vec![a.id(), bb.id()]
    );
    assert!(vec.get_declaration(InternedSymbol::new("z")).is_none());
    vec.check_valid();
}
