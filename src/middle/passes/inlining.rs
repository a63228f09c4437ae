//! Call-site inlining.
//!
//! Inlining is split into discovery, which records the call sites to expand
//! in an [`InlineWorkList`], and an [`InlineDriver`] that expands them. The
//! driver is parameterized by an [`Inliner`] strategy so function inlining
//! and action inlining share the machinery.
//!
//! Callees are expanded before their callers, so by the time a callee's body
//! is copied it no longer contains calls that are themselves on the work
//! list. Each expanded call becomes a block that declares the callee's
//! parameters (initialized from the arguments) followed by a copy of the
//! callee's body in which every local declaration has a fresh name.

use core::fmt;
use std::{collections::VecDeque, rc::Rc};

use hashbrown::{HashMap, HashSet};

use crate::{
    diagnostics::{Diagnostics, bug, report_error},
    intern::InternedSymbol,
    ir::{
        Block, CallStatement, Control, Expression, IfStatement, IndexedVec, IrNode,
        Item, NodeId, NodeKind, Parameter, PathExpression, Program, Statement, Type, Variable,
        fold::{self, Folder},
        visit::{self, Visitor},
    },
    middle::{
        pass::{Pass, PassContext},
        reference_map::ReferenceMap,
    },
};

/// Names a callable body: a top-level action or function, an action or
/// function declared among a control's locals, or a control's apply block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallableRef {
    TopLevel(InternedSymbol),
    Local {
        control: InternedSymbol,
        name: InternedSymbol,
    },
    Apply(InternedSymbol),
}

impl fmt::Display for CallableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallableRef::TopLevel(name) => write!(f, "{name}"),
            CallableRef::Local { control, name } => write!(f, "{control}.{name}"),
            CallableRef::Apply(control) => write!(f, "{control}.apply"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub caller: CallableRef,
    pub callee: CallableRef,
    /// Id of the call statement in the caller's body
    pub call: NodeId,
}

#[derive(Debug, Clone, Default)]
pub struct InlineWorkList {
    sites: Vec<CallSite>,
}

impl InlineWorkList {
    pub fn add(&mut self, site: CallSite) {
        if !self.sites.contains(&site) {
            self.sites.push(site);
        }
    }

    pub fn sites(&self) -> &[CallSite] {
        &self.sites
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn clear(&mut self) {
        self.sites.clear();
    }

    /// Callers of `callee` in the order they were discovered
    pub fn callers_of(&self, callee: CallableRef) -> Vec<CallableRef> {
        let mut callers = Vec::new();

        for site in self.sites.iter().filter(|site| site.callee == callee) {
            if !callers.contains(&site.caller) {
                callers.push(site.caller);
            }
        }

        callers
    }

    /// Every callee, ordered so that a callee comes after all the callees it
    /// calls itself. Callees on a cycle are left out.
    pub fn callees_in_order(&self) -> Vec<CallableRef> {
        let mut pending = Vec::new();
        for site in &self.sites {
            if !pending.contains(&site.callee) {
                pending.push(site.callee);
            }
        }

        let mut ordered: Vec<CallableRef> = Vec::with_capacity(pending.len());

        loop {
            let ready = pending.iter().position(|&candidate| {
                self.sites
                    .iter()
                    .filter(|site| site.caller == candidate)
                    .all(|site| ordered.contains(&site.callee))
            });

            match ready {
                Some(position) => ordered.push(pending.remove(position)),
                None => return ordered,
            }
        }
    }

    /// A callable that can reach itself through the recorded call sites
    pub fn find_cycle(&self) -> Option<CallableRef> {
        let mut finished = HashSet::new();
        let mut on_path = HashSet::new();

        self.sites
            .iter()
            .find_map(|site| self.cycle_from(site.caller, &mut finished, &mut on_path))
    }

    fn cycle_from(
        &self,
        node: CallableRef,
        finished: &mut HashSet<CallableRef>,
        on_path: &mut HashSet<CallableRef>,
    ) -> Option<CallableRef> {
        if finished.contains(&node) {
            return None;
        }

        if !on_path.insert(node) {
            return Some(node);
        }

        for site in self.sites.iter().filter(|site| site.caller == node) {
            if let Some(cycle) = self.cycle_from(site.callee, finished, on_path) {
                return Some(cycle);
            }
        }

        on_path.remove(&node);
        finished.insert(node);
        None
    }
}

/* Locating callables */

fn control_named(program: &Program, name: InternedSymbol) -> Option<&Rc<Control>> {
    program
        .declarations
        .get_declaration(name)
        .and_then(Item::as_control)
}

/// The declaration behind `callable`. For an apply block this is the
/// control itself.
pub fn lookup_callable(program: &Program, callable: CallableRef) -> Option<Item> {
    match callable {
        CallableRef::TopLevel(name) | CallableRef::Apply(name) => {
            program.declarations.get_declaration(name).cloned()
        }
        CallableRef::Local { control, name } => control_named(program, control)?
            .locals
            .get_declaration(name)
            .cloned(),
    }
}

fn body_of(program: &Program, callable: CallableRef) -> Option<Rc<Block>> {
    lookup_callable(program, callable)?.body().cloned()
}

/// Where a name used inside `caller` is declared: among the enclosing
/// control's locals, or at the top level
fn locate(program: &Program, caller: CallableRef, name: InternedSymbol) -> Option<CallableRef> {
    let enclosing = match caller {
        CallableRef::Local { control, .. } | CallableRef::Apply(control) => {
            control_named(program, control)
        }
        CallableRef::TopLevel(_) => None,
    };

    if let Some(control) = enclosing {
        if control.locals.get_declaration(name).is_some() {
            return Some(CallableRef::Local {
                control: control.name,
                name,
            });
        }
    }

    program
        .declarations
        .get_declaration(name)
        .map(|_| CallableRef::TopLevel(name))
}

/// Every callable body in program order
fn all_callables(program: &Program) -> Vec<CallableRef> {
    let mut callables = Vec::new();

    for item in &program.declarations {
        match item {
            Item::Action(_) | Item::Function(_) => callables.push(CallableRef::TopLevel(item.name())),
            Item::Control(control) => {
                for local in &control.locals {
                    if matches!(local, Item::Action(_) | Item::Function(_)) {
                        callables.push(CallableRef::Local {
                            control: control.name,
                            name: local.name(),
                        });
                    }
                }

                callables.push(CallableRef::Apply(control.name));
            }
            _ => {}
        }
    }

    callables
}

/// Call statements anywhere in a body
fn calls_in(body: &Rc<Block>) -> Vec<Rc<CallStatement>> {
    struct CallCollector(Vec<Rc<CallStatement>>);

    impl Visitor for CallCollector {
        fn visit_statement(&mut self, statement: &Statement) {
            if let Statement::Call(call) = statement {
                self.0.push(call.clone());
            }

            visit::walk_statement(self, statement)
        }
    }

    let mut collector = CallCollector(Vec::new());
    collector.visit_block(body);
    collector.0
}

fn report_recursion(worklist: &mut InlineWorkList, diagnostics: &Diagnostics) {
    if let Some(callable) = worklist.find_cycle() {
        report_error!(
            diagnostics,
            "`{callable}` calls itself recursively and cannot be inlined"
        );
        worklist.clear();
    }
}

/* Discovery */

/// Finds calls to void functions reachable from the controls instantiated in
/// the block map
pub struct DiscoverInlining;

impl Pass for DiscoverInlining {
    fn name(&self) -> &'static str {
        "discover-inlining"
    }

    fn apply(&mut self, program: Program, cx: &mut PassContext<'_>) -> Program {
        cx.inline_worklist.clear();

        let Some(block_map) = &cx.block_map else {
            return program;
        };
        let instantiated = block_map.instantiated_controls();

        let mut queue = program
            .declarations
            .iter()
            .filter_map(Item::as_control)
            .filter(|control| instantiated.contains(&control.name))
            .map(|control| CallableRef::Apply(control.name))
            .collect::<VecDeque<_>>();
        let mut visited = HashSet::new();
        let mut worklist = InlineWorkList::default();

        while let Some(caller) = queue.pop_front() {
            if !visited.insert(caller) {
                continue;
            }

            let Some(body) = body_of(&program, caller) else {
                continue;
            };

            for call in calls_in(&body) {
                let Some(resolved) = cx.ref_map.get_declaration(call.callee.id) else {
                    continue;
                };
                let Some(callee) = locate(&program, caller, resolved.name) else {
                    continue;
                };

                match lookup_callable(&program, callee) {
                    Some(Item::Function(function)) => {
                        if function.return_type == Type::Void {
                            worklist.add(CallSite {
                                caller,
                                callee,
                                call: call.id,
                            });
                        }

                        queue.push_back(callee);
                    }
                    Some(Item::Action(_)) => queue.push_back(callee),
                    Some(Item::Table(table)) => {
                        for action in table.actions.iter().chain(&table.default_action) {
                            queue.extend(locate(&program, caller, action.name));
                        }
                    }
                    _ => {}
                }
            }
        }

        report_recursion(&mut worklist, cx.diagnostics);
        cx.inline_worklist = worklist;

        program
    }
}

/// Finds direct calls to actions whose arguments all have known types
pub struct DiscoverActionsInlining;

impl Pass for DiscoverActionsInlining {
    fn name(&self) -> &'static str {
        "discover-actions-inlining"
    }

    fn apply(&mut self, program: Program, cx: &mut PassContext<'_>) -> Program {
        let mut worklist = InlineWorkList::default();

        for caller in all_callables(&program) {
            let Some(body) = body_of(&program, caller) else {
                continue;
            };

            for call in calls_in(&body) {
                let Some(resolved) = cx.ref_map.get_declaration(call.callee.id) else {
                    continue;
                };

                if resolved.kind != NodeKind::Action {
                    continue;
                }

                let typed = call
                    .arguments
                    .iter()
                    .all(|argument| cx.type_map.get(argument.id()).is_some());
                if !typed {
                    continue;
                }

                if let Some(callee) = locate(&program, caller, resolved.name) {
                    worklist.add(CallSite {
                        caller,
                        callee,
                        call: call.id,
                    });
                }
            }
        }

        report_recursion(&mut worklist, cx.diagnostics);
        cx.action_worklist = worklist;

        program
    }
}

/* Expansion */

/// A way of expanding one class of call sites
pub trait Inliner {
    fn name(&self) -> &'static str;

    /// Takes this strategy's work list out of the context
    fn take_worklist(&self, cx: &mut PassContext<'_>) -> InlineWorkList;

    /// Whether `argument` can replace uses of `parameter` in the copied body
    /// instead of being copied into a fresh variable
    fn substitutes(
        &self,
        _parameter: &Parameter,
        _argument: &Expression,
        _writes: &BodyWrites,
    ) -> bool {
        false
    }
}

/// Inlines void function calls. Arguments are always copied in.
pub struct GeneralInliner;

impl Inliner for GeneralInliner {
    fn name(&self) -> &'static str {
        "inline-functions"
    }

    fn take_worklist(&self, cx: &mut PassContext<'_>) -> InlineWorkList {
        std::mem::take(&mut cx.inline_worklist)
    }
}

/// Inlines action calls. A literal argument is substituted directly when the
/// action never assigns its parameter. A name argument is substituted only
/// when nothing in the action can write either the parameter or the named
/// variable, so the copy keeps reading the value passed in.
pub struct ActionsInliner;

impl Inliner for ActionsInliner {
    fn name(&self) -> &'static str {
        "inline-actions"
    }

    fn take_worklist(&self, cx: &mut PassContext<'_>) -> InlineWorkList {
        std::mem::take(&mut cx.action_worklist)
    }

    fn substitutes(
        &self,
        parameter: &Parameter,
        argument: &Expression,
        writes: &BodyWrites,
    ) -> bool {
        match argument {
            Expression::Literal(_) => !writes.assigns(parameter.name),
            Expression::Path(path) => {
                !writes.assigns(parameter.name) && !writes.may_write(path.name)
            }
            _ => false,
        }
    }
}

pub struct InlineDriver<I> {
    inliner: I,
}

impl<I: Inliner> InlineDriver<I> {
    pub fn new(inliner: I) -> Self {
        Self { inliner }
    }
}

impl<I: Inliner> Pass for InlineDriver<I> {
    fn name(&self) -> &'static str {
        self.inliner.name()
    }

    fn apply(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Program {
        let worklist = self.inliner.take_worklist(cx);

        for callee_ref in worklist.callees_in_order() {
            let Some(callee) = lookup_callable(&program, callee_ref) else {
                bug!("inlining callee `{callee_ref}` is not declared");
            };

            for caller in worklist.callers_of(callee_ref) {
                let targets = worklist
                    .sites()
                    .iter()
                    .filter(|site| site.callee == callee_ref && site.caller == caller)
                    .map(|site| site.call)
                    .collect::<HashSet<_>>();

                let mut expander = CallExpander {
                    inliner: &self.inliner,
                    callee: &callee,
                    targets,
                    names: &mut cx.ref_map,
                    diagnostics: cx.diagnostics,
                };

                rewrite_body(&mut program, caller, cx.diagnostics, |body| {
                    expander.expand_block(body)
                });
            }
        }

        program
    }
}

/// Replaces the body of `callable` with `rewrite`'s result, if any, keeping
/// every declaration at its position
fn rewrite_body(
    program: &mut Program,
    callable: CallableRef,
    diagnostics: &Diagnostics,
    rewrite: impl FnOnce(&Rc<Block>) -> Option<Rc<Block>>,
) {
    let (control_name, local_name) = match callable {
        CallableRef::TopLevel(name) => {
            let Some(position) = program.declarations.position_of(name) else {
                return;
            };
            let item = &program.declarations[position];

            let Some(body) = item.body().and_then(|body| rewrite(body)) else {
                return;
            };
            let rewritten = item.with_body(body);
            program.declarations.replace(position, rewritten, diagnostics);
            return;
        }
        CallableRef::Apply(control) => (control, None),
        CallableRef::Local { control, name } => (control, Some(name)),
    };

    let Some(position) = program.declarations.position_of(control_name) else {
        return;
    };
    let Item::Control(control) = &program.declarations[position] else {
        return;
    };

    let rewritten = match local_name {
        None => {
            let Some(body) = rewrite(&control.body) else {
                return;
            };
            Item::Control(control.clone()).with_body(body)
        }
        Some(local_name) => {
            let Some(local_position) = control.locals.position_of(local_name) else {
                return;
            };
            let local = &control.locals[local_position];

            let Some(body) = local.body().and_then(|body| rewrite(body)) else {
                return;
            };

            let mut locals = control.locals.clone();
            locals.replace(local_position, local.with_body(body), diagnostics);

            Item::Control(Rc::new(Control::new(
                control.name,
                control.parameters.clone(),
                locals,
                control.body.clone(),
            )))
        }
    };

    program.declarations.replace(position, rewritten, diagnostics);
}

struct CallExpander<'a, 'm, 'd, I> {
    inliner: &'a I,
    callee: &'a Item,
    /// Call statements to expand, by id
    targets: HashSet<NodeId>,
    names: &'m mut ReferenceMap,
    diagnostics: &'d Diagnostics,
}

impl<I: Inliner> CallExpander<'_, '_, '_, I> {
    /// Rebuilds only the parts of `block` that contain a target call; every
    /// other statement is shared with the original
    fn expand_block(&mut self, block: &Block) -> Option<Rc<Block>> {
        let mut changed = false;
        let mut components = Vec::with_capacity(block.components.len());

        for statement in &block.components {
            match self.expand_statement(statement) {
                Some(expanded) => {
                    changed = true;
                    components.push(expanded);
                }
                None => components.push(statement.clone()),
            }
        }

        changed.then(|| {
            Rc::new(Block::new(IndexedVec::from_vec(
                components,
                self.diagnostics,
            )))
        })
    }

    fn expand_statement(&mut self, statement: &Statement) -> Option<Statement> {
        match statement {
            Statement::Call(call) if self.targets.contains(&call.id) => Some(self.expand_call(call)),
            Statement::Block(block) => self.expand_block(block).map(Statement::Block),
            Statement::If(if_statement) => {
                let then_branch = self.expand_statement(&if_statement.then_branch);
                let else_branch = if_statement
                    .else_branch
                    .as_ref()
                    .map(|branch| self.expand_statement(branch));

                if then_branch.is_none() && !matches!(else_branch, Some(Some(_))) {
                    return None;
                }

                Some(Statement::If(Rc::new(IfStatement::new(
                    if_statement.condition.clone(),
                    then_branch.unwrap_or_else(|| if_statement.then_branch.clone()),
                    if_statement
                        .else_branch
                        .as_ref()
                        .map(|original| else_branch.flatten().unwrap_or_else(|| original.clone())),
                ))))
            }
            _ => None,
        }
    }

    fn expand_call(&mut self, call: &Rc<CallStatement>) -> Statement {
        let (Some(parameters), Some(body)) = (self.callee.parameters(), self.callee.body()) else {
            bug!(
                "{} `{}` has no body to inline",
                self.callee.kind(),
                self.callee.name()
            );
        };

        if parameters.len() != call.arguments.len() {
            report_error!(
                self.diagnostics,
                "cannot inline call to `{}`: expected {} argument(s) but {} were given",
                call.callee.name,
                parameters.len(),
                call.arguments.len()
            );
            return Statement::Call(call.clone());
        }

        let writes = BodyWrites::of(body);
        let mut substitution = Substitution::new(self.diagnostics);
        let mut components = Vec::new();

        for (parameter, argument) in parameters.iter().zip(&call.arguments) {
            if self.inliner.substitutes(parameter, argument, &writes) {
                substitution.values.insert(parameter.name, argument.clone());
                continue;
            }

            let copy = self.names.new_name(parameter.name);
            substitution.renames.insert(parameter.name, copy);
            components.push(Statement::Variable(Rc::new(Variable::new(
                copy,
                parameter.ty.clone(),
                Some(argument.clone()),
            ))));
        }

        for local in local_names(body) {
            let fresh = self.names.new_name(local);
            substitution.renames.insert(local, fresh);
        }

        let copied = substitution.fold_block(body);
        components.extend(copied.components.iter().cloned());

        Statement::Block(Rc::new(Block::new(IndexedVec::from_vec(
            components,
            self.diagnostics,
        ))))
    }
}

/// Names declared by statements anywhere in `body`
fn local_names(body: &Rc<Block>) -> Vec<InternedSymbol> {
    struct Locals(Vec<InternedSymbol>);

    impl Visitor for Locals {
        fn visit_statement(&mut self, statement: &Statement) {
            if let Some(declaration) = statement.as_declaration() {
                self.0.push(declaration.name());
            }

            visit::walk_statement(self, statement)
        }
    }

    let mut locals = Locals(Vec::new());
    locals.visit_block(body);
    locals.0
}

/// What a callee body may write to
#[derive(Debug, Default)]
pub struct BodyWrites {
    assigned: HashSet<InternedSymbol>,
    /// Calls can write any variable visible to their callee
    has_calls: bool,
}

impl BodyWrites {
    fn of(body: &Rc<Block>) -> Self {
        impl Visitor for BodyWrites {
            fn visit_statement(&mut self, statement: &Statement) {
                match statement {
                    Statement::Assignment(assignment) => {
                        self.assigned.insert(assignment.target.name);
                    }
                    Statement::Call(_) => self.has_calls = true,
                    _ => {}
                }

                visit::walk_statement(self, statement)
            }

            fn visit_expression(&mut self, expression: &Expression) {
                if let Expression::Call(_) = expression {
                    self.has_calls = true;
                }

                visit::walk_expression(self, expression)
            }
        }

        let mut writes = BodyWrites::default();
        writes.visit_block(body);
        writes
    }

    /// Whether the body assigns `name` directly
    pub fn assigns(&self, name: InternedSymbol) -> bool {
        self.assigned.contains(&name)
    }

    /// Whether `name` may change while the body runs, directly or through a
    /// call
    pub fn may_write(&self, name: InternedSymbol) -> bool {
        self.has_calls || self.assigns(name)
    }
}

/// Copies a callee body, renaming declarations and replacing parameter uses
struct Substitution<'d> {
    renames: HashMap<InternedSymbol, InternedSymbol>,
    values: HashMap<InternedSymbol, Expression>,
    diagnostics: &'d Diagnostics,
}

impl<'d> Substitution<'d> {
    fn new(diagnostics: &'d Diagnostics) -> Self {
        Self {
            renames: HashMap::new(),
            values: HashMap::new(),
            diagnostics,
        }
    }
}

impl Folder for Substitution<'_> {
    fn diagnostics(&self) -> &Diagnostics {
        self.diagnostics
    }

    fn fold_declared_name(&mut self, _id: NodeId, name: InternedSymbol) -> InternedSymbol {
        self.renames.get(&name).copied().unwrap_or(name)
    }

    fn fold_path(&mut self, path: &Rc<PathExpression>) -> Rc<PathExpression> {
        let name = self.renames.get(&path.name).copied().unwrap_or(path.name);
        Rc::new(PathExpression::new(name))
    }

    fn fold_expression(&mut self, expression: &Expression) -> Expression {
        if let Expression::Path(path) = expression {
            if let Some(value) = self.values.get(&path.name) {
                // A fresh copy, so the value never appears twice in the tree
                let value = value.clone();
                return fold::walk_expression(&mut Substitution::new(self.diagnostics), &value);
            }
        }

        fold::walk_expression(self, expression)
    }
}
