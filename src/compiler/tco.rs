//! Tail-call analysis
//!
//! Bottom-up pass turning an [`Expr`] into a [`TcoExpr`]: the same tree where every
//! node carries an [`Analysis`] of the calls found below it and how many of those
//! calls are still in tail position. A recursive binding group whose members are
//! only ever called in tail position, at their full arity, is flagged as a loop
//! and later lowered to `while (true)` plus reassignment by [`crate::compiler::codegen`].

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use indexmap::IndexMap;
use pretty::{DocAllocator, DocBuilder};
use termcolor::{Color, ColorSpec};

use super::ir::{fg, kw, Expr, Ident, Level, ModuleName, Pair, Pretty, Qualified, Syntax};
use super::module::{BindingGroup, CompilationUnit};

/// Identity of a local binder. The level separates shadowed binders, the name
/// separates members of one recursive group (they share a level).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalRef {
    pub level: Level,
    pub name: Option<Ident>,
}

impl LocalRef {
    pub fn new(name: Option<Ident>, level: Level) -> Self {
        Self { level, name }
    }
}

impl fmt::Display for LocalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}@{}", name, self.level),
            None => write!(f, "@{}", self.level),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TcoRef {
    Local(LocalRef),
    TopLevel(Qualified),
}

impl TcoRef {
    pub fn local(name: Option<Ident>, level: Level) -> Self {
        Self::Local(LocalRef::new(name, level))
    }

    /// The reference named by `syntax` when it is a bare variable.
    pub fn of_syntax<E>(syntax: &Syntax<E>) -> Option<Self> {
        match syntax {
            Syntax::Local(name, level) => Some(Self::local(name.clone(), *level)),
            Syntax::Var(name) => Some(Self::TopLevel(name.clone())),
            _ => None,
        }
    }

    /// Unqualified top-level names refer to `module`.
    pub fn qualified_in(self, module: &ModuleName) -> Self {
        match self {
            Self::TopLevel(Qualified { module: None, ident }) => {
                Self::TopLevel(Qualified::new(module.clone(), ident))
            }
            reference => reference,
        }
    }
}

impl fmt::Display for TcoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(local) => local.fmt(f),
            Self::TopLevel(name) => name.fmt(f),
        }
    }
}

/// Call sites of one reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Call {
    pub count: usize,
    pub arities: BTreeSet<usize>,
}

impl Call {
    pub fn new(arity: usize) -> Self {
        Self {
            count: 1,
            arities: BTreeSet::from([arity]),
        }
    }

    pub fn append(&mut self, other: &Call) {
        self.count += other.count;
        self.arities.extend(other.arities.iter().copied());
    }
}

/// Why a reference is not a uniform tail call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotUniform {
    NeverCalled,
    MixedArities,
    NotApplied,
    ArityMismatch { expected: usize, found: usize },
    EscapesTailPosition { calls: usize, tail_calls: usize },
}

impl fmt::Display for NotUniform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NeverCalled => write!(f, "never called"),
            Self::MixedArities => write!(f, "called at more than one arity"),
            Self::NotApplied => write!(f, "used as a value"),
            Self::ArityMismatch { expected, found } => {
                write!(f, "called with {} arguments, expects {}", found, expected)
            }
            Self::EscapesTailPosition { calls, tail_calls } => {
                write!(f, "{} of {} calls are not tail calls", calls - tail_calls, calls)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    pub calls: IndexMap<LocalRef, Call>,
    pub tail_calls: IndexMap<LocalRef, usize>,
    pub top_level_calls: IndexMap<Qualified, Call>,
    pub top_level_tail_calls: IndexMap<Qualified, usize>,
    /// Set on the node of a binding group that lowers to a loop. Never
    /// inherited by merging.
    pub is_tco_loop: bool,
}

impl Analysis {
    /// One tail call of `reference` with `arity` arguments.
    pub fn call(reference: &TcoRef, arity: usize) -> Self {
        let mut analysis = Self::default();
        match reference {
            TcoRef::Local(local) => {
                analysis.calls.insert(local.clone(), Call::new(arity));
                analysis.tail_calls.insert(local.clone(), 1);
            }
            TcoRef::TopLevel(name) => {
                analysis.top_level_calls.insert(name.clone(), Call::new(arity));
                analysis.top_level_tail_calls.insert(name.clone(), 1);
            }
        }
        analysis
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.top_level_calls.is_empty() && !self.is_tco_loop
    }

    /// Pointwise union of all four maps. The loop flag is dropped.
    pub fn append(&mut self, other: &Analysis) {
        self.append_calls(other);
        for (reference, count) in &other.tail_calls {
            *self.tail_calls.entry(reference.clone()).or_insert(0) += count;
        }
        for (name, count) in &other.top_level_tail_calls {
            *self.top_level_tail_calls.entry(name.clone()).or_insert(0) += count;
        }
        self.is_tco_loop = false;
    }

    /// Union of the call maps only: `other` is not in tail position.
    pub fn append_calls(&mut self, other: &Analysis) {
        for (reference, call) in &other.calls {
            self.calls.entry(reference.clone()).or_default().append(call);
        }
        for (name, call) in &other.top_level_calls {
            self.top_level_calls.entry(name.clone()).or_default().append(call);
        }
        self.is_tco_loop = false;
    }

    pub fn merge(mut self, other: &Analysis) -> Self {
        self.append(other);
        self
    }

    pub fn no_tail_calls(mut self) -> Self {
        self.tail_calls.clear();
        self.top_level_tail_calls.clear();
        self
    }

    /// Drop every entry for `references`; they went out of scope.
    pub fn bound(mut self, references: &[TcoRef]) -> Self {
        for reference in references {
            match reference {
                TcoRef::Local(local) => {
                    self.calls.shift_remove(local);
                    self.tail_calls.shift_remove(local);
                }
                TcoRef::TopLevel(name) => {
                    self.top_level_calls.shift_remove(name);
                    self.top_level_tail_calls.shift_remove(name);
                }
            }
        }
        self
    }

    pub fn call_of(&self, reference: &TcoRef) -> Option<&Call> {
        match reference {
            TcoRef::Local(local) => self.calls.get(local),
            TcoRef::TopLevel(name) => self.top_level_calls.get(name),
        }
    }

    pub fn tail_calls_of(&self, reference: &TcoRef) -> usize {
        match reference {
            TcoRef::Local(local) => self.tail_calls.get(local),
            TcoRef::TopLevel(name) => self.top_level_tail_calls.get(name),
        }
        .copied()
        .unwrap_or(0)
    }

    /// `reference` is applied everywhere at exactly `arity` arguments and every
    /// one of those applications is still a tail call.
    pub fn check_uniform_tail_call(&self, reference: &TcoRef, arity: usize) -> Result<(), NotUniform> {
        let Some(call) = self.call_of(reference) else {
            return Err(NotUniform::NeverCalled);
        };
        let found = match call.arities.iter().collect::<Vec<_>>()[..] {
            [] => return Err(NotUniform::NeverCalled),
            [found] => *found,
            _ => return Err(NotUniform::MixedArities),
        };
        if found == 0 {
            return Err(NotUniform::NotApplied);
        }
        if found != arity {
            return Err(NotUniform::ArityMismatch {
                expected: arity,
                found,
            });
        }
        let tail_calls = self.tail_calls_of(reference);
        if call.count != tail_calls {
            return Err(NotUniform::EscapesTailPosition {
                calls: call.count,
                tail_calls,
            });
        }
        Ok(())
    }

    pub fn is_uniform_tail_call(&self, reference: &TcoRef, arity: usize) -> bool {
        self.check_uniform_tail_call(reference, arity).is_ok()
    }
}

/// Annotated expression: an IR node together with the analysis of its subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct TcoExpr {
    pub analysis: Analysis,
    pub syntax: Box<Syntax<TcoExpr>>,
}

impl TcoExpr {
    pub fn new(analysis: Analysis, syntax: Syntax<TcoExpr>) -> Self {
        Self {
            analysis,
            syntax: Box::new(syntax),
        }
    }
}

/// References whose recursive shape is being decided.
#[derive(Debug, Clone, Default)]
pub struct TcoEnv {
    candidates: HashSet<TcoRef>,
    /// Module owning unqualified top-level references.
    module: Option<ModuleName>,
}

impl TcoEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_module(module: ModuleName) -> Self {
        Self {
            candidates: HashSet::new(),
            module: Some(module),
        }
    }

    pub fn extend(&self, references: impl IntoIterator<Item = TcoRef>) -> Self {
        let mut candidates = self.candidates.clone();
        candidates.extend(references);
        Self {
            candidates,
            module: self.module.clone(),
        }
    }

    /// The reference named by `syntax`, qualified with the current module.
    pub fn reference_of<E>(&self, syntax: &Syntax<E>) -> Option<TcoRef> {
        let reference = TcoRef::of_syntax(syntax)?;
        Some(match &self.module {
            Some(module) => reference.qualified_in(module),
            None => reference,
        })
    }

    pub fn is_candidate(&self, reference: &TcoRef) -> bool {
        self.candidates.contains(reference)
    }
}

pub fn analyze(env: &TcoEnv, expr: &Expr) -> TcoExpr {
    match expr.syntax() {
        syntax @ (Syntax::Var(_) | Syntax::Local(..)) => {
            let analysis = match env.reference_of(syntax) {
                Some(reference) => reference_analysis(env, &reference, 0),
                None => Analysis::default(),
            };
            TcoExpr::new(analysis, syntax.map_ref(|child| analyze(env, child)))
        }

        Syntax::App(head, args) if TcoRef::of_syntax(head.syntax()).is_some() => {
            let head = analyze(env, head);
            let args = args.iter().map(|arg| analyze(env, arg)).collect::<Vec<_>>();
            let mut analysis = match env.reference_of(&*head.syntax) {
                Some(reference) => reference_analysis(env, &reference, args.len()),
                None => Analysis::default(),
            };
            for arg in &args {
                analysis.append_calls(&arg.analysis);
            }
            TcoExpr::new(analysis, Syntax::App(head, args))
        }

        Syntax::Branch(pairs, default) => {
            let pairs = pairs
                .iter()
                .map(|pair| Pair {
                    cond: analyze(env, &pair.cond),
                    body: analyze(env, &pair.body),
                })
                .collect::<Vec<_>>();
            let default = analyze(env, default);
            let mut analysis = Analysis::default();
            for pair in &pairs {
                analysis.append_calls(&pair.cond.analysis);
                analysis.append(&pair.body.analysis);
            }
            analysis.append(&default.analysis);
            TcoExpr::new(analysis, Syntax::Branch(pairs, default))
        }

        Syntax::Let(name, level, binding, body) => {
            let reference = TcoRef::local(name.clone(), *level);
            let binding = analyze(env, binding);
            let body = analyze(&env.extend([reference.clone()]), body);
            let arity = binding.syntax.syntactic_arity();

            let mut analysis = Analysis::default();
            if body.analysis.is_uniform_tail_call(&reference, arity) {
                log::trace!(target: "tailc::tco", "{} is a join point", reference);
                analysis.append(&binding.analysis);
            } else {
                analysis.append_calls(&binding.analysis);
            }
            analysis.append(&body.analysis);

            TcoExpr::new(
                analysis.bound(&[reference]),
                Syntax::Let(name.clone(), *level, binding, body),
            )
        }

        Syntax::LetRec(level, bindings, body) => {
            let references = bindings
                .iter()
                .map(|(name, _)| TcoRef::local(Some(name.clone()), *level))
                .collect::<Vec<_>>();
            let env = env.extend(references.iter().cloned());
            let bindings = bindings
                .iter()
                .map(|(name, binding)| (name.clone(), analyze(&env, binding)))
                .collect::<Vec<_>>();
            let body = analyze(&env, body);

            let is_loop = is_tco_loop(
                &references,
                &bindings.iter().map(|(_, binding)| binding).collect::<Vec<_>>(),
            );

            let mut analysis = Analysis::default();
            for (_, binding) in &bindings {
                analysis.append_calls(&binding.analysis);
            }
            analysis.append(&body.analysis);
            let mut analysis = analysis.bound(&references);
            if !is_loop {
                analysis = analysis.no_tail_calls();
            }
            analysis.is_tco_loop = is_loop;

            TcoExpr::new(analysis, Syntax::LetRec(*level, bindings, body))
        }

        syntax => {
            let syntax = syntax.map_ref(|child| analyze(env, child));
            let mut analysis = Analysis::default();
            for child in syntax.children() {
                analysis.append_calls(&child.analysis);
            }
            TcoExpr::new(analysis, syntax)
        }
    }
}

fn reference_analysis(env: &TcoEnv, reference: &TcoRef, arity: usize) -> Analysis {
    if env.is_candidate(reference) {
        Analysis::call(reference, arity)
    } else {
        Analysis::default()
    }
}

/// A group lowers to a loop when every binding is a curried lambda and every
/// member is a uniform tail call, at its own arity, across the members' bodies.
pub fn is_tco_loop(references: &[TcoRef], bindings: &[&TcoExpr]) -> bool {
    if references.is_empty() {
        return false;
    }
    let mut bodies = Analysis::default();
    for (reference, binding) in references.iter().zip(bindings) {
        match &*binding.syntax {
            Syntax::Abs(_, body) => bodies.append(&body.analysis),
            _ => {
                log::trace!(target: "tailc::tco", "{} is not a lambda", reference);
                return false;
            }
        }
    }

    for (reference, binding) in references.iter().zip(bindings) {
        if let Err(reason) = bodies.check_uniform_tail_call(reference, binding.syntax.syntactic_arity()) {
            log::debug!(target: "tailc::tco", "{} does not loop: {}", reference, reason);
            return false;
        }
    }

    log::debug!(
        target: "tailc::tco",
        "loop group: {}",
        references.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
    );
    true
}

/// A top-level binding group after analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedGroup {
    pub recursive: bool,
    pub bindings: Vec<(Ident, TcoExpr)>,
    pub is_tco_loop: bool,
}

pub fn analyze_group(module: &ModuleName, group: &BindingGroup) -> AnalyzedGroup {
    let references = group
        .bindings
        .iter()
        .map(|(name, _)| TcoRef::TopLevel(Qualified::new(module.clone(), name.clone())))
        .collect::<Vec<_>>();
    let env = TcoEnv::for_module(module.clone());
    let env = if group.recursive {
        env.extend(references.iter().cloned())
    } else {
        env
    };
    let bindings = group
        .bindings
        .iter()
        .map(|(name, expr)| (name.clone(), analyze(&env, expr)))
        .collect::<Vec<_>>();
    let is_tco_loop = group.recursive
        && is_tco_loop(
            &references,
            &bindings.iter().map(|(_, binding)| binding).collect::<Vec<_>>(),
        );

    AnalyzedGroup {
        recursive: group.recursive,
        bindings,
        is_tco_loop,
    }
}

pub fn analyze_module(unit: &CompilationUnit) -> Vec<AnalyzedGroup> {
    unit.groups
        .iter()
        .map(|group| analyze_group(&unit.name, group))
        .collect()
}

fn analysis_doc<'a, D>(allocator: &'a D, analysis: &Analysis) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    let entry = |name: String, call: &Call, tail: usize| {
        let arities = call.arities.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(" ");
        allocator
            .text(name)
            .annotate(kw(Color::Blue))
            .append(allocator.text(format!(" {}/{} ({})", tail, call.count, arities)))
            .brackets()
    };

    let locals = analysis.calls.iter().map(|(local, call)| {
        let tail = analysis.tail_calls.get(local).copied().unwrap_or(0);
        entry(local.to_string(), call, tail)
    });
    let top_levels = analysis.top_level_calls.iter().map(|(name, call)| {
        let tail = analysis.top_level_tail_calls.get(name).copied().unwrap_or(0);
        entry(name.to_string(), call, tail)
    });

    let mut doc = allocator.text("tco").annotate(fg(Color::Magenta));
    if analysis.is_tco_loop {
        doc = doc
            .append(allocator.space())
            .append(allocator.text("loop").annotate(kw(Color::Red)));
    }
    doc.append(allocator.space())
        .append(allocator.intersperse(locals.chain(top_levels), allocator.space()))
}

impl Pretty for TcoExpr {
    fn pretty<'a, D>(&self, allocator: &'a D) -> DocBuilder<'a, D, ColorSpec>
    where
        D: DocAllocator<'a, ColorSpec>,
        D::Doc: Clone,
    {
        if self.analysis.is_empty() {
            return self.syntax.pretty(allocator);
        }

        analysis_doc(allocator, &self.analysis)
            .append(allocator.line())
            .append(self.syntax.pretty(allocator))
            .nest(1)
            .group()
            .braces()
    }
}
