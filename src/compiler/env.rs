//! Lowering environment: JS names of IR binders and the stack of loops being
//! emitted. One environment is created per top-level binding.

use std::collections::HashMap;

use super::ir::{Ident, Level};
use super::module::ModuleContext;
use super::tco::{LocalRef, TcoRef};

/// A member of a loop: calling `reference` with `arity` arguments may become a jump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcoMember {
    pub reference: TcoRef,
    pub arity: usize,
}

/// A loop under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcoScope {
    /// Identifier of the loop, also the prefix of its slots.
    pub label: String,
    pub members: Vec<TcoMember>,
    /// Selector variable of a mutually recursive group, naming the member to run next.
    pub dispatch: Option<String>,
    /// Mutable argument slots reassigned by a jump.
    pub slots: Vec<String>,
}

/// Resolution of a reference against the loop stack.
#[derive(Debug, Clone, Copy)]
pub struct TcoJump<'e> {
    pub scope: &'e TcoScope,
    /// Index of the matched member within `scope.members`.
    pub member: usize,
    /// Scopes between the innermost one and `scope`. A jump across them would
    /// leave a nested function.
    pub exited: usize,
}

impl TcoJump<'_> {
    pub fn arity(&self) -> usize {
        self.scope.members[self.member].arity
    }
}

pub struct CodegenEnv<'m> {
    module: &'m ModuleContext,
    counters: HashMap<String, usize>,
    bound: HashMap<LocalRef, String>,
    scopes: Vec<TcoScope>,
}

impl<'m> CodegenEnv<'m> {
    pub fn new(module: &'m ModuleContext) -> Self {
        let counters = module
            .reserved_names()
            .iter()
            .map(|name| (name.clone(), 1))
            .collect();
        Self {
            module,
            counters,
            bound: HashMap::new(),
            scopes: Vec::new(),
        }
    }

    pub fn module(&self) -> &'m ModuleContext {
        self.module
    }

    /// First request for `base` returns it verbatim, later ones `base$1`, `base$2`, ...
    /// skipping any name already handed out or reserved.
    pub fn fresh_name(&mut self, base: &str) -> String {
        let mut counter = self.counters.get(base).copied().unwrap_or(0);
        let name = loop {
            let candidate = match counter {
                0 => base.to_string(),
                n => format!("{}${}", base, n),
            };
            counter += 1;
            if !self.counters.contains_key(&candidate) {
                break candidate;
            }
        };
        self.counters.insert(base.to_string(), counter);
        self.counters.entry(name.clone()).or_insert(1);
        name
    }

    /// Introduce a binder and return its JS name.
    pub fn bind(&mut self, name: Option<&Ident>, level: Level) -> String {
        let ident = match name {
            Some(name) => self.fresh_name(name.as_str()),
            None => unnamed(level),
        };
        self.bound
            .insert(LocalRef::new(name.cloned(), level), ident.clone());
        ident
    }

    /// JS name of a bound binder; unknown binders fall back to `_<level>`.
    pub fn lookup(&self, name: Option<&Ident>, level: Level) -> String {
        self.bound
            .get(&LocalRef::new(name.cloned(), level))
            .cloned()
            .unwrap_or_else(|| unnamed(level))
    }

    pub fn push_scope(&mut self, scope: TcoScope) {
        log::trace!(target: "tailc::codegen", "enter loop {}", scope.label);
        self.scopes.push(scope);
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn truncate_scopes(&mut self, depth: usize) {
        self.scopes.truncate(depth);
    }

    /// Innermost scope with a member matching `reference`.
    pub fn find_jump(&self, reference: &TcoRef) -> Option<TcoJump<'_>> {
        self.scopes
            .iter()
            .rev()
            .enumerate()
            .find_map(|(exited, scope)| {
                scope
                    .members
                    .iter()
                    .position(|member| member.reference == *reference)
                    .map(|member| TcoJump {
                        scope,
                        member,
                        exited,
                    })
            })
    }
}

fn unnamed(level: Level) -> String {
    format!("_{}", level)
}
