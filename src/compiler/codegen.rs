//! Lowering of analysed IR to JavaScript statements.
//!
//! Every node is lowered either as a statement list ([`codegen_block_statements`],
//! used for function bodies) or as a single expression ([`codegen_expr`]). Binding
//! groups flagged by [`crate::compiler::tco`] become loops: the body runs inside
//! `while (true)`, and a call to a group member in tail position reassigns the
//! loop-carried slots and continues instead of calling.

use indexmap::IndexMap;

use super::env::{CodegenEnv, TcoMember, TcoScope};
use super::ir::{Accessor, BinaryOp, Guard, Ident, Level, Literal, Param, PrimOp, Prop, Qualified, Syntax, UnaryOp};
use super::js::{self, ExportList, Import, JsExpr, ObjectField, Statement};
use super::module::{module_alias, module_path, CompilationUnit, Export, ModuleContext, FOREIGN_ALIAS, FOREIGN_PATH};
use super::tco::{analyze_module, AnalyzedGroup, TcoExpr, TcoRef};
use crate::options::CodegenOptions;

/// Context a statement list is lowered in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockMode {
    /// Inside an effect block: binds run their effect, the result is run and returned.
    pub effect: bool,
    /// Directly inside a loop body, where tail calls to loop members may become jumps.
    pub tco: bool,
}

impl BlockMode {
    pub const PURE: Self = Self {
        effect: false,
        tco: false,
    };
    pub const EFFECT: Self = Self {
        effect: true,
        tco: false,
    };
    pub const LOOP: Self = Self {
        effect: false,
        tco: true,
    };
}

pub fn codegen_block_statements(mode: BlockMode, env: &mut CodegenEnv, expr: &TcoExpr) -> Vec<Statement> {
    let mut acc = Vec::new();
    codegen_block_into(&mut acc, mode, env, expr);
    acc
}

fn codegen_block_into(acc: &mut Vec<Statement>, mode: BlockMode, env: &mut CodegenEnv, mut expr: &TcoExpr) {
    loop {
        match &*expr.syntax {
            Syntax::LetRec(level, bindings, body) => {
                codegen_letrec(acc, env, *level, bindings, expr.analysis.is_tco_loop);
                expr = body;
            }

            Syntax::Let(name, level, binding, body) => {
                let value = codegen_expr(env, binding);
                let ident = env.bind(name.as_ref(), *level);
                acc.push(Statement::Const(ident, value));
                expr = body;
            }

            Syntax::Branch(pairs, default) => {
                let alternatives = pairs
                    .iter()
                    .map(|pair| {
                        let cond = codegen_expr(env, &pair.cond);
                        (cond, codegen_block_statements(mode, env, &pair.body))
                    })
                    .collect::<Vec<_>>();
                if !alternatives.is_empty() {
                    acc.push(Statement::If(alternatives));
                }
                expr = default;
            }

            Syntax::EffectBind(name, level, effect, body) if mode.effect => {
                let value = codegen_run_effect(env, effect);
                match name {
                    Some(_) => {
                        let ident = env.bind(name.as_ref(), *level);
                        acc.push(Statement::Const(ident, value));
                    }
                    None => acc.push(Statement::Expr(value)),
                }
                expr = body;
            }

            Syntax::EffectPure(value) if mode.effect => {
                acc.push(codegen_return(env, value));
                return;
            }

            Syntax::EffectDefer(inner) if mode.effect => expr = inner,

            Syntax::Fail(message) => {
                acc.push(codegen_fail(message));
                return;
            }

            Syntax::App(head, args) if mode.tco => {
                match codegen_jump(env, head, args) {
                    Some(jump) => acc.extend(jump),
                    None => acc.push(codegen_return(env, expr)),
                }
                return;
            }

            _ if mode.effect => {
                let value = codegen_run_effect(env, expr);
                acc.push(Statement::Return(value));
                return;
            }

            _ => {
                acc.push(codegen_return(env, expr));
                return;
            }
        }
    }
}

fn codegen_return(env: &mut CodegenEnv, expr: &TcoExpr) -> Statement {
    match &*expr.syntax {
        Syntax::PrimUndefined => Statement::ReturnUndefined,
        syntax if syntax.is_object_literal() => Statement::ReturnObject(codegen_expr(env, expr)),
        _ => Statement::Return(codegen_expr(env, expr)),
    }
}

fn codegen_fail(message: &str) -> Statement {
    Statement::Throw(JsExpr::New(
        Box::new(JsExpr::ident("Error")),
        vec![JsExpr::String(message.to_string())],
    ))
}

/// Value produced by running `effect` once.
fn codegen_run_effect(env: &mut CodegenEnv, effect: &TcoExpr) -> JsExpr {
    match &*effect.syntax {
        Syntax::EffectPure(value) => codegen_expr(env, value),
        Syntax::UncurriedEffectApp(callee, args) => {
            let callee = codegen_expr(env, callee);
            JsExpr::call(callee, codegen_exprs(env, args))
        }
        Syntax::EffectBind(..) | Syntax::EffectDefer(_) => {
            JsExpr::iife(codegen_block_statements(BlockMode::EFFECT, env, effect))
        }
        _ => JsExpr::call(codegen_expr(env, effect), vec![]),
    }
}

/// Reassign the slots of the loop owning `head` and continue it.
fn codegen_jump(env: &mut CodegenEnv, head: &TcoExpr, args: &[TcoExpr]) -> Option<Vec<Statement>> {
    let reference = TcoRef::of_syntax(&*head.syntax)?.qualified_in(&env.module().name);
    let jump = env.find_jump(&reference)?;
    if jump.exited > 0 {
        log::debug!(
            target: "tailc::codegen",
            "call to {} leaves {} nested loop(s), emitting a call",
            reference,
            jump.exited
        );
        return None;
    }
    if jump.arity() != args.len() {
        debug_assert!(
            false,
            "jump to {} with {} arguments, loop expects {}",
            reference,
            args.len(),
            jump.arity()
        );
        return None;
    }

    let selector = jump
        .scope
        .dispatch
        .clone()
        .map(|selector| (selector, jump.member));
    let slots = jump.scope.slots[..args.len()].to_vec();

    // Every argument is computed before any slot changes.
    let values = codegen_exprs(env, args);

    let mut statements = Vec::with_capacity(slots.len() + 2);
    if let Some((selector, member)) = selector {
        statements.push(Statement::Assign(selector, JsExpr::Int(member as i64)));
    }
    statements.extend(
        slots
            .into_iter()
            .zip(values)
            .map(|(slot, value)| Statement::Assign(slot, value)),
    );
    statements.push(Statement::Continue);
    Some(statements)
}

/// A lambda-shaped member of a loop group.
struct LoopMember<'t> {
    ident: String,
    reference: TcoRef,
    params: &'t [Param],
    body: &'t TcoExpr,
}

fn loop_members<'t>(
    idents: Vec<String>,
    references: Vec<TcoRef>,
    bindings: impl Iterator<Item = &'t TcoExpr>,
) -> Option<Vec<LoopMember<'t>>> {
    idents
        .into_iter()
        .zip(references)
        .zip(bindings)
        .map(|((ident, reference), binding)| match &*binding.syntax {
            Syntax::Abs(params, body) => Some(LoopMember {
                ident,
                reference,
                params,
                body,
            }),
            _ => None,
        })
        .collect()
}

fn codegen_letrec(
    acc: &mut Vec<Statement>,
    env: &mut CodegenEnv,
    level: Level,
    bindings: &[(Ident, TcoExpr)],
    is_tco_loop: bool,
) {
    let idents = bindings
        .iter()
        .map(|(name, _)| env.bind(Some(name), level))
        .collect::<Vec<_>>();

    if is_tco_loop && env.module().tco {
        let references = bindings
            .iter()
            .map(|(name, _)| TcoRef::local(Some(name.clone()), level))
            .collect();
        if let Some(members) = loop_members(idents.clone(), references, bindings.iter().map(|(_, b)| b)) {
            codegen_loop(acc, env, members, None);
            return;
        }
    }

    codegen_recursive_bindings(acc, env, idents, bindings.iter().map(|(_, binding)| binding));
}

fn codegen_recursive_bindings<'t>(
    acc: &mut Vec<Statement>,
    env: &mut CodegenEnv,
    idents: Vec<String>,
    bindings: impl Iterator<Item = &'t TcoExpr> + Clone,
) {
    let all_functions = bindings.clone().all(|binding| {
        matches!(
            &*binding.syntax,
            Syntax::Abs(..) | Syntax::UncurriedAbs(..) | Syntax::UncurriedEffectAbs(..) | Syntax::CtorDef(..)
        )
    });

    if all_functions {
        for (ident, binding) in idents.into_iter().zip(bindings) {
            let value = codegen_expr(env, binding);
            acc.push(Statement::Const(ident, value));
        }
    } else {
        acc.extend(idents.iter().map(|ident| Statement::Let(ident.clone(), None)));
        for (ident, binding) in idents.into_iter().zip(bindings) {
            let value = codegen_expr(env, binding);
            acc.push(Statement::Assign(ident, value));
        }
    }
}

/// `dispatcher` names the shared function of a mutually recursive group when the
/// module already reserved one for it.
fn codegen_loop(
    acc: &mut Vec<Statement>,
    env: &mut CodegenEnv,
    members: Vec<LoopMember>,
    dispatcher: Option<String>,
) {
    match <[LoopMember; 1]>::try_from(members) {
        Ok([member]) => {
            log::debug!(target: "tailc::codegen", "lowering {} to a loop", member.ident);
            let function = codegen_self_loop(env, &member);
            acc.push(Statement::Const(member.ident, function));
        }
        Err(members) => codegen_group_loop(acc, env, members, dispatcher),
    }
}

fn param_base(param: &Param, index: usize) -> String {
    match &param.name {
        Some(name) => name.to_string(),
        None => index.to_string(),
    }
}

/// Bind the parameters of a loop member to the current slot values.
fn bind_params(env: &mut CodegenEnv, params: &[Param], slots: &[String]) -> Vec<Statement> {
    params
        .iter()
        .zip(slots)
        .map(|(param, slot)| {
            let local = env.bind(param.name.as_ref(), param.level);
            Statement::Const(local, JsExpr::ident(slot.clone()))
        })
        .collect()
}

/// `$copy_x => ...` parameters of a curried loop entry point.
fn copy_params(env: &mut CodegenEnv, params: &[Param]) -> Vec<String> {
    params
        .iter()
        .enumerate()
        .map(|(index, param)| env.fresh_name(&format!("$copy_{}", param_base(param, index))))
        .collect()
}

fn codegen_self_loop(env: &mut CodegenEnv, member: &LoopMember) -> JsExpr {
    let label = env.fresh_name(&format!("${}", member.ident));
    let copies = copy_params(env, member.params);
    let slots = member
        .params
        .iter()
        .enumerate()
        .map(|(index, param)| env.fresh_name(&format!("{}_{}", label, param_base(param, index))))
        .collect::<Vec<_>>();

    let depth = env.scope_depth();
    env.push_scope(TcoScope {
        label,
        members: vec![TcoMember {
            reference: member.reference.clone(),
            arity: member.params.len(),
        }],
        dispatch: None,
        slots: slots.clone(),
    });
    let mut body = bind_params(env, member.params, &slots);
    codegen_block_into(&mut body, BlockMode::LOOP, env, member.body);
    env.truncate_scopes(depth);

    let mut statements = slots
        .into_iter()
        .zip(&copies)
        .map(|(slot, copy)| Statement::Let(slot, Some(JsExpr::ident(copy.clone()))))
        .collect::<Vec<_>>();
    statements.push(Statement::Loop(body));
    JsExpr::curried(copies, statements)
}

/// Mutually recursive loop: one dispatcher running whichever member the
/// selector names, and a curried wrapper per member entering it.
fn codegen_group_loop(
    acc: &mut Vec<Statement>,
    env: &mut CodegenEnv,
    members: Vec<LoopMember>,
    dispatcher: Option<String>,
) {
    let names = members
        .iter()
        .map(|member| member.ident.as_str())
        .collect::<Vec<_>>()
        .join("_");
    log::debug!(target: "tailc::codegen", "lowering group {} to a loop", names);

    let label = dispatcher.unwrap_or_else(|| env.fresh_name(&format!("${}", names)));
    let selector = env.fresh_name(&format!("{}_fn", label));
    let width = members.iter().map(|member| member.params.len()).max().unwrap_or(0);
    let slots = (0..width)
        .map(|index| env.fresh_name(&format!("{}_{}", label, index)))
        .collect::<Vec<_>>();

    let depth = env.scope_depth();
    env.push_scope(TcoScope {
        label: label.clone(),
        members: members
            .iter()
            .map(|member| TcoMember {
                reference: member.reference.clone(),
                arity: member.params.len(),
            })
            .collect(),
        dispatch: Some(selector.clone()),
        slots: slots.clone(),
    });

    let last = members.len() - 1;
    let mut body = Vec::new();
    for (index, member) in members.iter().enumerate() {
        let mut block = bind_params(env, member.params, &slots);
        codegen_block_into(&mut block, BlockMode::LOOP, env, member.body);
        if index == last {
            body.extend(block);
        } else {
            let cond = JsExpr::binary(BinaryOp::Eq, JsExpr::ident(selector.clone()), JsExpr::Int(index as i64));
            body.push(Statement::If(vec![(cond, block)]));
        }
    }
    env.truncate_scopes(depth);

    let mut dispatcher_params = vec![selector];
    dispatcher_params.extend(slots);
    acc.push(Statement::Const(
        label.clone(),
        JsExpr::Arrow(dispatcher_params, vec![Statement::Loop(body)]),
    ));

    for (index, member) in members.into_iter().enumerate() {
        let copies = copy_params(env, member.params);
        let mut args = vec![JsExpr::Int(index as i64)];
        args.extend(copies.iter().cloned().map(JsExpr::Ident));
        let call = JsExpr::call(JsExpr::ident(label.clone()), args);
        acc.push(Statement::Const(
            member.ident,
            JsExpr::curried(copies, vec![Statement::Return(call)]),
        ));
    }
}

fn codegen_exprs(env: &mut CodegenEnv, exprs: &[TcoExpr]) -> Vec<JsExpr> {
    exprs.iter().map(|expr| codegen_expr(env, expr)).collect()
}

fn codegen_props(env: &mut CodegenEnv, props: &[Prop<TcoExpr>]) -> Vec<ObjectField> {
    props
        .iter()
        .map(|prop| ObjectField::Field(prop.key.clone(), codegen_expr(env, &prop.value)))
        .collect()
}

fn bind_all(env: &mut CodegenEnv, params: &[Param]) -> Vec<String> {
    params
        .iter()
        .map(|param| env.bind(param.name.as_ref(), param.level))
        .collect()
}

fn tag_field(ctor: &str) -> ObjectField {
    ObjectField::Field("tag".to_string(), JsExpr::String(ctor.to_string()))
}

/// Lowerable to an expression without an immediately invoked function.
fn is_simple(expr: &TcoExpr) -> bool {
    match &*expr.syntax {
        Syntax::Let(..) | Syntax::LetRec(..) | Syntax::Fail(_) => false,
        Syntax::Branch(pairs, default) => pairs.iter().all(|pair| is_simple(&pair.body)) && is_simple(default),
        _ => true,
    }
}

fn codegen_var(env: &CodegenEnv, name: &Qualified) -> JsExpr {
    let module = env.module();
    if module.is_local(name) {
        if module.is_foreign(&name.ident) {
            JsExpr::access(JsExpr::ident(FOREIGN_ALIAS), name.ident.to_string())
        } else {
            JsExpr::ident(name.ident.to_string())
        }
    } else {
        let alias = name.module.as_ref().map(module_alias).unwrap_or_default();
        JsExpr::access(JsExpr::ident(alias), name.ident.to_string())
    }
}

fn codegen_literal(env: &mut CodegenEnv, literal: &Literal<TcoExpr>) -> JsExpr {
    match literal {
        Literal::Int(x) => JsExpr::Int(*x),
        Literal::Number(x) => JsExpr::Number(*x),
        Literal::String(x) => JsExpr::String(x.clone()),
        Literal::Char(x) => JsExpr::String(x.to_string()),
        Literal::Boolean(x) => JsExpr::Boolean(*x),
        Literal::Array(items) => JsExpr::Array(codegen_exprs(env, items)),
        Literal::Record(props) => JsExpr::Object(codegen_props(env, props)),
    }
}

fn codegen_test(subject: JsExpr, guard: &Guard) -> JsExpr {
    match guard {
        Guard::Number(x) => JsExpr::binary(BinaryOp::Eq, subject, JsExpr::Number(*x)),
        Guard::Int(x) => JsExpr::binary(BinaryOp::Eq, subject, JsExpr::Int(*x)),
        Guard::String(x) => JsExpr::binary(BinaryOp::Eq, subject, JsExpr::String(x.clone())),
        Guard::Char(x) => JsExpr::binary(BinaryOp::Eq, subject, JsExpr::String(x.to_string())),
        Guard::Boolean(true) => subject,
        Guard::Boolean(false) => JsExpr::Unary(UnaryOp::Not, Box::new(subject)),
        Guard::Tag(ctor) => JsExpr::binary(
            BinaryOp::Eq,
            JsExpr::access(subject, "tag"),
            JsExpr::String(ctor.to_string()),
        ),
        Guard::ArrayLength(len) => JsExpr::binary(
            BinaryOp::Eq,
            JsExpr::access(subject, "length"),
            JsExpr::Int(*len as i64),
        ),
    }
}

pub fn codegen_expr(env: &mut CodegenEnv, expr: &TcoExpr) -> JsExpr {
    match &*expr.syntax {
        Syntax::Var(name) => codegen_var(env, name),
        Syntax::Local(name, level) => JsExpr::Ident(env.lookup(name.as_ref(), *level)),
        Syntax::Lit(literal) => codegen_literal(env, literal),

        Syntax::App(head, args) => {
            let mut callee = codegen_expr(env, head);
            for arg in args {
                let arg = codegen_expr(env, arg);
                callee = JsExpr::call(callee, vec![arg]);
            }
            callee
        }
        Syntax::Abs(params, body) => {
            let params = bind_all(env, params);
            JsExpr::curried(params, codegen_block_statements(BlockMode::PURE, env, body))
        }
        Syntax::UncurriedApp(callee, args) => {
            let callee = codegen_expr(env, callee);
            JsExpr::call(callee, codegen_exprs(env, args))
        }
        Syntax::UncurriedAbs(params, body) => {
            let params = bind_all(env, params);
            JsExpr::Arrow(params, codegen_block_statements(BlockMode::PURE, env, body))
        }
        Syntax::UncurriedEffectAbs(params, body) => {
            let params = bind_all(env, params);
            JsExpr::Arrow(params, codegen_block_statements(BlockMode::EFFECT, env, body))
        }
        Syntax::UncurriedEffectApp(..) | Syntax::EffectBind(..) | Syntax::EffectDefer(_) => {
            JsExpr::Arrow(vec![], codegen_block_statements(BlockMode::EFFECT, env, expr))
        }
        Syntax::EffectPure(value) => JsExpr::Arrow(vec![], vec![codegen_return(env, value)]),

        Syntax::Accessor(object, accessor) => {
            let object = codegen_expr(env, object);
            match accessor {
                Accessor::Prop(prop) => JsExpr::access(object, prop.clone()),
                Accessor::Index(index) => JsExpr::Index(Box::new(object), Box::new(JsExpr::Int(*index as i64))),
                Accessor::CtorField(_, field) => JsExpr::access(object, field.clone()),
            }
        }
        Syntax::Update(object, props) => {
            let mut fields = vec![ObjectField::Spread(codegen_expr(env, object))];
            fields.extend(codegen_props(env, props));
            JsExpr::Object(fields)
        }
        Syntax::CtorSaturated(_, ctor, props) => {
            let mut fields = vec![tag_field(&ctor.0)];
            fields.extend(codegen_props(env, props));
            JsExpr::Object(fields)
        }
        Syntax::CtorDef(ctor, field_names) => {
            let params = field_names
                .iter()
                .map(|field| env.fresh_name(field))
                .collect::<Vec<_>>();
            let mut fields = vec![tag_field(&ctor.0)];
            fields.extend(
                field_names
                    .iter()
                    .zip(&params)
                    .map(|(field, param)| ObjectField::Field(field.clone(), JsExpr::ident(param.clone()))),
            );
            if params.is_empty() {
                JsExpr::Object(fields)
            } else {
                JsExpr::curried(params, vec![Statement::ReturnObject(JsExpr::Object(fields))])
            }
        }

        Syntax::Branch(pairs, default) if is_simple(expr) => {
            let mut alternatives = pairs
                .iter()
                .map(|pair| (codegen_expr(env, &pair.cond), codegen_expr(env, &pair.body)))
                .collect::<Vec<_>>();
            let mut result = codegen_expr(env, default);
            while let Some((cond, body)) = alternatives.pop() {
                result = JsExpr::Ternary(Box::new(cond), Box::new(body), Box::new(result));
            }
            result
        }
        Syntax::Let(..) | Syntax::LetRec(..) | Syntax::Branch(..) | Syntax::Fail(_) => {
            JsExpr::iife(codegen_block_statements(BlockMode::PURE, env, expr))
        }

        Syntax::Test(subject, guard) => {
            let subject = codegen_expr(env, subject);
            codegen_test(subject, guard)
        }
        Syntax::PrimOp(PrimOp::Op1(op, x)) => JsExpr::Unary(*op, Box::new(codegen_expr(env, x))),
        Syntax::PrimOp(PrimOp::Op2(op, x, y)) => {
            let x = codegen_expr(env, x);
            let y = codegen_expr(env, y);
            JsExpr::binary(*op, x, y)
        }
        Syntax::PrimUndefined => JsExpr::Undefined,
    }
}

/// Statements declaring the bindings of one top-level group. Each binding is
/// lowered in a fresh environment.
pub fn codegen_group(context: &ModuleContext, group: &AnalyzedGroup) -> Vec<Statement> {
    let mut acc = Vec::new();

    if group.is_tco_loop && context.tco {
        let mut env = CodegenEnv::new(context);
        let idents = group
            .bindings
            .iter()
            .map(|(name, _)| name.to_string())
            .collect();
        let references = group
            .bindings
            .iter()
            .map(|(name, _)| TcoRef::TopLevel(Qualified::new(context.name.clone(), name.clone())))
            .collect();
        let dispatcher = group
            .bindings
            .first()
            .and_then(|(name, _)| context.dispatcher_label(name))
            .map(str::to_string);
        if let Some(members) = loop_members(idents, references, group.bindings.iter().map(|(_, b)| b)) {
            codegen_loop(&mut acc, &mut env, members, dispatcher);
            return acc;
        }
    }

    for (name, binding) in &group.bindings {
        acc.extend(codegen_binding(context, name, binding));
    }
    acc
}

/// Statements declaring one non-loop top-level binding.
pub fn codegen_binding(context: &ModuleContext, name: &Ident, binding: &TcoExpr) -> Vec<Statement> {
    let mut env = CodegenEnv::new(context);
    vec![Statement::Const(name.to_string(), codegen_expr(&mut env, binding))]
}

fn codegen_exports(context: &ModuleContext, exports: &[Export]) -> Vec<ExportList> {
    let mut lists: IndexMap<Option<String>, Vec<(String, Option<String>)>> = IndexMap::new();
    for export in exports {
        let from = match &export.module {
            Some(module) => Some(module_path(module)),
            None if context.is_foreign(&export.ident) => Some(FOREIGN_PATH.to_string()),
            None => None,
        };
        let public = export
            .public_name
            .as_ref()
            .filter(|public| **public != export.ident)
            .map(|public| public.to_string());
        lists
            .entry(from)
            .or_default()
            .push((export.ident.to_string(), public));
    }
    lists
        .into_iter()
        .map(|(from, names)| ExportList { names, from })
        .collect()
}

pub fn codegen_module(unit: &CompilationUnit, options: &CodegenOptions) -> js::Module {
    let context = ModuleContext::new(unit, options.tco);

    let mut imports = unit
        .imports
        .iter()
        .map(|module| Import {
            alias: module_alias(module),
            path: module_path(module),
        })
        .collect::<Vec<_>>();
    if !unit.foreign.is_empty() {
        imports.push(Import {
            alias: FOREIGN_ALIAS.to_string(),
            path: FOREIGN_PATH.to_string(),
        });
    }

    let declarations = analyze_module(unit)
        .iter()
        .flat_map(|group| codegen_group(&context, group))
        .collect();

    js::Module {
        imports,
        declarations,
        exports: codegen_exports(&context, &unit.exports),
    }
}
