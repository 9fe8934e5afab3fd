//! Backend IR - the optimized expression tree handed to the tail-call pass.
//!
//! The tree is a syntax functor: [`Syntax<E>`] describes one node whose children
//! have type `E`. The plain tree uses [`Expr`] as child type, the annotated tree
//! produced by [`crate::compiler::tco`] uses `TcoExpr`. Both passes match over the
//! same closed set of variants, so a new node shape must be handled everywhere
//! before the crate compiles again.

use std::fmt;

use pretty::{BoxAllocator, DocAllocator, DocBuilder};
use serde::{Deserialize, Serialize};
use termcolor::{Color, ColorSpec, WriteColor};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ident(pub String);

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Ident {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Binding depth of a lexical binder. A binder at a deeper level shadows any
/// binder of the same display name at a shallower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Level(pub u32);

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleName(pub String);

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProperName(pub String);

impl fmt::Display for ProperName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Qualified {
    pub module: Option<ModuleName>,
    pub ident: Ident,
}

impl Qualified {
    pub fn new(module: impl Into<ModuleName>, ident: impl Into<Ident>) -> Self {
        Self {
            module: Some(module.into()),
            ident: ident.into(),
        }
    }
}

impl fmt::Display for Qualified {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{}.{}", module, self.ident),
            None => write!(f, "{}", self.ident),
        }
    }
}

/// A lambda parameter or let binder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub name: Option<Ident>,
    pub level: Level,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prop<E> {
    pub key: String,
    pub value: E,
}

/// One guarded alternative of a [`Syntax::Branch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pair<E> {
    pub cond: E,
    pub body: E,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal<E> {
    Int(i64),
    Number(f64),
    String(String),
    Char(char),
    Boolean(bool),
    Array(Vec<E>),
    Record(Vec<Prop<E>>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Accessor {
    Prop(String),
    Index(usize),
    CtorField(ProperName, String),
}

/// Pattern tests produced by the pattern-match compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Guard {
    Number(f64),
    Int(i64),
    String(String),
    Char(char),
    Boolean(bool),
    Tag(ProperName),
    ArrayLength(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Negate,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrimOp<E> {
    Op1(UnaryOp, E),
    Op2(BinaryOp, E, E),
}

/// One IR node over children of type `E`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Syntax<E> {
    Var(Qualified),
    Local(Option<Ident>, Level),
    Lit(Literal<E>),
    /// Curried application `f(a)(b)`.
    App(E, Vec<E>),
    /// Curried lambda `a => b => body`.
    Abs(Vec<Param>, E),
    UncurriedApp(E, Vec<E>),
    UncurriedAbs(Vec<Param>, E),
    UncurriedEffectApp(E, Vec<E>),
    UncurriedEffectAbs(Vec<Param>, E),
    Accessor(E, Accessor),
    Update(E, Vec<Prop<E>>),
    CtorSaturated(Qualified, ProperName, Vec<Prop<E>>),
    CtorDef(ProperName, Vec<String>),
    Let(Option<Ident>, Level, E, E),
    /// Mutually recursive binding group. All members share one level and are
    /// told apart by their identifiers.
    LetRec(Level, Vec<(Ident, E)>, E),
    EffectBind(Option<Ident>, Level, E, E),
    EffectPure(E),
    EffectDefer(E),
    Branch(Vec<Pair<E>>, E),
    Test(E, Guard),
    PrimOp(PrimOp<E>),
    PrimUndefined,
    Fail(String),
}

impl<E> Syntax<E> {
    /// Rebuild this node with every child mapped through `f`, in source order.
    pub fn map_ref<'s, T>(&'s self, mut f: impl FnMut(&'s E) -> T) -> Syntax<T> {
        match self {
            Self::Var(name) => Syntax::Var(name.clone()),
            Self::Local(name, level) => Syntax::Local(name.clone(), *level),
            Self::Lit(lit) => Syntax::Lit(match lit {
                Literal::Int(x) => Literal::Int(*x),
                Literal::Number(x) => Literal::Number(*x),
                Literal::String(x) => Literal::String(x.clone()),
                Literal::Char(x) => Literal::Char(*x),
                Literal::Boolean(x) => Literal::Boolean(*x),
                Literal::Array(xs) => Literal::Array(xs.iter().map(&mut f).collect()),
                Literal::Record(xs) => Literal::Record(map_props(xs, &mut f)),
            }),
            Self::App(head, args) => {
                let head = f(head);
                Syntax::App(head, args.iter().map(&mut f).collect())
            }
            Self::Abs(params, body) => Syntax::Abs(params.clone(), f(body)),
            Self::UncurriedApp(head, args) => {
                let head = f(head);
                Syntax::UncurriedApp(head, args.iter().map(&mut f).collect())
            }
            Self::UncurriedAbs(params, body) => Syntax::UncurriedAbs(params.clone(), f(body)),
            Self::UncurriedEffectApp(head, args) => {
                let head = f(head);
                Syntax::UncurriedEffectApp(head, args.iter().map(&mut f).collect())
            }
            Self::UncurriedEffectAbs(params, body) => {
                Syntax::UncurriedEffectAbs(params.clone(), f(body))
            }
            Self::Accessor(expr, acc) => Syntax::Accessor(f(expr), acc.clone()),
            Self::Update(expr, updates) => {
                let expr = f(expr);
                Syntax::Update(expr, map_props(updates, &mut f))
            }
            Self::CtorSaturated(ty, ctor, fields) => {
                Syntax::CtorSaturated(ty.clone(), ctor.clone(), map_props(fields, &mut f))
            }
            Self::CtorDef(ctor, fields) => Syntax::CtorDef(ctor.clone(), fields.clone()),
            Self::Let(name, level, binding, body) => {
                let binding = f(binding);
                Syntax::Let(name.clone(), *level, binding, f(body))
            }
            Self::LetRec(level, bindings, body) => {
                let bindings = bindings
                    .iter()
                    .map(|(name, binding)| (name.clone(), f(binding)))
                    .collect();
                Syntax::LetRec(*level, bindings, f(body))
            }
            Self::EffectBind(name, level, effect, body) => {
                let effect = f(effect);
                Syntax::EffectBind(name.clone(), *level, effect, f(body))
            }
            Self::EffectPure(expr) => Syntax::EffectPure(f(expr)),
            Self::EffectDefer(expr) => Syntax::EffectDefer(f(expr)),
            Self::Branch(pairs, default) => {
                let pairs = pairs
                    .iter()
                    .map(|pair| {
                        let cond = f(&pair.cond);
                        Pair {
                            cond,
                            body: f(&pair.body),
                        }
                    })
                    .collect();
                Syntax::Branch(pairs, f(default))
            }
            Self::Test(expr, guard) => Syntax::Test(f(expr), guard.clone()),
            Self::PrimOp(PrimOp::Op1(op, x)) => Syntax::PrimOp(PrimOp::Op1(*op, f(x))),
            Self::PrimOp(PrimOp::Op2(op, x, y)) => {
                let x = f(x);
                Syntax::PrimOp(PrimOp::Op2(*op, x, f(y)))
            }
            Self::PrimUndefined => Syntax::PrimUndefined,
            Self::Fail(msg) => Syntax::Fail(msg.clone()),
        }
    }

    /// Children in source order.
    pub fn children(&self) -> Vec<&E> {
        let mut out = Vec::new();
        self.map_ref(|child| out.push(child));
        out
    }

    /// Number of parameters when this node is a curried lambda, otherwise 0.
    pub fn syntactic_arity(&self) -> usize {
        match self {
            Self::Abs(params, _) => params.len(),
            _ => 0,
        }
    }

    /// True when lowering this node produces an object literal.
    pub fn is_object_literal(&self) -> bool {
        matches!(
            self,
            Self::Lit(Literal::Record(_)) | Self::CtorSaturated(..) | Self::Update(..)
        )
    }
}

fn map_props<'s, E, T>(props: &'s [Prop<E>], f: &mut dyn FnMut(&'s E) -> T) -> Vec<Prop<T>> {
    props
        .iter()
        .map(|prop| Prop {
            key: prop.key.clone(),
            value: f(&prop.value),
        })
        .collect()
}

/// Plain IR expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expr(pub Box<Syntax<Expr>>);

impl Expr {
    pub fn new(syntax: Syntax<Expr>) -> Self {
        Self(Box::new(syntax))
    }

    pub fn syntax(&self) -> &Syntax<Expr> {
        &self.0
    }
}

pub(crate) fn fg(color: Color) -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(color));
    spec
}

pub(crate) fn kw(color: Color) -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(color));
    spec.set_bold(true);
    spec
}

/// Rendering to a colored document. IR nodes print as S-expressions, lowered
/// JavaScript as source text.
pub trait Pretty {
    fn pretty<'a, D>(&self, allocator: &'a D) -> DocBuilder<'a, D, ColorSpec>
    where
        D: DocAllocator<'a, ColorSpec>,
        D::Doc: Clone;

    fn pretty_print(&self, width: usize, out: impl WriteColor) -> std::io::Result<()> {
        let allocator = BoxAllocator;

        self.pretty(&allocator).1.render_colored(width, out)?;

        Ok(())
    }
}

impl Pretty for Expr {
    fn pretty<'a, D>(&self, allocator: &'a D) -> DocBuilder<'a, D, ColorSpec>
    where
        D: DocAllocator<'a, ColorSpec>,
        D::Doc: Clone,
    {
        self.0.pretty(allocator)
    }
}

fn binder<'a, D>(allocator: &'a D, name: Option<&Ident>, level: Level) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    let name = name.map(|name| name.to_string()).unwrap_or_default();
    allocator
        .text(name)
        .annotate(kw(Color::Blue))
        .append(allocator.text(format!("@{}", level)))
}

fn params<'a, D>(allocator: &'a D, params: &[Param]) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    allocator
        .intersperse(
            params
                .iter()
                .map(|param| binder(allocator, param.name.as_ref(), param.level)),
            allocator.space(),
        )
        .parens()
}

fn form<'a, D, E: Pretty>(
    allocator: &'a D,
    head: &str,
    children: &[&E],
) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    let mut doc = allocator.text(head.to_string()).annotate(fg(Color::Green));
    for child in children {
        doc = doc.append(allocator.line()).append(child.pretty(allocator));
    }
    doc.nest(1).group().parens()
}

impl<E: Pretty> Pretty for Syntax<E> {
    fn pretty<'a, D>(&self, allocator: &'a D) -> DocBuilder<'a, D, ColorSpec>
    where
        D: DocAllocator<'a, ColorSpec>,
        D::Doc: Clone,
    {
        match self {
            Self::Var(name) => allocator
                .text("var")
                .annotate(fg(Color::Green))
                .append(allocator.space())
                .append(allocator.text(name.to_string()).annotate(kw(Color::Blue)))
                .parens(),
            Self::Local(name, level) => allocator
                .text("local")
                .annotate(fg(Color::Green))
                .append(allocator.space())
                .append(binder(allocator, name.as_ref(), *level))
                .parens(),
            Self::Lit(lit) => match lit {
                Literal::Int(x) => allocator.text(x.to_string()),
                Literal::Number(x) => allocator.text(format!("{:?}", x)),
                Literal::String(x) => allocator.text(format!("{:?}", x)),
                Literal::Char(x) => allocator.text(format!("#\\{}", x)),
                Literal::Boolean(x) => allocator.text(if *x { "#t" } else { "#f" }),
                Literal::Array(xs) => form(allocator, "array", &xs.iter().collect::<Vec<_>>()),
                Literal::Record(props) => {
                    let fields = allocator.intersperse(
                        props.iter().map(|prop| {
                            allocator
                                .text(prop.key.clone())
                                .append(allocator.space())
                                .append(prop.value.pretty(allocator))
                                .brackets()
                        }),
                        allocator.line(),
                    );
                    allocator
                        .text("record")
                        .annotate(fg(Color::Green))
                        .append(allocator.line())
                        .append(fields)
                        .nest(1)
                        .group()
                        .parens()
                }
            },
            Self::App(head, args) | Self::UncurriedApp(head, args) | Self::UncurriedEffectApp(head, args) => {
                let name = match self {
                    Self::App(..) => "app",
                    Self::UncurriedApp(..) => "app*",
                    _ => "app!",
                };
                let mut children = vec![head];
                children.extend(args.iter());
                form(allocator, name, &children).align()
            }
            Self::Abs(ps, body) | Self::UncurriedAbs(ps, body) | Self::UncurriedEffectAbs(ps, body) => {
                let name = match self {
                    Self::Abs(..) => "lambda",
                    Self::UncurriedAbs(..) => "lambda*",
                    _ => "lambda!",
                };
                allocator
                    .text(name)
                    .annotate(fg(Color::Green))
                    .append(allocator.space())
                    .append(params(allocator, ps))
                    .append(allocator.line())
                    .append(body.pretty(allocator))
                    .nest(1)
                    .align()
                    .group()
                    .parens()
            }
            Self::Accessor(expr, acc) => {
                let acc = match acc {
                    Accessor::Prop(prop) => format!(".{}", prop),
                    Accessor::Index(index) => format!("[{}]", index),
                    Accessor::CtorField(ctor, field) => format!("{}.{}", ctor, field),
                };
                allocator
                    .text("get")
                    .annotate(fg(Color::Green))
                    .append(allocator.space())
                    .append(allocator.text(acc))
                    .append(allocator.line())
                    .append(expr.pretty(allocator))
                    .nest(1)
                    .group()
                    .parens()
            }
            Self::Update(expr, props) => {
                let fields = allocator.intersperse(
                    props.iter().map(|prop| {
                        allocator
                            .text(prop.key.clone())
                            .append(allocator.space())
                            .append(prop.value.pretty(allocator))
                            .brackets()
                    }),
                    allocator.line(),
                );
                allocator
                    .text("update")
                    .annotate(fg(Color::Green))
                    .append(allocator.space())
                    .append(expr.pretty(allocator))
                    .append(allocator.line())
                    .append(fields)
                    .nest(1)
                    .group()
                    .parens()
            }
            Self::CtorSaturated(ty, ctor, fields) => {
                let mut doc = allocator
                    .text("ctor")
                    .annotate(fg(Color::Green))
                    .append(allocator.space())
                    .append(allocator.text(format!("{}.{}", ty, ctor)).annotate(kw(Color::Blue)));
                for field in fields {
                    doc = doc.append(allocator.line()).append(field.value.pretty(allocator));
                }
                doc.nest(1).group().parens()
            }
            Self::CtorDef(ctor, fields) => allocator
                .text("ctor-def")
                .annotate(fg(Color::Green))
                .append(allocator.space())
                .append(allocator.text(ctor.to_string()).annotate(kw(Color::Blue)))
                .append(allocator.space())
                .append(
                    allocator
                        .intersperse(fields.iter().map(|f| allocator.text(f.clone())), allocator.space())
                        .parens(),
                )
                .parens(),
            Self::Let(name, level, binding, body) | Self::EffectBind(name, level, binding, body) => {
                let head = if matches!(self, Self::Let(..)) { "let" } else { "bind!" };
                let binding = binder(allocator, name.as_ref(), *level)
                    .append(allocator.space())
                    .append(binding.pretty(allocator))
                    .group()
                    .brackets();
                allocator
                    .text(head)
                    .annotate(fg(Color::Green))
                    .append(allocator.space())
                    .append(binding.nest(1))
                    .append(allocator.line())
                    .append(body.pretty(allocator))
                    .nest(1)
                    .align()
                    .group()
                    .parens()
            }
            Self::LetRec(level, bindings, body) => {
                let bindings = allocator
                    .intersperse(
                        bindings.iter().map(|(name, value)| {
                            binder(allocator, Some(name), *level)
                                .append(allocator.line())
                                .append(value.pretty(allocator))
                                .nest(1)
                                .group()
                                .brackets()
                        }),
                        allocator.line(),
                    )
                    .parens();
                allocator
                    .text("letrec")
                    .annotate(fg(Color::Green))
                    .append(allocator.space())
                    .append(bindings.align())
                    .append(allocator.line())
                    .append(body.pretty(allocator))
                    .nest(1)
                    .align()
                    .group()
                    .parens()
            }
            Self::EffectPure(expr) => form(allocator, "pure!", &[expr]),
            Self::EffectDefer(expr) => form(allocator, "defer!", &[expr]),
            Self::Branch(pairs, default) => {
                let mut doc = allocator.text("branch").annotate(fg(Color::Green));
                for pair in pairs {
                    doc = doc.append(allocator.line()).append(
                        pair.cond
                            .pretty(allocator)
                            .append(allocator.line())
                            .append(pair.body.pretty(allocator))
                            .nest(1)
                            .group()
                            .brackets(),
                    );
                }
                doc.append(allocator.line())
                    .append(
                        allocator
                            .text("else")
                            .append(allocator.line())
                            .append(default.pretty(allocator))
                            .nest(1)
                            .group()
                            .brackets(),
                    )
                    .nest(1)
                    .align()
                    .group()
                    .parens()
            }
            Self::Test(expr, guard) => allocator
                .text("test")
                .annotate(fg(Color::Green))
                .append(allocator.space())
                .append(allocator.text(format!("{:?}", guard)))
                .append(allocator.line())
                .append(expr.pretty(allocator))
                .nest(1)
                .group()
                .parens(),
            Self::PrimOp(PrimOp::Op1(op, x)) => form(allocator, &format!("{:?}", op), &[x]),
            Self::PrimOp(PrimOp::Op2(op, x, y)) => form(allocator, &format!("{:?}", op), &[x, y]),
            Self::PrimUndefined => allocator.text("undefined").parens(),
            Self::Fail(msg) => allocator
                .text("fail")
                .annotate(fg(Color::Red))
                .append(allocator.space())
                .append(allocator.text(format!("{:?}", msg)))
                .parens(),
        }
    }
}

pub fn make_var(module: &str, ident: &str) -> Expr {
    Expr::new(Syntax::Var(Qualified::new(module, ident)))
}

pub fn make_local(name: &str, level: u32) -> Expr {
    Expr::new(Syntax::Local(Some(Ident::from(name)), Level(level)))
}

pub fn make_param(name: &str, level: u32) -> Param {
    Param {
        name: Some(Ident::from(name)),
        level: Level(level),
    }
}

pub fn make_int(x: i64) -> Expr {
    Expr::new(Syntax::Lit(Literal::Int(x)))
}

pub fn make_string(x: &str) -> Expr {
    Expr::new(Syntax::Lit(Literal::String(x.to_string())))
}

pub fn make_boolean(x: bool) -> Expr {
    Expr::new(Syntax::Lit(Literal::Boolean(x)))
}

pub fn make_record(fields: Vec<(&str, Expr)>) -> Expr {
    Expr::new(Syntax::Lit(Literal::Record(
        fields
            .into_iter()
            .map(|(key, value)| Prop {
                key: key.to_string(),
                value,
            })
            .collect(),
    )))
}

pub fn make_app(head: Expr, args: Vec<Expr>) -> Expr {
    Expr::new(Syntax::App(head, args))
}

pub fn make_abs(params: Vec<Param>, body: Expr) -> Expr {
    Expr::new(Syntax::Abs(params, body))
}

pub fn make_let(name: &str, level: u32, binding: Expr, body: Expr) -> Expr {
    Expr::new(Syntax::Let(Some(Ident::from(name)), Level(level), binding, body))
}

pub fn make_letrec(level: u32, bindings: Vec<(&str, Expr)>, body: Expr) -> Expr {
    Expr::new(Syntax::LetRec(
        Level(level),
        bindings
            .into_iter()
            .map(|(name, binding)| (Ident::from(name), binding))
            .collect(),
        body,
    ))
}

pub fn make_branch(pairs: Vec<(Expr, Expr)>, default: Expr) -> Expr {
    Expr::new(Syntax::Branch(
        pairs
            .into_iter()
            .map(|(cond, body)| Pair { cond, body })
            .collect(),
        default,
    ))
}

pub fn make_op2(op: BinaryOp, x: Expr, y: Expr) -> Expr {
    Expr::new(Syntax::PrimOp(PrimOp::Op2(op, x, y)))
}

pub fn make_fail(msg: &str) -> Expr {
    Expr::new(Syntax::Fail(msg.to_string()))
}
