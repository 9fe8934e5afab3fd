#![allow(dead_code)]

use tailc::compiler::ir::*;
use tailc::prelude::*;

pub fn group(bindings: Vec<(&str, Expr)>) -> BindingGroup {
    BindingGroup {
        recursive: false,
        bindings: bindings
            .into_iter()
            .map(|(name, expr)| (Ident::from(name), expr))
            .collect(),
    }
}

pub fn recursive(bindings: Vec<(&str, Expr)>) -> BindingGroup {
    BindingGroup {
        recursive: true,
        ..group(bindings)
    }
}

pub fn unit(groups: Vec<BindingGroup>) -> CompilationUnit {
    CompilationUnit {
        name: ModuleName::from("Main"),
        imports: vec![],
        foreign: vec![],
        groups,
        exports: vec![],
    }
}

pub fn lambda(params: &[(&str, u32)], body: Expr) -> Expr {
    make_abs(
        params
            .iter()
            .map(|(name, level)| make_param(name, *level))
            .collect(),
        body,
    )
}

pub fn main_var(name: &str) -> Expr {
    make_var("Main", name)
}

/// Top-level reference without a module: a binding of the unit itself.
pub fn bare_var(name: &str) -> Expr {
    Expr::new(Syntax::Var(Qualified {
        module: None,
        ident: Ident::from(name),
    }))
}

/// `f x = if x == 0 then 0 else f (x - 1)`, recursing through `head`.
pub fn countdown(head: Expr) -> Expr {
    lambda(
        &[("x", 0)],
        if_else(
            eq(make_local("x", 0), make_int(0)),
            make_int(0),
            call(head, vec![sub(make_local("x", 0), make_int(1))]),
        ),
    )
}

pub fn call(head: Expr, args: Vec<Expr>) -> Expr {
    make_app(head, args)
}

pub fn eq(x: Expr, y: Expr) -> Expr {
    make_op2(BinaryOp::Eq, x, y)
}

pub fn sub(x: Expr, y: Expr) -> Expr {
    make_op2(BinaryOp::Sub, x, y)
}

pub fn add(x: Expr, y: Expr) -> Expr {
    make_op2(BinaryOp::Add, x, y)
}

pub fn if_else(cond: Expr, then: Expr, otherwise: Expr) -> Expr {
    make_branch(vec![(cond, then)], otherwise)
}

/// `sum n acc = if n == 0 then acc else sum (n - 1) (acc + n)`
pub fn sum() -> Expr {
    lambda(
        &[("n", 0), ("acc", 1)],
        if_else(
            eq(make_local("n", 0), make_int(0)),
            make_local("acc", 1),
            call(
                main_var("sum"),
                vec![
                    sub(make_local("n", 0), make_int(1)),
                    add(make_local("acc", 1), make_local("n", 0)),
                ],
            ),
        ),
    )
}

/// One half of `isEven`/`isOdd`: `\n -> if n == 0 then base else other (n - 1)`
pub fn parity(base: bool, other: &str) -> Expr {
    lambda(
        &[("n", 0)],
        if_else(
            eq(make_local("n", 0), make_int(0)),
            make_boolean(base),
            call(main_var(other), vec![sub(make_local("n", 0), make_int(1))]),
        ),
    )
}

pub fn render(unit: &CompilationUnit) -> String {
    codegen_module(unit, &CodegenOptions::default()).to_string()
}
