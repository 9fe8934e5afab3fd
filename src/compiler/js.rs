//! JavaScript syntax produced by lowering. Rendering lives in [`crate::compiler::pp`].

use super::ir::{BinaryOp, UnaryOp};

#[derive(Debug, Clone, PartialEq)]
pub enum JsExpr {
    Ident(String),
    Int(i64),
    Number(f64),
    String(String),
    Boolean(bool),
    Undefined,
    Array(Vec<JsExpr>),
    Object(Vec<ObjectField>),
    /// `e.p`, or `e["p"]` when `p` is not an identifier.
    Access(Box<JsExpr>, String),
    Index(Box<JsExpr>, Box<JsExpr>),
    Call(Box<JsExpr>, Vec<JsExpr>),
    New(Box<JsExpr>, Vec<JsExpr>),
    /// Uncurried arrow function with a block body.
    Arrow(Vec<String>, Vec<Statement>),
    Unary(UnaryOp, Box<JsExpr>),
    Binary(BinaryOp, Box<JsExpr>, Box<JsExpr>),
    Ternary(Box<JsExpr>, Box<JsExpr>, Box<JsExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectField {
    Field(String, JsExpr),
    Spread(JsExpr),
}

impl JsExpr {
    pub fn ident(name: impl Into<String>) -> Self {
        Self::Ident(name.into())
    }

    pub fn call(callee: JsExpr, args: Vec<JsExpr>) -> Self {
        Self::Call(Box::new(callee), args)
    }

    pub fn access(object: JsExpr, prop: impl Into<String>) -> Self {
        Self::Access(Box::new(object), prop.into())
    }

    pub fn binary(op: BinaryOp, x: JsExpr, y: JsExpr) -> Self {
        Self::Binary(op, Box::new(x), Box::new(y))
    }

    /// Immediately invoked arrow function.
    pub fn iife(body: Vec<Statement>) -> Self {
        Self::call(Self::Arrow(vec![], body), vec![])
    }

    /// `a => b => { body }`, one arrow per parameter.
    pub fn curried(params: Vec<String>, body: Vec<Statement>) -> Self {
        let mut params = params.into_iter().rev();
        let Some(last) = params.next() else {
            return Self::Arrow(vec![], body);
        };
        params.fold(Self::Arrow(vec![last], body), |inner, param| {
            Self::Arrow(vec![param], vec![Statement::Return(inner)])
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Const(String, JsExpr),
    Let(String, Option<JsExpr>),
    Assign(String, JsExpr),
    Expr(JsExpr),
    /// `if (c1) {..} else if (c2) {..}` without a final `else`; the statements
    /// following the chain are the default.
    If(Vec<(JsExpr, Vec<Statement>)>),
    Loop(Vec<Statement>),
    Continue,
    Return(JsExpr),
    /// Return of an object literal, parenthesized in concise arrow bodies.
    ReturnObject(JsExpr),
    ReturnUndefined,
    Throw(JsExpr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub alias: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportList {
    /// Local name and public name when it differs.
    pub names: Vec<(String, Option<String>)>,
    pub from: Option<String>,
}

/// A lowered ES module.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub imports: Vec<Import>,
    pub declarations: Vec<Statement>,
    pub exports: Vec<ExportList>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curried_nests_one_arrow_per_parameter() {
        let body = vec![Statement::Return(JsExpr::ident("b"))];
        let curried = JsExpr::curried(vec!["a".into(), "b".into()], body.clone());
        assert_eq!(
            curried,
            JsExpr::Arrow(
                vec!["a".into()],
                vec![Statement::Return(JsExpr::Arrow(vec!["b".into()], body))]
            )
        );
    }

    #[test]
    fn curried_without_parameters_is_a_thunk() {
        let curried = JsExpr::curried(vec![], vec![Statement::ReturnUndefined]);
        assert_eq!(curried, JsExpr::Arrow(vec![], vec![Statement::ReturnUndefined]));
    }
}
