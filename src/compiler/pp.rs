//! JavaScript source emission.

use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use pretty::{BoxAllocator, DocAllocator, DocBuilder};
use termcolor::{Color, ColorSpec};

use super::ir::{fg, kw, BinaryOp, Pretty, UnaryOp};
use super::js::{ExportList, Import, JsExpr, Module, ObjectField, Statement};

/// Width used by the `Display` impls.
pub const DEFAULT_WIDTH: usize = 80;

static RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "abstract", "arguments", "await", "boolean", "break", "byte", "case", "catch", "char",
        "class", "const", "continue", "debugger", "default", "delete", "do", "double", "else",
        "enum", "eval", "export", "extends", "false", "final", "finally", "float", "for",
        "function", "goto", "if", "implements", "import", "in", "instanceof", "int",
        "interface", "let", "long", "native", "new", "null", "package", "private", "protected",
        "public", "return", "short", "static", "super", "switch", "synchronized", "this",
        "throw", "throws", "transient", "true", "try", "typeof", "var", "void", "volatile",
        "while", "with", "yield", "undefined", "NaN", "Infinity",
    ]
    .into_iter()
    .collect()
});

/// `class` becomes `$$class` and primes become `$p` (`go'` is `go$p`).
pub fn escape_ident(name: &str) -> String {
    if RESERVED.contains(name) {
        format!("$${}", name)
    } else {
        name.replace('\'', "$p")
    }
}

fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '$' || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '$' || c == '_')
}

fn string_literal(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{:?}", value))
}

fn number_literal(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "Infinity".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        format!("{:?}", value)
    }
}

fn binary_op(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Eq => "===",
        BinaryOp::NotEq => "!==",
        BinaryOp::Lt => "<",
        BinaryOp::Lte => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Gte => ">=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
    }
}

fn unary_op(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Not => "!",
        UnaryOp::Negate => "-",
        UnaryOp::BitNot => "~",
    }
}

const PREC_ARROW: u8 = 1;
const PREC_TERNARY: u8 = 2;
const PREC_UNARY: u8 = 14;
const PREC_MEMBER: u8 = 18;

fn precedence(expr: &JsExpr) -> u8 {
    match expr {
        JsExpr::Arrow(..) => PREC_ARROW,
        JsExpr::Ternary(..) => PREC_TERNARY,
        JsExpr::Binary(BinaryOp::Or, ..) => 3,
        JsExpr::Binary(BinaryOp::And, ..) => 4,
        JsExpr::Binary(BinaryOp::Eq | BinaryOp::NotEq, ..) => 8,
        JsExpr::Binary(BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte, ..) => 9,
        JsExpr::Binary(BinaryOp::Add | BinaryOp::Sub, ..) => 11,
        JsExpr::Binary(BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod, ..) => 12,
        JsExpr::Unary(..) => PREC_UNARY,
        JsExpr::Int(x) if *x < 0 => PREC_UNARY,
        JsExpr::Number(x) if x.is_sign_negative() => PREC_UNARY,
        JsExpr::New(..) => 17,
        _ => PREC_MEMBER,
    }
}

fn keyword<'a, D>(allocator: &'a D, word: &'static str) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    allocator.text(word).annotate(kw(Color::Magenta))
}

fn name<'a, D>(allocator: &'a D, ident: &str) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    allocator.text(escape_ident(ident))
}

/// Name of an export specifier: reserved words are allowed there, anything
/// else that is not an identifier is quoted.
fn export_name<'a, D>(allocator: &'a D, value: &str) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    if is_identifier_name(value) {
        allocator.text(value.to_string())
    } else {
        string(allocator, value)
    }
}

fn string<'a, D>(allocator: &'a D, value: &str) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    allocator.text(string_literal(value)).annotate(fg(Color::Green))
}

fn comma_separated<'a, D>(
    allocator: &'a D,
    docs: impl Iterator<Item = DocBuilder<'a, D, ColorSpec>>,
) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    allocator.intersperse(docs, allocator.text(", "))
}

/// `expr`, parenthesized when it binds looser than `min`.
fn operand<'a, D>(allocator: &'a D, expr: &JsExpr, min: u8) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    if precedence(expr) < min {
        expression(allocator, expr).parens()
    } else {
        expression(allocator, expr)
    }
}

fn arguments<'a, D>(allocator: &'a D, args: &[JsExpr]) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    comma_separated(allocator, args.iter().map(|arg| expression(allocator, arg))).parens()
}

fn property<'a, D>(allocator: &'a D, key: &str) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    if is_identifier_name(key) {
        allocator.text(key.to_string())
    } else {
        string(allocator, key)
    }
}

fn arrow_body<'a, D>(allocator: &'a D, body: &[Statement]) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    match body {
        [Statement::Return(value) | Statement::ReturnObject(value)] => match value {
            JsExpr::Object(_) => expression(allocator, value).parens(),
            _ => expression(allocator, value),
        },
        _ => block(allocator, body),
    }
}

fn expression<'a, D>(allocator: &'a D, expr: &JsExpr) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    match expr {
        JsExpr::Ident(ident) => name(allocator, ident),
        JsExpr::Int(x) => allocator.text(x.to_string()).annotate(fg(Color::Cyan)),
        JsExpr::Number(x) => allocator.text(number_literal(*x)).annotate(fg(Color::Cyan)),
        JsExpr::String(x) => string(allocator, x),
        JsExpr::Boolean(x) => allocator.text(x.to_string()).annotate(fg(Color::Cyan)),
        JsExpr::Undefined => keyword(allocator, "undefined"),
        JsExpr::Array(items) => {
            comma_separated(allocator, items.iter().map(|item| expression(allocator, item))).brackets()
        }
        JsExpr::Object(fields) if fields.is_empty() => allocator.text("{}"),
        JsExpr::Object(fields) => {
            let fields = fields.iter().map(|field| match field {
                ObjectField::Field(key, value) => property(allocator, key)
                    .append(allocator.text(": "))
                    .append(expression(allocator, value)),
                ObjectField::Spread(value) => allocator
                    .text("...")
                    .append(operand(allocator, value, PREC_TERNARY)),
            });
            allocator
                .text("{ ")
                .append(comma_separated(allocator, fields))
                .append(allocator.text(" }"))
        }
        JsExpr::Access(object, prop) => {
            let object = operand(allocator, object, PREC_MEMBER);
            if is_identifier_name(prop) {
                object.append(allocator.text(format!(".{}", prop)))
            } else {
                object.append(string(allocator, prop).brackets())
            }
        }
        JsExpr::Index(object, index) => {
            operand(allocator, object, PREC_MEMBER).append(expression(allocator, index).brackets())
        }
        JsExpr::Call(callee, args) => operand(allocator, callee, PREC_MEMBER).append(arguments(allocator, args)),
        JsExpr::New(callee, args) => keyword(allocator, "new")
            .append(allocator.space())
            .append(operand(allocator, callee, PREC_MEMBER))
            .append(arguments(allocator, args)),
        JsExpr::Arrow(params, body) => {
            let params = match params.as_slice() {
                [param] => name(allocator, param),
                _ => comma_separated(allocator, params.iter().map(|param| name(allocator, param))).parens(),
            };
            params
                .append(allocator.text(" => "))
                .append(arrow_body(allocator, body))
        }
        JsExpr::Unary(op, x) => {
            allocator
                .text(unary_op(*op))
                .append(operand(allocator, x, PREC_MEMBER))
        }
        JsExpr::Binary(op, x, y) => operand(allocator, x, PREC_UNARY)
            .append(allocator.text(format!(" {} ", binary_op(*op))))
            .append(operand(allocator, y, PREC_UNARY)),
        JsExpr::Ternary(cond, then, otherwise) => operand(allocator, cond, PREC_TERNARY + 1)
            .append(allocator.text(" ? "))
            .append(operand(allocator, then, PREC_TERNARY))
            .append(allocator.text(" : "))
            .append(operand(allocator, otherwise, PREC_TERNARY)),
    }
}

fn block<'a, D>(allocator: &'a D, body: &[Statement]) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    if body.is_empty() {
        return allocator.text("{}");
    }
    allocator
        .text("{")
        .append(allocator.hardline().append(statements(allocator, body)).nest(2))
        .append(allocator.hardline())
        .append(allocator.text("}"))
}

fn statements<'a, D>(allocator: &'a D, body: &[Statement]) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    allocator.intersperse(
        body.iter().map(|stmt| statement(allocator, stmt)),
        allocator.hardline(),
    )
}

fn declaration<'a, D>(
    allocator: &'a D,
    word: &'static str,
    ident: &str,
    value: Option<&JsExpr>,
) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    let doc = keyword(allocator, word)
        .append(allocator.space())
        .append(name(allocator, ident));
    match value {
        Some(value) => doc
            .append(allocator.text(" = "))
            .append(expression(allocator, value))
            .append(allocator.text(";")),
        None => doc.append(allocator.text(";")),
    }
}

fn statement<'a, D>(allocator: &'a D, stmt: &Statement) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    match stmt {
        Statement::Const(ident, value) => declaration(allocator, "const", ident, Some(value)),
        Statement::Let(ident, value) => declaration(allocator, "let", ident, value.as_ref()),
        Statement::Assign(ident, value) => name(allocator, ident)
            .append(allocator.text(" = "))
            .append(expression(allocator, value))
            .append(allocator.text(";")),
        Statement::Expr(value @ JsExpr::Object(_)) => {
            expression(allocator, value).parens().append(allocator.text(";"))
        }
        Statement::Expr(value) => expression(allocator, value).append(allocator.text(";")),
        Statement::If(alternatives) => {
            let arms = alternatives.iter().map(|(cond, body)| {
                keyword(allocator, "if")
                    .append(allocator.space())
                    .append(expression(allocator, cond).parens())
                    .append(allocator.space())
                    .append(block(allocator, body))
            });
            allocator.intersperse(
                arms,
                allocator
                    .space()
                    .append(keyword(allocator, "else"))
                    .append(allocator.space()),
            )
        }
        Statement::Loop(body) => keyword(allocator, "while")
            .append(allocator.space())
            .append(keyword(allocator, "true").parens())
            .append(allocator.space())
            .append(block(allocator, body)),
        Statement::Continue => keyword(allocator, "continue").append(allocator.text(";")),
        Statement::Return(value) | Statement::ReturnObject(value) => keyword(allocator, "return")
            .append(allocator.space())
            .append(expression(allocator, value))
            .append(allocator.text(";")),
        Statement::ReturnUndefined => keyword(allocator, "return").append(allocator.text(";")),
        Statement::Throw(value) => keyword(allocator, "throw")
            .append(allocator.space())
            .append(expression(allocator, value))
            .append(allocator.text(";")),
    }
}

fn import<'a, D>(allocator: &'a D, import: &Import) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    keyword(allocator, "import")
        .append(allocator.text(" * as "))
        .append(name(allocator, &import.alias))
        .append(allocator.space())
        .append(keyword(allocator, "from"))
        .append(allocator.space())
        .append(string(allocator, &import.path))
        .append(allocator.text(";"))
}

fn export<'a, D>(allocator: &'a D, export: &ExportList) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    let names = export.names.iter().map(|(local, public)| {
        // Re-exported names are the other module's public names, never escaped.
        let source = match export.from {
            Some(_) => export_name(allocator, local),
            None => name(allocator, local),
        };
        let public = match public {
            Some(public) => Some(public.as_str()),
            None if export.from.is_none() && escape_ident(local) != *local => Some(local.as_str()),
            None => None,
        };
        match public {
            Some(public) => source
                .append(allocator.space())
                .append(keyword(allocator, "as"))
                .append(allocator.space())
                .append(export_name(allocator, public)),
            None => source,
        }
    });
    let doc = keyword(allocator, "export")
        .append(allocator.space())
        .append(comma_separated(allocator, names).braces());
    match &export.from {
        Some(path) => doc
            .append(allocator.space())
            .append(keyword(allocator, "from"))
            .append(allocator.space())
            .append(string(allocator, path))
            .append(allocator.text(";")),
        None => doc.append(allocator.text(";")),
    }
}

impl Pretty for Module {
    fn pretty<'a, D>(&self, allocator: &'a D) -> DocBuilder<'a, D, ColorSpec>
    where
        D: DocAllocator<'a, ColorSpec>,
        D::Doc: Clone,
    {
        let imports = self.imports.iter().map(|decl| import(allocator, decl));
        let declarations = self.declarations.iter().map(|stmt| statement(allocator, stmt));
        let exports = self.exports.iter().map(|decl| export(allocator, decl));
        allocator.intersperse(imports.chain(declarations).chain(exports), allocator.hardline())
    }
}

impl Pretty for Statement {
    fn pretty<'a, D>(&self, allocator: &'a D) -> DocBuilder<'a, D, ColorSpec>
    where
        D: DocAllocator<'a, ColorSpec>,
        D::Doc: Clone,
    {
        statement(allocator, self)
    }
}

impl Pretty for JsExpr {
    fn pretty<'a, D>(&self, allocator: &'a D) -> DocBuilder<'a, D, ColorSpec>
    where
        D: DocAllocator<'a, ColorSpec>,
        D::Doc: Clone,
    {
        expression(allocator, self)
    }
}

/// Source text of a statement list, one statement per line.
pub fn render_statements(body: &[Statement]) -> String {
    let allocator = BoxAllocator;
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = statements(&allocator, body).1.render_fmt(DEFAULT_WIDTH, &mut out);
    out
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.pretty(&BoxAllocator).1.render_fmt(DEFAULT_WIDTH, f)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.pretty(&BoxAllocator).1.render_fmt(DEFAULT_WIDTH, f)
    }
}

impl fmt::Display for JsExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.pretty(&BoxAllocator).1.render_fmt(DEFAULT_WIDTH, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> JsExpr {
        JsExpr::ident(name)
    }

    #[test]
    fn reserved_words_are_escaped() {
        assert_eq!(escape_ident("class"), "$$class");
        assert_eq!(escape_ident("klass"), "klass");
        assert_eq!(ident("new").to_string(), "$$new");
    }

    #[test]
    fn primes_are_escaped() {
        assert_eq!(escape_ident("go'"), "go$p");
        assert_eq!(escape_ident("x''"), "x$p$p");
        assert_eq!(ident("go'").to_string(), "go$p");
    }

    #[test]
    fn escaped_exports_keep_their_public_name() {
        let module = Module {
            imports: vec![],
            declarations: vec![],
            exports: vec![
                ExportList {
                    names: vec![
                        ("class".into(), None),
                        ("go'".into(), None),
                        ("run".into(), Some("run'".into())),
                        ("plain".into(), None),
                    ],
                    from: None,
                },
                ExportList {
                    names: vec![("default".into(), None)],
                    from: Some("../Data.Maybe/index.js".into()),
                },
            ],
        };
        assert_eq!(
            module.to_string(),
            "export {$$class as class, go$p as \"go'\", run as \"run'\", plain};\n\
             export {default} from \"../Data.Maybe/index.js\";"
        );
    }

    #[test]
    fn strings_are_json_escaped() {
        assert_eq!(JsExpr::String("a\"b\n".into()).to_string(), r#""a\"b\n""#);
    }

    #[test]
    fn numbers_keep_a_fraction() {
        assert_eq!(JsExpr::Number(1.0).to_string(), "1.0");
        assert_eq!(JsExpr::Number(f64::INFINITY).to_string(), "Infinity");
    }

    #[test]
    fn nested_binary_operands_are_parenthesized() {
        let expr = JsExpr::binary(
            BinaryOp::Mul,
            JsExpr::binary(BinaryOp::Add, ident("a"), ident("b")),
            JsExpr::Int(2),
        );
        assert_eq!(expr.to_string(), "(a + b) * 2");
    }

    #[test]
    fn property_access_quotes_non_identifiers() {
        assert_eq!(JsExpr::access(ident("r"), "x").to_string(), "r.x");
        assert_eq!(JsExpr::access(ident("r"), "a b").to_string(), r#"r["a b"]"#);
    }

    #[test]
    fn immediately_invoked_arrows_are_wrapped() {
        let expr = JsExpr::iife(vec![Statement::Return(JsExpr::Int(1))]);
        assert_eq!(expr.to_string(), "(() => 1)()");
    }

    #[test]
    fn concise_object_bodies_are_parenthesized() {
        let object = JsExpr::Object(vec![ObjectField::Field("x".into(), ident("x"))]);
        let expr = JsExpr::Arrow(vec!["x".into()], vec![Statement::ReturnObject(object)]);
        assert_eq!(expr.to_string(), "x => ({ x: x })");
    }

    #[test]
    fn loops_render_with_hard_breaks() {
        let body = vec![
            Statement::If(vec![(
                ident("done"),
                vec![Statement::Return(ident("acc"))],
            )]),
            Statement::Assign("$go_acc".into(), JsExpr::Int(0)),
            Statement::Continue,
        ];
        assert_eq!(
            render_statements(&[Statement::Loop(body)]),
            "while (true) {\n  if (done) {\n    return acc;\n  }\n  $go_acc = 0;\n  continue;\n}"
        );
    }
}
