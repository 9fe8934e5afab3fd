//! Backend for a functional language targeting JavaScript modules.
//!
//! A compilation unit of optimized IR goes through [`compiler::tco`], which marks
//! recursive binding groups that only call themselves in tail position, and
//! [`compiler::codegen`], which turns those groups into `while (true)` loops and
//! everything else into ordinary JavaScript. [`compiler::pp`] renders the result.

pub mod compiler;
pub mod error;
pub mod options;

pub mod prelude {
    pub use crate::compiler::{
        codegen::{codegen_block_statements, codegen_module, BlockMode},
        env::CodegenEnv,
        ir::{Expr, Ident, Level, ModuleName, Pretty, Qualified, Syntax},
        js::{JsExpr, Module, Statement},
        module::{BindingGroup, CompilationUnit, Export, ModuleContext},
        tco::{analyze, analyze_module, Analysis, TcoEnv, TcoExpr, TcoRef},
    };
    pub use crate::error::{Error, Result};
    pub use crate::options::{CodegenOptions, Emit};
}
