pub mod codegen;
pub mod env;
pub mod ir;
pub mod js;
pub mod module;
pub mod pp;
pub mod tco;
