// Tue Oct 13 2026 - Alex

mod ast;
mod builtins;
mod engine;
mod eval;
mod handle;
mod host;
mod lexer;
mod parser;
mod scope;
mod value;

pub use engine::InterpEngine;
pub use handle::InterpValue;
