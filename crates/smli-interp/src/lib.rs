//! smli-interp: elaboration and evaluation of the smli core language.
//!
//! - `state`: persistent scopes, generations and the datatype registry
//! - `elab`: Hindley-Milner elaboration with exhaustiveness warnings
//! - `eval`: the explicit-stack evaluator (`Machine`)
//! - `initial`: the initial basis
//! - `interpreter`: the `Interpreter` facade tying both phases together
//!
//! ```
//! use smli_ast::derived::*;
//! use smli_interp::Interpreter;
//!
//! let mut interp = Interpreter::new();
//! interp.interpret_expr(infix("+", int(1), int(2))).unwrap();
//! assert_eq!(interp.static_type("it").as_deref(), Some("int"));
//! assert_eq!(interp.show(interp.value("it").unwrap()), "3");
//! ```

pub mod elab;
pub mod error;
pub mod eval;
pub mod exhaustive;
pub mod initial;
pub mod interpreter;
pub mod library;
pub mod options;
pub mod pattern;
pub mod state;
pub mod store;
pub mod value;

pub use elab::{ElabContext, Elaborator};
pub use error::{ElaborationError, EvaluationError, InterpreterError, Warning, WarningKind};
pub use eval::{Machine, Outcome};
pub use interpreter::{Elaboration, Evaluation, Interpreter};
pub use library::{Library, LibraryEntry};
pub use options::InterpreterOptions;
pub use state::{IdentifierStatus, State};
pub use store::Store;
pub use value::{Completion, NativeContext, NativeFunction, Value};
