pub mod compute;
pub mod condition;
pub mod context;
pub mod crypto;
pub mod dates;
pub mod encoding;
pub mod error;
pub mod executor;
pub mod function;
pub mod substitution;
pub mod text;
pub mod user_agent;
pub mod utility;
pub mod variables;

pub use context::{CancellationFlag, ExecutionContext, LogEntry, LogLevel, Settings, TaskLog};
pub use crypto::{CryptoProvider, StandardCrypto};
pub use error::{DiagnosticError, RuntimeError};
pub use executor::{Execute, execute_config};
pub use variables::{CVar, CVarValue, Globals, VariableList};
