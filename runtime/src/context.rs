use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use blockscript::block::OutputBinding;
use indexmap::IndexMap;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::crypto::{CryptoProvider, StandardCrypto};
use crate::error::RuntimeError;
use crate::substitution;
use crate::variables::{CVar, CVarValue, Globals, VariableList, VariableSource};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Run-wide settings shared by every task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Relative File paths resolve against this directory.
    pub base_dir: PathBuf,
    /// Cap on nested placeholder re-expansion.
    pub max_substitution_passes: usize,
    /// URLEncode encodes its input in chunks of at most this many chars.
    pub url_encode_chunk: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_dir: PathBuf::from("."),
            max_substitution_passes: 16,
            url_encode_chunk: 2080,
        }
    }
}

// ---------------------------------------------------------------------------
// Task log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

/// What one task did, in order. Kept per task and shown to the user.
#[derive(Debug, Clone, Default)]
pub struct TaskLog {
    entries: Vec<LogEntry>,
}

impl TaskLog {
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        self.entries.push(LogEntry {
            level,
            message: message.into(),
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|e| e.message.contains(needle))
    }
}

// ---------------------------------------------------------------------------
// Cookies and cancellation
// ---------------------------------------------------------------------------

/// Cookies of one task, by name.
#[derive(Debug, Clone, Default)]
pub struct CookieJar(IndexMap<String, String>);

impl CookieJar {
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Raised by whoever drives the task to interrupt a running Delay.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        CancellationFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// Everything one task owns while its blocks run.
pub struct ExecutionContext {
    /// Local scope, created fresh per task.
    pub variables: VariableList,
    /// Global scope, shared with every other task of the run.
    pub globals: Arc<Globals>,
    pub rng: StdRng,
    pub log: TaskLog,
    pub cookies: CookieJar,
    pub settings: Settings,
    pub cancel: CancellationFlag,
    pub crypto: Arc<dyn CryptoProvider>,
}

impl ExecutionContext {
    pub fn new(globals: Arc<Globals>, settings: Settings) -> Self {
        ExecutionContext {
            variables: VariableList::new(),
            globals,
            rng: StdRng::from_entropy(),
            log: TaskLog::default(),
            cookies: CookieJar::default(),
            settings,
            cancel: CancellationFlag::new(),
            crypto: Arc::new(StandardCrypto),
        }
    }

    /// Seed the Local `INPUT` cell with the task's input.
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.variables.set(CVar::single("INPUT", input));
        self
    }

    /// Make random draws reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_crypto(mut self, crypto: Arc<dyn CryptoProvider>) -> Self {
        self.crypto = crypto;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn substitute(&self, template: &str) -> String {
        substitution::substitute(template, self, self.settings.max_substitution_passes)
    }

    pub fn substitute_all(&self, template: &str) -> Vec<String> {
        substitution::substitute_all(template, self, self.settings.max_substitution_passes)
    }

    /// Bind a block result to its output variable in the Local scope.
    /// Nothing happens when the block has no output clause.
    pub fn bind_output(&mut self, output: Option<&OutputBinding>, value: CVarValue) {
        if let Some(binding) = output {
            self.variables.set(CVar::new(binding.name.clone(), value, binding.capture));
        }
    }

    /// Snapshot of a list, Local first then Global.
    pub fn read_list(&self, name: &str) -> Result<Vec<String>, RuntimeError> {
        let var = self
            .lookup(name)
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()))?;
        Ok(var.as_list()?.to_vec())
    }

    /// Read-modify-write on a list, Local first then Global. A Global list
    /// stays locked until `f` returns.
    pub fn modify_list<R>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Vec<String>) -> Result<R, RuntimeError>,
    ) -> Result<R, RuntimeError> {
        if let Some(var) = self.variables.get_mut(name) {
            return f(var.as_list_mut()?);
        }
        self.globals
            .update(name, |var| var.as_list_mut().and_then(f))
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()))?
    }

    /// Captured Local variables, rendered `NAME = value`, in insertion order.
    pub fn captures(&self) -> Vec<String> {
        self.variables
            .iter()
            .filter(|var| var.is_capture)
            .map(|var| format!("{} = {}", var.name, var.value.render()))
            .collect()
    }
}

impl VariableSource for ExecutionContext {
    fn lookup(&self, name: &str) -> Option<Cow<'_, CVar>> {
        self.variables
            .lookup(name)
            .or_else(|| self.globals.get(name).map(Cow::Owned))
    }
}
