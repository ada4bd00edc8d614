use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use indexmap::IndexMap;

use crate::error::RuntimeError;

/// The value held by a variable cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CVarValue {
    Single(String),
    List(Vec<String>),
    Map(IndexMap<String, String>),
}

impl CVarValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            CVarValue::Single(_) => "Single",
            CVarValue::List(_) => "List",
            CVarValue::Map(_) => "Map",
        }
    }

    /// String form used by scalar substitution and capture reports.
    pub fn render(&self) -> String {
        match self {
            CVarValue::Single(value) => value.clone(),
            CVarValue::List(items) => format!("[{}]", items.join(", ")),
            CVarValue::Map(entries) => {
                let pairs: Vec<String> = entries.iter().map(|(k, v)| format!("({}, {})", k, v)).collect();
                format!("{{{}}}", pairs.join(", "))
            }
        }
    }
}

/// A named variable cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CVar {
    pub name: String,
    pub value: CVarValue,
    /// Marks the value as a reportable result of the task.
    pub is_capture: bool,
}

impl CVar {
    pub fn new(name: impl Into<String>, value: CVarValue, is_capture: bool) -> Self {
        CVar {
            name: name.into(),
            value,
            is_capture,
        }
    }

    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        CVar::new(name, CVarValue::Single(value.into()), false)
    }

    pub fn list(name: impl Into<String>, items: Vec<String>) -> Self {
        CVar::new(name, CVarValue::List(items), false)
    }

    pub fn map(name: impl Into<String>, entries: IndexMap<String, String>) -> Self {
        CVar::new(name, CVarValue::Map(entries), false)
    }

    pub fn captured(mut self) -> Self {
        self.is_capture = true;
        self
    }

    fn wrong_kind(&self, expected: &'static str) -> RuntimeError {
        RuntimeError::WrongVariableKind {
            name: self.name.clone(),
            expected,
            got: self.value.kind_name(),
        }
    }

    pub fn as_single(&self) -> Result<&str, RuntimeError> {
        match &self.value {
            CVarValue::Single(value) => Ok(value),
            _ => Err(self.wrong_kind("Single")),
        }
    }

    /// List-only operations fail fast on Single and Map cells.
    pub fn as_list(&self) -> Result<&[String], RuntimeError> {
        match &self.value {
            CVarValue::List(items) => Ok(items),
            _ => Err(self.wrong_kind("List")),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut Vec<String>, RuntimeError> {
        match &mut self.value {
            CVarValue::List(items) => Ok(items),
            other => Err(RuntimeError::WrongVariableKind {
                name: self.name.clone(),
                expected: "List",
                got: other.kind_name(),
            }),
        }
    }

    pub fn as_map(&self) -> Result<&IndexMap<String, String>, RuntimeError> {
        match &self.value {
            CVarValue::Map(entries) => Ok(entries),
            _ => Err(self.wrong_kind("Map")),
        }
    }
}

// ---------------------------------------------------------------------------
// Local scope
// ---------------------------------------------------------------------------

/// The variables of one task. Insertion ordered; names are unique.
#[derive(Debug, Clone, Default)]
pub struct VariableList {
    vars: IndexMap<String, CVar>,
}

impl VariableList {
    pub fn new() -> Self {
        VariableList::default()
    }

    pub fn get(&self, name: &str) -> Option<&CVar> {
        self.vars.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut CVar> {
        self.vars.get_mut(name)
    }

    /// Insert a cell, replacing value and kind of an existing one with the
    /// same name in place.
    pub fn set(&mut self, var: CVar) {
        self.vars.insert(var.name.clone(), var);
    }

    pub fn remove(&mut self, name: &str) -> Option<CVar> {
        self.vars.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CVar> {
        self.vars.values()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Global scope
// ---------------------------------------------------------------------------

/// Variables shared by every task of a run.
///
/// Cells live in a sharded map: plain reads are snapshots, and
/// read-modify-write goes through [`Globals::update`], which holds the shard
/// lock for the duration of the closure. Also owns the per-path locks that
/// serialize file appends across tasks.
#[derive(Debug, Default)]
pub struct Globals {
    vars: DashMap<String, CVar>,
    file_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl Globals {
    pub fn new() -> Self {
        Globals::default()
    }

    pub fn get(&self, name: &str) -> Option<CVar> {
        self.vars.get(name).map(|entry| entry.value().clone())
    }

    pub fn set(&self, var: CVar) {
        self.vars.insert(var.name.clone(), var);
    }

    pub fn remove(&self, name: &str) -> Option<CVar> {
        self.vars.remove(name).map(|(_, var)| var)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Run `f` on the cell while holding its lock. `None` if the cell does not exist.
    pub fn update<R>(&self, name: &str, f: impl FnOnce(&mut CVar) -> R) -> Option<R> {
        self.vars.get_mut(name).map(|mut entry| f(entry.value_mut()))
    }

    pub fn clear(&self) {
        self.vars.clear();
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// The lock guarding writes to `path`, shared by every task.
    pub fn file_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        self.file_locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget the lock for `path` once no task holds a handle to it.
    /// Callers drop their own handle first.
    pub fn release_file_lock(&self, path: &Path) {
        self.file_locks.remove_if(path, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn file_lock_count(&self) -> usize {
        self.file_locks.len()
    }
}

/// Anything placeholders can be resolved against.
pub trait VariableSource {
    fn lookup(&self, name: &str) -> Option<Cow<'_, CVar>>;
}

impl VariableSource for VariableList {
    fn lookup(&self, name: &str) -> Option<Cow<'_, CVar>> {
        self.get(name).map(Cow::Borrowed)
    }
}

impl VariableSource for Globals {
    fn lookup(&self, name: &str) -> Option<Cow<'_, CVar>> {
        self.get(name).map(Cow::Owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_value_and_kind_in_place() {
        let mut vars = VariableList::new();
        vars.set(CVar::single("A", "1"));
        vars.set(CVar::single("B", "2"));
        vars.set(CVar::list("A", vec!["x".into()]));

        assert_eq!(vars.len(), 2);
        let names: Vec<&str> = vars.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(vars.get("A").unwrap().as_list().unwrap(), ["x"]);
    }

    #[test]
    fn list_accessors_fail_fast_on_other_kinds() {
        let mut var = CVar::single("S", "v");
        let err = var.as_list_mut().unwrap_err();
        assert_eq!(err.to_string(), "variable S is a Single, expected a List");
        assert!(CVar::list("L", vec![]).as_map().is_err());
    }

    #[test]
    fn render_forms() {
        let mut map = IndexMap::new();
        map.insert("k1".to_string(), "v1".to_string());
        map.insert("k2".to_string(), "v2".to_string());
        assert_eq!(CVarValue::Map(map).render(), "{(k1, v1), (k2, v2)}");
        assert_eq!(CVarValue::List(vec!["a".into(), "b".into()]).render(), "[a, b]");
        assert_eq!(CVarValue::List(vec![]).render(), "[]");
    }

    #[test]
    fn global_update_and_snapshots() {
        let globals = Globals::new();
        globals.set(CVar::list("G", vec!["a".into()]));
        let snapshot = globals.get("G").unwrap();

        let len = globals
            .update("G", |var| var.as_list_mut().map(|items| {
                items.push("b".into());
                items.len()
            }))
            .unwrap()
            .unwrap();

        assert_eq!(len, 2);
        assert_eq!(snapshot.as_list().unwrap().len(), 1);
        assert!(globals.update("missing", |_| ()).is_none());
    }

    #[test]
    fn file_locks_are_shared_per_path() {
        let globals = Globals::new();
        let a = globals.file_lock(Path::new("x.txt"));
        let b = globals.file_lock(Path::new("x.txt"));
        let c = globals.file_lock(Path::new("y.txt"));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn file_lock_is_released_by_its_last_holder() {
        let globals = Globals::new();
        let path = Path::new("x.txt");
        let a = globals.file_lock(path);
        let b = globals.file_lock(path);

        drop(a);
        globals.release_file_lock(path);
        assert_eq!(globals.file_lock_count(), 1);

        drop(b);
        globals.release_file_lock(path);
        assert_eq!(globals.file_lock_count(), 0);
    }
}
