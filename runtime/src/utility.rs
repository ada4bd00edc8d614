//! Execution of Utility blocks.
//!
//! Utility operations are best-effort: a failure is written to the task log
//! and the task moves on to the next block.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use blockscript::block::{FileOp, ListOp, UtilityBlock, UtilityOp, VarOp};
use blockscript::keyword::Keyword;
use indexmap::{IndexMap, IndexSet};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::condition::Condition;
use crate::context::ExecutionContext;
use crate::encoding;
use crate::error::RuntimeError;
use crate::text;
use crate::variables::{CVarValue, VariableSource};

/// Run the block, logging instead of returning any failure.
pub fn execute_utility(block: &UtilityBlock, ctx: &mut ExecutionContext) {
    match run(&block.op, ctx) {
        Ok(Some(value)) => ctx.bind_output(block.output.as_ref(), value),
        Ok(None) => {}
        Err(err) => {
            warn!(group = block.op.group().name(), error = %err, "utility block failed");
            ctx.log.error(err.to_string());
        }
    }
}

/// The value to bind to the output variable, if the operation produces one.
fn run(op: &UtilityOp, ctx: &mut ExecutionContext) -> Result<Option<CVarValue>, RuntimeError> {
    match op {
        UtilityOp::List { list, action } => {
            let list = ctx.substitute(list);
            let value = run_list(&list, action, ctx)?;
            ctx.log
                .info(format!("Executed action {} on list {}", action.action(), list));
            Ok(value)
        }

        UtilityOp::Variable { variable, action } => {
            let variable = ctx.substitute(variable);
            let value = match action {
                VarOp::Split { separator } => {
                    let separator = ctx.substitute(separator);
                    let single = ctx
                        .lookup(&variable)
                        .ok_or_else(|| RuntimeError::UndefinedVariable(variable.clone()))?
                        .as_single()?
                        .to_string();
                    CVarValue::List(split(&single, &separator))
                }
            };
            ctx.log
                .info(format!("Executed action {} on variable {}", action.action(), variable));
            Ok(Some(value))
        }

        UtilityOp::Conversion { from, to, input } => {
            let input = ctx.substitute(input);
            let converted = encoding::convert(&input, *from, *to)?;
            ctx.log.info(format!("Converted input {} to {}", from, to));
            Ok(Some(CVarValue::Single(converted)))
        }

        UtilityOp::File { path, action } => {
            let path = resolve_path(&ctx.substitute(path), ctx);
            let value = run_file(&path, action, ctx)?;
            ctx.log
                .info(format!("Executed action {} on file {}", action.action(), path.display()));
            Ok(value)
        }
    }
}

/// Split on a literal separator, keeping empty pieces.
pub fn split(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return vec![text.to_string()];
    }
    text.split(separator).map(str::to_string).collect()
}

/// Effective index for Add and Remove on a list of length `len`.
///
/// An empty list always yields 0; a negative index counts back from the
/// end; anything else is returned unchanged.
pub fn normalize_list_index(index: i64, len: usize) -> i64 {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    if len == 0 {
        0
    } else if index < 0 {
        index + len
    } else {
        index
    }
}

fn run_list(list: &str, op: &ListOp, ctx: &mut ExecutionContext) -> Result<Option<CVarValue>, RuntimeError> {
    let value = match op {
        ListOp::Create => CVarValue::List(Vec::new()),

        ListOp::Length => CVarValue::Single(ctx.read_list(list)?.len().to_string()),

        ListOp::Join { separator } => {
            let separator = ctx.substitute(separator);
            CVarValue::Single(ctx.read_list(list)?.join(&separator))
        }

        ListOp::Sort { ascending, numeric } => {
            let mut sorted = ctx.read_list(list)?;
            if *numeric {
                let mut numbers = sorted
                    .iter()
                    .map(|item| crate::condition::number(item))
                    .collect::<Result<Vec<f64>, _>>()?;
                numbers.sort_by(f64::total_cmp);
                sorted = numbers.into_iter().map(text::format_number).collect();
            } else {
                sorted.sort();
            }
            if !ascending {
                sorted.reverse();
            }
            CVarValue::List(sorted)
        }

        ListOp::Concat { second } => {
            let mut items = ctx.read_list(list)?;
            items.extend(ctx.read_list(&ctx.substitute(second))?);
            CVarValue::List(items)
        }

        ListOp::Zip { second } => {
            let first = ctx.read_list(list)?;
            let second = ctx.read_list(&ctx.substitute(second))?;
            CVarValue::List(first.iter().zip(&second).map(|(a, b)| format!("{}{}", a, b)).collect())
        }

        ListOp::Map { second } => {
            let keys = ctx.read_list(list)?;
            let values = ctx.read_list(&ctx.substitute(second))?;
            let mut map = IndexMap::with_capacity(keys.len());
            for (key, value) in keys.into_iter().zip(values) {
                if map.contains_key(&key) {
                    return Err(RuntimeError::custom(format!("duplicate key '{}' in Map", key)));
                }
                map.insert(key, value);
            }
            CVarValue::Map(map)
        }

        ListOp::Add { item, index } => {
            let item = ctx.substitute(item);
            let requested = text::parse_int(&ctx.substitute(index))?;
            ctx.modify_list(list, |items| {
                let len = items.len();
                let at = if requested == -1 {
                    len
                } else {
                    usize::try_from(normalize_list_index(requested, len))
                        .ok()
                        .filter(|&at| at <= len)
                        .ok_or(RuntimeError::IndexOutOfRange { index: requested, len })?
                };
                items.insert(at, item);
                Ok(())
            })?;
            return Ok(None);
        }

        ListOp::Remove { index } => {
            let requested = text::parse_int(&ctx.substitute(index))?;
            ctx.modify_list(list, |items| {
                let len = items.len();
                let at = usize::try_from(normalize_list_index(requested, len))
                    .ok()
                    .filter(|&at| at < len)
                    .ok_or(RuntimeError::IndexOutOfRange { index: requested, len })?;
                items.remove(at);
                Ok(())
            })?;
            return Ok(None);
        }

        ListOp::RemoveValues { comparer, term } => {
            let term = ctx.substitute(term);
            let mut kept = Vec::new();
            for item in ctx.read_list(list)? {
                let left = ctx.substitute(&item);
                if !Condition::new(&left, *comparer, &term).verify()? {
                    kept.push(item);
                }
            }
            CVarValue::List(kept)
        }

        ListOp::RemoveDuplicates => {
            let unique: IndexSet<String> = ctx.read_list(list)?.into_iter().collect();
            CVarValue::List(unique.into_iter().collect())
        }

        ListOp::Random => {
            let items = ctx.read_list(list)?;
            if items.is_empty() {
                return Err(RuntimeError::custom(format!("cannot pick a random element of empty list {}", list)));
            }
            let pick = ctx.rng.gen_range(0..items.len());
            CVarValue::Single(items[pick].clone())
        }

        ListOp::Shuffle => {
            let mut copy = ctx.read_list(list)?;
            copy.shuffle(&mut ctx.rng);
            CVarValue::List(copy)
        }
    };
    Ok(Some(value))
}

fn resolve_path(path: &str, ctx: &ExecutionContext) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        ctx.settings.base_dir.join(path)
    }
}

/// Literal `\r\n` and `\n` sequences become real line breaks.
fn normalize_newlines(text: &str) -> String {
    text.replace("\\r\\n", "\r\n").replace("\\n", "\n")
}

fn run_file(path: &Path, op: &FileOp, ctx: &mut ExecutionContext) -> Result<Option<CVarValue>, RuntimeError> {
    let value = match op {
        FileOp::Read => Some(CVarValue::Single(fs::read_to_string(path)?)),
        FileOp::ReadLines => {
            let content = fs::read_to_string(path)?;
            Some(CVarValue::List(content.lines().map(str::to_string).collect()))
        }
        FileOp::Write { input } => {
            let content = normalize_newlines(&ctx.substitute(input));
            write_locked(path, &content, false, ctx)?;
            None
        }
        FileOp::WriteLines { input } => {
            let content = lines(ctx.substitute_all(input));
            write_locked(path, &content, false, ctx)?;
            None
        }
        FileOp::Append { input } => {
            let content = normalize_newlines(&ctx.substitute(input));
            write_locked(path, &content, true, ctx)?;
            None
        }
        FileOp::AppendLines { input } => {
            let content = lines(ctx.substitute_all(input));
            write_locked(path, &content, true, ctx)?;
            None
        }
    };
    Ok(value)
}

fn lines(inputs: Vec<String>) -> String {
    inputs
        .iter()
        .map(|line| normalize_newlines(line) + "\n")
        .collect()
}

/// Write or append `content` in one call while holding the path's lock.
fn write_locked(path: &Path, content: &str, append: bool, ctx: &ExecutionContext) -> Result<(), RuntimeError> {
    let lock = ctx.globals.file_lock(path);
    let written = {
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        write_file(path, content, append)
    };
    drop(lock);
    ctx.globals.release_file_lock(path);
    written
}

fn write_file(path: &Path, content: &str, append: bool) -> Result<(), RuntimeError> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)?;
    file.write_all(content.as_bytes())?;
    debug!(path = %path.display(), bytes = content.len(), append, "file written");
    Ok(())
}
