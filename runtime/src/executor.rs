use blockscript::Config;
use blockscript::block::{Block, BlockKind, FunctionBlock, UtilityBlock};
use tracing::{debug, info_span};

use crate::context::ExecutionContext;
use crate::error::{DiagnosticError, RuntimeError};
use crate::function::execute_function;
use crate::utility::execute_utility;

/// Something that runs against a task's context.
pub trait Execute {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), RuntimeError>;
}

impl Execute for FunctionBlock {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), RuntimeError> {
        execute_function(self, ctx)
    }
}

impl Execute for UtilityBlock {
    /// Never fails: errors end up in the task log.
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), RuntimeError> {
        execute_utility(self, ctx);
        Ok(())
    }
}

impl Execute for Block {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), RuntimeError> {
        match &self.kind {
            BlockKind::Function(body) => body.execute(ctx),
            BlockKind::Utility(body) => body.execute(ctx),
        }
    }
}

/// Run every enabled block of `config` in order.
///
/// Stops at the first block that fails and reports which one it was.
pub fn execute_config(config: &Config, ctx: &mut ExecutionContext) -> Result<(), DiagnosticError> {
    for (index, statement) in config.statements.iter().enumerate() {
        let block = &statement.block;
        if block.disabled {
            debug!(index, label = %block.label, "skipping disabled block");
            continue;
        }

        let _span = info_span!("block", index, label = %block.label).entered();
        block.execute(ctx).map_err(|error| {
            DiagnosticError::at_block(error, index, &block.label, statement.span.clone(), config.source_id)
        })?;
    }
    Ok(())
}
