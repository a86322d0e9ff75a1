//! Rewriter: single pass over every method body, dispatching each
//! instruction to all registered rules.

use std::fmt;

use ilbridge_bytecode::{verify_module, Category, InstrId, Instruction, Module};

use super::config::RewriteConfig;
use super::error::RewriteError;
use super::rule::{RewriteContext, RewriteRule};

/// Counters for one rewrite pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Methods with a body that were traversed.
    pub methods: usize,
    /// Instructions delivered to the rules.
    pub instructions: usize,
    /// Live instructions before the pass minus live instructions after it.
    pub removed: isize,
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} methods, {} instructions, {} removed",
            self.methods, self.instructions, self.removed
        )
    }
}

/// Runs registered rules over a module in a single traversal.
///
/// Each method body is snapshotted before iteration. For every snapshotted
/// instruction, every rule is invoked in registration order, so all rules see
/// the original order even while earlier rules edit the body. Instructions
/// removed earlier in the pass are still delivered.
pub struct Rewriter<'r> {
    rules: Vec<&'r mut dyn RewriteRule>,
    config: RewriteConfig,
}

impl<'r> Rewriter<'r> {
    /// Create a rewriter with no rules.
    pub fn new(config: RewriteConfig) -> Self {
        Self {
            rules: Vec::new(),
            config,
        }
    }

    /// Register a rule; rules run in registration order.
    pub fn register(&mut self, rule: &'r mut dyn RewriteRule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Names of the registered rules, in order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Run every rule over every method body of `module`.
    pub fn run(&mut self, module: &mut Module) -> Result<PassReport, RewriteError> {
        let mut report = PassReport::default();

        for ti in 0..module.types.len() {
            for mi in 0..module.types[ti].methods.len() {
                let Some(mut body) = module.types[ti].methods[mi].body.take() else {
                    continue;
                };
                let before = body.len();

                let result = {
                    let shared: &Module = module;
                    let mut ctx = RewriteContext {
                        module: shared,
                        declaring_type: &shared.types[ti].ty,
                        method: &shared.types[ti].methods[mi],
                        body: &mut body,
                    };
                    self.rewrite_method(&mut ctx)
                };

                report.methods += 1;
                report.removed += before as isize - body.len() as isize;
                module.types[ti].methods[mi].body = Some(body);
                report.instructions += result?;
            }
        }

        if self.config.verify {
            verify_module(module)?;
        }

        tracing::info!(rules = ?self.rule_names(), "rewrite pass: {}", report);
        Ok(report)
    }

    fn rewrite_method(&mut self, ctx: &mut RewriteContext<'_>) -> Result<usize, RewriteError> {
        let snapshot = ctx.body.snapshot();
        for &id in &snapshot {
            // Removed instructions stay readable in the arena.
            let Some(instr) = ctx.body.get(id).cloned() else {
                continue;
            };
            self.dispatch(ctx, id, &instr)?;
        }
        Ok(snapshot.len())
    }

    fn dispatch(&mut self, ctx: &mut RewriteContext<'_>, at: InstrId, instr: &Instruction) -> Result<(), RewriteError> {
        let mismatch = |ctx: &RewriteContext<'_>| RewriteError::OperandMismatch {
            method: ctx.method_name(),
            at,
            opcode: instr.opcode.name(),
        };
        if !instr.operand_matches() {
            return Err(mismatch(ctx));
        }

        match instr.opcode.category() {
            category @ (Category::LoadArgument | Category::StoreArgument) => {
                let index = instr.index().ok_or_else(|| mismatch(ctx))?;
                let method = ctx.method;
                let slot = if ctx.body.has_this() {
                    // The receiver is never handed to rules.
                    match index.checked_sub(1) {
                        Some(slot) => slot,
                        None => return Ok(()),
                    }
                } else {
                    index
                };
                let param = method.params.get(slot as usize).ok_or_else(|| RewriteError::UnknownArgument {
                    method: ctx.method_name(),
                    at,
                    index,
                })?;
                for rule in self.rules.iter_mut() {
                    if category == Category::LoadArgument {
                        rule.load_argument(ctx, at, index, param)?;
                    } else {
                        rule.store_argument(ctx, at, index, param)?;
                    }
                }
            }
            category @ (Category::LoadLocal | Category::StoreLocal) => {
                let index = instr.index().ok_or_else(|| mismatch(ctx))?;
                let local = ctx.body.local(index).cloned().ok_or_else(|| RewriteError::UnknownLocal {
                    method: ctx.method_name(),
                    at,
                    index,
                })?;
                for rule in self.rules.iter_mut() {
                    if category == Category::LoadLocal {
                        rule.load_local(ctx, at, index, &local)?;
                    } else {
                        rule.store_local(ctx, at, index, &local)?;
                    }
                }
            }
            category @ (Category::LoadField | Category::StoreField) => {
                let field = instr.field().ok_or_else(|| mismatch(ctx))?;
                for rule in self.rules.iter_mut() {
                    if category == Category::LoadField {
                        rule.load_field(ctx, at, field)?;
                    } else {
                        rule.store_field(ctx, at, field)?;
                    }
                }
            }
            Category::Call => {
                let method = instr.method().ok_or_else(|| mismatch(ctx))?;
                for rule in self.rules.iter_mut() {
                    rule.call(ctx, at, method)?;
                }
            }
            Category::NewObject => {
                let ctor = instr.method().ok_or_else(|| mismatch(ctx))?;
                for rule in self.rules.iter_mut() {
                    rule.new_object(ctx, at, ctor)?;
                }
            }
            Category::Other => {
                for rule in self.rules.iter_mut() {
                    rule.other(ctx, at, instr)?;
                }
            }
        }
        Ok(())
    }
}
