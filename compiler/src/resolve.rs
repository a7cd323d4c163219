// resolve.rs — Placeholder resolution for command and args templates
//
// Turns a sequence of ArgumentNode templates plus bound argument values into
// a flat list of strings, evaluated left to right. An absent optional input
// drops the smallest enclosing top-level entry rather than leaving a partial
// token or empty string behind; sibling entries are unaffected.
//
// Preconditions: the spec is validated (no dangling references) and every
//                required input has a bound value.
// Postconditions: returned strings contain no placeholder residue; every
//                 outputPath allocation is recorded for the task's outputs.
// Failure modes: unbound required inputs (binder invariant violation),
//                conditions that do not evaluate to a boolean.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use crate::spec::{ArgumentNode, ComponentSpec, IfNode};
use crate::task::PathPlanner;

// ── Error type ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ResolveError {
    /// A required input reached resolution without a bound value. The
    /// binder rejects this earlier; seeing it here means a caller bypassed
    /// the factory.
    UnboundInput { name: String },
    /// An `if` condition did not evaluate to a boolean.
    InvalidCondition { detail: String },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::UnboundInput { name } => {
                write!(f, "required input '{}' has no bound value", name)
            }
            ResolveError::InvalidCondition { detail } => {
                write!(f, "invalid if condition: {}", detail)
            }
        }
    }
}

impl std::error::Error for ResolveError {}

// ── Context ──────────────────────────────────────────────────────────────

/// Bindings and allocators for resolving one task's templates. `command`
/// and `args` are resolved independently against the same context so that
/// outputPath allocations accumulate across both.
pub struct ResolveContext<'a> {
    spec: &'a ComponentSpec,
    /// Display name → bound string value. Absent for unsupplied optionals.
    bindings: &'a BTreeMap<String, String>,
    planner: &'a PathPlanner,
    /// Output name → allocated path, recorded as outputPath nodes resolve.
    pub output_paths: BTreeMap<String, String>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(
        spec: &'a ComponentSpec,
        bindings: &'a BTreeMap<String, String>,
        planner: &'a PathPlanner,
    ) -> Self {
        ResolveContext {
            spec,
            bindings,
            planner,
            output_paths: BTreeMap::new(),
        }
    }
}

/// Outcome of evaluating one node.
enum Eval {
    /// Strings contributed at this position (zero or more; `if` splices).
    Strings(Vec<String>),
    /// An absent optional input was referenced; omission propagates to the
    /// nearest enclosing top-level entry.
    Omitted,
}

// ── Resolution ───────────────────────────────────────────────────────────

/// Resolve a top-level `command` or `args` sequence to a flat string list.
pub fn resolve_arguments(
    nodes: &[ArgumentNode],
    ctx: &mut ResolveContext<'_>,
) -> Result<Vec<String>, ResolveError> {
    let mut resolved = Vec::new();
    for node in nodes {
        match eval_node(node, ctx)? {
            Eval::Strings(strings) => resolved.extend(strings),
            Eval::Omitted => {}
        }
    }
    Ok(resolved)
}

fn eval_node(node: &ArgumentNode, ctx: &mut ResolveContext<'_>) -> Result<Eval, ResolveError> {
    match node {
        ArgumentNode::Literal(text) => Ok(Eval::Strings(vec![text.clone()])),

        ArgumentNode::InputValue(name) => match ctx.bindings.get(name) {
            Some(value) => Ok(Eval::Strings(vec![value.clone()])),
            None => absent_input(name, ctx),
        },

        ArgumentNode::InputPath(name) => {
            if ctx.bindings.contains_key(name) {
                Ok(Eval::Strings(vec![ctx.planner.input_path(name)]))
            } else {
                absent_input(name, ctx)
            }
        }

        ArgumentNode::OutputPath(name) => {
            let path = ctx.planner.output_path(name);
            ctx.output_paths.insert(name.clone(), path.clone());
            Ok(Eval::Strings(vec![path]))
        }

        // Meaningful only inside a cond; resolves to its boolean's string
        // form when it appears in argument position.
        ArgumentNode::IsPresent(name) => {
            Ok(Eval::Strings(vec![ctx.bindings.contains_key(name).to_string()]))
        }

        ArgumentNode::Concat(children) => {
            let mut joined = String::new();
            for child in children {
                match eval_node(child, ctx)? {
                    Eval::Strings(strings) => {
                        for s in strings {
                            joined.push_str(&s);
                        }
                    }
                    Eval::Omitted => return Ok(Eval::Omitted),
                }
            }
            Ok(Eval::Strings(vec![joined]))
        }

        ArgumentNode::If(body) => eval_if(body, ctx),
    }
}

/// Omission only applies to declared-optional inputs; a missing required
/// binding is a caller error.
fn absent_input(name: &str, ctx: &ResolveContext<'_>) -> Result<Eval, ResolveError> {
    let optional = ctx.spec.input(name).is_some_and(|input| input.optional);
    if optional {
        Ok(Eval::Omitted)
    } else {
        Err(ResolveError::UnboundInput {
            name: name.to_string(),
        })
    }
}

fn eval_if(body: &IfNode, ctx: &mut ResolveContext<'_>) -> Result<Eval, ResolveError> {
    let branch = if eval_condition(&body.cond, ctx)? {
        Some(&body.then)
    } else {
        body.otherwise.as_ref()
    };

    let Some(branch) = branch else {
        // False with no else: contribute nothing at this position.
        return Ok(Eval::Strings(Vec::new()));
    };

    let mut spliced = Vec::new();
    for node in branch {
        match eval_node(node, ctx)? {
            Eval::Strings(strings) => spliced.extend(strings),
            Eval::Omitted => return Ok(Eval::Omitted),
        }
    }
    Ok(Eval::Strings(spliced))
}

/// Evaluate a condition node to a boolean.
///
/// Accepted: boolean/string literals `"true"`/`"false"` (lowercase only),
/// `isPresent`, and `inputValue` of a bound input whose value is `"true"`
/// or `"false"`. An unsupplied optional input evaluates to false.
fn eval_condition(cond: &ArgumentNode, ctx: &ResolveContext<'_>) -> Result<bool, ResolveError> {
    match cond {
        ArgumentNode::Literal(text) => parse_bool(text),
        ArgumentNode::IsPresent(name) => Ok(ctx.bindings.contains_key(name)),
        ArgumentNode::InputValue(name) => match ctx.bindings.get(name) {
            Some(value) => parse_bool(value),
            None => Ok(false),
        },
        other => Err(ResolveError::InvalidCondition {
            detail: format!("unsupported condition node: {:?}", other),
        }),
    }
}

fn parse_bool(text: &str) -> Result<bool, ResolveError> {
    match text {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ResolveError::InvalidCondition {
            detail: format!("expected 'true' or 'false', found '{}'", other),
        }),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
