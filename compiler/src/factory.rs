// factory.rs — Task factory compilation and invocation
//
// Compiles a validated ComponentSpec into a callable factory. Compilation
// synthesizes the call signature (required inputs first, then optional
// inputs, each group in declaration order) and a sanitized call-site
// identifier per input. Invocation binds positional and named arguments
// against that signature, applies defaults, type-checks output references,
// resolves the container templates, and produces an immutable Task.
//
// Preconditions: none beyond a parseable spec; compile re-validates.
// Postconditions: every produced Task has a reference for each declared
//                 output; no partial Task is returned on failure.
// Failure modes: identifier collisions at compile time; unknown, duplicate,
//                or missing arguments and type mismatches at invoke time.
// Side effects: an invocation ordinal advances per factory (atomic; invoke
//               takes &self and is safe to call from parallel authoring
//               code).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::resolve::{resolve_arguments, ResolveContext, ResolveError};
use crate::spec::{ComponentSpec, SpecError};
use crate::task::{OutputRef, PathPlanner, Task};
use crate::typecheck::{InconsistentTypeError, TypeCheck};
use crate::typespec::TypeSpec;

// ── Error types ──────────────────────────────────────────────────────────

/// Errors raised while compiling a spec into a factory.
#[derive(Debug)]
pub enum CompileError {
    /// The underlying spec failed validation.
    Spec(SpecError),
    /// Two distinct display names sanitize to the same call-site
    /// identifier.
    NameCollision {
        first: String,
        second: String,
        ident: String,
    },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Spec(err) => write!(f, "{}", err),
            CompileError::NameCollision {
                first,
                second,
                ident,
            } => write!(
                f,
                "inputs '{}' and '{}' both sanitize to identifier '{}'",
                first, second, ident
            ),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Spec(err) => Some(err),
            CompileError::NameCollision { .. } => None,
        }
    }
}

impl From<SpecError> for CompileError {
    fn from(err: SpecError) -> Self {
        CompileError::Spec(err)
    }
}

/// Errors raised while binding arguments and producing a task.
#[derive(Debug)]
pub enum InvokeError {
    /// A required input remained unbound after defaulting.
    MissingRequiredArgument { name: String },
    /// A named argument matched no parameter identifier.
    UnknownArgument { name: String },
    /// A parameter was bound both positionally and by name (or twice by
    /// name).
    DuplicateArgument { name: String },
    /// More positional arguments than parameters.
    TooManyPositional { expected: usize, given: usize },
    /// A bound output reference failed the compatibility check.
    IncompatibleType(InconsistentTypeError),
    /// Template resolution failed.
    Resolve(ResolveError),
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvokeError::MissingRequiredArgument { name } => {
                write!(f, "missing required argument '{}'", name)
            }
            InvokeError::UnknownArgument { name } => {
                write!(f, "unknown argument '{}'", name)
            }
            InvokeError::DuplicateArgument { name } => {
                write!(f, "argument '{}' bound more than once", name)
            }
            InvokeError::TooManyPositional { expected, given } => {
                write!(
                    f,
                    "too many positional arguments: expected at most {}, got {}",
                    expected, given
                )
            }
            InvokeError::IncompatibleType(err) => write!(f, "{}", err),
            InvokeError::Resolve(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for InvokeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InvokeError::IncompatibleType(err) => Some(err),
            InvokeError::Resolve(err) => Some(err),
            _ => None,
        }
    }
}

impl From<InconsistentTypeError> for InvokeError {
    fn from(err: InconsistentTypeError) -> Self {
        InvokeError::IncompatibleType(err)
    }
}

impl From<ResolveError> for InvokeError {
    fn from(err: ResolveError) -> Self {
        InvokeError::Resolve(err)
    }
}

// ── Parameters and argument values ───────────────────────────────────────

/// One entry of the synthesized call signature.
#[derive(Debug, Clone)]
pub struct ParamDescriptor {
    /// Display name as declared in the spec.
    pub display_name: String,
    /// Sanitized call-site identifier (named-argument key).
    pub ident: String,
    /// Required iff not optional and no default is given.
    pub required: bool,
    pub default: Option<String>,
    pub ty: TypeSpec,
}

/// A concrete argument value: a scalar rendered to its string form, or an
/// output reference produced by a prior task.
#[derive(Debug, Clone)]
pub enum ArgumentValue {
    Scalar(String),
    Reference(OutputRef),
}

impl From<&str> for ArgumentValue {
    fn from(value: &str) -> Self {
        ArgumentValue::Scalar(value.to_string())
    }
}

impl From<String> for ArgumentValue {
    fn from(value: String) -> Self {
        ArgumentValue::Scalar(value)
    }
}

impl From<i64> for ArgumentValue {
    fn from(value: i64) -> Self {
        ArgumentValue::Scalar(value.to_string())
    }
}

impl From<f64> for ArgumentValue {
    fn from(value: f64) -> Self {
        ArgumentValue::Scalar(value.to_string())
    }
}

/// Booleans render lowercase, matching condition parsing.
impl From<bool> for ArgumentValue {
    fn from(value: bool) -> Self {
        ArgumentValue::Scalar(value.to_string())
    }
}

impl From<OutputRef> for ArgumentValue {
    fn from(value: OutputRef) -> Self {
        ArgumentValue::Reference(value)
    }
}

impl From<&OutputRef> for ArgumentValue {
    fn from(value: &OutputRef) -> Self {
        ArgumentValue::Reference(value.clone())
    }
}

/// Arguments for one factory invocation: positional values bound in
/// signature order, then named values bound by sanitized identifier.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    positional: Vec<ArgumentValue>,
    named: Vec<(String, ArgumentValue)>,
}

impl Arguments {
    pub fn new() -> Self {
        Arguments::default()
    }

    /// Bind the next unbound parameter in signature order.
    pub fn positional(mut self, value: impl Into<ArgumentValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Bind a parameter by its sanitized identifier.
    pub fn named(mut self, ident: &str, value: impl Into<ArgumentValue>) -> Self {
        self.named.push((ident.to_string(), value.into()));
        self
    }
}

// ── Task factory ─────────────────────────────────────────────────────────

/// Compiled, callable artifact derived from one ComponentSpec.
#[derive(Debug)]
pub struct TaskFactory {
    spec: ComponentSpec,
    params: Vec<ParamDescriptor>,
    human_name: String,
    doc: String,
    digest: String,
    invocations: AtomicU32,
}

impl TaskFactory {
    /// Validate the spec and synthesize the call signature.
    pub fn compile(spec: ComponentSpec) -> Result<Self, CompileError> {
        spec.validate()?;

        // Required inputs first, then optional, each in declaration order.
        let mut params = Vec::with_capacity(spec.inputs.len());
        for input in spec.inputs.iter().filter(|i| i.is_required()) {
            params.push(descriptor(input, true));
        }
        for input in spec.inputs.iter().filter(|i| !i.is_required()) {
            params.push(descriptor(input, false));
        }

        let mut idents: BTreeMap<&str, &str> = BTreeMap::new();
        for param in &params {
            if let Some(first) = idents.insert(&param.ident, &param.display_name) {
                return Err(CompileError::NameCollision {
                    first: first.to_string(),
                    second: param.display_name.clone(),
                    ident: param.ident.clone(),
                });
            }
        }

        let human_name = spec
            .name
            .clone()
            .unwrap_or_else(|| "component".to_string());
        let doc = match (&spec.name, &spec.description) {
            (Some(name), Some(description)) => format!("{}\n{}", name, description),
            (Some(name), None) => name.clone(),
            (None, Some(description)) => description.clone(),
            (None, None) => String::new(),
        };
        let digest = spec.digest();

        log::debug!(
            "compiled factory '{}' ({} params, digest {})",
            human_name,
            params.len(),
            &digest[..12]
        );

        Ok(TaskFactory {
            spec,
            params,
            human_name,
            doc,
            digest,
            invocations: AtomicU32::new(0),
        })
    }

    /// The synthesized parameter descriptors, in call order.
    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    /// Parameter identifiers in call order.
    pub fn signature(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.ident.as_str()).collect()
    }

    /// Documentation string composed from the spec's name and description.
    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn human_name(&self) -> &str {
        &self.human_name
    }

    pub fn spec(&self) -> &ComponentSpec {
        &self.spec
    }

    /// Produce a task with type checking enabled.
    pub fn invoke(&self, args: Arguments) -> Result<Task, InvokeError> {
        self.invoke_with(args, &TypeCheck::default())
    }

    /// Produce a task under an explicit type-checking context.
    pub fn invoke_with(&self, args: Arguments, check: &TypeCheck) -> Result<Task, InvokeError> {
        let bound = self.bind(args)?;

        // Type-check references and render every binding to its string
        // form. References resolve to the producing task's output path.
        let mut bindings: BTreeMap<String, String> = BTreeMap::new();
        for (param, value) in bound {
            let rendered = match value {
                ArgumentValue::Scalar(scalar) => scalar,
                ArgumentValue::Reference(reference) => {
                    check.check(&param.display_name, &reference, &param.ty)?;
                    reference.path
                }
            };
            bindings.insert(param.display_name.clone(), rendered);
        }

        let ordinal = self.invocations.fetch_add(1, Ordering::Relaxed);
        let task_ref = format!("{}-{}", &self.digest[..12], ordinal);
        let planner = PathPlanner::new(task_ref.clone());

        let container = self.spec.container();
        let mut ctx = ResolveContext::new(&self.spec, &bindings, &planner);
        let command = resolve_arguments(&container.command, &mut ctx)?;
        let arguments = resolve_arguments(&container.args, &mut ctx)?;

        // Every declared output gets a reference: the path comes from an
        // outputPath resolution, then a legacy fileOutputs entry, then the
        // planner's default location.
        let mut outputs = BTreeMap::new();
        for output in &self.spec.outputs {
            let path = ctx
                .output_paths
                .get(&output.name)
                .cloned()
                .or_else(|| container.file_outputs.get(&output.name).cloned())
                .unwrap_or_else(|| planner.output_path(&output.name));
            outputs.insert(
                output.name.clone(),
                OutputRef::new(task_ref.clone(), output.name.clone(), output.ty.clone(), path),
            );
        }

        log::debug!("invoked '{}' as task {}", self.human_name, task_ref);

        Ok(Task {
            human_name: self.human_name.clone(),
            task_ref,
            image: container.image.clone(),
            command,
            arguments,
            env: container.env.clone(),
            outputs,
        })
    }

    /// Bind positional then named arguments against the signature and
    /// apply defaults. Returns (descriptor, value) pairs for bound
    /// parameters only; optional parameters may stay unbound.
    fn bind(&self, args: Arguments) -> Result<Vec<(&ParamDescriptor, ArgumentValue)>, InvokeError> {
        if args.positional.len() > self.params.len() {
            return Err(InvokeError::TooManyPositional {
                expected: self.params.len(),
                given: args.positional.len(),
            });
        }

        let mut slots: Vec<Option<ArgumentValue>> = vec![None; self.params.len()];
        for (index, value) in args.positional.into_iter().enumerate() {
            slots[index] = Some(value);
        }

        for (ident, value) in args.named {
            let index = self
                .params
                .iter()
                .position(|p| p.ident == ident)
                .ok_or(InvokeError::UnknownArgument { name: ident.clone() })?;
            if slots[index].is_some() {
                return Err(InvokeError::DuplicateArgument { name: ident });
            }
            slots[index] = Some(value);
        }

        let mut bound = Vec::new();
        for (param, slot) in self.params.iter().zip(slots) {
            match slot {
                Some(value) => bound.push((param, value)),
                None => match &param.default {
                    Some(default) => {
                        bound.push((param, ArgumentValue::Scalar(default.clone())))
                    }
                    None if param.required => {
                        return Err(InvokeError::MissingRequiredArgument {
                            name: param.display_name.clone(),
                        })
                    }
                    None => {}
                },
            }
        }
        Ok(bound)
    }
}

fn descriptor(input: &crate::spec::InputSpec, required: bool) -> ParamDescriptor {
    ParamDescriptor {
        display_name: input.name.clone(),
        ident: sanitize_identifier(&input.name),
        required,
        default: input.default.clone(),
        ty: input.ty.clone(),
    }
}

/// Fold a display name to a call-site identifier: lowercase ASCII
/// alphanumerics, everything else becomes an underscore, and a leading
/// digit (or empty result) gains an underscore prefix.
pub fn sanitize_identifier(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

// ── Tests ────────────────────────────────────────────────────────────────
