// task.rs — Resolved task instances and output references
//
// A Task is one fully resolved container invocation: image, command,
// arguments, environment, and one output reference per declared output.
// Tasks are immutable after construction; scheduling and execution belong
// to the external pipeline engine.

use std::collections::BTreeMap;
use std::fmt;

use crate::typespec::TypeSpec;

// ── Path planning ────────────────────────────────────────────────────────

/// Plans input staging and output paths for one task.
///
/// Pure string construction: paths are a deterministic function of the task
/// reference and the input/output name. No filesystem access happens here;
/// the execution engine materializes data at these locations.
#[derive(Debug, Clone)]
pub struct PathPlanner {
    task_ref: String,
}

impl PathPlanner {
    pub fn new(task_ref: impl Into<String>) -> Self {
        PathPlanner {
            task_ref: task_ref.into(),
        }
    }

    /// Path at which the named input's data will be staged.
    pub fn input_path(&self, input: &str) -> String {
        format!("/tmp/inputs/{}/{}/data", self.task_ref, path_segment(input))
    }

    /// Path the task is expected to write the named output to.
    pub fn output_path(&self, output: &str) -> String {
        format!("/tmp/outputs/{}/{}/data", self.task_ref, path_segment(output))
    }
}

/// Display names may contain spaces and punctuation; fold to a safe path
/// segment. Distinctness is not required here since the task reference
/// already namespaces the path by task.
fn path_segment(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

// ── Output references ────────────────────────────────────────────────────

/// Handle to a single named output of a produced task.
///
/// Passing an OutputRef as an argument to another factory wires a pipeline
/// edge; the consuming factory checks type compatibility at bind time
/// unless this reference was exempted via [`OutputRef::ignore_type`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRef {
    /// Identity of the producing task.
    pub task_ref: String,
    /// Declared output name.
    pub name: String,
    /// Declared output type, consulted by the compatibility checker.
    pub ty: TypeSpec,
    /// Planned path the producing task writes to.
    pub path: String,
    bypass_type_check: bool,
}

impl OutputRef {
    pub(crate) fn new(
        task_ref: impl Into<String>,
        name: impl Into<String>,
        ty: TypeSpec,
        path: impl Into<String>,
    ) -> Self {
        OutputRef {
            task_ref: task_ref.into(),
            name: name.into(),
            ty,
            path: path.into(),
            bypass_type_check: false,
        }
    }

    /// An equivalent reference exempted from type checking at its use site.
    pub fn ignore_type(&self) -> OutputRef {
        OutputRef {
            bypass_type_check: true,
            ..self.clone()
        }
    }

    /// Whether this specific reference opted out of type checking.
    pub fn type_check_bypassed(&self) -> bool {
        self.bypass_type_check
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.task_ref, self.name)
    }
}

// ── Task ─────────────────────────────────────────────────────────────────

/// One resolved container invocation. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Task {
    /// Human-readable name taken from the component's declared name.
    pub human_name: String,
    /// Stable identity: component digest prefix plus invocation ordinal.
    pub task_ref: String,
    pub image: String,
    /// Resolved `command` template.
    pub command: Vec<String>,
    /// Resolved `args` template.
    pub arguments: Vec<String>,
    /// Environment entries, verbatim from the spec.
    pub env: BTreeMap<String, String>,
    /// One reference per declared output, keyed by display name.
    pub outputs: BTreeMap<String, OutputRef>,
}

impl Task {
    /// Look up an output reference by display name.
    pub fn output(&self, name: &str) -> Option<&OutputRef> {
        self.outputs.get(name)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
