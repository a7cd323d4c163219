// spec.rs — Component specification model
//
// In-memory representation of a component document: metadata, inputs,
// outputs, and a container implementation template. Parsed once from YAML
// text, validated, and immutable afterwards; a task factory wraps exactly
// one ComponentSpec.
//
// Preconditions: document text is UTF-8 YAML (JSON parses through the same
//                path).
// Postconditions: a returned ComponentSpec has unique input names, unique
//                 output names, and no dangling placeholder references.
// Failure modes: structurally invalid documents, unsupported implementation
//                kinds, duplicate names, unresolved references.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use sha2::{Digest, Sha256};

use crate::typespec::TypeSpec;

// ── Error type ───────────────────────────────────────────────────────────

/// Which name namespace a violation occurred in. Input and output names are
/// independent namespaces; one name may appear in both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Input,
    Output,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Input => write!(f, "input"),
            Namespace::Output => write!(f, "output"),
        }
    }
}

/// Errors raised while parsing or validating a component document.
#[derive(Debug)]
pub enum SpecError {
    /// The document is structurally invalid, lacks an implementation
    /// section, or names an unsupported implementation kind.
    MalformedSpec { message: String },
    /// Two inputs or two outputs share a display name (exact string
    /// comparison within one namespace).
    DuplicateName { namespace: Namespace, name: String },
    /// A placeholder or file output refers to a name not declared in the
    /// corresponding namespace.
    UnresolvedReference { namespace: Namespace, name: String },
}

impl fmt::Display for SpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecError::MalformedSpec { message } => {
                write!(f, "malformed component spec: {}", message)
            }
            SpecError::DuplicateName { namespace, name } => {
                write!(f, "duplicate {} name '{}'", namespace, name)
            }
            SpecError::UnresolvedReference { namespace, name } => {
                write!(f, "placeholder references undeclared {} '{}'", namespace, name)
            }
        }
    }
}

impl std::error::Error for SpecError {}

// ── Argument nodes ───────────────────────────────────────────────────────

/// One element of a `command` or `args` template.
///
/// Document forms: a literal scalar, or a single-key mapping naming the
/// placeholder kind (`inputValue`, `inputPath`, `outputPath`, `concat`,
/// `if`, `isPresent`). Nodes nest arbitrarily.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentNode {
    /// A literal string (scalars coerce to their string form).
    Literal(String),
    /// Substitute the bound argument's string value.
    InputValue(String),
    /// Substitute the staging path where the input's data will be available.
    InputPath(String),
    /// Substitute the planned path where the task writes the named output.
    OutputPath(String),
    /// Evaluate each child to one string and join with no separator.
    Concat(Vec<ArgumentNode>),
    /// Conditionally splice the `then` or `else` branch.
    If(IfNode),
    /// Condition-only: whether an optional input was supplied.
    IsPresent(String),
}

/// Body of an `if` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    pub cond: Box<ArgumentNode>,
    pub then: Vec<ArgumentNode>,
    pub otherwise: Option<Vec<ArgumentNode>>,
}

/// Scalar-to-string coercion shared by literals, defaults, and env values.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl ArgumentNode {
    fn from_value(value: &Value) -> Result<Self, String> {
        if let Some(literal) = scalar_string(value) {
            return Ok(ArgumentNode::Literal(literal));
        }
        let map = match value {
            Value::Mapping(map) if map.len() == 1 => map,
            _ => {
                return Err(
                    "argument must be a scalar or a single-key placeholder mapping".to_string(),
                )
            }
        };
        let (key, body) = map.iter().next().expect("internal: len checked above");
        let kind = key
            .as_str()
            .ok_or_else(|| "placeholder kind must be a string".to_string())?;
        match kind {
            "inputValue" => Ok(ArgumentNode::InputValue(name_string(body, kind)?)),
            "inputPath" => Ok(ArgumentNode::InputPath(name_string(body, kind)?)),
            "outputPath" => Ok(ArgumentNode::OutputPath(name_string(body, kind)?)),
            "isPresent" => Ok(ArgumentNode::IsPresent(name_string(body, kind)?)),
            "concat" => match body {
                Value::Sequence(children) => Ok(ArgumentNode::Concat(
                    children
                        .iter()
                        .map(ArgumentNode::from_value)
                        .collect::<Result<_, _>>()?,
                )),
                _ => Err("concat requires a sequence of arguments".to_string()),
            },
            "if" => IfNode::from_value(body).map(ArgumentNode::If),
            other => Err(format!("unknown placeholder kind '{}'", other)),
        }
    }
}

/// Extract the referenced name of a simple placeholder.
fn name_string(value: &Value, kind: &str) -> Result<String, String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| format!("{} requires an input or output name", kind))
}

impl IfNode {
    fn from_value(value: &Value) -> Result<Self, String> {
        let map = match value {
            Value::Mapping(map) => map,
            _ => return Err("if requires a mapping with cond/then/else".to_string()),
        };
        let mut cond = None;
        let mut then = None;
        let mut otherwise = None;
        for (key, body) in map {
            match key.as_str() {
                Some("cond") => cond = Some(ArgumentNode::from_value(body)?),
                Some("then") => then = Some(node_list(body)?),
                Some("else") => otherwise = Some(node_list(body)?),
                _ => return Err("if accepts only cond, then, and else".to_string()),
            }
        }
        Ok(IfNode {
            cond: Box::new(cond.ok_or("if requires a cond")?),
            then: then.ok_or("if requires a then branch")?,
            otherwise,
        })
    }
}

/// A branch may be a single node or a sequence of nodes.
fn node_list(value: &Value) -> Result<Vec<ArgumentNode>, String> {
    match value {
        Value::Sequence(items) => items.iter().map(ArgumentNode::from_value).collect(),
        single => Ok(vec![ArgumentNode::from_value(single)?]),
    }
}

impl<'de> Deserialize<'de> for ArgumentNode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        ArgumentNode::from_value(&value).map_err(de::Error::custom)
    }
}

/// Serialized back into the document form; used by canonical JSON digests.
impl Serialize for ArgumentNode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        fn tagged<S: Serializer, T: Serialize + ?Sized>(
            serializer: S,
            tag: &str,
            body: &T,
        ) -> Result<S::Ok, S::Error> {
            let mut map = serializer.serialize_map(Some(1))?;
            map.serialize_entry(tag, body)?;
            map.end()
        }

        match self {
            ArgumentNode::Literal(s) => serializer.serialize_str(s),
            ArgumentNode::InputValue(name) => tagged(serializer, "inputValue", name),
            ArgumentNode::InputPath(name) => tagged(serializer, "inputPath", name),
            ArgumentNode::OutputPath(name) => tagged(serializer, "outputPath", name),
            ArgumentNode::IsPresent(name) => tagged(serializer, "isPresent", name),
            ArgumentNode::Concat(children) => tagged(serializer, "concat", children),
            ArgumentNode::If(body) => tagged(serializer, "if", body),
        }
    }
}

impl Serialize for IfNode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let entries = 2 + usize::from(self.otherwise.is_some());
        let mut map = serializer.serialize_map(Some(entries))?;
        map.serialize_entry("cond", &*self.cond)?;
        map.serialize_entry("then", &self.then)?;
        if let Some(otherwise) = &self.otherwise {
            map.serialize_entry("else", otherwise)?;
        }
        map.end()
    }
}

// ── Inputs and outputs ───────────────────────────────────────────────────

/// One declared input. Display names are arbitrary strings (spaces and
/// punctuation allowed) and are compared exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: TypeSpec,
    #[serde(default, deserialize_with = "opt_scalar_string")]
    pub default: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

impl InputSpec {
    /// Required iff not optional and no default is given.
    pub fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }
}

/// One declared output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: TypeSpec,
}

fn opt_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar_string(&value)
            .map(Some)
            .ok_or_else(|| de::Error::custom("expected a scalar value")),
    }
}

fn scalar_string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            scalar_string(&value)
                .map(|s| (key, s))
                .ok_or_else(|| de::Error::custom("expected a scalar value"))
        })
        .collect()
}

// ── Implementation ───────────────────────────────────────────────────────

/// Implementation section. Container is the only supported kind; any other
/// key is rejected during deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Implementation {
    #[serde(rename = "container")]
    Container(ContainerSpec),
}

/// Containerized implementation template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    #[serde(default)]
    pub command: Vec<ArgumentNode>,
    #[serde(default)]
    pub args: Vec<ArgumentNode>,
    /// Plain name→value mapping; env values carry no placeholder support.
    #[serde(default, deserialize_with = "scalar_string_map")]
    pub env: BTreeMap<String, String>,
    /// Legacy fixed output paths: output name → path the task writes to.
    #[serde(default, rename = "fileOutputs")]
    pub file_outputs: BTreeMap<String, String>,
}

// ── Component spec ───────────────────────────────────────────────────────

/// A complete, validated component specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
    // The document form is a plain single-key mapping, not a YAML tag.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub implementation: Implementation,
}

impl ComponentSpec {
    /// Parse and validate a component document.
    pub fn from_text(text: &str) -> Result<Self, SpecError> {
        let spec: ComponentSpec =
            serde_yaml::from_str(text).map_err(|e| SpecError::MalformedSpec {
                message: e.to_string(),
            })?;
        spec.validate()?;
        log::debug!(
            "parsed component '{}': {} inputs, {} outputs",
            spec.name.as_deref().unwrap_or("(unnamed)"),
            spec.inputs.len(),
            spec.outputs.len()
        );
        Ok(spec)
    }

    /// The container template of the (sole) implementation kind.
    pub fn container(&self) -> &ContainerSpec {
        match &self.implementation {
            Implementation::Container(container) => container,
        }
    }

    /// Look up an input by display name.
    pub fn input(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|input| input.name == name)
    }

    /// Look up an output by display name.
    pub fn output(&self, name: &str) -> Option<&OutputSpec> {
        self.outputs.iter().find(|output| output.name == name)
    }

    /// Check name uniqueness per namespace and placeholder references.
    pub fn validate(&self) -> Result<(), SpecError> {
        check_unique(self.inputs.iter().map(|i| i.name.as_str()), Namespace::Input)?;
        check_unique(
            self.outputs.iter().map(|o| o.name.as_str()),
            Namespace::Output,
        )?;

        let container = self.container();
        for node in container.command.iter().chain(&container.args) {
            self.check_references(node)?;
        }
        for output_name in container.file_outputs.keys() {
            if self.output(output_name).is_none() {
                return Err(SpecError::UnresolvedReference {
                    namespace: Namespace::Output,
                    name: output_name.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_references(&self, node: &ArgumentNode) -> Result<(), SpecError> {
        match node {
            ArgumentNode::Literal(_) => Ok(()),
            ArgumentNode::InputValue(name)
            | ArgumentNode::InputPath(name)
            | ArgumentNode::IsPresent(name) => {
                if self.input(name).is_none() {
                    return Err(SpecError::UnresolvedReference {
                        namespace: Namespace::Input,
                        name: name.clone(),
                    });
                }
                Ok(())
            }
            ArgumentNode::OutputPath(name) => {
                if self.output(name).is_none() {
                    return Err(SpecError::UnresolvedReference {
                        namespace: Namespace::Output,
                        name: name.clone(),
                    });
                }
                Ok(())
            }
            ArgumentNode::Concat(children) => {
                children.iter().try_for_each(|child| self.check_references(child))
            }
            ArgumentNode::If(body) => {
                self.check_references(&body.cond)?;
                body.then
                    .iter()
                    .try_for_each(|child| self.check_references(child))?;
                if let Some(otherwise) = &body.otherwise {
                    otherwise
                        .iter()
                        .try_for_each(|child| self.check_references(child))?;
                }
                Ok(())
            }
        }
    }

    /// Canonical compact JSON of the spec, independent of document
    /// formatting. Input to `digest()`.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).expect("internal: component spec serializes to JSON")
    }

    /// SHA-256 of the canonical JSON, hex-encoded (64 characters). Stable
    /// fingerprint used to derive task identities.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_json().as_bytes());
        let result = hasher.finalize();
        let mut hex = String::with_capacity(64);
        for byte in result {
            use std::fmt::Write;
            let _ = write!(hex, "{:02x}", byte);
        }
        hex
    }
}

fn check_unique<'a>(
    names: impl Iterator<Item = &'a str>,
    namespace: Namespace,
) -> Result<(), SpecError> {
    let mut seen = std::collections::BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(SpecError::DuplicateName {
                namespace,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_component_parses() {
        let spec = ComponentSpec::from_text("implementation:\n  container:\n    image: busybox\n")
            .unwrap();
        assert_eq!(spec.container().image, "busybox");
        assert!(spec.inputs.is_empty());
        assert!(spec.outputs.is_empty());
    }

    #[test]
    fn implementation_parses_from_plain_mapping() {
        // The document form is `implementation: {container: {...}}` with no
        // YAML tag; the canonical JSON keeps the same single-key shape.
        let spec = ComponentSpec::from_text(
            "\
implementation:
  container:
    image: busybox
    command: [echo]
",
        )
        .unwrap();
        let Implementation::Container(container) = &spec.implementation;
        assert_eq!(container.image, "busybox");
        assert!(spec
            .canonical_json()
            .contains("\"implementation\":{\"container\":{"));
    }

    #[test]
    fn missing_implementation_is_malformed() {
        let err = ComponentSpec::from_text("inputs:\n- {name: Data}\n").unwrap_err();
        assert!(matches!(err, SpecError::MalformedSpec { .. }), "got: {}", err);
    }

    #[test]
    fn unsupported_implementation_kind_is_malformed() {
        let err = ComponentSpec::from_text("implementation:\n  graph:\n    nodes: []\n")
            .unwrap_err();
        assert!(matches!(err, SpecError::MalformedSpec { .. }), "got: {}", err);
    }

    #[test]
    fn duplicate_input_names_rejected() {
        let text = "\
inputs:
- {name: Data1}
- {name: Data1}
implementation:
  container:
    image: busybox
";
        let err = ComponentSpec::from_text(text).unwrap_err();
        match err {
            SpecError::DuplicateName { namespace, name } => {
                assert_eq!(namespace, Namespace::Input);
                assert_eq!(name, "Data1");
            }
            other => panic!("expected DuplicateName, got: {}", other),
        }
    }

    #[test]
    fn duplicate_output_names_rejected() {
        let text = "\
outputs:
- {name: Data1}
- {name: Data1}
implementation:
  container:
    image: busybox
";
        let err = ComponentSpec::from_text(text).unwrap_err();
        assert!(matches!(
            err,
            SpecError::DuplicateName {
                namespace: Namespace::Output,
                ..
            }
        ));
    }

    #[test]
    fn input_and_output_may_share_a_name() {
        let text = "\
inputs:
- {name: Data}
outputs:
- {name: Data}
implementation:
  container:
    image: busybox
";
        ComponentSpec::from_text(text).unwrap();
    }

    #[test]
    fn unknown_input_value_reference_rejected() {
        let text = "\
inputs:
- {name: Data}
implementation:
  container:
    image: busybox
    args:
      - {inputValue: Wrong}
";
        let err = ComponentSpec::from_text(text).unwrap_err();
        match err {
            SpecError::UnresolvedReference { namespace, name } => {
                assert_eq!(namespace, Namespace::Input);
                assert_eq!(name, "Wrong");
            }
            other => panic!("expected UnresolvedReference, got: {}", other),
        }
    }

    #[test]
    fn unknown_reference_inside_if_branch_rejected() {
        let text = "\
implementation:
  container:
    image: busybox
    args:
      - if:
          cond: true
          then: [{inputValue: Missing}]
";
        let err = ComponentSpec::from_text(text).unwrap_err();
        assert!(matches!(err, SpecError::UnresolvedReference { .. }));
    }

    #[test]
    fn unknown_file_output_rejected() {
        let text = "\
outputs:
- {name: Data}
implementation:
  container:
    image: busybox
    fileOutputs:
      Wrong: /outputs/output.txt
";
        let err = ComponentSpec::from_text(text).unwrap_err();
        assert!(matches!(
            err,
            SpecError::UnresolvedReference {
                namespace: Namespace::Output,
                ..
            }
        ));
    }

    #[test]
    fn file_outputs_with_spaces_accepted() {
        let text = "\
outputs:
- {name: Output data}
implementation:
  container:
    image: busybox
    fileOutputs:
      Output data: /outputs/output-data
";
        let spec = ComponentSpec::from_text(text).unwrap();
        assert_eq!(
            spec.container().file_outputs.get("Output data").map(String::as_str),
            Some("/outputs/output-data")
        );
    }

    #[test]
    fn scalar_literals_coerce_to_strings() {
        let text = "\
implementation:
  container:
    image: busybox
    args: [--count, 3, true]
";
        let spec = ComponentSpec::from_text(text).unwrap();
        assert_eq!(
            spec.container().args,
            vec![
                ArgumentNode::Literal("--count".to_string()),
                ArgumentNode::Literal("3".to_string()),
                ArgumentNode::Literal("true".to_string()),
            ]
        );
    }

    #[test]
    fn nested_placeholders_parse() {
        let text = "\
inputs:
- {name: In, optional: true}
outputs:
- {name: Out}
implementation:
  container:
    image: busybox
    args:
      - concat: [{inputValue: In}, {outputPath: Out}]
      - if:
          cond: {isPresent: In}
          then: [--in, {inputPath: In}]
          else: --no-in
";
        let spec = ComponentSpec::from_text(text).unwrap();
        let args = &spec.container().args;
        assert!(matches!(&args[0], ArgumentNode::Concat(children) if children.len() == 2));
        match &args[1] {
            ArgumentNode::If(body) => {
                assert_eq!(*body.cond, ArgumentNode::IsPresent("In".to_string()));
                assert_eq!(body.then.len(), 2);
                assert_eq!(
                    body.otherwise.as_deref(),
                    Some(&[ArgumentNode::Literal("--no-in".to_string())][..])
                );
            }
            other => panic!("expected if node, got: {:?}", other),
        }
    }

    #[test]
    fn unknown_placeholder_kind_rejected() {
        let text = "\
implementation:
  container:
    image: busybox
    args:
      - {bogusPlaceholder: Data}
";
        let err = ComponentSpec::from_text(text).unwrap_err();
        assert!(matches!(err, SpecError::MalformedSpec { .. }));
    }

    #[test]
    fn numeric_default_coerces_to_string() {
        let text = "\
inputs:
- {name: Count, default: 10}
implementation:
  container:
    image: busybox
";
        let spec = ComponentSpec::from_text(text).unwrap();
        assert_eq!(spec.inputs[0].default.as_deref(), Some("10"));
        assert!(!spec.inputs[0].is_required());
    }

    #[test]
    fn digest_is_stable_and_format_independent() {
        let compact = "{implementation: {container: {image: busybox}}}";
        let expanded = "implementation:\n  container:\n    image: busybox\n";
        let a = ComponentSpec::from_text(compact).unwrap();
        let b = ComponentSpec::from_text(expanded).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn digest_differs_for_different_specs() {
        let a = ComponentSpec::from_text("implementation: {container: {image: busybox}}").unwrap();
        let b = ComponentSpec::from_text("implementation: {container: {image: alpine}}").unwrap();
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn canonical_json_roundtrips_placeholders() {
        let text = "\
inputs:
- {name: In, optional: true}
outputs:
- {name: Out}
implementation:
  container:
    image: busybox
    args:
      - if:
          cond: {isPresent: In}
          then: [concat: [{inputValue: In}, {outputPath: Out}]]
";
        let spec = ComponentSpec::from_text(text).unwrap();
        let json = spec.canonical_json();
        let reparsed = ComponentSpec::from_text(&json).unwrap();
        assert_eq!(spec, reparsed);
    }
}
