// typecheck.rs — Producer/consumer type compatibility checking
//
// Consulted once per bound output reference at invoke time; producer and
// consumer specs are compiled independently and only meet when a reference
// is passed into another factory. The embedding application controls a
// single enable flag via an explicit context value; individual references
// may also opt out via `OutputRef::ignore_type`.

use std::fmt;

use crate::task::OutputRef;
use crate::typespec::{types_compatible, TypeSpec};

// ── Error type ───────────────────────────────────────────────────────────

/// A producer output type does not match the consuming input's declared
/// type. Carries both sides for diagnostics.
#[derive(Debug, Clone)]
pub struct InconsistentTypeError {
    /// Display name of the consuming input.
    pub input: String,
    pub producer: TypeSpec,
    pub consumer: TypeSpec,
}

impl fmt::Display for InconsistentTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "incompatible types for input '{}': producer output is {}, consumer expects {}",
            self.input, self.producer, self.consumer
        )
    }
}

impl std::error::Error for InconsistentTypeError {}

// ── Checker context ──────────────────────────────────────────────────────

/// Type-checking context passed to factory invocations. The flag can be
/// flipped at runtime by constructing a different context; there is no
/// hidden process-global state.
#[derive(Debug, Clone, Copy)]
pub struct TypeCheck {
    enabled: bool,
}

impl TypeCheck {
    pub fn enabled() -> Self {
        TypeCheck { enabled: true }
    }

    pub fn disabled() -> Self {
        TypeCheck { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check one bound output reference against the consuming input's
    /// declared type. No-op when disabled or when the reference was
    /// exempted at the call site.
    pub fn check(
        &self,
        input: &str,
        reference: &OutputRef,
        consumer: &TypeSpec,
    ) -> Result<(), InconsistentTypeError> {
        if !self.enabled || reference.type_check_bypassed() {
            return Ok(());
        }
        if types_compatible(&reference.ty, consumer) {
            Ok(())
        } else {
            Err(InconsistentTypeError {
                input: input.to_string(),
                producer: reference.ty.clone(),
                consumer: consumer.clone(),
            })
        }
    }
}

impl Default for TypeCheck {
    fn default() -> Self {
        TypeCheck::enabled()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
