// Property-based tests for factory invariants.
//
// Four categories:
// 1. Sanitizer shape: every display name folds to a legal identifier
// 2. Signature ordering: required always precede optional, both stable
// 3. Omission law: dropping an optional binding never breaks resolution
// 4. Type equality: structural comparison ignores property key order
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use ctc::factory::{sanitize_identifier, Arguments, TaskFactory};
use ctc::spec::ComponentSpec;
use ctc::typespec::{types_compatible, TypeSpec};
use proptest::prelude::*;

// ── Generators ──────────────────────────────────────────────────────────────

/// A small component with a mix of required and optional inputs, each
/// referenced once from args so validation passes.
fn arb_component() -> impl Strategy<Value = (String, Vec<bool>)> {
    prop::collection::vec(prop::bool::ANY, 1..=6).prop_map(|optionals| {
        let mut doc = String::from("inputs:\n");
        for (i, optional) in optionals.iter().enumerate() {
            if *optional {
                doc.push_str(&format!("- {{name: in{}, optional: true}}\n", i));
            } else {
                doc.push_str(&format!("- {{name: in{}}}\n", i));
            }
        }
        doc.push_str("implementation:\n  container:\n    image: busybox\n    args:\n");
        for i in 0..optionals.len() {
            doc.push_str(&format!(
                "    - if:\n        cond: {{isPresent: in{}}}\n        then: [{{inputValue: in{}}}]\n",
                i, i
            ));
        }
        (doc, optionals)
    })
}

fn arb_type_properties() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(
        (
            proptest::string::string_regex("[a-z]{1,8}").expect("valid regex"),
            proptest::string::string_regex("[a-z0-9]{1,8}").expect("valid regex"),
        ),
        1..=4,
    )
    .prop_map(|mut props| {
        props.sort();
        props.dedup_by(|a, b| a.0 == b.0);
        props
    })
}

fn parameterized(name: &str, props: &[(String, String)]) -> TypeSpec {
    let mut yaml = format!("{}:\n", name);
    for (key, value) in props {
        yaml.push_str(&format!("  {}: {}\n", key, value));
    }
    let value: serde_yaml::Value = serde_yaml::from_str(&yaml).expect("valid yaml");
    TypeSpec::from_value(&value).expect("valid type spec")
}

// ── 1. Sanitizer shape ──────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    #[test]
    fn sanitized_identifiers_are_legal(name in "\\PC{0,24}") {
        let ident = sanitize_identifier(&name);
        prop_assert!(!ident.is_empty());
        prop_assert!(ident
            .chars()
            .all(|c| c == '_' || c.is_ascii_lowercase() || c.is_ascii_digit()));
        prop_assert!(!ident.starts_with(|c: char| c.is_ascii_digit()));
    }

    #[test]
    fn sanitizing_is_idempotent(name in "\\PC{0,24}") {
        let once = sanitize_identifier(&name);
        prop_assert_eq!(sanitize_identifier(&once), once);
    }
}

// ── 2. Signature ordering ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        ..ProptestConfig::default()
    })]

    #[test]
    fn required_precede_optional((doc, optionals) in arb_component()) {
        let spec = ComponentSpec::from_text(&doc).expect("generated doc parses");
        let f = TaskFactory::compile(spec).expect("generated doc compiles");

        let required_count = optionals.iter().filter(|o| !**o).count();
        let params = f.params();
        prop_assert_eq!(params.len(), optionals.len());
        for (i, param) in params.iter().enumerate() {
            prop_assert_eq!(param.required, i < required_count);
        }

        // Declaration order survives within each group.
        let indices: Vec<usize> = params
            .iter()
            .map(|p| p.ident.trim_start_matches("in").parse().expect("in<N>"))
            .collect();
        prop_assert!(indices[..required_count].windows(2).all(|w| w[0] < w[1]));
        prop_assert!(indices[required_count..].windows(2).all(|w| w[0] < w[1]));
    }
}

// ── 3. Omission law ─────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        ..ProptestConfig::default()
    })]

    #[test]
    fn any_optional_subset_resolves(
        (doc, optionals) in arb_component(),
        supply_mask in prop::collection::vec(prop::bool::ANY, 6),
    ) {
        let spec = ComponentSpec::from_text(&doc).expect("generated doc parses");
        let f = TaskFactory::compile(spec).expect("generated doc compiles");

        // Bind every required input; bind optionals per the mask.
        let mut args = Arguments::new();
        for param in f.params() {
            let index: usize = param
                .ident
                .trim_start_matches("in")
                .parse()
                .expect("in<N>");
            if param.required || supply_mask[index] {
                args = args.named(&param.ident, format!("v{}", index));
            }
        }

        // Entries appear in template order, one per supplied input.
        let mut expected = Vec::new();
        for (index, optional) in optionals.iter().enumerate() {
            if !optional || supply_mask[index] {
                expected.push(format!("v{}", index));
            }
        }

        let task = f.invoke(args).expect("bound invocation resolves");
        prop_assert_eq!(task.arguments, expected);
    }
}

// ── 4. Type equality ────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    #[test]
    fn property_order_never_matters(props in arb_type_properties()) {
        let forward = parameterized("GCSPath", &props);
        let mut reversed_props = props.clone();
        reversed_props.reverse();
        let reversed = parameterized("GCSPath", &reversed_props);
        prop_assert!(types_compatible(&forward, &reversed));
        prop_assert!(types_compatible(&reversed, &forward));
    }

    #[test]
    fn unspecified_matches_everything(props in arb_type_properties()) {
        let concrete = parameterized("GCSPath", &props);
        prop_assert!(types_compatible(&TypeSpec::Unspecified, &concrete));
        prop_assert!(types_compatible(&concrete, &TypeSpec::Unspecified));
    }
}
