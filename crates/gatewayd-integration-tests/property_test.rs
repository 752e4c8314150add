/// Property tests over config validation and catalog URI template matching.
use gatewayd_config::{parse_config_from_str, validate_config};
use gatewayd_runtime::catalog::compile_uri_template;
use proptest::prelude::*;

fn backend_id_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}"
}

proptest! {
    /// Any number of backends with distinct generated ids and non-empty
    /// commands validates cleanly; the validator never rejects well-formed
    /// input (spec §6 "Schema validation at startup").
    #[test]
    fn distinct_backend_ids_always_validate(ids in prop::collection::hash_set(backend_id_strategy(), 0..8)) {
        let backends: Vec<String> = ids
            .into_iter()
            .map(|id| format!(r#"{{"id": "{id}", "command": "echo-backend"}}"#))
            .collect();
        let json = format!(r#"{{"backends": [{}]}}"#, backends.join(","));
        let config = parse_config_from_str(&json).expect("generated config parses");
        prop_assert!(validate_config(&config).is_ok());
    }

    /// Duplicating any generated id always trips `DuplicateBackendId`,
    /// regardless of how many other distinct backends surround it.
    #[test]
    fn duplicating_any_id_fails_validation(
        ids in prop::collection::vec(backend_id_strategy(), 1..8),
        dup_index in 0usize..8,
    ) {
        let dup_index = dup_index % ids.len();
        let mut backends = ids.clone();
        backends.push(ids[dup_index].clone());

        let entries: Vec<String> = backends
            .iter()
            .map(|id| format!(r#"{{"id": "{id}", "command": "echo-backend"}}"#))
            .collect();
        let json = format!(r#"{{"backends": [{}]}}"#, entries.join(","));
        let config = parse_config_from_str(&json).unwrap();
        prop_assert!(validate_config(&config).is_err());
    }

    /// A compiled template matches its own literal instantiation but not one
    /// built from a different literal prefix (spec §4.3 "Resource URI
    /// templates": placeholders never match across an unrelated literal
    /// segment).
    #[test]
    fn uri_template_distinguishes_literal_prefixes(
        prefix in "[a-z]{1,6}",
        other_prefix in "[a-z]{1,6}",
        value in "[a-z0-9]{1,10}",
    ) {
        prop_assume!(prefix != other_prefix);
        let template = format!("{prefix}://{{id}}");
        let regex = compile_uri_template(&template).expect("template compiles");

        let matching = format!("{prefix}://{value}");
        prop_assert!(regex.is_match(&matching));

        let mismatched = format!("{other_prefix}://{value}");
        prop_assert!(!regex.is_match(&mismatched));
    }
}
