//! Catalog construction and consistency tests.

use super::{ToolRegistry, builtin_catalog};
use crate::error::StartupError;

#[test]
fn builtin_catalog_constructs() {
    let registry = ToolRegistry::builtin().unwrap();
    assert_eq!(registry.len(), 9);
    assert!(registry.lookup("list_pull_requests").is_ok());
    assert!(registry.lookup("execute_query").is_err());
}

#[test]
fn duplicate_names_are_fatal() {
    let mut defs = builtin_catalog();
    let dup = defs[0].clone();
    defs.push(dup);
    match ToolRegistry::new(defs) {
        Err(StartupError::DuplicateTool { name }) => assert_eq!(name, "list_projects"),
        other => panic!("expected duplicate-tool error, got {other:?}"),
    }
}

#[test]
fn default_sort_outside_whitelist_is_fatal() {
    let mut defs = builtin_catalog();
    defs[0].query.default_sort = "no_such_column";
    assert!(matches!(
        ToolRegistry::new(defs),
        Err(StartupError::BadCatalog { .. })
    ));
}

#[test]
fn every_bound_argument_is_declared_in_the_schema() {
    for def in ToolRegistry::builtin().unwrap().iter() {
        for binding in def.query.bindings {
            assert!(
                def.input.get(binding.arg).is_some(),
                "{}: binding for undeclared argument '{}'",
                def.name,
                binding.arg
            );
        }
    }
}

#[test]
fn list_tools_declare_paging_arguments() {
    for def in ToolRegistry::builtin().unwrap().iter() {
        if def.query.single {
            continue;
        }
        for arg in ["limit", "cursor", "sort", "order"] {
            assert!(
                def.input.get(arg).is_some(),
                "{}: missing paging argument '{}'",
                def.name,
                arg
            );
        }
    }
}

#[test]
fn sort_schema_matches_template_whitelist() {
    // The `sort` enum advertised to clients must be exactly the set of
    // columns the template will accept at build time.
    for def in ToolRegistry::builtin().unwrap().iter() {
        if def.query.single {
            continue;
        }
        let advertised = def
            .input
            .get("sort")
            .and_then(|spec| spec.allowed_values)
            .unwrap_or_else(|| panic!("{}: sort has no allowed values", def.name));
        for column in advertised {
            assert!(
                def.query.sort_kind(column).is_some(),
                "{}: advertised sort '{}' not in template whitelist",
                def.name,
                column
            );
        }
    }
}

#[test]
fn key_column_is_selected_by_every_template() {
    // The executor reads the key back out of result rows to mint cursors.
    for def in ToolRegistry::builtin().unwrap().iter() {
        assert!(
            def.query.columns.contains(&def.query.key_column),
            "{}: key column '{}' not among selected columns",
            def.name,
            def.query.key_column
        );
    }
}

#[test]
fn single_tools_have_exactly_one_required_key_argument() {
    for def in builtin_catalog() {
        if !def.query.single {
            continue;
        }
        let required: Vec<_> = def
            .input
            .fields()
            .filter(|(_, spec)| spec.required)
            .collect();
        assert_eq!(required.len(), 1, "{}: expected one required arg", def.name);
        assert_eq!(def.query.bindings.len(), 1);
    }
}
