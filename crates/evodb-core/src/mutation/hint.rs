//! Canonical hint rendering.
//!
//! Hint output is consumed by diff-based review tooling and committed to
//! source evolution definitions, so formatting here is byte-stable:
//! single-quoted strings, fixed parameter order, sorted import grouping.

use crate::{mutation::Mutation, sig::AttrValue};

/// Quote a bare string value for a hint parameter list.
#[must_use]
pub fn serialize_value(value: &str) -> String {
    AttrValue::from(value).to_string()
}

/// Render a `name=value` hint parameter.
#[must_use]
pub fn serialize_attr(attr_name: &str, attr_value: &AttrValue) -> String {
    format!("{attr_name}={attr_value}")
}

/// Render the full contents of an evolution definition for a mutation
/// sequence: a sorted, merged import grouping for the mutation types in
/// use, then one hint line per mutation.
#[must_use]
pub fn render_evolution_content(mutations: &[Mutation]) -> String {
    let mut mutation_types: Vec<&str> = mutations.iter().map(Mutation::hint_name).collect();
    mutation_types.sort_unstable();
    mutation_types.dedup();

    let mut lines = vec![
        format!(
            "use evodb::mutations::{{{}}};",
            mutation_types.join(", ")
        ),
        String::new(),
        "MUTATIONS = [".to_string(),
    ];

    for mutation in mutations {
        lines.push(format!("    {},", mutation.generate_hint()));
    }

    lines.push("]".to_string());
    lines.push(String::new());

    lines.join("\n")
}
