//! Union alias synthesis.
//!
//! Generators without discriminated unions turn `Instruction = A | B | ...`
//! into N unrelated records. The alias emitted here is what lets calling code
//! accept "any instruction" again.
use super::{unescape_token, Schema, SchemaNode, DEFINITIONS, DEFS};

/// Placeholder replaced by the joined member names.
pub const MARKER: &str = "$1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionInstruction {
    pub enabled: bool,
    pub template: String,
    pub separator: String,
}

/// Lines to append to the generated source; empty when disabled or when
/// the schema has no top-level union with named members.
pub fn synthesize(schema: &Schema, top_level: &str, instruction: &UnionInstruction) -> Vec<String> {
    if !instruction.enabled {
        return Vec::new();
    }
    let members = union_members(schema, top_level);
    if members.is_empty() {
        return Vec::new();
    }
    let joined = members.join(&instruction.separator);
    instruction
        .template
        .replacen(MARKER, &joined, 1)
        .lines()
        .map(str::to_string)
        .collect()
}

/// Definition names referenced by the top-level union, in branch order.
///
/// The union is the definition called `top_level`, or the root node when no
/// such definition exists. Inline (non-reference) branches are skipped.
pub fn union_members(schema: &Schema, top_level: &str) -> Vec<String> {
    let node = schema.definitions.get(top_level).unwrap_or(&schema.root);
    let SchemaNode::Composition(union) = node else {
        return Vec::new();
    };
    if !union.kind.is_union() {
        return Vec::new();
    }
    union
        .branches
        .iter()
        .filter_map(|branch| match branch {
            SchemaNode::Ref(reference) => definition_name(&reference.target),
            _ => None,
        })
        .collect()
}

/// `#/definitions/Cond` → `Cond`. Deeper pointers are not named definitions.
fn definition_name(target: &str) -> Option<String> {
    let rest = [DEFINITIONS, DEFS]
        .iter()
        .find_map(|key| target.strip_prefix("#/")?.strip_prefix(key)?.strip_prefix('/'))?;
    if rest.is_empty() || rest.contains('/') {
        return None;
    }
    Some(unescape_token(rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(branches: serde_json::Value) -> Schema {
        Schema::from_value(json!({
            "$ref": "#/definitions/Instruction",
            "definitions": {
                "Instruction": { "anyOf": branches },
                "A": { "type": "object" }, "B": { "type": "object" }, "C": { "type": "object" }
            }
        }))
        .unwrap()
    }

    fn ts() -> UnionInstruction {
        UnionInstruction {
            enabled: true,
            template: "type Instruction = $1;".into(),
            separator: " | ".into(),
        }
    }

    #[test]
    fn joins_referenced_definitions_in_order() {
        let schema = schema(json!([
            { "$ref": "#/definitions/A" }, { "$ref": "#/definitions/B" }, { "$ref": "#/definitions/C" }
        ]));
        assert_eq!(synthesize(&schema, "Instruction", &ts()), ["type Instruction = A | B | C;"]);
    }

    #[test]
    fn inline_branches_and_deep_pointers_are_skipped() {
        let schema = schema(json!([
            { "$ref": "#/definitions/A" },
            { "type": "string" },
            { "$ref": "#/definitions/B/properties/x" },
            { "$ref": "#/definitions/Odd~1Name" }
        ]));
        assert_eq!(union_members(&schema, "Instruction"), ["A", "Odd/Name"]);
    }

    #[test]
    fn disabled_or_missing_union_yields_nothing() {
        let schema = schema(json!([{ "$ref": "#/definitions/A" }]));
        let off = UnionInstruction { enabled: false, ..ts() };
        assert!(synthesize(&schema, "Instruction", &off).is_empty());
        assert!(synthesize(&schema, "Missing", &ts()).is_empty());
        let inline_only = self::schema(json!([{ "type": "string" }]));
        assert!(synthesize(&inline_only, "Instruction", &ts()).is_empty());
    }

    #[test]
    fn multi_line_template_expands_to_lines() {
        let schema = schema(json!([{ "$ref": "#/definitions/A" }, { "$ref": "#/definitions/B" }]));
        let python = UnionInstruction {
            enabled: true,
            template: "# any instruction\nInstruction = Union[$1]".into(),
            separator: ", ".into(),
        };
        assert_eq!(
            synthesize(&schema, "Instruction", &python),
            ["# any instruction", "Instruction = Union[A, B]"]
        );
    }

    #[test]
    fn root_union_is_used_without_named_definition() {
        let schema = Schema::from_value(json!({
            "oneOf": [ { "$ref": "#/$defs/X" }, { "$ref": "#/$defs/Y" } ],
            "$defs": { "X": {}, "Y": {} }
        }))
        .unwrap();
        assert_eq!(union_members(&schema, "Instruction"), ["X", "Y"]);
    }
}
