//! Reserved-word escaping.
//!
//! Before generation every property whose name is reserved in the target
//! language is renamed to `<prefix><name>`. After generation the language's
//! restore rule rewrites the marker out of the emitted source text; the same
//! rule is applied to the schema keys here to produce the documentation
//! schema. With the stock rule (`quicktype_(\w+)` → `$1_`) a reserved `else`
//! comes back as `else_` while `when` never changes.
use std::collections::{BTreeSet, HashSet};

use super::{ObjectNode, Schema};
use crate::error::SchemaError;
use crate::rewrite::Rule;

pub const DEFAULT_PREFIX: &str = "quicktype_";

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservedWords(BTreeSet<String>);

/// Schema-side half of the escape/restore pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscapeRule {
    prefix: String,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl ReservedWords {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ReservedWords {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl Default for EscapeRule {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EscapeRule {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
    /// The text the rewriter looks for in generated lines.
    pub fn marker(&self) -> &str {
        &self.prefix
    }
    pub fn escape(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }
    pub fn is_escaped(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
    }
}

/// Rename every reserved property, at any depth, in the root tree and in each
/// definition (each visited once; `$ref`s are not followed). Returns the
/// number of renamed properties.
///
/// Running it again is a no-op as long as no reserved word itself starts
/// with the prefix, which configuration validation guarantees.
pub fn escape(schema: &mut Schema, reserved: &ReservedWords, rule: &EscapeRule) -> Result<usize, SchemaError> {
    if reserved.is_empty() {
        return Ok(0);
    }
    let mut renamed = 0;
    schema.for_each_object_mut(&mut |pointer, obj| -> Result<(), SchemaError> {
        renamed += escape_object(pointer, obj, reserved, rule)?;
        Ok(())
    })?;
    Ok(renamed)
}

fn escape_object(
    pointer: &str,
    obj: &mut ObjectNode,
    reserved: &ReservedWords,
    rule: &EscapeRule,
) -> Result<usize, SchemaError> {
    let hits = obj
        .properties
        .keys()
        .filter(|name| reserved.contains(name))
        .cloned()
        .collect::<Vec<_>>();
    for name in &hits {
        let escaped = rule.escape(name);
        if !obj.rename_property(name, escaped.clone()) {
            return Err(SchemaError::EscapeCollision {
                pointer: pointer.to_string(),
                escaped,
                restored: name.clone(),
            });
        }
    }
    Ok(hits.len())
}

/// Documentation pass: apply the restore rule to every escaped property key.
pub fn restore(schema: &mut Schema, escape: &EscapeRule, restore: &Rule) -> Result<usize, SchemaError> {
    let mut renamed = 0;
    schema.for_each_object_mut(&mut |pointer, obj| {
        let escaped = obj
            .properties
            .keys()
            .filter(|name| name.contains(escape.marker()))
            .cloned()
            .collect::<Vec<_>>();
        for name in escaped {
            let restored = restore.apply(&name).into_owned();
            if restored == name {
                continue;
            }
            if !obj.rename_property(&name, restored.clone()) {
                return Err(SchemaError::EscapeCollision {
                    pointer: pointer.to_string(),
                    escaped: name,
                    restored,
                });
            }
            renamed += 1;
        }
        Ok(())
    })?;
    Ok(renamed)
}

/// Check the round-trip law on an escaped schema.
///
/// A plain name must come back unchanged, so it may not contain the marker
/// at all (restoration is textual and would rewrite it). Every escaped
/// property must restore to a name that has lost the marker, is not
/// reserved, and differs from every other property name in the same object.
pub fn check_round_trip(
    schema: &Schema,
    reserved: &ReservedWords,
    escape: &EscapeRule,
    restore: &Rule,
) -> Result<(), SchemaError> {
    let produced = |name: &str| {
        name.strip_prefix(escape.marker())
            .is_some_and(|word| reserved.contains(word))
    };
    schema.for_each_object(&mut |pointer, obj| {
        if let Some(name) = obj
            .properties
            .keys()
            .find(|name| !produced(name.as_str()) && name.contains(escape.marker()))
        {
            return Err(SchemaError::MarkerInPlainName {
                pointer: pointer.to_string(),
                name: name.clone(),
                marker: escape.marker().to_string(),
            });
        }
        let plain = obj
            .properties
            .keys()
            .filter(|name| !produced(name.as_str()))
            .map(String::as_str)
            .collect::<HashSet<_>>();
        let mut seen = HashSet::new();
        for name in obj.properties.keys().filter(|name| produced(name.as_str())) {
            let restored = restore.apply(name).into_owned();
            let (pointer, escaped) = (pointer.to_string(), name.clone());
            if restored.contains(escape.marker()) {
                return Err(SchemaError::RestoreIncomplete { pointer, escaped, restored });
            }
            if reserved.contains(&restored) {
                return Err(SchemaError::RestoredReserved { pointer, escaped, restored });
            }
            if plain.contains(restored.as_str()) || !seen.insert(restored.clone()) {
                return Err(SchemaError::EscapeCollision { pointer, escaped, restored });
            }
        }
        Ok(())
    })
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaNode;
    use serde_json::json;

    fn python_reserved() -> ReservedWords {
        ["else", "from", "return", "class"].into_iter().collect()
    }

    fn restore_rule() -> Rule {
        Rule::compile(r"quicktype_(\w+)", "g", "$1_").unwrap()
    }

    fn cond_schema() -> Schema {
        Schema::from_value(json!({
            "$ref": "#/definitions/Instruction",
            "definitions": {
                "Instruction": { "anyOf": [ { "$ref": "#/definitions/Cond" } ] },
                "Cond": {
                    "type": "object",
                    "properties": {
                        "cond": {
                            "type": "object",
                            "properties": {
                                "when": { "type": "string" },
                                "else": { "type": "array", "items": { "$ref": "#/definitions/Instruction" } }
                            },
                            "required": ["when", "else"]
                        }
                    },
                    "required": ["cond"]
                },
                // only reachable through a reference
                "SendSMS": {
                    "type": "object",
                    "properties": {
                        "send_sms": {
                            "anyOf": [
                                { "type": "object", "properties": { "from": { "type": "string" } }, "required": ["from"] },
                                { "type": "object", "properties": { "class": { "type": "string" } } }
                            ]
                        },
                        "headers": { "type": "object", "additionalProperties": {
                            "type": "object", "properties": { "return": { "type": "string" } }, "required": ["return"]
                        } }
                    }
                }
            }
        }))
        .unwrap()
    }

    fn inner<'a>(schema: &'a Schema, def: &str, prop: &str) -> &'a ObjectNode {
        let SchemaNode::Object(outer) = &schema.definitions[def] else { panic!("{def} is not an object") };
        let SchemaNode::Object(inner) = &outer.properties[prop] else { panic!("{prop} is not an object") };
        inner
    }

    #[test]
    fn reserved_property_is_escaped_with_required_entry() {
        let mut schema = cond_schema();
        let rule = EscapeRule::new("esc_");
        escape(&mut schema, &python_reserved(), &rule).unwrap();
        let cond = inner(&schema, "Cond", "cond");
        assert_eq!(cond.properties.keys().collect::<Vec<_>>(), ["when", "esc_else"]);
        assert_eq!(cond.required.as_deref().unwrap(), ["when", "esc_else"]);
    }

    #[test]
    fn nested_compositions_and_additional_properties_are_escaped() {
        let mut schema = cond_schema();
        let count = escape(&mut schema, &python_reserved(), &EscapeRule::default()).unwrap();
        assert_eq!(count, 4);
        let value = schema.to_value();
        let sms = &value["definitions"]["SendSMS"]["properties"];
        assert_eq!(sms["send_sms"]["anyOf"][0]["required"], json!(["quicktype_from"]));
        assert!(sms["send_sms"]["anyOf"][1]["properties"].get("quicktype_class").is_some());
        assert_eq!(sms["headers"]["additionalProperties"]["required"], json!(["quicktype_return"]));
        assert!(schema.required_violations().is_empty());
    }

    #[test]
    fn escaping_twice_changes_nothing() {
        let mut once = cond_schema();
        escape(&mut once, &python_reserved(), &EscapeRule::default()).unwrap();
        let mut twice = once.clone();
        assert_eq!(escape(&mut twice, &python_reserved(), &EscapeRule::default()).unwrap(), 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn round_trip_law_holds_for_reserved_and_plain_names() {
        let reserved = python_reserved();
        let escape_rule = EscapeRule::default();
        let restore_rule = restore_rule();
        for name in ["when", "then", "else", "from", "to_number", "class"] {
            let escaped = if reserved.contains(name) { escape_rule.escape(name) } else { name.to_string() };
            let restored = if escaped.contains(escape_rule.marker()) {
                restore_rule.apply(&escaped).into_owned()
            } else {
                escaped
            };
            if reserved.contains(name) {
                assert_eq!(restored, format!("{name}_"));
                assert!(!reserved.contains(&restored));
            } else {
                assert_eq!(restored, name);
            }
        }

        let mut schema = cond_schema();
        escape(&mut schema, &reserved, &escape_rule).unwrap();
        check_round_trip(&schema, &reserved, &escape_rule, &restore_rule).unwrap();
    }

    #[test]
    fn restored_name_colliding_with_sibling_is_rejected() {
        let mut schema = Schema::from_value(json!({ "definitions": { "A": {
            "type": "object",
            "properties": { "else": { "type": "string" }, "else_": { "type": "string" } }
        } } }))
        .unwrap();
        let reserved = python_reserved();
        escape(&mut schema, &reserved, &EscapeRule::default()).unwrap();
        let err = check_round_trip(&schema, &reserved, &EscapeRule::default(), &restore_rule()).unwrap_err();
        assert!(matches!(err, SchemaError::EscapeCollision { ref restored, .. } if restored == "else_"));
    }

    #[test]
    fn restore_rule_that_keeps_marker_is_rejected() {
        let mut schema = cond_schema();
        let reserved = python_reserved();
        escape(&mut schema, &reserved, &EscapeRule::default()).unwrap();
        let lazy = Rule::compile(r"quicktype_(\w+)", "g", "quicktype_$1").unwrap();
        let err = check_round_trip(&schema, &reserved, &EscapeRule::default(), &lazy).unwrap_err();
        assert!(matches!(err, SchemaError::RestoreIncomplete { .. }));
    }

    #[test]
    fn restore_produces_documentation_names() {
        let mut schema = cond_schema();
        let reserved = python_reserved();
        escape(&mut schema, &reserved, &EscapeRule::default()).unwrap();
        let count = restore(&mut schema, &EscapeRule::default(), &restore_rule()).unwrap();
        assert_eq!(count, 4);
        let cond = inner(&schema, "Cond", "cond");
        assert_eq!(cond.properties.keys().collect::<Vec<_>>(), ["when", "else_"]);
        assert_eq!(cond.required.as_deref().unwrap(), ["when", "else_"]);
        assert!(schema.required_violations().is_empty());
        assert!(!schema.to_value().to_string().contains("quicktype_"));
    }

    #[test]
    fn plain_name_containing_marker_is_rejected() {
        let mut schema = Schema::from_value(json!({ "definitions": { "Play": {
            "type": "object",
            "properties": { "desc_text": { "type": "string" }, "else": { "type": "string" } }
        } } }))
        .unwrap();
        let reserved = ["else"].into_iter().collect::<ReservedWords>();
        let rule = EscapeRule::new("esc_");
        let restore_rule = Rule::compile(r"esc_(\w+)", "g", "$1_").unwrap();
        escape(&mut schema, &reserved, &rule).unwrap();
        let err = check_round_trip(&schema, &reserved, &rule, &restore_rule).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MarkerInPlainName { ref name, ref pointer, .. }
                if name == "desc_text" && pointer == "/definitions/Play"
        ));
    }

    #[test]
    fn existing_escaped_sibling_blocks_escape() {
        let mut schema = Schema::from_value(json!({ "definitions": { "A": {
            "type": "object",
            "properties": { "else": {}, "quicktype_else": {} }
        } } }))
        .unwrap();
        let err = escape(&mut schema, &python_reserved(), &EscapeRule::default()).unwrap_err();
        assert!(matches!(err, SchemaError::EscapeCollision { .. }));
    }
}
