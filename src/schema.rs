//! Typed JSON Schema tree.
//!
//! The extraction service hands back an untyped `serde_json::Value`; it is
//! converted once into [`Schema`] so every later pass is an exhaustive match
//! over node kinds instead of ad-hoc key probing. Conversion is strict about
//! shapes the passes cannot see into: a keyword that could hide a property
//! table (`not`, `if`, `patternProperties`, ...) is rejected rather than
//! carried through unescaped.
//!
//! Keywords the tree does not model are kept verbatim in each node's `extra`
//! map, so `Schema::from_value(v)?.to_value()` reproduces `v` up to key order
//! within a node.
pub mod reserved;
pub mod union;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::SchemaError;

pub const DEFINITIONS: &str = "definitions";
pub const DEFS: &str = "$defs";

/// Keywords whose values are subschemas the tree does not model.
const UNMODELED_SUBSCHEMAS: &[&str] = &[
    "not",
    "if",
    "then",
    "else",
    "patternProperties",
    "prefixItems",
    "additionalItems",
    "contains",
    "dependencies",
    "dependentSchemas",
    "propertyNames",
    "unevaluatedProperties",
    "unevaluatedItems",
];

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// A whole document: the top-level node plus its named definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub root: SchemaNode,
    pub definitions: IndexMap<String, SchemaNode>,
    definitions_key: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Object(ObjectNode),
    Array(ArrayNode),
    Composition(CompositionNode),
    Ref(RefNode),
    Scalar(ScalarNode),
    /// `true` / `false` used as a schema.
    Bool(bool),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectNode {
    pub properties: IndexMap<String, SchemaNode>,
    /// The source spelled out `properties`, possibly as `{}`.
    pub properties_declared: bool,
    pub required: Option<Vec<String>>,
    pub additional: Option<Additional>,
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Additional {
    Allowed(bool),
    Schema(Box<SchemaNode>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayNode {
    pub items: Option<Items>,
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Items {
    Single(Box<SchemaNode>),
    Tuple(Vec<SchemaNode>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositionNode {
    pub kind: CompositionKind,
    pub branches: Vec<SchemaNode>,
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionKind {
    AnyOf,
    OneOf,
    AllOf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefNode {
    pub target: String,
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScalarNode {
    pub extra: Map<String, Value>,
}

/// Wrapper written around the extracted definitions before generation.
#[derive(Debug, Clone)]
pub struct Envelope<'a> {
    pub title: &'a str,
    pub id: &'a str,
    pub draft: &'a str,
    pub top_level: &'a str,
}

// ————————————————————————————————————————————————————————————————————————————
// CONVERSION
// ————————————————————————————————————————————————————————————————————————————

impl CompositionKind {
    pub const ALL: [CompositionKind; 3] = [Self::AnyOf, Self::OneOf, Self::AllOf];

    pub fn keyword(self) -> &'static str {
        match self {
            Self::AnyOf => "anyOf",
            Self::OneOf => "oneOf",
            Self::AllOf => "allOf",
        }
    }

    /// `allOf` is an intersection, not a union.
    pub fn is_union(self) -> bool {
        matches!(self, Self::AnyOf | Self::OneOf)
    }
}

impl Schema {
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let Value::Object(mut map) = value else {
            return Err(SchemaError::shape("", "top-level schema must be an object"));
        };
        let (definitions_key, table) = match (map.shift_remove(DEFINITIONS), map.shift_remove(DEFS)) {
            (Some(_), Some(_)) => {
                return Err(SchemaError::shape("", "both 'definitions' and '$defs' are present"));
            }
            (Some(table), None) => (Some(DEFINITIONS), Some(table)),
            (None, Some(table)) => (Some(DEFS), Some(table)),
            (None, None) => (None, None),
        };

        let mut definitions = IndexMap::new();
        if let Some(table) = table {
            let key = definitions_key.unwrap_or(DEFINITIONS);
            let Value::Object(table) = table else {
                return Err(SchemaError::shape(&format!("/{key}"), "definitions table must be an object"));
            };
            for (name, node) in table {
                let pointer = format!("/{}/{}", escape_token(key), escape_token(&name));
                definitions.insert(name, SchemaNode::from_value(node, &pointer)?);
            }
        }

        let root = SchemaNode::from_map(map, "")?;
        Ok(Self { root, definitions, definitions_key })
    }

    pub fn to_value(&self) -> Value {
        let mut map = match self.root.to_value() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if self.definitions_key.is_some() || !self.definitions.is_empty() {
            let table = self
                .definitions
                .iter()
                .map(|(name, node)| (name.clone(), node.to_value()))
                .collect::<Map<_, _>>();
            map.insert(self.definitions_key().to_string(), Value::Object(table));
        }
        Value::Object(map)
    }

    pub fn definitions_key(&self) -> &'static str {
        self.definitions_key.unwrap_or(DEFINITIONS)
    }

    /// `#/definitions/<name>` (or `#/$defs/<name>`).
    pub fn reference_to(&self, name: &str) -> String {
        format!("#/{}/{}", self.definitions_key(), escape_token(name))
    }

    /// Replace the top-level node with a titled `$ref` to `top_level`,
    /// keeping every definition.
    pub fn enveloped(self, envelope: &Envelope<'_>) -> Self {
        let mut extra = Map::new();
        extra.insert("title".into(), Value::from(envelope.title));
        extra.insert("$id".into(), Value::from(envelope.id));
        extra.insert("$schema".into(), Value::from(envelope.draft));
        let root = SchemaNode::Ref(RefNode {
            target: self.reference_to(envelope.top_level),
            extra,
        });
        let key = self.definitions_key();
        Self {
            root,
            definitions: self.definitions,
            definitions_key: Some(key),
        }
    }

    /// Visit every object node: the root tree first, then each definition
    /// exactly once. References are never followed.
    pub fn for_each_object<E>(
        &self,
        f: &mut impl FnMut(&str, &ObjectNode) -> Result<(), E>,
    ) -> Result<(), E> {
        self.root.for_each_object("", f)?;
        let key = escape_token(self.definitions_key());
        for (name, node) in &self.definitions {
            node.for_each_object(&format!("/{key}/{}", escape_token(name)), f)?;
        }
        Ok(())
    }

    pub fn for_each_object_mut<E>(
        &mut self,
        f: &mut impl FnMut(&str, &mut ObjectNode) -> Result<(), E>,
    ) -> Result<(), E> {
        self.root.for_each_object_mut("", f)?;
        let key = escape_token(self.definitions_key());
        for (name, node) in self.definitions.iter_mut() {
            node.for_each_object_mut(&format!("/{key}/{}", escape_token(name)), f)?;
        }
        Ok(())
    }

    /// Every `required` entry that is not a key of the same node's
    /// `properties`, by JSON pointer.
    pub fn required_violations(&self) -> Vec<SchemaError> {
        let mut found = Vec::new();
        let _ = self.for_each_object(&mut |pointer, obj| {
            for name in obj.required.iter().flatten() {
                if !obj.properties.contains_key(name) {
                    found.push(SchemaError::RequiredMismatch {
                        pointer: pointer.to_string(),
                        name: name.clone(),
                    });
                }
            }
            Ok::<(), std::convert::Infallible>(())
        });
        found
    }
}

impl SchemaNode {
    pub fn from_value(value: Value, pointer: &str) -> Result<Self, SchemaError> {
        match value {
            Value::Bool(b) => Ok(Self::Bool(b)),
            Value::Object(map) => Self::from_map(map, pointer),
            other => Err(SchemaError::shape(
                pointer,
                format!("expected a schema object, found {}", json_kind(&other)),
            )),
        }
    }

    fn from_map(mut map: Map<String, Value>, pointer: &str) -> Result<Self, SchemaError> {
        if let Some(keyword) = UNMODELED_SUBSCHEMAS.iter().find(|k| map.contains_key(**k)) {
            return Err(SchemaError::shape(pointer, format!("keyword '{keyword}' is not supported")));
        }
        if !pointer.is_empty() && (map.contains_key(DEFINITIONS) || map.contains_key(DEFS)) {
            return Err(SchemaError::shape(pointer, "nested definitions tables are not supported"));
        }

        let compositions = CompositionKind::ALL
            .into_iter()
            .filter(|kind| map.contains_key(kind.keyword()))
            .collect::<Vec<_>>();
        let is_ref = map.contains_key("$ref");
        let is_object = ["properties", "required", "additionalProperties"]
            .iter()
            .any(|k| map.contains_key(*k));
        let is_array = map.contains_key("items");

        let shapes = [
            (is_ref, "$ref"),
            (is_object, "object keywords"),
            (is_array, "items"),
            (!compositions.is_empty(), "composition"),
        ];
        let present = shapes.iter().filter(|(on, _)| *on).map(|(_, name)| *name).collect::<Vec<_>>();
        if present.len() > 1 || compositions.len() > 1 {
            let mut names = present;
            names.extend(compositions.iter().map(|k| k.keyword()));
            return Err(SchemaError::shape(pointer, format!("mixes {}", names.join(", "))));
        }

        if is_ref {
            let target = match map.shift_remove("$ref") {
                Some(Value::String(target)) => target,
                _ => return Err(SchemaError::shape(pointer, "'$ref' must be a string")),
            };
            return Ok(Self::Ref(RefNode { target, extra: map }));
        }

        if let Some(kind) = compositions.first().copied() {
            let Some(Value::Array(raw)) = map.shift_remove(kind.keyword()) else {
                return Err(SchemaError::shape(pointer, format!("'{}' must be an array", kind.keyword())));
            };
            let branches = raw
                .into_iter()
                .enumerate()
                .map(|(i, branch)| Self::from_value(branch, &format!("{pointer}/{}/{i}", kind.keyword())))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::Composition(CompositionNode { kind, branches, extra: map }));
        }

        if is_object || type_is(&map, "object") {
            return ObjectNode::from_map(map, pointer).map(Self::Object);
        }

        if is_array || type_is(&map, "array") {
            let items = match map.shift_remove("items") {
                None => None,
                Some(Value::Array(raw)) => Some(Items::Tuple(
                    raw.into_iter()
                        .enumerate()
                        .map(|(i, item)| Self::from_value(item, &format!("{pointer}/items/{i}")))
                        .collect::<Result<Vec<_>, _>>()?,
                )),
                Some(item) => Some(Items::Single(Box::new(Self::from_value(item, &format!("{pointer}/items"))?))),
            };
            return Ok(Self::Array(ArrayNode { items, extra: map }));
        }

        Ok(Self::Scalar(ScalarNode { extra: map }))
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Scalar(scalar) => Value::Object(scalar.extra.clone()),
            Self::Ref(node) => {
                let mut map = node.extra.clone();
                map.insert("$ref".into(), Value::from(node.target.clone()));
                Value::Object(map)
            }
            Self::Composition(node) => {
                let mut map = node.extra.clone();
                map.insert(
                    node.kind.keyword().into(),
                    Value::Array(node.branches.iter().map(Self::to_value).collect()),
                );
                Value::Object(map)
            }
            Self::Array(node) => {
                let mut map = node.extra.clone();
                match &node.items {
                    Some(Items::Single(item)) => {
                        map.insert("items".into(), item.to_value());
                    }
                    Some(Items::Tuple(items)) => {
                        map.insert("items".into(), Value::Array(items.iter().map(Self::to_value).collect()));
                    }
                    None => {}
                }
                Value::Object(map)
            }
            Self::Object(node) => node.to_value(),
        }
    }

    pub fn for_each_object<E>(
        &self,
        pointer: &str,
        f: &mut impl FnMut(&str, &ObjectNode) -> Result<(), E>,
    ) -> Result<(), E> {
        match self {
            Self::Object(obj) => {
                f(pointer, obj)?;
                for (name, child) in &obj.properties {
                    child.for_each_object(&format!("{pointer}/properties/{}", escape_token(name)), f)?;
                }
                if let Some(Additional::Schema(child)) = &obj.additional {
                    child.for_each_object(&format!("{pointer}/additionalProperties"), f)?;
                }
            }
            Self::Array(arr) => match &arr.items {
                Some(Items::Single(item)) => item.for_each_object(&format!("{pointer}/items"), f)?,
                Some(Items::Tuple(items)) => {
                    for (i, item) in items.iter().enumerate() {
                        item.for_each_object(&format!("{pointer}/items/{i}"), f)?;
                    }
                }
                None => {}
            },
            Self::Composition(node) => {
                for (i, branch) in node.branches.iter().enumerate() {
                    branch.for_each_object(&format!("{pointer}/{}/{i}", node.kind.keyword()), f)?;
                }
            }
            Self::Ref(_) | Self::Scalar(_) | Self::Bool(_) => {}
        }
        Ok(())
    }

    /// Pre-order: `f` sees a node before its children, so children are
    /// visited under their (possibly renamed) keys.
    pub fn for_each_object_mut<E>(
        &mut self,
        pointer: &str,
        f: &mut impl FnMut(&str, &mut ObjectNode) -> Result<(), E>,
    ) -> Result<(), E> {
        match self {
            Self::Object(obj) => {
                f(pointer, obj)?;
                for (name, child) in obj.properties.iter_mut() {
                    child.for_each_object_mut(&format!("{pointer}/properties/{}", escape_token(name)), f)?;
                }
                if let Some(Additional::Schema(child)) = &mut obj.additional {
                    child.for_each_object_mut(&format!("{pointer}/additionalProperties"), f)?;
                }
            }
            Self::Array(arr) => match &mut arr.items {
                Some(Items::Single(item)) => item.for_each_object_mut(&format!("{pointer}/items"), f)?,
                Some(Items::Tuple(items)) => {
                    for (i, item) in items.iter_mut().enumerate() {
                        item.for_each_object_mut(&format!("{pointer}/items/{i}"), f)?;
                    }
                }
                None => {}
            },
            Self::Composition(node) => {
                let keyword = node.kind.keyword();
                for (i, branch) in node.branches.iter_mut().enumerate() {
                    branch.for_each_object_mut(&format!("{pointer}/{keyword}/{i}"), f)?;
                }
            }
            Self::Ref(_) | Self::Scalar(_) | Self::Bool(_) => {}
        }
        Ok(())
    }
}

impl ObjectNode {
    fn from_map(mut map: Map<String, Value>, pointer: &str) -> Result<Self, SchemaError> {
        let mut properties = IndexMap::new();
        let properties_declared = map.contains_key("properties");
        match map.shift_remove("properties") {
            None => {}
            Some(Value::Object(raw)) => {
                for (name, node) in raw {
                    let child = format!("{pointer}/properties/{}", escape_token(&name));
                    properties.insert(name, SchemaNode::from_value(node, &child)?);
                }
            }
            Some(_) => return Err(SchemaError::shape(pointer, "'properties' must be an object")),
        }

        let required = match map.shift_remove("required") {
            None => None,
            Some(Value::Array(raw)) => Some(
                raw.into_iter()
                    .map(|name| match name {
                        Value::String(name) => Ok(name),
                        _ => Err(SchemaError::shape(pointer, "'required' must list strings")),
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Some(_) => return Err(SchemaError::shape(pointer, "'required' must be an array")),
        };

        let additional = match map.shift_remove("additionalProperties") {
            None => None,
            Some(Value::Bool(allowed)) => Some(Additional::Allowed(allowed)),
            Some(node) => Some(Additional::Schema(Box::new(SchemaNode::from_value(
                node,
                &format!("{pointer}/additionalProperties"),
            )?))),
        };

        Ok(Self { properties, properties_declared, required, additional, extra: map })
    }

    fn to_value(&self) -> Value {
        let mut map = self.extra.clone();
        if self.properties_declared || !self.properties.is_empty() {
            let properties = self
                .properties
                .iter()
                .map(|(name, node)| (name.clone(), node.to_value()))
                .collect::<Map<_, _>>();
            map.insert("properties".into(), Value::Object(properties));
        }
        if let Some(required) = &self.required {
            map.insert(
                "required".into(),
                Value::Array(required.iter().cloned().map(Value::from).collect()),
            );
        }
        match &self.additional {
            Some(Additional::Allowed(allowed)) => {
                map.insert("additionalProperties".into(), Value::Bool(*allowed));
            }
            Some(Additional::Schema(node)) => {
                map.insert("additionalProperties".into(), node.to_value());
            }
            None => {}
        }
        Value::Object(map)
    }

    /// Rename a property in place, keeping its position and rewriting the
    /// matching `required` entry at the same index.
    /// Refuses (returns `false`) when `to` is already taken.
    pub fn rename_property(&mut self, from: &str, to: String) -> bool {
        if self.properties.contains_key(&to) {
            return false;
        }
        let Some(index) = self.properties.get_index_of(from) else {
            return false;
        };
        let Some((_, node)) = self.properties.shift_remove_index(index) else {
            return false;
        };
        let (new_index, _) = self.properties.insert_full(to.clone(), node);
        self.properties.move_index(new_index, index);
        if let Some(required) = &mut self.required {
            for name in required.iter_mut().filter(|name| name.as_str() == from) {
                *name = to.clone();
            }
        }
        true
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn type_is(map: &Map<String, Value>, ty: &str) -> bool {
    map.get("type").and_then(Value::as_str) == Some(ty)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// RFC 6901 reference-token escaping.
pub fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

pub fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
