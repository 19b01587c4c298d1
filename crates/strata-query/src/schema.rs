//! Queryable field declarations per entity

use serde::{Deserialize, Serialize};

/// Scalar type of a field (or of a collection's elements / a map's values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
}

impl FieldType {
    /// Whether ordering operators apply
    pub fn is_ordinal(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float | FieldType::Date)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldShape {
    Scalar,
    /// Any-match: a criterion holds when at least one element satisfies it
    Collection,
    /// String-keyed values, addressed as `field.key`
    Map,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
    pub shape: FieldShape,
    /// Text equality and membership ignore case
    #[serde(default)]
    pub case_insensitive: bool,
}

impl FieldDef {
    pub fn scalar(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            shape: FieldShape::Scalar,
            case_insensitive: false,
        }
    }

    pub fn collection(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            shape: FieldShape::Collection,
            ..Self::scalar(name, ty)
        }
    }

    pub fn map(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            shape: FieldShape::Map,
            ..Self::scalar(name, ty)
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }
}

/// Fields one entity exposes to filtering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Entity (table / collection) name
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Resolve a field path to its definition and optional map key.
    ///
    /// An exact field name wins over a `field.key` split, so field names may
    /// themselves contain dots.
    pub fn resolve<'s, 'p>(&'s self, path: &'p str) -> Option<(&'s FieldDef, Option<&'p str>)> {
        if let Some(field) = self.get(path) {
            return Some((field, None));
        }

        let (name, key) = path.split_once('.')?;
        let field = self.get(name)?;
        if field.shape != FieldShape::Map || key.is_empty() {
            return None;
        }
        Some((field, Some(key)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn schema() -> EntitySchema {
        EntitySchema::new("samples")
            .field(FieldDef::scalar("barcode", FieldType::Text).case_insensitive())
            .field(FieldDef::scalar("age", FieldType::Integer))
            .field(FieldDef::collection("tags", FieldType::Text))
            .field(FieldDef::map("attributes", FieldType::Text))
            .field(FieldDef::scalar("qc.score", FieldType::Float))
    }

    #[test]
    fn test_resolve_plain_and_map_paths() {
        let schema = schema();
        let (field, key) = schema.resolve("age").unwrap();
        assert_eq!(field.ty, FieldType::Integer);
        assert!(key.is_none());

        let (field, key) = schema.resolve("attributes.tissue").unwrap();
        assert_eq!(field.name, "attributes");
        assert_eq!(key, Some("tissue"));

        // dotted field names take precedence over map keys
        let (field, key) = schema.resolve("qc.score").unwrap();
        assert_eq!(field.name, "qc.score");
        assert!(key.is_none());
    }

    #[test]
    fn test_resolve_rejects_keys_on_non_map_fields() {
        let schema = schema();
        assert!(schema.resolve("age.years").is_none());
        assert!(schema.resolve("attributes.").is_none());
        assert!(schema.resolve("weight").is_none());
    }
}
