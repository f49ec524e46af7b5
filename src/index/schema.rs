use super::config::{FieldRole, IndexConfiguration};
use super::field::FieldDefinition;
use crate::query::parser::is_field_char;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("no field is configured for role {0:?}")]
    UnresolvedRole(FieldRole),

    #[error("duplicate field name: {0}")]
    DuplicateField(String),

    #[error("invalid field {name}: {reason}")]
    InvalidField { name: String, reason: String },
}

/// Resolved, immutable field layout shared by the optimizer and the
/// extraction pipeline
#[derive(Debug, Clone)]
pub struct IndexSchema {
    indexing_enabled: bool,
    max_path_depth: u32,
    fields: Vec<FieldDefinition>,
    by_role: BTreeMap<FieldRole, usize>,
    by_name: FxHashMap<String, usize>,
}

impl IndexSchema {
    pub fn from_config(config: &IndexConfiguration) -> Result<Self, SchemaError> {
        let mut schema = Self {
            indexing_enabled: config.indexing_enabled,
            max_path_depth: config.max_path_depth,
            fields: Vec::new(),
            by_role: BTreeMap::new(),
            by_name: FxHashMap::default(),
        };

        for role in FieldRole::ALL {
            if !config.roles.contains(&role) {
                continue;
            }
            let name = config
                .field_names
                .get(&role)
                .cloned()
                .unwrap_or_else(|| role.default_name().to_string());
            let index = schema.push(FieldDefinition::for_role(role, name))?;
            schema.by_role.insert(role, index);
        }
        for declared in &config.fields {
            schema.push(FieldDefinition::declared(declared)?)?;
        }

        Ok(schema)
    }

    fn push(&mut self, field: FieldDefinition) -> Result<usize, SchemaError> {
        if field.name.is_empty() || !field.name.chars().all(is_field_char) {
            return Err(SchemaError::InvalidField {
                name: field.name,
                reason: "names use letters, digits, `_`, `-` and `.` only".into(),
            });
        }
        if self.by_name.contains_key(&field.name) {
            return Err(SchemaError::DuplicateField(field.name));
        }
        let index = self.fields.len();
        self.by_name.insert(field.name.clone(), index);
        self.fields.push(field);
        Ok(index)
    }

    /// Physical field name for a role, if the role is indexed
    pub fn resolve(&self, role: FieldRole) -> Option<&str> {
        self.definition(role).map(|field| field.name.as_str())
    }

    pub fn require(&self, role: FieldRole) -> Result<&str, SchemaError> {
        self.resolve(role).ok_or(SchemaError::UnresolvedRole(role))
    }

    pub fn definition(&self, role: FieldRole) -> Option<&FieldDefinition> {
        self.by_role.get(&role).map(|&index| &self.fields[index])
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.by_name.get(name).map(|&index| &self.fields[index])
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn max_path_depth(&self) -> u32 {
        self.max_path_depth
    }

    pub fn is_indexing_enabled(&self) -> bool {
        self.indexing_enabled
    }
}

impl Default for IndexSchema {
    fn default() -> Self {
        Self::from_config(&IndexConfiguration::default())
            .unwrap_or_else(|_| unreachable!("default roles use distinct names"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::config::{DeclaredField, FieldType};

    #[test]
    fn test_default_resolution() {
        let schema = IndexSchema::default();
        assert_eq!(schema.resolve(FieldRole::Path), Some("px_path"));
        assert_eq!(schema.resolve(FieldRole::EltQName), None);
        assert_eq!(
            schema.require(FieldRole::AttQName),
            Err(SchemaError::UnresolvedRole(FieldRole::AttQName))
        );
        assert_eq!(schema.field("px_elt_text").and_then(|f| f.role), Some(FieldRole::ElementText));
    }

    #[test]
    fn test_overrides_and_declared_fields() {
        let mut config = IndexConfiguration::default().with_field(DeclaredField {
            name: "title".into(),
            field_type: FieldType::String,
            element: Some("title".into()),
            attribute: None,
        });
        config.field_names.insert(FieldRole::Path, "lux_path".into());
        let schema = IndexSchema::from_config(&config).unwrap();
        assert_eq!(schema.require(FieldRole::Path), Ok("lux_path"));
        assert!(schema.field("title").is_some_and(|f| f.role.is_none()));
        assert!(schema.field("px_path").is_none());
    }

    #[test]
    fn test_names_outside_query_syntax_rejected() {
        let config = IndexConfiguration::default().with_field(DeclaredField {
            name: "dc:title".into(),
            field_type: FieldType::String,
            element: Some("dc:title".into()),
            attribute: None,
        });
        assert!(matches!(
            IndexSchema::from_config(&config),
            Err(SchemaError::InvalidField { name, .. }) if name == "dc:title"
        ));

        let mut config = IndexConfiguration::default();
        config.field_names.insert(FieldRole::Path, "px path".into());
        assert!(matches!(
            IndexSchema::from_config(&config),
            Err(SchemaError::InvalidField { name, .. }) if name == "px path"
        ));

        let mut config = IndexConfiguration::default();
        config.field_names.insert(FieldRole::Path, String::new());
        assert!(IndexSchema::from_config(&config).is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let config = IndexConfiguration::default().with_field(DeclaredField {
            name: "px_path".into(),
            field_type: FieldType::String,
            element: Some("p".into()),
            attribute: None,
        });
        assert_eq!(
            IndexSchema::from_config(&config).unwrap_err(),
            SchemaError::DuplicateField("px_path".into())
        );
    }
}
