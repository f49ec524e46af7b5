use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "pathix";
const CONFIG_FILE: &str = "schema.json";

/// Logical role of an indexed field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    Uri,
    Document,
    Path,
    #[serde(rename = "elt_qname")]
    EltQName,
    #[serde(rename = "att_qname")]
    AttQName,
    ElementText,
    AttributeText,
    FullText,
    PathValue,
}

impl FieldRole {
    pub const ALL: [FieldRole; 9] = [
        FieldRole::Uri,
        FieldRole::Document,
        FieldRole::Path,
        FieldRole::EltQName,
        FieldRole::AttQName,
        FieldRole::ElementText,
        FieldRole::AttributeText,
        FieldRole::FullText,
        FieldRole::PathValue,
    ];

    pub fn default_name(self) -> &'static str {
        match self {
            FieldRole::Uri => "px_uri",
            FieldRole::Document => "px_xml",
            FieldRole::Path => "px_path",
            FieldRole::EltQName => "px_elt_name",
            FieldRole::AttQName => "px_att_name",
            FieldRole::ElementText => "px_elt_text",
            FieldRole::AttributeText => "px_att_text",
            FieldRole::FullText => "px_text",
            FieldRole::PathValue => "px_path_value",
        }
    }

    pub fn field_type(self) -> FieldType {
        match self {
            FieldRole::Document => FieldType::Bytes,
            FieldRole::Path | FieldRole::FullText | FieldRole::PathValue => FieldType::Tokens,
            _ => FieldType::String,
        }
    }
}

/// Physical type of field values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    String,
    Int,
    Bytes,
    Tokens,
}

/// A field declared in configuration, fed from one element or attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

/// Index schema configuration loaded from `schema.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfiguration {
    /// Rewrite queries to use the index at all
    #[serde(default = "default_indexing_enabled")]
    pub indexing_enabled: bool,

    /// Roles that get a field
    #[serde(default = "default_roles")]
    pub roles: BTreeSet<FieldRole>,

    /// Field name overrides per role
    #[serde(default)]
    pub field_names: BTreeMap<FieldRole, String>,

    /// Slop used for spans after a descendant step
    #[serde(default = "default_max_path_depth")]
    pub max_path_depth: u32,

    #[serde(default)]
    pub fields: Vec<DeclaredField>,
}

fn default_indexing_enabled() -> bool {
    true
}

fn default_roles() -> BTreeSet<FieldRole> {
    // qname fields are redundant with the path field and off unless asked for
    [
        FieldRole::Uri,
        FieldRole::Document,
        FieldRole::Path,
        FieldRole::ElementText,
        FieldRole::AttributeText,
        FieldRole::FullText,
    ]
    .into_iter()
    .collect()
}

fn default_max_path_depth() -> u32 {
    255
}

impl Default for IndexConfiguration {
    fn default() -> Self {
        Self {
            indexing_enabled: default_indexing_enabled(),
            roles: default_roles(),
            field_names: BTreeMap::new(),
            max_path_depth: default_max_path_depth(),
            fields: Vec::new(),
        }
    }
}

impl IndexConfiguration {
    /// Load from an explicit file, else the user config file, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match get_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read schema file {}", path.display()))?;
        let config: IndexConfiguration = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse schema file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize schema")?;
        fs::write(path, content).context("Failed to write schema file")?;
        Ok(())
    }

    /// Enable a role, builder style
    pub fn with_role(mut self, role: FieldRole) -> Self {
        self.roles.insert(role);
        self
    }

    pub fn without_role(mut self, role: FieldRole) -> Self {
        self.roles.remove(&role);
        self
    }

    pub fn with_field(mut self, field: DeclaredField) -> Self {
        self.fields.push(field);
        self
    }
}

/// Get the path to the user schema file
pub fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = IndexConfiguration::default();
        assert!(config.indexing_enabled);
        assert_eq!(config.max_path_depth, 255);
        assert!(config.roles.contains(&FieldRole::Path));
        assert!(!config.roles.contains(&FieldRole::EltQName));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schema.json");
        fs::write(
            &path,
            r#"{
                "max_path_depth": 40,
                "field_names": { "path": "lux_path" },
                "fields": [ { "name": "year", "type": "int", "element": "year" } ]
            }"#,
        )
        .unwrap();

        let config = IndexConfiguration::load(Some(&path)).unwrap();
        assert_eq!(config.max_path_depth, 40);
        assert!(config.indexing_enabled);
        assert_eq!(config.field_names.get(&FieldRole::Path).map(String::as_str), Some("lux_path"));
        assert_eq!(config.fields[0].field_type, FieldType::Int);
        assert_eq!(config.roles, default_roles());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("schema.json");
        let config = IndexConfiguration::default()
            .with_role(FieldRole::EltQName)
            .without_role(FieldRole::FullText);
        config.save(&path).unwrap();
        assert_eq!(IndexConfiguration::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schema.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(IndexConfiguration::load(Some(&path)).is_err());
        assert!(IndexConfiguration::load(Some(&dir.path().join("missing.json"))).is_err());
    }
}
