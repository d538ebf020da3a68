//! Loading stream schemas and their field names

use super::types::JsonSchema;
use crate::error::{Error, Result, ResultExt};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Schema shared by every export stream
pub const BRANCH_EVENTS_SCHEMA_PATH: &str = "shared/branch_events.json";

/// Source of stream schemas, addressed by relative path
pub trait FieldSource: Send + Sync {
    /// Load the schema document at `schema_path`
    fn load_schema(&self, schema_path: &str) -> Result<JsonSchema>;

    /// Top-level property names of the schema at `schema_path`
    fn load_field_names(&self, schema_path: &str) -> Result<BTreeSet<String>> {
        Ok(self.load_schema(schema_path)?.field_names())
    }
}

/// Reads schema files from a directory on disk
#[derive(Debug, Clone)]
pub struct JsonSchemaFields {
    root: PathBuf,
}

impl JsonSchemaFields {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FieldSource for JsonSchemaFields {
    fn load_schema(&self, schema_path: &str) -> Result<JsonSchema> {
        let path = self.root.join(schema_path);
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read schema {}", path.display()))?;
        parse_schema(schema_path, &contents)
    }
}

/// Schemas compiled into the binary
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedSchemas;

impl EmbeddedSchemas {
    fn contents(schema_path: &str) -> Option<&'static str> {
        match schema_path {
            BRANCH_EVENTS_SCHEMA_PATH => Some(include_str!("../../schemas/shared/branch_events.json")),
            "app_config.json" => Some(include_str!("../../schemas/app_config.json")),
            "deeplink.json" => Some(include_str!("../../schemas/deeplink.json")),
            _ => None,
        }
    }
}

impl FieldSource for EmbeddedSchemas {
    fn load_schema(&self, schema_path: &str) -> Result<JsonSchema> {
        let contents = Self::contents(schema_path).ok_or_else(|| Error::FileNotFound {
            path: schema_path.to_string(),
        })?;
        parse_schema(schema_path, contents)
    }
}

fn parse_schema(schema_path: &str, contents: &str) -> Result<JsonSchema> {
    serde_json::from_str(contents)
        .map_err(|e| Error::schema(format!("Invalid schema {schema_path}: {e}")))
}
