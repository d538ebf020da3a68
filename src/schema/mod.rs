//! Stream schemas
//!
//! Every export stream shares one schema. Its top-level properties double
//! as the field list requested from the export API, and records are
//! normalised against it before they are written.

mod fields;
mod transform;
mod types;

pub use fields::{EmbeddedSchemas, FieldSource, JsonSchemaFields, BRANCH_EVENTS_SCHEMA_PATH};
pub use transform::{RecordTransformer, SchemaTransformer};
pub use types::{JsonSchema, JsonType, JsonTypeOrArray, SchemaProperty};
