//! Extraction schemas offered to the backend as tools.
//!
//! The backend does not know an image's modality up front, so every
//! registered schema is offered at once and the backend picks the one that
//! fits. Each schema name maps to exactly one [`Modality`]; the mapping is
//! checked when the registry is built.

use crate::error::SchemaError;
use llm::ToolDefinition;
use schemars::schema::{
    InstanceType, Metadata, ObjectValidation, RootSchema, Schema, SchemaObject,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const DIAGRAM_SCHEMA: &str = "get_research_diagram_info";
pub const GRAPH_SCHEMA: &str = "get_research_graph_info";

/// Category of visual content an image carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Diagram,
    Graph,
}

impl Modality {
    /// Stable tag stored on records and index metadata
    pub fn tag(&self) -> &'static str {
        match self {
            Modality::Diagram => "diagram",
            Modality::Graph => "graph",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSchema {
    /// Tool name the backend selects
    pub name: String,
    pub version: u32,
    pub description: String,
    pub modality: Modality,
    pub fields: Vec<FieldSpec>,
}

impl ExtractionSchema {
    pub fn new(
        name: impl Into<String>,
        version: u32,
        description: impl Into<String>,
        modality: Modality,
        fields: Vec<FieldSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            description: description.into(),
            modality,
            fields,
        }
    }

    /// Build a schema from a property list plus a separate required list,
    /// the shape JSON Schema uses. Every required name must be a property.
    pub fn from_parts(
        name: impl Into<String>,
        version: u32,
        description: impl Into<String>,
        modality: Modality,
        properties: &[(&str, &str)],
        required: &[&str],
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        if let Some(field) = required
            .iter()
            .find(|r| !properties.iter().any(|(p, _)| p == *r))
        {
            return Err(SchemaError::RequiredNotDeclared {
                schema: name,
                field: field.to_string(),
            });
        }

        let fields = properties
            .iter()
            .map(|(p, d)| FieldSpec {
                name: p.to_string(),
                description: d.to_string(),
                required: required.contains(p),
            })
            .collect();

        Ok(Self::new(name, version, description, modality, fields))
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if self.fields.is_empty() {
            return Err(SchemaError::NoFields {
                schema: self.name.clone(),
            });
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    schema: self.name.clone(),
                    field: field.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// JSON Schema object with one string property per field
    pub fn input_schema(&self) -> RootSchema {
        let mut object = ObjectValidation::default();
        for field in &self.fields {
            let property = SchemaObject {
                instance_type: Some(InstanceType::String.into()),
                metadata: Some(Box::new(Metadata {
                    description: Some(field.description.clone()),
                    ..Default::default()
                })),
                ..Default::default()
            };
            object
                .properties
                .insert(field.name.clone(), Schema::Object(property));
            if field.required {
                object.required.insert(field.name.clone());
            }
        }

        RootSchema {
            meta_schema: None,
            schema: SchemaObject {
                instance_type: Some(InstanceType::Object.into()),
                object: Some(Box::new(object)),
                ..Default::default()
            },
            definitions: Default::default(),
        }
    }

    pub fn to_tool_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: Some(self.description.clone()),
            input_schema: self.input_schema(),
        }
    }
}

/// Immutable, validated set of extraction schemas.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: Vec<ExtractionSchema>,
    by_name: HashMap<String, usize>,
}

impl SchemaRegistry {
    pub fn new(schemas: Vec<ExtractionSchema>) -> Result<Self, SchemaError> {
        if schemas.is_empty() {
            return Err(SchemaError::EmptyRegistry);
        }

        let mut by_name = HashMap::new();
        let mut by_modality: HashMap<Modality, &str> = HashMap::new();
        for (index, schema) in schemas.iter().enumerate() {
            schema.validate()?;
            if by_name.insert(schema.name.clone(), index).is_some() {
                return Err(SchemaError::DuplicateSchema {
                    schema: schema.name.clone(),
                });
            }
            if let Some(first) = by_modality.insert(schema.modality, schema.name.as_str()) {
                return Err(SchemaError::DuplicateModality {
                    modality: schema.modality,
                    first: first.to_string(),
                    second: schema.name.clone(),
                });
            }
        }

        Ok(Self { schemas, by_name })
    }

    /// Diagram and graph schemas for research figures
    pub fn research() -> Result<Self, SchemaError> {
        let common = [
            ("title", "Title of the image"),
            ("legend", "Legend of the image"),
            ("description", "Detailed description of what the image shows"),
            ("keywords", "Comma separated keywords describing the image"),
        ];

        let diagram = ExtractionSchema::new(
            DIAGRAM_SCHEMA,
            1,
            "Extract information from a research diagram, flowchart or architecture figure",
            Modality::Diagram,
            common
                .iter()
                .map(|(name, desc)| FieldSpec::required(*name, *desc))
                .collect(),
        );

        let mut graph_fields: Vec<FieldSpec> = common
            .iter()
            .map(|(name, desc)| FieldSpec::required(*name, *desc))
            .collect();
        graph_fields.extend([
            FieldSpec::required("trend", "Overall trend the data shows"),
            FieldSpec::required("x-axis", "Label and unit of the x-axis"),
            FieldSpec::required("y-axis", "Label and unit of the y-axis"),
        ]);
        let graph = ExtractionSchema::new(
            GRAPH_SCHEMA,
            1,
            "Extract information from a research graph or chart plotting data",
            Modality::Graph,
            graph_fields,
        );

        Self::new(vec![diagram, graph])
    }

    /// Schemas in registration order
    pub fn schemas(&self) -> &[ExtractionSchema] {
        &self.schemas
    }

    pub fn get(&self, name: &str) -> Option<&ExtractionSchema> {
        self.by_name.get(name).map(|&index| &self.schemas[index])
    }

    pub fn modality_of(&self, name: &str) -> Option<Modality> {
        self.get(name).map(|s| s.modality)
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.schemas
            .iter()
            .map(ExtractionSchema::to_tool_definition)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_research_registry() {
        let registry = SchemaRegistry::research().unwrap();
        assert_eq!(registry.len(), 2);

        let names: Vec<_> = registry.schemas().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![DIAGRAM_SCHEMA, GRAPH_SCHEMA]);

        assert_eq!(registry.modality_of(DIAGRAM_SCHEMA), Some(Modality::Diagram));
        assert_eq!(registry.modality_of(GRAPH_SCHEMA), Some(Modality::Graph));
        assert_eq!(registry.modality_of("get_photo_info"), None);
    }

    #[test]
    fn test_diagram_requires_title_not_typo() {
        let registry = SchemaRegistry::research().unwrap();
        let diagram = registry.get(DIAGRAM_SCHEMA).unwrap();
        let required: Vec<_> = diagram.required_fields().collect();
        assert_eq!(required, vec!["title", "legend", "description", "keywords"]);
    }

    #[test]
    fn test_graph_fields() {
        let registry = SchemaRegistry::research().unwrap();
        let graph = registry.get(GRAPH_SCHEMA).unwrap();
        let required: Vec<_> = graph.required_fields().collect();
        assert_eq!(
            required,
            vec!["title", "legend", "description", "keywords", "trend", "x-axis", "y-axis"]
        );
    }

    #[test]
    fn test_required_must_be_declared() {
        let result = ExtractionSchema::from_parts(
            DIAGRAM_SCHEMA,
            1,
            "diagram",
            Modality::Diagram,
            &[("title", "t"), ("legend", "l")],
            &["titke", "legend"],
        );
        assert_eq!(
            result.unwrap_err(),
            SchemaError::RequiredNotDeclared {
                schema: DIAGRAM_SCHEMA.to_string(),
                field: "titke".to_string(),
            }
        );
    }

    #[test]
    fn test_from_parts_marks_required() {
        let schema = ExtractionSchema::from_parts(
            "get_photo_info",
            2,
            "photo",
            Modality::Diagram,
            &[("title", "t"), ("caption", "c")],
            &["title"],
        )
        .unwrap();
        assert!(schema.field("title").unwrap().required);
        assert!(!schema.field("caption").unwrap().required);
        assert_eq!(schema.version, 2);
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let schema = ExtractionSchema::new(
            "dup",
            1,
            "d",
            Modality::Diagram,
            vec![FieldSpec::required("title", "a"), FieldSpec::optional("title", "b")],
        );
        assert!(matches!(
            SchemaRegistry::new(vec![schema]),
            Err(SchemaError::DuplicateField { .. })
        ));
    }

    #[test]
    fn test_empty_schema_rejected() {
        let schema = ExtractionSchema::new("empty", 1, "e", Modality::Graph, vec![]);
        assert!(matches!(
            SchemaRegistry::new(vec![schema]),
            Err(SchemaError::NoFields { .. })
        ));
        assert_eq!(SchemaRegistry::new(vec![]).unwrap_err(), SchemaError::EmptyRegistry);
    }

    #[test]
    fn test_duplicate_name_and_modality_rejected() {
        let a = ExtractionSchema::new(
            "a",
            1,
            "a",
            Modality::Graph,
            vec![FieldSpec::required("title", "t")],
        );
        let mut b = a.clone();
        assert!(matches!(
            SchemaRegistry::new(vec![a.clone(), b.clone()]),
            Err(SchemaError::DuplicateSchema { .. })
        ));

        b.name = "b".to_string();
        assert_eq!(
            SchemaRegistry::new(vec![a, b]).unwrap_err(),
            SchemaError::DuplicateModality {
                modality: Modality::Graph,
                first: "a".to_string(),
                second: "b".to_string(),
            }
        );
    }

    #[test]
    fn test_tool_definition_json() {
        let registry = SchemaRegistry::research().unwrap();
        let tools = registry.tool_definitions();
        assert_eq!(tools.len(), 2);

        let json = serde_json::to_value(&tools[1].input_schema).unwrap();
        assert_eq!(json["type"], "object");
        assert_eq!(json["properties"]["trend"]["type"], "string");
        let required: Vec<_> = json["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required.len(), 7);
        assert!(required.contains(&"x-axis"));
    }
}
