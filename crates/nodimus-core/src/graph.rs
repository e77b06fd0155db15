//! Knowledge Graph Export
//!
//! Writes entities and relationships as a schema.org JSON-LD document. Only
//! the repository's read API is used.

use std::path::Path;

use serde_json::{json, Value};

use crate::memory::{Entity, Relationship};
use crate::storage::{Repository, Result};

/// File name of the exported graph inside the data directory
pub const GRAPH_FILE: &str = "knowledge-graph.jsonld";

/// Read surface needed to export the graph
pub trait GraphSource {
    fn get_entities(&self) -> Result<Vec<Entity>>;
    fn get_relationships(&self) -> Result<Vec<Relationship>>;
}

impl GraphSource for Repository {
    fn get_entities(&self) -> Result<Vec<Entity>> {
        Repository::get_entities(self)
    }

    fn get_relationships(&self) -> Result<Vec<Relationship>> {
        Repository::get_relationships(self)
    }
}

/// Build the JSON-LD document: entity nodes first, then relationship nodes
pub fn build_graph(entities: &[Entity], relationships: &[Relationship]) -> Value {
    let mut nodes: Vec<Value> = Vec::with_capacity(entities.len() + relationships.len());

    for entity in entities {
        nodes.push(json!({
            "@type": "Thing",
            "@id": entity.id,
            "name": entity.name,
            "type": entity.entity_type,
        }));
    }

    for rel in relationships {
        nodes.push(json!({
            "@type": "Relationship",
            "@id": rel.id,
            "source": rel.source_id,
            "target": rel.target_id,
            "relationshipType": rel.relationship_type,
        }));
    }

    json!({
        "@context": "https://schema.org/",
        "@graph": nodes,
    })
}

/// Export the graph from `source` to `path`
///
/// The document is written to a sibling temp file and renamed, so readers
/// never see a half-written graph. Returns the number of graph nodes.
pub fn generate<S: GraphSource + ?Sized>(source: &S, path: &Path) -> Result<usize> {
    let entities = source.get_entities()?;
    let relationships = source.get_relationships()?;
    let graph = build_graph(&entities, &relationships);

    let tmp = path.with_extension("jsonld.tmp");

    let mut body = serde_json::to_vec_pretty(&graph)?;
    body.push(b'\n');
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)?;

    tracing::debug!(
        path = %path.display(),
        entities = entities.len(),
        relationships = relationships.len(),
        "Knowledge graph written"
    );
    Ok(entities.len() + relationships.len())
}
