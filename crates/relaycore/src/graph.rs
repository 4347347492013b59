use crate::{NodeRecord, NodeSpec, StructuralError};
use std::collections::HashMap;

/// Node type that marks ingestion (head) nodes in the reference deployment.
pub const DEFAULT_INGEST_KIND: &str = "device-in";

/// Immutable, pre-parsed view of a flow definition: node records, wiring,
/// identified entry nodes and terminal nodes.
///
/// Wire targets are not resolved here. A `wires` entry pointing at a missing
/// id is a traversal-time lookup failure for that branch, not a parse error,
/// and cycles are likewise a runtime concern.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    nodes: HashMap<String, NodeSpec>,
    heads: Vec<String>,
    tails: Vec<String>,
}

impl FlowGraph {
    /// Build a graph from raw definition records.
    ///
    /// `tab` containers and records without a `wires` field are not
    /// processing nodes and are skipped. A record that does carry wires but
    /// is missing its id or type aborts parsing; partial graphs are never
    /// returned.
    pub fn parse(records: &[NodeRecord], ingest_kind: &str) -> Result<Self, StructuralError> {
        let mut nodes = HashMap::new();
        let mut heads = Vec::new();
        let mut tails = Vec::new();

        for (index, record) in records.iter().enumerate() {
            if record.kind.as_deref() == Some("tab") {
                continue;
            }
            let Some(wires) = record.wires.clone() else {
                continue;
            };

            let id = record
                .id
                .clone()
                .ok_or(StructuralError::MissingId { index })?;
            let kind = record
                .kind
                .clone()
                .ok_or_else(|| StructuralError::MissingKind { id: id.clone() })?;

            if nodes.contains_key(&id) {
                return Err(StructuralError::DuplicateId { id });
            }

            if kind == ingest_kind {
                heads.push(id.clone());
            }
            if wires.is_empty() {
                tails.push(id.clone());
            }

            let spec = NodeSpec {
                id: id.clone(),
                kind,
                wires,
                config: record.config.clone(),
            };
            nodes.insert(id, spec);
        }

        tracing::debug!(
            nodes = nodes.len(),
            heads = heads.len(),
            tails = tails.len(),
            "parsed flow graph"
        );

        Ok(Self {
            nodes,
            heads,
            tails,
        })
    }

    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.get(id)
    }

    /// Entry-point node ids, in definition order.
    pub fn heads(&self) -> &[String] {
        &self.heads
    }

    /// Terminal node ids, in definition order.
    pub fn tails(&self) -> &[String] {
        &self.tails
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeSpec> {
        self.nodes.values()
    }
}
