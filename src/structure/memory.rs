//! In-memory property graph.
//!
//! Immutable after `build()`, so it is safe to share across threads without
//! locking. Adjacency is precomputed per vertex in edge insertion order.
//! Reads return iterators holding a reference count on the graph data, so
//! neighbours are produced one at a time as the caller pulls.

use crate::bytecode::Value;
use crate::error::{MachineError, Result};
use crate::structure::{Direction, Structure, ValueIter};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct VertexRecord {
    label: String,
    properties: BTreeMap<String, Value>,
}

#[derive(Debug, Clone)]
struct EdgeRecord {
    label: String,
    out_v: i64,
    in_v: i64,
}

#[derive(Debug)]
struct GraphData {
    vertices: BTreeMap<i64, VertexRecord>,
    /// Vertex ids in ascending order.
    ids: Vec<i64>,
    edges: Vec<EdgeRecord>,
    out_adj: HashMap<i64, Vec<usize>>,
    in_adj: HashMap<i64, Vec<usize>>,
}

/// Read-only in-memory graph. Clones share the same data.
#[derive(Debug, Clone)]
pub struct MemoryGraph {
    name: String,
    data: Arc<GraphData>,
}

/// Neighbours of one vertex along one edge direction.
struct AdjacentIter {
    data: Arc<GraphData>,
    vertex: i64,
    outgoing: bool,
    labels: Vec<String>,
    pos: usize,
}

impl Iterator for AdjacentIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let index = if self.outgoing {
            &self.data.out_adj
        } else {
            &self.data.in_adj
        };
        let edge_ids = index.get(&self.vertex)?;
        loop {
            let idx = *edge_ids.get(self.pos)?;
            self.pos += 1;
            let edge = &self.data.edges[idx];
            if !self.labels.is_empty() && !self.labels.iter().any(|l| *l == edge.label) {
                continue;
            }
            let other = if self.outgoing { edge.in_v } else { edge.out_v };
            return Some(Value::Vertex(other));
        }
    }
}

/// Builder for [`MemoryGraph`].
#[derive(Debug, Default)]
pub struct MemoryGraphBuilder {
    name: String,
    vertices: BTreeMap<i64, VertexRecord>,
    edges: Vec<EdgeRecord>,
}

impl MemoryGraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn vertex(
        mut self,
        id: i64,
        label: &str,
        properties: impl IntoIterator<Item = (&'static str, Value)>,
    ) -> Self {
        self.vertices.insert(
            id,
            VertexRecord {
                label: label.to_string(),
                properties: properties
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            },
        );
        self
    }

    pub fn edge(mut self, out_v: i64, label: &str, in_v: i64) -> Self {
        self.edges.push(EdgeRecord {
            label: label.to_string(),
            out_v,
            in_v,
        });
        self
    }

    /// Finish the graph. Edges must connect existing vertices.
    pub fn build(self) -> Result<MemoryGraph> {
        let mut out_adj: HashMap<i64, Vec<usize>> = HashMap::new();
        let mut in_adj: HashMap<i64, Vec<usize>> = HashMap::new();
        for (idx, edge) in self.edges.iter().enumerate() {
            for endpoint in [edge.out_v, edge.in_v] {
                if !self.vertices.contains_key(&endpoint) {
                    return Err(MachineError::Structure(format!(
                        "edge {} references unknown vertex {}",
                        idx, endpoint
                    )));
                }
            }
            out_adj.entry(edge.out_v).or_default().push(idx);
            in_adj.entry(edge.in_v).or_default().push(idx);
        }
        let ids = self.vertices.keys().copied().collect();
        Ok(MemoryGraph {
            name: self.name,
            data: Arc::new(GraphData {
                vertices: self.vertices,
                ids,
                edges: self.edges,
                out_adj,
                in_adj,
            }),
        })
    }
}

impl MemoryGraph {
    pub fn builder(name: impl Into<String>) -> MemoryGraphBuilder {
        MemoryGraphBuilder::new(name)
    }

    /// The six-vertex "modern" social/software graph.
    ///
    /// Degrees under `both`: 1→3, 2→1, 3→3, 4→3, 5→1, 6→1, so a two-hop
    /// `both().both()` expansion from every vertex yields 30 traversers.
    pub fn modern() -> Self {
        let person = |name: &str, age: i64| {
            vec![("name", Value::from(name)), ("age", Value::Int(age))]
        };
        let software = |name: &str, lang: &str| {
            vec![("name", Value::from(name)), ("lang", Value::from(lang))]
        };
        let built = MemoryGraph::builder("modern")
            .vertex(1, "person", person("marko", 29))
            .vertex(2, "person", person("vadas", 27))
            .vertex(3, "software", software("lop", "java"))
            .vertex(4, "person", person("josh", 32))
            .vertex(5, "software", software("ripple", "java"))
            .vertex(6, "person", person("peter", 35))
            .edge(1, "knows", 2)
            .edge(1, "knows", 4)
            .edge(1, "created", 3)
            .edge(4, "created", 5)
            .edge(4, "created", 3)
            .edge(6, "created", 3)
            .build();
        match built {
            Ok(graph) => graph,
            Err(e) => unreachable!("modern fixture is well-formed: {}", e),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.data.ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.data.edges.len()
    }

    fn vertex_id(&self, value: &Value) -> Result<i64> {
        match value {
            Value::Vertex(id) if self.data.vertices.contains_key(id) => Ok(*id),
            Value::Vertex(id) => Err(MachineError::Structure(format!(
                "vertex {} does not exist in '{}'",
                id, self.name
            ))),
            other => Err(MachineError::Structure(format!(
                "expected a vertex, got {}",
                other.type_name()
            ))),
        }
    }

    fn neighbours(&self, vertex: i64, outgoing: bool, labels: &[String]) -> AdjacentIter {
        AdjacentIter {
            data: Arc::clone(&self.data),
            vertex,
            outgoing,
            labels: labels.to_vec(),
            pos: 0,
        }
    }
}

impl Structure for MemoryGraph {
    fn name(&self) -> &str {
        &self.name
    }

    fn vertices(&self) -> Result<ValueIter> {
        let data = Arc::clone(&self.data);
        let count = data.ids.len();
        Ok(Box::new((0..count).map(move |i| Value::Vertex(data.ids[i]))))
    }

    fn adjacent(
        &self,
        vertex: &Value,
        direction: Direction,
        labels: &[String],
    ) -> Result<ValueIter> {
        let id = self.vertex_id(vertex)?;
        let neighbours: ValueIter = match direction {
            Direction::Out => Box::new(self.neighbours(id, true, labels)),
            Direction::In => Box::new(self.neighbours(id, false, labels)),
            Direction::Both => Box::new(
                self.neighbours(id, true, labels)
                    .chain(self.neighbours(id, false, labels)),
            ),
        };
        Ok(neighbours)
    }

    fn property(&self, element: &Value, key: &str) -> Result<Option<Value>> {
        let id = self.vertex_id(element)?;
        let record = &self.data.vertices[&id];
        if key == "label" {
            return Ok(Some(Value::from(record.label.as_str())));
        }
        Ok(record.properties.get(key).cloned())
    }
}
