use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::arena::{Arena, ArenaIndex};

use super::model::{EdgeLabel, Entity, EntityKey, EntityKind, NodeTag};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Vertex `{0}` is not in the graph")]
    MissingVertex(String),
}

#[derive(Debug, Clone)]
pub struct Vertex {
    pub entity: Entity,
    pub tags: IndexSet<NodeTag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge<'a> {
    pub label: EdgeLabel,
    pub src: &'a Entity,
    pub tgt: &'a Entity,
}

type Adjacency = IndexMap<ArenaIndex, IndexMap<EdgeLabel, IndexSet<ArenaIndex>>>;

/// Directed multigraph over lineage entities. Vertices are interned by their
/// [`EntityKey`]; edges are unique per `(label, src, tgt)`.
#[derive(Debug, Clone, Default)]
pub struct LineageGraph {
    vertices: Arena<Vertex>,
    index: IndexMap<EntityKey, ArenaIndex>,
    out_edges: Adjacency,
    in_edges: Adjacency,
}

impl LineageGraph {
    fn find(&self, entity: &Entity) -> Option<ArenaIndex> {
        self.index.get(&entity.key()).copied()
    }

    fn entity(&self, idx: ArenaIndex) -> &Entity {
        &self.vertices[idx].entity
    }

    fn degree(adjacency: &Adjacency, idx: ArenaIndex, label: EdgeLabel) -> usize {
        adjacency
            .get(&idx)
            .and_then(|labels| labels.get(&label))
            .map_or(0, |neighbours| neighbours.len())
    }

    fn has_edges(&self, idx: ArenaIndex) -> bool {
        let any = |adjacency: &Adjacency| {
            adjacency
                .get(&idx)
                .is_some_and(|labels| labels.values().any(|neighbours| !neighbours.is_empty()))
        };
        any(&self.out_edges) || any(&self.in_edges)
    }

    fn insert_edge(&mut self, label: EdgeLabel, src: ArenaIndex, tgt: ArenaIndex) {
        self.out_edges
            .entry(src)
            .or_default()
            .entry(label)
            .or_default()
            .insert(tgt);
        self.in_edges
            .entry(tgt)
            .or_default()
            .entry(label)
            .or_default()
            .insert(src);
    }

    fn remove_vertex(&mut self, idx: ArenaIndex) {
        if let Some(labels) = self.out_edges.shift_remove(&idx) {
            for (label, targets) in labels {
                for tgt in targets {
                    if let Some(sources) = self
                        .in_edges
                        .get_mut(&tgt)
                        .and_then(|labels| labels.get_mut(&label))
                    {
                        sources.shift_remove(&idx);
                    }
                }
            }
        }
        if let Some(labels) = self.in_edges.shift_remove(&idx) {
            for (label, sources) in labels {
                for src in sources {
                    if let Some(targets) = self
                        .out_edges
                        .get_mut(&src)
                        .and_then(|labels| labels.get_mut(&label))
                    {
                        targets.shift_remove(&idx);
                    }
                }
            }
        }
        if let Some(vertex) = self.vertices.remove(idx) {
            self.index.shift_remove(&vertex.entity.key());
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.index.len()
    }

    pub fn contains(&self, entity: &Entity) -> bool {
        self.find(entity).is_some()
    }

    pub fn vertex(&self, entity: &Entity) -> Option<&Vertex> {
        self.find(entity).map(|idx| &self.vertices[idx])
    }

    /// Vertices in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.index.values().map(|idx| &self.vertices[*idx])
    }

    pub fn has_tag(&self, entity: &Entity, tag: NodeTag) -> bool {
        self.vertex(entity)
            .is_some_and(|vertex| vertex.tags.contains(&tag))
    }

    /// Adds `entity` if absent, otherwise merges `tags` onto the existing vertex.
    pub fn upsert_vertex(&mut self, entity: Entity, tags: &[NodeTag]) -> ArenaIndex {
        let key = entity.key();
        match self.index.get(&key) {
            Some(&idx) => {
                self.vertices[idx].tags.extend(tags.iter().copied());
                idx
            }
            None => {
                let idx = self.vertices.allocate(Vertex {
                    entity,
                    tags: tags.iter().copied().collect(),
                });
                self.index.insert(key, idx);
                idx
            }
        }
    }

    pub fn upsert_edge(
        &mut self,
        label: EdgeLabel,
        src: &Entity,
        tgt: &Entity,
    ) -> Result<(), GraphError> {
        let src_idx = self
            .find(src)
            .ok_or_else(|| GraphError::MissingVertex(src.to_string()))?;
        let tgt_idx = self
            .find(tgt)
            .ok_or_else(|| GraphError::MissingVertex(tgt.to_string()))?;
        self.insert_edge(label, src_idx, tgt_idx);
        Ok(())
    }

    /// Adds `tag` to the given entities. Entities not in the graph are ignored.
    pub fn update_tags<'e>(&mut self, entities: impl IntoIterator<Item = &'e Entity>, tag: NodeTag) {
        for entity in entities {
            if let Some(idx) = self.find(entity) {
                self.vertices[idx].tags.insert(tag);
            }
        }
    }

    pub fn vertices_by_tag(&self, predicate: impl Fn(&IndexSet<NodeTag>) -> bool) -> Vec<&Entity> {
        self.vertices()
            .filter(|vertex| predicate(&vertex.tags))
            .map(|vertex| &vertex.entity)
            .collect()
    }

    pub fn vertices_with_tag(&self, tag: NodeTag) -> Vec<&Entity> {
        self.vertices_by_tag(|tags| tags.contains(&tag))
    }

    fn vertices_by_lineage_degree(&self, predicate: impl Fn(usize, usize) -> bool) -> Vec<&Entity> {
        self.index
            .values()
            .filter(|idx| {
                predicate(
                    Self::degree(&self.in_edges, **idx, EdgeLabel::Lineage),
                    Self::degree(&self.out_edges, **idx, EdgeLabel::Lineage),
                )
            })
            .map(|idx| self.entity(*idx))
            .collect()
    }

    /// Vertices with outgoing but no incoming `lineage` edges.
    pub fn source_only_vertices(&self) -> Vec<&Entity> {
        self.vertices_by_lineage_degree(|in_degree, out_degree| in_degree == 0 && out_degree > 0)
    }

    /// Vertices with incoming but no outgoing `lineage` edges.
    pub fn target_only_vertices(&self) -> Vec<&Entity> {
        self.vertices_by_lineage_degree(|in_degree, out_degree| in_degree > 0 && out_degree == 0)
    }

    pub fn connected_vertices(&self) -> Vec<&Entity> {
        self.vertices_by_lineage_degree(|in_degree, out_degree| in_degree > 0 && out_degree > 0)
    }

    pub fn self_loop_vertices(&self) -> Vec<&Entity> {
        self.index
            .values()
            .filter(|idx| {
                self.out_edges
                    .get(*idx)
                    .and_then(|labels| labels.get(&EdgeLabel::Lineage))
                    .is_some_and(|targets| targets.contains(*idx))
            })
            .map(|idx| self.entity(*idx))
            .collect()
    }

    pub fn edges(&self) -> Vec<Edge<'_>> {
        let mut edges = vec![];
        for (src, labels) in &self.out_edges {
            for (label, targets) in labels {
                for tgt in targets {
                    edges.push(Edge {
                        label: *label,
                        src: self.entity(*src),
                        tgt: self.entity(*tgt),
                    });
                }
            }
        }
        edges
    }

    pub fn edges_by_label(&self, label: EdgeLabel) -> Vec<Edge<'_>> {
        self.edges()
            .into_iter()
            .filter(|edge| edge.label == label)
            .collect()
    }

    /// Edges leaving or entering `entity`. A self loop is reported once.
    pub fn edges_touching(&self, entity: &Entity) -> Vec<Edge<'_>> {
        let Some(idx) = self.find(entity) else {
            return vec![];
        };
        let mut edges = vec![];
        if let Some(labels) = self.out_edges.get(&idx) {
            for (label, targets) in labels {
                for tgt in targets {
                    edges.push(Edge {
                        label: *label,
                        src: self.entity(idx),
                        tgt: self.entity(*tgt),
                    });
                }
            }
        }
        if let Some(labels) = self.in_edges.get(&idx) {
            for (label, sources) in labels {
                for src in sources.iter().filter(|src| **src != idx) {
                    edges.push(Edge {
                        label: *label,
                        src: self.entity(*src),
                        tgt: self.entity(idx),
                    });
                }
            }
        }
        edges
    }

    /// Every vertex of `kind` with its tags, and the edges whose endpoints
    /// are both of `kind`.
    pub fn subgraph(&self, kind: EntityKind) -> LineageGraph {
        let mut subgraph = LineageGraph::default();
        for vertex in self.vertices().filter(|vertex| vertex.entity.kind() == kind) {
            let tags = vertex.tags.iter().copied().collect::<Vec<NodeTag>>();
            subgraph.upsert_vertex(vertex.entity.clone(), &tags);
        }
        for edge in self.edges() {
            if edge.src.kind() != kind || edge.tgt.kind() != kind {
                continue;
            }
            if let (Some(src), Some(tgt)) = (subgraph.find(edge.src), subgraph.find(edge.tgt)) {
                subgraph.insert_edge(edge.label, src, tgt);
            }
        }
        subgraph
    }

    /// Removes the given vertices and their edges. With `only_if_orphan`, a
    /// vertex that still has any incident edge is kept.
    pub fn drop_vertices(&mut self, entities: &[Entity], only_if_orphan: bool) {
        for entity in entities {
            let Some(idx) = self.find(entity) else {
                continue;
            };
            if only_if_orphan && self.has_edges(idx) {
                continue;
            }
            self.remove_vertex(idx);
        }
    }

    /// Removes every edge whose source is its own target, of any label.
    pub fn drop_self_loop_edges(&mut self) {
        for (idx, labels) in self.out_edges.iter_mut() {
            for (label, targets) in labels.iter_mut() {
                if targets.shift_remove(idx) {
                    if let Some(sources) = self
                        .in_edges
                        .get_mut(idx)
                        .and_then(|labels| labels.get_mut(label))
                    {
                        sources.shift_remove(idx);
                    }
                }
            }
        }
    }

    /// Structural union: vertices (tags merged) and edges of `other` are
    /// copied into `self`.
    pub fn merge(&mut self, other: &LineageGraph) {
        for vertex in other.vertices() {
            let tags = vertex.tags.iter().copied().collect::<Vec<NodeTag>>();
            self.upsert_vertex(vertex.entity.clone(), &tags);
        }
        for edge in other.edges() {
            if let (Some(src), Some(tgt)) = (self.find(edge.src), self.find(edge.tgt)) {
                self.insert_edge(edge.label, src, tgt);
            }
        }
    }

    /// Lazily enumerates the simple paths from `source` to `target` along
    /// `lineage` edges.
    pub fn all_simple_paths(&self, source: &Entity, target: &Entity) -> SimplePaths<'_> {
        let mut paths = SimplePaths {
            graph: self,
            target: None,
            path: vec![],
            stack: vec![],
        };
        if let (Some(src), Some(tgt)) = (self.find(source), self.find(target)) {
            if src != tgt {
                paths.target = Some(tgt);
                paths.path.push(src);
                paths.stack.push((src, 0));
            }
        }
        paths
    }
}

/// Depth first walk backing [`LineageGraph::all_simple_paths`]. Each stack
/// frame holds a vertex of the current path and the position of the next
/// child to visit.
pub struct SimplePaths<'a> {
    graph: &'a LineageGraph,
    target: Option<ArenaIndex>,
    path: Vec<ArenaIndex>,
    stack: Vec<(ArenaIndex, usize)>,
}

impl<'a> SimplePaths<'a> {
    fn lineage_child(&self, idx: ArenaIndex, position: usize) -> Option<ArenaIndex> {
        self.graph
            .out_edges
            .get(&idx)
            .and_then(|labels| labels.get(&EdgeLabel::Lineage))
            .and_then(|targets| targets.get_index(position))
            .copied()
    }
}

impl<'a> Iterator for SimplePaths<'a> {
    type Item = Vec<&'a Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        let target = self.target?;
        let graph = self.graph;
        while let Some(&(idx, position)) = self.stack.last() {
            let Some(child) = self.lineage_child(idx, position) else {
                self.stack.pop();
                self.path.pop();
                continue;
            };
            if let Some(frame) = self.stack.last_mut() {
                frame.1 += 1;
            }
            if self.path.contains(&child) {
                continue;
            }
            if child == target {
                return Some(
                    self.path
                        .iter()
                        .chain(std::iter::once(&child))
                        .map(|idx| graph.entity(*idx))
                        .collect(),
                );
            }
            self.path.push(child);
            self.stack.push((child, 0));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lineage::model::{Column, DataSet, Table};

    fn table(name: &str) -> Entity {
        Entity::Table(Table::new(name))
    }

    fn column(table_name: &str, name: &str) -> Entity {
        Entity::Column(Column::with_parent(
            name,
            DataSet::Table(Table::new(table_name)),
        ))
    }

    fn names(entities: Vec<&Entity>) -> Vec<String> {
        let mut names = entities
            .iter()
            .map(|entity| entity.to_string())
            .collect::<Vec<String>>();
        names.sort();
        names
    }

    #[test]
    fn upsert_vertex_is_idempotent() {
        let mut graph = LineageGraph::default();
        let first = graph.upsert_vertex(table("tab1"), &[NodeTag::Read]);
        let second = graph.upsert_vertex(table("TAB1"), &[NodeTag::Write]);
        assert_eq!(first, second);
        assert_eq!(graph.vertex_count(), 1);
        assert!(graph.has_tag(&table("tab1"), NodeTag::Read));
        assert!(graph.has_tag(&table("tab1"), NodeTag::Write));
    }

    #[test]
    fn upsert_edge_is_unique_and_needs_endpoints() {
        let mut graph = LineageGraph::default();
        graph.upsert_vertex(table("tab1"), &[]);
        assert_eq!(
            graph.upsert_edge(EdgeLabel::Lineage, &table("tab1"), &table("tab2")),
            Err(GraphError::MissingVertex("<default>.tab2".to_owned()))
        );
        graph.upsert_vertex(table("tab2"), &[]);
        graph
            .upsert_edge(EdgeLabel::Lineage, &table("tab1"), &table("tab2"))
            .unwrap();
        graph
            .upsert_edge(EdgeLabel::Lineage, &table("tab1"), &table("tab2"))
            .unwrap();
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(graph.edges_touching(&table("tab2")).len(), 1);
    }

    #[test]
    fn classifies_by_lineage_degree() {
        let mut graph = LineageGraph::default();
        for name in ["tab1", "tab2", "tab3", "tab4"] {
            graph.upsert_vertex(table(name), &[]);
        }
        graph
            .upsert_edge(EdgeLabel::Lineage, &table("tab1"), &table("tab2"))
            .unwrap();
        graph
            .upsert_edge(EdgeLabel::Lineage, &table("tab2"), &table("tab3"))
            .unwrap();
        graph
            .upsert_edge(EdgeLabel::Lineage, &table("tab4"), &table("tab4"))
            .unwrap();
        graph
            .upsert_edge(EdgeLabel::Rename, &table("tab3"), &table("tab1"))
            .unwrap();

        assert_eq!(names(graph.source_only_vertices()), vec!["<default>.tab1"]);
        assert_eq!(names(graph.target_only_vertices()), vec!["<default>.tab3"]);
        assert_eq!(
            names(graph.connected_vertices()),
            vec!["<default>.tab2", "<default>.tab4"]
        );
        assert_eq!(names(graph.self_loop_vertices()), vec!["<default>.tab4"]);
        assert_eq!(graph.edges_by_label(EdgeLabel::Rename).len(), 1);
    }

    #[test]
    fn subgraph_keeps_edges_within_kind() {
        let mut graph = LineageGraph::default();
        graph.upsert_vertex(table("tab1"), &[NodeTag::SourceOnly]);
        graph.upsert_vertex(column("tab1", "col1"), &[]);
        graph.upsert_vertex(column("tab2", "col1"), &[]);
        graph
            .upsert_edge(EdgeLabel::HasColumn, &table("tab1"), &column("tab1", "col1"))
            .unwrap();
        graph
            .upsert_edge(
                EdgeLabel::Lineage,
                &column("tab1", "col1"),
                &column("tab2", "col1"),
            )
            .unwrap();

        let tables = graph.subgraph(EntityKind::Table);
        assert_eq!(tables.vertex_count(), 1);
        assert!(tables.edges().is_empty());
        assert!(tables.has_tag(&table("tab1"), NodeTag::SourceOnly));

        let columns = graph.subgraph(EntityKind::Column);
        assert_eq!(columns.vertex_count(), 2);
        assert_eq!(columns.edges_by_label(EdgeLabel::Lineage).len(), 1);
    }

    #[test]
    fn drops_orphans_only() {
        let mut graph = LineageGraph::default();
        graph.upsert_vertex(table("tab1"), &[]);
        graph.upsert_vertex(table("tab2"), &[]);
        graph.upsert_vertex(table("tab3"), &[]);
        graph
            .upsert_edge(EdgeLabel::Lineage, &table("tab1"), &table("tab2"))
            .unwrap();

        graph.drop_vertices(&[table("tab1"), table("tab3")], true);
        assert!(graph.contains(&table("tab1")));
        assert!(!graph.contains(&table("tab3")));

        graph.drop_vertices(&[table("tab1")], false);
        assert!(!graph.contains(&table("tab1")));
        assert!(graph.edges().is_empty());
        assert!(graph.edges_touching(&table("tab2")).is_empty());

        // freed slots are reused without leaking old edges
        graph.upsert_vertex(table("tab5"), &[]);
        assert!(graph.edges_touching(&table("tab5")).is_empty());
        assert_eq!(graph.vertex_count(), 2);
    }

    #[test]
    fn drops_self_loops_of_every_label() {
        let mut graph = LineageGraph::default();
        graph.upsert_vertex(table("tab1"), &[]);
        graph.upsert_vertex(table("tab2"), &[]);
        graph
            .upsert_edge(EdgeLabel::Lineage, &table("tab1"), &table("tab1"))
            .unwrap();
        graph
            .upsert_edge(EdgeLabel::Rename, &table("tab1"), &table("tab1"))
            .unwrap();
        graph
            .upsert_edge(EdgeLabel::Lineage, &table("tab1"), &table("tab2"))
            .unwrap();
        graph.drop_self_loop_edges();
        assert_eq!(graph.edges().len(), 1);
        assert!(graph.self_loop_vertices().is_empty());
        assert_eq!(names(graph.source_only_vertices()), vec!["<default>.tab1"]);
    }

    #[test]
    fn merge_unions_vertices_and_edges() {
        let mut first = LineageGraph::default();
        first.upsert_vertex(table("tab1"), &[NodeTag::Read]);
        first.upsert_vertex(table("tab2"), &[]);
        first
            .upsert_edge(EdgeLabel::Lineage, &table("tab1"), &table("tab2"))
            .unwrap();

        let mut second = LineageGraph::default();
        second.upsert_vertex(table("tab1"), &[NodeTag::Write]);
        second.upsert_vertex(table("tab3"), &[]);
        second
            .upsert_edge(EdgeLabel::Lineage, &table("tab1"), &table("tab3"))
            .unwrap();

        first.merge(&second);
        assert_eq!(first.vertex_count(), 3);
        assert_eq!(first.edges().len(), 2);
        assert!(first.has_tag(&table("tab1"), NodeTag::Read));
        assert!(first.has_tag(&table("tab1"), NodeTag::Write));
    }

    #[test]
    fn enumerates_simple_paths() {
        let mut graph = LineageGraph::default();
        for name in ["a", "b", "c", "d"] {
            graph.upsert_vertex(column("t", name), &[]);
        }
        for (src, tgt) in [("a", "b"), ("b", "d"), ("a", "c"), ("c", "d"), ("d", "a")] {
            graph
                .upsert_edge(EdgeLabel::Lineage, &column("t", src), &column("t", tgt))
                .unwrap();
        }
        graph
            .upsert_edge(EdgeLabel::HasColumn, &column("t", "a"), &column("t", "d"))
            .unwrap();

        let mut paths = graph
            .all_simple_paths(&column("t", "a"), &column("t", "d"))
            .map(|path| {
                path.iter()
                    .map(|entity| entity.to_string())
                    .collect::<Vec<String>>()
                    .join(" -> ")
            })
            .collect::<Vec<String>>();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "<default>.t.a -> <default>.t.b -> <default>.t.d",
                "<default>.t.a -> <default>.t.c -> <default>.t.d",
            ]
        );
        assert_eq!(
            graph
                .all_simple_paths(&column("t", "a"), &column("t", "a"))
                .count(),
            0
        );
        assert_eq!(
            graph
                .all_simple_paths(&column("t", "a"), &column("t", "missing"))
                .count(),
            0
        );
    }
}
