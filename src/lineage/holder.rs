use std::fmt::Display;

use indexmap::IndexMap;

use super::{
    graph::{GraphError, LineageGraph},
    model::{Column, DataSet, EdgeLabel, Entity, EntityKind, NodeTag, SubQuery, Table},
};

/// Adds `src -> tgt` column lineage, plus the `has_column` edges from each
/// resolved parent to its column.
fn add_column_lineage_to(
    graph: &mut LineageGraph,
    src: Column,
    tgt: Column,
) -> Result<(), GraphError> {
    let src_parent = src.parent().cloned();
    let tgt_parent = tgt.parent().cloned();
    let src = Entity::Column(src);
    let tgt = Entity::Column(tgt);
    graph.upsert_vertex(src.clone(), &[]);
    graph.upsert_vertex(tgt.clone(), &[]);
    graph.upsert_edge(EdgeLabel::Lineage, &src, &tgt)?;
    for (parent, column) in [(tgt_parent, &tgt), (src_parent, &src)] {
        if let Some(parent) = parent {
            let parent = Entity::from(parent);
            graph.upsert_vertex(parent.clone(), &[]);
            graph.upsert_edge(EdgeLabel::HasColumn, &parent, column)?;
        }
    }
    Ok(())
}

fn tables_with_tag(graph: &LineageGraph, tag: NodeTag) -> Vec<Table> {
    graph
        .vertices_with_tag(tag)
        .into_iter()
        .filter_map(|entity| entity.as_table().cloned())
        .collect()
}

fn format_list<T: Display>(items: &[T]) -> String {
    format!(
        "[{}]",
        items
            .iter()
            .map(|item| item.to_string())
            .collect::<Vec<String>>()
            .join(", ")
    )
}

/// Lineage facts of one query block: what it reads, the data set its select
/// list writes to, and the columns it selects.
#[derive(Debug, Clone, Default)]
pub struct SubQueryLineageHolder {
    graph: LineageGraph,
    target: Option<DataSet>,
    alias_mapping: IndexMap<String, DataSet>,
    select_columns: Vec<Column>,
}

impl SubQueryLineageHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &LineageGraph {
        &self.graph
    }

    pub fn select_columns(&self) -> &[Column] {
        &self.select_columns
    }

    /// Registers a data set read by the block under its full name and its
    /// alias. An unaliased table is also reachable by its bare name unless
    /// another data set already claimed it.
    pub fn add_read(&mut self, dataset: DataSet, alias: Option<&str>) {
        self.graph
            .upsert_vertex(Entity::from(dataset.clone()), &[NodeTag::Read]);
        match (alias, &dataset) {
            (Some(alias), _) => {
                self.alias_mapping
                    .insert(alias.to_lowercase(), dataset.clone());
            }
            (None, DataSet::Table(table)) => {
                self.alias_mapping
                    .entry(table.name().to_owned())
                    .or_insert_with(|| dataset.clone());
            }
            (None, DataSet::SubQuery(_)) => {}
        }
        self.alias_mapping
            .insert(dataset.to_string().to_lowercase(), dataset);
    }

    /// The first write of a block becomes the target of its select list.
    pub fn add_write(&mut self, dataset: DataSet) {
        self.graph
            .upsert_vertex(Entity::from(dataset.clone()), &[NodeTag::Write]);
        if self.target.is_none() {
            self.target = Some(dataset);
        }
    }

    /// Records a selected column. An empty `target_alias` names the column
    /// after its source.
    pub fn add_column_reference(
        &mut self,
        target_alias: &str,
        source_column: &str,
        source_qualifier: Option<&str>,
    ) {
        let name = if target_alias.is_empty() {
            source_column
        } else {
            target_alias
        };
        let mut column = Column::new(name);
        column.add_source_column(source_column, source_qualifier);
        self.select_columns.push(column);
    }

    /// Attributes the selected columns to the write target and links each of
    /// them to its resolved source columns. Without a target nothing is
    /// linked.
    pub fn resolve_columns(&mut self) -> anyhow::Result<()> {
        let select_columns = std::mem::take(&mut self.select_columns);
        let Some(target) = &self.target else {
            return Ok(());
        };
        for mut target_column in select_columns {
            target_column.set_parent(target.clone());
            for source_column in target_column.to_source_columns(&self.alias_mapping) {
                add_column_lineage_to(&mut self.graph, source_column, target_column.clone())?;
            }
        }
        Ok(())
    }

    /// Merges the graph of a finished nested block into this one.
    pub fn union(&mut self, other: &SubQueryLineageHolder) {
        self.graph.merge(&other.graph);
    }
}

/// Lineage facts of one statement.
#[derive(Debug, Clone, Default)]
pub struct StatementLineageHolder {
    graph: LineageGraph,
}

impl StatementLineageHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &LineageGraph {
        &self.graph
    }

    /// Tables read by the statement. Cte references are not tables read.
    pub fn read(&self) -> Vec<Table> {
        let ctes = tables_with_tag(&self.graph, NodeTag::Cte);
        tables_with_tag(&self.graph, NodeTag::Read)
            .into_iter()
            .filter(|table| !ctes.contains(table))
            .collect()
    }

    pub fn write(&self) -> Vec<Table> {
        tables_with_tag(&self.graph, NodeTag::Write)
    }

    pub fn cte(&self) -> Vec<SubQuery> {
        self.graph
            .vertices_with_tag(NodeTag::Cte)
            .into_iter()
            .filter_map(|entity| match entity {
                Entity::SubQuery(subquery) => Some(subquery.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn drop(&self) -> Vec<Table> {
        tables_with_tag(&self.graph, NodeTag::Drop)
    }

    pub fn rename(&self) -> Vec<(Table, Table)> {
        self.graph
            .edges_by_label(EdgeLabel::Rename)
            .into_iter()
            .filter_map(|edge| match (edge.src, edge.tgt) {
                (Entity::Table(src), Entity::Table(tgt)) => Some((src.clone(), tgt.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn add_read(&mut self, table: Table) {
        self.graph
            .upsert_vertex(Entity::Table(table), &[NodeTag::Read]);
    }

    pub fn add_write(&mut self, table: Table) {
        self.graph
            .upsert_vertex(Entity::Table(table), &[NodeTag::Write]);
    }

    pub fn add_cte(&mut self, cte: SubQuery) {
        self.graph
            .upsert_vertex(Entity::SubQuery(cte), &[NodeTag::Cte]);
    }

    pub fn add_drop(&mut self, table: Table) {
        self.graph
            .upsert_vertex(Entity::Table(table), &[NodeTag::Drop]);
    }

    pub fn add_rename(&mut self, src: Table, tgt: Table) -> anyhow::Result<()> {
        let src = Entity::Table(src);
        let tgt = Entity::Table(tgt);
        self.graph.upsert_vertex(src.clone(), &[]);
        self.graph.upsert_vertex(tgt.clone(), &[]);
        self.graph.upsert_edge(EdgeLabel::Rename, &src, &tgt)?;
        Ok(())
    }

    pub fn add_column_lineage(&mut self, src: Column, tgt: Column) -> anyhow::Result<()> {
        add_column_lineage_to(&mut self.graph, src, tgt)?;
        Ok(())
    }

    pub fn union(&mut self, subquery: &SubQueryLineageHolder) {
        self.graph.merge(&subquery.graph);
    }

    pub fn merge(&mut self, other: &StatementLineageHolder) {
        self.graph.merge(&other.graph);
    }
}

impl Display for StatementLineageHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let renames = self
            .rename()
            .iter()
            .map(|(src, tgt)| format!("({}, {})", src, tgt))
            .collect::<Vec<String>>();
        writeln!(f, "table read: {}", format_list(&self.read()))?;
        writeln!(f, "table write: {}", format_list(&self.write()))?;
        writeln!(f, "table cte: {}", format_list(&self.cte()))?;
        writeln!(f, "table drop: {}", format_list(&self.drop()))?;
        write!(f, "table rename: {}", format_list(&renames))
    }
}

/// Script level lineage: statement graphs folded together in script order.
#[derive(Debug, Clone, Default)]
pub struct SqlLineageHolder {
    graph: LineageGraph,
}

impl SqlLineageHolder {
    pub fn of(holders: &[StatementLineageHolder]) -> anyhow::Result<Self> {
        let mut graph = LineageGraph::default();
        for holder in holders {
            graph.merge(holder.graph());
            let drop = holder.drop();
            let rename = holder.rename();
            if !drop.is_empty() {
                for table in drop {
                    Self::drop_table(&mut graph, Entity::Table(table))?;
                }
            } else if !rename.is_empty() {
                for (old, new) in rename {
                    Self::rename_table(&mut graph, Entity::Table(old), Entity::Table(new))?;
                }
            } else {
                let read = holder
                    .read()
                    .into_iter()
                    .map(Entity::Table)
                    .collect::<Vec<Entity>>();
                let write = holder
                    .write()
                    .into_iter()
                    .map(Entity::Table)
                    .collect::<Vec<Entity>>();
                if !read.is_empty() && write.is_empty() {
                    graph.update_tags(&read, NodeTag::SourceOnly);
                } else if read.is_empty() && !write.is_empty() {
                    graph.update_tags(&write, NodeTag::TargetOnly);
                } else {
                    for r in &read {
                        for w in &write {
                            graph.upsert_edge(EdgeLabel::Lineage, r, w)?;
                        }
                    }
                }
            }
        }

        let self_loop_tables = graph
            .self_loop_vertices()
            .into_iter()
            .filter(|entity| entity.kind() == EntityKind::Table)
            .cloned()
            .collect::<Vec<Entity>>();
        graph.update_tags(&self_loop_tables, NodeTag::Selfloop);

        log::debug!(
            "Assembled lineage graph with {} vertices and {} edges",
            graph.vertex_count(),
            graph.edges().len()
        );
        Ok(Self { graph })
    }

    /// A dropped table that data flows through is bridged out: new `lineage`
    /// edges are synthesized from each upstream table to each downstream
    /// table, edges no statement wrote, and the table is removed. Otherwise
    /// the table is removed only if nothing else refers to it.
    fn drop_table(graph: &mut LineageGraph, table: Entity) -> anyhow::Result<()> {
        let mut predecessors = vec![];
        let mut successors = vec![];
        for edge in graph.edges_touching(&table) {
            if edge.label != EdgeLabel::Lineage || edge.src == edge.tgt {
                continue;
            }
            if edge.tgt == &table && edge.src.kind() == EntityKind::Table {
                predecessors.push(edge.src.clone());
            } else if edge.src == &table && edge.tgt.kind() == EntityKind::Table {
                successors.push(edge.tgt.clone());
            }
        }

        if predecessors.is_empty() || successors.is_empty() {
            graph.drop_vertices(&[table], true);
            return Ok(());
        }

        for predecessor in &predecessors {
            for successor in &successors {
                graph.upsert_edge(EdgeLabel::Lineage, predecessor, successor)?;
            }
        }
        graph.drop_vertices(&[table], false);
        Ok(())
    }

    fn rename_table(graph: &mut LineageGraph, old: Entity, new: Entity) -> anyhow::Result<()> {
        let edges = graph
            .edges_touching(&old)
            .into_iter()
            .map(|edge| (edge.label, edge.src.clone(), edge.tgt.clone()))
            .collect::<Vec<(EdgeLabel, Entity, Entity)>>();
        for (label, src, tgt) in edges {
            let src = if src == old { new.clone() } else { src };
            let tgt = if tgt == old { new.clone() } else { tgt };
            graph.upsert_edge(label, &src, &tgt)?;
        }
        graph.drop_vertices(&[old], false);
        graph.drop_self_loop_edges();
        graph.drop_vertices(&[new], true);
        Ok(())
    }

    pub fn graph(&self) -> &LineageGraph {
        &self.graph
    }

    fn sorted_tables<'a>(entities: impl IntoIterator<Item = &'a Entity>) -> Vec<Table> {
        let mut tables = entities
            .into_iter()
            .filter_map(|entity| entity.as_table().cloned())
            .collect::<Vec<Table>>();
        tables.sort_by_key(|table| table.to_string());
        tables.dedup();
        tables
    }

    pub fn source_tables(&self) -> Vec<Table> {
        let table_graph = self.graph.subgraph(EntityKind::Table);
        Self::sorted_tables(
            table_graph
                .source_only_vertices()
                .into_iter()
                .chain(self.graph.vertices_with_tag(NodeTag::SourceOnly))
                .chain(self.graph.vertices_with_tag(NodeTag::Selfloop)),
        )
    }

    pub fn target_tables(&self) -> Vec<Table> {
        let table_graph = self.graph.subgraph(EntityKind::Table);
        Self::sorted_tables(
            table_graph
                .target_only_vertices()
                .into_iter()
                .chain(self.graph.vertices_with_tag(NodeTag::TargetOnly))
                .chain(self.graph.vertices_with_tag(NodeTag::Selfloop)),
        )
    }

    pub fn intermediate_tables(&self) -> Vec<Table> {
        let table_graph = self.graph.subgraph(EntityKind::Table);
        let self_loops = self.graph.vertices_with_tag(NodeTag::Selfloop);
        Self::sorted_tables(
            table_graph
                .connected_vertices()
                .into_iter()
                .filter(|entity| !self_loops.contains(entity)),
        )
    }

    fn keeps_target(column: &Column, exclude_subquery_targets: bool) -> bool {
        !exclude_subquery_targets || matches!(column.parent(), Some(DataSet::Table(_)))
    }

    /// Direct column to column lineage.
    pub fn column_lineage(&self, exclude_subquery_targets: bool) -> Vec<(Column, Column)> {
        let column_graph = self.graph.subgraph(EntityKind::Column);
        let mut lineage = column_graph
            .edges_by_label(EdgeLabel::Lineage)
            .into_iter()
            .filter_map(|edge| match (edge.src, edge.tgt) {
                (Entity::Column(src), Entity::Column(tgt))
                    if Self::keeps_target(tgt, exclude_subquery_targets) =>
                {
                    Some((src.clone(), tgt.clone()))
                }
                _ => None,
            })
            .collect::<Vec<(Column, Column)>>();
        lineage.sort_by_key(|(src, tgt)| (tgt.to_string(), src.to_string()));
        lineage
    }

    /// Every path from a column nothing flows into to a column that flows
    /// nowhere, following column lineage across subqueries and statements.
    pub fn column_lineage_paths(&self, exclude_subquery_targets: bool) -> Vec<Vec<Column>> {
        let column_graph = self.graph.subgraph(EntityKind::Column);
        let sources = column_graph.source_only_vertices();
        let targets = column_graph
            .target_only_vertices()
            .into_iter()
            .filter(|entity| {
                entity
                    .as_column()
                    .is_some_and(|column| Self::keeps_target(column, exclude_subquery_targets))
            })
            .collect::<Vec<&Entity>>();

        let mut paths = vec![];
        for source in &sources {
            for target in &targets {
                for path in column_graph.all_simple_paths(source, target) {
                    paths.push(
                        path.into_iter()
                            .filter_map(|entity| entity.as_column().cloned())
                            .collect::<Vec<Column>>(),
                    );
                }
            }
        }
        paths.sort_by_key(|path| {
            path.iter()
                .rev()
                .map(|column| column.to_string())
                .collect::<Vec<String>>()
        });
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(tables: Vec<Table>) -> Vec<String> {
        tables.iter().map(|table| table.to_string()).collect()
    }

    fn insert_select(target: &str, sources: &[&str]) -> StatementLineageHolder {
        let mut holder = StatementLineageHolder::new();
        holder.add_write(Table::new(target));
        for source in sources {
            holder.add_read(Table::new(source));
        }
        holder
    }

    #[test]
    fn subquery_holder_resolves_columns_to_target() {
        let mut holder = SubQueryLineageHolder::new();
        holder.add_write(DataSet::Table(Table::new("tab1")));
        holder.add_read(DataSet::Table(Table::new("tab2")), Some("a"));
        holder.add_column_reference("", "col1", Some("a"));
        holder.add_column_reference("total", "col2", None);
        holder.resolve_columns().unwrap();

        assert!(holder.select_columns().is_empty());
        let column_graph = holder.graph().subgraph(EntityKind::Column);
        let mut edges = column_graph
            .edges_by_label(EdgeLabel::Lineage)
            .iter()
            .map(|edge| format!("{} -> {}", edge.src, edge.tgt))
            .collect::<Vec<String>>();
        edges.sort();
        assert_eq!(
            edges,
            vec![
                "<default>.tab2.col1 -> <default>.tab1.col1",
                "<default>.tab2.col2 -> <default>.tab1.total",
            ]
        );
        assert_eq!(holder.graph().edges_by_label(EdgeLabel::HasColumn).len(), 4);
    }

    #[test]
    fn subquery_holder_resolves_bare_table_name() {
        let mut holder = SubQueryLineageHolder::new();
        holder.add_write(DataSet::Table(Table::new("tab3")));
        holder.add_read(DataSet::Table(Table::new("db.tab2")), None);
        holder.add_read(DataSet::Table(Table::new("db.tab4")), Some("t"));
        holder.add_column_reference("", "c", Some("tab2"));
        holder.add_column_reference("", "d", Some("tab4"));
        holder.resolve_columns().unwrap();

        let column_graph = holder.graph().subgraph(EntityKind::Column);
        let mut edges = column_graph
            .edges_by_label(EdgeLabel::Lineage)
            .iter()
            .map(|edge| format!("{} -> {}", edge.src, edge.tgt))
            .collect::<Vec<String>>();
        edges.sort();
        // an aliased table is no longer reachable by its own name
        assert_eq!(
            edges,
            vec![
                "<default>.tab4.d -> <default>.tab3.d",
                "db.tab2.c -> <default>.tab3.c",
            ]
        );
    }

    #[test]
    fn subquery_holder_without_target_links_nothing() {
        let mut holder = SubQueryLineageHolder::new();
        holder.add_read(DataSet::Table(Table::new("tab2")), None);
        holder.add_column_reference("", "col1", None);
        holder.resolve_columns().unwrap();
        assert!(holder.graph().edges().is_empty());
    }

    #[test]
    fn statement_read_excludes_cte() {
        let mut holder = StatementLineageHolder::new();
        holder.add_read(Table::new("tab1"));
        holder.add_cte(SubQuery::new("SELECT 1", Some("c")));
        holder.add_write(Table::new("tab2"));
        assert_eq!(table_names(holder.read()), vec!["<default>.tab1"]);
        assert_eq!(table_names(holder.write()), vec!["<default>.tab2"]);
        assert_eq!(holder.cte().len(), 1);
        assert_eq!(
            holder.to_string(),
            "table read: [<default>.tab1]\ntable write: [<default>.tab2]\ntable cte: [c]\n\
             table drop: []\ntable rename: []"
        );
    }

    #[test]
    fn assembles_self_loop() {
        let sql_holder = SqlLineageHolder::of(&[insert_select("foo", &["foo"])]).unwrap();
        assert_eq!(table_names(sql_holder.source_tables()), vec!["<default>.foo"]);
        assert_eq!(table_names(sql_holder.target_tables()), vec!["<default>.foo"]);
        assert!(sql_holder.intermediate_tables().is_empty());
    }

    #[test]
    fn assembles_rename() {
        let mut rename = StatementLineageHolder::new();
        rename
            .add_rename(Table::new("tab1"), Table::new("tab3"))
            .unwrap();
        let sql_holder =
            SqlLineageHolder::of(&[insert_select("tab1", &["tab2"]), rename.clone()]).unwrap();
        assert_eq!(table_names(sql_holder.source_tables()), vec!["<default>.tab2"]);
        assert_eq!(table_names(sql_holder.target_tables()), vec!["<default>.tab3"]);
        assert!(!sql_holder
            .graph()
            .contains(&Entity::Table(Table::new("tab1"))));

        // renaming before anything was written leaves nothing behind
        let sql_holder =
            SqlLineageHolder::of(&[rename, insert_select("tab1", &["tab2"])]).unwrap();
        assert_eq!(table_names(sql_holder.target_tables()), vec!["<default>.tab1"]);
    }

    #[test]
    fn assembles_drop() {
        let mut drop = StatementLineageHolder::new();
        drop.add_drop(Table::new("tab_a"));
        let sql_holder = SqlLineageHolder::of(&[
            insert_select("tab_a", &["tab_b"]),
            insert_select("tab_c", &["tab_a"]),
            drop,
        ])
        .unwrap();
        assert_eq!(table_names(sql_holder.source_tables()), vec!["<default>.tab_b"]);
        assert_eq!(table_names(sql_holder.target_tables()), vec!["<default>.tab_c"]);
        assert!(sql_holder.intermediate_tables().is_empty());
        let bridged = sql_holder
            .graph()
            .edges_by_label(EdgeLabel::Lineage)
            .iter()
            .map(|edge| format!("{} -> {}", edge.src, edge.tgt))
            .collect::<Vec<String>>();
        assert_eq!(bridged, vec!["<default>.tab_b -> <default>.tab_c"]);

        let mut drop = StatementLineageHolder::new();
        drop.add_drop(Table::new("tab1"));
        let sql_holder = SqlLineageHolder::of(&[drop]).unwrap();
        assert_eq!(sql_holder.graph().vertex_count(), 0);
    }

    #[test]
    fn tags_source_and_target_only() {
        let mut select = StatementLineageHolder::new();
        select.add_read(Table::new("tab1"));
        let mut create = StatementLineageHolder::new();
        create.add_write(Table::new("tab2"));
        let sql_holder = SqlLineageHolder::of(&[select, create]).unwrap();
        assert_eq!(table_names(sql_holder.source_tables()), vec!["<default>.tab1"]);
        assert_eq!(table_names(sql_holder.target_tables()), vec!["<default>.tab2"]);
    }

    #[test]
    fn column_lineage_paths_follow_statements() {
        let column = |table: &str, name: &str| {
            Column::with_parent(name, DataSet::Table(Table::new(table)))
        };
        let mut first = insert_select("tab2", &["tab1"]);
        first
            .add_column_lineage(column("tab1", "a"), column("tab2", "b"))
            .unwrap();
        let mut second = insert_select("tab3", &["tab2"]);
        second
            .add_column_lineage(column("tab2", "b"), column("tab3", "c"))
            .unwrap();
        let sql_holder = SqlLineageHolder::of(&[first, second]).unwrap();

        assert_eq!(sql_holder.column_lineage(true).len(), 2);
        let paths = sql_holder.column_lineage_paths(true);
        assert_eq!(paths.len(), 1);
        assert_eq!(
            paths[0]
                .iter()
                .map(|column| column.to_string())
                .collect::<Vec<String>>(),
            vec![
                "<default>.tab1.a",
                "<default>.tab2.b",
                "<default>.tab3.c"
            ]
        );
        assert_eq!(
            table_names(sql_holder.intermediate_tables()),
            vec!["<default>.tab2"]
        );
    }
}
