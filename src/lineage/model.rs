use std::{fmt::Display, hash::Hash};

use indexmap::IndexMap;
use strum_macros::{Display as StrumDisplay, EnumString};

pub const DEFAULT_SCHEMA: &str = "<default>";

/// Strips the quoting characters a dialect may wrap identifiers in.
pub fn escape_identifier_name(name: &str) -> String {
    name.replace(['`', '\'', '"'], "")
}

/// 32-bit polynomial string hash over UTF-16 code units (`h = 31 * h + c`).
/// Stable across runs and platforms, used to name anonymous subqueries.
fn string_hash(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Table {
    schema: String,
    name: String,
}

impl Table {
    /// Builds a table from a possibly qualified name. The schema is whatever
    /// precedes the last `.` and may itself be dotted (`catalog.db.tab`).
    pub fn new(qualified_name: &str) -> Self {
        let escaped = escape_identifier_name(qualified_name.trim());
        match escaped.rsplit_once('.') {
            Some((schema, name)) if !schema.is_empty() => Self {
                schema: schema.to_lowercase(),
                name: name.to_lowercase(),
            },
            Some((_, name)) => Self {
                schema: DEFAULT_SCHEMA.to_owned(),
                name: name.to_lowercase(),
            },
            None => Self {
                schema: DEFAULT_SCHEMA.to_owned(),
                name: escaped.to_lowercase(),
            },
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A derived table, cte body or other nested query. Two subqueries are the
/// same subquery when their query text matches, whatever their alias.
#[derive(Debug, Clone)]
pub struct SubQuery {
    query: String,
    alias: String,
}

impl SubQuery {
    pub fn new(query: &str, alias: Option<&str>) -> Self {
        let alias = match alias {
            Some(alias) => alias.to_owned(),
            None => format!("subquery_{}", string_hash(query)),
        };
        Self {
            query: query.to_owned(),
            alias,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl PartialEq for SubQuery {
    fn eq(&self, other: &Self) -> bool {
        self.query == other.query
    }
}

impl Eq for SubQuery {}

impl Hash for SubQuery {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.query.hash(state);
    }
}

impl Display for SubQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.alias)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataSet {
    Table(Table),
    SubQuery(SubQuery),
}

impl DataSet {
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            DataSet::Table(table) => Some(table),
            DataSet::SubQuery(_) => None,
        }
    }
}

impl Display for DataSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSet::Table(table) => write!(f, "{}", table),
            DataSet::SubQuery(subquery) => write!(f, "{}", subquery),
        }
    }
}

impl From<Table> for DataSet {
    fn from(table: Table) -> Self {
        DataSet::Table(table)
    }
}

impl From<SubQuery> for DataSet {
    fn from(subquery: SubQuery) -> Self {
        DataSet::SubQuery(subquery)
    }
}

/// Where a column comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnParent {
    /// No candidate data set, e.g. a column selected without a FROM clause.
    Unqualified,
    Resolved(DataSet),
    /// Several candidate data sets; attribution unknown.
    Ambiguous(Vec<DataSet>),
}

/// A source reference of a column: `col`, `t.col` or `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnQualifier {
    pub column: String,
    pub qualifier: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Column {
    parent: ColumnParent,
    raw_name: String,
    source_columns: Vec<ColumnQualifier>,
}

impl Column {
    pub fn new(name: &str) -> Self {
        Self {
            parent: ColumnParent::Unqualified,
            raw_name: escape_identifier_name(name),
            source_columns: vec![],
        }
    }

    pub fn with_parent(name: &str, parent: DataSet) -> Self {
        let mut column = Self::new(name);
        column.set_parent(parent);
        column
    }

    pub fn set_parent(&mut self, parent: DataSet) {
        self.parent = ColumnParent::Resolved(parent);
    }

    /// The parent data set when attribution is known.
    pub fn parent(&self) -> Option<&DataSet> {
        match &self.parent {
            ColumnParent::Resolved(parent) => Some(parent),
            _ => None,
        }
    }

    pub fn parent_state(&self) -> &ColumnParent {
        &self.parent
    }

    pub fn name(&self) -> String {
        self.raw_name.to_lowercase()
    }

    pub fn add_source_column(&mut self, column: &str, qualifier: Option<&str>) {
        self.source_columns.push(ColumnQualifier {
            column: column.to_owned(),
            qualifier: qualifier.map(|q| q.to_owned()),
        });
    }

    pub fn source_columns(&self) -> &[ColumnQualifier] {
        &self.source_columns
    }

    /// Resolves the source references of this column against the data sets
    /// visible in a query block, keyed by lower-cased alias.
    pub fn to_source_columns(&self, alias_mapping: &IndexMap<String, DataSet>) -> Vec<Column> {
        let mut source_columns = vec![];
        for source in &self.source_columns {
            match &source.qualifier {
                Some(qualifier) => {
                    let key = escape_identifier_name(qualifier).to_lowercase();
                    let parent = match alias_mapping.get(&key) {
                        Some(dataset) => dataset.clone(),
                        None => DataSet::Table(Table::new(qualifier)),
                    };
                    source_columns.push(Column::with_parent(&source.column, parent));
                }
                None if source.column == "*" => {
                    for dataset in alias_mapping.values() {
                        source_columns.push(Column::with_parent(&source.column, dataset.clone()));
                    }
                }
                None => {
                    let mut candidates: Vec<DataSet> = vec![];
                    for dataset in alias_mapping.values() {
                        if !candidates.contains(dataset) {
                            candidates.push(dataset.clone());
                        }
                    }
                    let mut column = Column::new(&source.column);
                    column.parent = match candidates.len() {
                        0 => ColumnParent::Unqualified,
                        1 => ColumnParent::Resolved(candidates.remove(0)),
                        _ => ColumnParent::Ambiguous(candidates),
                    };
                    source_columns.push(column);
                }
            }
        }
        source_columns
    }
}

impl Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.parent() {
            Some(parent) => write!(f, "{}.{}", parent, self.name()),
            None => write!(f, "{}", self.name()),
        }
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for Column {}

impl Hash for Column {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Table,
    SubQuery,
    Column,
}

/// Content address of a graph vertex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub name: String,
}

/// Anything that can be a vertex of a lineage graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Entity {
    Table(Table),
    SubQuery(SubQuery),
    Column(Column),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Table(_) => EntityKind::Table,
            Entity::SubQuery(_) => EntityKind::SubQuery,
            Entity::Column(_) => EntityKind::Column,
        }
    }

    pub fn key(&self) -> EntityKey {
        let name = match self {
            Entity::Table(table) => table.to_string(),
            Entity::SubQuery(subquery) => subquery.query().to_owned(),
            Entity::Column(column) => column.to_string(),
        };
        EntityKey {
            kind: self.kind(),
            name,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Entity::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_column(&self) -> Option<&Column> {
        match self {
            Entity::Column(column) => Some(column),
            _ => None,
        }
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Table(table) => write!(f, "{}", table),
            Entity::SubQuery(subquery) => write!(f, "{}", subquery),
            Entity::Column(column) => write!(f, "{}", column),
        }
    }
}

impl From<Table> for Entity {
    fn from(table: Table) -> Self {
        Entity::Table(table)
    }
}

impl From<SubQuery> for Entity {
    fn from(subquery: SubQuery) -> Self {
        Entity::SubQuery(subquery)
    }
}

impl From<Column> for Entity {
    fn from(column: Column) -> Self {
        Entity::Column(column)
    }
}

impl From<DataSet> for Entity {
    fn from(dataset: DataSet) -> Self {
        match dataset {
            DataSet::Table(table) => Entity::Table(table),
            DataSet::SubQuery(subquery) => Entity::SubQuery(subquery),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum NodeTag {
    Read,
    Write,
    Cte,
    Drop,
    SourceOnly,
    TargetOnly,
    Selfloop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EdgeLabel {
    Lineage,
    Rename,
    HasColumn,
    /// Part of the label set; aliases are resolved through the alias map of
    /// each query block, so no edge carries it.
    HasAlias,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_normalization() {
        let table = Table::new("tab1");
        assert_eq!(table.to_string(), "<default>.tab1");
        assert_eq!(table, Table::new("TAB1"));
        assert_eq!(table, Table::new("`tab1`"));
        assert_eq!(Table::new("`DB1`.`Tab1`").to_string(), "db1.tab1");
        assert_eq!(Table::new("catalog.db.tab").schema(), "catalog.db");
        assert_eq!(Table::new("catalog.db.tab").name(), "tab");
    }

    #[test]
    fn subquery_identity_is_query_text() {
        let first = SubQuery::new("SELECT * FROM tab1", Some("a"));
        let second = SubQuery::new("SELECT * FROM tab1", Some("b"));
        assert_eq!(first, second);
        assert_ne!(first.to_string(), second.to_string());
        assert_eq!(
            Entity::from(first.clone()).key(),
            Entity::from(second).key()
        );
    }

    #[test]
    fn anonymous_subquery_alias_is_stable() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        assert_eq!(string_hash("hello"), 99162322);
        let subquery = SubQuery::new("hello", None);
        assert_eq!(subquery.alias(), "subquery_99162322");
        assert_eq!(SubQuery::new("hello", None).alias(), subquery.alias());
    }

    #[test]
    fn column_display() {
        let column = Column::with_parent("Col1", DataSet::Table(Table::new("tab1")));
        assert_eq!(column.to_string(), "<default>.tab1.col1");
        assert_eq!(Column::new("`COL1`").to_string(), "col1");
        let subquery_column =
            Column::with_parent("col1", SubQuery::new("SELECT 1", Some("dt")).into());
        assert_eq!(subquery_column.to_string(), "dt.col1");
    }

    #[test]
    fn resolves_source_columns() {
        let tab2 = DataSet::Table(Table::new("tab2"));
        let tab3 = DataSet::Table(Table::new("tab3"));
        let mut alias_mapping = IndexMap::new();
        alias_mapping.insert("a".to_owned(), tab2.clone());
        alias_mapping.insert("b".to_owned(), tab3.clone());

        let mut target = Column::new("col1");
        target.add_source_column("col1", Some("A"));
        target.add_source_column("col2", Some("x"));
        target.add_source_column("col3", None);
        target.add_source_column("*", None);

        let sources = target.to_source_columns(&alias_mapping);
        assert_eq!(sources.len(), 5);
        assert_eq!(sources[0].parent(), Some(&tab2));
        assert_eq!(sources[1].to_string(), "<default>.x.col2");
        assert_eq!(
            sources[2].parent_state(),
            &ColumnParent::Ambiguous(vec![tab2.clone(), tab3.clone()])
        );
        assert_eq!(sources[2].to_string(), "col3");
        assert_eq!(sources[3].to_string(), "<default>.tab2.*");
        assert_eq!(sources[4].to_string(), "<default>.tab3.*");
    }

    #[test]
    fn unqualified_column_without_candidates() {
        let mut target = Column::new("c");
        target.add_source_column("c", None);
        let sources = target.to_source_columns(&IndexMap::new());
        assert_eq!(sources[0].parent_state(), &ColumnParent::Unqualified);

        let tab1 = DataSet::Table(Table::new("tab1"));
        let mut alias_mapping = IndexMap::new();
        alias_mapping.insert("t".to_owned(), tab1.clone());
        alias_mapping.insert("<default>.tab1".to_owned(), tab1.clone());
        let sources = target.to_source_columns(&alias_mapping);
        assert_eq!(sources[0].parent(), Some(&tab1));
    }

    #[test]
    fn tags_and_labels_render_snake_case() {
        assert_eq!(NodeTag::SourceOnly.to_string(), "source_only");
        assert_eq!(EdgeLabel::HasColumn.to_string(), "has_column");
        assert_eq!("has_alias".parse::<EdgeLabel>().ok(), Some(EdgeLabel::HasAlias));
        assert_eq!("selfloop".parse::<NodeTag>().ok(), Some(NodeTag::Selfloop));
    }
}
