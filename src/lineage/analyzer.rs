use indexmap::IndexMap;

use crate::ast::{
    self, BinaryOperatorKind, CreateTableLikeStatement, CreateTableStatement, Cte, Expr,
    ExchangePartitionStatement, FromExpr, FunctionExpr, InsertSource, InsertStatement,
    JoinCondition, NamedWindowExpr, ParseToken, QueryExpr, RenameTableStatement, Select,
    Statement, UpdateStatement, With,
};

use super::{
    holder::{StatementLineageHolder, SubQueryLineageHolder},
    model::{DataSet, SubQuery, Table},
};

const SWAP_PARTITIONS_FUNCTION: &str = "swap_partitions_between_tables";

/// A query block being analysed.
struct QueryScope {
    holder: SubQueryLineageHolder,
    /// Alias of the derived table or name of the cte this block defines.
    derived_target: Option<DataSet>,
}

/// Walks one statement and collects its table and column lineage.
///
/// Query blocks are tracked on an explicit stack: entering a block pushes a
/// scope, leaving it resolves the selected columns against the data sets the
/// block reads and folds the scope into its parent (or into the statement).
pub struct LineageAnalyzer {
    statement_holder: StatementLineageHolder,
    scopes: Vec<QueryScope>,
    ctes: IndexMap<String, SubQuery>,
}

impl LineageAnalyzer {
    fn new() -> Self {
        Self {
            statement_holder: StatementLineageHolder::new(),
            scopes: vec![],
            ctes: IndexMap::new(),
        }
    }

    pub fn analyze(statement: &Statement) -> anyhow::Result<StatementLineageHolder> {
        let mut analyzer = Self::new();
        analyzer.visit_statement(statement)?;
        while !analyzer.scopes.is_empty() {
            analyzer.exit_query_block()?;
        }
        log::debug!("Statement lineage:\n{}", analyzer.statement_holder);
        Ok(analyzer.statement_holder)
    }

    fn visit_statement(&mut self, statement: &Statement) -> anyhow::Result<()> {
        match statement {
            Statement::Query(query_statement) => self.visit_query_expr(&query_statement.query, None),
            Statement::Insert(insert_statement) => self.visit_insert_statement(insert_statement),
            Statement::CreateTable(create_table_statement) => {
                self.visit_create_table_statement(create_table_statement)
            }
            Statement::CreateTableLike(CreateTableLikeStatement { target, source, .. }) => {
                self.statement_holder.add_write(table_of(target));
                self.statement_holder.add_read(table_of(source));
                Ok(())
            }
            Statement::Update(update_statement) => self.visit_update_statement(update_statement),
            Statement::DropTable(drop_table_statement) => {
                self.statement_holder
                    .add_drop(table_of(&drop_table_statement.name));
                Ok(())
            }
            Statement::RenameTable(RenameTableStatement { from, to }) => self
                .statement_holder
                .add_rename(table_of(from), table_of(to)),
            Statement::ExchangePartition(ExchangePartitionStatement { target, source, .. }) => {
                self.statement_holder.add_write(table_of(target));
                self.statement_holder.add_read(table_of(source));
                Ok(())
            }
            Statement::Other(other_statement) => {
                log::debug!(
                    "No lineage in `{}` statement",
                    other_statement.keyword.to_uppercase()
                );
                Ok(())
            }
        }
    }

    fn visit_insert_statement(&mut self, insert_statement: &InsertStatement) -> anyhow::Result<()> {
        self.statement_holder
            .add_write(table_of(&insert_statement.table));
        for item in insert_statement.partition.iter().flatten() {
            if let Some(value) = &item.value {
                self.visit_expr(value)?;
            }
        }
        match &insert_statement.source {
            InsertSource::Values(rows) => {
                for expr in rows.iter().flatten() {
                    self.visit_expr(expr)?;
                }
                Ok(())
            }
            InsertSource::Query(query) => self.visit_query_expr(query, None),
        }
    }

    fn visit_create_table_statement(
        &mut self,
        create_table_statement: &CreateTableStatement,
    ) -> anyhow::Result<()> {
        self.statement_holder
            .add_write(table_of(&create_table_statement.name));
        match &create_table_statement.query {
            Some(query) => self.visit_query_expr(query, None),
            None => Ok(()),
        }
    }

    fn visit_update_statement(&mut self, update_statement: &UpdateStatement) -> anyhow::Result<()> {
        self.statement_holder
            .add_write(table_of(&update_statement.table));
        for item in &update_statement.update_items {
            self.visit_expr(&item.expr)?;
        }
        if let Some(r#where) = &update_statement.r#where {
            self.visit_expr(&r#where.expr)?;
        }
        Ok(())
    }

    fn visit_with(&mut self, with: &With) -> anyhow::Result<()> {
        for Cte { name, query, text } in &with.ctes {
            let name = name.identifier();
            let cte = SubQuery::new(text, Some(name.as_str()));
            self.statement_holder.add_cte(cte.clone());
            self.ctes.insert(name.to_lowercase(), cte.clone());
            self.visit_query_expr(query, Some(DataSet::SubQuery(cte)))?;
        }
        Ok(())
    }

    /// `derived_target` is the data set the query defines when it is the body
    /// of a derived table or of a cte.
    fn visit_query_expr(
        &mut self,
        query: &QueryExpr,
        derived_target: Option<DataSet>,
    ) -> anyhow::Result<()> {
        if let Some(with) = query.with() {
            self.visit_with(with)?;
        }
        match query {
            QueryExpr::Grouping(grouping) => self.visit_query_expr(&grouping.query, derived_target),
            QueryExpr::Select(select_query) => self.visit_select(&select_query.select, derived_target),
            QueryExpr::SetSelect(set_select) => {
                self.visit_query_expr(&set_select.left_query, derived_target.clone())?;
                self.visit_query_expr(&set_select.right_query, derived_target)
            }
        }
    }

    fn enter_query_block(&mut self, derived_target: Option<DataSet>) {
        let mut holder = SubQueryLineageHolder::new();
        match &derived_target {
            Some(target) => holder.add_write(target.clone()),
            None => {
                let mut writes = self.statement_holder.write();
                if writes.len() == 1 {
                    holder.add_write(DataSet::Table(writes.remove(0)));
                }
            }
        }
        self.scopes.push(QueryScope {
            holder,
            derived_target,
        });
    }

    fn exit_query_block(&mut self) -> anyhow::Result<()> {
        let Some(mut scope) = self.scopes.pop() else {
            return Ok(());
        };
        scope.holder.resolve_columns()?;
        match self.scopes.last_mut() {
            Some(parent) => parent.holder.union(&scope.holder),
            None => self.statement_holder.union(&scope.holder),
        }
        Ok(())
    }

    fn current_holder(&mut self) -> anyhow::Result<&mut SubQueryLineageHolder> {
        self.scopes
            .last_mut()
            .map(|scope| &mut scope.holder)
            .ok_or_else(|| anyhow::anyhow!("Column reference outside of a query block"))
    }

    fn visit_select(&mut self, select: &Select, derived_target: Option<DataSet>) -> anyhow::Result<()> {
        self.enter_query_block(derived_target);

        if let Some(from) = &select.from {
            self.visit_from(from)?;
        }

        for select_expr in &select.exprs {
            let alias = select_expr
                .alias
                .as_ref()
                .map(|alias| alias.identifier())
                .unwrap_or_default();
            self.visit_column_expr(&select_expr.expr, &alias)?;
        }

        if let Some(r#where) = &select.r#where {
            self.visit_expr(&r#where.expr)?;
        }
        if let Some(group_by) = &select.group_by {
            for expr in &group_by.exprs {
                self.visit_expr(expr)?;
            }
        }
        if let Some(having) = &select.having {
            self.visit_expr(&having.expr)?;
        }

        self.exit_query_block()
    }

    fn visit_from(&mut self, from: &ast::From) -> anyhow::Result<()> {
        self.visit_from_expr(&from.expr)?;
        for lateral_view in &from.lateral_views {
            self.visit_expr(&lateral_view.generator)?;
        }
        Ok(())
    }

    fn visit_from_expr(&mut self, from_expr: &FromExpr) -> anyhow::Result<()> {
        match from_expr {
            FromExpr::Path(from_path) => {
                let name = from_path.path.expr.identifier();
                let alias = from_path.alias.as_ref().map(|alias| alias.identifier());
                let dataset = match self.ctes.get(&name.to_lowercase()) {
                    Some(cte) => DataSet::SubQuery(cte.clone()),
                    None => DataSet::Table(Table::new(&name)),
                };
                self.current_holder()?.add_read(dataset, alias.as_deref());
                Ok(())
            }
            FromExpr::GroupingQuery(grouping_query) => {
                let alias = grouping_query.alias.as_ref().map(|alias| alias.identifier());
                let subquery = DataSet::SubQuery(SubQuery::new(&grouping_query.text, alias.as_deref()));
                self.current_holder()?
                    .add_read(subquery.clone(), alias.as_deref());
                self.visit_query_expr(&grouping_query.query, Some(subquery))
            }
            FromExpr::GroupingFrom(grouping_from) => self.visit_from_expr(&grouping_from.query),
            FromExpr::Join(join) => {
                self.visit_from_expr(&join.left)?;
                self.visit_from_expr(&join.right)?;
                if let Some(JoinCondition::On(expr)) = &join.cond {
                    self.visit_expr(expr)?;
                }
                Ok(())
            }
            FromExpr::CrossJoin(cross_join) => {
                self.visit_from_expr(&cross_join.left)?;
                self.visit_from_expr(&cross_join.right)?;
                if let Some(JoinCondition::On(expr)) = &cross_join.cond {
                    self.visit_expr(expr)?;
                }
                Ok(())
            }
        }
    }

    /// Target of a query nested in an expression: the derived table or cte
    /// the enclosing block defines, if any.
    fn nested_query_target(&self) -> Option<DataSet> {
        self.scopes
            .last()
            .and_then(|scope| scope.derived_target.clone())
    }

    fn visit_nested_query(&mut self, query: &QueryExpr) -> anyhow::Result<()> {
        let target = self.nested_query_target();
        self.visit_query_expr(query, target)
    }

    /// `swap_partitions_between_tables(source, ..., ..., target)` moves data
    /// between tables.
    fn visit_function_call(&mut self, function: &FunctionExpr) {
        if !function
            .name
            .identifier()
            .eq_ignore_ascii_case(SWAP_PARTITIONS_FUNCTION)
            || function.arguments.len() != 4
        {
            return;
        }
        if let (Some(source), Some(target)) = (
            table_name_argument(&function.arguments[0]),
            table_name_argument(&function.arguments[3]),
        ) {
            self.statement_holder.add_read(Table::new(&source));
            self.statement_holder.add_write(Table::new(&target));
        }
    }

    /// Walks an expression that produces no selected column, looking for
    /// nested queries and table moving functions.
    fn visit_expr(&mut self, expr: &Expr) -> anyhow::Result<()> {
        match expr {
            Expr::Query(query) | Expr::Exists(query) => self.visit_nested_query(query)?,
            Expr::Function(function) => {
                self.visit_function_call(function);
                for argument in &function.arguments {
                    self.visit_expr(argument)?;
                }
                if let Some(NamedWindowExpr::WindowSpec(window_spec)) = &function.over {
                    for expr in &window_spec.partition_by {
                        self.visit_expr(expr)?;
                    }
                    for order_by_expr in &window_spec.order_by {
                        self.visit_expr(&order_by_expr.expr)?;
                    }
                }
            }
            Expr::Binary(binary) => {
                self.visit_expr(&binary.left)?;
                self.visit_expr(&binary.right)?;
            }
            Expr::Unary(unary) => self.visit_expr(&unary.right)?,
            Expr::Grouping(grouping) => self.visit_expr(&grouping.expr)?,
            Expr::Between(between) => {
                self.visit_expr(&between.expr)?;
                self.visit_expr(&between.low)?;
                self.visit_expr(&between.high)?;
            }
            Expr::List(exprs) => {
                for expr in exprs {
                    self.visit_expr(expr)?;
                }
            }
            Expr::Subscript(subscript) => {
                self.visit_expr(&subscript.expr)?;
                self.visit_expr(&subscript.index)?;
            }
            Expr::Case(case) => {
                if let Some(operand) = &case.case {
                    self.visit_expr(operand)?;
                }
                for (when, then) in &case.when_thens {
                    self.visit_expr(when)?;
                    self.visit_expr(then)?;
                }
                if let Some(r#else) = &case.r#else {
                    self.visit_expr(r#else)?;
                }
            }
            Expr::Cast(cast) => self.visit_expr(&cast.expr)?,
            Expr::Lambda(lambda) => self.visit_expr(&lambda.body)?,
            Expr::Interval(interval) => self.visit_expr(&interval.value)?,
            Expr::Column(_)
            | Expr::Star(_)
            | Expr::String(_)
            | Expr::Number(_)
            | Expr::Bool(_)
            | Expr::Null
            | Expr::TypedString(_) => {}
        }
        Ok(())
    }

    /// Records the source columns of a select list item. `alias` is the name
    /// of the selected column, empty when the item is not aliased.
    fn visit_column_expr(&mut self, expr: &Expr, alias: &str) -> anyhow::Result<()> {
        match expr {
            Expr::Column(column) => {
                let name = column.name.identifier();
                let qualifier = column.qualifier.as_ref().map(|q| q.identifier());
                self.current_holder()?
                    .add_column_reference(alias, &name, qualifier.as_deref());
            }
            Expr::Star(star) => {
                let qualifier = star.qualifier.as_ref().map(|q| q.identifier());
                self.current_holder()?
                    .add_column_reference(alias, "*", qualifier.as_deref());
            }
            Expr::Function(function) => {
                self.visit_function_call(function);
                let alias = default_alias(alias, &function.text);
                for argument in &function.arguments {
                    self.visit_column_expr(argument, alias)?;
                }
                if let Some(NamedWindowExpr::WindowSpec(window_spec)) = &function.over {
                    for expr in &window_spec.partition_by {
                        self.visit_column_expr(expr, alias)?;
                    }
                    for order_by_expr in &window_spec.order_by {
                        self.visit_column_expr(&order_by_expr.expr, alias)?;
                    }
                }
            }
            Expr::Cast(cast) => {
                let alias = default_alias(alias, &cast.text);
                self.visit_column_expr(&cast.expr, alias)?;
            }
            Expr::Case(case) => {
                let alias = default_alias(alias, &case.text);
                if let Some(operand) = &case.case {
                    self.visit_column_expr(operand, alias)?;
                }
                for (when, then) in &case.when_thens {
                    self.visit_column_expr(when, alias)?;
                    self.visit_column_expr(then, alias)?;
                }
                if let Some(r#else) = &case.r#else {
                    self.visit_column_expr(r#else, alias)?;
                }
            }
            Expr::Binary(binary) => {
                let alias = match binary.operator_kind() {
                    BinaryOperatorKind::Arithmetic => default_alias(alias, &binary.text),
                    BinaryOperatorKind::Comparison | BinaryOperatorKind::Logical => alias,
                };
                self.visit_column_expr(&binary.left, alias)?;
                self.visit_column_expr(&binary.right, alias)?;
            }
            Expr::Grouping(grouping) => self.visit_column_expr(&grouping.expr, alias)?,
            Expr::Unary(unary) => self.visit_column_expr(&unary.right, alias)?,
            Expr::Between(between) => {
                self.visit_column_expr(&between.expr, alias)?;
                self.visit_column_expr(&between.low, alias)?;
                self.visit_column_expr(&between.high, alias)?;
            }
            Expr::List(exprs) => {
                for expr in exprs {
                    self.visit_column_expr(expr, alias)?;
                }
            }
            Expr::Subscript(subscript) => {
                self.visit_column_expr(&subscript.expr, alias)?;
                self.visit_column_expr(&subscript.index, alias)?;
            }
            // Lambda parameters are not columns, nested queries are blocks of their own.
            Expr::Query(_) | Expr::Exists(_) | Expr::Lambda(_) => self.visit_expr(expr)?,
            Expr::String(_)
            | Expr::Number(_)
            | Expr::Bool(_)
            | Expr::Null
            | Expr::TypedString(_)
            | Expr::Interval(_) => {}
        }
        Ok(())
    }
}

fn table_of(name: &ParseToken) -> Table {
    Table::new(&name.identifier())
}

fn default_alias<'a>(alias: &'a str, text: &'a str) -> &'a str {
    if alias.is_empty() { text } else { alias }
}

fn table_name_argument(expr: &Expr) -> Option<String> {
    match expr {
        Expr::String(name) => Some(name.clone()),
        Expr::Column(column) => Some(match &column.qualifier {
            Some(qualifier) => format!("{}.{}", qualifier.identifier(), column.name.identifier()),
            None => column.name.identifier(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lineage::model::{Column, ColumnParent, EdgeLabel, Entity, EntityKind},
        parser::parse_sql,
    };

    fn analyze(sql: &str) -> StatementLineageHolder {
        let ast = parse_sql(sql).unwrap();
        LineageAnalyzer::analyze(&ast.statements[0]).unwrap()
    }

    fn table_names(tables: Vec<Table>) -> Vec<String> {
        let mut names = tables
            .iter()
            .map(|table| table.to_string())
            .collect::<Vec<String>>();
        names.sort();
        names
    }

    fn column_edges(holder: &StatementLineageHolder) -> Vec<String> {
        let mut edges = holder
            .graph()
            .subgraph(EntityKind::Column)
            .edges_by_label(EdgeLabel::Lineage)
            .iter()
            .map(|edge| format!("{} -> {}", edge.src, edge.tgt))
            .collect::<Vec<String>>();
        edges.sort();
        edges
    }

    #[test]
    fn reads_tables_of_joins_and_subqueries() {
        let holder = analyze(
            "SELECT a.col1 FROM tab1 a JOIN (SELECT * FROM tab2) b ON a.id = b.id \
             WHERE a.col2 IN (SELECT col2 FROM tab3)",
        );
        assert_eq!(
            table_names(holder.read()),
            vec!["<default>.tab1", "<default>.tab2", "<default>.tab3"]
        );
        assert!(holder.write().is_empty());
    }

    #[test]
    fn cte_reference_is_not_a_table_read() {
        let holder = analyze("WITH t AS (SELECT 1) SELECT * FROM t");
        assert!(holder.read().is_empty());
        assert_eq!(holder.cte().len(), 1);
    }

    #[test]
    fn insert_select_links_columns_to_target() {
        let holder = analyze(
            "INSERT OVERWRITE TABLE tab1 SELECT a.col1, max(b.col2) AS m, col3 + 1 \
             FROM tab2 a JOIN tab3 b ON a.id = b.id",
        );
        assert_eq!(table_names(holder.write()), vec!["<default>.tab1"]);
        assert_eq!(
            column_edges(&holder),
            vec![
                "<default>.tab2.col1 -> <default>.tab1.col1",
                "<default>.tab3.col2 -> <default>.tab1.m",
                "col3 -> <default>.tab1.col3 + 1",
            ]
        );
    }

    #[test]
    fn ambiguous_column_keeps_candidates() {
        let holder = analyze("INSERT INTO tab1 SELECT col1 FROM tab2 a JOIN tab3 b ON a.id = b.id");
        let sources = holder
            .graph()
            .vertices()
            .filter_map(|vertex| vertex.entity.as_column())
            .filter(|column| column.parent().is_none())
            .cloned()
            .collect::<Vec<Column>>();
        assert_eq!(sources.len(), 1);
        assert!(matches!(
            sources[0].parent_state(),
            ColumnParent::Ambiguous(candidates) if candidates.len() == 2
        ));
    }

    #[test]
    fn derived_table_columns_flow_through_subquery() {
        let holder = analyze("INSERT INTO tab1 SELECT dt.col1 FROM (SELECT col1 FROM tab2) dt");
        assert_eq!(
            column_edges(&holder),
            vec![
                "<default>.tab2.col1 -> dt.col1",
                "dt.col1 -> <default>.tab1.col1",
            ]
        );
        assert!(holder
            .graph()
            .contains(&Entity::SubQuery(SubQuery::new("SELECT col1 FROM tab2", None))));
    }

    #[test]
    fn swap_partitions_moves_data() {
        let holder = analyze(
            "SELECT swap_partitions_between_tables('db.src', 'p', 'v', 'db.dst') FROM tab1",
        );
        assert_eq!(table_names(holder.read()), vec!["<default>.tab1", "db.src"]);
        assert_eq!(table_names(holder.write()), vec!["db.dst"]);
    }

    #[test]
    fn ddl_statements() {
        let holder = analyze("ALTER TABLE tab1 EXCHANGE PARTITION (pt='1') WITH TABLE tab2");
        assert_eq!(table_names(holder.write()), vec!["<default>.tab1"]);
        assert_eq!(table_names(holder.read()), vec!["<default>.tab2"]);

        let holder = analyze("DROP TABLE IF EXISTS db.tab1");
        assert_eq!(table_names(holder.drop()), vec!["db.tab1"]);

        let holder = analyze("ALTER TABLE tab1 RENAME TO tab2");
        assert_eq!(holder.rename().len(), 1);

        let holder = analyze("CREATE TABLE tab1 LIKE tab2");
        assert_eq!(table_names(holder.write()), vec!["<default>.tab1"]);
        assert_eq!(table_names(holder.read()), vec!["<default>.tab2"]);

        let holder = analyze("USE db1");
        assert_eq!(holder.graph().vertex_count(), 0);
    }
}
