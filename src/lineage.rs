pub mod analyzer;
pub mod graph;
pub mod holder;
pub mod model;

use rayon::prelude::*;
use serde::Serialize;

use crate::{parser::parse_sql, splitter::split};

pub use analyzer::LineageAnalyzer;
pub use graph::{GraphError, LineageGraph};
pub use holder::{SqlLineageHolder, StatementLineageHolder, SubQueryLineageHolder};
pub use model::{Column, DataSet, SubQuery, Table};

const STATEMENT_PREVIEW_LEN: usize = 50;

fn analyze_statement(statement: &str) -> anyhow::Result<StatementLineageHolder> {
    let ast = parse_sql(statement)?;
    let mut holder = StatementLineageHolder::new();
    for statement in &ast.statements {
        holder.merge(&LineageAnalyzer::analyze(statement)?);
    }
    Ok(holder)
}

pub struct LineageRunnerBuilder {
    sql: String,
    verbose: bool,
    parallel: bool,
    silent_mode: bool,
}

impl LineageRunnerBuilder {
    /// Prefix the table lineage summary with the lineage of each statement.
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Analyse statements on the rayon thread pool.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// When enabled (the default), statements that fail to parse are logged
    /// and skipped instead of failing the whole run.
    pub fn silent_mode(mut self, silent_mode: bool) -> Self {
        self.silent_mode = silent_mode;
        self
    }

    pub fn build(self) -> anyhow::Result<LineageRunner> {
        let statements = split(&self.sql);
        log::debug!("Split {} statements", statements.len());

        let results: Vec<anyhow::Result<StatementLineageHolder>> = if self.parallel {
            statements
                .par_iter()
                .map(|statement| analyze_statement(statement))
                .collect()
        } else {
            statements
                .iter()
                .map(|statement| analyze_statement(statement))
                .collect()
        };

        let mut statement_holders = Vec::with_capacity(results.len());
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(holder) => statement_holders.push(holder),
                Err(err) if self.silent_mode => {
                    log::warn!("Skipping statement #{}: {}", i + 1, err);
                    statement_holders.push(StatementLineageHolder::new());
                }
                Err(err) => {
                    return Err(err.context(format!("Could not analyze statement #{}", i + 1)));
                }
            }
        }

        let sql_holder = SqlLineageHolder::of(&statement_holders)?;
        Ok(LineageRunner {
            statements,
            statement_holders,
            sql_holder,
            verbose: self.verbose,
        })
    }
}

/// Lineage of a SQL script.
///
/// ```rust
/// use sqllineage::lineage::LineageRunner;
///
/// let runner = LineageRunner::builder(
///     "INSERT INTO tab2 SELECT * FROM tab1; INSERT INTO tab3 SELECT * FROM tab2",
/// )
/// .build()
/// .unwrap();
/// assert_eq!(runner.source_tables()[0].to_string(), "<default>.tab1");
/// assert_eq!(runner.target_tables()[0].to_string(), "<default>.tab3");
/// assert_eq!(runner.intermediate_tables()[0].to_string(), "<default>.tab2");
/// ```
pub struct LineageRunner {
    statements: Vec<String>,
    statement_holders: Vec<StatementLineageHolder>,
    sql_holder: SqlLineageHolder,
    verbose: bool,
}

#[derive(Debug, Serialize)]
pub struct LineageSummary {
    pub statements: usize,
    pub source_tables: Vec<String>,
    pub target_tables: Vec<String>,
    pub intermediate_tables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_lineage: Option<Vec<Vec<String>>>,
}

impl LineageRunner {
    pub fn builder(sql: &str) -> LineageRunnerBuilder {
        LineageRunnerBuilder {
            sql: sql.to_owned(),
            verbose: false,
            parallel: false,
            silent_mode: true,
        }
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// One holder per statement; skipped statements have an empty holder.
    pub fn statement_holders(&self) -> &[StatementLineageHolder] {
        &self.statement_holders
    }

    pub fn lineage_holder(&self) -> &SqlLineageHolder {
        &self.sql_holder
    }

    pub fn source_tables(&self) -> Vec<Table> {
        self.sql_holder.source_tables()
    }

    pub fn target_tables(&self) -> Vec<Table> {
        self.sql_holder.target_tables()
    }

    pub fn intermediate_tables(&self) -> Vec<Table> {
        self.sql_holder.intermediate_tables()
    }

    pub fn column_lineage(&self, exclude_subquery_targets: bool) -> Vec<(Column, Column)> {
        self.sql_holder.column_lineage(exclude_subquery_targets)
    }

    pub fn column_lineage_paths(&self, exclude_subquery_targets: bool) -> Vec<Vec<Column>> {
        self.sql_holder
            .column_lineage_paths(exclude_subquery_targets)
    }

    pub fn print_table_lineage(&self) -> String {
        let table_lines = |tables: Vec<Table>| {
            tables
                .iter()
                .map(|table| format!("    {}\n", table))
                .collect::<String>()
        };
        let mut combined = format!(
            "Statements(#): {}\nSource Tables:\n{}Target Tables:\n{}",
            self.statements.len(),
            table_lines(self.source_tables()),
            table_lines(self.target_tables()),
        );
        let intermediate_tables = self.intermediate_tables();
        if !intermediate_tables.is_empty() {
            combined.push_str("Intermediate Tables:\n");
            combined.push_str(&table_lines(intermediate_tables));
        }
        if self.verbose {
            let mut result = String::new();
            for (i, (statement, holder)) in self
                .statements
                .iter()
                .zip(&self.statement_holders)
                .enumerate()
            {
                let mut preview = statement.replace('\n', "");
                if preview.chars().count() > STATEMENT_PREVIEW_LEN {
                    preview = preview.chars().take(STATEMENT_PREVIEW_LEN).collect::<String>() + "...";
                }
                let content = holder.to_string().replace('\n', "\n    ");
                result.push_str(&format!("Statement #{}: {}\n    {}\n", i + 1, preview, content));
            }
            combined = format!("{}==========\nSummary:\n{}", result, combined);
        }
        combined
    }

    /// One line per path, target first: `tgt <- mid <- src`.
    pub fn print_column_lineage(&self) -> String {
        let mut lines = self
            .column_lineage_paths(true)
            .iter()
            .map(|path| {
                path.iter()
                    .rev()
                    .map(|column| column.to_string())
                    .collect::<Vec<String>>()
                    .join(" <- ")
            })
            .collect::<Vec<String>>();
        lines.sort();
        lines
            .iter()
            .map(|line| format!("{}\n", line))
            .collect()
    }

    pub fn summary(&self, include_columns: bool) -> LineageSummary {
        let names = |tables: Vec<Table>| {
            tables
                .iter()
                .map(|table| table.to_string())
                .collect::<Vec<String>>()
        };
        LineageSummary {
            statements: self.statements.len(),
            source_tables: names(self.source_tables()),
            target_tables: names(self.target_tables()),
            intermediate_tables: names(self.intermediate_tables()),
            column_lineage: include_columns.then(|| {
                self.column_lineage_paths(true)
                    .iter()
                    .map(|path| path.iter().map(|column| column.to_string()).collect())
                    .collect()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_table_lineage() {
        let runner = LineageRunner::builder(
            "insert into tab2 select * from tab1;\ninsert into tab3 select * from tab2;",
        )
        .build()
        .unwrap();
        assert_eq!(
            runner.print_table_lineage(),
            "Statements(#): 2\n\
             Source Tables:\n    <default>.tab1\n\
             Target Tables:\n    <default>.tab3\n\
             Intermediate Tables:\n    <default>.tab2\n"
        );
    }

    #[test]
    fn prints_verbose_table_lineage() {
        let runner = LineageRunner::builder("insert into tab2 select * from tab1")
            .verbose()
            .build()
            .unwrap();
        assert_eq!(
            runner.print_table_lineage(),
            "Statement #1: insert into tab2 select * from tab1\n    \
             table read: [<default>.tab1]\n    \
             table write: [<default>.tab2]\n    \
             table cte: []\n    \
             table drop: []\n    \
             table rename: []\n\
             ==========\nSummary:\n\
             Statements(#): 1\n\
             Source Tables:\n    <default>.tab1\n\
             Target Tables:\n    <default>.tab2\n"
        );
    }

    #[test]
    fn prints_column_lineage() {
        let runner = LineageRunner::builder(
            "insert into tab2 select col1 from tab1; insert into tab3 select col1 from tab2",
        )
        .build()
        .unwrap();
        assert_eq!(
            runner.print_column_lineage(),
            "<default>.tab3.col1 <- <default>.tab2.col1 <- <default>.tab1.col1\n"
        );
    }

    #[test]
    fn skips_unparsable_statements_in_silent_mode() {
        let sql = "select * from tab1; select * from (; insert into tab2 select * from tab1";
        let runner = LineageRunner::builder(sql).build().unwrap();
        assert_eq!(runner.statements().len(), 3);
        assert_eq!(runner.statement_holders().len(), 3);
        assert_eq!(runner.target_tables()[0].to_string(), "<default>.tab2");

        assert!(
            LineageRunner::builder(sql)
                .silent_mode(false)
                .build()
                .is_err()
        );
    }

    #[test]
    fn parallel_matches_sequential() {
        let sql = "insert into tab2 select a from tab1; \
                   insert into tab3 select a from tab2; \
                   insert into tab4 select a from tab3";
        let sequential = LineageRunner::builder(sql).build().unwrap();
        let parallel = LineageRunner::builder(sql).parallel(true).build().unwrap();
        assert_eq!(sequential.source_tables(), parallel.source_tables());
        assert_eq!(sequential.target_tables(), parallel.target_tables());
        assert_eq!(
            sequential.column_lineage_paths(true),
            parallel.column_lineage_paths(true)
        );
    }

    #[test]
    fn serializes_summary() {
        let runner = LineageRunner::builder("insert into tab2 select col1 from tab1")
            .build()
            .unwrap();
        let json = serde_json::to_value(runner.summary(true)).unwrap();
        assert_eq!(json["statements"], 1);
        assert_eq!(json["source_tables"][0], "<default>.tab1");
        assert_eq!(
            json["column_lineage"][0],
            serde_json::json!(["<default>.tab1.col1", "<default>.tab2.col1"])
        );
        let json = serde_json::to_value(runner.summary(false)).unwrap();
        assert!(json.get("column_lineage").is_none());
    }
}
