//! # sqllineage
//!
//! A library for extracting table-level and column-level lineage from
//! multi-statement Spark/Hive SQL scripts.
//!
//! # Features
//!
//! - Split scripts into statements, honouring quotes and comments.
//! - Parse Spark/Hive queries, inserts, CTAS, views and common DDL into an AST.
//! - Track which tables each statement reads, writes, drops and renames.
//! - Follow columns through derived tables, ctes and set operations.
//! - Assemble script-wide source, target and intermediate tables and
//!   column lineage paths.
//!
//! # Example
//!
//! ```rust
//! use sqllineage::lineage::LineageRunner;
//!
//! fn main() -> anyhow::Result<()> {
//!     let sql = r#"
//!         insert overwrite table db.tab2 select a.col1, max(a.col2) as m from db.tab1 a group by a.col1;
//!         insert overwrite table db.tab3 select col1, m from db.tab2;
//!     "#;
//!     let runner = LineageRunner::builder(sql).build()?;
//!     println!("{}", runner.print_table_lineage());
//!     println!("{}", runner.print_column_lineage());
//!     Ok(())
//! }
//! ```
mod arena;
pub mod ast;
pub mod lineage;
pub mod parser;
pub mod scanner;
pub mod splitter;
#[doc(hidden)]
pub mod test_utils;
