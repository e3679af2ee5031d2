use std::fmt::Display;

use serde::Deserialize;

pub const PARSING_TESTS_FILE: &str = "tests/parsing_tests.toml";
pub const LINEAGE_TESTS_FILE: &str = "tests/lineage_tests.toml";

#[derive(Deserialize, Debug, Clone)]
pub struct TestParsing {
    pub sql: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestParsingData {
    pub tests: Vec<TestParsing>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestLineage {
    pub name: String,
    pub sql: String,
    #[serde(default)]
    pub source_tables: Vec<String>,
    #[serde(default)]
    pub target_tables: Vec<String>,
    #[serde(default)]
    pub intermediate_tables: Vec<String>,
    /// First and last column of each column lineage path, checked only when present.
    pub column_lineage: Option<Vec<Vec<String>>>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestLineageData {
    pub tests: Vec<TestLineage>,
}

impl Display for TestLineageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
