use sqllineage::{
    ast::Statement,
    parser::parse_sql,
    test_utils::{PARSING_TESTS_FILE, TestParsingData},
};

fn test_sql(sql: &str) {
    let ast = parse_sql(sql);
    if let Err(err) = &ast {
        println!("{}", err)
    }
    assert!(ast.is_ok());
}

#[test]
fn test_should_parse() {
    let parsing_test_file =
        std::fs::read_to_string(PARSING_TESTS_FILE).expect("Cannot open parsing test cases");
    let test_parsing_data: TestParsingData =
        toml::from_str(&parsing_test_file).expect("Cannot parse test cases defined in toml");

    for test in test_parsing_data.tests {
        let sql = &test.sql;
        println!("Testing parsing for SQL: {}", sql);
        test_sql(sql);
        test_sql(&sql.to_uppercase());
        test_sql(&sql.to_lowercase());
    }
}

#[test]
fn test_should_not_parse() {
    let sqls = [
        // Unbalanced parentheses
        "select * from (",
        "select (1 + 2 from tab1",
        // Missing target table
        "insert into",
        // Dangling clauses
        "select col1 from tab1 where",
        "select * from tab1 join",
        // Unterminated string literal
        "select 'abc from tab1",
        // Unterminated bracketed comment
        "select 1 /* comment",
    ];
    for sql in sqls {
        println!("Testing parsing error for SQL: {}", sql);
        assert!(parse_sql(sql).is_err())
    }
}

#[test]
fn test_statement_kinds() {
    let cases = [
        ("select 1", "Query"),
        ("with t as (select 1) select * from t", "Query"),
        ("with t as (select 1) insert into tab1 select * from t", "Insert"),
        ("insert overwrite tab1 select * from tab2", "Insert"),
        ("create table tab1 as select * from tab2", "CreateTable"),
        ("create view v1 as select * from tab2", "CreateTable"),
        ("create table tab1 like tab2", "CreateTableLike"),
        ("update tab1 set col1 = 1", "Update"),
        ("drop table tab1", "DropTable"),
        ("alter table tab1 rename to tab2", "RenameTable"),
        (
            "alter table tab1 exchange partition (pt='1') with table tab2",
            "ExchangePartition",
        ),
        ("use db1", "Other"),
        ("create function f as 'com.example.F'", "Other"),
    ];
    for (sql, expected) in cases {
        let ast = parse_sql(sql).unwrap_or_else(|err| panic!("Could not parse {}: {}", sql, err));
        assert_eq!(ast.statements.len(), 1);
        let kind = match &ast.statements[0] {
            Statement::Query(_) => "Query",
            Statement::Insert(_) => "Insert",
            Statement::CreateTable(_) => "CreateTable",
            Statement::CreateTableLike(_) => "CreateTableLike",
            Statement::Update(_) => "Update",
            Statement::DropTable(_) => "DropTable",
            Statement::RenameTable(_) => "RenameTable",
            Statement::ExchangePartition(_) => "ExchangePartition",
            Statement::Other(_) => "Other",
        };
        assert_eq!(kind, expected, "Unexpected statement kind for: {}", sql);
    }
}
