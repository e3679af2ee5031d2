use anyhow::anyhow;
use strum::IntoDiscriminant;

use crate::ast::{
    Ast, BetweenExpr, BinaryExpr, CaseExpr, CastExpr, ColumnExpr, CreateTableLikeStatement,
    CreateTableStatement, CrossJoinExpr, Cte, DropTableStatement, ExchangePartitionStatement,
    Expr, From, FromExpr, FromGroupingQueryExpr, FromPathExpr, FunctionExpr, GroupBy,
    GroupingExpr, GroupingFromExpr, GroupingQueryExpr, Having, InsertSource, InsertStatement,
    IntervalExpr, JoinCondition, JoinExpr, JoinKind, LambdaExpr, LateralView, Limit,
    NamedWindowExpr, OrderBy, OrderByExpr, OrderByNulls, OrderBySortDirection, OtherStatement,
    ParseToken, PartitionSpecItem, PathExpr, QueryExpr, QueryStatement, RenameTableStatement,
    Select, SelectExpr, SelectQueryExpr, SetQueryOperator, SetSelectQueryExpr, StarExpr,
    Statement, SubscriptExpr, Token, TokenType, TokenTypeVariant, TypedStringExpr, UnaryExpr,
    UpdateItem, UpdateStatement, Where, WindowSpec, With,
};
use crate::scanner::Scanner;

/// Unquoted words that follow a relation or an expression without aliasing it.
const NON_ALIAS_KEYWORDS: [&str; 8] = [
    "cluster",
    "distribute",
    "sort",
    "window",
    "set",
    "minus",
    "semi",
    "anti",
];

const INTERVAL_UNITS: [&str; 18] = [
    "year",
    "years",
    "month",
    "months",
    "week",
    "weeks",
    "day",
    "days",
    "hour",
    "hours",
    "minute",
    "minutes",
    "second",
    "seconds",
    "millisecond",
    "milliseconds",
    "microsecond",
    "microseconds",
];

pub struct Parser<'a> {
    source_chars: Vec<char>,
    source_tokens: &'a Vec<Token>,
    curr: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &str, tokens: &'a Vec<Token>) -> Parser<'a> {
        Self {
            source_chars: source.chars().collect(),
            source_tokens: tokens,
            curr: 0,
        }
    }

    pub fn parse(&mut self) -> anyhow::Result<Ast> {
        self.parse_query()
    }

    fn peek_prev(&self) -> &Token {
        &self.source_tokens[self.curr - 1]
    }

    fn peek(&self) -> &Token {
        &self.source_tokens[self.curr]
    }

    fn peek_next_i(&self, i: usize) -> &Token {
        if self.curr + i >= self.source_tokens.len() {
            // Eof
            &self.source_tokens[self.source_tokens.len() - 1]
        } else {
            &self.source_tokens[self.curr + i]
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            // Do not advance if we peek Eof
            self.curr += 1;
        }
        self.peek_prev()
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenType::Eof
    }

    fn check_token_type(&self, token_type: TokenTypeVariant) -> bool {
        self.peek().kind.discriminant() == token_type
    }

    fn match_token_type(&mut self, token_type: TokenTypeVariant) -> bool {
        if self.check_token_type(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_token_types(&mut self, token_types: &[TokenTypeVariant]) -> bool {
        for tok in token_types {
            if self.check_token_type(*tok) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check_non_reserved_keyword(&self, value: &str) -> bool {
        Self::is_non_reserved_keyword(self.peek(), value)
    }

    fn is_non_reserved_keyword(token: &Token, value: &str) -> bool {
        match &token.kind {
            TokenType::Identifier(ident) => ident.eq_ignore_ascii_case(value),
            _ => false,
        }
    }

    fn check_identifier(&self) -> bool {
        self.check_token_type(TokenTypeVariant::Identifier)
            || self.check_token_type(TokenTypeVariant::QuotedIdentifier)
    }

    fn match_non_reserved_keyword(&mut self, value: &str) -> bool {
        if self.check_non_reserved_keyword(value) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_non_reserved_keyword(&mut self, value: &str) -> anyhow::Result<&Token> {
        if self.check_non_reserved_keyword(value) {
            Ok(self.advance())
        } else {
            let err_msg = format!("Expected `{}`.", value.to_uppercase());
            Err(anyhow!(self.error(self.peek(), &err_msg)))
        }
    }

    fn consume(&mut self, token_type: TokenTypeVariant) -> anyhow::Result<&Token> {
        if self.check_token_type(token_type) {
            Ok(self.advance())
        } else {
            let err_msg = format!("Expected `{}`.", token_type.variant_str());
            Err(anyhow!(self.error(self.peek(), &err_msg)))
        }
    }

    fn match_identifier(&mut self) -> bool {
        self.match_token_types(&[
            TokenTypeVariant::Identifier,
            TokenTypeVariant::QuotedIdentifier,
        ])
    }

    fn consume_identifier(&mut self) -> anyhow::Result<&Token> {
        self.consume_one_of(&[
            TokenTypeVariant::Identifier,
            TokenTypeVariant::QuotedIdentifier,
        ])
    }

    fn consume_one_of(&mut self, token_types: &[TokenTypeVariant]) -> anyhow::Result<&Token> {
        for token_type in token_types {
            if self.check_token_type(*token_type) {
                return Ok(self.advance());
            }
        }
        let err_msg = token_types
            .iter()
            .map(|el| format!("`{}`", el.variant_str()))
            .collect::<Vec<String>>()
            .join(" or ");
        Err(anyhow!(self.error(
            self.peek(),
            &format!("Expected one of: {}.", err_msg)
        )))
    }

    fn error(&self, token: &Token, message: &str) -> String {
        format!(
            "[line {}, col {}] Error {}: {}",
            token.line,
            token.col,
            &format!("at '{}'", token.lexeme),
            message
        )
    }

    /// Source text from the token at `from_token` up to the last consumed token.
    fn source_text(&self, from_token: usize) -> String {
        let start = self.source_tokens[from_token].start;
        let end = if self.curr > from_token {
            self.source_tokens[self.curr - 1].end
        } else {
            start
        };
        self.source_chars[start..end].iter().collect()
    }

    /// Whether a query starts at `offset`, looking through any opening parentheses.
    fn is_query_ahead(&self, offset: usize) -> bool {
        let mut i = offset;
        while self.peek_next_i(i).kind == TokenType::LeftParen {
            i += 1;
        }
        matches!(
            self.peek_next_i(i).kind,
            TokenType::Select | TokenType::With
        )
    }

    /// Whether the current `WITH` opens a cte list rather than a property list.
    fn is_cte_ahead(&self) -> bool {
        matches!(
            self.peek_next_i(1).kind,
            TokenType::Identifier(_) | TokenType::QuotedIdentifier(_)
        ) && (self.peek_next_i(2).kind == TokenType::As
            || (self.peek_next_i(2).kind == TokenType::LeftParen && self.is_query_ahead(2))
            || (self.peek_next_i(2).kind == TokenType::LeftParen
                && !self.is_query_ahead(2)
                && self.is_column_list_followed_by_query(2)))
    }

    /// `WITH name (a, b) AS (...)`: a column list followed by a cte body.
    fn is_column_list_followed_by_query(&self, offset: usize) -> bool {
        let mut i = offset + 1;
        loop {
            match self.peek_next_i(i).kind {
                TokenType::Identifier(_) | TokenType::QuotedIdentifier(_) | TokenType::Comma => {
                    i += 1
                }
                TokenType::RightParen => break,
                _ => return false,
            }
        }
        self.peek_next_i(i + 1).kind == TokenType::As
    }

    fn is_query_start(&self) -> bool {
        match self.peek().kind {
            TokenType::Select => true,
            TokenType::LeftParen => self.is_query_ahead(0),
            TokenType::With => self.is_cte_ahead(),
            _ => false,
        }
    }

    fn is_statement_end(&self) -> bool {
        self.check_token_type(TokenTypeVariant::Eof)
            || self.check_token_type(TokenTypeVariant::Semicolon)
    }

    /// Skips one token, or a whole balanced parenthesized group.
    fn skip_token_or_group(&mut self) -> anyhow::Result<()> {
        if !self.check_token_type(TokenTypeVariant::LeftParen) {
            self.advance();
            return Ok(());
        }
        let mut depth = 0usize;
        loop {
            match self.peek().kind {
                TokenType::LeftParen => depth += 1,
                TokenType::RightParen => depth -= 1,
                TokenType::Eof => return Err(anyhow!(self.error(self.peek(), "Expected `)`."))),
                _ => {}
            }
            self.advance();
            if depth == 0 {
                return Ok(());
            }
        }
    }

    fn skip_to_statement_end(&mut self) -> anyhow::Result<()> {
        while !self.is_statement_end() {
            self.skip_token_or_group()?;
        }
        Ok(())
    }

    /// Skips a data type, stopping at a `,` or `)` that is not nested in it.
    fn skip_type(&mut self) -> anyhow::Result<()> {
        let mut depth = 0usize;
        loop {
            match self.peek().kind {
                TokenType::LeftParen | TokenType::Less => depth += 1,
                TokenType::RightParen | TokenType::Greater if depth > 0 => depth -= 1,
                TokenType::Comma | TokenType::RightParen if depth == 0 => return Ok(()),
                TokenType::Eof => return Err(anyhow!(self.error(self.peek(), "Expected `)`."))),
                _ => {}
            }
            self.advance();
        }
    }

    // query -> statement (";" statement)* [";"]
    fn parse_query(&mut self) -> anyhow::Result<Ast> {
        let mut statements = vec![];

        loop {
            while self.match_token_type(TokenTypeVariant::Semicolon) {}
            if self.check_token_type(TokenTypeVariant::Eof) {
                break;
            }

            statements.push(self.parse_statement()?);

            if !self.match_token_type(TokenTypeVariant::Semicolon) {
                break;
            }
        }

        self.consume(TokenTypeVariant::Eof)?;
        Ok(Ast { statements })
    }

    fn parse_statement(&mut self) -> anyhow::Result<Statement> {
        let statement = match &self.peek().kind {
            TokenType::Create => self.parse_create_statement()?,
            TokenType::With => self.parse_with_statement()?,
            TokenType::Select | TokenType::LeftParen => self.parse_query_statement()?,
            TokenType::Identifier(non_reserved_keyword) => {
                match non_reserved_keyword.to_lowercase().as_str() {
                    "insert" => self.parse_insert_statement()?,
                    "update" => self.parse_update_statement()?,
                    "drop" => self.parse_drop_statement()?,
                    "alter" => self.parse_alter_statement()?,
                    _ => self.parse_other_statement()?,
                }
            }
            _ => self.parse_other_statement()?,
        };
        Ok(statement)
    }

    // other_statement -> keyword token*
    fn parse_other_statement(&mut self) -> anyhow::Result<Statement> {
        let start = self.curr;
        let keyword = self.peek().lexeme.to_lowercase();
        self.skip_to_statement_end()?;
        Ok(Statement::Other(OtherStatement {
            keyword,
            text: self.source_text(start),
        }))
    }

    // query_statement -> query_expr
    fn parse_query_statement(&mut self) -> anyhow::Result<Statement> {
        let query_expr = self.parse_query_expr()?;
        Ok(Statement::Query(QueryStatement { query: query_expr }))
    }

    // with_statement -> "WITH" with_expr insert_statement | query_expr
    fn parse_with_statement(&mut self) -> anyhow::Result<Statement> {
        let start = self.curr;
        self.consume(TokenTypeVariant::With)?;
        let with = self.parse_with_expr()?;
        if !self.check_non_reserved_keyword("insert") {
            self.curr = start;
            return self.parse_query_statement();
        }

        let mut statement = self.parse_insert_statement()?;
        if let Statement::Insert(InsertStatement {
            source: InsertSource::Query(query),
            ..
        }) = &mut statement
        {
            let query_with = query.with_mut();
            match query_with {
                Some(inner_with) => {
                    let mut ctes = with.ctes;
                    ctes.append(&mut inner_with.ctes);
                    inner_with.ctes = ctes;
                }
                None => *query_with = Some(with),
            }
        }
        Ok(statement)
    }

    // insert_statement ->
    // "INSERT" ("INTO" | "OVERWRITE") ["TABLE"] path [partition_spec] ["IF" "NOT" "EXISTS"]
    // ["(" column ("," column)* ")"] (values | query_expr)
    // | "INSERT" "OVERWRITE" ["LOCAL"] "DIRECTORY" "String" directory_options query_expr
    fn parse_insert_statement(&mut self) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("insert")?;
        let overwrite = if self.match_token_type(TokenTypeVariant::Into) {
            false
        } else {
            self.consume_non_reserved_keyword("overwrite")?;
            true
        };

        if overwrite
            && (self.check_non_reserved_keyword("local")
                || self.check_non_reserved_keyword("directory"))
        {
            return self.parse_insert_directory();
        }

        self.match_non_reserved_keyword("table");
        let table = self.parse_path()?.expr;

        let partition = if self.check_non_reserved_keyword("partition") {
            Some(self.parse_partition_spec()?)
        } else {
            None
        };

        if self.match_non_reserved_keyword("if") {
            self.consume(TokenTypeVariant::Not)?;
            self.consume(TokenTypeVariant::Exists)?;
        }

        let columns = if self.check_token_type(TokenTypeVariant::LeftParen)
            && !self.is_query_ahead(0)
        {
            self.advance();
            let mut columns = vec![];
            loop {
                columns.push(ParseToken::Single(self.consume_identifier()?.clone()));
                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
            self.consume(TokenTypeVariant::RightParen)?;
            Some(columns)
        } else {
            None
        };

        let source = if self.match_non_reserved_keyword("values") {
            InsertSource::Values(self.parse_values()?)
        } else {
            InsertSource::Query(self.parse_query_expr()?)
        };

        Ok(Statement::Insert(InsertStatement {
            table,
            overwrite,
            partition,
            columns,
            source,
        }))
    }

    // insert_directory -> ["LOCAL"] "DIRECTORY" "String" (option_token)* query_expr
    fn parse_insert_directory(&mut self) -> anyhow::Result<Statement> {
        self.match_non_reserved_keyword("local");
        self.consume_non_reserved_keyword("directory")?;
        self.consume(TokenTypeVariant::String)?;
        while !self.is_query_start() {
            if self.is_statement_end() {
                return Err(anyhow!(self.error(self.peek(), "Expected query.")));
            }
            self.skip_token_or_group()?;
        }
        self.parse_query_statement()
    }

    // values -> row ("," row)*
    // where:
    // row -> "(" expr ("," expr)* ")" | expr
    fn parse_values(&mut self) -> anyhow::Result<Vec<Vec<Expr>>> {
        let mut rows = vec![];
        loop {
            if self.match_token_type(TokenTypeVariant::LeftParen) {
                let mut row = vec![];
                loop {
                    row.push(self.parse_expr()?);
                    if !self.match_token_type(TokenTypeVariant::Comma) {
                        break;
                    }
                }
                self.consume(TokenTypeVariant::RightParen)?;
                rows.push(row);
            } else {
                rows.push(vec![self.parse_expr()?]);
            }
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        Ok(rows)
    }

    // partition_spec -> "PARTITION" "(" column ["=" expr] ("," column ["=" expr])* ")"
    fn parse_partition_spec(&mut self) -> anyhow::Result<Vec<PartitionSpecItem>> {
        self.consume_non_reserved_keyword("partition")?;
        self.consume(TokenTypeVariant::LeftParen)?;
        let mut items = vec![];
        loop {
            let column = ParseToken::Single(self.consume_identifier()?.clone());
            let value = if self.match_token_type(TokenTypeVariant::Equal) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            items.push(PartitionSpecItem { column, value });
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        self.consume(TokenTypeVariant::RightParen)?;
        Ok(items)
    }

    // create_statement ->
    // "CREATE" ["OR" "REPLACE"] ["GLOBAL"] ["TEMP" | "TEMPORARY"] ["EXTERNAL"] ("TABLE" | "VIEW")
    // ["IF" "NOT" "EXISTS"] path
    // ("LIKE" path table_options | [column_definitions] table_options [["AS"] query_expr])
    fn parse_create_statement(&mut self) -> anyhow::Result<Statement> {
        let start = self.curr;
        self.consume(TokenTypeVariant::Create)?;
        let replace = self.match_token_type(TokenTypeVariant::Or);
        if replace {
            self.consume_non_reserved_keyword("replace")?;
        }
        self.match_non_reserved_keyword("global");
        let is_temporary =
            self.match_non_reserved_keyword("temp") || self.match_non_reserved_keyword("temporary");
        self.match_non_reserved_keyword("external");

        let is_view = if self.match_non_reserved_keyword("table") {
            false
        } else if self.match_non_reserved_keyword("view") {
            true
        } else {
            // CREATE DATABASE, CREATE FUNCTION, ...
            self.curr = start;
            return self.parse_other_statement();
        };

        let if_not_exists = self.match_non_reserved_keyword("if");
        if if_not_exists {
            self.consume(TokenTypeVariant::Not)?;
            self.consume(TokenTypeVariant::Exists)?;
        }

        let name = self.parse_path()?.expr;

        if !is_view && self.match_token_type(TokenTypeVariant::Like) {
            let source = self.parse_path()?.expr;
            self.skip_to_statement_end()?;
            return Ok(Statement::CreateTableLike(CreateTableLikeStatement {
                target: name,
                source,
                if_not_exists,
            }));
        }

        let columns = if self.check_token_type(TokenTypeVariant::LeftParen)
            && !self.is_query_ahead(0)
        {
            Some(self.parse_column_definitions()?)
        } else {
            None
        };

        let query = self.parse_table_options_and_query()?;

        Ok(Statement::CreateTable(CreateTableStatement {
            name,
            replace,
            is_temporary,
            if_not_exists,
            is_view,
            columns,
            query,
        }))
    }

    // column_definitions -> "(" column_definition ("," column_definition)* ")"
    // where:
    // column_definition -> ("Identifier" | "QuotedIdentifier") [type] [column_options]
    fn parse_column_definitions(&mut self) -> anyhow::Result<Vec<ParseToken>> {
        self.consume(TokenTypeVariant::LeftParen)?;
        let mut columns = vec![];
        loop {
            columns.push(ParseToken::Single(self.consume_identifier()?.clone()));
            self.skip_type()?;
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        self.consume(TokenTypeVariant::RightParen)?;
        Ok(columns)
    }

    // table_options -> (option_token | "(" ... ")")* [["AS"] query_expr]
    // where:
    // option_token is any token of USING, PARTITIONED BY, CLUSTERED BY, ROW FORMAT, STORED AS,
    // LOCATION, COMMENT, TBLPROPERTIES, OPTIONS, WITH (...) clauses
    fn parse_table_options_and_query(&mut self) -> anyhow::Result<Option<QueryExpr>> {
        loop {
            if self.is_statement_end() {
                return Ok(None);
            }
            if self.match_non_reserved_keyword("stored") {
                self.consume(TokenTypeVariant::As)?;
                self.advance();
                continue;
            }
            if self.match_token_type(TokenTypeVariant::As) {
                return Ok(Some(self.parse_query_expr()?));
            }
            if self.is_query_start() {
                return Ok(Some(self.parse_query_expr()?));
            }
            self.skip_token_or_group()?;
        }
    }

    // update_statement -> "UPDATE" path [as_alias] "SET" update_item ("," update_item)* ["WHERE" expr]
    // where:
    // update_item -> path "=" expr
    fn parse_update_statement(&mut self) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("update")?;
        let table = self.parse_path()?.expr;
        let alias = self.parse_as_alias()?;
        self.consume_non_reserved_keyword("set")?;

        let mut update_items = vec![];
        loop {
            let column = self.parse_path()?.expr;
            self.consume(TokenTypeVariant::Equal)?;
            let expr = self.parse_expr()?;
            update_items.push(UpdateItem { column, expr });
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }

        let r#where = if self.match_token_type(TokenTypeVariant::Where) {
            Some(Where {
                expr: Box::new(self.parse_where_expr()?),
            })
        } else {
            None
        };

        Ok(Statement::Update(UpdateStatement {
            table,
            alias,
            update_items,
            r#where,
        }))
    }

    // drop_statement -> "DROP" ("TABLE" | "VIEW") ["IF" "EXISTS"] path ["PURGE"] | other_statement
    fn parse_drop_statement(&mut self) -> anyhow::Result<Statement> {
        let start = self.curr;
        self.consume_non_reserved_keyword("drop")?;
        if !(self.match_non_reserved_keyword("table") || self.match_non_reserved_keyword("view")) {
            self.curr = start;
            return self.parse_other_statement();
        }

        let if_exists = self.match_non_reserved_keyword("if");
        if if_exists {
            self.consume(TokenTypeVariant::Exists)?;
        }

        let name = self.parse_path()?.expr;
        self.match_non_reserved_keyword("purge");

        Ok(Statement::DropTable(DropTableStatement { name, if_exists }))
    }

    // alter_statement ->
    // "ALTER" ("TABLE" | "VIEW") path "RENAME" "TO" path
    // | "ALTER" "TABLE" path "EXCHANGE" partition_spec "WITH" "TABLE" path
    // | other_statement
    fn parse_alter_statement(&mut self) -> anyhow::Result<Statement> {
        let start = self.curr;
        self.consume_non_reserved_keyword("alter")?;
        if !(self.match_non_reserved_keyword("table") || self.match_non_reserved_keyword("view")) {
            self.curr = start;
            return self.parse_other_statement();
        }
        let table = self.parse_path()?.expr;

        if self.match_non_reserved_keyword("rename") {
            self.consume_non_reserved_keyword("to")?;
            let to = self.parse_path()?.expr;
            return Ok(Statement::RenameTable(RenameTableStatement { from: table, to }));
        }

        if self.match_non_reserved_keyword("exchange") {
            let partition = self.parse_partition_spec()?;
            self.consume(TokenTypeVariant::With)?;
            self.consume_non_reserved_keyword("table")?;
            let source = self.parse_path()?.expr;
            return Ok(Statement::ExchangePartition(ExchangePartitionStatement {
                target: table,
                partition,
                source,
            }));
        }

        self.curr = start;
        self.parse_other_statement()
    }

    // query_expr ->
    // ["WITH" with_expr] select_query_expr
    // (("UNION" | "INTERSECT" | "EXCEPT" | "MINUS") [("ALL" | "DISTINCT")] select_query_expr)*
    // [query_organization]
    fn parse_query_expr(&mut self) -> anyhow::Result<QueryExpr> {
        let with = if self.match_token_type(TokenTypeVariant::With) {
            Some(self.parse_with_expr()?)
        } else {
            None
        };
        let mut output: QueryExpr = self.parse_select_query_expr()?;

        loop {
            let set_operator = match &self.peek().kind {
                TokenType::Union => {
                    self.advance();
                    if self.match_token_type(TokenTypeVariant::All) {
                        SetQueryOperator::Union
                    } else {
                        self.match_token_type(TokenTypeVariant::Distinct);
                        SetQueryOperator::UnionDistinct
                    }
                }
                TokenType::Intersect => {
                    self.advance();
                    self.match_token_types(&[TokenTypeVariant::All, TokenTypeVariant::Distinct]);
                    SetQueryOperator::Intersect
                }
                TokenType::Except => {
                    self.advance();
                    self.match_token_types(&[TokenTypeVariant::All, TokenTypeVariant::Distinct]);
                    SetQueryOperator::Except
                }
                TokenType::Identifier(ident) if ident.eq_ignore_ascii_case("minus") => {
                    self.advance();
                    self.match_token_types(&[TokenTypeVariant::All, TokenTypeVariant::Distinct]);
                    SetQueryOperator::Except
                }
                _ => break,
            };
            let right_query_expr = self.parse_select_query_expr()?;
            output = QueryExpr::SetSelect(SetSelectQueryExpr {
                with: None,
                left_query: Box::new(output),
                set_operator,
                right_query: Box::new(right_query_expr),
                order_by: None,
                limit: None,
            });
        }

        let (order_by, limit) = self.parse_query_organization()?;

        match output {
            QueryExpr::Grouping(ref mut grouping_query_expr) => {
                grouping_query_expr.with = with;
                grouping_query_expr.order_by = order_by;
                grouping_query_expr.limit = limit;
            }
            QueryExpr::Select(ref mut select_query_expr) => {
                select_query_expr.with = with;
                select_query_expr.order_by = order_by;
                select_query_expr.limit = limit;
            }
            QueryExpr::SetSelect(ref mut set_select_query_expr) => {
                set_select_query_expr.with = with;
                set_select_query_expr.order_by = order_by;
                set_select_query_expr.limit = limit;
            }
        }

        Ok(output)
    }

    // query_organization ->
    // (("ORDER" | "SORT") "BY" order_by_expr | ("CLUSTER" | "DISTRIBUTE") "BY" expr ("," expr)*
    // | "WINDOW" named_windows)*
    // ["LIMIT" expr] ["OFFSET" expr]
    fn parse_query_organization(&mut self) -> anyhow::Result<(Option<OrderBy>, Option<Limit>)> {
        let mut order_by = None;
        loop {
            if self.match_token_type(TokenTypeVariant::Order) || self.match_non_reserved_keyword("sort")
            {
                self.consume(TokenTypeVariant::By)?;
                order_by = Some(OrderBy {
                    exprs: self.parse_order_by_expr()?,
                });
            } else if self.match_non_reserved_keyword("cluster")
                || self.match_non_reserved_keyword("distribute")
            {
                // Physical layout only
                self.consume(TokenTypeVariant::By)?;
                self.parse_expr_list()?;
            } else if self.check_non_reserved_keyword("window")
                && self.peek_next_i(2).kind == TokenType::As
            {
                self.parse_named_windows()?;
            } else {
                break;
            }
        }

        let limit = if self.match_token_type(TokenTypeVariant::Limit) {
            let count = if self.match_token_type(TokenTypeVariant::All) {
                Expr::Null
            } else {
                self.parse_expr()?
            };
            let offset = if self.match_non_reserved_keyword("offset") {
                Some(Box::new(self.parse_expr()?))
            } else {
                None
            };
            Some(Limit {
                count: Box::new(count),
                offset,
            })
        } else {
            None
        };

        Ok((order_by, limit))
    }

    // named_windows -> "WINDOW" name "AS" window_spec ("," name "AS" window_spec)*
    fn parse_named_windows(&mut self) -> anyhow::Result<Vec<(ParseToken, WindowSpec)>> {
        self.consume_non_reserved_keyword("window")?;
        let mut windows = vec![];
        loop {
            let name = ParseToken::Single(self.consume_identifier()?.clone());
            self.consume(TokenTypeVariant::As)?;
            windows.push((name, self.parse_window_spec()?));
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        Ok(windows)
    }

    // select_query_expr -> select | "(" query_expr ")"
    fn parse_select_query_expr(&mut self) -> anyhow::Result<QueryExpr> {
        if self.match_token_type(TokenTypeVariant::LeftParen) {
            let query_expr = self.parse_query_expr()?;
            self.consume(TokenTypeVariant::RightParen)?;
            Ok(QueryExpr::Grouping(GroupingQueryExpr {
                with: None,
                order_by: None,
                query: Box::new(query_expr),
                limit: None,
            }))
        } else {
            let select = self.parse_select()?;
            Ok(QueryExpr::Select(SelectQueryExpr {
                with: None,
                order_by: None,
                select,
                limit: None,
            }))
        }
    }

    // with_expr -> ["RECURSIVE"] cte ("," cte)*
    // where:
    // cte -> ("Identifier" | "QuotedIdentifier") ["(" column ("," column)* ")"] ["AS"] "(" query_expr ")"
    fn parse_with_expr(&mut self) -> anyhow::Result<With> {
        self.match_non_reserved_keyword("recursive");
        let mut ctes = vec![];
        loop {
            let name = ParseToken::Single(self.consume_identifier()?.clone());
            if self.check_token_type(TokenTypeVariant::LeftParen) && !self.is_query_ahead(0) {
                self.skip_token_or_group()?;
            }
            self.match_token_type(TokenTypeVariant::As);
            self.consume(TokenTypeVariant::LeftParen)?;
            let start = self.curr;
            let query = self.parse_query_expr()?;
            let text = self.source_text(start);
            self.consume(TokenTypeVariant::RightParen)?;
            ctes.push(Cte { name, query, text });

            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        Ok(With { ctes })
    }

    // order_by_expr -> expr [("ASC" | "DESC")] [("NULLS" "FIRST" | "NULLS" "LAST")] ("," ...)*
    fn parse_order_by_expr(&mut self) -> anyhow::Result<Vec<OrderByExpr>> {
        let mut order_by_exprs = vec![];

        loop {
            let expr = self.parse_expr()?;

            let asc_desc = if self.match_token_type(TokenTypeVariant::Asc) {
                Some(OrderBySortDirection::Asc)
            } else if self.match_token_type(TokenTypeVariant::Desc) {
                Some(OrderBySortDirection::Desc)
            } else {
                None
            };

            let nulls = if self.match_non_reserved_keyword("nulls") {
                if self.match_non_reserved_keyword("first") {
                    Some(OrderByNulls::First)
                } else {
                    self.consume_non_reserved_keyword("last")?;
                    Some(OrderByNulls::Last)
                }
            } else {
                None
            };

            order_by_exprs.push(OrderByExpr {
                expr,
                sort_direction: asc_desc,
                nulls,
            });

            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }

        Ok(order_by_exprs)
    }

    fn parse_expr_list(&mut self) -> anyhow::Result<Vec<Expr>> {
        let mut exprs = vec![self.parse_expr()?];
        while self.match_token_type(TokenTypeVariant::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    // select ->
    // "SELECT"
    // [("ALL" | "DISTINCT")]
    // select_expr ("," select_expr)*
    // ["FROM" from]
    // ["WHERE" where_expr]
    // ["GROUP BY" group_by_expr]
    // ["HAVING" having_expr]
    fn parse_select(&mut self) -> anyhow::Result<Select> {
        self.consume(TokenTypeVariant::Select)?;

        let distinct = self.match_token_type(TokenTypeVariant::Distinct);
        self.match_token_type(TokenTypeVariant::All);

        let mut select_exprs = vec![];
        loop {
            select_exprs.push(self.parse_select_expr()?);
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }

        let from = if self.match_token_type(TokenTypeVariant::From) {
            Some(self.parse_from()?)
        } else {
            None
        };

        let r#where = if self.match_token_type(TokenTypeVariant::Where) {
            Some(Where {
                expr: Box::new(self.parse_where_expr()?),
            })
        } else {
            None
        };

        let group_by = if self.match_token_type(TokenTypeVariant::Group) {
            self.consume(TokenTypeVariant::By)?;
            Some(self.parse_group_by_expr()?)
        } else {
            None
        };

        let having = if self.match_token_type(TokenTypeVariant::Having) {
            Some(Having {
                expr: Box::new(self.parse_having_expr()?),
            })
        } else {
            None
        };

        Ok(Select {
            distinct,
            exprs: select_exprs,
            from,
            r#where,
            group_by,
            having,
        })
    }

    // select_expr -> "*" | expr [as_alias | "AS" "(" alias ("," alias)* ")"]
    fn parse_select_expr(&mut self) -> anyhow::Result<SelectExpr> {
        if self.match_token_type(TokenTypeVariant::Star) {
            return Ok(SelectExpr {
                expr: Expr::Star(StarExpr { qualifier: None }),
                alias: None,
            });
        }

        let expr = self.parse_expr()?;
        if let Expr::Star(_) = expr {
            return Ok(SelectExpr { expr, alias: None });
        }

        // Multiple aliases of a generator, `AS (key, value)`
        if self.check_token_type(TokenTypeVariant::As)
            && self.peek_next_i(1).kind == TokenType::LeftParen
        {
            self.advance();
            self.skip_token_or_group()?;
            return Ok(SelectExpr { expr, alias: None });
        }

        let alias = self.parse_as_alias()?;
        Ok(SelectExpr { expr, alias })
    }

    // from -> from_expr lateral_view*
    // where:
    // lateral_view -> "LATERAL" "VIEW" ["OUTER"] function_expr [table_alias] ["AS"] column_alias ("," column_alias)*
    fn parse_from(&mut self) -> anyhow::Result<From> {
        let expr = self.parse_from_expr()?;
        let mut lateral_views = vec![];
        while self.match_token_type(TokenTypeVariant::Lateral) {
            self.consume_non_reserved_keyword("view")?;
            let outer = self.match_token_type(TokenTypeVariant::Outer);
            let generator = self.parse_primary_expr()?;
            let table_alias = if self.check_identifier() && !self.check_non_reserved_keyword("as")
            {
                Some(ParseToken::Single(self.advance().clone()))
            } else {
                None
            };
            self.match_token_type(TokenTypeVariant::As);
            let mut column_aliases = vec![];
            if self.check_identifier() {
                loop {
                    column_aliases.push(ParseToken::Single(self.consume_identifier()?.clone()));
                    if !(self.check_token_type(TokenTypeVariant::Comma)
                        && matches!(
                            self.peek_next_i(1).kind,
                            TokenType::Identifier(_) | TokenType::QuotedIdentifier(_)
                        ))
                    {
                        break;
                    }
                    self.advance();
                }
            }
            lateral_views.push(LateralView {
                outer,
                generator,
                table_alias,
                column_aliases,
            });
        }
        Ok(From {
            expr: Box::new(expr),
            lateral_views,
        })
    }

    // from_expr -> from_item_expr (cross_join_op from_item_expr [cond] | cond_join_op from_item_expr [cond])*
    // where:
    // cross_join_op -> "CROSS" "JOIN" | ","
    // cond_join_op ->
    // ["INNER"] "JOIN" | "LEFT" ["OUTER"] "JOIN" | "RIGHT" ["OUTER"] "JOIN" | "FULL" ["OUTER"] "JOIN"
    // | ["LEFT"] "SEMI" "JOIN" | ["LEFT"] "ANTI" "JOIN"
    fn parse_from_expr(&mut self) -> anyhow::Result<FromExpr> {
        let mut output = self.parse_from_item_expr()?;

        loop {
            let kind = match &self.peek().kind {
                TokenType::Inner | TokenType::Join => {
                    self.match_token_type(TokenTypeVariant::Inner);
                    JoinKind::Inner
                }
                TokenType::Left => {
                    self.advance();
                    if self.match_non_reserved_keyword("semi") {
                        JoinKind::LeftSemi
                    } else if self.match_non_reserved_keyword("anti") {
                        JoinKind::LeftAnti
                    } else {
                        self.match_token_type(TokenTypeVariant::Outer);
                        JoinKind::Left
                    }
                }
                TokenType::Identifier(ident)
                    if (ident.eq_ignore_ascii_case("semi") || ident.eq_ignore_ascii_case("anti"))
                        && self.peek_next_i(1).kind == TokenType::Join =>
                {
                    let kind = if ident.eq_ignore_ascii_case("semi") {
                        JoinKind::LeftSemi
                    } else {
                        JoinKind::LeftAnti
                    };
                    self.advance();
                    kind
                }
                TokenType::Right => {
                    self.advance();
                    self.match_token_type(TokenTypeVariant::Outer);
                    JoinKind::Right
                }
                TokenType::Full => {
                    self.advance();
                    self.match_token_type(TokenTypeVariant::Outer);
                    JoinKind::Full
                }
                TokenType::Cross => {
                    self.advance();
                    self.consume(TokenTypeVariant::Join)?;
                    let right = self.parse_from_item_expr()?;
                    let cond = self.parse_cond()?;
                    output = FromExpr::CrossJoin(CrossJoinExpr {
                        left: Box::new(output),
                        right: Box::new(right),
                        cond,
                    });
                    continue;
                }
                TokenType::Comma => {
                    self.advance();
                    let right = self.parse_from_item_expr()?;
                    output = FromExpr::CrossJoin(CrossJoinExpr {
                        left: Box::new(output),
                        right: Box::new(right),
                        cond: None,
                    });
                    continue;
                }
                _ => break,
            };
            self.consume(TokenTypeVariant::Join)?;
            let right = self.parse_from_item_expr()?;
            let cond = self.parse_cond()?;
            output = FromExpr::Join(JoinExpr {
                kind,
                left: Box::new(output),
                right: Box::new(right),
                cond,
            });
        }
        Ok(output)
    }

    // cond -> "ON" expr | "USING" "(" ("Identifier" | "QuotedIdentifier") ("," ("Identifier" | "QuotedIdentifier"))* ")"
    fn parse_cond(&mut self) -> anyhow::Result<Option<JoinCondition>> {
        if self.match_token_type(TokenTypeVariant::On) {
            Ok(Some(JoinCondition::On(self.parse_expr()?)))
        } else if self.match_token_type(TokenTypeVariant::Using) {
            let mut using_tokens = vec![];
            self.consume(TokenTypeVariant::LeftParen)?;
            loop {
                using_tokens.push(ParseToken::Single(self.consume_identifier()?.clone()));
                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
            self.consume(TokenTypeVariant::RightParen)?;
            Ok(Some(JoinCondition::Using(using_tokens)))
        } else {
            Ok(None)
        }
    }

    // from_item_expr -> path [as_alias] | "(" query_expr ")" [as_alias] | "(" from_expr ")" [as_alias]
    fn parse_from_item_expr(&mut self) -> anyhow::Result<FromExpr> {
        if self.match_token_type(TokenTypeVariant::LeftParen) {
            if self.is_query_ahead(0) {
                let start = self.curr;
                let query_expr = self.parse_query_expr()?;
                let text = self.source_text(start);
                self.consume(TokenTypeVariant::RightParen)?;
                let alias = self.parse_as_alias()?;
                Ok(FromExpr::GroupingQuery(FromGroupingQueryExpr {
                    query: Box::new(query_expr),
                    alias,
                    text,
                }))
            } else {
                let from_expr = self.parse_from_expr()?;
                self.consume(TokenTypeVariant::RightParen)?;
                self.parse_as_alias()?;
                Ok(FromExpr::GroupingFrom(GroupingFromExpr {
                    query: Box::new(from_expr),
                }))
            }
        } else {
            let path = self.parse_path()?;
            let alias = self.parse_as_alias()?;
            Ok(FromExpr::Path(FromPathExpr { path, alias }))
        }
    }

    // as_alias -> ["AS"] ("Identifier" | "QuotedIdentifier")
    fn parse_as_alias(&mut self) -> anyhow::Result<Option<ParseToken>> {
        if self.match_token_type(TokenTypeVariant::As) {
            return Ok(Some(ParseToken::Single(self.consume_identifier()?.clone())));
        }
        if let TokenType::Identifier(ident) = &self.peek().kind {
            if NON_ALIAS_KEYWORDS.contains(&ident.to_lowercase().as_str()) {
                return Ok(None);
            }
        }
        if self.match_identifier() {
            return Ok(Some(ParseToken::Single(self.peek_prev().clone())));
        }
        Ok(None)
    }

    // path -> ("Identifier" | "QuotedIdentifier") ("." ("Identifier" | "QuotedIdentifier"))*
    fn parse_path(&mut self) -> anyhow::Result<PathExpr> {
        let mut path_identifiers = vec![self.consume_identifier()?.clone()];
        while self.check_token_type(TokenTypeVariant::Dot)
            && matches!(
                self.peek_next_i(1).kind,
                TokenType::Identifier(_) | TokenType::QuotedIdentifier(_)
            )
        {
            path_identifiers.push(self.advance().clone());
            path_identifiers.push(self.advance().clone());
        }
        Ok(PathExpr {
            expr: ParseToken::Multiple(path_identifiers),
        })
    }

    // where_expr -> expr
    fn parse_where_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_expr()
    }

    // group_by_expr -> "GROUPING" "SETS" expr | expr ("," expr)* ["WITH" ("ROLLUP" | "CUBE")]
    fn parse_group_by_expr(&mut self) -> anyhow::Result<GroupBy> {
        if self.check_non_reserved_keyword("grouping")
            && Self::is_non_reserved_keyword(self.peek_next_i(1), "sets")
        {
            self.advance();
            self.advance();
            return Ok(GroupBy {
                exprs: vec![self.parse_expr()?],
            });
        }
        let exprs = self.parse_expr_list()?;
        if self.check_token_type(TokenTypeVariant::With)
            && (Self::is_non_reserved_keyword(self.peek_next_i(1), "rollup")
                || Self::is_non_reserved_keyword(self.peek_next_i(1), "cube"))
        {
            self.advance();
            self.advance();
        }
        Ok(GroupBy { exprs })
    }

    // having_expr -> expr
    fn parse_having_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_expr()
    }

    // window_spec ->
    // "(" [name] [("PARTITION" | "DISTRIBUTE") "BY" expr ("," expr)*]
    // [("ORDER" | "SORT") "BY" order_by_expr] [("ROWS" | "RANGE") frame] ")"
    fn parse_window_spec(&mut self) -> anyhow::Result<WindowSpec> {
        self.consume(TokenTypeVariant::LeftParen)?;
        if self.check_identifier()
            && !(self.check_non_reserved_keyword("partition")
                || self.check_non_reserved_keyword("distribute")
                || self.check_non_reserved_keyword("sort")
                || self.check_non_reserved_keyword("rows")
                || self.check_non_reserved_keyword("range"))
        {
            // window name reference
            self.advance();
        }

        let partition_by = if self.match_non_reserved_keyword("partition")
            || self.match_non_reserved_keyword("distribute")
        {
            self.consume(TokenTypeVariant::By)?;
            self.parse_expr_list()?
        } else {
            vec![]
        };

        let order_by =
            if self.match_token_type(TokenTypeVariant::Order) || self.match_non_reserved_keyword("sort")
            {
                self.consume(TokenTypeVariant::By)?;
                self.parse_order_by_expr()?
            } else {
                vec![]
            };

        // Frame bounds carry no column references
        while !self.check_token_type(TokenTypeVariant::RightParen) {
            if self.is_at_end() {
                return Err(anyhow!(self.error(self.peek(), "Expected `)`.")));
            }
            self.skip_token_or_group()?;
        }
        self.consume(TokenTypeVariant::RightParen)?;

        Ok(WindowSpec {
            partition_by,
            order_by,
        })
    }

    // named_window_expr -> ("Identifier" | "QuotedIdentifier") | window_spec
    fn parse_named_window_expr(&mut self) -> anyhow::Result<NamedWindowExpr> {
        if self.match_identifier() {
            return Ok(NamedWindowExpr::Reference(ParseToken::Single(
                self.peek_prev().clone(),
            )));
        }
        Ok(NamedWindowExpr::WindowSpec(self.parse_window_spec()?))
    }

    // expr -> or_expr
    fn parse_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_or_expr()
    }

    /// Util function to parse a standard binary rule expression of kind
    ///
    /// `parse_rule -> parse_rule | next_parsing_rule ("T1" | "T2" | ... next_parsing_rule)*`
    fn parse_standard_binary_expr(
        &mut self,
        token_types_to_match: &[TokenTypeVariant],
        next_parsing_rule_fn: impl Fn(&mut Self) -> anyhow::Result<Expr>,
    ) -> anyhow::Result<Expr> {
        let start = self.curr;
        let mut output = next_parsing_rule_fn(self)?;

        while self.match_token_types(token_types_to_match) {
            let operator = self.peek_prev().clone();
            let right = next_parsing_rule_fn(self)?;
            output = Expr::Binary(BinaryExpr {
                left: Box::new(output),
                operator: ParseToken::Single(operator),
                right: Box::new(right),
                text: self.source_text(start),
            });
        }

        Ok(output)
    }

    // or_expr -> and_expr ("OR" and_expr)*
    fn parse_or_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(&[TokenTypeVariant::Or], Self::parse_and_expr)
    }

    // and_expr -> not_expr ("AND" not_expr)*
    fn parse_and_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(&[TokenTypeVariant::And], Self::parse_not_expr)
    }

    // not_expr -> ("NOT" | "!") not_expr | comparison_expr
    fn parse_not_expr(&mut self) -> anyhow::Result<Expr> {
        if self.match_token_types(&[TokenTypeVariant::Not, TokenTypeVariant::Bang]) {
            let operator = self.peek_prev().clone();
            return Ok(Expr::Unary(UnaryExpr {
                operator: ParseToken::Single(operator),
                right: Box::new(self.parse_not_expr()?),
            }));
        }
        self.parse_comparison_expr()
    }

    // comparison_expr ->
    // bitwise_or_expr
    // | bitwise_or_expr (("=" | "==" | ">" | "<" | ">=" | "<=" | "!=" | "<>" | "<=>") bitwise_or_expr)*
    // | bitwise_or_expr "IS" ["NOT"] ("TRUE" | "FALSE" | "NULL" | "DISTINCT" "FROM" bitwise_or_expr)
    // | bitwise_or_expr ["NOT"] ("IN" | "LIKE") bitwise_or_expr
    // | bitwise_or_expr ["NOT"] "BETWEEN" bitwise_or_expr "AND" bitwise_or_expr
    fn parse_comparison_expr(&mut self) -> anyhow::Result<Expr> {
        let start = self.curr;
        let mut output = self.parse_bitwise_or_expr()?;

        loop {
            let curr_token = self.peek().clone();
            match curr_token.kind {
                TokenType::Equal
                | TokenType::Greater
                | TokenType::Less
                | TokenType::GreaterEqual
                | TokenType::LessEqual
                | TokenType::NotEqual
                | TokenType::NullSafeEqual
                | TokenType::Like
                | TokenType::In => {
                    self.advance();
                    let right = self.parse_bitwise_or_expr()?;
                    output = Expr::Binary(BinaryExpr {
                        left: Box::new(output),
                        operator: ParseToken::Single(curr_token),
                        right: Box::new(right),
                        text: self.source_text(start),
                    })
                }
                TokenType::Between => {
                    self.advance();
                    output = self.parse_between_rest(output, false)?;
                }
                TokenType::Is => {
                    let mut parse_tokens = vec![curr_token];
                    self.advance();
                    if self.match_token_type(TokenTypeVariant::Not) {
                        parse_tokens.push(self.peek_prev().clone());
                    }
                    let right = if self.match_token_type(TokenTypeVariant::Distinct) {
                        parse_tokens.push(self.peek_prev().clone());
                        parse_tokens.push(self.consume(TokenTypeVariant::From)?.clone());
                        self.parse_bitwise_or_expr()?
                    } else {
                        let right_literal = self
                            .consume_one_of(&[
                                TokenTypeVariant::Null,
                                TokenTypeVariant::True,
                                TokenTypeVariant::False,
                            ])?
                            .clone();
                        match right_literal.kind {
                            TokenType::True => Expr::Bool(true),
                            TokenType::False => Expr::Bool(false),
                            _ => Expr::Null,
                        }
                    };
                    output = Expr::Binary(BinaryExpr {
                        left: Box::new(output),
                        operator: ParseToken::Multiple(parse_tokens),
                        right: Box::new(right),
                        text: self.source_text(start),
                    })
                }
                TokenType::Not
                    if matches!(
                        self.peek_next_i(1).kind,
                        TokenType::In | TokenType::Like | TokenType::Between
                    ) =>
                {
                    self.advance();
                    if self.match_token_type(TokenTypeVariant::Between) {
                        output = self.parse_between_rest(output, true)?;
                        continue;
                    }
                    let operator = self.advance().clone();
                    let right = self.parse_bitwise_or_expr()?;
                    output = Expr::Binary(BinaryExpr {
                        left: Box::new(output),
                        operator: ParseToken::Multiple(vec![curr_token, operator]),
                        right: Box::new(right),
                        text: self.source_text(start),
                    })
                }
                _ => {
                    break;
                }
            }
        }
        Ok(output)
    }

    fn parse_between_rest(&mut self, expr: Expr, negated: bool) -> anyhow::Result<Expr> {
        let low = self.parse_bitwise_or_expr()?;
        self.consume(TokenTypeVariant::And)?;
        let high = self.parse_bitwise_or_expr()?;
        Ok(Expr::Between(BetweenExpr {
            expr: Box::new(expr),
            negated,
            low: Box::new(low),
            high: Box::new(high),
        }))
    }

    // bitwise_or_expr -> bitwise_xor_expr ("|" bitwise_xor_expr)*
    fn parse_bitwise_or_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(
            &[TokenTypeVariant::BitwiseOr],
            Self::parse_bitwise_xor_expr,
        )
    }

    // bitwise_xor_expr -> bitwise_and_expr ("^" bitwise_and_expr)*
    fn parse_bitwise_xor_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(
            &[TokenTypeVariant::BitwiseXor],
            Self::parse_bitwise_and_expr,
        )
    }

    // bitwise_and_expr -> add_expr ("&" add_expr)*
    fn parse_bitwise_and_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(&[TokenTypeVariant::BitwiseAnd], Self::parse_add_expr)
    }

    // add_expr -> mul_expr (("+" | "-" | "||") mul_expr)*
    fn parse_add_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(
            &[
                TokenTypeVariant::Plus,
                TokenTypeVariant::Minus,
                TokenTypeVariant::ConcatOperator,
            ],
            Self::parse_mul_expr,
        )
    }

    // mul_expr -> unary_expr (("*" | "/" | "%" | "DIV") unary_expr)*
    fn parse_mul_expr(&mut self) -> anyhow::Result<Expr> {
        let start = self.curr;
        let mut output = self.parse_unary_expr()?;

        while self.match_token_types(&[
            TokenTypeVariant::Star,
            TokenTypeVariant::Slash,
            TokenTypeVariant::Percent,
        ]) || self.match_non_reserved_keyword("div")
        {
            let operator = self.peek_prev().clone();
            let right = self.parse_unary_expr()?;
            output = Expr::Binary(BinaryExpr {
                left: Box::new(output),
                operator: ParseToken::Single(operator),
                right: Box::new(right),
                text: self.source_text(start),
            });
        }

        Ok(output)
    }

    // unary_expr -> ("+" | "-" | "~") unary_expr | subscript_expr
    fn parse_unary_expr(&mut self) -> anyhow::Result<Expr> {
        if self.match_token_types(&[
            TokenTypeVariant::Plus,
            TokenTypeVariant::Minus,
            TokenTypeVariant::BitwiseNot,
        ]) {
            let operator = self.peek_prev().clone();
            return Ok(Expr::Unary(UnaryExpr {
                operator: ParseToken::Single(operator),
                right: Box::new(self.parse_unary_expr()?),
            }));
        }
        self.parse_subscript_expr()
    }

    // subscript_expr -> primary_expr ("[" expr "]" | "." ("Identifier" | "QuotedIdentifier"))*
    fn parse_subscript_expr(&mut self) -> anyhow::Result<Expr> {
        let mut output = self.parse_primary_expr()?;

        loop {
            if self.match_token_type(TokenTypeVariant::LeftSquare) {
                let index = self.parse_expr()?;
                self.consume(TokenTypeVariant::RightSquare)?;
                output = Expr::Subscript(SubscriptExpr {
                    expr: Box::new(output),
                    index: Box::new(index),
                });
            } else if self.check_token_type(TokenTypeVariant::Dot)
                && matches!(output, Expr::Subscript(_) | Expr::Function(_))
            {
                // struct field of an element, `arr[0].field`
                self.advance();
                let field = self.consume_identifier()?.clone();
                output = Expr::Subscript(SubscriptExpr {
                    expr: Box::new(output),
                    index: Box::new(Expr::String(field.lexeme)),
                });
            } else {
                break;
            }
        }
        Ok(output)
    }

    // case_expr -> "CASE" [expr] ("WHEN" expr "THEN" expr)+ ["ELSE" expr] "END"
    fn parse_case_expr(&mut self) -> anyhow::Result<Expr> {
        let start = self.curr;
        self.consume(TokenTypeVariant::Case)?;

        let case = if self.check_token_type(TokenTypeVariant::When) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };

        let mut when_thens = vec![];
        while self.match_token_type(TokenTypeVariant::When) {
            let when_expr = self.parse_expr()?;
            self.consume(TokenTypeVariant::Then)?;
            let then_expr = self.parse_expr()?;
            when_thens.push((when_expr, then_expr));
        }
        if when_thens.is_empty() {
            return Err(anyhow!(self.error(self.peek(), "Expected `WHEN`.")));
        }

        let r#else = if self.match_token_type(TokenTypeVariant::Else) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        self.consume(TokenTypeVariant::End)?;

        Ok(Expr::Case(CaseExpr {
            case,
            when_thens,
            r#else,
            text: self.source_text(start),
        }))
    }

    // cast -> "CAST" "(" expr "AS" type ")"
    fn parse_cast_expr(&mut self) -> anyhow::Result<Expr> {
        let start = self.curr;
        self.consume(TokenTypeVariant::Cast)?;
        self.consume(TokenTypeVariant::LeftParen)?;
        let expr = self.parse_expr()?;
        self.consume(TokenTypeVariant::As)?;
        let type_start = self.curr;
        self.skip_type()?;
        let r#type = self.source_text(type_start);
        self.consume(TokenTypeVariant::RightParen)?;
        Ok(Expr::Cast(CastExpr {
            expr: Box::new(expr),
            r#type,
            text: self.source_text(start),
        }))
    }

    // function_expr ->
    // path "(" [("DISTINCT" | "ALL")] [arg (("," | "FROM" | "FOR") arg)*] ")"
    // [("IGNORE" | "RESPECT") "NULLS"] ["FILTER" "(" "WHERE" expr ")"] ["OVER" named_window_expr]
    // where:
    // arg -> ["BOTH" | "LEADING" | "TRAILING"] expr ["AS" type] | lambda
    fn parse_function_expr(&mut self, start: usize, name: ParseToken) -> anyhow::Result<Expr> {
        self.consume(TokenTypeVariant::LeftParen)?;
        let function_name = name.identifier().to_lowercase();

        let distinct = self.match_token_type(TokenTypeVariant::Distinct);
        self.match_token_type(TokenTypeVariant::All);

        if function_name == "extract"
            && self.check_identifier()
            && self.peek_next_i(1).kind == TokenType::From
        {
            // extract(field FROM source): the field is not a column
            self.advance();
            self.advance();
        }

        let mut arguments = vec![];
        if !self.check_token_type(TokenTypeVariant::RightParen) {
            loop {
                if function_name == "trim"
                    && (self.check_non_reserved_keyword("both")
                        || self.check_non_reserved_keyword("leading")
                        || self.check_non_reserved_keyword("trailing"))
                    && !matches!(
                        self.peek_next_i(1).kind,
                        TokenType::Comma | TokenType::RightParen
                    )
                {
                    self.advance();
                }
                if self.check_token_type(TokenTypeVariant::From) {
                    // trim(BOTH FROM col)
                    self.advance();
                }
                arguments.push(self.parse_expr()?);
                if self.match_token_type(TokenTypeVariant::As) {
                    self.skip_type()?;
                }
                if !(self.match_token_types(&[TokenTypeVariant::Comma, TokenTypeVariant::From])
                    || self.match_non_reserved_keyword("for"))
                {
                    break;
                }
            }
        }
        self.consume(TokenTypeVariant::RightParen)?;

        if (self.check_non_reserved_keyword("ignore") || self.check_non_reserved_keyword("respect"))
            && Self::is_non_reserved_keyword(self.peek_next_i(1), "nulls")
        {
            self.advance();
            self.advance();
        }

        if self.check_non_reserved_keyword("filter")
            && self.peek_next_i(1).kind == TokenType::LeftParen
        {
            self.advance();
            self.advance();
            self.consume(TokenTypeVariant::Where)?;
            arguments.push(self.parse_expr()?);
            self.consume(TokenTypeVariant::RightParen)?;
        }

        if self.check_non_reserved_keyword("within")
            && self.peek_next_i(1).kind == TokenType::Group
        {
            self.advance();
            self.advance();
            self.consume(TokenTypeVariant::LeftParen)?;
            self.consume(TokenTypeVariant::Order)?;
            self.consume(TokenTypeVariant::By)?;
            arguments.extend(self.parse_order_by_expr()?.into_iter().map(|el| el.expr));
            self.consume(TokenTypeVariant::RightParen)?;
        }

        let over = if self.match_token_type(TokenTypeVariant::Over) {
            Some(self.parse_named_window_expr()?)
        } else {
            None
        };

        Ok(Expr::Function(Box::new(FunctionExpr {
            name,
            distinct,
            arguments,
            over,
            text: self.source_text(start),
        })))
    }

    // interval_expr -> "INTERVAL" (["-"] ("Number" | "String") [unit])+
    fn parse_interval_expr(&mut self) -> anyhow::Result<Expr> {
        self.consume_non_reserved_keyword("interval")?;
        let value = self.parse_unary_expr()?;
        let unit_start = self.curr;
        while self.check_token_type(TokenTypeVariant::Identifier)
            && INTERVAL_UNITS.contains(&self.peek().lexeme.to_lowercase().as_str())
        {
            self.advance();
            if matches!(
                self.peek().kind,
                TokenType::Number(_) | TokenType::String(_)
            ) && matches!(self.peek_next_i(1).kind, TokenType::Identifier(_))
            {
                self.advance();
            }
        }
        let unit = if self.curr > unit_start {
            Some(self.source_text(unit_start))
        } else {
            None
        };
        Ok(Expr::Interval(IntervalExpr {
            value: Box::new(value),
            unit,
        }))
    }

    // identifier_expr ->
    // path "(" ... ")"                      (function_expr)
    // | path "." "*"                        (qualified star)
    // | path                                (column reference)
    // | ("Identifier") "->" expr            (lambda)
    fn parse_identifier_expr(&mut self) -> anyhow::Result<Expr> {
        let start = self.curr;

        if self.peek_next_i(1).kind == TokenType::Arrow {
            let param = ParseToken::Single(self.advance().clone());
            self.advance();
            let body = self.parse_expr()?;
            return Ok(Expr::Lambda(LambdaExpr {
                params: vec![param],
                body: Box::new(body),
            }));
        }

        let mut parts = vec![self.advance().clone()];
        loop {
            if !self.check_token_type(TokenTypeVariant::Dot) {
                break;
            }
            match self.peek_next_i(1).kind {
                TokenType::Identifier(_) | TokenType::QuotedIdentifier(_) => {
                    parts.push(self.advance().clone());
                    parts.push(self.advance().clone());
                }
                TokenType::Star => {
                    self.advance();
                    self.advance();
                    return Ok(Expr::Star(StarExpr {
                        qualifier: Some(ParseToken::Multiple(parts)),
                    }));
                }
                _ => break,
            }
        }

        if self.check_token_type(TokenTypeVariant::LeftParen) {
            return self.parse_function_expr(start, ParseToken::Multiple(parts));
        }

        let name = parts.pop().map(ParseToken::Single).ok_or_else(|| {
            anyhow!(self.error(self.peek_prev(), "Expected identifier."))
        })?;
        // drop the trailing dot of the qualifier
        parts.pop();
        let qualifier = if parts.is_empty() {
            None
        } else {
            Some(ParseToken::Multiple(parts))
        };
        Ok(Expr::Column(ColumnExpr { qualifier, name }))
    }

    // primary_expr ->
    // "True" | "False" | "Null" | "String" | "Number" | "*"
    // | DATE "String" | TIMESTAMP "String" | interval_expr
    // | case_expr | cast | "EXISTS" "(" query_expr ")"
    // | identifier_expr
    // | "(" expr ("," expr)* ")" ["->" expr] | "(" query_expr ")"
    fn parse_primary_expr(&mut self) -> anyhow::Result<Expr> {
        let peek_token = self.peek().clone();
        let primary_expr = match peek_token.kind {
            TokenType::True => {
                self.advance();
                Expr::Bool(true)
            }
            TokenType::False => {
                self.advance();
                Expr::Bool(false)
            }
            TokenType::Null => {
                self.advance();
                Expr::Null
            }
            TokenType::Number(num) => {
                self.advance();
                Expr::Number(num)
            }
            TokenType::String(str) => {
                self.advance();
                Expr::String(str)
            }
            TokenType::Star => {
                self.advance();
                Expr::Star(StarExpr { qualifier: None })
            }
            TokenType::Case => self.parse_case_expr()?,
            TokenType::Cast => self.parse_cast_expr()?,
            TokenType::Exists => {
                self.advance();
                self.consume(TokenTypeVariant::LeftParen)?;
                let query_expr = self.parse_query_expr()?;
                self.consume(TokenTypeVariant::RightParen)?;
                Expr::Exists(Box::new(query_expr))
            }
            // Functions whose name is a reserved keyword
            TokenType::Left | TokenType::Right
                if self.peek_next_i(1).kind == TokenType::LeftParen =>
            {
                let start = self.curr;
                let name = ParseToken::Single(self.advance().clone());
                self.parse_function_expr(start, name)?
            }
            TokenType::Identifier(ident) => {
                let lower_ident = ident.to_lowercase();
                let next_kind = &self.peek_next_i(1).kind;
                match lower_ident.as_str() {
                    "date" | "timestamp" | "timestamp_ntz" | "timestamp_ltz"
                        if matches!(next_kind, TokenType::String(_)) =>
                    {
                        self.advance();
                        match &self.advance().kind {
                            TokenType::String(value) => Expr::TypedString(TypedStringExpr {
                                r#type: lower_ident.clone(),
                                value: value.clone(),
                            }),
                            _ => unreachable!(),
                        }
                    }
                    "interval"
                        if matches!(
                            next_kind,
                            TokenType::String(_) | TokenType::Number(_) | TokenType::Minus
                        ) =>
                    {
                        self.parse_interval_expr()?
                    }
                    _ => self.parse_identifier_expr()?,
                }
            }
            TokenType::QuotedIdentifier(_) => self.parse_identifier_expr()?,
            TokenType::LeftParen => {
                self.advance();
                if self.is_query_ahead(0) {
                    let query_expr = self.parse_query_expr()?;
                    self.consume(TokenTypeVariant::RightParen)?;
                    return Ok(Expr::Query(Box::new(query_expr)));
                }
                let expr = self.parse_expr()?;
                if self.match_token_type(TokenTypeVariant::Comma) {
                    let mut exprs = vec![expr];
                    loop {
                        exprs.push(self.parse_expr()?);
                        if !self.match_token_type(TokenTypeVariant::Comma) {
                            break;
                        }
                    }
                    self.consume(TokenTypeVariant::RightParen)?;
                    if self.match_token_type(TokenTypeVariant::Arrow) {
                        return self.parse_lambda_rest(exprs);
                    }
                    return Ok(Expr::List(exprs));
                }
                self.consume(TokenTypeVariant::RightParen)?;
                if self.match_token_type(TokenTypeVariant::Arrow) {
                    return self.parse_lambda_rest(vec![expr]);
                }
                Expr::Grouping(GroupingExpr {
                    expr: Box::new(expr),
                })
            }
            _ => {
                return Err(anyhow!(self.error(&peek_token, "Expected Expression.")));
            }
        };

        Ok(primary_expr)
    }

    fn parse_lambda_rest(&mut self, params: Vec<Expr>) -> anyhow::Result<Expr> {
        let params = params
            .into_iter()
            .map(|param| match param {
                Expr::Column(ColumnExpr {
                    qualifier: None,
                    name,
                }) => Ok(name),
                _ => Err(anyhow!(
                    self.error(self.peek_prev(), "Expected lambda parameter.")
                )),
            })
            .collect::<anyhow::Result<Vec<ParseToken>>>()?;
        let body = self.parse_expr()?;
        Ok(Expr::Lambda(LambdaExpr {
            params,
            body: Box::new(body),
        }))
    }
}

pub fn parse_sql(sql: &str) -> anyhow::Result<Ast> {
    log::debug!("Parsing {}", sql.chars().take(50).collect::<String>());

    let mut scanner = Scanner::new(sql);

    scanner.scan()?;

    log::debug!("Tokens:");
    scanner
        .tokens()
        .iter()
        .for_each(|tok| log::debug!("{:?}", tok));

    let mut parser = Parser::new(sql, scanner.tokens());
    let ast = parser.parse()?;
    log::debug!("AST: {:?}", ast);
    Ok(ast)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(sql: &str) -> Statement {
        let mut ast = parse_sql(sql).unwrap();
        assert_eq!(ast.statements.len(), 1, "Expected one statement for: {}", sql);
        ast.statements.remove(0)
    }

    #[test]
    fn parses_function_source_text() {
        let statement = parse_one("SELECT max(col1) , count( * ) AS cnt FROM tab1");
        let Statement::Query(QueryStatement {
            query: QueryExpr::Select(select_query),
        }) = statement
        else {
            panic!("Expected a select query");
        };
        let texts = select_query
            .select
            .exprs
            .iter()
            .map(|select_expr| match &select_expr.expr {
                Expr::Function(function) => function.text.clone(),
                _ => panic!("Expected a function"),
            })
            .collect::<Vec<String>>();
        assert_eq!(texts, vec!["max(col1)", "count( * )"]);
    }

    #[test]
    fn parses_subquery_text() {
        let statement = parse_one("SELECT col1 FROM ( SELECT col1 FROM tab1 ) dt");
        let Statement::Query(QueryStatement {
            query: QueryExpr::Select(select_query),
        }) = statement
        else {
            panic!("Expected a select query");
        };
        let from = select_query.select.from.unwrap();
        match *from.expr {
            FromExpr::GroupingQuery(grouping) => {
                assert_eq!(grouping.text, "SELECT col1 FROM tab1");
                assert_eq!(grouping.alias.unwrap().identifier(), "dt");
            }
            _ => panic!("Expected a subquery"),
        }
    }

    #[test]
    fn parses_qualified_column_and_star() {
        let statement = parse_one("SELECT a.col1, b.* FROM tab1 a JOIN tab2 b ON a.id = b.id");
        let Statement::Query(QueryStatement {
            query: QueryExpr::Select(select_query),
        }) = statement
        else {
            panic!("Expected a select query");
        };
        match &select_query.select.exprs[0].expr {
            Expr::Column(ColumnExpr {
                qualifier: Some(qualifier),
                name,
            }) => {
                assert_eq!(qualifier.identifier(), "a");
                assert_eq!(name.identifier(), "col1");
            }
            _ => panic!("Expected a qualified column"),
        }
        match &select_query.select.exprs[1].expr {
            Expr::Star(StarExpr {
                qualifier: Some(qualifier),
            }) => assert_eq!(qualifier.identifier(), "b"),
            _ => panic!("Expected a qualified star"),
        }
    }

    #[test]
    fn parses_create_table_options() {
        let statement = parse_one(
            "CREATE TABLE tab1 (col1 STRING COMMENT 'x', col2 array<struct<a:int,b:string>>) \
             ROW FORMAT SERDE 'org.apache.hadoop.hive.serde2.RegexSerDe' \
             WITH SERDEPROPERTIES ('input.regex' = '(.*)') STORED AS TEXTFILE \
             LOCATION 's3://bucket/path' AS SELECT * FROM tab2",
        );
        match statement {
            Statement::CreateTable(create) => {
                assert_eq!(create.name.identifier(), "tab1");
                assert_eq!(create.columns.map(|cols| cols.len()), Some(2));
                assert!(create.query.is_some());
            }
            _ => panic!("Expected create table"),
        }
    }

    #[test]
    fn parses_unsupported_statement_as_other() {
        match parse_one("refresh table tab1") {
            Statement::Other(other) => {
                assert_eq!(other.keyword, "refresh");
                assert_eq!(other.text, "refresh table tab1");
            }
            _ => panic!("Expected other statement"),
        }
    }

    #[test]
    fn parses_cte_before_insert() {
        match parse_one("WITH c AS (SELECT * FROM tab1) INSERT INTO tab2 SELECT * FROM c") {
            Statement::Insert(insert) => match insert.source {
                InsertSource::Query(query) => {
                    let with = query.with().unwrap();
                    assert_eq!(with.ctes[0].name.identifier(), "c");
                    assert_eq!(with.ctes[0].text, "SELECT * FROM tab1");
                }
                _ => panic!("Expected insert query"),
            },
            _ => panic!("Expected insert"),
        }
    }

    #[test]
    fn fails_on_garbage() {
        assert!(parse_sql("SELECT FROM WHERE").is_err());
    }
}
