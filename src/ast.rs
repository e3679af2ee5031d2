use serde::{Deserialize, Serialize};
use strum_macros::EnumDiscriminants;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ast {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
    Query(QueryStatement),
    Insert(InsertStatement),
    CreateTable(CreateTableStatement),
    CreateTableLike(CreateTableLikeStatement),
    Update(UpdateStatement),
    DropTable(DropTableStatement),
    RenameTable(RenameTableStatement),
    ExchangePartition(ExchangePartitionStatement),
    Other(OtherStatement),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryStatement {
    pub query: QueryExpr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertStatement {
    pub table: ParseToken,
    pub overwrite: bool,
    pub partition: Option<Vec<PartitionSpecItem>>,
    pub columns: Option<Vec<ParseToken>>,
    pub source: InsertSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InsertSource {
    Values(Vec<Vec<Expr>>),
    Query(QueryExpr),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionSpecItem {
    pub column: ParseToken,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTableStatement {
    pub name: ParseToken,
    pub replace: bool,
    pub is_temporary: bool,
    pub if_not_exists: bool,
    pub is_view: bool,
    pub columns: Option<Vec<ParseToken>>,
    pub query: Option<QueryExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTableLikeStatement {
    pub target: ParseToken,
    pub source: ParseToken,
    pub if_not_exists: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateItem {
    pub column: ParseToken,
    pub expr: Expr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatement {
    pub table: ParseToken,
    pub alias: Option<ParseToken>,
    pub update_items: Vec<UpdateItem>,
    pub r#where: Option<Where>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropTableStatement {
    pub name: ParseToken,
    pub if_exists: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameTableStatement {
    pub from: ParseToken,
    pub to: ParseToken,
}

/// `ALTER TABLE target EXCHANGE PARTITION (...) WITH TABLE source`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangePartitionStatement {
    pub target: ParseToken,
    pub partition: Vec<PartitionSpecItem>,
    pub source: ParseToken,
}

/// A statement that is recognised but carries no lineage (`USE`, `REFRESH`, `SHOW`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtherStatement {
    pub keyword: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    Binary(BinaryExpr),
    Unary(UnaryExpr),
    Grouping(GroupingExpr),
    Between(BetweenExpr),
    List(Vec<Expr>),
    Subscript(SubscriptExpr),
    Column(ColumnExpr),
    Star(StarExpr),
    String(String),
    Number(String),
    Bool(bool),
    Null,
    TypedString(TypedStringExpr),
    Interval(IntervalExpr),
    Query(Box<QueryExpr>),
    Exists(Box<QueryExpr>),
    Case(CaseExpr),
    Cast(CastExpr),
    Function(Box<FunctionExpr>),
    Lambda(LambdaExpr),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BinaryOperatorKind {
    Arithmetic,
    Comparison,
    Logical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub left: Box<Expr>,
    pub operator: ParseToken,
    pub right: Box<Expr>,
    pub text: String,
}

impl BinaryExpr {
    pub fn operator_kind(&self) -> BinaryOperatorKind {
        let first_token = match &self.operator {
            ParseToken::Single(token) => Some(token),
            ParseToken::Multiple(tokens) => tokens.first(),
        };
        match first_token.map(|tok| &tok.kind) {
            Some(TokenType::And) | Some(TokenType::Or) => BinaryOperatorKind::Logical,
            Some(TokenType::Plus)
            | Some(TokenType::Minus)
            | Some(TokenType::Star)
            | Some(TokenType::Slash)
            | Some(TokenType::Percent)
            | Some(TokenType::ConcatOperator)
            | Some(TokenType::BitwiseAnd)
            | Some(TokenType::BitwiseOr)
            | Some(TokenType::BitwiseXor) => BinaryOperatorKind::Arithmetic,
            Some(TokenType::Identifier(ident)) if ident.eq_ignore_ascii_case("div") => {
                BinaryOperatorKind::Arithmetic
            }
            _ => BinaryOperatorKind::Comparison,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnaryExpr {
    pub operator: ParseToken,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingExpr {
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetweenExpr {
    pub expr: Box<Expr>,
    pub negated: bool,
    pub low: Box<Expr>,
    pub high: Box<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptExpr {
    pub expr: Box<Expr>,
    pub index: Box<Expr>,
}

/// Column reference, optionally qualified: `col`, `t.col`, `db.t.col`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnExpr {
    pub qualifier: Option<ParseToken>,
    pub name: ParseToken,
}

/// `*` or `t.*`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarExpr {
    pub qualifier: Option<ParseToken>,
}

/// `DATE '2020-01-01'`, `TIMESTAMP '...'`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedStringExpr {
    pub r#type: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalExpr {
    pub value: Box<Expr>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseExpr {
    pub case: Option<Box<Expr>>,
    pub when_thens: Vec<(Expr, Expr)>,
    pub r#else: Option<Box<Expr>>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastExpr {
    pub expr: Box<Expr>,
    pub r#type: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionExpr {
    pub name: ParseToken,
    pub distinct: bool,
    pub arguments: Vec<Expr>,
    pub over: Option<NamedWindowExpr>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambdaExpr {
    pub params: Vec<ParseToken>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NamedWindowExpr {
    Reference(ParseToken),
    WindowSpec(WindowSpec),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSpec {
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderByExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueryExpr {
    Grouping(GroupingQueryExpr),
    Select(SelectQueryExpr),
    SetSelect(SetSelectQueryExpr),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingQueryExpr {
    pub with: Option<With>,
    pub query: Box<QueryExpr>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectQueryExpr {
    pub with: Option<With>,
    pub select: Select,
    pub order_by: Option<OrderBy>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSelectQueryExpr {
    pub with: Option<With>,
    pub left_query: Box<QueryExpr>,
    pub set_operator: SetQueryOperator,
    pub right_query: Box<QueryExpr>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SetQueryOperator {
    Union,
    UnionDistinct,
    Intersect,
    Except,
}

impl QueryExpr {
    pub fn with_mut(&mut self) -> &mut Option<With> {
        match self {
            QueryExpr::Grouping(grouping) => &mut grouping.with,
            QueryExpr::Select(select) => &mut select.with,
            QueryExpr::SetSelect(set_select) => &mut set_select.with,
        }
    }

    pub fn with(&self) -> Option<&With> {
        match self {
            QueryExpr::Grouping(grouping) => grouping.with.as_ref(),
            QueryExpr::Select(select) => select.with.as_ref(),
            QueryExpr::SetSelect(set_select) => set_select.with.as_ref(),
        }
    }

    pub fn order_by(&self) -> Option<&OrderBy> {
        match self {
            QueryExpr::Grouping(grouping) => grouping.order_by.as_ref(),
            QueryExpr::Select(select) => select.order_by.as_ref(),
            QueryExpr::SetSelect(set_select) => set_select.order_by.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBy {
    pub exprs: Vec<OrderByExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderBySortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderByNulls {
    First,
    Last,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub sort_direction: Option<OrderBySortDirection>,
    pub nulls: Option<OrderByNulls>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limit {
    pub count: Box<Expr>,
    pub offset: Option<Box<Expr>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct With {
    pub ctes: Vec<Cte>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cte {
    pub name: ParseToken,
    pub query: QueryExpr,
    /// Source text of the cte body, without the enclosing parentheses.
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Select {
    pub distinct: bool,
    pub exprs: Vec<SelectExpr>,
    pub from: Option<From>,
    pub r#where: Option<Where>,
    pub group_by: Option<GroupBy>,
    pub having: Option<Having>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectExpr {
    pub expr: Expr,
    pub alias: Option<ParseToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct From {
    pub expr: Box<FromExpr>,
    pub lateral_views: Vec<LateralView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FromExpr {
    Join(JoinExpr),
    CrossJoin(CrossJoinExpr),
    Path(FromPathExpr),
    GroupingQuery(FromGroupingQueryExpr),
    GroupingFrom(GroupingFromExpr),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossJoinExpr {
    pub left: Box<FromExpr>,
    pub right: Box<FromExpr>,
    pub cond: Option<JoinCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinExpr {
    pub kind: JoinKind,
    pub left: Box<FromExpr>,
    pub right: Box<FromExpr>,
    pub cond: Option<JoinCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    LeftSemi,
    LeftAnti,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JoinCondition {
    On(Expr),
    Using(Vec<ParseToken>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathExpr {
    pub expr: ParseToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FromPathExpr {
    pub path: PathExpr,
    pub alias: Option<ParseToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingFromExpr {
    pub query: Box<FromExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FromGroupingQueryExpr {
    pub query: Box<QueryExpr>,
    pub alias: Option<ParseToken>,
    /// Source text of the subquery, without the enclosing parentheses.
    pub text: String,
}

/// `LATERAL VIEW [OUTER] generator(...) table_alias [AS] col_alias (, col_alias)*`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LateralView {
    pub outer: bool,
    pub generator: Expr,
    pub table_alias: Option<ParseToken>,
    pub column_aliases: Vec<ParseToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Where {
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupBy {
    pub exprs: Vec<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Having {
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ParseToken {
    Single(Token),
    Multiple(Vec<Token>),
}

impl ParseToken {
    pub fn identifier(&self) -> String {
        match self {
            ParseToken::Single(token) => match &token.kind {
                TokenType::Identifier(ident) => ident.to_owned(),
                TokenType::QuotedIdentifier(qident) => qident.to_owned(),
                _ => panic!("Can't call identifier on {:?}", self),
            },

            ParseToken::Multiple(vec) => vec
                .iter()
                .map(|tok| match &tok.kind {
                    TokenType::Identifier(ident) => ident.to_owned(),
                    TokenType::QuotedIdentifier(qident) => qident.to_owned(),
                    _ => tok.lexeme.to_owned(),
                })
                .collect::<Vec<String>>()
                .join(""),
        }
    }
}

#[derive(PartialEq, Clone, Debug, EnumDiscriminants, Serialize, Deserialize)]
#[strum_discriminants(name(TokenTypeVariant))]
pub enum TokenType {
    LeftParen,
    RightParen,
    LeftSquare,
    RightSquare,
    Comma,
    Dot,
    Minus,
    Plus,
    Star,
    Slash,
    Percent,
    Colon,
    Semicolon,
    Arrow,
    ConcatOperator,
    BitwiseNot,
    BitwiseOr,
    BitwiseAnd,
    BitwiseXor,
    Bang,
    Equal,
    NotEqual,
    NullSafeEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier(String),
    QuotedIdentifier(String),
    String(String),
    Number(String),

    // Reserved keywords
    All,
    And,
    As,
    Asc,
    Between,
    By,
    Case,
    Cast,
    Create,
    Cross,
    Desc,
    Distinct,
    Else,
    End,
    Except,
    Exists,
    False,
    From,
    Full,
    Group,
    Having,
    In,
    Inner,
    Intersect,
    Into,
    Is,
    Join,
    Lateral,
    Left,
    Like,
    Limit,
    Not,
    Null,
    On,
    Or,
    Order,
    Outer,
    Over,
    Right,
    Select,
    Then,
    True,
    Union,
    Using,
    When,
    Where,
    With,

    Eof,
}

impl TokenTypeVariant {
    pub(crate) fn variant_str(&self) -> &str {
        match self {
            TokenTypeVariant::LeftParen => "(",
            TokenTypeVariant::RightParen => ")",
            TokenTypeVariant::LeftSquare => "[",
            TokenTypeVariant::RightSquare => "]",
            TokenTypeVariant::Comma => ",",
            TokenTypeVariant::Dot => ".",
            TokenTypeVariant::Minus => "-",
            TokenTypeVariant::Plus => "+",
            TokenTypeVariant::Star => "*",
            TokenTypeVariant::Slash => "/",
            TokenTypeVariant::Percent => "%",
            TokenTypeVariant::Colon => ":",
            TokenTypeVariant::Semicolon => ";",
            TokenTypeVariant::Arrow => "->",
            TokenTypeVariant::ConcatOperator => "||",
            TokenTypeVariant::BitwiseNot => "~",
            TokenTypeVariant::BitwiseOr => "|",
            TokenTypeVariant::BitwiseAnd => "&",
            TokenTypeVariant::BitwiseXor => "^",
            TokenTypeVariant::Bang => "!",
            TokenTypeVariant::Equal => "=",
            TokenTypeVariant::NotEqual => "<>",
            TokenTypeVariant::NullSafeEqual => "<=>",
            TokenTypeVariant::Greater => ">",
            TokenTypeVariant::GreaterEqual => ">=",
            TokenTypeVariant::Less => "<",
            TokenTypeVariant::LessEqual => "<=",
            TokenTypeVariant::Identifier => "Identifier",
            TokenTypeVariant::QuotedIdentifier => "QuotedIdentifier",
            TokenTypeVariant::String => "String",
            TokenTypeVariant::Number => "Number",
            TokenTypeVariant::All => "ALL",
            TokenTypeVariant::And => "AND",
            TokenTypeVariant::As => "AS",
            TokenTypeVariant::Asc => "ASC",
            TokenTypeVariant::Between => "BETWEEN",
            TokenTypeVariant::By => "BY",
            TokenTypeVariant::Case => "CASE",
            TokenTypeVariant::Cast => "CAST",
            TokenTypeVariant::Create => "CREATE",
            TokenTypeVariant::Cross => "CROSS",
            TokenTypeVariant::Desc => "DESC",
            TokenTypeVariant::Distinct => "DISTINCT",
            TokenTypeVariant::Else => "ELSE",
            TokenTypeVariant::End => "END",
            TokenTypeVariant::Except => "EXCEPT",
            TokenTypeVariant::Exists => "EXISTS",
            TokenTypeVariant::False => "FALSE",
            TokenTypeVariant::From => "FROM",
            TokenTypeVariant::Full => "FULL",
            TokenTypeVariant::Group => "GROUP",
            TokenTypeVariant::Having => "HAVING",
            TokenTypeVariant::In => "IN",
            TokenTypeVariant::Inner => "INNER",
            TokenTypeVariant::Intersect => "INTERSECT",
            TokenTypeVariant::Into => "INTO",
            TokenTypeVariant::Is => "IS",
            TokenTypeVariant::Join => "JOIN",
            TokenTypeVariant::Lateral => "LATERAL",
            TokenTypeVariant::Left => "LEFT",
            TokenTypeVariant::Like => "LIKE",
            TokenTypeVariant::Limit => "LIMIT",
            TokenTypeVariant::Not => "NOT",
            TokenTypeVariant::Null => "NULL",
            TokenTypeVariant::On => "ON",
            TokenTypeVariant::Or => "OR",
            TokenTypeVariant::Order => "ORDER",
            TokenTypeVariant::Outer => "OUTER",
            TokenTypeVariant::Over => "OVER",
            TokenTypeVariant::Right => "RIGHT",
            TokenTypeVariant::Select => "SELECT",
            TokenTypeVariant::Then => "THEN",
            TokenTypeVariant::True => "TRUE",
            TokenTypeVariant::Union => "UNION",
            TokenTypeVariant::Using => "USING",
            TokenTypeVariant::When => "WHEN",
            TokenTypeVariant::Where => "WHERE",
            TokenTypeVariant::With => "WITH",
            TokenTypeVariant::Eof => "EOF",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenType,
    pub lexeme: String,
    pub line: u32,
    pub col: u32,
    /// Char offsets of the token in the scanned source, end exclusive.
    pub start: usize,
    pub end: usize,
}

impl Token {
    fn unquoted(&self) -> String {
        match &self.kind {
            TokenType::Identifier(ident) => ident.to_owned(),
            TokenType::QuotedIdentifier(qident) => qident.to_owned(),
            _ => self.lexeme.to_owned(),
        }
    }
}
