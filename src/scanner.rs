use anyhow::anyhow;

use crate::ast::{Token, TokenType};

const NUMBER_SUFFIXES: [&str; 6] = ["l", "s", "y", "d", "f", "bd"];

pub struct Scanner {
    source_chars: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: u32,
    col: u32,
}

impl Scanner {
    pub fn new(source: &str) -> Self {
        Self {
            source_chars: source.chars().collect(),
            tokens: vec![],
            start: 0,
            current: 0,
            line: 1,
            col: 0,
        }
    }

    pub fn tokens(&self) -> &Vec<Token> {
        &self.tokens
    }

    fn advance(&mut self) -> char {
        let c = self.source_chars[self.current];
        self.current += 1;
        self.col += 1;
        c
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source_chars.len()
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.source_chars[self.current]
        }
    }

    fn peek_next_i(&self, i: usize) -> char {
        if self.current + i >= self.source_chars.len() {
            '\0'
        } else {
            self.source_chars[self.current + i]
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() != expected {
            return false;
        };

        self.current += 1;
        self.col += 1;
        true
    }

    fn add_token(&mut self, token_type: TokenType) {
        self.tokens.push(Token {
            kind: token_type,
            lexeme: self.current_source_str(),
            line: self.line,
            col: self.col,
            start: self.start,
            end: self.current,
        });
    }

    fn current_source_str(&self) -> String {
        self.source_chars[self.start..self.current].iter().collect()
    }

    fn reset(&mut self) {
        self.tokens.clear();
        self.start = 0;
        self.current = 0;
        self.col = 1;
        self.line = 1;
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.col = 1;
    }

    pub fn scan(&mut self) -> anyhow::Result<()> {
        self.reset();
        while self.current < self.source_chars.len() {
            self.start = self.current;
            self.scan_token()?;
        }
        self.tokens.push(Token {
            kind: TokenType::Eof,
            lexeme: String::from("eof"),
            line: self.line,
            col: self.col,
            start: self.current,
            end: self.current,
        });

        Ok(())
    }

    fn match_number(&mut self) -> anyhow::Result<()> {
        let mut found_dot = false;
        let mut found_e = false;
        loop {
            let peek_char = self.peek();

            if peek_char == '.' {
                if found_dot || found_e {
                    return Err(anyhow!(self.error_str("Found invalid number")));
                }
                found_dot = true;
                self.advance();
            } else if (peek_char == 'e' || peek_char == 'E')
                && (self.peek_next_i(1).is_ascii_digit()
                    || ((self.peek_next_i(1) == '+' || self.peek_next_i(1) == '-')
                        && self.peek_next_i(2).is_ascii_digit()))
            {
                if found_e {
                    return Err(anyhow!(self.error_str("Found invalid number")));
                }
                found_e = true;
                self.advance();
                let sign = self.peek();
                if sign == '+' || sign == '-' {
                    self.advance();
                }
            } else if peek_char.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        // Typed literal suffixes (`10L`, `1.5BD`), otherwise a digit-led identifier.
        let suffix_start = self.current;
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }
        if self.current > suffix_start {
            let suffix = self.source_chars[suffix_start..self.current]
                .iter()
                .collect::<String>()
                .to_lowercase();
            if !NUMBER_SUFFIXES.contains(&suffix.as_str()) {
                self.add_token(TokenType::Identifier(self.current_source_str()));
                return Ok(());
            }
        }

        self.add_token(TokenType::Number(self.current_source_str()));
        Ok(())
    }

    fn match_string(&mut self, delimiter: char) -> anyhow::Result<()> {
        let mut value = String::new();
        loop {
            let peek_char = self.peek();
            if peek_char == '\0' && self.is_at_end() {
                return Err(anyhow!(self.error_str("Found unterminated string")));
            }
            if peek_char == '\\' {
                self.advance();
                if self.is_at_end() {
                    return Err(anyhow!(self.error_str("Found unterminated string")));
                }
                let escaped = self.advance();
                value.push(escaped);
                continue;
            }
            if self.match_char(delimiter) {
                // `''` inside a string is an escaped delimiter
                if self.peek() == delimiter {
                    self.advance();
                    value.push(delimiter);
                    continue;
                }
                break;
            }
            if peek_char == '\n' {
                self.new_line();
            }
            value.push(self.advance());
        }
        self.add_token(TokenType::String(value));
        Ok(())
    }

    /// Hive variable substitution, `${hivevar:name}`, kept as an identifier.
    fn match_variable(&mut self) -> anyhow::Result<()> {
        loop {
            if self.is_at_end() {
                return Err(anyhow!(self.error_str("Found unterminated variable")));
            }
            if self.advance() == '}' {
                break;
            }
        }
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }
        self.add_token(TokenType::Identifier(self.current_source_str()));
        Ok(())
    }

    fn match_keyword_or_identifier(&mut self) {
        loop {
            let peek_char = self.peek();
            if !(peek_char.is_alphanumeric() || peek_char == '_') {
                break;
            }
            self.advance();
        }
        let identifer: String = self.current_source_str();

        match identifer.to_lowercase().as_str() {
            "all" => self.add_token(TokenType::All),
            "and" => self.add_token(TokenType::And),
            "as" => self.add_token(TokenType::As),
            "asc" => self.add_token(TokenType::Asc),
            "between" => self.add_token(TokenType::Between),
            "by" => self.add_token(TokenType::By),
            "case" => self.add_token(TokenType::Case),
            "cast" => self.add_token(TokenType::Cast),
            "create" => self.add_token(TokenType::Create),
            "cross" => self.add_token(TokenType::Cross),
            "desc" => self.add_token(TokenType::Desc),
            "distinct" => self.add_token(TokenType::Distinct),
            "else" => self.add_token(TokenType::Else),
            "end" => self.add_token(TokenType::End),
            "except" => self.add_token(TokenType::Except),
            "exists" => self.add_token(TokenType::Exists),
            "false" => self.add_token(TokenType::False),
            "from" => self.add_token(TokenType::From),
            "full" => self.add_token(TokenType::Full),
            "group" => self.add_token(TokenType::Group),
            "having" => self.add_token(TokenType::Having),
            "in" => self.add_token(TokenType::In),
            "inner" => self.add_token(TokenType::Inner),
            "intersect" => self.add_token(TokenType::Intersect),
            "into" => self.add_token(TokenType::Into),
            "is" => self.add_token(TokenType::Is),
            "join" => self.add_token(TokenType::Join),
            "lateral" => self.add_token(TokenType::Lateral),
            "left" => self.add_token(TokenType::Left),
            "like" | "rlike" | "regexp" => self.add_token(TokenType::Like),
            "limit" => self.add_token(TokenType::Limit),
            "not" => self.add_token(TokenType::Not),
            "null" => self.add_token(TokenType::Null),
            "on" => self.add_token(TokenType::On),
            "or" => self.add_token(TokenType::Or),
            "order" => self.add_token(TokenType::Order),
            "outer" => self.add_token(TokenType::Outer),
            "over" => self.add_token(TokenType::Over),
            "right" => self.add_token(TokenType::Right),
            "select" => self.add_token(TokenType::Select),
            "then" => self.add_token(TokenType::Then),
            "true" => self.add_token(TokenType::True),
            "union" => self.add_token(TokenType::Union),
            "using" => self.add_token(TokenType::Using),
            "when" => self.add_token(TokenType::When),
            "where" => self.add_token(TokenType::Where),
            "with" => self.add_token(TokenType::With),
            _ => self.add_token(TokenType::Identifier(identifer)),
        }
    }

    fn scan_token(&mut self) -> anyhow::Result<()> {
        let curr_char = self.advance();
        match curr_char {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '[' => self.add_token(TokenType::LeftSquare),
            ']' => self.add_token(TokenType::RightSquare),
            '*' => self.add_token(TokenType::Star),
            ',' => self.add_token(TokenType::Comma),
            ':' => self.add_token(TokenType::Colon),
            ';' => self.add_token(TokenType::Semicolon),
            '%' => self.add_token(TokenType::Percent),
            '.' => {
                if self.peek().is_ascii_digit() {
                    self.match_number()?;
                } else {
                    self.add_token(TokenType::Dot);
                }
            }
            '+' => self.add_token(TokenType::Plus),
            '=' => {
                self.match_char('=');
                self.add_token(TokenType::Equal)
            }
            '/' => {
                if self.match_char('*') {
                    loop {
                        if self.is_at_end() {
                            return Err(anyhow!(self.error_str("Found unterminated comment")));
                        }
                        if self.peek() == '\n' {
                            self.new_line();
                        }
                        if self.peek() == '*' && self.peek_next_i(1) == '/' {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                } else {
                    self.add_token(TokenType::Slash)
                }
            }
            '-' => {
                if self.match_char('-') {
                    loop {
                        let peek_char = self.peek();
                        if peek_char == '\n' || self.is_at_end() {
                            break;
                        }
                        self.advance();
                    }
                } else if self.match_char('>') {
                    self.add_token(TokenType::Arrow)
                } else {
                    self.add_token(TokenType::Minus)
                }
            }
            '<' => {
                if self.match_char('>') {
                    self.add_token(TokenType::NotEqual);
                } else if self.match_char('=') {
                    if self.match_char('>') {
                        self.add_token(TokenType::NullSafeEqual);
                    } else {
                        self.add_token(TokenType::LessEqual);
                    }
                } else {
                    self.add_token(TokenType::Less);
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.add_token(TokenType::NotEqual);
                } else {
                    self.add_token(TokenType::Bang);
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.add_token(TokenType::GreaterEqual);
                } else {
                    self.add_token(TokenType::Greater);
                }
            }
            '~' => self.add_token(TokenType::BitwiseNot),
            '&' => self.add_token(TokenType::BitwiseAnd),
            '|' => {
                if self.match_char('|') {
                    self.add_token(TokenType::ConcatOperator);
                } else {
                    self.add_token(TokenType::BitwiseOr);
                }
            }
            '^' => self.add_token(TokenType::BitwiseXor),
            '\n' => {
                self.new_line();
            }
            '\r' | ' ' | '\t' => {}

            // strings
            c if c == '\'' || c == '"' => {
                self.match_string(c)?;
            }

            '$' if self.peek() == '{' => {
                self.match_variable()?;
            }

            // numeric
            c if c.is_ascii_digit() => {
                self.match_number()?;
            }

            // Keywords and identifiers
            c if c.is_alphabetic() || c == '_' => {
                self.match_keyword_or_identifier();
            }

            '`' => {
                let quoted_ident_start_idx = self.current - 1;
                let mut ident = String::new();
                loop {
                    if self.is_at_end() {
                        return Err(anyhow!(
                            self.error_str("Found unterminated quoted identifier")
                        ));
                    }
                    let curr_char = self.advance();
                    if curr_char == '`' {
                        // ``` `` ``` escapes a backtick
                        if self.peek() == '`' {
                            self.advance();
                            ident.push('`');
                            continue;
                        }
                        if self.current - 1 == quoted_ident_start_idx + 1 {
                            return Err(anyhow!(self.error_str("Found empty quoted identifier.")));
                        }
                        self.add_token(TokenType::QuotedIdentifier(ident));
                        break;
                    }
                    ident.push(curr_char);
                }
            }

            _ => {
                return Err(anyhow!(self.error_str(&format!(
                    "Found unexpected character while scanning: {}",
                    curr_char
                ))));
            }
        }
        Ok(())
    }

    fn error_str(&self, error: &str) -> String {
        format!(
            "[line: {}, col: {}] Scanner error: {}",
            self.line, self.col, error
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenType> {
        let mut scanner = Scanner::new(sql);
        scanner.scan().unwrap();
        scanner.tokens().iter().map(|tok| tok.kind.clone()).collect()
    }

    #[test]
    fn scans_keywords_and_identifiers() {
        assert_eq!(
            kinds("SELECT col1 FROM `db`.tab1"),
            vec![
                TokenType::Select,
                TokenType::Identifier("col1".to_owned()),
                TokenType::From,
                TokenType::QuotedIdentifier("db".to_owned()),
                TokenType::Dot,
                TokenType::Identifier("tab1".to_owned()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments() {
        assert_eq!(
            kinds("-- a comment\nselect /* inline\n comment */ 1"),
            vec![
                TokenType::Select,
                TokenType::Number("1".to_owned()),
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn scans_strings_with_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a;b""#),
            vec![
                TokenType::String("it's".to_owned()),
                TokenType::String("a;b".to_owned()),
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn scans_number_suffixes_and_operators() {
        assert_eq!(
            kinds("10L <=> 1.5e3 -> x"),
            vec![
                TokenType::Number("10L".to_owned()),
                TokenType::NullSafeEqual,
                TokenType::Number("1.5e3".to_owned()),
                TokenType::Arrow,
                TokenType::Identifier("x".to_owned()),
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn tracks_token_offsets() {
        let mut scanner = Scanner::new("select  abc");
        scanner.scan().unwrap();
        let ident = &scanner.tokens()[1];
        assert_eq!((ident.start, ident.end), (8, 11));
    }

    #[test]
    fn scans_hive_variables() {
        assert_eq!(
            kinds("${hivevar:db}.tab"),
            vec![
                TokenType::Identifier("${hivevar:db}".to_owned()),
                TokenType::Dot,
                TokenType::Identifier("tab".to_owned()),
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn fails_on_unterminated_string() {
        let mut scanner = Scanner::new("select 'abc");
        assert!(scanner.scan().is_err());
    }
}
