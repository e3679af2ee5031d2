/// Splits a multi-statement script on `;`, ignoring semicolons inside quotes
/// and comments, the way the Spark SQL CLI driver does.
pub struct StatementSplitter {
    source_chars: Vec<char>,
    inside_single_quote: bool,
    inside_double_quote: bool,
    inside_simple_comment: bool,
    inside_bracketed_comment: bool,
    bracketed_comment_start: usize,
    escape: bool,
    begin: usize,
    is_statement: bool,
    statements: Vec<String>,
}

impl StatementSplitter {
    pub fn new(sql: &str) -> Self {
        Self {
            source_chars: sql.chars().collect(),
            inside_single_quote: false,
            inside_double_quote: false,
            inside_simple_comment: false,
            inside_bracketed_comment: false,
            bracketed_comment_start: 0,
            escape: false,
            begin: 0,
            is_statement: false,
            statements: vec![],
        }
    }

    fn inside_comment(&self) -> bool {
        self.inside_simple_comment || self.inside_bracketed_comment
    }

    fn inside_quote(&self) -> bool {
        self.inside_single_quote || self.inside_double_quote
    }

    fn peek_next(&self, index: usize) -> char {
        self.source_chars.get(index + 1).copied().unwrap_or('\0')
    }

    fn push_statement(&mut self, end: usize) {
        let statement = self.source_chars[self.begin..end]
            .iter()
            .collect::<String>()
            .trim()
            .to_owned();
        self.statements.push(statement);
    }

    pub fn split(mut self) -> Vec<String> {
        for index in 0..self.source_chars.len() {
            let c = self.source_chars[index];
            // a character that closes a bracketed comment still belongs to it
            let mut closing_comment = false;
            match c {
                '\'' if !self.inside_comment() => {
                    if !self.escape && !self.inside_double_quote {
                        self.inside_single_quote = !self.inside_single_quote;
                    }
                }
                '"' if !self.inside_comment() => {
                    if !self.escape && !self.inside_single_quote {
                        self.inside_double_quote = !self.inside_double_quote;
                    }
                }
                '-' => {
                    if !self.inside_quote() && !self.inside_comment() && self.peek_next(index) == '-'
                    {
                        self.inside_simple_comment = true;
                    }
                }
                ';' => {
                    if !self.inside_quote() && !self.inside_comment() {
                        if self.is_statement {
                            self.push_statement(index);
                        }
                        self.begin = index + 1;
                        self.is_statement = false;
                        self.escape = false;
                        continue;
                    }
                }
                '\n' => {
                    if !self.escape {
                        self.inside_simple_comment = false;
                    }
                }
                '/' if !self.inside_simple_comment && !self.inside_quote() => {
                    if self.inside_bracketed_comment {
                        if index > self.bracketed_comment_start + 2
                            && self.source_chars[index - 1] == '*'
                        {
                            self.inside_bracketed_comment = false;
                            closing_comment = true;
                        }
                    } else if self.peek_next(index) == '*' {
                        self.inside_bracketed_comment = true;
                        self.bracketed_comment_start = index;
                    }
                }
                _ => {}
            }

            if self.escape {
                self.escape = false;
            } else if c == '\\' {
                self.escape = true;
            }

            self.is_statement = self.is_statement
                || (!self.inside_comment() && !closing_comment && !c.is_whitespace());
        }

        if self.is_statement {
            self.push_statement(self.source_chars.len());
        }
        self.statements
    }
}

/// Splits `sql` into trimmed statements, dropping segments that hold only
/// whitespace or comments.
pub fn split(sql: &str) -> Vec<String> {
    StatementSplitter::new(sql).split()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_semicolons() {
        assert_eq!(
            split("SELECT * FROM tab1; SELECT * FROM tab2;"),
            vec!["SELECT * FROM tab1", "SELECT * FROM tab2"]
        );
    }

    #[test]
    fn keeps_trailing_statement_without_semicolon() {
        assert_eq!(
            split("SELECT 1;\nSELECT 2"),
            vec!["SELECT 1", "SELECT 2"]
        );
    }

    #[test]
    fn ignores_semicolons_in_quotes() {
        assert_eq!(
            split("SELECT ';' AS a, \"x;y\" AS b FROM tab1; SELECT 'it\\'s;' FROM tab2"),
            vec![
                "SELECT ';' AS a, \"x;y\" AS b FROM tab1",
                "SELECT 'it\\'s;' FROM tab2"
            ]
        );
    }

    #[test]
    fn ignores_semicolons_in_comments() {
        let sql = "-- drop; comment\nSELECT 1 /* a; b */ FROM tab1;\n/* only a comment; */\n-- trailing;";
        assert_eq!(
            split(sql),
            vec!["-- drop; comment\nSELECT 1 /* a; b */ FROM tab1"]
        );
    }

    #[test]
    fn drops_blank_segments() {
        assert_eq!(split(";;  \n ; SELECT 1 ;  ;"), vec!["SELECT 1"]);
        assert!(split("   ").is_empty());
    }

    #[test]
    fn closing_comment_is_not_a_statement() {
        assert!(split("/**/;/* x */").is_empty());
    }
}
