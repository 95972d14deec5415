//! Token view of a SQL statement, built on the `sqlparser` tokenizer for the
//! database's dialect. Literals, quoted identifiers and comments stay opaque,
//! so their contents are never mistaken for table or column references.

use sqlparser::dialect::{
    Dialect as ParserDialect, DuckDbDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect,
    SQLiteDialect,
};
use sqlparser::tokenizer::{Token as SqlToken, Tokenizer, Whitespace};

use crate::schema::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    /// `"name"`, `[name]` or `` `name` ``; text holds the unquoted name.
    QuotedIdent,
    /// Text holds the literal's value without quotes.
    StringLit,
    Number,
    Dot,
    Comma,
    LParen,
    RParen,
    Star,
    Semicolon,
    Placeholder,
    Operator,
    Comment,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Parentheses enclosing the token. A parenthesis carries the depth
    /// outside of itself.
    pub depth: usize,
}

impl Token {
    pub fn is_word(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_any_word(&self, keywords: &[&str]) -> bool {
        self.kind == TokenKind::Word && keywords.iter().any(|k| self.text.eq_ignore_ascii_case(k))
    }

    /// Words and quoted identifiers, the tokens that can name something.
    pub fn is_name(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::QuotedIdent)
    }
}

/// The `sqlparser` dialect matching a database's SQL flavor.
pub fn parser_dialect(dialect: Dialect) -> Box<dyn ParserDialect> {
    match dialect {
        Dialect::SqlServer => Box::new(MsSqlDialect {}),
        Dialect::PostgreSql => Box::new(PostgreSqlDialect {}),
        Dialect::MySql => Box::new(MySqlDialect {}),
        Dialect::Sqlite => Box::new(SQLiteDialect {}),
        Dialect::DuckDb => Box::new(DuckDbDialect {}),
    }
}

/// Tokenizes `sql`, dropping plain whitespace but keeping comments. Fails on
/// input the tokenizer cannot close, such as an unterminated string literal
/// or quoted identifier.
pub fn tokenize(sql: &str, dialect: Dialect) -> Result<Vec<Token>, String> {
    let parser_dialect = parser_dialect(dialect);
    let raw = Tokenizer::new(parser_dialect.as_ref(), sql)
        .tokenize()
        .map_err(|e| e.to_string())?;

    let mut tokens = Vec::with_capacity(raw.len());
    let mut depth = 0usize;

    for token in raw {
        let (kind, text) = match token {
            SqlToken::EOF => continue,
            SqlToken::Whitespace(Whitespace::SingleLineComment { comment, prefix }) => {
                (TokenKind::Comment, format!("{}{}", prefix, comment.trim_end()))
            }
            SqlToken::Whitespace(Whitespace::MultiLineComment(comment)) => {
                (TokenKind::Comment, format!("/*{}*/", comment))
            }
            SqlToken::Whitespace(_) => continue,
            SqlToken::Word(word) => match word.quote_style {
                Some(_) => (TokenKind::QuotedIdent, word.value),
                None => (TokenKind::Word, word.value),
            },
            SqlToken::SingleQuotedString(value)
            | SqlToken::DoubleQuotedString(value)
            | SqlToken::NationalStringLiteral(value)
            | SqlToken::EscapedStringLiteral(value)
            | SqlToken::HexStringLiteral(value) => (TokenKind::StringLit, value),
            SqlToken::Number(value, _) => (TokenKind::Number, value),
            SqlToken::Period => (TokenKind::Dot, ".".to_string()),
            SqlToken::Comma => (TokenKind::Comma, ",".to_string()),
            SqlToken::LParen => (TokenKind::LParen, "(".to_string()),
            SqlToken::RParen => (TokenKind::RParen, ")".to_string()),
            SqlToken::Mul => (TokenKind::Star, "*".to_string()),
            SqlToken::SemiColon => (TokenKind::Semicolon, ";".to_string()),
            SqlToken::Placeholder(name) => (TokenKind::Placeholder, name),
            SqlToken::AtSign => (TokenKind::Placeholder, "@".to_string()),
            SqlToken::Char(c) => (TokenKind::Other, c.to_string()),
            other => {
                let text = other.to_string();
                // PostgreSQL reads a bare `?` as an operator
                if text == "?" {
                    (TokenKind::Placeholder, text)
                } else {
                    (TokenKind::Operator, text)
                }
            }
        };

        let token_depth = match kind {
            TokenKind::RParen => {
                depth = depth.saturating_sub(1);
                depth
            }
            _ => depth,
        };
        if kind == TokenKind::LParen {
            depth += 1;
        }

        tokens.push(Token {
            kind,
            text,
            depth: token_depth,
        });
    }

    Ok(tokens)
}

/// Index of the parenthesis closing the one at `open`, if any.
pub fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let depth = tokens.get(open)?.depth;
    tokens
        .iter()
        .enumerate()
        .skip(open + 1)
        .find(|(_, t)| t.kind == TokenKind::RParen && t.depth == depth)
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(sql: &str) -> Vec<Token> {
        tokenize(sql, Dialect::SqlServer).unwrap()
    }

    fn kinds(sql: &str) -> Vec<TokenKind> {
        lex(sql).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn splits_qualified_names_and_punctuation() {
        use TokenKind::*;
        assert_eq!(
            kinds("SELECT Orders.Total, COUNT(*) FROM Orders;"),
            vec![Word, Word, Dot, Word, Comma, Word, LParen, Star, RParen, Word, Word, Semicolon]
        );
    }

    #[test]
    fn keeps_literal_contents_opaque() {
        let tokens = lex("SELECT 'FROM Secret' AS x -- FROM Hidden\nFROM [Order Details]");
        assert_eq!(tokens[1].kind, TokenKind::StringLit);
        assert_eq!(tokens[1].text, "FROM Secret");
        assert_eq!(tokens[4].kind, TokenKind::Comment);
        assert_eq!(tokens[5].text, "FROM");
        assert_eq!(tokens[6].kind, TokenKind::QuotedIdent);
        assert_eq!(tokens[6].text, "Order Details");
    }

    #[test]
    fn semicolons_and_dashes_inside_literals_are_not_tokens() {
        let tokens = lex("SELECT Name FROM Tickets WHERE Name = 'a;b -- c' LIMIT 10");
        assert!(tokens.iter().all(|t| t.kind != TokenKind::Semicolon));
        assert!(tokens.iter().all(|t| t.kind != TokenKind::Comment));
        assert_eq!(tokens[7].text, "a;b -- c");
    }

    #[test]
    fn tracks_parenthesis_depth() {
        let tokens = lex("SELECT (a + (b)) FROM T");
        let depths: Vec<usize> = tokens.iter().map(|t| t.depth).collect();
        assert_eq!(depths, vec![0, 0, 1, 1, 1, 2, 1, 0, 0, 0]);
        assert_eq!(matching_paren(&tokens, 1), Some(7));
        assert_eq!(matching_paren(&tokens, 4), Some(6));
    }

    #[test]
    fn escaped_quotes_stay_inside_literal() {
        let tokens = lex("WHERE Name = 'O''Brien' AND x = 1");
        assert_eq!(tokens[3].kind, TokenKind::StringLit);
        assert_eq!(tokens[3].text, "O'Brien");
        assert_eq!(tokens[4].text, "AND");
    }

    #[test]
    fn unterminated_literals_fail() {
        assert!(tokenize("SELECT Name FROM Customers WHERE Name = 'abc", Dialect::PostgreSql).is_err());
        assert!(tokenize("SELECT \"Name FROM Customers", Dialect::PostgreSql).is_err());
        assert!(tokenize("SELECT [Name FROM Customers", Dialect::SqlServer).is_err());
    }

    #[test]
    fn quoting_follows_the_dialect() {
        let tokens = tokenize("SELECT `Order Lines`.Qty FROM `Order Lines`", Dialect::MySql).unwrap();
        assert_eq!(tokens[1].kind, TokenKind::QuotedIdent);
        assert_eq!(tokens[1].text, "Order Lines");

        let tokens = tokenize("SELECT \"Name\" FROM Customers WHERE Id = $1", Dialect::PostgreSql).unwrap();
        assert_eq!(tokens[1].kind, TokenKind::QuotedIdent);
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Placeholder));
    }
}
