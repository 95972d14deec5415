use once_cell::sync::Lazy;
use regex::Regex;

use crate::coordinator::sql_lexer::{tokenize, TokenKind};
use crate::schema::Dialect;

static STATEMENT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*(SELECT|WITH)\b").expect("statement line pattern is valid"));

static INLINE_SELECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bSELECT\b").expect("inline select pattern is valid"));

static PROSE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(here\b|this\b|note\s*:|explanation\s*:|the\s|these\s|it\s|i\s|sorry\b|please\b|\*\*|#+\s|```)")
        .expect("prose line pattern is valid")
});

/// Clauses that cannot directly follow `ORDER BY` or `GROUP BY`.
const CLAUSE_AFTER_BY: &[&str] = &["LIMIT", "HAVING", "UNION", "OFFSET", "FETCH", "WHERE"];

/// Pulls a single SQL statement out of a model response: code fences and
/// chatty preambles are dropped, the statement starts at the first `SELECT`
/// or `WITH` and ends at the first `;` outside a literal or where prose
/// resumes.
pub fn extract_sql(response: &str, dialect: Dialect) -> String {
    let body = fenced_block(response).unwrap_or(response);

    let start = STATEMENT_LINE
        .find(body)
        .or_else(|| INLINE_SELECT.find(body))
        .map(|m| m.start());
    let Some(start) = start else {
        return body.trim().to_string();
    };

    let mut lines: Vec<&str> = Vec::new();
    for (n, line) in body[start..].lines().enumerate() {
        let trimmed = line.trim();
        if n > 0 && PROSE_LINE.is_match(trimmed) {
            break;
        }
        if !trimmed.is_empty() {
            lines.push(trimmed);
        }
    }
    let candidate = lines.join("\n");

    statement_end(&candidate, dialect)
        .map_or(candidate.as_str(), |end| &candidate[..end])
        .trim()
        .to_string()
}

/// Byte offset of the first `;` that ends a statement. Trailing prose may
/// hold stray quotes that keep the whole text from tokenizing, so each `;`
/// is tried in turn and the first whose prefix tokenizes cleanly wins.
fn statement_end(text: &str, dialect: Dialect) -> Option<usize> {
    text.match_indices(';')
        .map(|(end, _)| end)
        .find(|&end| tokenize(&text[..end], dialect).is_ok())
}

/// Contents of the first fenced code block, without the language tag.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    let body_start = after.find('\n').map(|n| n + 1).unwrap_or(after.len());
    let body = &after[body_start..];
    Some(match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    })
}

/// Cheap structural check run before full validation.
pub fn check_completeness(sql: &str, dialect: Dialect) -> Result<(), String> {
    let tokens = tokenize(sql, dialect).map_err(|e| format!("Incomplete SQL: {}", e))?;

    let has_select = tokens.iter().any(|t| t.is_word("SELECT"));
    let has_from = tokens.iter().any(|t| t.is_word("FROM"));
    if !has_select || !has_from {
        return Err("Incomplete SQL: a SELECT ... FROM statement is required".to_string());
    }

    let dangling_by = tokens.windows(2).enumerate().any(|(i, pair)| {
        pair[0].is_any_word(&["ORDER", "GROUP"])
            && pair[1].is_word("BY")
            && tokens.get(i + 2).map_or(true, |next| {
                matches!(next.kind, TokenKind::RParen | TokenKind::Semicolon)
                    || next.is_any_word(CLAUSE_AFTER_BY)
            })
    });
    if dangling_by {
        return Err("Incomplete SQL: ORDER BY or GROUP BY has no column".to_string());
    }

    for (i, token) in tokens.iter().enumerate() {
        if !token.is_word("JOIN") {
            continue;
        }
        if i > 0 && tokens[i - 1].is_any_word(&["CROSS", "NATURAL"]) {
            continue;
        }
        let has_condition = tokens[i + 1..]
            .iter()
            .take_while(|t| {
                t.depth >= token.depth
                    && t.kind != TokenKind::Semicolon
                    && !(t.depth == token.depth
                        && t.is_any_word(&["JOIN", "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "UNION"]))
            })
            .any(|t| t.depth == token.depth && t.is_any_word(&["ON", "USING"]));
        if !has_condition {
            return Err("Incomplete SQL: JOIN has no ON condition".to_string());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_and_preamble() {
        let response = "Sure! Here is the query you asked for:\n```sql\nSELECT TOP 10 Name\nFROM Customers;\n```\nThis query lists customers.";
        assert_eq!(extract_sql(response, Dialect::SqlServer), "SELECT TOP 10 Name\nFROM Customers");
    }

    #[test]
    fn stops_where_prose_resumes() {
        let response = "SELECT Name FROM Customers\nWHERE Country = 'DE'\n\nThis returns German customers.";
        assert_eq!(
            extract_sql(response, Dialect::SqlServer),
            "SELECT Name FROM Customers\nWHERE Country = 'DE'"
        );
    }

    #[test]
    fn starts_at_inline_select() {
        assert_eq!(
            extract_sql("The SQL is: SELECT * FROM Orders LIMIT 5;", Dialect::DuckDb),
            "SELECT * FROM Orders LIMIT 5"
        );
    }

    #[test]
    fn returns_text_unchanged_without_statement() {
        assert_eq!(extract_sql("  I cannot help with that.  ", Dialect::DuckDb), "I cannot help with that.");
    }

    #[test]
    fn completeness_rejects_truncated_statements() {
        assert!(check_completeness("SELECT Name FROM Customers ORDER BY", Dialect::DuckDb).is_err());
        assert!(check_completeness("SELECT Name FROM Customers GROUP BY LIMIT 5", Dialect::DuckDb).is_err());
        assert!(check_completeness("SELECT Name FROM Customers JOIN Orders WHERE x = 1", Dialect::DuckDb).is_err());
        assert!(check_completeness("SELECT Name", Dialect::DuckDb).is_err());
        assert!(check_completeness("Customers", Dialect::DuckDb).is_err());
    }

    #[test]
    fn completeness_accepts_whole_statements() {
        assert!(check_completeness("SELECT Name FROM Customers ORDER BY Name", Dialect::DuckDb).is_ok());
        assert!(check_completeness(
            "SELECT Customers.Name FROM Customers JOIN Orders ON Orders.CustomerID = Customers.CustomerID",
            Dialect::DuckDb
        )
        .is_ok());
        assert!(check_completeness("SELECT Name FROM Customers CROSS JOIN Regions", Dialect::DuckDb).is_ok());
    }

    #[test]
    fn semicolons_inside_literals_do_not_end_the_statement() {
        let sql = "SELECT Tickets.TicketID FROM Tickets WHERE Tickets.Name = 'a;b' LIMIT 10";
        assert_eq!(extract_sql(sql, Dialect::DuckDb), sql);
        assert_eq!(
            extract_sql(&format!("{}; Here's why it works.", sql), Dialect::DuckDb),
            sql
        );
        assert_eq!(
            extract_sql("SELECT Name FROM Customers WHERE Note = '-- FROM x;'; SELECT 2", Dialect::PostgreSql),
            "SELECT Name FROM Customers WHERE Note = '-- FROM x;'"
        );
    }

    #[test]
    fn english_column_lines_are_kept() {
        let response = "SELECT TicketID,\nExplanation\nFROM Tickets";
        assert_eq!(extract_sql(response, Dialect::DuckDb), response);
    }

    #[test]
    fn completeness_reads_literals_as_values() {
        assert!(check_completeness("SELECT 'FROM' AS Word", Dialect::DuckDb).is_err());
        assert!(check_completeness("SELECT Name FROM Customers WHERE Name = 'order by'", Dialect::DuckDb).is_ok());
        assert!(check_completeness("SELECT Name FROM Customers WHERE Name = 'a", Dialect::DuckDb).is_err());
    }
}
