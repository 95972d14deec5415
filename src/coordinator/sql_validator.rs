//! Static checks on drafted SQL. Nothing here executes anything: a statement
//! passes when every table and qualified column it names exists in the
//! branch's own database and its syntax fits that database's dialect.
//!
//! Table references come from the `sqlparser` AST when the draft parses in
//! its dialect. Drafts the parser rejects still get the token-level checks,
//! so the retry prompt can name concrete problems instead of a parse error.

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;

use sqlparser::ast::{
    visit_expressions, Expr, ObjectName, ObjectNamePart, Query, Select, SetExpr, Statement,
    TableFactor, TableWithJoins,
};
use sqlparser::parser::Parser;
use tracing::debug;

use crate::coordinator::sql_lexer::{matching_paren, parser_dialect, tokenize, Token, TokenKind};
use crate::schema::{SchemaSnapshot, TableSchema};

const AGGREGATES: &[&str] = &["SUM", "AVG", "COUNT", "MAX", "MIN"];

const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "MERGE", "EXEC",
    "EXECUTE", "GRANT", "REVOKE", "INTO", "REPLACE", "ATTACH", "DETACH", "COPY", "PRAGMA",
];

/// Words that can follow a table name without being its alias.
const NOT_AN_ALIAS: &[&str] = &[
    "WHERE", "ON", "USING", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "OUTER",
    "NATURAL", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "FETCH", "UNION", "EXCEPT",
    "INTERSECT", "WITH", "WINDOW", "QUALIFY", "FOR", "AS", "SELECT", "FROM", "AND", "OR",
];

/// Words that can follow FROM/JOIN without naming a table.
const NOT_A_TABLE: &[&str] = &[
    "SELECT", "WHERE", "LATERAL", "ONLY", "UNNEST", "VALUES", "TABLE", "DUAL", "ON", "AS",
    "GROUP", "ORDER", "HAVING", "LIMIT", "JOIN",
];

/// Clauses that end a WHERE condition at the same nesting level.
const AFTER_WHERE: &[&str] = &[
    "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "FETCH", "UNION", "EXCEPT", "INTERSECT",
    "WINDOW", "QUALIFY",
];

/// Lead words of natural-language fragments models wrap around SQL.
const PROSE_MARKERS: &[&[&str]] = &[
    &["here", "is"],
    &["this", "query"],
    &["explanation"],
    &["sorry"],
    &["note", ":"],
];

/// One `FROM`/`JOIN` target.
#[derive(Debug)]
struct TableRef {
    /// Name parts as written, e.g. `["dbo", "Orders"]`.
    parts: Vec<String>,
    alias: Option<String>,
    in_subquery: bool,
}

impl TableRef {
    fn name(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }

    fn full_name(&self) -> String {
        self.parts.join(".")
    }
}

struct ParenFrame {
    has_select: bool,
    cte_body: bool,
}

/// Validates statements for one database. `all_schemas` lets errors point
/// at the database that really owns a misplaced table.
pub struct SqlValidator<'a> {
    schema: &'a SchemaSnapshot,
    all_schemas: &'a [SchemaSnapshot],
}

impl<'a> SqlValidator<'a> {
    pub fn new(schema: &'a SchemaSnapshot, all_schemas: &'a [SchemaSnapshot]) -> Self {
        Self {
            schema,
            all_schemas,
        }
    }

    /// Runs every check and returns the de-duplicated errors, in the order
    /// found.
    pub fn validate(&self, sql: &str) -> Result<(), Vec<String>> {
        let tokens = tokenize(sql, self.schema.dialect).map_err(|e| {
            vec![format!(
                "Malformed SQL ({}); close every string literal and quoted identifier",
                e
            )]
        })?;

        let mut errors = Vec::new();
        let dialect = parser_dialect(self.schema.dialect);
        let (refs, cte_names) = match Parser::parse_sql(dialect.as_ref(), sql) {
            Ok(statements) => {
                check_parsed_kind(&statements, &tokens, &mut errors);
                collect_parsed_refs(&statements)
            }
            Err(e) => {
                debug!("Draft does not parse as {}, using token checks: {}", self.schema.dialect, e);
                check_statement_kind(&tokens, &mut errors);
                let (cte_names, cte_bodies) = collect_ctes(&tokens);
                (collect_table_refs(&tokens, &cte_bodies), cte_names)
            }
        };

        self.check_tables(&refs, &cte_names, &mut errors);
        self.check_columns(&tokens, &refs, &cte_names, &mut errors);
        self.check_dialect(sql, &tokens, &refs, &mut errors);

        let mut seen = HashSet::new();
        errors.retain(|e| seen.insert(e.clone()));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn check_tables(&self, refs: &[TableRef], cte_names: &HashSet<String>, errors: &mut Vec<String>) {
        for table_ref in refs {
            let name = table_ref.name();

            if table_ref.in_subquery {
                errors.push(format!(
                    "Table {} is referenced inside a subquery; subqueries are not allowed",
                    name
                ));
            }

            let qualifiers = &table_ref.parts[..table_ref.parts.len().saturating_sub(1)];
            if qualifiers.iter().any(|q| self.names_other_database(q)) {
                errors.push(format!(
                    "Cross-database reference {} is not allowed; only tables of {} can be queried",
                    table_ref.full_name(),
                    self.schema.database_name
                ));
                continue;
            }

            if qualifiers.is_empty() && cte_names.contains(&name.to_lowercase()) {
                continue;
            }

            if self.schema.find_table(name).is_none() {
                errors.push(self.missing_table_error(name));
            }
        }
    }

    fn check_columns(
        &self,
        tokens: &[Token],
        refs: &[TableRef],
        cte_names: &HashSet<String>,
        errors: &mut Vec<String>,
    ) {
        let mut aliases: HashMap<String, &TableSchema> = HashMap::new();
        for table_ref in refs {
            if let Some(table) = self.schema.find_table(table_ref.name()) {
                aliases.insert(table.table_name.to_lowercase(), table);
                if let Some(alias) = &table_ref.alias {
                    aliases.insert(alias.to_lowercase(), table);
                }
            }
        }

        for k in 0..tokens.len().saturating_sub(2) {
            let (qualifier, dot, column) = (&tokens[k], &tokens[k + 1], &tokens[k + 2]);
            if !qualifier.is_name()
                || dot.kind != TokenKind::Dot
                || !column.is_name()
                || (k > 0 && tokens[k - 1].kind == TokenKind::Dot)
                || (k > 0 && tokens[k - 1].is_any_word(&["FROM", "JOIN"]))
                || tokens.get(k + 3).map(|t| t.kind) == Some(TokenKind::LParen)
            {
                continue;
            }

            let key = qualifier.text.to_lowercase();
            if cte_names.contains(&key) {
                continue;
            }
            // Unknown qualifiers may be expressions; only known tables are checked
            let Some(table) = aliases.get(&key) else {
                continue;
            };
            if !table.has_column(&column.text) {
                errors.push(format!(
                    "Column {} does not exist in table {}",
                    column.text, table.table_name
                ));
            }
        }
    }

    fn check_dialect(&self, sql: &str, tokens: &[Token], refs: &[TableRef], errors: &mut Vec<String>) {
        let dialect = self.schema.dialect;

        check_where_aggregates(tokens, errors);

        let has_having = tokens.iter().any(|t| t.is_word("HAVING"));
        let has_group_by = tokens
            .windows(2)
            .any(|w| w[0].is_word("GROUP") && w[1].is_word("BY"));
        if has_having && !has_group_by && !has_aggregate_call(tokens) {
            errors.push("HAVING requires GROUP BY or an aggregate function".to_string());
        }

        for (i, token) in tokens.iter().enumerate() {
            let next = tokens.get(i + 1);
            if dialect.uses_top()
                && token.is_word("LIMIT")
                && next.is_some_and(|t| t.kind == TokenKind::Number)
            {
                errors.push(format!(
                    "LIMIT is not valid in {}; use SELECT TOP n instead",
                    dialect
                ));
            }
            if !dialect.uses_top()
                && token.is_word("TOP")
                && i > 0
                && tokens[i - 1].is_any_word(&["SELECT", "DISTINCT", "ALL"])
                && next.is_some_and(|t| matches!(t.kind, TokenKind::Number | TokenKind::LParen))
            {
                errors.push(format!("TOP is not valid in {}; use LIMIT n instead", dialect));
            }
        }

        for alias in refs.iter().filter_map(|r| r.alias.as_deref()) {
            if is_short_alias(alias) {
                errors.push(short_alias_error(alias));
            }
        }
        for pair in tokens.windows(2) {
            if pair[0].kind == TokenKind::Word
                && pair[1].kind == TokenKind::Dot
                && is_short_alias(&pair[0].text)
                && self.schema.find_table(&pair[0].text).is_none()
            {
                errors.push(short_alias_error(&pair[0].text));
            }
        }

        let opens = tokens.iter().filter(|t| t.kind == TokenKind::LParen).count();
        let closes = tokens.iter().filter(|t| t.kind == TokenKind::RParen).count();
        if opens != closes {
            errors.push("Unbalanced parentheses".to_string());
        }

        if tokens.iter().any(|t| t.kind == TokenKind::Comment) {
            errors.push("SQL comments are not allowed; return only the statement".to_string());
        }

        for token in tokens {
            match token.kind {
                TokenKind::StringLit | TokenKind::QuotedIdent | TokenKind::Comment => {}
                _ if !token.text.is_ascii() => {
                    errors.push(format!("Non-SQL text detected: {}", token.text));
                }
                TokenKind::Placeholder => {
                    errors.push("Parameter placeholders are not allowed".to_string());
                }
                TokenKind::Word if token.text.starts_with('@') => {
                    errors.push("Parameter placeholders are not allowed".to_string());
                }
                _ => {}
            }
        }

        if sql.contains("```") || self.contains_prose(tokens) {
            errors.push("Natural-language text detected; return only the SQL statement".to_string());
        }
    }

    /// Looks for prose markers among words that are neither part of a
    /// qualified name nor a table or column of this database.
    fn contains_prose(&self, tokens: &[Token]) -> bool {
        let free_word = |i: usize| -> Option<String> {
            let token = tokens.get(i)?;
            match token.kind {
                TokenKind::Operator => Some(token.text.clone()),
                TokenKind::Word => {
                    let qualified = (i > 0 && tokens[i - 1].kind == TokenKind::Dot)
                        || tokens.get(i + 1).is_some_and(|t| t.kind == TokenKind::Dot);
                    if qualified || self.is_schema_name(&token.text) {
                        None
                    } else {
                        Some(token.text.to_lowercase())
                    }
                }
                _ => None,
            }
        };

        (0..tokens.len()).any(|start| {
            PROSE_MARKERS.iter().any(|marker| {
                marker
                    .iter()
                    .enumerate()
                    .all(|(n, word)| free_word(start + n).as_deref() == Some(*word))
            })
        })
    }

    fn is_schema_name(&self, name: &str) -> bool {
        self.schema.find_table(name).is_some()
            || self.schema.tables.iter().any(|t| t.has_column(name))
    }

    fn names_other_database(&self, qualifier: &str) -> bool {
        !self.schema.is_named(qualifier) && self.all_schemas.iter().any(|s| s.is_named(qualifier))
    }

    fn missing_table_error(&self, table: &str) -> String {
        let owner = self
            .all_schemas
            .iter()
            .filter(|s| s.database_id != self.schema.database_id)
            .find(|s| s.find_table(table).is_some());
        match owner {
            Some(owner) => format!(
                "Table {} does not exist in {}; it belongs to {}",
                table, self.schema.database_name, owner.database_name
            ),
            None => format!(
                "Table {} does not exist in {}",
                table, self.schema.database_name
            ),
        }
    }
}

fn is_short_alias(name: &str) -> bool {
    name.len() == 1 && name.chars().all(|c| c.is_ascii_lowercase())
}

fn short_alias_error(alias: &str) -> String {
    format!(
        "Single-letter table alias {} is not allowed; use full table names",
        alias
    )
}

fn only_select_error() -> String {
    "Only SELECT statements are allowed".to_string()
}

fn check_write_keywords(tokens: &[Token], errors: &mut Vec<String>) {
    for token in tokens.iter().filter(|t| t.is_any_word(WRITE_KEYWORDS)) {
        errors.push(format!(
            "{} is not allowed; queries must be read-only",
            token.text.to_uppercase()
        ));
    }
}

fn check_parsed_kind(statements: &[Statement], tokens: &[Token], errors: &mut Vec<String>) {
    if statements.is_empty() || !statements.iter().all(|s| matches!(s, Statement::Query(_))) {
        errors.push(only_select_error());
    }
    check_write_keywords(tokens, errors);
    if statements.len() > 1 {
        errors.push("Multiple statements are not allowed".to_string());
    }
}

fn check_statement_kind(tokens: &[Token], errors: &mut Vec<String>) {
    let mut significant = tokens.iter().filter(|t| t.kind != TokenKind::Comment);
    match significant.next() {
        Some(first) if first.is_any_word(&["SELECT", "WITH"]) => {}
        _ => errors.push(only_select_error()),
    }

    check_write_keywords(tokens, errors);

    if let Some(pos) = tokens.iter().position(|t| t.kind == TokenKind::Semicolon) {
        if tokens[pos + 1..]
            .iter()
            .any(|t| !matches!(t.kind, TokenKind::Comment | TokenKind::Semicolon))
        {
            errors.push("Multiple statements are not allowed".to_string());
        }
    }
}

fn has_aggregate_call(tokens: &[Token]) -> bool {
    tokens
        .windows(2)
        .any(|w| w[0].is_any_word(AGGREGATES) && w[1].kind == TokenKind::LParen)
}

fn check_where_aggregates(tokens: &[Token], errors: &mut Vec<String>) {
    for (start, where_token) in tokens.iter().enumerate().filter(|(_, t)| t.is_word("WHERE")) {
        let depth = where_token.depth;
        let mut i = start + 1;
        while let Some(token) = tokens.get(i) {
            if token.depth < depth
                || token.kind == TokenKind::Semicolon
                || (token.depth == depth && token.is_any_word(AFTER_WHERE))
            {
                break;
            }
            // Nested selects carry their own WHERE
            if token.kind == TokenKind::LParen
                && tokens.get(i + 1).is_some_and(|t| t.is_word("SELECT"))
            {
                i = matching_paren(tokens, i).map_or(tokens.len(), |close| close + 1);
                continue;
            }
            if token.is_any_word(AGGREGATES)
                && tokens.get(i + 1).is_some_and(|t| t.kind == TokenKind::LParen)
            {
                errors.push(format!(
                    "Aggregate function {} cannot be used in WHERE; use HAVING instead",
                    token.text.to_uppercase()
                ));
            }
            i += 1;
        }
    }
}

// --- AST walking ---

fn name_parts(name: &ObjectName) -> Vec<String> {
    name.0
        .iter()
        .map(|part| match part {
            ObjectNamePart::Identifier(ident) => ident.value.clone(),
            _ => String::new(),
        })
        .collect()
}

/// Table references and CTE names of every query statement.
fn collect_parsed_refs(statements: &[Statement]) -> (Vec<TableRef>, HashSet<String>) {
    let mut walker = RefWalker::default();
    for statement in statements {
        if let Statement::Query(query) = statement {
            walker.query(query, false);
        }
    }
    (walker.refs, walker.cte_names)
}

#[derive(Default)]
struct RefWalker {
    refs: Vec<TableRef>,
    cte_names: HashSet<String>,
}

impl RefWalker {
    fn query(&mut self, query: &Query, in_subquery: bool) {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.cte_names.insert(cte.alias.name.value.to_lowercase());
                self.query(&cte.query, in_subquery);
            }
        }
        self.set_expr(&query.body, in_subquery);
    }

    fn set_expr(&mut self, body: &SetExpr, in_subquery: bool) {
        match body {
            SetExpr::Select(select) => self.select(select, in_subquery),
            SetExpr::Query(query) => self.query(query, in_subquery),
            SetExpr::SetOperation { left, right, .. } => {
                self.set_expr(left, in_subquery);
                self.set_expr(right, in_subquery);
            }
            _ => {}
        }
    }

    fn select(&mut self, select: &Select, in_subquery: bool) {
        for table in &select.from {
            self.table_with_joins(table, in_subquery);
        }

        // Nested subqueries are found again by their parent's walk; the
        // duplicates collapse with the error list.
        let _ = visit_expressions(select, |expr| {
            match expr {
                Expr::Subquery(query)
                | Expr::Exists { subquery: query, .. }
                | Expr::InSubquery { subquery: query, .. } => self.query(query, true),
                _ => {}
            }
            ControlFlow::<()>::Continue(())
        });
    }

    fn table_with_joins(&mut self, table: &TableWithJoins, in_subquery: bool) {
        self.table_factor(&table.relation, in_subquery);
        for join in &table.joins {
            self.table_factor(&join.relation, in_subquery);
        }
    }

    fn table_factor(&mut self, factor: &TableFactor, in_subquery: bool) {
        match factor {
            TableFactor::Table {
                name,
                alias,
                args: None,
                ..
            } => self.refs.push(TableRef {
                parts: name_parts(name),
                alias: alias.as_ref().map(|a| a.name.value.clone()),
                in_subquery,
            }),
            TableFactor::Derived { subquery, .. } => self.query(subquery, true),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.table_with_joins(table_with_joins, in_subquery),
            _ => {}
        }
    }
}

// --- Token fallback for drafts the parser rejects ---

/// Names declared by a leading `WITH name [(cols)] AS (...)` list, and the
/// indices of the parentheses opening their bodies.
fn collect_ctes(tokens: &[Token]) -> (HashSet<String>, HashSet<usize>) {
    let mut names = HashSet::new();
    let mut bodies = HashSet::new();

    let Some(mut i) = tokens.iter().position(|t| t.kind != TokenKind::Comment) else {
        return (names, bodies);
    };
    if !tokens[i].is_word("WITH") {
        return (names, bodies);
    }
    i += 1;
    if tokens.get(i).is_some_and(|t| t.is_word("RECURSIVE")) {
        i += 1;
    }

    while let Some(name) = tokens.get(i).filter(|t| t.is_name()) {
        names.insert(name.text.to_lowercase());
        i += 1;
        if tokens.get(i).is_some_and(|t| t.kind == TokenKind::LParen) {
            let Some(close) = matching_paren(tokens, i) else {
                break;
            };
            i = close + 1;
        }
        if !tokens.get(i).is_some_and(|t| t.is_word("AS")) {
            break;
        }
        i += 1;
        if !tokens.get(i).is_some_and(|t| t.kind == TokenKind::LParen) {
            break;
        }
        bodies.insert(i);
        let Some(close) = matching_paren(tokens, i) else {
            break;
        };
        i = close + 1;
        if !tokens.get(i).is_some_and(|t| t.kind == TokenKind::Comma) {
            break;
        }
        i += 1;
    }

    (names, bodies)
}

/// Every `FROM`/`JOIN` target with its alias.
fn collect_table_refs(tokens: &[Token], cte_bodies: &HashSet<usize>) -> Vec<TableRef> {
    let mut refs = Vec::new();
    let mut frames: Vec<ParenFrame> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen => frames.push(ParenFrame {
                has_select: false,
                cte_body: cte_bodies.contains(&i),
            }),
            TokenKind::RParen => {
                frames.pop();
            }
            TokenKind::Word if token.is_word("SELECT") => {
                if let Some(frame) = frames.last_mut() {
                    frame.has_select = true;
                }
            }
            TokenKind::Word if token.is_any_word(&["FROM", "JOIN"]) => {
                // EXTRACT(YEAR FROM x), TRIM(... FROM x) and friends
                if frames.last().is_some_and(|f| !f.has_select) {
                    continue;
                }
                let in_subquery = frames.iter().any(|f| f.has_select && !f.cte_body);
                let list_allowed = token.is_word("FROM");
                parse_ref_list(tokens, i + 1, in_subquery, list_allowed, &mut refs);
            }
            _ => {}
        }
    }

    refs
}

fn parse_ref_list(
    tokens: &[Token],
    mut i: usize,
    in_subquery: bool,
    list_allowed: bool,
    refs: &mut Vec<TableRef>,
) {
    loop {
        let Some(first) = tokens.get(i) else {
            return;
        };
        if !first.is_name() || (first.kind == TokenKind::Word && first.is_any_word(NOT_A_TABLE)) {
            return;
        }

        let mut parts = vec![first.text.clone()];
        i += 1;
        while tokens.get(i).is_some_and(|t| t.kind == TokenKind::Dot)
            && tokens.get(i + 1).is_some_and(|t| t.is_name())
        {
            parts.push(tokens[i + 1].text.clone());
            i += 2;
        }

        // Table-valued function, not a table
        if tokens.get(i).is_some_and(|t| t.kind == TokenKind::LParen) {
            return;
        }

        if tokens.get(i).is_some_and(|t| t.is_word("AS")) {
            i += 1;
        }
        let mut alias = None;
        if let Some(candidate) = tokens.get(i) {
            let is_alias = match candidate.kind {
                TokenKind::QuotedIdent => true,
                TokenKind::Word => !candidate.is_any_word(NOT_AN_ALIAS),
                _ => false,
            };
            if is_alias {
                alias = Some(candidate.text.clone());
                i += 1;
            }
        }

        refs.push(TableRef {
            parts,
            alias,
            in_subquery,
        });

        if !(list_allowed && tokens.get(i).is_some_and(|t| t.kind == TokenKind::Comma)) {
            return;
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSchema, Dialect};

    fn table(name: &str, columns: &[&str]) -> TableSchema {
        TableSchema::new(
            name,
            columns.iter().map(|c| ColumnSchema::new(*c, "int")).collect(),
        )
    }

    fn schemas() -> Vec<SchemaSnapshot> {
        vec![
            SchemaSnapshot {
                database_id: "sales".to_string(),
                database_name: "SalesDB".to_string(),
                dialect: Dialect::SqlServer,
                tables: vec![
                    table("Orders", &["OrderID", "CustomerID", "Total", "OrderDate"]),
                    table("OrderLines", &["OrderID", "ProductID", "Quantity"]),
                ],
            },
            SchemaSnapshot {
                database_id: "crm".to_string(),
                database_name: "CrmDB".to_string(),
                dialect: Dialect::PostgreSql,
                tables: vec![table("Customers", &["CustomerID", "Name", "Country"])],
            },
            SchemaSnapshot {
                database_id: "support".to_string(),
                database_name: "SupportDB".to_string(),
                dialect: Dialect::DuckDb,
                tables: vec![
                    table("Tickets", &["TicketID", "Explanation", "Name"]),
                    table("t", &["Col"]),
                ],
            },
        ]
    }

    fn validate(database: usize, sql: &str) -> Result<(), Vec<String>> {
        let all = schemas();
        SqlValidator::new(&all[database], &all).validate(sql)
    }

    #[test]
    fn accepts_plain_queries() {
        assert_eq!(
            validate(0, "SELECT TOP 10 Orders.CustomerID, SUM(Orders.Total) AS Spend FROM Orders GROUP BY Orders.CustomerID ORDER BY Spend DESC"),
            Ok(())
        );
        assert_eq!(
            validate(1, "SELECT CustomerID, Name FROM Customers WHERE Country = 'DE' LIMIT 50"),
            Ok(())
        );
    }

    #[test]
    fn reports_one_error_per_missing_qualified_column() {
        let errors = validate(
            0,
            "SELECT Ord.Discount, Ord.Discount, Ord.Total FROM Orders AS Ord WHERE Ord.Discount > 0",
        )
        .unwrap_err();
        assert_eq!(errors, vec!["Column Discount does not exist in table Orders"]);
    }

    #[test]
    fn resolves_table_names_used_as_qualifiers() {
        let errors = validate(0, "SELECT orders.Revenue FROM Orders").unwrap_err();
        assert_eq!(errors, vec!["Column Revenue does not exist in table Orders"]);
    }

    #[test]
    fn ignores_unresolved_qualifiers() {
        assert_eq!(validate(1, "SELECT Stats.Whatever FROM Customers"), Ok(()));
    }

    #[test]
    fn rejects_other_database_qualification_in_every_dialect() {
        let errors = validate(0, "SELECT TOP 5 * FROM CrmDB.Customers").unwrap_err();
        assert!(errors[0].starts_with("Cross-database reference CrmDB.Customers"));

        let errors = validate(1, "SELECT * FROM sales.Orders LIMIT 5").unwrap_err();
        assert!(errors[0].starts_with("Cross-database reference sales.Orders"));
    }

    #[test]
    fn points_misplaced_tables_at_their_owner() {
        let errors = validate(0, "SELECT TOP 5 * FROM Customers").unwrap_err();
        assert_eq!(
            errors,
            vec!["Table Customers does not exist in SalesDB; it belongs to CrmDB"]
        );
        let errors = validate(0, "SELECT TOP 5 * FROM Invoices").unwrap_err();
        assert_eq!(errors, vec!["Table Invoices does not exist in SalesDB"]);
    }

    #[test]
    fn allows_schema_qualifiers_and_ctes() {
        assert_eq!(validate(0, "SELECT TOP 5 * FROM dbo.Orders"), Ok(()));
        assert_eq!(
            validate(
                1,
                "WITH German AS (SELECT CustomerID FROM Customers WHERE Country = 'DE') SELECT German.CustomerID FROM German"
            ),
            Ok(())
        );
    }

    #[test]
    fn rejects_subqueries() {
        let errors = validate(
            0,
            "SELECT OrderID FROM Orders WHERE CustomerID IN (SELECT CustomerID FROM OrderLines)",
        )
        .unwrap_err();
        assert_eq!(
            errors,
            vec!["Table OrderLines is referenced inside a subquery; subqueries are not allowed"]
        );
    }

    #[test]
    fn keyword_after_from_is_not_a_table() {
        assert_eq!(
            validate(1, "SELECT EXTRACT(YEAR FROM Customers.CustomerID) FROM Customers"),
            Ok(())
        );
    }

    #[test]
    fn enforces_paging_keyword_per_dialect() {
        let errors = validate(0, "SELECT * FROM Orders LIMIT 10").unwrap_err();
        assert_eq!(errors, vec!["LIMIT is not valid in SQL Server; use SELECT TOP n instead"]);

        let errors = validate(1, "SELECT TOP 10 * FROM Customers").unwrap_err();
        assert_eq!(errors, vec!["TOP is not valid in PostgreSQL; use LIMIT n instead"]);
    }

    #[test]
    fn rejects_aggregates_in_where_but_not_in_nested_selects() {
        let errors = validate(0, "SELECT TOP 5 OrderID FROM Orders WHERE SUM(Total) > 100").unwrap_err();
        assert_eq!(
            errors,
            vec!["Aggregate function SUM cannot be used in WHERE; use HAVING instead"]
        );

        let errors = validate(1, "SELECT Name FROM Customers HAVING Name = 'x'").unwrap_err();
        assert_eq!(errors, vec!["HAVING requires GROUP BY or an aggregate function"]);
    }

    #[test]
    fn rejects_short_aliases_and_contamination() {
        let errors = validate(1, "SELECT c.Name FROM Customers c").unwrap_err();
        assert_eq!(
            errors,
            vec!["Single-letter table alias c is not allowed; use full table names"]
        );

        let errors = validate(1, "SELECT Name FROM Customers -- all of them").unwrap_err();
        assert_eq!(errors, vec!["SQL comments are not allowed; return only the statement"]);

        let errors = validate(1, "SELECT Name FROM Customers WHERE Country = ?").unwrap_err();
        assert_eq!(errors, vec!["Parameter placeholders are not allowed"]);

        let errors = validate(1, "SELECT Name FROM Customers WHERE Nombre = año").unwrap_err();
        assert_eq!(errors, vec!["Non-SQL text detected: año"]);

        let errors = validate(1, "SELECT Name FROM Customers (").unwrap_err();
        assert!(errors.contains(&"Unbalanced parentheses".to_string()));
    }

    #[test]
    fn rejects_writes_and_multiple_statements() {
        let errors = validate(1, "DELETE FROM Customers").unwrap_err();
        assert_eq!(
            errors,
            vec![
                "Only SELECT statements are allowed",
                "DELETE is not allowed; queries must be read-only"
            ]
        );

        let errors = validate(1, "SELECT Name FROM Customers; SELECT 1").unwrap_err();
        assert_eq!(errors, vec!["Multiple statements are not allowed"]);
    }

    #[test]
    fn literal_contents_are_not_sql() {
        assert_eq!(
            validate(1, "SELECT Name FROM Customers WHERE Name = 'a;b' OR Country = '-- FROM Orders' LIMIT 10"),
            Ok(())
        );
        assert_eq!(
            validate(0, "SELECT TOP 5 OrderID FROM Orders WHERE OrderDate > 'here is; sorry'"),
            Ok(())
        );
    }

    #[test]
    fn rejects_unterminated_literals() {
        let errors = validate(1, "SELECT Name FROM Customers WHERE Name = 'a").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Malformed SQL"));

        let errors = validate(0, "SELECT TOP 5 [OrderID FROM Orders").unwrap_err();
        assert!(errors[0].starts_with("Malformed SQL"));
    }

    #[test]
    fn english_column_names_are_not_prose() {
        assert_eq!(
            validate(2, "SELECT Tickets.TicketID, Tickets.Explanation FROM Tickets LIMIT 10"),
            Ok(())
        );
        assert_eq!(validate(2, "SELECT Explanation FROM Tickets LIMIT 10"), Ok(()));

        let errors = validate(2, "Here is the query: SELECT Name FROM Tickets").unwrap_err();
        assert!(errors.contains(&"Natural-language text detected; return only the SQL statement".to_string()));
        let errors = validate(2, "SELECT Name FROM Tickets LIMIT 10 sorry").unwrap_err();
        assert!(errors.contains(&"Natural-language text detected; return only the SQL statement".to_string()));
    }

    #[test]
    fn one_letter_table_names_are_not_aliases() {
        assert_eq!(validate(2, "SELECT t.Col FROM t LIMIT 5"), Ok(()));

        let errors = validate(2, "SELECT s.Name FROM Tickets s LIMIT 5").unwrap_err();
        assert_eq!(
            errors,
            vec!["Single-letter table alias s is not allowed; use full table names"]
        );
    }

    #[test]
    fn derived_tables_count_as_subqueries() {
        let errors = validate(
            0,
            "SELECT TOP 5 Recent.OrderID FROM (SELECT OrderID FROM Orders) AS Recent",
        )
        .unwrap_err();
        assert_eq!(
            errors,
            vec!["Table Orders is referenced inside a subquery; subqueries are not allowed"]
        );
    }

    #[test]
    fn unions_and_exists_are_walked() {
        assert_eq!(
            validate(1, "SELECT Name FROM Customers UNION SELECT Country FROM Customers"),
            Ok(())
        );
        let errors = validate(
            1,
            "SELECT Name FROM Customers WHERE EXISTS (SELECT 1 FROM Customers AS Others WHERE Others.Country = 'DE')",
        )
        .unwrap_err();
        assert_eq!(
            errors,
            vec!["Table Customers is referenced inside a subquery; subqueries are not allowed"]
        );
    }
}
