use minijinja::{context, AutoEscape, Environment};
use rust_embed::RustEmbed;
use serde::Serialize;

use crate::coordinator::drafter::DraftPhase;
use crate::coordinator::intent::DatabaseBranch;
use crate::schema::{Dialect, SchemaSnapshot, TableSchema};

#[derive(RustEmbed)]
#[folder = "prompts/"]
struct PromptAssets;

#[derive(Serialize)]
struct DatabaseContext {
    id: String,
    name: String,
    dialect: String,
    tables: Vec<TableContext>,
}

#[derive(Serialize)]
struct TableContext {
    name: String,
    row_count: u64,
    columns: String,
    numbered_columns: Vec<String>,
    foreign_keys: Vec<String>,
    sample_rows: String,
}

impl TableContext {
    fn new(table: &TableSchema, column_limit: Option<usize>) -> Self {
        Self {
            name: table.table_name.clone(),
            row_count: table.row_count_estimate,
            columns: column_list(table, column_limit),
            numbered_columns: table
                .columns
                .iter()
                .enumerate()
                .map(|(n, c)| format!("{}. {} ({})", n + 1, c.column_name, c.data_type))
                .collect(),
            foreign_keys: table
                .foreign_keys
                .iter()
                .map(|fk| {
                    format!(
                        "{}.{} references {}.{}",
                        table.table_name, fk.column_name, fk.referenced_table, fk.referenced_column
                    )
                })
                .collect(),
            sample_rows: table.sample_rows.clone(),
        }
    }
}

/// `limit` truncates the list; `None` lists every column with its type.
fn column_list(table: &TableSchema, limit: Option<usize>) -> String {
    match limit {
        Some(limit) => {
            let hidden = table.columns.len().saturating_sub(limit);
            let mut list = table.column_names().take(limit).collect::<Vec<_>>().join(", ");
            if hidden > 0 {
                list.push_str(&format!(", ... (+{} more)", hidden));
            }
            list
        }
        None => table
            .columns
            .iter()
            .map(|c| format!("{} ({})", c.column_name, c.data_type))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// A retry prompt request for one branch.
pub struct RetryRequest<'a> {
    pub question: &'a str,
    pub branch: &'a DatabaseBranch,
    pub tables: &'a [&'a TableSchema],
    pub dialect: Dialect,
    pub phase: DraftPhase,
    pub previous_sql: &'a str,
    pub errors: &'a [String],
    pub simplified_sql: &'a str,
}

/// Embedded prompt templates.
pub struct PromptLibrary {
    env: Environment<'static>,
}

impl PromptLibrary {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);

        for name in PromptAssets::iter() {
            let Some(file) = PromptAssets::get(&name) else {
                continue;
            };
            let source = String::from_utf8_lossy(&file.data).into_owned();
            env.add_template_owned(name.to_string(), source)?;
        }

        Ok(Self { env })
    }

    fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(ctx)
    }

    pub fn intent(
        &self,
        question: &str,
        schemas: &[SchemaSnapshot],
        column_preview_limit: usize,
    ) -> Result<String, minijinja::Error> {
        let databases: Vec<DatabaseContext> = schemas
            .iter()
            .map(|s| DatabaseContext {
                id: s.database_id.clone(),
                name: s.database_name.clone(),
                dialect: s.dialect.to_string(),
                tables: s
                    .tables
                    .iter()
                    .map(|t| TableContext::new(t, Some(column_preview_limit)))
                    .collect(),
            })
            .collect();

        self.render("intent.j2", context! { question, databases })
    }

    pub fn sql_draft(
        &self,
        question: &str,
        branch: &DatabaseBranch,
        tables: &[&TableSchema],
        dialect: Dialect,
    ) -> Result<String, minijinja::Error> {
        let (example_table, example_column) = example_reference(tables);
        let tables: Vec<TableContext> = tables.iter().map(|t| TableContext::new(t, None)).collect();

        self.render(
            "sql_draft.j2",
            context! {
                question,
                database => &branch.database_name,
                purpose => &branch.purpose,
                dialect => dialect.to_string(),
                uses_top => dialect.uses_top(),
                tables,
                example_table,
                example_column,
            },
        )
    }

    pub fn sql_retry(&self, request: &RetryRequest<'_>) -> Result<String, minijinja::Error> {
        let tables: Vec<TableContext> = request
            .tables
            .iter()
            .map(|t| TableContext::new(t, None))
            .collect();

        self.render(
            "sql_retry.j2",
            context! {
                question => request.question,
                database => &request.branch.database_name,
                purpose => &request.branch.purpose,
                dialect => request.dialect.to_string(),
                uses_top => request.dialect.uses_top(),
                phase => request.phase,
                previous_sql => request.previous_sql,
                errors => request.errors,
                simplified_sql => request.simplified_sql,
                tables,
            },
        )
    }

    pub fn answer(&self, question: &str, data: &str) -> Result<String, minijinja::Error> {
        self.render("answer.j2", context! { question, data })
    }
}

fn example_reference(tables: &[&TableSchema]) -> (String, String) {
    tables
        .first()
        .map(|t| {
            let column = t.column_names().next().unwrap_or("Id").to_string();
            (t.table_name.clone(), column)
        })
        .unwrap_or_else(|| ("TableName".to_string(), "ColumnName".to_string()))
}
