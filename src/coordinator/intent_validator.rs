use tracing::{debug, info};

use crate::coordinator::intent::{DatabaseBranch, QueryIntent};
use crate::schema::{find_snapshot, SchemaSnapshot};

const RELOCATED_PRIORITY: u32 = 2;

/// Checks every branch against the catalog and repairs what it can.
///
/// Table names are rewritten to the schema's casing. Tables the schema
/// doesn't have are moved to the database that really owns them, either an
/// existing branch or a new one. Tables owned by nobody are dropped, and so
/// are branches left without tables. Branches naming the same database are
/// merged, and the result is ordered by priority.
pub fn validate_intent(intent: QueryIntent, schemas: &[SchemaSnapshot]) -> QueryIntent {
    let mut branches: Vec<DatabaseBranch> = Vec::new();
    let mut missing: Vec<String> = Vec::new();

    for branch in intent.branches {
        let snapshot = find_snapshot(schemas, &branch.database_id)
            .or_else(|| find_snapshot(schemas, &branch.database_name));
        let Some(snapshot) = snapshot else {
            debug!("Dropping branch for unknown database {}", branch.database_id);
            for table in branch.required_tables {
                push_unique(&mut missing, table);
            }
            continue;
        };

        let mut tables = Vec::new();
        for table in branch.required_tables {
            match snapshot.find_table(&table) {
                Some(found) => push_unique(&mut tables, found.table_name.clone()),
                None => push_unique(&mut missing, table),
            }
        }
        if tables.is_empty() {
            debug!("Dropping branch {}: no valid tables", snapshot.database_id);
            continue;
        }

        let candidate = DatabaseBranch {
            database_id: snapshot.database_id.clone(),
            database_name: snapshot.database_name.clone(),
            required_tables: tables,
            ..branch
        };
        match branches
            .iter_mut()
            .find(|b| b.database_id == candidate.database_id)
        {
            Some(existing) => merge_into(existing, candidate),
            None => branches.push(candidate),
        }
    }

    for table in missing {
        let Some(owner) = schemas.iter().find(|s| s.find_table(&table).is_some()) else {
            debug!("Table {} does not exist in any database", table);
            continue;
        };
        let Some(canonical) = owner.find_table(&table).map(|t| t.table_name.clone()) else {
            continue;
        };

        match branches.iter_mut().find(|b| b.database_id == owner.database_id) {
            Some(branch) => {
                if !branch.has_table(&canonical) {
                    info!("Moving table {} to database {}", canonical, owner.database_id);
                    branch.required_tables.push(canonical);
                }
            }
            None => {
                info!("Adding database {} for table {}", owner.database_id, canonical);
                let purpose = format!("Get data from {} table", canonical);
                branches.push(DatabaseBranch::new(
                    &owner.database_id,
                    &owner.database_name,
                    vec![canonical],
                    purpose,
                    RELOCATED_PRIORITY,
                ));
            }
        }
    }

    branches.sort_by_key(|b| b.priority);

    QueryIntent {
        requires_cross_database_join: branches.len() > 1,
        branches,
        ..intent
    }
}

fn push_unique(tables: &mut Vec<String>, table: String) {
    if !tables.iter().any(|t| t.eq_ignore_ascii_case(&table)) {
        tables.push(table);
    }
}

fn merge_into(existing: &mut DatabaseBranch, other: DatabaseBranch) {
    for table in other.required_tables {
        push_unique(&mut existing.required_tables, table);
    }
    existing.priority = existing.priority.min(other.priority);
    if !other.purpose.is_empty() && existing.purpose != other.purpose {
        if existing.purpose.is_empty() {
            existing.purpose = other.purpose;
        } else {
            existing.purpose = format!("{}; {}", existing.purpose, other.purpose);
        }
    }
}
