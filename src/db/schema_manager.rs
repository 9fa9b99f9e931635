use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::db::db_pool::{DbError, DuckDBPool};
use crate::models::{SchemaMap, TableSchema};

const COLUMNS_QUERY: &str = "
    SELECT table_name, column_name
    FROM information_schema.columns
    WHERE table_schema NOT IN ('information_schema', 'pg_catalog')
    ORDER BY table_name, ordinal_position";

const COMMENTS_QUERY: &str =
    "SELECT table_name, comment FROM duckdb_tables() WHERE NOT internal AND comment IS NOT NULL";

/// Builds the schema snapshot handed to prompts and generation.
pub struct SchemaManager {
    pool: DuckDBPool,
}

impl SchemaManager {
    pub fn new(pool: DuckDBPool) -> Self {
        Self { pool }
    }

    /// Introspects the database on a blocking task.
    pub async fn load(&self) -> Result<SchemaMap, DbError> {
        info!("Refreshing schema map");
        let pool = self.pool.clone();

        let schema = tokio::task::spawn_blocking(move || -> Result<SchemaMap, DbError> {
            let conn = pool.get()?;

            let mut tables: Vec<TableSchema> = Vec::new();
            let mut stmt = conn.prepare(COLUMNS_QUERY)?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (table_name, column_name) = row?;
                match tables.last_mut() {
                    Some(table) if table.name == table_name => table.columns.push(column_name),
                    _ => tables.push(TableSchema {
                        name: table_name,
                        columns: vec![column_name],
                        description: String::new(),
                    }),
                }
            }

            // Table comments are optional decoration; older files may lack them
            match conn.prepare(COMMENTS_QUERY) {
                Ok(mut stmt) => {
                    let comments: HashMap<String, String> = stmt
                        .query_map([], |row| {
                            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                        })?
                        .filter_map(Result::ok)
                        .collect();
                    for table in &mut tables {
                        if let Some(comment) = comments.get(&table.name) {
                            table.description = comment.clone();
                        }
                    }
                }
                Err(e) => warn!("Could not read table comments: {}", e),
            }

            debug!("Introspected {} tables", tables.len());
            Ok(SchemaMap::new(tables))
        })
        .await
        .map_err(|e| DbError::new(format!("Schema introspection task failed: {}", e)))??;

        info!("Schema map refreshed with {} tables", schema.len());
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::db_pool::build_pool;

    #[tokio::test]
    async fn test_load_lists_tables_columns_and_comments() {
        let pool = build_pool(":memory:", 1).unwrap();
        pool.get()
            .unwrap()
            .execute_batch(
                "CREATE TABLE customers (id INTEGER, name VARCHAR, city VARCHAR);
                 CREATE TABLE orders (id INTEGER, customer_id INTEGER, total DOUBLE);
                 COMMENT ON TABLE customers IS 'People who buy things';",
            )
            .unwrap();

        let schema = SchemaManager::new(pool).load().await.unwrap();

        assert_eq!(schema.len(), 2);
        let customers = schema.table("customers").unwrap();
        assert_eq!(customers.columns, vec!["id", "name", "city"]);
        assert_eq!(customers.description, "People who buy things");
        assert_eq!(schema.table("orders").unwrap().description, "");
    }
}
