//! Rollback statement generation.
//!
//! Rollback SQL is derived from the statement and the schema context as it
//! stood before the statement ran. Generation is best effort: when the
//! inverse cannot be expressed, the result carries no SQL and a message
//! saying why.

use super::context::SchemaContext;
use crate::Result;
use crate::parser::Statement;
use crate::parser::ast::{
    AlterSpec, AlterTable, Constraint, ConstraintKind, CreateTable, Insert, InsertSource,
    TableName, TableOption, quote_ident,
};
use serde::{Deserialize, Serialize};

/// Statements undoing an audited statement, or the reason there are none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackSql {
    pub sql: String,
    pub message: String,
}

impl RollbackSql {
    fn statements(statements: Vec<String>) -> Self {
        let sql = statements
            .into_iter()
            .map(|statement| format!("{};", statement))
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            sql,
            message: String::new(),
        }
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self {
            sql: String::new(),
            message: message.into(),
        }
    }
}

/// Builds the rollback for one statement.
///
/// # Errors
/// Propagates schema context errors; these indicate the context was not
/// prepared for `stmt`.
pub fn generate(stmt: &Statement, context: &SchemaContext) -> Result<RollbackSql> {
    let rollback = match stmt {
        Statement::CreateDatabase(create) => RollbackSql::statements(vec![format!(
            "DROP DATABASE IF EXISTS {}",
            quote_ident(&create.name)
        )]),
        Statement::CreateTable(create) => RollbackSql::statements(vec![format!(
            "DROP TABLE IF EXISTS {}",
            qualify(context, &create.table)
        )]),
        Statement::DropTable(drop) => {
            let mut statements = Vec::new();
            for name in &drop.tables {
                match known_definition(context, name)? {
                    Some(definition) => statements.push(definition.to_string()),
                    None => {
                        return Ok(RollbackSql::unsupported(format!(
                            "definition of table {} is unknown, cannot recreate it",
                            qualify(context, name)
                        )));
                    }
                }
            }
            RollbackSql::statements(statements)
        }
        Statement::AlterTable(alter) => match known_definition(context, &alter.table)? {
            Some(definition) => match alter_rollback(context, alter, &definition) {
                Ok(inverse) => RollbackSql::statements(vec![inverse.to_string()]),
                Err(reason) => RollbackSql::unsupported(reason),
            },
            None => RollbackSql::unsupported(format!(
                "definition of table {} is unknown, cannot reverse ALTER TABLE",
                qualify(context, &alter.table)
            )),
        },
        Statement::CreateIndex(index) => RollbackSql::statements(vec![format!(
            "DROP INDEX {} ON {}",
            quote_ident(&index.name),
            qualify(context, &index.table)
        )]),
        Statement::DropIndex(drop) => {
            let Some(table) = &drop.table else {
                return Ok(RollbackSql::unsupported(
                    "DROP INDEX without a table cannot be reversed",
                ));
            };
            let index = known_definition(context, table)?
                .and_then(|definition| definition.index(&drop.name).cloned());
            match index {
                Some(constraint) => RollbackSql::statements(vec![format!(
                    "ALTER TABLE {} ADD {}",
                    qualify(context, table),
                    constraint
                )]),
                None => RollbackSql::unsupported(format!(
                    "definition of index {} is unknown, cannot recreate it",
                    quote_ident(&drop.name)
                )),
            }
        }
        Statement::Insert(insert) => insert_rollback(context, insert)?,
        Statement::DropDatabase(_) => {
            RollbackSql::unsupported("DROP DATABASE cannot be rolled back")
        }
        Statement::TruncateTable(_) => {
            RollbackSql::unsupported("TRUNCATE TABLE cannot be rolled back")
        }
        Statement::Update(_) => RollbackSql::unsupported(
            "UPDATE rollback needs the affected rows, which are not recorded",
        ),
        Statement::Delete(_) => RollbackSql::unsupported(
            "DELETE rollback needs the deleted rows, which are not recorded",
        ),
        Statement::Unhandled(unhandled) => RollbackSql::unsupported(format!(
            "rollback of {} is not supported",
            unhandled.verb
        )),
        Statement::Select(_) | Statement::Use(_) => RollbackSql::default(),
    };
    Ok(rollback)
}

fn qualify(context: &SchemaContext, name: &TableName) -> TableName {
    match context.resolve(name) {
        Some((schema, table)) => TableName::qualified(schema, table),
        None => name.clone(),
    }
}

fn known_definition(context: &SchemaContext, name: &TableName) -> Result<Option<CreateTable>> {
    let Some((schema, table)) = context.resolve(name) else {
        return Ok(None);
    };
    Ok(context.table_definition(&schema, &table)?.cloned())
}

/// Inverse of an ALTER TABLE, run against the table's post-ALTER name.
fn alter_rollback(
    context: &SchemaContext,
    alter: &AlterTable,
    before: &CreateTable,
) -> std::result::Result<AlterTable, String> {
    let original = qualify(context, &alter.table);
    let mut target = original.clone();
    let mut specs = Vec::new();

    for spec in alter.specs.iter().rev() {
        match spec {
            AlterSpec::AddColumns(columns) => {
                for column in columns.iter().rev() {
                    specs.push(match before.column(&column.name) {
                        Some(previous) => AlterSpec::ModifyColumn(previous.clone()),
                        None => AlterSpec::DropColumn(column.name.clone()),
                    });
                }
            }
            AlterSpec::AddConstraint(constraint) => specs.push(drop_constraint(constraint)?),
            AlterSpec::ChangeColumn { old_name, column } => {
                let previous = before
                    .column(old_name)
                    .ok_or_else(|| format!("column {} is unknown", quote_ident(old_name)))?;
                specs.push(AlterSpec::ChangeColumn {
                    old_name: column.name.clone(),
                    column: previous.clone(),
                });
            }
            AlterSpec::ModifyColumn(column) => {
                let previous = before
                    .column(&column.name)
                    .ok_or_else(|| format!("column {} is unknown", quote_ident(&column.name)))?;
                specs.push(AlterSpec::ModifyColumn(previous.clone()));
            }
            AlterSpec::DropColumn(name) => {
                let previous = before
                    .column(name)
                    .ok_or_else(|| format!("column {} is unknown", quote_ident(name)))?;
                specs.push(AlterSpec::AddColumns(vec![previous.clone()]));
            }
            AlterSpec::DropPrimaryKey => {
                let columns: Vec<String> = before
                    .primary_key_columns()
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                if columns.is_empty() {
                    return Err("table has no primary key to restore".to_string());
                }
                specs.push(AlterSpec::AddConstraint(Constraint::new(
                    ConstraintKind::PrimaryKey,
                    None,
                    columns,
                )));
            }
            AlterSpec::DropIndex(name) | AlterSpec::DropForeignKey(name) => {
                let constraint = before
                    .index(name)
                    .ok_or_else(|| format!("index {} is unknown", quote_ident(name)))?;
                specs.push(AlterSpec::AddConstraint(constraint.clone()));
            }
            AlterSpec::RenameTable(renamed) => {
                target = qualify(context, renamed);
                specs.push(AlterSpec::RenameTable(original.clone()));
            }
            AlterSpec::RenameColumn { from, to } => specs.push(AlterSpec::RenameColumn {
                from: to.clone(),
                to: from.clone(),
            }),
            AlterSpec::AlterColumnDefault { column, .. } => {
                let previous = before
                    .column(column)
                    .ok_or_else(|| format!("column {} is unknown", quote_ident(column)))?;
                specs.push(AlterSpec::AlterColumnDefault {
                    column: column.clone(),
                    default: previous.default_value().map(str::to_string),
                });
            }
            AlterSpec::TableOptions(options) => {
                let restored: Vec<TableOption> = options
                    .iter()
                    .filter_map(|option| {
                        before
                            .options
                            .iter()
                            .find(|previous| previous.same_slot(option))
                            .cloned()
                    })
                    .collect();
                if !restored.is_empty() {
                    specs.push(AlterSpec::TableOptions(restored));
                }
            }
            AlterSpec::Other(text) => {
                return Err(format!("ALTER TABLE action \"{}\" cannot be reversed", text));
            }
        }
    }

    if specs.is_empty() {
        return Err("ALTER TABLE has no reversible action".to_string());
    }
    Ok(AlterTable {
        table: target,
        specs,
    })
}

fn drop_constraint(constraint: &Constraint) -> std::result::Result<AlterSpec, String> {
    match constraint.kind {
        ConstraintKind::PrimaryKey => Ok(AlterSpec::DropPrimaryKey),
        ConstraintKind::ForeignKey => constraint
            .name
            .clone()
            .map(AlterSpec::DropForeignKey)
            .ok_or_else(|| "foreign key has no name and cannot be dropped".to_string()),
        ConstraintKind::Check => constraint
            .name
            .as_ref()
            .map(|name| AlterSpec::Other(format!("DROP CHECK {}", quote_ident(name))))
            .ok_or_else(|| "check constraint has no name and cannot be dropped".to_string()),
        ConstraintKind::Unique
        | ConstraintKind::Index
        | ConstraintKind::FullText
        | ConstraintKind::Spatial => constraint
            .index_name()
            .map(|name| AlterSpec::DropIndex(name.to_string()))
            .ok_or_else(|| "index has no name and cannot be dropped".to_string()),
    }
}

/// Value that leaves the key to the engine, so the row cannot be addressed.
fn is_generated_value(value: &str) -> bool {
    value.eq_ignore_ascii_case("NULL") || value.eq_ignore_ascii_case("DEFAULT")
}

fn insert_rollback(context: &SchemaContext, insert: &Insert) -> Result<RollbackSql> {
    if insert.replace {
        return Ok(RollbackSql::unsupported(
            "REPLACE overwrites existing rows and cannot be rolled back",
        ));
    }
    let InsertSource::Values(rows) = &insert.source else {
        return Ok(RollbackSql::unsupported(
            "INSERT ... SELECT cannot be rolled back",
        ));
    };
    let table = qualify(context, &insert.table);
    let Some(definition) = known_definition(context, &insert.table)? else {
        return Ok(RollbackSql::unsupported(format!(
            "definition of table {} is unknown, cannot address inserted rows",
            table
        )));
    };

    let primary_key = definition.primary_key_columns();
    if primary_key.is_empty() {
        return Ok(RollbackSql::unsupported(format!(
            "table {} has no primary key, cannot address inserted rows",
            table
        )));
    }
    let columns: Vec<&str> = if insert.columns.is_empty() {
        definition.columns.iter().map(|c| c.name.as_str()).collect()
    } else {
        insert.columns.iter().map(String::as_str).collect()
    };
    let positions: Option<Vec<usize>> = primary_key
        .iter()
        .map(|key| columns.iter().position(|c| c.eq_ignore_ascii_case(key)))
        .collect();
    let Some(positions) = positions else {
        return Ok(RollbackSql::unsupported(
            "INSERT does not set every primary key column",
        ));
    };

    let mut statements = Vec::new();
    for row in rows {
        let mut predicates = Vec::new();
        for (key, position) in primary_key.iter().zip(&positions) {
            match row.get(*position) {
                Some(value) if !is_generated_value(value) => {
                    predicates.push(format!("{} = {}", quote_ident(key), value));
                }
                _ => {
                    return Ok(RollbackSql::unsupported(
                        "INSERT leaves primary key values to the engine, cannot address inserted rows",
                    ));
                }
            }
        }
        statements.push(format!(
            "DELETE FROM {} WHERE {}",
            table,
            predicates.join(" AND ")
        ));
    }
    Ok(RollbackSql::statements(statements))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::context::SchemaSource;
    use crate::parser::{SqlDialect, parse_one};
    use async_trait::async_trait;

    struct OneTable;

    #[async_trait]
    impl SchemaSource for OneTable {
        async fn schemas(&self) -> Result<Vec<String>> {
            Ok(vec!["db1".to_string()])
        }

        async fn tables(&self, _schema: &str) -> Result<Vec<String>> {
            Ok(vec!["t1".to_string()])
        }

        async fn create_table_sql(&self, _schema: &str, _table: &str) -> Result<Option<String>> {
            Ok(Some(
                "CREATE TABLE t1 (id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT, \
                 name VARCHAR(32) DEFAULT 'x', KEY idx_name (name), PRIMARY KEY (id)) \
                 ENGINE=InnoDB"
                    .to_string(),
            ))
        }
    }

    async fn rollback_of(sql: &str) -> RollbackSql {
        let node = parse_one(SqlDialect::MySql, sql).unwrap();
        let mut context = SchemaContext::new(SqlDialect::MySql, Some("db1".to_string()));
        context.prepare(&node, &OneTable).await.unwrap();
        generate(&node.stmt, &context).unwrap()
    }

    #[tokio::test]
    async fn test_create_statements_drop_the_object() {
        assert_eq!(
            rollback_of("CREATE TABLE t2 (id INT)").await.sql,
            "DROP TABLE IF EXISTS `db1`.`t2`;"
        );
        assert_eq!(
            rollback_of("CREATE DATABASE db9").await.sql,
            "DROP DATABASE IF EXISTS `db9`;"
        );
        assert_eq!(
            rollback_of("CREATE INDEX idx_x ON t1 (name)").await.sql,
            "DROP INDEX `idx_x` ON `db1`.`t1`;"
        );
    }

    #[tokio::test]
    async fn test_drop_table_recreates_definition() {
        let rollback = rollback_of("DROP TABLE t1").await;
        assert!(rollback.sql.starts_with("CREATE TABLE `db1`.`t1` ("));
        assert!(rollback.sql.contains("PRIMARY KEY (`id`)"));
        assert!(rollback.message.is_empty());
    }

    #[tokio::test]
    async fn test_drop_unknown_table_is_advisory() {
        let rollback = rollback_of("DROP TABLE t404").await;
        assert!(rollback.sql.is_empty());
        assert!(rollback.message.contains("`db1`.`t404`"));
    }

    #[tokio::test]
    async fn test_alter_is_reversed_in_reverse_order() {
        let rollback =
            rollback_of("ALTER TABLE t1 ADD COLUMN age INT, RENAME COLUMN name TO title").await;
        assert_eq!(
            rollback.sql,
            "ALTER TABLE `db1`.`t1` RENAME COLUMN `title` TO `name`, DROP COLUMN `age`;"
        );
    }

    #[tokio::test]
    async fn test_alter_rename_table_targets_new_name() {
        let rollback = rollback_of("ALTER TABLE t1 RENAME TO t2").await;
        assert_eq!(
            rollback.sql,
            "ALTER TABLE `db1`.`t2` RENAME TO `db1`.`t1`;"
        );
    }

    #[tokio::test]
    async fn test_alter_unnamed_foreign_key_is_advisory() {
        let rollback =
            rollback_of("ALTER TABLE t1 ADD FOREIGN KEY (id) REFERENCES t3 (id)").await;
        assert!(rollback.sql.is_empty());
        assert!(rollback.message.contains("no name"));
    }

    #[tokio::test]
    async fn test_insert_values_deletes_by_primary_key() {
        let rollback = rollback_of("INSERT INTO t1 (id, name) VALUES (1, 'a'), (2, 'b')").await;
        assert_eq!(
            rollback.sql,
            "DELETE FROM `db1`.`t1` WHERE `id` = 1;\nDELETE FROM `db1`.`t1` WHERE `id` = 2;"
        );
    }

    #[tokio::test]
    async fn test_insert_without_key_is_advisory() {
        let rollback = rollback_of("INSERT INTO t1 (name) VALUES ('a')").await;
        assert!(rollback.sql.is_empty());
        assert!(!rollback.message.is_empty());
    }

    #[tokio::test]
    async fn test_dml_and_select_rollbacks() {
        let update = rollback_of("UPDATE t1 SET name = 'b' WHERE id = 1").await;
        assert!(update.sql.is_empty());
        assert!(!update.message.is_empty());

        let select = rollback_of("SELECT id FROM t1 WHERE id = 1").await;
        assert_eq!(select, RollbackSql::default());
    }
}
