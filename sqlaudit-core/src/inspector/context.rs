//! Session schema state: live introspection results overlaid with the
//! effects of statements already audited in the session.
//!
//! Live lookups happen only in [`SchemaContext::prepare`], at most once per
//! schema list, table list and table definition. Checks then query the
//! context synchronously; asking about something that was never loaded is a
//! [`SqlAuditError::Context`] error rather than a silent "does not exist".

use crate::Result;
use crate::error::SqlAuditError;
use crate::parser::ast::{
    AlterSpec, AlterTable, ColumnOption, ConstraintKind, CreateTable, InsertSource, TableName,
};
use crate::parser::{SqlDialect, Statement, StatementNode, parse_one};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Live-engine introspection needed by the context.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// All schema names, system schemas included.
    async fn schemas(&self) -> Result<Vec<String>>;

    /// Base table names of `schema`.
    async fn tables(&self, schema: &str) -> Result<Vec<String>>;

    /// `CREATE TABLE` text of a table, `None` if the engine does not know it.
    async fn create_table_sql(&self, schema: &str, table: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Default)]
struct TableInfo {
    exists: bool,
    definition: Option<CreateTable>,
    definition_loaded: bool,
    alter_count: usize,
}

impl TableInfo {
    fn created(definition: Option<CreateTable>) -> Self {
        Self {
            exists: true,
            definition,
            definition_loaded: true,
            alter_count: 0,
        }
    }

    fn tombstone() -> Self {
        Self {
            exists: false,
            definition: None,
            definition_loaded: true,
            alter_count: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SchemaInfo {
    exists: bool,
    tables_loaded: bool,
    tables: BTreeMap<String, TableInfo>,
}

/// Cumulative schema state of one audit session.
#[derive(Debug, Clone)]
pub struct SchemaContext {
    dialect: SqlDialect,
    current_schema: Option<String>,
    schemas_loaded: bool,
    schemas: BTreeMap<String, SchemaInfo>,
}

impl SchemaContext {
    /// Creates an empty context; `current_schema` resolves unqualified names.
    pub fn new(dialect: SqlDialect, current_schema: Option<String>) -> Self {
        Self {
            dialect,
            current_schema,
            schemas_loaded: false,
            schemas: BTreeMap::new(),
        }
    }

    pub fn current_schema(&self) -> Option<&str> {
        self.current_schema.as_deref()
    }

    /// Schema and table of `name`, falling back to the current schema.
    pub fn resolve(&self, name: &TableName) -> Option<(String, String)> {
        let schema = name.schema.as_deref().or(self.current_schema.as_deref())?;
        Some((schema.to_string(), name.name.clone()))
    }

    /// Loads every object `node` refers to that is not cached yet.
    ///
    /// # Errors
    /// Propagates live lookup failures unchanged.
    pub async fn prepare(&mut self, node: &StatementNode, source: &dyn SchemaSource) -> Result<()> {
        self.load_schemas(source).await?;

        let mut schemas: Vec<String> = Vec::new();
        if let Statement::Use(use_stmt) = &node.stmt {
            schemas.push(use_stmt.schema.clone());
        }
        for name in statement_tables(&node.stmt) {
            if let Some((schema, _)) = self.resolve(name) {
                schemas.push(schema);
            }
        }
        schemas.sort();
        schemas.dedup();
        for schema in &schemas {
            self.load_tables(schema, source).await?;
        }

        for name in definition_tables(&node.stmt) {
            if let Some((schema, table)) = self.resolve(name) {
                self.load_definition(&schema, &table, source).await?;
            }
        }
        Ok(())
    }

    async fn load_schemas(&mut self, source: &dyn SchemaSource) -> Result<()> {
        if self.schemas_loaded {
            return Ok(());
        }
        let names = source.schemas().await?;
        debug!(count = names.len(), "Loaded schema list");
        for name in names {
            self.schemas.entry(name).or_insert_with(|| SchemaInfo {
                exists: true,
                ..Default::default()
            });
        }
        self.schemas_loaded = true;
        Ok(())
    }

    async fn load_tables(&mut self, schema: &str, source: &dyn SchemaSource) -> Result<()> {
        let needs_load = self
            .schemas
            .get(schema)
            .is_some_and(|info| info.exists && !info.tables_loaded);
        if !needs_load {
            return Ok(());
        }

        let names = source.tables(schema).await?;
        debug!(schema, count = names.len(), "Loaded table list");
        if let Some(info) = self.schemas.get_mut(schema) {
            for name in names {
                info.tables.entry(name).or_insert_with(|| TableInfo {
                    exists: true,
                    ..Default::default()
                });
            }
            info.tables_loaded = true;
        }
        Ok(())
    }

    async fn load_definition(
        &mut self,
        schema: &str,
        table: &str,
        source: &dyn SchemaSource,
    ) -> Result<()> {
        let needs_load = self
            .table_info(schema, table)
            .is_some_and(|info| info.exists && !info.definition_loaded);
        if !needs_load {
            return Ok(());
        }

        let sql = source.create_table_sql(schema, table).await?;
        let definition = sql.and_then(|sql| match parse_one(self.dialect, &sql) {
            Ok(StatementNode {
                stmt: Statement::CreateTable(mut create),
                ..
            }) => {
                create.table = TableName::qualified(schema, table);
                Some(create)
            }
            Ok(_) => {
                warn!(schema, table, "Live table definition is not a CREATE TABLE statement");
                None
            }
            Err(e) => {
                warn!(schema, table, error = %e, "Could not parse live table definition");
                None
            }
        });

        if let Some(info) = self.table_info_mut(schema, table) {
            info.definition = definition;
            info.definition_loaded = true;
        }
        Ok(())
    }

    fn table_info(&self, schema: &str, table: &str) -> Option<&TableInfo> {
        self.schemas.get(schema)?.tables.get(table)
    }

    fn table_info_mut(&mut self, schema: &str, table: &str) -> Option<&mut TableInfo> {
        self.schemas.get_mut(schema)?.tables.get_mut(table)
    }

    /// # Errors
    /// Returns a context error if the schema list was never loaded.
    pub fn schema_exists(&self, schema: &str) -> Result<bool> {
        match self.schemas.get(schema) {
            Some(info) => Ok(info.exists),
            None if self.schemas_loaded => Ok(false),
            None => Err(SqlAuditError::context(format!(
                "schema list was never loaded (looking for {})",
                schema
            ))),
        }
    }

    /// # Errors
    /// Returns a context error if the table list of `schema` was never
    /// loaded.
    pub fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        if !self.schema_exists(schema)? {
            return Ok(false);
        }
        let Some(info) = self.schemas.get(schema) else {
            return Ok(false);
        };
        match info.tables.get(table) {
            Some(table_info) => Ok(table_info.exists),
            None if info.tables_loaded => Ok(false),
            None => Err(SqlAuditError::context(format!(
                "tables of schema {} were never loaded (looking for {})",
                schema, table
            ))),
        }
    }

    /// Current merged definition of a table; `None` when the table does not
    /// exist or its definition is unknown.
    ///
    /// # Errors
    /// Returns a context error if the definition was never loaded.
    pub fn table_definition(&self, schema: &str, table: &str) -> Result<Option<&CreateTable>> {
        if !self.table_exists(schema, table)? {
            return Ok(None);
        }
        match self.table_info(schema, table) {
            Some(info) if info.definition_loaded => Ok(info.definition.as_ref()),
            _ => Err(SqlAuditError::context(format!(
                "definition of {}.{} was never loaded",
                schema, table
            ))),
        }
    }

    /// Number of ALTER TABLE statements applied to the table this session.
    pub fn alter_count(&self, schema: &str, table: &str) -> usize {
        self.table_info(schema, table)
            .map_or(0, |info| info.alter_count)
    }

    /// Applies the schema-visible effect of an audited statement.
    pub fn apply(&mut self, node: &StatementNode) {
        match &node.stmt {
            Statement::CreateDatabase(create) => {
                let info = self.schemas.entry(create.name.clone()).or_default();
                if !info.exists {
                    *info = SchemaInfo {
                        exists: true,
                        tables_loaded: true,
                        tables: BTreeMap::new(),
                    };
                }
            }
            Statement::DropDatabase(drop) => {
                self.schemas.insert(
                    drop.name.clone(),
                    SchemaInfo {
                        exists: false,
                        tables_loaded: true,
                        tables: BTreeMap::new(),
                    },
                );
            }
            Statement::CreateTable(create) => {
                let definition = match &create.like {
                    Some(source) => self.like_definition(source, &create.table),
                    None => Some(create.clone()),
                };
                if let Some((schema, table)) = self.resolve(&create.table) {
                    let exists = self.table_exists(&schema, &table).unwrap_or(false);
                    if !exists {
                        self.put_table(&schema, &table, TableInfo::created(definition));
                    }
                }
            }
            Statement::AlterTable(alter) => self.apply_alter(alter),
            Statement::DropTable(drop) => {
                for name in &drop.tables {
                    if let Some((schema, table)) = self.resolve(name) {
                        self.put_table(&schema, &table, TableInfo::tombstone());
                    }
                }
            }
            Statement::CreateIndex(index) => {
                if let Some(definition) = self.definition_mut(&index.table) {
                    definition.constraints.push(index.as_constraint());
                }
            }
            Statement::DropIndex(drop) => {
                if let Some(definition) = drop.table.as_ref().and_then(|t| self.definition_mut(t))
                {
                    merge_spec(definition, &AlterSpec::DropIndex(drop.name.clone()));
                }
            }
            Statement::Use(use_stmt) => {
                self.current_schema = Some(use_stmt.schema.clone());
            }
            Statement::TruncateTable(_)
            | Statement::Select(_)
            | Statement::Insert(_)
            | Statement::Update(_)
            | Statement::Delete(_)
            | Statement::Unhandled(_) => {}
        }
    }

    fn like_definition(&self, source: &TableName, target: &TableName) -> Option<CreateTable> {
        let (schema, table) = self.resolve(source)?;
        let mut definition = self.table_definition(&schema, &table).ok()??.clone();
        definition.table = target.clone();
        definition.if_not_exists = false;
        Some(definition)
    }

    fn put_table(&mut self, schema: &str, table: &str, info: TableInfo) {
        if let Some(schema_info) = self.schemas.get_mut(schema)
            && schema_info.exists
        {
            schema_info.tables.insert(table.to_string(), info);
        }
    }

    fn definition_mut(&mut self, name: &TableName) -> Option<&mut CreateTable> {
        let (schema, table) = self.resolve(name)?;
        let info = self.table_info_mut(&schema, &table)?;
        if !info.exists {
            return None;
        }
        info.definition.as_mut()
    }

    fn apply_alter(&mut self, alter: &AlterTable) {
        let Some((schema, table)) = self.resolve(&alter.table) else {
            return;
        };
        let Some(info) = self.table_info_mut(&schema, &table) else {
            return;
        };
        if !info.exists {
            return;
        }
        info.alter_count = info.alter_count.saturating_add(1);
        if let Some(definition) = info.definition.as_mut() {
            for spec in &alter.specs {
                merge_spec(definition, spec);
            }
        }

        let renamed = alter.specs.iter().rev().find_map(|spec| match spec {
            AlterSpec::RenameTable(target) => Some(target),
            _ => None,
        });
        if let Some(target) = renamed
            && let Some((new_schema, new_table)) = self.resolve(target)
        {
            let mut moved = self
                .table_info(&schema, &table)
                .cloned()
                .unwrap_or_default();
            if let Some(definition) = moved.definition.as_mut() {
                definition.table = target.clone();
            }
            self.put_table(&schema, &table, TableInfo::tombstone());
            self.put_table(&new_schema, &new_table, moved);
        }
    }
}

/// Tables a statement touches in any position.
pub(crate) fn statement_tables(stmt: &Statement) -> Vec<&TableName> {
    match stmt {
        Statement::CreateTable(create) => {
            let mut tables = vec![&create.table];
            tables.extend(create.like.as_ref());
            tables
        }
        Statement::AlterTable(alter) => {
            let mut tables = vec![&alter.table];
            tables.extend(alter.specs.iter().filter_map(|spec| match spec {
                AlterSpec::RenameTable(target) => Some(target),
                _ => None,
            }));
            tables
        }
        Statement::DropTable(drop) => drop.tables.iter().collect(),
        Statement::TruncateTable(truncate) => vec![&truncate.table],
        Statement::CreateIndex(index) => vec![&index.table],
        Statement::DropIndex(drop) => drop.table.iter().collect(),
        Statement::Select(select) => select.tables(),
        Statement::Insert(insert) => {
            let mut tables = vec![&insert.table];
            if let InsertSource::Select(select) = &insert.source {
                tables.extend(select.tables());
            }
            tables
        }
        Statement::Update(update) => update
            .tables
            .iter()
            .map(|r| &r.table)
            .chain(update.where_clause.iter().flat_map(|c| &c.tables))
            .collect(),
        Statement::Delete(delete) => delete
            .targets
            .iter()
            .chain(delete.from.iter().map(|r| &r.table))
            .chain(delete.where_clause.iter().flat_map(|c| &c.tables))
            .collect(),
        Statement::CreateDatabase(_)
        | Statement::DropDatabase(_)
        | Statement::Use(_)
        | Statement::Unhandled(_) => Vec::new(),
    }
}

/// Tables whose definition checks or rollback generation may read.
fn definition_tables(stmt: &Statement) -> Vec<&TableName> {
    match stmt {
        Statement::CreateTable(create) => create.like.iter().collect(),
        Statement::AlterTable(alter) => vec![&alter.table],
        Statement::DropTable(drop) => drop.tables.iter().collect(),
        Statement::CreateIndex(index) => vec![&index.table],
        Statement::DropIndex(drop) => drop.table.iter().collect(),
        Statement::Insert(insert) => vec![&insert.table],
        Statement::CreateDatabase(_)
        | Statement::DropDatabase(_)
        | Statement::TruncateTable(_)
        | Statement::Use(_)
        | Statement::Select(_)
        | Statement::Update(_)
        | Statement::Delete(_)
        | Statement::Unhandled(_) => Vec::new(),
    }
}

fn rename_in_constraints(definition: &mut CreateTable, from: &str, to: &str) {
    for constraint in &mut definition.constraints {
        for column in &mut constraint.columns {
            if column.eq_ignore_ascii_case(from) {
                *column = to.to_string();
            }
        }
    }
}

/// Folds one ALTER TABLE action into a table definition.
pub(crate) fn merge_spec(definition: &mut CreateTable, spec: &AlterSpec) {
    match spec {
        AlterSpec::AddColumns(columns) => {
            for column in columns {
                match definition.column_mut(&column.name) {
                    Some(existing) => *existing = column.clone(),
                    None => definition.columns.push(column.clone()),
                }
            }
        }
        AlterSpec::AddConstraint(constraint) => definition.constraints.push(constraint.clone()),
        AlterSpec::ChangeColumn { old_name, column } => {
            if let Some(existing) = definition.column_mut(old_name) {
                *existing = column.clone();
            }
            rename_in_constraints(definition, old_name, &column.name);
        }
        AlterSpec::ModifyColumn(column) => {
            if let Some(existing) = definition.column_mut(&column.name) {
                *existing = column.clone();
            }
        }
        AlterSpec::DropColumn(name) => {
            definition
                .columns
                .retain(|column| !column.name.eq_ignore_ascii_case(name));
            for constraint in &mut definition.constraints {
                constraint
                    .columns
                    .retain(|column| !column.eq_ignore_ascii_case(name));
            }
            definition
                .constraints
                .retain(|c| c.kind == ConstraintKind::Check || !c.columns.is_empty());
        }
        AlterSpec::DropPrimaryKey => {
            definition
                .constraints
                .retain(|c| c.kind != ConstraintKind::PrimaryKey);
            for column in &mut definition.columns {
                column
                    .options
                    .retain(|option| *option != ColumnOption::PrimaryKey);
            }
        }
        AlterSpec::DropIndex(name) => {
            definition.constraints.retain(|c| {
                !(c.is_index() && c.index_name().is_some_and(|n| n.eq_ignore_ascii_case(name)))
            });
        }
        AlterSpec::DropForeignKey(name) => {
            definition.constraints.retain(|c| {
                !(c.kind == ConstraintKind::ForeignKey
                    && c.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
            });
        }
        AlterSpec::RenameTable(target) => definition.table = target.clone(),
        AlterSpec::RenameColumn { from, to } => {
            if let Some(column) = definition.column_mut(from) {
                column.name.clone_from(to);
            }
            rename_in_constraints(definition, from, to);
        }
        AlterSpec::AlterColumnDefault { column, default } => {
            if let Some(existing) = definition.column_mut(column) {
                existing
                    .options
                    .retain(|option| !matches!(option, ColumnOption::Default(_)));
                if let Some(expr) = default {
                    existing.options.push(ColumnOption::Default(expr.clone()));
                }
            }
        }
        AlterSpec::TableOptions(options) => {
            for option in options {
                definition.set_option(option.clone());
            }
        }
        AlterSpec::Other(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory live engine that counts round trips.
    #[derive(Default)]
    struct FakeSource {
        tables: BTreeMap<String, Vec<(String, String)>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn with_table(mut self, schema: &str, table: &str, sql: &str) -> Self {
            self.tables
                .entry(schema.to_string())
                .or_default()
                .push((table.to_string(), sql.to_string()));
            self
        }

        fn with_schema(mut self, schema: &str) -> Self {
            self.tables.entry(schema.to_string()).or_default();
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SchemaSource for FakeSource {
        async fn schemas(&self) -> Result<Vec<String>> {
            self.calls.lock().unwrap().push("schemas".to_string());
            Ok(self.tables.keys().cloned().collect())
        }

        async fn tables(&self, schema: &str) -> Result<Vec<String>> {
            self.calls.lock().unwrap().push(format!("tables {}", schema));
            Ok(self
                .tables
                .get(schema)
                .map(|tables| tables.iter().map(|(name, _)| name.clone()).collect())
                .unwrap_or_default())
        }

        async fn create_table_sql(&self, schema: &str, table: &str) -> Result<Option<String>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("definition {}.{}", schema, table));
            Ok(self.tables.get(schema).and_then(|tables| {
                tables
                    .iter()
                    .find(|(name, _)| name == table)
                    .map(|(_, sql)| sql.clone())
            }))
        }
    }

    fn node(sql: &str) -> StatementNode {
        parse_one(SqlDialect::MySql, sql).unwrap()
    }

    async fn step(context: &mut SchemaContext, source: &FakeSource, sql: &str) {
        let node = node(sql);
        context.prepare(&node, source).await.unwrap();
        context.apply(&node);
    }

    #[test]
    fn test_queries_before_loading_are_errors() {
        let context = SchemaContext::new(SqlDialect::MySql, Some("db1".to_string()));
        assert!(matches!(
            context.schema_exists("db1"),
            Err(SqlAuditError::Context { .. })
        ));
        assert!(context.table_exists("db1", "t1").is_err());
    }

    #[tokio::test]
    async fn test_lookups_are_memoized() {
        let source = FakeSource::default().with_table("db1", "t1", "CREATE TABLE t1 (id INT)");
        let mut context = SchemaContext::new(SqlDialect::MySql, Some("db1".to_string()));

        step(&mut context, &source, "ALTER TABLE t1 ADD COLUMN a INT").await;
        step(&mut context, &source, "ALTER TABLE t1 ADD COLUMN b INT").await;
        step(&mut context, &source, "SELECT a FROM t1 WHERE b = 1").await;

        assert_eq!(
            source.calls(),
            ["schemas", "tables db1", "definition db1.t1"]
        );
        assert_eq!(context.alter_count("db1", "t1"), 2);
        let definition = context.table_definition("db1", "t1").unwrap().unwrap();
        let names: Vec<_> = definition.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "a", "b"]);
    }

    #[tokio::test]
    async fn test_created_objects_overlay_live_state() {
        let source = FakeSource::default().with_schema("db1");
        let mut context = SchemaContext::new(SqlDialect::MySql, Some("db1".to_string()));

        step(&mut context, &source, "CREATE DATABASE db2").await;
        step(&mut context, &source, "CREATE TABLE db2.t9 (id INT)").await;
        assert!(context.schema_exists("db2").unwrap());
        assert!(context.table_exists("db2", "t9").unwrap());

        step(&mut context, &source, "DROP DATABASE db2").await;
        assert!(!context.schema_exists("db2").unwrap());
        assert!(!context.table_exists("db2", "t9").unwrap());
    }

    #[tokio::test]
    async fn test_dropped_table_is_not_resurrected() {
        let source = FakeSource::default().with_table("db1", "t1", "CREATE TABLE t1 (id INT)");
        let mut context = SchemaContext::new(SqlDialect::MySql, Some("db1".to_string()));

        step(&mut context, &source, "DROP TABLE t1").await;
        step(&mut context, &source, "SELECT id FROM t1 WHERE id = 1").await;

        assert!(!context.table_exists("db1", "t1").unwrap());
        assert!(context.table_definition("db1", "t1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_use_switches_current_schema() {
        let source = FakeSource::default()
            .with_schema("db1")
            .with_table("db2", "t2", "CREATE TABLE t2 (id INT)");
        let mut context = SchemaContext::new(SqlDialect::MySql, Some("db1".to_string()));

        step(&mut context, &source, "USE db2").await;
        assert_eq!(context.current_schema(), Some("db2"));
        assert_eq!(
            context.resolve(&TableName::new("t2")),
            Some(("db2".to_string(), "t2".to_string()))
        );
        assert!(context.table_exists("db2", "t2").unwrap());
    }

    #[tokio::test]
    async fn test_alter_rename_moves_table() {
        let source = FakeSource::default().with_table("db1", "t1", "CREATE TABLE t1 (id INT)");
        let mut context = SchemaContext::new(SqlDialect::MySql, Some("db1".to_string()));

        step(&mut context, &source, "ALTER TABLE t1 RENAME TO t2").await;
        assert!(!context.table_exists("db1", "t1").unwrap());
        let moved = context.table_definition("db1", "t2").unwrap().unwrap();
        assert_eq!(moved.table, TableName::new("t2"));
    }

    #[tokio::test]
    async fn test_unparseable_live_definition_is_unknown() {
        let source = FakeSource::default().with_table("db1", "v1", "CREATE VIEW v1 AS SELECT 1");
        let mut context = SchemaContext::new(SqlDialect::MySql, Some("db1".to_string()));

        step(&mut context, &source, "ALTER TABLE v1 ADD COLUMN a INT").await;
        assert!(context.table_exists("db1", "v1").unwrap());
        assert!(context.table_definition("db1", "v1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_index_statements_update_definition() {
        let source = FakeSource::default().with_table("db1", "t1", "CREATE TABLE t1 (a INT, b TEXT)");
        let mut context = SchemaContext::new(SqlDialect::MySql, Some("db1".to_string()));

        step(&mut context, &source, "CREATE INDEX idx_a ON t1 (a)").await;
        assert!(
            context
                .table_definition("db1", "t1")
                .unwrap()
                .unwrap()
                .index("idx_a")
                .is_some()
        );

        step(&mut context, &source, "DROP INDEX idx_a ON t1").await;
        assert_eq!(
            context
                .table_definition("db1", "t1")
                .unwrap()
                .unwrap()
                .index_count(),
            0
        );
    }

    #[test]
    fn test_merge_change_and_drop_column() {
        let Statement::CreateTable(mut definition) =
            node("CREATE TABLE t1 (a INT, b INT, KEY idx_ab (a, b))").stmt
        else {
            panic!("expected CREATE TABLE");
        };
        let Statement::AlterTable(alter) =
            node("ALTER TABLE t1 CHANGE COLUMN a c BIGINT, DROP COLUMN b").stmt
        else {
            panic!("expected ALTER TABLE");
        };
        for spec in &alter.specs {
            merge_spec(&mut definition, spec);
        }

        assert_eq!(definition.columns.len(), 1);
        assert_eq!(definition.columns[0].name, "c");
        assert_eq!(definition.columns[0].data_type.name, "BIGINT");
        assert_eq!(definition.constraints[0].columns, ["c"]);
    }
}
