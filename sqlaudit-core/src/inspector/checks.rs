//! Rule check functions.
//!
//! Every check has the [`CheckFn`](super::rules::CheckFn) shape: it inspects
//! one statement, may consult the schema context, and records findings at
//! the rule's configured level. Returning `Err` means the check itself could
//! not run; a violation is never an error.

use super::context::merge_spec;
use super::result::AuditResult;
use super::rules::RuleInput;
use crate::Result;
use crate::parser::ast::{
    AlterSpec, AlterTable, ColumnDef, ColumnOption, Constraint, ConstraintKind, CreateTable,
    InsertSource, Select, TableName, quote_ident,
};
use crate::parser::{Statement, is_reserved_keyword};

/// Longest object name MySQL accepts, in bytes.
const MAX_OBJECT_NAME_LENGTH: usize = 64;

const DEFAULT_MAX_INDEXES: usize = 5;
const DEFAULT_MAX_COMPOSITE_COLUMNS: usize = 5;
const DEFAULT_MAX_CHAR_LENGTH: usize = 20;

fn add(input: &RuleInput<'_>, result: &mut AuditResult, message: impl Into<String>) {
    result.add(input.rule.level, message);
}

fn qualified(schema: &str, table: &str) -> String {
    TableName::qualified(schema, table).to_string()
}

fn join_names(names: &[String]) -> String {
    names.join(", ")
}

/// Table definition after an ALTER, if the table's definition is known.
fn altered_definition(input: &RuleInput<'_>, alter: &AlterTable) -> Result<Option<CreateTable>> {
    let Some((schema, table)) = input.context.resolve(&alter.table) else {
        return Ok(None);
    };
    let Some(current) = input.context.table_definition(&schema, &table)? else {
        return Ok(None);
    };
    let mut merged = current.clone();
    for spec in &alter.specs {
        merge_spec(&mut merged, spec);
    }
    Ok(Some(merged))
}

fn index_definition(input: &RuleInput<'_>, table: &TableName) -> Result<Option<CreateTable>> {
    let Some((schema, table)) = input.context.resolve(table) else {
        return Ok(None);
    };
    Ok(input.context.table_definition(&schema, &table)?.cloned())
}

/// Column definitions an ALTER introduces or redefines.
fn altered_columns(alter: &AlterTable) -> Vec<&ColumnDef> {
    alter
        .specs
        .iter()
        .flat_map(|spec| match spec {
            AlterSpec::AddColumns(columns) => columns.iter().collect(),
            AlterSpec::ChangeColumn { column, .. } | AlterSpec::ModifyColumn(column) => {
                vec![column]
            }
            _ => Vec::new(),
        })
        .collect()
}

fn added_constraints(alter: &AlterTable) -> Vec<&Constraint> {
    alter
        .specs
        .iter()
        .filter_map(|spec| match spec {
            AlterSpec::AddConstraint(constraint) => Some(constraint),
            _ => None,
        })
        .collect()
}

fn adds_primary_key(alter: &AlterTable) -> bool {
    added_constraints(alter)
        .iter()
        .any(|c| c.kind == ConstraintKind::PrimaryKey)
        || altered_columns(alter).iter().any(|c| c.is_primary_key())
}

fn adds_index(alter: &AlterTable) -> bool {
    added_constraints(alter).iter().any(|c| c.is_index())
        || altered_columns(alter).iter().any(|c| c.is_unique())
}

pub(crate) fn check_primary_key_exist(input: &RuleInput<'_>, result: &mut AuditResult) -> Result<()> {
    if let Statement::CreateTable(create) = &input.node.stmt
        && create.like.is_none()
        && !create.has_primary_key()
    {
        add(input, result, "primary key is required");
    }
    Ok(())
}

fn primary_key_is_valid(definition: &CreateTable) -> bool {
    match definition.primary_key_columns().as_slice() {
        [name] => definition.column(name).is_some_and(|column| {
            column.data_type.is_key_integer()
                && column.data_type.unsigned
                && column.is_auto_increment()
        }),
        _ => false,
    }
}

pub(crate) fn check_primary_key_type(input: &RuleInput<'_>, result: &mut AuditResult) -> Result<()> {
    let definition = match &input.node.stmt {
        Statement::CreateTable(create) if create.like.is_none() => Some(create.clone()),
        Statement::AlterTable(alter) if adds_primary_key(alter) => {
            match altered_definition(input, alter)? {
                Some(merged) => Some(merged),
                // Unknown table: judge the new columns on their own
                None => {
                    let mut partial = CreateTable::new(alter.table.clone());
                    for spec in &alter.specs {
                        merge_spec(&mut partial, spec);
                    }
                    let complete = partial
                        .primary_key_columns()
                        .iter()
                        .all(|name| partial.column(name).is_some());
                    complete.then_some(partial)
                }
            }
        }
        _ => None,
    };

    if let Some(definition) = definition
        && definition.has_primary_key()
        && !primary_key_is_valid(&definition)
    {
        add(
            input,
            result,
            "primary key should be a single unsigned auto-increment INT or BIGINT column",
        );
    }
    Ok(())
}

fn selects_all(select: &Select) -> bool {
    select.has_wildcard()
}

pub(crate) fn check_select_all_column(input: &RuleInput<'_>, result: &mut AuditResult) -> Result<()> {
    let wildcard = match &input.node.stmt {
        Statement::Select(select) => selects_all(select),
        Statement::Insert(insert) => match &insert.source {
            InsertSource::Select(select) => selects_all(select),
            InsertSource::Values(_) => false,
        },
        _ => false,
    };
    if wildcard {
        add(input, result, "avoid SELECT *, list the columns you need");
    }
    Ok(())
}

fn select_lacks_where(select: &Select) -> bool {
    let this = !select.from.is_empty()
        && select
            .where_clause
            .as_ref()
            .is_none_or(|condition| condition.columns.is_empty());
    this || select.union.as_deref().is_some_and(select_lacks_where)
}

pub(crate) fn check_invalid_where_condition(
    input: &RuleInput<'_>,
    result: &mut AuditResult,
) -> Result<()> {
    let invalid = match &input.node.stmt {
        Statement::Select(select) => select_lacks_where(select),
        Statement::Update(update) => update
            .where_clause
            .as_ref()
            .is_none_or(|condition| condition.columns.is_empty()),
        Statement::Delete(delete) => delete
            .where_clause
            .as_ref()
            .is_none_or(|condition| condition.columns.is_empty()),
        _ => false,
    };
    if invalid {
        add(
            input,
            result,
            "WHERE clause is missing or does not reference any column",
        );
    }
    Ok(())
}

pub(crate) fn check_alter_table_need_merge(
    input: &RuleInput<'_>,
    result: &mut AuditResult,
) -> Result<()> {
    let Statement::AlterTable(alter) = &input.node.stmt else {
        return Ok(());
    };
    if let Some((schema, table)) = input.context.resolve(&alter.table)
        && input.context.alter_count(&schema, &table) > 0
    {
        add(
            input,
            result,
            format!(
                "table {} is altered more than once, merge the ALTER TABLE statements",
                qualified(&schema, &table)
            ),
        );
    }
    Ok(())
}

pub(crate) fn check_table_without_innodb_utf8mb4(
    input: &RuleInput<'_>,
    result: &mut AuditResult,
) -> Result<()> {
    let Statement::CreateTable(create) = &input.node.stmt else {
        return Ok(());
    };
    if create.like.is_some() {
        return Ok(());
    }
    let innodb = create
        .engine()
        .is_some_and(|engine| engine.eq_ignore_ascii_case("innodb"));
    let utf8mb4 = create
        .charset()
        .is_some_and(|charset| charset.eq_ignore_ascii_case("utf8mb4"));
    if !innodb || !utf8mb4 {
        add(input, result, "table should use ENGINE=InnoDB and CHARSET=utf8mb4");
    }
    Ok(())
}

/// Indexed BLOB/TEXT columns of `definition`, limited to the given index
/// definitions plus inline keys on `columns`.
fn blob_index_columns(
    definition: &CreateTable,
    constraints: &[&Constraint],
    columns: &[&ColumnDef],
) -> Vec<String> {
    let indexed = constraints
        .iter()
        .filter(|c| c.is_index() || c.kind == ConstraintKind::PrimaryKey)
        .flat_map(|c| c.columns.iter())
        .filter(|name| {
            definition
                .column(name)
                .is_some_and(|column| column.data_type.is_blob())
        });
    let inline = columns
        .iter()
        .filter(|c| (c.is_unique() || c.is_primary_key()) && c.data_type.is_blob())
        .map(|c| &c.name);

    let mut offenders: Vec<String> = Vec::new();
    for name in indexed.chain(inline) {
        if !offenders.contains(name) {
            offenders.push(name.clone());
        }
    }
    offenders
}

pub(crate) fn check_index_column_blob(input: &RuleInput<'_>, result: &mut AuditResult) -> Result<()> {
    let offenders = match &input.node.stmt {
        Statement::CreateTable(create) => {
            let constraints: Vec<&Constraint> = create.constraints.iter().collect();
            let columns: Vec<&ColumnDef> = create.columns.iter().collect();
            blob_index_columns(create, &constraints, &columns)
        }
        Statement::AlterTable(alter) => {
            let columns = altered_columns(alter);
            let constraints = added_constraints(alter);
            match altered_definition(input, alter)? {
                Some(merged) => blob_index_columns(&merged, &constraints, &columns),
                None => {
                    let partial = CreateTable::new(alter.table.clone());
                    blob_index_columns(&partial, &constraints, &columns)
                }
            }
        }
        Statement::CreateIndex(index) => match index_definition(input, &index.table)? {
            Some(definition) => {
                let constraint = index.as_constraint();
                blob_index_columns(&definition, &[&constraint], &[])
            }
            None => Vec::new(),
        },
        _ => Vec::new(),
    };

    if !offenders.is_empty() {
        add(
            input,
            result,
            format!(
                "BLOB/TEXT columns must not be indexed: {}",
                join_names(&offenders)
            ),
        );
    }
    Ok(())
}

/// Names a DDL statement introduces.
fn new_object_names(stmt: &Statement) -> Vec<String> {
    let mut names = Vec::new();
    match stmt {
        Statement::CreateDatabase(create) => names.push(create.name.clone()),
        Statement::CreateTable(create) => {
            names.push(create.table.name.clone());
            names.extend(create.columns.iter().map(|c| c.name.clone()));
            names.extend(create.constraints.iter().filter_map(|c| c.name.clone()));
        }
        Statement::AlterTable(alter) => {
            for spec in &alter.specs {
                match spec {
                    AlterSpec::AddColumns(columns) => {
                        names.extend(columns.iter().map(|c| c.name.clone()));
                    }
                    AlterSpec::ChangeColumn { column, .. } => names.push(column.name.clone()),
                    AlterSpec::AddConstraint(constraint) => names.extend(constraint.name.clone()),
                    AlterSpec::RenameTable(target) => names.push(target.name.clone()),
                    AlterSpec::RenameColumn { to, .. } => names.push(to.clone()),
                    _ => {}
                }
            }
        }
        Statement::CreateIndex(index) => names.push(index.name.clone()),
        _ => {}
    }
    names
}

pub(crate) fn check_object_name_length(input: &RuleInput<'_>, result: &mut AuditResult) -> Result<()> {
    let mut offenders: Vec<String> = Vec::new();
    for name in new_object_names(&input.node.stmt) {
        if name.len() > MAX_OBJECT_NAME_LENGTH && !offenders.contains(&name) {
            offenders.push(name);
        }
    }
    if !offenders.is_empty() {
        add(
            input,
            result,
            format!(
                "object names must not exceed {} bytes: {}",
                MAX_OBJECT_NAME_LENGTH,
                join_names(&offenders)
            ),
        );
    }
    Ok(())
}

pub(crate) fn check_object_name_using_keyword(
    input: &RuleInput<'_>,
    result: &mut AuditResult,
) -> Result<()> {
    let mut offenders: Vec<String> = Vec::new();
    for name in new_object_names(&input.node.stmt) {
        if is_reserved_keyword(&name) && !offenders.contains(&name) {
            offenders.push(name);
        }
    }
    if !offenders.is_empty() {
        add(
            input,
            result,
            format!(
                "object names must not be reserved keywords: {}",
                join_names(&offenders)
            ),
        );
    }
    Ok(())
}

fn references_other_table(column: &ColumnDef) -> bool {
    column.options.iter().any(|option| match option {
        ColumnOption::Other(text) => text
            .get(..10)
            .is_some_and(|head| head.eq_ignore_ascii_case("REFERENCES")),
        _ => false,
    })
}

pub(crate) fn check_disable_fk(input: &RuleInput<'_>, result: &mut AuditResult) -> Result<()> {
    let has_fk = match &input.node.stmt {
        Statement::CreateTable(create) => {
            create
                .constraints
                .iter()
                .any(|c| c.kind == ConstraintKind::ForeignKey)
                || create.columns.iter().any(references_other_table)
        }
        Statement::AlterTable(alter) => {
            added_constraints(alter)
                .iter()
                .any(|c| c.kind == ConstraintKind::ForeignKey)
                || altered_columns(alter)
                    .into_iter()
                    .any(references_other_table)
        }
        _ => false,
    };
    if has_fk {
        add(input, result, "foreign keys are not allowed");
    }
    Ok(())
}

pub(crate) fn check_index_count(input: &RuleInput<'_>, result: &mut AuditResult) -> Result<()> {
    let max = input.rule.threshold(DEFAULT_MAX_INDEXES);
    let count = match &input.node.stmt {
        Statement::CreateTable(create) => Some(create.index_count()),
        Statement::AlterTable(alter) if adds_index(alter) => {
            altered_definition(input, alter)?.map(|merged| merged.index_count())
        }
        Statement::CreateIndex(index) => index_definition(input, &index.table)?
            .map(|definition| definition.index_count().saturating_add(1)),
        _ => None,
    };
    if let Some(count) = count
        && count > max
    {
        add(
            input,
            result,
            format!("a table should have at most {} indexes, found {}", max, count),
        );
    }
    Ok(())
}

pub(crate) fn check_composite_index_max(
    input: &RuleInput<'_>,
    result: &mut AuditResult,
) -> Result<()> {
    let max = input.rule.threshold(DEFAULT_MAX_COMPOSITE_COLUMNS);
    let widths: Vec<usize> = match &input.node.stmt {
        Statement::CreateTable(create) => create
            .constraints
            .iter()
            .filter(|c| c.is_index() || c.kind == ConstraintKind::PrimaryKey)
            .map(|c| c.columns.len())
            .collect(),
        Statement::AlterTable(alter) => added_constraints(alter)
            .iter()
            .filter(|c| c.is_index() || c.kind == ConstraintKind::PrimaryKey)
            .map(|c| c.columns.len())
            .collect(),
        Statement::CreateIndex(index) => vec![index.columns.len()],
        _ => Vec::new(),
    };
    if widths.iter().any(|width| *width > max) {
        add(
            input,
            result,
            format!("a composite index should have at most {} columns", max),
        );
    }
    Ok(())
}

pub(crate) fn check_column_char_length(input: &RuleInput<'_>, result: &mut AuditResult) -> Result<()> {
    let max = input.rule.threshold(DEFAULT_MAX_CHAR_LENGTH);
    let columns: Vec<&ColumnDef> = match &input.node.stmt {
        Statement::CreateTable(create) => create.columns.iter().collect(),
        Statement::AlterTable(alter) => altered_columns(alter),
        _ => Vec::new(),
    };
    for column in columns {
        if !column.data_type.is_char() {
            continue;
        }
        if let Some(length) = column.data_type.length()
            && length > u64::try_from(max).unwrap_or(u64::MAX)
        {
            add(
                input,
                result,
                format!(
                    "CHAR column {} is longer than {}, use VARCHAR",
                    quote_ident(&column.name),
                    max
                ),
            );
        }
    }
    Ok(())
}

pub(crate) fn check_table_without_if_not_exists(
    input: &RuleInput<'_>,
    result: &mut AuditResult,
) -> Result<()> {
    if let Statement::CreateTable(create) = &input.node.stmt
        && !create.if_not_exists
    {
        add(input, result, "CREATE TABLE should use IF NOT EXISTS");
    }
    Ok(())
}

pub(crate) fn check_disable_drop_statement(
    input: &RuleInput<'_>,
    result: &mut AuditResult,
) -> Result<()> {
    if matches!(
        input.node.stmt,
        Statement::DropTable(_) | Statement::DropDatabase(_)
    ) {
        add(input, result, "DROP TABLE and DROP DATABASE are not allowed");
    }
    Ok(())
}

pub(crate) fn check_object_exist(input: &RuleInput<'_>, result: &mut AuditResult) -> Result<()> {
    let context = input.context;
    match &input.node.stmt {
        Statement::CreateDatabase(create) => {
            if context.schema_exists(&create.name)? {
                add(
                    input,
                    result,
                    format!("schema {} already exists", quote_ident(&create.name)),
                );
            }
        }
        Statement::CreateTable(create) => {
            if let Some((schema, table)) = context.resolve(&create.table)
                && context.schema_exists(&schema)?
                && context.table_exists(&schema, &table)?
            {
                add(
                    input,
                    result,
                    format!("table {} already exists", qualified(&schema, &table)),
                );
            }
        }
        _ => {}
    }
    Ok(())
}

/// Schemas and tables that must already exist for the statement to run.
fn required_objects(stmt: &Statement) -> (Vec<&str>, Vec<&TableName>) {
    match stmt {
        Statement::Use(use_stmt) => (vec![use_stmt.schema.as_str()], Vec::new()),
        Statement::CreateTable(create) => {
            let mut tables = Vec::new();
            tables.extend(create.like.as_ref());
            (Vec::new(), tables)
        }
        Statement::AlterTable(alter) => (Vec::new(), vec![&alter.table]),
        Statement::Select(select) => (Vec::new(), select.tables()),
        Statement::Insert(insert) => {
            let mut tables = vec![&insert.table];
            if let InsertSource::Select(select) = &insert.source {
                tables.extend(select.tables());
            }
            (Vec::new(), tables)
        }
        Statement::Update(update) => {
            let mut tables: Vec<&TableName> = update.tables.iter().map(|r| &r.table).collect();
            tables.extend(update.where_clause.iter().flat_map(|c| &c.tables));
            (Vec::new(), tables)
        }
        Statement::Delete(delete) => {
            let mut tables: Vec<&TableName> = delete.from.iter().map(|r| &r.table).collect();
            tables.extend(delete.where_clause.iter().flat_map(|c| &c.tables));
            (Vec::new(), tables)
        }
        _ => (Vec::new(), Vec::new()),
    }
}

pub(crate) fn check_object_not_exist(input: &RuleInput<'_>, result: &mut AuditResult) -> Result<()> {
    let context = input.context;
    let (schemas, tables) = required_objects(&input.node.stmt);

    let mut candidate_schemas: Vec<String> = schemas.iter().map(|s| (*s).to_string()).collect();
    if let Statement::CreateTable(create) = &input.node.stmt
        && let Some((schema, _)) = context.resolve(&create.table)
    {
        candidate_schemas.push(schema);
    }
    let resolved: Vec<(String, String)> = tables
        .into_iter()
        .filter_map(|name| context.resolve(name))
        .collect();
    candidate_schemas.extend(resolved.iter().map(|(schema, _)| schema.clone()));

    let mut missing_schemas: Vec<String> = Vec::new();
    for schema in candidate_schemas {
        let name = quote_ident(&schema);
        if !context.schema_exists(&schema)? && !missing_schemas.contains(&name) {
            missing_schemas.push(name);
        }
    }

    let mut missing_tables: Vec<String> = Vec::new();
    for (schema, table) in &resolved {
        if !context.schema_exists(schema)? {
            continue;
        }
        let name = qualified(schema, table);
        if !context.table_exists(schema, table)? && !missing_tables.contains(&name) {
            missing_tables.push(name);
        }
    }

    if !missing_schemas.is_empty() {
        add(
            input,
            result,
            format!("schema {} does not exist", join_names(&missing_schemas)),
        );
    }
    if !missing_tables.is_empty() {
        add(
            input,
            result,
            format!("table {} does not exist", join_names(&missing_tables)),
        );
    }
    Ok(())
}
