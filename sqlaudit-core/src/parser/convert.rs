//! Converts `sqlparser` syntax trees into the [`Statement`] model.
//!
//! Only what rules, schema tracking and rollback need is carried over.
//! Nested reads (joins, derived tables, subqueries, CTE bodies) are found
//! with `sqlparser`'s visitor; references to CTE names are never reported
//! as tables.

use super::ast::*;
use crate::models::StatementKind;
use sqlparser::ast::{
    self as sql, AlterColumnOperation, AlterTableOperation, CommentDef, CreateTableLikeKind,
    CreateTableOptions, EnumMember, Expr, FromTable, Ident, IndexColumn, ObjectName, ObjectType,
    Query, RenameTableNameKind, SchemaName, SetExpr, SqlOption, TableConstraint, TableFactor,
    TableObject, TableWithJoins, UpdateTableFromKind, Value, Visit, Visitor,
};
use sqlparser::tokenizer::Token;
use std::ops::ControlFlow;

/// Converts one validated statement. `verb` holds its leading keywords
/// and names statements that are not modeled.
pub(crate) fn statement(stmt: &sql::Statement, verb: &str) -> Statement {
    match stmt {
        sql::Statement::CreateTable(create) => Statement::CreateTable(create_table(create)),
        sql::Statement::AlterTable(alter) => Statement::AlterTable(AlterTable {
            table: table_name(&alter.name),
            specs: alter.operations.iter().flat_map(alter_specs).collect(),
        }),
        sql::Statement::CreateIndex(index) => Statement::CreateIndex(create_index(index)),
        sql::Statement::CreateDatabase {
            db_name,
            if_not_exists,
            ..
        } => Statement::CreateDatabase(CreateDatabase {
            name: object_ident(db_name),
            if_not_exists: *if_not_exists,
            options: Vec::new(),
        }),
        sql::Statement::CreateSchema {
            schema_name: SchemaName::Simple(name),
            if_not_exists,
            ..
        } => Statement::CreateDatabase(CreateDatabase {
            name: object_ident(name),
            if_not_exists: *if_not_exists,
            options: Vec::new(),
        }),
        sql::Statement::Drop {
            object_type,
            if_exists,
            names,
            temporary,
            table,
            ..
        } => drop_statement(*object_type, *if_exists, *temporary, names, table.as_ref())
            .unwrap_or_else(|| unhandled(stmt, verb)),
        sql::Statement::Truncate(truncate) => match truncate.table_names.first() {
            Some(target) => Statement::TruncateTable(TruncateTable {
                table: table_name(&target.name),
            }),
            None => unhandled(stmt, verb),
        },
        sql::Statement::Use(
            sql::Use::Object(name)
            | sql::Use::Database(name)
            | sql::Use::Schema(name)
            | sql::Use::Catalog(name),
        ) => Statement::Use(Use {
            schema: object_ident(name),
        }),
        sql::Statement::Query(query) => Statement::Select(query_select(query, &[])),
        sql::Statement::Insert(insert) => match &insert.table {
            TableObject::TableName(name) => Statement::Insert(self::insert(insert, name)),
            TableObject::TableFunction(_) => unhandled(stmt, verb),
        },
        sql::Statement::Update(update) => Statement::Update(self::update(update)),
        sql::Statement::Delete(delete) => Statement::Delete(self::delete(delete)),
        _ => unhandled(stmt, verb),
    }
}

fn unhandled(stmt: &sql::Statement, verb: &str) -> Statement {
    let kind = match stmt {
        sql::Statement::Grant { .. }
        | sql::Statement::Revoke { .. }
        | sql::Statement::Deny(_)
        | sql::Statement::CreateUser(_)
        | sql::Statement::AlterUser(_)
        | sql::Statement::CreateRole(_)
        | sql::Statement::AlterRole { .. }
        | sql::Statement::Drop {
            object_type: ObjectType::User | ObjectType::Role,
            ..
        } => StatementKind::Dcl,
        _ => match verb.split(' ').next() {
            Some("CREATE" | "ALTER" | "DROP" | "RENAME" | "TRUNCATE") => StatementKind::Ddl,
            _ => StatementKind::Other,
        },
    };
    Statement::Unhandled(Unhandled {
        kind,
        verb: verb.to_string(),
    })
}

fn drop_statement(
    object_type: ObjectType,
    if_exists: bool,
    temporary: bool,
    names: &[ObjectName],
    table: Option<&ObjectName>,
) -> Option<Statement> {
    let first = names.first()?;
    let stmt = match object_type {
        ObjectType::Table => Statement::DropTable(DropTable {
            tables: names.iter().map(table_name).collect(),
            if_exists,
            temporary,
        }),
        ObjectType::Database | ObjectType::Schema => Statement::DropDatabase(DropDatabase {
            name: object_ident(first),
            if_exists,
        }),
        ObjectType::Index => Statement::DropIndex(DropIndex {
            name: object_ident(first),
            table: table.map(table_name),
        }),
        _ => return None,
    };
    Some(stmt)
}

fn ident(ident: &Ident) -> String {
    ident.value.clone()
}

/// Last identifier of a possibly qualified name.
fn object_ident(name: &ObjectName) -> String {
    name.0
        .last()
        .and_then(|part| part.as_ident())
        .map_or_else(|| name.to_string(), ident)
}

fn table_name(name: &ObjectName) -> TableName {
    let parts: Vec<&Ident> = name.0.iter().filter_map(|part| part.as_ident()).collect();
    match parts.as_slice() {
        [.., schema, table] => TableName::qualified(ident(schema), ident(table)),
        [table] => TableName::new(ident(table)),
        [] => TableName::new(name.to_string()),
    }
}

/// Unquoted text of an option value.
fn value_text(expr: &Expr) -> String {
    match expr {
        Expr::Value(value) => match &value.value {
            Value::SingleQuotedString(text) | Value::DoubleQuotedString(text) => text.clone(),
            other => other.to_string(),
        },
        Expr::Identifier(name) => ident(name),
        other => other.to_string(),
    }
}

fn comment_text(comment: &CommentDef) -> String {
    match comment {
        CommentDef::WithEq(text) | CommentDef::WithoutEq(text) => text.clone(),
    }
}

fn data_type(data_type: &sql::DataType) -> DataType {
    match data_type {
        sql::DataType::Unspecified => return DataType::new(""),
        sql::DataType::Enum(members, _) => {
            let mut converted = DataType::new("ENUM");
            converted.args = members
                .iter()
                .map(|member| match member {
                    EnumMember::Name(name) => quote_str(name),
                    EnumMember::NamedValue(name, value) => {
                        format!("{} = {}", quote_str(name), value)
                    }
                })
                .collect();
            return converted;
        }
        sql::DataType::Set(members) => {
            let mut converted = DataType::new("SET");
            converted.args = members.iter().map(|member| quote_str(member)).collect();
            return converted;
        }
        _ => {}
    }

    // Numeric and character types render as `NAME(args) [UNSIGNED]`
    let rendered = data_type.to_string();
    let (rendered, unsigned) = match rendered.strip_suffix(" UNSIGNED") {
        Some(base) => (base, true),
        None => (rendered.as_str(), false),
    };
    let mut converted = match rendered.split_once('(') {
        Some((name, rest)) => {
            let mut converted = DataType::new(name.trim());
            let inner = rest.rsplit_once(')').map_or(rest, |(inner, _)| inner);
            converted.args = inner.split(',').map(|arg| arg.trim().to_string()).collect();
            converted
        }
        None => DataType::new(rendered.trim()),
    };
    converted.unsigned = unsigned;
    converted
}

fn column_option(option: &sql::ColumnOption) -> ColumnOption {
    match option {
        sql::ColumnOption::Null => ColumnOption::Null,
        sql::ColumnOption::NotNull => ColumnOption::NotNull,
        sql::ColumnOption::Default(expr) => ColumnOption::Default(expr.to_string()),
        sql::ColumnOption::PrimaryKey(_) => ColumnOption::PrimaryKey,
        sql::ColumnOption::Unique(_) => ColumnOption::UniqueKey,
        sql::ColumnOption::DialectSpecific(tokens) if is_auto_increment(tokens) => {
            ColumnOption::AutoIncrement
        }
        sql::ColumnOption::CharacterSet(name) => ColumnOption::Charset(object_ident(name)),
        sql::ColumnOption::Collation(name) => ColumnOption::Collate(object_ident(name)),
        sql::ColumnOption::Comment(text) => ColumnOption::Comment(text.clone()),
        sql::ColumnOption::OnUpdate(expr) => ColumnOption::OnUpdate(expr.to_string()),
        other => ColumnOption::Other(other.to_string()),
    }
}

fn is_auto_increment(tokens: &[Token]) -> bool {
    matches!(
        tokens,
        [Token::Word(word)]
            if word.value.eq_ignore_ascii_case("AUTO_INCREMENT")
                || word.value.eq_ignore_ascii_case("AUTOINCREMENT")
    )
}

fn column<'a>(
    name: &Ident,
    data_type: &sql::DataType,
    options: impl Iterator<Item = &'a sql::ColumnOption>,
) -> ColumnDef {
    let mut column = ColumnDef::new(ident(name), self::data_type(data_type));
    column.options = options.map(column_option).collect();
    column
}

fn column_def(def: &sql::ColumnDef) -> ColumnDef {
    column(
        &def.name,
        &def.data_type,
        def.options.iter().map(|option| &option.option),
    )
}

/// Column an index part refers to; `name(10)` prefix parts parse as calls.
fn index_column(part: &IndexColumn) -> String {
    match &part.column.expr {
        Expr::Identifier(name) => ident(name),
        Expr::CompoundIdentifier(names) => names.last().map(ident).unwrap_or_default(),
        Expr::Function(function) => object_ident(&function.name),
        other => other.to_string(),
    }
}

fn index_columns(parts: &[IndexColumn]) -> Vec<String> {
    parts.iter().map(index_column).collect()
}

fn constraint(constraint: &TableConstraint) -> Constraint {
    match constraint {
        TableConstraint::PrimaryKey(pk) => Constraint::new(
            ConstraintKind::PrimaryKey,
            pk.name.as_ref().map(ident),
            index_columns(&pk.columns),
        ),
        TableConstraint::Unique(unique) => Constraint::new(
            ConstraintKind::Unique,
            unique.index_name.as_ref().or(unique.name.as_ref()).map(ident),
            index_columns(&unique.columns),
        ),
        TableConstraint::Index(index) => Constraint::new(
            ConstraintKind::Index,
            index.name.as_ref().map(ident),
            index_columns(&index.columns),
        ),
        TableConstraint::FulltextOrSpatial(index) => Constraint::new(
            if index.fulltext {
                ConstraintKind::FullText
            } else {
                ConstraintKind::Spatial
            },
            index.opt_index_name.as_ref().map(ident),
            index_columns(&index.columns),
        ),
        TableConstraint::ForeignKey(fk) => {
            let mut actions = Vec::new();
            if let Some(action) = &fk.on_delete {
                actions.push(format!("ON DELETE {}", action));
            }
            if let Some(action) = &fk.on_update {
                actions.push(format!("ON UPDATE {}", action));
            }
            let mut converted = Constraint::new(
                ConstraintKind::ForeignKey,
                fk.name.as_ref().or(fk.index_name.as_ref()).map(ident),
                fk.columns.iter().map(ident).collect(),
            );
            converted.reference = Some(ForeignReference {
                table: table_name(&fk.foreign_table),
                columns: fk.referred_columns.iter().map(ident).collect(),
                actions: actions.join(" "),
            });
            converted
        }
        TableConstraint::Check(check) => {
            let mut converted =
                Constraint::new(ConstraintKind::Check, check.name.as_ref().map(ident), Vec::new());
            converted.expr = Some(check.expr.to_string());
            converted
        }
    }
}

fn table_option(option: &SqlOption) -> Option<TableOption> {
    match option {
        SqlOption::NamedParenthesizedList(list) if list.key.value.eq_ignore_ascii_case("ENGINE") => {
            list.name.as_ref().map(|name| TableOption::Engine(ident(name)))
        }
        SqlOption::Comment(comment) => Some(TableOption::Comment(comment_text(comment))),
        SqlOption::KeyValue { key, value } => {
            let value = value_text(value);
            let option = match key.value.to_ascii_uppercase().as_str() {
                "DEFAULT CHARSET" | "CHARSET" | "DEFAULT CHARACTER SET" | "CHARACTER SET" => {
                    TableOption::Charset(value)
                }
                "DEFAULT COLLATE" | "COLLATE" => TableOption::Collate(value),
                "AUTO_INCREMENT" => TableOption::AutoIncrement(value),
                name => TableOption::Other {
                    name: name.to_string(),
                    value,
                },
            };
            Some(option)
        }
        _ => None,
    }
}

fn table_options(options: &CreateTableOptions) -> Vec<TableOption> {
    match options {
        CreateTableOptions::None => Vec::new(),
        CreateTableOptions::With(options)
        | CreateTableOptions::Options(options)
        | CreateTableOptions::Plain(options)
        | CreateTableOptions::TableProperties(options) => {
            options.iter().filter_map(table_option).collect()
        }
    }
}

fn create_table(source: &sql::CreateTable) -> CreateTable {
    let mut create = CreateTable::new(table_name(&source.name));
    create.if_not_exists = source.if_not_exists;
    create.temporary = source.temporary;
    if let Some(CreateTableLikeKind::Parenthesized(like) | CreateTableLikeKind::Plain(like)) =
        &source.like
    {
        create.like = Some(table_name(&like.name));
        return create;
    }

    create.columns = source.columns.iter().map(column_def).collect();
    create.constraints = source.constraints.iter().map(constraint).collect();
    create.options = table_options(&source.table_options);
    if let Some(comment) = &source.comment {
        create.set_option(TableOption::Comment(comment_text(comment)));
    }
    create
}

fn alter_specs(operation: &AlterTableOperation) -> Vec<AlterSpec> {
    let spec = match operation {
        AlterTableOperation::AddColumn { column_def, .. } => {
            AlterSpec::AddColumns(vec![self::column_def(column_def)])
        }
        AlterTableOperation::AddConstraint { constraint, .. } => {
            AlterSpec::AddConstraint(self::constraint(constraint))
        }
        AlterTableOperation::ChangeColumn {
            old_name,
            new_name,
            data_type,
            options,
            ..
        } => AlterSpec::ChangeColumn {
            old_name: ident(old_name),
            column: column(new_name, data_type, options.iter()),
        },
        AlterTableOperation::ModifyColumn {
            col_name,
            data_type,
            options,
            ..
        } => AlterSpec::ModifyColumn(column(col_name, data_type, options.iter())),
        AlterTableOperation::DropColumn { column_names, .. } => {
            return column_names
                .iter()
                .map(|name| AlterSpec::DropColumn(ident(name)))
                .collect();
        }
        AlterTableOperation::DropPrimaryKey { .. } => AlterSpec::DropPrimaryKey,
        AlterTableOperation::DropIndex { name } => AlterSpec::DropIndex(ident(name)),
        AlterTableOperation::DropForeignKey { name, .. } => AlterSpec::DropForeignKey(ident(name)),
        AlterTableOperation::RenameTable {
            table_name: RenameTableNameKind::As(name) | RenameTableNameKind::To(name),
        } => AlterSpec::RenameTable(table_name(name)),
        AlterTableOperation::RenameColumn {
            old_column_name,
            new_column_name,
        } => AlterSpec::RenameColumn {
            from: ident(old_column_name),
            to: ident(new_column_name),
        },
        AlterTableOperation::AlterColumn { column_name, op } => match op {
            AlterColumnOperation::SetDefault { value } => AlterSpec::AlterColumnDefault {
                column: ident(column_name),
                default: Some(value.to_string()),
            },
            AlterColumnOperation::DropDefault => AlterSpec::AlterColumnDefault {
                column: ident(column_name),
                default: None,
            },
            _ => AlterSpec::Other(operation.to_string()),
        },
        AlterTableOperation::AutoIncrement { value, .. } => {
            AlterSpec::TableOptions(vec![TableOption::AutoIncrement(value.value.to_string())])
        }
        other => AlterSpec::Other(other.to_string()),
    };
    vec![spec]
}

fn create_index(index: &sql::CreateIndex) -> CreateIndex {
    let columns = index_columns(&index.columns);
    let name = match &index.name {
        Some(name) => object_ident(name),
        None => columns.first().cloned().unwrap_or_default(),
    };
    CreateIndex {
        name,
        table: table_name(&index.table_name),
        columns,
        kind: if index.unique {
            ConstraintKind::Unique
        } else {
            ConstraintKind::Index
        },
    }
}

/// Collects every base table a syntax node reads, skipping CTE names.
struct TableCollector {
    ctes: Vec<String>,
    tables: Vec<TableName>,
}

impl TableCollector {
    fn with_ctes(ctes: &[String]) -> Self {
        Self {
            ctes: ctes.to_vec(),
            tables: Vec::new(),
        }
    }

    fn is_cte(&self, table: &TableName) -> bool {
        table.schema.is_none() && self.ctes.iter().any(|cte| cte.eq_ignore_ascii_case(&table.name))
    }
}

impl Visitor for TableCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<()> {
        self.ctes.extend(cte_names(query));
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<()> {
        let table = table_name(relation);
        if !self.is_cte(&table) && !self.tables.contains(&table) {
            self.tables.push(table);
        }
        ControlFlow::Continue(())
    }
}

fn read_tables<V: Visit>(node: &V, ctes: &[String]) -> Vec<TableName> {
    let mut collector = TableCollector::with_ctes(ctes);
    let _ = node.visit(&mut collector);
    collector.tables
}

fn cte_names(query: &Query) -> impl Iterator<Item = String> + '_ {
    query
        .with
        .iter()
        .flat_map(|with| with.cte_tables.iter())
        .map(|cte| ident(&cte.alias.name))
}

/// Column references outside of nested queries.
#[derive(Default)]
struct ColumnCollector {
    depth: usize,
    columns: Vec<String>,
}

impl Visitor for ColumnCollector {
    type Break = ();

    fn pre_visit_query(&mut self, _query: &Query) -> ControlFlow<()> {
        self.depth = self.depth.saturating_add(1);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<()> {
        self.depth = self.depth.saturating_sub(1);
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<()> {
        if self.depth == 0 {
            match expr {
                Expr::Identifier(name) => self.columns.push(ident(name)),
                Expr::CompoundIdentifier(names) => self.columns.extend(names.last().map(ident)),
                _ => {}
            }
        }
        ControlFlow::Continue(())
    }
}

fn condition(expr: &Expr, ctes: &[String]) -> Condition {
    let mut collector = ColumnCollector::default();
    let _ = expr.visit(&mut collector);
    Condition {
        text: expr.to_string(),
        columns: collector.columns,
        tables: read_tables(expr, ctes),
    }
}

/// FROM entries of one query level. Derived tables contribute the tables
/// they read.
fn push_table_refs(factor: &TableFactor, ctes: &[String], refs: &mut Vec<TableRef>) {
    match factor {
        TableFactor::Table { name, alias, .. } => refs.push(TableRef {
            table: table_name(name),
            alias: alias.as_ref().map(|alias| ident(&alias.name)),
        }),
        TableFactor::Derived { subquery, .. } => {
            refs.extend(read_tables(subquery.as_ref(), ctes).into_iter().map(|table| TableRef {
                table,
                alias: None,
            }));
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => refs.extend(table_refs(std::slice::from_ref(table_with_joins.as_ref()), ctes)),
        _ => {}
    }
}

fn table_refs(tables: &[TableWithJoins], ctes: &[String]) -> Vec<TableRef> {
    let mut refs = Vec::new();
    for table in tables {
        push_table_refs(&table.relation, ctes, &mut refs);
        for join in &table.joins {
            push_table_refs(&join.relation, ctes, &mut refs);
        }
    }
    refs
}

fn plain_select(select: &sql::Select, ctes: &[String]) -> Select {
    Select {
        fields: select
            .projection
            .iter()
            .map(|item| SelectField {
                text: item.to_string(),
                wildcard: matches!(
                    item,
                    sql::SelectItem::Wildcard(_) | sql::SelectItem::QualifiedWildcard(..)
                ),
            })
            .collect(),
        from: table_refs(&select.from, ctes),
        where_clause: select
            .selection
            .as_ref()
            .map(|selection| condition(selection, ctes)),
        union: None,
        reads: read_tables(select, ctes),
    }
}

fn append_union(select: &mut Select, next: Select) {
    match &mut select.union {
        Some(tail) => append_union(tail, next),
        None => select.union = Some(Box::new(next)),
    }
}

fn set_expr_select(body: &SetExpr, ctes: &[String]) -> Select {
    match body {
        SetExpr::Select(select) => plain_select(select, ctes),
        SetExpr::Query(query) => query_select(query, ctes),
        SetExpr::SetOperation { left, right, .. } => {
            let mut select = set_expr_select(left, ctes);
            append_union(&mut select, set_expr_select(right, ctes));
            select
        }
        other => Select {
            fields: Vec::new(),
            from: Vec::new(),
            where_clause: None,
            union: None,
            reads: read_tables(other, ctes),
        },
    }
}

fn query_select(query: &Query, outer_ctes: &[String]) -> Select {
    let mut ctes = outer_ctes.to_vec();
    ctes.extend(cte_names(query));

    let mut select = set_expr_select(&query.body, &ctes);
    if let Some(with) = &query.with {
        let mut reads = Vec::new();
        for cte in &with.cte_tables {
            for table in read_tables(cte.query.as_ref(), &ctes) {
                if !reads.contains(&table) {
                    reads.push(table);
                }
            }
        }
        for table in select.reads.drain(..) {
            if !reads.contains(&table) {
                reads.push(table);
            }
        }
        select.reads = reads;
    }
    select
}

fn assignment(source: &sql::Assignment) -> Assignment {
    let column = match &source.target {
        sql::AssignmentTarget::ColumnName(name) => object_ident(name),
        other => other.to_string(),
    };
    Assignment {
        column,
        value: source.value.to_string(),
    }
}

fn insert(source: &sql::Insert, table: &ObjectName) -> Insert {
    let mut columns: Vec<String> = source.columns.iter().map(ident).collect();
    let source_rows = match &source.source {
        Some(query) => match query.body.as_ref() {
            SetExpr::Values(values) if query.with.is_none() => InsertSource::Values(
                values
                    .rows
                    .iter()
                    .map(|row| row.iter().map(ToString::to_string).collect())
                    .collect(),
            ),
            _ => InsertSource::Select(Box::new(query_select(query, &[]))),
        },
        // INSERT ... SET col = value
        None => {
            let assignments: Vec<Assignment> = source.assignments.iter().map(assignment).collect();
            if assignments.is_empty() {
                InsertSource::Values(Vec::new())
            } else {
                columns = assignments.iter().map(|a| a.column.clone()).collect();
                InsertSource::Values(vec![assignments.into_iter().map(|a| a.value).collect()])
            }
        }
    };
    Insert {
        table: table_name(table),
        columns,
        source: source_rows,
        replace: source.replace_into,
        ignore: source.ignore,
    }
}

fn update(source: &sql::Update) -> Update {
    let mut tables = table_refs(std::slice::from_ref(&source.table), &[]);
    if let Some(UpdateTableFromKind::BeforeSet(from) | UpdateTableFromKind::AfterSet(from)) =
        &source.from
    {
        tables.extend(table_refs(from, &[]));
    }
    Update {
        tables,
        assignments: source.assignments.iter().map(assignment).collect(),
        where_clause: source
            .selection
            .as_ref()
            .map(|selection| condition(selection, &[])),
    }
}

fn delete(source: &sql::Delete) -> Delete {
    let named = match &source.from {
        FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => {
            table_refs(tables, &[])
        }
    };
    let (targets, from) = if !source.tables.is_empty() {
        (source.tables.iter().map(table_name).collect(), named)
    } else if let Some(using) = &source.using {
        (
            named.into_iter().map(|r| r.table).collect(),
            table_refs(using, &[]),
        )
    } else {
        (named.iter().map(|r| r.table.clone()).collect(), named)
    };
    Delete {
        targets,
        from,
        where_clause: source
            .selection
            .as_ref()
            .map(|selection| condition(selection, &[])),
    }
}
