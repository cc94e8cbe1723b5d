//! Typed statement model produced by the parser.
//!
//! Only the parts of each statement that audit rules, schema tracking and
//! rollback generation look at are modeled; everything else is kept as
//! rendered SQL text. Every node renders back to MySQL syntax through
//! `Display`, with identifiers quoted in backticks.

use crate::models::StatementKind;
use std::fmt;

/// Quotes an identifier with backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quotes a string literal with single quotes.
pub fn quote_str(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn join_idents(names: &[String]) -> String {
    names
        .iter()
        .map(|name| quote_ident(name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Possibly schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => f.write_str(&quote_ident(&self.name)),
        }
    }
}

/// Column data type, e.g. `BIGINT(20) UNSIGNED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataType {
    /// Upper-cased type name
    pub name: String,
    /// Length, precision or enum members, as written
    pub args: Vec<String>,
    pub unsigned: bool,
}

impl DataType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            args: Vec::new(),
            unsigned: false,
        }
    }

    /// BLOB and TEXT family types, which cannot be fully indexed.
    pub fn is_blob(&self) -> bool {
        matches!(
            self.name.as_str(),
            "BLOB"
                | "TINYBLOB"
                | "MEDIUMBLOB"
                | "LONGBLOB"
                | "TEXT"
                | "TINYTEXT"
                | "MEDIUMTEXT"
                | "LONGTEXT"
        )
    }

    /// Fixed-width character types.
    pub fn is_char(&self) -> bool {
        matches!(self.name.as_str(), "CHAR" | "CHARACTER" | "NCHAR")
    }

    /// `INT` and `BIGINT`, the types accepted for auto-increment keys.
    pub fn is_key_integer(&self) -> bool {
        matches!(self.name.as_str(), "INT" | "INTEGER" | "BIGINT")
    }

    /// Declared length, when the first argument is numeric.
    pub fn length(&self) -> Option<u64> {
        self.args.first()?.trim().parse().ok()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.args.is_empty() {
            write!(f, "({})", self.args.join(","))?;
        }
        if self.unsigned {
            f.write_str(" UNSIGNED")?;
        }
        Ok(())
    }
}

/// Column attribute following the data type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnOption {
    NotNull,
    Null,
    Default(String),
    AutoIncrement,
    PrimaryKey,
    UniqueKey,
    Comment(String),
    Collate(String),
    Charset(String),
    OnUpdate(String),
    Other(String),
}

impl fmt::Display for ColumnOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnOption::NotNull => f.write_str("NOT NULL"),
            ColumnOption::Null => f.write_str("NULL"),
            ColumnOption::Default(expr) => write!(f, "DEFAULT {}", expr),
            ColumnOption::AutoIncrement => f.write_str("AUTO_INCREMENT"),
            ColumnOption::PrimaryKey => f.write_str("PRIMARY KEY"),
            ColumnOption::UniqueKey => f.write_str("UNIQUE KEY"),
            ColumnOption::Comment(text) => write!(f, "COMMENT {}", quote_str(text)),
            ColumnOption::Collate(name) => write!(f, "COLLATE {}", name),
            ColumnOption::Charset(name) => write!(f, "CHARACTER SET {}", name),
            ColumnOption::OnUpdate(expr) => write!(f, "ON UPDATE {}", expr),
            ColumnOption::Other(text) => f.write_str(text),
        }
    }
}

/// Column definition inside CREATE TABLE or ALTER TABLE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub options: Vec<ColumnOption>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            options: Vec::new(),
        }
    }

    pub fn is_primary_key(&self) -> bool {
        self.options.contains(&ColumnOption::PrimaryKey)
    }

    pub fn is_auto_increment(&self) -> bool {
        self.options.contains(&ColumnOption::AutoIncrement)
    }

    pub fn is_unique(&self) -> bool {
        self.options.contains(&ColumnOption::UniqueKey)
    }

    /// Current DEFAULT expression, if any.
    pub fn default_value(&self) -> Option<&str> {
        self.options.iter().find_map(|option| match option {
            ColumnOption::Default(expr) => Some(expr.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", quote_ident(&self.name), self.data_type)?;
        for option in &self.options {
            write!(f, " {}", option)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    Index,
    FullText,
    Spatial,
    ForeignKey,
    Check,
}

/// `REFERENCES` target of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignReference {
    pub table: TableName,
    pub columns: Vec<String>,
    /// Trailing `ON DELETE ...`/`ON UPDATE ...` clauses as written
    pub actions: String,
}

/// Table-level key, index or constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub name: Option<String>,
    pub kind: ConstraintKind,
    pub columns: Vec<String>,
    pub reference: Option<ForeignReference>,
    /// CHECK expression
    pub expr: Option<String>,
}

impl Constraint {
    pub fn new(kind: ConstraintKind, name: Option<String>, columns: Vec<String>) -> Self {
        Self {
            name,
            kind,
            columns,
            reference: None,
            expr: None,
        }
    }

    /// True for everything MySQL materializes as a secondary index.
    pub fn is_index(&self) -> bool {
        matches!(
            self.kind,
            ConstraintKind::Unique
                | ConstraintKind::Index
                | ConstraintKind::FullText
                | ConstraintKind::Spatial
        )
    }

    /// Name MySQL gives the index: the explicit one, else the first column.
    pub fn index_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or_else(|| self.columns.first().map(String::as_str))
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns = join_idents(&self.columns);
        let keyword = match self.kind {
            ConstraintKind::Unique => "UNIQUE KEY",
            ConstraintKind::Index => "KEY",
            ConstraintKind::FullText => "FULLTEXT KEY",
            ConstraintKind::Spatial => "SPATIAL KEY",
            ConstraintKind::PrimaryKey | ConstraintKind::ForeignKey | ConstraintKind::Check => {
                if let Some(name) = &self.name {
                    write!(f, "CONSTRAINT {} ", quote_ident(name))?;
                }
                ""
            }
        };
        match self.kind {
            ConstraintKind::PrimaryKey => write!(f, "PRIMARY KEY ({})", columns),
            ConstraintKind::Check => {
                write!(f, "CHECK ({})", self.expr.as_deref().unwrap_or_default())
            }
            ConstraintKind::ForeignKey => {
                write!(f, "FOREIGN KEY ({})", columns)?;
                if let Some(reference) = &self.reference {
                    write!(
                        f,
                        " REFERENCES {} ({})",
                        reference.table,
                        join_idents(&reference.columns)
                    )?;
                    if !reference.actions.is_empty() {
                        write!(f, " {}", reference.actions)?;
                    }
                }
                Ok(())
            }
            ConstraintKind::Unique
            | ConstraintKind::Index
            | ConstraintKind::FullText
            | ConstraintKind::Spatial => match &self.name {
                Some(name) => write!(f, "{} {} ({})", keyword, quote_ident(name), columns),
                None => write!(f, "{} ({})", keyword, columns),
            },
        }
    }
}

/// Table option of CREATE TABLE / ALTER TABLE / CREATE DATABASE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOption {
    Engine(String),
    Charset(String),
    Collate(String),
    Comment(String),
    AutoIncrement(String),
    Other { name: String, value: String },
}

impl TableOption {
    /// Options of the same variant (or same generic name) replace each other.
    pub fn same_slot(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Other { name: a, .. }, Self::Other { name: b, .. }) => a.eq_ignore_ascii_case(b),
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl fmt::Display for TableOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableOption::Engine(value) => write!(f, "ENGINE={}", value),
            TableOption::Charset(value) => write!(f, "DEFAULT CHARSET={}", value),
            TableOption::Collate(value) => write!(f, "COLLATE={}", value),
            TableOption::Comment(value) => write!(f, "COMMENT={}", quote_str(value)),
            TableOption::AutoIncrement(value) => write!(f, "AUTO_INCREMENT={}", value),
            TableOption::Other { name, value } => write!(f, "{}={}", name, value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTable {
    pub table: TableName,
    pub if_not_exists: bool,
    pub temporary: bool,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<Constraint>,
    pub options: Vec<TableOption>,
    /// `CREATE TABLE ... LIKE other`
    pub like: Option<TableName>,
}

impl CreateTable {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            if_not_exists: false,
            temporary: false,
            columns: Vec::new(),
            constraints: Vec::new(),
            options: Vec::new(),
            like: None,
        }
    }

    /// Column lookup; MySQL column names are case-insensitive.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut ColumnDef> {
        self.columns
            .iter_mut()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }

    /// Primary key columns, declared either inline or as a constraint.
    pub fn primary_key_columns(&self) -> Vec<&str> {
        if let Some(pk) = self
            .constraints
            .iter()
            .find(|c| c.kind == ConstraintKind::PrimaryKey)
        {
            return pk.columns.iter().map(String::as_str).collect();
        }
        self.columns
            .iter()
            .filter(|column| column.is_primary_key())
            .map(|column| column.name.as_str())
            .collect()
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key_columns().is_empty()
    }

    /// Secondary indexes, including inline `UNIQUE` columns.
    pub fn index_count(&self) -> usize {
        let table_level = self.constraints.iter().filter(|c| c.is_index()).count();
        let inline = self.columns.iter().filter(|c| c.is_unique()).count();
        table_level.saturating_add(inline)
    }

    pub fn index(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| {
            (c.is_index() || c.kind == ConstraintKind::ForeignKey)
                && c.index_name().is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
    }

    pub fn engine(&self) -> Option<&str> {
        self.options.iter().find_map(|option| match option {
            TableOption::Engine(value) => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn charset(&self) -> Option<&str> {
        self.options.iter().find_map(|option| match option {
            TableOption::Charset(value) => Some(value.as_str()),
            _ => None,
        })
    }

    /// Sets an option, replacing any earlier value for the same slot.
    pub fn set_option(&mut self, option: TableOption) {
        match self.options.iter_mut().find(|o| o.same_slot(&option)) {
            Some(existing) => *existing = option,
            None => self.options.push(option),
        }
    }
}

impl fmt::Display for CreateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CREATE ")?;
        if self.temporary {
            f.write_str("TEMPORARY ")?;
        }
        f.write_str("TABLE ")?;
        if self.if_not_exists {
            f.write_str("IF NOT EXISTS ")?;
        }
        write!(f, "{}", self.table)?;
        if let Some(like) = &self.like {
            return write!(f, " LIKE {}", like);
        }
        let body: Vec<String> = self
            .columns
            .iter()
            .map(ToString::to_string)
            .chain(self.constraints.iter().map(ToString::to_string))
            .collect();
        write!(f, " (\n  {}\n)", body.join(",\n  "))?;
        for option in &self.options {
            write!(f, " {}", option)?;
        }
        Ok(())
    }
}

/// One comma-separated action of ALTER TABLE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlterSpec {
    AddColumns(Vec<ColumnDef>),
    AddConstraint(Constraint),
    ChangeColumn { old_name: String, column: ColumnDef },
    ModifyColumn(ColumnDef),
    DropColumn(String),
    DropPrimaryKey,
    DropIndex(String),
    DropForeignKey(String),
    RenameTable(TableName),
    RenameColumn { from: String, to: String },
    AlterColumnDefault { column: String, default: Option<String> },
    TableOptions(Vec<TableOption>),
    Other(String),
}

impl fmt::Display for AlterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlterSpec::AddColumns(columns) => match columns.as_slice() {
                [column] => write!(f, "ADD COLUMN {}", column),
                _ => {
                    let defs: Vec<String> = columns.iter().map(ToString::to_string).collect();
                    write!(f, "ADD COLUMN ({})", defs.join(", "))
                }
            },
            AlterSpec::AddConstraint(constraint) => write!(f, "ADD {}", constraint),
            AlterSpec::ChangeColumn { old_name, column } => {
                write!(f, "CHANGE COLUMN {} {}", quote_ident(old_name), column)
            }
            AlterSpec::ModifyColumn(column) => write!(f, "MODIFY COLUMN {}", column),
            AlterSpec::DropColumn(name) => write!(f, "DROP COLUMN {}", quote_ident(name)),
            AlterSpec::DropPrimaryKey => f.write_str("DROP PRIMARY KEY"),
            AlterSpec::DropIndex(name) => write!(f, "DROP INDEX {}", quote_ident(name)),
            AlterSpec::DropForeignKey(name) => write!(f, "DROP FOREIGN KEY {}", quote_ident(name)),
            AlterSpec::RenameTable(table) => write!(f, "RENAME TO {}", table),
            AlterSpec::RenameColumn { from, to } => write!(
                f,
                "RENAME COLUMN {} TO {}",
                quote_ident(from),
                quote_ident(to)
            ),
            AlterSpec::AlterColumnDefault { column, default } => match default {
                Some(expr) => write!(
                    f,
                    "ALTER COLUMN {} SET DEFAULT {}",
                    quote_ident(column),
                    expr
                ),
                None => write!(f, "ALTER COLUMN {} DROP DEFAULT", quote_ident(column)),
            },
            AlterSpec::TableOptions(options) => {
                let rendered: Vec<String> = options.iter().map(ToString::to_string).collect();
                f.write_str(&rendered.join(" "))
            }
            AlterSpec::Other(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlterTable {
    pub table: TableName,
    pub specs: Vec<AlterSpec>,
}

impl fmt::Display for AlterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let specs: Vec<String> = self.specs.iter().map(ToString::to_string).collect();
        write!(f, "ALTER TABLE {} {}", self.table, specs.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDatabase {
    pub name: String,
    pub if_not_exists: bool,
    pub options: Vec<TableOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropDatabase {
    pub name: String,
    pub if_exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTable {
    pub tables: Vec<TableName>,
    pub if_exists: bool,
    pub temporary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncateTable {
    pub table: TableName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIndex {
    pub name: String,
    pub table: TableName,
    pub columns: Vec<String>,
    /// `Index`, `Unique`, `FullText` or `Spatial`
    pub kind: ConstraintKind,
}

impl CreateIndex {
    /// The equivalent table-level index definition.
    pub fn as_constraint(&self) -> Constraint {
        Constraint::new(self.kind, Some(self.name.clone()), self.columns.clone())
    }
}

impl fmt::Display for CreateIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            ConstraintKind::Unique => "UNIQUE ",
            ConstraintKind::FullText => "FULLTEXT ",
            ConstraintKind::Spatial => "SPATIAL ",
            _ => "",
        };
        write!(
            f,
            "CREATE {}INDEX {} ON {} ({})",
            prefix,
            quote_ident(&self.name),
            self.table,
            join_idents(&self.columns)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropIndex {
    pub name: String,
    pub table: Option<TableName>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Use {
    pub schema: String,
}

/// Table reference in FROM/UPDATE/DELETE clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub table: TableName,
    pub alias: Option<String>,
}

/// WHERE clause text plus the column names it mentions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub text: String,
    /// Columns referenced by the condition itself, not by its subqueries
    pub columns: Vec<String>,
    /// Tables read by subqueries of the condition
    pub tables: Vec<TableName>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectField {
    pub text: String,
    /// `*` or `tbl.*`
    pub wildcard: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    pub fields: Vec<SelectField>,
    /// FROM entries of this branch, CTE references included
    pub from: Vec<TableRef>,
    pub where_clause: Option<Condition>,
    pub union: Option<Box<Select>>,
    /// Base tables this branch reads anywhere: joins, derived tables,
    /// subqueries and CTE bodies. CTE names are never listed.
    pub reads: Vec<TableName>,
}

impl Select {
    /// Whether any branch of the query projects `*`.
    pub fn has_wildcard(&self) -> bool {
        self.fields.iter().any(|field| field.wildcard)
            || self.union.as_ref().is_some_and(|next| next.has_wildcard())
    }

    /// Base tables read by every branch of the query.
    pub fn tables(&self) -> Vec<&TableName> {
        let mut tables: Vec<&TableName> = self.reads.iter().collect();
        if let Some(next) = &self.union {
            tables.extend(next.tables());
        }
        tables
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertSource {
    /// Literal rows, each value rendered as written
    Values(Vec<Vec<String>>),
    Select(Box<Select>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insert {
    pub table: TableName,
    pub columns: Vec<String>,
    pub source: InsertSource,
    pub replace: bool,
    pub ignore: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub column: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub tables: Vec<TableRef>,
    pub assignments: Vec<Assignment>,
    pub where_clause: Option<Condition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delete {
    /// Tables rows are deleted from
    pub targets: Vec<TableName>,
    /// Tables named in FROM/USING
    pub from: Vec<TableRef>,
    pub where_clause: Option<Condition>,
}

/// Statement the engine recognizes but does not inspect further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unhandled {
    pub kind: StatementKind,
    /// Leading keywords, e.g. `CREATE VIEW`
    pub verb: String,
}

/// A parsed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    CreateDatabase(CreateDatabase),
    DropDatabase(DropDatabase),
    CreateTable(CreateTable),
    AlterTable(AlterTable),
    DropTable(DropTable),
    TruncateTable(TruncateTable),
    CreateIndex(CreateIndex),
    DropIndex(DropIndex),
    Use(Use),
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Unhandled(Unhandled),
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::CreateDatabase(_)
            | Statement::DropDatabase(_)
            | Statement::CreateTable(_)
            | Statement::AlterTable(_)
            | Statement::DropTable(_)
            | Statement::TruncateTable(_)
            | Statement::CreateIndex(_)
            | Statement::DropIndex(_) => StatementKind::Ddl,
            Statement::Select(_)
            | Statement::Insert(_)
            | Statement::Update(_)
            | Statement::Delete(_) => StatementKind::Dml,
            Statement::Use(_) => StatementKind::Other,
            Statement::Unhandled(unhandled) => unhandled.kind,
        }
    }
}
