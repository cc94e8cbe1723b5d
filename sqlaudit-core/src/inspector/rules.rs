//! Rule catalog and the per-engine check registry.
//!
//! A rule is pure metadata ([`Rule`]); what makes it fire is the check
//! function bound to its name in a [`CheckRegistry`]. Each engine builds its
//! registry once and shares it between sessions.

use super::checks;
use super::context::SchemaContext;
use super::result::AuditResult;
use crate::Result;
use crate::models::{DRIVER_TYPE_MYSQL, DRIVER_TYPE_SQLITE, Rule, RuleLevel};
use crate::parser::StatementNode;
use std::sync::{Arc, LazyLock};

pub const DDL_CHECK_PRIMARY_KEY_EXIST: &str = "ddl_check_primary_key_exist";
pub const DDL_CHECK_PRIMARY_KEY_TYPE: &str = "ddl_check_primary_key_type";
pub const DML_DISABLE_SELECT_ALL_COLUMN: &str = "dml_disable_select_all_column";
pub const DML_CHECK_INVALID_WHERE_CONDITION: &str = "dml_check_invalid_where_condition";
pub const DDL_CHECK_ALTER_TABLE_NEED_MERGE: &str = "ddl_check_alter_table_need_merge";
pub const DDL_CHECK_TABLE_WITHOUT_INNODB_UTF8MB4: &str = "ddl_check_table_without_innodb_utf8mb4";
pub const DDL_DISABLE_INDEX_COLUMN_BLOB: &str = "ddl_disable_index_column_blob";
pub const DDL_CHECK_OBJECT_NAME_LENGTH: &str = "ddl_check_object_name_length";
pub const DDL_CHECK_OBJECT_NAME_USING_KEYWORD: &str = "ddl_check_object_name_using_keyword";
pub const DDL_DISABLE_FK: &str = "ddl_disable_fk";
pub const DDL_CHECK_INDEX_COUNT: &str = "ddl_check_index_count";
pub const DDL_CHECK_COMPOSITE_INDEX_MAX: &str = "ddl_check_composite_index_max";
pub const DDL_CHECK_COLUMN_CHAR_LENGTH: &str = "ddl_check_column_char_length";
pub const DDL_CHECK_TABLE_WITHOUT_IF_NOT_EXISTS: &str = "ddl_check_table_without_if_not_exists";
pub const DDL_DISABLE_DROP_STATEMENT: &str = "ddl_disable_drop_statement";
pub const DDL_CHECK_OBJECT_EXIST: &str = "ddl_check_object_exist";
pub const ALL_CHECK_OBJECT_NOT_EXIST: &str = "all_check_object_not_exist";

const CATEGORY_DDL: &str = "ddl_convention";
const CATEGORY_DML: &str = "dml_convention";
const CATEGORY_NAMING: &str = "naming_convention";
const CATEGORY_INDEX: &str = "index_convention";
const CATEGORY_EXISTENCE: &str = "object_existence";

/// Everything a check may look at for one statement.
pub struct RuleInput<'a> {
    /// Rule as selected by the caller, carrying its configured level and value
    pub rule: &'a Rule,
    pub node: &'a StatementNode,
    pub context: &'a SchemaContext,
}

/// Signature shared by every rule check.
pub type CheckFn = fn(&RuleInput<'_>, &mut AuditResult) -> Result<()>;

/// A rule bound to the function that evaluates it.
#[derive(Debug, Clone)]
pub struct RuleHandler {
    pub rule: Rule,
    /// Whether the check consults the schema context
    pub needs_context: bool,
    pub func: CheckFn,
}

impl RuleHandler {
    fn new(rule: Rule, needs_context: bool, func: CheckFn) -> Self {
        Self {
            rule,
            needs_context,
            func,
        }
    }
}

/// Ordered mapping from rule name to handler.
#[derive(Debug, Clone, Default)]
pub struct CheckRegistry {
    handlers: Vec<RuleHandler>,
}

impl CheckRegistry {
    pub fn new(handlers: Vec<RuleHandler>) -> Self {
        Self { handlers }
    }

    /// Shared registry of the MySQL engine.
    pub fn mysql() -> Arc<Self> {
        static REGISTRY: LazyLock<Arc<CheckRegistry>> =
            LazyLock::new(|| Arc::new(CheckRegistry::new(mysql_handlers())));
        Arc::clone(&REGISTRY)
    }

    /// Shared registry of the SQLite engine.
    pub fn sqlite() -> Arc<Self> {
        static REGISTRY: LazyLock<Arc<CheckRegistry>> =
            LazyLock::new(|| Arc::new(CheckRegistry::new(sqlite_handlers())));
        Arc::clone(&REGISTRY)
    }

    /// Shared registry of a built-in engine type.
    pub fn for_engine(engine_type: &str) -> Option<Arc<Self>> {
        match engine_type {
            DRIVER_TYPE_MYSQL => Some(Self::mysql()),
            DRIVER_TYPE_SQLITE => Some(Self::sqlite()),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&RuleHandler> {
        self.handlers.iter().find(|handler| handler.rule.name == name)
    }

    /// Default rule metadata, in registration order.
    pub fn rules(&self) -> Vec<Rule> {
        self.handlers.iter().map(|handler| handler.rule.clone()).collect()
    }

    /// Whether any of `rules` is bound to a context-dependent check.
    pub fn needs_context(&self, rules: &[Rule]) -> bool {
        rules
            .iter()
            .filter_map(|rule| self.get(&rule.name))
            .any(|handler| handler.needs_context)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

fn mysql_handlers() -> Vec<RuleHandler> {
    use RuleLevel::{Error, Notice};
    vec![
        RuleHandler::new(
            Rule::new(
                DDL_CHECK_PRIMARY_KEY_EXIST,
                "table must have a primary key",
                Error,
                CATEGORY_DDL,
            ),
            false,
            checks::check_primary_key_exist,
        ),
        RuleHandler::new(
            Rule::new(
                DDL_CHECK_PRIMARY_KEY_TYPE,
                "primary key must be an unsigned auto-increment INT or BIGINT column",
                Error,
                CATEGORY_DDL,
            ),
            true,
            checks::check_primary_key_type,
        ),
        RuleHandler::new(
            Rule::new(
                DML_DISABLE_SELECT_ALL_COLUMN,
                "SELECT * is not recommended",
                Notice,
                CATEGORY_DML,
            ),
            false,
            checks::check_select_all_column,
        ),
        RuleHandler::new(
            Rule::new(
                DML_CHECK_INVALID_WHERE_CONDITION,
                "SELECT, UPDATE and DELETE must have a WHERE clause that references a column",
                Error,
                CATEGORY_DML,
            ),
            false,
            checks::check_invalid_where_condition,
        ),
        RuleHandler::new(
            Rule::new(
                DDL_CHECK_ALTER_TABLE_NEED_MERGE,
                "multiple ALTER TABLE statements on one table should be merged",
                Notice,
                CATEGORY_DDL,
            ),
            true,
            checks::check_alter_table_need_merge,
        ),
        RuleHandler::new(
            Rule::new(
                DDL_CHECK_TABLE_WITHOUT_INNODB_UTF8MB4,
                "tables should use the InnoDB engine and the utf8mb4 character set",
                Notice,
                CATEGORY_DDL,
            ),
            false,
            checks::check_table_without_innodb_utf8mb4,
        ),
        RuleHandler::new(
            Rule::new(
                DDL_DISABLE_INDEX_COLUMN_BLOB,
                "BLOB and TEXT columns must not be indexed",
                Error,
                CATEGORY_INDEX,
            ),
            true,
            checks::check_index_column_blob,
        ),
        RuleHandler::new(
            Rule::new(
                DDL_CHECK_OBJECT_NAME_LENGTH,
                "object names must not exceed 64 bytes",
                Error,
                CATEGORY_NAMING,
            ),
            false,
            checks::check_object_name_length,
        ),
        RuleHandler::new(
            Rule::new(
                DDL_CHECK_OBJECT_NAME_USING_KEYWORD,
                "object names must not be reserved keywords",
                Error,
                CATEGORY_NAMING,
            ),
            false,
            checks::check_object_name_using_keyword,
        ),
        RuleHandler::new(
            Rule::new(DDL_DISABLE_FK, "foreign keys are not allowed", Error, CATEGORY_DDL),
            false,
            checks::check_disable_fk,
        ),
        RuleHandler::new(
            Rule::new(
                DDL_CHECK_INDEX_COUNT,
                "a table should not have too many indexes",
                Notice,
                CATEGORY_INDEX,
            )
            .with_value("5"),
            true,
            checks::check_index_count,
        ),
        RuleHandler::new(
            Rule::new(
                DDL_CHECK_COMPOSITE_INDEX_MAX,
                "a composite index should not have too many columns",
                Notice,
                CATEGORY_INDEX,
            )
            .with_value("5"),
            false,
            checks::check_composite_index_max,
        ),
        RuleHandler::new(
            Rule::new(
                DDL_CHECK_COLUMN_CHAR_LENGTH,
                "long CHAR columns should be VARCHAR",
                Notice,
                CATEGORY_DDL,
            )
            .with_value("20"),
            false,
            checks::check_column_char_length,
        ),
        RuleHandler::new(
            Rule::new(
                DDL_CHECK_TABLE_WITHOUT_IF_NOT_EXISTS,
                "CREATE TABLE must use IF NOT EXISTS",
                Error,
                CATEGORY_DDL,
            ),
            false,
            checks::check_table_without_if_not_exists,
        ),
        RuleHandler::new(
            Rule::new(
                DDL_DISABLE_DROP_STATEMENT,
                "DROP TABLE and DROP DATABASE are not allowed",
                Error,
                CATEGORY_DDL,
            ),
            false,
            checks::check_disable_drop_statement,
        ),
        RuleHandler::new(
            Rule::new(
                DDL_CHECK_OBJECT_EXIST,
                "created objects must not already exist",
                Error,
                CATEGORY_EXISTENCE,
            ),
            true,
            checks::check_object_exist,
        ),
        RuleHandler::new(
            Rule::new(
                ALL_CHECK_OBJECT_NOT_EXIST,
                "referenced objects must exist",
                Error,
                CATEGORY_EXISTENCE,
            ),
            true,
            checks::check_object_not_exist,
        ),
    ]
}

/// Rules that mean the same thing on SQLite.
const SQLITE_RULES: &[&str] = &[
    DDL_CHECK_PRIMARY_KEY_EXIST,
    DML_DISABLE_SELECT_ALL_COLUMN,
    DML_CHECK_INVALID_WHERE_CONDITION,
    DDL_CHECK_ALTER_TABLE_NEED_MERGE,
    DDL_CHECK_OBJECT_NAME_LENGTH,
    DDL_DISABLE_FK,
    DDL_CHECK_INDEX_COUNT,
    DDL_CHECK_COMPOSITE_INDEX_MAX,
    DDL_CHECK_TABLE_WITHOUT_IF_NOT_EXISTS,
    DDL_DISABLE_DROP_STATEMENT,
    DDL_CHECK_OBJECT_EXIST,
    ALL_CHECK_OBJECT_NOT_EXIST,
];

fn sqlite_handlers() -> Vec<RuleHandler> {
    mysql_handlers()
        .into_iter()
        .filter(|handler| SQLITE_RULES.contains(&handler.rule.name.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_catalog_is_complete_and_unique() {
        let rules = CheckRegistry::mysql().rules();
        assert_eq!(rules.len(), 17);

        let mut names: Vec<&str> = rules.iter().map(|rule| rule.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 17);
    }

    #[test]
    fn test_sqlite_catalog_is_subset() {
        let mysql = CheckRegistry::mysql();
        let sqlite = CheckRegistry::sqlite();
        assert_eq!(sqlite.len(), SQLITE_RULES.len());
        for rule in sqlite.rules() {
            assert_eq!(mysql.get(&rule.name).map(|h| &h.rule), Some(&rule));
        }
        assert!(sqlite.get(DDL_CHECK_TABLE_WITHOUT_INNODB_UTF8MB4).is_none());
    }

    #[test]
    fn test_default_levels_and_values() {
        let registry = CheckRegistry::mysql();
        let rule = |name: &str| registry.get(name).map(|h| h.rule.clone());

        assert_eq!(
            rule(DML_DISABLE_SELECT_ALL_COLUMN).map(|r| r.level),
            Some(RuleLevel::Notice)
        );
        assert_eq!(
            rule(DDL_DISABLE_DROP_STATEMENT).map(|r| r.level),
            Some(RuleLevel::Error)
        );
        assert_eq!(
            rule(DDL_CHECK_INDEX_COUNT).map(|r| r.threshold(0)),
            Some(5)
        );
        assert_eq!(
            rule(DDL_CHECK_COLUMN_CHAR_LENGTH).map(|r| r.threshold(0)),
            Some(20)
        );
    }

    #[test]
    fn test_needs_context() {
        let registry = CheckRegistry::mysql();
        let pick = |name: &str| -> Vec<Rule> {
            registry
                .get(name)
                .map(|h| h.rule.clone())
                .into_iter()
                .collect()
        };

        assert!(!registry.needs_context(&pick(DDL_DISABLE_DROP_STATEMENT)));
        assert!(registry.needs_context(&pick(ALL_CHECK_OBJECT_NOT_EXIST)));
        assert!(!registry.needs_context(&[Rule::new("unknown", "", RuleLevel::Error, "")]));
    }

    #[test]
    fn test_for_engine() {
        assert_eq!(
            CheckRegistry::for_engine(DRIVER_TYPE_SQLITE).map(|r| r.len()),
            Some(SQLITE_RULES.len())
        );
        assert!(CheckRegistry::for_engine(DRIVER_TYPE_MYSQL).is_some());
        assert!(CheckRegistry::for_engine("oracle").is_none());
    }
}
