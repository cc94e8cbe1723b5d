//! Audit pipeline tests against an in-memory schema source.
//!
//! These exercise statement classification, every built-in rule check and
//! the way a session's schema context carries effects from one statement to
//! the next, without a live database.

use async_trait::async_trait;
use sqlaudit_core::inspector::rules::*;
use sqlaudit_core::{
    AuditStatus, CheckRegistry, Inspector, Result, Rule, RuleLevel, SchemaSource, SqlAuditError,
    SqlDialect, StatementKind,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Live engine stand-in: schema name to `(table, CREATE TABLE text)` pairs.
#[derive(Default)]
struct FakeSource {
    tables: BTreeMap<String, Vec<(String, String)>>,
    unavailable: bool,
}

impl FakeSource {
    fn with_schema(mut self, schema: &str) -> Self {
        self.tables.entry(schema.to_string()).or_default();
        self
    }

    fn with_table(mut self, schema: &str, table: &str, sql: &str) -> Self {
        self.tables
            .entry(schema.to_string())
            .or_default()
            .push((table.to_string(), sql.to_string()));
        self
    }

    fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl SchemaSource for FakeSource {
    async fn schemas(&self) -> Result<Vec<String>> {
        if self.unavailable {
            return Err(SqlAuditError::timeout(
                "SHOW DATABASES",
                Duration::from_secs(1),
            ));
        }
        Ok(self.tables.keys().cloned().collect())
    }

    async fn tables(&self, schema: &str) -> Result<Vec<String>> {
        Ok(self
            .tables
            .get(schema)
            .map(|tables| tables.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default())
    }

    async fn create_table_sql(&self, schema: &str, table: &str) -> Result<Option<String>> {
        Ok(self.tables.get(schema).and_then(|tables| {
            tables
                .iter()
                .find(|(name, _)| name == table)
                .map(|(_, sql)| sql.clone())
        }))
    }
}

const T1: &str = "CREATE TABLE t1 (\
    id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT, \
    name VARCHAR(32) NOT NULL, \
    body TEXT, \
    PRIMARY KEY (id)\
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

fn db1() -> FakeSource {
    FakeSource::default().with_table("db1", "t1", T1)
}

fn inspector(source: FakeSource) -> Inspector {
    Inspector::new(
        Arc::new(source),
        CheckRegistry::mysql(),
        SqlDialect::MySql,
        Some("db1".to_string()),
    )
}

fn rules(names: &[&str]) -> Vec<Rule> {
    let catalog = CheckRegistry::mysql().rules();
    names
        .iter()
        .map(|name| {
            catalog
                .iter()
                .find(|rule| rule.name == *name)
                .cloned()
                .unwrap_or_else(|| panic!("rule {name} is not in the catalog"))
        })
        .collect()
}

fn messages(report: &sqlaudit_core::StatementReport) -> Vec<&str> {
    report
        .findings
        .iter()
        .map(|finding| finding.message.as_str())
        .collect()
}

#[tokio::test]
async fn test_ddl_then_dml_is_a_conflict() {
    let mut inspector = inspector(db1());
    let rules = rules(&[DML_DISABLE_SELECT_ALL_COLUMN]);

    inspector
        .audit(&rules, "CREATE TABLE t2 (id INT)")
        .await
        .unwrap();
    let err = inspector
        .audit(&rules, "SELECT * FROM t1")
        .await
        .unwrap_err();
    match err {
        SqlAuditError::StatementConflict { locked, current } => {
            assert_eq!(locked, "DDL");
            assert_eq!(current, "DML");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_use_does_not_lock_the_batch_kind() {
    let mut inspector = inspector(db1().with_schema("db2"));
    let rules = rules(&[DML_DISABLE_SELECT_ALL_COLUMN]);

    inspector.audit(&rules, "USE db2").await.unwrap();
    let report = inspector.audit(&rules, "SELECT * FROM t1").await.unwrap();
    assert_eq!(report.kind, StatementKind::Dml);
    assert_eq!(inspector.context().current_schema(), Some("db2"));
}

#[tokio::test]
async fn test_alter_sees_table_created_earlier_in_batch() {
    let mut inspector = inspector(FakeSource::default().with_schema("db1"));
    let rules = rules(&[DDL_CHECK_PRIMARY_KEY_TYPE, DDL_DISABLE_INDEX_COLUMN_BLOB]);

    let statements = [
        "CREATE TABLE t1 (id INT)",
        "ALTER TABLE t1 ADD COLUMN id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY",
        "CREATE INDEX idx1 ON t1 (id)",
    ];
    for sql in statements {
        let report = inspector.audit(&rules, sql).await.unwrap();
        assert_eq!(report.level, RuleLevel::Normal, "{sql}: {}", report.message);
        assert!(report.findings.is_empty());
    }

    let definition = inspector
        .context()
        .table_definition("db1", "t1")
        .unwrap()
        .unwrap();
    let id = definition.column("id").unwrap();
    assert_eq!(id.data_type.name, "BIGINT");
    assert!(id.data_type.unsigned);
    assert_eq!(definition.index_count(), 1);
}

#[tokio::test]
async fn test_primary_key_findings() {
    let mut inspector = inspector(db1());
    let rules = rules(&[DDL_CHECK_PRIMARY_KEY_EXIST, DDL_CHECK_PRIMARY_KEY_TYPE]);

    let valid = inspector
        .audit(
            &rules,
            "CREATE TABLE t2 (id INT(10) UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY)",
        )
        .await
        .unwrap();
    assert!(valid.findings.is_empty());

    let missing = inspector
        .audit(&rules, "CREATE TABLE t3 (id INT)")
        .await
        .unwrap();
    assert_eq!(missing.level, RuleLevel::Error);
    assert_eq!(missing.message, "[error]primary key is required");

    let signed = inspector
        .audit(&rules, "CREATE TABLE t4 (id INT NOT NULL PRIMARY KEY)")
        .await
        .unwrap();
    assert_eq!(
        messages(&signed),
        ["primary key should be a single unsigned auto-increment INT or BIGINT column"]
    );

    let composite = inspector
        .audit(
            &rules,
            "CREATE TABLE t5 (a BIGINT UNSIGNED AUTO_INCREMENT, b INT, PRIMARY KEY (a, b))",
        )
        .await
        .unwrap();
    assert_eq!(composite.findings.len(), 1);
}

#[tokio::test]
async fn test_object_name_rules() {
    let mut inspector = inspector(db1());
    let rules = rules(&[
        DDL_CHECK_OBJECT_NAME_LENGTH,
        DDL_CHECK_OBJECT_NAME_USING_KEYWORD,
    ]);
    let long_name = "a".repeat(65);

    let report = inspector
        .audit(&rules, &format!("CREATE TABLE {long_name} (id INT)"))
        .await
        .unwrap();
    assert_eq!(
        messages(&report),
        [format!("object names must not exceed 64 bytes: {long_name}")]
    );

    let report = inspector
        .audit(&rules, "CREATE TABLE `select` (id INT)")
        .await
        .unwrap();
    assert_eq!(
        messages(&report),
        ["object names must not be reserved keywords: select"]
    );

    let report = inspector
        .audit(
            &rules,
            &format!("CREATE TABLE {long_name}_2 (`order` INT)"),
        )
        .await
        .unwrap();
    assert_eq!(report.findings.len(), 2);
    assert_eq!(report.level, RuleLevel::Error);

    let exact = "b".repeat(64);
    let report = inspector
        .audit(&rules, &format!("CREATE TABLE {exact} (id INT)"))
        .await
        .unwrap();
    assert!(report.findings.is_empty());
}

#[tokio::test]
async fn test_drop_statements_are_always_flagged() {
    let mut inspector = inspector(db1());
    let rules = rules(&[DDL_DISABLE_DROP_STATEMENT]);

    for sql in ["DROP TABLE t1", "DROP TABLE IF EXISTS t9", "DROP DATABASE db1"] {
        let report = inspector.audit(&rules, sql).await.unwrap();
        assert_eq!(
            messages(&report),
            ["DROP TABLE and DROP DATABASE are not allowed"],
            "{sql}"
        );
    }
}

#[tokio::test]
async fn test_dml_rules() {
    let mut inspector = inspector(db1());
    let rules = rules(&[
        DML_DISABLE_SELECT_ALL_COLUMN,
        DML_CHECK_INVALID_WHERE_CONDITION,
    ]);

    let report = inspector
        .audit(&rules, "SELECT * FROM t1 WHERE id = 1")
        .await
        .unwrap();
    assert_eq!(messages(&report), ["avoid SELECT *, list the columns you need"]);
    assert_eq!(report.level, RuleLevel::Notice);

    let report = inspector
        .audit(&rules, "UPDATE t1 SET name = 'x'")
        .await
        .unwrap();
    assert_eq!(
        messages(&report),
        ["WHERE clause is missing or does not reference any column"]
    );

    let report = inspector
        .audit(&rules, "DELETE FROM t1 WHERE 1 = 1")
        .await
        .unwrap();
    assert_eq!(report.findings.len(), 1);

    let report = inspector
        .audit(&rules, "SELECT id, name FROM t1 WHERE id = 1")
        .await
        .unwrap();
    assert!(report.findings.is_empty());
}

#[tokio::test]
async fn test_where_condition_columns_inside_subqueries_do_not_count() {
    let mut inspector = inspector(db1());
    let rules = rules(&[DML_CHECK_INVALID_WHERE_CONDITION]);

    for sql in [
        "DELETE FROM t1 WHERE EXISTS (SELECT 1 FROM t1)",
        "UPDATE t1 SET name = 'x' WHERE EXISTS (SELECT id FROM t1 WHERE id = 1)",
        "SELECT id FROM t1 WHERE (SELECT COUNT(*) FROM t1 WHERE id > 0) > 1",
    ] {
        let report = inspector.audit(&rules, sql).await.unwrap();
        assert_eq!(
            messages(&report),
            ["WHERE clause is missing or does not reference any column"],
            "{sql}"
        );
    }

    let report = inspector
        .audit(&rules, "DELETE FROM t1 WHERE id IN (SELECT id FROM t1 WHERE name = 'x')")
        .await
        .unwrap();
    assert!(report.findings.is_empty());
}

#[tokio::test]
async fn test_alter_table_need_merge() {
    let mut inspector = inspector(db1());
    let rules = rules(&[DDL_CHECK_ALTER_TABLE_NEED_MERGE]);

    let first = inspector
        .audit(&rules, "ALTER TABLE t1 ADD COLUMN a INT")
        .await
        .unwrap();
    assert!(first.findings.is_empty());

    let second = inspector
        .audit(&rules, "ALTER TABLE db1.t1 ADD COLUMN b INT")
        .await
        .unwrap();
    assert_eq!(
        messages(&second),
        ["table `db1`.`t1` is altered more than once, merge the ALTER TABLE statements"]
    );
}

#[tokio::test]
async fn test_table_without_innodb_utf8mb4() {
    let mut inspector = inspector(db1());
    let rules = rules(&[DDL_CHECK_TABLE_WITHOUT_INNODB_UTF8MB4]);

    let report = inspector
        .audit(&rules, "CREATE TABLE t2 (id INT) ENGINE=MyISAM DEFAULT CHARSET=utf8mb4")
        .await
        .unwrap();
    assert_eq!(
        messages(&report),
        ["table should use ENGINE=InnoDB and CHARSET=utf8mb4"]
    );

    let report = inspector
        .audit(&rules, "CREATE TABLE t3 (id INT)")
        .await
        .unwrap();
    assert_eq!(report.findings.len(), 1);

    let report = inspector
        .audit(&rules, "CREATE TABLE t4 (id INT) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4")
        .await
        .unwrap();
    assert!(report.findings.is_empty());
}

#[tokio::test]
async fn test_blob_index_columns() {
    let mut inspector = inspector(db1());
    let rules = rules(&[DDL_DISABLE_INDEX_COLUMN_BLOB]);

    let report = inspector
        .audit(
            &rules,
            "CREATE TABLE t2 (id INT, doc BLOB, note TEXT, KEY idx_doc (doc), KEY idx_note (note, id))",
        )
        .await
        .unwrap();
    assert_eq!(
        messages(&report),
        ["BLOB/TEXT columns must not be indexed: doc, note"]
    );

    let report = inspector
        .audit(&rules, "ALTER TABLE t1 ADD INDEX idx_body (body)")
        .await
        .unwrap();
    assert_eq!(
        messages(&report),
        ["BLOB/TEXT columns must not be indexed: body"]
    );

    let report = inspector
        .audit(&rules, "CREATE INDEX idx_body2 ON t1 (body)")
        .await
        .unwrap();
    assert_eq!(report.findings.len(), 1);

    let report = inspector
        .audit(&rules, "CREATE INDEX idx_name ON t1 (name)")
        .await
        .unwrap();
    assert!(report.findings.is_empty());
}

#[tokio::test]
async fn test_foreign_keys_are_flagged() {
    let mut inspector = inspector(db1());
    let rules = rules(&[DDL_DISABLE_FK]);

    let report = inspector
        .audit(
            &rules,
            "CREATE TABLE orders (id INT PRIMARY KEY, t1_id BIGINT, \
             CONSTRAINT fk_t1 FOREIGN KEY (t1_id) REFERENCES t1 (id))",
        )
        .await
        .unwrap();
    assert_eq!(messages(&report), ["foreign keys are not allowed"]);

    let report = inspector
        .audit(
            &rules,
            "ALTER TABLE orders ADD CONSTRAINT fk_t1_again FOREIGN KEY (t1_id) REFERENCES t1 (id)",
        )
        .await
        .unwrap();
    assert_eq!(report.findings.len(), 1);
}

#[tokio::test]
async fn test_index_count_threshold() {
    let mut inspector = inspector(db1());
    let rules = vec![
        CheckRegistry::mysql()
            .get(DDL_CHECK_INDEX_COUNT)
            .unwrap()
            .rule
            .clone()
            .with_value("2"),
    ];

    let report = inspector
        .audit(
            &rules,
            "CREATE TABLE t2 (id INT, a INT, b INT, c INT UNIQUE, KEY idx_a (a), KEY idx_b (b))",
        )
        .await
        .unwrap();
    assert_eq!(
        messages(&report),
        ["a table should have at most 2 indexes, found 3"]
    );

    let report = inspector
        .audit(&rules, "CREATE TABLE t3 (id INT, a INT, KEY idx_a (a))")
        .await
        .unwrap();
    assert!(report.findings.is_empty());

    inspector
        .audit(&rules, "CREATE INDEX idx_id ON t3 (id)")
        .await
        .unwrap();
    let report = inspector
        .audit(&rules, "ALTER TABLE t3 ADD UNIQUE KEY uk_a (a)")
        .await
        .unwrap();
    assert_eq!(report.findings.len(), 1);
}

#[tokio::test]
async fn test_composite_index_threshold() {
    let mut inspector = inspector(db1());
    let rules = vec![
        CheckRegistry::mysql()
            .get(DDL_CHECK_COMPOSITE_INDEX_MAX)
            .unwrap()
            .rule
            .clone()
            .with_value("2"),
    ];

    let report = inspector
        .audit(&rules, "CREATE INDEX idx_wide ON t1 (id, name, body)")
        .await
        .unwrap();
    assert_eq!(
        messages(&report),
        ["a composite index should have at most 2 columns"]
    );

    let report = inspector
        .audit(&rules, "CREATE INDEX idx_pair ON t1 (id, name)")
        .await
        .unwrap();
    assert!(report.findings.is_empty());
}

#[tokio::test]
async fn test_char_length_and_if_not_exists() {
    let mut inspector = inspector(db1());
    let rules = rules(&[
        DDL_CHECK_COLUMN_CHAR_LENGTH,
        DDL_CHECK_TABLE_WITHOUT_IF_NOT_EXISTS,
    ]);

    let report = inspector
        .audit(&rules, "CREATE TABLE t2 (code CHAR(30))")
        .await
        .unwrap();
    assert_eq!(
        messages(&report),
        [
            "CHAR column `code` is longer than 20, use VARCHAR",
            "CREATE TABLE should use IF NOT EXISTS",
        ]
    );

    let report = inspector
        .audit(&rules, "CREATE TABLE IF NOT EXISTS t3 (code CHAR(20))")
        .await
        .unwrap();
    assert!(report.findings.is_empty());
}

#[tokio::test]
async fn test_object_exist() {
    let mut inspector = inspector(db1());
    let rules = rules(&[DDL_CHECK_OBJECT_EXIST]);

    let report = inspector
        .audit(&rules, "CREATE TABLE t1 (id INT)")
        .await
        .unwrap();
    assert_eq!(messages(&report), ["table `db1`.`t1` already exists"]);

    let report = inspector.audit(&rules, "CREATE DATABASE db1").await.unwrap();
    assert_eq!(messages(&report), ["schema `db1` already exists"]);

    inspector
        .audit(&rules, "CREATE TABLE t2 (id INT)")
        .await
        .unwrap();
    let report = inspector
        .audit(&rules, "CREATE TABLE t2 (id INT)")
        .await
        .unwrap();
    assert_eq!(messages(&report), ["table `db1`.`t2` already exists"]);
}

#[tokio::test]
async fn test_object_not_exist_for_dml() {
    let mut inspector = inspector(db1());
    let rules = rules(&[ALL_CHECK_OBJECT_NOT_EXIST]);

    let report = inspector
        .audit(&rules, "SELECT id FROM t9 WHERE id = 1")
        .await
        .unwrap();
    assert_eq!(messages(&report), ["table `db1`.`t9` does not exist"]);

    let report = inspector
        .audit(
            &rules,
            "SELECT a.id FROM nodb.t1 a JOIN nodb.t2 b ON a.id = b.id WHERE a.id = 1",
        )
        .await
        .unwrap();
    assert_eq!(messages(&report), ["schema `nodb` does not exist"]);

    let report = inspector.audit(&rules, "USE nodb").await.unwrap();
    assert_eq!(messages(&report), ["schema `nodb` does not exist"]);
}

#[tokio::test]
async fn test_object_not_exist_looks_through_nested_queries() {
    let mut inspector = inspector(db1());
    let rules = rules(&[ALL_CHECK_OBJECT_NOT_EXIST]);

    let report = inspector
        .audit(&rules, "WITH c AS (SELECT id FROM t1) SELECT id FROM c WHERE id = 1")
        .await
        .unwrap();
    assert!(report.findings.is_empty(), "{}", report.message);

    let cases = [
        ("SELECT x.id FROM (SELECT id FROM t9) AS x WHERE x.id = 1", "t9"),
        ("SELECT id FROM t1 WHERE id IN (SELECT id FROM t8)", "t8"),
        ("WITH c AS (SELECT id FROM t7) SELECT id FROM c WHERE id = 1", "t7"),
        ("DELETE FROM t1 WHERE EXISTS (SELECT 1 FROM t6 WHERE t6.id = t1.id)", "t6"),
        ("UPDATE t1 SET name = 'x' WHERE id IN (SELECT id FROM t5)", "t5"),
    ];
    for (sql, table) in cases {
        let report = inspector.audit(&rules, sql).await.unwrap();
        assert_eq!(
            messages(&report),
            [format!("table `db1`.`{table}` does not exist").as_str()],
            "{sql}"
        );
    }
}

#[tokio::test]
async fn test_object_not_exist_sees_batch_effects() {
    let mut inspector = inspector(db1());
    let rules = rules(&[ALL_CHECK_OBJECT_NOT_EXIST]);

    let statements = [
        "CREATE TABLE t5 (id INT)",
        "ALTER TABLE t5 ADD COLUMN a INT",
        "CREATE TABLE t6 LIKE t5",
    ];
    for sql in statements {
        let report = inspector.audit(&rules, sql).await.unwrap();
        assert!(report.findings.is_empty(), "{sql}: {}", report.message);
    }

    inspector.audit(&rules, "DROP TABLE t1").await.unwrap();
    let report = inspector
        .audit(&rules, "ALTER TABLE t1 ADD COLUMN a INT")
        .await
        .unwrap();
    assert_eq!(messages(&report), ["table `db1`.`t1` does not exist"]);
}

#[tokio::test]
async fn test_failing_source_aborts_the_audit() {
    let mut inspector = inspector(FakeSource::unavailable());
    let rules = rules(&[ALL_CHECK_OBJECT_NOT_EXIST]);

    let err = inspector
        .audit(&rules, "SELECT id FROM t1 WHERE id = 1")
        .await
        .unwrap_err();
    assert!(matches!(err, SqlAuditError::Timeout { .. }));
}

#[tokio::test]
async fn test_audit_batch_is_all_or_nothing() {
    let mut inspector = inspector(db1());
    let rules = rules(&[DDL_CHECK_PRIMARY_KEY_EXIST]);

    let statements = vec![
        "CREATE TABLE t2 (id INT)".to_string(),
        "SELECT id FROM t1 WHERE id = 1".to_string(),
    ];
    let err = inspector.audit_batch(&rules, &statements).await.unwrap_err();
    assert!(matches!(err, SqlAuditError::StatementConflict { .. }));

    let mut inspector = self::inspector(db1());
    let reports = inspector
        .audit_batch(&rules, &statements[..1])
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].level, RuleLevel::Error);
}

#[tokio::test]
async fn test_unknown_rules_are_skipped_and_levels_follow_the_caller() {
    let mut inspector = inspector(db1());
    let rules = vec![
        Rule::new("no_such_rule", "not registered", RuleLevel::Error, "custom"),
        CheckRegistry::mysql()
            .get(DDL_CHECK_PRIMARY_KEY_EXIST)
            .unwrap()
            .rule
            .clone()
            .with_level(RuleLevel::Warn),
    ];

    let report = inspector
        .audit(&rules, "CREATE TABLE t2 (id INT)")
        .await
        .unwrap();
    assert_eq!(report.level, RuleLevel::Warn);
    assert_eq!(report.message, "[warn]primary key is required");
}

#[tokio::test]
async fn test_audit_rejects_multiple_statements() {
    let mut inspector = inspector(db1());
    let err = inspector
        .audit(&[], "SELECT 1; SELECT 2")
        .await
        .unwrap_err();
    assert!(matches!(err, SqlAuditError::NodesCountExceedOne));
}

#[tokio::test]
async fn test_report_fields() {
    let mut inspector = inspector(db1());
    let report = inspector
        .audit(&[], "SELECT name FROM t1 WHERE id = 42")
        .await
        .unwrap();

    assert_eq!(report.text, "SELECT name FROM t1 WHERE id = 42");
    assert_eq!(report.fingerprint, "select name from t1 where id = ?");
    assert_eq!(report.kind, StatementKind::Dml);
    assert_eq!(report.level, RuleLevel::Normal);
    assert_eq!(report.message, "");
    assert_eq!(report.status, AuditStatus::Done);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "done");
    assert_eq!(json["level"], "normal");
}

#[tokio::test]
async fn test_rollback_uses_context_before_the_statement_is_applied() {
    let mut inspector = inspector(db1());
    let rules = rules(&[DDL_DISABLE_DROP_STATEMENT]);

    let rollback = inspector.gen_rollback_sql("DROP TABLE t1").await.unwrap();
    assert!(
        rollback.sql.starts_with("CREATE TABLE `db1`.`t1` ("),
        "{}",
        rollback.sql
    );
    assert!(rollback.message.is_empty());

    inspector.audit(&rules, "DROP TABLE t1").await.unwrap();

    let rollback = inspector.gen_rollback_sql("DROP TABLE t1").await.unwrap();
    assert!(rollback.sql.is_empty());
    assert!(rollback.message.contains("unknown"), "{}", rollback.message);
}

#[tokio::test]
async fn test_rollback_reports_lookup_failures_in_message() {
    let mut inspector = inspector(FakeSource::unavailable());
    let rollback = inspector
        .gen_rollback_sql("ALTER TABLE t1 ADD COLUMN a INT")
        .await
        .unwrap();
    assert!(rollback.sql.is_empty());
    assert!(rollback.message.contains("schema lookup failed"));

    assert!(inspector.gen_rollback_sql("SELEC oops").await.is_err());
}
