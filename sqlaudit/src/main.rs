//! SQL governance command-line tool.
//!
//! This binary audits batches of SQL statements against a live MySQL or
//! SQLite instance and reports rule violations, optionally with generated
//! rollback statements.
//!
//! # Security Guarantees
//! - Audits only read metadata; the submitted SQL is never executed
//! - Connection URLs are redacted in every log line

mod output;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use output::{BatchReport, StatementOutcome, render_json, render_text};
use sqlaudit_core::{
    AuditConfig, CheckRegistry, Driver, Instance, Rule, RuleLevel, all_drivers, all_rules,
    logging::init_logging, new_driver, register_builtin_drivers,
};
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, info, info_span};

#[derive(Parser)]
#[command(name = "sqlaudit")]
#[command(about = "SQL governance and audit tool")]
#[command(version)]
#[command(long_about = "
sqlaudit - Audit SQL statements before they reach production

Each statement of a batch is parsed, classified and checked against a rule
set. Earlier statements in the batch are taken into account, so an ALTER
of a table created two statements before is judged against that table.

SUPPORTED DATABASES:
- MySQL (mysql://)
- SQLite (sqlite:// or .db/.sqlite files)

EXIT STATUS:
  0  no error-level finding
  1  the audit could not run
  2  at least one error-level finding

EXAMPLES:
  sqlaudit audit --database-url mysql://auditor@localhost/app migration.sql
  sqlaudit audit --database-url sqlite://app.db --rollback --format json < change.sql
  sqlaudit rules --engine sqlite
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Audit a batch of SQL statements
    Audit(AuditArgs),
    /// List the rule catalog
    Rules(RulesArgs),
    /// List registered database drivers
    Drivers,
}

#[derive(Args)]
pub struct AuditArgs {
    /// Database connection URL
    #[arg(
        long,
        env = "DATABASE_URL",
        help = "Database connection string (credentials will be sanitized in logs)"
    )]
    pub database_url: String,

    /// Engine type, detected from the URL when omitted
    #[arg(long)]
    pub engine: Option<String>,

    /// Schema unqualified table names resolve against
    #[arg(long)]
    pub schema: Option<String>,

    /// Rules to run
    #[arg(
        long,
        value_delimiter = ',',
        help = "Comma-separated rule names (default: the engine's whole catalog)"
    )]
    pub rules: Vec<String>,

    /// Audit configuration file
    #[arg(long, help = "JSON file selecting rules and overriding levels or values")]
    pub config: Option<PathBuf>,

    /// Generate rollback statements
    #[arg(long)]
    pub rollback: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// SQL file, read from stdin when omitted
    pub input: Option<PathBuf>,
}

#[derive(Args)]
pub struct RulesArgs {
    /// Engine whose catalog to list; every registered rule when omitted
    #[arg(long)]
    pub engine: Option<String>,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,
}

/// Available output formats
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// One block per statement
    Text,
    /// Structured batch report
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.global.verbose, cli.global.quiet) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    register_builtin_drivers();

    let outcome = match &cli.command {
        Command::Audit(args) => run_audit(args).await,
        Command::Rules(args) => list_rules(args).map(|()| RuleLevel::Normal),
        Command::Drivers => {
            list_drivers();
            Ok(RuleLevel::Normal)
        }
    };

    match outcome {
        Ok(RuleLevel::Error) => std::process::exit(2),
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Reads the SQL batch from a file or stdin.
async fn read_input(input: Option<&PathBuf>) -> Result<String> {
    match input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut sql = String::new();
            std::io::stdin()
                .read_to_string(&mut sql)
                .context("Failed to read SQL from stdin")?;
            Ok(sql)
        }
    }
}

/// Builds the instance from the URL and optional explicit engine type.
fn instance_for(args: &AuditArgs) -> Result<Instance> {
    let instance = match &args.engine {
        Some(engine) => Instance::new(engine.as_str(), args.database_url.as_str()),
        None => Instance::from_url(&args.database_url)?,
    };
    Ok(instance.with_name("cli"))
}

/// Rule catalog of an engine: its built-in registry, else every registered
/// rule.
fn catalog_for(engine: &str) -> Vec<Rule> {
    CheckRegistry::for_engine(engine).map_or_else(all_rules, |registry| registry.rules())
}

/// Resolves the rules to run from the configuration file and `--rules`.
fn select_rules(args: &AuditArgs, catalog: &[Rule]) -> Result<Vec<Rule>> {
    let mut config = match &args.config {
        Some(path) => AuditConfig::from_file(path)?,
        None => AuditConfig::default(),
    };
    if !args.rules.is_empty() {
        config.rules.clone_from(&args.rules);
    }
    config.validate(catalog)?;
    Ok(config.select_rules(catalog))
}

/// Audits the batch and prints the report. Returns the batch level.
async fn run_audit(args: &AuditArgs) -> Result<RuleLevel> {
    let instance = instance_for(args)?;
    let catalog = catalog_for(&instance.engine_type);
    let rules = select_rules(args, &catalog)?;
    let sql = read_input(args.input.as_ref()).await?;

    info!("Target: {}", instance.redacted_url());
    info!("Running {} rule(s)", rules.len());

    let span = info_span!("sqlaudit");
    let mut driver = new_driver(&span, &instance, args.schema.as_deref()).await?;
    let result = audit_statements(driver.as_mut(), &rules, &sql, args.rollback).await;
    driver.close().await;
    let statements = result?;

    let batch = BatchReport::new(
        instance.name.clone(),
        instance.engine_type.clone(),
        args.schema.clone().or_else(|| instance.default_schema.clone()),
        statements,
    );
    info!(
        "Audited {} statement(s), {} finding(s)",
        batch.statements.len(),
        batch.finding_count()
    );

    match args.format {
        OutputFormat::Text => print!("{}", render_text(&batch)),
        OutputFormat::Json => {
            println!(
                "{}",
                render_json(&batch).context("Failed to serialize report")?
            );
        }
    }
    Ok(batch.level)
}

/// Audits every statement of `sql` in order. Rollbacks are generated before
/// each statement is audited, against the schema as it stood then.
async fn audit_statements(
    driver: &mut dyn Driver,
    rules: &[Rule],
    sql: &str,
    rollback: bool,
) -> Result<Vec<StatementOutcome>> {
    let nodes = driver.parse(sql).await?;
    debug!("Parsed {} statement(s)", nodes.len());

    let mut outcomes = Vec::with_capacity(nodes.len());
    for node in nodes {
        let rollback = if rollback {
            Some(driver.gen_rollback_sql(&node.text).await?)
        } else {
            None
        };
        let report = driver
            .audit(rules, &node.text)
            .await
            .with_context(|| format!("Failed to audit: {}", node.text))?;
        outcomes.push(StatementOutcome { report, rollback });
    }
    Ok(outcomes)
}

/// Prints the rule catalog as a table
fn list_rules(args: &RulesArgs) -> Result<()> {
    let rules = match args.engine.as_deref() {
        Some(engine) => CheckRegistry::for_engine(engine)
            .map(|registry| registry.rules())
            .with_context(|| format!("No built-in rule catalog for engine '{}'", engine))?,
        None => {
            let mut rules = all_rules();
            let mut seen = std::collections::HashSet::new();
            rules.retain(|rule| seen.insert(rule.name.clone()));
            rules
        }
    };

    let width = rules.iter().map(|rule| rule.name.len()).max().unwrap_or(0);
    for rule in &rules {
        println!(
            "{:<width$}  {:<6}  {:<17}  {}",
            rule.name,
            rule.level.as_str(),
            rule.category,
            rule.desc,
            width = width
        );
    }
    Ok(())
}

/// Prints registered driver names
fn list_drivers() {
    let mut drivers = all_drivers();
    drivers.sort();
    for driver in drivers {
        println!("{}", driver);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn audit_args(extra: &[&str]) -> AuditArgs {
        let mut argv = vec!["sqlaudit", "audit", "--database-url", "sqlite::memory:"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Audit(args) => args,
            _ => panic!("expected audit subcommand"),
        }
    }

    #[test]
    fn test_cli_parses_audit_arguments() {
        let args = audit_args(&[
            "--rules",
            "ddl_disable_fk,ddl_check_index_count",
            "--rollback",
            "--format",
            "json",
            "batch.sql",
        ]);
        assert_eq!(args.rules, ["ddl_disable_fk", "ddl_check_index_count"]);
        assert!(args.rollback);
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.input, Some(PathBuf::from("batch.sql")));
    }

    #[test]
    fn test_instance_detects_engine() {
        let instance = instance_for(&audit_args(&[])).unwrap();
        assert_eq!(instance.engine_type, sqlaudit_core::DRIVER_TYPE_SQLITE);

        let explicit = instance_for(&audit_args(&["--engine", "mysql"])).unwrap();
        assert_eq!(explicit.engine_type, "mysql");
    }

    #[test]
    fn test_select_rules_from_flag_and_config() {
        let catalog = catalog_for("mysql");

        let rules = select_rules(&audit_args(&["--rules", "ddl_disable_fk"]), &catalog).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "ddl_disable_fk");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"disabled": ["ddl_disable_fk"], "overrides": {{"ddl_check_index_count": {{"value": "8"}}}}}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let rules = select_rules(&audit_args(&["--config", path.as_str()]), &catalog).unwrap();
        assert_eq!(rules.len(), catalog.len() - 1);
        let index_count = rules
            .iter()
            .find(|rule| rule.name == "ddl_check_index_count")
            .unwrap();
        assert_eq!(index_count.value, "8");

        assert!(select_rules(&audit_args(&["--rules", "no_such_rule"]), &catalog).is_err());
    }

    #[tokio::test]
    async fn test_audit_statements_against_memory_database() {
        register_builtin_drivers();
        let instance = Instance::from_url("sqlite::memory:").unwrap();
        let mut driver = new_driver(&tracing::Span::none(), &instance, None)
            .await
            .ok()
            .expect("sqlite driver should open");
        let rules = select_rules(
            &audit_args(&["--rules", "ddl_check_primary_key_exist"]),
            &catalog_for("sqlite"),
        )
        .unwrap();

        let outcomes = audit_statements(
            driver.as_mut(),
            &rules,
            "CREATE TABLE t1 (id INTEGER); CREATE TABLE t2 (id INTEGER PRIMARY KEY);",
            true,
        )
        .await
        .unwrap();
        driver.close().await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].report.level, RuleLevel::Error);
        assert_eq!(outcomes[1].report.level, RuleLevel::Normal);
        let rollback = outcomes[0].rollback.as_ref().unwrap();
        assert_eq!(rollback.sql, "DROP TABLE IF EXISTS `main`.`t1`;");
    }
}
