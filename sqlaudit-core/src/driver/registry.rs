//! Process-wide driver registry.
//!
//! Engines register once at start-up; afterwards the registry is only read.
//! Lookups clone the constructor out of the lock before awaiting it, so a
//! slow connection never blocks other sessions.

use super::Driver;
use crate::Result;
use crate::error::SqlAuditError;
use crate::models::{Instance, Rule};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use tracing::{Span, info};

/// Builds a driver session for an instance and optional schema.
pub type Constructor = Arc<
    dyn Fn(Span, Instance, Option<String>) -> BoxFuture<'static, Result<Box<dyn Driver>>>
        + Send
        + Sync,
>;

static DRIVERS: LazyLock<RwLock<HashMap<String, Constructor>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

static RULES: LazyLock<RwLock<Vec<Rule>>> = LazyLock::new(|| RwLock::new(Vec::new()));

/// Registers an engine under `name` together with the rules it contributes.
///
/// Rules are appended to the global catalog as given; the same rule name
/// contributed by two engines appears twice.
///
/// # Panics
/// Panics with "duplicated driver name" if `name` is already registered.
/// Registration happens during start-up, where a clash is a build defect.
#[allow(clippy::panic)]
pub fn register<F, Fut>(name: &str, constructor: F, rules: Vec<Rule>)
where
    F: Fn(Span, Instance, Option<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Box<dyn Driver>>> + Send + 'static,
{
    let constructor: Constructor = Arc::new(
        move |log: Span,
              instance: Instance,
              schema: Option<String>|
              -> BoxFuture<'static, Result<Box<dyn Driver>>> {
            Box::pin(constructor(log, instance, schema))
        },
    );

    {
        let mut drivers = DRIVERS.write().unwrap_or_else(PoisonError::into_inner);
        if drivers.contains_key(name) {
            panic!("duplicated driver name: {}", name);
        }
        drivers.insert(name.to_string(), constructor);
    }

    let count = rules.len();
    RULES
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .extend(rules);
    info!(driver = name, rules = count, "Registered driver");
}

/// Opens a session with the driver registered for `instance.engine_type`.
///
/// # Errors
/// - [`SqlAuditError::DriverNotSupported`] if no driver has that name
/// - Any error of the driver's constructor, unchanged
pub async fn new_driver(
    log: &Span,
    instance: &Instance,
    schema: Option<&str>,
) -> Result<Box<dyn Driver>> {
    let constructor = DRIVERS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&instance.engine_type)
        .cloned()
        .ok_or_else(|| SqlAuditError::driver_not_supported(&instance.engine_type))?;

    let driver = constructor(
        log.clone(),
        instance.clone(),
        schema.map(str::to_string),
    )
    .await?;
    info!(
        driver = %instance.engine_type,
        instance = %instance.name,
        "Created driver session"
    );
    Ok(driver)
}

/// Every registered rule, in registration order.
pub fn all_rules() -> Vec<Rule> {
    RULES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Names of all registered engines.
pub fn all_drivers() -> Vec<String> {
    DRIVERS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .cloned()
        .collect()
}

/// Child span for one driver session, tagged with a fresh session id.
pub fn session_span(log: &Span, engine_type: &str) -> Span {
    let session_id = uuid::Uuid::new_v4();
    tracing::info_span!(
        parent: log,
        "audit_session",
        session_id = %session_id,
        engine = engine_type
    )
}
