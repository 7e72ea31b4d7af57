//! Validate command - checks a chain definition file offline

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::chain::{
    expression_warnings, validate_chain, ChainDefinition, ChainId, ChainStep, TenantId,
};

const LOCAL_TENANT: &str = "local";

/// On-disk chain definition; same shape as the create-chain request body
#[derive(Debug, Deserialize)]
struct ChainFile {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    tenant_id: Option<String>,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    steps: Vec<ChainStep>,
    #[serde(default)]
    rollback_steps: Vec<ChainStep>,
    #[serde(default)]
    variables: HashMap<String, Value>,
}

/// Result of checking one definition
#[derive(Debug)]
pub struct ValidationReport {
    pub chain_name: String,
    pub step_count: usize,
    pub rollback_step_count: usize,
    pub warnings: Vec<String>,
}

/// Validate the file at `path` and print a short report
///
/// Structural errors fail the command; expression warnings are printed only.
pub async fn run(path: &Path) -> anyhow::Result<()> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let report = validate_source(&contents)
        .with_context(|| format!("{} is not a valid chain definition", path.display()))?;

    println!(
        "{}: chain '{}' is valid ({} steps, {} rollback steps)",
        path.display(),
        report.chain_name,
        report.step_count,
        report.rollback_step_count
    );
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }

    Ok(())
}

pub fn validate_source(contents: &str) -> anyhow::Result<ValidationReport> {
    let file: ChainFile = serde_json::from_str(contents).context("Invalid JSON")?;
    let definition = into_definition(file)?;

    validate_chain(&definition)?;

    Ok(ValidationReport {
        chain_name: definition.name().to_string(),
        step_count: definition.step_count(),
        rollback_step_count: definition.rollback_steps().len(),
        warnings: expression_warnings(&definition),
    })
}

fn into_definition(file: ChainFile) -> anyhow::Result<ChainDefinition> {
    let tenant = TenantId::new(file.tenant_id.as_deref().unwrap_or(LOCAL_TENANT))?;

    let mut definition = match file.id {
        Some(id) => ChainDefinition::with_id(ChainId::new(id)?, tenant, file.name),
        None => ChainDefinition::new(tenant, file.name),
    };

    if let Some(description) = file.description {
        definition = definition.with_description(description);
    }

    Ok(definition
        .with_steps(file.steps)
        .with_rollback_steps(file.rollback_steps)
        .with_variables(file.variables))
}
