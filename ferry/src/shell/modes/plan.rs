//! # Plan Mode
//!
//! Parses routes, resolves them against the allowed roots, routes the result
//! and prints the plan as JSON on stdout.

use crate::attachment::{self, AttachmentResolver, Destination, RawRoute, TemplateBinding};
use crate::config::FerryConfig;
use crate::path_security::PathSecurityValidator;
use crate::router::{DestinationRouter, LimitViolation, RoutingLimits, UploadBatch};
use crate::shell::cli::PlanArgs;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct PlanOutput {
    pub bindings: Vec<TemplateBinding>,
    pub batches: BTreeMap<Destination, UploadBatch>,
    pub violations: Vec<LimitViolation>,
}

/// Parse, resolve and route. Parse and resolution errors abort before any
/// routing; limit violations abort only when `strict` is set.
pub fn build_plan(
    routes: &[RawRoute],
    allowed_roots: &[PathBuf],
    limits: RoutingLimits,
    strict: bool,
) -> Result<PlanOutput> {
    let specs = attachment::parse(routes).context("Invalid attachment route")?;

    let validator =
        PathSecurityValidator::new(allowed_roots).context("Invalid allowed root")?;
    let files = AttachmentResolver::new(&validator)
        .resolve(&specs)
        .context("Failed to resolve attachments")?;
    tracing::info!(
        "Resolved {} attachment(s) into {} file(s)",
        specs.len(),
        files.len()
    );

    let router = DestinationRouter::new(limits);
    let (batches, violations) = if strict {
        let batches = router.route(&files).context("Destination limits exceeded")?;
        (batches, Vec::new())
    } else {
        let (batches, exceeded) = router.plan(&files).into_reduced();
        if let Some(exceeded) = &exceeded {
            tracing::warn!("Proceeding with reduced routing: {}", exceeded);
        }
        (batches, exceeded.map(|e| e.violations).unwrap_or_default())
    };

    Ok(PlanOutput {
        bindings: files.iter().map(|f| f.binding()).collect(),
        batches,
        violations,
    })
}

pub async fn run_plan_mode(args: &PlanArgs, config: &FerryConfig) -> Result<()> {
    let roots = args.allowed_roots()?;
    let plan = build_plan(&args.routes(), &roots, config.limits, args.strict_limits())?;
    let json = serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?;
    println!("{json}");
    Ok(())
}
