//! Destination routing: limits are evaluated per destination, independently.

use ferry::attachment::{Destination, ResolvedFile};
use ferry::router::{DestinationLimits, DestinationRouter, LimitKind, RoutingLimits};
use std::collections::BTreeSet;
use std::path::PathBuf;

fn file(alias: &str, size: u64, destinations: &[Destination]) -> ResolvedFile {
    ResolvedFile::new(
        alias,
        PathBuf::from(format!("/work/{alias}.bin")),
        size,
        format!("{alias:0>64}"),
        destinations.iter().copied().collect::<BTreeSet<_>>(),
    )
}

fn sandbox_capped_at(bytes: u64) -> RoutingLimits {
    RoutingLimits {
        sandbox_exec: DestinationLimits {
            max_file_bytes: Some(bytes),
            ..DestinationLimits::UNLIMITED
        },
        ..RoutingLimits::default()
    }
}

/// Test: a large template-only directory is unaffected by sandbox caps
#[test]
fn test_template_only_files_ignore_sandbox_limits() {
    let files: Vec<ResolvedFile> = (0..50)
        .map(|i| file(&format!("f{i}"), 1_000_000, &[Destination::TemplateContext]))
        .collect();
    let plan = DestinationRouter::new(sandbox_capped_at(10)).plan(&files);

    assert!(plan.is_clean());
    assert_eq!(plan.batches.len(), 1);
    assert_eq!(plan.batches[&Destination::TemplateContext].len(), 50);
}

/// Test: failing one destination's limit keeps the file in the others
#[test]
fn test_violation_in_one_destination_keeps_file_elsewhere() {
    let files = vec![file(
        "report",
        100,
        &[Destination::TemplateContext, Destination::SandboxExec],
    )];
    let plan = DestinationRouter::new(sandbox_capped_at(50)).plan(&files);

    assert_eq!(plan.batches[&Destination::TemplateContext].len(), 1);
    assert!(plan.batches[&Destination::SandboxExec].is_empty());

    assert_eq!(plan.violations.len(), 1);
    let violation = &plan.violations[0];
    assert_eq!(violation.destination, Destination::SandboxExec);
    assert_eq!(violation.alias, "report");
    assert_eq!(violation.kind, LimitKind::FileSize);
    assert_eq!(violation.limit, 50);
    assert_eq!(violation.actual, 100);
}

/// Test: reduced routing returns the surviving batches plus the violations
#[test]
fn test_reduced_routing() {
    let files = vec![
        file("small", 10, &[Destination::SandboxExec, Destination::SearchIndex]),
        file("large", 1_000, &[Destination::SandboxExec, Destination::SearchIndex]),
    ];
    let (batches, exceeded) = DestinationRouter::new(sandbox_capped_at(100))
        .plan(&files)
        .into_reduced();

    assert_eq!(batches[&Destination::SandboxExec].len(), 1);
    assert_eq!(batches[&Destination::SearchIndex].len(), 2);
    assert_eq!(batches[&Destination::SearchIndex].total_bytes, 1_010);

    let exceeded = exceeded.expect("sandbox limit should be reported");
    assert_eq!(exceeded.for_destination(Destination::SandboxExec).count(), 1);
    assert_eq!(exceeded.for_destination(Destination::SearchIndex).count(), 0);
}

/// Test: strict routing fails the whole route on any violation
#[test]
fn test_strict_routing_rejects() {
    let files = vec![file("large", 1_000, &[Destination::SandboxExec])];
    let err = DestinationRouter::new(sandbox_capped_at(100))
        .route(&files)
        .unwrap_err();
    assert_eq!(err.violations.len(), 1);
}

/// Test: default sandbox file-count cap
#[test]
fn test_default_sandbox_file_count() {
    let limits = RoutingLimits::default();
    let cap = limits
        .sandbox_exec
        .max_files
        .expect("sandbox has a default file cap");
    let files: Vec<ResolvedFile> = (0..cap + 3)
        .map(|i| file(&format!("f{i}"), 1, &[Destination::SandboxExec]))
        .collect();

    let plan = DestinationRouter::new(limits).plan(&files);
    assert_eq!(plan.batches[&Destination::SandboxExec].len(), cap);
    assert_eq!(plan.violations.len(), 3);
    assert!(plan.violations.iter().all(|v| v.kind == LimitKind::FileCount));
}

/// Test: limits load from TOML with the destination's route token
#[test]
fn test_limits_from_toml() {
    let limits: RoutingLimits = toml::from_str(
        r#"
        [sandbox-exec]
        max_files = 3
        max_total_bytes = 1024

        [template]
        max_file_bytes = 64
        "#,
    )
    .unwrap();
    assert_eq!(limits.sandbox_exec.max_files, Some(3));
    assert_eq!(limits.sandbox_exec.max_total_bytes, Some(1024));
    assert_eq!(limits.sandbox_exec.max_file_bytes, None);
    assert_eq!(limits.template.max_file_bytes, Some(64));
    assert_eq!(limits.search, RoutingLimits::default().search);
}
