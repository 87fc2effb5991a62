use crate::model::{CleanOutcome, CleanStatus, CleanSummary, ScanReport, ScanWarningKind};

pub fn render_markdown_summary(report: &ScanReport) -> String {
    let mut out = String::new();
    out.push_str("# modsweep Scan Summary\n\n");
    out.push_str(&format!(
        "- Report version: `{}`\n- Generated at: `{}`\n- Scan id: `{}`\n- Root: `{}`\n- Scan elapsed: `{} ms`\n- Directories visited: `{}`\n- Complete: `{}`\n\n",
        report.report_version,
        report.generated_at,
        report.scan_id,
        report.root,
        report.metrics.elapsed_ms,
        report.metrics.directories_visited,
        report.complete
    ));

    out.push_str("## Targets\n\n");
    if report.targets.is_empty() {
        out.push_str("No target directories found.\n\n");
    } else {
        if report.compute_sizes {
            out.push_str("| Name | Size | Path |\n|---|---:|---|\n");
        } else {
            out.push_str("| Name | Path |\n|---|---|\n");
        }
        for target in &report.targets {
            match &target.size {
                Some(size) => out.push_str(&format!(
                    "| {} | {}{} | `{}` |\n",
                    target.display_name,
                    size,
                    if target.size_partial { " (partial)" } else { "" },
                    target.path
                )),
                None => out.push_str(&format!(
                    "| {} | `{}` |\n",
                    target.display_name, target.path
                )),
            }
        }
        out.push('\n');
        if let Some(total) = &report.total_size {
            out.push_str(&format!(
                "Total: **{}** across {} target(s)\n\n",
                total,
                report.targets.len()
            ));
        }
    }

    if !report.warnings.is_empty() {
        out.push_str("## Warnings\n\n");
        for warning in &report.warnings {
            out.push_str(&format!(
                "- `{}` `{}`: {}\n",
                warning_label(warning.kind),
                warning.path,
                warning.message
            ));
        }
    }

    out
}

pub fn render_clean_markdown(outcomes: &[CleanOutcome]) -> String {
    let summary = CleanSummary::from_outcomes(outcomes);
    let mut out = String::new();
    out.push_str("# modsweep Clean Summary\n\n");
    out.push_str(&format!(
        "- Requested: `{}`\n- Deleted: `{}`\n- Not found: `{}`\n- Permission denied: `{}`\n- Other failures: `{}`\n- Cancelled: `{}`\n\n",
        summary.requested,
        summary.deleted,
        summary.not_found,
        summary.permission_denied,
        summary.other_failure,
        summary.cancelled
    ));
    for outcome in outcomes {
        out.push_str(&format!(
            "- `{}`: `{}`",
            outcome.path,
            status_label(outcome.status)
        ));
        if let Some(detail) = &outcome.detail {
            out.push_str(&format!(" ({detail})"));
        }
        out.push('\n');
    }
    out
}

fn warning_label(kind: ScanWarningKind) -> &'static str {
    match kind {
        ScanWarningKind::UnreadableSubtree => "unreadable_subtree",
        ScanWarningKind::PartialSize => "partial_size",
        ScanWarningKind::Cancelled => "cancelled",
        ScanWarningKind::NonUtf8Path => "non_utf8_path",
    }
}

pub fn status_label(status: CleanStatus) -> &'static str {
    match status {
        CleanStatus::Deleted => "deleted",
        CleanStatus::NotFound => "not_found",
        CleanStatus::PermissionDenied => "permission_denied",
        CleanStatus::OtherFailure => "other_failure",
        CleanStatus::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::{render_clean_markdown, render_markdown_summary};
    use crate::model::{
        CleanOutcome, CleanStatus, DiscoveredTarget, ScanMetrics, ScanReport, ScanWarning,
        ScanWarningKind,
    };

    #[test]
    fn renders_sized_targets_and_warnings() {
        let report = ScanReport {
            report_version: "1.0.0".to_string(),
            generated_at: "2024-01-01T00:00:00Z".to_string(),
            scan_id: "abc".to_string(),
            root: "/work".to_string(),
            compute_sizes: true,
            targets: vec![DiscoveredTarget {
                path: "/work/app/node_modules".to_string(),
                display_name: ".../app".to_string(),
                size_bytes: Some(2_097_152),
                size: Some("2.00 MB".to_string()),
                size_partial: true,
            }],
            total_size_bytes: Some(2_097_152),
            total_size: Some("2.00 MB".to_string()),
            complete: false,
            warnings: vec![ScanWarning {
                kind: ScanWarningKind::UnreadableSubtree,
                path: "/work/locked".to_string(),
                message: "permission denied".to_string(),
            }],
            metrics: ScanMetrics::default(),
        };

        let markdown = render_markdown_summary(&report);
        assert!(markdown.contains("| .../app | 2.00 MB (partial) | `/work/app/node_modules` |"));
        assert!(markdown.contains("Total: **2.00 MB** across 1 target(s)"));
        assert!(markdown.contains("`unreadable_subtree` `/work/locked`"));
    }

    #[test]
    fn renders_clean_outcomes() {
        let markdown = render_clean_markdown(&[CleanOutcome {
            path: "/work/app/node_modules".to_string(),
            status: CleanStatus::NotFound,
            detail: Some("gone".to_string()),
            bytes_freed: None,
        }]);
        assert!(markdown.contains("- Not found: `1`"));
        assert!(markdown.contains("`/work/app/node_modules`: `not_found` (gone)"));
    }
}
