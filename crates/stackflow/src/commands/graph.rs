use crate::utils::{self, Output};
use colored::Colorize;
use stackflow_core::DependencyManager;
use std::path::PathBuf;

pub fn handle(output: &Output, file: Option<PathBuf>) -> anyhow::Result<()> {
    let path = utils::resolve_compose_path(file)?;
    let doc = stackflow_core::parse_compose_file(&path)?;

    let manager = DependencyManager::analyze(&doc);
    let report = manager.dependency_report();
    let (valid, errors) = manager.validate();

    if output.json {
        output.print_json(&serde_json::json!({
            "valid": valid,
            "errors": errors,
            "report": report,
            "suggestions": manager.suggest_optimizations(),
        }))?;
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "サービス: {}個 / 依存関係: {}個",
            report.total_services, report.total_dependencies
        )
        .bold()
    );
    for (kind, count) in &report.dependencies_by_kind {
        println!("  {}: {}", kind, count);
    }

    println!();
    println!("{}", "起動グループ:".bold());
    for (i, group) in report.parallel_groups.iter().enumerate() {
        println!("  {}. {}", i + 1, group.join(", ").cyan());
    }

    if let Some(order) = &report.shutdown_order {
        println!();
        println!("停止順序: {}", order.join(" -> "));
    }

    for (name, summary) in &report.services {
        if summary.depends_on.is_empty() {
            continue;
        }
        println!("  {} -> {}", name.cyan(), summary.depends_on.join(", "));
    }

    if !report.critical_services.is_empty() {
        println!();
        println!(
            "{} {}",
            "重要サービス:".yellow(),
            report.critical_services.join(", ")
        );
    }
    if !report.isolated_services.is_empty() {
        println!(
            "{} {}",
            "孤立サービス:".dimmed(),
            report.isolated_services.join(", ")
        );
    }

    if !errors.is_empty() {
        println!();
        println!("{}", "✗ 依存関係に問題があります".red().bold());
        for error in &errors {
            println!("  {} {}", "✗".red(), error);
        }
    }

    let suggestions = manager.suggest_optimizations();
    if !suggestions.is_empty() {
        println!();
        println!("{}", "提案:".bold());
        for suggestion in suggestions {
            println!("  💡 {}", suggestion);
        }
    }

    Ok(())
}
