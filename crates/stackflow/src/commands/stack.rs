use crate::commands::deploy::print_result;
use crate::utils::{self, Output};
use colored::Colorize;
use stackflow_container::{ObservedState, StackStatusReport};
use std::path::Path;

pub async fn handle_stop(output: &Output, work_dir: &Path, name: &str) -> anyhow::Result<()> {
    if !output.json {
        println!("{}", format!("スタック '{}' を停止中...", name).yellow());
    }

    let mut orchestrator = utils::open_orchestrator(work_dir).await;
    let result = orchestrator.stop(name).await;

    if output.json {
        output.print_json(&result)?;
    } else {
        print_result(&result);
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

pub async fn handle_remove(
    output: &Output,
    work_dir: &Path,
    name: &str,
    remove_volumes: bool,
) -> anyhow::Result<()> {
    if !output.json {
        println!("{}", format!("スタック '{}' を削除中...", name).yellow());
    }

    let mut orchestrator = utils::open_orchestrator(work_dir).await;
    let removed = orchestrator.remove(name, remove_volumes).await;

    if output.json {
        output.print_json(&serde_json::json!({ "name": name, "removed": removed }))?;
    } else if removed {
        println!("{}", format!("✓ '{}' を削除しました", name).green().bold());
    } else {
        eprintln!(
            "{}",
            format!("✗ '{}' の作業ディレクトリを削除できませんでした", name)
                .red()
                .bold()
        );
    }

    if !removed {
        std::process::exit(1);
    }
    Ok(())
}

pub async fn handle_status(output: &Output, work_dir: &Path, name: &str) -> anyhow::Result<()> {
    let orchestrator = utils::open_orchestrator(work_dir).await;
    let report = orchestrator.status(name).await;

    if output.json {
        output.print_json(&report)?;
    } else {
        print_status(&report);
    }

    if report.status == ObservedState::NotFound {
        std::process::exit(1);
    }
    Ok(())
}

pub async fn handle_list(output: &Output, work_dir: &Path) -> anyhow::Result<()> {
    let orchestrator = utils::open_orchestrator(work_dir).await;
    let reports = orchestrator.list().await;

    if output.json {
        return output.print_json(&reports);
    }

    if reports.is_empty() {
        println!("{}", "ℹ スタックはありません".dimmed());
        return Ok(());
    }
    for report in &reports {
        let running = report.services.iter().filter(|s| s.is_running()).count();
        println!(
            "  {} {} ({}/{} running)",
            report.name.cyan(),
            colorize_state(report.status),
            running,
            report.services.len()
        );
    }
    Ok(())
}

fn print_status(report: &StackStatusReport) {
    if report.status == ObservedState::NotFound {
        eprintln!(
            "{}",
            format!("✗ スタック '{}' は存在しません", report.name).red().bold()
        );
        return;
    }

    println!("スタック: {} {}", report.name.cyan(), colorize_state(report.status));
    for service in &report.services {
        let name = if service.service.is_empty() {
            &service.name
        } else {
            &service.service
        };
        println!("  - {} {} {}", name.cyan(), service.state, service.status.dimmed());
    }
    if let Some(raw) = &report.raw_output {
        println!("{}", raw);
    }
    if let Some(error) = &report.error {
        eprintln!("  {} {}", "✗".red(), error);
    }
}

fn colorize_state(state: ObservedState) -> colored::ColoredString {
    let label = state.as_str();
    match state {
        ObservedState::Tracked(status) => match status {
            stackflow_container::StackStatus::Running => label.green(),
            stackflow_container::StackStatus::Failed => label.red(),
            stackflow_container::StackStatus::Stopped => label.dimmed(),
            _ => label.yellow(),
        },
        ObservedState::Error => label.red(),
        ObservedState::Unknown | ObservedState::NotFound => label.dimmed(),
    }
}
