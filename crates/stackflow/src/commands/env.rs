use crate::utils::{self, Output};
use colored::Colorize;
use stackflow_core::{EnvFile, EnvManager, is_sensitive_name};
use std::path::{Path, PathBuf};

pub fn handle_validate(output: &Output, path: &Path) -> anyhow::Result<()> {
    let env_file = EnvManager::load(path)?;
    let report = EnvManager::validate(&env_file);

    if output.json {
        output.print_json(&serde_json::json!({
            "file": path,
            "variables": env_file.len(),
            "valid": report.is_valid(),
            "errors": report.errors,
            "warnings": report.warnings,
        }))?;
    } else {
        println!("環境変数ファイル: {}", path.display().to_string().cyan());
        for variable in env_file.variables() {
            let value = if is_sensitive_name(&variable.name) {
                "***"
            } else {
                variable.display_value()
            };
            println!("  {}={}", variable.name, value);
        }
        println!();
        if report.is_valid() {
            println!("{}", "✓ 環境変数ファイルは正常です".green().bold());
        } else {
            eprintln!("{}", "✗ 環境変数ファイルにエラーがあります".red().bold());
        }
        utils::print_validation_report(&report);
    }

    if !report.is_valid() {
        std::process::exit(1);
    }
    Ok(())
}

pub fn handle_diff(output: &Output, old: &Path, new: &Path) -> anyhow::Result<()> {
    let old_file = EnvManager::load(old)?;
    let new_file = EnvManager::load(new)?;
    let diff = EnvManager::diff(&old_file, &new_file);

    if output.json {
        return output.print_json(&diff);
    }

    if diff.is_empty() {
        println!("{}", "ℹ 差分はありません".dimmed());
        return Ok(());
    }
    for name in &diff.added {
        println!("{}", format!("+ {}", name).green());
    }
    for name in &diff.removed {
        println!("{}", format!("- {}", name).red());
    }
    for modified in &diff.modified {
        let secret = new_file.get(&modified.name).is_some_and(|v| v.is_secret)
            || old_file.get(&modified.name).is_some_and(|v| v.is_secret);
        if secret {
            println!("{}", format!("~ {} (機密情報のため値は非表示)", modified.name).yellow());
        } else {
            println!(
                "{}",
                format!(
                    "~ {}: {} -> {}",
                    modified.name, modified.old_value, modified.new_value
                )
                .yellow()
            );
        }
    }
    Ok(())
}

pub fn handle_template(file: Option<PathBuf>, dest: Option<PathBuf>) -> anyhow::Result<()> {
    let path = utils::resolve_compose_path(file)?;
    let doc = stackflow_core::parse_compose_file(&path)?;
    write_or_print(EnvManager::generate_template(&doc.service_names()), dest)
}

pub fn handle_merge(files: &[PathBuf], dest: Option<PathBuf>) -> anyhow::Result<()> {
    let loaded = files
        .iter()
        .map(EnvManager::load)
        .collect::<Result<Vec<_>, _>>()?;
    write_or_print(EnvManager::merge(&loaded), dest)
}

pub fn handle_substitute(input: &Path, env_file: &Path) -> anyhow::Result<()> {
    let env_file = EnvManager::load(env_file)?;
    let text = std::fs::read_to_string(input)?;
    print!("{}", EnvManager::substitute(&text, &env_file));
    Ok(())
}

/// 出力先が指定されていれば保存（既存ファイルはバックアップ）、なければ標準出力へ
fn write_or_print(mut env_file: EnvFile, dest: Option<PathBuf>) -> anyhow::Result<()> {
    match dest {
        Some(dest) => {
            env_file.path = dest;
            EnvManager::save(&env_file, true)?;
            println!(
                "{}",
                format!("✓ {} を書き出しました", env_file.path.display())
                    .green()
                    .bold()
            );
        }
        None => print!("{}", env_file.render()),
    }
    Ok(())
}
