use crate::utils::{self, Output};
use anyhow::Context;
use colored::Colorize;
use stackflow_container::{DeployRequest, DeploymentResult, StackStatus};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub struct DeployOptions {
    pub name: String,
    pub file: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub env_vars: BTreeMap<String, String>,
    pub validate_only: bool,
}

pub async fn handle(output: &Output, work_dir: &Path, options: DeployOptions) -> anyhow::Result<()> {
    let path = utils::resolve_compose_path(options.file)?;
    let compose = std::fs::read_to_string(&path)
        .with_context(|| format!("composeファイルを読み込めません: {}", path.display()))?;

    let mut request = DeployRequest::new(&options.name, compose)
        .with_env_vars(options.env_vars)
        .validate_only(options.validate_only);
    if let Some(env_file) = &options.env_file {
        let content = std::fs::read_to_string(env_file).with_context(|| {
            format!("環境変数ファイルを読み込めません: {}", env_file.display())
        })?;
        request = request.with_env_file_content(content);
    }

    if !output.json {
        let action = if options.validate_only {
            "検証中"
        } else {
            "デプロイ中"
        };
        println!(
            "{}",
            format!("スタック '{}' を{}...", options.name, action).blue()
        );
        println!("composeファイル: {}", path.display().to_string().cyan());
    }

    let mut orchestrator = utils::open_orchestrator(work_dir).await;
    let result = orchestrator.deploy(request).await;

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

pub fn print_result(result: &DeploymentResult) {
    for line in &result.logs {
        println!("  {}", line.dimmed());
    }
    println!();

    if result.success {
        let mark = if result.status == StackStatus::Pending {
            "✓ 検証OK"
        } else {
            "✓ 完了"
        };
        println!("{} {}", mark.green().bold(), result.message);
        if !result.deployed_services.is_empty() {
            println!("  サービス: {}", result.deployed_services.join(", ").cyan());
        }
    } else {
        eprintln!("{} {}", "✗ 失敗".red().bold(), result.message);
        if !result.failed_services.is_empty() {
            eprintln!("  失敗したサービス: {}", result.failed_services.join(", "));
        }
    }
    println!("  所要時間: {:.1}秒", result.elapsed.as_secs_f64());
}
