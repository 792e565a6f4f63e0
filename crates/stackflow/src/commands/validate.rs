use crate::utils::{self, Output};
use colored::Colorize;
use stackflow_core::DocumentValidator;
use stackflow_core::parser::{extract_images, extract_ports};
use std::path::PathBuf;

pub fn handle(output: &Output, file: Option<PathBuf>) -> anyhow::Result<()> {
    let path = utils::resolve_compose_path(file)?;
    if !output.json {
        println!("{}", "設定を検証中...".blue());
        println!("composeファイル: {}", path.display().to_string().cyan());
    }

    let doc = match stackflow_core::parse_compose_file(&path) {
        Ok(doc) => doc,
        Err(e) => {
            if output.json {
                output.print_json(&serde_json::json!({
                    "file": path,
                    "valid": false,
                    "errors": [e.to_string()],
                    "warnings": [],
                }))?;
            } else {
                eprintln!();
                eprintln!("{}", "✗ composeファイルを読み込めません".red().bold());
                eprintln!("  {}", e);
            }
            std::process::exit(1);
        }
    };

    let mut validator = DocumentValidator::new();
    if let Some(base_dir) = path.parent() {
        validator = validator.with_base_dir(base_dir);
    }
    let report = validator.validate(&doc);

    if output.json {
        output.print_json(&serde_json::json!({
            "file": path,
            "valid": report.is_valid(),
            "errors": report.errors,
            "warnings": report.warnings,
        }))?;
    } else if report.is_valid() {
        println!("{}", "✓ 設定ファイルは正常です！".green().bold());
        utils::print_validation_report(&report);
        println!();
        println!("サマリー:");
        println!("  サービス: {}個", doc.services.len());
        for (name, service) in &doc.services {
            let image = service.image.as_deref().unwrap_or("(ビルド)");
            println!("    - {} ({})", name.cyan(), image);
        }
        println!("  イメージ: {}個", extract_images(&doc).len());
        for (name, ports) in extract_ports(&doc) {
            println!("  公開ポート {}: {}", name.cyan(), ports.join(", "));
        }
    } else {
        eprintln!();
        eprintln!("{}", "✗ 設定エラー".red().bold());
        utils::print_validation_report(&report);
    }

    if !report.is_valid() {
        std::process::exit(1);
    }
    Ok(())
}
