mod commands;
mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stackflow")]
#[command(about = "composeスタックを検証し、依存関係どおりにデプロイする", long_about = None)]
struct Cli {
    /// スタックを展開する作業ディレクトリ
    #[arg(long, global = true, env = "STACKFLOW_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// 結果をJSONで出力
    #[arg(long, global = true)]
    json: bool,

    /// デバッグログを表示
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// composeファイルを検証
    Validate {
        /// composeファイル（省略時はカレントディレクトリから検索）
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// サービスの依存関係を解析
    Graph {
        /// composeファイル（省略時はカレントディレクトリから検索）
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// スタックをデプロイ
    Deploy {
        /// スタック名
        name: String,
        /// composeファイル（省略時はカレントディレクトリから検索）
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// そのまま使う環境変数ファイル
        #[arg(long)]
        env_file: Option<PathBuf>,
        /// 環境変数（KEY=VALUE、複数指定可）
        #[arg(short = 'e', long = "env", value_parser = utils::parse_key_value)]
        env: Vec<(String, String)>,
        /// 検証のみ行い、デプロイしない
        #[arg(long)]
        validate_only: bool,
    },
    /// スタックを停止
    Stop {
        /// スタック名
        name: String,
    },
    /// スタックを削除
    Rm {
        /// スタック名
        name: String,
        /// ボリュームも削除する
        #[arg(long)]
        volumes: bool,
    },
    /// スタックの状態を表示
    Status {
        /// スタック名
        name: String,
    },
    /// スタックの一覧を表示
    Ls,
    /// 環境変数ファイルを操作
    #[command(subcommand)]
    Env(EnvCommands),
    /// バージョン情報を表示
    Version,
}

/// 環境変数ファイルのサブコマンド
#[derive(Subcommand)]
enum EnvCommands {
    /// 環境変数ファイルを検証
    Validate {
        /// 環境変数ファイル
        #[arg(default_value = ".env")]
        path: PathBuf,
    },
    /// 2つの環境変数ファイルの差分を表示
    Diff {
        /// 比較元
        old: PathBuf,
        /// 比較先
        new: PathBuf,
    },
    /// composeファイルに合わせたテンプレートを生成
    Template {
        /// composeファイル（省略時はカレントディレクトリから検索）
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// 出力先（省略時は標準出力）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 複数の環境変数ファイルをマージ（後のファイルが優先）
    Merge {
        /// 環境変数ファイル
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// 出力先（省略時は標準出力）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// ファイル内の $VAR / ${VAR} を展開
    Substitute {
        /// 展開するファイル
        input: PathBuf,
        /// 値を取得する環境変数ファイル
        #[arg(long, default_value = ".env")]
        env_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログはstderrに出力（stdoutは結果の出力に使う）
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(utils::log_filter(cli.verbose))
        .init();

    let output = utils::Output { json: cli.json };
    let work_dir = stackflow_config::resolve_work_dir(cli.work_dir.as_deref());

    match cli.command {
        Commands::Validate { file } => {
            commands::validate::handle(&output, file)?;
        }
        Commands::Graph { file } => {
            commands::graph::handle(&output, file)?;
        }
        Commands::Deploy {
            name,
            file,
            env_file,
            env,
            validate_only,
        } => {
            let options = commands::deploy::DeployOptions {
                name,
                file,
                env_file,
                env_vars: env.into_iter().collect(),
                validate_only,
            };
            commands::deploy::handle(&output, &work_dir, options).await?;
        }
        Commands::Stop { name } => {
            commands::stack::handle_stop(&output, &work_dir, &name).await?;
        }
        Commands::Rm { name, volumes } => {
            commands::stack::handle_remove(&output, &work_dir, &name, volumes).await?;
        }
        Commands::Status { name } => {
            commands::stack::handle_status(&output, &work_dir, &name).await?;
        }
        Commands::Ls => {
            commands::stack::handle_list(&output, &work_dir).await?;
        }
        Commands::Env(env_cmd) => match env_cmd {
            EnvCommands::Validate { path } => {
                commands::env::handle_validate(&output, &path)?;
            }
            EnvCommands::Diff { old, new } => {
                commands::env::handle_diff(&output, &old, &new)?;
            }
            EnvCommands::Template { file, output: dest } => {
                commands::env::handle_template(file, dest)?;
            }
            EnvCommands::Merge { files, output: dest } => {
                commands::env::handle_merge(&files, dest)?;
            }
            EnvCommands::Substitute { input, env_file } => {
                commands::env::handle_substitute(&input, &env_file)?;
            }
        },
        Commands::Version => {
            println!("stackflow {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
