//! # 楕円型 PDE の PINN ソルバー
//!
//! `clap` クレートを利用して、コマンドラインから`train`（学習）と`infer`（推論）の
//! 機能を個別に実行できます。ログの詳細度は `RUST_LOG` で変更できます。
//!
//! ## 使い方
//!
//! ### 学習
//! ```bash
//! cargo run --release -- train --problem smooth-boundary --iterations 1000
//! ```
//!
//! ### 推論
//! ```bash
//! cargo run --release -- infer --run runs/latest
//! ```

use clap::Parser;
use pinn_elliptic::cli::{Cli, Commands};
use pinn_elliptic::{inference, training};
use tracing_subscriber::EnvFilter;

/// プログラムのエントリーポイント。
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Train(args) => training::run(args),
        Commands::Infer(args) => inference::run(args),
    }
}
