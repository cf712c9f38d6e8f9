use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::problems::ProblemKind;

/// clapでコマンドラインの構造を定義します。
#[derive(Parser, Debug)]
#[command(author, version, about = "Elliptic PDE solver with physics-informed neural networks (Burn)", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 実行するサブコマンドを定義します（train または infer）。
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 境界・内部のサブネットワークを学習し、結果をディレクトリに保存します
    Train(TrainArgs),
    /// 保存されたサブネットワークを読み込み、参照点上の誤差を評価します
    Infer(InferArgs),
}

/// `train` サブコマンドの引数。
#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// 解く問題
    #[arg(long, value_enum, default_value_t = ProblemKind::Smooth)]
    pub problem: ProblemKind,
    /// 空間次元（high-dimension のみ有効）
    #[arg(long, default_value_t = 2)]
    pub dim: usize,
    /// 学習の反復回数
    #[arg(long, default_value_t = 1000)]
    pub iterations: usize,
    /// 学習設定の JSON ファイル（省略時は既定値）
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// 乱数シード（設定ファイルの値を上書きします）
    #[arg(long)]
    pub seed: Option<u64>,
    /// 学習結果を保存するディレクトリ
    #[arg(long, default_value = "runs/latest")]
    pub output: PathBuf,
}

/// `infer` サブコマンドの引数。
#[derive(Args, Debug, Clone)]
pub struct InferArgs {
    /// `train` が保存したディレクトリ
    #[arg(long, default_value = "runs/latest")]
    pub run: PathBuf,
    /// 参照グリッドの解像度（省略時は学習時の値）
    #[arg(long)]
    pub resolution: Option<usize>,
}
