use std::path::Path;
use std::time::Instant;

use anyhow::{Context, anyhow, bail};
use burn::backend::NdArray;
use burn::module::Module;
use burn::prelude::{Backend, Config};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};

use crate::cli::InferArgs;
use crate::diagnostics;
use crate::model::{ParamStore, Scope};
use crate::problem::{Formulation, Problem};
use crate::problems::{
    HighDimension, Peak, PeakBoundary, ProblemKind, Singularity, SingularityBoundary, Smooth,
    SmoothBoundary,
};
use crate::training::RunConfig;
use crate::{BOUNDARY_MODEL_FILENAME, INNER_MODEL_FILENAME, RUN_CONFIG_FILENAME};

type MyBackend = NdArray<f64>;

/// 参照点上の評価結果。
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub n_points: usize,
    pub l2_error: f64,
    pub max_residual: f64,
}

/// `infer`サブコマンドを実行します。
pub fn run(args: &InferArgs) -> anyhow::Result<()> {
    let device = Default::default();

    let config_path = args.run.join(RUN_CONFIG_FILENAME);
    if !config_path.exists() {
        bail!(
            "実行設定 '{}' が見つかりません。\n最初に 'train' コマンドでモデルを学習・保存してください。",
            config_path.display()
        );
    }
    let run_config = RunConfig::load(&config_path)
        .map_err(|e| anyhow!("実行設定 '{}' の読み込みに失敗しました: {e}", config_path.display()))?;
    let resolution = args
        .resolution
        .unwrap_or(run_config.training.reference_resolution);

    println!("\n推論を実行します - バックエンド: NdArray<f64> (CPU)");
    let inference_start = Instant::now();

    let report = match run_config.problem {
        ProblemKind::Smooth => {
            evaluate_run::<MyBackend, _>(&Smooth, &run_config, &args.run, resolution, &device)
        }
        ProblemKind::SmoothBoundary => evaluate_run::<MyBackend, _>(
            &SmoothBoundary,
            &run_config,
            &args.run,
            resolution,
            &device,
        ),
        ProblemKind::Peak => evaluate_run::<MyBackend, _>(
            &Peak::default(),
            &run_config,
            &args.run,
            resolution,
            &device,
        ),
        ProblemKind::Singularity => evaluate_run::<MyBackend, _>(
            &Singularity::default(),
            &run_config,
            &args.run,
            resolution,
            &device,
        ),
        ProblemKind::PeakBoundary => evaluate_run::<MyBackend, _>(
            &PeakBoundary::default(),
            &run_config,
            &args.run,
            resolution,
            &device,
        ),
        ProblemKind::SingularityBoundary => evaluate_run::<MyBackend, _>(
            &SingularityBoundary::default(),
            &run_config,
            &args.run,
            resolution,
            &device,
        ),
        ProblemKind::HighDimension => evaluate_run::<MyBackend, _>(
            &HighDimension::new(run_config.dim),
            &run_config,
            &args.run,
            resolution,
            &device,
        ),
    }?;
    let inference_duration = inference_start.elapsed();

    println!(
        "推論が完了しました。参照点数: {}, L2 誤差: {:.6e}, 最大残差 |Δu - f|: {:.6e}",
        report.n_points, report.l2_error, report.max_residual
    );
    println!("=> 推論時間: {:.2?}", inference_duration);

    Ok(())
}

/// 保存済みのサブネットワークを読み込み、参照点上の誤差を評価します。
pub fn evaluate_run<B: Backend, P: Problem>(
    problem: &P,
    run_config: &RunConfig,
    dir: &Path,
    resolution: usize,
    device: &B::Device,
) -> anyhow::Result<Report> {
    let params = load_params::<B, P>(problem, run_config, dir, device)?;
    let points = problem.reference_points(resolution);

    let l2_error = diagnostics::l2_error(problem, &params, &points, device)?;
    let max_residual = diagnostics::pointwise_residual(problem, &params, &points, device)?
        .into_iter()
        .fold(0.0, f64::max);

    Ok(Report {
        n_points: points.len(),
        l2_error,
        max_residual,
    })
}

/// `train` が保存したサブネットワークをパラメータストアに読み込みます。
pub fn load_params<B: Backend, P: Problem>(
    problem: &P,
    run_config: &RunConfig,
    dir: &Path,
    device: &B::Device,
) -> anyhow::Result<ParamStore<B>> {
    let net_config = run_config.training.net_config(problem.dim());
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

    let mut scopes = vec![(Scope::Inner, INNER_MODEL_FILENAME)];
    if problem.formulation() == Formulation::TrainedBoundary {
        scopes.push((Scope::Boundary, BOUNDARY_MODEL_FILENAME));
    }

    let mut params = ParamStore::new();
    for (scope, filename) in scopes {
        let path = dir.join(filename);
        println!("保存済みモデル '{}' を '{}' からロード中...", scope, path.display());
        let net = net_config
            .init::<B>(device)
            .load_file(path.clone(), &recorder, device)
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("モデル '{}' の読み込みに失敗しました", path.display()))?;
        params.insert(scope, net)?;
    }
    Ok(params)
}
