//! # 段階的な学習ループ
//!
//! 反復ごとに「境界ネットワークの短い最小化（最大 5 ステップ）」と
//! 「内部ネットワークの 1 ステップ」を交互に行い、診断値の履歴を記録します。

use std::path::Path;
use std::time::Instant;

use anyhow::anyhow;
use burn::backend::{Autodiff, NdArray};
use burn::module::Module;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::Config;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::cli::TrainArgs;
use crate::diagnostics::{self, scalar};
use crate::error::{PdeError, Result};
use crate::jet::Jet;
use crate::model::{DenseNet, DenseNetConfig, ParamStore, Scope};
use crate::pinn;
use crate::problem::{Formulation, Problem};
use crate::problems::{
    HighDimension, Peak, PeakBoundary, ProblemKind, Singularity, SingularityBoundary, Smooth,
    SmoothBoundary,
};
use crate::sampling::{self, PointBatch};
use crate::{BOUNDARY_MODEL_FILENAME, INNER_MODEL_FILENAME, RUN_CONFIG_FILENAME};

type MyBackend = Autodiff<NdArray<f64>>;

/// サブネットワーク一つ分の Adam 最適化器。
pub type SubnetOptimizer<B> = OptimizerAdaptor<Adam, DenseNet<B>, B>;

/// 学習の設定。
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// 内部点のバッチサイズ。境界点は各面にこの数だけ生成します。
    #[config(default = 64)]
    pub batch_size: usize,
    /// 各サブネットワークの隠れ層の数。
    #[config(default = 3)]
    pub n_layers: usize,
    /// 隠れ層の幅。
    #[config(default = 256)]
    pub width: usize,
    /// L2 誤差を評価する参照グリッドの解像度（2 次元では `n × n`）。
    #[config(default = 50)]
    pub reference_resolution: usize,
    /// Adam の学習率（境界・内部共通）。
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    /// 1 反復あたりの境界ネットワークの最適化ステップ数。
    #[config(default = 5)]
    pub boundary_steps: usize,
    /// 境界損失がこの値以下なら境界ネットワークの最適化を省略します。
    #[config(default = 1e-5)]
    pub boundary_tolerance: f64,
    /// Adam の数値安定化項。
    #[config(default = 1e-8)]
    pub adam_epsilon: f32,
    /// 進捗を出力する間隔（0 で出力しない）。
    #[config(default = 10)]
    pub log_interval: usize,
    /// 点サンプリングの乱数シード。省略時は OS の乱数源を使います。
    pub seed: Option<u64>,
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PdeError::InvalidConfig("batch_size は 1 以上が必要です".to_string()));
        }
        if self.width == 0 {
            return Err(PdeError::InvalidConfig("width は 1 以上が必要です".to_string()));
        }
        if self.reference_resolution == 0 {
            return Err(PdeError::InvalidConfig(
                "reference_resolution は 1 以上が必要です".to_string(),
            ));
        }
        Ok(())
    }

    /// 空間次元 `dim` 用のサブネットワーク構成。
    pub fn net_config(&self, dim: usize) -> DenseNetConfig {
        DenseNetConfig::new(dim)
            .with_n_hidden_layers(self.n_layers)
            .with_width(self.width)
    }
}

/// 学習結果と一緒に保存する実行設定。推論時に同じ問題を再構築するのに使います。
#[derive(Config, Debug)]
pub struct RunConfig {
    pub problem: ProblemKind,
    pub dim: usize,
    pub iterations: usize,
    pub training: TrainingConfig,
}

/// 1 反復分の診断値。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    pub iteration: usize,
    /// 内部損失の評価に使った点の数（細分点を含む）。
    pub interior_points: usize,
    pub boundary_loss: f64,
    pub interior_loss: f64,
    pub l2_error: f64,
}

/// 境界損失・内部損失・L2 誤差の履歴。反復ごとに末尾へ追加されるだけです。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    boundary_loss: Vec<f64>,
    interior_loss: Vec<f64>,
    l2_error: Vec<f64>,
}

impl History {
    fn record(&mut self, stats: &IterationStats) {
        self.boundary_loss.push(stats.boundary_loss);
        self.interior_loss.push(stats.interior_loss);
        self.l2_error.push(stats.l2_error);
    }

    pub fn boundary_loss(&self) -> &[f64] {
        &self.boundary_loss
    }

    pub fn interior_loss(&self) -> &[f64] {
        &self.interior_loss
    }

    pub fn l2_error(&self) -> &[f64] {
        &self.l2_error
    }

    pub fn len(&self) -> usize {
        self.l2_error.len()
    }

    pub fn is_empty(&self) -> bool {
        self.l2_error.is_empty()
    }
}

/// 一つの問題に対する学習セッション。
///
/// パラメータの唯一の所有者で、反復は `step` の呼び出しで逐次に進みます。
/// 終了判定は持たず、反復回数は呼び出し側が決めます。
pub struct Trainer<B: AutodiffBackend, P: Problem> {
    config: TrainingConfig,
    problem: P,
    params: ParamStore<B>,
    boundary_optim: SubnetOptimizer<B>,
    inner_optim: SubnetOptimizer<B>,
    reference: PointBatch,
    history: History,
    rng: StdRng,
    device: B::Device,
    iteration: usize,
}

impl<B: AutodiffBackend, P: Problem> Trainer<B, P> {
    /// サブネットワークを初期化して学習セッションを作ります。
    ///
    /// 内部ネットワークは常に、境界ネットワークは境界学習形式のときだけ作成します。
    pub fn new(config: TrainingConfig, problem: P, device: B::Device) -> Result<Self> {
        config.validate()?;
        if problem.dim() == 0 {
            return Err(PdeError::InvalidConfig("空間次元は 1 以上が必要です".to_string()));
        }

        let net_config = config.net_config(problem.dim());
        let mut params = ParamStore::new();
        params.define(Scope::Inner, &net_config, &device)?;
        if problem.formulation() == Formulation::TrainedBoundary {
            params.define(Scope::Boundary, &net_config, &device)?;
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let reference = problem.reference_points(config.reference_resolution);
        let adam = AdamConfig::new().with_epsilon(config.adam_epsilon);

        Ok(Self {
            config,
            problem,
            params,
            boundary_optim: adam.init(),
            inner_optim: adam.init(),
            reference,
            history: History::default(),
            rng,
            device,
            iteration: 0,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn problem(&self) -> &P {
        &self.problem
    }

    pub fn params(&self) -> &ParamStore<B> {
        &self.params
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// 完了した反復の数。
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn reference_points(&self) -> &PointBatch {
        &self.reference
    }

    /// 学習を 1 反復進めます。
    ///
    /// 1. 境界点をサンプリングし、境界損失が許容値を超えていれば境界ネットワークを最適化
    /// 2. 内部点をサンプリング（問題によっては固定の細分点を追加）
    /// 3. 内部ネットワークを 1 ステップ最適化
    /// 4. 境界損失・内部損失・L2 誤差を履歴に追加
    pub fn step(&mut self) -> Result<IterationStats> {
        let dim = self.problem.dim();
        let batch_size = self.config.batch_size;

        let boundary_loss = match self.problem.formulation() {
            Formulation::Lifted => 0.0,
            Formulation::TrainedBoundary => {
                let points = sampling::boundary(&mut self.rng, batch_size, dim);
                self.fit_boundary(&points)?
            }
        };

        let mut points = sampling::uniform(&mut self.rng, batch_size, dim);
        if let Some(extra) = self.problem.refinement_points() {
            points = points.concat(&extra)?;
        }
        let interior_loss = self.fit_interior(&points)?;
        let l2_error = self.l2_error()?;

        let stats = IterationStats {
            iteration: self.iteration,
            interior_points: points.len(),
            boundary_loss,
            interior_loss,
            l2_error,
        };
        self.history.record(&stats);

        if self.config.log_interval > 0 && self.iteration % self.config.log_interval == 0 {
            tracing::info!(
                iteration = self.iteration,
                boundary_loss,
                interior_loss,
                l2_error,
                "Iteration={}, bloss={:.6e}, loss={:.6e}, L2={:.6e}",
                self.iteration,
                boundary_loss,
                interior_loss,
                l2_error
            );
        }
        self.iteration += 1;

        Ok(stats)
    }

    /// 与えられた境界点で境界ネットワークを最適化し、最後に評価した境界損失を返します。
    ///
    /// 損失が閾値以下なら更新を行いません。閾値は問題が指定すればそれを、
    /// 指定しなければ `boundary_tolerance` を使います。
    /// それ以外は同じ点集合に対して `boundary_steps` 回 Adam を適用します。
    pub fn fit_boundary(&mut self, points: &PointBatch) -> Result<f64> {
        let mut loss = self.boundary_loss_on(points)?;
        let tolerance = self
            .problem
            .boundary_tolerance()
            .unwrap_or(self.config.boundary_tolerance);
        if loss <= tolerance {
            tracing::debug!(
                iteration = self.iteration,
                loss,
                "境界損失が許容値以下のため更新を省略します"
            );
            return Ok(loss);
        }

        let x = points.to_tensor::<B>(&self.device);
        for _ in 0..self.config.boundary_steps {
            let net = self.params.bind(Scope::Boundary)?;
            let loss_tensor = pinn::boundary_loss(&self.problem, net, x.clone())?;
            loss = scalar(loss_tensor.clone());
            self.update(Scope::Boundary, loss_tensor.backward())?;
        }
        Ok(loss)
    }

    /// 与えられた内部点で内部ネットワークを 1 ステップ最適化し、更新前の内部損失を返します。
    pub fn fit_interior(&mut self, points: &PointBatch) -> Result<f64> {
        let x = points.to_tensor::<B>(&self.device);
        let solution: Jet<B> = pinn::assemble(&self.problem, &self.params, x.clone())?;
        let loss = pinn::interior_loss(&self.problem, &solution, x)?;
        let value = scalar(loss.clone());
        self.update(Scope::Inner, loss.backward())?;
        Ok(value)
    }

    /// 指定したスコープのパラメータだけを更新します。
    fn update(&mut self, scope: Scope, grads: B::Gradients) -> Result<()> {
        let net = self.params.take(scope)?;
        let grads = GradientsParams::from_grads(grads, &net);
        let lr = self.config.learning_rate;
        let net = match scope {
            Scope::Boundary => self.boundary_optim.step(lr, net, grads),
            Scope::Inner => self.inner_optim.step(lr, net, grads),
        };
        self.params.put(scope, net);
        Ok(())
    }

    /// 現在のパラメータでの境界損失。
    pub fn boundary_loss_on(&self, points: &PointBatch) -> Result<f64> {
        let params = self.params.valid();
        let x = points.to_tensor::<B::InnerBackend>(&self.device);
        let loss = pinn::boundary_loss(&self.problem, params.bind(Scope::Boundary)?, x)?;
        Ok(scalar(loss))
    }

    /// 合成解の値。
    pub fn evaluate(&self, points: &PointBatch) -> Result<Vec<f64>> {
        diagnostics::evaluate(&self.problem, &self.params.valid(), points, &self.device)
    }

    /// 各点の `|Δu - f|`。
    pub fn pointwise_residual(&self, points: &PointBatch) -> Result<Vec<f64>> {
        diagnostics::pointwise_residual(&self.problem, &self.params.valid(), points, &self.device)
    }

    /// 構築時に固定した参照点上の L2 誤差。
    pub fn l2_error(&self) -> Result<f64> {
        diagnostics::l2_error(&self.problem, &self.params.valid(), &self.reference, &self.device)
    }
}

/// `train` サブコマンドを実行します。
pub fn run(args: &TrainArgs) -> anyhow::Result<()> {
    let device = Default::default();

    let mut training = match &args.config {
        Some(path) => TrainingConfig::load(path).map_err(|e| {
            anyhow!("設定ファイル '{}' の読み込みに失敗しました: {e}", path.display())
        })?,
        None => TrainingConfig::new(),
    };
    if args.seed.is_some() {
        training.seed = args.seed;
    }
    let run_config = RunConfig::new(args.problem, args.dim, args.iterations, training);

    match args.problem {
        ProblemKind::Smooth => train_problem(Smooth, &run_config, &args.output, &device),
        ProblemKind::SmoothBoundary => {
            train_problem(SmoothBoundary, &run_config, &args.output, &device)
        }
        ProblemKind::Peak => {
            train_problem(Peak::default(), &run_config, &args.output, &device)
        }
        ProblemKind::Singularity => {
            train_problem(Singularity::default(), &run_config, &args.output, &device)
        }
        ProblemKind::PeakBoundary => {
            train_problem(PeakBoundary::default(), &run_config, &args.output, &device)
        }
        ProblemKind::SingularityBoundary => {
            train_problem(SingularityBoundary::default(), &run_config, &args.output, &device)
        }
        ProblemKind::HighDimension => train_problem(
            HighDimension::new(args.dim),
            &run_config,
            &args.output,
            &device,
        ),
    }
}

fn train_problem<P: Problem>(
    problem: P,
    run_config: &RunConfig,
    output: &Path,
    device: &<MyBackend as burn::prelude::Backend>::Device,
) -> anyhow::Result<()> {
    let mut trainer =
        Trainer::<MyBackend, P>::new(run_config.training.clone(), problem, device.clone())?;

    tracing::info!(
        problem = trainer.problem().name(),
        dim = trainer.problem().dim(),
        iterations = run_config.iterations,
        "学習を開始します - バックエンド: NdArray<f64> (CPU)"
    );
    let training_start = Instant::now();
    for _ in 0..run_config.iterations {
        trainer.step()?;
    }
    let training_duration = training_start.elapsed();

    let history = trainer.history();
    println!("学習が完了しました。");
    println!("=> 学習時間: {:.2?}", training_duration);
    if let (Some(bloss), Some(loss), Some(l2)) = (
        history.boundary_loss().last(),
        history.interior_loss().last(),
        history.l2_error().last(),
    ) {
        println!("=> 最終境界損失: {bloss:.6e}, 最終内部損失: {loss:.6e}, L2 誤差: {l2:.6e}");
    }

    save_run(&trainer, run_config, output)?;
    println!("=> 学習結果を '{}' に保存しました。", output.display());
    Ok(())
}

/// 実行設定とサブネットワークを保存します。
fn save_run<P: Problem>(
    trainer: &Trainer<MyBackend, P>,
    run_config: &RunConfig,
    output: &Path,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(output)?;
    run_config.save(output.join(RUN_CONFIG_FILENAME))?;

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    for (scope, filename) in [
        (Scope::Inner, INNER_MODEL_FILENAME),
        (Scope::Boundary, BOUNDARY_MODEL_FILENAME),
    ] {
        if let Ok(net) = trainer.params().bind(scope) {
            net.clone()
                .save_file(output.join(filename), &recorder)
                .map_err(|e| anyhow!("スコープ '{scope}' の保存に失敗しました: {e}"))?;
        }
    }
    Ok(())
}
