//! 学習ループ全体を通した結合テスト。

use burn::backend::{Autodiff, NdArray};
use burn::prelude::{Backend, Config};
use burn::tensor::Tensor;
use rand::SeedableRng;
use rand::rngs::StdRng;

use pinn_elliptic::cli::TrainArgs;
use pinn_elliptic::error::{PdeError, Result};
use pinn_elliptic::inference;
use pinn_elliptic::model::Scope;
use pinn_elliptic::problem::{Formulation, Problem};
use pinn_elliptic::jet::Field;
use pinn_elliptic::problems::{
    HighDimension, Peak, PeakBoundary, ProblemKind, Singularity, SingularityBoundary, Smooth,
    SmoothBoundary,
};
use pinn_elliptic::sampling::{self, PointBatch};
use pinn_elliptic::training::{RunConfig, Trainer, TrainingConfig};
use pinn_elliptic::{BOUNDARY_MODEL_FILENAME, INNER_MODEL_FILENAME, RUN_CONFIG_FILENAME};

type TestBackend = Autodiff<NdArray<f64>>;

fn small_config(seed: u64) -> TrainingConfig {
    let mut config = TrainingConfig::new()
        .with_batch_size(32)
        .with_n_layers(2)
        .with_width(32)
        .with_reference_resolution(10)
        .with_log_interval(0);
    config.seed = Some(seed);
    config
}

fn trainer<P: Problem>(problem: P, config: TrainingConfig) -> Trainer<TestBackend, P> {
    Trainer::new(config, problem, Default::default()).unwrap()
}

/// 指定スコープのネットワーク出力（パラメータの指紋として使う）。
fn outputs<P: Problem>(
    trainer: &Trainer<TestBackend, P>,
    scope: Scope,
    points: &PointBatch,
) -> Vec<f64> {
    let params = trainer.params().valid();
    let x = points.to_tensor::<NdArray<f64>>(&Default::default());
    params
        .bind(scope)
        .unwrap()
        .forward(x)
        .into_data()
        .to_vec::<f64>()
        .unwrap()
}

#[test]
fn every_history_has_one_entry_per_iteration() {
    let mut trainer = trainer(SmoothBoundary, small_config(10));
    for _ in 0..4 {
        trainer.step().unwrap();
    }
    let history = trainer.history();
    assert_eq!(history.len(), 4);
    assert_eq!(history.boundary_loss().len(), 4);
    assert_eq!(history.interior_loss().len(), 4);
    assert_eq!(history.l2_error().len(), 4);
    assert!(history.l2_error().iter().all(|e| e.is_finite() && *e >= 0.0));
    assert!(history.boundary_loss().iter().all(|e| *e > 0.0));
}

#[test]
fn boundary_fit_leaves_inner_parameters_untouched() {
    let mut trainer = trainer(SmoothBoundary, small_config(11));
    let probe = sampling::uniform(&mut StdRng::seed_from_u64(0), 8, 2);
    let edges = sampling::boundary(&mut StdRng::seed_from_u64(1), 16, 2);

    let inner_before = outputs(&trainer, Scope::Inner, &probe);
    let boundary_before = outputs(&trainer, Scope::Boundary, &probe);
    trainer.fit_boundary(&edges).unwrap();

    assert_eq!(outputs(&trainer, Scope::Inner, &probe), inner_before);
    assert_ne!(outputs(&trainer, Scope::Boundary, &probe), boundary_before);
}

#[test]
fn interior_fit_leaves_boundary_parameters_untouched() {
    let mut trainer = trainer(SmoothBoundary, small_config(12));
    let probe = sampling::uniform(&mut StdRng::seed_from_u64(0), 8, 2);
    let interior = sampling::uniform(&mut StdRng::seed_from_u64(2), 32, 2);

    let inner_before = outputs(&trainer, Scope::Inner, &probe);
    let boundary_before = outputs(&trainer, Scope::Boundary, &probe);
    trainer.fit_interior(&interior).unwrap();

    assert_eq!(outputs(&trainer, Scope::Boundary, &probe), boundary_before);
    assert_ne!(outputs(&trainer, Scope::Inner, &probe), inner_before);
}

#[test]
fn boundary_loss_decreases_on_fixed_batch() {
    let mut trainer = trainer(SmoothBoundary, small_config(13));
    let edges = sampling::boundary(&mut StdRng::seed_from_u64(3), 16, 2);

    let initial = trainer.boundary_loss_on(&edges).unwrap();
    for _ in 0..4 {
        trainer.fit_boundary(&edges).unwrap();
    }
    let after = trainer.boundary_loss_on(&edges).unwrap();
    assert!(after < initial, "initial = {initial}, after = {after}");
}

#[test]
fn boundary_fit_is_skipped_below_tolerance() {
    let config = small_config(14).with_boundary_tolerance(f64::INFINITY);
    let mut trainer = trainer(SmoothBoundary, config);
    let probe = sampling::uniform(&mut StdRng::seed_from_u64(0), 8, 2);
    let edges = sampling::boundary(&mut StdRng::seed_from_u64(4), 16, 2);

    let before = outputs(&trainer, Scope::Boundary, &probe);
    let loss = trainer.fit_boundary(&edges).unwrap();
    assert_eq!(loss, trainer.boundary_loss_on(&edges).unwrap());
    assert_eq!(outputs(&trainer, Scope::Boundary, &probe), before);
}

#[test]
fn lifted_solution_is_exact_on_boundary_throughout_training() {
    let mut trainer = trainer(Smooth, small_config(15));
    let edges = sampling::boundary(&mut StdRng::seed_from_u64(5), 16, 2);

    for _ in 0..3 {
        let values = trainer.evaluate(&edges).unwrap();
        let exact = Smooth.exact_field(&edges);
        for (u, g) in values.iter().zip(&exact) {
            assert!((u - g).abs() < 1e-12, "u = {u}, g = {g}");
        }
        trainer.step().unwrap();
    }
}

fn assert_finite_history<P: Problem>(trainer: &Trainer<TestBackend, P>, len: usize) {
    let history = trainer.history();
    assert_eq!(history.len(), len);
    for series in [history.boundary_loss(), history.interior_loss(), history.l2_error()] {
        let name = trainer.problem().name();
        assert!(series.iter().all(|v| v.is_finite()), "{name}: {series:?}");
    }
}

#[test]
fn lifted_peak_and_singularity_are_exact_on_boundary() {
    let edges = sampling::boundary(&mut StdRng::seed_from_u64(7), 16, 2);

    let mut peak = trainer(Peak::default(), small_config(21));
    let mut singularity = trainer(Singularity::default(), small_config(22));
    for _ in 0..3 {
        let exact = Peak::default().exact_field(&edges);
        for (u, g) in peak.evaluate(&edges).unwrap().iter().zip(exact) {
            assert!((u - g).abs() < 1e-12, "peak: u = {u}, g = {g}");
        }
        let exact = Singularity::default().exact_field(&edges);
        for (u, g) in singularity.evaluate(&edges).unwrap().iter().zip(exact) {
            assert!((u - g).abs() < 1e-12, "singularity: u = {u}, g = {g}");
        }
        peak.step().unwrap();
        singularity.step().unwrap();
    }
    assert_finite_history(&peak, 3);
    assert_finite_history(&singularity, 3);
}

#[test]
fn peak_boundary_trains_with_refinement_grid() {
    let mut trainer = trainer(PeakBoundary::default(), small_config(23));
    for _ in 0..3 {
        let stats = trainer.step().unwrap();
        assert_eq!(stats.interior_points, 32 + 25);
        assert!(stats.boundary_loss > 0.0);
    }
    assert_finite_history(&trainer, 3);
}

#[test]
fn singularity_boundary_trains_with_clipped_loss() {
    let mut trainer = trainer(SingularityBoundary::default(), small_config(24));
    for _ in 0..3 {
        let stats = trainer.step().unwrap();
        assert_eq!(stats.interior_points, 32);
    }
    assert_finite_history(&trainer, 3);
}

/// 右辺が単位正方形の外（`x > 2`）でだけ大きく、その外側に細分点を一つ持つ問題。
struct Offsite;

impl Problem for Offsite {
    fn name(&self) -> &str {
        "offsite"
    }

    fn dim(&self) -> usize {
        2
    }

    fn formulation(&self) -> Formulation {
        Formulation::Lifted
    }

    fn exact_solution(&self, _point: &[f64]) -> f64 {
        0.0
    }

    fn forcing<B: Backend>(&self, points: Tensor<B, 2>) -> Tensor<B, 1> {
        let n = points.dims()[0];
        points
            .slice([0..n, 0..1])
            .reshape([n])
            .greater_elem(2.0)
            .float()
            .mul_scalar(1e6)
    }

    fn boundary_lift<B: Backend, F: Field<B>>(&self, coords: &[F]) -> Result<F> {
        Ok(coords[0].constant_like(0.0))
    }

    fn refinement_points(&self) -> Option<PointBatch> {
        PointBatch::new(2, vec![3.0, 3.0]).ok()
    }
}

#[test]
fn refinement_points_enter_interior_loss() {
    let mut trainer = trainer(Offsite, small_config(25));
    let stats = trainer.step().unwrap();
    assert_eq!(stats.interior_points, 33);
    // 単位正方形内では右辺が 0 なので、大きな損失は細分点からしか生じない
    assert!(stats.interior_loss > 1e10, "loss = {}", stats.interior_loss);

    let uniform_only = sampling::uniform(&mut StdRng::seed_from_u64(8), 32, 2);
    let loss = trainer.fit_interior(&uniform_only).unwrap();
    assert!(loss < 1e10, "loss = {loss}");
}

#[test]
fn short_run_reduces_l2_error() {
    let config = small_config(16).with_batch_size(64).with_width(64);
    let mut trainer = trainer(Smooth, config);
    let first = trainer.step().unwrap().l2_error;
    for _ in 0..150 {
        trainer.step().unwrap();
    }
    let last = *trainer.history().l2_error().last().unwrap();
    assert!(last < first, "first = {first}, last = {last}");
}

#[test]
#[ignore = "1000 反復の学習（数分かかる）"]
fn smooth_problem_converges_on_reference_grid() {
    let mut config = TrainingConfig::new().with_log_interval(100);
    config.seed = Some(17);
    let mut trainer = trainer(Smooth, config);
    assert_eq!(trainer.reference_points().len(), 2500);
    for _ in 0..1000 {
        trainer.step().unwrap();
    }
    let last = *trainer.history().l2_error().last().unwrap();
    assert!(last < 0.05, "L2 = {last}");
}

#[test]
fn high_dimensional_problem_trains_with_center_reference() {
    let mut trainer = trainer(HighDimension::new(5), small_config(18));
    assert_eq!(trainer.reference_points().len(), 1);
    assert_eq!(trainer.reference_points().dim(), 5);

    let stats = trainer.step().unwrap();
    assert!(stats.l2_error.is_finite());
    assert!(stats.boundary_loss > 0.0);

    let edges = sampling::boundary(&mut StdRng::seed_from_u64(6), 4, 5);
    assert_eq!(edges.len(), 40);
    assert_eq!(trainer.pointwise_residual(&edges).unwrap().len(), 40);
}

/// 境界値を与え忘れた境界学習形式の問題。
struct MissingBoundary;

impl Problem for MissingBoundary {
    fn name(&self) -> &str {
        "missing-boundary"
    }

    fn dim(&self) -> usize {
        2
    }

    fn formulation(&self) -> Formulation {
        Formulation::TrainedBoundary
    }

    fn exact_solution(&self, _point: &[f64]) -> f64 {
        0.0
    }

    fn forcing<B: Backend>(&self, points: Tensor<B, 2>) -> Tensor<B, 1> {
        Tensor::zeros([points.dims()[0]], &points.device())
    }
}

#[test]
fn missing_boundary_hook_surfaces_as_error() {
    let mut trainer = trainer(MissingBoundary, small_config(19));
    let result: Result<_> = trainer.step();
    match result {
        Err(PdeError::UnimplementedHook { problem, hook }) => {
            assert_eq!(problem, "missing-boundary");
            assert_eq!(hook, "boundary_value");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(trainer.history().is_empty());
}

#[test]
fn saved_run_can_be_reloaded_for_inference() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("training.json");
    small_config(20).save(&config_path).unwrap();
    let output = dir.path().join("run");

    let args = TrainArgs {
        problem: ProblemKind::SmoothBoundary,
        dim: 2,
        iterations: 3,
        config: Some(config_path),
        seed: None,
        output: output.clone(),
    };
    pinn_elliptic::training::run(&args).unwrap();

    assert!(output.join(RUN_CONFIG_FILENAME).exists());
    assert!(output.join(INNER_MODEL_FILENAME).exists());
    assert!(output.join(BOUNDARY_MODEL_FILENAME).exists());

    let run_config = RunConfig::load(output.join(RUN_CONFIG_FILENAME)).unwrap();
    assert_eq!(run_config.problem, ProblemKind::SmoothBoundary);
    assert_eq!(run_config.iterations, 3);
    assert_eq!(run_config.training.width, 32);
    assert_eq!(run_config.training.seed, Some(20));

    let device = Default::default();
    let report = inference::evaluate_run::<NdArray<f64>, _>(
        &SmoothBoundary,
        &run_config,
        &output,
        6,
        &device,
    )
    .unwrap();
    assert_eq!(report.n_points, 36);
    assert!(report.l2_error.is_finite());
    assert!(report.max_residual.is_finite());

    let params =
        inference::load_params::<NdArray<f64>, _>(&SmoothBoundary, &run_config, &output, &device)
            .unwrap();
    assert!(params.contains(Scope::Inner));
    assert!(params.contains(Scope::Boundary));
}
