//! 単位正方形・単位超立方体上の問題インスタンス集。

use std::f64::consts::PI;

use burn::prelude::Backend;
use burn::tensor::Tensor;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::jet::{Field, columns, powf};
use crate::problem::{Formulation, InteriorLoss, Problem};
use crate::sampling::{self, PointBatch};

/// コマンドラインから選べる問題の種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum ProblemKind {
    /// 滑らかな解、境界リフト形式
    Smooth,
    /// 滑らかな解、境界ネットワーク形式
    SmoothBoundary,
    /// 中心に鋭いピークを持つ解、境界リフト形式
    Peak,
    /// 中心に鋭いピークを持つ解、境界ネットワーク形式
    PeakBoundary,
    /// `x = 0` で二階微分が発散する境界層、境界リフト形式
    Singularity,
    /// `y = 0` で二階微分が発散する境界層、境界ネットワーク形式
    SingularityBoundary,
    /// N 次元の正弦積、境界ネットワーク形式
    HighDimension,
}

/// `Δu = -2π² sin(πx) sin(πy)`、境界値 0。解は `sin(πx) sin(πy)`。
///
/// 境界リフト `A = 0` と `B = x(1-x)y(1-y)` により境界条件を厳密に満たします。
#[derive(Debug, Clone, Copy, Default)]
pub struct Smooth;

impl Problem for Smooth {
    fn name(&self) -> &str {
        "smooth"
    }

    fn dim(&self) -> usize {
        2
    }

    fn formulation(&self) -> Formulation {
        Formulation::Lifted
    }

    fn exact_solution(&self, p: &[f64]) -> f64 {
        (PI * p[0]).sin() * (PI * p[1]).sin()
    }

    fn forcing<B: Backend>(&self, points: Tensor<B, 2>) -> Tensor<B, 1> {
        let x = columns(&points);
        let u = x[0].clone().mul_scalar(PI).sin() * x[1].clone().mul_scalar(PI).sin();
        u.mul_scalar(-2.0 * PI * PI)
    }

    fn boundary_lift<B: Backend, F: Field<B>>(&self, coords: &[F]) -> Result<F> {
        Ok(coords[0].constant_like(0.0))
    }
}

/// [`Smooth`] と同じ方程式を、境界ネットワークを学習して解きます。
#[derive(Debug, Clone, Copy, Default)]
pub struct SmoothBoundary;

impl Problem for SmoothBoundary {
    fn name(&self) -> &str {
        "smooth-boundary"
    }

    fn dim(&self) -> usize {
        2
    }

    fn formulation(&self) -> Formulation {
        Formulation::TrainedBoundary
    }

    fn exact_solution(&self, p: &[f64]) -> f64 {
        Smooth.exact_solution(p)
    }

    fn forcing<B: Backend>(&self, points: Tensor<B, 2>) -> Tensor<B, 1> {
        Smooth.forcing(points)
    }

    fn boundary_value<B: Backend>(&self, points: Tensor<B, 2>) -> Result<Tensor<B, 1>> {
        let x = columns(&points);
        Ok(x[0].clone().mul_scalar(PI).sin() * x[1].clone().mul_scalar(PI).sin())
    }
}

/// `exp(-α r²)` とその中心からの距離の二乗 `r² = (x-xc)² + (y-yc)²`。
fn gaussian_peak<B: Backend, F: Field<B>>(coords: &[F], alpha: f64, xc: f64, yc: f64) -> (F, F) {
    let dx = coords[0].clone().shift(-xc);
    let dy = coords[1].clone().shift(-yc);
    let r2 = dx.square() + dy.square();
    (r2.clone().scale(-alpha).exp(), r2)
}

/// `sin(πx) sin(πy)`。境界上で 0 になります。
fn sine_bump<B: Backend, F: Field<B>>(coords: &[F]) -> F {
    coords[0].clone().scale(PI).sin() * coords[1].clone().scale(PI).sin()
}

/// 解 `exp(-α((x-xc)² + (y-yc)²))` を持つピーク問題。
///
/// リフト `A = exp(-α r²) + sin(πx) sin(πy)` は境界上で解と一致します。
#[derive(Debug, Clone, Copy)]
pub struct Peak {
    pub alpha: f64,
    pub xc: f64,
    pub yc: f64,
}

impl Default for Peak {
    fn default() -> Self {
        Self {
            alpha: 1000.0,
            xc: 0.5,
            yc: 0.5,
        }
    }
}

impl Problem for Peak {
    fn name(&self) -> &str {
        "peak"
    }

    fn dim(&self) -> usize {
        2
    }

    fn formulation(&self) -> Formulation {
        Formulation::Lifted
    }

    fn exact_solution(&self, p: &[f64]) -> f64 {
        let r2 = (p[0] - self.xc).powi(2) + (p[1] - self.yc).powi(2);
        (-self.alpha * r2).exp()
    }

    fn forcing<B: Backend>(&self, points: Tensor<B, 2>) -> Tensor<B, 1> {
        let x = columns(&points);
        let (peak, r2) = gaussian_peak::<B, _>(&x, self.alpha, self.xc, self.yc);
        let a = self.alpha;
        peak * r2.mul_scalar(4.0 * a * a).sub_scalar(4.0 * a)
    }

    fn boundary_lift<B: Backend, F: Field<B>>(&self, coords: &[F]) -> Result<F> {
        let (peak, _) = gaussian_peak::<B, F>(coords, self.alpha, self.xc, self.yc);
        Ok(peak + sine_bump::<B, F>(coords))
    }
}

/// 解 `exp(-α((x-xc)² + (y-yc)²)) + sin(πx)` を持つピーク問題。
///
/// 右辺の大きさがピーク付近で `α²` 程度になるため、正規化した内部損失を使い、
/// ピーク周辺 `[0.4, 0.5]²` の 5×5 格子を毎回の内部バッチに加えます。
/// 境界ネットワークは境界損失の大きさによらず毎反復最適化します。
#[derive(Debug, Clone, Copy)]
pub struct PeakBoundary {
    pub alpha: f64,
    pub xc: f64,
    pub yc: f64,
}

impl Default for PeakBoundary {
    fn default() -> Self {
        Self {
            alpha: 1000.0,
            xc: 0.5,
            yc: 0.5,
        }
    }
}

impl Problem for PeakBoundary {
    fn name(&self) -> &str {
        "peak-boundary"
    }

    fn dim(&self) -> usize {
        2
    }

    fn formulation(&self) -> Formulation {
        Formulation::TrainedBoundary
    }

    fn interior_loss(&self) -> InteriorLoss {
        InteriorLoss::Normalized
    }

    fn exact_solution(&self, p: &[f64]) -> f64 {
        let r2 = (p[0] - self.xc).powi(2) + (p[1] - self.yc).powi(2);
        (-self.alpha * r2).exp() + (PI * p[0]).sin()
    }

    fn forcing<B: Backend>(&self, points: Tensor<B, 2>) -> Tensor<B, 1> {
        let x = columns(&points);
        let (peak, r2) = gaussian_peak::<B, _>(&x, self.alpha, self.xc, self.yc);
        let a = self.alpha;
        let radial = r2.mul_scalar(4.0 * a * a).sub_scalar(4.0 * a);
        peak * radial - x[0].clone().mul_scalar(PI).sin().mul_scalar(PI * PI)
    }

    fn boundary_value<B: Backend>(&self, points: Tensor<B, 2>) -> Result<Tensor<B, 1>> {
        let x = columns(&points);
        let (peak, _) = gaussian_peak::<B, _>(&x, self.alpha, self.xc, self.yc);
        Ok(peak + x[0].clone().mul_scalar(PI).sin())
    }

    fn boundary_tolerance(&self) -> Option<f64> {
        Some(f64::NEG_INFINITY)
    }

    fn refinement_points(&self) -> Option<PointBatch> {
        Some(sampling::rect_grid(0.4, 0.5, 0.4, 0.5, 5))
    }
}

/// 解 `x^α`（α = 0.6）を持つ境界層問題（リフト形式）。
///
/// リフト `A = x^α + sin(πx) sin(πy)` は境界上で解と一致します。
#[derive(Debug, Clone, Copy)]
pub struct Singularity {
    pub alpha: f64,
}

impl Default for Singularity {
    fn default() -> Self {
        Self { alpha: 0.6 }
    }
}

impl Problem for Singularity {
    fn name(&self) -> &str {
        "singularity"
    }

    fn dim(&self) -> usize {
        2
    }

    fn formulation(&self) -> Formulation {
        Formulation::Lifted
    }

    fn exact_solution(&self, p: &[f64]) -> f64 {
        p[0].powf(self.alpha)
    }

    fn forcing<B: Backend>(&self, points: Tensor<B, 2>) -> Tensor<B, 1> {
        let x = columns(&points).swap_remove(0);
        powf(x, self.alpha - 2.0).mul_scalar(self.alpha * (self.alpha - 1.0))
    }

    fn boundary_lift<B: Backend, F: Field<B>>(&self, coords: &[F]) -> Result<F> {
        Ok(coords[0].clone().powf_scalar(self.alpha) + sine_bump::<B, F>(coords))
    }
}

/// 解 `y^α`（α = 0.6）を持つ境界層問題。`y = 0` で二階微分が有界でありません。
///
/// 内部損失は `Δu` と `f` を `[-100, 100]` に切り詰めて評価します。
#[derive(Debug, Clone, Copy)]
pub struct SingularityBoundary {
    pub alpha: f64,
}

impl Default for SingularityBoundary {
    fn default() -> Self {
        Self { alpha: 0.6 }
    }
}

impl Problem for SingularityBoundary {
    fn name(&self) -> &str {
        "singularity-boundary"
    }

    fn dim(&self) -> usize {
        2
    }

    fn formulation(&self) -> Formulation {
        Formulation::TrainedBoundary
    }

    fn interior_loss(&self) -> InteriorLoss {
        InteriorLoss::Clipped { bound: 1e2 }
    }

    fn exact_solution(&self, p: &[f64]) -> f64 {
        p[1].powf(self.alpha)
    }

    fn forcing<B: Backend>(&self, points: Tensor<B, 2>) -> Tensor<B, 1> {
        let y = columns(&points).swap_remove(1);
        powf(y, self.alpha - 2.0).mul_scalar(self.alpha * (self.alpha - 1.0))
    }

    fn boundary_value<B: Backend>(&self, points: Tensor<B, 2>) -> Result<Tensor<B, 1>> {
        let y = columns(&points).swap_remove(1);
        Ok(powf(y, self.alpha))
    }
}

/// `d` 次元の `Δu = -π² d Π sin(πx_i)`、解は `Π sin(πx_i)`。
#[derive(Debug, Clone, Copy)]
pub struct HighDimension {
    dim: usize,
}

impl HighDimension {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn product_of_sines<B: Backend>(points: Tensor<B, 2>) -> Tensor<B, 1> {
        let mut product = Tensor::ones([points.dims()[0]], &points.device());
        for x in columns(&points) {
            product = product * x.mul_scalar(PI).sin();
        }
        product
    }
}

impl Problem for HighDimension {
    fn name(&self) -> &str {
        "high-dimension"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn formulation(&self) -> Formulation {
        Formulation::TrainedBoundary
    }

    fn exact_solution(&self, p: &[f64]) -> f64 {
        p.iter().map(|x| (PI * x).sin()).product()
    }

    fn forcing<B: Backend>(&self, points: Tensor<B, 2>) -> Tensor<B, 1> {
        Self::product_of_sines(points).mul_scalar(-PI * PI * self.dim as f64)
    }

    fn boundary_value<B: Backend>(&self, points: Tensor<B, 2>) -> Result<Tensor<B, 1>> {
        Ok(Self::product_of_sines(points))
    }
}
