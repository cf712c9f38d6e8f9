//! # 問題定義インターフェース
//!
//! 個々の偏微分方程式（厳密解・右辺・境界データなど）を学習ループから切り離すための
//! インターフェースです。学習ループと微分作用素はこのトレイトだけを通して問題を参照します。

use burn::prelude::Backend;
use burn::tensor::Tensor;

use crate::error::{PdeError, Result};
use crate::jet::Field;
use crate::sampling::{self, PointBatch};

/// 合成解の組み立て方。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formulation {
    /// `u = A(x) + B(x) * inner(x)`。境界条件は構成上厳密に満たされます。
    Lifted,
    /// `u = boundary(x) + B(x) * inner(x)`。境界ネットワークを境界データに対して学習します。
    TrainedBoundary,
}

/// 内部損失の種類。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InteriorLoss {
    /// `Σ (Δu - f)²`
    Standard,
    /// `Σ (Δu - f)² / (Δu)²`。計算したラプラシアンが 0 に近い点では不安定です。
    Normalized,
    /// `Δu` と `f` を `[-bound, bound]` に切り詰めてから `Σ (Δu - f)²`。
    Clipped { bound: f64 },
}

/// 単位超立方体上の楕円型方程式 `Δu = f` の一つのインスタンス。
///
/// `forcing` と `exact_solution` は必須です。定式化に応じて `boundary_lift`
/// （[`Formulation::Lifted`]）または `boundary_value`（[`Formulation::TrainedBoundary`]）
/// を実装してください。未実装のフックは最初に呼ばれた時点でエラーになります。
pub trait Problem {
    fn name(&self) -> &str;

    /// 空間次元。
    fn dim(&self) -> usize;

    fn formulation(&self) -> Formulation;

    fn interior_loss(&self) -> InteriorLoss {
        InteriorLoss::Standard
    }

    /// 一点における厳密解（診断用）。
    fn exact_solution(&self, point: &[f64]) -> f64;

    /// 右辺 `f`。
    fn forcing<B: Backend>(&self, points: Tensor<B, 2>) -> Tensor<B, 1>;

    /// 境界上の値 `A`（リフト形式用）。
    fn boundary_lift<B: Backend, F: Field<B>>(&self, coords: &[F]) -> Result<F> {
        let _ = coords;
        Err(self.missing_hook("boundary_lift"))
    }

    /// 境界ネットワークの学習目標（境界学習形式用）。
    fn boundary_value<B: Backend>(&self, points: Tensor<B, 2>) -> Result<Tensor<B, 1>> {
        let _ = points;
        Err(self.missing_hook("boundary_value"))
    }

    /// 境界で 0、内部で正となる関数 `B`。既定は `Π x_i (1 - x_i)` です。
    fn vanishing_factor<B: Backend, F: Field<B>>(&self, coords: &[F]) -> F {
        let mut factor = coords[0].constant_like(1.0);
        for c in coords {
            factor = factor * (c.clone() * c.clone().one_minus());
        }
        factor
    }

    /// 境界ネットワークの最適化を省略する損失の閾値。
    ///
    /// `None` なら学習設定の `boundary_tolerance` を使います。
    /// `Some(f64::NEG_INFINITY)` を返すと毎反復必ず最適化します。
    fn boundary_tolerance(&self) -> Option<f64> {
        None
    }

    /// 毎回の内部バッチに追加する固定の細分点。
    fn refinement_points(&self) -> Option<PointBatch> {
        None
    }

    /// L2 誤差を評価する参照点。2 次元では `n × n` グリッド、それ以外は中心の一点です。
    fn reference_points(&self, resolution: usize) -> PointBatch {
        match self.dim() {
            2 => sampling::unit_grid(resolution),
            d => sampling::center(d),
        }
    }

    /// 点バッチ上の厳密解。
    fn exact_field(&self, points: &PointBatch) -> Vec<f64> {
        points.rows().map(|p| self.exact_solution(p)).collect()
    }

    #[doc(hidden)]
    fn missing_hook(&self, hook: &'static str) -> PdeError {
        PdeError::UnimplementedHook {
            problem: self.name().to_string(),
            hook,
        }
    }
}
