//! 学習済みモデルの診断値（L2 誤差・点ごとの残差）。
//!
//! 勾配追跡を必要としないので、任意のバックエンドで評価できます。

use burn::prelude::Backend;
use burn::tensor::{ElementConversion, Tensor};

use crate::error::{PdeError, Result};
use crate::jet::Jet;
use crate::model::ParamStore;
use crate::pinn;
use crate::problem::Problem;
use crate::sampling::PointBatch;

/// 一要素のテンソルをスカラーとして取り出します。
pub fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}

/// テンソルの値をホスト側の `Vec<f64>` に取り出します。
pub fn to_host<B: Backend>(tensor: Tensor<B, 1>) -> Result<Vec<f64>> {
    tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| PdeError::Tensor(format!("{e:?}")))
}

/// 二乗平均平方根誤差 `sqrt(mean((a - b)²))`。二つの長さが異なる場合はエラーです。
pub fn rms_error(approx: &[f64], exact: &[f64]) -> Result<f64> {
    if approx.len() != exact.len() {
        return Err(PdeError::ShapeMismatch {
            what: "exact field",
            expected: vec![approx.len()],
            actual: vec![exact.len()],
        });
    }
    if approx.is_empty() {
        return Ok(0.0);
    }
    let sum: f64 = approx
        .iter()
        .zip(exact)
        .map(|(a, b)| (a - b) * (a - b))
        .sum();
    Ok((sum / approx.len() as f64).sqrt())
}

/// 合成解を点バッチ上で評価します。
pub fn evaluate<B: Backend, P: Problem>(
    problem: &P,
    params: &ParamStore<B>,
    points: &PointBatch,
    device: &B::Device,
) -> Result<Vec<f64>> {
    let u: Tensor<B, 1> = pinn::assemble(problem, params, points.to_tensor::<B>(device))?;
    to_host(u)
}

/// 合成解と厳密解の L2 誤差（二乗平均平方根）。
pub fn l2_error<B: Backend, P: Problem>(
    problem: &P,
    params: &ParamStore<B>,
    points: &PointBatch,
    device: &B::Device,
) -> Result<f64> {
    let approx = evaluate(problem, params, points, device)?;
    rms_error(&approx, &problem.exact_field(points))
}

/// 各点の `|Δu - f|`。
pub fn pointwise_residual<B: Backend, P: Problem>(
    problem: &P,
    params: &ParamStore<B>,
    points: &PointBatch,
    device: &B::Device,
) -> Result<Vec<f64>> {
    let x = points.to_tensor::<B>(device);
    let solution: Jet<B> = pinn::assemble(problem, params, x.clone())?;
    to_host(pinn::pointwise_loss(problem, &solution, x)?)
}
