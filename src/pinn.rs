//! 合成解の組み立てと損失関数。

use burn::prelude::Backend;
use burn::tensor::Tensor;

use crate::error::{PdeError, Result};
use crate::jet::{Field, Jet};
use crate::model::{DenseNet, ParamStore, Scope};
use crate::operators::{ensure_shape, laplacian};
use crate::problem::{Formulation, InteriorLoss, Problem};

/// 二つのサブネットワークから合成解を組み立てます。
///
/// - リフト形式: `u = A(x) + B(x) * inner(x)`
/// - 境界学習形式: `u = boundary(x) + B(x) * inner(x)`
///
/// `B` は境界上で 0 なので、リフト形式では学習状態によらず境界上で `u = A` となります。
/// `F` に [`Jet`] を選べば微分付きで、`Tensor<B, 1>` を選べば値だけを計算します。
pub fn assemble<B, P, F>(problem: &P, params: &ParamStore<B>, points: Tensor<B, 2>) -> Result<F>
where
    B: Backend,
    P: Problem,
    F: Field<B>,
{
    let [n, d] = points.dims();
    ensure_shape(&points, [n, problem.dim()], "points")?;
    if d == 0 {
        return Err(PdeError::InvalidConfig("空間次元は 1 以上が必要です".to_string()));
    }

    let coords = F::coordinates(&points);
    let inner = F::network(params.bind(Scope::Inner)?, points.clone());
    ensure_shape(&inner.values(), [n], "inner subnetwork")?;
    let factor = problem.vanishing_factor(&coords);
    ensure_shape(&factor.values(), [n], "vanishing factor")?;

    let base = match problem.formulation() {
        Formulation::Lifted => {
            let lift = problem.boundary_lift(&coords)?;
            ensure_shape(&lift.values(), [n], "boundary lift")?;
            lift
        }
        Formulation::TrainedBoundary => {
            let boundary = F::network(params.bind(Scope::Boundary)?, points);
            ensure_shape(&boundary.values(), [n], "boundary subnetwork")?;
            boundary
        }
    };

    Ok(base + factor * inner)
}

/// 境界損失 `Σ (g(x) - boundary(x))²` を計算します。
pub fn boundary_loss<B: Backend, P: Problem>(
    problem: &P,
    net: &DenseNet<B>,
    points: Tensor<B, 2>,
) -> Result<Tensor<B, 1>> {
    let n = points.dims()[0];
    let target = problem.boundary_value(points.clone())?;
    ensure_shape(&target, [n], "boundary value")?;
    let output = net.forward(points);
    ensure_shape(&output, [n], "boundary subnetwork")?;
    Ok(squared_sum(target - output))
}

/// 計算したラプラシアンと右辺を返します。
fn laplacian_and_forcing<B: Backend, P: Problem>(
    problem: &P,
    solution: &Jet<B>,
    points: Tensor<B, 2>,
) -> Result<(Tensor<B, 1>, Tensor<B, 1>)> {
    let n = points.dims()[0];
    let delta = laplacian(solution)?;
    ensure_shape(&delta, [n], "laplacian")?;
    let forcing = problem.forcing(points);
    ensure_shape(&forcing, [n], "forcing")?;
    Ok((delta, forcing))
}

/// 内部損失（PDE 残差）を問題ごとの方式で計算します。
pub fn interior_loss<B: Backend, P: Problem>(
    problem: &P,
    solution: &Jet<B>,
    points: Tensor<B, 2>,
) -> Result<Tensor<B, 1>> {
    let (delta, forcing) = laplacian_and_forcing(problem, solution, points)?;
    let loss = match problem.interior_loss() {
        InteriorLoss::Standard => squared_sum(delta - forcing),
        InteriorLoss::Normalized => {
            let residual = delta.clone() - forcing;
            let weight = (delta.clone() * delta).recip();
            (weight * residual.clone() * residual).sum()
        }
        InteriorLoss::Clipped { bound } => {
            squared_sum(delta.clamp(-bound, bound) - forcing.clamp(-bound, bound))
        }
    };
    Ok(loss)
}

/// 各点の残差の絶対値 `|Δu - f|`。最適化には使わない診断用の値です。
pub fn pointwise_loss<B: Backend, P: Problem>(
    problem: &P,
    solution: &Jet<B>,
    points: Tensor<B, 2>,
) -> Result<Tensor<B, 1>> {
    let (delta, forcing) = laplacian_and_forcing(problem, solution, points)?;
    Ok((delta - forcing).abs())
}

fn squared_sum<B: Backend>(residual: Tensor<B, 1>) -> Tensor<B, 1> {
    (residual.clone() * residual).sum()
}
