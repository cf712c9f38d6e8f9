//! 微分作用素の評価と形状検査。

use burn::prelude::Backend;
use burn::tensor::Tensor;
use burn::tensor::backend::AutodiffBackend;

use crate::error::{PdeError, Result};
use crate::jet::Jet;

/// テンソルの形状が期待どおりであることを確認します。
///
/// 形状の不一致は暗黙にブロードキャストせず、致命的なエラーとして返します。
pub fn ensure_shape<B: Backend, const D: usize>(
    tensor: &Tensor<B, D>,
    expected: [usize; D],
    what: &'static str,
) -> Result<()> {
    let actual = tensor.dims();
    if actual != expected {
        return Err(PdeError::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

/// ジェットが `n` 点・`d` 次元のスカラー場であることを確認します。
pub fn ensure_jet<B: Backend>(
    jet: &Jet<B>,
    batch_size: usize,
    dim: usize,
    what: &'static str,
) -> Result<()> {
    ensure_shape(&jet.value(), [batch_size], what)?;
    ensure_shape(&jet.gradient(), [dim, batch_size], what)?;
    ensure_shape(&jet.curvature(), [dim, batch_size], what)
}

/// 座標 `x_axis` に関する偏微分 `∂u/∂x_axis` を返します。
pub fn partial<B: Backend>(u: &Jet<B>, axis: usize) -> Result<Tensor<B, 1>> {
    let (n, d) = (u.batch_size(), u.dim());
    if axis >= d {
        return Err(PdeError::InvalidConfig(format!(
            "座標軸 {axis} は次元 {d} の範囲外です"
        )));
    }
    let du = u.gradient().slice([axis..axis + 1, 0..n]).reshape([n]);
    ensure_shape(&du, [n], "partial")?;
    Ok(du)
}

/// ラプラシアン `Σ_i ∂²u/∂x_i²` を返します。
///
/// 各座標の二階偏微分を `d` 項分加算します。
pub fn laplacian<B: Backend>(u: &Jet<B>) -> Result<Tensor<B, 1>> {
    let (n, d) = (u.batch_size(), u.dim());
    ensure_jet(u, n, d, "laplacian")?;
    let delta = u.curvature().sum_dim(0).reshape([n]);
    ensure_shape(&delta, [n], "laplacian")?;
    Ok(delta)
}

/// 逆伝播による一階偏微分 `[n, d]`。
///
/// バッチの各行は互いに独立なので、出力の総和を入力バッチで微分すると、
/// `i` 列目が各行自身の `∂u/∂x_i` になります。
pub fn reverse_partials<B, F>(field: F, points: Tensor<B, 2>) -> Result<Tensor<B::InnerBackend, 2>>
where
    B: AutodiffBackend,
    F: FnOnce(Tensor<B, 2>) -> Tensor<B, 1>,
{
    let n = points.dims()[0];
    let points = points.detach().require_grad();
    let u = field(points.clone());
    ensure_shape(&u, [n], "reverse_partials")?;
    let grads = u.sum().backward();
    points.grad(&grads).ok_or(PdeError::MissingGradient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jet::Field;
    use crate::model::DenseNetConfig;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::{Distribution, TensorData};

    type TestBackend = NdArray<f64>;
    type TestAutodiffBackend = Autodiff<NdArray<f64>>;

    fn random_points(n: usize, d: usize) -> Tensor<TestBackend, 2> {
        Tensor::random([n, d], Distribution::Uniform(0.0, 1.0), &Default::default())
    }

    #[test]
    fn laplacian_of_zero_is_zero() {
        let device = Default::default();
        for d in [1, 2, 4] {
            let zero = Jet::<TestBackend>::constant(0.0, 9, d, &device);
            let delta = laplacian(&zero).unwrap().into_data().to_vec::<f64>().unwrap();
            assert_eq!(delta, vec![0.0; 9]);
        }
    }

    #[test]
    fn laplacian_of_sum_of_squares_is_twice_dim() {
        for (n, d) in [(1, 2), (17, 2), (8, 3), (5, 7)] {
            let coords = Jet::coordinates(&random_points(n, d));
            let mut u = coords[0].clone().square();
            for c in coords.into_iter().skip(1) {
                u = u + c.square();
            }
            let delta = laplacian(&u).unwrap().into_data().to_vec::<f64>().unwrap();
            assert_eq!(delta.len(), n);
            for v in delta {
                assert!((v - 2.0 * d as f64).abs() < 1e-12, "d={d}: {v}");
            }
        }
    }

    #[test]
    fn partial_selects_axis() {
        let p = random_points(6, 3);
        let coords = Jet::coordinates(&p);
        // u = x0 * x2  =>  ∂u/∂x2 = x0
        let u = coords[0].clone() * coords[2].clone();
        let du = partial(&u, 2).unwrap().into_data().to_vec::<f64>().unwrap();
        let x0 = coords[0].values().into_data().to_vec::<f64>().unwrap();
        for (a, b) in du.iter().zip(&x0) {
            assert!((a - b).abs() < 1e-14);
        }
        assert!(matches!(partial(&u, 3), Err(PdeError::InvalidConfig(_))));
    }

    #[test]
    fn mismatched_shape_is_reported() {
        let t = Tensor::<TestBackend, 1>::zeros([4], &Default::default());
        let err = ensure_shape(&t, [5], "forcing").unwrap_err();
        match err {
            PdeError::ShapeMismatch {
                what,
                expected,
                actual,
            } => {
                assert_eq!(what, "forcing");
                assert_eq!(expected, vec![5]);
                assert_eq!(actual, vec![4]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reverse_mode_agrees_with_jet_gradient() {
        let device = Default::default();
        let net = DenseNetConfig::new(2)
            .with_n_hidden_layers(2)
            .with_width(16)
            .init::<TestAutodiffBackend>(&device);
        let data = TensorData::new(vec![0.1, 0.9, 0.5, 0.5, 0.25, 0.75], [3, 2]);
        let points = Tensor::<TestAutodiffBackend, 2>::from_data(data, &device);

        let reverse = reverse_partials(|x| net.forward(x), points.clone()).unwrap();
        let reverse = reverse.into_data().to_vec::<f64>().unwrap();

        let jet = net.forward_jet(points);
        for axis in 0..2 {
            let forward = partial(&jet, axis).unwrap().into_data().to_vec::<f64>().unwrap();
            for row in 0..3 {
                assert!((reverse[row * 2 + axis] - forward[row]).abs() < 1e-12);
            }
        }
    }
}
