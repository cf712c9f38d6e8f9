//! 学習点・境界点・参照グリッドの生成。

use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::Rng;

use crate::error::{PdeError, Result};

/// `R^d` の点の集まり。行が一つの点に対応します。
#[derive(Debug, Clone, PartialEq)]
pub struct PointBatch {
    dim: usize,
    coords: Vec<f64>,
}

impl PointBatch {
    /// 行優先の座標列から点バッチを作ります。
    pub fn new(dim: usize, coords: Vec<f64>) -> Result<Self> {
        if dim == 0 || coords.len() % dim != 0 {
            return Err(PdeError::ShapeMismatch {
                what: "point batch",
                expected: vec![coords.len() / dim.max(1), dim],
                actual: vec![coords.len()],
            });
        }
        Ok(Self { dim, coords })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.coords.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.coords[i * self.dim..(i + 1) * self.dim]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.coords.chunks_exact(self.dim)
    }

    /// 同じ次元の点バッチを後ろに連結します。
    pub fn concat(mut self, other: &PointBatch) -> Result<Self> {
        if other.dim != self.dim {
            return Err(PdeError::ShapeMismatch {
                what: "point batch concat",
                expected: vec![other.len(), self.dim],
                actual: vec![other.len(), other.dim],
            });
        }
        self.coords.extend_from_slice(&other.coords);
        Ok(self)
    }

    /// 形状 `(n, d)` のテンソルに変換します。
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::from_data(
            TensorData::new(self.coords.clone(), [self.len(), self.dim]),
            device,
        )
    }
}

/// 単位超立方体 `[0,1]^d` 内の一様乱数点を `n` 個生成します。
pub fn uniform<R: Rng>(rng: &mut R, n: usize, dim: usize) -> PointBatch {
    let coords = (0..n * dim).map(|_| rng.random::<f64>()).collect();
    PointBatch { dim, coords }
}

/// 単位超立方体の境界上の点を生成します。
///
/// 各座標軸について、その軸を 0 に固定した `n` 点と 1 に固定した `n` 点を作り、
/// 残りの座標は一様乱数とします。合計 `2 * d * n` 点です。
/// 2 次元では下・上・左・右の 4 辺に相当します。
pub fn boundary<R: Rng>(rng: &mut R, n: usize, dim: usize) -> PointBatch {
    let mut coords = Vec::with_capacity(2 * dim * n * dim);
    for axis in 0..dim {
        for fixed in [0.0, 1.0] {
            for _ in 0..n {
                coords.extend((0..dim).map(|k| if k == axis { fixed } else { rng.random::<f64>() }));
            }
        }
    }
    PointBatch { dim, coords }
}

/// 長方形 `[x0, x1] × [y0, y1]` 上の `n × n` 等間隔格子。
///
/// 点の並びは `y` ごとの行で、行内では `x` が増加します。
pub fn rect_grid(x0: f64, x1: f64, y0: f64, y1: f64, n: usize) -> PointBatch {
    let xs = linspace(x0, x1, n);
    let ys = linspace(y0, y1, n);
    let mut coords = Vec::with_capacity(2 * n * n);
    for y in &ys {
        for x in &xs {
            coords.push(*x);
            coords.push(*y);
        }
    }
    PointBatch { dim: 2, coords }
}

/// 単位正方形上の `n × n` 参照グリッド。
pub fn unit_grid(n: usize) -> PointBatch {
    rect_grid(0.0, 1.0, 0.0, 1.0, n)
}

/// 単位超立方体の中心 `(0.5, ..., 0.5)` の一点。
pub fn center(dim: usize) -> PointBatch {
    PointBatch {
        dim,
        coords: vec![0.5; dim],
    }
}

fn linspace(a: f64, b: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![a];
    }
    (0..n)
        .map(|i| a + (b - a) * i as f64 / (n - 1) as f64)
        .collect()
}
