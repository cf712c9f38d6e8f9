//! # 二階ジェットによるスカラー場の表現
//!
//! 点バッチ `(n, d)` 上のスカラー場を、値・各座標方向の一階偏微分・各座標方向の
//! 二階偏微分（混合項を除く）の組として保持します。
//!
//! `burn` の逆伝播は入力に関する一階勾配までしか計算グラフに残らないため、
//! ラプラシアンは前進モードで組み立てます。ジェットの演算はすべて通常のテンソル演算
//! なので、最終的な損失から一度 `backward()` を呼べばパラメータ勾配が得られます。

use std::ops::{Add, Mul, Sub};

use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};

use crate::model::DenseNet;

/// 問題定義のコールバックが扱うスカラー場。
///
/// 値だけのテンソル `Tensor<B, 1>` と、微分情報を持つ [`Jet`] の両方が実装します。
/// 同じ式を一度書けば、学習時はジェットとして、評価時は値として計算できます。
pub trait Field<B: Backend>:
    Clone + Add<Output = Self> + Sub<Output = Self> + Mul<Output = Self>
{
    /// 点バッチの各座標をスカラー場として取り出します。
    fn coordinates(points: &Tensor<B, 2>) -> Vec<Self>;

    /// サブネットワークを点バッチ上で評価します。
    fn network(net: &DenseNet<B>, points: Tensor<B, 2>) -> Self;

    /// 同じバッチ上の定数場を作ります。
    fn constant_like(&self, value: f64) -> Self;

    /// 各点の値。
    fn values(&self) -> Tensor<B, 1>;

    fn shift(self, offset: f64) -> Self;

    fn scale(self, factor: f64) -> Self;

    /// `1 - self`
    fn one_minus(self) -> Self {
        self.scale(-1.0).shift(1.0)
    }

    fn sin(self) -> Self;

    fn cos(self) -> Self;

    fn exp(self) -> Self;

    /// `self^exponent`。指数は倍精度のまま扱います。
    fn powf_scalar(self, exponent: f64) -> Self;

    /// `self * self`
    fn square(self) -> Self {
        self.clone() * self
    }
}

/// 点バッチから各列を取り出します。
pub fn columns<B: Backend>(points: &Tensor<B, 2>) -> Vec<Tensor<B, 1>> {
    let [n, d] = points.dims();
    (0..d)
        .map(|axis| points.clone().slice([0..n, axis..axis + 1]).reshape([n]))
        .collect()
}

/// 正の値に対する `base^exponent` を `exp(exponent * ln(base))` で計算します。
///
/// `Tensor::powf_scalar` は指数を `f32` に丸めるため、`y^0.6` のような非整数指数では
/// 倍精度の結果になりません。`base = 0` では指数の符号に応じて `0` か `+inf` を返します。
pub fn powf<B: Backend>(base: Tensor<B, 1>, exponent: f64) -> Tensor<B, 1> {
    base.log().mul_scalar(exponent).exp()
}

impl<B: Backend> Field<B> for Tensor<B, 1> {
    fn coordinates(points: &Tensor<B, 2>) -> Vec<Self> {
        columns(points)
    }

    fn network(net: &DenseNet<B>, points: Tensor<B, 2>) -> Self {
        net.forward(points)
    }

    fn constant_like(&self, value: f64) -> Self {
        self.zeros_like().add_scalar(value)
    }

    fn values(&self) -> Tensor<B, 1> {
        self.clone()
    }

    fn shift(self, offset: f64) -> Self {
        self.add_scalar(offset)
    }

    fn scale(self, factor: f64) -> Self {
        self.mul_scalar(factor)
    }

    fn sin(self) -> Self {
        Tensor::sin(self)
    }

    fn cos(self) -> Self {
        Tensor::cos(self)
    }

    fn exp(self) -> Self {
        Tensor::exp(self)
    }

    fn powf_scalar(self, exponent: f64) -> Self {
        powf(self, exponent)
    }
}

/// 値・勾配・二階偏微分の対角成分を持つスカラー場。
///
/// 形状は `value: [n]`, `gradient: [d, n]`, `curvature: [d, n]` です。
/// `gradient` と `curvature` の `i` 行目が座標 `x_i` に関する微分です。
#[derive(Debug, Clone)]
pub struct Jet<B: Backend> {
    value: Tensor<B, 1>,
    gradient: Tensor<B, 2>,
    curvature: Tensor<B, 2>,
}

impl<B: Backend> Jet<B> {
    pub(crate) fn from_parts(
        value: Tensor<B, 1>,
        gradient: Tensor<B, 2>,
        curvature: Tensor<B, 2>,
    ) -> Self {
        Self {
            value,
            gradient,
            curvature,
        }
    }

    /// バッチサイズ `n`、次元 `d` の定数場を作ります。
    pub fn constant(value: f64, batch_size: usize, dim: usize, device: &B::Device) -> Self {
        Self {
            value: Tensor::zeros([batch_size], device).add_scalar(value),
            gradient: Tensor::zeros([dim, batch_size], device),
            curvature: Tensor::zeros([dim, batch_size], device),
        }
    }

    /// 座標 `x_axis` そのものを表すジェットを作ります。
    pub fn coordinate(points: &Tensor<B, 2>, axis: usize) -> Self {
        let [n, d] = points.dims();
        let device = points.device();
        let mut seed = vec![0.0_f64; d * n];
        seed[axis * n..(axis + 1) * n].fill(1.0);

        Self {
            value: points.clone().slice([0..n, axis..axis + 1]).reshape([n]),
            gradient: Tensor::from_data(TensorData::new(seed, [d, n]), &device),
            curvature: Tensor::zeros([d, n], &device),
        }
    }

    pub fn value(&self) -> Tensor<B, 1> {
        self.value.clone()
    }

    pub fn into_value(self) -> Tensor<B, 1> {
        self.value
    }

    /// 一階偏微分 `[d, n]`。
    pub fn gradient(&self) -> Tensor<B, 2> {
        self.gradient.clone()
    }

    /// 混合項を除く二階偏微分 `[d, n]`。
    pub fn curvature(&self) -> Tensor<B, 2> {
        self.curvature.clone()
    }

    pub fn batch_size(&self) -> usize {
        self.value.dims()[0]
    }

    pub fn dim(&self) -> usize {
        self.gradient.dims()[0]
    }

    /// 値が `outer = φ(v)`, `slope = φ'(v)`, `bend = φ''(v)` となる写像との合成。
    fn compose(self, outer: Tensor<B, 1>, slope: Tensor<B, 1>, bend: Tensor<B, 1>) -> Self {
        let slope = slope.unsqueeze::<2>();
        let bend = bend.unsqueeze::<2>();
        let gradient_sq = self.gradient.clone() * self.gradient.clone();

        Self {
            value: outer,
            gradient: self.gradient * slope.clone(),
            curvature: self.curvature * slope + gradient_sq * bend,
        }
    }
}

impl<B: Backend> Add for Jet<B> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            value: self.value + rhs.value,
            gradient: self.gradient + rhs.gradient,
            curvature: self.curvature + rhs.curvature,
        }
    }
}

impl<B: Backend> Sub for Jet<B> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            value: self.value - rhs.value,
            gradient: self.gradient - rhs.gradient,
            curvature: self.curvature - rhs.curvature,
        }
    }
}

impl<B: Backend> Mul for Jet<B> {
    type Output = Self;

    /// 積の法則: `(fg)'' = f''g + 2f'g' + fg''`
    fn mul(self, rhs: Self) -> Self {
        let lhs_value = self.value.clone().unsqueeze::<2>();
        let rhs_value = rhs.value.clone().unsqueeze::<2>();
        let cross = (self.gradient.clone() * rhs.gradient.clone()).mul_scalar(2.0);

        Self {
            value: self.value * rhs.value,
            gradient: self.gradient.clone() * rhs_value.clone() + rhs.gradient * lhs_value.clone(),
            curvature: self.curvature * rhs_value + cross + rhs.curvature * lhs_value,
        }
    }
}

impl<B: Backend> Field<B> for Jet<B> {
    fn coordinates(points: &Tensor<B, 2>) -> Vec<Self> {
        let d = points.dims()[1];
        (0..d).map(|axis| Jet::coordinate(points, axis)).collect()
    }

    fn network(net: &DenseNet<B>, points: Tensor<B, 2>) -> Self {
        net.forward_jet(points)
    }

    fn constant_like(&self, value: f64) -> Self {
        Self {
            value: self.value.zeros_like().add_scalar(value),
            gradient: self.gradient.zeros_like(),
            curvature: self.curvature.zeros_like(),
        }
    }

    fn values(&self) -> Tensor<B, 1> {
        self.value.clone()
    }

    fn shift(self, offset: f64) -> Self {
        Self {
            value: self.value.add_scalar(offset),
            ..self
        }
    }

    fn scale(self, factor: f64) -> Self {
        Self {
            value: self.value.mul_scalar(factor),
            gradient: self.gradient.mul_scalar(factor),
            curvature: self.curvature.mul_scalar(factor),
        }
    }

    fn sin(self) -> Self {
        let sin = self.value.clone().sin();
        let cos = self.value.clone().cos();
        self.compose(sin.clone(), cos, sin.neg())
    }

    fn cos(self) -> Self {
        let sin = self.value.clone().sin();
        let cos = self.value.clone().cos();
        self.compose(cos.clone(), sin.neg(), cos.neg())
    }

    fn exp(self) -> Self {
        let exp = self.value.clone().exp();
        self.compose(exp.clone(), exp.clone(), exp)
    }

    fn powf_scalar(self, exponent: f64) -> Self {
        let v = self.value.clone();
        let outer = powf(v.clone(), exponent);
        let slope = powf(v.clone(), exponent - 1.0).mul_scalar(exponent);
        let bend = powf(v, exponent - 2.0).mul_scalar(exponent * (exponent - 1.0));
        self.compose(outer, slope, bend)
    }
}
