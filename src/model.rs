use std::fmt;

use burn::module::{AutodiffModule, Module};
use burn::nn::{Linear, LinearConfig, Tanh};
use burn::prelude::{Backend, Config};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Tensor, TensorData};
use serde::{Deserialize, Serialize};

use crate::error::{PdeError, Result};
use crate::jet::Jet;

/// サブネットワークの構成。
#[derive(Config, Debug)]
pub struct DenseNetConfig {
    /// 入力の次元（空間次元）。
    pub d_input: usize,
    /// tanh を持つ隠れ層の数。0 の場合は出力層だけになります。
    #[config(default = 3)]
    pub n_hidden_layers: usize,
    /// 隠れ層の幅。
    #[config(default = 256)]
    pub width: usize,
}

impl DenseNetConfig {
    /// 新しいサブネットワークを初期化します。
    pub fn init<B: Backend>(&self, device: &B::Device) -> DenseNet<B> {
        let mut hidden = Vec::with_capacity(self.n_hidden_layers);
        let mut d_in = self.d_input;
        for _ in 0..self.n_hidden_layers {
            hidden.push(LinearConfig::new(d_in, self.width).init(device));
            d_in = self.width;
        }
        DenseNet {
            hidden,
            output: LinearConfig::new(d_in, 1).init(device),
            activation: Tanh::new(),
        }
    }
}

/// 境界用・内部用に使う全結合ネットワーク。
///
/// 点バッチ `(n, d)` を受け取り、各点に一つのスカラーを返す多層パーセプトロン（MLP）です。
#[derive(Module, Debug)]
pub struct DenseNet<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
    activation: Tanh,
}

impl<B: Backend> DenseNet<B> {
    /// モデルの順伝播を実行し、形状 `[n]` の出力を返します。
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 1> {
        let n = input.dims()[0];
        let mut x = input;
        for layer in &self.hidden {
            x = self.activation.forward(layer.forward(x));
        }
        self.output.forward(x).reshape([n])
    }

    /// 出力とその入力座標に関する一階・二階偏微分を同時に計算します。
    ///
    /// 接ベクトルは方向ごとに縦に積んだ `[d * n, width]` の形で伝播させます。
    /// `a = tanh(z)` に対して `a' = (1 - a²) z'`、`a'' = (1 - a²) z'' - 2a(1 - a²) z'²` です。
    pub fn forward_jet(&self, input: Tensor<B, 2>) -> Jet<B> {
        let [n, d] = input.dims();
        let device = input.device();

        let mut seed = Vec::with_capacity(d * n * d);
        for axis in 0..d {
            for _ in 0..n {
                seed.extend((0..d).map(|k| if k == axis { 1.0_f64 } else { 0.0 }));
            }
        }
        let mut tangent = Tensor::<B, 2>::from_data(TensorData::new(seed, [d * n, d]), &device);
        let mut curvature = Tensor::<B, 2>::zeros([d * n, d], &device);

        let mut x = input;
        for layer in &self.hidden {
            let weight = layer.weight.val();
            let dz = tangent.matmul(weight.clone());
            let ddz = curvature.matmul(weight);
            let a = self.activation.forward(layer.forward(x));

            let stacked = Tensor::cat(vec![a.clone(); d], 0);
            let slope = (stacked.clone() * stacked.clone()).neg().add_scalar(1.0);
            let bend = (stacked * slope.clone()).mul_scalar(-2.0);

            curvature = slope.clone() * ddz + bend * dz.clone() * dz.clone();
            tangent = slope * dz;
            x = a;
        }

        let weight = self.output.weight.val();
        let value = self.output.forward(x).reshape([n]);
        let gradient = tangent.matmul(weight.clone()).reshape([d, n]);
        let curvature = curvature.matmul(weight).reshape([d, n]);
        Jet::from_parts(value, gradient, curvature)
    }

    pub fn n_hidden_layers(&self) -> usize {
        self.hidden.len()
    }
}

/// パラメータスコープ。二つのスコープが同じパラメータを共有することはありません。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Boundary,
    Inner,
}

impl Scope {
    pub fn name(&self) -> &'static str {
        match self {
            Scope::Boundary => "boundary",
            Scope::Inner => "inner",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// スコープごとのサブネットワークを保持するパラメータストア。
///
/// `define` で作成、`bind` で既存パラメータへの束縛を明示的に区別します。
/// 最適化器へ渡すときは `take` で所有権を取り出し、更新後に `put` で戻します。
#[derive(Debug, Clone)]
pub struct ParamStore<B: Backend> {
    boundary: Option<DenseNet<B>>,
    inner: Option<DenseNet<B>>,
}

impl<B: Backend> Default for ParamStore<B> {
    fn default() -> Self {
        Self {
            boundary: None,
            inner: None,
        }
    }
}

impl<B: Backend> ParamStore<B> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, scope: Scope) -> &mut Option<DenseNet<B>> {
        match scope {
            Scope::Boundary => &mut self.boundary,
            Scope::Inner => &mut self.inner,
        }
    }

    /// スコープに新しいパラメータを作成します。
    pub fn define(
        &mut self,
        scope: Scope,
        config: &DenseNetConfig,
        device: &B::Device,
    ) -> Result<&DenseNet<B>> {
        self.insert(scope, config.init(device))
    }

    /// 外部で用意したネットワーク（ファイルから読み込んだものなど）をスコープに登録します。
    pub fn insert(&mut self, scope: Scope, net: DenseNet<B>) -> Result<&DenseNet<B>> {
        let slot = self.slot(scope);
        if slot.is_some() {
            return Err(PdeError::AlreadyDefined { scope });
        }
        let net: &DenseNet<B> = slot.insert(net);
        Ok(net)
    }

    /// 作成済みのパラメータに束縛します。
    pub fn bind(&self, scope: Scope) -> Result<&DenseNet<B>> {
        let slot = match scope {
            Scope::Boundary => &self.boundary,
            Scope::Inner => &self.inner,
        };
        slot.as_ref().ok_or(PdeError::ReuseBeforeCreate { scope })
    }

    pub fn contains(&self, scope: Scope) -> bool {
        self.bind(scope).is_ok()
    }

    /// 最適化のためにネットワークの所有権を取り出します。
    pub fn take(&mut self, scope: Scope) -> Result<DenseNet<B>> {
        self.slot(scope)
            .take()
            .ok_or(PdeError::ReuseBeforeCreate { scope })
    }

    /// `take` で取り出したネットワークを戻します。
    pub fn put(&mut self, scope: Scope, net: DenseNet<B>) {
        *self.slot(scope) = Some(net);
    }
}

impl<B: AutodiffBackend> ParamStore<B> {
    /// 勾配追跡を外した評価用のコピーを返します。
    pub fn valid(&self) -> ParamStore<B::InnerBackend> {
        ParamStore {
            boundary: self.boundary.as_ref().map(|net| net.valid()),
            inner: self.inner.as_ref().map(|net| net.valid()),
        }
    }
}
