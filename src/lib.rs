//! # 楕円型 PDE のための物理情報ニューラルネットワーク (PINN) ライブラリ
//!
//! `burn` フレームワークを使用して、単位超立方体上のポアソン方程式 `Δu = f` を
//! 二つのサブネットワーク（境界・内部）の合成で解くための主要なコンポーネントを提供します。
//!
//! 2 階微分は前進モードの [`jet::Jet`] で計算するので、損失に対する `backward()`
//! 一回でパラメータの勾配が得られます。

pub mod cli;
pub mod diagnostics;
pub mod error;
pub mod inference;
pub mod jet;
pub mod model;
pub mod operators;
pub mod pinn;
pub mod problem;
pub mod problems;
pub mod sampling;
pub mod training;

/// 実行設定を保存するファイル名
pub const RUN_CONFIG_FILENAME: &str = "run.json";
/// 内部ネットワークを保存するファイル名
pub const INNER_MODEL_FILENAME: &str = "inner.mpk";
/// 境界ネットワークを保存するファイル名
pub const BOUNDARY_MODEL_FILENAME: &str = "boundary.mpk";
