//! ライブラリ全体で使うエラー型。

use crate::model::Scope;

/// 構成ミスや未実装の問題定義フックなど、学習を続行できない致命的なエラー。
///
/// どのエラーもリトライの対象ではありません。呼び出し側は処理を中断します。
#[derive(Debug, thiserror::Error)]
pub enum PdeError {
    /// 計算したフィールドの形状が期待と異なる場合。
    #[error("形状の不一致 ({what}): 期待 {expected:?}, 実際 {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// まだ作成されていないスコープのパラメータを再利用しようとした場合。
    #[error("スコープ '{scope}' のパラメータは作成前に再利用できません")]
    ReuseBeforeCreate { scope: Scope },

    /// 同じスコープでパラメータを二重に作成しようとした場合。
    #[error("スコープ '{scope}' のパラメータはすでに作成されています")]
    AlreadyDefined { scope: Scope },

    /// 現在の定式化で必要な問題定義フックが実装されていない場合。
    #[error("問題 '{problem}' はフック '{hook}' を実装していません")]
    UnimplementedHook {
        problem: String,
        hook: &'static str,
    },

    #[error("不正な設定: {0}")]
    InvalidConfig(String),

    /// 入力点に対する勾配が逆伝播で得られなかった場合。
    #[error("入力点に対する勾配が計算されていません")]
    MissingGradient,

    #[error("テンソルデータの変換に失敗しました: {0}")]
    Tensor(String),
}

pub type Result<T, E = PdeError> = std::result::Result<T, E>;
