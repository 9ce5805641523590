// 機能モジュール

/// 承認ワークフローの共通部品
pub mod approval;

/// 認証・ユーザー管理
pub mod auth;

/// 車両管理
pub mod cars;

/// 調達申請
pub mod pengajuan;

/// 許可申請と承認リンク
pub mod perizinan;

/// 支出タスク
pub mod spending;

/// 入出金取引
pub mod transactions;

/// 画像アップロード
pub mod uploads;

/// 共有ウォレット
pub mod wallet;
