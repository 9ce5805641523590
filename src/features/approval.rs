// 承認ワークフロー（Pengajuan / Perizinan）の共通部品

use crate::features::auth::repository as user_repository;
use crate::features::auth::Role;
use crate::services::whatsapp::Notifier;
use crate::shared::errors::{AppError, AppResult};
use rusqlite::Connection;
use serde::Deserialize;
use validator::Validate;

crate::text_enum! {
    /// 承認ステータス
    pub enum ApprovalStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
    }
}

impl ApprovalStatus {
    /// 承認・却下後は変更できない
    pub fn is_terminal(self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }

    /// 通知文面用のラベル
    pub fn label(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "MENUNGGU",
            ApprovalStatus::Approved => "DISETUJUI",
            ApprovalStatus::Rejected => "DITOLAK",
        }
    }
}

/// 承認か却下か
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn status(self) -> ApprovalStatus {
        match self {
            Decision::Approve => ApprovalStatus::Approved,
            Decision::Reject => ApprovalStatus::Rejected,
        }
    }
}

/// 承認・却下時の任意コメント
#[derive(Debug, Default, Deserialize, Validate)]
pub struct DecisionDto {
    #[validate(length(max = 500, message = "Catatan terlalu panjang"))]
    pub note: Option<String>,
}

/// 一覧の絞り込み条件
#[derive(Debug, Default, Deserialize)]
pub struct ApprovalQuery {
    pub status: Option<ApprovalStatus>,
}

/// すでに処理済みの申請に対するエラー
pub fn already_decided(resource: &str, status: ApprovalStatus) -> AppError {
    AppError::conflict(format!(
        "{resource} sudah diproses dengan status {}",
        status.label()
    ))
}

/// 承認依頼の送信先を決める
///
/// WhatsAppの承認者番号が設定されていればそれを、なければ電話番号を持つ全ADMINを返す
pub fn approver_recipients(conn: &Connection, notifier: &dyn Notifier) -> AppResult<Vec<String>> {
    if let Some(number) = notifier.approver_number() {
        return Ok(vec![number.to_string()]);
    }
    user_repository::phones_by_role(conn, Role::Admin)
}

/// 申請者の電話番号（未登録ならNone）
pub fn requester_phone(conn: &Connection, user_id: i64) -> AppResult<Option<String>> {
    Ok(user_repository::get_by_id(conn, user_id)?.phone)
}
