use serde::{Deserialize, Serialize};
use validator::Validate;

crate::text_enum! {
    /// 支出タスクのステータス
    pub enum SpendingStatus {
        /// 作成直後（予算の編集が可能）
        Draft => "DRAFT",
        /// 資金を受け取った
        Funded => "FUNDED",
        /// 支出中（レシート登録あり）
        Spending => "SPENDING",
        /// 余剰金の返金が必要
        NeedsRefund => "NEEDS_REFUND",
        /// 立替分の精算が必要
        NeedsReimburse => "NEEDS_REIMBURSE",
        Settled => "SETTLED",
    }
}

/// ステータスと表示ラベルの組
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct StatusLabel {
    pub value: SpendingStatus,
    pub label: &'static str,
}

impl SpendingStatus {
    /// 画面表示用のラベル
    pub fn label(self) -> &'static str {
        match self {
            SpendingStatus::Draft => "Draf",
            SpendingStatus::Funded => "Dana Diterima",
            SpendingStatus::Spending => "Sedang Berbelanja",
            SpendingStatus::NeedsRefund => "Perlu Pengembalian Dana",
            SpendingStatus::NeedsReimburse => "Perlu Penggantian Dana",
            SpendingStatus::Settled => "Selesai",
        }
    }

    /// すべてのステータスとラベル（定義順）
    pub fn all_labels() -> Vec<StatusLabel> {
        Self::ALL
            .iter()
            .map(|&value| StatusLabel {
                value,
                label: value.label(),
            })
            .collect()
    }

    /// 許可されている遷移かどうか
    ///
    /// DRAFT → FUNDED → SPENDING → {NEEDS_REFUND, NEEDS_REIMBURSE, SETTLED}、
    /// NEEDS_REFUND / NEEDS_REIMBURSE → SETTLED
    pub fn can_transition_to(self, next: SpendingStatus) -> bool {
        use SpendingStatus::*;
        matches!(
            (self, next),
            (Draft, Funded)
                | (Funded, Spending)
                | (Spending, NeedsRefund)
                | (Spending, NeedsReimburse)
                | (Spending, Settled)
                | (NeedsRefund, Settled)
                | (NeedsReimburse, Settled)
        )
    }

    /// 予算を変更できるステータスかどうか
    pub fn allows_budget_change(self) -> bool {
        matches!(self, SpendingStatus::Draft | SpendingStatus::Funded)
    }

    /// レシートを追加できるステータスかどうか
    pub fn accepts_receipts(self) -> bool {
        matches!(self, SpendingStatus::Funded | SpendingStatus::Spending)
    }

    /// 差額からクローズ後のステータスを決める
    pub fn closing_status(diff: i64) -> SpendingStatus {
        match diff.signum() {
            1 => SpendingStatus::NeedsRefund,
            -1 => SpendingStatus::NeedsReimburse,
            _ => SpendingStatus::Settled,
        }
    }
}

/// 支出タスク
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpendingTask {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: SpendingStatus,
    pub budget: i64,
    pub created_by: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// 予算とレシート合計の集計
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct SpendingSummary {
    pub budget: i64,
    pub total_receipts: i64,
    /// budget - total_receipts（正なら余剰、負なら超過）
    pub diff: i64,
    pub receipt_count: i64,
}

impl SpendingSummary {
    pub fn new(budget: i64, total_receipts: i64, receipt_count: i64) -> Self {
        Self {
            budget,
            total_receipts,
            diff: budget - total_receipts,
            receipt_count,
        }
    }
}

/// 一覧表示用（タスク＋集計）
#[derive(Debug, Serialize, Clone)]
pub struct SpendingTaskWithSummary {
    #[serde(flatten)]
    pub task: SpendingTask,
    pub status_label: &'static str,
    pub summary: SpendingSummary,
}

/// 詳細表示用（タスク＋集計＋レシート）
#[derive(Debug, Serialize, Clone)]
pub struct SpendingTaskDetail {
    #[serde(flatten)]
    pub task: SpendingTask,
    pub status_label: &'static str,
    pub summary: SpendingSummary,
    pub receipts: Vec<SpendingReceipt>,
}

/// 支出レシート
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpendingReceipt {
    pub id: i64,
    pub task_id: i64,
    pub amount: i64,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// YYYY-MM-DD
    pub spent_at: String,
    pub created_by: i64,
    pub created_at: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSpendingTaskDto {
    #[validate(length(min = 1, max = 200, message = "Judul wajib diisi"))]
    pub title: String,
    #[validate(length(max = 1000, message = "Deskripsi terlalu panjang"))]
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Anggaran tidak boleh negatif"))]
    pub budget: i64,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateSpendingTaskDto {
    #[validate(length(min = 1, max = 200, message = "Judul wajib diisi"))]
    pub title: Option<String>,
    #[validate(length(max = 1000, message = "Deskripsi terlalu panjang"))]
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Anggaran tidak boleh negatif"))]
    pub budget: Option<i64>,
}

/// ステータス変更リクエスト
#[derive(Debug, Deserialize, Validate)]
pub struct ChangeStatusDto {
    pub status: SpendingStatus,
    /// 精算完了時に差額を共有ウォレットへ記帳する
    #[serde(default)]
    pub record_to_wallet: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReceiptDto {
    pub amount: i64,
    #[validate(length(max = 500, message = "Deskripsi terlalu panjang"))]
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// 省略時は当日
    pub spent_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SpendingQuery {
    pub status: Option<SpendingStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_without_receipts_equals_budget() {
        let summary = SpendingSummary::new(1_500_000, 0, 0);
        assert_eq!(summary.diff, 1_500_000);

        let over = SpendingSummary::new(1_000_000, 1_250_000, 3);
        assert_eq!(over.diff, -250_000);
    }

    #[test]
    fn test_transition_guard() {
        use SpendingStatus::*;
        assert!(Draft.can_transition_to(Funded));
        assert!(Funded.can_transition_to(Spending));
        assert!(Spending.can_transition_to(NeedsRefund));
        assert!(NeedsReimburse.can_transition_to(Settled));

        assert!(!Draft.can_transition_to(Spending));
        assert!(!Settled.can_transition_to(Draft));
        assert!(!NeedsRefund.can_transition_to(NeedsReimburse));
        for &status in SpendingStatus::ALL {
            assert!(!status.can_transition_to(status));
            assert!(!Settled.can_transition_to(status));
        }
    }

    #[test]
    fn test_closing_status() {
        assert_eq!(SpendingStatus::closing_status(10), SpendingStatus::NeedsRefund);
        assert_eq!(SpendingStatus::closing_status(-1), SpendingStatus::NeedsReimburse);
        assert_eq!(SpendingStatus::closing_status(0), SpendingStatus::Settled);
    }

    #[test]
    fn test_all_labels() {
        let labels = SpendingStatus::all_labels();
        assert_eq!(labels.len(), 6);
        assert_eq!(labels[0].value, SpendingStatus::Draft);
        assert_eq!(labels[5].label, "Selesai");

        let json = serde_json::to_value(&labels[3]).unwrap();
        assert_eq!(json["value"], "NEEDS_REFUND");
    }
}
