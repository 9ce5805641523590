use serde::{Deserialize, Serialize};
use validator::Validate;

crate::text_enum! {
    /// ウォレット記帳の種類
    pub enum EntryType {
        Credit => "CREDIT",
        Debit => "DEBIT",
    }
}

crate::text_enum! {
    /// 記帳の発生源
    pub enum EntrySource {
        Cashback => "CASHBACK",
        Manual => "MANUAL",
        /// 支出タスクの余剰金返金
        Refund => "REFUND",
        /// 支出タスクの立替精算
        Reimburse => "REIMBURSE",
    }
}

impl EntrySource {
    /// 支出タスクの精算で自動作成される記帳かどうか
    pub fn is_settlement(self) -> bool {
        matches!(self, EntrySource::Refund | EntrySource::Reimburse)
    }
}

impl EntryType {
    /// 残高への寄与（CREDITは+、DEBITは-）
    pub fn signed(self, amount: i64) -> i64 {
        match self {
            EntryType::Credit => amount,
            EntryType::Debit => -amount,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Wallet {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// ウォレットの記帳
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WalletEntry {
    pub id: i64,
    pub wallet_id: i64,
    pub amount: i64,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub source: EntrySource,
    pub description: Option<String>,
    pub occurred_at: String,
    pub created_by: i64,
    pub created_at: String,
}

impl WalletEntry {
    pub fn signed_amount(&self) -> i64 {
        self.entry_type.signed(self.amount)
    }
}

fn default_source() -> EntrySource {
    EntrySource::Manual
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateWalletEntryDto {
    pub amount: i64,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    #[serde(default = "default_source")]
    pub source: EntrySource,
    #[validate(length(max = 500, message = "Deskripsi terlalu panjang"))]
    pub description: Option<String>,
    /// 省略時は当日
    pub occurred_at: Option<String>,
}

/// ウォレットの概要（残高と履歴）
#[derive(Debug, Serialize, Clone)]
pub struct WalletOverview {
    pub wallet: Wallet,
    pub balance: i64,
    pub total_credit: i64,
    pub total_debit: i64,
    /// 新しい順
    pub entries: Vec<WalletEntry>,
}
