use crate::shared::utils::deserialize_nullable;
use serde::{Deserialize, Serialize};
use validator::Validate;

crate::text_enum! {
    /// 取引の種類
    pub enum TransactionType {
        Income => "INCOME",
        Expense => "EXPENSE",
    }
}

impl TransactionType {
    /// 残高への寄与（収入は+、支出は-）
    pub fn signed(self, amount: i64) -> i64 {
        match self {
            TransactionType::Income => amount,
            TransactionType::Expense => -amount,
        }
    }
}

/// 取引データモデル
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Transaction {
    pub id: i64,
    /// 常に正の値（符号は`transaction_type`で決まる）
    pub amount: i64,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub description: String,
    /// YYYY-MM-DD
    pub date: String,
    pub car_id: Option<i64>,
    pub created_by: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Transaction {
    pub fn signed_amount(&self) -> i64 {
        self.transaction_type.signed(self.amount)
    }
}

/// 取引作成用DTO
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTransactionDto {
    pub amount: i64,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    #[validate(length(min = 1, max = 500, message = "Deskripsi wajib diisi"))]
    pub description: String,
    pub date: String,
    pub car_id: Option<i64>,
}

/// 取引更新用DTO
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateTransactionDto {
    pub amount: Option<i64>,
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
    #[validate(length(min = 1, max = 500, message = "Deskripsi wajib diisi"))]
    pub description: Option<String>,
    pub date: Option<String>,
    /// `null`で車両との紐付けを解除する
    #[serde(default, deserialize_with = "deserialize_nullable")]
    pub car_id: Option<Option<i64>>,
}

/// 取引一覧の期間指定（両端を含む）
#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// 残高照会の条件
#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    /// この日付より前（当日を含まない）の残高
    pub date: String,
    pub exclude_id: Option<i64>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct BalanceResponse {
    pub date: String,
    pub balance: i64,
}

/// 取引と、その取引の直前の残高
#[derive(Debug, Serialize, Clone)]
pub struct TransactionWithBalance {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub balance_before: i64,
    pub balance_after: i64,
}

/// 期間内の取引台帳
#[derive(Debug, Serialize, Clone)]
pub struct TransactionLedger {
    pub opening_balance: i64,
    pub closing_balance: i64,
    pub total_income: i64,
    pub total_expense: i64,
    pub transactions: Vec<TransactionWithBalance>,
}
