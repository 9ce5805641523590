use crate::features::approval::ApprovalStatus;
use serde::{Deserialize, Serialize};
use validator::Validate;

crate::text_enum! {
    /// 承認の経路
    pub enum DecisionVia {
        /// アプリ内でADMINが操作
        InApp => "IN_APP",
        /// WhatsAppで送った承認リンク
        Token => "TOKEN",
    }
}

/// 出張・車両使用の許可申請
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Perizinan {
    pub id: i64,
    pub status: ApprovalStatus,
    pub purpose: String,
    pub destination: String,
    /// YYYY-MM-DD
    pub trip_date: String,
    pub passenger_count: i64,
    pub cost_estimate: i64,
    pub car_id: Option<i64>,
    pub notes: Option<String>,
    pub created_by: i64,
    pub token_expires_at: Option<String>,
    pub token_used_at: Option<String>,
    pub decided_by: Option<i64>,
    pub decided_via: Option<DecisionVia>,
    pub decided_at: Option<String>,
    pub decision_note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn default_passenger_count() -> i64 {
    1
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePerizinanDto {
    #[validate(length(min = 1, max = 500, message = "Tujuan perjalanan wajib diisi"))]
    pub purpose: String,
    #[validate(length(min = 1, max = 200, message = "Lokasi tujuan wajib diisi"))]
    pub destination: String,
    pub trip_date: String,
    #[serde(default = "default_passenger_count")]
    #[validate(range(min = 1, max = 100, message = "Jumlah penumpang tidak valid"))]
    pub passenger_count: i64,
    #[serde(default)]
    #[validate(range(min = 0, message = "Estimasi biaya tidak boleh negatif"))]
    pub cost_estimate: i64,
    pub car_id: Option<i64>,
    #[validate(length(max = 1000, message = "Catatan terlalu panjang"))]
    pub notes: Option<String>,
}

/// 作成結果（承認リンクを含む）
#[derive(Debug, Serialize, Clone)]
pub struct PerizinanCreated {
    pub perizinan: Perizinan,
    pub approval_link: String,
    pub notification_sent: bool,
}

/// トークン再発行リクエスト
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReissueTokenDto {
    /// 省略時は設定値（APPROVAL_TOKEN_VALID_HOURS）
    #[validate(range(min = 1, message = "Masa berlaku tidak valid"))]
    pub valid_hours: Option<i64>,
}

/// トークン再発行結果
#[derive(Debug, Serialize, Clone)]
pub struct TokenReissued {
    pub approval_link: String,
    pub token_expires_at: String,
}

/// 承認リンクから閲覧できる申請内容
#[derive(Debug, Serialize, Clone)]
pub struct PublicPerizinanView {
    pub id: i64,
    pub status: ApprovalStatus,
    pub purpose: String,
    pub destination: String,
    pub trip_date: String,
    pub passenger_count: i64,
    pub cost_estimate: i64,
    pub notes: Option<String>,
    pub requester_name: String,
    pub car_name: Option<String>,
    pub license_plate: Option<String>,
    pub token_expires_at: Option<String>,
}
