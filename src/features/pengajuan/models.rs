use crate::features::approval::ApprovalStatus;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 調達申請
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Pengajuan {
    pub id: i64,
    pub status: ApprovalStatus,
    pub notes: Option<String>,
    pub created_by: i64,
    pub decided_by: Option<i64>,
    pub decided_at: Option<String>,
    pub decision_note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// 申請明細
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PengajuanItem {
    pub id: i64,
    pub pengajuan_id: i64,
    /// 必要な物・作業
    pub requirement: String,
    pub cost_estimation: i64,
    pub car_id: Option<i64>,
    pub image_url: Option<String>,
}

/// 明細と見積合計を含む申請
#[derive(Debug, Serialize, Clone)]
pub struct PengajuanDetail {
    #[serde(flatten)]
    pub pengajuan: Pengajuan,
    pub items: Vec<PengajuanItem>,
    pub total_cost_estimation: i64,
}

impl PengajuanDetail {
    pub fn new(pengajuan: Pengajuan, items: Vec<PengajuanItem>) -> Self {
        let total_cost_estimation = items.iter().map(|item| item.cost_estimation).sum();
        Self {
            pengajuan,
            items,
            total_cost_estimation,
        }
    }
}

/// 申請明細の入力
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreatePengajuanItemDto {
    #[validate(length(min = 1, max = 500, message = "Kebutuhan wajib diisi"))]
    pub requirement: String,
    #[validate(range(min = 0, message = "Estimasi biaya tidak boleh negatif"))]
    pub cost_estimation: i64,
    pub car_id: Option<i64>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePengajuanDto {
    #[validate(length(max = 1000, message = "Catatan terlalu panjang"))]
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "Minimal satu item pengajuan"), nested)]
    pub items: Vec<CreatePengajuanItemDto>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_empty_items_rejected() {
        let dto: CreatePengajuanDto = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert!(dto.validate().is_err());
    }

    #[test]
    fn test_nested_item_validation() {
        let dto: CreatePengajuanDto = serde_json::from_str(
            r#"{"items": [{"requirement": "", "cost_estimation": 100}]}"#,
        )
        .unwrap();
        assert!(dto.validate().is_err());
    }

    #[test]
    fn test_total_cost_estimation() {
        let pengajuan = Pengajuan {
            id: 1,
            status: ApprovalStatus::Pending,
            notes: None,
            created_by: 1,
            decided_by: None,
            decided_at: None,
            decision_note: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        let item = |cost| PengajuanItem {
            id: 0,
            pengajuan_id: 1,
            requirement: "Ban".to_string(),
            cost_estimation: cost,
            car_id: None,
            image_url: None,
        };
        let detail = PengajuanDetail::new(pengajuan, vec![item(400_000), item(150_000)]);
        assert_eq!(detail.total_cost_estimation, 550_000);
    }
}
