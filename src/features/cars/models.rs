use serde::{Deserialize, Serialize};
use validator::Validate;

crate::text_enum! {
    /// 自動車税の種類
    pub enum TaxType {
        /// 年次税（STNK 1年）
        Annual => "ANNUAL",
        /// 5年ごとの更新（STNK 5年・プレート交換）
        FiveYear => "FIVE_YEAR",
    }
}

/// 車両データモデル
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Car {
    pub id: i64,
    pub name: String,
    /// 正規化済みナンバープレート（大文字、空白1つ区切り）
    pub license_plate: String,
    pub barcode: String,
    pub image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// 車両作成用DTO
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCarDto {
    #[validate(length(min = 1, max = 100, message = "Nama mobil wajib diisi"))]
    pub name: String,
    #[validate(length(min = 1, max = 20, message = "Plat nomor wajib diisi"))]
    pub license_plate: String,
    /// 省略時は自動生成
    #[validate(length(min = 1, max = 64, message = "Barcode tidak valid"))]
    pub barcode: Option<String>,
    pub image_url: Option<String>,
}

/// 車両更新用DTO
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateCarDto {
    #[validate(length(min = 1, max = 100, message = "Nama mobil wajib diisi"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 20, message = "Plat nomor wajib diisi"))]
    pub license_plate: Option<String>,
    #[validate(length(min = 1, max = 64, message = "Barcode tidak valid"))]
    pub barcode: Option<String>,
    pub image_url: Option<String>,
}

/// 車両一覧の検索条件
#[derive(Debug, Default, Deserialize)]
pub struct CarQuery {
    /// 名前またはナンバープレートの部分一致
    pub q: Option<String>,
}

/// 車両利用記録
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CarUsage {
    pub id: i64,
    pub car_id: i64,
    pub user_id: i64,
    pub purpose: String,
    pub destination: Option<String>,
    pub start_odometer: i64,
    pub end_odometer: Option<i64>,
    pub started_at: String,
    pub ended_at: Option<String>,
}

impl CarUsage {
    /// 走行距離（終了前はNone）
    pub fn distance(&self) -> Option<i64> {
        self.end_odometer.map(|end| end - self.start_odometer)
    }

    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// 利用開始用DTO
#[derive(Debug, Deserialize, Validate)]
pub struct StartUsageDto {
    #[validate(length(min = 1, max = 200, message = "Keperluan wajib diisi"))]
    pub purpose: String,
    pub destination: Option<String>,
    #[validate(range(min = 0, message = "Odometer tidak valid"))]
    pub start_odometer: i64,
}

/// 利用終了用DTO
#[derive(Debug, Deserialize, Validate)]
pub struct FinishUsageDto {
    #[validate(range(min = 0, message = "Odometer tidak valid"))]
    pub end_odometer: i64,
}

/// 給油記録
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FuelPurchase {
    pub id: i64,
    pub car_id: i64,
    pub user_id: i64,
    pub liters: f64,
    pub amount: i64,
    pub odometer: Option<i64>,
    pub receipt_url: Option<String>,
    /// 給油日（YYYY-MM-DD）
    pub purchased_at: String,
    pub created_at: String,
}

/// 給油記録作成用DTO
#[derive(Debug, Deserialize, Validate)]
pub struct CreateFuelPurchaseDto {
    #[validate(range(exclusive_min = 0.0, max = 1000.0, message = "Jumlah liter tidak valid"))]
    pub liters: f64,
    #[validate(range(min = 1, message = "Jumlah harus lebih dari 0"))]
    pub amount: i64,
    #[validate(range(min = 0, message = "Odometer tidak valid"))]
    pub odometer: Option<i64>,
    pub receipt_url: Option<String>,
    /// 省略時は今日
    pub purchased_at: Option<String>,
}

/// 自動車税の記録
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CarTax {
    pub id: i64,
    pub car_id: i64,
    pub tax_type: TaxType,
    pub amount: i64,
    /// 納付期限（YYYY-MM-DD）
    pub due_date: String,
    /// 納付日（未納はNone）
    pub paid_at: Option<String>,
    pub receipt_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// 自動車税作成用DTO
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCarTaxDto {
    pub tax_type: TaxType,
    #[validate(range(min = 1, message = "Jumlah harus lebih dari 0"))]
    pub amount: i64,
    pub due_date: String,
    #[validate(length(max = 500, message = "Catatan maksimal 500 karakter"))]
    pub notes: Option<String>,
}

/// 納付登録用DTO
#[derive(Debug, Default, Deserialize, Validate)]
pub struct PayCarTaxDto {
    /// 省略時は今日
    pub paid_at: Option<String>,
    pub receipt_url: Option<String>,
}

/// 納付期限が近い税（車両情報付き）
#[derive(Debug, Serialize, Clone)]
pub struct UpcomingTax {
    #[serde(flatten)]
    pub tax: CarTax,
    pub car_name: String,
    pub license_plate: String,
    /// 期限までの日数（期限切れは負数）
    pub days_until_due: i64,
}

/// 納付期限検索の条件
#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    pub days: Option<i64>,
}
