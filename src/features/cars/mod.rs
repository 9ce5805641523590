/// 車両管理機能（登録・利用記録・給油・自動車税）
pub mod fuel_repository;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod tax_repository;
pub mod usage_repository;

pub use models::{Car, CarTax, CarUsage, FuelPurchase, TaxType};
