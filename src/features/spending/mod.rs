/// 支出タスク（予算・レシート・精算）
pub mod handlers;
pub mod models;
pub mod repository;

pub use models::{SpendingReceipt, SpendingStatus, SpendingSummary, SpendingTask};
