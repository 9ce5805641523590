/// 入出金取引と残高計算
pub mod handlers;
pub mod models;
pub mod repository;

pub use models::{Transaction, TransactionType};
pub use repository::balance_before;
