/// 共有ウォレット（Global Wallet）の台帳
pub mod handlers;
pub mod models;
pub mod repository;

pub use models::{EntrySource, EntryType, Wallet, WalletEntry, WalletOverview};
