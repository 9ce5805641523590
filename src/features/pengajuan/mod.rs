/// 調達申請（Pengajuan）
pub mod handlers;
pub mod models;
pub mod repository;

pub use models::{Pengajuan, PengajuanDetail, PengajuanItem};
