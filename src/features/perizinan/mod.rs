/// 出張・車両使用の許可申請（Perizinan）と承認リンク
pub mod handlers;
pub mod models;
pub mod repository;
pub mod token;

pub use models::{DecisionVia, Perizinan};
pub use token::{generate_approval_token, IssuedToken};
