/// 環境変数と実行環境の判定
pub mod environment;

/// サーバー設定
pub mod app_config;

pub use app_config::{mask_secret, AppConfig, ImageConfig, StorageConfig, WhatsAppConfig};
pub use environment::{
    get_database_filename, get_environment, initialize_logging_system,
    load_environment_variables, Environment, EnvironmentConfig, EnvVarError,
};
