pub mod connection;

pub use connection::{
    check_column_exists, create_in_memory_connection, create_tables, lock_connection,
    open_database, DbPool, GLOBAL_WALLET_NAME,
};
