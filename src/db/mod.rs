pub mod db_pool;
pub mod query;
pub mod schema;
