pub mod config;
pub mod db;
pub mod llm;
pub mod notify;
pub mod util;
pub mod viz;
pub mod web;
