pub mod config;
pub mod coordinator;
pub mod db;
pub mod grid;
pub mod llm;
pub mod prompt;
pub mod schema;
pub mod util;
pub mod web;
