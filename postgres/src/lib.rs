pub mod db;
pub mod documents;
pub mod migrations;
