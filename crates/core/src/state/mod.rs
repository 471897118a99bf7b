pub mod db;

pub use db::{PrismDb, QueryLogEntry};
