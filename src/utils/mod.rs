pub mod db_utils;
pub mod export;
pub mod lookup_cache;
pub mod pdf;
pub mod spreadsheet;
