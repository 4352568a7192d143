pub mod csrf;
pub mod db;
pub mod errors;
pub mod flash;
pub mod helpers;
