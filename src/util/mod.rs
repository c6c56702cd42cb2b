pub mod logging;
pub mod sql;
