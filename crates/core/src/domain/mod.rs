pub mod karma;
pub mod subject;
