pub mod analyze;
pub mod ask;
pub mod upload;
