pub mod dashboard;
pub mod file_record;
pub mod share;
pub mod upload;
pub mod view;
