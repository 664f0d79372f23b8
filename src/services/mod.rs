pub mod csv_decoder;
pub mod lifecycle;
pub mod temp_store;
pub mod upload;
