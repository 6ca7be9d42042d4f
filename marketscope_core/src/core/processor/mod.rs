pub mod fetch;
pub mod full_scan;
