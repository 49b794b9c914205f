pub mod calibrate;
pub mod ingest;
pub mod inventory;
pub mod status;
