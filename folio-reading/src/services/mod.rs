pub mod permission_service;
pub mod privacy_service;
pub mod progress_service;
