pub mod directory_service;
pub mod error;
pub mod notification_service;
pub mod stream_service;
