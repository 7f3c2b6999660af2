//! Provider integration tests.

#[path = "providers/local_test.rs"]
mod local_test;
#[path = "providers/logger_test.rs"]
mod logger_test;
#[cfg(feature = "smtp")]
#[path = "providers/smtp_test.rs"]
mod smtp_test;
