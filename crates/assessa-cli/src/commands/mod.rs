pub mod init;
pub mod start;
pub mod stats;
pub mod submit;
pub mod validate;
