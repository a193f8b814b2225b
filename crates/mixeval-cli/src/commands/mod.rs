pub mod compare;
pub mod eval;
pub mod init;
pub mod list_models;
pub mod sample;
pub mod validate;
