pub mod id;
pub mod publish;
pub mod sanitize;
pub mod temp_dir;
