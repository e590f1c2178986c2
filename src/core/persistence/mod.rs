pub mod credentials;
pub mod workdir;
