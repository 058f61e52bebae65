pub mod airport;
pub mod config;
pub mod init;
pub mod watch;
