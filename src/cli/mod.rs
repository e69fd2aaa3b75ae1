pub mod args;
pub mod color;
pub mod init;
pub mod ui;

pub use args::Cli;
