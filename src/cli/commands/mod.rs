//! One module per `docweave` subcommand.

pub mod config;
pub mod generate;
pub mod history;
pub mod init;
pub mod reconcile;
pub mod remove;
pub mod status;
pub mod verify;
