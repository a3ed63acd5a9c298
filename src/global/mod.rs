//! Per-user locations: settings file, registry checkouts and the AWS config file.

pub mod utils;
