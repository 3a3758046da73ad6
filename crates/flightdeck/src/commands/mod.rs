pub mod cleanup;
pub mod cluster;
pub mod config;
pub mod domain;
pub mod infra;
pub mod stacks;
