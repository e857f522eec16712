//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, the SSH
//! transport to the login host, the Slurm adapter, local port and process
//! handling, and the local session record.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod clock;
pub mod cluster;
pub mod command_runner;
pub mod config;
pub mod local;
pub mod network;
pub mod signals;
pub mod ssh;
pub mod state;
