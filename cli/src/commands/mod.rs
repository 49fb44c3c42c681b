// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Cloudesk CLI

pub mod config;
pub mod packages;

pub use self::config::ConfigCommand;
pub use self::packages::PackagesCommand;
