// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Provides mod functionality for the system.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements mod

pub mod address;
pub mod auth;
pub mod config;
pub mod file_info;
pub mod mime;
pub mod mount;
pub mod package;
pub mod path_resolver;
pub mod path_sanitizer;
pub mod session;
pub mod settings;
pub mod transport;
pub mod vfs;
