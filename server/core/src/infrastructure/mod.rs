// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod auth;
pub mod disk;
pub mod image_metadata;
pub mod session_store;
pub mod settings_store;
pub mod transports;

pub use session_store::InMemorySessionStore;
pub use settings_store::{FileSettingsStore, MemorySettingsStore};
pub use transports::{default_registry, LocalTransport, MemoryTransport};
