// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Transport Infrastructure Module
//!
//! Concrete implementations of the Transport trait and the factory that
//! registers them at startup.

pub mod local;
pub mod memory;

pub use local::LocalTransport;
pub use memory::MemoryTransport;

use std::sync::Arc;

use crate::application::vfs_dispatcher::TransportRegistry;

/// Registry holding every transport compiled into the server
pub fn default_registry() -> TransportRegistry {
    let mut registry = TransportRegistry::new();
    registry.register(Arc::new(LocalTransport::new()));
    registry.register(Arc::new(MemoryTransport::new()));
    registry
}
