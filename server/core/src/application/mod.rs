// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod endpoint;
pub mod package_manager;
pub mod request_pipeline;
pub mod vfs_dispatcher;

pub use endpoint::{ApiMethod, Endpoint};
pub use package_manager::PackageManager;
pub use request_pipeline::{ApiError, RequestPipeline};
pub use vfs_dispatcher::{TransportRegistry, VfsDispatcher};
