// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod app;
pub mod http;
pub mod proxy;
pub mod response;
pub mod static_files;
pub mod ws;

pub use app::{build_state, StartupError};
pub use http::{router, AppState};
