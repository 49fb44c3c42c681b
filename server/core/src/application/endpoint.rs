// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Request classification
//!
//! | Path                    | Endpoint                         |
//! |-------------------------|----------------------------------|
//! | `/FS/get/<address>`     | file download                    |
//! | `/FS/<method>`          | VFS operation                    |
//! | `/API/<method>`         | named API method                 |
//! | `/packages/<path>`      | package asset (permission gated) |
//! | anything else           | static asset from `http.dist`    |

use percent_encoding::percent_decode_str;
use std::fmt;

use crate::domain::vfs::VfsMethod;

pub const FS_PREFIX: &str = "/FS/";
pub const API_PREFIX: &str = "/API/";
pub const PACKAGES_PREFIX: &str = "/packages/";

/// Named API methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMethod {
    Login,
    Logout,
    Packages,
    Settings,
    Users,
}

impl ApiMethod {
    pub const ALL: [ApiMethod; 5] = [
        ApiMethod::Login,
        ApiMethod::Logout,
        ApiMethod::Packages,
        ApiMethod::Settings,
        ApiMethod::Users,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiMethod::Login => "login",
            ApiMethod::Logout => "logout",
            ApiMethod::Packages => "packages",
            ApiMethod::Settings => "settings",
            ApiMethod::Users => "users",
        }
    }

    /// Everything except `login` needs a valid session first
    pub fn requires_session(&self) -> bool {
        !matches!(self, ApiMethod::Login)
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Stream the file at a VFS address
    FsGet(String),
    Fs(VfsMethod),
    Api(ApiMethod),
    /// Dist-relative path below `packages/`
    PackageAsset(String),
    /// Dist-relative path
    Static(String),
    /// Reserved prefix with an unsupported method name
    UnknownMethod(String),
}

impl Endpoint {
    /// Classify a raw (still percent-encoded) request path
    pub fn classify(raw_path: &str) -> Self {
        let path = percent_decode_str(raw_path).decode_utf8_lossy().into_owned();

        if let Some(rest) = path.strip_prefix(FS_PREFIX) {
            if let Some(address) = rest.strip_prefix("get/") {
                return Endpoint::FsGet(address.to_string());
            }
            return match VfsMethod::parse(rest) {
                Some(method) => Endpoint::Fs(method),
                None => Endpoint::UnknownMethod(rest.to_string()),
            };
        }

        if let Some(rest) = path.strip_prefix(API_PREFIX) {
            return match ApiMethod::parse(rest) {
                Some(method) => Endpoint::Api(method),
                None => Endpoint::UnknownMethod(rest.to_string()),
            };
        }

        if path.starts_with(PACKAGES_PREFIX) {
            return Endpoint::PackageAsset(path.trim_start_matches('/').to_string());
        }

        Endpoint::Static(path.trim_start_matches('/').to_string())
    }

    /// Classify a WebSocket `path` field, which may omit the leading slash
    pub fn classify_message(path: &str) -> Self {
        if path.starts_with('/') {
            Self::classify(path)
        } else {
            Self::classify(&format!("/{}", path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(Endpoint::classify("/FS/scandir"), Endpoint::Fs(VfsMethod::Scandir));
        assert_eq!(Endpoint::classify("/FS/freeSpace"), Endpoint::Fs(VfsMethod::FreeSpace));
        assert_eq!(
            Endpoint::classify("/FS/get/home:///docs/a%20b.txt"),
            Endpoint::FsGet("home:///docs/a b.txt".to_string())
        );
        assert_eq!(Endpoint::classify("/API/login"), Endpoint::Api(ApiMethod::Login));
        assert_eq!(
            Endpoint::classify("/API/shutdown"),
            Endpoint::UnknownMethod("shutdown".to_string())
        );
        assert_eq!(
            Endpoint::classify("/packages/default/Writer/main.js"),
            Endpoint::PackageAsset("packages/default/Writer/main.js".to_string())
        );
        assert_eq!(Endpoint::classify("/"), Endpoint::Static(String::new()));
        assert_eq!(Endpoint::classify("/css/app.css"), Endpoint::Static("css/app.css".to_string()));
    }

    #[test]
    fn test_classify_message() {
        assert_eq!(Endpoint::classify_message("FS/read"), Endpoint::Fs(VfsMethod::Read));
        assert_eq!(Endpoint::classify_message("/API/settings"), Endpoint::Api(ApiMethod::Settings));
    }

    #[test]
    fn test_only_login_skips_session_check() {
        for method in ApiMethod::ALL {
            assert_eq!(method.requires_session(), method != ApiMethod::Login);
        }
    }
}
