// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Path Resolver
//!
//! Maps `protocol://path` to the owning mountpoint and substitutes the
//! destination template tokens to obtain a concrete filesystem path.
//!
//! | Token          | Replacement                          |
//! |----------------|--------------------------------------|
//! | `%DIST%`       | client distribution directory        |
//! | `%DROOT%`      | server root directory                |
//! | `%MOUNTPOINT%` | protocol name of the address         |
//! | `%UID%`        | session user id                      |
//! | `%USERNAME%`   | session username                     |
//!
//! Tokens are replaced in the order above, each with a single literal
//! pass. Unknown `%TOKENS%` are left untouched.

use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::address::VfsAddress;
use crate::domain::mount::{MountTable, Mountpoint};
use crate::domain::path_sanitizer::PathSanitizer;
use crate::domain::session::Session;
use crate::domain::vfs::VfsError;

/// Concrete location of an address for the duration of one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// The address as given by the caller
    pub query: String,
    pub protocol: String,
    /// Normalized mount-relative path
    pub path: String,
    /// Filesystem path, `None` when the mount has no destination
    pub real: Option<PathBuf>,
    address: VfsAddress,
}

impl ResolvedPath {
    pub fn address(&self) -> &VfsAddress {
        &self.address
    }

    /// Real path or a rejection naming the address
    pub fn real_path(&self) -> Result<&PathBuf, VfsError> {
        self.real
            .as_ref()
            .ok_or_else(|| VfsError::TransportNotFound(format!("no destination for {}", self.query)))
    }
}

/// Directories substituted for `%DIST%` and `%DROOT%`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverEnv {
    pub dist: PathBuf,
    pub root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    mounts: Arc<MountTable>,
    env: ResolverEnv,
    sanitizer: PathSanitizer,
}

impl PathResolver {
    pub fn new(mounts: Arc<MountTable>, env: ResolverEnv) -> Self {
        Self {
            mounts,
            env,
            sanitizer: PathSanitizer::new(),
        }
    }

    pub fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    /// Owning mountpoint of an address
    pub fn mount_for(&self, query: &str) -> Result<(&Mountpoint, VfsAddress), VfsError> {
        let address = VfsAddress::parse(query)?;
        let mount = self
            .mounts
            .lookup(address.protocol())
            .ok_or_else(|| VfsError::TransportNotFound(address.protocol().to_string()))?;
        Ok((mount, address))
    }

    pub fn resolve(&self, query: &str, session: &Session) -> Result<ResolvedPath, VfsError> {
        let (mount, address) = self.mount_for(query)?;

        let real = match &mount.destination {
            Some(template) => {
                let root = PathBuf::from(self.substitute(template, address.protocol(), session)?);
                Some(self.sanitizer.contain(&root, address.path())?)
            }
            None => None,
        };

        Ok(ResolvedPath {
            query: query.to_string(),
            protocol: address.protocol().to_string(),
            path: address.path().to_string(),
            real,
            address,
        })
    }

    fn substitute(&self, template: &str, protocol: &str, session: &Session) -> Result<String, VfsError> {
        let first_user_token = [template.find("%UID%"), template.find("%USERNAME%")]
            .into_iter()
            .flatten()
            .min();

        let (uid, username) = match first_user_token {
            Some(_) => {
                let username = session.username().ok_or_else(|| {
                    VfsError::PermissionDenied(format!("mount '{}' requires a logged in user", protocol))
                })?;
                let uid = session.user_id().unwrap_or(username);
                (user_token(uid, protocol)?, user_token(username, protocol)?)
            }
            None => ("", ""),
        };

        let root = self
            .fixed_tokens(template, protocol)
            .replace("%UID%", uid)
            .replace("%USERNAME%", username);

        // User values are single segments, so the root keeps the fixed prefix
        if let Some(idx) = first_user_token {
            let prefix = self.fixed_tokens(&template[..idx], protocol);
            if !root.starts_with(&prefix) {
                return Err(VfsError::PermissionDenied(format!(
                    "mount '{}' resolves outside {}",
                    protocol, prefix
                )));
            }
        }
        Ok(root)
    }

    fn fixed_tokens(&self, template: &str, protocol: &str) -> String {
        template
            .replace("%DIST%", &self.env.dist.to_string_lossy())
            .replace("%DROOT%", &self.env.root.to_string_lossy())
            .replace("%MOUNTPOINT%", protocol)
    }
}

/// A user id or name must be one plain path segment
fn user_token<'a>(value: &'a str, protocol: &str) -> Result<&'a str, VfsError> {
    let plain = !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', '\0']);
    if plain {
        Ok(value)
    } else {
        tracing::warn!(protocol = %protocol, value = %value.escape_debug(), "Rejected user token in mount template");
        Err(VfsError::PermissionDenied(format!(
            "mount '{}' cannot be resolved for this user",
            protocol
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mount::{MountConfig, MountOptions, WILDCARD_MOUNT};
    use crate::domain::session::UserProfile;

    fn alice() -> Session {
        Session::new("s1").with_user(UserProfile {
            id: "1001".to_string(),
            username: "alice".to_string(),
            name: "Alice".to_string(),
            groups: vec![],
        })
    }

    fn resolver() -> PathResolver {
        let mounts = MountTable::new()
            .with_mount("home", MountConfig::Template("/srv/users/%USERNAME%".to_string()))
            .with_mount("uid", MountConfig::Template("/srv/uid/%UID%".to_string()))
            .with_mount("osjs", MountConfig::Template("%DIST%".to_string()))
            .with_mount("root", MountConfig::Template("%DROOT%/%MOUNTPOINT%/%UNKNOWN%".to_string()))
            .with_mount(
                "mem",
                MountConfig::Detailed(MountOptions {
                    destination: None,
                    transport: "example".to_string(),
                    enabled: true,
                    ro: false,
                    groups: vec![],
                }),
            )
            .with_mount(WILDCARD_MOUNT, MountConfig::Template("/srv/shared/%MOUNTPOINT%".to_string()));

        PathResolver::new(
            Arc::new(mounts),
            ResolverEnv {
                dist: PathBuf::from("/opt/cloudesk/dist"),
                root: PathBuf::from("/opt/cloudesk"),
            },
        )
    }

    #[test]
    fn test_username_substitution() {
        let resolved = resolver().resolve("home://docs/a.txt", &alice()).unwrap();
        assert_eq!(resolved.protocol, "home");
        assert_eq!(resolved.path, "/docs/a.txt");
        assert_eq!(resolved.query, "home://docs/a.txt");
        assert_eq!(resolved.real, Some(PathBuf::from("/srv/users/alice/docs/a.txt")));
    }

    #[test]
    fn test_uid_and_dist_tokens() {
        let r = resolver();
        assert_eq!(
            r.resolve("uid:///x", &alice()).unwrap().real,
            Some(PathBuf::from("/srv/uid/1001/x"))
        );
        assert_eq!(
            r.resolve("osjs:///index.html", &alice()).unwrap().real,
            Some(PathBuf::from("/opt/cloudesk/dist/index.html"))
        );
    }

    #[test]
    fn test_unknown_tokens_untouched() {
        let resolved = resolver().resolve("root:///a", &alice()).unwrap();
        assert_eq!(resolved.real, Some(PathBuf::from("/opt/cloudesk/root/%UNKNOWN%/a")));
    }

    #[test]
    fn test_wildcard_and_mountpoint_token() {
        let resolved = resolver().resolve("team:///notes", &alice()).unwrap();
        assert_eq!(resolved.real, Some(PathBuf::from("/srv/shared/team/notes")));
    }

    #[test]
    fn test_no_destination_leaves_real_empty() {
        let resolved = resolver().resolve("mem:///a", &alice()).unwrap();
        assert_eq!(resolved.real, None);
        assert!(matches!(resolved.real_path(), Err(VfsError::TransportNotFound(_))));
    }

    #[test]
    fn test_user_token_without_user() {
        let err = resolver().resolve("home:///a", &Session::new("anon")).unwrap_err();
        assert!(matches!(err, VfsError::PermissionDenied(_)));
    }

    #[test]
    fn test_user_tokens_must_be_plain_segments() {
        for name in ["../outside", "..", ".", "a/b", "a\\b", "nul\0", ""] {
            let session = Session::new("s2").with_user(UserProfile {
                id: "7".to_string(),
                username: name.to_string(),
                name: name.to_string(),
                groups: vec![],
            });
            let err = resolver().resolve("home:///secret.txt", &session).unwrap_err();
            assert!(matches!(err, VfsError::PermissionDenied(_)), "{name:?}");
        }

        let session = Session::new("s3").with_user(UserProfile {
            id: "../../etc".to_string(),
            username: "mallory".to_string(),
            name: "Mallory".to_string(),
            groups: vec![],
        });
        assert!(matches!(
            resolver().resolve("uid:///passwd", &session),
            Err(VfsError::PermissionDenied(_))
        ));
        // Templates without user tokens ignore the user entirely
        assert!(resolver().resolve("osjs:///index.html", &session).is_ok());
    }

    #[test]
    fn test_traversal_rejected() {
        let err = resolver().resolve("home:///docs/../../bob/secret", &alice()).unwrap_err();
        assert!(matches!(err, VfsError::PermissionDenied(_)));
    }

    #[test]
    fn test_unconfigured_protocol_without_wildcard() {
        let r = PathResolver::new(Arc::new(MountTable::new()), ResolverEnv::default());
        assert!(matches!(
            r.resolve("home:///a", &alice()),
            Err(VfsError::TransportNotFound(_))
        ));
    }
}
