//! Plugin compatibility probe and password handshake checks.

use crate::session::Session;
use shared::{PluginEntry, PluginManifest};

/// Why a client's plugin list was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Incompatibility {
    #[error("client loads {actual} plugins, server requires {expected}")]
    CountMismatch { expected: usize, actual: usize },
    #[error("plugin #{position} is {actual}, server requires {expected}")]
    NameMismatch {
        position: usize,
        expected: String,
        actual: String,
    },
    #[error("plugin #{position} ({name}) has checksum {hash:08X}, which is not accepted")]
    HashRejected {
        position: usize,
        name: String,
        hash: u32,
    },
    #[error("plugin #{position} ({name}) was sent without a checksum")]
    MissingHash { position: usize, name: String },
}

impl Incompatibility {
    pub fn position(&self) -> usize {
        match self {
            Incompatibility::CountMismatch { expected, actual } => (*expected).min(*actual),
            Incompatibility::NameMismatch { position, .. }
            | Incompatibility::HashRejected { position, .. }
            | Incompatibility::MissingHash { position, .. } => *position,
        }
    }
}

/// Walks the server manifest and the client list in lockstep and stops at
/// the first incompatible position.
///
/// Each client entry carries the checksum of its installed file as its first
/// hash. A server entry with no hashes accepts any checksum.
pub fn check_plugins(
    manifest: &PluginManifest,
    client: &[PluginEntry],
) -> Result<(), Incompatibility> {
    for (position, (required, offered)) in manifest.iter().zip(client).enumerate() {
        if required.name != offered.name {
            return Err(Incompatibility::NameMismatch {
                position,
                expected: required.name.clone(),
                actual: offered.name.clone(),
            });
        }

        if required.accepts_any() {
            continue;
        }

        match offered.hashes.first() {
            Some(hash) if required.hashes.contains(hash) => {}
            Some(hash) => {
                return Err(Incompatibility::HashRejected {
                    position,
                    name: offered.name.clone(),
                    hash: *hash,
                })
            }
            None => {
                return Err(Incompatibility::MissingHash {
                    position,
                    name: offered.name.clone(),
                })
            }
        }
    }

    if manifest.len() != client.len() {
        return Err(Incompatibility::CountMismatch {
            expected: manifest.len(),
            actual: client.len(),
        });
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("handshake was already completed")]
    AlreadyHandshaked,
    #[error("wrong server password")]
    WrongPassword,
}

/// Decides whether a freshly decoded handshake may complete.
pub fn check_handshake(session: &Session, server_password: &str) -> Result<(), HandshakeError> {
    if session.is_handshaked() {
        return Err(HandshakeError::AlreadyHandshaked);
    }
    if session.password != server_password {
        return Err(HandshakeError::WrongPassword);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRegistry;
    use crate::transport::ConnectionId;

    fn manifest() -> PluginManifest {
        PluginManifest::new(vec![
            PluginEntry::new("A", vec![1, 2]),
            PluginEntry::new("B", vec![]),
        ])
    }

    fn client(entries: &[(&str, u32)]) -> Vec<PluginEntry> {
        entries
            .iter()
            .map(|(name, hash)| PluginEntry::new(*name, vec![*hash]))
            .collect()
    }

    #[test]
    fn test_accepted_hash_and_wildcard_pass() {
        assert_eq!(check_plugins(&manifest(), &client(&[("A", 2), ("B", 999)])), Ok(()));
    }

    #[test]
    fn test_rejected_hash_fails_at_first_position() {
        let result = check_plugins(&manifest(), &client(&[("A", 3), ("B", 1)]));
        assert_eq!(
            result,
            Err(Incompatibility::HashRejected {
                position: 0,
                name: "A".to_string(),
                hash: 3,
            })
        );
        assert_eq!(result.unwrap_err().position(), 0);
    }

    #[test]
    fn test_name_mismatch() {
        let result = check_plugins(&manifest(), &client(&[("A", 1), ("C", 1)]));
        assert!(matches!(
            result,
            Err(Incompatibility::NameMismatch { position: 1, .. })
        ));
    }

    #[test]
    fn test_length_mismatch_fails() {
        assert_eq!(
            check_plugins(&manifest(), &client(&[("A", 1)])),
            Err(Incompatibility::CountMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            check_plugins(&manifest(), &client(&[("A", 1), ("B", 1), ("C", 1)])),
            Err(Incompatibility::CountMismatch {
                expected: 2,
                actual: 3
            })
        );
    }

    #[test]
    fn test_missing_hash_against_pinned_entry() {
        let offered = vec![PluginEntry::new("A", vec![]), PluginEntry::new("B", vec![])];
        assert!(matches!(
            check_plugins(&manifest(), &offered),
            Err(Incompatibility::MissingHash { position: 0, .. })
        ));
    }

    #[test]
    fn test_empty_manifest_accepts_empty_list() {
        assert_eq!(check_plugins(&PluginManifest::default(), &[]), Ok(()));
    }

    #[test]
    fn test_handshake_checks() {
        let mut registry = SessionRegistry::new(2);
        let conn = ConnectionId(1);
        let session = registry.create(conn).unwrap();
        session.password = "secret".to_string();

        assert_eq!(
            check_handshake(registry.get(conn).unwrap(), "other"),
            Err(HandshakeError::WrongPassword)
        );
        assert_eq!(check_handshake(registry.get(conn).unwrap(), "secret"), Ok(()));

        registry.complete_handshake(conn);
        assert_eq!(
            check_handshake(registry.get(conn).unwrap(), "secret"),
            Err(HandshakeError::AlreadyHandshaked)
        );
    }
}
