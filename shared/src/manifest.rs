//! Content plugin lists exchanged during the compatibility probe.

use serde::{Deserialize, Serialize};

/// One content plugin and the checksums accepted for it.
///
/// On the server side an empty `hashes` list accepts any checksum. On the
/// client side the first hash is the checksum of the installed file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PluginEntry {
    pub name: String,
    pub hashes: Vec<u32>,
}

impl PluginEntry {
    pub fn new(name: impl Into<String>, hashes: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            hashes,
        }
    }

    pub fn accepts_any(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// Ordered plugin list. Order is part of the contract.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct PluginManifest {
    pub entries: Vec<PluginEntry>,
}

impl PluginManifest {
    pub fn new(entries: Vec<PluginEntry>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, entry: PluginEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginEntry> {
        self.entries.iter()
    }

    /// `(name, hash)` pairs as advertised to the master directory. Plugins
    /// without a pinned checksum report 0.
    pub fn advertised(&self) -> Vec<(String, u32)> {
        self.entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.hashes.first().copied().unwrap_or(0)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advertised_uses_first_hash() {
        let manifest = PluginManifest::new(vec![
            PluginEntry::new("Morrowind.esm", vec![0x7B6A_F5B9, 0x34282D67]),
            PluginEntry::new("Custom.esp", vec![]),
        ]);

        assert_eq!(
            manifest.advertised(),
            vec![
                ("Morrowind.esm".to_string(), 0x7B6A_F5B9),
                ("Custom.esp".to_string(), 0)
            ]
        );
    }

    #[test]
    fn test_accepts_any() {
        assert!(PluginEntry::new("A", vec![]).accepts_any());
        assert!(!PluginEntry::new("A", vec![1]).accepts_any());
    }
}
