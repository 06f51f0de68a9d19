//! Genesis hash binding a provisioned device to its key.
//!
//! `genesis_hash = BLAKE3(hardware_id || public_key_hex || salt)` over the
//! UTF-8 concatenation, rendered as lowercase hex. The values are hashed
//! back to back with no separator; provisioning tools on both ends of the
//! cable reproduce exactly this layout.

use serde::{Deserialize, Serialize};

/// Compute the genesis hash for a device.
pub fn genesis_hash(hardware_id: &str, public_key_hex: &str, salt: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(hardware_id.as_bytes());
    hasher.update(public_key_hex.as_bytes());
    hasher.update(salt.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// How a device was provisioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceClass {
    /// Flashed over a USB/serial tether
    #[serde(rename = "USB")]
    Tethered,
    /// Installed remotely over the network
    #[serde(rename = "NET")]
    Network,
}

/// Identity block emitted when a device is provisioned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityBlock {
    /// Registry id of the node
    pub node_id: String,
    /// Hex-encoded Ed25519 public key
    pub public_key: String,
    /// Genesis hash, lowercase hex
    pub root_hash: String,
    /// Provisioning time (milliseconds since epoch)
    pub timestamp: u64,
    /// Provisioning path
    pub device_type: DeviceClass,
}

impl IdentityBlock {
    /// Build a block, deriving the genesis hash from the hardware id and salt.
    pub fn provision(
        node_id: &str,
        hardware_id: &str,
        public_key: &[u8; 32],
        salt: &str,
        timestamp: u64,
        device_type: DeviceClass,
    ) -> Self {
        let public_key = hex::encode(public_key);
        Self {
            node_id: node_id.to_string(),
            root_hash: genesis_hash(hardware_id, &public_key, salt),
            public_key,
            timestamp,
            device_type,
        }
    }

    /// Check the block's genesis hash against the claimed hardware id and salt.
    pub fn verify(&self, hardware_id: &str, salt: &str) -> bool {
        genesis_hash(hardware_id, &self.public_key, salt) == self.root_hash
    }

    /// Decode the public key for registry registration.
    pub fn public_key_bytes(&self) -> Option<[u8; 32]> {
        hex::decode(&self.public_key).ok()?.try_into().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_vector() {
        let public_key_hex = "aa".repeat(32);
        assert_eq!(
            genesis_hash("AA:BB:CC:DD:EE:FF", &public_key_hex, "test-salt-12345"),
            "5aa61945715d82358e2f53fc4f86f5a34b0d54b2408b7aed07f1266e34f9725e"
        );
    }

    #[test]
    fn test_concatenation_has_no_separator() {
        assert_eq!(genesis_hash("ab", "cd", "ef"), genesis_hash("a", "bcd", "ef"));
        assert_ne!(genesis_hash("ab", "cd", "ef"), genesis_hash("ab", "cd", "eg"));
    }

    #[test]
    fn test_identity_block_provision_and_verify() {
        let block = IdentityBlock::provision(
            "node_abc123",
            "AA:BB:CC:DD:EE:FF",
            &[0xaa; 32],
            "test-salt-12345",
            1_234_567_890,
            DeviceClass::Tethered,
        );
        assert_eq!(
            block.root_hash,
            "5aa61945715d82358e2f53fc4f86f5a34b0d54b2408b7aed07f1266e34f9725e"
        );
        assert!(block.verify("AA:BB:CC:DD:EE:FF", "test-salt-12345"));
        assert!(!block.verify("AA:BB:CC:DD:EE:00", "test-salt-12345"));
        assert_eq!(block.public_key_bytes(), Some([0xaa; 32]));

        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains("\"device_type\":\"USB\""));
    }
}
