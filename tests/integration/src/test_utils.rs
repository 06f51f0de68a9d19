//! Test utilities for cross-crate integration tests

use aethercore_c2_router::{
    C2Router, Command, CommandFrame, SignedCommand, TransportError, UnitAck, UnitTransport,
};
use aethercore_core::{current_time_ns, AppendLog, MemoryLog, NodeConfig, StorageError, TruthChainRecorder};
use aethercore_identity::IdentityRegistry;
use aethercore_unit_status::{
    AttestationToken, ConnectivityState, Coordinate, OperationalState, PlatformType, UnitStatus,
    UnitTelemetry,
};
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Test fixture for an identity with Ed25519 keys
pub struct TestDevice {
    pub node_id: String,
    pub signing_key: SigningKey,
}

impl TestDevice {
    /// Create a new test device with a generated Ed25519 keypair
    pub fn new(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Raw public key
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign a payload with the device's signing key
    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        self.signing_key.sign(payload).to_bytes().to_vec()
    }

    /// Register this device in the identity registry
    pub fn register(&self, registry: &IdentityRegistry) {
        registry.register(&self.node_id, self.public_key()).unwrap();
    }

    /// Status report with fresh, complete telemetry
    pub fn status(&self, timestamp_ns: u64) -> UnitStatus {
        UnitStatus {
            platform_id: self.node_id.clone(),
            serial_number: format!("SN-{}", self.node_id),
            nickname: None,
            device_type: PlatformType::FTCase,
            operational_state: OperationalState::Active,
            telemetry: UnitTelemetry {
                pressure_psi: Some(14.7),
                temperature_c: Some(21.5),
                battery_percent: Some(95),
                gps: Some(Coordinate {
                    lat: 45.0,
                    lon: -122.0,
                    alt: Some(120.0),
                }),
                connectivity: ConnectivityState::Connected,
                timestamp_ns,
                attestation: None,
            },
        }
    }

    /// Status report attested with this device's own key
    pub fn attested_status(&self, timestamp_ns: u64) -> UnitStatus {
        let mut status = self.status(timestamp_ns);
        status.telemetry.attestation = Some(AttestationToken {
            signer_id: self.node_id.clone(),
            signature: self.sign(&status.attestation_digest()),
        });
        status
    }
}

/// Sign `command` with every device in `signers`
pub fn sign_command(command: Command, signers: &[&TestDevice]) -> SignedCommand {
    let mut signed = SignedCommand::new(command);
    for device in signers {
        signed.sign(&device.node_id, &device.signing_key).unwrap();
    }
    signed
}

/// Transport that acknowledges everything except the units told to stay silent
#[derive(Default)]
pub struct FieldTransport {
    unreachable: HashSet<String>,
    deliveries: Mutex<HashMap<String, Vec<String>>>,
}

impl FieldTransport {
    /// Transport where `unreachable` units never answer
    pub fn with_unreachable(unreachable: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            unreachable: unreachable.iter().map(|s| s.to_string()).collect(),
            deliveries: Mutex::new(HashMap::new()),
        })
    }

    /// Command ids delivered to a unit, in order
    pub fn delivered(&self, unit_id: &str) -> Vec<String> {
        self.deliveries
            .lock()
            .unwrap()
            .get(unit_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl UnitTransport for FieldTransport {
    async fn deliver(&self, unit_id: &str, frame: &CommandFrame) -> Result<UnitAck, TransportError> {
        if self.unreachable.contains(unit_id) {
            return Err(TransportError::Unreachable(format!("{unit_id} out of range")));
        }
        self.deliveries
            .lock()
            .unwrap()
            .entry(unit_id.to_string())
            .or_default()
            .push(frame.command.command_id.clone());
        Ok(UnitAck {
            unit_id: unit_id.to_string(),
            received_at_ns: current_time_ns(),
        })
    }
}

/// Byte log that can be tampered with underneath a recorder
#[derive(Default)]
pub struct TamperableLog {
    inner: MemoryLog,
    overrides: Mutex<HashMap<(String, u64), Vec<u8>>>,
}

impl TamperableLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace the payload of a stored record without touching its hashes
    pub fn forge_payload(&self, chain: &str, index: u64, payload: &[u8]) {
        let raw = self.inner.read(chain, index).unwrap().unwrap();
        let mut record: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        record["payload_hex"] = serde_json::Value::String(hex::encode(payload));
        self.overrides
            .lock()
            .unwrap()
            .insert((chain.to_string(), index), serde_json::to_vec(&record).unwrap());
    }

    /// Undo every forgery
    pub fn restore(&self) {
        self.overrides.lock().unwrap().clear();
    }
}

impl AppendLog for TamperableLog {
    fn append(&self, chain: &str, expected_index: u64, record: &[u8]) -> Result<(), StorageError> {
        self.inner.append(chain, expected_index, record)
    }

    fn read(&self, chain: &str, index: u64) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(forged) = self.overrides.lock().unwrap().get(&(chain.to_string(), index)) {
            return Ok(Some(forged.clone()));
        }
        self.inner.read(chain, index)
    }

    fn len(&self, chain: &str) -> Result<u64, StorageError> {
        self.inner.len(chain)
    }

    fn chains(&self) -> Result<Vec<String>, StorageError> {
        self.inner.chains()
    }
}

/// A router wired from default configuration over `log`
pub struct TestNode {
    pub registry: Arc<IdentityRegistry>,
    pub recorder: Arc<TruthChainRecorder>,
    pub router: C2Router,
}

impl TestNode {
    pub fn new(config: &NodeConfig, log: Arc<dyn AppendLog>, transport: Arc<dyn UnitTransport>) -> Self {
        aethercore_core::logging::try_init();
        let registry = Arc::new(IdentityRegistry::new());
        let recorder = Arc::new(TruthChainRecorder::open(log).unwrap());
        let router = C2Router::from_config(config, Arc::clone(&registry), Arc::clone(&recorder), transport);
        Self {
            registry,
            recorder,
            router,
        }
    }
}
