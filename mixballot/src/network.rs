use crate::*;
use ed25519_dalek::{Keypair, PublicKey, Signature};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Address of a node on the network
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(address: &str) -> Self {
        Address(address.to_string())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node taking part in shuffles
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub address: Address,

    #[serde(with = "EdPublicKeyHex")]
    pub public_key: PublicKey,
}

/// Ordered list of the nodes of the network
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Roster {
    pub members: Vec<Member>,
}

impl Roster {
    pub fn new(members: Vec<Member>) -> Self {
        Roster { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.members.iter().map(|m| m.address.clone()).collect()
    }

    /// Find the member owning the given key
    pub fn find_key(&self, public_key: &PublicKey) -> Option<&Member> {
        self.members.iter().find(|m| &m.public_key == public_key)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_cbor::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(serde_cbor::from_slice(bytes)?)
    }
}

/// Messages exchanged between nodes
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Message {
    /// Ask the receiver to shuffle the given election, hex encoded. The first
    /// address is the coordinator.
    StartShuffle {
        election_id: String,
        addresses: Vec<Address>,
    },
}

/// Opens streams to other nodes
pub trait Rpc: Send + Sync {
    /// Open a stream to the given nodes, valid for `timeout`
    fn stream(&self, timeout: Duration, to: &[Address]) -> Result<Box<dyn Sender>, Error>;
}

/// Sending half of a stream
pub trait Sender: Send + Sync {
    /// Send a message to each address.
    ///
    /// Delivery failures are reported on the returned channel, which is
    /// closed once every message has been handed over.
    fn send(&self, message: Message, to: &[Address]) -> mpsc::Receiver<Error>;
}

/// Signs on behalf of a node
pub trait Signer: Send + Sync {
    fn public_key(&self) -> PublicKey;

    fn sign(&self, message: &[u8]) -> Signature;
}

impl Signer for Keypair {
    fn public_key(&self) -> PublicKey {
        self.public
    }

    fn sign(&self, message: &[u8]) -> Signature {
        ed25519_dalek::Signer::sign(self, message)
    }
}

/// Processes messages received by a node
pub trait MessageHandler: Send + Sync {
    fn process(&self, from: &Address, message: Message) -> Result<(), Error>;
}

/// In-process network delivering messages to registered handlers
///
/// Every delivery runs on a tokio blocking task, so `send` must be called
/// from within a runtime.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    handlers: Arc<Mutex<HashMap<Address, Arc<dyn MessageHandler>>>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, address: Address, handler: Arc<dyn MessageHandler>) {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(address, handler);
    }

    /// Remove a node, messages sent to it are reported as failures
    pub fn unregister(&self, address: &Address) {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(address);
    }

    /// RPC endpoint of the node at `address`
    pub fn rpc(&self, address: Address) -> LocalRpc {
        LocalRpc {
            address,
            network: self.clone(),
        }
    }

    fn handler(&self, address: &Address) -> Option<Arc<dyn MessageHandler>> {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(address)
            .cloned()
    }
}

pub struct LocalRpc {
    address: Address,
    network: LocalNetwork,
}

impl Rpc for LocalRpc {
    fn stream(&self, timeout: Duration, to: &[Address]) -> Result<Box<dyn Sender>, Error> {
        debug!(from = %self.address, peers = to.len(), "opening local stream");
        Ok(Box::new(LocalSender {
            from: self.address.clone(),
            network: self.network.clone(),
            deadline: Instant::now() + timeout,
        }))
    }
}

struct LocalSender {
    from: Address,
    network: LocalNetwork,
    deadline: Instant,
}

impl Sender for LocalSender {
    fn send(&self, message: Message, to: &[Address]) -> mpsc::Receiver<Error> {
        let (errors, receiver) = mpsc::channel(std::cmp::max(1, to.len()));

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                let _ = errors.try_send(Error::Network(e.to_string()));
                return receiver;
            }
        };

        for address in to {
            if Instant::now() > self.deadline {
                let _ = errors.try_send(Error::Network(format!("stream to {} expired", address)));
                continue;
            }

            let handler = match self.network.handler(address) {
                Some(handler) => handler,
                None => {
                    let _ = errors.try_send(Error::Network(format!("unknown address {}", address)));
                    continue;
                }
            };

            let from = self.from.clone();
            let node = address.clone();
            let message = message.clone();
            runtime.spawn_blocking(move || {
                if let Err(e) = handler.process(&from, message) {
                    warn!(node = %node, error = %e, "failed to process message");
                }
            });
        }

        receiver
    }
}
