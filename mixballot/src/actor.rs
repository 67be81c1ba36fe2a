use crate::*;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Source of time for the polling loop
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Real time, through tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Coordinates the shuffle of an election by the whole roster
///
/// Only one shuffle runs at a time on a given actor. Making sure a single
/// actor coordinates an election across processes is up to the caller.
pub struct Actor<R: Rpc, S: Store> {
    address: Address,
    rpc: R,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: ShuffleConfig,
    lock: Mutex<()>,
}

impl<R: Rpc, S: Store> Actor<R, S> {
    pub fn new(address: Address, rpc: R, store: Arc<S>, config: ShuffleConfig) -> Self {
        Actor {
            address,
            rpc,
            store,
            clock: Arc::new(TokioClock),
            config,
            lock: Mutex::new(()),
        }
    }

    /// Use another clock for polling
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Ask every roster member to shuffle the election and wait until the
    /// shuffle threshold is reached.
    pub async fn shuffle(&self, election_id: &[u8]) -> Result<(), Error> {
        let _guard = self.lock.lock().await;

        let election_id = hex::encode(election_id);
        let election = self.store.get_election(&election_id)?;
        let roster = election.roster()?;
        if roster.is_empty() {
            return Err(Error::EmptyRoster);
        }

        // Ourselves first, then the others in roster order
        let mut addresses = vec![self.address.clone()];
        addresses.extend(
            roster
                .addresses()
                .into_iter()
                .filter(|address| *address != self.address),
        );

        info!(
            election = %election_id,
            nodes = addresses.len(),
            threshold = election.shuffle_threshold,
            "starting shuffle"
        );

        let sender = self
            .rpc
            .stream(self.config.stream_timeout, &addresses)
            .map_err(|e| Error::BroadcastError(e.to_string()))?;
        let message = Message::StartShuffle {
            election_id: election_id.clone(),
            addresses: addresses.clone(),
        };
        let mut errors = sender.send(message, &addresses);

        match tokio::time::timeout(self.config.stream_timeout, errors.recv()).await {
            Ok(None) => {}
            Ok(Some(e)) => {
                warn!(election = %election_id, error = %e, "broadcast failed");
                return Err(Error::BroadcastError(e.to_string()));
            }
            Err(_) => {
                warn!(election = %election_id, "broadcast timed out");
                return Err(Error::BroadcastError(format!(
                    "timed out after {:?}",
                    self.config.stream_timeout
                )));
            }
        }

        let attempts = self.config.poll_attempts(roster.len());
        let wait = self.config.poll_wait(roster.len());
        let mut round = 0;
        let mut threshold = election.shuffle_threshold;

        for attempt in 0..attempts {
            let election = self.store.get_election(&election_id)?;
            round = election.round();
            threshold = election.shuffle_threshold;

            if round >= threshold {
                info!(election = %election_id, round, "shuffle threshold reached");
                return Ok(());
            }

            debug!(election = %election_id, round, threshold, attempt, "waiting for shuffles");
            self.clock.sleep(wait).await;
        }

        Err(Error::ThresholdNotReached { round, threshold })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::tests::{closed_election, nodes, Nodes};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// Counts sleeps and returns immediately
    #[derive(Default)]
    struct CountingClock(AtomicUsize);

    impl Clock for CountingClock {
        fn sleep(&self, _duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        }
    }

    /// Records when each sleep starts and ends, yielding in between
    #[derive(Default)]
    struct RecordingClock(Arc<std::sync::Mutex<Vec<&'static str>>>);

    impl Clock for RecordingClock {
        fn sleep(&self, _duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
            let events = self.0.clone();
            Box::pin(async move {
                events.lock().unwrap().push("start");
                tokio::task::yield_now().await;
                events.lock().unwrap().push("end");
            })
        }
    }

    /// Delivers messages synchronously, skipping silent nodes
    struct DirectRpc {
        handlers: Vec<(Address, Arc<dyn MessageHandler>)>,
        fail: bool,
    }

    struct DirectSender {
        handlers: Vec<(Address, Arc<dyn MessageHandler>)>,
        fail: bool,
    }

    impl Rpc for DirectRpc {
        fn stream(&self, _timeout: Duration, _to: &[Address]) -> Result<Box<dyn Sender>, Error> {
            Ok(Box::new(DirectSender {
                handlers: self.handlers.clone(),
                fail: self.fail,
            }))
        }
    }

    impl Sender for DirectSender {
        fn send(&self, message: Message, to: &[Address]) -> mpsc::Receiver<Error> {
            let (errors, receiver) = mpsc::channel(1);
            if self.fail {
                errors
                    .try_send(Error::Network("connection refused".to_string()))
                    .unwrap();
                return receiver;
            }
            for address in to {
                if let Some((_, handler)) = self.handlers.iter().find(|(a, _)| a == address) {
                    let from = to[0].clone();
                    handler.process(&from, message.clone()).unwrap();
                }
            }
            receiver
        }
    }

    fn actor(
        nodes: &Nodes,
        silent: &[usize],
        fail: bool,
    ) -> (Actor<DirectRpc, MemStore>, Arc<CountingClock>) {
        let handlers = (0..nodes.keys.len())
            .filter(|i| !silent.contains(i))
            .map(|i| {
                let handler: Arc<dyn MessageHandler> = Arc::new(nodes.responder(i));
                (nodes.roster.members[i].address.clone(), handler)
            })
            .collect();

        let clock = Arc::new(CountingClock::default());
        let actor = Actor::new(
            Address::new("node0"),
            DirectRpc { handlers, fail },
            nodes.store.clone(),
            ShuffleConfig::default(),
        )
        .with_clock(clock.clone());
        (actor, clock)
    }

    #[tokio::test]
    async fn test_shuffle() {
        let mut rng = ChaCha20Rng::seed_from_u64(60);
        let nodes = nodes(4, &mut rng);
        let (election_id, _) = closed_election(&nodes.store, 3, Some(4), &mut rng);
        let (actor, clock) = actor(&nodes, &[], false);

        actor
            .shuffle(&hex::decode(&election_id).unwrap())
            .await
            .unwrap();

        let election = nodes.store.get_election(&election_id).unwrap();
        assert_eq!(election.shuffle_instances.len(), 4);
        assert_eq!(election.status, Status::ShuffledBallots);
        assert_eq!(clock.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_threshold_not_reached() {
        let mut rng = ChaCha20Rng::seed_from_u64(61);
        let nodes = nodes(4, &mut rng);
        let (election_id, _) = closed_election(&nodes.store, 3, Some(4), &mut rng);
        let (actor, clock) = actor(&nodes, &[3], false);

        let err = actor
            .shuffle(&hex::decode(&election_id).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ThresholdNotReached {
                round: 3,
                threshold: 4
            }
        ));
        assert!(err.to_string().contains("3 < 4"));

        // 10 attempts per member, one sleep per attempt
        assert_eq!(clock.0.load(Ordering::SeqCst), 40);
    }

    #[tokio::test]
    async fn test_shuffle_errors() {
        let mut rng = ChaCha20Rng::seed_from_u64(62);
        let nodes = nodes(2, &mut rng);
        let (election_id, _) = closed_election(&nodes.store, 2, None, &mut rng);

        let (actor, _) = actor(&nodes, &[], true);
        assert!(matches!(
            actor.shuffle(&hex::decode(&election_id).unwrap()).await,
            Err(Error::BroadcastError(_))
        ));

        assert!(matches!(
            actor.shuffle(&[0xde, 0xad]).await,
            Err(Error::NotFound(_))
        ));

        // An election whose roster snapshot is empty
        let mut election = nodes.store.get_election(&election_id).unwrap();
        election.election_id = "0a0b".to_string();
        election.roster_buf = Roster::default().to_bytes().unwrap();
        nodes.store.set_election(&election).unwrap();
        assert!(matches!(
            actor.shuffle(&[0x0a, 0x0b]).await,
            Err(Error::EmptyRoster)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_shuffles_do_not_overlap() {
        let mut rng = ChaCha20Rng::seed_from_u64(63);
        let nodes = nodes(4, &mut rng);
        let (election_id, _) = closed_election(&nodes.store, 3, Some(4), &mut rng);
        let clock = Arc::new(RecordingClock::default());
        let (actor, _) = actor(&nodes, &[3], false);
        let actor = actor.with_clock(clock.clone());

        let election_id = hex::decode(&election_id).unwrap();
        let (first, second) = tokio::join!(actor.shuffle(&election_id), actor.shuffle(&election_id));
        assert!(matches!(first, Err(Error::ThresholdNotReached { .. })));
        assert!(matches!(second, Err(Error::ThresholdNotReached { .. })));

        // Both runs polled to exhaustion, one after the other
        let events = clock.0.lock().unwrap();
        assert_eq!(events.len(), 2 * 2 * 40);
        for pair in events.chunks(2) {
            assert_eq!(pair, ["start", "end"]);
        }
    }
}
