//! # In-process Devnet
//!
//! Runs every validator of a network inside one process. Each node owns a
//! consensus engine, an in-memory chain and a channel broadcaster; a router
//! task per node forwards whatever it broadcasts to every other online node.
//!
//! Messages for a height a peer has not reached yet are parked and replayed
//! once that peer commits.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use shared_crypto::{BlsKeyPair, BlsSecretKey};
use shared_types::BlockNumber;
use tc_consensus::{
    BincodeSerializer, BlsSignatureService, BlsSigner, ChannelBroadcaster, ConsensusConfig,
    ConsensusDependencies, ConsensusMessage, ConsensusService, InMemoryExecution,
    MessageHandler, ProcessorResult, RoundRobinProposerSelector, SerializedCommit,
    StaticValidatorSet, ValidatorWallet,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Deterministic key seed of devnet validator `index`
pub fn validator_seed(index: usize) -> BlsSecretKey {
    let mut seed = [0x7du8; 32];
    seed[..8].copy_from_slice(&(index as u64).to_le_bytes());
    BlsSecretKey::from_bytes(&seed)
}

/// Key pair of devnet validator `index`
pub fn validator_keypair(index: usize) -> Result<BlsKeyPair> {
    BlsKeyPair::from_seed(&validator_seed(index))
        .with_context(|| format!("deriving key of validator {index}"))
}

/// Wallets of a devnet with `count` validators
pub fn validator_wallets(count: usize) -> Result<Vec<ValidatorWallet>> {
    (0..count)
        .map(|index| {
            let mut address = [0u8; 20];
            address[..8].copy_from_slice(&(index as u64 + 1).to_be_bytes());
            let key = validator_keypair(index)?.public_key().to_bytes();
            Ok(ValidatorWallet::new(address, key, 1_000_000))
        })
        .collect()
}

/// Devnet shape.
#[derive(Debug, Clone)]
pub struct DevnetOptions {
    pub validators: usize,
    pub consensus: ConsensusConfig,
    /// Validators that stay silent (never started, never reached)
    pub offline: Vec<usize>,
}

impl DevnetOptions {
    pub fn new(consensus: ConsensusConfig, validators: usize) -> Self {
        Self {
            validators,
            consensus,
            offline: Vec::new(),
        }
    }

    pub fn with_offline(mut self, offline: Vec<usize>) -> Self {
        self.offline = offline;
        self
    }
}

/// One online validator.
pub struct DevnetNode {
    pub index: usize,
    pub service: Arc<ConsensusService>,
    pub execution: Arc<InMemoryExecution>,
    parked: Mutex<Vec<ConsensusMessage>>,
}

impl DevnetNode {
    /// Height of the last block this node committed
    pub fn committed_height(&self) -> BlockNumber {
        self.execution.height()
    }

    async fn deliver(&self, message: ConsensusMessage) {
        let height = message.block_number();
        let kind = message.kind();
        match self
            .service
            .processors()
            .handle_message(message.clone(), false)
            .await
        {
            Ok(ProcessorResult::Skipped) if height > self.service.current_height() => {
                trace!(node = self.index, height, "[devnet] Parking future-height message");
                self.parked.lock().push(message);
            }
            Ok(result) => {
                trace!(
                    node = self.index,
                    kind = kind.as_str(),
                    result = result.as_str(),
                    "[devnet] Delivered"
                );
            }
            Err(e) => warn!(node = self.index, "[devnet] Delivery failed: {}", e),
        }
    }

    /// Replay parked messages after the node moved past `committed`
    async fn replay_parked(&self, committed: BlockNumber) {
        for _ in 0..200 {
            if self.service.current_height() > committed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let parked = std::mem::take(&mut *self.parked.lock());
        let current = self.service.current_height();
        let replay: Vec<_> = parked
            .into_iter()
            .filter(|message| message.block_number() >= current)
            .collect();
        if !replay.is_empty() {
            debug!(
                node = self.index,
                height = current,
                messages = replay.len(),
                "[devnet] Replaying parked messages"
            );
        }
        for message in replay {
            self.deliver(message).await;
        }
    }
}

/// A running devnet.
pub struct Devnet {
    nodes: Vec<Arc<DevnetNode>>,
    shutdown: watch::Sender<bool>,
    drivers: Vec<(usize, JoinHandle<tc_consensus::ConsensusResult<()>>)>,
    background: Vec<JoinHandle<()>>,
}

struct Wiring {
    node: Arc<DevnetNode>,
    events: tc_consensus::EventReceiver,
    outbound: mpsc::UnboundedReceiver<ConsensusMessage>,
    commits: mpsc::UnboundedReceiver<SerializedCommit>,
}

impl Devnet {
    /// Build every online node, enter height 1 and start routing.
    pub async fn launch(options: DevnetOptions) -> Result<Self> {
        options
            .consensus
            .validate()
            .context("invalid consensus configuration")?;
        if let Some(&index) = options.offline.iter().find(|&&i| i >= options.validators) {
            bail!("offline validator {index} is not in a set of {}", options.validators);
        }

        let wallets = validator_wallets(options.validators)?;
        let signatures = Arc::new(BlsSignatureService::new());
        let serializer = Arc::new(BincodeSerializer::new());

        let mut wiring = Vec::new();
        for index in (0..options.validators).filter(|i| !options.offline.contains(i)) {
            let (broadcaster, outbound) = ChannelBroadcaster::new();
            let (commit_tx, commits) = mpsc::unbounded_channel();
            let execution = Arc::new(InMemoryExecution::new().with_sink(commit_tx));

            let deps = ConsensusDependencies {
                validators: Arc::new(StaticValidatorSet::new(wallets.clone())),
                proposer_selector: Arc::new(RoundRobinProposerSelector::new(options.validators)),
                signatures: signatures.clone(),
                serializer: serializer.clone(),
                broadcaster: Arc::new(broadcaster),
                execution: execution.clone(),
                signer: Some(Arc::new(BlsSigner::new(validator_keypair(index)?))),
            };
            let (service, events) = ConsensusService::new(options.consensus.clone(), deps)
                .with_context(|| format!("creating consensus for validator {index}"))?;

            wiring.push(Wiring {
                node: Arc::new(DevnetNode {
                    index,
                    service: Arc::new(service),
                    execution,
                    parked: Mutex::new(Vec::new()),
                }),
                events,
                outbound,
                commits,
            });
        }
        if wiring.is_empty() {
            bail!("every validator is offline");
        }

        // Everyone enters height 1 before any broadcast is routed
        for wired in &wiring {
            wired
                .node
                .service
                .start(1)
                .await
                .with_context(|| format!("starting validator {}", wired.node.index))?;
        }

        let nodes: Vec<_> = wiring.iter().map(|wired| wired.node.clone()).collect();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut drivers = Vec::new();
        let mut background = Vec::new();

        for wired in wiring {
            let Wiring {
                node,
                events,
                outbound,
                commits,
            } = wired;
            let peers: Vec<_> = nodes
                .iter()
                .filter(|peer| peer.index != node.index)
                .cloned()
                .collect();

            background.push(tokio::spawn(route(node.index, outbound, peers)));
            background.push(tokio::spawn(replay_on_commit(node.clone(), commits)));

            let service = node.service.clone();
            let shutdown = shutdown_rx.clone();
            drivers.push((
                node.index,
                tokio::spawn(async move { service.run(events, shutdown).await }),
            ));
        }

        info!(
            validators = options.validators,
            online = nodes.len(),
            "[devnet] Devnet running"
        );
        Ok(Self {
            nodes,
            shutdown,
            drivers,
            background,
        })
    }

    pub fn nodes(&self) -> &[Arc<DevnetNode>] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&Arc<DevnetNode>> {
        self.nodes.iter().find(|node| node.index == index)
    }

    /// Lowest committed height among online nodes
    pub fn min_committed_height(&self) -> BlockNumber {
        self.nodes
            .iter()
            .map(|node| node.committed_height())
            .min()
            .unwrap_or_default()
    }

    /// Wait until every online node committed `height`
    pub async fn wait_for_height(&self, height: BlockNumber, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.min_committed_height() < height {
            if let Some((index, _)) = self.drivers.iter().find(|(_, task)| task.is_finished()) {
                bail!("consensus on validator {index} stopped before height {height}");
            }
            if tokio::time::Instant::now() >= deadline {
                bail!(
                    "timed out waiting for height {height} (lowest committed {})",
                    self.min_committed_height()
                );
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok(())
    }

    /// Stop every driver and router. Fails if any driver halted with an error.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        for task in &self.background {
            task.abort();
        }

        let mut failed = None;
        for (index, task) in self.drivers {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(node = index, "[devnet] Consensus halted: {}", e);
                    failed.get_or_insert(index);
                }
                Err(e) => {
                    error!(node = index, "[devnet] Driver task failed: {}", e);
                    failed.get_or_insert(index);
                }
            }
        }
        info!("[devnet] Devnet stopped");

        match failed {
            Some(index) => bail!("consensus on validator {index} did not stop cleanly"),
            None => Ok(()),
        }
    }
}

/// Forward one node's broadcasts to its peers
async fn route(
    from: usize,
    mut outbound: mpsc::UnboundedReceiver<ConsensusMessage>,
    peers: Vec<Arc<DevnetNode>>,
) {
    while let Some(message) = outbound.recv().await {
        trace!(
            from,
            kind = message.kind().as_str(),
            height = message.block_number(),
            round = message.round(),
            "[devnet] Routing"
        );
        for peer in &peers {
            peer.deliver(message.clone()).await;
        }
    }
}

async fn replay_on_commit(
    node: Arc<DevnetNode>,
    mut commits: mpsc::UnboundedReceiver<SerializedCommit>,
) {
    while let Some(commit) = commits.recv().await {
        node.replay_parked(commit.block_number()).await;
    }
}
