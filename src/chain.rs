//! Fork choice and reorganization
//!
//! [`ChainSelector`] owns the block index, the best tip and the orphan pool
//! behind one mutex: every block connect or reorganization runs with that
//! lock held, so exactly one chain mutation is in flight at a time.
//! Context-free validation happens before the lock is taken.
//!
//! Every mutation is staged in a [`UtxoViewpoint`] and written as a single
//! [`WriteBatch`] before any in-memory state changes. A failure at any point
//! before that write leaves storage, the index and the tip as they were.
//! Readers see the last committed [`ChainSnapshot`] and events are published
//! only after the commit they describe.

use crate::block::{check_block_header_context, check_block_sanity, connect_block, ConnectContext};
use crate::block_index::{BlockIndex, BlockNode, BlockStatus};
use crate::chain_params::ChainParams;
use crate::config::ChainConfig;
use crate::crypto::calculate_tx_id;
use crate::error::{reject, ChainError, Result, RuleKind, RuleViolation};
use crate::notify::{ChainEvent, Notifier};
use crate::orphan::OrphanPool;
use crate::script::{verify_scripts, ScriptCheck, ScriptVerifier};
use crate::serialization::{deserialize_block, serialize_block};
use crate::storage::{Column, KeyValueStore, WriteBatch};
use crate::time::Clock;
use crate::transaction::{check_transaction, check_tx_inputs, is_coinbase, is_final_tx};
use crate::types::*;
use crate::utxo::{UtxoDiff, UtxoEntry, UtxoSet, UtxoViewpoint};
use crossbeam_channel::Receiver;
use lru::LruCache;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, error, info, warn};

const BEST_TIP_KEY: &[u8] = b"best_tip";

/// Committed best-chain state visible to readers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSnapshot {
    pub tip: BlockHash,
    pub height: Natural,
    pub cumulative_work: u128,
    pub median_time_past: u32,
}

/// What happened to a submitted block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Now on the best chain, by extending the tip or through a reorganization
    MainChain(BlockHash),
    /// Stored on a branch with no more work than the best chain
    SideChain(BlockHash),
    /// Parent unknown; held until it arrives
    Orphaned(BlockHash),
}

impl SubmitOutcome {
    pub fn hash(&self) -> BlockHash {
        match self {
            SubmitOutcome::MainChain(h) | SubmitOutcome::SideChain(h) | SubmitOutcome::Orphaned(h) => *h,
        }
    }

    /// Whether the block entered the block index
    pub fn is_accepted(&self) -> bool {
        !matches!(self, SubmitOutcome::Orphaned(_))
    }
}

/// Result of an accepted standalone transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxAcceptance {
    pub txid: Hash,
    pub fee: i64,
}

/// Where the tip is in its state machine. Only `Connected` is ever observable
/// outside a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorgPhase {
    Connected,
    Disconnecting,
    Connecting,
}

impl fmt::Display for ReorgPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReorgPhase::Connected => "connected",
            ReorgPhase::Disconnecting => "disconnecting",
            ReorgPhase::Connecting => "connecting",
        };
        f.write_str(name)
    }
}

struct ChainState {
    index: BlockIndex,
    tip: BlockHash,
    phase: ReorgPhase,
    orphans: OrphanPool,
    /// Blocks that failed validation before entering the index, most recent
    /// kept when full. A forgotten block is simply validated again.
    rejected: LruCache<BlockHash, ()>,
}

pub struct ChainSelector<S> {
    params: Arc<ChainParams>,
    config: ChainConfig,
    store: Arc<S>,
    utxo: UtxoSet<Arc<S>>,
    verifier: Arc<dyn ScriptVerifier>,
    clock: Arc<dyn Clock>,
    state: Mutex<ChainState>,
    snapshot: RwLock<Arc<ChainSnapshot>>,
    notifier: Notifier,
}

impl<S: KeyValueStore> ChainSelector<S> {
    /// Open the chain held in `store`, writing genesis if the store is empty
    ///
    /// On a non-empty store the block index is rebuilt from persisted
    /// metadata and the best chain is re-marked from the stored tip.
    pub fn open(
        params: Arc<ChainParams>,
        config: ChainConfig,
        store: Arc<S>,
        verifier: Arc<dyn ScriptVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let utxo = UtxoSet::new(Arc::clone(&store));
        let genesis = &params.genesis_block;

        let (index, tip) = match store.get(Column::Meta, BEST_TIP_KEY)? {
            None => {
                let index = BlockIndex::with_genesis(&genesis.header);
                write_genesis(&*store, &utxo, &index, genesis, params.genesis_hash)?;
                info!(network = %params.network, genesis = %params.genesis_hash, "initialized new chain");
                (index, params.genesis_hash)
            }
            Some(bytes) => {
                let tip = BlockHash(bytes.as_slice().try_into().map_err(|_| {
                    ChainError::Corrupt(format!("best tip record is {} bytes", bytes.len()).into())
                })?);
                let mut index = BlockIndex::load(&*store, &genesis.header)?;
                let path = index.path_from(&params.genesis_hash, &tip)?;
                index.set_in_main_chain(&params.genesis_hash, true)?;
                for hash in &path {
                    index.set_in_main_chain(hash, true)?;
                }
                info!(network = %params.network, %tip, height = path.len(), blocks = index.len(), "loaded chain");
                (index, tip)
            }
        };

        let snapshot = snapshot_of(&index, &tip)?;
        let state = ChainState {
            index,
            tip,
            phase: ReorgPhase::Connected,
            orphans: OrphanPool::new(&config.orphans),
            rejected: LruCache::new(
                NonZeroUsize::new(config.validation.max_rejected_blocks).unwrap_or(NonZeroUsize::MIN),
            ),
        };
        let notifier = Notifier::new(config.notifications.subscriber_capacity);

        Ok(ChainSelector {
            params,
            config,
            store,
            utxo,
            verifier,
            clock,
            state: Mutex::new(state),
            snapshot: RwLock::new(Arc::new(snapshot)),
            notifier,
        })
    }

    /// Submit a block received from the network
    ///
    /// Structural checks run first, without the chain lock. A block whose
    /// parent is unknown is held as an orphan. An accepted block releases any
    /// orphans waiting on it, and those on them in turn.
    pub fn submit_block(&self, block: Block) -> Result<SubmitOutcome> {
        let hash = block.block_hash();
        if let Err(e) = check_block_sanity(&block, &self.params) {
            warn!(%hash, error = %e, "block failed structural checks");
            return Err(e);
        }

        let mut state = self.lock_state();
        match self.accept_block(&mut state, block, hash) {
            Ok(outcome) => {
                if outcome.is_accepted() {
                    self.process_orphans(&mut state, hash);
                }
                Ok(outcome)
            }
            Err(e) => {
                // Orphans waiting on an invalid block can never connect
                if is_rejected(&state, &hash) {
                    self.process_orphans(&mut state, hash);
                }
                Err(e)
            }
        }
    }

    /// Validate a loose transaction against the best chain's UTXO set
    ///
    /// The transaction is checked as if it were included in the next block.
    /// Nothing is written; on success a `TransactionAccepted` event is
    /// published.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<TxAcceptance> {
        check_transaction(&tx)?;
        if is_coinbase(&tx) {
            return reject(RuleKind::CoinbaseNotAllowed, "coinbase outside a block");
        }
        let txid = calculate_tx_id(&tx);

        // The lock keeps the tip and the UTXO set consistent with each other
        let state = self.lock_state();
        let tip = tip_node(&state)?;
        let height = tip.height + 1;
        let median = state.index.median_time_past(&tip.hash).unwrap_or(0);
        if !is_final_tx(&tx, height, median) {
            return reject(RuleKind::NonFinalTransaction, format!("not final at height {height}"));
        }

        let resolved = check_tx_inputs(&tx, &self.utxo, height, &self.params)?;
        let checks: Vec<ScriptCheck<'_>> = resolved
            .spent
            .into_iter()
            .enumerate()
            .map(|(input_index, entry)| ScriptCheck {
                tx_index: 0,
                tx: &tx,
                input_index,
                locking_script: entry.script_pubkey,
                amount: entry.amount,
            })
            .collect();
        verify_scripts(
            &checks,
            &*self.verifier,
            height,
            self.config.validation.parallel_script_checks,
        )?;
        drop(checks);

        debug!(txid = %hex::encode(txid), fee = resolved.fee, "transaction accepted");
        self.notifier.publish([ChainEvent::TransactionAccepted(tx)]);
        drop(state);
        Ok(TxAcceptance {
            txid,
            fee: resolved.fee,
        })
    }

    pub fn subscribe(&self) -> Receiver<ChainEvent> {
        self.notifier.subscribe()
    }

    pub fn snapshot(&self) -> Arc<ChainSnapshot> {
        let cell = self
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*cell)
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn block_node(&self, hash: &BlockHash) -> Option<BlockNode> {
        self.lock_state().index.lookup(hash).cloned()
    }

    /// Whether the block is in the block index (orphans are not)
    pub fn contains_block(&self, hash: &BlockHash) -> bool {
        self.lock_state().index.contains(hash)
    }

    pub fn orphan_count(&self) -> usize {
        self.lock_state().orphans.len()
    }

    /// Hashes of the best chain, genesis first
    pub fn best_chain(&self) -> Result<Vec<BlockHash>> {
        let state = self.lock_state();
        best_chain_of(&state, self.params.genesis_hash)
    }

    /// Stored body of any block in the index
    pub fn block(&self, hash: &BlockHash) -> Result<Option<Block>> {
        match self.store.get(Column::BlockData, &hash.0)? {
            Some(bytes) => Ok(Some(deserialize_block(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn utxo(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>> {
        Ok(self.utxo.get(outpoint)?)
    }

    pub fn utxo_entries(&self) -> Result<BTreeMap<OutPoint, UtxoEntry>> {
        Ok(self.utxo.entries()?)
    }

    /// Rebuild the UTXO set from genesis by re-connecting every best-chain block
    pub fn replay_utxo_set(&self) -> Result<BTreeMap<OutPoint, UtxoEntry>> {
        let state = self.lock_state();
        let chain = best_chain_of(&state, self.params.genesis_hash)?;
        let mut set = BTreeMap::new();

        for hash in &chain {
            let block = self.load_block(hash)?;
            let node = state
                .index
                .lookup(hash)
                .ok_or(ChainError::UnknownBlock(*hash))?;
            let mut view = UtxoViewpoint::new(&set);
            match node.parent {
                None => {
                    for tx in &block.transactions {
                        view.add_transaction_outputs(tx, calculate_tx_id(tx), 0);
                    }
                }
                Some(parent) => {
                    let ctx = self.connect_context(&state.index, &parent);
                    connect_block(&block, node.height, &mut view, &ctx)?;
                }
            }
            let (changes, _) = view.into_parts();
            for outpoint in &changes.deletions {
                set.remove(outpoint);
            }
            set.extend(changes.additions);
        }
        Ok(set)
    }

    /// Compare the stored UTXO set against a full replay
    pub fn verify_utxo_set(&self) -> Result<()> {
        let replayed = self.replay_utxo_set()?;
        let stored = self.utxo_entries()?;
        if replayed == stored {
            return Ok(());
        }
        let missing = replayed.keys().filter(|k| !stored.contains_key(k)).count();
        let extra = stored.keys().filter(|k| !replayed.contains_key(k)).count();
        error!(missing, extra, "stored UTXO set diverges from replay");
        Err(ChainError::Corrupt(
            format!("UTXO set diverges from replay: {missing} missing, {extra} extra").into(),
        ))
    }

    fn lock_state(&self) -> MutexGuard<'_, ChainState> {
        // In-memory state is only touched after a successful commit, so a
        // panicked holder cannot have left it half-updated.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn connect_context(&self, index: &BlockIndex, parent: &BlockHash) -> ConnectContext<'_> {
        ConnectContext {
            params: &self.params,
            verifier: &*self.verifier,
            parallel_scripts: self.config.validation.parallel_script_checks,
            median_time_past: index.median_time_past(parent).unwrap_or(0),
        }
    }

    fn load_block(&self, hash: &BlockHash) -> Result<Block> {
        self.block(hash)?
            .ok_or_else(|| ChainError::Corrupt(format!("missing body for block {hash}").into()))
    }

    fn load_undo(&self, hash: &BlockHash) -> Result<UtxoDiff> {
        let bytes = self
            .store
            .get(Column::BlockUndo, &hash.0)?
            .ok_or_else(|| ChainError::Corrupt(format!("missing undo data for block {hash}").into()))?;
        Ok(UtxoDiff::decode(&bytes)?)
    }

    fn publish_snapshot(&self, state: &ChainState) -> Result<()> {
        let snapshot = snapshot_of(&state.index, &state.tip)?;
        let mut cell = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cell = Arc::new(snapshot);
        Ok(())
    }

    /// Route one structurally valid block. Caller holds the chain lock.
    fn accept_block(&self, state: &mut ChainState, block: Block, hash: BlockHash) -> Result<SubmitOutcome> {
        debug_assert_eq!(state.phase, ReorgPhase::Connected);

        if let Some(node) = state.index.lookup(&hash) {
            if node.status == BlockStatus::Invalid {
                return reject(RuleKind::PreviouslyRejected, format!("block {hash} is known invalid"));
            }
            return Err(ChainError::AlreadyKnown(hash));
        }
        if state.orphans.contains(&hash) {
            return Err(ChainError::AlreadyKnown(hash));
        }
        if state.rejected.contains(&hash) {
            return reject(RuleKind::PreviouslyRejected, format!("block {hash} was rejected before"));
        }

        let parent_hash = block.header.prev_block_hash;
        let Some(parent) = state.index.lookup(&parent_hash).cloned() else {
            if state.rejected.contains(&parent_hash) {
                state.rejected.put(hash, ());
                return reject(RuleKind::InvalidAncestor, format!("parent {parent_hash} was rejected"));
            }
            state.orphans.add(block, self.clock.now());
            return Ok(SubmitOutcome::Orphaned(hash));
        };
        if parent.status == BlockStatus::Invalid {
            state.rejected.put(hash, ());
            return reject(RuleKind::InvalidAncestor, format!("parent {parent_hash} is invalid"));
        }

        if let Err(e) = check_block_header_context(
            &block.header,
            &hash,
            &parent,
            &state.index,
            &self.params,
            self.clock.now(),
            self.config.validation.max_future_block_time_secs,
        ) {
            warn!(%hash, error = %e, "block failed header checks");
            remember_rejection(state, hash, &e);
            return Err(e);
        }

        let node = state.index.candidate(&block.header)?;
        if parent_hash == state.tip {
            self.extend_tip(state, &block, node)
        } else {
            self.accept_side_block(state, &block, node)
        }
    }

    fn extend_tip(&self, state: &mut ChainState, block: &Block, mut node: BlockNode) -> Result<SubmitOutcome> {
        let hash = node.hash;
        let parent = state.tip;
        let ctx = self.connect_context(&state.index, &parent);
        let mut view = UtxoViewpoint::new(&self.utxo);
        let fees = match connect_block(block, node.height, &mut view, &ctx) {
            Ok(fees) => fees,
            Err(e) => {
                warn!(%hash, height = node.height, error = %e, "block failed to connect");
                remember_rejection(state, hash, &e);
                return Err(e);
            }
        };
        let (changes, diff) = view.into_parts();

        node.status = BlockStatus::Valid;
        node.in_main_chain = true;

        let mut batch = WriteBatch::new();
        self.utxo.stage(&mut batch, &changes);
        batch.put(Column::BlockData, hash.0.to_vec(), serialize_block(block));
        batch.put(Column::BlockUndo, hash.0.to_vec(), diff.encode()?);
        BlockIndex::append_block_meta(&node, &mut batch)?;
        batch.put(Column::Meta, BEST_TIP_KEY, hash.0.to_vec());
        self.commit(batch)?;

        state.index.insert_node(node.clone());
        state.tip = hash;
        self.publish_snapshot(state)?;
        info!(%hash, height = node.height, txs = block.transactions.len(), fees, "new best tip");
        self.notifier.publish([ChainEvent::BlockConnected(node)]);
        Ok(SubmitOutcome::MainChain(hash))
    }

    fn accept_side_block(&self, state: &mut ChainState, block: &Block, mut node: BlockNode) -> Result<SubmitOutcome> {
        let hash = node.hash;
        node.status = BlockStatus::ValidHeader;

        let mut batch = WriteBatch::new();
        batch.put(Column::BlockData, hash.0.to_vec(), serialize_block(block));
        BlockIndex::append_block_meta(&node, &mut batch)?;
        self.commit(batch)?;
        state.index.insert_node(node.clone());

        let tip_work = tip_node(state)?.cumulative_work;
        if node.cumulative_work <= tip_work {
            debug!(%hash, height = node.height, "block accepted on side branch");
            return Ok(SubmitOutcome::SideChain(hash));
        }

        self.reorganize(state, hash)?;
        Ok(SubmitOutcome::MainChain(hash))
    }

    /// Switch the best chain to `new_tip`
    ///
    /// Disconnects from the current tip down to the fork point, then connects
    /// up to `new_tip`, all on one viewpoint. The result is committed in a
    /// single batch. If a block fails to connect nothing is written except
    /// that block and its descendants being marked invalid; the old tip stays.
    fn reorganize(&self, state: &mut ChainState, new_tip: BlockHash) -> Result<()> {
        let result = self.apply_reorg(state, new_tip);
        state.phase = ReorgPhase::Connected;
        result
    }

    fn apply_reorg(&self, state: &mut ChainState, new_tip: BlockHash) -> Result<()> {
        let old_tip = state.tip;
        let fork = state.index.common_ancestor(&old_tip, &new_tip)?.hash;
        let detach = state.index.path_from(&fork, &old_tip)?;
        let attach = state.index.path_from(&fork, &new_tip)?;
        info!(%old_tip, %new_tip, %fork, disconnect = detach.len(), connect = attach.len(), "reorganizing");

        let mut view = UtxoViewpoint::new(&self.utxo);
        let mut batch = WriteBatch::new();

        state.phase = ReorgPhase::Disconnecting;
        let mut disconnected = Vec::with_capacity(detach.len());
        for hash in detach.iter().rev() {
            view.undo(&self.load_undo(hash)?);
            debug!(phase = %state.phase, %hash, "staged disconnect");
            disconnected.push(*hash);
        }

        state.phase = ReorgPhase::Connecting;
        let mut connected = Vec::with_capacity(attach.len());
        for hash in &attach {
            let node = state
                .index
                .lookup(hash)
                .ok_or(ChainError::UnknownBlock(*hash))?;
            let (height, parent, was_valid) =
                (node.height, node.parent.unwrap_or(fork), node.status == BlockStatus::Valid);
            let block = self.load_block(hash)?;

            let ctx = self.connect_context(&state.index, &parent);
            let mut child = UtxoViewpoint::new(&view);
            match connect_block(&block, height, &mut child, &ctx) {
                Ok(_) => {
                    let (changes, diff) = child.into_parts();
                    view.merge(changes);
                    batch.put(Column::BlockUndo, hash.0.to_vec(), diff.encode()?);
                    debug!(phase = %state.phase, %hash, height, "staged connect");
                    connected.push(*hash);
                }
                Err(ChainError::Rule(violation)) => {
                    return self.abort_reorg(state, *hash, was_valid, violation);
                }
                Err(e) => return Err(e),
            }
        }

        let (changes, _) = view.into_parts();
        self.utxo.stage(&mut batch, &changes);
        for hash in &connected {
            if let Some(node) = state.index.lookup(hash) {
                let mut record = node.clone();
                record.status = BlockStatus::Valid;
                BlockIndex::append_block_meta(&record, &mut batch)?;
            }
        }
        batch.put(Column::Meta, BEST_TIP_KEY, new_tip.0.to_vec());
        self.commit(batch)?;

        // Committed; bring memory in line
        let mut events = Vec::with_capacity(disconnected.len() + connected.len());
        for hash in &disconnected {
            state.index.set_in_main_chain(hash, false)?;
            if let Some(node) = state.index.lookup(hash) {
                events.push(ChainEvent::BlockDisconnected(node.clone()));
            }
        }
        for hash in &connected {
            state.index.set_status(hash, BlockStatus::Valid)?;
            state.index.set_in_main_chain(hash, true)?;
            if let Some(node) = state.index.lookup(hash) {
                events.push(ChainEvent::BlockConnected(node.clone()));
            }
        }
        state.tip = new_tip;
        state.phase = ReorgPhase::Connected;
        self.publish_snapshot(state)?;

        let height = tip_node(state)?.height;
        info!(tip = %new_tip, height, %fork, depth = disconnected.len(), "reorganization complete");
        self.notifier.publish(events);
        Ok(())
    }

    /// A block failed while connecting during a reorganization. Mark it and
    /// everything built on it invalid; UTXO state and tip are untouched.
    fn abort_reorg(
        &self,
        state: &mut ChainState,
        hash: BlockHash,
        was_valid: bool,
        violation: RuleViolation,
    ) -> Result<()> {
        let mut invalid = Vec::new();
        let mut pending = vec![hash];
        while let Some(current) = pending.pop() {
            pending.extend(state.index.children_of(&current));
            invalid.push(current);
        }

        let mut batch = WriteBatch::new();
        for h in &invalid {
            if let Some(node) = state.index.lookup(h) {
                let mut record = node.clone();
                record.status = BlockStatus::Invalid;
                BlockIndex::append_block_meta(&record, &mut batch)?;
            }
        }
        self.commit(batch)?;
        for h in &invalid {
            state.index.set_status(h, BlockStatus::Invalid)?;
        }

        if was_valid {
            error!(%hash, error = %violation, "previously valid block failed during reorganization");
            Err(ChainError::ReorgInvariantBroken { hash, violation })
        } else {
            warn!(%hash, error = %violation, invalidated = invalid.len(), "reorganization aborted");
            Err(ChainError::Rule(violation))
        }
    }

    /// Feed released orphans back through acceptance, breadth first
    fn process_orphans(&self, state: &mut ChainState, parent: BlockHash) {
        let mut queue = VecDeque::from([parent]);
        while let Some(parent) = queue.pop_front() {
            for block in state.orphans.take_children(&parent) {
                let hash = block.block_hash();
                match self.accept_block(state, block, hash) {
                    Ok(outcome) if outcome.is_accepted() => {
                        debug!(%hash, %parent, "orphan released");
                        queue.push_back(hash);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(%hash, error = %e, "released orphan rejected");
                        // Its own waiting children now fail as InvalidAncestor
                        if is_rejected(state, &hash) {
                            queue.push_back(hash);
                        }
                    }
                }
            }
        }
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        let ops = batch.len();
        self.store.write_batch(batch).map_err(|e| {
            error!(ops, error = %e, "chain state commit failed");
            ChainError::from(e)
        })
    }
}

impl<S: KeyValueStore> ChainSelector<S> {
    /// Open with the network named in `config`
    pub fn open_with_config(
        config: ChainConfig,
        store: Arc<S>,
        verifier: Arc<dyn ScriptVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let params = Arc::new(ChainParams::for_network(config.network));
        Self::open(params, config, store, verifier, clock)
    }
}

fn write_genesis<S: KeyValueStore + ?Sized>(
    store: &S,
    utxo: &UtxoSet<impl KeyValueStore>,
    index: &BlockIndex,
    genesis: &Block,
    hash: BlockHash,
) -> Result<()> {
    let mut view = UtxoViewpoint::new(utxo);
    for tx in &genesis.transactions {
        view.add_transaction_outputs(tx, calculate_tx_id(tx), 0);
    }
    let (changes, diff) = view.into_parts();
    let node = index.lookup(&hash).ok_or(ChainError::UnknownBlock(hash))?;

    let mut batch = WriteBatch::new();
    utxo.stage(&mut batch, &changes);
    batch.put(Column::BlockData, hash.0.to_vec(), serialize_block(genesis));
    batch.put(Column::BlockUndo, hash.0.to_vec(), diff.encode()?);
    BlockIndex::append_block_meta(node, &mut batch)?;
    batch.put(Column::Meta, BEST_TIP_KEY, hash.0.to_vec());
    store.write_batch(batch)?;
    Ok(())
}

fn remember_rejection(state: &mut ChainState, hash: BlockHash, err: &ChainError) {
    if let ChainError::Rule(violation) = err {
        if violation.kind.is_permanent() {
            state.rejected.put(hash, ());
        }
    }
}

/// Whether `hash` is known to be invalid, in the index or the rejection cache
fn is_rejected(state: &ChainState, hash: &BlockHash) -> bool {
    state.rejected.contains(hash)
        || state
            .index
            .lookup(hash)
            .is_some_and(|node| node.status == BlockStatus::Invalid)
}

fn tip_node(state: &ChainState) -> Result<&BlockNode> {
    state
        .index
        .lookup(&state.tip)
        .ok_or(ChainError::UnknownBlock(state.tip))
}

fn best_chain_of(state: &ChainState, genesis: BlockHash) -> Result<Vec<BlockHash>> {
    let mut chain = vec![genesis];
    chain.extend(state.index.path_from(&genesis, &state.tip)?);
    Ok(chain)
}

fn snapshot_of(index: &BlockIndex, tip: &BlockHash) -> Result<ChainSnapshot> {
    let node = index.lookup(tip).ok_or(ChainError::UnknownBlock(*tip))?;
    Ok(ChainSnapshot {
        tip: node.hash,
        height: node.height,
        cumulative_work: node.cumulative_work,
        median_time_past: index
            .median_time_past(tip)
            .unwrap_or(node.header.timestamp),
    })
}
