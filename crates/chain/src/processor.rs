//! The block processor: turns tip-height notifications into an ordered
//! stream of block events.

use std::{future::Future, sync::Arc};

use alloy_primitives::B256;
use parking_lot::RwLock;
use pisa_primitives::Block;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

use crate::{
    backoff::{retry_with_backoff, RetryPolicy},
    cache::BlockCache,
    client::{block_by_hash_checked, block_by_number_checked, ChainClient},
    error::{BlockCacheError, ChainClientError},
    event::BlockEvent,
};

/// Handle for observing the processor's view of the chain head.
#[derive(Debug)]
pub struct BlockProcessorHandle {
    head_rx: watch::Receiver<Option<B256>>,
}

impl BlockProcessorHandle {
    /// Returns a watcher over the current head hash.
    pub fn head_watcher(&self) -> watch::Receiver<Option<B256>> {
        self.head_rx.clone()
    }
}

/// Builder for the block processor task.
#[derive(Debug)]
pub struct BlockProcessorBuilder<C> {
    client: Arc<C>,
    cache: Arc<RwLock<BlockCache>>,
    heights_rx: mpsc::Receiver<u64>,
    events_tx: mpsc::Sender<BlockEvent>,
    retry_policy: Option<RetryPolicy>,
}

impl<C: ChainClient> BlockProcessorBuilder<C> {
    /// Creates a builder wiring the notifier input to the event output.
    pub fn new(
        client: Arc<C>,
        cache: Arc<RwLock<BlockCache>>,
        heights_rx: mpsc::Receiver<u64>,
        events_tx: mpsc::Sender<BlockEvent>,
    ) -> Self {
        Self {
            client,
            cache,
            heights_rx,
            events_tx,
            retry_policy: None,
        }
    }

    /// Overrides the RPC retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Builds the handle and the task future.
    pub fn build(self) -> (BlockProcessorHandle, impl Future<Output = ()>) {
        let (head_tx, head_rx) = watch::channel(None);
        let ctx = BlockProcessorCtx {
            client: self.client,
            cache: self.cache,
            events_tx: self.events_tx,
            head_tx,
            retry: self.retry_policy.unwrap_or_default(),
        };
        let task = block_processor_task(self.heights_rx, ctx);
        (BlockProcessorHandle { head_rx }, task)
    }
}

struct BlockProcessorCtx<C> {
    client: Arc<C>,
    cache: Arc<RwLock<BlockCache>>,
    events_tx: mpsc::Sender<BlockEvent>,
    head_tx: watch::Sender<Option<B256>>,
    retry: RetryPolicy,
}

enum ProcessorError {
    Chain(ChainClientError),
    /// The event consumer went away; the processor has nothing left to do.
    ChannelClosed,
}

impl From<ChainClientError> for ProcessorError {
    fn from(error: ChainClientError) -> Self {
        ProcessorError::Chain(error)
    }
}

impl<C: ChainClient> BlockProcessorCtx<C> {
    async fn send_event(&self, event: BlockEvent) -> Result<(), ProcessorError> {
        self.events_tx
            .send(event)
            .await
            .map_err(|_| ProcessorError::ChannelClosed)
    }
}

async fn block_processor_task<C: ChainClient>(
    mut heights_rx: mpsc::Receiver<u64>,
    ctx: BlockProcessorCtx<C>,
) {
    // Prime from the current chain tip so listeners get one synthetic head
    // event before any notification arrives.
    match prime(&ctx).await {
        Ok(()) => {}
        Err(ProcessorError::ChannelClosed) => return,
        Err(ProcessorError::Chain(err)) => {
            error!(%err, "failed to prime block processor; waiting for notifications");
        }
    }

    while let Some(height) = heights_rx.recv().await {
        match process_new_tip(height, &ctx).await {
            Ok(()) => {}
            Err(ProcessorError::ChannelClosed) => {
                warn!("block event channel closed; block processor exiting");
                return;
            }
            Err(ProcessorError::Chain(err)) => {
                // The next notification walks the same ancestry again.
                warn!(%err, height, "failed to process chain tip");
            }
        }
    }

    debug!("height notifications closed; block processor exiting");
}

async fn prime<C: ChainClient>(ctx: &BlockProcessorCtx<C>) -> Result<(), ProcessorError> {
    let height = retry_with_backoff(&ctx.retry, "block_number", || {
        let client = ctx.client.clone();
        async move { client.block_number().await }
    })
    .await?;

    debug!(height, "priming block processor at chain tip");
    process_new_tip(height, ctx).await
}

async fn process_new_tip<C: ChainClient>(
    height: u64,
    ctx: &BlockProcessorCtx<C>,
) -> Result<(), ProcessorError> {
    let tip = retry_with_backoff(&ctx.retry, "block_by_number", || {
        let client = ctx.client.clone();
        async move { block_by_number_checked(client.as_ref(), height).await }
    })
    .await?;

    let tip_hash = tip.hash;
    let missing = collect_missing_ancestry(tip, ctx).await?;
    apply_new_tip(tip_hash, missing, ctx).await
}

/// Walks backwards from the tip, fetching ancestors until a cached block
/// or the cache floor. Returns the uncached blocks oldest-first.
async fn collect_missing_ancestry<C: ChainClient>(
    tip: Block,
    ctx: &BlockProcessorCtx<C>,
) -> Result<Vec<Block>, ProcessorError> {
    let mut missing = Vec::new();
    let mut current = tip;

    loop {
        let (already_cached, floor) = {
            let cache = ctx.cache.read();
            (cache.has_block(&current.hash, true), cache.min_height())
        };
        if already_cached {
            break;
        }

        let at_floor = match floor {
            // An empty cache anchors at the notified tip itself.
            None => true,
            Some(min_height) => current.number <= min_height,
        };
        let parent_hash = current.parent_hash;
        missing.push(current);
        if at_floor {
            break;
        }

        current = retry_with_backoff(&ctx.retry, "block_by_hash", || {
            let client = ctx.client.clone();
            async move { block_by_hash_checked(client.as_ref(), parent_hash).await }
        })
        .await?;
    }

    missing.reverse();
    Ok(missing)
}

async fn apply_new_tip<C: ChainClient>(
    tip_hash: B256,
    missing: Vec<Block>,
    ctx: &BlockProcessorCtx<C>,
) -> Result<(), ProcessorError> {
    for block in missing {
        let outcome = ctx.cache.write().add_block(block.clone());
        match outcome {
            Ok(outcome) => {
                ctx.send_event(BlockEvent::NewBlock(block)).await?;
                if !outcome.pruned.is_empty() {
                    ctx.send_event(BlockEvent::Pruned(outcome.pruned)).await?;
                }
            }
            Err(err @ BlockCacheError::BelowMinHeight { .. }) => {
                warn!(%err, "skipping block below cache floor");
            }
            Err(err @ BlockCacheError::DuplicateBlock(_)) => {
                // Single writer; a duplicate means the notifier repeated
                // itself and the block is already processed.
                debug!(%err, "skipping duplicate block");
            }
        }
    }

    let (prev, tip_known) = {
        let cache = ctx.cache.read();
        (cache.head(), cache.has_block(&tip_hash, true))
    };
    if !tip_known {
        warn!(%tip_hash, "notified tip not retained; head unchanged");
        return Ok(());
    }
    if prev != Some(tip_hash) {
        ctx.cache.write().set_head(tip_hash);
        ctx.send_event(BlockEvent::NewHead {
            prev,
            new: tip_hash,
        })
        .await?;
        let _ = ctx.head_tx.send(Some(tip_hash));
    }

    Ok(())
}
