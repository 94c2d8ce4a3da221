use std::collections::{HashMap, HashSet, VecDeque};

use futures::future::{FutureExt, LocalBoxFuture};
use futures::stream::{self, FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::plan::{PlannedCreate, PlannedDelete, PlannedTypeChange, PlannedUpdate, SyncPlan};
use crate::blocks::{Block, BlockId, BlockIndex, BlockTree, Registry};
use crate::buffer::EditorBuffer;
use crate::error::SyncError;
use crate::mapping::{Anchor, PositionTracker};
use crate::remote::{RemoteError, RemoteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Update,
    Create,
    Delete,
    TypeChange,
}

#[derive(Debug)]
pub struct OpError {
    pub kind: OpKind,
    pub block_id: BlockId,
    pub error: SyncError,
}

/// What happened during one plan execution.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub errors: Vec<OpError>,
    /// Elementary operations finished, skipped ones included.
    pub completed: usize,
    pub total: usize,
    /// Provisional id (or pre-type-change id) to the id the remote assigned.
    pub id_map: HashMap<BlockId, BlockId>,
    pub cancelled: bool,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }

    fn fail(&mut self, kind: OpKind, block_id: &BlockId, error: SyncError) {
        warn!("{kind:?} of {block_id} failed: {error}");
        self.errors.push(OpError {
            kind,
            block_id: block_id.clone(),
            error,
        });
    }
}

/// A failure shared by every item of a create batch.
#[derive(Debug, Clone)]
enum BatchFailure {
    Remote(RemoteError),
    MissingParent(BlockId),
}

impl From<BatchFailure> for SyncError {
    fn from(failure: BatchFailure) -> Self {
        match failure {
            BatchFailure::Remote(e) => SyncError::Remote(e),
            BatchFailure::MissingParent(id) => SyncError::MissingParent(id),
        }
    }
}

enum TypeChangeResult {
    DeleteFailed(RemoteError),
    CreateFailed(SyncError),
    Created(Value),
}

/// A type change with its placement resolved against the tree.
struct TypeChangeJob {
    change: PlannedTypeChange,
    parent: BlockId,
    after: Option<BlockId>,
}

/// Consecutive creates sent in one ordered append. `parent` and `after` may
/// still be provisional.
struct Batch {
    parent: BlockId,
    after: Option<BlockId>,
    items: Vec<PlannedCreate>,
}

enum Step {
    TypeChange(TypeChangeJob),
    Batch(Batch),
}

impl Step {
    fn operation_count(&self) -> usize {
        match self {
            Step::TypeChange(_) => 2,
            Step::Batch(batch) => batch.items.len(),
        }
    }
}

enum Outcome {
    Update(PlannedUpdate, Result<Value, RemoteError>),
    Delete(PlannedDelete, Result<(), RemoteError>),
    TypeChange(PlannedTypeChange, TypeChangeResult),
    Batch(Vec<PlannedCreate>, Result<Vec<Value>, BatchFailure>),
    Skipped(usize),
}

impl Outcome {
    fn operation_count(&self) -> usize {
        match self {
            Outcome::Update(..) | Outcome::Delete(..) => 1,
            Outcome::TypeChange(..) => 2,
            Outcome::Batch(items, _) => items.len(),
            Outcome::Skipped(n) => *n,
        }
    }
}

async fn run_type_change(remote: &dyn RemoteStore, job: TypeChangeJob) -> Outcome {
    let TypeChangeJob {
        change,
        parent,
        after,
    } = job;
    let result = match remote.delete_block(&change.block_id).await {
        Err(e) => TypeChangeResult::DeleteFailed(e),
        Ok(()) => match remote
            .append_children(&parent, vec![change.payload.clone()], after.as_ref())
            .await
        {
            Ok(created) => match created.into_iter().next() {
                Some(value) => TypeChangeResult::Created(value),
                None => TypeChangeResult::CreateFailed(SyncError::MalformedResponse(
                    "append returned no blocks".into(),
                )),
            },
            Err(e) => TypeChangeResult::CreateFailed(e.into()),
        },
    };
    Outcome::TypeChange(change, result)
}

/// Sequential part of the execution: retype steps other creates depend on,
/// then create batches in order.
struct Chain<'r> {
    remote: &'r dyn RemoteStore,
    steps: VecDeque<Step>,
    /// Provisional or retired id to real id.
    ids: HashMap<BlockId, BlockId>,
    /// Ids whose remote block is gone.
    retired: HashSet<BlockId>,
    stop: CancellationToken,
}

impl<'r> Chain<'r> {
    fn resolve(&self, id: &BlockId) -> Result<BlockId, BatchFailure> {
        if let Some(real) = self.ids.get(id) {
            return Ok(real.clone());
        }
        if id.is_provisional() || self.retired.contains(id) {
            return Err(BatchFailure::MissingParent(id.clone()));
        }
        Ok(id.clone())
    }

    async fn run(&mut self, step: Step) -> Outcome {
        match step {
            Step::TypeChange(job) => {
                let old = job.change.block_id.clone();
                let outcome = run_type_change(self.remote, job).await;
                match &outcome {
                    Outcome::TypeChange(_, TypeChangeResult::Created(value)) => {
                        if let Some(id) = value["id"].as_str() {
                            self.ids.insert(old, BlockId::from(id));
                        }
                    }
                    Outcome::TypeChange(_, TypeChangeResult::CreateFailed(_)) => {
                        self.retired.insert(old);
                    }
                    _ => {}
                }
                outcome
            }
            Step::Batch(batch) => {
                let result = self.append(&batch).await;
                if let Ok(values) = &result {
                    for (item, value) in batch.items.iter().zip(values) {
                        if let Some(id) = value["id"].as_str() {
                            self.ids.insert(item.provisional_id.clone(), BlockId::from(id));
                        }
                    }
                }
                Outcome::Batch(batch.items, result)
            }
        }
    }

    async fn append(&self, batch: &Batch) -> Result<Vec<Value>, BatchFailure> {
        let parent = self.resolve(&batch.parent)?;
        let after = batch.after.as_ref().map(|a| self.resolve(a)).transpose()?;
        let payloads = batch.items.iter().map(|c| c.payload.clone()).collect();
        debug!(
            "appending batch of {} under {parent} after {after:?}",
            batch.items.len()
        );
        self.remote
            .append_children(&parent, payloads, after.as_ref())
            .await
            .map_err(BatchFailure::Remote)
    }
}

/// Applies a [`SyncPlan`] to the remote store and folds the results back
/// into the block model.
///
/// All remote futures are polled on the caller's task; the model is only
/// touched between completions.
pub struct Executor<'a> {
    pub page_id: &'a BlockId,
    pub tree: &'a mut BlockTree,
    pub tracker: &'a mut PositionTracker,
    pub registry: &'a Registry,
    pub buffer: &'a mut dyn EditorBuffer,
}

impl<'a> Executor<'a> {
    pub async fn execute(
        &mut self,
        remote: &dyn RemoteStore,
        plan: SyncPlan,
        cancel: &CancellationToken,
    ) -> SyncReport {
        let mut report = SyncReport {
            total: plan.operation_count(),
            ..SyncReport::default()
        };
        if plan.is_empty() {
            return report;
        }
        if cancel.is_cancelled() || !self.buffer.is_valid() {
            report.cancelled = true;
            report.completed = report.total;
            return report;
        }
        info!(
            "executing sync plan with {} operations on page {}",
            report.total, self.page_id
        );

        let SyncPlan {
            updates,
            creates,
            deletes,
            type_changes,
            ..
        } = plan;

        let anchored: HashSet<&BlockId> = creates.iter().map(|c| c.anchor.target()).collect();
        let (chained, independent): (Vec<_>, Vec<_>) = type_changes
            .into_iter()
            .map(|change| self.type_change_job(change, &deletes))
            .partition(|job| anchored.contains(&job.change.block_id));
        let batches = self.batches(creates);

        let stop = cancel.child_token();
        let mut steps: VecDeque<Step> = chained.into_iter().map(Step::TypeChange).collect();
        steps.extend(batches.into_iter().map(Step::Batch));
        let chain = Chain {
            remote,
            steps,
            ids: HashMap::new(),
            retired: HashSet::new(),
            stop: stop.clone(),
        };
        let chain = stream::unfold(chain, |mut chain| async move {
            let step = chain.steps.pop_front()?;
            if chain.stop.is_cancelled() {
                return Some((Outcome::Skipped(step.operation_count()), chain));
            }
            let outcome = chain.run(step).await;
            Some((outcome, chain))
        })
        .boxed_local();

        let pending: FuturesUnordered<LocalBoxFuture<'_, Outcome>> = FuturesUnordered::new();
        for update in updates {
            pending.push(
                async move {
                    let result = remote
                        .update_block(&update.block_id, update.payload.clone())
                        .await;
                    Outcome::Update(update, result)
                }
                .boxed_local(),
            );
        }
        for delete in deletes {
            pending.push(
                async move {
                    let result = remote.delete_block(&delete.block_id).await;
                    Outcome::Delete(delete, result)
                }
                .boxed_local(),
            );
        }
        for job in independent {
            pending.push(run_type_change(remote, job).boxed_local());
        }

        let mut outcomes = stream::select(pending, chain);
        let mut rebuild = false;
        while let Some(outcome) = outcomes.next().await {
            report.completed += outcome.operation_count();
            if cancel.is_cancelled() || !self.buffer.is_valid() {
                if !report.cancelled {
                    info!("sync cancelled, discarding remaining results");
                }
                report.cancelled = true;
                stop.cancel();
                self.record_errors(outcome, &mut report);
                continue;
            }
            rebuild |= self.apply(outcome, &mut report);
        }

        if rebuild && !report.cancelled {
            self.tracker.rebuild(self.tree, &mut *self.buffer);
        }
        info!(
            "sync finished: {}/{} operations, {} errors",
            report.completed,
            report.total,
            report.errors.len()
        );
        report
    }

    /// Places a retyped block where the old one was: same parent, after the
    /// nearest earlier sibling that survives this plan.
    fn type_change_job(&self, change: PlannedTypeChange, deletes: &[PlannedDelete]) -> TypeChangeJob {
        let parent = self
            .tree
            .parent_id(change.index)
            .cloned()
            .unwrap_or_else(|| self.page_id.clone());
        let deleted: HashSet<BlockIndex> = deletes.iter().map(|d| d.index).collect();
        let mut after = None;
        let mut cursor = self.tree.previous_sibling(change.index);
        while let Some(sibling) = cursor {
            let Some(block) = self.tree.get(sibling) else {
                break;
            };
            if !deleted.contains(&sibling) && !self.registry.type_changed(block) {
                after = Some(block.id.clone());
                break;
            }
            cursor = self.tree.previous_sibling(sibling);
        }
        TypeChangeJob {
            change,
            parent,
            after,
        }
    }

    /// Groups creates into batches; an item joins the previous batch when it
    /// is anchored right after the previous item.
    fn batches(&self, creates: Vec<PlannedCreate>) -> Vec<Batch> {
        // Parent of every id a create may be anchored after.
        let mut parents: HashMap<BlockId, BlockId> = HashMap::new();
        let mut batches: Vec<Batch> = Vec::new();

        for create in creates {
            let parent = match &create.anchor {
                Anchor::Parent(p) => p.clone(),
                Anchor::After(sibling) => parents.get(sibling).cloned().unwrap_or_else(|| {
                    self.tree
                        .lookup(sibling)
                        .and_then(|i| self.tree.parent_id(i).cloned())
                        .unwrap_or_else(|| self.page_id.clone())
                }),
            };
            parents.insert(create.provisional_id.clone(), parent.clone());

            if let Some(batch) = batches.last_mut() {
                let chained = matches!(
                    (&create.anchor, batch.items.last()),
                    (Anchor::After(prev), Some(last)) if *prev == last.provisional_id
                );
                if chained {
                    batch.items.push(create);
                    continue;
                }
            }
            let after = match &create.anchor {
                Anchor::After(sibling) => Some(sibling.clone()),
                Anchor::Parent(_) => None,
            };
            batches.push(Batch {
                parent,
                after,
                items: vec![create],
            });
        }
        batches
    }

    fn record_errors(&self, outcome: Outcome, report: &mut SyncReport) {
        match outcome {
            Outcome::Update(u, Err(e)) => report.fail(OpKind::Update, &u.block_id, e.into()),
            Outcome::Delete(d, Err(e)) => report.fail(OpKind::Delete, &d.block_id, e.into()),
            Outcome::TypeChange(c, TypeChangeResult::DeleteFailed(e)) => {
                report.fail(OpKind::TypeChange, &c.block_id, e.into())
            }
            Outcome::TypeChange(c, TypeChangeResult::CreateFailed(e)) => {
                report.fail(OpKind::TypeChange, &c.block_id, e)
            }
            Outcome::Batch(items, Err(failure)) => {
                for item in items {
                    report.fail(OpKind::Create, &item.provisional_id, failure.clone().into());
                }
            }
            _ => {}
        }
    }

    /// Folds one outcome into the model. Returns true when markers need a
    /// rebuild.
    fn apply(&mut self, outcome: Outcome, report: &mut SyncReport) -> bool {
        match outcome {
            Outcome::Update(update, Ok(_)) => {
                if let Some(block) = self.block_mut(update.index, &update.block_id) {
                    block.raw = update.payload;
                    block.original_text = update.content;
                    block.dirty = block.current_text != block.original_text;
                }
                false
            }
            Outcome::Delete(delete, Ok(())) => {
                if self.block_mut(delete.index, &delete.block_id).is_some() {
                    self.remove(delete.index);
                }
                false
            }
            Outcome::TypeChange(change, TypeChangeResult::Created(value)) => {
                self.apply_type_change(change, value, report)
            }
            Outcome::TypeChange(change, TypeChangeResult::CreateFailed(e)) => {
                // The old block is gone remotely; its lines become new text.
                if self.block_mut(change.index, &change.block_id).is_some() {
                    self.remove(change.index);
                }
                report.fail(OpKind::TypeChange, &change.block_id, e);
                false
            }
            Outcome::Batch(items, Ok(values)) => self.apply_batch(items, values, report),
            Outcome::Update(update, Err(e)) => {
                if let Some(block) = self.block_mut(update.index, &update.block_id) {
                    block.dirty = true;
                }
                report.fail(OpKind::Update, &update.block_id, e.into());
                false
            }
            other => {
                self.record_errors(other, report);
                false
            }
        }
    }

    fn apply_type_change(
        &mut self,
        change: PlannedTypeChange,
        value: Value,
        report: &mut SyncReport,
    ) -> bool {
        let Some(new_id) = value["id"].as_str().map(BlockId::from) else {
            if self.block_mut(change.index, &change.block_id).is_some() {
                self.remove(change.index);
            }
            report.fail(
                OpKind::TypeChange,
                &change.block_id,
                SyncError::MalformedResponse("created block has no id".into()),
            );
            return false;
        };
        if self.block_mut(change.index, &change.block_id).is_none() {
            return false;
        }

        let lines: Vec<String> = change.text.split('\n').map(String::from).collect();
        let content = self.registry.content_from_lines(change.new_type, &lines);
        for child in self.tree.clear_children(change.index) {
            self.tracker.forget(child, &mut *self.buffer);
        }
        self.tree.rename(change.index, new_id.clone());
        if let Some(block) = self.tree.get_mut(change.index) {
            block.editable = content.is_editable();
            block.content = content;
            block.has_children = false;
            block.raw = value;
            block.mark_synced(change.text);
        }
        debug!("{} retyped as {:?}, now {new_id}", change.block_id, change.new_type);
        report.id_map.insert(change.block_id, new_id);
        true
    }

    fn apply_batch(
        &mut self,
        items: Vec<PlannedCreate>,
        values: Vec<Value>,
        report: &mut SyncReport,
    ) -> bool {
        let mut created = false;
        let mut values = values.into_iter();
        for item in items {
            let Some(value) = values.next() else {
                report.fail(
                    OpKind::Create,
                    &item.provisional_id,
                    SyncError::MalformedResponse("append returned fewer blocks than sent".into()),
                );
                continue;
            };
            let Some(id) = value["id"].as_str().map(BlockId::from) else {
                report.fail(
                    OpKind::Create,
                    &item.provisional_id,
                    SyncError::MalformedResponse("created block has no id".into()),
                );
                continue;
            };

            let content = self.registry.content_from_lines(item.block_type, &item.content);
            let mut block = Block::new(id.clone(), content, value);
            block.mark_synced(item.content.join("\n"));
            block.span = Some(item.span);

            let index = self.insert_anchored(&item.anchor, block, &report.id_map);
            self.reindent(index, &item);
            self.tracker.track(index, item.span, &mut *self.buffer);
            report.id_map.insert(item.provisional_id, id);
            created = true;
        }
        created
    }

    /// Rewrites the created rows at the indentation of the block's depth, so
    /// the lines read back as the text that was sent.
    fn reindent(&mut self, index: BlockIndex, item: &PlannedCreate) {
        let Some(depth) = self.tree.get(index).map(Block::depth) else {
            return;
        };
        let indent = self.tracker.indent(depth);
        let expected: Vec<String> = item
            .content
            .iter()
            .map(|line| format!("{indent}{line}"))
            .collect();
        let (start, end) = (item.span.start - 1, item.span.end);
        let current = self.buffer.get_lines(start, end);
        let unchanged = current.len() == expected.len()
            && current
                .iter()
                .zip(&item.content)
                .all(|(now, sent)| now.trim_start() == sent.trim_start());
        if current != expected && unchanged {
            debug!("re-indenting rows {}..{end} to depth {depth}", start + 1);
            self.buffer.set_lines(start, end, &expected);
        }
    }

    fn insert_anchored(
        &mut self,
        anchor: &Anchor,
        block: Block,
        ids: &HashMap<BlockId, BlockId>,
    ) -> BlockIndex {
        let target = anchor.target();
        let target = ids.get(target).unwrap_or(target);
        let placed = self.tree.lookup(target).and_then(|at| match anchor {
            Anchor::After(_) => self.tree.insert_after(at, block.clone()),
            Anchor::Parent(_) => self.tree.add_child(at, block.clone(), None),
        });
        placed.unwrap_or_else(|| {
            warn!("anchor {target} is no longer in the tree, placing {} at top level", block.id);
            self.tree.push_root(block)
        })
    }

    fn block_mut(&mut self, index: BlockIndex, id: &BlockId) -> Option<&mut Block> {
        self.tree.get_mut(index).filter(|b| &b.id == id)
    }

    fn remove(&mut self, index: BlockIndex) {
        for removed in self.tree.remove_subtree(index) {
            self.tracker.forget(removed, &mut *self.buffer);
        }
    }
}
