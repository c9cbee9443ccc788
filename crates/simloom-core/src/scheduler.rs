//! The tick scheduler: a single-threaded cooperative event loop.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use simloom_clock::Tick;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::phase::SchedulingPhase;
use crate::scheduleable::{ScheduleableId, ScheduleableInfo, ScheduleableSpec};

type Handler = Box<dyn FnMut(&mut Scheduler)>;

struct Entry {
    info: ScheduleableInfo,
    handler: Option<Handler>,
    precedence_rank: Option<u32>,
}

#[derive(Copy, Clone)]
struct BucketEntry {
    id: ScheduleableId,
    schedule_seq: u64,
}

type BucketKey = (Tick, u8);

#[derive(Copy, Clone)]
pub(crate) struct AsyncEntry {
    id: ScheduleableId,
    delay: u64,
}

/// A cloneable, `Send + Sync` handle onto a single [`AsyncEvent`]'s inbox.
///
/// `Scheduler` itself is neither `Send` nor `Sync` — its handlers are plain
/// `Box<dyn FnMut(&mut Scheduler)>`, so a `&Scheduler` cannot be handed to a
/// worker thread at all. This handle is the primitive that actually crosses
/// threads: obtain one from [`AsyncEvent::handle`](crate::event::AsyncEvent::handle)
/// on the owning thread and move it into the worker; `schedule` then only
/// touches the lock-protected inbox, never the scheduler itself.
#[derive(Clone)]
pub struct AsyncHandle {
    id: ScheduleableId,
    inbox: Arc<Mutex<VecDeque<AsyncEntry>>>,
}

impl AsyncHandle {
    /// Buffer a schedule request for the next tick's drain, from any
    /// thread.
    pub fn schedule(&self, delay: u64) {
        self.inbox.lock().push_back(AsyncEntry {
            id: self.id,
            delay,
        });
    }
}

/// Tunables governing scheduler behavior left as implementation-defined
/// policy.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// If false, `schedule_relative` with `delay == 0` targeting a phase
    /// that has already completed this tick returns
    /// [`Error::Configuration`] instead of silently deferring to the next
    /// tick. Defaults to `false` (strict).
    pub allow_retroactive_same_tick: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            allow_retroactive_same_tick: false,
        }
    }
}

/// The global tick scheduler.
///
/// Owns every registered [`Scheduleable`](crate::scheduleable), the
/// per-tick-per-phase event buckets, and the precedence graph. See the
/// crate-level documentation for the tick loop's exact semantics.
pub struct Scheduler {
    config: SchedulerConfig,
    entries: Vec<Entry>,
    precedence_edges: Vec<(ScheduleableId, ScheduleableId)>,
    finalized: bool,
    failed: bool,
    current_tick: Tick,
    current_phase: Option<SchedulingPhase>,
    start_tick: Tick,
    buckets: HashMap<BucketKey, VecDeque<BucketEntry>>,
    unique_present: HashSet<(BucketKey, usize)>,
    continuing_pending: u64,
    schedule_seq: u64,
    registration_seq: u64,
    startup_handlers: Vec<ScheduleableId>,
    async_inbox: Arc<Mutex<VecDeque<AsyncEntry>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            precedence_edges: Vec::new(),
            finalized: false,
            failed: false,
            current_tick: 0,
            current_phase: None,
            start_tick: 0,
            buckets: HashMap::new(),
            unique_present: HashSet::new(),
            continuing_pending: 0,
            schedule_seq: 0,
            registration_seq: 0,
            startup_handlers: Vec::new(),
            async_inbox: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn info(&self, id: ScheduleableId) -> &ScheduleableInfo {
        &self.entries[id.index()].info
    }

    /// Register a new scheduleable with the given static attributes and
    /// handler.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the scheduler has already been
    /// finalized: once the scheduler is finalized, no new Scheduleable may
    /// be created.
    pub fn register(
        &mut self,
        spec: ScheduleableSpec,
        handler: impl FnMut(&mut Scheduler) + 'static,
    ) -> Result<ScheduleableId> {
        if self.finalized {
            return Err(Error::Configuration(format!(
                "cannot register scheduleable '{}' after finalize",
                spec.label
            )));
        }

        let registration_seq = self.registration_seq;
        self.registration_seq += 1;

        let info = ScheduleableInfo {
            label: spec.label,
            phase: spec.phase,
            clock: spec.clock,
            continuing: spec.continuing,
            order_tag: spec.order_tag,
            unique: spec.unique,
            registration_seq,
        };

        let id = ScheduleableId(self.entries.len());
        self.entries.push(Entry {
            info,
            handler: Some(Box::new(handler)),
            precedence_rank: None,
        });

        Ok(id)
    }

    /// Declare that `before` must run strictly before `after` whenever both
    /// fire in the same tick.
    ///
    /// Both scheduleables must be declared in the same phase; precedence
    /// across phases is meaningless since phase ordering already totally
    /// orders them.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the scheduler is already
    /// finalized, or if `before` and `after` have different declared
    /// phases.
    pub fn declare_precedence(
        &mut self,
        before: ScheduleableId,
        after: ScheduleableId,
    ) -> Result<()> {
        if self.finalized {
            return Err(Error::Configuration(
                "cannot declare precedence after finalize".into(),
            ));
        }

        let phase_before = self.entries[before.index()].info.phase;
        let phase_after = self.entries[after.index()].info.phase;
        if phase_before != phase_after {
            return Err(Error::Configuration(format!(
                "precedence edge between scheduleables in different phases ({:?} vs {:?})",
                phase_before, phase_after
            )));
        }

        self.precedence_edges.push((before, after));
        Ok(())
    }

    /// Register a handler to fire exactly once, immediately after
    /// `finalize` completes, before tick 1.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the scheduler is already
    /// finalized: a StartupEvent may only be registered while the tree is
    /// pre-finalized.
    pub fn schedule_startup_handler(&mut self, id: ScheduleableId) -> Result<()> {
        if self.finalized {
            return Err(Error::Configuration(
                "StartupEvent cannot be scheduled after finalize".into(),
            ));
        }
        self.startup_handlers.push(id);
        Ok(())
    }

    /// Resolve precedence declarations into a per-phase total order and
    /// transition the scheduler into its runnable state.
    ///
    /// # Errors
    /// Returns [`Error::PrecedenceCycle`] if the declared precedence edges
    /// contain a cycle.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Err(Error::Configuration("scheduler already finalized".into()));
        }

        self.resolve_precedence()?;
        self.finalized = true;

        let startup = std::mem::take(&mut self.startup_handlers);
        for id in startup {
            self.invoke(id)?;
        }

        Ok(())
    }

    fn resolve_precedence(&mut self) -> Result<()> {
        for phase in SchedulingPhase::ALL {
            let nodes: Vec<ScheduleableId> = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.info.phase == phase)
                .map(|(i, _)| ScheduleableId(i))
                .collect();

            if nodes.is_empty() {
                continue;
            }

            let mut indegree: HashMap<ScheduleableId, u32> =
                nodes.iter().map(|&id| (id, 0)).collect();
            let mut succ: HashMap<ScheduleableId, Vec<ScheduleableId>> =
                nodes.iter().map(|&id| (id, Vec::new())).collect();

            for &(before, after) in &self.precedence_edges {
                if self.entries[before.index()].info.phase != phase {
                    continue;
                }
                succ.get_mut(&before).unwrap().push(after);
                *indegree.get_mut(&after).unwrap() += 1;
            }

            // Kahn's algorithm, always picking the ready node with the
            // smallest registration sequence so scheduleables outside any
            // precedence constraint keep their natural registration order.
            let mut ready: Vec<ScheduleableId> = nodes
                .iter()
                .copied()
                .filter(|id| indegree[id] == 0)
                .collect();
            ready.sort_by_key(|id| self.tie_key(*id));

            let mut order = Vec::with_capacity(nodes.len());
            while let Some(pos) = ready
                .iter()
                .enumerate()
                .min_by_key(|(_, id)| self.tie_key(**id))
                .map(|(pos, _)| pos)
            {
                let id = ready.remove(pos);
                order.push(id);

                for &next in &succ[&id] {
                    let entry = indegree.get_mut(&next).unwrap();
                    *entry -= 1;
                    if *entry == 0 {
                        ready.push(next);
                    }
                }
            }

            if order.len() != nodes.len() {
                let stuck: Vec<String> = nodes
                    .iter()
                    .filter(|id| !order.contains(id))
                    .map(|id| self.entries[id.index()].info.label.clone())
                    .collect();
                error!(?phase, stuck = %stuck.join(", "), "precedence cycle detected");
                return Err(Error::PrecedenceCycle(format!(
                    "phase {:?}: {}",
                    phase,
                    stuck.join(", ")
                )));
            }

            for (rank, id) in order.into_iter().enumerate() {
                self.entries[id.index()].precedence_rank = Some(rank as u32);
            }

            debug!(?phase, count = nodes.len(), "resolved precedence order");
        }

        Ok(())
    }

    /// Deterministic secondary sort key used to break ties among
    /// scheduleables with no precedence relationship: the declared
    /// `order_tag` if present, else registration order.
    fn tie_key(&self, id: ScheduleableId) -> u64 {
        let info = &self.entries[id.index()].info;
        info.order_tag.unwrap_or(info.registration_seq)
    }

    fn rank_of(&self, id: ScheduleableId) -> u32 {
        self.entries[id.index()].precedence_rank.unwrap_or(u32::MAX)
    }

    /// Schedule `id` to fire `delay` ticks from now, in `phase`.
    ///
    /// `phase` must equal the scheduleable's declared phase, a fixed
    /// attribute set at registration. This is validated rather than
    /// silently substituted so that a caller
    /// scheduling into the wrong phase gets a clear error instead of a
    /// silently-misordered run.
    ///
    /// # Errors
    /// - [`Error::Configuration`] if `phase` doesn't match the
    ///   scheduleable's declared phase, or if `delay == 0` targets a phase
    ///   that has already completed this tick and
    ///   `allow_retroactive_same_tick` is false.
    pub fn schedule_relative(
        &mut self,
        id: ScheduleableId,
        delay: u64,
        phase: SchedulingPhase,
    ) -> Result<()> {
        let declared_phase = self.entries[id.index()].info.phase;
        if declared_phase != phase {
            return Err(Error::Configuration(format!(
                "scheduleable '{}' declared in phase {:?} cannot be scheduled into phase {:?}",
                self.entries[id.index()].info.label,
                declared_phase,
                phase
            )));
        }

        if delay == 0 {
            if let Some(running) = self.current_phase {
                if phase < running && !self.config.allow_retroactive_same_tick {
                    return Err(Error::Configuration(format!(
                        "cannot schedule '{}' into phase {:?} at delay 0: phase already \
                         completed this tick (currently in {:?})",
                        self.entries[id.index()].info.label,
                        phase,
                        running
                    )));
                }
            }
        }

        let target_tick = self.current_tick + delay;
        let key: BucketKey = (target_tick, phase.index() as u8);

        if self.entries[id.index()].info.unique {
            let dedup_key = (key, id.index());
            if self.unique_present.contains(&dedup_key) {
                trace!(tick = target_tick, ?phase, "unique event already pending, collapsing");
                return Ok(());
            }
            self.unique_present.insert(dedup_key);
        }

        let seq = self.schedule_seq;
        self.schedule_seq += 1;

        self.buckets
            .entry(key)
            .or_default()
            .push_back(BucketEntry { id, schedule_seq: seq });

        if self.entries[id.index()].info.continuing {
            self.continuing_pending += 1;
        }

        Ok(())
    }

    /// Schedule `id` from the owning thread without going through the
    /// ordinary `schedule_relative` reentrancy checks.
    ///
    /// The entry is buffered into the same lock-protected queue
    /// [`AsyncHandle::schedule`] writes to and is only actually scheduled
    /// at the start of the next tick processed by [`Scheduler::run`]. This
    /// is a same-thread convenience; a genuine cross-thread caller cannot
    /// hold a `&Scheduler` at all and must go through
    /// [`AsyncEvent::handle`](crate::event::AsyncEvent::handle) instead.
    pub fn schedule_async(&self, id: ScheduleableId, delay: u64) {
        self.async_inbox.lock().push_back(AsyncEntry { id, delay });
    }

    pub(crate) fn async_handle(&self, id: ScheduleableId) -> AsyncHandle {
        AsyncHandle {
            id,
            inbox: self.async_inbox.clone(),
        }
    }

    /// Remove every pending entry referring to `id` from all future
    /// buckets.
    pub fn cancel(&mut self, id: ScheduleableId) {
        let mut removed = 0usize;
        for bucket in self.buckets.values_mut() {
            let before = bucket.len();
            bucket.retain(|entry| entry.id != id);
            removed += before - bucket.len();
        }

        if removed > 0 && self.entries[id.index()].info.continuing {
            self.continuing_pending = self.continuing_pending.saturating_sub(removed as u64);
        }

        self.unique_present.retain(|(_, idx)| *idx != id.index());
    }

    fn drain_async_queue(&mut self) {
        let drained: Vec<AsyncEntry> = {
            let mut inbox = self.async_inbox.lock();
            inbox.drain(..).collect()
        };

        for entry in drained {
            let phase = self.entries[entry.id.index()].info.phase;
            if let Err(err) = self.schedule_relative(entry.id, entry.delay, phase) {
                warn!(error = %err, "dropping malformed async-scheduled entry");
            }
        }
    }

    fn invoke(&mut self, id: ScheduleableId) -> Result<()> {
        let mut handler = self.entries[id.index()].handler.take().ok_or_else(|| {
            Error::Configuration(format!(
                "scheduleable '{}' has no handler (already in flight?)",
                self.entries[id.index()].info.label
            ))
        })?;

        handler(self);

        self.entries[id.index()].handler = Some(handler);

        if self.entries[id.index()].info.continuing {
            self.continuing_pending = self.continuing_pending.saturating_sub(1);
        }

        Ok(())
    }

    fn run_phase(&mut self, phase: SchedulingPhase) -> Result<()> {
        let key: BucketKey = (self.current_tick, phase.index() as u8);

        if let Some(bucket) = self.buckets.get_mut(&key) {
            let mut sorted: Vec<BucketEntry> = bucket.drain(..).collect();
            sorted.sort_by_key(|e| (self.rank_of(e.id), e.schedule_seq));
            *bucket = sorted.into();
        }

        self.current_phase = Some(phase);

        loop {
            let next = self.buckets.get_mut(&key).and_then(|b| b.pop_front());
            let Some(entry) = next else { break };

            if self.entries[entry.id.index()].info.unique {
                self.unique_present.remove(&(key, entry.id.index()));
            }

            if let Err(err) = self.invoke(entry.id) {
                self.failed = true;
                return Err(err);
            }
        }

        self.buckets.remove(&key);
        Ok(())
    }

    fn has_any_pending_continuing(&self) -> bool {
        self.continuing_pending > 0
    }

    /// Run the tick loop.
    ///
    /// Returns once either `max_ticks` ticks have elapsed, or
    /// `exit_on_quiescence` is true and no continuing event remains
    /// scheduled at the current tick or any future tick.
    ///
    /// # Errors
    /// Propagates any error returned by a handler; the scheduler is left in
    /// a failed terminal state and must be dropped.
    pub fn run(&mut self, max_ticks: u64, exit_on_quiescence: bool) -> Result<()> {
        if self.failed {
            return Err(Error::Configuration(
                "scheduler is in a failed state and must be destroyed".into(),
            ));
        }

        self.start_tick = self.current_tick;

        loop {
            if self.current_tick - self.start_tick == max_ticks {
                break;
            }

            self.drain_async_queue();

            if exit_on_quiescence && !self.has_any_pending_continuing() {
                trace!(tick = self.current_tick, "quiescence reached, halting");
                break;
            }

            for phase in SchedulingPhase::ALL {
                self.run_phase(phase)?;
            }

            self.current_phase = None;
            self.current_tick += 1;
        }

        Ok(())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
