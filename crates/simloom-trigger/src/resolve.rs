//! Leaf resolution: wiring a parsed [`Expr`] tree to live watchers across
//! the notification, counter, statistic, and tag-reference subsystems.

use simloom_core::{Result, Scheduler, SchedulingPhase};
use simloom_notify::NotificationRegistry;
use tracing::debug;

use crate::ast::{parse, Expr, LeafSpec, TagEvent};
use crate::counter::CounterTable;
use crate::manager::TriggerManager;
use crate::stat::StatRegistry;
use crate::trigger::{EvalNode, Trigger};

/// Everything [`build_trigger`] needs to resolve leaf names against, beyond
/// the scheduler itself.
pub struct TriggerContext<'a> {
    pub notifications: &'a NotificationRegistry,
    pub counters: &'a CounterTable,
    pub stats: &'a StatRegistry,
    pub manager: &'a TriggerManager,
}

fn flatten(expr: Expr, leaves: &mut Vec<LeafSpec>) -> EvalNode {
    match expr {
        Expr::Leaf(spec) => {
            leaves.push(spec);
            EvalNode::Leaf(leaves.len() - 1)
        }
        Expr::All(children) => {
            EvalNode::All(children.into_iter().map(|c| flatten(c, leaves)).collect())
        }
        Expr::Any(children) => {
            EvalNode::Any(children.into_iter().map(|c| flatten(c, leaves)).collect())
        }
    }
}

fn leaf_target_value(leaf: &LeafSpec) -> Option<f64> {
    match leaf {
        LeafSpec::Notification { value, .. }
        | LeafSpec::Stat { value, .. }
        | LeafSpec::Counter { value, .. } => Some(*value),
        LeafSpec::Tag { .. } => None,
    }
}

/// Parse `expr` and construct a live [`Trigger`], installing a watcher for
/// every leaf. `phase` is the scheduling phase used for any leaf that needs
/// a periodic scheduler-driven check (currently only `stat_def` leaves).
///
/// # Errors
/// [`simloom_core::Error::Parse`] on malformed expressions,
/// [`simloom_core::Error::UnknownName`] if a leaf names an unresolvable
/// notification, counter, statistic, or tag.
pub fn build_trigger(
    expr: &str,
    scheduler: &mut Scheduler,
    phase: SchedulingPhase,
    ctx: &TriggerContext<'_>,
    callback: impl FnMut() + 'static,
) -> Result<Trigger> {
    let parsed = parse(expr).map_err(|err| {
        debug!(expr, %err, "failed to parse trigger expression");
        err
    })?;
    let mut leaves = Vec::new();
    let tree = flatten(parsed, &mut leaves);

    debug!(expr, leaf_count = leaves.len(), "compiled trigger expression");

    let leaf_targets: Vec<Option<f64>> = leaves.iter().map(leaf_target_value).collect();
    let trigger = Trigger::with_targets(tree, leaf_targets, callback);

    for (idx, leaf) in leaves.into_iter().enumerate() {
        install_leaf(scheduler, phase, ctx, &trigger, idx, leaf)?;
    }

    Ok(trigger)
}

fn install_leaf(
    scheduler: &mut Scheduler,
    phase: SchedulingPhase,
    ctx: &TriggerContext<'_>,
    trigger: &Trigger,
    idx: usize,
    leaf: LeafSpec,
) -> Result<()> {
    match leaf {
        LeafSpec::Notification { name, op, value } => {
            let trigger = trigger.clone();
            ctx.notifications
                .register_for_notification::<f64>(&name, move |payload: &f64| {
                    if op.eval(*payload, value) {
                        trigger.notify(idx);
                    }
                })?;
        }
        LeafSpec::Tag { tag, event } => {
            let upstream = ctx.manager.lookup(&tag, event).ok_or_else(|| {
                simloom_core::Error::UnknownName(format!(
                    "no trigger tagged '{tag}.{}' is registered",
                    tag_event_name(event)
                ))
            })?;
            upstream.add_dependent(trigger.clone(), idx);
        }
        LeafSpec::Stat { path, op, value } => {
            install_stat_watcher(scheduler, phase, ctx, trigger.clone(), idx, path, op, value)?;
        }
        LeafSpec::Counter { path, value } => {
            let counter = ctx.counters.get(&path)?;
            let trigger = trigger.clone();
            counter.watch_threshold(value, move || trigger.notify(idx));
        }
    }
    Ok(())
}

fn tag_event_name(event: TagEvent) -> &'static str {
    match event {
        TagEvent::Start => "start",
        TagEvent::Stop => "stop",
        TagEvent::Internal => "internal",
    }
}

/// A `stat_def` leaf has no natural "push" notification, so it is checked
/// once per tick in `phase` until satisfied, via a self-rescheduling
/// [`simloom_core::UniqueEvent`].
///
/// The evaluator is cloned out of the registry as an owned `Rc` (see
/// [`crate::stat::StatRegistry::evaluator`]) so the periodic check can
/// outlive the borrowed [`TriggerContext`] used to resolve it.
fn install_stat_watcher(
    scheduler: &mut Scheduler,
    phase: SchedulingPhase,
    ctx: &TriggerContext<'_>,
    trigger: Trigger,
    idx: usize,
    path: String,
    op: crate::lexer::Comparator,
    value: f64,
) -> Result<()> {
    use std::cell::RefCell;
    use std::rc::Rc;

    use simloom_core::UniqueEvent;

    let evaluator = ctx.stats.evaluator(&path)?;
    if op.eval(evaluator(), value) {
        trigger.notify(idx);
        return Ok(());
    }

    // The handler needs to reschedule its own UniqueEvent, which does not
    // exist until after `register` returns, so the handle is captured
    // through a cell and filled in immediately after registration.
    let event_cell: Rc<RefCell<Option<UniqueEvent>>> = Rc::new(RefCell::new(None));
    let event_cell_for_handler = event_cell.clone();

    let event = UniqueEvent::register(scheduler, format!("stat-check:{path}"), phase, move |s| {
        if trigger.has_fired() {
            return;
        }
        if op.eval(evaluator(), value) {
            trigger.notify(idx);
            return;
        }
        if let Some(event) = event_cell_for_handler.borrow().as_ref() {
            // Re-check on every subsequent tick until the threshold is
            // crossed or the owning trigger fires through another leaf.
            if let Err(err) = event.schedule(s, 1) {
                tracing::warn!(path = %path, error = %err, "failed to reschedule stat_def leaf re-poll");
            }
        }
    })?;
    *event_cell.borrow_mut() = Some(event.clone());
    event.schedule(scheduler, 1)?;

    Ok(())
}
