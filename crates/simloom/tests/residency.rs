//! S3: a `State<Op>` transitioning INIT -> READY at tick 3 schedules its
//! observer to fire once, at its declared phase, and the residency tracker
//! attributes ticks 0..3 to INIT and the remainder (up to the tick the
//! simulation stops at) to READY.

use std::cell::RefCell;
use std::rc::Rc;

use simloom::residency::ResidencyTrackerPool;
use simloom::{enum_state, Event, EnumState, Scheduler, SchedulingPhase};

enum_state! {
    pub enum Op {
        Init,
        Ready,
    }
}

#[test]
fn s3_observer_fires_once_on_transition_and_residency_matches_elapsed_ticks() {
    let mut scheduler = Scheduler::new();
    let fired = Rc::new(RefCell::new(0));
    let fired2 = fired.clone();

    let obs = Event::register(&mut scheduler, "OBS", SchedulingPhase::Tick, move |_s| {
        *fired2.borrow_mut() += 1;
    })
    .unwrap();

    scheduler.finalize().unwrap();

    let pool = ResidencyTrackerPool::new();
    let mut state = EnumState::<Op>::new(Op::Init, scheduler.current_tick());
    let mut tracker = pool.acquire::<Op>(Op::Init, scheduler.current_tick());
    state.observe(Op::Ready, obs).unwrap();

    // Advance to tick 3, then transition into READY.
    scheduler.run(3, false).unwrap();
    assert_eq!(scheduler.current_tick(), 3);

    state.set(&mut scheduler, Op::Ready).unwrap();
    tracker.on_transition(scheduler.current_tick(), Op::Ready);

    // The observer's event was scheduled at delay 0 in the current tick's
    // Tick phase; it has not fired until the scheduler actually processes
    // that tick.
    assert_eq!(*fired.borrow(), 0);

    scheduler.run(2, false).unwrap();
    assert_eq!(*fired.borrow(), 1, "OBS fires exactly once after the transition");

    tracker.on_transition(scheduler.current_tick(), Op::Ready);
    assert_eq!(scheduler.current_tick(), 5);
    assert_eq!(tracker.ticks_in(Op::Init), 3);
    assert_eq!(tracker.ticks_in(Op::Ready), 2);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("residency.txt");
    drop(tracker);
    pool.flush_all(&path).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("Enum Class Name : Op"));
    assert!(contents.contains("Init : 3"));
    assert!(contents.contains("Ready : 2"));
}
