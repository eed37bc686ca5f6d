//! Integration Tests for the Reactive Runtime
//!
//! These tests verify that signals, memos, effects, and owners work together
//! correctly: glitch-free propagation, batching, effect ordering, disposal,
//! and error recovery.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rill_core::reactive::{
    batch, create_root, on_cleanup, on_error, set_update_limit, try_on_error, Effect, EvalError,
    Memo, Signal,
};

/// Shared run counter for closures capturing it.
fn counter() -> (Rc<Cell<i32>>, Rc<Cell<i32>>) {
    let c = Rc::new(Cell::new(0));
    (c.clone(), c)
}

/// Shared event log.
fn log() -> (Rc<RefCell<Vec<String>>>, Rc<RefCell<Vec<String>>>) {
    let l = Rc::new(RefCell::new(Vec::new()));
    (l.clone(), l)
}

/// A diamond dependency never exposes an inconsistent intermediate state:
/// the effect observes both branches of the same write together, once.
#[test]
fn diamond_propagation_is_glitch_free() {
    let source = Signal::new(0);
    let left = {
        let source = source.clone();
        Memo::new(move |_| source.get() + 1)
    };
    let right = {
        let source = source.clone();
        Memo::new(move |_| source.get() * 10)
    };
    let seen: Rc<RefCell<Vec<(i32, i32)>>> = Rc::default();
    let _effect = {
        let seen = seen.clone();
        let (left, right) = (left.clone(), right.clone());
        Effect::new(move || {
            seen.borrow_mut().push((left.get(), right.get()));
        })
    };
    source.set(2);
    source.set(5);
    // One consistent observation per write, in order.
    assert_eq!(*seen.borrow(), vec![(1, 0), (3, 20), (6, 50)]);
}

/// Within one batch, each computation evaluates at most once even when
/// several of its dependencies change.
#[test]
fn at_most_once_evaluation_per_batch() {
    let a = Signal::new(1);
    let b = Signal::new(2);
    let c = Signal::new(3);
    let (runs, runs_w) = counter();
    let _effect = {
        let (a, b, c) = (a.clone(), b.clone(), c.clone());
        Effect::new(move || {
            a.get();
            b.get();
            c.get();
            runs_w.set(runs_w.get() + 1);
        })
    };
    batch(|| {
        a.set(10);
        b.set(20);
        c.set(30);
    });
    assert_eq!(runs.get(), 2);
}

/// Writing a value the comparator judges equal triggers zero re-runs
/// anywhere downstream.
#[test]
fn equal_write_suppresses_all_propagation() {
    let source = Signal::new(1);
    let (memo_runs, memo_runs_w) = counter();
    let doubled = {
        let source = source.clone();
        Memo::new(move |_| {
            memo_runs_w.set(memo_runs_w.get() + 1);
            source.get() * 2
        })
    };
    let (effect_runs, effect_runs_w) = counter();
    let _effect = {
        let doubled = doubled.clone();
        Effect::new(move || {
            doubled.get();
            effect_runs_w.set(effect_runs_w.get() + 1);
        })
    };
    source.set(1);
    assert_eq!(memo_runs.get(), 1);
    assert_eq!(effect_runs.get(), 1);
}

/// A memo chain where an intermediate value does not change collapses the
/// downstream back to clean without recomputing or re-running it.
#[test]
fn unchanged_intermediate_memo_stops_propagation() {
    let count = Signal::new(2);
    let parity = {
        let count = count.clone();
        Memo::new(move |_| count.get() % 2)
    };
    let (label_runs, label_runs_w) = counter();
    let label = {
        let parity = parity.clone();
        Memo::new(move |_| {
            label_runs_w.set(label_runs_w.get() + 1);
            if parity.get() == 0 { "even" } else { "odd" }
        })
    };
    let (effect_runs, effect_runs_w) = counter();
    let _effect = {
        let label = label.clone();
        Effect::new(move || {
            label.get();
            effect_runs_w.set(effect_runs_w.get() + 1);
        })
    };
    assert_eq!(label_runs.get(), 1);
    assert_eq!(effect_runs.get(), 1);
    // 2 -> 4 keeps the parity: nothing past the parity memo re-runs.
    count.set(4);
    assert_eq!(label_runs.get(), 1);
    assert_eq!(effect_runs.get(), 1);
    // 4 -> 5 flips it: everything downstream re-runs exactly once.
    count.set(5);
    assert_eq!(label_runs.get(), 2);
    assert_eq!(effect_runs.get(), 2);
    assert_eq!(label.get(), "odd");
}

/// A write performed inside an effect triggers a fully settled nested pass;
/// dependents of the inner write observe the final value, in order.
#[test]
fn write_inside_effect_settles_nested_pass() {
    let (events, events_w) = log();
    let a = Signal::new(0);
    let b = Signal::new(0);
    let _first = {
        let events = events_w.clone();
        let (a, b) = (a.clone(), b.clone());
        Effect::new(move || {
            let n = a.get();
            events.borrow_mut().push(format!("first saw a={n}"));
            b.set(n * 10);
        })
    };
    let _second = {
        let events = events_w;
        let b = b.clone();
        Effect::new(move || {
            let n = b.get();
            events.borrow_mut().push(format!("second saw b={n}"));
        })
    };
    events.borrow_mut().clear();
    a.set(1);
    assert_eq!(*events.borrow(), vec!["first saw a=1", "second saw b=10"]);
}

/// Render effects as a class run before user effects as a class, regardless
/// of creation order.
#[test]
fn render_effects_run_before_user_effects() {
    let (events, events_w) = log();
    let count = Signal::new(0);
    create_root(|_| {
        {
            let events = events_w.clone();
            let count = count.clone();
            Effect::user(move || {
                count.get();
                events.borrow_mut().push("user".into());
            });
        }
        {
            let events = events_w;
            let count = count.clone();
            Effect::new(move || {
                count.get();
                events.borrow_mut().push("render".into());
            });
        }
    });
    // The render effect's first run precedes the deferred user first run.
    assert_eq!(*events.borrow(), vec!["render", "user"]);
    events.borrow_mut().clear();
    count.set(1);
    assert_eq!(*events.borrow(), vec!["render", "user"]);
}

/// Disposing a root stops its effects, runs cleanups once, and a second
/// dispose is a no-op.
#[test]
fn root_disposal_is_idempotent() {
    let (effect_runs, effect_runs_w) = counter();
    let (cleanups, cleanups_w) = counter();
    let count = Signal::new(0);
    let disposer = create_root(|disposer| {
        let count = count.clone();
        Effect::new(move || {
            count.get();
            effect_runs_w.set(effect_runs_w.get() + 1);
        });
        on_cleanup(move || cleanups_w.set(cleanups_w.get() + 1));
        disposer
    });
    count.set(1);
    assert_eq!(effect_runs.get(), 2);
    disposer.dispose();
    disposer.dispose();
    count.set(2);
    assert_eq!(effect_runs.get(), 2);
    assert_eq!(cleanups.get(), 1);
}

/// A memo handle outlives its owner: disposal severs the memo from the
/// graph but its last value stays readable until the handle drops.
#[test]
fn disposed_memo_keeps_last_value() {
    let count = Signal::new(3);
    let (doubled, disposer) = create_root(|disposer| {
        let count = count.clone();
        (Memo::new(move |_| count.get() * 2), disposer)
    });
    assert_eq!(doubled.get(), 6);

    disposer.dispose();
    assert_eq!(doubled.get(), 6);

    // Detached from its sources: later writes no longer reach it.
    count.set(5);
    assert_eq!(doubled.get(), 6);
    assert_eq!(count.observer_count(), 0);
}

/// An unhandled error aborts the pass by panicking; a caller that catches
/// the unwind finds the runtime reset and can run fresh passes.
#[test]
fn unhandled_error_abandons_the_pass() {
    let trigger = Signal::new(false);
    let _failing = {
        let trigger = trigger.clone();
        Effect::try_new(move || {
            if trigger.get() {
                Err(EvalError::msg("fatal"))
            } else {
                Ok(())
            }
        })
    };
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| trigger.set(true)));
    assert!(result.is_err());

    let count = Signal::new(1);
    let (runs, runs_w) = counter();
    let _effect = {
        let count = count.clone();
        Effect::new(move || {
            count.get();
            runs_w.set(runs_w.get() + 1);
        })
    };
    count.set(2);
    assert_eq!(runs.get(), 2);
}

/// An error thrown by an effect is captured by the handler registered at
/// its root; a handler in a sibling root never fires; the failing root's
/// cleanups still run on disposal.
#[test]
fn error_is_contained_to_its_owner_tree() {
    let caught = Rc::new(RefCell::new(Vec::<String>::new()));
    let sibling_fired = Rc::new(Cell::new(false));
    let (cleanups, cleanups_w) = counter();
    let trigger = Signal::new(false);

    let disposer = create_root(|disposer| {
        {
            let caught = caught.clone();
            on_error(move |err| caught.borrow_mut().push(err.to_string()));
        }
        {
            let trigger = trigger.clone();
            Effect::try_new(move || {
                if trigger.get() {
                    Err(EvalError::msg("boom"))
                } else {
                    Ok(())
                }
            });
        }
        on_cleanup(move || cleanups_w.set(cleanups_w.get() + 1));
        disposer
    });
    create_root(|_| {
        let sibling_fired = sibling_fired.clone();
        on_error(move |_| sibling_fired.set(true));
    });

    trigger.set(true);
    assert_eq!(*caught.borrow(), vec!["boom"]);
    assert!(!sibling_fired.get());

    disposer.dispose();
    assert_eq!(cleanups.get(), 1);
}

/// A handler that itself fails propagates the new error from its owner's
/// parent, reaching the enclosing root's handler.
#[test]
fn failing_handler_escalates_to_enclosing_root() {
    let caught = Rc::new(RefCell::new(Vec::<String>::new()));
    let trigger = Signal::new(false);
    create_root(|_| {
        create_root(|_| {
            try_on_error(|_| Err(EvalError::msg("handler failed")));
            let trigger = trigger.clone();
            Effect::try_new(move || {
                if trigger.get() {
                    Err(EvalError::msg("original"))
                } else {
                    Ok(())
                }
            });
        });
        let caught = caught.clone();
        on_error(move |err| caught.borrow_mut().push(err.to_string()));
    });
    trigger.set(true);
    assert_eq!(*caught.borrow(), vec!["handler failed"]);
}

/// Handler invocations raised during an effect phase are deferred: their
/// side effects land after the remaining effects of the pass have run.
#[test]
fn handlers_run_after_the_effect_phase() {
    let (events, events_w) = log();
    let trigger = Signal::new(false);
    create_root(|_| {
        {
            let events = events_w.clone();
            on_error(move |_| events.borrow_mut().push("handled".into()));
        }
        {
            let trigger = trigger.clone();
            Effect::try_new(move || {
                if trigger.get() {
                    Err(EvalError::msg("boom"))
                } else {
                    Ok(())
                }
            });
        }
        {
            let events = events_w;
            let trigger = trigger.clone();
            Effect::new(move || {
                trigger.get();
                events.borrow_mut().push("other effect".into());
            });
        }
    });
    events.borrow_mut().clear();
    trigger.set(true);
    assert_eq!(*events.borrow(), vec!["other effect", "handled"]);
}

/// A failed pure computation keeps its last value, stays retryable, and
/// recovers once the dependency goes back to a good state.
#[test]
fn failed_memo_retries_on_next_read() {
    let caught = Rc::new(Cell::new(0));
    let input = Signal::new(2);
    let (halved, outer_caught) = create_root(|_| {
        {
            let caught = caught.clone();
            on_error(move |_| caught.set(caught.get() + 1));
        }
        let halved = {
            let input = input.clone();
            Memo::try_new(move |_: Option<&i32>| {
                let n = input.get();
                if n % 2 == 0 {
                    Ok(n / 2)
                } else {
                    Err(EvalError::msg("odd input"))
                }
            })
        };
        (halved, caught.clone())
    });
    assert_eq!(halved.get(), 1);
    input.set(3);
    assert_eq!(halved.try_get(), Some(1));
    assert_eq!(outer_caught.get(), 1);
    input.set(6);
    assert_eq!(halved.get(), 3);
}

/// Dependencies are rebuilt from scratch on every run: branches not taken
/// this time no longer retrigger the computation.
#[test]
fn dynamic_dependencies_follow_the_active_branch() {
    let (runs, runs_w) = counter();
    let use_first = Signal::new(true);
    let first = Signal::new(String::from("a"));
    let second = Signal::new(String::from("b"));
    let chosen = {
        let (use_first, first, second) = (use_first.clone(), first.clone(), second.clone());
        Memo::new(move |_| {
            runs_w.set(runs_w.get() + 1);
            if use_first.get() {
                first.get()
            } else {
                second.get()
            }
        })
    };
    assert_eq!(chosen.get(), "a");
    assert_eq!(second.observer_count(), 0);
    second.set(String::from("bb"));
    assert_eq!(runs.get(), 1);
    use_first.set(false);
    assert_eq!(chosen.get(), "bb");
    assert_eq!(first.observer_count(), 0);
    first.set(String::from("aa"));
    assert_eq!(chosen.get(), "bb");
    assert_eq!(runs.get(), 2);
}

/// Runaway write amplification in a single pass aborts instead of looping.
#[test]
#[should_panic(expected = "maximum update depth")]
fn runaway_updates_abort() {
    set_update_limit(8);
    let source = Signal::new(0);
    let _memos: Vec<Memo<i32>> = (0..10)
        .map(|i| {
            let source = source.clone();
            Memo::new(move |_| source.get() + i)
        })
        .collect();
    source.set(1);
}

/// Nested batches fold into the outermost one: dependents re-run only after
/// the outer batch completes.
#[test]
fn nested_batches_fold() {
    let (runs, runs_w) = counter();
    let a = Signal::new(0);
    let b = Signal::new(0);
    let _effect = {
        let (a, b) = (a.clone(), b.clone());
        Effect::new(move || {
            a.get();
            b.get();
            runs_w.set(runs_w.get() + 1);
        })
    };
    batch(|| {
        a.set(1);
        batch(|| {
            b.set(1);
        });
        assert_eq!(runs.get(), 1);
    });
    assert_eq!(runs.get(), 2);
}

/// Effects compose through memos transparently: the memo recomputes once
/// per change and the effect observes the derived value.
#[test]
fn effect_composes_through_memo() {
    let (memo_runs, memo_runs_w) = counter();
    let celsius = Signal::new(0);
    let fahrenheit = {
        let celsius = celsius.clone();
        Memo::new(move |_| {
            memo_runs_w.set(memo_runs_w.get() + 1);
            celsius.get() * 9 / 5 + 32
        })
    };
    let (seen, seen_w) = log();
    let _effect = {
        let fahrenheit = fahrenheit.clone();
        Effect::new(move || {
            seen_w.borrow_mut().push(fahrenheit.get().to_string());
        })
    };
    celsius.set(100);
    celsius.set(-40);
    assert_eq!(*seen.borrow(), vec!["32", "212", "-40"]);
    assert_eq!(memo_runs.get(), 3);
}
