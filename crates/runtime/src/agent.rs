//! One-current-task slots ("agents").
//!
//! An [`Agent`] owns at most one running [`Task`]. Submitting a new task
//! cancels and drops the previous one, so a superseded task can never publish
//! a result and any storage it captured is freed at that point. The owner
//! calls [`Agent::drive`] from its loop; the agent runs one time-boxed batch
//! and, if the task is still pending, sleeps for `min_sleep_ms` before the next.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::budget::Clock;
use crate::cancel::CancelToken;
use crate::event_bus::EventBus;
use crate::task::{Step, StepContext, Task};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

/// Batch length and pause between batches for cooperative tasks.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AgentTiming {
    pub max_task_ms: f64,
    pub min_sleep_ms: f64,
}

impl Default for AgentTiming {
    fn default() -> Self {
        Self {
            max_task_ms: 100.0,
            min_sleep_ms: 25.0,
        }
    }
}

/// Notifications emitted by an agent, in the order they happened.
#[derive(Debug)]
pub enum AgentEvent<T, E> {
    Submit(TaskId),
    Progress { task: TaskId, fraction: f64 },
    /// The current task finished; its value is now [`Agent::value`].
    Update(Arc<T>),
    /// The current task returned an error. The previous value is kept.
    Reject(E),
    /// The current task panicked. The previous value is kept.
    Fail(String),
    Cancel(TaskId),
}

type BoxedTask<T, E> = Box<dyn Task<Output = T, Error = E>>;

struct Current<T, E> {
    id: TaskId,
    cancel: CancelToken,
    task: BoxedTask<T, E>,
    resume_at_ms: f64,
}

pub struct Agent<T, E> {
    role: &'static str,
    timing: AgentTiming,
    next_id: u64,
    current: Option<Current<T, E>>,
    value: Option<Arc<T>>,
    bus: EventBus<AgentEvent<T, E>>,
}

impl<T, E: fmt::Display> Agent<T, E> {
    pub fn new(role: &'static str, timing: AgentTiming) -> Self {
        Self {
            role,
            timing,
            next_id: 0,
            current: None,
            value: None,
            bus: EventBus::new(),
        }
    }

    pub fn role(&self) -> &'static str {
        self.role
    }

    pub fn timing(&self) -> AgentTiming {
        self.timing
    }

    /// Makes `task` the current task, cancelling whatever was running.
    ///
    /// The first batch runs on the next [`Agent::drive`] at or after `now_ms`.
    pub fn submit<K>(&mut self, task: K, now_ms: f64) -> TaskId
    where
        K: Task<Output = T, Error = E> + 'static,
    {
        self.cancel();
        let id = TaskId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        debug!(role = self.role, task = id.0, "submit");
        self.current = Some(Current {
            id,
            cancel: CancelToken::new(),
            task: Box::new(task),
            resume_at_ms: now_ms,
        });
        self.bus.emit(AgentEvent::Submit(id));
        id
    }

    /// Cancels the current task, if any. Returns `true` if one was running.
    pub fn cancel(&mut self) -> bool {
        let Some(current) = self.current.take() else {
            return false;
        };
        current.cancel.cancel();
        debug!(role = self.role, task = current.id.0, "cancel");
        self.bus.emit(AgentEvent::Cancel(current.id));
        true
    }

    /// Last successfully produced value.
    pub fn value(&self) -> Option<&Arc<T>> {
        self.value.as_ref()
    }

    /// Drops the published value, e.g. when the state it described is gone.
    pub fn clear_value(&mut self) -> Option<Arc<T>> {
        self.value.take()
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_task(&self) -> Option<TaskId> {
        self.current.as_ref().map(|c| c.id)
    }

    /// Time at which the current task wants its next batch.
    pub fn next_wake_ms(&self) -> Option<f64> {
        self.current.as_ref().map(|c| c.resume_at_ms)
    }

    /// Runs one batch of the current task if its pause has elapsed.
    ///
    /// Returns `true` when a batch ran.
    pub fn drive(&mut self, clock: &dyn Clock) -> bool {
        let now = clock.now_ms();
        let Some(current) = self.current.as_mut() else {
            return false;
        };
        if now < current.resume_at_ms {
            return false;
        }

        let id = current.id;
        let outcome = {
            let mut cx = StepContext::new(&current.cancel, clock, self.timing.max_task_ms);
            let task = &mut current.task;
            panic::catch_unwind(AssertUnwindSafe(|| task.step(&mut cx)))
        };

        match outcome {
            Ok(Step::Pending { progress }) => {
                current.resume_at_ms = clock.now_ms() + self.timing.min_sleep_ms;
                if let Some(fraction) = progress {
                    self.bus.emit(AgentEvent::Progress { task: id, fraction });
                }
            }
            Ok(Step::Ready(value)) => {
                self.current = None;
                let value = Arc::new(value);
                self.value = Some(Arc::clone(&value));
                debug!(role = self.role, task = id.0, "update");
                self.bus.emit(AgentEvent::Update(value));
            }
            Ok(Step::Failed(err)) => {
                self.current = None;
                warn!(role = self.role, task = id.0, error = %err, "reject");
                self.bus.emit(AgentEvent::Reject(err));
            }
            Ok(Step::Canceled) => {
                self.current = None;
                debug!(role = self.role, task = id.0, "task observed cancellation");
            }
            Err(payload) => {
                self.current = None;
                let message = panic_message(payload.as_ref());
                error!(role = self.role, task = id.0, %message, "task panicked");
                self.bus.emit(AgentEvent::Fail(message));
            }
        }
        true
    }

    pub fn drain_events(&mut self) -> Vec<AgentEvent<T, E>> {
        self.bus.drain().into_iter().map(|e| e.payload).collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ManualClock;
    use std::sync::mpsc;

    /// Resolves with whatever arrives on its channel.
    struct Remote {
        rx: mpsc::Receiver<Result<u32, String>>,
    }

    impl Task for Remote {
        type Output = u32;
        type Error = String;

        fn step(&mut self, cx: &mut StepContext<'_>) -> Step<u32, String> {
            if cx.is_canceled() {
                return Step::Canceled;
            }
            match self.rx.try_recv() {
                Ok(Ok(v)) => Step::Ready(v),
                Ok(Err(e)) => Step::Failed(e),
                Err(mpsc::TryRecvError::Empty) => Step::pending(),
                Err(mpsc::TryRecvError::Disconnected) => Step::Failed("disconnected".into()),
            }
        }
    }

    fn remote() -> (mpsc::Sender<Result<u32, String>>, Remote) {
        let (tx, rx) = mpsc::channel();
        (tx, Remote { rx })
    }

    fn agent() -> Agent<u32, String> {
        Agent::new(
            "test",
            AgentTiming {
                max_task_ms: 100.0,
                min_sleep_ms: 25.0,
            },
        )
    }

    fn settle(agent: &mut Agent<u32, String>, clock: &ManualClock) {
        for _ in 0..10 {
            agent.drive(clock);
            clock.advance(25.0);
        }
    }

    #[test]
    fn superseded_task_result_is_ignored() {
        let clock = ManualClock::new(0.0);
        let mut agent = agent();
        let (tx_a, task_a) = remote();
        let (tx_b, task_b) = remote();

        agent.submit(task_a, 0.0);
        agent.drive(&clock);
        agent.submit(task_b, 0.0);

        // A resolves after B was submitted: its task is gone, so nobody hears it.
        assert!(tx_a.send(Ok(1)).is_err());
        tx_b.send(Ok(2)).unwrap();
        settle(&mut agent, &clock);

        assert_eq!(agent.value().map(|v| **v), Some(2));
        assert!(!agent.is_running());
    }

    #[test]
    fn events_follow_lifecycle_order() {
        let clock = ManualClock::new(0.0);
        let mut agent = agent();
        let (_tx_a, task_a) = remote();
        let (tx_b, task_b) = remote();

        let a = agent.submit(task_a, 0.0);
        let b = agent.submit(task_b, 0.0);
        tx_b.send(Ok(7)).unwrap();
        agent.drive(&clock);

        let events = agent.drain_events();
        assert!(matches!(events[0], AgentEvent::Submit(id) if id == a));
        assert!(matches!(events[1], AgentEvent::Cancel(id) if id == a));
        assert!(matches!(events[2], AgentEvent::Submit(id) if id == b));
        assert!(matches!(&events[3], AgentEvent::Update(v) if **v == 7));
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn rejection_keeps_previous_value() {
        let clock = ManualClock::new(0.0);
        let mut agent = agent();
        let (tx, task) = remote();
        agent.submit(task, 0.0);
        tx.send(Ok(3)).unwrap();
        agent.drive(&clock);

        let (tx, task) = remote();
        agent.submit(task, 0.0);
        tx.send(Err("boom".into())).unwrap();
        agent.drive(&clock);

        assert_eq!(agent.value().map(|v| **v), Some(3));
        let events = agent.drain_events();
        assert!(matches!(events.last(), Some(AgentEvent::Reject(e)) if e == "boom"));
    }

    struct Panics;

    impl Task for Panics {
        type Output = u32;
        type Error = String;

        fn step(&mut self, _cx: &mut StepContext<'_>) -> Step<u32, String> {
            panic!("bad pixel");
        }
    }

    #[test]
    fn panic_becomes_fail_event() {
        let clock = ManualClock::new(0.0);
        let mut agent = agent();
        agent.submit(Panics, 0.0);
        assert!(agent.drive(&clock));
        assert!(!agent.is_running());
        let events = agent.drain_events();
        assert!(matches!(events.last(), Some(AgentEvent::Fail(m)) if m == "bad pixel"));
        assert!(agent.value().is_none());
    }

    #[test]
    fn pending_task_sleeps_between_batches() {
        let clock = ManualClock::new(0.0);
        let mut agent = agent();
        let (_tx, task) = remote();
        agent.submit(task, 0.0);

        assert!(agent.drive(&clock));
        assert_eq!(agent.next_wake_ms(), Some(25.0));
        clock.set(10.0);
        assert!(!agent.drive(&clock));
        clock.set(25.0);
        assert!(agent.drive(&clock));
    }

    #[test]
    fn cancel_without_task_is_noop() {
        let mut agent = agent();
        assert!(!agent.cancel());
        assert!(agent.drain_events().is_empty());
    }
}
