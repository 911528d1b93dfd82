use crate::budget::{Clock, TimeBudget};
use crate::cancel::CancelToken;

/// Outcome of running one batch of a [`Task`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T, E> {
    /// More work remains. `progress` is the completed fraction in `[0, 1]`
    /// when the task can estimate it.
    Pending { progress: Option<f64> },
    Ready(T),
    Failed(E),
    /// The task observed its cancel flag and stopped.
    Canceled,
}

impl<T, E> Step<T, E> {
    pub fn pending() -> Self {
        Step::Pending { progress: None }
    }

    pub fn progress(fraction: f64) -> Self {
        Step::Pending {
            progress: Some(fraction.clamp(0.0, 1.0)),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Step::Pending { .. })
    }
}

/// Per-batch view handed to [`Task::step`]: the cancel flag plus the batch's
/// time budget.
pub struct StepContext<'a> {
    cancel: &'a CancelToken,
    clock: &'a dyn Clock,
    budget: TimeBudget,
}

impl<'a> StepContext<'a> {
    pub fn new(cancel: &'a CancelToken, clock: &'a dyn Clock, max_ms: f64) -> Self {
        let budget = TimeBudget::start(clock, max_ms);
        Self {
            cancel,
            clock,
            budget,
        }
    }

    pub fn unbounded(cancel: &'a CancelToken, clock: &'a dyn Clock) -> Self {
        Self {
            cancel,
            clock,
            budget: TimeBudget::unlimited(),
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    /// True once the batch has used up its budget.
    pub fn should_yield(&self) -> bool {
        self.budget.is_exhausted(self.clock)
    }

    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.budget.elapsed_ms(self.clock)
    }
}

/// Resumable unit of long-running work.
///
/// A task does a bounded amount of work per call to `step` and keeps whatever
/// it needs to continue in `self`. Callers resume it later by calling `step`
/// again, so no work ever blocks the host loop for longer than one batch.
pub trait Task {
    type Output;
    type Error;

    fn step(&mut self, cx: &mut StepContext<'_>) -> Step<Self::Output, Self::Error>;
}

/// Drives a task with an unbounded budget until it settles.
///
/// Headless tools and tests use this when interleaving with other work does
/// not matter.
pub fn run_to_completion<T: Task + ?Sized>(
    task: &mut T,
    cancel: &CancelToken,
    clock: &dyn Clock,
) -> Step<T::Output, T::Error> {
    loop {
        let mut cx = StepContext::unbounded(cancel, clock);
        let step = task.step(&mut cx);
        if !step.is_pending() {
            return step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ManualClock;

    struct Countdown {
        remaining: u32,
        per_batch: u32,
    }

    impl Task for Countdown {
        type Output = &'static str;
        type Error = ();

        fn step(&mut self, cx: &mut StepContext<'_>) -> Step<&'static str, ()> {
            if cx.is_canceled() {
                return Step::Canceled;
            }
            let mut done = 0;
            while self.remaining > 0 && done < self.per_batch {
                self.remaining -= 1;
                done += 1;
            }
            if self.remaining == 0 {
                Step::Ready("done")
            } else {
                Step::pending()
            }
        }
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(
            Step::<(), ()>::progress(1.5),
            Step::Pending {
                progress: Some(1.0)
            }
        );
    }

    #[test]
    fn run_to_completion_resumes_until_ready() {
        let clock = ManualClock::new(0.0);
        let cancel = CancelToken::new();
        let mut task = Countdown {
            remaining: 10,
            per_batch: 3,
        };
        assert_eq!(run_to_completion(&mut task, &cancel, &clock), Step::Ready("done"));
    }

    #[test]
    fn canceled_task_stops_at_checkpoint() {
        let clock = ManualClock::new(0.0);
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut task = Countdown {
            remaining: 10,
            per_batch: 3,
        };
        assert_eq!(run_to_completion(&mut task, &cancel, &clock), Step::Canceled);
        assert_eq!(task.remaining, 10);
    }

    #[test]
    fn context_reports_exhausted_budget() {
        let clock = ManualClock::new(0.0);
        let cancel = CancelToken::new();
        let cx = StepContext::new(&cancel, &clock, 100.0);
        assert!(!cx.should_yield());
        clock.advance(101.0);
        assert!(cx.should_yield());
    }
}
