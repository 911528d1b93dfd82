use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;
use std::sync::Arc;

use layers::TrailSurface;
use runtime::{FrameThrottle, Step, StepContext, Task};
use tracing::{debug, trace};

use crate::field::Field;
use crate::particles::ParticleSimulator;

/// Surface shared between the animation task and whoever presents it.
pub type SharedSurface<S> = Rc<RefCell<S>>;

/// Particle animation as a never-ending task.
///
/// Each step is one animation callback. Callbacks closer together than the
/// throttle interval are skipped; the others evolve the particles and draw
/// their trails. The task only settles when canceled, or after `frame_limit`
/// drawn frames if one is set.
pub struct Animation<S> {
    field: Arc<Field>,
    simulator: ParticleSimulator,
    surface: SharedSurface<S>,
    throttle: FrameThrottle,
    frame_limit: Option<u64>,
}

impl<S: TrailSurface> Animation<S> {
    pub fn new(
        field: Arc<Field>,
        simulator: ParticleSimulator,
        surface: SharedSurface<S>,
        throttle: FrameThrottle,
    ) -> Self {
        Self {
            field,
            simulator,
            surface,
            throttle,
            frame_limit: None,
        }
    }

    /// Settles with the drawn frame count once `frames` have been drawn.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    pub fn frames_drawn(&self) -> u64 {
        self.throttle.frames_drawn()
    }

    pub fn simulator(&self) -> &ParticleSimulator {
        &self.simulator
    }
}

impl<S: TrailSurface> Task for Animation<S> {
    type Output = u64;
    type Error = Infallible;

    fn step(&mut self, cx: &mut StepContext<'_>) -> Step<u64, Infallible> {
        if cx.is_canceled() {
            debug!(frames = self.frames_drawn(), "animation stopped");
            return Step::Canceled;
        }
        if let Some(limit) = self.frame_limit
            && self.frames_drawn() >= limit
        {
            return Step::Ready(self.frames_drawn());
        }
        // Someone else is reading the surface; try again next callback.
        let Ok(mut surface) = self.surface.try_borrow_mut() else {
            return Step::pending();
        };
        if let Some(frame) = self.throttle.tick(cx.now_ms()) {
            self.simulator.evolve(&self.field);
            self.simulator.draw(&self.field, &mut *surface);
            trace!(frame = frame.index, "animation frame");
        }
        Step::pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldSample;
    use crate::particles::ParticleSettings;
    use foundation::bounds::ViewBounds;
    use layers::{RgbaImage, TrailCanvas};
    use runtime::{CancelToken, ManualClock};

    fn field() -> Arc<Field> {
        Arc::new(Field::new(
            ViewBounds::new(0, 0, 39, 39),
            1,
            40,
            vec![FieldSample::Flow([1.0, 0.5, 4.0]); 40 * 40],
            RgbaImage::new(40, 40),
        ))
    }

    fn animation(surface: SharedSurface<TrailCanvas>) -> Animation<TrailCanvas> {
        let field = field();
        let sim = ParticleSimulator::new(&field, 100, ParticleSettings::default(), 100.0, 21);
        Animation::new(field, sim, surface, FrameThrottle::new(40.0))
    }

    fn step(anim: &mut Animation<TrailCanvas>, cancel: &CancelToken, clock: &ManualClock) -> Step<u64, Infallible> {
        let mut cx = StepContext::new(cancel, clock, 100.0);
        anim.step(&mut cx)
    }

    #[test]
    fn throttle_skips_early_callbacks() {
        let surface = Rc::new(RefCell::new(TrailCanvas::new(40, 40)));
        let mut anim = animation(Rc::clone(&surface));
        let cancel = CancelToken::new();
        let clock = ManualClock::new(1000.0);

        for _ in 0..5 {
            assert!(step(&mut anim, &cancel, &clock).is_pending());
            clock.advance(16.0);
        }
        // Callbacks at 1000, 1016, 1032, 1048 and 1064: frames at 1000 and 1048.
        assert_eq!(anim.frames_drawn(), 2);
        assert!(surface.borrow().stroke_calls() > 0);
    }

    #[test]
    fn cancel_stops_the_loop() {
        let surface = Rc::new(RefCell::new(TrailCanvas::new(40, 40)));
        let mut anim = animation(surface);
        let cancel = CancelToken::new();
        let clock = ManualClock::new(0.0);
        assert!(step(&mut anim, &cancel, &clock).is_pending());
        cancel.cancel();
        assert!(matches!(step(&mut anim, &cancel, &clock), Step::Canceled));
        assert_eq!(anim.frames_drawn(), 1);
    }

    #[test]
    fn frame_limit_settles() {
        let surface = Rc::new(RefCell::new(TrailCanvas::new(40, 40)));
        let mut anim = animation(surface).with_frame_limit(3);
        let cancel = CancelToken::new();
        let clock = ManualClock::new(0.0);
        let mut calls = 0;
        let frames = loop {
            calls += 1;
            match step(&mut anim, &cancel, &clock) {
                Step::Ready(frames) => break frames,
                Step::Pending { .. } => clock.advance(50.0),
                _ => panic!("unexpected outcome"),
            }
        };
        assert_eq!(frames, 3);
        assert_eq!(calls, 4);
    }

    #[test]
    fn busy_surface_defers_the_frame() {
        let surface = Rc::new(RefCell::new(TrailCanvas::new(40, 40)));
        let mut anim = animation(Rc::clone(&surface));
        let cancel = CancelToken::new();
        let clock = ManualClock::new(0.0);
        {
            let _reader = surface.borrow();
            assert!(step(&mut anim, &cancel, &clock).is_pending());
        }
        assert_eq!(anim.frames_drawn(), 0);
        step(&mut anim, &cancel, &clock);
        assert_eq!(anim.frames_drawn(), 1);
    }
}
