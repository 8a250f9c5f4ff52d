//! Drag and auto-scroll state for horizontal card strips.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::trace;

use crate::cache::lock::mutex_lock;

const TARGET: &str = "happylife::views::carousel";

pub const DEFAULT_TICK: Duration = Duration::from_millis(16);
pub const DEFAULT_STEP: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Drag {
    start_x: f64,
    start_offset: f64,
}

/// Scroll position of a strip `content` wide seen through a `viewport`.
///
/// The offset stays within `[0, content - viewport]`. Auto-advance moves it
/// by `step` per tick and wraps to 0 at the end; it is suspended while a
/// drag is in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct Carousel {
    offset: f64,
    viewport: f64,
    content: f64,
    step: f64,
    drag: Option<Drag>,
}

impl Carousel {
    pub fn new(viewport: f64, content: f64) -> Self {
        Self {
            offset: 0.0,
            viewport: viewport.max(0.0),
            content: content.max(0.0),
            step: DEFAULT_STEP,
            drag: None,
        }
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn max_offset(&self) -> f64 {
        (self.content - self.viewport).max(0.0)
    }

    fn at_end(&self) -> bool {
        self.offset + self.viewport >= self.content
    }

    fn set_offset(&mut self, offset: f64) {
        self.offset = offset.clamp(0.0, self.max_offset());
    }

    /// New measurements after the item list or the window changed.
    pub fn resize(&mut self, viewport: f64, content: f64) {
        self.viewport = viewport.max(0.0);
        self.content = content.max(0.0);
        self.set_offset(self.offset);
    }

    pub fn pointer_down(&mut self, x: f64) {
        self.drag = Some(Drag {
            start_x: x,
            start_offset: self.offset,
        });
    }

    /// Dragging left scrolls right: the offset follows `start_x - x`.
    pub fn pointer_move(&mut self, x: f64) {
        if let Some(drag) = self.drag {
            self.set_offset(drag.start_offset + (drag.start_x - x));
        }
    }

    pub fn pointer_up(&mut self) {
        self.drag = None;
    }

    pub fn pointer_leave(&mut self) {
        self.pointer_up();
    }

    /// Arrow-button scroll by a fixed distance.
    pub fn scroll_by(&mut self, delta: f64) {
        self.set_offset(self.offset + delta);
    }

    /// One auto-advance step. Returns the new offset.
    pub fn tick(&mut self) -> f64 {
        if self.drag.is_some() {
            return self.offset;
        }
        self.set_offset(self.offset + self.step);
        if self.at_end() {
            self.offset = 0.0;
        }
        self.offset
    }
}

/// Carousel shared between a page and its auto-advance task.
#[derive(Debug, Clone)]
pub struct CarouselHandle {
    inner: Arc<Mutex<Carousel>>,
}

impl CarouselHandle {
    pub fn new(carousel: Carousel) -> Self {
        Self {
            inner: Arc::new(Mutex::new(carousel)),
        }
    }

    pub fn with<R>(&self, apply: impl FnOnce(&mut Carousel) -> R) -> R {
        let mut carousel = mutex_lock(&self.inner, TARGET, "with");
        apply(&mut carousel)
    }

    pub fn offset(&self) -> f64 {
        self.with(|carousel| carousel.offset())
    }

    /// Run auto-advance every `every` until the returned task is aborted.
    pub fn drive(&self, every: Duration) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let offset = handle.with(Carousel::tick);
                trace!(offset, "Carousel advanced");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_freezes_auto_advance_until_release() {
        let mut carousel = Carousel::new(300.0, 1200.0);
        carousel.pointer_down(400.0);
        carousel.pointer_move(300.0);
        assert_eq!(carousel.offset(), 100.0);

        for _ in 0..10 {
            assert_eq!(carousel.tick(), 100.0);
        }

        carousel.pointer_up();
        assert_eq!(carousel.tick(), 101.0);
        assert_eq!(carousel.tick(), 102.0);
    }

    #[test]
    fn advance_wraps_to_start_at_the_end() {
        let mut carousel = Carousel::new(300.0, 305.0);
        for expected in 1..5 {
            assert_eq!(carousel.tick(), f64::from(expected));
        }
        assert_eq!(carousel.tick(), 0.0);
    }

    #[test]
    fn content_narrower_than_viewport_stays_at_zero() {
        let mut carousel = Carousel::new(800.0, 400.0);
        assert_eq!(carousel.tick(), 0.0);
        carousel.scroll_by(350.0);
        assert_eq!(carousel.offset(), 0.0);
    }

    #[test]
    fn drag_is_clamped_and_pointer_leave_ends_it() {
        let mut carousel = Carousel::new(300.0, 1000.0);
        carousel.pointer_down(0.0);
        carousel.pointer_move(100.0);
        assert_eq!(carousel.offset(), 0.0);
        carousel.pointer_move(-5000.0);
        assert_eq!(carousel.offset(), 700.0);

        carousel.pointer_leave();
        assert!(!carousel.is_dragging());
        carousel.pointer_move(0.0);
        assert_eq!(carousel.offset(), 700.0);
    }

    #[test]
    fn resize_reclamps_offset() {
        let mut carousel = Carousel::new(300.0, 1000.0);
        carousel.scroll_by(600.0);
        carousel.resize(300.0, 500.0);
        assert_eq!(carousel.offset(), 200.0);
    }

    #[tokio::test(start_paused = true)]
    async fn driver_advances_on_each_interval() {
        let handle = CarouselHandle::new(Carousel::new(100.0, 1000.0).with_step(2.0));
        let task = handle.drive(DEFAULT_TICK);

        for _ in 0..5 {
            tokio::time::sleep(DEFAULT_TICK).await;
        }
        tokio::task::yield_now().await;
        let advanced = handle.offset();
        assert!(advanced >= 8.0, "offset {advanced}");

        task.abort();
        tokio::time::sleep(DEFAULT_TICK * 4).await;
        tokio::task::yield_now().await;
        assert_eq!(handle.offset(), advanced);
    }
}
