//! Streaming view: the host component tying the pipeline together.
//!
//! A [`StreamView`] owns a container node and everything needed to keep it
//! in sync with a growing source text:
//!
//! 1. Incoming text is offered to the [`Throttle`]
//! 2. Released content is rendered by the [`ContentRenderer`]
//! 3. The [`Reconciler`] patches the container using the configured
//!    [`ApplyMode`]
//! 4. The measured cost feeds the [`PacingController`], whose new interval
//!    goes back to the throttle, and the caches are trimmed
//!
//! The host calls [`StreamView::on_frame`] at each display refresh.

use super::renderer::{ContentRenderer, PlainRenderer, RenderStrategy};
use crate::cache::{CacheConfig, CacheManager};
use crate::dom::{Morph, NodeRef, Patch};
use crate::error::Result;
use crate::pacing::{Offer, PacingConfig, PacingController, Throttle};
use crate::reconcile::Reconciler;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Which reconciliation strategy applies rendered markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyMode {
    /// Whole-tree patch, applied immediately.
    Whole,
    /// Whole-tree patch, applied at the next frame.
    WholeDeferred,
    /// Positional patch of the top-level children.
    #[default]
    Children,
}

/// Configuration for a [`StreamView`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewConfig {
    /// Reconciliation strategy.
    pub apply_mode: ApplyMode,
    /// Render path, which selects the render cache partition.
    pub strategy: RenderStrategy,
    /// Cache budget and partitions.
    pub cache: CacheConfig,
    /// Pacing feedback loop.
    pub pacing: PacingConfig,
}

impl ViewConfig {
    /// Set the apply mode.
    #[must_use]
    pub const fn with_apply_mode(mut self, mode: ApplyMode) -> Self {
        self.apply_mode = mode;
        self
    }

    /// Set the render strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: RenderStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the cache configuration.
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set the pacing configuration.
    #[must_use]
    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    /// Validate the nested configurations.
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.pacing.validate()
    }
}

/// What happened during one streaming session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSummary {
    /// Times content was rendered and reconciled.
    pub applies: u64,
    /// Offers that replaced content already waiting for a frame.
    pub coalesced: u64,
    /// Mean measured apply cost.
    pub mean_apply: Duration,
    /// Pacing interval at the end of the session.
    pub final_interval: Duration,
    /// Summed cache size at the end of the session.
    pub cache_bytes: usize,
    /// Summed cache entries at the end of the session.
    pub cache_entries: usize,
    /// Caller-clock time between session start and end.
    pub elapsed: Duration,
}

/// Streaming view over one container.
#[derive(Debug)]
pub struct StreamView<R: ContentRenderer = PlainRenderer, P: Patch = Morph> {
    container: NodeRef,
    source: String,
    renderer: R,
    reconciler: Reconciler<P>,
    caches: CacheManager,
    pacing: PacingController,
    throttle: Throttle<String>,
    apply_mode: ApplyMode,
    strategy: RenderStrategy,
    applies: u64,
    /// Render cost of the patch waiting in the deferred queue.
    deferred_cost: Option<Duration>,
    session_start: Option<Instant>,
}

impl StreamView {
    /// Create a view rendering into `container` with the built-in renderer
    /// and patch primitive.
    pub fn new(container: NodeRef, config: ViewConfig) -> Result<Self> {
        Self::with_parts(container, config, PlainRenderer::new(), Morph::new())
    }
}

impl<R: ContentRenderer, P: Patch> StreamView<R, P> {
    /// Create a view from custom renderer and patch primitive.
    pub fn with_parts(
        container: NodeRef,
        config: ViewConfig,
        renderer: R,
        patcher: P,
    ) -> Result<Self> {
        config.validate()?;
        let pacing = PacingController::new(config.pacing)?;
        let throttle = Throttle::new(pacing.current_interval());
        Ok(Self {
            container,
            source: String::new(),
            renderer,
            reconciler: Reconciler::with_patcher(patcher),
            caches: CacheManager::new(config.cache)?,
            pacing,
            throttle,
            apply_mode: config.apply_mode,
            strategy: config.strategy,
            applies: 0,
            deferred_cost: None,
            session_start: None,
        })
    }

    /// The container being kept in sync.
    pub const fn container(&self) -> &NodeRef {
        &self.container
    }

    /// The accumulated source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The reconciliation engine.
    pub const fn reconciler(&self) -> &Reconciler<P> {
        &self.reconciler
    }

    /// The render caches.
    pub const fn caches(&self) -> &CacheManager {
        &self.caches
    }

    /// The pacing controller.
    pub const fn pacing(&self) -> &PacingController {
        &self.pacing
    }

    /// Check whether a streaming session is running.
    pub const fn is_live(&self) -> bool {
        self.throttle.is_live()
    }

    /// Check whether content is waiting for a frame, in the throttle or in
    /// the deferred patch queue.
    pub fn has_pending(&self) -> bool {
        self.throttle.is_scheduled() || self.reconciler.has_pending(&self.container)
    }

    /// Begin a streaming session: pacing restarts from the base interval and
    /// offers are throttled.
    pub fn start_session(&mut self, now: Instant) {
        self.pacing.reset();
        self.throttle.reset();
        self.throttle.set_interval(self.pacing.current_interval());
        self.throttle.set_live(true);
        self.applies = 0;
        self.session_start = Some(now);
        info!(
            mode = ?self.apply_mode,
            interval_ms = self.pacing.current_interval().as_millis(),
            "stream session started"
        );
    }

    /// Append `chunk` to the source and offer it for display. Returns
    /// whether the container changed (in deferred mode, whether a patch was
    /// scheduled).
    pub fn push(&mut self, chunk: &str, now: Instant) -> Result<bool> {
        self.source.push_str(chunk);
        self.offer(now)
    }

    /// Replace the source and offer it for display. Returns whether the
    /// container changed.
    pub fn set_source(&mut self, source: &str, now: Instant) -> Result<bool> {
        source.clone_into(&mut self.source);
        self.offer(now)
    }

    fn offer(&mut self, now: Instant) -> Result<bool> {
        match self.throttle.offer(now, self.source.clone()) {
            Offer::Apply(content) => self.apply(&content),
            Offer::Scheduled | Offer::Coalesced => Ok(false),
        }
    }

    /// Display-refresh callback: release throttled content and run
    /// deferred patches. Returns the number of patches applied.
    pub fn on_frame(&mut self, now: Instant) -> Result<usize> {
        let mut applied = 0;
        if let Some(content) = self.throttle.on_frame(now) {
            if self.apply(&content)? && self.apply_mode != ApplyMode::WholeDeferred {
                applied += 1;
            }
        }

        if self.reconciler.pending_count() > 0 {
            let started = Instant::now();
            let render_cost = self.deferred_cost.take().unwrap_or_default();
            let ran = self.reconciler.run_frame()?;
            if ran > 0 {
                self.applies += 1;
                self.record(render_cost + started.elapsed());
            }
            applied += ran;
        }
        Ok(applied)
    }

    /// End the session: flush the final content unthrottled and summarize.
    pub fn end_session(&mut self, now: Instant) -> Result<SessionSummary> {
        self.throttle.set_live(false);
        self.throttle.cancel();

        let content = self.source.clone();
        self.render_and_patch(&content, true)?;

        let summary = SessionSummary {
            applies: self.applies,
            coalesced: self.throttle.coalesced(),
            mean_apply: self.pacing.mean_duration(),
            final_interval: self.pacing.current_interval(),
            cache_bytes: self.caches.total_bytes(),
            cache_entries: self.caches.total_entries(),
            elapsed: self
                .session_start
                .take()
                .map_or(Duration::ZERO, |start| now.saturating_duration_since(start)),
        };
        info!(
            applies = summary.applies,
            coalesced = summary.coalesced,
            mean_apply_us = summary.mean_apply.as_micros(),
            final_interval_ms = summary.final_interval.as_millis(),
            cache_bytes = summary.cache_bytes,
            cache_entries = summary.cache_entries,
            "stream session ended"
        );
        Ok(summary)
    }

    /// Clear the source, the container and all state for it. Sentinel
    /// children flagged as ignored are kept.
    pub fn reset(&mut self) {
        self.source.clear();
        self.throttle.cancel();
        self.deferred_cost = None;
        self.reconciler.reset_state(Some(&self.container));
        self.container.clear_children();
        debug!(container = self.container.id(), "stream view reset");
    }

    fn apply(&mut self, content: &str) -> Result<bool> {
        self.render_and_patch(content, false)
    }

    /// Render `content` and reconcile it into the container. `flush` forces
    /// deferred mode to patch synchronously.
    fn render_and_patch(&mut self, content: &str, flush: bool) -> Result<bool> {
        let started = Instant::now();
        let markup = self.renderer.render(content, self.strategy, &mut self.caches);

        let changed = match self.apply_mode {
            ApplyMode::Whole => self.reconciler.reconcile_whole(&self.container, &markup)?,
            ApplyMode::WholeDeferred if !flush => {
                let scheduled = self
                    .reconciler
                    .reconcile_whole_deferred(&self.container, &markup);
                // The frame that runs the patch records one combined sample.
                self.deferred_cost = scheduled.then(|| started.elapsed());
                self.caches.trim_if_needed();
                return Ok(scheduled);
            }
            ApplyMode::WholeDeferred => {
                self.deferred_cost = None;
                self.reconciler.reconcile_whole(&self.container, &markup)?
            }
            ApplyMode::Children => self.reconciler.reconcile_children(&self.container, &markup)?,
        };

        self.applies += 1;
        self.record(started.elapsed());
        self.caches.trim_if_needed();
        Ok(changed)
    }

    fn record(&mut self, cost: Duration) {
        let interval = self.pacing.record_duration(cost);
        self.throttle.set_interval(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Partition;

    const STEP: Duration = Duration::from_millis(5);

    fn view(mode: ApplyMode) -> StreamView {
        view_over(NodeRef::element("div"), mode)
    }

    fn view_over(container: NodeRef, mode: ApplyMode) -> StreamView {
        let config = ViewConfig::default().with_apply_mode(mode);
        StreamView::new(container, config).unwrap()
    }

    #[test]
    fn test_first_push_applies_immediately() {
        let mut view = view(ApplyMode::Children);
        let t0 = Instant::now();
        view.start_session(t0);

        assert!(view.push("hello", t0).unwrap());
        assert_eq!(view.container().inner_markup(), "<p>hello</p>");
    }

    #[test]
    fn test_fast_pushes_are_coalesced_until_frame() {
        let mut view = view(ApplyMode::Children);
        let t0 = Instant::now();
        view.start_session(t0);
        view.push("a", t0).unwrap();

        assert!(!view.push("b", t0 + STEP).unwrap());
        assert!(!view.push("c", t0 + STEP * 2).unwrap());
        assert_eq!(view.container().inner_markup(), "<p>a</p>");
        assert!(view.has_pending());

        assert_eq!(view.on_frame(t0 + STEP * 3).unwrap(), 1);
        assert_eq!(view.container().inner_markup(), "<p>abc</p>");
        assert!(!view.has_pending());
        assert_eq!(view.on_frame(t0 + STEP * 4).unwrap(), 0);
    }

    #[test]
    fn test_growing_stream_skips_unchanged_blocks() {
        let mut view = view(ApplyMode::Children);
        let t0 = Instant::now();
        view.start_session(t0);

        view.push("# Title\n\nfirst", t0).unwrap();
        let heading = view.container().child(0).unwrap();
        let later = t0 + view.pacing().max_interval();
        view.push(" paragraph", later).unwrap();

        let stats = view.reconciler().stats(view.container());
        assert_eq!((stats.skipped, stats.updated), (1, 1));
        assert!(view.container().child(0).unwrap().ptr_eq(&heading));
    }

    #[test]
    fn test_deferred_mode_patches_on_frame() {
        let mut view = view(ApplyMode::WholeDeferred);
        let t0 = Instant::now();
        view.start_session(t0);

        assert!(view.push("x", t0).unwrap());
        assert_eq!(view.container().child_count(), 0);
        assert_eq!(view.on_frame(t0 + STEP).unwrap(), 1);
        assert_eq!(view.container().inner_markup(), "<p>x</p>");
    }

    #[test]
    fn test_deferred_mode_records_one_sample_per_patch() {
        let mut view = view(ApplyMode::WholeDeferred);
        let t0 = Instant::now();
        view.start_session(t0);

        view.push("x", t0).unwrap();
        assert_eq!(view.pacing().samples(), 0);

        view.on_frame(t0 + Duration::from_millis(16)).unwrap();
        assert_eq!(view.pacing().samples(), 1);

        // Nothing queued: no sample.
        view.on_frame(t0 + Duration::from_millis(32)).unwrap();
        assert_eq!(view.pacing().samples(), 1);
        let summary = view.end_session(t0 + Duration::from_millis(40)).unwrap();
        assert_eq!(summary.applies, 2);
    }

    #[test]
    fn test_end_session_flushes_pending() {
        for mode in [ApplyMode::Whole, ApplyMode::WholeDeferred, ApplyMode::Children] {
            let mut view = view(mode);
            let t0 = Instant::now();
            view.start_session(t0);
            view.push("one", t0).unwrap();
            view.push(" two", t0 + STEP).unwrap();

            let summary = view.end_session(t0 + STEP * 2).unwrap();

            assert_eq!(view.container().inner_markup(), "<p>one two</p>", "{mode:?}");
            assert!(!view.is_live());
            // A deferred patch still queued at the end is superseded by the
            // flush, so it never counts as an apply.
            let expected = if mode == ApplyMode::WholeDeferred { 1 } else { 2 };
            assert_eq!(summary.applies, expected, "{mode:?}");
            assert!(summary.final_interval >= Duration::from_millis(50));
            assert!(summary.cache_entries >= 1);
            assert_eq!(summary.elapsed, STEP * 2);
        }
    }

    #[test]
    fn test_not_live_applies_every_push() {
        let mut view = view(ApplyMode::Whole);
        let t0 = Instant::now();
        view.push("a", t0).unwrap();
        view.push("b", t0).unwrap();
        assert_eq!(view.container().inner_markup(), "<p>ab</p>");
    }

    #[test]
    fn test_reset_keeps_sentinel() {
        let container = NodeRef::element("div");
        let mut view = StreamView::new(container.clone(), ViewConfig::default()).unwrap();
        view.set_source("some text", Instant::now()).unwrap();
        container.append_child(NodeRef::element("span").ignored());

        view.reset();

        assert_eq!(view.source(), "");
        assert_eq!(container.child_count(), 1);
        assert!(container.child(0).unwrap().is_ignored());
        assert!(view.reconciler().state(&container).is_none());
    }

    #[test]
    fn test_positional_reset_clears_content_around_sentinel() {
        let container = NodeRef::element("div");
        container.append_child(
            NodeRef::element("span")
                .with_attr("class", "cursor")
                .ignored(),
        );
        let mut view = view_over(container.clone(), ApplyMode::Children);

        view.set_source("secret", Instant::now()).unwrap();
        assert_eq!(container.inner_markup(), "<p>secret</p><span class=\"cursor\"></span>");

        view.reset();

        assert_eq!(container.inner_markup(), "<span class=\"cursor\"></span>");
        assert!(container.child(0).unwrap().is_ignored());
    }

    #[test]
    fn test_strategy_selects_partition() {
        let config = ViewConfig::default().with_strategy(RenderStrategy::Async);
        let mut view = StreamView::new(NodeRef::element("div"), config).unwrap();
        view.set_source("x", Instant::now()).unwrap();

        assert_eq!(view.caches().stats(Partition::AsyncRender).entries, 1);
        assert_eq!(view.caches().stats(Partition::SyncRender).entries, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ViewConfig::default()
            .with_pacing(PacingConfig::default().with_target_fraction(2.0));
        assert!(StreamView::new(NodeRef::element("div"), config).is_err());
    }
}
