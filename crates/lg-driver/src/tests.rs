//! Unit and scenario tests for lg-driver.
//!
//! Scenario tests run on a paused tokio clock.  [`ScriptedTransport`] answers
//! each request after a per-route latency, so virtual time advances only
//! while requests are in flight and every timing below is exact.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use lg_core::{BehaviorId, BehaviorRng, DriverConfig, OpIndex, UserId};
use lg_data::{Bindings, Capabilities, ChannelKey, Sequence, Slot, SubstringListener};
use lg_spec::{
    BehaviorSpec, BehaviorSpecConfig, ChooserInput, DataDrivenChooser, SpecRegistry, SpecResult,
    TransitionChoice, TransitionChooser,
};
use lg_stats::MemoryCollector;
use lg_transport::{Request, Response, ResponseCallback, Transport, TransportError};
use parking_lot::Mutex;
use tokio::time::sleep;

use crate::{
    BoundedPageCache, Driver, DriverBuilder, DriverError, DriverObserver, DriverResult, EmbeddedLink,
    Expect, OperationFactory, OperationFailed, OperationLogic, PageCache, StepContext, StepOutcome,
    bounded_factory, embedded_links, links::is_stylesheet,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn config() -> DriverConfig {
    DriverConfig { seed: 42, ..DriverConfig::default() }
}

/// op0 → op1 → op0 … with zero cycle time.
fn ping_pong(name: &str) -> BehaviorSpecConfig {
    BehaviorSpecConfig::new(
        name,
        vec![vec![vec![0.0, 1.0]], vec![vec![1.0, 0.0]]],
        vec![0.0, 0.0],
    )
}

/// One operation repeating with the given mean cycle time in seconds.
fn solo(name: &str, mean_cycle: f64) -> BehaviorSpecConfig {
    BehaviorSpecConfig::new(name, vec![vec![vec![1.0]]], vec![mean_cycle])
}

/// A solo behavior whose operation spawns up to `max` `"child"` behaviors.
fn spawner(max: usize) -> BehaviorSpecConfig {
    let mut config = solo("parent", 0.0);
    config.async_behaviors = vec![Some("child".into())];
    config.max_num_async_behaviors = max;
    config
}

fn registry(configs: Vec<BehaviorSpecConfig>) -> Arc<SpecRegistry> {
    Arc::new(specs(configs))
}

/// Unshared registry, for tests that add choosers.
fn specs(configs: Vec<BehaviorSpecConfig>) -> SpecRegistry {
    let mut registry = SpecRegistry::new();
    for config in configs {
        registry.register_config(config).unwrap();
    }
    registry
}

/// Wrap a plain constructor as an [`OperationFactory`].
fn factory(
    make: impl Fn(&BehaviorSpec, OpIndex) -> Box<dyn OperationLogic> + Send + Sync + 'static,
) -> impl OperationFactory {
    move |spec: &BehaviorSpec, op: OpIndex| -> DriverResult<Box<dyn OperationLogic>> {
        Ok(make(spec, op))
    }
}

/// Every operation GETs `/{spec}/{op name}` and completes.
fn pages() -> impl OperationFactory {
    pages_expecting(Expect::ok())
}

fn pages_expecting(expect: Expect) -> impl OperationFactory {
    factory(move |spec, op| {
        let uri = format!("/{}/{}", spec.name(), spec.operation_name(op));
        page(uri, expect.clone())
    })
}

// ── Scripted transport ────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
struct Route {
    status:   u16,
    body:     String,
    latency:  Duration,
    /// Transport failures to report before answering normally.
    failures: u32,
}

impl Route {
    fn ok(body: &str) -> Self {
        Self { status: 200, body: body.to_owned(), latency: ms(10), failures: 0 }
    }

    fn status(code: u16) -> Self {
        Self { status: code, ..Self::ok("") }
    }

    fn after(mut self, latency_ms: u64) -> Self {
        self.latency = ms(latency_ms);
        self
    }

    fn failing(mut self, times: u32) -> Self {
        self.failures = times;
        self
    }
}

#[derive(Default)]
struct ScriptedTransport {
    routes: Mutex<HashMap<String, Route>>,
    log:    Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn new() -> Self {
        Self::default()
    }

    fn route(self, uri: &str, route: Route) -> Self {
        self.routes.lock().insert(uri.to_owned(), route);
        self
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn count(&self, uri: &str) -> usize {
        self.log.lock().iter().filter(|u| *u == uri).count()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: Request, callback: Arc<dyn ResponseCallback>) {
        let uri = request.resolved_uri().unwrap_or_else(|_| request.uri.clone());
        let is_get = request.is_get();
        self.log.lock().push(uri.clone());

        let (route, fail) = {
            let mut routes = self.routes.lock();
            match routes.get_mut(&uri) {
                Some(route) => {
                    let fail = route.failures > 0;
                    route.failures = route.failures.saturating_sub(1);
                    (route.clone(), fail)
                }
                None => (Route::ok(&format!("body of {uri}")), false),
            }
        };

        tokio::spawn(async move {
            sleep(route.latency).await;
            if fail {
                callback.failed(TransportError::Other("connection refused".into()), is_get);
            } else {
                callback.completed(Response::new(route.status, route.body), is_get);
            }
        });
    }
}

// ── Recording observer ────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Event {
    UserStarted(UserId, BehaviorId),
    Scheduled(BehaviorId, OpIndex),
    Finished(BehaviorId, OpIndex, bool),
    Stopped(BehaviorId),
    ResetStarted(UserId),
    ResetComplete(UserId),
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    fn position(&self, event: Event) -> Option<usize> {
        self.events.lock().iter().position(|e| *e == event)
    }

    fn push(&self, event: Event) {
        self.events.lock().push(event);
    }
}

impl DriverObserver for Recorder {
    fn on_user_started(&self, user: UserId, root: BehaviorId) {
        self.push(Event::UserStarted(user, root));
    }

    fn on_operation_scheduled(&self, _user: UserId, behavior: BehaviorId, op: OpIndex, _delay: Duration) {
        self.push(Event::Scheduled(behavior, op));
    }

    fn on_operation_finished(&self, _user: UserId, behavior: BehaviorId, op: OpIndex, failed: bool) {
        self.push(Event::Finished(behavior, op, failed));
    }

    fn on_behavior_stopped(&self, _user: UserId, behavior: BehaviorId) {
        self.push(Event::Stopped(behavior));
    }

    fn on_reset_started(&self, user: UserId) {
        self.push(Event::ResetStarted(user));
    }

    fn on_reset_complete(&self, user: UserId) {
        self.push(Event::ResetComplete(user));
    }
}

// ── Operations ────────────────────────────────────────────────────────────────

/// GET one page, then complete.
struct Page {
    uri:    String,
    expect: Expect,
}

fn page(uri: impl Into<String>, expect: Expect) -> Box<dyn OperationLogic> {
    Box::new(Page { uri: uri.into(), expect })
}

impl OperationLogic for Page {
    fn execute(&mut self, step: u32, ctx: &mut StepContext<'_>) -> Result<StepOutcome, OperationFailed> {
        if step > 0 {
            return Ok(StepOutcome::Complete);
        }
        ctx.send(Request::get(self.uri.clone()), self.expect.clone());
        Ok(StepOutcome::Continue)
    }
}

/// GET several uris at once, then complete.  Counts executed steps.
struct FanOut {
    uris:   Vec<&'static str>,
    expect: Expect,
    steps:  Arc<AtomicU32>,
}

impl OperationLogic for FanOut {
    fn execute(&mut self, step: u32, ctx: &mut StepContext<'_>) -> Result<StepOutcome, OperationFailed> {
        self.steps.fetch_add(1, Ordering::SeqCst);
        if step > 0 {
            return Ok(StepOutcome::Complete);
        }
        for uri in &self.uris {
            ctx.send(Request::get(*uri), self.expect.clone());
        }
        Ok(StepOutcome::Continue)
    }
}

/// GETs once, then neither completes nor issues a request.
struct Broken;

impl OperationLogic for Broken {
    fn execute(&mut self, step: u32, ctx: &mut StepContext<'_>) -> Result<StepOutcome, OperationFailed> {
        if step == 0 {
            ctx.get("/broken");
        }
        Ok(StepOutcome::Continue)
    }
}

/// Runs normally but asks for no statistics.
struct Quiet;

impl OperationLogic for Quiet {
    fn execute(&mut self, step: u32, ctx: &mut StepContext<'_>) -> Result<StepOutcome, OperationFailed> {
        if step > 0 {
            return Ok(StepOutcome::Complete);
        }
        ctx.ignore_result();
        ctx.get("/quiet");
        Ok(StepOutcome::Continue)
    }
}

const ITEMS: ChannelKey<Sequence<String>> = ChannelKey::behavior("items");
const VARIANT: ChannelKey<Slot<usize>> = ChannelKey::behavior("next_variant");

/// Visits the next listed item, or the home page when none is queued.
struct Browse;

impl OperationLogic for Browse {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none().needs(ITEMS)
    }

    fn execute(&mut self, step: u32, ctx: &mut StepContext<'_>) -> Result<StepOutcome, OperationFailed> {
        if step > 0 {
            return Ok(StepOutcome::Complete);
        }
        let uri = match ctx.channel(&ITEMS)?.pop_front() {
            Some(id) => format!("/item/{id}"),
            None => "/home".to_owned(),
        };
        ctx.get(uri);
        Ok(StepOutcome::Continue)
    }
}

/// Fetches an item list and queues every `id=…;` it finds.
struct List {
    uri: &'static str,
}

impl OperationLogic for List {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none().contains(ITEMS)
    }

    fn execute(&mut self, step: u32, ctx: &mut StepContext<'_>) -> Result<StepOutcome, OperationFailed> {
        if step > 0 {
            return Ok(StepOutcome::Complete);
        }
        let expect = Expect::ok().listen(SubstringListener::new(ITEMS, "id=", ';'));
        ctx.send(Request::get(self.uri), expect);
        Ok(StepOutcome::Continue)
    }
}

/// Fetches a page and steers the next transition to variant 1.
struct Steer;

impl OperationLogic for Steer {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none().contains(VARIANT)
    }

    fn execute(&mut self, step: u32, ctx: &mut StepContext<'_>) -> Result<StepOutcome, OperationFailed> {
        if step == 0 {
            ctx.get("/steer");
            return Ok(StepOutcome::Continue);
        }
        ctx.output(&VARIANT)?.set(1);
        Ok(StepOutcome::Complete)
    }
}

/// Moves the oldest queued item from where it reads to where it writes.
struct Handoff;

impl OperationLogic for Handoff {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none().needs(ITEMS).contains(ITEMS)
    }

    fn execute(&mut self, step: u32, ctx: &mut StepContext<'_>) -> Result<StepOutcome, OperationFailed> {
        if step > 0 {
            return Ok(StepOutcome::Complete);
        }
        let Some(id) = ctx.channel(&ITEMS)?.pop_front() else {
            return Err(OperationFailed::new("nothing to hand off"));
        };
        ctx.output(&ITEMS)?.push(id);
        ctx.get("/handoff");
        Ok(StepOutcome::Continue)
    }
}

// ── Choosers ──────────────────────────────────────────────────────────────────

/// Stops every child, before the next operation or once it completes.
struct StopChildren {
    at_start: bool,
}

impl TransitionChooser for StopChildren {
    fn choose(&self, input: &mut ChooserInput<'_>) -> SpecResult<TransitionChoice> {
        let children = input.children.iter().copied();
        let choice = TransitionChoice::default();
        Ok(if self.at_start { choice.stop_at_start(children) } else { choice.stop_at_end(children) })
    }
}

/// Points the next operation's reads at the oldest child.
struct ReadFromChild;

impl TransitionChooser for ReadFromChild {
    fn choose(&self, input: &mut ChooserInput<'_>) -> SpecResult<TransitionChoice> {
        let choice = TransitionChoice::default();
        Ok(match input.children.first() {
            Some(&child) => choice.data_source(child),
            None => choice,
        })
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

struct Harness {
    driver:    Driver,
    transport: Arc<ScriptedTransport>,
    stats:     Arc<MemoryCollector>,
    events:    Arc<Recorder>,
}

fn harness(
    registry:  Arc<SpecRegistry>,
    factory:   impl OperationFactory + 'static,
    transport: ScriptedTransport,
) -> Harness {
    harness_with(config(), registry, factory, transport)
}

fn harness_with(
    config:    DriverConfig,
    registry:  Arc<SpecRegistry>,
    factory:   impl OperationFactory + 'static,
    transport: ScriptedTransport,
) -> Harness {
    let transport = Arc::new(transport);
    let stats = Arc::new(MemoryCollector::new());
    let events = Arc::new(Recorder::default());
    let driver = DriverBuilder::new(config, registry, factory, transport.clone())
        .stats(stats.clone())
        .observer(events.clone())
        .build()
        .unwrap();
    Harness { driver, transport, stats, events }
}

impl Harness {
    fn op_sequence(&self) -> Vec<u16> {
        self.stats.snapshot().iter().map(|row| row.op_index.0).collect()
    }

    fn resets_started(&self) -> usize {
        self.events.count(|e| matches!(e, Event::ResetStarted(_)))
    }
}

// ── Embedded links ────────────────────────────────────────────────────────────

#[cfg(test)]
mod links_tests {
    use super::*;

    fn link(uri: &str, recursive: bool) -> EmbeddedLink {
        EmbeddedLink { uri: uri.to_owned(), recursive }
    }

    #[test]
    fn html_sources_and_stylesheets_in_document_order() {
        let body = r#"<img src="/img/a.png"><script src='../../js/app.js'></script>
                      <link href="/css/site.css" rel="stylesheet">"#;
        assert_eq!(
            embedded_links("/home", body),
            vec![link("img/a.png", false), link("js/app.js", false), link("css/site.css", true)],
        );
    }

    #[test]
    fn link_tags_that_are_not_stylesheets_are_ignored() {
        let body = r#"<link href="/favicon.ico"><link href="/print.css?v=3">"#;
        assert_eq!(embedded_links("/home", body), vec![link("print.css?v=3", true)]);
    }

    #[test]
    fn placeholders_inline_data_and_fragments_are_skipped() {
        let body = r##"<img src="{{avatar}}"><img src="data:image/png;base64,AAAA">
                      <a src="#top"><img src=""><img src="/ok.png">"##;
        assert_eq!(embedded_links("/home", body), vec![link("ok.png", false)]);
    }

    #[test]
    fn duplicates_are_dropped() {
        let body = r#"<img src="/logo.png"><img src="logo.png"><img src="../logo.png">"#;
        assert_eq!(embedded_links("/home", body), vec![link("logo.png", false)]);
    }

    #[test]
    fn escaped_quotes_inside_scripts() {
        let body = r#"var html = "<img src=\"/img/e.png\">";"#;
        assert_eq!(embedded_links("/home", body), vec![link("img/e.png", false)]);
    }

    #[test]
    fn stylesheet_urls_are_not_recursive() {
        let body = r#"a { background: url(img/x.png) } b { src: url("../fonts/f.woff") }
                      c { background: url('/img/y.png') }"#;
        assert_eq!(
            embedded_links("css/site.css?v=2", body),
            vec![link("img/x.png", false), link("fonts/f.woff", false), link("img/y.png", false)],
        );
    }

    #[test]
    fn stylesheet_sources_ignore_html_attributes() {
        let body = r#"/* <img src="/not-a-link.png"> */ a { background: url(bg.png) }"#;
        assert_eq!(embedded_links("site.css", body), vec![link("bg.png", false)]);
    }

    #[test]
    fn stylesheet_detection_looks_at_the_path_only() {
        assert!(is_stylesheet("site.css"));
        assert!(is_stylesheet("css/site.css?v=1"));
        assert!(is_stylesheet("site.css#top"));
        assert!(!is_stylesheet("site.css.map"));
        assert!(!is_stylesheet("/home?style=x.css"));
    }
}

// ── Page cache ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod cache_tests {
    use super::*;

    #[test]
    fn add_reports_new_entries_once() {
        let cache = BoundedPageCache::new(4);
        assert!(cache.add("a.png"));
        assert!(!cache.add("a.png"));
        assert!(cache.contains("a.png"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let cache = BoundedPageCache::new(2);
        cache.add("a");
        cache.add("b");
        cache.add("c");
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.len(), 2);
        // An evicted entry counts as new again.
        assert!(cache.add("a"));
    }

    #[test]
    fn zero_capacity_caches_nothing() {
        let cache = BoundedPageCache::new(0);
        assert!(cache.add("a"));
        assert!(cache.add("a"));
        assert!(!cache.contains("a"));
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_forgets_everything() {
        let cache = BoundedPageCache::new(8);
        cache.add("a");
        cache.add("b");
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.add("a"));
    }

    #[test]
    fn factory_builds_independent_caches() {
        let make = bounded_factory();
        let first = make(4);
        let second = make(4);
        first.add("a");
        assert!(first.contains("a"));
        assert!(!second.contains("a"));
    }
}

// ── Operation contract ────────────────────────────────────────────────────────

#[cfg(test)]
mod operation_tests {
    use super::*;

    #[test]
    fn expect_defaults_to_status_200_without_parsing() {
        let expect = Expect::ok();
        assert!(expect.is_valid(200));
        assert!(!expect.is_valid(302));
        assert!(!expect.is_abort(401));
        assert!(!expect.needs_parsing());
    }

    #[test]
    fn expect_builders() {
        let expect = Expect::ok().status([200, 302]).abort_on([401, 403]);
        assert!(expect.is_valid(302));
        assert!(expect.is_abort(403));
        assert!(Expect::ok().must_contain("Welcome").needs_parsing());
        assert!(Expect::ok().recursive().needs_parsing());
        assert!(Expect::ok().listen(SubstringListener::new(ITEMS, "id=", ';')).needs_parsing());
    }

    #[test]
    fn step_context_collects_requests_and_ignore_flag() {
        let bindings = Bindings::empty();
        let mut rng = BehaviorRng::new(1, BehaviorId(1));
        let mut ctx = StepContext::new(UserId(3), BehaviorId(1), &bindings, None, &mut rng);
        assert_eq!(ctx.user(), UserId(3));
        assert!(ctx.response().is_none());
        ctx.get("/a");
        ctx.send(Request::delete("/b"), Expect::ok().status([204]));
        ctx.ignore_result();

        let (requests, ignore) = ctx.finish();
        assert!(ignore);
        assert_eq!(requests.len(), 2);
        assert!(requests[0].0.is_get());
        assert!(requests[1].1.is_valid(204));
    }

    #[test]
    fn undeclared_channel_is_an_operation_failure() {
        let bindings = Bindings::empty();
        let mut rng = BehaviorRng::new(1, BehaviorId(1));
        let ctx = StepContext::new(UserId(0), BehaviorId(1), &bindings, None, &mut rng);
        let err = ctx.channel(&ITEMS).unwrap_err();
        assert!(err.0.contains("items"), "{err}");
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod builder_tests {
    use super::*;

    #[test]
    fn build_outside_a_runtime_fails() {
        let result = DriverBuilder::new(
            config(),
            registry(vec![ping_pong("pp")]),
            pages(),
            Arc::new(ScriptedTransport::new()),
        )
        .build();
        assert!(matches!(result, Err(DriverError::NoRuntime)));
    }

    #[test]
    fn unknown_child_spec_is_rejected() {
        let result = DriverBuilder::new(
            config(),
            registry(vec![spawner(1)]),
            pages(),
            Arc::new(ScriptedTransport::new()),
        )
        .build();
        assert!(matches!(result, Err(DriverError::Spec(_))));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bad = DriverConfig { reset_timeout_secs: 0, ..config() };
        let result = DriverBuilder::new(
            bad,
            registry(vec![ping_pong("pp")]),
            pages(),
            Arc::new(ScriptedTransport::new()),
        )
        .build();
        assert!(matches!(result, Err(DriverError::Config(_))));
    }

    #[tokio::test]
    async fn adding_users_of_an_unknown_spec_fails() {
        let h = harness(registry(vec![ping_pong("pp")]), pages(), ScriptedTransport::new());
        assert!(matches!(h.driver.add_users("nope", 1), Err(DriverError::Spec(_))));
        assert_eq!(h.driver.user_count(), 0);
    }

    #[tokio::test]
    async fn user_ids_continue_across_batches() {
        let h = harness(registry(vec![ping_pong("pp")]), pages(), ScriptedTransport::new());
        assert_eq!(h.driver.add_users("pp", 2).unwrap(), vec![UserId(0), UserId(1)]);
        assert_eq!(h.driver.add_users("pp", 1).unwrap(), vec![UserId(2)]);
        assert_eq!(h.driver.users().len(), 3);
    }
}

// ── Operation execution ───────────────────────────────────────────────────────

#[cfg(test)]
mod runner_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ping_pong_alternates() {
        let h = harness(registry(vec![ping_pong("pp")]), pages(), ScriptedTransport::new());
        h.driver.add_users("pp", 1).unwrap();
        h.driver.start(1);
        sleep(ms(205)).await;

        let ops = h.op_sequence();
        assert!(ops.len() >= 10, "{ops:?}");
        for (i, op) in ops.iter().enumerate() {
            assert_eq!(*op as usize, i % 2, "{ops:?}");
        }
        assert_eq!(h.stats.failures(), 0);
        let log = h.transport.log();
        assert_eq!(&log[..4], &["/pp/op0", "/pp/op1", "/pp/op0", "/pp/op1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn first_operation_is_the_initial_state() {
        let mut cycle = BehaviorSpecConfig::new(
            "cycle",
            vec![
                vec![vec![0.0, 1.0, 0.0]],
                vec![vec![0.0, 0.0, 1.0]],
                vec![vec![1.0, 0.0, 0.0]],
            ],
            vec![0.0, 0.0, 0.0],
        );
        cycle.initial_state = 2;
        let h = harness(registry(vec![cycle]), pages(), ScriptedTransport::new());
        h.driver.add_users("cycle", 1).unwrap();
        h.driver.start(1);
        sleep(ms(45)).await;

        assert_eq!(&h.op_sequence()[..4], &[2, 0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_status_fails_the_operation_and_resets() {
        let transport = ScriptedTransport::new().route("/pp/op1", Route::status(500));
        let h = harness(registry(vec![ping_pong("pp")]), pages(), transport);
        h.driver.add_users("pp", 1).unwrap();
        h.driver.start(1);
        sleep(ms(25)).await;

        let rows = h.stats.snapshot();
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].failed);
        assert!(rows[1].failed);
        assert_eq!(rows[1].op_index, OpIndex(1));
        assert_eq!(rows[1].total_steps, 1);
        let cause = rows[1].failure.as_deref().unwrap();
        assert!(cause.contains("unexpected status 500"), "{cause}");

        assert_eq!(h.transport.count("/pp/op1"), 1);
        assert_eq!(h.resets_started(), 1);
        assert_eq!(h.driver.resets_completed(), 1);
        // The replacement is already running.
        let user = h.driver.user(UserId(0)).unwrap();
        assert!(user.is_active());
        assert!(!user.is_resetting());
    }

    #[tokio::test(start_paused = true)]
    async fn abort_status_resets_without_statistics() {
        let transport = ScriptedTransport::new().route("/pp/op0", Route::status(401));
        let h = harness(
            registry(vec![ping_pong("pp")]),
            pages_expecting(Expect::ok().abort_on([401])),
            transport,
        );
        h.driver.add_users("pp", 1).unwrap();
        h.driver.start(1);
        sleep(ms(15)).await;

        assert!(h.stats.is_empty());
        assert_eq!(h.events.count(|e| matches!(e, Event::Finished(..))), 0);
        assert_eq!(h.resets_started(), 1);
        assert_eq!(h.driver.resets_completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_waits_for_the_last_response() {
        let steps = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&steps);
        let transport = ScriptedTransport::new()
            .route("/a", Route::ok("a").after(5))
            .route("/b", Route::ok("b").after(10))
            .route("/c", Route::ok("c").after(30));
        let h = harness(
            registry(vec![solo("fan", 1_000.0)]),
            factory(move |_, _| {
                Box::new(FanOut {
                    uris:   vec!["/a", "/b", "/c"],
                    expect: Expect::ok(),
                    steps:  Arc::clone(&counter),
                })
            }),
            transport,
        );
        h.driver.add_users("fan", 1).unwrap();
        h.driver.start(1);
        sleep(ms(50)).await;

        let rows = h.stats.snapshot();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].failed);
        assert_eq!(rows[0].total_steps, 1);
        assert_eq!(rows[0].response_time(), ms(30));
        assert_eq!(steps.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_failure_finishes_once_without_the_next_step() {
        let steps = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&steps);
        let transport = ScriptedTransport::new()
            .route("/a", Route::ok("a").after(5).failing(1))
            .route("/b", Route::ok("b").after(10))
            .route("/c", Route::ok("c").after(30));
        let h = harness(
            registry(vec![solo("fan", 1_000.0)]),
            factory(move |_, _| {
                Box::new(FanOut {
                    uris:   vec!["/a", "/b", "/c"],
                    expect: Expect::ok(),
                    steps:  Arc::clone(&counter),
                })
            }),
            transport,
        );
        h.driver.add_users("fan", 1).unwrap();
        h.driver.start(1);
        sleep(ms(50)).await;

        // Failed at t=5; the replacement started then and finished at t=35.
        let rows = h.stats.snapshot();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].failed);
        assert_eq!(rows[0].response_time(), ms(5));
        assert!(rows[0].failure.as_deref().unwrap().contains("connection refused"));
        assert!(!rows[1].failed);
        assert_eq!(rows[1].response_time(), ms(30));
        // Step 0 of the failed instance, steps 0 and 1 of the replacement.
        assert_eq!(steps.load(Ordering::SeqCst), 3);
        assert_eq!(h.driver.resets_completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_status_before_the_last_fan_out_response_is_ignored() {
        let steps = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&steps);
        let transport = ScriptedTransport::new()
            .route("/a", Route::status(401).after(5))
            .route("/b", Route::ok("b").after(10));
        let h = harness(
            registry(vec![solo("fan", 1_000.0)]),
            factory(move |_, _| {
                Box::new(FanOut {
                    uris:   vec!["/a", "/b"],
                    expect: Expect::ok().abort_on([401]),
                    steps:  Arc::clone(&counter),
                })
            }),
            transport,
        );
        h.driver.add_users("fan", 1).unwrap();
        h.driver.start(1);
        sleep(ms(20)).await;

        let rows = h.stats.snapshot();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].failed);
        assert_eq!(rows[0].response_time(), ms(10));
        assert_eq!(steps.load(Ordering::SeqCst), 2);
        assert_eq!(h.resets_started(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_required_text_fails() {
        let transport = ScriptedTransport::new().route("/check/op0", Route::ok("Hello"));
        let h = harness(
            registry(vec![solo("check", 1_000.0)]),
            pages_expecting(Expect::ok().must_contain("Welcome")),
            transport,
        );
        h.driver.add_users("check", 1).unwrap();
        h.driver.start(1);
        sleep(ms(15)).await;

        let rows = h.stats.snapshot();
        assert!(rows[0].failed);
        let cause = rows[0].failure.as_deref().unwrap();
        assert!(cause.contains("does not contain \"Welcome\""), "{cause}");
    }

    #[tokio::test(start_paused = true)]
    async fn parsed_response_with_empty_body_fails() {
        let transport = ScriptedTransport::new().route("/check/op0", Route::ok(""));
        let h = harness(
            registry(vec![solo("check", 1_000.0)]),
            pages_expecting(Expect::ok().must_contain("Welcome")),
            transport,
        );
        h.driver.add_users("check", 1).unwrap();
        h.driver.start(1);
        sleep(ms(15)).await;

        let cause = h.stats.snapshot()[0].failure.clone().unwrap();
        assert!(cause.contains("empty response body"), "{cause}");
    }

    #[tokio::test(start_paused = true)]
    async fn step_without_request_is_a_protocol_violation() {
        let h = harness(
            registry(vec![solo("broken", 0.0)]),
            factory(|_, _| Box::new(Broken)),
            ScriptedTransport::new(),
        );
        h.driver.add_users("broken", 1).unwrap();
        h.driver.start(1);
        sleep(ms(15)).await;

        let rows = h.stats.snapshot();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].failed);
        assert_eq!(rows[0].total_steps, 1);
        let cause = rows[0].failure.as_deref().unwrap();
        assert!(cause.starts_with("protocol violation"), "{cause}");
    }

    #[tokio::test(start_paused = true)]
    async fn ignored_results_skip_statistics_but_keep_running() {
        let h = harness(
            registry(vec![solo("quiet", 0.0)]),
            factory(|_, _| Box::new(Quiet)),
            ScriptedTransport::new(),
        );
        h.driver.add_users("quiet", 1).unwrap();
        h.driver.start(1);
        sleep(ms(45)).await;

        assert!(h.stats.is_empty());
        assert!(h.transport.count("/quiet") >= 4);
        assert!(h.events.count(|e| matches!(e, Event::Finished(_, _, false))) >= 4);
        assert_eq!(h.resets_started(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recursive_fetch_loads_embedded_resources_once() {
        let home = r#"<img src="/img/a.png"><script src=\"js/app.js\"></script>
                      <link href="/css/site.css" rel="stylesheet">"#;
        let transport = ScriptedTransport::new()
            .route("/home", Route::ok(home))
            .route("css/site.css", Route::ok("body { background: url(../img/bg.png); }"));
        let h = harness(
            registry(vec![solo("site", 0.0)]),
            factory(|_, _| page("/home", Expect::ok().recursive())),
            transport,
        );
        h.driver.add_users("site", 1).unwrap();
        h.driver.start(1);
        sleep(ms(75)).await;

        let log = h.transport.log();
        assert_eq!(
            &log[..6],
            &["/home", "img/a.png", "js/app.js", "css/site.css", "img/bg.png", "/home"],
        );
        // Everything embedded is cached after the first visit.
        assert!(log[5..].iter().all(|uri| uri == "/home"), "{log:?}");

        let rows = h.stats.snapshot();
        assert_eq!(rows[0].total_steps, 1);
        assert_eq!(rows[0].response_time(), ms(50));
        assert_eq!(rows[1].response_time(), ms(10));
    }

    #[tokio::test(start_paused = true)]
    async fn listener_output_feeds_a_later_operation() {
        let transport = ScriptedTransport::new().route("/list", Route::ok("id=7;id=9;"));
        let h = harness(
            registry(vec![ping_pong("shop")]),
            factory(|_, op| match op.0 {
                0 => Box::new(Browse),
                _ => Box::new(List { uri: "/list" }),
            }),
            transport,
        );
        h.driver.add_users("shop", 1).unwrap();
        h.driver.start(1);
        sleep(ms(45)).await;

        let log = h.transport.log();
        assert_eq!(&log[..5], &["/home", "/list", "/item/7", "/list", "/item/9"]);
        assert_eq!(h.stats.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn data_driven_chooser_steers_the_transition() {
        let mut steer = BehaviorSpecConfig::new(
            "steer",
            vec![vec![vec![1.0, 0.0], vec![0.0, 1.0]], vec![vec![1.0, 0.0]]],
            vec![0.0, 0.0],
        );
        steer.transition_choosers = vec!["steer".into(), "default".into()];
        let mut registry = specs(vec![steer]);
        registry.register_chooser("steer", DataDrivenChooser::new(VARIANT));

        let h = harness(
            Arc::new(registry),
            factory(|spec, op| match op.0 {
                0 => Box::new(Steer),
                _ => page(format!("/{}/{}", spec.name(), spec.operation_name(op)), Expect::ok()),
            }),
            ScriptedTransport::new(),
        );
        h.driver.add_users("steer", 1).unwrap();
        h.driver.start(1);
        sleep(ms(45)).await;

        // Variant 0 would repeat op0 forever.
        assert_eq!(&h.op_sequence()[..4], &[0, 1, 0, 1]);
    }
}

// ── Cadence ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod cadence_tests {
    use super::*;

    async fn run(config: DriverConfig) -> Vec<lg_stats::OperationStats> {
        let transport = ScriptedTransport::new().route("/tick/op0", Route::ok("").after(20));
        let h = harness_with(config, registry(vec![solo("tick", 0.05)]), pages(), transport);
        h.driver.add_users("tick", 1).unwrap();
        h.driver.start(1);
        sleep(ms(800)).await;
        let rows = h.stats.snapshot();
        assert!(rows.len() >= 4, "{}", rows.len());
        rows
    }

    #[tokio::test(start_paused = true)]
    async fn think_time_counts_from_completion() {
        let rows = run(DriverConfig { use_think_time: true, ..config() }).await;
        for pair in rows.windows(2) {
            assert_eq!(pair[1].start_offset, pair[0].end_offset + pair[0].cycle_time);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_time_counts_from_the_previous_start() {
        let rows = run(config()).await;
        for pair in rows.windows(2) {
            let due = pair[0].start_offset + pair[0].cycle_time;
            assert_eq!(pair[1].start_offset, due.max(pair[0].end_offset));
        }
    }
}

// ── Behavior tree ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod behavior_tests {
    use super::*;

    fn family(max: usize) -> Harness {
        let h = harness(
            registry(vec![spawner(max), solo("child", 0.0)]),
            pages(),
            ScriptedTransport::new(),
        );
        h.driver.add_users("parent", 1).unwrap();
        h.driver.start(1);
        h
    }

    #[tokio::test(start_paused = true)]
    async fn children_are_capped() {
        let h = family(2);
        sleep(ms(100)).await;

        let user = h.driver.user(UserId(0)).unwrap();
        let root = user.root_behavior().unwrap();
        assert_eq!(user.children(root).unwrap().len(), 2);
        assert_eq!(user.behavior_count(), 3);
        assert!(h.transport.count("/child/op0") > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cascades_children_before_the_root() {
        let h = family(2);
        sleep(ms(35)).await;

        let user = h.driver.user(UserId(0)).unwrap();
        let root = user.root_behavior().unwrap();
        let children = user.children(root).unwrap();
        assert_eq!(children.len(), 2);

        user.stop();
        sleep(ms(20)).await;

        let stopped: Vec<BehaviorId> = h
            .events
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Stopped(b) => Some(b),
                _ => None,
            })
            .collect();
        assert_eq!(stopped.len(), 3);
        assert_eq!(stopped[2], root);
        assert!(children.iter().all(|c| stopped[..2].contains(c)));
        assert_eq!(user.behavior_count(), 0);
        assert!(!user.is_subscribed());
        assert_eq!(h.resets_started(), 0);
    }

    /// `spawner(1)` with a 25 ms parent page and `chooser` on its operation.
    fn steered_family(chooser: StopChildren) -> Harness {
        let mut parent = spawner(1);
        parent.transition_choosers = vec!["stop-children".into()];
        let mut registry = specs(vec![parent, solo("child", 0.0)]);
        registry.register_chooser("stop-children", chooser);
        let transport = ScriptedTransport::new().route("/parent/op0", Route::ok("").after(25));
        let h = harness(Arc::new(registry), pages(), transport);
        h.driver.add_users("parent", 1).unwrap();
        h.driver.start(1);
        h
    }

    fn stopped(h: &Harness) -> Vec<BehaviorId> {
        h.events
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Stopped(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn stop_at_start_stops_a_child_before_it_runs() {
        let h = steered_family(StopChildren { at_start: true });
        sleep(ms(60)).await;

        // Each child is stopped as it is activated, at t=25 and t=50.
        let user = h.driver.user(UserId(0)).unwrap();
        let root = user.root_behavior().unwrap();
        assert_eq!(stopped(&h).len(), 2);
        assert!(!stopped(&h).contains(&root));
        assert!(user.children(root).unwrap().is_empty());
        assert_eq!(h.transport.count("/child/op0"), 0);
        assert_eq!(h.transport.count("/parent/op0"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_at_end_waits_for_the_next_completion() {
        let h = steered_family(StopChildren { at_start: false });
        sleep(ms(48)).await;

        // The child started at t=25 and keeps running until the parent's
        // next operation completes at t=50.
        let user = h.driver.user(UserId(0)).unwrap();
        let root = user.root_behavior().unwrap();
        let children = user.children(root).unwrap();
        assert_eq!(children.len(), 1);
        assert!(stopped(&h).is_empty());
        assert_eq!(h.transport.count("/child/op0"), 3);

        // Its request from t=45 lands at t=55; nothing new goes out.
        sleep(ms(12)).await;
        assert_eq!(stopped(&h), children);
        assert!(user.children(root).unwrap().is_empty());
        assert_eq!(h.transport.count("/child/op0"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn data_source_reads_from_a_child_scope() {
        let mut hub = BehaviorSpecConfig::new(
            "hub",
            vec![
                vec![vec![0.0, 1.0, 0.0]],
                vec![vec![0.0, 0.0, 1.0]],
                vec![vec![1.0, 0.0, 0.0]],
            ],
            vec![0.0, 0.0, 0.0],
        );
        hub.async_behaviors = vec![Some("child".into()), None, None];
        hub.max_num_async_behaviors = 1;
        hub.transition_choosers = vec!["default".into(), "read-child".into(), "default".into()];
        let mut registry = specs(vec![hub, solo("child", 1_000.0)]);
        registry.register_chooser("read-child", ReadFromChild);

        let transport = ScriptedTransport::new()
            .route("/more", Route::ok("id=5;").after(5))
            .route("/hub/wait", Route::ok("").after(20));
        let h = harness(
            Arc::new(registry),
            factory(|spec, op| match (spec.name(), op.0) {
                ("hub", 0) => Box::new(List { uri: "/list" }),
                ("hub", 1) => page("/hub/wait", Expect::ok()),
                ("hub", _) => Box::new(Browse),
                _ => Box::new(List { uri: "/more" }),
            }),
            transport,
        );
        h.driver.add_users("hub", 1).unwrap();
        h.driver.start(1);
        sleep(ms(45)).await;

        // The hub's own list is empty; the child found item 5 at t=15.
        let log = h.transport.log();
        assert!(log.contains(&"/item/5".to_owned()), "{log:?}");
        assert!(!log.contains(&"/home".to_owned()), "{log:?}");
        assert_eq!(h.stats.failures(), 0);

        let user = h.driver.user(UserId(0)).unwrap();
        let child = user.children(user.root_behavior().unwrap()).unwrap()[0];
        assert!(user.data().behavior_channel(child, &ITEMS).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn spawning_operation_hands_its_output_to_the_new_child() {
        let mut hub = ping_pong("hub");
        hub.async_behaviors = vec![None, Some("child".into())];
        hub.max_num_async_behaviors = 1;
        let transport = ScriptedTransport::new().route("/list", Route::ok("id=7;id=9;"));
        let h = harness(
            registry(vec![hub, solo("child", 1_000.0)]),
            factory(|spec, op| match (spec.name(), op.0) {
                ("hub", 0) => Box::new(List { uri: "/list" }),
                ("hub", _) => Box::new(Handoff),
                _ => Box::new(Browse),
            }),
            transport,
        );
        h.driver.add_users("hub", 1).unwrap();
        h.driver.start(1);
        sleep(ms(25)).await;

        // The handoff at t=10 read "7" from the hub and wrote it into the
        // pending child, which visited it when activated at t=20.
        let log = h.transport.log();
        assert!(log.contains(&"/item/7".to_owned()), "{log:?}");
        assert_eq!(h.stats.failures(), 0);

        let user = h.driver.user(UserId(0)).unwrap();
        let root = user.root_behavior().unwrap();
        let child = user.children(root).unwrap()[0];
        assert_eq!(user.data().behavior_channel(root, &ITEMS).unwrap().snapshot(), vec!["9".to_owned()]);
        assert!(user.data().behavior_channel(child, &ITEMS).unwrap().is_empty());
    }

    /// Three children with one request each in flight when the user stops;
    /// child `n` answers `latencies[n]` ms after it started.
    async fn stop_order(latencies: [u64; 3]) -> (Vec<BehaviorId>, Vec<BehaviorId>, BehaviorId) {
        let mut transport = ScriptedTransport::new();
        for (n, latency) in latencies.iter().enumerate() {
            transport = transport.route(&format!("/slow/{n}"), Route::ok("").after(*latency));
        }
        let next = Arc::new(AtomicU32::new(0));
        let h = harness(
            registry(vec![spawner(3), solo("child", 0.0)]),
            factory(move |spec, op| match spec.name() {
                "child" => page(format!("/slow/{}", next.fetch_add(1, Ordering::SeqCst)), Expect::ok()),
                _ => page(format!("/{}/{}", spec.name(), spec.operation_name(op)), Expect::ok()),
            }),
            transport,
        );
        h.driver.add_users("parent", 1).unwrap();
        h.driver.start(1);
        sleep(ms(35)).await;

        let user = h.driver.user(UserId(0)).unwrap();
        let root = user.root_behavior().unwrap();
        let children = user.children(root).unwrap();
        assert_eq!(children.len(), 3);

        user.stop();
        sleep(ms(200)).await;
        // Every caller keeps one child answering past t=235.
        assert!(user.root_behavior().is_some());
        assert!(user.behavior_count() >= 2);
        sleep(ms(200)).await;
        assert_eq!(user.behavior_count(), 0);
        assert_eq!(h.resets_started(), 0);
        (children, stopped(&h), root)
    }

    #[tokio::test(start_paused = true)]
    async fn children_stopping_out_of_order_release_the_root_last() {
        let (c, stopped, root) = stop_order([300, 100, 200]).await;
        assert_eq!(stopped, vec![c[1], c[2], c[0], root]);
    }

    #[tokio::test(start_paused = true)]
    async fn oldest_child_stopping_first_still_waits_for_the_rest() {
        let (c, stopped, root) = stop_order([100, 300, 200]).await;
        assert_eq!(stopped, vec![c[0], c[2], c[1], root]);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_state_stops_children_and_ends_the_root() {
        let mut spec = ping_pong("rs");
        spec.async_behaviors = vec![Some("child".into()), None];
        spec.max_num_async_behaviors = 1;
        spec.is_reset_state = vec![false, true];
        let h = harness(registry(vec![spec, solo("child", 0.0)]), pages(), ScriptedTransport::new());
        h.driver.add_users("rs", 1).unwrap();
        h.driver.start(1);
        sleep(ms(25)).await;

        let events = h.events.events();
        let root = match events[0] {
            Event::UserStarted(_, root) => root,
            other => panic!("unexpected first event {other:?}"),
        };
        let child = events
            .iter()
            .find_map(|e| match e {
                Event::Scheduled(b, _) if *b != root => Some(*b),
                _ => None,
            })
            .unwrap();

        let reset_op = h.events.position(Event::Scheduled(root, OpIndex(1))).unwrap();
        assert!(!events[reset_op..].iter().any(|e| matches!(e, Event::Scheduled(b, _) if *b == child)));

        let finished = h.events.position(Event::Finished(root, OpIndex(1), false)).unwrap();
        assert!(!events[finished..].iter().any(|e| matches!(e, Event::Scheduled(b, _) if *b == root)));
        assert!(events[finished..].contains(&Event::ResetStarted(UserId(0))));

        let child_stopped = h.events.position(Event::Stopped(child)).unwrap();
        let root_stopped = h.events.position(Event::Stopped(root)).unwrap();
        assert!(child_stopped < root_stopped);
        assert_eq!(h.driver.resets_completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_during_a_delay_acknowledges_once() {
        let h = harness(registry(vec![solo("slow", 1_000.0)]), pages(), ScriptedTransport::new());
        h.driver.add_users("slow", 1).unwrap();
        h.driver.start(1);
        sleep(ms(20)).await;
        assert_eq!(h.stats.len(), 1);

        let user = h.driver.user(UserId(0)).unwrap();
        user.stop();
        sleep(ms(1)).await;
        assert_eq!(user.behavior_count(), 0);

        sleep(ms(100)).await;
        assert_eq!(h.events.count(|e| matches!(e, Event::Stopped(_))), 1);
        assert_eq!(h.stats.len(), 1);
        assert_eq!(h.transport.log().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_factory_leaves_the_user_idle() {
        let h = harness(
            registry(vec![ping_pong("pp")]),
            |spec: &BehaviorSpec, op: OpIndex| -> DriverResult<Box<dyn OperationLogic>> {
                Err(DriverError::Operation {
                    spec:  spec.name().to_owned(),
                    op:    spec.operation_name(op).to_owned(),
                    cause: "no such page".into(),
                })
            },
            ScriptedTransport::new(),
        );
        h.driver.add_users("pp", 1).unwrap();
        h.driver.start(1);
        sleep(ms(20)).await;

        let user = h.driver.user(UserId(0)).unwrap();
        assert!(user.root_behavior().is_none());
        assert!(!user.is_active());
        assert!(h.transport.log().is_empty());
        assert_eq!(user.data().scope_count(), 0);
    }
}

// ── User lifecycle and population ─────────────────────────────────────────────

#[cfg(test)]
mod driver_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn only_users_within_the_active_count_run() {
        let h = harness(registry(vec![ping_pong("pp")]), pages(), ScriptedTransport::new());
        h.driver.add_users("pp", 3).unwrap();
        h.driver.start(2);
        sleep(ms(15)).await;

        assert!(h.driver.user(UserId(0)).unwrap().is_active());
        assert!(h.driver.user(UserId(1)).unwrap().is_active());
        let idle = h.driver.user(UserId(2)).unwrap();
        assert!(!idle.is_active());
        assert!(idle.is_subscribed());
        assert_eq!(h.transport.log().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn lowering_the_load_resets_and_raising_reactivates() {
        let h = harness(registry(vec![ping_pong("pp")]), pages(), ScriptedTransport::new());
        h.driver.add_users("pp", 3).unwrap();
        h.driver.start(3);
        sleep(ms(15)).await;

        h.driver.set_active_users(1);
        assert_eq!(h.driver.active_users(), 1);
        sleep(ms(30)).await;

        assert_eq!(h.driver.resets_completed(), 2);
        assert!(h.driver.user(UserId(0)).unwrap().is_active());
        for id in [UserId(1), UserId(2)] {
            let user = h.driver.user(id).unwrap();
            assert!(!user.is_active());
            assert!(!user.is_resetting());
            assert!(user.is_subscribed());
            assert!(user.root_behavior().is_none());
        }

        h.driver.set_active_users(3);
        sleep(ms(1)).await;
        assert!(h.driver.users().iter().all(|u| u.is_active()));
    }

    #[tokio::test(start_paused = true)]
    async fn users_added_after_start_subscribe_immediately() {
        let h = harness(registry(vec![ping_pong("pp")]), pages(), ScriptedTransport::new());
        h.driver.add_users("pp", 1).unwrap();
        h.driver.start(2);
        h.driver.add_users("pp", 1).unwrap();
        sleep(ms(5)).await;

        assert!(h.driver.users().iter().all(|u| u.is_active()));
        assert_eq!(h.events.count(|e| matches!(e, Event::UserStarted(..))), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn complete_stops_everyone_without_resets() {
        let h = harness(registry(vec![ping_pong("pp")]), pages(), ScriptedTransport::new());
        h.driver.add_users("pp", 2).unwrap();
        h.driver.start(2);
        sleep(ms(15)).await;

        h.driver.complete();
        assert!(h.driver.wait_idle(Duration::from_secs(1)).await);
        assert_eq!(h.driver.live_behaviors(), 0);
        assert_eq!(h.driver.resets_completed(), 0);
        assert_eq!(h.resets_started(), 0);
        assert!(h.driver.users().iter().all(|u| !u.is_subscribed() && !u.is_active()));

        // Nothing more is sent once idle.
        let sent = h.transport.log().len();
        sleep(ms(100)).await;
        assert_eq!(h.transport.log().len(), sent);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_quiesces_the_population() {
        let h = harness(registry(vec![ping_pong("pp")]), pages(), ScriptedTransport::new());
        h.driver.add_users("pp", 1).unwrap();
        h.driver.start(1);
        sleep(ms(5)).await;

        h.driver.stop_all();
        assert!(h.driver.wait_idle(Duration::from_secs(1)).await);
        sleep(ms(100)).await;

        assert_eq!(h.transport.log(), vec!["/pp/op0".to_owned()]);
        assert_eq!(h.events.count(|e| matches!(e, Event::UserStarted(..))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_reset_is_forced_after_the_timeout() {
        let transport = ScriptedTransport::new().route("/slow/op0", Route::ok("").after(5_000));
        let h = harness_with(
            DriverConfig { reset_timeout_secs: 1, ..config() },
            registry(vec![solo("slow", 0.0)]),
            pages(),
            transport,
        );
        h.driver.add_users("slow", 1).unwrap();
        h.driver.start(1);
        sleep(ms(100)).await;

        let old = h.driver.user(UserId(0)).unwrap();
        h.driver.set_active_users(0);
        sleep(ms(500)).await;
        // The request from t=0 is still out, so the tree cannot stop.
        assert!(old.is_resetting());
        assert_eq!(old.behavior_count(), 1);
        assert_eq!(h.driver.resets_completed(), 0);

        sleep(ms(600)).await;
        assert!(!old.is_resetting());
        assert_eq!(old.behavior_count(), 0);
        assert_eq!(h.driver.resets_completed(), 1);
        assert!(h.events.position(Event::ResetComplete(UserId(0))).is_some());

        let replacement = h.driver.user(UserId(0)).unwrap();
        assert!(!Arc::ptr_eq(&old, &replacement));
        assert!(replacement.is_subscribed());
        assert!(!replacement.is_active());

        // The late response is swallowed.
        sleep(ms(5_000)).await;
        assert!(h.stats.is_empty());
        assert_eq!(h.transport.log().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn replacement_starts_with_fresh_data() {
        let transport = ScriptedTransport::new()
            .route("/list", Route::ok("id=7;"))
            .route("/item/7", Route::status(500));
        let h = harness(
            registry(vec![ping_pong("shop")]),
            factory(|_, op| match op.0 {
                0 => Box::new(Browse),
                _ => Box::new(List { uri: "/list" }),
            }),
            transport,
        );
        h.driver.add_users("shop", 1).unwrap();
        h.driver.start(1);
        sleep(ms(35)).await;

        // /item/7 failed at t=30; the replacement starts from an empty queue.
        let log = h.transport.log();
        assert_eq!(&log[..4], &["/home", "/list", "/item/7", "/home"]);
        let user = h.driver.user(UserId(0)).unwrap();
        assert_eq!(user.data().scope_count(), 1);
    }
}
