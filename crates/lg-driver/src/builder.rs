//! Fluent builder for constructing a [`Driver`].

use std::sync::Arc;

use lg_core::DriverConfig;
use lg_spec::SpecRegistry;
use lg_stats::{NoopCollector, StatsCollector};
use lg_transport::Transport;
use tokio::runtime::Handle;

use crate::cache::{self, PageCacheFactory};
use crate::context::{ContextParts, DriverContext};
use crate::{Driver, DriverError, DriverObserver, DriverResult, NoopObserver, OperationFactory};

/// Fluent builder for [`Driver`].
///
/// # Required inputs
///
/// - [`DriverConfig`]: seed, cadence, reset timeout, cache capacity
/// - [`SpecRegistry`]: every behavior spec and chooser the users will run
/// - `OperationFactory`: builds the step logic for each operation slot
/// - `Transport`: executes requests and calls back
///
/// # Optional inputs (have defaults)
///
/// | Method             | Default                                 |
/// |--------------------|-----------------------------------------|
/// | `.stats(c)`        | `NoopCollector`                         |
/// | `.observer(o)`     | `NoopObserver`                          |
/// | `.page_cache(f)`   | `BoundedPageCache` per user             |
/// | `.handle(h)`       | the runtime `build` is called from      |
///
/// # Example
///
/// ```rust,ignore
/// let driver = DriverBuilder::new(config, registry, factory, transport)
///     .stats(collector)
///     .build()?;
/// driver.add_users("shopper", 100)?;
/// driver.start(25);
/// ```
pub struct DriverBuilder {
    config:     DriverConfig,
    registry:   Arc<SpecRegistry>,
    factory:    Arc<dyn OperationFactory>,
    transport:  Arc<dyn Transport>,
    stats:      Option<Arc<dyn StatsCollector>>,
    observer:   Option<Arc<dyn DriverObserver>>,
    page_cache: Option<PageCacheFactory>,
    handle:     Option<Handle>,
}

impl DriverBuilder {
    /// Create a builder with all required inputs.
    pub fn new(
        config:    DriverConfig,
        registry:  Arc<SpecRegistry>,
        factory:   impl OperationFactory + 'static,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            registry,
            factory:    Arc::new(factory),
            transport,
            stats:      None,
            observer:   None,
            page_cache: None,
            handle:     None,
        }
    }

    /// Where finished operations are reported.
    pub fn stats(mut self, stats: Arc<dyn StatsCollector>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn DriverObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Replace the per-user page cache.
    pub fn page_cache(mut self, factory: PageCacheFactory) -> Self {
        self.page_cache = Some(factory);
        self
    }

    /// Runtime the driver spawns operation tasks on.
    pub fn handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Validate inputs and return an idle [`Driver`] with no users.
    pub fn build(self) -> DriverResult<Driver> {
        self.config.validate()?;
        self.registry.validate()?;
        let handle = match self.handle {
            Some(h) => h,
            None => Handle::try_current().map_err(|_| DriverError::NoRuntime)?,
        };

        let ctx = DriverContext::new(ContextParts {
            config:     self.config,
            registry:   self.registry,
            factory:    self.factory,
            transport:  self.transport,
            stats:      self.stats.unwrap_or_else(|| Arc::new(NoopCollector) as Arc<dyn StatsCollector>),
            observer:   self.observer.unwrap_or_else(|| Arc::new(NoopObserver) as Arc<dyn DriverObserver>),
            page_cache: self.page_cache.unwrap_or_else(cache::bounded_factory),
            handle,
        });
        Ok(Driver::from_context(Arc::new(ctx)))
    }
}
