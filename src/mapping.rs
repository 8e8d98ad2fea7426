//! Order-preserving map over a batch of items with bounded concurrency and a
//! per-item deadline.
//!
//! An item whose transform times out, returns an error or panics comes back
//! unchanged. Every other item comes back transformed, with its origin set to
//! the input it was derived from.

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Number of transforms allowed to run at the same time.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Deadline for a single item's transform.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Items that can remember what they were derived from.
pub trait Provenance: Sized {
    /// Return `self` with its origin replaced by `origin`.
    fn with_origin(self, origin: Self) -> Self;
}

type BlockingFn<T> = dyn Fn(&T) -> anyhow::Result<T> + Send + Sync;
type AsyncFn<T> = dyn Fn(T) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync;

/// A function from one item to a new item.
///
/// The variant is inspected once per batch: blocking transforms run in a
/// plain loop, async transforms run as gated tokio tasks.
pub enum Transform<T> {
    Blocking { name: String, func: Arc<BlockingFn<T>> },
    Async { name: String, func: Arc<AsyncFn<T>> },
}

impl<T> Transform<T> {
    pub fn blocking<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Transform::Blocking {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn from_async<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        T: 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let func =
            move |item: T| -> BoxFuture<'static, anyhow::Result<T>> { Box::pin(func(item)) };
        Transform::Async {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Name used in log messages.
    pub fn name(&self) -> &str {
        match self {
            Transform::Blocking { name, .. } | Transform::Async { name, .. } => name,
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Transform::Async { .. })
    }
}

impl<T> Clone for Transform<T> {
    fn clone(&self) -> Self {
        match self {
            Transform::Blocking { name, func } => Transform::Blocking {
                name: name.clone(),
                func: Arc::clone(func),
            },
            Transform::Async { name, func } => Transform::Async {
                name: name.clone(),
                func: Arc::clone(func),
            },
        }
    }
}

impl<T> fmt::Debug for Transform<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_async() { "Async" } else { "Blocking" };
        write!(f, "Transform::{}({})", kind, self.name())
    }
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("Concurrency must be between 1 and {}", Semaphore::MAX_PERMITS)]
    InvalidConcurrency,
    #[error("Timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(String),
    #[error("amap cannot block inside an async runtime, use amap_async instead")]
    NestedRuntime,
    #[error("Failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Concurrency limit and per-item deadline for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapOptions {
    pub concurrency: usize,
    pub timeout: Duration,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl MapOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the deadline from fractional seconds, rejecting zero, negative and
    /// non-finite values.
    pub fn with_timeout_secs(self, secs: f64) -> Result<Self, MapError> {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(MapError::InvalidTimeout(secs.to_string()));
        }
        let timeout = Duration::try_from_secs_f64(secs)
            .map_err(|_| MapError::InvalidTimeout(secs.to_string()))?;
        Ok(self.with_timeout(timeout))
    }

    pub fn validate(&self) -> Result<(), MapError> {
        if self.concurrency == 0 || self.concurrency > Semaphore::MAX_PERMITS {
            return Err(MapError::InvalidConcurrency);
        }
        if self.timeout.is_zero() {
            return Err(MapError::InvalidTimeout(format!("{:?}", self.timeout)));
        }
        Ok(())
    }
}

/// What happened to a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Transformed,
    TimedOut,
    Failed(String),
}

/// A mapped item together with how it was produced.
#[derive(Debug, Clone)]
pub struct Mapped<T> {
    pub item: T,
    pub outcome: Outcome,
}

impl<T> Mapped<T> {
    fn transformed(item: T) -> Self {
        Self {
            item,
            outcome: Outcome::Transformed,
        }
    }

    fn degraded(item: T, outcome: Outcome) -> Self {
        Self { item, outcome }
    }

    /// True when the item is the untouched input.
    pub fn is_degraded(&self) -> bool {
        self.outcome != Outcome::Transformed
    }
}

/// Map `items` with `transform`, blocking the caller until every item is done.
///
/// Must not be called from inside a tokio runtime; use [`amap_async`] there.
pub fn amap<T, I>(transform: &Transform<T>, items: I, options: MapOptions) -> Result<Vec<T>, MapError>
where
    T: Provenance + Clone + Send + fmt::Display + 'static,
    I: IntoIterator<Item = T>,
{
    Ok(into_items(amap_with_outcomes(transform, items, options)?))
}

/// Like [`amap`], but reports the outcome of every item.
pub fn amap_with_outcomes<T, I>(
    transform: &Transform<T>,
    items: I,
    options: MapOptions,
) -> Result<Vec<Mapped<T>>, MapError>
where
    T: Provenance + Clone + Send + fmt::Display + 'static,
    I: IntoIterator<Item = T>,
{
    options.validate()?;
    match transform {
        Transform::Blocking { name, func } => {
            Ok(map_blocking(name, func.as_ref(), items.into_iter().collect()))
        }
        Transform::Async { name, func } => {
            if tokio::runtime::Handle::try_current().is_ok() {
                return Err(MapError::NestedRuntime);
            }
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let items = items.into_iter().collect();
            Ok(runtime.block_on(map_concurrent(name, func, items, options)))
        }
    }
}

/// Map `items` with `transform` from inside an async context.
pub async fn amap_async<T, I>(
    transform: &Transform<T>,
    items: I,
    options: MapOptions,
) -> Result<Vec<T>, MapError>
where
    T: Provenance + Clone + Send + fmt::Display + 'static,
    I: IntoIterator<Item = T>,
{
    Ok(into_items(amap_async_with_outcomes(transform, items, options).await?))
}

/// Like [`amap_async`], but reports the outcome of every item.
pub async fn amap_async_with_outcomes<T, I>(
    transform: &Transform<T>,
    items: I,
    options: MapOptions,
) -> Result<Vec<Mapped<T>>, MapError>
where
    T: Provenance + Clone + Send + fmt::Display + 'static,
    I: IntoIterator<Item = T>,
{
    options.validate()?;
    let items = items.into_iter().collect();
    let mapped = match transform {
        Transform::Blocking { name, func } => map_blocking(name, func.as_ref(), items),
        Transform::Async { name, func } => map_concurrent(name, func, items, options).await,
    };
    Ok(mapped)
}

fn into_items<T>(mapped: Vec<Mapped<T>>) -> Vec<T> {
    mapped.into_iter().map(|m| m.item).collect()
}

fn map_blocking<T>(name: &str, func: &BlockingFn<T>, items: Vec<T>) -> Vec<Mapped<T>>
where
    T: Provenance + fmt::Display,
{
    let mapped: Vec<_> = items
        .into_iter()
        .map(|item| match panic::catch_unwind(AssertUnwindSafe(|| func(&item))) {
            Ok(Ok(new)) => Mapped::transformed(new.with_origin(item)),
            Ok(Err(e)) => {
                tracing::warn!(
                    "{}({:50}) failed: {}. The original item was returned instead.",
                    name,
                    item,
                    e
                );
                Mapped::degraded(item, Outcome::Failed(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(
                    "{}({:50}) panicked. The original item was returned instead.",
                    name,
                    item
                );
                Mapped::degraded(item, Outcome::Failed("transform panicked".to_string()))
            }
        })
        .collect();
    log_summary(name, &mapped);
    mapped
}

async fn map_concurrent<T>(
    name: &str,
    func: &Arc<AsyncFn<T>>,
    items: Vec<T>,
    options: MapOptions,
) -> Vec<Mapped<T>>
where
    T: Provenance + Clone + Send + fmt::Display + 'static,
{
    let gate = Arc::new(Semaphore::new(options.concurrency));

    // One task per item; the gate, not task creation, bounds the work.
    let handles: Vec<_> = items
        .iter()
        .cloned()
        .enumerate()
        .map(|(index, item)| {
            let gate = Arc::clone(&gate);
            let func = Arc::clone(func);
            let name = name.to_string();
            tokio::spawn(async move {
                run_one(&name, index, func, gate, item, options.timeout).await
            })
        })
        .collect();

    let mut mapped = Vec::with_capacity(handles.len());
    for (handle, original) in handles.into_iter().zip(items) {
        match handle.await {
            Ok(result) => mapped.push(result),
            Err(e) => {
                tracing::warn!(
                    "{}({:50}) task failed: {}. The original item was returned instead.",
                    name,
                    original,
                    e
                );
                mapped.push(Mapped::degraded(original, Outcome::Failed(e.to_string())));
            }
        }
    }
    log_summary(name, &mapped);
    mapped
}

async fn run_one<T>(
    name: &str,
    index: usize,
    func: Arc<AsyncFn<T>>,
    gate: Arc<Semaphore>,
    item: T,
    timeout: Duration,
) -> Mapped<T>
where
    T: Provenance + Clone + fmt::Display,
{
    // Released on drop, whichever way this function exits.
    let _permit = match gate.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => return Mapped::degraded(item, Outcome::Failed(e.to_string())),
    };

    tracing::debug!("{}: item #{} started: {:50}", name, index, item);
    match tokio::time::timeout(timeout, func(item.clone())).await {
        Ok(Ok(new)) => {
            tracing::debug!("{}: item #{} done", name, index);
            Mapped::transformed(new.with_origin(item))
        }
        Ok(Err(e)) => {
            tracing::warn!(
                "{}({:50}) failed: {}. The original item was returned instead.",
                name,
                item,
                e
            );
            Mapped::degraded(item, Outcome::Failed(e.to_string()))
        }
        Err(_) => {
            tracing::warn!(
                "{}({:50}) has timed out after {:?}. The original item was returned instead.",
                name,
                item,
                timeout
            );
            Mapped::degraded(item, Outcome::TimedOut)
        }
    }
}

fn log_summary<T>(name: &str, mapped: &[Mapped<T>]) {
    let degraded = mapped.iter().filter(|m| m.is_degraded()).count();
    tracing::info!(
        "{}: {} of {} items transformed, {} returned unchanged",
        name,
        mapped.len() - degraded,
        mapped.len(),
        degraded
    );
}
