//! Lazy, single-flight converter instantiation.
//!
//! A converter is built the first time its pair is requested and then reused
//! for every later request. Construction may be slow (native libraries, font
//! tables), so the cache guarantees:
//!
//! * concurrent first requests for one pair run the factory **once**; every
//!   waiter receives the same `Arc<dyn Converter>` or the same failure,
//! * a construction for one pair never blocks lookups or constructions for
//!   other pairs,
//! * a caller that gives up while waiting does not abort the construction;
//!   it finishes on its own task and the next caller picks up the result.
//!
//! What happens after a failed construction is governed by [`FailurePolicy`].

use crate::config::FailurePolicy;
use crate::converter::Converter;
use crate::error::ConstructionError;
use crate::format::FormatPair;
use crate::observer::SharedObserver;
use crate::registry::RegisteredConverter;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

type Built = Result<Arc<dyn Converter>, ConstructionError>;
type Slot = Arc<OnceCell<Built>>;

/// Per-pair converter instances, built on first use.
pub struct ConverterCache {
    slots: Mutex<HashMap<FormatPair, Slot>>,
    policy: FailurePolicy,
    observer: Option<SharedObserver>,
    attempts: Arc<AtomicU64>,
}

impl ConverterCache {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            policy,
            observer: None,
            attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_observer(mut self, observer: Option<SharedObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Return the cached converter for `entry`'s pair, building it if needed.
    ///
    /// # Errors
    /// - [`ConstructionError::Failed`] if the factory returned an error or panicked
    /// - [`ConstructionError::ContractViolation`] if the built converter does
    ///   not handle the pair it was registered under
    /// - [`ConstructionError::Poisoned`] under [`FailurePolicy::Sticky`] when an
    ///   earlier construction already failed
    pub async fn get_or_create(
        &self,
        entry: &RegisteredConverter,
    ) -> Result<Arc<dyn Converter>, ConstructionError> {
        let pair = entry.pair();
        loop {
            let slot = self.slot(pair);

            match slot.get() {
                Some(Ok(converter)) => return Ok(Arc::clone(converter)),
                Some(Err(e)) if self.policy == FailurePolicy::Sticky => {
                    debug!("{} is disabled by an earlier failure", pair);
                    let poisoned = e.clone().into_poisoned();
                    if let Some(obs) = &self.observer {
                        obs.on_construction_failed(&poisoned);
                    }
                    return Err(poisoned);
                }
                // Stale failed slot under Retry.
                Some(Err(_)) => {
                    self.evict(pair, &slot);
                    continue;
                }
                None => {}
            }

            let built = self.initialise(&slot, entry).await;
            if built.is_err() && self.policy == FailurePolicy::Retry {
                self.evict(pair, &slot);
            }
            return built;
        }
    }

    /// Drop the cached instance or failure for `pair`. Returns `true` if
    /// anything was removed.
    pub fn reset(&self, pair: &FormatPair) -> bool {
        let removed = self.lock().remove(pair).is_some();
        if removed {
            info!("Reset cached converter for {}", pair);
        }
        removed
    }

    pub fn reset_all(&self) {
        self.lock().clear();
    }

    /// `true` if a successfully built converter is cached for `pair`.
    pub fn is_cached(&self, pair: &FormatPair) -> bool {
        self.lock()
            .get(pair)
            .is_some_and(|slot| matches!(slot.get(), Some(Ok(_))))
    }

    /// Pairs with a successfully built converter, sorted.
    pub fn cached_pairs(&self) -> Vec<FormatPair> {
        let mut pairs: Vec<FormatPair> = self
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot.get(), Some(Ok(_))))
            .map(|(pair, _)| pair.clone())
            .collect();
        pairs.sort();
        pairs
    }

    /// Number of times any factory has been invoked.
    pub fn construction_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<FormatPair, Slot>> {
        // The map is only mutated by single inserts and removes, so a
        // poisoned guard still holds a consistent map.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot(&self, pair: &FormatPair) -> Slot {
        Arc::clone(
            self.lock()
                .entry(pair.clone())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    /// Remove `slot` only if it is still the one registered for `pair`.
    fn evict(&self, pair: &FormatPair, slot: &Slot) {
        let mut slots = self.lock();
        if slots.get(pair).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(pair);
        }
    }

    /// Fill `slot` on a detached task so a cancelled caller cannot abandon a
    /// half-finished construction.
    async fn initialise(&self, slot: &Slot, entry: &RegisteredConverter) -> Built {
        let slot = Arc::clone(slot);
        let entry = entry.clone();
        let observer = self.observer.clone();
        let attempts = Arc::clone(&self.attempts);
        let pair = entry.pair().clone();
        let name = entry.name().to_string();

        let task = tokio::spawn(async move {
            slot.get_or_init(|| construct(entry, observer, attempts))
                .await
                .clone()
        });

        match task.await {
            Ok(built) => built,
            Err(e) => Err(ConstructionError::Failed {
                pair,
                converter: name,
                reason: format!("construction task failed: {e}").into(),
            }),
        }
    }
}

async fn construct(
    entry: RegisteredConverter,
    observer: Option<SharedObserver>,
    attempts: Arc<AtomicU64>,
) -> Built {
    let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
    let pair = entry.pair().clone();
    let name = entry.name().to_string();
    let factory = entry.factory();
    debug!("Constructing {} for {} (attempt {})", name, pair, attempt);

    let started = Instant::now();
    let built = match tokio::task::spawn_blocking(move || factory()).await {
        Ok(Ok(converter)) if converter.can_convert(&pair.source, &pair.target) => Ok(converter),
        Ok(Ok(converter)) => Err(ConstructionError::ContractViolation {
            pair: pair.clone(),
            converter: name.clone(),
            advertised: converter.pair(),
        }),
        Ok(Err(e)) => Err(ConstructionError::Failed {
            pair: pair.clone(),
            converter: name.clone(),
            reason: e.to_string().into(),
        }),
        Err(e) => Err(ConstructionError::Failed {
            pair: pair.clone(),
            converter: name.clone(),
            reason: format!("factory panicked: {e}").into(),
        }),
    };

    match &built {
        Ok(converter) => {
            info!(
                "Constructed {} for {} in {}ms",
                converter.name(),
                pair,
                started.elapsed().as_millis()
            );
            if let Some(obs) = &observer {
                obs.on_converter_constructed(&pair, converter.name());
            }
        }
        Err(e) => {
            warn!("{}", e);
            if let Some(obs) = &observer {
                obs.on_construction_failed(e);
            }
        }
    }
    built
}

impl fmt::Debug for ConverterCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterCache")
            .field("policy", &self.policy)
            .field("cached", &self.cached_pairs())
            .field("attempts", &self.construction_attempts())
            .finish()
    }
}
