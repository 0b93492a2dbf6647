//! Refresh coordination
//!
//! The coordinator owns the refresh cycle: fetch, extract, publish. The latest
//! mapping is published through a `watch` channel so readers always see a
//! complete mapping, swapped in as a whole. Entity descriptors are projected
//! once, from the first successful refresh, and stay fixed for the lifetime of
//! the coordinator.
//!
//! `refresh` takes `&mut self`, so at most one cycle (and one request) is in
//! flight at a time.

use crate::client::{DateQuery, MetricsSource};
use crate::error::FetchError;
use crate::extractor::extract;
use crate::projector::Projector;
use crate::types::{CanonicalMapping, EntityDescriptor, EntityState};
use chrono::{DateTime, NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Health of the refresh loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshStatus {
    /// Completion time of the last successful cycle
    pub last_success: Option<DateTime<Utc>>,
    /// Message of the last failed cycle, cleared on success
    pub last_error: Option<String>,
    /// Set when the last failure needs operator attention
    pub needs_attention: bool,
    pub consecutive_failures: u32,
}

impl RefreshStatus {
    /// Whether at least one refresh has succeeded
    pub fn available(&self) -> bool {
        self.last_success.is_some()
    }
}

/// Result of one successful cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Keys in the new mapping
    pub metrics: usize,
    /// Whether this cycle created the entity set
    pub entities_created: bool,
}

pub struct Coordinator<S: MetricsSource> {
    source: S,
    projector: Projector,
    poll_interval: Duration,
    fixed_date: Option<NaiveDate>,
    mapping_tx: watch::Sender<Arc<CanonicalMapping>>,
    entities: Option<Arc<[EntityDescriptor]>>,
    status: RefreshStatus,
}

impl<S: MetricsSource> Coordinator<S> {
    pub fn new(source: S, entry_id: &str, poll_interval: Duration) -> Self {
        let (mapping_tx, _) = watch::channel(Arc::new(CanonicalMapping::new()));
        Self {
            source,
            projector: Projector::new(entry_id),
            poll_interval,
            fixed_date: None,
            mapping_tx,
            entities: None,
            status: RefreshStatus::default(),
        }
    }

    /// Always query `date` instead of the current local day
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.fixed_date = Some(date);
        self
    }

    /// Latest complete mapping
    pub fn current_mapping(&self) -> Arc<CanonicalMapping> {
        self.mapping_tx.borrow().clone()
    }

    /// Receiver notified each time a new mapping is published
    pub fn subscribe(&self) -> watch::Receiver<Arc<CanonicalMapping>> {
        self.mapping_tx.subscribe()
    }

    /// Entities, once the first refresh has succeeded
    pub fn entities(&self) -> Option<Arc<[EntityDescriptor]>> {
        self.entities.clone()
    }

    /// Entity states against the latest mapping
    pub fn states(&self) -> Vec<EntityState> {
        let mapping = self.current_mapping();
        self.entities
            .iter()
            .flat_map(|entities| entities.iter())
            .map(|entity| entity.state(&mapping))
            .collect()
    }

    pub fn status(&self) -> &RefreshStatus {
        &self.status
    }

    fn query(&self) -> DateQuery {
        match self.fixed_date {
            Some(date) => DateQuery::Date(date),
            None => DateQuery::today(),
        }
    }

    /// Run one fetch and publish cycle.
    ///
    /// On failure the previously published mapping stays in place.
    pub async fn refresh(&mut self) -> Result<RefreshOutcome, FetchError> {
        let query = self.query();

        let mapping = match self.source.fetch(&query).await {
            Ok(Some(raw)) => match query.target_date() {
                Some(date) => extract(&raw, date),
                None => CanonicalMapping::new(),
            },
            Ok(None) => CanonicalMapping::new(),
            Err(e) => {
                if e.is_fatal() {
                    error!(error = %e, "Ultrahuman refresh failed");
                } else {
                    warn!(error = %e, "Ultrahuman refresh failed, retrying next cycle");
                }
                self.status.last_error = Some(e.to_string());
                self.status.needs_attention = e.is_fatal();
                self.status.consecutive_failures += 1;
                return Err(e);
            }
        };

        let mapping = Arc::new(mapping);
        self.mapping_tx.send_replace(mapping.clone());

        self.status.last_success = Some(Utc::now());
        self.status.last_error = None;
        self.status.needs_attention = false;
        self.status.consecutive_failures = 0;

        let entities_created = self.entities.is_none();
        if entities_created {
            let entities = self.projector.project(&mapping);
            self.entities = Some(entities.into());
        }

        Ok(RefreshOutcome {
            metrics: mapping.len(),
            entities_created,
        })
    }

    /// Refresh on a fixed interval until `shutdown` resolves.
    ///
    /// The first cycle runs immediately. A tick that comes due while a cycle is
    /// still running is skipped, not queued.
    pub async fn run<F, C>(&mut self, shutdown: F, mut on_refresh: C)
    where
        F: Future<Output = ()>,
        C: FnMut(&Self, &Result<RefreshOutcome, FetchError>),
    {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(interval_secs = self.poll_interval.as_secs(), "Starting refresh loop");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Stopping refresh loop");
                    break;
                }
                _ = ticker.tick() => {
                    let result = self.refresh().await;
                    on_refresh(self, &result);
                }
            }
        }
    }
}
