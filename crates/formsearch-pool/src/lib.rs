//! Fixed-size round-robin connection pool with background health checks.
//!
//! Every slot holds one live connection. `get` hands out slots in rotation
//! without blocking or transferring ownership, so one connection can serve
//! several callers at once. A health task owned by the pool pings every slot
//! on a fixed interval and replaces dead connections in place, locking only
//! the slot being replaced.

#![deny(warnings)]
#![deny(unused_imports)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::{Mutex as SyncMutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use formsearch_core::{Connection, Connector, Error, Result, StoreSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    pub size: usize,
    pub health_interval_secs: u64,
    /// A ping or reconnect that takes longer than this counts as failed.
    pub check_timeout_ms: u64,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self { size: 3, health_interval_secs: 10, check_timeout_ms: 5000 }
    }
}

impl PoolOptions {
    pub fn with_size(size: usize) -> Self {
        Self { size, ..Self::default() }
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs.max(1))
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms.max(1))
    }
}

struct Slot<T> {
    conn: RwLock<Arc<T>>,
    // Held for the whole close-and-reconnect of this slot only.
    replacing: Mutex<()>,
}

struct Shared<C: Connector> {
    connector: C,
    slots: Vec<Slot<C::Conn>>,
    next: AtomicUsize,
    check_timeout: Duration,
}

impl<C: Connector> Shared<C> {
    fn current(&self, index: usize) -> Arc<C::Conn> {
        self.slots[index].conn.read().clone()
    }

    /// Check every slot at once, so a slow slot never delays the others.
    async fn check_all(&self) -> usize {
        let checks = (0..self.slots.len()).map(|index| self.check_slot(index));
        join_all(checks).await.into_iter().filter(|replaced| *replaced).count()
    }

    async fn check_slot(&self, index: usize) -> bool {
        let conn = self.current(index);
        let failure = match timeout(self.check_timeout, conn.ping()).await {
            Ok(Ok(())) => return false,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("no pong within {:?}", self.check_timeout),
        };
        warn!(slot = index, error = %failure, "pool: ping failed, reconnecting");
        self.replace(index, &conn).await
    }

    async fn replace(&self, index: usize, failed: &Arc<C::Conn>) -> bool {
        let slot = &self.slots[index];
        let _guard = slot.replacing.lock().await;

        let current = self.current(index);
        if !Arc::ptr_eq(&current, failed) {
            // Someone else already swapped this slot while we waited.
            return true;
        }
        match timeout(self.check_timeout, current.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(slot = index, error = %e, "pool: closing dead connection failed"),
            Err(_) => debug!(slot = index, "pool: closing dead connection timed out"),
        }
        match timeout(self.check_timeout, self.connector.connect()).await {
            Ok(Ok(fresh)) => {
                *slot.conn.write() = Arc::new(fresh);
                debug!(slot = index, "pool: reconnected");
                true
            }
            Ok(Err(e)) => {
                warn!(slot = index, error = %e, "pool: reconnect failed, will retry on next check");
                false
            }
            Err(_) => {
                warn!(slot = index, "pool: reconnect timed out, will retry on next check");
                false
            }
        }
    }
}

pub struct ConnectionPool<C: Connector> {
    shared: Arc<Shared<C>>,
    stop: watch::Sender<bool>,
    health: SyncMutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<C: Connector> ConnectionPool<C> {
    /// Open `options.size` connections eagerly and start the health task.
    ///
    /// Fails without leaving anything open if any connection fails.
    pub async fn connect(connector: C, options: PoolOptions) -> Result<Self> {
        if options.size == 0 {
            return Err(Error::InvalidConfig("pool size must be at least 1".to_string()));
        }

        let mut opened = Vec::with_capacity(options.size);
        for index in 0..options.size {
            match connector.connect().await {
                Ok(conn) => opened.push(conn),
                Err(e) => {
                    warn!(slot = index, addr = %connector.address(), error = %e, "pool: connect failed, tearing down");
                    for conn in &opened {
                        if let Err(close_err) = conn.close().await {
                            debug!(error = %close_err, "pool: close during teardown failed");
                        }
                    }
                    return Err(e);
                }
            }
        }

        let slots = opened
            .into_iter()
            .map(|conn| Slot { conn: RwLock::new(Arc::new(conn)), replacing: Mutex::new(()) })
            .collect();
        let shared =
            Arc::new(Shared { connector, slots, next: AtomicUsize::new(0), check_timeout: options.check_timeout() });

        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(health_loop(Arc::clone(&shared), options.health_interval(), stop_rx));

        info!(addr = %shared.connector.address(), size = options.size, "pool: connected");
        Ok(Self { shared, stop, health: SyncMutex::new(Some(handle)), closed: AtomicBool::new(false) })
    }

    /// Next connection in round-robin order. Never blocks and never fails;
    /// the connection may still turn out dead between health checks.
    pub fn get(&self) -> Arc<C::Conn> {
        let n = self.shared.next.fetch_add(1, Ordering::Relaxed);
        self.shared.current(n % self.shared.slots.len())
    }

    pub fn size(&self) -> usize {
        self.shared.slots.len()
    }

    /// Run one health pass now; returns how many slots were replaced.
    pub async fn check_health(&self) -> usize {
        self.shared.check_all().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop the health task and close every connection. Safe to call twice.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // The receiver is gone only if the task already exited.
        let _ = self.stop.send(true);
        let handle = self.health.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "pool: health task ended abnormally");
            }
        }
        let check_timeout = self.shared.check_timeout;
        for index in 0..self.shared.slots.len() {
            match timeout(check_timeout, self.shared.current(index).close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(slot = index, error = %e, "pool: close failed"),
                Err(_) => warn!(slot = index, "pool: close timed out, dropping connection"),
            }
        }
        info!(addr = %self.shared.connector.address(), "pool: closed");
    }
}

impl<C: Connector> StoreSource for ConnectionPool<C> {
    type Store = C::Conn;

    fn store(&self) -> Arc<C::Conn> {
        self.get()
    }
}

async fn health_loop<C: Connector>(shared: Arc<Shared<C>>, every: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }
        // A pass in progress is abandoned as soon as the pool closes.
        tokio::select! {
            _ = stop.changed() => break,
            replaced = shared.check_all() => {
                if replaced > 0 {
                    info!(replaced, "pool: health check replaced connections");
                }
            }
        }
    }
    debug!("pool: health task stopped");
}
