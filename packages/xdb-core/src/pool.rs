//! Per-database connection pools on r2d2.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::driver::{Driver, DriverConnection, DriverError, ResultSet, SqlValue};

/// Opens driver connections for one connection string.
pub struct ConnectionManager {
    driver: Arc<dyn Driver>,
    connection_string: String,
}

// The connection string may carry a password.
impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("driver", &self.driver.name())
            .finish_non_exhaustive()
    }
}

/// A driver connection as held by the pool.
pub struct ManagedConnection {
    connection: Box<dyn DriverConnection>,
    broken: bool,
}

impl Drop for ManagedConnection {
    fn drop(&mut self) {
        let connection = std::mem::replace(&mut self.connection, Box::new(Detached));
        if let Err(e) = connection.close() {
            tracing::warn!(error = %e, "error closing connection");
        }
    }
}

impl r2d2::ManageConnection for ConnectionManager {
    type Connection = ManagedConnection;
    type Error = DriverError;

    fn connect(&self) -> Result<ManagedConnection, DriverError> {
        tracing::debug!(driver = self.driver.name(), "opening connection");
        let connection = self.driver.open(&self.connection_string)?;
        Ok(ManagedConnection {
            connection,
            broken: false,
        })
    }

    fn is_valid(&self, conn: &mut ManagedConnection) -> Result<(), DriverError> {
        if conn.broken {
            return Err(DriverError::new(None, "connection saw a failed statement").connection_lost());
        }
        Ok(())
    }

    fn has_broken(&self, conn: &mut ManagedConnection) -> bool {
        if conn.broken {
            tracing::debug!(driver = self.driver.name(), "discarding broken connection");
        }
        conn.broken
    }
}

/// Reports failed connection attempts through tracing.
#[derive(Debug)]
struct TracingErrorHandler;

impl r2d2::HandleError<DriverError> for TracingErrorHandler {
    fn handle_error(&self, error: DriverError) {
        tracing::warn!(code = error.code().unwrap_or_default(), "connection attempt failed: {}", error);
    }
}

#[derive(Default)]
struct PoolState {
    pools: HashMap<String, r2d2::Pool<ConnectionManager>>,
    closed: bool,
}

struct PoolInner {
    driver: Arc<dyn Driver>,
    max_size: u32,
    connection_timeout: Duration,
    state: Mutex<PoolState>,
}

/// One r2d2 pool per connection string.
///
/// A connection is held by exactly one caller at a time; it returns to its
/// pool when the [`PooledConnection`] guard drops, unless it was marked
/// broken. Cloning shares the pools.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("driver", &self.inner.driver)
            .field("max_size", &self.inner.max_size)
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// `max_size` bounds the connections per connection string, checked out
    /// or idle; `connection_timeout` bounds the wait for one.
    pub fn new(driver: Arc<dyn Driver>, max_size: u32, connection_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                driver,
                max_size: max_size.max(1),
                connection_timeout: connection_timeout.max(Duration::from_millis(1)),
                state: Mutex::new(PoolState::default()),
            }),
        }
    }

    fn build(&self, connection_string: &str) -> r2d2::Pool<ConnectionManager> {
        r2d2::Pool::builder()
            .max_size(self.inner.max_size)
            .min_idle(Some(0))
            .connection_timeout(self.inner.connection_timeout)
            .error_handler(Box::new(TracingErrorHandler))
            .build_unchecked(ConnectionManager {
                driver: Arc::clone(&self.inner.driver),
                connection_string: connection_string.to_string(),
            })
    }

    /// Takes an idle connection for `connection_string`, opening one when
    /// none is idle.
    pub fn acquire(&self, connection_string: &str) -> Result<PooledConnection, DriverError> {
        let pool = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(DriverError::new(None, "connection pool is shut down").connection_lost());
            }
            if !state.pools.contains_key(connection_string) {
                let pool = self.build(connection_string);
                state.pools.insert(connection_string.to_string(), pool);
            }
            state.pools.get(connection_string).cloned()
        };
        let pool = pool.ok_or_else(|| {
            DriverError::new(None, "connection pool is shut down").connection_lost()
        })?;
        let connection = pool.get().map_err(|e| {
            DriverError::new(None, format!("cannot open connection: {}", e)).connection_lost()
        })?;
        Ok(PooledConnection { connection })
    }

    /// Number of idle connections for `connection_string`.
    pub fn idle_count(&self, connection_string: &str) -> usize {
        self.inner
            .state
            .lock()
            .pools
            .get(connection_string)
            .map_or(0, |pool| pool.state().idle_connections as usize)
    }

    /// Forgets the pool for `connection_string`. Its idle connections close
    /// at once, checked out ones when they come back.
    pub fn evict(&self, connection_string: &str) {
        let evicted = self.inner.state.lock().pools.remove(connection_string);
        drop(evicted);
    }

    /// Closes every idle connection and refuses further acquisitions.
    /// Connections still checked out are closed when they come back.
    pub fn shutdown(&self) {
        let pools = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            std::mem::take(&mut state.pools)
        };
        let idle: u32 = pools.values().map(|pool| pool.state().idle_connections).sum();
        tracing::info!(connections = idle, "connection pool shut down");
        drop(pools);
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.state.lock().closed
    }
}

/// Exclusive use of one pooled connection.
pub struct PooledConnection {
    connection: r2d2::PooledConnection<ConnectionManager>,
}

/// Stands in for a connection after it was closed.
struct Detached;

impl DriverConnection for Detached {
    fn execute(&mut self, _sql: &str, _params: &[SqlValue]) -> Result<u64, DriverError> {
        Err(DriverError::new(None, "connection already closed").connection_lost())
    }

    fn query(&mut self, _sql: &str, _params: &[SqlValue]) -> Result<ResultSet, DriverError> {
        Err(DriverError::new(None, "connection already closed").connection_lost())
    }
}

impl PooledConnection {
    /// Keeps the connection from going back to the pool.
    pub fn mark_broken(&mut self) {
        self.connection.broken = true;
    }
}

impl Deref for PooledConnection {
    type Target = dyn DriverConnection;

    fn deref(&self) -> &Self::Target {
        self.connection.connection.as_ref()
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection.connection.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntest::timeout;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    /// Driver whose connections answer every statement with nothing and
    /// count how often they were opened and closed.
    #[derive(Debug, Default)]
    struct CountingDriver {
        opened: AtomicUsize,
        closed: Arc<AtomicUsize>,
    }

    struct CountingConnection {
        closed: Arc<AtomicUsize>,
    }

    impl Driver for CountingDriver {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn open(&self, connection_string: &str) -> Result<Box<dyn DriverConnection>, DriverError> {
            if connection_string == "unreachable" {
                return Err(DriverError::new(None, "no route to host").connection_lost());
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingConnection {
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    impl DriverConnection for CountingConnection {
        fn execute(&mut self, _sql: &str, _params: &[SqlValue]) -> Result<u64, DriverError> {
            Ok(0)
        }

        fn query(&mut self, _sql: &str, _params: &[SqlValue]) -> Result<ResultSet, DriverError> {
            Ok(ResultSet::default())
        }

        fn close(self: Box<Self>) -> Result<(), DriverError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn pool(max_size: u32) -> (Arc<CountingDriver>, ConnectionPool) {
        let driver = Arc::new(CountingDriver::default());
        let pool = ConnectionPool::new(driver.clone(), max_size, Duration::from_millis(200));
        (driver, pool)
    }

    /// r2d2 may release its last pool reference on a worker thread.
    fn wait_for_closed(driver: &CountingDriver, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(1);
        while driver.closed.load(Ordering::SeqCst) < expected && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(driver.closed.load(Ordering::SeqCst), expected);
    }

    #[timeout(2000)]
    #[test]
    fn test_connection_is_reused() {
        let (driver, pool) = pool(2);
        {
            let mut conn = pool.acquire("a").unwrap();
            conn.execute("SELECT 1", &[]).unwrap();
        }
        assert_eq!(pool.idle_count("a"), 1);
        let _conn = pool.acquire("a").unwrap();
        assert_eq!(driver.opened.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count("a"), 0);
    }

    #[timeout(2000)]
    #[test]
    fn test_connections_are_keyed_by_string() {
        let (driver, pool) = pool(2);
        drop(pool.acquire("a").unwrap());
        drop(pool.acquire("b").unwrap());
        assert_eq!(driver.opened.load(Ordering::SeqCst), 2);
        assert_eq!(pool.idle_count("a"), 1);
        assert_eq!(pool.idle_count("b"), 1);
    }

    #[timeout(2000)]
    #[test]
    fn test_broken_connection_is_discarded() {
        let (driver, pool) = pool(2);
        {
            let mut conn = pool.acquire("a").unwrap();
            conn.mark_broken();
        }
        wait_for_closed(&driver, 1);
        assert_eq!(pool.idle_count("a"), 0);
        drop(pool.acquire("a").unwrap());
        assert_eq!(driver.opened.load(Ordering::SeqCst), 2);
    }

    #[timeout(2000)]
    #[test]
    fn test_pool_size_is_bounded() {
        let (driver, pool) = pool(1);
        let first = pool.acquire("a").unwrap();
        let err = pool.acquire("a").err().unwrap();
        assert!(err.is_connection_lost());
        drop(first);
        let _again = pool.acquire("a").unwrap();
        assert_eq!(driver.opened.load(Ordering::SeqCst), 1);
    }

    #[timeout(2000)]
    #[test]
    fn test_shutdown_closes_idle_and_refuses_new() {
        let (driver, pool) = pool(4);
        let held = pool.acquire("a").unwrap();
        drop(pool.acquire("b").unwrap());
        pool.shutdown();
        wait_for_closed(&driver, 1);
        assert!(pool.acquire("a").err().unwrap().is_connection_lost());
        drop(held);
        wait_for_closed(&driver, 2);
        assert!(pool.is_shut_down());
    }

    #[timeout(2000)]
    #[test]
    fn test_evict_closes_idle_connections() {
        let (driver, pool) = pool(2);
        drop(pool.acquire("a").unwrap());
        pool.evict("a");
        wait_for_closed(&driver, 1);
        assert_eq!(pool.idle_count("a"), 0);
    }

    #[timeout(2000)]
    #[test]
    fn test_open_failure_propagates() {
        let (_, pool) = pool(1);
        let err = pool.acquire("unreachable").err().unwrap();
        assert!(err.is_connection_lost());
        assert!(err.message().contains("no route to host"), "{}", err);
    }
}
