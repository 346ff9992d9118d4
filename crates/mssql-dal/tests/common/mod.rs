//! Shared test doubles: a recording `SqlConnection` and a tracing capture.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mssql_dal::{
    BulkCopyOptions, DalError, ParameterMap, Result, ResultRow, SqlConnection, SqlValue,
    TabularBuffer,
};
use tracing::field::{Field, Visit};
use tracing::{Dispatch, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// One call made against a [`MockConnection`].
#[derive(Debug, Clone)]
pub enum Call {
    Open,
    Execute(String, ParameterMap),
    Query(String, ParameterMap),
    Begin,
    Commit,
    Rollback,
    BulkCopy(TabularBuffer, BulkCopyOptions),
    Reset,
}

#[derive(Default)]
struct Shared {
    calls: Vec<Call>,
    failures: Vec<(String, u32)>,
    results: VecDeque<Vec<ResultRow>>,
    open_delay: Option<Duration>,
    bulk_copy_delay: Option<Duration>,
}

/// In-memory connection that records every call.
///
/// Clones and retargeted copies share the same call log.
#[derive(Clone)]
pub struct MockConnection {
    database: String,
    open: bool,
    shared: Arc<Mutex<Shared>>,
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnection")
            .field("database", &self.database)
            .field("open", &self.open)
            .finish()
    }
}

impl MockConnection {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            open: false,
            shared: Arc::default(),
        }
    }

    /// Fail any statement containing `pattern` with server error `code`.
    ///
    /// `BEGIN TRANSACTION`, `COMMIT TRANSACTION`, `ROLLBACK TRANSACTION` and
    /// `BULK COPY` match transaction and bulk copy calls.
    pub fn fail_on(&self, pattern: &str, code: u32) {
        self.lock().failures.push((pattern.to_string(), code));
    }

    /// Rows returned by the next query.
    pub fn push_result(&self, rows: Vec<ResultRow>) {
        self.lock().results.push_back(rows);
    }

    /// Make `open` take `delay`.
    pub fn with_open_delay(self, delay: Duration) -> Self {
        self.lock().open_delay = Some(delay);
        self
    }

    /// Make `bulk_copy` take `delay` before it records anything.
    pub fn with_bulk_copy_delay(self, delay: Duration) -> Self {
        self.lock().bulk_copy_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// SQL text of every execute and query, in order.
    pub fn statements(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Execute(sql, _) | Call::Query(sql, _) => Some(sql),
                _ => None,
            })
            .collect()
    }

    pub fn bulk_copies(&self) -> Vec<(TabularBuffer, BulkCopyOptions)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::BulkCopy(buffer, options) => Some((buffer, options)),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap()
    }

    fn record(&self, call: Call, text: &str) -> Result<()> {
        let mut shared = self.lock();
        shared.calls.push(call);
        match shared.failures.iter().find(|(p, _)| text.contains(p.as_str())) {
            Some((_, code)) => Err(DalError::Engine {
                code: *code,
                message: format!("injected failure for {}", text),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SqlConnection for MockConnection {
    fn database(&self) -> &str {
        &self.database
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn open(&mut self) -> Result<()> {
        let delay = self.lock().open_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(Call::Open, "OPEN")?;
        self.open = true;
        Ok(())
    }

    fn reset(&mut self) {
        self.lock().calls.push(Call::Reset);
        self.open = false;
    }

    fn retarget(&self, database: &str) -> Result<Self> {
        Ok(Self {
            database: database.to_string(),
            open: false,
            shared: Arc::clone(&self.shared),
        })
    }

    async fn execute(&mut self, sql: &str, params: &ParameterMap) -> Result<u64> {
        self.record(Call::Execute(sql.to_string(), params.clone()), sql)?;
        Ok(1)
    }

    async fn query(&mut self, sql: &str, params: &ParameterMap) -> Result<Vec<ResultRow>> {
        self.record(Call::Query(sql.to_string(), params.clone()), sql)?;
        Ok(self.lock().results.pop_front().unwrap_or_default())
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        self.record(Call::Begin, "BEGIN TRANSACTION")
    }

    async fn commit(&mut self) -> Result<()> {
        self.record(Call::Commit, "COMMIT TRANSACTION")
    }

    async fn rollback(&mut self) -> Result<()> {
        self.record(Call::Rollback, "ROLLBACK TRANSACTION")
    }

    async fn bulk_copy(
        &mut self,
        buffer: &TabularBuffer,
        options: &BulkCopyOptions,
    ) -> Result<u64> {
        let delay = self.lock().bulk_copy_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(Call::BulkCopy(buffer.clone(), options.clone()), "BULK COPY")?;
        Ok(buffer.row_count() as u64)
    }
}

/// A single-column result row.
pub fn row(column: &str, value: impl Into<SqlValue<'static>>) -> ResultRow {
    ResultRow::new(vec![column.to_string()], vec![value.into()]).unwrap()
}

/// One captured tracing event.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub operation: Option<String>,
    pub message: String,
    pub error: Option<String>,
}

#[derive(Default)]
struct EventVisitor {
    operation: Option<String>,
    message: String,
    error: Option<String>,
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "operation" => self.operation = Some(value.to_string()),
            "message" => self.message = value.to_string(),
            "error" => self.error = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);
        match field.name() {
            "operation" => self.operation = Some(rendered),
            "message" => self.message = rendered,
            "error" => self.error = Some(rendered),
            _ => {}
        }
    }
}

/// Layer storing every event it sees.
#[derive(Clone, Default)]
pub struct Capture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S: Subscriber> Layer<S> for Capture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            operation: visitor.operation,
            message: visitor.message,
            error: visitor.error,
        });
    }
}

impl Capture {
    pub fn dispatch(&self) -> Dispatch {
        Dispatch::new(tracing_subscriber::registry().with(self.clone()))
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn at(&self, level: Level) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.level == level)
            .collect()
    }
}
