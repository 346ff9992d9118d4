mod common;

use std::time::Duration;

use common::{row, Call, Capture, MockConnection};
use mssql_dal::dynamic::{
    DynamicTableCell, DynamicTableColumnDefinition, DynamicTableEntityDefinition,
    DynamicTableRows, SqlDbType,
};
use mssql_dal::{
    DalError, DatabaseRepository, DynamicTableRepository, IdentifierPolicy, Logger,
    RepositoryConfig, SqlConnection, SqlTableRepository, SqlValue, StorageType, TableState,
};
use tracing::Level;

fn orders() -> DynamicTableEntityDefinition {
    DynamicTableEntityDefinition::new(
        "Orders",
        vec![
            DynamicTableColumnDefinition::new("A", StorageType::String)
                .with_sql_type("varchar(max)"),
            DynamicTableColumnDefinition::new("B", StorageType::I32),
        ],
    )
    .unwrap()
}

fn repository(
    conn: &MockConnection,
    capture: &Capture,
) -> DynamicTableRepository<MockConnection> {
    DynamicTableRepository::new(conn.clone(), orders())
        .with_logger(Logger::with_dispatch(capture.dispatch()))
}

fn cells(values: &[(&str, SqlValue<'static>)]) -> DynamicTableRows {
    DynamicTableRows {
        row_number: None,
        cells: values
            .iter()
            .map(|(column, value)| DynamicTableCell::new(*column, Some(value.clone())))
            .collect(),
    }
}

#[tokio::test]
async fn test_create_table_uses_declared_types() {
    let conn = MockConnection::new("Staging");
    let capture = Capture::default();
    let mut repo = repository(&conn, &capture);
    assert_eq!(repo.state(), TableState::Undefined);

    repo.create_table().await.unwrap();

    assert_eq!(
        conn.statements(),
        vec!["CREATE TABLE [dbo].[Orders] ([A] varchar(max), [B] int)".to_string()]
    );
    assert_eq!(repo.state(), TableState::Created);

    repo.drop_table().await.unwrap();
    assert_eq!(conn.statements()[1], "DROP TABLE [dbo].[Orders]");
    assert_eq!(repo.state(), TableState::Dropped);
}

#[tokio::test]
async fn test_type_tag_and_schema_reach_create_table() {
    let conn = MockConnection::new("Staging");
    let definition = DynamicTableEntityDefinition::with_schema(
        "imports",
        "Prices",
        vec![
            DynamicTableColumnDefinition::new("Amount", StorageType::Decimal),
            DynamicTableColumnDefinition::new("Code", StorageType::String)
                .with_db_type(SqlDbType::NChar),
        ],
    )
    .unwrap();
    let mut repo = DynamicTableRepository::new(conn.clone(), definition);

    repo.create_table().await.unwrap();

    assert_eq!(
        conn.statements(),
        vec![
            "CREATE TABLE [imports].[Prices] ([Amount] decimal(28,20), [Code] nchar(4000))"
                .to_string()
        ]
    );
}

#[tokio::test]
async fn test_unexpected_columns_fail_before_any_io() {
    let conn = MockConnection::new("Staging");
    let capture = Capture::default();
    let mut repo = repository(&conn, &capture);

    let rows = vec![cells(&[
        ("A", SqlValue::from("x")),
        ("B", SqlValue::I32(1)),
        ("C", SqlValue::I32(2)),
    ])];
    let err = repo.bulk_insert(&rows).await.unwrap_err();

    assert!(matches!(err, DalError::UnexpectedColumns(1)));
    assert!(conn.calls().is_empty());
    let errors = capture.at(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].operation.as_deref(),
        Some("DynamicTableRepository::bulk_insert")
    );
}

#[tokio::test]
async fn test_unexpected_columns_are_counted_once_per_name() {
    let conn = MockConnection::new("Staging");
    let capture = Capture::default();
    let mut repo = repository(&conn, &capture);

    let rows = vec![
        cells(&[("C", SqlValue::I32(1)), ("D", SqlValue::I32(1))]),
        cells(&[("c", SqlValue::I32(2))]),
    ];
    let err = repo.bulk_insert(&rows).await.unwrap_err();

    assert!(matches!(err, DalError::UnexpectedColumns(2)));
}

#[tokio::test]
async fn test_bulk_insert_fills_missing_cells_with_null() {
    let conn = MockConnection::new("Staging");
    let capture = Capture::default();
    let mut repo = repository(&conn, &capture);

    let mut first = repo.create_row();
    first.set("a", "x").unwrap();
    let second = cells(&[("B", SqlValue::from("7"))]);

    assert_eq!(repo.bulk_insert(&[first, second]).await.unwrap(), 2);

    let calls = conn.calls();
    assert!(matches!(calls[0], Call::Open));
    assert!(matches!(calls[1], Call::Begin));
    assert!(matches!(calls[2], Call::BulkCopy(..)));
    assert!(matches!(calls[3], Call::Commit));

    let (buffer, options) = &conn.bulk_copies()[0];
    assert_eq!(buffer.destination().to_string(), "dbo.Orders");
    assert_eq!(
        buffer.rows()[0],
        vec![SqlValue::from("x"), SqlValue::Null(StorageType::I32)]
    );
    assert_eq!(
        buffer.rows()[1],
        vec![SqlValue::Null(StorageType::String), SqlValue::I32(7)]
    );
    assert_eq!(options.connection_wait_secs, 30);
    assert!(options.table_lock);
}

#[tokio::test]
async fn test_empty_bulk_insert_is_a_no_op() {
    let conn = MockConnection::new("Staging");
    let capture = Capture::default();
    let mut repo = repository(&conn, &capture);

    assert_eq!(repo.bulk_insert(&[]).await.unwrap(), 0);
    assert!(conn.calls().is_empty());
}

#[tokio::test]
async fn test_failed_commit_rolls_back() {
    let conn = MockConnection::new("Staging");
    conn.fail_on("COMMIT TRANSACTION", 1205);
    let capture = Capture::default();
    let mut repo = repository(&conn, &capture);

    let row = cells(&[("A", SqlValue::from("x"))]);
    let err = repo.bulk_insert(&[row]).await.unwrap_err();

    assert_eq!(err.engine_code(), Some(1205));
    assert!(matches!(conn.calls().last(), Some(Call::Rollback)));
}

#[tokio::test]
async fn test_delete_many_rejects_unsafe_table_name() {
    let conn = MockConnection::new("Staging");
    let capture = Capture::default();
    let mut repo = repository(&conn, &capture);

    let err = repo.delete_many("orders1", "col", &[1, 2]).await.unwrap_err();

    assert!(matches!(err, DalError::Validation(_)));
    assert!(conn.calls().is_empty());
    assert_eq!(capture.at(Level::ERROR).len(), 1);
}

#[tokio::test]
async fn test_delete_many_binds_each_value() {
    let conn = MockConnection::new("Staging");
    let capture = Capture::default();
    let mut repo = repository(&conn, &capture);

    let deleted = repo.delete_many("orders", "col", &[1, 2, 3]).await.unwrap();

    assert_eq!(deleted, 1);
    let calls = conn.calls();
    assert!(matches!(calls[0], Call::Open));
    assert!(matches!(calls[1], Call::Begin));
    match &calls[2] {
        Call::Execute(sql, params) => {
            assert_eq!(
                sql,
                "DELETE FROM [orders] WHERE [col] IN (@Value0, @Value1, @Value2)"
            );
            assert_eq!(params.get("@Value2"), Some(&SqlValue::I32(3)));
        }
        other => panic!("expected an execute, got {:?}", other),
    }
    assert!(matches!(calls[3], Call::Commit));
}

#[tokio::test]
async fn test_delete_many_splits_long_lists() {
    let conn = MockConnection::new("Staging");
    let capture = Capture::default();
    let mut repo = repository(&conn, &capture);

    let values: Vec<i32> = (0..4500).collect();
    let deleted = repo.delete_many("orders", "id", &values).await.unwrap();

    assert_eq!(deleted, 3);
    let executes: Vec<usize> = conn
        .calls()
        .iter()
        .filter_map(|call| match call {
            Call::Execute(_, params) => Some(params.len()),
            _ => None,
        })
        .collect();
    assert_eq!(executes, vec![2000, 2000, 500]);
    let commits = conn
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Commit))
        .count();
    assert_eq!(commits, 1);
}

#[tokio::test]
async fn test_delete_many_quoted_policy_accepts_digits() {
    let conn = MockConnection::new("Staging");
    let config = RepositoryConfig {
        identifier_policy: IdentifierPolicy::Quoted,
        ..RepositoryConfig::default()
    };
    let mut repo = DynamicTableRepository::new(conn.clone(), orders()).with_config(config);

    repo.delete_many("orders_2024", "id", &[5]).await.unwrap();

    assert_eq!(
        conn.statements(),
        vec!["DELETE FROM [orders_2024] WHERE [id] IN (@Value0)".to_string()]
    );
}

#[tokio::test]
async fn test_delete_many_failure_rolls_back() {
    let conn = MockConnection::new("Staging");
    conn.fail_on("DELETE FROM", 547);
    let capture = Capture::default();
    let mut repo = repository(&conn, &capture);

    let err = repo.delete_many("orders", "id", &[1]).await.unwrap_err();

    assert_eq!(err.engine_code(), Some(547));
    let calls = conn.calls();
    assert!(calls.iter().any(|c| matches!(c, Call::Rollback)));
    assert!(!calls.iter().any(|c| matches!(c, Call::Commit)));
}

#[tokio::test]
async fn test_drop_if_exists_swallows_missing_table() {
    let conn = MockConnection::new("Staging");
    conn.fail_on("DROP TABLE", 3701);
    let capture = Capture::default();
    let mut repo = repository(&conn, &capture);

    repo.drop_table_if_exists().await.unwrap();

    assert_eq!(repo.state(), TableState::Dropped);
    assert!(capture.at(Level::ERROR).is_empty());
    let debug = capture.at(Level::DEBUG);
    assert!(debug
        .iter()
        .any(|e| e.message.contains("dropping table 'Orders' did not complete")));
}

#[tokio::test]
async fn test_drop_if_exists_propagates_other_errors() {
    let conn = MockConnection::new("Staging");
    conn.fail_on("DROP TABLE", 229);
    let capture = Capture::default();
    let mut repo = repository(&conn, &capture);

    let err = repo.drop_table_if_exists().await.unwrap_err();

    assert_eq!(err.engine_code(), Some(229));
    assert_eq!(repo.state(), TableState::Undefined);
    let errors = capture.at(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].operation.as_deref(),
        Some("DynamicTableRepository::drop_table_if_exists")
    );
}

#[tokio::test]
async fn test_plain_drop_does_not_swallow_missing_table() {
    let conn = MockConnection::new("Staging");
    conn.fail_on("DROP TABLE", 3701);
    let capture = Capture::default();
    let mut repo = repository(&conn, &capture);

    assert!(repo.drop_table().await.is_err());
    assert_eq!(capture.at(Level::ERROR).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_open_times_out() {
    let conn = MockConnection::new("Staging").with_open_delay(Duration::from_secs(120));
    let capture = Capture::default();
    let mut repo = repository(&conn, &capture);

    let err = repo.create_table().await.unwrap_err();

    assert!(matches!(err, DalError::Timeout { .. }));
    assert!(conn.calls().is_empty());
    assert_eq!(repo.state(), TableState::Undefined);
}

#[tokio::test(start_paused = true)]
async fn test_bulk_insert_waits_thirty_seconds_to_open() {
    let conn = MockConnection::new("Staging").with_open_delay(Duration::from_secs(45));
    let capture = Capture::default();
    let mut repo = repository(&conn, &capture);

    let row = cells(&[("A", SqlValue::from("x"))]);
    let err = repo.bulk_insert(&[row]).await.unwrap_err();

    match err {
        DalError::Timeout { after, .. } => assert_eq!(after, Duration::from_secs(30)),
        other => panic!("expected a timeout, got {:?}", other),
    }
    assert!(conn.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_bulk_copy_timeout_drops_session_before_next_call() {
    let conn = MockConnection::new("Staging").with_bulk_copy_delay(Duration::from_secs(7200));
    let capture = Capture::default();
    let mut repo = repository(&conn, &capture);

    let row = cells(&[("A", SqlValue::from("x"))]);
    let err = repo.bulk_insert(&[row]).await.unwrap_err();
    assert!(matches!(err, DalError::Timeout { .. }));
    assert!(!repo.base().connection().is_open());

    repo.drop_table_if_exists().await.unwrap();

    let calls = conn.calls();
    assert!(matches!(calls[0], Call::Open));
    assert!(matches!(calls[1], Call::Begin));
    assert!(matches!(calls[2], Call::Reset));
    assert!(matches!(calls[3], Call::Open));
    assert!(matches!(calls[4], Call::Execute(..)));
    assert!(!calls.iter().any(|c| matches!(c, Call::Rollback)));
}

#[tokio::test]
async fn test_tables_starting_with_reads_first_column() {
    let conn = MockConnection::new("Staging");
    conn.push_result(vec![
        row("TABLE_NAME", "orders_a"),
        row("TABLE_NAME", "orders_b"),
    ]);
    let mut repo = SqlTableRepository::new(conn.clone());

    let tables = repo.tables_starting_with("orders_").await.unwrap();

    assert_eq!(tables, vec!["orders_a".to_string(), "orders_b".to_string()]);
    match &conn.calls()[1] {
        Call::Query(_, params) => {
            assert_eq!(params.get("@Prefix"), Some(&SqlValue::from("orders_")))
        }
        other => panic!("expected a query, got {:?}", other),
    }
}
