//! Session behavior against in-memory cluster fakes.

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use tessera_commons::error::TesseraError;
use tessera_commons::host_port::HostPort;
use tessera_commons::ids::TabletId;
use tessera_commons::row::ColumnValue;
use tessera_link::{FlushMode, Messenger, TesseraClient, TesseraClientOptions};
use tokio::sync::oneshot;

fn p1() -> TabletId {
    TabletId::new("p1")
}

#[tokio::test]
async fn test_sync_apply_returns_server_status() {
    let cluster = single_tablet_cluster();
    let client = connect(&cluster).await;
    let table = open_test_table(&client).await;
    let session = client.new_session();

    session
        .apply(insert_op(&table, "row-1", b"v1"))
        .await
        .unwrap();
    assert!(!session.has_pending_operations());
    assert_eq!(cluster.tserver.row_count(&p1()), 1);

    // A duplicate insert surfaces the precise server status, and the caller
    // keeps the operation.
    let rejected = session
        .apply(insert_op(&table, "row-1", b"v2"))
        .await
        .unwrap_err();
    assert!(rejected.error.is_already_present());
    assert_eq!(
        rejected.op.row().get(0),
        Some(&ColumnValue::String("row-1".into()))
    );
    assert!(!session.has_pending_operations());

    session.close().unwrap();
}

#[tokio::test]
async fn test_apply_without_key_is_invalid_argument() {
    let cluster = single_tablet_cluster();
    let client = connect(&cluster).await;
    let table = open_test_table(&client).await;
    let session = client.new_session();

    let mut op = table.new_insert();
    op.row_mut().set_binary("val", b"x".as_slice()).unwrap();
    let rejected = session.apply(op).await.unwrap_err();
    assert!(matches!(rejected.error, TesseraError::InvalidArgument(_)));
    assert!(!session.has_pending_operations());
    assert_eq!(cluster.tserver.write_count.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_apply_rejects_table_from_other_client() {
    let cluster = single_tablet_cluster();
    let client_a = connect(&cluster).await;
    let client_b = connect(&cluster).await;
    let table_b = open_test_table(&client_b).await;

    let session_a = client_a.new_session();
    let rejected = session_a
        .apply(insert_op(&table_b, "row-1", b"v"))
        .await
        .unwrap_err();
    assert!(matches!(rejected.error, TesseraError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_manual_flush_buffers_until_flush() {
    let cluster = single_tablet_cluster();
    let client = connect(&cluster).await;
    let table = open_test_table(&client).await;
    let session = client.new_session();
    session.set_flush_mode(FlushMode::ManualFlush).unwrap();

    session
        .apply(insert_op(&table, "a", b"1"))
        .await
        .unwrap();
    session
        .apply(insert_op(&table, "b", b"2"))
        .await
        .unwrap();
    assert!(session.has_pending_operations());
    assert_eq!(cluster.tserver.row_count(&p1()), 0);

    session.flush().await.unwrap();
    assert!(!session.has_pending_operations());
    assert_eq!(cluster.tserver.row_count(&p1()), 2);

    session.close().unwrap();
}

#[tokio::test]
async fn test_manual_flush_full_buffer_is_service_unavailable() {
    let cluster = single_tablet_cluster();
    let client = connect(&cluster).await;
    let table = open_test_table(&client).await;
    let session = client.new_session();
    session.set_flush_mode(FlushMode::ManualFlush).unwrap();
    session.set_mutation_buffer_space(4 * 1024);

    session
        .apply(insert_op(&table, "a", &vec![0u8; 3000]))
        .await
        .unwrap();
    let rejected = session
        .apply(insert_op(&table, "b", &vec![0u8; 2000]))
        .await
        .unwrap_err();
    assert!(rejected.error.is_service_unavailable());

    // The refused operation was not buffered; the first one flushes fine.
    session.flush().await.unwrap();
    assert_eq!(cluster.tserver.row_count(&p1()), 1);
    session.close().unwrap();
}

#[tokio::test]
async fn test_background_apply_blocks_until_buffer_space() {
    let cluster = single_tablet_cluster();
    cluster.tserver.set_delay(Duration::from_millis(200));
    let client = connect(&cluster).await;
    let table = open_test_table(&client).await;
    let session = Arc::new(client.new_session());
    session
        .set_flush_mode(FlushMode::AutoFlushBackground)
        .unwrap();
    session.set_mutation_buffer_space(4 * 1024);

    // First op goes straight to the (slow) flusher; second sits in the
    // buffer; the third does not fit until the second leaves the buffer.
    session
        .apply(insert_op(&table, "a", &vec![0u8; 3000]))
        .await
        .unwrap();
    session
        .apply(insert_op(&table, "b", &vec![0u8; 3000]))
        .await
        .unwrap();

    let blocked = {
        let session = Arc::clone(&session);
        let table = Arc::clone(&table);
        tokio::spawn(async move {
            session
                .apply(insert_op(&table, "c", &vec![0u8; 2000]))
                .await
                .unwrap();
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!blocked.is_finished(), "apply should block on buffer space");

    blocked.await.unwrap();
    session.flush().await.unwrap();
    assert_eq!(cluster.tserver.row_count(&p1()), 3);
    session.close().unwrap();
}

#[tokio::test]
async fn test_background_errors_accumulate_until_retrieved() {
    let cluster = single_tablet_cluster();
    let client = connect(&cluster).await;
    let table = open_test_table(&client).await;
    let session = client.new_session();
    session
        .set_flush_mode(FlushMode::AutoFlushBackground)
        .unwrap();

    session
        .apply(insert_op(&table, "dup", b"1"))
        .await
        .unwrap();
    session
        .apply(insert_op(&table, "dup", b"2"))
        .await
        .unwrap();

    let err = session.flush().await.unwrap_err();
    assert!(matches!(err, TesseraError::IoError(_)));

    assert_eq!(session.count_pending_errors(), 1);
    let (errors, overflowed) = session.get_pending_errors();
    assert!(!overflowed);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].error.is_already_present());
    assert_eq!(
        errors[0].op.row().get(0),
        Some(&ColumnValue::String("dup".into()))
    );

    // Retrieval moves the list out.
    assert_eq!(session.count_pending_errors(), 0);
    session.close().unwrap();
}

#[tokio::test]
async fn test_pending_error_overflow_signal() {
    let cluster = single_tablet_cluster();
    let client = connect(&cluster).await;
    let table = open_test_table(&client).await;
    let session = client.new_session();
    session.set_flush_mode(FlushMode::ManualFlush).unwrap();

    // Every update misses, producing more errors than the list holds.
    let extra = 5;
    for i in 0..tessera_link::MAX_PENDING_ERRORS + extra {
        session
            .apply(update_op(&table, &format!("missing-{:05}", i), b"v"))
            .await
            .unwrap();
    }
    session.flush().await.unwrap_err();

    assert_eq!(session.count_pending_errors(), tessera_link::MAX_PENDING_ERRORS);
    let (errors, overflowed) = session.get_pending_errors();
    assert!(overflowed, "drops must be signalled");
    assert_eq!(errors.len(), tessera_link::MAX_PENDING_ERRORS);
    // Drop-oldest: the first `extra` errors are gone.
    assert_eq!(
        errors[0].op.row().get(0),
        Some(&ColumnValue::String(format!("missing-{:05}", extra)))
    );

    // The signal is cleared once retrieved.
    let (errors, overflowed) = session.get_pending_errors();
    assert!(errors.is_empty());
    assert!(!overflowed);
    session.close().unwrap();
}

#[tokio::test]
async fn test_flush_mode_change_requires_no_pending_ops() {
    let cluster = single_tablet_cluster();
    let client = connect(&cluster).await;
    let table = open_test_table(&client).await;
    let session = client.new_session();
    session.set_flush_mode(FlushMode::ManualFlush).unwrap();
    // Re-setting the same mode with no pending work is fine.
    session.set_flush_mode(FlushMode::ManualFlush).unwrap();

    session.apply(insert_op(&table, "a", b"1")).await.unwrap();
    let err = session
        .set_flush_mode(FlushMode::AutoFlushBackground)
        .unwrap_err();
    assert!(matches!(err, TesseraError::InvalidArgument(_)));

    session.flush().await.unwrap();
    session
        .set_flush_mode(FlushMode::AutoFlushBackground)
        .unwrap();
    session.close().unwrap();
}

#[tokio::test]
async fn test_close_with_pending_ops_is_illegal_state() {
    let cluster = single_tablet_cluster();
    let client = connect(&cluster).await;
    let table = open_test_table(&client).await;
    let session = client.new_session();
    session.set_flush_mode(FlushMode::ManualFlush).unwrap();

    session.apply(insert_op(&table, "a", b"1")).await.unwrap();
    let err = session.close().unwrap_err();
    assert!(err.is_illegal_state());

    // The refused close leaves the session fully usable.
    session.apply(insert_op(&table, "b", b"2")).await.unwrap();
    session.flush().await.unwrap();
    session.close().unwrap();
    assert_eq!(cluster.tserver.row_count(&p1()), 2);
}

#[tokio::test]
async fn test_apply_after_close_fails() {
    let cluster = single_tablet_cluster();
    let client = connect(&cluster).await;
    let table = open_test_table(&client).await;
    let session = client.new_session();
    session.set_flush_mode(FlushMode::ManualFlush).unwrap();
    session.close().unwrap();

    let rejected = session
        .apply(insert_op(&table, "a", b"1"))
        .await
        .unwrap_err();
    assert!(rejected.error.is_illegal_state());
}

#[tokio::test]
async fn test_write_timeout_surfaces_timed_out() {
    let cluster = single_tablet_cluster();
    cluster.tserver.set_delay(Duration::from_millis(500));
    let client = connect(&cluster).await;
    let table = open_test_table(&client).await;
    let session = client.new_session();
    session.set_timeout_millis(50);

    let rejected = session
        .apply(insert_op(&table, "a", b"1"))
        .await
        .unwrap_err();
    assert!(rejected.error.is_timed_out());
}

#[tokio::test]
async fn test_stale_location_is_refreshed_and_retried_once() {
    let cluster = single_tablet_cluster();
    let client = connect(&cluster).await;
    let table = open_test_table(&client).await;

    // Prime the cache with the original location, then move the tablet.
    client
        .meta_cache()
        .lookup_tablet(table.table_id(), &encoded_key("a"))
        .await
        .unwrap();
    cluster.tserver.set_wrong_server(true);

    let new_addr = HostPort::new("127.0.0.1", 7151);
    let new_server = FakeTabletServer::new(new_addr.clone());
    new_server.host_tablet(&p1());
    cluster.messenger.add_tablet_server(Arc::clone(&new_server));
    cluster.master.set_tablet_addr("t", &p1(), new_addr);

    let session = client.new_session();
    session.apply(insert_op(&table, "a", b"1")).await.unwrap();

    assert_eq!(new_server.row_count(&p1()), 1);
    assert_eq!(
        cluster
            .tserver
            .write_count
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
    session.close().unwrap();
}

#[tokio::test]
async fn test_ordering_preserved_per_tablet() {
    let cluster = single_tablet_cluster();
    let client = connect(&cluster).await;
    let table = open_test_table(&client).await;
    let session = client.new_session();
    session.set_flush_mode(FlushMode::ManualFlush).unwrap();

    // An update of a row inserted earlier in the same flush only succeeds if
    // submission order is preserved.
    session.apply(insert_op(&table, "a", b"old")).await.unwrap();
    session.apply(update_op(&table, "a", b"new")).await.unwrap();
    session.flush().await.unwrap();

    let row = cluster.tserver.row(&p1(), &encoded_key("a")).unwrap();
    assert_eq!(row[1], Some(ColumnValue::Binary(b"new".to_vec())));
    session.close().unwrap();
}

#[tokio::test]
async fn test_apply_async_invokes_callback() {
    let cluster = single_tablet_cluster();
    let client = connect(&cluster).await;
    let table = open_test_table(&client).await;
    let session = client.new_session();

    let (tx, rx) = oneshot::channel();
    session.apply_async(insert_op(&table, "a", b"1"), move |result| {
        let _ = tx.send(result);
    });
    rx.await.unwrap().unwrap();
    assert_eq!(cluster.tserver.row_count(&p1()), 1);

    let (tx, rx) = oneshot::channel();
    session.apply_async(insert_op(&table, "a", b"1"), move |result| {
        let _ = tx.send(result);
    });
    let err = rx.await.unwrap().unwrap_err();
    assert!(err.is_already_present());
}

#[tokio::test]
async fn test_flush_async_invokes_callback() {
    let cluster = single_tablet_cluster();
    let client = connect(&cluster).await;
    let table = open_test_table(&client).await;
    let session = client.new_session();
    session.set_flush_mode(FlushMode::ManualFlush).unwrap();
    session.apply(insert_op(&table, "a", b"1")).await.unwrap();

    let (tx, rx) = oneshot::channel();
    session.flush_async(move |result| {
        let _ = tx.send(result);
    });
    rx.await.unwrap().unwrap();
    assert_eq!(cluster.tserver.row_count(&p1()), 1);
    session.close().unwrap();
}

#[tokio::test]
async fn test_open_unknown_table_is_not_found() {
    let cluster = single_tablet_cluster();
    let client = connect(&cluster).await;
    let err = client
        .open_table("no-such-table", test_schema())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_client_create_fails_on_bad_master_addr() {
    let cluster = single_tablet_cluster();
    let err = TesseraClient::create(
        TesseraClientOptions::new("not a host port"),
        Arc::clone(&cluster.messenger) as Arc<dyn Messenger>,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, TesseraError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_tablet_proxy_advanced_path() {
    let cluster = single_tablet_cluster();
    let client = connect(&cluster).await;
    let proxy = client.tablet_proxy(&p1()).await.unwrap();

    let mut req = tessera_commons::rpc::WriteRequest::new(p1(), test_schema());
    req.add_operation(
        tessera_commons::rpc::RowOperationType::Insert,
        vec![
            Some(ColumnValue::String("direct".into())),
            Some(ColumnValue::Binary(b"v".to_vec())),
        ],
    );
    let resp = proxy.write(req).await.unwrap();
    assert!(!resp.has_errors());
    assert_eq!(cluster.tserver.row_count(&p1()), 1);
}
