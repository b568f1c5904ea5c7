//! End-to-end tests for the daemon client against a scripted fake daemon.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{FakeDaemon, WAIT, fast_config, wait_for};
use dbxbridge::{Args, DaemonClient, FileStatus, FolderTag};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[tokio::test]
async fn test_command_ok_reply() {
    let daemon = FakeDaemon::bind();
    let mut client = DaemonClient::new(daemon.config());
    client.start().unwrap();

    let mut peer = daemon.accept_command().await;
    let _events = daemon.accept_events().await;

    let (tx, rx) = oneshot::channel();
    let mut args = Args::new();
    args.insert("verb".into(), vec!["share".into()]);
    args.insert("paths".into(), vec!["/d/a b".into(), "/d/tab\there".into()]);
    client.send_with_args("icon_overlay_context_action", args, move |reply| {
        let _ = tx.send(reply);
    });

    let request = peer.read_request().await;
    assert_eq!(
        request,
        vec![
            "icon_overlay_context_action",
            "paths\t/d/a b\t/d/tab\\there",
            "verb\tshare",
            "done"
        ]
    );
    peer.reply("ok\nresult\tdone\\tdeal\ndone\n").await;

    let reply = tokio::time::timeout(WAIT, rx).await.unwrap().unwrap().unwrap();
    assert_eq!(reply["result"], vec!["done\tdeal"]);

    client.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_daemon_fails_command_once() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut client = DaemonClient::new(fast_config(dir.path()));

    let calls = counter();
    let calls_clone = Arc::clone(&calls);
    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    client.send_with_args("ping", Args::new(), move |reply| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = tx.lock().take() {
            let _ = tx.send(reply);
        }
    });

    let attempts = Arc::new(Mutex::new(Vec::new()));
    let attempts_clone = Arc::clone(&attempts);
    client.on_connection_attempt(move |n| attempts_clone.lock().push(n));
    client.start().unwrap();

    let reply = tokio::time::timeout(WAIT, rx).await.unwrap().unwrap();
    assert!(reply.is_none());
    assert!(wait_for(|| attempts.lock().len() >= 3).await);
    assert_eq!(attempts.lock()[..3], [1, 2, 3]);
    assert!(!client.is_connected());

    client.shutdown().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_refused_command_completes_with_none() {
    let daemon = FakeDaemon::bind();
    let mut client = DaemonClient::new(daemon.config());
    client.start().unwrap();
    let mut peer = daemon.accept_command().await;
    let _events = daemon.accept_events().await;

    let (tx, rx) = oneshot::channel();
    client.send_with_args("bogus", Args::new(), move |reply| {
        let _ = tx.send(reply);
    });
    peer.read_request().await;
    peer.reply("notok\nmessage\tunknown command\ndone\n").await;
    assert_eq!(tokio::time::timeout(WAIT, rx).await.unwrap().unwrap(), None);

    // the connection survives a refusal
    let (tx, rx) = oneshot::channel();
    client.send_with_args("ping", Args::new(), move |reply| {
        let _ = tx.send(reply);
    });
    assert_eq!(peer.read_request().await, vec!["ping", "done"]);
    peer.reply("ok\ndone\n").await;
    assert_eq!(
        tokio::time::timeout(WAIT, rx).await.unwrap().unwrap(),
        Some(Args::new())
    );

    client.shutdown().await;
}

#[tokio::test]
async fn test_oversized_reply_fails_command_and_reconnects() {
    let daemon = FakeDaemon::bind();
    let mut client = DaemonClient::new(daemon.config());
    client.start().unwrap();
    let mut peer = daemon.accept_command().await;
    let _events = daemon.accept_events().await;

    let (tx, rx) = oneshot::channel();
    client.send_with_args("flood", Args::new(), move |reply| {
        let _ = tx.send(reply);
    });
    peer.read_request().await;
    let mut reply = String::from("ok\n");
    for n in 0..25 {
        reply.push_str(&format!("k{}\tv\n", n));
    }
    reply.push_str("done\n");
    peer.reply(&reply).await;

    assert_eq!(tokio::time::timeout(WAIT, rx).await.unwrap().unwrap(), None);
    assert!(peer.closed_by_client().await);
    let _second = daemon.accept_command().await;

    client.shutdown().await;
}

#[tokio::test]
async fn test_event_split_across_reads_dispatched_once() {
    let daemon = FakeDaemon::bind();
    let mut client = DaemonClient::new(daemon.config());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    client
        .register_handler("status", move |args| seen_clone.lock().push(args.clone()))
        .unwrap();
    client.start().unwrap();

    let _peer = daemon.accept_command().await;
    let mut events = daemon.accept_events().await;

    let bytes = b"status\nstatus\tfoo\tbar\ndone\n";
    for split in [1, 9, 17, bytes.len() - 1] {
        let before = seen.lock().len();
        events.write_all(&bytes[..split]).await.unwrap();
        events.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        events.write_all(&bytes[split..]).await.unwrap();
        assert!(wait_for(|| seen.lock().len() == before + 1).await, "split at {}", split);
    }

    for args in seen.lock().iter() {
        assert_eq!(args["status"], vec!["foo", "bar"]);
        assert_eq!(args.len(), 1);
    }

    client.shutdown().await;
}

#[tokio::test]
async fn test_unified_connect_and_synchronized_disconnect() {
    let daemon = FakeDaemon::bind();
    let mut client = DaemonClient::new(daemon.config());

    let ups = counter();
    let downs = counter();
    let ups_clone = Arc::clone(&ups);
    let downs_clone = Arc::clone(&downs);
    client.on_connect(move || {
        ups_clone.fetch_add(1, Ordering::SeqCst);
    });
    client.on_disconnect(move || {
        downs_clone.fetch_add(1, Ordering::SeqCst);
    });
    client.start().unwrap();

    let peer = daemon.accept_command().await;
    let mut events = daemon.accept_events().await;
    assert!(wait_for(|| ups.load(Ordering::SeqCst) == 1).await);
    assert!(client.is_connected());
    assert_eq!(downs.load(Ordering::SeqCst), 0);

    // daemon drops only the command socket
    drop(peer);

    // the client tears down its event connection too
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(WAIT, events.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
    assert!(wait_for(|| downs.load(Ordering::SeqCst) == 1).await);

    // both sides come back and the unified connect fires again
    let _peer = daemon.accept_command().await;
    let _events = daemon.accept_events().await;
    assert!(wait_for(|| ups.load(Ordering::SeqCst) == 2).await);
    assert!(wait_for(|| client.is_connected()).await);
    assert_eq!(downs.load(Ordering::SeqCst), 1);

    client.shutdown().await;
}

#[tokio::test]
async fn test_force_reconnect_cycles_both_channels() {
    let daemon = FakeDaemon::bind();
    let mut client = DaemonClient::new(daemon.config());
    let ups = counter();
    let ups_clone = Arc::clone(&ups);
    client.on_connect(move || {
        ups_clone.fetch_add(1, Ordering::SeqCst);
    });
    client.start().unwrap();

    let mut peer = daemon.accept_command().await;
    let _events = daemon.accept_events().await;
    assert!(wait_for(|| client.is_connected()).await);

    assert!(client.force_reconnect());
    assert!(peer.closed_by_client().await);

    let _peer = daemon.accept_command().await;
    let _events = daemon.accept_events().await;
    assert!(wait_for(|| ups.load(Ordering::SeqCst) >= 2).await);

    client.shutdown().await;
}

#[tokio::test]
async fn test_force_reconnect_while_disconnected_is_noop() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut client = DaemonClient::new(fast_config(dir.path()));
    let signals = counter();
    let a = Arc::clone(&signals);
    let b = Arc::clone(&signals);
    client.on_connect(move || {
        a.fetch_add(1, Ordering::SeqCst);
    });
    client.on_disconnect(move || {
        b.fetch_add(1, Ordering::SeqCst);
    });
    client.start().unwrap();

    assert!(!client.force_reconnect());
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(signals.load(Ordering::SeqCst), 0);

    client.shutdown().await;
}

#[tokio::test]
async fn test_file_info_for_folder() {
    let daemon = FakeDaemon::bind();
    let mut client = DaemonClient::new(daemon.config());
    client.start().unwrap();
    let mut peer = daemon.accept_command().await;
    let _events = daemon.accept_events().await;

    let (tx, rx) = oneshot::channel();
    client.request_file_info("/d/Public", true, move |info| {
        let _ = tx.send(info);
    });

    assert_eq!(
        peer.read_request().await,
        vec!["get_emblems", "path\t/d/Public", "done"]
    );
    peer.reply("notok\ndone\n").await;
    assert_eq!(peer.read_request().await[0], "icon_overlay_file_status");
    peer.reply("ok\nstatus\tup to date\ndone\n").await;
    assert_eq!(peer.read_request().await[0], "get_folder_tag");
    peer.reply("ok\ntag\tpublic\ndone\n").await;

    let info = tokio::time::timeout(WAIT, rx).await.unwrap().unwrap();
    assert_eq!(info.status(), Some(FileStatus::UpToDate));
    assert_eq!(info.tag(), Some(FolderTag::Public));
    assert_eq!(
        info.emblem_names(),
        Some(vec!["web".to_string(), "dropbox-uptodate".to_string()])
    );

    client.shutdown().await;
}

#[tokio::test]
async fn test_cancelled_file_info_is_not_delivered() {
    let daemon = FakeDaemon::bind();
    let mut client = DaemonClient::new(daemon.config());
    client.start().unwrap();
    let mut peer = daemon.accept_command().await;
    let _events = daemon.accept_events().await;

    let delivered = counter();
    let delivered_clone = Arc::clone(&delivered);
    let handle = client.request_file_info("/d/a.txt", false, move |_| {
        delivered_clone.fetch_add(1, Ordering::SeqCst);
    });
    handle.cancel();

    // the transaction still runs to completion
    assert_eq!(peer.read_request().await[0], "get_emblems");
    peer.reply("ok\nemblems\tdropbox-syncing\ndone\n").await;

    let (tx, rx) = oneshot::channel();
    client.send_with_args("ping", Args::new(), move |reply| {
        let _ = tx.send(reply);
    });
    assert_eq!(peer.read_request().await[0], "ping");
    peer.reply("ok\ndone\n").await;
    tokio::time::timeout(WAIT, rx).await.unwrap().unwrap();

    // completions run in order, so the cancelled one would have run by now
    assert_eq!(delivered.load(Ordering::SeqCst), 0);

    client.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_fails_queued_commands() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = fast_config(dir.path());
    config.command.retry_delay_ms = 60_000;
    let mut client = DaemonClient::new(config);
    client.start().unwrap();

    // wait until the first attempt has failed and the worker is sleeping
    let attempts = counter();
    let attempts_clone = Arc::clone(&attempts);
    client.on_connection_attempt(move |_| {
        attempts_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert!(wait_for(|| attempts.load(Ordering::SeqCst) >= 1).await);

    let (tx, rx) = oneshot::channel();
    client.send_with_args("ping", Args::new(), move |reply| {
        let _ = tx.send(reply);
    });
    client.shutdown().await;

    assert_eq!(tokio::time::timeout(WAIT, rx).await.unwrap().unwrap(), None);
}
