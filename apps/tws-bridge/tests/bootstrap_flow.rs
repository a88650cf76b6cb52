//! End-to-end bootstrap against a fake terminal on a local socket.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeTerminal, Reply, SERVER_VERSION};
use tws_bridge::{
    BootstrapError, BootstrapSettings, Bootstrapper, ConnectionState, RequestOutcome,
    SessionError, TerminalSession, TwsClient, TwsClientConfig,
};

fn client_for(terminal: &FakeTerminal) -> Arc<TwsClient> {
    Arc::new(TwsClient::new(TwsClientConfig::new(
        "127.0.0.1",
        terminal.addr.port(),
        999,
    )))
}

#[tokio::test]
async fn bootstrap_issues_request_and_counts_bars() {
    let mut terminal = FakeTerminal::spawn(Reply::Bars(10)).await;
    let client = client_for(&terminal);
    let bootstrapper = Bootstrapper::new(client.clone(), BootstrapSettings::default());

    let outcome = tokio::time::timeout(Duration::from_secs(5), bootstrapper.initialize())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        outcome,
        RequestOutcome::Issued {
            request_id: 1,
            bars: 10
        }
    );

    let start_api = terminal.next_message().await;
    assert_eq!(start_api, vec!["71", "2", "999", ""]);

    let request = terminal.next_message().await;
    assert_eq!(
        request,
        vec![
            "20",
            "1",
            "0",
            "SPY",
            "STK",
            "",
            "0",
            "",
            "",
            "SMART",
            "ARCA",
            "USD",
            "",
            "",
            "0",
            "20240519 23:59:59 US/Eastern",
            "1 day",
            "10 D",
            "1",
            "TRADES",
            "1",
            "0",
            "",
        ]
    );

    let snapshot = client.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Connected);
    assert_eq!(snapshot.server_version, SERVER_VERSION);
    assert_eq!(snapshot.next_valid_id, Some(1));
    assert_eq!(snapshot.managed_accounts, vec!["DU123456".to_string()]);
    assert_eq!(snapshot.bars_received, 10);
    assert_eq!(snapshot.connection_time.as_deref(), Some("20240520 09:30:00 EST"));

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn terminal_error_yields_rejected() {
    let terminal = FakeTerminal::spawn(Reply::Error {
        code: 162,
        message: "Historical Market Data Service error message:HMDS query returned no data"
            .to_string(),
    })
    .await;
    let client = client_for(&terminal);
    let bootstrapper = Bootstrapper::new(client.clone(), BootstrapSettings::default());

    let outcome = tokio::time::timeout(Duration::from_secs(5), bootstrapper.initialize())
        .await
        .unwrap()
        .unwrap();

    match outcome {
        RequestOutcome::Rejected {
            request_id, code, ..
        } => {
            assert_eq!(request_id, 1);
            assert_eq!(code, 162);
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    // any terminal error closes the session
    let mut state = client.watch_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Disconnected),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn silent_terminal_yields_no_answer() {
    let mut terminal = FakeTerminal::spawn(Reply::Silent).await;
    let client = client_for(&terminal);
    let settings = BootstrapSettings {
        response_timeout: Duration::from_millis(300),
        ..BootstrapSettings::default()
    };
    let bootstrapper = Bootstrapper::new(client.clone(), settings);

    let outcome = tokio::time::timeout(Duration::from_secs(5), bootstrapper.initialize())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        outcome,
        RequestOutcome::NoAnswer {
            request_id: 1,
            bars: 0
        }
    );

    // the request did reach the terminal
    let _start_api = terminal.next_message().await;
    let request = terminal.next_message().await;
    assert_eq!(request[0], "20");

    assert_eq!(client.state(), ConnectionState::Connected);
    client.disconnect().await;
}

#[tokio::test]
async fn terminal_dropping_connection_yields_not_connected() {
    let terminal = FakeTerminal::spawn(Reply::Silent).await;
    let client = client_for(&terminal);
    let bootstrapper = Bootstrapper::new(client.clone(), BootstrapSettings::default());

    let run = tokio::spawn(async move { bootstrapper.initialize().await });

    // wait until the request went out, then kill the terminal
    let mut state = client.watch_state();
    state
        .wait_for(|s| *s == ConnectionState::Connected)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(terminal);

    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, RequestOutcome::NotConnected);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn unreachable_terminal_is_a_connect_error() {
    // bind and release a port so nothing listens on it
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = Arc::new(TwsClient::new(TwsClientConfig::new("127.0.0.1", port, 999)));
    let bootstrapper = Bootstrapper::new(client.clone(), BootstrapSettings::default());

    let result = bootstrapper.initialize().await;
    assert!(matches!(
        result,
        Err(BootstrapError::Connect(SessionError::ConnectFailed { .. }))
    ));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
