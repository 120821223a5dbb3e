//! Session behaviour against the in-memory transport.
//!
//! These tests need no Bluetooth hardware. Timing-sensitive tests run on a
//! paused clock so timeouts fire deterministically.

use std::sync::Arc;
use std::time::Duration;

use aranet4_core::uuids::{CURRENT_READING_FULL, HISTORY_COMMAND, HISTORY_DATA};
use aranet4_core::{
    ConnectionFailureReason, Error, HistoryOptions, HistoryRange, MockEvent, MockTransport,
    MockTransportBuilder, Sensor, Session, SessionConfig,
};
use aranet4_types::HistoryCommand;
use tokio_util::sync::CancellationToken;

async fn connected(builder: MockTransportBuilder) -> Session<MockTransport> {
    let session = Session::with_default_config(builder.build());
    session.connect().await.unwrap();
    session.transport().clear_events();
    session
}

fn unsubscribes(session: &Session<MockTransport>) -> usize {
    session
        .transport()
        .count_events(|e| matches!(e, MockEvent::Unsubscribe(_)))
}

fn is_not_connected(err: &Error) -> bool {
    matches!(
        err,
        Error::DeviceUnreachable {
            reason: ConnectionFailureReason::NotConnected
        }
    )
}

// --- Connection lifecycle ---

#[tokio::test]
async fn test_operations_before_connect_fail() {
    let session = Session::with_default_config(MockTransportBuilder::new().history_len(5).build());

    assert!(is_not_connected(&session.current_readings().await.unwrap_err()));
    assert!(is_not_connected(&session.current_readings_simple().await.unwrap_err()));
    assert!(is_not_connected(&session.status().await.unwrap_err()));
    assert!(is_not_connected(&session.history_info().await.unwrap_err()));
    assert!(is_not_connected(
        &session.history(&HistoryRange::all()).await.unwrap_err()
    ));
    assert!(session.transport().events().is_empty());
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let session = connected(MockTransportBuilder::new()).await;
    session.disconnect().await.unwrap();
    session.disconnect().await.unwrap();
    session.disconnect().await.unwrap();

    assert_eq!(
        session
            .transport()
            .count_events(|e| matches!(e, MockEvent::Disconnect)),
        1
    );
    assert!(is_not_connected(&session.status().await.unwrap_err()));
}

#[tokio::test]
async fn test_connect_failure_is_device_unreachable() {
    let session =
        Session::with_default_config(MockTransportBuilder::new().fail_connect(true).build());
    let err = session.connect().await.unwrap_err();
    assert!(matches!(
        err,
        Error::DeviceUnreachable {
            reason: ConnectionFailureReason::DeviceNotFound { .. }
        }
    ));
    assert!(err.is_retryable());
    assert!(session.identity().is_none());

    session.transport().set_fail_connect(false);
    session.connect().await.unwrap();
    assert!(session.identity().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout() {
    let config = SessionConfig::default().connect_timeout(Duration::from_secs(15));
    let session = Session::new(
        MockTransportBuilder::new()
            .latency(Duration::from_secs(60))
            .build(),
        config,
    );

    let err = session.connect().await.unwrap_err();
    assert!(
        matches!(
            err,
            Error::DeviceUnreachable {
                reason: ConnectionFailureReason::Timeout { .. }
            }
        ),
        "{err}"
    );
    assert!(!session.is_connected().await);
}

// --- Current readings ---

#[tokio::test]
async fn test_current_readings_full_layout() {
    let session = connected(
        MockTransportBuilder::new()
            .co2(511)
            .temperature_raw(506)
            .battery(90)
            .interval(300)
            .elapsed(120),
    )
    .await;

    let before = time::OffsetDateTime::now_utc();
    let current = session.current_readings().await.unwrap();

    assert_eq!(current.reading.co2(), Some(511.0));
    assert_eq!(current.reading.temperature(), Some(25.3));
    assert_eq!(current.battery, 90);
    assert_eq!(current.interval, Some(300));
    assert_eq!(current.elapsed, Some(120));
    assert!(current.reading.index.is_none());
    let after = time::OffsetDateTime::now_utc();
    let elapsed = time::Duration::seconds(120);
    assert!(current.reading.timestamp >= before - elapsed);
    assert!(current.reading.timestamp <= after - elapsed);
    assert_eq!(
        session.transport().events(),
        vec![MockEvent::Read(CURRENT_READING_FULL)]
    );
}

#[tokio::test]
async fn test_current_readings_simple_layout() {
    let session = connected(MockTransportBuilder::new().co2(900)).await;
    let current = session.current_readings_simple().await.unwrap();

    assert_eq!(current.reading.co2(), Some(900.0));
    assert_eq!(current.interval, None);
    assert_eq!(current.elapsed, None);
    assert_eq!(current.status, None);
}

#[tokio::test]
async fn test_legacy_firmware_rejects_full_reading_without_io() {
    let session = connected(MockTransportBuilder::new().software_revision("v0.3.2")).await;

    let err = session.current_readings().await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedFirmware { .. }), "{err}");
    assert!(session.transport().events().is_empty());

    assert!(session.current_readings_simple().await.is_ok());
    assert!(session.is_connected().await);
}

// --- History ---

#[tokio::test]
async fn test_history_all_sensors() {
    let session = connected(
        MockTransportBuilder::new()
            .history_len(45)
            .page_size(10)
            .interval(60)
            .elapsed(10),
    )
    .await;

    let readings = session.history(&HistoryRange::all()).await.unwrap();

    assert_eq!(readings.len(), 45);
    for (i, reading) in readings.iter().enumerate() {
        assert_eq!(reading.index, Some(i as u16 + 1));
        assert_eq!(reading.values.len(), 4);
    }
    for pair in readings.windows(2) {
        assert_eq!(
            (pair[1].timestamp - pair[0].timestamp).whole_seconds(),
            60
        );
    }

    // One subscription, one command per sensor.
    let events = session.transport().events();
    let commands: Vec<Sensor> = events
        .iter()
        .filter_map(|e| match e {
            MockEvent::Write(uuid, data) if *uuid == HISTORY_COMMAND => {
                HistoryCommand::decode(data).ok().map(|c| c.sensor)
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        commands,
        vec![
            Sensor::Co2,
            Sensor::Temperature,
            Sensor::Humidity,
            Sensor::Pressure
        ]
    );
    assert_eq!(
        session
            .transport()
            .count_events(|e| matches!(e, MockEvent::Subscribe(_))),
        1
    );
    assert_eq!(unsubscribes(&session), 1);
}

#[tokio::test]
async fn test_history_truncates_to_stored_count() {
    let session = connected(MockTransportBuilder::new().history_len(20)).await;

    let readings = session
        .history(&HistoryRange::new([Sensor::Humidity]).from_index(15).to_index(40))
        .await
        .unwrap();

    let indices: Vec<u16> = readings.iter().filter_map(|r| r.index).collect();
    assert_eq!(indices, vec![15, 16, 17, 18, 19, 20]);
}

#[tokio::test]
async fn test_history_start_past_stored_is_empty() {
    let session = connected(MockTransportBuilder::new().history_len(5)).await;

    let readings = session
        .history(&HistoryRange::all().from_index(6))
        .await
        .unwrap();

    assert!(readings.is_empty());
    assert_eq!(
        session
            .transport()
            .count_events(|e| matches!(e, MockEvent::Subscribe(_) | MockEvent::Write(..))),
        0
    );
}

#[tokio::test]
async fn test_invalid_requests_do_no_io() {
    let session = connected(MockTransportBuilder::new().history_len(5)).await;

    for range in [
        HistoryRange::new(Vec::<Sensor>::new()),
        HistoryRange::all().from_index(0),
        HistoryRange::all().from_index(4).to_index(3),
    ] {
        let err = session.history(&range).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)), "{err}");
    }
    assert!(session.transport().events().is_empty());
}

#[tokio::test]
async fn test_disconnect_mid_transfer_is_incomplete() {
    let session = connected(
        MockTransportBuilder::new()
            .history_len(100)
            .page_size(10)
            .disconnect_after_pages(3),
    )
    .await;

    let err = session
        .history(&HistoryRange::new([Sensor::Co2]))
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            Error::IncompleteHistory {
                sensor: Sensor::Co2,
                received: 30,
                expected: 100
            }
        ),
        "{err}"
    );
    assert_eq!(unsubscribes(&session), 1);
    assert!(!session.is_connected().await);
}

#[tokio::test]
async fn test_empty_page_is_incomplete() {
    let session = connected(
        MockTransportBuilder::new()
            .history_len(30)
            .page_size(10)
            .empty_page_after_pages(1),
    )
    .await;

    let err = session
        .history(&HistoryRange::new([Sensor::Pressure]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IncompleteHistory { received: 10, .. }), "{err}");
    assert_eq!(unsubscribes(&session), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_transfer_times_out() {
    let session = connected(
        MockTransportBuilder::new()
            .history_len(60)
            .page_size(10)
            .stall_after_pages(2),
    )
    .await;

    let err = session
        .history(&HistoryRange::new([Sensor::Temperature]))
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            Error::IncompleteHistory {
                received: 20,
                expected: 60,
                ..
            }
        ),
        "{err}"
    );
    assert_eq!(unsubscribes(&session), 1);
    // A silent device is not a lost link.
    assert!(session.is_connected().await);
}

#[tokio::test]
async fn test_command_write_failure_is_device_unreachable() {
    let session = connected(MockTransportBuilder::new().history_len(10).fail_writes(true)).await;

    let err = session
        .history(&HistoryRange::new([Sensor::Co2]))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DeviceUnreachable { .. }), "{err}");
    assert_eq!(
        session
            .transport()
            .count_events(|e| matches!(e, MockEvent::Write(..))),
        1
    );
    assert_eq!(unsubscribes(&session), 1);
}

#[tokio::test]
async fn test_cancellation_between_pages() {
    let session = connected(MockTransportBuilder::new().history_len(50).page_size(5)).await;
    let token = CancellationToken::new();
    let trigger = token.clone();
    let options = HistoryOptions::new()
        .with_progress(move |_| trigger.cancel())
        .with_cancellation(token);

    let err = session
        .history_with_options(&HistoryRange::new([Sensor::Co2]), options)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(unsubscribes(&session), 1);
    assert!(session.is_connected().await);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_while_waiting() {
    let session = connected(
        MockTransportBuilder::new()
            .history_len(50)
            .page_size(10)
            .stall_after_pages(1),
    )
    .await;
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let err = session
        .history_with_options(
            &HistoryRange::new([Sensor::Co2]),
            HistoryOptions::new().with_cancellation(token),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled), "{err}");
    assert_eq!(unsubscribes(&session), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_history_unsubscribes_before_next_operation() {
    let session = connected(
        MockTransportBuilder::new()
            .history_len(50)
            .page_size(10)
            .stall_after_pages(1)
            .latency(Duration::from_millis(100)),
    )
    .await;

    let range = HistoryRange::new([Sensor::Co2]);
    let (abandoned, current) = tokio::join!(
        tokio::time::timeout(Duration::from_secs(1), session.history(&range)),
        session.current_readings(),
    );
    assert!(abandoned.is_err());
    assert!(current.is_ok());

    let events = session.transport().events();
    let unsubscribe = events
        .iter()
        .position(|e| *e == MockEvent::Unsubscribe(HISTORY_DATA))
        .expect("cleanup unsubscribe recorded");
    let read = events
        .iter()
        .position(|e| *e == MockEvent::Read(CURRENT_READING_FULL))
        .expect("current reading recorded");
    assert!(unsubscribe < read, "{events:?}");
    assert_eq!(unsubscribes(&session), 1);
    assert!(session.is_connected().await);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_history_calls_do_not_interleave() {
    let session = Arc::new(
        connected(
            MockTransportBuilder::new()
                .history_len(30)
                .page_size(10)
                .latency(Duration::from_millis(50)),
        )
        .await,
    );

    let first = HistoryRange::new([Sensor::Co2]);
    let second = HistoryRange::new([Sensor::Humidity]);
    let (a, b) = tokio::join!(session.history(&first), session.history(&second));
    assert_eq!(a.unwrap().len(), 30);
    assert_eq!(b.unwrap().len(), 30);

    let traffic: Vec<MockEvent> = session
        .transport()
        .events()
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                MockEvent::Subscribe(_) | MockEvent::Write(..) | MockEvent::Unsubscribe(_)
            )
        })
        .collect();

    let command = |sensor| {
        MockEvent::Write(
            HISTORY_COMMAND,
            HistoryCommand {
                sensor,
                start: 1,
                end: 30,
            }
            .encode()
            .to_vec(),
        )
    };
    assert_eq!(
        traffic,
        vec![
            MockEvent::Subscribe(HISTORY_DATA),
            command(Sensor::Co2),
            MockEvent::Unsubscribe(HISTORY_DATA),
            MockEvent::Subscribe(HISTORY_DATA),
            command(Sensor::Humidity),
            MockEvent::Unsubscribe(HISTORY_DATA),
        ]
    );
}

#[tokio::test]
async fn test_history_info_and_status_agree() {
    let session = connected(
        MockTransportBuilder::new()
            .history_len(120)
            .interval(600)
            .elapsed(42)
            .battery(64),
    )
    .await;

    let info = session.history_info().await.unwrap();
    let status = session.status().await.unwrap();

    assert_eq!(info.stored_readings, 120);
    assert_eq!(status.stored_readings, info.stored_readings);
    assert_eq!(status.interval, 600);
    assert_eq!(status.elapsed, 42);
    assert_eq!(status.battery, 64);
}

#[tokio::test]
async fn test_session_config_from_toml() {
    let config = SessionConfig::from_toml_str(
        r#"
        notification_timeout_ms = 2500
        name_filter = "Aranet4 1A2B3"
        "#,
    )
    .unwrap();
    assert_eq!(config.notification_timeout, Duration::from_millis(2500));

    let session = Session::new(MockTransportBuilder::new().build(), config);
    session.connect().await.unwrap();
    assert_eq!(session.config().name_filter, "Aranet4 1A2B3");
}
