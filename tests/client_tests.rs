//! Integration tests for `QuizClient`.
//!
//! Each test plays the server through `tests/common`: it accepts the
//! client's connections, pushes frames, and checks what the client sent
//! and which events it raised.

mod common;

use std::time::Duration;

use quiz_live_client::{
    ConnectionStatus, ErrorCode, Outcome, QuizClient, QuizClientConfig, QuizClientError,
    QuizEvent, QuizPhase, RoomStatus, SessionRole, SkipReason,
};

use common::{
    leaderboard, new_question, next_event, quiz_ended, quiz_started, server_error, test_config,
    test_connector, user_joined, user_left, users_in_room, wait_for, ConnectorProbe, ServerConn,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

/// Connect and wait for the first connection to open.
async fn connected_client(
    config: QuizClientConfig,
) -> (
    QuizClient,
    tokio::sync::mpsc::Receiver<QuizEvent>,
    ConnectorProbe,
    ServerConn,
) {
    let (connector, mut probe) = test_connector();
    let (mut client, mut events) = QuizClient::new(connector, config);
    client.connect("secret-token").await.expect("connect");
    let conn = probe.next_connection().await;
    assert_eq!(next_event(&mut events).await, QuizEvent::Connected);
    (client, events, probe, conn)
}

/// Connect, join `quiz-42` with `role`, and complete the join with a roster.
async fn joined_client(
    role: SessionRole,
) -> (
    QuizClient,
    tokio::sync::mpsc::Receiver<QuizEvent>,
    ConnectorProbe,
    ServerConn,
) {
    let (client, mut events, probe, conn) = connected_client(test_config()).await;
    assert_eq!(client.join_room("quiz-42", role).await.unwrap(), Outcome::Sent);
    conn.wait_for_sent(1).await;
    conn.push(users_in_room(&[("u1", "Ann"), ("t1", "Instructor")]));
    let event = next_event(&mut events).await;
    assert!(
        matches!(event, QuizEvent::RoomJoined { ref quiz_id, .. } if quiz_id == "quiz-42"),
        "expected RoomJoined, got {event:?}"
    );
    (client, events, probe, conn)
}

// ════════════════════════════════════════════════════════════════════
// Connection lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn connect_attaches_token_to_url() {
    let (mut client, _events, _probe, conn) = connected_client(test_config()).await;
    assert_eq!(conn.url, "ws://quiz.test/ws?token=secret-token");
    assert!(client.is_connected());
    assert_eq!(client.status(), ConnectionStatus::Open);
    client.disconnect().await;
}

#[tokio::test]
async fn repeated_connect_opens_one_socket() {
    let (connector, mut probe) = test_connector();
    let (mut client, mut events) = QuizClient::new(connector, test_config());

    client.connect("secret-token").await.unwrap();
    client.connect("secret-token").await.unwrap();
    let _conn = probe.next_connection().await;
    assert_eq!(next_event(&mut events).await, QuizEvent::Connected);
    client.connect("secret-token").await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(probe.calls(), 1);
    client.disconnect().await;
}

#[tokio::test]
async fn missing_token_is_fatal_and_not_retried() {
    let (connector, probe) = test_connector();
    let (mut client, mut events) = QuizClient::new(connector, test_config());

    let err = tokio_test::assert_err!(client.connect("").await);
    assert!(matches!(err, QuizClientError::MissingCredential));
    assert!(matches!(
        next_event(&mut events).await,
        QuizEvent::ConnectionError { .. }
    ));
    assert_eq!(
        client.connection_error().await.as_deref(),
        Some("missing authentication token")
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(probe.calls(), 0);
    assert!(!client.is_connecting());
}

#[tokio::test]
async fn shutdown_closes_and_delivers_final_event() {
    let (client, mut events, _probe, conn) = connected_client(test_config()).await;
    client.shutdown().await;

    let event = wait_for(&mut events, |e| matches!(e, QuizEvent::Disconnected { .. })).await;
    assert_eq!(
        event,
        QuizEvent::Disconnected {
            reason: Some("client disconnected".into())
        }
    );
    assert!(conn.closed.load(std::sync::atomic::Ordering::Acquire));
}

#[tokio::test]
async fn invalid_server_url_is_rejected() {
    let (connector, probe) = test_connector();
    let config = QuizClientConfig::new("definitely not a url", "u1");
    let (mut client, _events) = QuizClient::new(connector, config);

    let err = client.connect("secret-token").await.unwrap_err();
    assert!(matches!(err, QuizClientError::InvalidUrl { .. }));
    assert_eq!(probe.calls(), 0);
}

#[tokio::test]
async fn reconnect_budget_is_bounded() {
    let (connector, probe) = test_connector();
    probe.refuse_all();
    let config = test_config().with_max_reconnect_attempts(2);
    let (mut client, mut events) = QuizClient::new(connector, config);
    client.connect("secret-token").await.unwrap();

    let mut attempts_seen = Vec::new();
    let abandoned = loop {
        match next_event(&mut events).await {
            QuizEvent::ConnectionError { .. } => {}
            QuizEvent::Reconnecting {
                attempt,
                max_attempts,
                delay,
            } => {
                assert_eq!(max_attempts, 2);
                assert_eq!(delay, Duration::from_millis(10));
                attempts_seen.push(attempt);
            }
            QuizEvent::ReconnectAbandoned { attempts } => break attempts,
            other => panic!("unexpected event {other:?}"),
        }
    };
    assert_eq!(abandoned, 2);
    assert_eq!(attempts_seen, [1, 2]);
    assert!(matches!(
        next_event(&mut events).await,
        QuizEvent::Disconnected { reason: Some(_) }
    ));

    // One initial attempt plus exactly two reconnects.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(probe.calls(), 3);
    assert_eq!(client.status(), ConnectionStatus::Closed);
    assert_eq!(client.attempts_remaining(), 0);
    assert!(client.connection_error().await.is_some());
}

#[tokio::test]
async fn reconnect_counter_resets_on_open() {
    let (mut client, mut events, mut probe, conn) = connected_client(test_config()).await;

    probe.refuse_next(2);
    conn.drop_abnormally();
    let event = wait_for(&mut events, |e| matches!(e, QuizEvent::Connected)).await;
    assert_eq!(event, QuizEvent::Connected);
    assert_eq!(probe.calls(), 4);
    assert_eq!(client.reconnect_attempts(), 0);
    assert_eq!(client.attempts_remaining(), 5);

    // A second loss starts counting from one again.
    let conn = probe.next_connection().await;
    conn.drop_abnormally();
    let event = wait_for(&mut events, |e| matches!(e, QuizEvent::Reconnecting { .. })).await;
    assert!(matches!(event, QuizEvent::Reconnecting { attempt: 1, .. }));

    client.disconnect().await;
}

#[tokio::test]
async fn clean_server_close_is_final() {
    let (client, mut events, probe, conn) = connected_client(test_config()).await;
    conn.close_cleanly();

    assert_eq!(
        next_event(&mut events).await,
        QuizEvent::Disconnected { reason: None }
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(probe.calls(), 1);
    assert_eq!(client.status(), ConnectionStatus::Closed);
}

#[tokio::test]
async fn connect_after_disconnect_opens_new_socket() {
    let (mut client, mut events, mut probe, conn) = connected_client(test_config()).await;

    client.disconnect().await;
    assert!(conn.closed.load(std::sync::atomic::Ordering::Acquire));
    assert!(matches!(
        next_event(&mut events).await,
        QuizEvent::Disconnected { .. }
    ));
    assert_eq!(client.status(), ConnectionStatus::Closed);

    client.connect("secret-token").await.unwrap();
    let _conn = probe.next_connection().await;
    assert_eq!(next_event(&mut events).await, QuizEvent::Connected);
    assert_eq!(probe.calls(), 2);

    client.disconnect().await;
}

// ════════════════════════════════════════════════════════════════════
// Room and reconnect interplay
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn connection_loss_resets_session_and_rejoins() {
    let config = test_config().with_reconnect_delay(Duration::from_millis(200));
    let (connector, mut probe) = test_connector();
    let (mut client, mut events) = QuizClient::new(connector, config);
    client.connect("secret-token").await.unwrap();
    let conn = probe.next_connection().await;
    assert_eq!(next_event(&mut events).await, QuizEvent::Connected);

    client
        .join_room("quiz-42", SessionRole::Participant)
        .await
        .unwrap();
    conn.wait_for_sent(1).await;
    conn.push(users_in_room(&[("u1", "Ann")]));
    conn.push(quiz_started("a1"));
    conn.push(new_question("q1", 4));
    wait_for(&mut events, |e| matches!(e, QuizEvent::QuestionChanged { .. })).await;

    conn.drop_abnormally();
    assert!(matches!(
        next_event(&mut events).await,
        QuizEvent::ConnectionLost { .. }
    ));
    assert_eq!(client.room_status().await, RoomStatus::NotJoined);
    assert!(client.participants().await.is_empty());
    assert!(client.active_question().await.is_none());
    assert!(client.is_connecting());

    // Messages are not buffered while reconnecting.
    let err = client
        .join_room("quiz-7", SessionRole::Participant)
        .await
        .unwrap_err();
    assert!(matches!(err, QuizClientError::NotConnected));

    let conn = probe.next_connection().await;
    wait_for(&mut events, |e| matches!(e, QuizEvent::Connected)).await;
    let sent = conn.wait_for_sent(1).await;
    assert_eq!(sent[0]["type"], "JOIN_ROOM");
    assert_eq!(sent[0]["payload"]["quizId"], "quiz-42");
    assert_eq!(client.room_status().await, RoomStatus::Joining);

    conn.push(users_in_room(&[("u1", "Ann")]));
    assert!(matches!(
        next_event(&mut events).await,
        QuizEvent::RoomJoined { .. }
    ));

    client.disconnect().await;
}

#[tokio::test]
async fn rejoin_can_be_disabled() {
    let config = test_config().with_rejoin_on_reconnect(false);
    let (mut client, mut events, mut probe, conn) = connected_client(config).await;
    client
        .join_room("quiz-42", SessionRole::Participant)
        .await
        .unwrap();
    conn.wait_for_sent(1).await;

    conn.drop_abnormally();
    let conn = probe.next_connection().await;
    wait_for(&mut events, |e| matches!(e, QuizEvent::Connected)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(conn.sent_messages().is_empty());
    assert_eq!(client.room_status().await, RoomStatus::NotJoined);

    client.disconnect().await;
}

#[tokio::test]
async fn join_while_disconnected_is_dropped() {
    let (connector, _probe) = test_connector();
    let (client, mut events) = QuizClient::new(connector, test_config());

    let err = client
        .join_room("quiz-42", SessionRole::Participant)
        .await
        .unwrap_err();
    assert!(matches!(err, QuizClientError::NotConnected));
    assert_eq!(
        next_event(&mut events).await,
        QuizEvent::MessageDropped { kind: "JOIN_ROOM" }
    );
    assert_eq!(client.room_status().await, RoomStatus::NotJoined);
}

#[tokio::test]
async fn roster_converges_through_deltas() {
    let (mut client, mut events, _probe, conn) = joined_client(SessionRole::Participant).await;

    conn.push(user_joined("u2", "Bea"));
    conn.push(user_joined("u3", "Cal"));
    conn.push(user_left("t1"));
    conn.push(user_joined("u2", "Bea Renamed"));
    conn.push(user_left("u3"));
    conn.push(user_left("nobody"));
    conn.push(user_joined("u4", "Dee"));
    wait_for(&mut events, |e| {
        matches!(e, QuizEvent::ParticipantJoined { participant } if participant.id == "u4")
    })
    .await;

    let roster = client.participants().await;
    let ids: Vec<&str> = roster.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["u1", "u2", "u4"]);
    assert_eq!(roster[1].name, "Bea Renamed");

    client.disconnect().await;
}

// ════════════════════════════════════════════════════════════════════
// Quiz flow
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn participant_answers_each_question_once() {
    let (mut client, mut events, _probe, conn) = joined_client(SessionRole::Participant).await;

    conn.push(quiz_started("a1"));
    assert_eq!(
        next_event(&mut events).await,
        QuizEvent::QuizStarted {
            attempt_id: "a1".into()
        }
    );

    conn.push(new_question("q1", 4));
    let QuizEvent::QuestionChanged { question } = next_event(&mut events).await else {
        panic!("expected QuestionChanged");
    };
    assert_eq!(question.id, "q1");
    assert_eq!(question.time_limit(), Duration::from_secs(60));

    assert_eq!(client.select_answer(2).await.unwrap(), Outcome::Sent);
    assert_eq!(
        client.select_answer(1).await.unwrap(),
        Outcome::Skipped(SkipReason::AlreadyAnswered)
    );
    assert_eq!(
        client.time_out().await.unwrap(),
        Outcome::Skipped(SkipReason::AlreadyAnswered)
    );
    assert!(client.has_answered().await);

    let sent = conn.wait_for_sent(2).await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1]["type"], "ANSWER");
    assert_eq!(
        sent[1]["payload"],
        serde_json::json!({
            "quizId": "quiz-42",
            "attemptId": "a1",
            "userId": "u1",
            "questionId": "q1",
            "answer": 2
        })
    );

    conn.push(new_question("q2", 3));
    wait_for(&mut events, |e| matches!(e, QuizEvent::QuestionChanged { .. })).await;
    assert!(!client.has_answered().await);
    assert_eq!(client.time_out().await.unwrap(), Outcome::Sent);

    let sent = conn.wait_for_sent(3).await;
    assert_eq!(sent[2]["type"], "timeout");
    assert_eq!(sent[2]["payload"]["questionId"], "q2");

    conn.push(leaderboard(&[("t9", 20), ("u1", 5)], Some((5, 2))));
    wait_for(&mut events, |e| {
        matches!(e, QuizEvent::LeaderboardUpdated { .. })
    })
    .await;
    assert_eq!(client.rank().await, Some(2));
    assert_eq!(client.total_score().await, 5);
    let standings = client.standings(10).await;
    assert_eq!(standings[0].name, "Unknown User");
    assert_eq!(standings[1].name, "Ann");

    conn.push(quiz_ended());
    assert_eq!(next_event(&mut events).await, QuizEvent::QuizEnded);
    let phase = client
        .with_session(|s| s.question_cycle().phase())
        .await;
    assert_eq!(phase, QuizPhase::Completed);

    // Questions after the end are ignored.
    conn.push(new_question("q3", 4));
    conn.push(server_error("late", None));
    assert!(matches!(
        next_event(&mut events).await,
        QuizEvent::ServerError { .. }
    ));
    assert!(client.active_question().await.is_none());

    client.disconnect().await;
}

#[tokio::test]
async fn answer_before_question_is_skipped() {
    let (mut client, _events, _probe, conn) = joined_client(SessionRole::Participant).await;
    assert_eq!(
        client.select_answer(0).await.unwrap(),
        Outcome::Skipped(SkipReason::NoActiveQuestion)
    );
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(conn.sent_messages().len(), 1);
    client.disconnect().await;
}

#[tokio::test]
async fn host_controls_the_quiz() {
    let (mut client, _events, _probe, conn) = joined_client(SessionRole::Host).await;

    assert_eq!(client.start_quiz().await.unwrap(), Outcome::Sent);
    assert_eq!(client.next_question().await.unwrap(), Outcome::Sent);
    assert_eq!(client.end_quiz().await.unwrap(), Outcome::Sent);

    let sent = conn.wait_for_sent(4).await;
    let kinds: Vec<&str> = sent.iter().map(|m| m["type"].as_str().unwrap()).collect();
    assert_eq!(kinds, ["JOIN_ROOM", "START_QUIZ", "NEXT_QUESTION", "END_QUIZ"]);
    assert_eq!(sent[0]["payload"]["isHost"], true);
    assert_eq!(sent[1]["payload"], serde_json::json!({ "quizId": "quiz-42" }));

    client.disconnect().await;
}

#[tokio::test]
async fn participants_cannot_use_host_controls() {
    let (mut client, _events, _probe, conn) = joined_client(SessionRole::Participant).await;
    assert_eq!(
        client.start_quiz().await.unwrap(),
        Outcome::Skipped(SkipReason::NotHost)
    );
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(conn.sent_messages().len(), 1);
    client.disconnect().await;
}

#[tokio::test]
async fn server_errors_and_bad_frames() {
    let (mut client, mut events, _probe, conn) = connected_client(test_config()).await;

    conn.push_raw("{ not json");
    conn.push_raw(r#"{"type":"SOMETHING_NEW","payload":{}}"#);
    conn.push_raw(r#"{"type":"USER_LEFT","payload":{"userId":42}}"#);
    conn.push(server_error("Quiz not found", Some("QUIZ_NOT_FOUND")));

    assert_eq!(
        next_event(&mut events).await,
        QuizEvent::ServerError {
            message: "Quiz not found".into(),
            code: Some(ErrorCode::QuizNotFound),
        }
    );
    assert!(client.is_connected());
    client.disconnect().await;
}
