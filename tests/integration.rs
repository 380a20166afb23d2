//! Integration tests for tcpeventstore.
//!
//! Each test runs a fake server on a local TCP listener and drives a real
//! `Connection` against it.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use tcpeventstore::codec::ProtobufCodec;
use tcpeventstore::messages::{
    EventRecord, OperationResult, ReadStreamEvents, ReadStreamEventsCompleted, ResolvedEvent,
    StreamEventAppeared, SubscribeToStream, SubscriptionConfirmation, SubscriptionDropped,
    WriteEvents, WriteEventsCompleted,
};
use tcpeventstore::protocol::{Frame, FrameBuffer, TcpCommand};
use tcpeventstore::{
    ClientBuilder, Connection, ConnectionState, CorrelationId, EventData, EventStoreError,
    ExpectedVersion, Reply,
};

const WAIT: Duration = Duration::from_secs(5);

/// Minimal server side of the protocol.
struct FakeServer {
    listener: TcpListener,
}

impl FakeServer {
    async fn start() -> Self {
        Self {
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    fn client(&self) -> Connection {
        ClientBuilder::new("127.0.0.1", self.port())
            .reconnect_delay(Duration::from_millis(50))
            .build()
    }

    async fn accept(&self) -> ServerSide {
        let (stream, _) = tokio::time::timeout(WAIT, self.listener.accept())
            .await
            .unwrap()
            .unwrap();
        ServerSide {
            stream,
            buffer: FrameBuffer::new(),
            pending: VecDeque::new(),
        }
    }
}

struct ServerSide {
    stream: TcpStream,
    buffer: FrameBuffer,
    pending: VecDeque<Frame>,
}

impl ServerSide {
    async fn recv(&mut self) -> Frame {
        let mut buf = [0u8; 4096];
        while self.pending.is_empty() {
            let n = tokio::time::timeout(WAIT, self.stream.read(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert!(n > 0, "client closed the connection");
            self.pending.extend(self.buffer.push(&buf[..n]).unwrap());
        }
        self.pending.pop_front().unwrap()
    }

    async fn reply(&mut self, command: TcpCommand, id: CorrelationId, payload: Bytes) {
        let wire = Frame::new(command, id, payload).encode().unwrap();
        self.stream.write_all(&wire).await.unwrap();
    }
}

async fn next_reply(rx: &mut mpsc::UnboundedReceiver<Reply>) -> Reply {
    tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

async fn wait_for_state(connection: &Connection, state: ConnectionState) {
    let mut changes = connection.state_changes();
    tokio::time::timeout(WAIT, changes.wait_for(|current| *current == state))
        .await
        .unwrap()
        .unwrap();
}

fn forwarding_callback() -> (
    mpsc::UnboundedReceiver<Reply>,
    impl Fn(Reply) + Send + Sync + 'static,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (rx, move |reply: Reply| {
        let _ = tx.send(reply);
    })
}

fn write_completed(first: i64, last: i64) -> Bytes {
    ProtobufCodec::encode(&WriteEventsCompleted {
        result: OperationResult::Success as i32,
        message: None,
        first_event_number: first,
        last_event_number: last,
        prepare_position: Some(100),
        commit_position: Some(100),
    })
}

fn appeared(stream: &str, number: i64) -> Bytes {
    let record = EventRecord {
        event_stream_id: stream.to_string(),
        event_number: number,
        event_id: CorrelationId::new().as_bytes().to_vec(),
        event_type: "Test".to_string(),
        data_content_type: 1,
        metadata_content_type: 0,
        data: b"{}".to_vec(),
        metadata: Some(Vec::new()),
        created: None,
        created_epoch: None,
    };
    ProtobufCodec::encode(&StreamEventAppeared {
        event: Some(ResolvedEvent {
            event: Some(record),
            link: None,
            commit_position: number,
            prepare_position: number,
        }),
    })
}

/// Synchronous append: the caller gets the decoded result and the
/// correlation entry is gone.
#[tokio::test]
async fn test_append_to_stream_sync() {
    let server = FakeServer::start().await;
    let connection = server.client();
    connection.connect().await.unwrap();
    assert!(connection.is_connected());
    let mut peer = server.accept().await;

    let append = {
        let connection = connection.clone();
        tokio::spawn(async move {
            let event = EventData::json("Test", &serde_json::json!({})).unwrap();
            connection
                .append_to_stream("test", ExpectedVersion::Any, &[event])
                .await
        })
    };

    let request = peer.recv().await;
    assert_eq!(request.command(), Some(TcpCommand::WriteEvents));
    assert_eq!(request.auth_flag(), 0);
    let dto: WriteEvents = ProtobufCodec::decode(request.payload()).unwrap();
    assert_eq!(dto.event_stream_id, "test");
    assert_eq!(dto.expected_version, -2);
    assert!(!dto.require_master);
    assert_eq!(dto.events.len(), 1);
    assert_eq!(dto.events[0].data_content_type, 1);
    assert_eq!(dto.events[0].metadata_content_type, 0);
    assert_eq!(connection.pending_requests(), 1);

    peer.reply(
        TcpCommand::WriteEventsCompleted,
        request.correlation_id(),
        write_completed(0, 0),
    )
    .await;

    match append.await.unwrap().unwrap() {
        Reply::WriteCompleted(done) => {
            assert!(done.is_success());
            assert_eq!(done.commit_position, Some(100));
        }
        other => panic!("unexpected reply: {:?}", other),
    }
    assert_eq!(connection.pending_requests(), 0);

    connection.close().await;
}

/// A subscription receives every push under its token and the drop
/// notification after unsubscribing.
#[tokio::test]
async fn test_subscribe_and_unsubscribe() {
    let server = FakeServer::start().await;
    let connection = server.client();
    connection.connect().await.unwrap();
    let mut peer = server.accept().await;

    let (mut replies, callback) = forwarding_callback();
    let token = connection.subscribe_to_stream("test", callback).unwrap();
    assert_eq!(token.as_bytes().len(), 16);

    let request = peer.recv().await;
    assert_eq!(request.command(), Some(TcpCommand::SubscribeToStream));
    assert_eq!(request.correlation_id(), token);
    let dto: SubscribeToStream = ProtobufCodec::decode(request.payload()).unwrap();
    assert_eq!(dto.event_stream_id, "test");
    assert!(!dto.resolve_link_tos);

    let confirmation = ProtobufCodec::encode(&SubscriptionConfirmation {
        last_commit_position: 0,
        last_event_number: None,
    });
    peer.reply(TcpCommand::SubscriptionConfirmation, token, confirmation)
        .await;
    for number in 0..3 {
        peer.reply(TcpCommand::StreamEventAppeared, token, appeared("test", number))
            .await;
    }

    assert!(matches!(
        next_reply(&mut replies).await,
        Reply::SubscriptionConfirmed(_)
    ));
    for number in 0..3 {
        match next_reply(&mut replies).await {
            Reply::EventAppeared(pushed) => {
                let record = pushed.event.unwrap().event.unwrap();
                assert_eq!(record.event_number, number);
                assert!(record.is_json());
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }
    assert_eq!(connection.pending_requests(), 1);

    connection.unsubscribe_from_stream(token).unwrap();
    let request = peer.recv().await;
    assert_eq!(request.command(), Some(TcpCommand::UnsubscribeFromStream));
    assert_eq!(request.correlation_id(), token);
    assert!(request.payload().is_empty());

    peer.reply(
        TcpCommand::SubscriptionDropped,
        token,
        ProtobufCodec::encode(&SubscriptionDropped { reason: Some(0) }),
    )
    .await;

    match next_reply(&mut replies).await {
        Reply::SubscriptionDropped(dropped) => {
            assert_eq!(
                dropped.drop_reason(),
                tcpeventstore::messages::SubscriptionDropReason::Unsubscribed
            );
        }
        other => panic!("unexpected reply: {:?}", other),
    }
    assert_eq!(connection.pending_requests(), 0);

    connection.close().await;
}

/// Heartbeats are answered with the same correlation id and never reach a
/// handler.
#[tokio::test]
async fn test_heartbeat_echo() {
    let server = FakeServer::start().await;
    let connection = server.client();
    connection.connect().await.unwrap();
    let mut peer = server.accept().await;

    let id = CorrelationId::new();
    peer.reply(TcpCommand::HeartbeatRequest, id, Bytes::new()).await;

    let response = peer.recv().await;
    assert_eq!(response.command(), Some(TcpCommand::HeartbeatResponse));
    assert_eq!(response.correlation_id(), id);
    assert!(response.payload().is_empty());
    assert_eq!(connection.pending_requests(), 0);

    connection.close().await;
}

/// Concurrent synchronous reads get distinct ids and only their own reply,
/// even when the server answers out of order.
#[tokio::test]
async fn test_concurrent_requests_are_isolated() {
    const CALLERS: i64 = 10;

    let server = FakeServer::start().await;
    let connection = server.client();
    connection.connect().await.unwrap();
    let mut peer = server.accept().await;

    let callers: Vec<_> = (0..CALLERS)
        .map(|start| {
            let connection = connection.clone();
            tokio::spawn(async move {
                let reply = connection
                    .read_stream_events_forward("test", start, 20)
                    .await
                    .unwrap();
                (start, reply)
            })
        })
        .collect();

    let mut requests = Vec::new();
    for _ in 0..CALLERS {
        let request = peer.recv().await;
        assert_eq!(request.command(), Some(TcpCommand::ReadStreamEventsForward));
        let dto: ReadStreamEvents = ProtobufCodec::decode(request.payload()).unwrap();
        assert_eq!(dto.max_count, 20);
        requests.push((request.correlation_id(), dto.from_event_number));
    }
    let ids: HashSet<CorrelationId> = requests.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids.len(), CALLERS as usize);

    for (id, from) in requests.into_iter().rev() {
        let body = ProtobufCodec::encode(&ReadStreamEventsCompleted {
            events: vec![],
            result: 0,
            next_event_number: from,
            last_event_number: from,
            is_end_of_stream: true,
            last_commit_position: 0,
            error: None,
        });
        peer.reply(TcpCommand::ReadStreamEventsForwardCompleted, id, body)
            .await;
    }

    for caller in callers {
        let (start, reply) = caller.await.unwrap();
        match reply {
            Reply::ReadCompleted(done) => assert_eq!(done.next_event_number, start),
            other => panic!("unexpected reply: {:?}", other),
        }
    }
    assert_eq!(connection.pending_requests(), 0);

    connection.close().await;
}

/// Callbacks fire in the order the server replied.
#[tokio::test]
async fn test_callbacks_follow_reply_order() {
    let server = FakeServer::start().await;
    let connection = server.client();
    connection.connect().await.unwrap();
    let mut peer = server.accept().await;

    let (tx, mut order) = mpsc::unbounded_channel();
    for tag in ["first", "second"] {
        let tx = tx.clone();
        connection
            .read_stream_events_backward_with("test", -1, 1, move |_| {
                let _ = tx.send(tag);
            })
            .unwrap();
    }

    let first = peer.recv().await;
    let second = peer.recv().await;
    assert_eq!(first.command(), Some(TcpCommand::ReadStreamEventsBackward));
    let body = ProtobufCodec::encode(&ReadStreamEventsCompleted {
        events: vec![],
        result: 0,
        next_event_number: -1,
        last_event_number: -1,
        is_end_of_stream: true,
        last_commit_position: 0,
        error: None,
    });
    peer.reply(
        TcpCommand::ReadStreamEventsBackwardCompleted,
        second.correlation_id(),
        body.clone(),
    )
    .await;
    peer.reply(
        TcpCommand::ReadStreamEventsBackwardCompleted,
        first.correlation_id(),
        body,
    )
    .await;

    let received = [
        tokio::time::timeout(WAIT, order.recv()).await.unwrap().unwrap(),
        tokio::time::timeout(WAIT, order.recv()).await.unwrap().unwrap(),
    ];
    assert_eq!(received, ["second", "first"]);

    connection.close().await;
}

/// A rejection is delivered as a value and ends the exchange.
#[tokio::test]
async fn test_bad_request_is_a_reply() {
    let server = FakeServer::start().await;
    let connection = server.client();
    connection.connect().await.unwrap();
    let mut peer = server.accept().await;

    let (mut replies, callback) = forwarding_callback();
    connection
        .append_to_stream_with("test", ExpectedVersion::NoStream, &[], callback)
        .unwrap();

    let request = peer.recv().await;
    peer.reply(
        TcpCommand::BadRequest,
        request.correlation_id(),
        Bytes::from_static(b"Bad request"),
    )
    .await;

    assert_eq!(
        next_reply(&mut replies).await,
        Reply::BadRequest("Bad request".to_string())
    );
    assert_eq!(connection.pending_requests(), 0);

    connection.close().await;
}

/// Unknown correlation ids and command codes are ignored; the connection
/// keeps working.
#[tokio::test]
async fn test_unexpected_frames_are_ignored() {
    let server = FakeServer::start().await;
    let connection = server.client();
    connection.connect().await.unwrap();
    let mut peer = server.accept().await;

    peer.reply(
        TcpCommand::WriteEventsCompleted,
        CorrelationId::new(),
        write_completed(0, 0),
    )
    .await;
    let mut unknown = Frame::new(TcpCommand::BadRequest, CorrelationId::new(), Bytes::new())
        .encode()
        .unwrap()
        .to_vec();
    unknown[4] = 0x7E;
    peer.stream.write_all(&unknown).await.unwrap();

    let id = CorrelationId::new();
    peer.reply(TcpCommand::HeartbeatRequest, id, Bytes::new()).await;
    assert_eq!(peer.recv().await.correlation_id(), id);
    assert!(connection.is_connected());

    connection.close().await;
}

/// After the server drops the socket the client reconnects, subscriptions
/// are told they were dropped, and frames queued meanwhile are written
/// first on the new socket.
#[tokio::test]
async fn test_reconnect_after_connection_loss() {
    let server = FakeServer::start().await;
    let connection = ClientBuilder::new("127.0.0.1", server.port())
        .reconnect_delay(Duration::from_millis(500))
        .build();
    connection.connect().await.unwrap();
    let mut peer = server.accept().await;

    let (mut subscription, callback) = forwarding_callback();
    connection.subscribe_to_stream("test", callback).unwrap();
    assert_eq!(
        peer.recv().await.command(),
        Some(TcpCommand::SubscribeToStream)
    );

    drop(peer);
    assert_eq!(next_reply(&mut subscription).await, Reply::Disconnected);
    assert!(!connection.is_connected());
    assert!(matches!(
        connection.connect().await,
        Err(EventStoreError::ConnectInProgress)
    ));

    let (mut replies, callback) = forwarding_callback();
    let id = connection
        .append_to_stream_with("test", ExpectedVersion::Any, &[], callback)
        .unwrap();

    let mut peer = server.accept().await;
    let first = peer.recv().await;
    assert_eq!(first.command(), Some(TcpCommand::WriteEvents));
    assert_eq!(first.correlation_id(), id);

    wait_for_state(&connection, ConnectionState::Connected).await;
    peer.reply(TcpCommand::WriteEventsCompleted, id, write_completed(1, 1))
        .await;
    assert!(matches!(
        next_reply(&mut replies).await,
        Reply::WriteCompleted(_)
    ));

    connection.close().await;
}

/// `connect` is a no-op while connected; `close` fails waiting callers,
/// closes the socket and is final.
#[tokio::test]
async fn test_close() {
    let server = FakeServer::start().await;
    let connection = server.client();
    connection.connect().await.unwrap();
    connection.connect().await.unwrap();
    let mut peer = server.accept().await;

    let read = {
        let connection = connection.clone();
        tokio::spawn(async move { connection.read_stream_events_forward("test", 0, 1).await })
    };
    peer.recv().await;

    connection.close().await;

    assert!(matches!(
        read.await.unwrap(),
        Err(EventStoreError::ConnectionClosed)
    ));
    assert_eq!(connection.state(), ConnectionState::Closing);
    assert_eq!(connection.pending_requests(), 0);

    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(WAIT, peer.stream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);

    assert!(matches!(
        connection.connect().await,
        Err(EventStoreError::ConnectionClosed)
    ));
}
