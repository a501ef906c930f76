// Author: Lukas Bower
// Purpose: Exercise the name-service rendezvous channel end to end.

use std::collections::HashMap;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use cohort::{ClientError, Config, ConnectMode, CoordinatorClient, Session, Slot};
use cohort_codec::{Message, MessageKind, NSID_LEN};

type Store = Arc<Mutex<HashMap<([u8; NSID_LEN], Vec<u8>), Vec<u8>>>>;

/// In-process coordinator speaking just enough of the protocol to admit
/// workers and broker key/value rendezvous.
struct MockCoordinator {
    port: u16,
    connections: Arc<AtomicUsize>,
}

impl MockCoordinator {
    fn spawn() -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let connections = Arc::new(AtomicUsize::new(0));
        let store: Store = Arc::default();
        let counter = Arc::clone(&connections);
        thread::spawn(move || loop {
            let Ok((stream, _)) = listener.accept() else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let store = Arc::clone(&store);
            thread::spawn(move || serve(stream, &store));
        });
        Self { port, connections }
    }

    fn config(&self) -> Config {
        Config::with_endpoint("127.0.0.1", Some(self.port))
    }
}

fn serve(stream: TcpStream, store: &Store) {
    let Ok(mut session) = Session::from_stream(stream) else {
        return;
    };
    loop {
        let Ok((msg, tail)) = session.recv() else {
            return;
        };
        match msg.kind {
            MessageKind::NewWorker => {
                let mut reply = Message::new(MessageKind::Accept);
                reply.virtual_pid = 40001;
                reply.comp_group = 0xfade;
                if session.send(&reply, None).is_err() {
                    return;
                }
            }
            MessageKind::NsWorkerJoin => {}
            MessageKind::RegisterNsData | MessageKind::RegisterNsDataSync => {
                let key = tail[..msg.key_len as usize].to_vec();
                let value = tail[msg.key_len as usize..].to_vec();
                store.lock().expect("store").insert((msg.nsid, key), value);
                if msg.kind == MessageKind::RegisterNsDataSync {
                    let ack = Message::new(MessageKind::RegisterNsDataSyncAck);
                    if session.send(&ack, None).is_err() {
                        return;
                    }
                }
            }
            MessageKind::NsQuery => {
                let value = store
                    .lock()
                    .expect("store")
                    .get(&(msg.nsid, tail.clone()))
                    .cloned()
                    .unwrap_or_default();
                let mut reply = Message::new(MessageKind::NsQueryResult);
                reply.nsid = msg.nsid;
                reply.key_len = msg.key_len;
                reply.val_len = value.len() as u32;
                reply.extra_bytes = value.len() as u32;
                if session.send(&reply, Some(&value)).is_err() {
                    return;
                }
            }
            _ => return,
        }
    }
}

fn joined_client(mock: &MockCoordinator, name: &str) -> CoordinatorClient {
    let mut client = CoordinatorClient::new(mock.config());
    client
        .connect_on_startup(ConnectMode::Join, name)
        .expect("handshake");
    client
}

#[test]
fn synced_registration_is_visible_to_a_later_query() {
    let mock = MockCoordinator::spawn();
    let mut writer = joined_client(&mock, "writer");
    writer
        .register_ns_data("mpi", b"rank0", b"10.0.0.7:9000", true)
        .expect("register");

    // A different worker, on a different connection, observes the value.
    let mut reader = joined_client(&mock, "reader");
    let value = reader.query_ns_data("mpi", b"rank0", 64).expect("query");
    assert_eq!(value, b"10.0.0.7:9000");
}

#[test]
fn namespaces_keep_identical_keys_apart() {
    let mock = MockCoordinator::spawn();
    let mut client = joined_client(&mock, "worker");
    client
        .register_ns_data("mpi", b"rank0", b"mpi-endpoint", true)
        .expect("register mpi");
    client
        .register_ns_data("pid", b"rank0", b"pid-endpoint", true)
        .expect("register pid");
    assert_eq!(
        client.query_ns_data("mpi", b"rank0", 64).expect("query"),
        b"mpi-endpoint"
    );
    assert_eq!(
        client.query_ns_data("pid", b"rank0", 64).expect("query"),
        b"pid-endpoint"
    );
}

#[test]
fn re_registration_overwrites_the_previous_value() {
    let mock = MockCoordinator::spawn();
    let mut client = joined_client(&mock, "worker");
    client
        .register_ns_data("mpi", b"leader", b"old", true)
        .expect("first register");
    client
        .register_ns_data("mpi", b"leader", b"new", true)
        .expect("second register");
    assert_eq!(
        client.query_ns_data("mpi", b"leader", 16).expect("query"),
        b"new"
    );
}

#[test]
fn unknown_key_yields_an_empty_value() {
    let mock = MockCoordinator::spawn();
    let mut client = joined_client(&mock, "worker");
    let value = client
        .query_ns_data("mpi", b"nobody", 16)
        .expect("query");
    assert!(value.is_empty());
}

#[test]
fn oversize_result_is_a_fatal_contract_violation() {
    let mock = MockCoordinator::spawn();
    let mut client = joined_client(&mock, "worker");
    client
        .register_ns_data("mpi", b"blob", &[7u8; 32], true)
        .expect("register");
    let err = client
        .query_ns_data("mpi", b"blob", 8)
        .expect_err("must not truncate");
    assert!(matches!(err, ClientError::Protocol(_)));
}

#[test]
fn invalid_query_arguments_fail_locally() {
    // No coordinator anywhere; the checks must fire before any connection.
    let mut client = CoordinatorClient::new(Config::default());
    assert!(matches!(
        client.query_ns_data("mpi", b"", 16),
        Err(ClientError::InvalidArgument(_))
    ));
    assert!(matches!(
        client.query_ns_data("mpi", b"rank0", 0),
        Err(ClientError::InvalidArgument(_))
    ));
}

#[test]
fn running_worker_moves_ns_traffic_to_a_dedicated_session() {
    let mock = MockCoordinator::spawn();
    let mut client = joined_client(&mock, "worker");
    assert_eq!(mock.connections.load(Ordering::SeqCst), 1);

    client.set_running(true);
    client
        .register_ns_data("pid", b"child", b"40002", true)
        .expect("register");
    assert!(client.registry().is_connected(Slot::NameService));
    assert_eq!(mock.connections.load(Ordering::SeqCst), 2);

    // Later traffic reuses the dedicated session instead of reconnecting.
    client.query_ns_data("pid", b"child", 16).expect("query");
    assert_eq!(mock.connections.load(Ordering::SeqCst), 2);
}
