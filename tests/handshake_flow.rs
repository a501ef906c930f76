// Author: Lukas Bower
// Purpose: End-to-end worker handshake against an in-process coordinator.

use std::net::TcpListener;
use std::process;
use std::thread;

use cohort::{ClientError, Config, ConnectMode, CoordinatorClient, RejectReason, Session, Slot};
use cohort_codec::{parse_cstr, parse_cstrs, Message, MessageKind, UNASSIGNED_VIRTUAL_PID};

fn local_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    let port = listener.local_addr().expect("addr").port();
    (listener, port)
}

fn config_for(port: u16) -> Config {
    Config::with_endpoint("127.0.0.1", Some(port))
}

fn accept_session(listener: &TcpListener) -> Session {
    let (stream, _) = listener.accept().expect("accept");
    Session::from_stream(stream).expect("session")
}

/// Read one hello and admit the worker with the given identity.
fn admit(session: &mut Session, virtual_pid: i32, comp_group: u64) -> (Message, Vec<u8>) {
    let (hello, tail) = session.recv().expect("hello");
    let mut reply = Message::new(MessageKind::Accept);
    reply.virtual_pid = virtual_pid;
    reply.comp_group = comp_group;
    reply.coord_timestamp = 1_755_000_000;
    reply.ip_addr = u32::from_be_bytes([127, 0, 0, 1]);
    session.send(&reply, None).expect("accept reply");
    (hello, tail)
}

#[test]
fn startup_handshake_yields_membership() {
    let (listener, port) = local_listener();
    let worker_pid = process::id() as i32;
    let server = thread::spawn(move || {
        let mut session = accept_session(&listener);
        let (hello, tail) = admit(&mut session, 40001, 0xc0ffee);
        assert_eq!(hello.kind, MessageKind::NewWorker);
        assert_eq!(hello.real_pid, worker_pid);
        assert_eq!(hello.virtual_pid, UNASSIGNED_VIRTUAL_PID);
        // Hostname and program name; no prefix was configured.
        let fields = parse_cstrs(&tail).expect("tail strings");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1], "worker-a");
    });

    let mut client = CoordinatorClient::new(config_for(port));
    let membership = client
        .connect_on_startup(ConnectMode::Join, "worker-a")
        .expect("handshake")
        .expect("membership");
    server.join().expect("server thread");

    assert_eq!(membership.virtual_pid, 40001);
    assert_eq!(membership.comp_group, 0xc0ffee);
    assert_eq!(membership.coord_timestamp, 1_755_000_000);
    assert_eq!(membership.local_ip.octets(), [127, 0, 0, 1]);
    assert!(client.registry().is_connected(Slot::Coordinator));
    assert!(!client.no_coordinator());
}

#[test]
fn configured_prefix_rides_along_in_the_hello() {
    let (listener, port) = local_listener();
    let server = thread::spawn(move || {
        let mut session = accept_session(&listener);
        let (_, tail) = admit(&mut session, 40005, 0xc0ffee);
        let fields = parse_cstrs(&tail).expect("tail strings");
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[2], "/opt/cohort");
    });

    let mut config = config_for(port);
    config.prefix_path = Some("/opt/cohort".to_owned());
    let mut client = CoordinatorClient::new(config);
    client
        .connect_on_startup(ConnectMode::Join, "worker-a")
        .expect("handshake");
    server.join().expect("server thread");
}

#[test]
fn rejections_map_to_distinct_reasons() {
    let cases = [
        (MessageKind::RejectNotRunning, RejectReason::NotRunning),
        (MessageKind::RejectWrongGroup, RejectReason::WrongGroup),
        (MessageKind::RejectWrongPrefix, RejectReason::WrongPrefix),
    ];
    for (kind, reason) in cases {
        let (listener, port) = local_listener();
        let server = thread::spawn(move || {
            let mut session = accept_session(&listener);
            session.recv().expect("hello");
            session.send(&Message::new(kind), None).expect("reject");
        });
        let mut client = CoordinatorClient::new(config_for(port));
        let err = client
            .connect_on_startup(ConnectMode::Join, "worker-a")
            .expect_err("must be rejected");
        server.join().expect("server thread");
        match err {
            ClientError::Rejected(got) => assert_eq!(got, reason),
            other => panic!("unexpected error: {other}"),
        }
        assert!(client.membership().is_none());
    }
}

#[test]
fn restart_handshake_carries_group_and_peer_count() {
    let (listener, port) = local_listener();
    let server = thread::spawn(move || {
        let mut session = accept_session(&listener);
        let (hello, _) = session.recv().expect("hello");
        assert_eq!(hello.kind, MessageKind::RestartWorker);
        assert_eq!(hello.comp_group, 0xfeed);
        assert_eq!(hello.num_peers, 4);
        let mut reply = Message::new(MessageKind::Accept);
        reply.virtual_pid = 40002;
        reply.comp_group = 0xfeed;
        session.send(&reply, None).expect("accept");
    });

    let mut client = CoordinatorClient::new(config_for(port));
    let membership = client
        .connect_on_restart(ConnectMode::Join, "worker-a", 0xfeed, 4)
        .expect("restart")
        .expect("membership");
    server.join().expect("server thread");
    assert_eq!(membership.comp_group, 0xfeed);
    assert_eq!(membership.virtual_pid, 40002);
}

#[test]
fn restart_accepted_into_the_wrong_group_is_a_protocol_violation() {
    let (listener, port) = local_listener();
    let server = thread::spawn(move || {
        let mut session = accept_session(&listener);
        session.recv().expect("hello");
        let mut reply = Message::new(MessageKind::Accept);
        reply.virtual_pid = 40003;
        reply.comp_group = 0xbeef;
        session.send(&reply, None).expect("accept");
    });

    let mut client = CoordinatorClient::new(config_for(port));
    let err = client
        .connect_on_restart(ConnectMode::Join, "worker-a", 0xfeed, 4)
        .expect_err("group mismatch");
    server.join().expect("server thread");
    assert!(matches!(err, ClientError::Protocol(_)));
}

#[test]
fn fork_reset_replaces_the_session_and_reannounces() {
    let (listener, port) = local_listener();
    let server = thread::spawn(move || {
        // First connection admits the worker; the second is the one handed
        // to the forked child.
        let mut first = accept_session(&listener);
        admit(&mut first, 40010, 0xabba);
        let mut second = accept_session(&listener);
        let (update, _) = second.recv().expect("fork update");
        assert_eq!(update.kind, MessageKind::UpdateAfterFork);
        assert!(update.real_pid > 0);
    });

    let mut client = CoordinatorClient::new(config_for(port));
    client
        .connect_on_startup(ConnectMode::Join, "worker-a")
        .expect("handshake");
    let inherited = Session::connect("127.0.0.1", port).expect("child session");
    client.reset_on_fork(inherited).expect("fork reset");
    server.join().expect("server thread");

    assert!(client.registry().is_connected(Slot::Coordinator));
    assert!(!client.registry().is_connected(Slot::NameService));
}

#[test]
fn exec_update_carries_the_new_program_name() {
    let (listener, port) = local_listener();
    let server = thread::spawn(move || {
        let mut first = accept_session(&listener);
        admit(&mut first, 40011, 0xabba);
        let mut survived = accept_session(&listener);
        let (update, tail) = survived.recv().expect("exec update");
        assert_eq!(update.kind, MessageKind::UpdateAfterExec);
        assert_eq!(parse_cstr(&tail).expect("program name"), "worker-b");
    });

    let mut client = CoordinatorClient::new(config_for(port));
    client
        .connect_on_startup(ConnectMode::Join, "worker-a")
        .expect("handshake");
    let surviving = Session::connect("127.0.0.1", port).expect("surviving session");
    client.init_on_exec(surviving, "worker-b").expect("exec init");
    server.join().expect("server thread");
}

#[test]
fn connect_before_fork_runs_a_second_full_handshake() {
    let (listener, port) = local_listener();
    let server = thread::spawn(move || {
        let mut first = accept_session(&listener);
        admit(&mut first, 40020, 0xd00d);
        let mut second = accept_session(&listener);
        let (hello, _) = second.recv().expect("child hello");
        assert_eq!(hello.kind, MessageKind::NewWorker);
        admit_reply(&mut second, 40021, 0xd00d);
    });

    let mut client = CoordinatorClient::new(config_for(port));
    client
        .connect_on_startup(ConnectMode::Join, "worker-a")
        .expect("handshake");
    let (_child_session, child_membership) = client
        .connect_before_fork("worker-a")
        .expect("pre-fork handshake");
    server.join().expect("server thread");

    assert_eq!(child_membership.virtual_pid, 40021);
    // The parent's own identity is untouched.
    assert_eq!(
        client.membership().expect("parent membership").virtual_pid,
        40020
    );
}

fn admit_reply(session: &mut Session, virtual_pid: i32, comp_group: u64) {
    let mut reply = Message::new(MessageKind::Accept);
    reply.virtual_pid = virtual_pid;
    reply.comp_group = comp_group;
    session.send(&reply, None).expect("accept reply");
}

#[test]
fn checkpoint_metadata_flows_over_the_primary_session() {
    let (listener, port) = local_listener();
    let server = thread::spawn(move || {
        let mut session = accept_session(&listener);
        admit(&mut session, 40030, 0xcafe);

        let (msg, _) = session.recv().expect("dir request");
        assert_eq!(msg.kind, MessageKind::GetCkptDir);
        let mut reply = Message::new(MessageKind::GetCkptDirResult);
        reply.extra_bytes = 10;
        session.send(&reply, Some(b"/var/ckpt\0")).expect("dir reply");

        let (update, tail) = session.recv().expect("dir update");
        assert_eq!(update.kind, MessageKind::UpdateCkptDir);
        assert_eq!(tail, b"/mnt/ckpt\0");

        let (filename, tail) = session.recv().expect("filename");
        assert_eq!(filename.kind, MessageKind::CkptFilename);
        let fields = parse_cstrs(&tail).expect("filename fields");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0], "worker-a.ckpt");
    });

    let mut client = CoordinatorClient::new(config_for(port));
    client
        .connect_on_startup(ConnectMode::Join, "worker-a")
        .expect("handshake");
    assert_eq!(client.coord_ckpt_dir().expect("dir"), "/var/ckpt");
    client.update_ckpt_dir("/mnt/ckpt").expect("dir update");
    client
        .send_ckpt_filename("worker-a.ckpt")
        .expect("filename");
    server.join().expect("server thread");
}
