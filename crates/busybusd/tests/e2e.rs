//! End-to-end tests driving a real `busybusd` event loop over a Unix domain
//! socket, exercising the scenarios the wire protocol is meant to support.

use std::path::{Path, PathBuf};
use std::time::Duration;

use busybus_proto::{build, parse, ErrCode, Frame, MsgHeader, MsgType, Object, SoType, Value};
use busybusd::transport::{read_frame, write_frame};
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::task::JoinHandle;

struct Daemon {
    _dir: tempfile::TempDir,
    path: PathBuf,
    handle: JoinHandle<()>,
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn spawn_daemon() -> Daemon {
    spawn_daemon_with_auth(busybusd::auth::allow_all).await
}

async fn spawn_daemon_with_auth(authorize: busybusd::auth::AuthHook) -> Daemon {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("busybus.sock");
    let run_path = path.clone();
    let handle = tokio::spawn(async move {
        let _ = busybusd::event_loop::run_with_auth(&run_path, authorize).await;
    });

    // Poll for the socket file rather than sleeping a fixed guess.
    for _ in 0..100 {
        if run_path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Daemon { _dir: dir, path, handle }
}

async fn open_session(path: &Path, sotype: SoType, name: Option<&str>) -> UnixStream {
    let mut stream = UnixStream::connect(path).await.expect("connect");
    let mut header = MsgHeader::build(MsgType::So, ErrCode::Good);
    header.set_sotype(sotype);
    let frame = Frame::new(header, name.map(str::to_string), None);
    write_frame(&mut stream, &frame).await.expect("write SO");

    let reply = read_frame(&mut stream).await.expect("read session-open reply");
    assert_eq!(reply.header.msgtype(), Some(MsgType::SoOk));
    stream
}

fn clicall(token: u32, path: &str, object: Option<Object>) -> Frame {
    let mut header = MsgHeader::build(MsgType::CliCall, ErrCode::Good);
    header.set_token(token);
    let object = object.map(|o| Bytes::from(o.as_bytes().to_vec()));
    Frame::new(header, Some(path.to_string()), object)
}

#[tokio::test]
async fn echo_call_round_trips() {
    let daemon = spawn_daemon().await;
    let mut caller = open_session(&daemon.path, SoType::Caller, Some("echo-test")).await;

    let args = build("s", &[Value::Str("hello".to_string())]).expect("build args");
    write_frame(&mut caller, &clicall(1, "bbus.bbusd.echo", Some(args))).await.expect("write CLICALL");

    let reply = read_frame(&mut caller).await.expect("read CLIREPLY");
    assert_eq!(reply.header.msgtype(), Some(MsgType::CliReply));
    assert_eq!(reply.header.errcode(), Some(ErrCode::Good));
    assert_eq!(reply.header.token(), 1);

    let mut obj = Object::from_buffer(reply.object.expect("object payload").to_vec());
    assert_eq!(parse(&mut obj, "s").expect("parse reply"), vec![Value::Str("hello".to_string())]);
}

#[tokio::test]
async fn calling_an_unknown_method_replies_nomethod() {
    let daemon = spawn_daemon().await;
    let mut caller = open_session(&daemon.path, SoType::Caller, None).await;

    write_frame(&mut caller, &clicall(2, "bbus.nosuch.method", None)).await.expect("write CLICALL");

    let reply = read_frame(&mut caller).await.expect("read CLIREPLY");
    assert_eq!(reply.header.msgtype(), Some(MsgType::CliReply));
    assert_eq!(reply.header.errcode(), Some(ErrCode::NoMethod));
    assert_eq!(reply.header.token(), 2);
}

#[tokio::test]
async fn remote_method_registration_and_dispatch() {
    let daemon = spawn_daemon().await;
    let mut provider = open_session(&daemon.path, SoType::Service, Some("adder")).await;
    let mut caller = open_session(&daemon.path, SoType::Caller, Some("adder-client")).await;

    let reg = Frame::new(MsgHeader::build(MsgType::SrvReg, ErrCode::Good), Some("math.add,ii,i".to_string()), None);
    write_frame(&mut provider, &reg).await.expect("write SRVREG");
    let ack = read_frame(&mut provider).await.expect("read SRVACK");
    assert_eq!(ack.header.msgtype(), Some(MsgType::SrvAck));
    assert_eq!(ack.header.errcode(), Some(ErrCode::Good));

    let args = build("ii", &[Value::Int(2), Value::Int(3)]).expect("build args");
    write_frame(&mut caller, &clicall(42, "bbus.math.add", Some(args))).await.expect("write CLICALL");

    let srvcall = read_frame(&mut provider).await.expect("read SRVCALL");
    assert_eq!(srvcall.header.msgtype(), Some(MsgType::SrvCall));
    assert_eq!(srvcall.meta.as_deref(), Some("add"));

    let mut incoming = Object::from_buffer(srvcall.object.expect("srvcall args").to_vec());
    let values = parse(&mut incoming, "ii").expect("parse srvcall args");
    assert_eq!(values, vec![Value::Int(2), Value::Int(3)]);

    let result = build("i", &[Value::Int(5)]).expect("build result");
    let mut reply_header = MsgHeader::build(MsgType::SrvReply, ErrCode::Good);
    reply_header.set_token(srvcall.header.token());
    let srvreply = Frame::new(reply_header, None, Some(Bytes::from(result.as_bytes().to_vec())));
    write_frame(&mut provider, &srvreply).await.expect("write SRVREPLY");

    let clireply = read_frame(&mut caller).await.expect("read CLIREPLY");
    assert_eq!(clireply.header.msgtype(), Some(MsgType::CliReply));
    assert_eq!(clireply.header.errcode(), Some(ErrCode::Good));
    assert_eq!(clireply.header.token(), 42);
    let mut out = Object::from_buffer(clireply.object.expect("clireply result").to_vec());
    assert_eq!(parse(&mut out, "i").expect("parse result"), vec![Value::Int(5)]);
}

#[tokio::test]
async fn provider_disconnecting_mid_call_fails_the_caller() {
    let daemon = spawn_daemon().await;
    let provider = open_session(&daemon.path, SoType::Service, Some("flaky")).await;
    let mut provider = provider;
    let mut caller = open_session(&daemon.path, SoType::Caller, Some("flaky-client")).await;

    let reg = Frame::new(MsgHeader::build(MsgType::SrvReg, ErrCode::Good), Some("flaky.op,,".to_string()), None);
    write_frame(&mut provider, &reg).await.expect("write SRVREG");
    let _ack = read_frame(&mut provider).await.expect("read SRVACK");

    write_frame(&mut caller, &clicall(9, "bbus.flaky.op", None)).await.expect("write CLICALL");
    let _srvcall = read_frame(&mut provider).await.expect("read SRVCALL");

    provider.shutdown().await.expect("shutdown provider");
    drop(provider);

    let clireply = read_frame(&mut caller).await.expect("read CLIREPLY after provider vanished");
    assert_eq!(clireply.header.msgtype(), Some(MsgType::CliReply));
    assert_eq!(clireply.header.errcode(), Some(ErrCode::MethodErr));
    assert_eq!(clireply.header.token(), 9);
}

#[tokio::test]
async fn bad_magic_closes_the_connection() {
    let daemon = spawn_daemon().await;
    let mut stream = UnixStream::connect(&daemon.path).await.expect("connect");

    let mut raw = MsgHeader::build(MsgType::So, ErrCode::Good).to_bytes();
    raw[0] = 0x00;
    raw[1] = 0x00;
    stream.write_all(&raw).await.expect("write bad-magic header");

    let result = read_frame(&mut stream).await;
    assert!(result.is_err(), "daemon must close the connection, not reply, on a bad magic number");
}

#[tokio::test]
async fn session_open_rejected_by_auth_hook_is_rjctd_and_closed() {
    fn deny_all(_: &busybusd::transport::Credentials) -> bool {
        false
    }
    let daemon = spawn_daemon_with_auth(deny_all).await;
    let mut stream = UnixStream::connect(&daemon.path).await.expect("connect");

    let mut header = MsgHeader::build(MsgType::So, ErrCode::Good);
    header.set_sotype(SoType::Caller);
    write_frame(&mut stream, &Frame::new(header, Some("denied".to_string()), None)).await.expect("write SO");

    let reply = read_frame(&mut stream).await.expect("read SORJCT");
    assert_eq!(reply.header.msgtype(), Some(MsgType::SoRjct));

    let after = read_frame(&mut stream).await;
    assert!(after.is_err(), "connection must be closed after an unauthorized session-open");
}

#[tokio::test]
async fn session_open_with_unknown_sotype_is_rejected() {
    let daemon = spawn_daemon().await;
    let mut stream = UnixStream::connect(&daemon.path).await.expect("connect");

    let mut raw = MsgHeader::build(MsgType::So, ErrCode::Good).to_bytes();
    raw[3] = 0x7F; // not a valid SoType discriminant
    stream.write_all(&raw).await.expect("write bad-sotype SO frame");

    let reply = read_frame(&mut stream).await.expect("read SORJCT");
    assert_eq!(reply.header.msgtype(), Some(MsgType::SoRjct));

    // The daemon closes right after rejecting; the next read observes EOF.
    let after = read_frame(&mut stream).await;
    assert!(after.is_err(), "connection must be closed after a rejected session-open");
}
