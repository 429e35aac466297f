// tests/dispatch.rs

use rxio::{ClientSession, LoopbackConfig, Msg, RawEvent, SessionEventCode, SessionHandle};
mod common;

use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

use common::{drain, loopback, Recorded, Recorder};

#[test]
fn test_events_are_demultiplexed_by_session_handle() {
  let (transport, eqh) = loopback(LoopbackConfig::default().with_echo_replies(false));
  let rec_a = Recorder::new();
  let rec_b = Recorder::new();
  let a = ClientSession::connect(&eqh, "rdma://10.0.0.1:1234", rec_a.callbacks());
  let b = ClientSession::connect(&eqh, "tcp://10.0.0.2:1234", rec_b.callbacks());
  assert_ne!(a.handle(), b.handle());
  assert_eq!(eqh.session_count(), 2);

  let msg_a = Msg::from_static(b"for a");
  let msg_a_handle = msg_a.handle();
  a.send_message(msg_a).unwrap();

  transport
    .inject(RawEvent::reply(a.handle(), msg_a_handle, bytes::Bytes::from_static(b"ack a")))
    .unwrap();
  transport
    .inject(RawEvent::session_error(b.handle(), SessionEventCode::ConnectionError, "b only"))
    .unwrap();
  assert_eq!(drain(&eqh), 4);

  assert_eq!(
    rec_a.events(),
    vec![
      Recorded::Established,
      Recorded::Reply {
        msg: msg_a_handle,
        data: b"for a".to_vec(),
        reply: Some(b"ack a".to_vec()),
        bound: false,
      },
    ]
  );
  assert_eq!(
    rec_b.events(),
    vec![
      Recorded::Established,
      Recorded::SessionError {
        code: SessionEventCode::ConnectionError,
        reason: "b only".into(),
      },
    ]
  );
}

#[test]
fn test_reply_for_other_sessions_message_is_dropped() {
  let (transport, eqh) = loopback(LoopbackConfig::default().with_echo_replies(false));
  let rec_a = Recorder::new();
  let rec_b = Recorder::new();
  let a = ClientSession::connect(&eqh, "rdma://10.0.0.1:1234", rec_a.callbacks());
  let b = ClientSession::connect(&eqh, "rdma://10.0.0.2:1234", rec_b.callbacks());

  let msg = Msg::from_static(b"owned by a");
  let handle = msg.handle();
  a.send_message(msg).unwrap();

  // A reply naming b for a's message must not hand a's message to b.
  transport
    .inject(RawEvent::reply(b.handle(), handle, bytes::Bytes::from_static(b"wrong")))
    .unwrap();
  drain(&eqh);

  assert_eq!(rec_b.completions_for(handle), 0);
  assert_eq!(rec_a.completions_for(handle), 0);
  assert!(eqh.is_in_use(handle));
}

#[test]
fn test_events_for_one_session_keep_their_order() {
  let (transport, eqh) = loopback(LoopbackConfig::default().with_auto_establish(false));
  let recorder = Recorder::new();
  let session = ClientSession::connect(&eqh, "rdma://10.0.0.1:1234", recorder.callbacks());

  let codes = [
    SessionEventCode::ConnectionRefused,
    SessionEventCode::ConnectionEstablished,
    SessionEventCode::ConnectionDisconnected,
    SessionEventCode::Other(77),
  ];
  for (i, code) in codes.iter().enumerate() {
    transport
      .inject(RawEvent::session_error(session.handle(), *code, format!("event {}", i)))
      .unwrap();
  }
  drain(&eqh);

  let seen: Vec<_> = recorder
    .events()
    .into_iter()
    .map(|r| match r {
      Recorded::SessionError { code, reason } => (code, reason),
      other => panic!("unexpected {:?}", other),
    })
    .collect();
  let expected: Vec<_> = codes
    .iter()
    .enumerate()
    .map(|(i, c)| (*c, format!("event {}", i)))
    .collect();
  assert_eq!(seen, expected);
}

#[test]
fn test_events_for_unknown_handles_are_consumed() {
  let (transport, eqh) = loopback(LoopbackConfig::default());
  let lh = eqh.loop_handle();
  transport
    .inject_into(lh, RawEvent::session_established(SessionHandle::new(9999)))
    .unwrap();
  transport
    .inject_into(lh, RawEvent::msg_error(SessionHandle::new(9999), Msg::new().handle(), -1))
    .unwrap();

  assert_eq!(drain(&eqh), 2);
  assert_eq!(transport.pending_events(lh), 0);
  assert_eq!(drain(&eqh), 0);
}

#[test]
fn test_dispatch_next_pulls_one_event() {
  let (_transport, eqh) = loopback(LoopbackConfig::default());
  let recorder = Recorder::new();
  let session = ClientSession::connect(&eqh, "rdma://10.0.0.1:1234", recorder.callbacks());
  session.send_message(Msg::from_static(b"x")).unwrap();

  assert!(eqh.dispatch_next(None).unwrap());
  assert_eq!(recorder.events(), vec![Recorded::Established]);
  assert!(eqh.dispatch_next(None).unwrap());
  assert_eq!(recorder.len(), 2);
  assert!(!eqh.dispatch_next(None).unwrap());
}

#[test]
fn test_session_dropped_by_owner_is_not_dispatched_to() {
  let (transport, eqh) = loopback(LoopbackConfig::default().with_teardown_on_close(false));
  let recorder = Recorder::new();
  let session = ClientSession::connect(&eqh, "rdma://10.0.0.1:1234", recorder.callbacks());
  let handle = session.handle();
  drop(session);

  transport
    .inject_into(eqh.loop_handle(), RawEvent::session_established(handle))
    .unwrap();
  assert_eq!(drain(&eqh), 2);
  assert!(recorder.is_empty());
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLogs {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.lock().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

#[test]
fn test_routing_miss_is_logged_as_warning() {
  let (transport, eqh) = loopback(LoopbackConfig::default());
  let logs = CapturedLogs::default();
  let writer = logs.clone();
  let subscriber = tracing_subscriber::fmt()
    .with_max_level(tracing::Level::WARN)
    .with_ansi(false)
    .with_writer(move || writer.clone())
    .finish();

  transport
    .inject_into(eqh.loop_handle(), RawEvent::session_established(SessionHandle::new(4242)))
    .unwrap();
  tracing::subscriber::with_default(subscriber, || {
    assert_eq!(drain(&eqh), 1);
  });

  let output = String::from_utf8(logs.0.lock().clone()).unwrap();
  let line = output
    .lines()
    .find(|l| l.contains("Dropping event for unregistered session"))
    .expect("routing miss was not logged at warn level");
  assert!(line.contains("WARN"));
}
