// tests/common.rs
#![allow(dead_code)] // Not every test file uses every helper

use parking_lot::Mutex;
use rxio::{
  EqhConfig, EventQueueHandler, LoopbackConfig, LoopbackTransport, Msg, MsgError, MsgHandle, SessionCallbacks,
  SessionEventCode,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use std::sync::{Arc, Once};

static TRACING_INIT: Once = Once::new();

pub fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    // Can be overridden by RUST_LOG env variable
    let default_filter = "rxio=trace,info";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_thread_names(true)
      .with_test_writer()
      .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global tracing subscriber");
  });
}

/// A loopback transport and a non-blocking event queue handler on it.
pub fn loopback(config: LoopbackConfig) -> (Arc<LoopbackTransport>, EventQueueHandler) {
  setup_tracing();
  let transport = Arc::new(LoopbackTransport::with_config(config));
  let eqh = EventQueueHandler::new(transport.clone(), EqhConfig::default().polling()).expect("Failed to create event queue handler");
  (transport, eqh)
}

/// Dispatches everything currently queued.
pub fn drain(eqh: &EventQueueHandler) -> usize {
  eqh.run_event_loop(0, None).expect("run_event_loop failed")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
  Reply {
    msg: MsgHandle,
    data: Vec<u8>,
    reply: Option<Vec<u8>>,
    bound: bool,
  },
  Established,
  SessionError {
    code: SessionEventCode,
    reason: String,
  },
  MsgError {
    msg: MsgHandle,
    error: MsgError,
    bound: bool,
  },
}

/// Shared log of every callback a session received, plus the messages handed back.
#[derive(Clone, Default)]
pub struct Recorder {
  log: Arc<Mutex<Vec<Recorded>>>,
  returned: Arc<Mutex<Vec<Msg>>>,
}

impl Recorder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn callbacks(&self) -> RecordingCallbacks {
    RecordingCallbacks {
      recorder: self.clone(),
    }
  }

  pub fn events(&self) -> Vec<Recorded> {
    self.log.lock().clone()
  }

  pub fn len(&self) -> usize {
    self.log.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.log.lock().is_empty()
  }

  pub fn count(&self, pred: impl Fn(&Recorded) -> bool) -> usize {
    self.log.lock().iter().filter(|r| pred(r)).count()
  }

  /// Number of completions (reply or message error) recorded for `msg`.
  pub fn completions_for(&self, msg: MsgHandle) -> usize {
    self.count(|r| match r {
      Recorded::Reply { msg: m, .. } | Recorded::MsgError { msg: m, .. } => *m == msg,
      _ => false,
    })
  }

  pub fn take_returned(&self) -> Vec<Msg> {
    std::mem::take(&mut *self.returned.lock())
  }
}

pub struct RecordingCallbacks {
  recorder: Recorder,
}

impl SessionCallbacks for RecordingCallbacks {
  fn on_reply(&mut self, msg: Msg) {
    self.recorder.log.lock().push(Recorded::Reply {
      msg: msg.handle(),
      data: msg.data().to_vec(),
      reply: msg.reply().map(|r| r.to_vec()),
      bound: msg.is_bound(),
    });
    self.recorder.returned.lock().push(msg);
  }

  fn on_session_established(&mut self) {
    self.recorder.log.lock().push(Recorded::Established);
  }

  fn on_session_error(&mut self, code: SessionEventCode, reason: &str) {
    self.recorder.log.lock().push(Recorded::SessionError {
      code,
      reason: reason.to_string(),
    });
  }

  fn on_msg_error(&mut self, msg: Msg, error: MsgError) {
    self.recorder.log.lock().push(Recorded::MsgError {
      msg: msg.handle(),
      error,
      bound: msg.is_bound(),
    });
    self.recorder.returned.lock().push(msg);
  }
}
