//! Integration tests exercising acquisition, saturation, generation-based cohort invalidation,
//! idle pruning, and response correlation against an in-memory `InternalConnectionFactory`/
//! `InternalConnection` test double. No real sockets are involved; the saturation/timeout
//! scenario uses small real sleeps, the idle-pruning scenario uses an injected `FakeClock`.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use pooled_channel::{
    Authenticator, ChannelReceiveArgs, Error, ErrorKind, FakeClock, InternalConnection,
    InternalConnectionFactory, NoopRegistry, PoolManager, PoolSettings, Result, ResponseBuffers,
    TransportErrorKind,
};
use pretty_assertions::assert_eq;

#[derive(Debug)]
struct FakeIoError;

impl fmt::Display for FakeIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fake transport failure")
    }
}

impl std::error::Error for FakeIoError {}

#[derive(Clone, Copy, Debug)]
enum ErrorScript {
    Transport,
    InterruptedRead,
}

fn script_to_error(script: ErrorScript) -> Error {
    match script {
        ErrorScript::Transport => ErrorKind::transport(FakeIoError).into(),
        ErrorScript::InterruptedRead => ErrorKind::interrupted_read().into(),
    }
}

#[derive(Debug, Default)]
struct ConnControl {
    closed: AtomicBool,
    next_send_error: Mutex<Option<ErrorScript>>,
    next_receive_error: Mutex<Option<ErrorScript>>,
    next_receive_reply: Mutex<Option<ResponseBuffers>>,
}

impl ConnControl {
    fn fail_next_send(&self) {
        *self.next_send_error.lock().unwrap() = Some(ErrorScript::Transport);
    }

    fn interrupt_next_receive(&self) {
        *self.next_receive_error.lock().unwrap() = Some(ErrorScript::InterruptedRead);
    }

    fn queue_reply(&self, response_to: i32) {
        *self.next_receive_reply.lock().unwrap() = Some(ResponseBuffers {
            response_to,
            message_length: 16,
            payload: Vec::new(),
        });
    }
}

#[derive(Debug)]
struct FakeConnection {
    id: String,
    control: Arc<ConnControl>,
}

impl InternalConnection for FakeConnection {
    fn send_message(&mut self, _buffers: &[Vec<u8>]) -> Result<()> {
        if let Some(script) = self.control.next_send_error.lock().unwrap().take() {
            return Err(script_to_error(script));
        }
        Ok(())
    }

    fn receive_message(&mut self) -> Result<ResponseBuffers> {
        if let Some(script) = self.control.next_receive_error.lock().unwrap().take() {
            return Err(script_to_error(script));
        }

        Ok(self
            .control
            .next_receive_reply
            .lock()
            .unwrap()
            .take()
            .unwrap_or(ResponseBuffers {
                response_to: 0,
                message_length: 0,
                payload: Vec::new(),
            }))
    }

    fn close(&mut self) {
        self.control.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.control.closed.load(Ordering::SeqCst)
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn server_address(&self) -> String {
        "fake-endpoint:27017".to_string()
    }
}

/// Creates `FakeConnection`s and keeps a handle to each one's `ConnControl` so test code can
/// inject failures into a specific, already-acquired connection after the fact.
#[derive(Debug, Default)]
struct FakeFactory {
    created: Mutex<Vec<Arc<ConnControl>>>,
    next_id: AtomicU64,
    fail_create: AtomicBool,
}

impl FakeFactory {
    fn control(&self, index: usize) -> Arc<ConnControl> {
        self.created.lock().unwrap()[index].clone()
    }

    fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

impl InternalConnectionFactory for FakeFactory {
    type Connection = FakeConnection;

    fn create(&self, authenticator: Option<&dyn Authenticator>) -> Result<FakeConnection> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ErrorKind::transport(FakeIoError).into());
        }

        let control = Arc::new(ConnControl::default());
        self.created.lock().unwrap().push(control.clone());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let mut connection = FakeConnection {
            id: format!("fake-{id}"),
            control,
        };

        if let Some(authenticator) = authenticator {
            authenticator.authenticate(&mut connection)?;
        }

        Ok(connection)
    }
}

/// Wraps a shared `Arc<FakeFactory>` so test code can keep its own handle to the same factory
/// instance (and its per-connection controls) that was handed to the manager.
#[derive(Debug)]
struct SharedFactory(Arc<FakeFactory>);

impl InternalConnectionFactory for SharedFactory {
    type Connection = FakeConnection;

    fn create(&self, authenticator: Option<&dyn Authenticator>) -> Result<FakeConnection> {
        self.0.create(authenticator)
    }
}

/// Two sequential acquire/release cycles reuse a single item rather than creating a second one.
#[test]
fn basic_acquire_release_reuses_one_item() {
    let factory = FakeFactory::default();
    let clock = Arc::new(FakeClock::new());
    let settings = PoolSettings::builder()
        .max_size(2)
        .max_wait_time_ms(Some(1000))
        .build();
    let manager = PoolManager::with_clock_and_observer(
        factory,
        settings,
        clock.clone(),
        None,
        None,
        Arc::new(NoopRegistry),
    )
    .unwrap();

    let mut channel = manager.get().unwrap();
    let first_id = channel.id();
    clock.advance(5);
    channel.close();

    clock.advance(5);
    let mut channel = manager.get().unwrap();
    assert_eq!(channel.id(), first_id);
    channel.close();

    assert_eq!(manager.statistics().size, 1);
}

/// A saturated pool with a wait-queue cap of one rejects a second waiter outright and times out
/// the first once its wait exceeds the configured deadline.
#[test]
fn saturation_rejects_overflow_waiter_and_times_out() {
    let factory = FakeFactory::default();
    let settings = PoolSettings::builder()
        .max_size(1)
        .max_wait_queue_size(1)
        .max_wait_time_ms(Some(50))
        .build();
    let manager = Arc::new(PoolManager::new(factory, settings).unwrap());

    let held = manager.get().unwrap();

    let manager_b = manager.clone();
    let b = thread::spawn(move || {
        let start = std::time::Instant::now();
        let result = manager_b.get();
        (result, start.elapsed())
    });

    // Give B a chance to enter the wait queue before C attempts admission.
    thread::sleep(Duration::from_millis(10));

    let c_result = manager.get();
    assert!(matches!(c_result.unwrap_err().kind(), ErrorKind::WaitQueueFull));

    let (b_result, elapsed) = b.join().unwrap();
    assert!(matches!(b_result.unwrap_err().kind(), ErrorKind::Timeout));
    assert!(elapsed >= Duration::from_millis(45));

    drop(held);
}

/// `max_wait_time_ms = Some(0)` means non-blocking: a `get` with a free permit succeeds
/// immediately rather than treating zero as an already-elapsed deadline, and a `get` against a
/// saturated pool fails with `Timeout` without waiting at all.
#[test]
fn zero_timeout_is_non_blocking_not_already_expired() {
    let factory = FakeFactory::default();
    let settings = PoolSettings::builder().max_size(1).build();
    let manager = PoolManager::new(factory, settings).unwrap();

    let mut channel = manager.get_with_timeout_ms(Some(0)).unwrap();
    channel.close();

    let held = manager.get().unwrap();
    let start = std::time::Instant::now();
    let err = manager.get_with_timeout_ms(Some(0)).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Timeout));
    assert!(start.elapsed() < Duration::from_millis(20));

    drop(held);
}

/// A non-interrupted transport error bumps the generation; the sibling connection is destroyed on
/// its next release instead of being handed back out, and a subsequent acquisition creates a
/// fresh item under the new generation.
#[test]
fn generation_bump_retires_sibling_cohort() {
    let factory = Arc::new(FakeFactory::default());
    let settings = PoolSettings::builder().max_size(2).build();
    let manager = PoolManager::with_clock_and_observer(
        SharedFactory(factory.clone()),
        settings,
        Arc::new(FakeClock::new()),
        None,
        None,
        Arc::new(NoopRegistry),
    )
    .unwrap();

    let mut channel_a = manager.get().unwrap();
    let mut channel_b = manager.get().unwrap();
    assert_eq!(factory.created_count(), 2);
    assert_eq!(manager.generation(), 0);

    factory.control(0).fail_next_send();
    let err = channel_a.send_message(&[vec![1, 2, 3]]).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Transport { .. }));
    assert_eq!(manager.generation(), 1);

    // B belongs to the retired generation-0 cohort; closing it destroys rather than pools it.
    channel_b.close();
    assert!(factory.control(1).closed.load(Ordering::SeqCst));

    channel_a.close();
    assert_eq!(manager.statistics().size, 0);

    // The next acquisition creates a fresh item rather than reusing a retired one.
    let _channel_c = manager.get().unwrap();
    assert_eq!(factory.created_count(), 3);
}

/// An interrupted-read error does not bump the generation, and the channel's item is pooled
/// (not destroyed) on close.
#[test]
fn interrupted_read_preserves_cohort() {
    let factory = Arc::new(FakeFactory::default());
    let settings = PoolSettings::builder().max_size(1).build();
    let manager = PoolManager::new(SharedFactory(factory.clone()), settings).unwrap();

    let mut channel = manager.get().unwrap();
    factory.control(0).interrupt_next_receive();

    let err = channel
        .receive_message(&ChannelReceiveArgs::for_request(1))
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::Transport {
            kind: TransportErrorKind::InterruptedRead,
            ..
        }
    ));
    assert_eq!(manager.generation(), 0);

    channel.close();

    assert_eq!(manager.statistics().size, 1, "item should be pooled, not destroyed");
}

/// Idle items are pruned by `do_maintenance` once they exceed `max_connection_idle_time_ms`, and
/// the pool refills lazily on the next `get`.
#[test]
fn idle_pruning_destroys_and_refills() {
    let factory = Arc::new(FakeFactory::default());
    let clock = Arc::new(FakeClock::new());
    let settings = PoolSettings::builder()
        .max_size(1)
        .max_connection_idle_time_ms(100)
        .build();
    let manager = PoolManager::with_clock_and_observer(
        SharedFactory(factory.clone()),
        settings,
        clock.clone(),
        None,
        None,
        Arc::new(NoopRegistry),
    )
    .unwrap();

    let mut channel = manager.get().unwrap();
    channel.close();
    assert_eq!(manager.statistics().size, 1);

    clock.advance(150);
    manager.do_maintenance();

    assert_eq!(manager.statistics().size, 0);
    assert!(factory.control(0).closed.load(Ordering::SeqCst));

    let _channel = manager.get().unwrap();
    assert_eq!(factory.created_count(), 2);
}

/// A reply whose `responseTo` doesn't match the outgoing request id raises an internal-protocol
/// error without bumping the generation, and the channel stays open.
#[test]
fn response_correlation_mismatch_raises_protocol_error() {
    let factory = Arc::new(FakeFactory::default());
    let settings = PoolSettings::builder().max_size(1).build();
    let manager = PoolManager::new(SharedFactory(factory.clone()), settings).unwrap();

    let mut channel = manager.get().unwrap();
    factory.control(0).queue_reply(8);

    let err = channel
        .receive_message(&ChannelReceiveArgs::for_request(7))
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::InternalProtocol {
            expected: 7,
            actual: 8
        }
    ));
    assert_eq!(manager.generation(), 0);
    assert!(!channel.is_closed());
}

/// A factory that always fails to create propagates the failure as an acquisition error rather
/// than retrying silently, and leaves the pool's size unaffected.
#[test]
fn factory_failure_propagates_as_acquisition_error() {
    let factory = FakeFactory::default();
    factory.fail_create.store(true, Ordering::SeqCst);
    let settings = PoolSettings::builder().max_size(1).build();
    let manager = PoolManager::new(factory, settings).unwrap();

    let err = manager.get().unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Transport { .. }));
    assert_eq!(manager.statistics().size, 0);
}

/// Closing the manager rejects further acquisitions and is safe to call more than once.
#[test]
fn close_is_idempotent_and_rejects_further_acquisitions() {
    let factory = FakeFactory::default();
    let settings = PoolSettings::builder().max_size(1).build();
    let manager = PoolManager::new(factory, settings).unwrap();

    let channel = manager.get().unwrap();
    drop(channel);

    manager.close();
    manager.close();

    let err = manager.get().unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::PoolClosed));
}
