//! Tests for the [`ServiceRequestGate`] on its own, with the interrupt callback running on other
//! threads.

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use rstest::*;

use scpisession::{GatePhase, InstrumentError, ServiceRequestGate, StatusByte};

#[fixture]
fn gate() -> Arc<ServiceRequestGate> {
    Arc::new(ServiceRequestGate::new())
}

/// Call the gate's handler from a new thread after `delay`.
fn notify_after(gate: &Arc<ServiceRequestGate>, delay: Duration, status: u8) -> thread::JoinHandle<()> {
    let handler = gate.handler();
    thread::spawn(move || {
        thread::sleep(delay);
        handler(StatusByte::new(status));
    })
}

#[rstest]
fn wait_returns_status(gate: Arc<ServiceRequestGate>) {
    gate.arm(0x20).unwrap();
    let notifier = notify_after(&gate, Duration::from_millis(20), 0x60);

    let status = gate.wait(Duration::from_secs(2)).unwrap();
    assert_eq!(status.bits(), 0x60);
    assert_eq!(gate.phase(), GatePhase::Idle);
    notifier.join().unwrap();
}

/// The signal may arrive before the caller starts waiting.
#[rstest]
fn signal_before_wait(gate: Arc<ServiceRequestGate>) {
    gate.arm(0x01).unwrap();
    gate.notify(StatusByte::new(0x41));
    assert_eq!(gate.wait(Duration::from_millis(10)).unwrap().bits(), 0x41);
}

/// One arm, one wait: a second wait does not report a stale success.
#[rstest]
fn second_wait_not_armed(gate: Arc<ServiceRequestGate>) {
    gate.arm(0x20).unwrap();
    gate.notify(StatusByte::new(0x60));
    gate.wait(Duration::from_millis(100)).unwrap();

    assert!(matches!(
        gate.wait(Duration::from_millis(100)),
        Err(InstrumentError::NotArmed)
    ));
}

#[rstest]
fn wait_without_arm(gate: Arc<ServiceRequestGate>) {
    let tic = Instant::now();
    assert!(matches!(
        gate.wait(Duration::from_secs(5)),
        Err(InstrumentError::NotArmed)
    ));
    assert!(tic.elapsed() < Duration::from_secs(1));
}

#[rstest]
fn wait_times_out(gate: Arc<ServiceRequestGate>) {
    let timeout = Duration::from_millis(50);
    gate.arm(0x10).unwrap();

    let tic = Instant::now();
    match gate.wait(timeout) {
        Err(InstrumentError::TimeoutServiceRequest { mask, timeout: t }) => {
            assert_eq!(mask, 0x10);
            assert_eq!(t, timeout);
        }
        other => panic!("Expected service request timeout, got {other:?}"),
    }
    let elapsed = tic.elapsed();
    assert!(elapsed >= timeout);
    assert!(elapsed < Duration::from_secs(2));
    assert_eq!(gate.phase(), GatePhase::Idle);
}

/// A callback that arrives after its operation timed out must not satisfy the next operation.
#[rstest]
fn late_signal_does_not_leak(gate: Arc<ServiceRequestGate>) {
    gate.arm(0x20).unwrap();
    let late = notify_after(&gate, Duration::from_millis(60), 0x60);
    assert!(gate.wait(Duration::from_millis(10)).unwrap_err().is_timeout());
    late.join().unwrap();

    gate.arm(0x20).unwrap();
    assert!(gate.wait(Duration::from_millis(30)).unwrap_err().is_timeout());
}

/// The status byte carries no operation id: a callback delivered after the next arm is taken by
/// the new operation. Only callbacks for operations that are no longer armed are absorbed.
#[rstest]
fn signal_after_rearm_goes_to_new_operation(gate: Arc<ServiceRequestGate>) {
    gate.arm(0x20).unwrap();
    assert!(gate.wait(Duration::from_millis(5)).unwrap_err().is_timeout());
    gate.notify(StatusByte::new(0x61));

    gate.arm(0x20).unwrap();
    gate.notify(StatusByte::new(0x60));
    assert_eq!(gate.wait(Duration::from_millis(100)).unwrap().bits(), 0x60);
    assert_eq!(gate.phase(), GatePhase::Idle);
}

#[rstest]
fn second_arm_fails(gate: Arc<ServiceRequestGate>) {
    let first = gate.arm(0x20).unwrap();
    match gate.arm(0x08) {
        Err(InstrumentError::AlreadyArmed(id)) => assert_eq!(id, first),
        other => panic!("Expected already armed error, got {other:?}"),
    }
    // The first operation is still intact.
    gate.notify(StatusByte::new(0x60));
    assert_eq!(gate.wait(Duration::from_millis(100)).unwrap().bits(), 0x60);
}

#[rstest]
fn disarm_drops_pending_signal(gate: Arc<ServiceRequestGate>) {
    gate.arm(0x20).unwrap();
    gate.notify(StatusByte::new(0x60));
    assert!(gate.disarm());
    assert_eq!(gate.phase(), GatePhase::Idle);

    gate.arm(0x20).unwrap();
    assert!(gate.wait(Duration::from_millis(20)).unwrap_err().is_timeout());
}

/// Disarming from another thread releases a blocked waiter.
#[rstest]
fn disarm_releases_waiter(gate: Arc<ServiceRequestGate>) {
    gate.arm(0x20).unwrap();
    let waiter = {
        let gate = Arc::clone(&gate);
        thread::spawn(move || gate.wait(Duration::from_secs(5)))
    };

    let tic = Instant::now();
    while gate.phase() != GatePhase::Waiting {
        assert!(tic.elapsed() < Duration::from_secs(2), "Waiter did not start");
        thread::sleep(Duration::from_millis(1));
    }
    assert!(gate.disarm());

    assert!(matches!(waiter.join().unwrap(), Err(InstrumentError::NotArmed)));
    assert!(tic.elapsed() < Duration::from_secs(2));
}

/// Many operations in a row, each signaled from its own thread.
#[rstest]
fn repeated_operations(gate: Arc<ServiceRequestGate>) {
    for i in 0..20u8 {
        gate.arm(0x20).unwrap();
        let notifier = notify_after(&gate, Duration::from_millis(1), i);
        assert_eq!(gate.wait(Duration::from_secs(2)).unwrap().bits(), i);
        notifier.join().unwrap();
    }
}
