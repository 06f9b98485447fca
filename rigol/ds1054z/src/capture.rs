//! Continuous waveform capture on a worker thread.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use measurements::Voltage;
use tracing::{debug, error, info, warn};

use scpisession::{InstrumentError, Transport};

use crate::{Channel, Waveform};

/// Granularity in which the worker checks the stop flag while idling between cycles.
const STOP_POLL: Duration = Duration::from_millis(10);

/// Settings of a [`CaptureWorker`].
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Zero-based indices of the channels to read, in this order.
    pub channels: Vec<usize>,
    /// Pause between two cycles over all channels.
    pub interval: Duration,
    /// Stop after this many cycles. `None` runs until stopped.
    pub cycles: Option<usize>,
    /// Also measure the peak-to-peak voltage of each channel.
    pub measure_vpp: bool,
}

impl CaptureConfig {
    /// Capture the given channels every 100 ms, with peak-to-peak voltage, until stopped.
    pub fn new(channels: &[usize]) -> Self {
        CaptureConfig {
            channels: channels.to_vec(),
            interval: Duration::from_millis(100),
            cycles: None,
            measure_vpp: true,
        }
    }

    /// Set the pause between two cycles.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Stop after the given number of cycles.
    pub fn with_cycles(mut self, cycles: usize) -> Self {
        self.cycles = Some(cycles);
        self
    }

    /// Enable or disable the peak-to-peak voltage measurement.
    pub fn with_vpp(mut self, measure_vpp: bool) -> Self {
        self.measure_vpp = measure_vpp;
        self
    }
}

/// One waveform read by a [`CaptureWorker`].
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureFrame {
    /// Zero-based index of the channel.
    pub channel: usize,
    /// Zero-based cycle in which the frame was read.
    pub cycle: usize,
    /// The waveform.
    pub waveform: Waveform,
    /// Peak-to-peak voltage, if requested. 0 V if the measurement timed out.
    pub vpp: Option<Voltage>,
}

/// A worker thread that reads waveforms in a loop and sends them as [`CaptureFrame`]s.
///
/// Errors do not end the loop. A malformed waveform clears the bus and skips the rest of the
/// cycle. A timeout clears the bus, so late bytes cannot answer the next query, and the next
/// channel is read. Other errors are logged. The worker ends
/// when it is stopped, its configured number of cycles is done, or the session is closed.
///
/// Dropping the worker stops it and waits for the thread to end.
pub struct CaptureWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    frames: Receiver<CaptureFrame>,
}

impl CaptureWorker {
    pub(crate) fn spawn<T: Transport + 'static>(
        channels: Vec<Channel<T>>,
        config: CaptureConfig,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let (sender, frames) = mpsc::channel();
        let handle = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || capture_loop(channels, &config, &stop, &sender))
        };
        info!("Capture worker started");
        CaptureWorker {
            stop,
            handle: Some(handle),
            frames,
        }
    }

    /// Wait up to `timeout` for the next frame.
    ///
    /// Returns `None` if no frame arrived in time or the worker has ended and all frames were
    /// received.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<CaptureFrame> {
        self.frames.recv_timeout(timeout).ok()
    }

    /// The receiver of all frames, e.g., to iterate over them.
    pub fn frames(&self) -> &Receiver<CaptureFrame> {
        &self.frames
    }

    /// Returns `true` if the worker thread has ended.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the worker and wait for the thread to end.
    ///
    /// A waveform that is being read is finished first, so this can take up to one transport
    /// timeout.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Capture worker panicked");
            } else {
                info!("Capture worker stopped");
            }
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn capture_loop<T: Transport>(
    mut channels: Vec<Channel<T>>,
    config: &CaptureConfig,
    stop: &AtomicBool,
    frames: &Sender<CaptureFrame>,
) {
    let mut cycle = 0;
    while !stop.load(Ordering::SeqCst) && config.cycles.is_none_or(|cycles| cycle < cycles) {
        for channel in channels.iter_mut() {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            let idx = channel.index();
            match capture_frame(channel, cycle, config.measure_vpp) {
                Ok(frame) => {
                    if frames.send(frame).is_err() {
                        debug!("Frame receiver dropped, ending capture");
                        return;
                    }
                }
                Err(err @ InstrumentError::Framing(_)) => {
                    warn!(channel = idx + 1, cycle, %err, "Skipping capture cycle");
                    if let Err(clear_err) = channel.clear() {
                        warn!(%clear_err, "Could not clear bus after malformed waveform");
                    }
                    break;
                }
                Err(InstrumentError::SessionClosed) => {
                    debug!("Session closed, ending capture");
                    return;
                }
                Err(err) if err.is_timeout() => {
                    warn!(channel = idx + 1, cycle, %err, "Timeout while capturing");
                    if let Err(clear_err) = channel.clear() {
                        warn!(%clear_err, "Could not clear bus after timeout");
                    }
                }
                Err(err) => {
                    warn!(channel = idx + 1, cycle, %err, "Capture failed");
                }
            }
        }
        cycle += 1;
        idle(stop, config.interval);
    }
}

fn capture_frame<T: Transport>(
    channel: &mut Channel<T>,
    cycle: usize,
    measure_vpp: bool,
) -> Result<CaptureFrame, InstrumentError> {
    let waveform = channel.waveform()?;
    let vpp = if measure_vpp {
        Some(channel.vpp_or_default()?)
    } else {
        None
    };
    Ok(CaptureFrame {
        channel: channel.index(),
        cycle,
        waveform,
        vpp,
    })
}

/// Sleep for `interval` or until the stop flag is set.
fn idle(stop: &AtomicBool, interval: Duration) {
    let deadline = Instant::now() + interval;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || stop.load(Ordering::SeqCst) {
            return;
        }
        thread::sleep(remaining.min(STOP_POLL));
    }
}
