//! A rust driver for the Rigol DS1054Z four channel oscilloscope.
//!
//! Besides the usual run/stop controls and channel queries, this driver reads waveforms as
//! IEEE-488.2 binary blocks and converts them to voltages using the waveform preamble. A
//! [`CaptureWorker`] continuously reads the waveforms of selected channels on its own thread.
//!
//! # Example
//!
//! ```no_run
//! use scpisession::TcpIpTransport;
//!
//! use rigol_ds1054z::Ds1054z;
//!
//! let transport = TcpIpTransport::try_new("192.168.1.145:5555").unwrap();
//! let mut scope = Ds1054z::try_new(transport).unwrap();
//!
//! let mut ch1 = scope.get_channel(0).unwrap();
//! ch1.set_display(true).unwrap();
//! scope.single().unwrap();
//!
//! let waveform = ch1.waveform().unwrap();
//! println!("Read {} points, Vpp = {}", waveform.len(), ch1.vpp().unwrap());
//! ```

#![warn(missing_docs)]

mod capture;
mod preamble;
mod waveform;

pub use capture::{CaptureConfig, CaptureFrame, CaptureWorker};
pub use preamble::{WaveformFormat, WaveformMode, WaveformPreamble};
pub use waveform::Waveform;

use std::{sync::Arc, time::Duration};

use measurements::Voltage;
use parking_lot::Mutex;
use tracing::debug;

use scpisession::{InstrumentError, Session, SessionConfig, Transport};

const TIMEOUT: Duration = Duration::from_secs(20);

/// Number of analog channels of the oscilloscope.
pub const NUM_CHANNELS: usize = 4;

/// Number of points of the waveform on screen in normal mode.
const SCREEN_POINTS: usize = 1200;

/// A rust driver for the DS1054Z.
pub struct Ds1054z<T: Transport> {
    session: Session<T>,
    acquisition: Arc<Mutex<()>>,
}

impl<T: Transport> Ds1054z<T> {
    /// Create a new DS1054Z instance with the given transport.
    ///
    /// The session is opened with a 20 s timeout and a device clear. Then, the waveform readout
    /// is set up to read the 1200 screen points as bytes, the acquisition is stopped, and all
    /// channels are switched off.
    pub fn try_new(transport: T) -> Result<Self, InstrumentError> {
        let config = SessionConfig::default()
            .with_timeout(TIMEOUT)
            .with_clear_on_open(true);
        Self::from_session(Session::with_config(transport, &config)?)
    }

    /// Create a new DS1054Z instance on an already opened session and set it up.
    pub fn from_session(session: Session<T>) -> Result<Self, InstrumentError> {
        let mut instrument = Ds1054z {
            session,
            acquisition: Arc::new(Mutex::new(())),
        };
        instrument.set_waveform_format(WaveformFormat::Byte)?;
        instrument.set_waveform_mode(WaveformMode::Normal)?;
        instrument.set_waveform_range(1, SCREEN_POINTS)?;
        instrument.stop()?;
        for idx in 0..NUM_CHANNELS {
            instrument.get_channel(idx)?.set_display(false)?;
        }
        Ok(instrument)
    }

    /// Get a new channel with a given index.
    ///
    /// Please note that channels are zero-indexed, i.e., index 0 is `CHANnel1`.
    pub fn get_channel(&mut self, idx: usize) -> Result<Channel<T>, InstrumentError> {
        check_channel(idx)?;
        Ok(Channel::new(
            idx,
            self.session.clone(),
            Arc::clone(&self.acquisition),
        ))
    }

    /// Query the name of the instrument.
    pub fn get_name(&mut self) -> Result<String, InstrumentError> {
        Ok(self.session.query_text("*IDN?")?.trim().to_string())
    }

    /// Start the acquisition.
    pub fn run(&mut self) -> Result<(), InstrumentError> {
        self.session.send(":RUN")
    }

    /// Stop the acquisition.
    pub fn stop(&mut self) -> Result<(), InstrumentError> {
        self.session.send(":STOP")
    }

    /// Acquire a single trigger.
    pub fn single(&mut self) -> Result<(), InstrumentError> {
        self.session.send(":SINGle")
    }

    /// Let the oscilloscope set up the channels and timebase for the signals present.
    pub fn autoscale(&mut self) -> Result<(), InstrumentError> {
        self.session.send(":AUToscale")
    }

    /// Set the data format of the waveform data.
    pub fn set_waveform_format(&mut self, format: WaveformFormat) -> Result<(), InstrumentError> {
        self.session
            .send(&format!(":WAVeform:FORMat {}", format.to_cmd_str()))
    }

    /// Set the waveform reading mode.
    pub fn set_waveform_mode(&mut self, mode: WaveformMode) -> Result<(), InstrumentError> {
        self.session
            .send(&format!(":WAVeform:MODE {}", mode.to_cmd_str()))
    }

    /// Set the first and last point of the waveform to read, one-indexed and inclusive.
    pub fn set_waveform_range(&mut self, start: usize, stop: usize) -> Result<(), InstrumentError> {
        if start == 0 || stop < start {
            return Err(InstrumentError::InvalidArgument(format!(
                "Waveform range must satisfy 1 <= start <= stop, got start {start} and stop {stop}"
            )));
        }
        self.session.send(&format!(":WAVeform:STARt {start}"))?;
        self.session.send(&format!(":WAVeform:STOP {stop}"))
    }

    /// Query the time per division of the main timebase.
    pub fn timebase_scale(&mut self) -> Result<Duration, InstrumentError> {
        let cmd = ":TIMebase:MAIN:SCALe?";
        let seconds = self.session.query_number(cmd)?;
        Duration::try_from_secs_f64(seconds)
            .map_err(|_| InstrumentError::ResponseParseError(format!("{cmd} returned {seconds}")))
    }

    /// Query the number of waveform points currently available.
    ///
    /// The number of points depends on the timebase setting. Anything but a positive integer is
    /// a parse error.
    pub fn waveform_points(&mut self) -> Result<usize, InstrumentError> {
        let response = self.session.query_text(":WAVeform:POINts?")?;
        match response.trim().parse::<usize>() {
            Ok(points) if points > 0 => Ok(points),
            _ => Err(InstrumentError::ResponseParseError(response)),
        }
    }

    /// Start a worker thread that continuously reads the waveforms of the given channels.
    ///
    /// See [`CaptureWorker`] for how to receive the frames and stop the worker.
    pub fn start_capture(&mut self, config: CaptureConfig) -> Result<CaptureWorker, InstrumentError>
    where
        T: 'static,
    {
        let channels = config
            .channels
            .iter()
            .map(|&idx| self.get_channel(idx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CaptureWorker::spawn(channels, config))
    }

    /// The session this driver talks through.
    pub fn session(&self) -> &Session<T> {
        &self.session
    }
}

/// Channel structure representing a single analog channel of the DS1054Z.
///
/// Channels can only be created through [`Ds1054z::get_channel`]. Reading the preamble or a
/// waveform selects the channel as waveform source first. These sequences are exclusive between
/// all channels of one oscilloscope, so channels can be used from different threads.
pub struct Channel<T: Transport> {
    idx: usize,
    session: Session<T>,
    acquisition: Arc<Mutex<()>>,
}

impl<T: Transport> Channel<T> {
    /// The zero-based index of this channel.
    pub fn index(&self) -> usize {
        self.idx
    }

    /// Show or hide the channel.
    pub fn set_display(&mut self, on: bool) -> Result<(), InstrumentError> {
        let state = if on { "ON" } else { "OFF" };
        self.session
            .send(&format!(":CHANnel{}:DISPlay {state}", self.idx + 1))
    }

    /// Measure the peak-to-peak voltage of this channel.
    pub fn vpp(&mut self) -> Result<Voltage, InstrumentError> {
        let vpp = self.session.query_number(&self.vpp_query())?;
        Ok(Voltage::from_volts(vpp))
    }

    /// Like [`Channel::vpp`], but a timeout clears the bus and reads as 0 V.
    pub fn vpp_or_default(&mut self) -> Result<Voltage, InstrumentError> {
        let vpp = self.session.query_number_or_default(&self.vpp_query())?;
        Ok(Voltage::from_volts(vpp))
    }

    /// Query the vertical scale of this channel in volts per division.
    pub fn scale(&mut self) -> Result<Voltage, InstrumentError> {
        let scale = self
            .session
            .query_number(&format!(":CHANnel{}:SCALe?", self.idx + 1))?;
        Ok(Voltage::from_volts(scale))
    }

    /// Select this channel as waveform source and read the waveform preamble.
    pub fn preamble(&mut self) -> Result<WaveformPreamble, InstrumentError> {
        let _acquisition = self.acquisition.lock();
        self.select_source()?;
        self.read_preamble()
    }

    /// Read the waveform of this channel.
    ///
    /// The preamble is read along with the data, so the conversion to voltages matches the
    /// current settings of the oscilloscope.
    pub fn waveform(&mut self) -> Result<Waveform, InstrumentError> {
        let _acquisition = self.acquisition.lock();
        self.select_source()?;
        let preamble = self.read_preamble()?;
        let payload = self.session.query_binary_block(":WAVeform:DATA?", true)?;
        if payload.len() != expected_len(&preamble, payload.len()) {
            debug!(
                channel = self.idx + 1,
                points = preamble.points,
                bytes = payload.len(),
                "Waveform length differs from preamble"
            );
        }
        Waveform::from_block(preamble, &payload)
    }

    fn vpp_query(&self) -> String {
        format!(":MEASure:ITEM? VPP,CHANnel{}", self.idx + 1)
    }

    /// Clear the bus, e.g., to resynchronize after a malformed waveform.
    pub(crate) fn clear(&self) -> Result<(), InstrumentError> {
        self.session.clear()
    }

    fn select_source(&self) -> Result<(), InstrumentError> {
        self.session
            .send(&format!(":WAVeform:SOURce CHANnel{}", self.idx + 1))
    }

    fn read_preamble(&self) -> Result<WaveformPreamble, InstrumentError> {
        self.session.query_text(":WAVeform:PREamble?")?.parse()
    }

    fn new(idx: usize, session: Session<T>, acquisition: Arc<Mutex<()>>) -> Self {
        Channel {
            idx,
            session,
            acquisition,
        }
    }
}

impl<T: Transport> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            idx: self.idx,
            session: self.session.clone(),
            acquisition: Arc::clone(&self.acquisition),
        }
    }
}

fn check_channel(idx: usize) -> Result<(), InstrumentError> {
    if idx >= NUM_CHANNELS {
        return Err(InstrumentError::ChannelIndexOutOfRange {
            idx,
            nof_channels: NUM_CHANNELS,
        });
    }
    Ok(())
}

/// The payload length the preamble announces, `actual` for ASCII data.
fn expected_len(preamble: &WaveformPreamble, actual: usize) -> usize {
    preamble
        .format
        .sample_width()
        .map_or(actual, |width| width * preamble.points)
}
