//! Tests for the Rigol DS1054Z driver.

use std::{collections::VecDeque, time::Duration};

use measurements::test_utils::almost_eq;
use rstest::*;

use scpisession::{
    DEVICE_CLEAR, InstReply, InstrumentError, LoopbackTransport, Session, StreamTransport,
    encode_block,
};

use rigol_ds1054z::{CaptureConfig, Ds1054z, WaveformFormat, WaveformMode};

type Ds1054zLbk = Ds1054z<LoopbackTransport>;

const INIT: [&str; 10] = [
    DEVICE_CLEAR,
    ":WAVeform:FORMat BYTE",
    ":WAVeform:MODE NORMal",
    ":WAVeform:STARt 1",
    ":WAVeform:STOP 1200",
    ":STOP",
    ":CHANnel1:DISPlay OFF",
    ":CHANnel2:DISPlay OFF",
    ":CHANnel3:DISPlay OFF",
    ":CHANnel4:DISPlay OFF",
];

const PREAMBLE: &str = "0,0,4,1,1.000000e-06,-2.000000e-06,0,4.000000e-02,-3,127";

/// Raw samples that convert to 0 V, 1 V, -1 V, and 0 V with [`PREAMBLE`].
const SAMPLES: [u8; 4] = [124, 149, 99, 124];

/// Prepare the oscilloscope with a loopback transport, including the commands of the setup.
fn crt_inst(host2inst: &[&str], inst2host: Vec<InstReply>) -> Ds1054zLbk {
    let inp = INIT.iter().chain(host2inst).map(|s| s.to_string()).collect();
    Ds1054z::try_new(LoopbackTransport::new(inp, inst2host, "\n")).unwrap()
}

fn lines(replies: &[&str]) -> Vec<InstReply> {
    replies.iter().map(|&s| InstReply::from(s)).collect()
}

/// The binary block of [`SAMPLES`] with a trailing terminator.
fn sample_block() -> InstReply {
    let mut block = encode_block(&SAMPLES).unwrap();
    block.push(b'\n');
    InstReply::Bytes(block)
}

/// The commands that read the waveform of a channel.
fn waveform_cmds(channel: usize) -> Vec<String> {
    vec![
        format!(":WAVeform:SOURce CHANnel{channel}"),
        ":WAVeform:PREamble?".to_string(),
        ":WAVeform:DATA?".to_string(),
    ]
}

#[fixture]
fn emp_inst() -> Ds1054zLbk {
    crt_inst(&[], vec![])
}

/// Ensure initialization of the instrument works correctly.
#[rstest]
fn test_initialization(emp_inst: Ds1054zLbk) {
    assert_eq!(emp_inst.session().timeout().unwrap(), Duration::from_secs(20));
}

#[rstest]
fn test_get_channel(mut emp_inst: Ds1054zLbk) {
    assert_eq!(emp_inst.get_channel(3).unwrap().index(), 3);
    match emp_inst.get_channel(4) {
        Err(InstrumentError::ChannelIndexOutOfRange { idx, nof_channels }) => {
            assert_eq!(idx, 4);
            assert_eq!(nof_channels, 4);
        }
        _ => panic!("Expected ChannelIndexOutOfRange error"),
    }
}

#[rstest]
fn test_acquisition_control() {
    let mut inst = crt_inst(&[":RUN", ":STOP", ":SINGle", ":AUToscale"], vec![]);
    inst.run().unwrap();
    inst.stop().unwrap();
    inst.single().unwrap();
    inst.autoscale().unwrap();
}

#[rstest]
fn test_waveform_settings() {
    let mut inst = crt_inst(
        &[
            ":WAVeform:FORMat WORD",
            ":WAVeform:MODE RAW",
            ":WAVeform:STARt 1",
            ":WAVeform:STOP 250000",
        ],
        vec![],
    );
    inst.set_waveform_format(WaveformFormat::Word).unwrap();
    inst.set_waveform_mode(WaveformMode::Raw).unwrap();
    inst.set_waveform_range(1, 250_000).unwrap();
}

#[rstest]
#[case(0, 10)]
#[case(10, 9)]
fn test_waveform_range_invalid(mut emp_inst: Ds1054zLbk, #[case] start: usize, #[case] stop: usize) {
    assert!(matches!(
        emp_inst.set_waveform_range(start, stop),
        Err(InstrumentError::InvalidArgument(_))
    ));
}

#[rstest]
fn test_get_name() {
    let mut inst = crt_inst(
        &["*IDN?"],
        lines(&["RIGOL TECHNOLOGIES,DS1054Z,DS1ZA000000000,00.04.04.SP4"]),
    );
    assert_eq!(
        inst.get_name().unwrap(),
        "RIGOL TECHNOLOGIES,DS1054Z,DS1ZA000000000,00.04.04.SP4"
    );
}

#[rstest]
fn test_timebase_scale() {
    let mut inst = crt_inst(
        &[":TIMebase:MAIN:SCALe?", ":TIMebase:MAIN:SCALe?"],
        lines(&["5.000000e-04", "-1.0e-03"]),
    );
    let scale = inst.timebase_scale().unwrap();
    assert!((scale.as_secs_f64() - 5e-4).abs() < 1e-12);
    assert!(matches!(
        inst.timebase_scale(),
        Err(InstrumentError::ResponseParseError(_))
    ));
}

#[rstest]
#[case("1200", Some(1200))]
#[case("250000\r", Some(250_000))]
#[case("0", None)]
#[case("-5", None)]
#[case("many", None)]
fn test_waveform_points(#[case] resp: &str, #[case] exp: Option<usize>) {
    let mut inst = crt_inst(&[":WAVeform:POINts?"], lines(&[resp]));
    match exp {
        Some(points) => assert_eq!(inst.waveform_points().unwrap(), points),
        None => assert!(matches!(
            inst.waveform_points(),
            Err(InstrumentError::ResponseParseError(_))
        )),
    }
}

#[rstest]
fn test_channel_display() {
    let mut inst = crt_inst(&[":CHANnel2:DISPlay ON", ":CHANnel2:DISPlay OFF"], vec![]);
    let mut ch = inst.get_channel(1).unwrap();
    ch.set_display(true).unwrap();
    ch.set_display(false).unwrap();
}

#[rstest]
fn test_channel_vpp_and_scale() {
    let mut inst = crt_inst(
        &[":MEASure:ITEM? VPP,CHANnel3", ":CHANnel3:SCALe?"],
        lines(&["2.240000e+00", "5.000000e-01"]),
    );
    let mut ch = inst.get_channel(2).unwrap();
    assert!(almost_eq(ch.vpp().unwrap().as_volts(), 2.24));
    assert!(almost_eq(ch.scale().unwrap().as_volts(), 0.5));
}

#[rstest]
fn test_channel_vpp_or_default() {
    let mut inst = crt_inst(
        &[":MEASure:ITEM? VPP,CHANnel1", DEVICE_CLEAR],
        vec![InstReply::Silence],
    );
    let mut ch = inst.get_channel(0).unwrap();
    assert_eq!(ch.vpp_or_default().unwrap().as_volts(), 0.0);
}

#[rstest]
fn test_channel_preamble() {
    let mut inst = crt_inst(
        &[":WAVeform:SOURce CHANnel4", ":WAVeform:PREamble?"],
        lines(&[PREAMBLE]),
    );
    let preamble = inst.get_channel(3).unwrap().preamble().unwrap();
    assert_eq!(preamble.format, WaveformFormat::Byte);
    assert_eq!(preamble.points, 4);
    assert_eq!(preamble.x_increment, 1e-6);
    assert_eq!(preamble.y_reference, 127.0);
}

#[rstest]
fn test_channel_waveform() {
    let cmds = waveform_cmds(1);
    let cmds: Vec<&str> = cmds.iter().map(String::as_str).collect();
    let mut inst = crt_inst(&cmds, vec![InstReply::from(PREAMBLE), sample_block()]);

    let waveform = inst.get_channel(0).unwrap().waveform().unwrap();
    assert_eq!(waveform.len(), 4);
    for (volt, exp) in waveform.voltages.iter().zip([0.0, 1.0, -1.0, 0.0]) {
        assert!(almost_eq(*volt, exp));
    }
    for (time, exp) in waveform.times().iter().zip([-2e-6, -1e-6, 0.0, 1e-6]) {
        assert!((time - exp).abs() < 1e-15);
    }
}

/// A truncated waveform block is a framing error.
#[rstest]
fn test_channel_waveform_truncated() {
    let cmds = waveform_cmds(1);
    let cmds: Vec<&str> = cmds.iter().map(String::as_str).collect();
    let mut inst = crt_inst(
        &cmds,
        vec![
            InstReply::from(PREAMBLE),
            InstReply::Bytes(b"#14\x7c\x95".to_vec()),
            InstReply::Silence,
        ],
    );
    assert!(matches!(
        inst.get_channel(0).unwrap().waveform(),
        Err(InstrumentError::Framing(_))
    ));
}

/// Capture two cycles over two channels.
#[rstest]
fn test_capture_cycles() {
    let mut cmds = Vec::new();
    let mut replies = Vec::new();
    for _ in 0..2 {
        for channel in [1, 3] {
            cmds.extend(waveform_cmds(channel));
            cmds.push(format!(":MEASure:ITEM? VPP,CHANnel{channel}"));
            replies.extend([
                InstReply::from(PREAMBLE),
                sample_block(),
                InstReply::from("2.0e+00"),
            ]);
        }
    }
    let cmds: Vec<&str> = cmds.iter().map(String::as_str).collect();
    let mut inst = crt_inst(&cmds, replies);

    let worker = inst
        .start_capture(CaptureConfig::new(&[0, 2]).with_interval(Duration::ZERO).with_cycles(2))
        .unwrap();
    let frames: Vec<_> = (0..4)
        .map(|_| worker.recv_timeout(Duration::from_secs(2)).unwrap())
        .collect();
    assert!(worker.recv_timeout(Duration::from_millis(50)).is_none());
    worker.stop();

    let order: Vec<(usize, usize)> = frames.iter().map(|f| (f.cycle, f.channel)).collect();
    assert_eq!(order, vec![(0, 0), (0, 2), (1, 0), (1, 2)]);
    for frame in frames {
        assert_eq!(frame.waveform.len(), 4);
        assert!(almost_eq(frame.vpp.unwrap().as_volts(), 2.0));
    }
}

/// A malformed waveform clears the bus and skips the rest of the cycle.
#[rstest]
fn test_capture_skips_cycle_on_framing_error() {
    let mut cmds = waveform_cmds(1);
    cmds.push(DEVICE_CLEAR.to_string());
    cmds.extend(waveform_cmds(1));
    cmds.extend(waveform_cmds(2));
    let cmds: Vec<&str> = cmds.iter().map(String::as_str).collect();
    let replies = vec![
        InstReply::from(PREAMBLE),
        InstReply::Bytes(b"XX".to_vec()),
        InstReply::from(PREAMBLE),
        sample_block(),
        InstReply::from(PREAMBLE),
        sample_block(),
    ];
    let mut inst = crt_inst(&cmds, replies);

    let config = CaptureConfig::new(&[0, 1])
        .with_interval(Duration::ZERO)
        .with_cycles(2)
        .with_vpp(false);
    let worker = inst.start_capture(config).unwrap();
    let first = worker.recv_timeout(Duration::from_secs(2)).unwrap();
    let second = worker.recv_timeout(Duration::from_secs(2)).unwrap();
    worker.stop();

    assert_eq!((first.cycle, first.channel), (1, 0));
    assert_eq!((second.cycle, second.channel), (1, 1));
    assert!(first.vpp.is_none());
}

/// A timed out waveform clears the bus before the next channel is read.
#[rstest]
fn test_capture_clears_bus_on_timeout() {
    let mut cmds = waveform_cmds(1);
    cmds.push(DEVICE_CLEAR.to_string());
    cmds.extend(waveform_cmds(2));
    let cmds: Vec<&str> = cmds.iter().map(String::as_str).collect();
    let replies = vec![
        InstReply::from(PREAMBLE),
        InstReply::Silence,
        InstReply::from(PREAMBLE),
        sample_block(),
    ];
    let mut inst = crt_inst(&cmds, replies);

    let config = CaptureConfig::new(&[0, 1])
        .with_interval(Duration::ZERO)
        .with_cycles(1)
        .with_vpp(false);
    let worker = inst.start_capture(config).unwrap();
    let frame = worker.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(worker.recv_timeout(Duration::from_millis(50)).is_none());
    worker.stop();

    assert_eq!((frame.cycle, frame.channel), (0, 1));
}

#[rstest]
fn test_capture_invalid_channel(mut emp_inst: Ds1054zLbk) {
    assert!(emp_inst.start_capture(CaptureConfig::new(&[0, 4])).is_err());
}

/// The worker keeps running on errors until it is stopped.
#[rstest]
fn test_capture_stop() {
    let transport = StreamTransport::new(VecDeque::new(), Duration::from_millis(10)).unwrap();
    let mut inst = Ds1054z::from_session(Session::new(transport).unwrap()).unwrap();

    let worker = inst
        .start_capture(CaptureConfig::new(&[0]).with_interval(Duration::from_millis(5)))
        .unwrap();
    std::thread::sleep(Duration::from_millis(30));
    assert!(!worker.is_finished());
    worker.stop();
}
