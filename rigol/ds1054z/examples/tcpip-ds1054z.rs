use std::time::Duration;

use scpisession::TcpIpTransport;

use rigol_ds1054z::{CaptureConfig, Ds1054z};

fn main() {
    // Log to stdout, set `RUST_LOG=debug` to see the commands sent to the oscilloscope.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rigol_ds1054z=info".parse().unwrap()),
        )
        .init();

    // Open the oscilloscope through its raw socket.
    let transport = TcpIpTransport::try_new("192.168.1.145:5555").unwrap();
    let mut scope = Ds1054z::try_new(transport).unwrap();

    println!("Instrument name: {}", scope.get_name().unwrap());

    // Switch on the first two channels and let the scope find the signals.
    for idx in 0..2 {
        scope.get_channel(idx).unwrap().set_display(true).unwrap();
    }
    scope.autoscale().unwrap();
    println!("Timebase: {:?} per division", scope.timebase_scale().unwrap());

    // Read a single waveform
    let mut ch1 = scope.get_channel(0).unwrap();
    let waveform = ch1.waveform().unwrap();
    println!(
        "Channel 1: {} points, Vpp = {}",
        waveform.len(),
        ch1.vpp().unwrap()
    );

    // Now capture both channels ten times, twice per second.
    let config = CaptureConfig::new(&[0, 1])
        .with_interval(Duration::from_millis(500))
        .with_cycles(10);
    let worker = scope.start_capture(config).unwrap();
    for frame in worker.frames().iter() {
        let vpp = frame.vpp.map(|v| v.as_volts()).unwrap_or_default();
        println!(
            "Cycle {}, channel {}: {} points, Vpp = {vpp:.3} V",
            frame.cycle,
            frame.channel + 1,
            frame.waveform.len()
        );
    }
    worker.stop();
}
