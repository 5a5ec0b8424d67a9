//! Desktop simulation of the throttle core.
//!
//! Runs the analog filter and the loco manager against mock hardware and a
//! mock layout server, printing what the throttle would send:
//! - two locos acquired, the second one exclusively
//! - the knob swept up and back down
//! - an emergency stop and its release at zero
//!
//! # Usage
//!
//! ```sh
//! cargo run --example desktop_sim
//! ```
//!
//! # Configuration
//!
//! Edit the `Config::default()` call in `main()` to try other addresses or
//! function maps.

use rs_wireless_throttle::hal::{MockFrontEnd, MockInputs, MockServer, ServerCall};
use rs_wireless_throttle::traits::Key;
use rs_wireless_throttle::{
    AnalogFilter, Config, FunctionMap, FunctionMode, LocoConfig, LocoManager, RequestStatus,
    SpeedSignal,
};

type Manager = LocoManager<MockServer, MockInputs>;

fn main() -> anyhow::Result<()> {
    println!("=================================");
    println!("  rs-wireless-throttle Simulator");
    println!("=================================");
    println!();

    let config = Config::default()
        .with_loco(0, LocoConfig::default().with_address(3, false))
        .with_loco(
            1,
            LocoConfig::default()
                .with_address(1234, true)
                .with_reverse(true)
                .with_functions(
                    FunctionMap::default()
                        .with(0, FunctionMode::AlwaysOn)
                        .with(12, FunctionMode::Unknown),
                ),
        );
    config.validate()?;

    // Every request takes two polls to come back
    let server = MockServer::auto_resolve(2, RequestStatus::Success);
    let mut manager = LocoManager::new(server, MockInputs::new(), &config.locos)?;

    let signal = SpeedSignal::new();
    let mut adc = MockFrontEnd::new();
    let mut filter = AnalogFilter::new(&signal, config.analog, config.analog.battery_threshold());
    filter.start(&mut adc);

    println!("Acquiring loco 1...");
    manager.inputs_mut().press(Key::Loco1);
    run_ticks(&mut manager, 4);
    print_status(&manager);

    println!("Shift + loco 2: acquire it as the only runner...");
    manager.inputs_mut().hold(Key::Shift);
    manager.inputs_mut().press(Key::Loco2);
    run_ticks(&mut manager, 4);
    manager.inputs_mut().let_go(Key::Shift);
    print_status(&manager);

    println!("Sweeping knob up then down...");
    let full_scale = config.analog.adc_full_scale;
    for step in (0..=8).chain((0..8).rev()) {
        // Knob reads full scale at rest
        let raw = full_scale - full_scale / 8 * step;
        // Speed cycle then battery cycle
        for _ in 0..config.analog.samples_per_cycle {
            filter.on_conversion_complete(raw, &mut adc);
        }
        for _ in 0..config.analog.samples_per_cycle {
            filter.on_conversion_complete(full_scale, &mut adc);
        }
        if signal.speed_triggered() {
            let speed = signal.read_speed();
            let sent = manager.drive(speed);
            println!("  speed {:3} -> {} loco(s)", speed, sent);
        }
    }
    println!();

    println!("Emergency stop...");
    manager.inputs_mut().press(Key::EStop);
    run_ticks(&mut manager, 1);
    println!("  drive(40) reached {} loco(s)", manager.drive(40));
    println!("  drive(0) reached {} loco(s)", manager.drive(0));
    println!("  all locos off: {}", manager.all_locos_off());
    println!();

    println!("Shift + loco 2: drop it...");
    manager.inputs_mut().hold(Key::Shift);
    manager.inputs_mut().press(Key::Loco2);
    run_ticks(&mut manager, 1);
    manager.inputs_mut().let_go(Key::Shift);
    print_status(&manager);

    println!("Server traffic:");
    for call in &manager.server().calls {
        match call {
            ServerCall::Acquire { address, .. } => println!("  acquire  {}", address),
            ServerCall::Release { address, .. } => println!("  release  {}", address),
            ServerCall::Function {
                address,
                index,
                active,
            } => println!("  function {} F{} {}", address, index, on_off(*active)),
            ServerCall::Speed {
                address,
                speed,
                forward,
            } => println!(
                "  speed    {} {} {}",
                address,
                speed,
                if *forward { "fwd" } else { "rev" }
            ),
        }
    }

    Ok(())
}

fn run_ticks(manager: &mut Manager, ticks: usize) {
    for _ in 0..ticks {
        manager.poll();
    }
}

fn print_status(manager: &Manager) {
    let status = manager.status();
    for (i, slot) in status.slots.iter().enumerate() {
        let address = match slot.address {
            Some(address) => format!("{}", address),
            None => "-".to_string(),
        };
        println!(
            "  slot {}: {:<16} {:<6} running={}",
            i + 1,
            slot.state.as_str(),
            address,
            slot.running
        );
    }
    println!();
}

fn on_off(active: bool) -> &'static str {
    if active {
        "on"
    } else {
        "off"
    }
}
