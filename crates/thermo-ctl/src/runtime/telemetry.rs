use crate::infra::metrics::{
    init_metrics, serve_metrics, COOL_ON, CYCLE_TIME_S, DUTY_CYCLE, HEAT_ON, VERIFY_FAILURES,
};
use crate::registry::HostRegistry;
use std::thread;
use std::time::Duration;
use thermo_core::{ControlStatus, OutputController, OutputStatus, ShutdownSignal};
use tracing::info;

const PUBLISH_INTERVAL: Duration = Duration::from_millis(200);

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

pub fn start_metrics_updater(
    controllers: Vec<OutputController<HostRegistry>>,
    stop: ShutdownSignal,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !stop.is_raised() {
            for controller in &controllers {
                publish(controller.name(), &controller.status());
            }
            thread::sleep(PUBLISH_INTERVAL);
        }
        // Final snapshot so scrapes after shutdown show the outputs off.
        for controller in &controllers {
            publish(controller.name(), &controller.status());
        }
    })
}

pub(crate) fn publish(name: &str, status: &ControlStatus) {
    let flag = |on: bool| if on { 1.0 } else { 0.0 };
    HEAT_ON.with_label_values(&[name]).set(flag(status.heat_on()));
    COOL_ON.with_label_values(&[name]).set(flag(status.cool_on()));
    DUTY_CYCLE
        .with_label_values(&[name])
        .set(status.duty_cycle as f64);
    CYCLE_TIME_S
        .with_label_values(&[name])
        .set(status.cycle_time_secs as f64);

    for output in [&status.heat, &status.cool].into_iter().flatten() {
        publish_output(name, output);
    }
}

fn publish_output(name: &str, output: &OutputStatus) {
    VERIFY_FAILURES
        .with_label_values(&[name, output.identifier.as_str()])
        .set(output.verify_failures as f64);
}
