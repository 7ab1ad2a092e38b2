//! Prometheus metrics for controller status.
//!
//! Every gauge is labelled with the controller name so one process can
//! report several heat/cool pairs.

use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use thermo_core::tags;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn gauge_vec(name: &str, help: &str, labels: &[&str]) -> GaugeVec {
    let gauge = GaugeVec::new(Opts::new(name, help), labels).expect("valid gauge definition");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("gauge registered once");
    gauge
}

// ============================================================================
// Output State
// ============================================================================

/// Heat output state (1 = on)
pub static HEAT_ON: LazyLock<GaugeVec> = LazyLock::new(|| {
    gauge_vec(
        tags::HEAT_ON.metric,
        "Heat output state (1=on, 0=off)",
        &["controller"],
    )
});

/// Cool output state (1 = on)
pub static COOL_ON: LazyLock<GaugeVec> = LazyLock::new(|| {
    gauge_vec(
        tags::COOL_ON.metric,
        "Cool output state (1=on, 0=off)",
        &["controller"],
    )
});

/// Writes that still failed read-back verification after the retry
pub static VERIFY_FAILURES: LazyLock<GaugeVec> = LazyLock::new(|| {
    gauge_vec(
        tags::VERIFY_FAILURES.metric,
        "Output writes whose read-back did not match",
        &["controller", "output"],
    )
});

// ============================================================================
// Demand
// ============================================================================

pub static DUTY_CYCLE: LazyLock<GaugeVec> = LazyLock::new(|| {
    gauge_vec(
        tags::DUTY_CYCLE.metric,
        "Commanded duty cycle (-100..100, positive = heat)",
        &["controller"],
    )
});

pub static CYCLE_TIME_S: LazyLock<GaugeVec> = LazyLock::new(|| {
    gauge_vec(
        tags::CYCLE_TIME_S.metric,
        "PWM cycle period in seconds",
        &["controller"],
    )
});

// ============================================================================
// Loop Lifecycle
// ============================================================================

/// Control loops currently running
pub static LOOPS_RUNNING: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new("thermo_control_loops_running", "Control loops currently running")
        .expect("valid gauge definition");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("gauge registered once");
    gauge
});

/// Control loops that ended on a fatal output fault
pub static LOOP_FAULTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "thermo_control_loop_faults_total",
            "Control loops stopped by a fatal output fault",
        ),
        &["controller"],
    )
    .expect("valid counter definition");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("counter registered once");
    counter
});

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            match request.url() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let mut buffer = Vec::new();

                    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        let _ = request.respond(
                            Response::from_string("Internal Server Error").with_status_code(500),
                        );
                        continue;
                    }

                    let response = match tiny_http::Header::from_bytes(
                        &b"Content-Type"[..],
                        &b"text/plain; version=0.0.4"[..],
                    ) {
                        Ok(header) => Response::from_data(buffer).with_header(header),
                        Err(()) => Response::from_data(buffer),
                    };
                    let _ = request.respond(response);
                }
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    if LOOPS_RUNNING.get() > 0 {
                        let _ = request.respond(Response::from_string("Ready"));
                    } else {
                        let _ = request
                            .respond(Response::from_string("Not Ready").with_status_code(503));
                    }
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    LazyLock::force(&HEAT_ON);
    LazyLock::force(&COOL_ON);
    LazyLock::force(&VERIFY_FAILURES);
    LazyLock::force(&DUTY_CYCLE);
    LazyLock::force(&CYCLE_TIME_S);
    LazyLock::force(&LOOPS_RUNNING);
    LazyLock::force(&LOOP_FAULTS);
}
