use crate::infra::audit::{AuditEventType, AuditLogger};
use crate::infra::metrics::{LOOPS_RUNNING, LOOP_FAULTS};
use crate::infra::store::{sample_records, ControllerRecord, SettingsStore};
use crate::registry::HostRegistry;
use crate::runtime::config::RuntimeConfig;
use crate::runtime::error::AppError;
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thermo_core::{
    tags, ControlLoop, ControllerSettings, Demand, ExecutionStats, LoopConfig, OutputControl,
    OutputController, OutputResult, ShutdownSignal,
};
use tracing::{debug, error, info, warn};

type LoopHandle = thread::JoinHandle<(OutputResult<()>, ExecutionStats)>;

pub fn run_from_args() -> ExitCode {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }

    let _log_guard = init_tracing(config.json_logs, config.log_dir.as_deref());
    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "thermo-ctl exiting on error");
            ExitCode::FAILURE
        }
    }
}

pub fn run(config: RuntimeConfig) -> Result<(), AppError> {
    let store = SettingsStore::new(config.config_path.clone().ok_or(AppError::MissingConfig)?);

    if config.init_config {
        store.save(&sample_records())?;
        info!(path = %store.path().display(), "Example settings written");
        return Ok(());
    }

    let records = store.load()?;
    info!(
        path = %store.path().display(),
        controllers = records.len(),
        "Settings loaded"
    );

    telemetry::init();
    let metrics_enabled = config.metrics_addr.is_some();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let audit_logger = init_audit_logger(config.audit_path.as_deref())?;
    let audit = |event_type: AuditEventType, details: serde_json::Value| {
        if let Some(ref logger) = audit_logger {
            if let Err(e) = logger.log_event(event_type, details) {
                warn!(error = %e, "Failed to write audit entry");
            }
        }
    };

    let settings: Vec<ControllerSettings> = records.iter().map(ControllerSettings::from).collect();
    let registry = Arc::new(build_registry(&config, &settings)?);
    info!(backend = registry.describe(), "Pin registry ready");

    let cancel = ShutdownSignal::new();
    install_ctrl_c(&cancel)?;

    let mut controllers = Vec::with_capacity(records.len());
    for (record, settings) in records.iter().zip(&settings) {
        let controller = configure_controller(&registry, record, settings, &audit)?;
        controllers.push(controller);
    }

    audit(
        AuditEventType::SystemStart,
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "controllers": controllers.len(),
            "backend": registry.describe(),
            "tick_ms": config.tick_ms,
            "metrics_enabled": metrics_enabled,
        }),
    );

    let loop_config = LoopConfig { tick: config.tick() };
    let handles: Vec<(String, LoopHandle)> = controllers
        .iter()
        .map(|controller| {
            let handle = spawn_loop(controller.clone(), loop_config.clone(), cancel.clone());
            (controller.name().to_string(), handle)
        })
        .collect();

    let updater_stop = ShutdownSignal::new();
    let updater = telemetry::start_metrics_updater(controllers.clone(), updater_stop.clone());

    info!(
        controllers = handles.len(),
        "thermo-ctl running. Press Ctrl-C to stop."
    );

    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        wait_until(&cancel, Instant::now() + Duration::from_secs(seconds));
        cancel.raise();
    }

    let mut first_fault = None;
    let mut totals = ExecutionStats::default();
    for (name, handle) in handles {
        match handle.join() {
            Ok((Ok(()), stats)) => {
                info!(
                    controller = %name,
                    ticks_executed = stats.ticks_executed,
                    ticks_late = stats.ticks_late,
                    max_lateness_us = stats.max_lateness_us,
                    transitions = stats.transitions,
                    "Control loop complete"
                );
                audit(
                    AuditEventType::ControllerStopped,
                    serde_json::json!({
                        "controller": name,
                        "ticks_executed": stats.ticks_executed,
                        "transitions": stats.transitions,
                    }),
                );
                accumulate(&mut totals, &stats);
            }
            Ok((Err(source), stats)) => {
                LOOP_FAULTS.with_label_values(&[name.as_str()]).inc();
                audit(
                    AuditEventType::ControllerFault,
                    serde_json::json!({
                        "controller": name,
                        "identifier": source.identifier(),
                        "error": source.to_string(),
                    }),
                );
                accumulate(&mut totals, &stats);
                first_fault.get_or_insert(AppError::Output {
                    controller: name,
                    source,
                });
            }
            Err(_) => {
                LOOP_FAULTS.with_label_values(&[name.as_str()]).inc();
                error!(controller = %name, "Control loop thread panicked");
                audit(
                    AuditEventType::ControllerFault,
                    serde_json::json!({ "controller": name, "error": "panicked" }),
                );
            }
        }
    }

    updater_stop.raise();
    let _ = updater.join();

    audit(
        AuditEventType::SystemShutdown,
        serde_json::json!({
            "ticks_executed": totals.ticks_executed,
            "ticks_late": totals.ticks_late,
            "transitions": totals.transitions,
            "faulted": first_fault.is_some(),
        }),
    );

    match first_fault {
        Some(fault) => Err(fault),
        None => {
            info!("All outputs off, shutdown complete");
            Ok(())
        }
    }
}

fn configure_controller(
    registry: &Arc<HostRegistry>,
    record: &ControllerRecord,
    settings: &ControllerSettings,
    audit: &impl Fn(AuditEventType, serde_json::Value),
) -> Result<OutputController<HostRegistry>, AppError> {
    let controller =
        OutputController::new(&settings.name, OutputControl::new(Arc::clone(registry)));
    controller
        .configure(settings)
        .map_err(|source| AppError::Output {
            controller: settings.name.clone(),
            source,
        })?;

    match Demand::new(record.manual_duty_cycle, settings.cycle_time_secs).validate() {
        Ok(demand) => controller.set_demand(demand),
        Err(violation) => {
            warn!(
                controller = %settings.name,
                error = %violation,
                "Manual duty cycle rejected, starting idle"
            );
            audit(
                AuditEventType::DemandRejected,
                serde_json::json!({
                    "controller": settings.name,
                    "duty_cycle": record.manual_duty_cycle,
                    "error": violation.to_string(),
                }),
            );
        }
    }

    let status = controller.status();
    info!(
        controller = %settings.name,
        heat = %settings.heat.identifier,
        cool = %settings.cool.identifier,
        duty_cycle = status.duty_cycle,
        cycle_time_s = status.cycle_time_secs,
        "Controller configured"
    );
    let mut details = serde_json::json!({
        "controller": settings.name,
        "heat": settings.heat.identifier,
        "cool": settings.cool.identifier,
        "min_on_secs": settings.guard.min_on.as_secs(),
        "min_off_secs": settings.guard.min_off.as_secs(),
    });
    details[tags::DUTY_CYCLE.key] = status.duty_cycle.into();
    details[tags::CYCLE_TIME_S.key] = status.cycle_time_secs.into();
    details[tags::HEAT_ON.key] = status.heat_on().into();
    details[tags::COOL_ON.key] = status.cool_on().into();
    details[tags::VERIFY_FAILURES.key] = [&status.heat, &status.cool]
        .into_iter()
        .flatten()
        .map(|output| output.verify_failures)
        .sum::<u64>()
        .into();
    audit(AuditEventType::ControllerConfigured, details);
    Ok(controller)
}

/// One OS thread per controller. A fatal fault raises `cancel` so every
/// other loop also drives its outputs off.
fn spawn_loop(
    controller: OutputController<HostRegistry>,
    config: LoopConfig,
    cancel: ShutdownSignal,
) -> LoopHandle {
    thread::spawn(move || {
        LOOPS_RUNNING.inc();
        let mut control_loop = ControlLoop::new(controller, config);
        let result = control_loop.run(&cancel);
        if result.is_err() {
            cancel.raise();
        }
        LOOPS_RUNNING.dec();
        (result, control_loop.stats().clone())
    })
}

#[cfg_attr(not(feature = "rpi"), allow(unused_variables))]
fn build_registry(
    config: &RuntimeConfig,
    settings: &[ControllerSettings],
) -> Result<HostRegistry, AppError> {
    #[cfg(feature = "rpi")]
    if config.gpio {
        return Ok(HostRegistry::Gpio(crate::registry::gpio::GpioRegistry::new()?));
    }

    Ok(HostRegistry::simulated(
        settings.iter().flat_map(|s| s.identifiers()),
    ))
}

/// Ctrl-C raises the process-wide cancel signal.
fn install_ctrl_c(cancel: &ShutdownSignal) -> Result<(), AppError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|source| AppError::Io {
            context: "failed to start signal runtime",
            source,
        })?;
    let cancel = cancel.clone();
    thread::spawn(move || {
        runtime.block_on(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received, stopping control loops");
                    cancel.raise();
                }
                Err(e) => warn!(error = %e, "Ctrl-C handler unavailable"),
            }
        });
    });
    Ok(())
}

fn wait_until(cancel: &ShutdownSignal, deadline: Instant) {
    while !cancel.is_raised() {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(50)));
    }
    debug!("Cancelled before run deadline");
}

fn accumulate(totals: &mut ExecutionStats, stats: &ExecutionStats) {
    totals.ticks_executed += stats.ticks_executed;
    totals.ticks_late += stats.ticks_late;
    totals.max_lateness_us = totals.max_lateness_us.max(stats.max_lateness_us);
    totals.transitions += stats.transitions;
}

fn init_audit_logger(audit_path: Option<&Path>) -> Result<Option<AuditLogger>, AppError> {
    audit_path
        .map(|path| {
            let logger = AuditLogger::new(path).map_err(|source| AppError::Io {
                context: "failed to open audit log",
                source,
            })?;
            info!(path = %path.display(), "Audit logging enabled");
            Ok(logger)
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::store::OutPinRecord;
    use thermo_core::PinRegistry;

    #[test]
    fn simulated_registry_exposes_configured_lines() {
        let records = sample_records();
        let settings: Vec<_> = records.iter().map(ControllerSettings::from).collect();
        let registry = build_registry(&RuntimeConfig::default(), &settings).unwrap();

        assert!(registry.resolve("GPIO17").is_some());
        assert!(registry.resolve("GPIO27").is_some());
        assert!(registry.resolve("GPIO22").is_none());
    }

    #[test]
    fn out_of_range_manual_duty_starts_idle() {
        let mut record = sample_records().remove(0);
        record.manual_duty_cycle = 150;
        record.heat_output = Some(OutPinRecord {
            identifier: "GPIO5".into(),
            friendly_name: String::new(),
        });
        let settings = ControllerSettings::from(&record);
        let registry =
            Arc::new(build_registry(&RuntimeConfig::default(), &[settings.clone()]).unwrap());

        let rejected = std::cell::Cell::new(false);
        let configured = std::cell::RefCell::new(serde_json::Value::Null);
        let controller = configure_controller(&registry, &record, &settings, &|event, details| {
            match event {
                AuditEventType::DemandRejected => rejected.set(true),
                AuditEventType::ControllerConfigured => *configured.borrow_mut() = details,
                _ => {}
            }
        })
        .unwrap();

        assert!(rejected.get());
        let configured = configured.into_inner();
        assert_eq!(configured[tags::DUTY_CYCLE.key], 0);
        assert_eq!(configured[tags::HEAT_ON.key], false);
        assert_eq!(configured[tags::COOL_ON.key], false);
        assert_eq!(configured[tags::VERIFY_FAILURES.key], 0);
        let status = controller.status();
        assert_eq!(status.duty_cycle, 0);
        assert_eq!(status.cycle_time_secs, record.cycle_time);
        assert!(!status.heat_on());
    }

    #[test]
    fn run_without_config_is_an_error() {
        let err = run(RuntimeConfig::default()).unwrap_err();
        assert!(matches!(err, AppError::MissingConfig));
    }
}
