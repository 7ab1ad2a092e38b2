use std::path::PathBuf;
use std::time::Duration;
use thermo_core::control_loop::DEFAULT_TICK;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub config_path: Option<PathBuf>,
    pub init_config: bool,
    pub tick_ms: u64,
    pub run_seconds: Option<u64>,
    pub json_logs: bool,
    pub log_dir: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub audit_path: Option<PathBuf>,
    #[cfg(feature = "rpi")]
    pub gpio: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            config_path: None,
            init_config: false,
            tick_ms: DEFAULT_TICK.as_millis() as u64,
            run_seconds: None,
            json_logs: false,
            log_dir: None,
            metrics_addr: None,
            audit_path: None,
            #[cfg(feature = "rpi")]
            gpio: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" => {
                    if i + 1 < args.len() {
                        cfg.config_path = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--init-config" => {
                    cfg.init_config = true;
                }
                "--tick-ms" => {
                    if i + 1 < args.len() {
                        cfg.tick_ms = args[i + 1]
                            .parse::<u64>()
                            .ok()
                            .filter(|ms| *ms > 0)
                            .unwrap_or(cfg.tick_ms);
                        i += 1;
                    }
                }
                "--run-seconds" => {
                    if i + 1 < args.len() {
                        cfg.run_seconds = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--log-dir" => {
                    if i + 1 < args.len() {
                        cfg.log_dir = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--metrics-addr" => {
                    if i + 1 < args.len() {
                        cfg.metrics_addr = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--audit-log" => {
                    if i + 1 < args.len() {
                        cfg.audit_path = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                #[cfg(feature = "rpi")]
                "--gpio" => {
                    cfg.gpio = true;
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        cfg
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn print_help() {
        println!(
            r#"thermo-ctl - PWM heat/cool output control

USAGE:
    thermo-ctl --config <PATH> [OPTIONS]

OPTIONS:
    --config <PATH>         Controller settings file (JSON)
    --init-config           Write an example settings file to --config and exit
    --tick-ms <MS>          Evaluation period in milliseconds [default: 10]
    --run-seconds <SECS>    Run for a fixed duration then exit
    --json-logs             Output logs in JSON format (for log aggregation)
    --log-dir <DIR>         Also write JSON logs to a daily rolling file in DIR
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --audit-log <PATH>      Enable audit logging to specified JSONL file
    --gpio                  Drive Raspberry Pi GPIO lines (requires 'rpi' feature)
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,thermo_core=trace)

EXAMPLES:
    # Create a settings file, then run it against simulated pins
    thermo-ctl --config settings.json --init-config
    thermo-ctl --config settings.json --run-seconds 10

    # Production run on a Pi with all observability
    thermo-ctl --config /etc/thermo/settings.json --gpio --json-logs \
        --metrics-addr 0.0.0.0:9090 --audit-log /var/log/thermo/audit.jsonl
"#
        );
    }
}
