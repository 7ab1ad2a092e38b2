/// Name of a reported value across log fields and metric families.
#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub key: &'static str,
    pub metric: &'static str,
}

pub const HEAT_ON: Tag = Tag {
    key: "heat_on",
    metric: "thermo_heat_output_on",
};

pub const COOL_ON: Tag = Tag {
    key: "cool_on",
    metric: "thermo_cool_output_on",
};

pub const DUTY_CYCLE: Tag = Tag {
    key: "duty_cycle",
    metric: "thermo_duty_cycle_percent",
};

pub const CYCLE_TIME_S: Tag = Tag {
    key: "cycle_time_s",
    metric: "thermo_cycle_time_seconds",
};

pub const VERIFY_FAILURES: Tag = Tag {
    key: "verify_failures",
    metric: "thermo_output_verify_failures",
};
