#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub key: &'static str,
    pub metric: &'static str,
}

pub const PRESSURE_BAR: Tag = Tag {
    key: "pressure_bar",
    metric: "astra_wellhead_pressure_bar",
};

pub const FLOW_LPS: Tag = Tag {
    key: "flow_lps",
    metric: "astra_wellhead_flow_litres_per_second",
};

pub const VALVE_POSITION_PCT: Tag = Tag {
    key: "valve_position_pct",
    metric: "astra_valve_position_percent",
};

pub const LEAK_VOLUME_L: Tag = Tag {
    key: "leak_volume_l",
    metric: "astra_leak_volume_litres",
};

pub const UPTIME_S: Tag = Tag {
    key: "uptime_s",
    metric: "astra_uptime_seconds",
};

pub const EMERGENCY_ACTIVE: Tag = Tag {
    key: "is_emergency",
    metric: "astra_emergency_active",
};

pub const LEAK_ACTIVE: Tag = Tag {
    key: "is_leaking",
    metric: "astra_leak_active",
};
