//! Chassis and system collectors reading `omreport chassis ...`.

use std::sync::Arc;

use super::omreport::{is_indexed, object_id, reading, sanitize, severity, Omreport};
use super::{Collector, OmreportCollector};
use crate::types::{labels, Labels, Metric};

const DESC_CHASSIS: &str = "Overall status of chassis components.";
const DESC_SYSTEM: &str = "Overall status of system components.";
const DESC_FAN: &str = "Overall status of system fans.";
const DESC_FAN_SPEED: &str = "System fan speed.";
const DESC_MEMORY: &str = "System RAM DIMM status.";
const DESC_CPU: &str = "Overall status of CPUs.";
const DESC_TEMP: &str = "Overall status of system temperature readings.";
const DESC_TEMP_READING: &str = "System temperature readings.";
const DESC_VOLT: &str = "Overall status of power supply volt readings.";
const DESC_VOLT_READING: &str = "Volts used per power supply.";
const DESC_PS: &str = "Overall status of power supplies.";
const DESC_CURRENT: &str = "Amps used per power supply.";
const DESC_POWER: &str = "System board power usage.";
const DESC_POWER_THRESHOLD: &str =
    "The warning and failure levels set on the device for system board power usage.";

pub fn collectors(omreport: &Omreport) -> Vec<Arc<dyn Collector>> {
    let entries: [(&'static str, &'static [&'static str], super::RowParser); 9] = [
        ("chassis", &["chassis"], parse_chassis),
        ("system", &["system"], parse_system),
        ("fans", &["chassis", "fans"], parse_fans),
        ("memory", &["chassis", "memory"], parse_memory),
        ("processors", &["chassis", "processors"], parse_processors),
        ("temps", &["chassis", "temps"], parse_temps),
        ("volts", &["chassis", "volts"], parse_volts),
        ("ps", &["chassis", "pwrsupplies"], parse_ps),
        ("ps_amps_sysboard_pwr", &["chassis", "pwrmonitoring"], parse_pwrmonitoring),
    ];

    entries
        .into_iter()
        .map(|(name, args, parse)| {
            Arc::new(OmreportCollector::new(name, args, parse, omreport.clone())) as Arc<dyn Collector>
        })
        .collect()
}

/// `SEVERITY;COMPONENT` rows
fn component_status(fields: &[String], name: &str, desc: &str) -> Vec<Metric> {
    if fields.len() != 2 || fields[0] == "SEVERITY" {
        return vec![];
    }
    vec![Metric::new(
        name,
        severity(&fields[0]),
        labels([("component", sanitize(&fields[1]))]),
        desc,
    )]
}

pub fn parse_chassis(fields: &[String]) -> Vec<Metric> {
    component_status(fields, "chassis", DESC_CHASSIS)
}

pub fn parse_system(fields: &[String]) -> Vec<Metric> {
    component_status(fields, "system", DESC_SYSTEM)
}

/// Indexed sensor rows: `Index;Status;Probe Name;Reading;...`
fn probe(fields: &[String], width: usize) -> Option<Labels> {
    if fields.len() != width || !is_indexed(fields) {
        return None;
    }
    Some(labels([("name", sanitize(&fields[2]))]))
}

pub fn parse_fans(fields: &[String]) -> Vec<Metric> {
    let Some(l) = probe(fields, 8) else { return vec![] };
    let mut out = vec![Metric::new("chassis_fan", severity(&fields[1]), l.clone(), DESC_FAN)];
    if let Some(rpm) = reading(&fields[3], "RPM") {
        out.push(Metric::new("chassis_fan_reading", rpm, l, DESC_FAN_SPEED));
    }
    out
}

pub fn parse_memory(fields: &[String]) -> Vec<Metric> {
    let Some(l) = probe(fields, 5) else { return vec![] };
    vec![Metric::new("chassis_memory", severity(&fields[1]), l, DESC_MEMORY)]
}

pub fn parse_processors(fields: &[String]) -> Vec<Metric> {
    let Some(l) = probe(fields, 8) else { return vec![] };
    vec![Metric::new("chassis_processor", severity(&fields[1]), l, DESC_CPU)]
}

pub fn parse_temps(fields: &[String]) -> Vec<Metric> {
    let Some(l) = probe(fields, 8) else { return vec![] };
    let mut out = vec![Metric::new("chassis_temps", severity(&fields[1]), l.clone(), DESC_TEMP)];
    if let Some(celsius) = reading(&fields[3], "C") {
        out.push(Metric::new("chassis_temps_reading", celsius, l, DESC_TEMP_READING));
    }
    out
}

pub fn parse_volts(fields: &[String]) -> Vec<Metric> {
    let Some(l) = probe(fields, 8) else { return vec![] };
    let mut out = vec![Metric::new("chassis_volts", severity(&fields[1]), l.clone(), DESC_VOLT)];
    if let Some(volts) = reading(&fields[3], "V") {
        out.push(Metric::new("chassis_volts_reading", volts, l, DESC_VOLT_READING));
    }
    out
}

pub fn parse_ps(fields: &[String]) -> Vec<Metric> {
    if fields.len() < 3 || fields[0] == "Index" {
        return vec![];
    }
    vec![Metric::new(
        "ps",
        severity(&fields[1]),
        labels([("id", object_id(&fields[0]))]),
        DESC_PS,
    )]
}

/// Per-supply amperage rows (`PS 1 Current 1;0.6 A`) and the system board
/// power row with its warning and failure thresholds.
pub fn parse_pwrmonitoring(fields: &[String]) -> Vec<Metric> {
    if fields.len() == 2 && fields[0].contains("Current") {
        let id: String = match fields[0].split("Current").next() {
            Some(prefix) => prefix.chars().filter(|c| !c.is_whitespace()).collect(),
            None => return vec![],
        };
        let Some(amps) = fields[1].split_whitespace().next() else { return vec![] };
        if id.is_empty() {
            return vec![];
        }
        return vec![Metric::new("chassis_current_reading", amps, labels([("id", id)]), DESC_CURRENT)];
    }

    if fields.len() == 6
        && (fields[2] == "System Board Pwr Consumption" || fields[2] == "System Board System Level")
    {
        let first = |f: &String| f.split_whitespace().next().map(String::from);
        let (Some(now), Some(warn), Some(fail)) = (first(&fields[3]), first(&fields[4]), first(&fields[5])) else {
            return vec![];
        };
        return vec![
            Metric::new("chassis_power_reading", now, Labels::new(), DESC_POWER),
            Metric::new("chassis_power_warn_level", warn, Labels::new(), DESC_POWER_THRESHOLD),
            Metric::new("chassis_power_fail_level", fail, Labels::new(), DESC_POWER_THRESHOLD),
        ];
    }

    vec![]
}
