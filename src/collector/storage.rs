//! Storage collectors reading `omreport storage ...`.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use super::omreport::{object_id, severity, Omreport};
use super::{Collector, OmreportCollector};
use crate::ingest::Recorder;
use crate::types::{labels, Metric};

const DESC_BATTERY: &str = "Status of storage controller backup batteries.";
const DESC_CONTROLLER: &str = "Overall status of storage controllers.";
const DESC_ENCLOSURE: &str = "Overall status of storage enclosures.";
const DESC_VDISK: &str = "Overall status of virtual disks.";
const DESC_PDISK: &str = "Overall status of physical disks.";

pub fn collectors(omreport: &Omreport) -> Vec<Arc<dyn Collector>> {
    let mut collectors: Vec<Arc<dyn Collector>> = Vec::new();
    collectors.push(Arc::new(OmreportCollector::new(
        "storage_battery", &["storage", "battery"], parse_battery, omreport.clone(),
    )));
    collectors.push(Arc::new(OmreportCollector::new(
        "storage_enclosure", &["storage", "enclosure"], parse_enclosure, omreport.clone(),
    )));
    collectors.push(Arc::new(OmreportCollector::new(
        "storage_vdisk", &["storage", "vdisk"], parse_vdisk, omreport.clone(),
    )));
    collectors.push(Arc::new(ControllerCollector { omreport: omreport.clone() }));
    collectors
}

/// `ID;Status;...` rows, one status gauge per object
fn object_status(fields: &[String], name: &str, desc: &str) -> Vec<Metric> {
    if fields.len() < 3 || fields[0] == "ID" {
        return vec![];
    }
    vec![Metric::new(name, severity(&fields[1]), labels([("id", object_id(&fields[0]))]), desc)]
}

pub fn parse_battery(fields: &[String]) -> Vec<Metric> {
    object_status(fields, "storage_battery", DESC_BATTERY)
}

pub fn parse_enclosure(fields: &[String]) -> Vec<Metric> {
    object_status(fields, "storage_enclosure", DESC_ENCLOSURE)
}

pub fn parse_vdisk(fields: &[String]) -> Vec<Metric> {
    object_status(fields, "storage_vdisk", DESC_VDISK)
}

/// Physical disk rows for one controller. The controller id is kept as a
/// label because disk ids repeat across controllers.
pub fn parse_pdisk(controller: &str, fields: &[String]) -> Vec<Metric> {
    if fields.len() < 3 || fields[0] == "ID" {
        return vec![];
    }
    vec![Metric::new(
        "storage_pdisk",
        severity(&fields[1]),
        labels([("controller", object_id(controller)), ("id", object_id(&fields[0]))]),
        DESC_PDISK,
    )]
}

/// Reports controller status, then the physical disks behind each controller.
pub struct ControllerCollector {
    omreport: Omreport,
}

#[async_trait]
impl Collector for ControllerCollector {
    fn name(&self) -> &str { "storage_controller" }

    async fn collect(&self, recorder: &Recorder) -> Result<()> {
        let rows = self.omreport.run(&["storage", "controller"]).await?;

        for row in rows.iter().filter(|r| r.len() >= 3 && r[0] != "ID") {
            let controller = row[0].as_str();

            let selector = format!("controller={}", controller);
            for disk in self.omreport.run(&["storage", "pdisk", selector.as_str()]).await? {
                for metric in parse_pdisk(controller, &disk) {
                    recorder.record(metric)?;
                }
            }

            recorder.record(Metric::new(
                "storage_controller",
                severity(&row[1]),
                labels([("id", object_id(controller))]),
                DESC_CONTROLLER,
            ))?;
        }

        Ok(())
    }
}
