// tara-core/src/control/probe.rs
//
// Walks a robot through connect / observe / act / disconnect. Operations
// that report `NotImplemented` are noted and skipped; anything else aborts.

use tracing::{info, warn};

use tara_common::models::action::zero_action;
use tara_common::traits::Robot;
use crate::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Ok,
    NotImplemented(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    pub steps: Vec<(&'static str, ProbeOutcome)>,
}

impl ProbeReport {
    pub fn outcome(&self, step: &str) -> Option<&ProbeOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }
}

fn note<T>(report: &mut ProbeReport, step: &'static str, result: Result<T, Error>) -> Result<(), Error> {
    match result {
        Ok(_) => {
            info!("probe {}: ok", step);
            report.steps.push((step, ProbeOutcome::Ok));
            Ok(())
        }
        Err(Error::NotImplemented(what)) => {
            warn!("probe {}: not implemented ({})", step, what);
            report.steps.push((step, ProbeOutcome::NotImplemented(what)));
            Ok(())
        }
        Err(e) => Err(e),
    }
}

pub async fn probe(robot: &mut dyn Robot) -> Result<ProbeReport, Error> {
    let mut report = ProbeReport::default();

    let connected = robot.connect(true).await;
    note(&mut report, "connect", connected)?;

    let observed = robot.get_observation().await;
    note(&mut report, "get_observation", observed)?;

    let action = zero_action(&robot.action_features());
    let sent = robot.send_action(&action).await;
    note(&mut report, "send_action", sent)?;

    let disconnected = robot.disconnect().await;
    note(&mut report, "disconnect", disconnected)?;

    Ok(report)
}
