//! Classifies every node by the age of its last catalog and folds the results into a single
//! nagios state.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::inventory::{FetchError, Node, NodeSource};
use crate::{Metric, Resource, ServiceState, TriggerIfValue, Unit};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("Couldn't check nodes: {0}")]
    Fetch(#[from] FetchError),
    #[error("threshold of {days} days is out of range")]
    ThresholdOutOfRange { days: i64 },
}

/// The two instants every node is judged against. Computed once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub now: DateTime<Utc>,
    pub warning_days: i64,
    pub critical_days: i64,
    /// Nodes that checked in before this are at least WARNING.
    pub warn_before: DateTime<Utc>,
    /// Nodes that checked in before this are CRITICAL.
    pub crit_before: DateTime<Utc>,
}

impl Thresholds {
    /// Inverted thresholds (`warning_days > critical_days`) are accepted and only logged.
    pub fn at(
        now: DateTime<Utc>,
        warning_days: i64,
        critical_days: i64,
    ) -> Result<Self, CheckError> {
        if warning_days > critical_days {
            warn!(
                warning_days,
                critical_days, "warning threshold is longer than the critical threshold"
            );
        }

        Ok(Thresholds {
            now,
            warning_days,
            critical_days,
            warn_before: days_before(now, warning_days)?,
            crit_before: days_before(now, critical_days)?,
        })
    }
}

fn days_before(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>, CheckError> {
    TimeDelta::try_days(days)
        .and_then(|delta| now.checked_sub_signed(delta))
        .ok_or(CheckError::ThresholdOutOfRange { days })
}

/// The verdict for a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub name: String,
    pub state: ServiceState,
    /// Empty for OK nodes, otherwise a single line ending in `\n`.
    pub message: String,
    /// None if the timestamp couldn't be parsed.
    pub checked_in: Option<DateTime<Utc>>,
}

pub fn classify(node: &Node, thresholds: &Thresholds) -> Classification {
    let raw = node.catalog_timestamp.as_deref().unwrap_or("");

    let (state, message, checked_in) = match DateTime::parse_from_rfc3339(raw) {
        Err(err) => {
            debug!(node = %node.name, timestamp = raw, %err, "unparsable catalog timestamp");
            (
                ServiceState::Unknown,
                format!(
                    "Node: {} supplied us with incorrect time format.\n",
                    node.name
                ),
                None,
            )
        }
        Ok(t) => {
            let t = t.with_timezone(&Utc);

            if t < thresholds.crit_before {
                (
                    ServiceState::Critical,
                    format!(
                        "Node: {} checked in more than {} days ago: {}.\n",
                        node.name, thresholds.critical_days, raw
                    ),
                    Some(t),
                )
            } else if t < thresholds.warn_before {
                (
                    ServiceState::Warning,
                    format!(
                        "Node: {} checked in more than {} days ago: {}.\n",
                        node.name, thresholds.warning_days, raw
                    ),
                    Some(t),
                )
            } else {
                (ServiceState::Ok, String::new(), Some(t))
            }
        }
    };

    Classification {
        name: node.name.clone(),
        state,
        message,
        checked_in,
    }
}

/// Outcome of a whole run. Only the non-OK nodes are kept, in the order PuppetDB listed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    thresholds: Thresholds,
    total: usize,
    broken: Vec<Classification>,
    oldest_checkin: Option<DateTime<Utc>>,
}

impl Report {
    pub fn evaluate(nodes: &[Node], thresholds: &Thresholds) -> Self {
        let mut broken = Vec::new();
        let mut oldest_checkin: Option<DateTime<Utc>> = None;

        for node in nodes {
            let classification = classify(node, thresholds);
            debug!(node = %classification.name, state = %classification.state, "classified node");

            if let Some(t) = classification.checked_in {
                oldest_checkin = Some(oldest_checkin.map_or(t, |oldest| oldest.min(t)));
            }
            if classification.state != ServiceState::Ok {
                broken.push(classification);
            }
        }

        Report {
            thresholds: *thresholds,
            total: nodes.len(),
            broken,
            oldest_checkin,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn broken(&self) -> &[Classification] {
        &self.broken
    }

    /// The worst state among the broken nodes, OK if there are none.
    pub fn state(&self) -> ServiceState {
        self.broken
            .iter()
            .map(|c| c.state)
            .max()
            .unwrap_or(ServiceState::Ok)
    }

    pub fn message(&self) -> String {
        let mut message = format!(
            "Total Nodes: {}, broken nodes: {}\n",
            self.total,
            self.broken.len()
        );
        for classification in &self.broken {
            message.push_str(&classification.message);
        }
        message
    }

    /// Age of the oldest parsable catalog timestamp.
    pub fn oldest_catalog_age(&self) -> Option<TimeDelta> {
        self.oldest_checkin.map(|t| self.thresholds.now - t)
    }

    pub fn to_resource(&self) -> Resource {
        let mut resource = Resource::new()
            .with_state(self.state())
            .with_description(self.message())
            .with_result(Metric::new("nodes", self.total).with_min(0))
            .with_result(
                Metric::new("broken_nodes", self.broken.len())
                    .with_min(0)
                    .with_max(self.total),
            );

        if let Some(age) = self.oldest_catalog_age() {
            resource = resource.with_result(
                Metric::new("oldest_catalog_age", age.num_seconds())
                    .with_thresholds(
                        Some(self.thresholds.warning_days.saturating_mul(SECONDS_PER_DAY)),
                        Some(self.thresholds.critical_days.saturating_mul(SECONDS_PER_DAY)),
                        TriggerIfValue::Greater,
                    )
                    .with_unit(Unit::Seconds),
            );
        }

        resource
    }
}

/// Fetches all nodes from `source` and evaluates them against `thresholds`.
///
/// A failed fetch aborts the whole run, there are no partial results.
pub fn run(source: &impl NodeSource, thresholds: &Thresholds) -> Result<Resource, CheckError> {
    let nodes = source.nodes()?;
    info!(count = nodes.len(), "fetched nodes from puppetdb");

    let report = Report::evaluate(&nodes, thresholds);
    info!(broken = report.broken().len(), state = %report.state(), "evaluated nodes");

    Ok(report.to_resource())
}
