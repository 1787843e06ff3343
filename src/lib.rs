//! A nagios/icinga check which asks PuppetDB for all known nodes and reports every node that
//! hasn't applied its catalog within the configured number of days.
//!
//! The crate is split into the plugin output model ([Resource], [Metric], [ServiceState]),
//! which knows how nagios expects a check to print and exit, and the check itself
//! ([check], [inventory], [config]).
//!
//! ```rust
//! # use check_puppetdb_nodes::{Metric, Resource, ServiceState};
//! let resource = Resource::new()
//!     .with_state(ServiceState::Ok)
//!     .with_description("Total Nodes: 1, broken nodes: 0\n")
//!     .with_result(Metric::new("nodes", 1usize).with_min(0));
//! assert_eq!(
//!     &resource.to_nagios_string(),
//!     "OK: Total Nodes: 1, broken nodes: 0 | nodes=1;;;0"
//! );
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::process;

#[macro_use]
mod macros;

pub mod check;
pub mod config;
pub mod config_generator;
pub mod inventory;
mod runner;

pub use crate::runner::{Runner, RunnerResult};

/// A Resource represents a single service from the perspective of nagios.
///
/// If no state is set it will be determined from the attached metrics.
pub struct Resource {
    state: Option<ServiceState>,
    description: Option<String>,
    metrics: Vec<Box<dyn ResourceMetric>>,
}

impl Resource {
    pub fn new() -> Self {
        Resource {
            state: None,
            description: None,
            metrics: Vec::new(),
        }
    }

    /// Sets the state manually. This disables the state determination from the metrics.
    pub fn with_state(mut self, state: ServiceState) -> Self {
        self.state = Some(state);
        self
    }

    /// The description may span multiple lines. Only the first one ends up in the status
    /// line, the rest is printed as long text after it.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_result<M>(mut self, metric: M) -> Self
    where
        M: 'static + ResourceMetric,
    {
        self.metrics.push(Box::new(metric));
        self
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the manually set state, or the worst state of the attached metrics.
    ///
    /// Without either of them the state is [ServiceState::Unknown].
    pub fn state(&self) -> ServiceState {
        self.state
            .or_else(|| self.metrics.iter().filter_map(|m| m.state()).max())
            .unwrap_or(ServiceState::Unknown)
    }

    /// Returns the string nagios parses to determine the service state.
    ///
    /// The format is `STATE: summary | perfdata` followed by the remaining description lines.
    pub fn to_nagios_string(&self) -> String {
        let mut s = self.state().to_string();

        let description = self.description.as_deref().unwrap_or("");
        let (summary, long_text) = match description.split_once('\n') {
            Some((summary, rest)) => (summary, rest.trim_end_matches('\n')),
            None => (description, ""),
        };

        if !summary.is_empty() {
            s.push_str(&format!(": {}", summary));
        }

        if !self.metrics.is_empty() {
            s.push_str(" |");

            for metric in self.metrics.iter() {
                s.push_str(&format!(" {}", metric.perf_string()));
            }
        }

        if !long_text.is_empty() {
            s.push('\n');
            s.push_str(long_text);
        }

        s
    }

    pub fn exit_code(&self) -> i32 {
        self.state().exit_code()
    }

    /// Prints Self::to_nagios_string and exits with the exit code from Self::exit_code
    pub fn print_and_exit(&self) -> ! {
        println!("{}", self.to_nagios_string());
        process::exit(self.exit_code());
    }
}

impl Default for Resource {
    fn default() -> Self {
        Resource::new()
    }
}

/// Object safe view of a [Metric], so metrics of different value types can live in the same
/// [Resource].
pub trait ResourceMetric {
    fn perf_string(&self) -> String;
    fn state(&self) -> Option<ServiceState>;
}

impl<T> ResourceMetric for Metric<T>
where
    T: PartialOrd + ToPerfString + Clone,
{
    fn perf_string(&self) -> String {
        self.to_perf_string()
    }

    fn state(&self) -> Option<ServiceState> {
        Metric::state(self)
    }
}

/// Represents a service state from nagios.
///
/// States are ordered by severity: `Ok < Warning < Critical < Unknown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServiceState {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl ServiceState {
    /// Returns the corresponding nagios exit code to signal the service state of self.
    pub fn exit_code(&self) -> i32 {
        match self {
            ServiceState::Ok => 0,
            ServiceState::Warning => 1,
            ServiceState::Critical => 2,
            ServiceState::Unknown => 3,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Ok => "OK",
            ServiceState::Warning => "WARNING",
            ServiceState::Critical => "CRITICAL",
            ServiceState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

impl Ord for ServiceState {
    fn cmp(&self, other: &Self) -> Ordering {
        // same ranking as the exit codes
        self.exit_code().cmp(&other.exit_code())
    }
}

impl PartialOrd for ServiceState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The purpose of ToPerfString is only so one can define custom representations of custom types
/// without using the ToString trait so we don't interfere with that.
pub trait ToPerfString {
    fn to_perf_string(&self) -> String;
}

impl_to_perf_string_on_to_string!(usize, i64, String);

impl<T> ToPerfString for Option<T>
where
    T: ToPerfString,
{
    fn to_perf_string(&self) -> String {
        match self {
            Some(ref s) => s.to_perf_string(),
            None => String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Unit {
    None,
    Seconds,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::None => Ok(()),
            Unit::Seconds => f.write_str("s"),
        }
    }
}

/// Which direction of the value crosses a threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerIfValue {
    Greater,
    Less,
}

/// A single performance data point of a resource.
///
/// If thresholds are set, the metric computes its state from them, otherwise it has none.
///
/// ```rust
/// # use check_puppetdb_nodes::{Metric, ServiceState, TriggerIfValue, Unit};
/// let metric = Metric::new("age", 90i64)
///     .with_thresholds(Some(60), Some(120), TriggerIfValue::Greater)
///     .with_unit(Unit::Seconds);
/// assert_eq!(metric.state(), Some(ServiceState::Warning));
/// assert_eq!(&metric.to_perf_string(), "age=90s;60;120");
/// ```
#[derive(Clone, Debug)]
pub struct Metric<T> {
    name: String,
    value: T,
    warning: Option<T>,
    critical: Option<T>,
    trigger: TriggerIfValue,
    min: Option<T>,
    max: Option<T>,
    unit: Unit,
}

impl<T> Metric<T>
where
    T: PartialOrd + ToPerfString + Clone,
{
    pub fn new(name: &str, value: T) -> Self {
        Metric {
            name: name.to_owned(),
            value,
            warning: None,
            critical: None,
            trigger: TriggerIfValue::Greater,
            min: None,
            max: None,
            unit: Unit::None,
        }
    }

    pub fn with_thresholds(
        mut self,
        warning: Option<T>,
        critical: Option<T>,
        trigger: TriggerIfValue,
    ) -> Self {
        self.warning = warning;
        self.critical = critical;
        self.trigger = trigger;
        self
    }

    pub fn with_min(mut self, min: T) -> Self {
        self.min = Some(min);
        self
    }

    pub fn with_max(mut self, max: T) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Critical wins over warning. Returns None when no threshold is set.
    pub fn state(&self) -> Option<ServiceState> {
        if self.warning.is_none() && self.critical.is_none() {
            return None;
        }

        let crosses = |threshold: &Option<T>| match (threshold, self.trigger) {
            (Some(t), TriggerIfValue::Greater) => self.value > *t,
            (Some(t), TriggerIfValue::Less) => self.value < *t,
            (None, _) => false,
        };

        if crosses(&self.critical) {
            Some(ServiceState::Critical)
        } else if crosses(&self.warning) {
            Some(ServiceState::Warning)
        } else {
            Some(ServiceState::Ok)
        }
    }

    /// Renders the metric as `'label'=value[unit];[warn];[crit];[min];[max]`.
    pub fn to_perf_string(&self) -> String {
        // `=` would end the label early
        let name = self.name.replace('=', "_");
        let name = name.replace('\'', "''");

        let name = if name.contains(' ') {
            format!("'{}'", name)
        } else {
            name
        };

        metric_string!(
            name,
            format!("{}{}", self.value.to_perf_string(), self.unit),
            self.warning,
            self.critical,
            self.min,
            self.max
        )
    }
}
