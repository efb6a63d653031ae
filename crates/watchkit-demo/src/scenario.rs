#![forbid(unsafe_code)]

//! Scripted tracking scenarios over [`Suspect`] objects.
//!
//! Each scenario records how many notifications arrived after every step, so
//! callers can compare the run against the expected trace.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;
use watchkit::{ObservationConfig, with_tracking};

use crate::suspect::Suspect;

/// Which scenario(s) to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scenario {
    /// One suspect; watch `name`, then mutate around it.
    Single,
    /// Two suspects; one probe reads a property from each.
    Cross,
    #[default]
    All,
}

impl Scenario {
    pub const NAMES: [&'static str; 3] = ["single", "cross", "all"];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Cross => "cross",
            Self::All => "all",
        }
    }

    /// Run the selected scenario(s) on suspects configured with `config`.
    #[must_use]
    pub fn run(self, config: ObservationConfig) -> Vec<ScenarioReport> {
        match self {
            Self::Single => vec![run_single(config)],
            Self::Cross => vec![run_cross(config)],
            Self::All => vec![run_single(config), run_cross(config)],
        }
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "cross" => Ok(Self::Cross),
            "all" => Ok(Self::All),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a scenario and the notification total observed after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub action: String,
    pub notifications: usize,
    pub expected: usize,
}

impl Step {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.notifications == self.expected
    }
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub steps: Vec<Step>,
}

impl ScenarioReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.steps.iter().all(Step::passed)
    }

    /// Notification total after the last step.
    #[must_use]
    pub fn notifications(&self) -> usize {
        self.steps.last().map_or(0, |step| step.notifications)
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed() { "ok" } else { "FAILED" };
        writeln!(f, "scenario {}: {verdict}", self.scenario)?;
        for step in &self.steps {
            let mark = if step.passed() { ' ' } else { '!' };
            writeln!(
                f,
                "  {mark} {:<40} notifications={} expected={}",
                step.action, step.notifications, step.expected
            )?;
        }
        Ok(())
    }
}

struct Recorder {
    count: Arc<AtomicUsize>,
    steps: Vec<Step>,
}

impl Recorder {
    fn new() -> Self {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
            steps: Vec::new(),
        }
    }

    fn on_change(&self, label: &'static str) -> impl FnOnce() + Send + 'static {
        let count = Arc::clone(&self.count);
        move || {
            info!(label, "change observed");
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn step(&mut self, action: impl Into<String>, expected: usize) {
        let step = Step {
            action: action.into(),
            notifications: self.count.load(Ordering::SeqCst),
            expected,
        };
        info!(
            action = %step.action,
            notifications = step.notifications,
            expected = step.expected,
            "step"
        );
        self.steps.push(step);
    }
}

/// Watch one suspect's name; only name mutations count, and only the first.
#[must_use]
pub fn run_single(config: ObservationConfig) -> ScenarioReport {
    let suspect = Suspect::with_config("Darth Vader", 33, config);
    let mut recorder = Recorder::new();

    with_tracking(
        || {
            let name = suspect.name();
            info!(%name, "observing");
        },
        recorder.on_change("name"),
    );
    recorder.step("track name", 0);

    suspect.set_suspiciousness(12);
    recorder.step("set suspiciousness = 12", 0);

    suspect.set_name("New Name");
    recorder.step("set name = \"New Name\"", 1);

    suspect.set_name("Another Name");
    recorder.step("set name = \"Another Name\"", 1);

    ScenarioReport {
        scenario: Scenario::Single,
        steps: recorder.steps,
    }
}

/// Watch `s1.name` and `s2.suspiciousness` with one probe; whichever changes
/// first fires, and the other is cancelled.
#[must_use]
pub fn run_cross(config: ObservationConfig) -> ScenarioReport {
    let s1 = Suspect::with_config("Darth Vader", 33, config);
    let s2 = Suspect::with_config("Boba Fett", 71, config);
    let mut recorder = Recorder::new();

    with_tracking(
        || {
            let name = s1.name();
            let suspiciousness = s2.suspiciousness();
            info!(%name, suspiciousness, "observing");
        },
        recorder.on_change("s1.name | s2.suspiciousness"),
    );
    recorder.step("track s1.name, s2.suspiciousness", 0);

    s2.set_suspiciousness(90);
    recorder.step("set s2.suspiciousness = 90", 1);

    s1.set_name("Lord Vader");
    recorder.step("set s1.name = \"Lord Vader\"", 1);

    ScenarioReport {
        scenario: Scenario::Cross,
        steps: recorder.steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scenarios() {
        assert_eq!("single".parse::<Scenario>(), Ok(Scenario::Single));
        assert_eq!(" Cross ".parse::<Scenario>(), Ok(Scenario::Cross));
        assert_eq!("ALL".parse::<Scenario>(), Ok(Scenario::All));
        assert_eq!("bogus".parse::<Scenario>(), Err("bogus".to_string()));
    }

    #[test]
    fn names_round_trip() {
        for name in Scenario::NAMES {
            let scenario: Scenario = name.parse().unwrap();
            assert_eq!(scenario.as_str(), name);
        }
    }

    #[test]
    fn all_runs_both() {
        let reports = Scenario::All.run(ObservationConfig::default());
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].scenario, Scenario::Single);
        assert_eq!(reports[1].scenario, Scenario::Cross);
        assert!(reports.iter().all(ScenarioReport::passed));
    }

    #[test]
    fn report_display_marks_failures() {
        let report = ScenarioReport {
            scenario: Scenario::Single,
            steps: vec![Step {
                action: "set name".into(),
                notifications: 2,
                expected: 1,
            }],
        };
        let text = report.to_string();
        assert!(text.contains("FAILED"));
        assert!(text.contains("! set name"));
    }
}
