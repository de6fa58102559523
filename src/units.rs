use std::fmt;
use std::process::Command;

use crate::error::{Result, VaultError};
use crate::util::command::{run_capture, run_quiet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Service,
    Application,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub name: String,
    pub kind: UnitKind,
}

impl Unit {
    pub fn service(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: UnitKind::Service,
        }
    }

    pub fn application(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: UnitKind::Application,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            UnitKind::Service => "service",
            UnitKind::Application => "application",
        };
        write!(f, "{} {}", kind, self.name)
    }
}

/// Registry of the host's managed services and applications.
pub trait UnitRegistry: Send + Sync {
    /// Managed services in startup order.
    fn services(&self) -> Vec<Unit>;
    /// Managed applications in startup order.
    fn applications(&self) -> Vec<Unit>;
    fn should_start(&self, unit: &Unit) -> bool;
    fn start(&self, unit: &Unit) -> Result<()>;
    fn stop(&self, unit: &Unit) -> Result<()>;
}

/// Units managed through systemd, in the order given by the host config.
#[derive(Debug, Clone, Default)]
pub struct SystemdUnits {
    services: Vec<String>,
    applications: Vec<String>,
}

impl SystemdUnits {
    pub fn new(services: Vec<String>, applications: Vec<String>) -> Self {
        Self {
            services,
            applications,
        }
    }

    fn systemctl(&self, verb: &str, unit: &Unit) -> Result<()> {
        run_capture(Command::new("systemctl").arg(verb).arg(&unit.name))
            .map_err(|e| VaultError::restore_step(format!("{} {}: {}", verb, unit, e)))?;
        Ok(())
    }
}

impl UnitRegistry for SystemdUnits {
    fn services(&self) -> Vec<Unit> {
        self.services.iter().map(Unit::service).collect()
    }

    fn applications(&self) -> Vec<Unit> {
        self.applications.iter().map(Unit::application).collect()
    }

    fn should_start(&self, unit: &Unit) -> bool {
        run_quiet(
            Command::new("systemctl")
                .args(["is-enabled", "--quiet"])
                .arg(&unit.name),
        )
    }

    fn start(&self, unit: &Unit) -> Result<()> {
        self.systemctl("start", unit)
    }

    fn stop(&self, unit: &Unit) -> Result<()> {
        self.systemctl("stop", unit)
    }
}
