//! Where an entity lives in the container tree

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::store::join_path;
use crate::Error;

/// Named area an entity is placed in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Placement {
    /// `acquisition/timeseries`
    Acquisition,
    /// `stimulus/presentation`
    StimulusPresentation,
    /// `stimulus/templates`
    StimulusTemplate,
    /// `processing/<module>/<interface>`
    Interface {
        /// Module name
        module: String,
        /// Interface name
        interface: String,
    },
}

impl Placement {
    /// Group path the entity is created under.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Acquisition => "acquisition/timeseries".to_string(),
            Self::StimulusPresentation => "stimulus/presentation".to_string(),
            Self::StimulusTemplate => "stimulus/templates".to_string(),
            Self::Interface { module, interface } => {
                join_path(&join_path("processing", module), interface)
            }
        }
    }

    /// Full path of an entity called `name` in this placement.
    #[must_use]
    pub fn entity_path(&self, name: &str) -> String {
        join_path(&self.path(), name)
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl FromStr for Placement {
    type Err = Error;

    /// Accepts the short target names `acquisition`, `stimulus` and
    /// `template`, as well as the full placement paths.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_matches('/') {
            "acquisition" | "acquisition/timeseries" => Ok(Self::Acquisition),
            "stimulus" | "stimulus/presentation" => Ok(Self::StimulusPresentation),
            "template" | "stimulus/templates" => Ok(Self::StimulusTemplate),
            other => match other.split('/').collect::<Vec<_>>().as_slice() {
                ["processing", module, interface] if !module.is_empty() && !interface.is_empty() => {
                    Ok(Self::Interface {
                        module: (*module).to_string(),
                        interface: (*interface).to_string(),
                    })
                }
                _ => Err(Error::InvalidPath(s.to_string())),
            },
        }
    }
}
