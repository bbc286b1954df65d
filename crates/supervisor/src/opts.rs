// SPDX-License-Identifier: MIT

//! The JSON piped to a supervisor's stdin by the daemon's `Apply` (spec.md
//! §4.F, §7: `"{serviceId, spec, baseDir, sockFile, envs}"`).

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use zallet_core::{ServiceId, ServiceSpec};

use crate::error::SupervisorError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorOpts {
    pub service_id: ServiceId,
    pub spec: ServiceSpec,
    pub base_dir: PathBuf,
    pub sock_file: PathBuf,
    #[serde(default)]
    pub envs: HashMap<String, String>,
}

impl SupervisorOpts {
    /// Paths must be absolute; the spec itself must validate (spec.md §7).
    pub fn validate(&self) -> Result<(), SupervisorError> {
        self.spec.validate().map_err(|e| SupervisorError::InvalidOpts(e.to_string()))?;
        if !self.base_dir.is_absolute() {
            return Err(SupervisorError::InvalidOpts(format!(
                "baseDir {:?} must be an absolute path",
                self.base_dir
            )));
        }
        if !self.sock_file.is_absolute() {
            return Err(SupervisorError::InvalidOpts(format!(
                "sockFile {:?} must be an absolute path",
                self.sock_file
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zallet_core::ServiceSpec;

    fn opts() -> SupervisorOpts {
        SupervisorOpts {
            service_id: ServiceId::generate_at(0, "20260101000000"),
            spec: ServiceSpec::test_builder().build(),
            base_dir: PathBuf::from("/var/lib/zallet"),
            sock_file: PathBuf::from("/var/lib/zallet/zallet.sock"),
            envs: HashMap::new(),
        }
    }

    #[test]
    fn accepts_well_formed_opts() {
        assert!(opts().validate().is_ok());
    }

    #[test]
    fn rejects_relative_base_dir() {
        let mut o = opts();
        o.base_dir = PathBuf::from("relative/dir");
        assert!(o.validate().is_err());
    }

    #[test]
    fn rejects_relative_sock_file() {
        let mut o = opts();
        o.sock_file = PathBuf::from("relative.sock");
        assert!(o.validate().is_err());
    }

    #[test]
    fn rejects_invalid_inner_spec() {
        let mut o = opts();
        o.spec.app = String::new();
        assert!(o.validate().is_err());
    }
}
