use cadence_core::{Error, Result, SinkOp};
use tracing::{debug, info};

use super::enumeration::HostInfo;

#[cfg(all(target_os = "windows", feature = "asio"))]
const PREFERRED_HOST: Option<cpal::HostId> = Some(cpal::HostId::Asio);

#[cfg(all(target_os = "linux", feature = "jack"))]
const PREFERRED_HOST: Option<cpal::HostId> = Some(cpal::HostId::Jack);

#[cfg(not(any(
    all(target_os = "windows", feature = "asio"),
    all(target_os = "linux", feature = "jack")
)))]
const PREFERRED_HOST: Option<cpal::HostId> = None;

/// Scoped handle on the platform audio subsystem.
///
/// Acquire one before touching any device; everything opened through it must
/// be dropped first. Release happens on drop, on every exit path.
pub struct AudioHost {
    host: cpal::Host,
    info: HostInfo,
}

impl AudioHost {
    /// The preferred pro-audio host when it is compiled in and available,
    /// the platform default otherwise.
    pub fn acquire() -> Result<Self> {
        if let Some(id) = PREFERRED_HOST {
            match Self::acquire_id(id) {
                Ok(host) => return Ok(host),
                Err(err) => debug!(host = id.name(), error = %err, "preferred host unavailable"),
            }
        }
        let host = cpal::default_host();
        Ok(Self::wrap(host, true))
    }

    pub fn acquire_id(id: cpal::HostId) -> Result<Self> {
        let host = cpal::host_from_id(id).map_err(|e| Error::device(SinkOp::Enumerate, e))?;
        let is_default = cpal::default_host().id() == id;
        Ok(Self::wrap(host, is_default))
    }

    fn wrap(host: cpal::Host, is_default: bool) -> Self {
        let info = HostInfo {
            id: host.id(),
            name: host.id().name().to_string(),
            is_available: true,
            is_default,
        };
        info!(host = %info, "audio host acquired");
        Self { host, info }
    }

    pub fn host(&self) -> &cpal::Host {
        &self.host
    }

    pub fn info(&self) -> &HostInfo {
        &self.info
    }
}

impl Drop for AudioHost {
    fn drop(&mut self) {
        debug!(host = %self.info.name, "audio host released");
    }
}
