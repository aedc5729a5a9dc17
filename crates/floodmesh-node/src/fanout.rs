//! Fan-out selection and delivery
//!
//! Both the originator and the forwarder pick a subset of the current peer
//! snapshot and send each member one independent copy.

use std::fmt::Display;
use std::str::FromStr;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use floodmesh_core::{ConfigError, DatagramTransport, PeerEndpoint};

/// How many neighbors receive each copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOut {
    /// Every neighbor in the snapshot
    All,
    /// A uniformly random subset of `min..=max` neighbors (capped by availability)
    Random { min: usize, max: usize },
}

impl FanOut {
    /// Check the bounds are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            FanOut::All => Ok(()),
            FanOut::Random { min, max } if min == 0 || min > max => {
                Err(ConfigError::InvalidFanOut { min, max })
            }
            FanOut::Random { .. } => Ok(()),
        }
    }

    /// Choose targets from `candidates`
    pub fn select(&self, mut candidates: Vec<PeerEndpoint>) -> Vec<PeerEndpoint> {
        match *self {
            FanOut::All => candidates,
            FanOut::Random { min, max } => {
                let mut rng = rand::rng();
                candidates.shuffle(&mut rng);
                let count = rng.random_range(min..=max.max(min));
                candidates.truncate(count);
                candidates
            }
        }
    }
}

impl FromStr for FanOut {
    type Err = ConfigError;

    /// Parses `all`, a fixed count `3`, or a range `2-4`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(FanOut::All);
        }

        let parse = |v: &str| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::UnparsableFanOut(s.to_string()))
        };
        let fanout = match s.split_once('-') {
            Some((min, max)) => FanOut::Random {
                min: parse(min)?,
                max: parse(max)?,
            },
            None => {
                let count = parse(s)?;
                FanOut::Random {
                    min: count,
                    max: count,
                }
            }
        };

        fanout.validate()?;
        Ok(fanout)
    }
}

impl Display for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FanOut::All => write!(f, "all"),
            FanOut::Random { min, max } if min == max => write!(f, "{}", min),
            FanOut::Random { min, max } => write!(f, "{}-{}", min, max),
        }
    }
}

/// Outcome of sending one payload to a set of targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub sent: usize,
    pub failed: usize,
}

/// Send `data` to every target independently
///
/// A failure to one target is logged and does not affect the others.
pub async fn deliver(
    transport: &dyn DatagramTransport,
    data: &[u8],
    targets: &[PeerEndpoint],
) -> Delivery {
    let mut delivery = Delivery::default();

    for target in targets {
        match transport.send_to(data, target).await {
            Ok(()) => {
                debug!(peer = %target, "Sent datagram");
                delivery.sent += 1;
            }
            Err(e) => {
                warn!(peer = %target, error = %e, "Send failed");
                delivery.failed += 1;
            }
        }
    }

    delivery
}
