//! Connectivity Tracker - 接続状態の判断
//!
//! Two inputs feed one boolean belief:
//! - the native online/offline signal (authoritative, timestamped)
//! - an external health report keyed by service name
//!
//! The tracker only decides. Demoting the in-flight event and waking the
//! delivery loop are done by the caller based on the returned `Transition`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of feeding one signal into the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Belief flipped.
    pub changed: bool,
    /// Belief after the signal.
    pub online: bool,
    /// The in-flight event (if any) must go back to pending.
    pub demote_in_flight: bool,
}

impl Transition {
    fn unchanged(online: bool) -> Self {
        Self {
            changed: false,
            online,
            demote_in_flight: false,
        }
    }
}

/// One service entry of a health report. Fields other than `online` are kept
/// but not interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub online: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `{ "<service>": { "online": bool, ... }, ... }` observed at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub services: HashMap<String, ServiceHealth>,
    pub observed_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn new(observed_at: DateTime<Utc>) -> Self {
        Self {
            services: HashMap::new(),
            observed_at,
        }
    }

    /// Single-service report.
    pub fn single(service: impl Into<String>, online: bool, observed_at: DateTime<Utc>) -> Self {
        let mut report = Self::new(observed_at);
        report.services.insert(
            service.into(),
            ServiceHealth {
                online,
                extra: serde_json::Map::new(),
            },
        );
        report
    }

    /// Parse the wire shape. Entries that are not objects with a boolean
    /// `online` field fail the whole report.
    pub fn from_json(
        value: serde_json::Value,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let services = serde_json::from_value(value)?;
        Ok(Self {
            services,
            observed_at,
        })
    }

    pub fn service(&self, name: &str) -> Option<&ServiceHealth> {
        self.services.get(name)
    }
}

/// Connectivity belief.
#[derive(Debug, Clone)]
pub struct ConnectivityTracker {
    online: bool,
    service_name: String,
    /// Most recent native signal and when it arrived.
    last_native: Option<(bool, DateTime<Utc>)>,
}

impl ConnectivityTracker {
    pub fn new(initial_online: bool, service_name: impl Into<String>) -> Self {
        Self {
            online: initial_online,
            service_name: service_name.into(),
            last_native: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Native online/offline signal observed at `at`.
    ///
    /// Offline always demotes the in-flight event, even if the belief was
    /// already false.
    pub fn native(&mut self, online: bool, at: DateTime<Utc>) -> Transition {
        self.last_native = Some((online, at));
        let changed = self.set(online);
        Transition {
            changed,
            online,
            demote_in_flight: !online,
        }
    }

    /// External health report. Only the configured service entry counts.
    pub fn health(&mut self, report: &HealthReport) -> Transition {
        let Some(entry) = report.service(&self.service_name) else {
            return Transition::unchanged(self.online);
        };

        if entry.online {
            // a native offline that is at least as fresh wins over the report
            if let Some((false, native_at)) = self.last_native {
                if native_at >= report.observed_at {
                    return Transition::unchanged(self.online);
                }
            }
        }

        let changed = self.set(entry.online);
        Transition {
            changed,
            online: self.online,
            demote_in_flight: false,
        }
    }

    /// The delivery adapter reported that the network is gone.
    pub fn connectivity_lost(&mut self) -> Transition {
        let changed = self.set(false);
        Transition {
            changed,
            online: false,
            demote_in_flight: false,
        }
    }

    fn set(&mut self, online: bool) -> bool {
        let changed = self.online != online;
        self.online = online;
        changed
    }
}
