use std::collections::BTreeMap;
use std::fmt;

use pilot_model::ClusterProfile;

use crate::job::BackendRef;
use crate::{CoreError, CoreResult};

/// A named profile together with the backend selected for its transport.
#[derive(Clone)]
pub struct Cluster {
    pub name: String,
    pub profile: ClusterProfile,
    pub backend: BackendRef,
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("name", &self.name)
            .field("transport", &self.profile.transport)
            .field("host", &self.profile.host)
            .field("backend", &self.backend.name())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClusterSet(BTreeMap<String, Cluster>);

impl ClusterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, profile: ClusterProfile, backend: BackendRef) {
        let name = name.into();
        self.0.insert(
            name.clone(),
            Cluster {
                name,
                profile,
                backend,
            },
        );
    }

    pub fn get(&self, name: &str) -> CoreResult<&Cluster> {
        self.0
            .get(name)
            .ok_or_else(|| CoreError::Config(format!("unknown cluster '{name}'")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
