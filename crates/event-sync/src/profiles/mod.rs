// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Event profiles for the supported contract pages.

use std::{fmt, str::FromStr, sync::Arc};

use crate::profile::EventProfile;

pub mod locks;
pub mod proposals;

pub use locks::LocksProfile;
pub use proposals::ProposalsProfile;

/// Profiles selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Proposals,
    Locks,
}

impl ProfileKind {
    pub fn build(&self) -> Arc<dyn EventProfile> {
        match self {
            ProfileKind::Proposals => Arc::new(ProposalsProfile),
            ProfileKind::Locks => Arc::new(LocksProfile),
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileKind::Proposals => write!(f, "proposals"),
            ProfileKind::Locks => write!(f, "locks"),
        }
    }
}

impl FromStr for ProfileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposals" => Ok(ProfileKind::Proposals),
            "locks" => Ok(ProfileKind::Locks),
            other => Err(format!("unknown profile: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_names() {
        for kind in [ProfileKind::Proposals, ProfileKind::Locks] {
            assert_eq!(kind.to_string().parse::<ProfileKind>().unwrap(), kind);
            assert_eq!(kind.build().name(), kind.to_string());
        }
        assert!("votes".parse::<ProfileKind>().is_err());
    }
}
