//! Fixed session consistency and durability policy.
//!
//! Every handle reads with a monotonic read preference and writes with a
//! majority write concern. Neither is configurable.

use mongodb::options::{
    Acknowledgment, ClientOptions, ReadPreference, SelectionCriteria, WriteConcern,
};

/// Consistency and durability settings applied to every bootstrapped session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionPolicy;

impl SessionPolicy {
    /// Monotonic read preference.
    ///
    /// Every read goes to the current primary and never falls back to a
    /// secondary. While no primary is elected, reads fail server selection
    /// instead of returning possibly stale data.
    pub fn selection_criteria(&self) -> SelectionCriteria {
        SelectionCriteria::ReadPreference(ReadPreference::Primary)
    }

    /// Writes are acknowledged only after a majority of the replica set has them.
    pub fn write_concern(&self) -> WriteConcern {
        WriteConcern::builder().w(Acknowledgment::Majority).build()
    }

    /// Installs the policy on driver options, replacing anything the URI set.
    pub fn apply(&self, options: &mut ClientOptions) {
        options.selection_criteria = Some(self.selection_criteria());
        options.write_concern = Some(self.write_concern());
    }
}
