/*
 * Created on Mon Jul 15 2024
 *
 * This file is a part of Janus
 * Janus is a free and open-source distributed transaction coordinator
 * written by Sayan Nandan ("the Author") with the vision to provide
 * applications with dependable two-phase commit without compromising
 * on durability, recoverability or performance.
 *
 * Copyright (c) 2024, Sayan Nandan <nandansayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use {
    super::{dangling_work_set, recover_resource},
    crate::{
        config::Configuration, error::RuntimeResult, journal::Journal,
        resource::TransactionResource, util::os,
    },
    std::sync::Arc,
};

/// Counts reported by an incremental recovery pass
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct RecoveryCounts {
    pub committed: u64,
    pub rolledback: u64,
}

/// Single-resource recovery, used when a resource registers while the coordinator is already
/// running. This is the only recovery path that may run concurrently with live transactions; the
/// in-flight rule keeps it away from their branches.
pub struct IncrementalRecoverer {
    journal: Arc<dyn Journal>,
    server_id: Box<str>,
    current_node_only_recovery: bool,
}

impl IncrementalRecoverer {
    pub fn new(journal: Arc<dyn Journal>, config: &Configuration) -> Self {
        Self {
            journal,
            server_id: config.server_id.clone(),
            current_node_only_recovery: config.current_node_only_recovery,
        }
    }
    /// Recover exactly one resource: same algorithm as the full pass, restricted to `resource`
    pub fn recover(
        &self,
        resource: &dyn TransactionResource,
    ) -> RuntimeResult<RecoveryCounts> {
        let reference_time_ms = os::get_epoch_time_ms();
        let mut dangling = dangling_work_set(&*self.journal)?;
        let outcome = recover_resource(
            &*self.journal,
            &self.server_id,
            self.current_node_only_recovery,
            resource,
            reference_time_ms,
            &mut dangling,
        )?;
        if let Some(e) = outcome.completion_error {
            // a single-resource pass has no "other resources" to continue with
            return Err(e);
        }
        log::info!(
            "incremental recovery of `{}`: {} committed, {} rolled back",
            resource.unique_name(),
            outcome.committed,
            outcome.rolledback
        );
        Ok(RecoveryCounts {
            committed: outcome.committed,
            rolledback: outcome.rolledback,
        })
    }
}
