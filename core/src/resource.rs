/*
 * Created on Wed Jul 10 2024
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
    crate::{error::RuntimeResult, txn::xid::Xid},
    parking_lot::RwLock,
    std::{collections::HashMap, sync::Arc},
};

/*
    in-doubt scan flags (XA)
*/

pub const TMNOFLAGS: i32 = 0;
pub const TMSTARTRSCAN: i32 = 0x0100_0000;
pub const TMENDRSCAN: i32 = 0x0080_0000;

/// A participating resource manager as seen by the recovery engine. The connection pooling and
/// proxy layers live outside the core; what recovery needs is the unique name (matched against
/// journal records), the in-doubt scan and the two completion verbs.
pub trait TransactionResource: Send + Sync {
    /// The registration name; journal records reference resources by this
    fn unique_name(&self) -> &str;
    /// Report in-doubt branches (`flags` per the XA scan protocol)
    fn recover(&self, flags: i32) -> RuntimeResult<Vec<Xid>>;
    fn commit(&self, xid: &Xid, one_phase: bool) -> RuntimeResult<()>;
    fn rollback(&self, xid: &Xid) -> RuntimeResult<()>;
}

/// The process-wide registrar of participating resources, keyed by unique name
#[derive(Default)]
pub struct ResourceRegistry {
    resources: RwLock<HashMap<Box<str>, Arc<dyn TransactionResource>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
    /// Register a resource. Re-registering a name is an error: resources must be unregistered
    /// first (their identity is load bearing for recovery).
    pub fn register(&self, resource: Arc<dyn TransactionResource>) -> RuntimeResult<()> {
        let name = resource.unique_name().to_owned();
        let mut resources = self.resources.write();
        if resources.contains_key(name.as_str()) {
            return Err(crate::error::Error::with_kind(crate::error::ErrorKind::Other(
                format!("a resource named `{name}` is already registered"),
            )));
        }
        resources.insert(name.into(), resource);
        Ok(())
    }
    pub fn unregister(&self, unique_name: &str) -> Option<Arc<dyn TransactionResource>> {
        self.resources.write().remove(unique_name)
    }
    pub fn get(&self, unique_name: &str) -> Option<Arc<dyn TransactionResource>> {
        self.resources.read().get(unique_name).cloned()
    }
    /// Snapshot of the currently registered resources
    pub fn all(&self) -> Vec<Arc<dyn TransactionResource>> {
        self.resources.read().values().cloned().collect()
    }
    pub fn len(&self) -> usize {
        self.resources.read().len()
    }
    pub fn is_empty(&self) -> bool {
        self.resources.read().is_empty()
    }
}

#[cfg(test)]
pub mod mock {
    //! A scriptable in-memory resource for recovery tests

    use {
        super::TransactionResource,
        crate::{
            error::{RecoveryError, RuntimeResult},
            txn::xid::Xid,
        },
        parking_lot::Mutex,
    };

    #[derive(Debug, Default)]
    struct MockState {
        in_doubt: Vec<Xid>,
        committed: Vec<Xid>,
        rolledback: Vec<Xid>,
        fail_commits: bool,
        fail_rollbacks: bool,
    }

    pub struct MockResource {
        name: Box<str>,
        state: Mutex<MockState>,
    }

    impl MockResource {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.into(),
                state: Mutex::new(MockState::default()),
            }
        }
        /// Seed an in-doubt branch (a prepared but unresolved transaction)
        pub fn add_in_doubt(&self, xid: Xid) {
            self.state.lock().in_doubt.push(xid);
        }
        /// Forget an in-doubt branch, as a live transaction completing normally would
        pub fn forget(&self, xid: &Xid) {
            self.state.lock().in_doubt.retain(|x| x != xid);
        }
        pub fn fail_commits(&self, fail: bool) {
            self.state.lock().fail_commits = fail;
        }
        pub fn fail_rollbacks(&self, fail: bool) {
            self.state.lock().fail_rollbacks = fail;
        }
        pub fn committed(&self) -> Vec<Xid> {
            self.state.lock().committed.clone()
        }
        pub fn rolledback(&self) -> Vec<Xid> {
            self.state.lock().rolledback.clone()
        }
    }

    impl TransactionResource for MockResource {
        fn unique_name(&self) -> &str {
            &self.name
        }
        fn recover(&self, _flags: i32) -> RuntimeResult<Vec<Xid>> {
            Ok(self.state.lock().in_doubt.clone())
        }
        fn commit(&self, xid: &Xid, _one_phase: bool) -> RuntimeResult<()> {
            let mut state = self.state.lock();
            if state.fail_commits {
                return Err(RecoveryError::CommitFailed.into());
            }
            state.in_doubt.retain(|x| x != xid);
            state.committed.push(xid.clone());
            Ok(())
        }
        fn rollback(&self, xid: &Xid) -> RuntimeResult<()> {
            let mut state = self.state.lock();
            if state.fail_rollbacks {
                return Err(RecoveryError::RollbackFailed.into());
            }
            state.in_doubt.retain(|x| x != xid);
            state.rolledback.push(xid.clone());
            Ok(())
        }
    }
}
