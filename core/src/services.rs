/*
 * Created on Thu Jul 18 2024
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

//! # Services
//!
//! The process-wide service containers. Each container is keyed by instance name and bundles a
//! frozen configuration with the journal, the resource registrar and the recovery drivers built
//! from it. Threads attach to a container by name; every thread attaching to the same name sees
//! the same container. Sub-services initialize lazily under compare-and-set, so exactly one is
//! ever built per container regardless of how many threads race for it.

use {
    crate::{
        config::Configuration,
        error::RuntimeResult,
        journal::{self, Journal},
        recovery::{incremental::IncrementalRecoverer, Recoverer},
        resource::{ResourceRegistry, TransactionResource},
        sync::{LateInit, Lazy},
        txn::uid::UidGenerator,
    },
    parking_lot::RwLock,
    std::{collections::HashMap, sync::Arc},
};

/// One named service container
pub struct Services {
    config: Configuration,
    resources: Arc<ResourceRegistry>,
    journal: LateInit<RuntimeResult<Arc<dyn Journal>>>,
    recoverer: LateInit<Arc<Recoverer>>,
    uid_generator: LateInit<UidGenerator>,
}

impl Services {
    fn new(config: Configuration) -> Self {
        Self {
            config,
            resources: Arc::new(ResourceRegistry::new()),
            journal: LateInit::new(),
            recoverer: LateInit::new(),
            uid_generator: LateInit::new(),
        }
    }
    pub fn config(&self) -> &Configuration {
        &self.config
    }
    pub fn resources(&self) -> &Arc<ResourceRegistry> {
        &self.resources
    }
    /// The configured journal; constructed (but not opened) on first use
    pub fn journal(&self) -> RuntimeResult<Arc<dyn Journal>> {
        match self
            .journal
            .get_or_init(|| journal::create_journal(&self.config).map(Arc::from))
        {
            Ok(journal) => Ok(journal.clone()),
            Err(e) => Err(crate::error::Error::with_kind(crate::error::ErrorKind::Other(
                format!("journal construction failed: {e}"),
            ))),
        }
    }
    pub fn recoverer(&self) -> RuntimeResult<Arc<Recoverer>> {
        let journal = self.journal()?;
        Ok(self
            .recoverer
            .get_or_init(|| {
                Arc::new(Recoverer::new(journal, self.resources.clone(), &self.config))
            })
            .clone())
    }
    pub fn uid_generator(&self) -> &UidGenerator {
        self.uid_generator
            .get_or_init(|| UidGenerator::new(&self.config.server_id))
    }
    /// Register a resource and reconcile it against the journal right away (the late-joining
    /// resource path)
    pub fn register_resource(&self, resource: Arc<dyn TransactionResource>) -> RuntimeResult<()> {
        let incremental = IncrementalRecoverer::new(self.journal()?, &self.config);
        self.resources.register(resource.clone())?;
        if let Err(e) = incremental.recover(&*resource) {
            // roll the registration back, otherwise a retry trips the duplicate-name check
            self.resources.unregister(resource.unique_name());
            return Err(e);
        }
        Ok(())
    }
}

/*
    instance registry and thread attachment
*/

type InstanceMap = HashMap<Box<str>, Arc<Services>>;

static INSTANCES: Lazy<RwLock<InstanceMap>, fn() -> RwLock<InstanceMap>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

local! {
    static ATTACHED: Option<Arc<Services>> = None;
}

impl Services {
    /// Get or create the container registered under `name`. All callers racing on the same name
    /// receive the same container; `config` is only consulted by the creating caller.
    pub fn obtain(name: &str, config: impl FnOnce() -> Configuration) -> Arc<Services> {
        if let Some(existing) = INSTANCES.read().get(name) {
            return existing.clone();
        }
        let mut instances = INSTANCES.write();
        // somebody may have created it between our read and write locks
        instances
            .entry(name.into())
            .or_insert_with(|| Arc::new(Services::new(config())))
            .clone()
    }
    /// Attach the current thread to the container named `name`, creating it if needed
    pub fn attach(name: &str, config: impl FnOnce() -> Configuration) -> Arc<Services> {
        let services = Self::obtain(name, config);
        let attached = services.clone();
        local_mut!(ATTACHED, move |slot| *slot = Some(attached));
        services
    }
    /// The container the current thread is attached to
    pub fn current() -> Option<Arc<Services>> {
        local_ref!(ATTACHED, |slot: &Option<Arc<Services>>| slot.clone())
    }
    /// Detach the current thread
    pub fn detach() {
        local_mut!(ATTACHED, |slot: &mut Option<Arc<Services>>| *slot = None);
    }
    /// Drop the container registered under `name` (threads still holding an `Arc` keep it alive)
    pub fn evict(name: &str) -> Option<Arc<Services>> {
        INSTANCES.write().remove(name)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::Services,
        crate::{
            config::{Configuration, JournalKind},
            resource::mock::MockResource,
            txn::{uid::UidGenerator, xid::Xid},
            util::os,
        },
        std::{sync::Arc, thread},
    };

    fn null_config() -> Configuration {
        let mut config = Configuration::default_with_server_id("svc-test");
        config.journal = JournalKind::Null;
        config
    }

    #[test]
    fn same_name_same_container() {
        let from_threads: Vec<Arc<Services>> = (0..2)
            .map(|_| thread::spawn(|| Services::attach("svc_same", null_config)))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|t| t.join().unwrap())
            .collect();
        assert!(Arc::ptr_eq(&from_threads[0], &from_threads[1]));
        Services::evict("svc_same");
    }

    #[test]
    fn different_names_different_containers() {
        let a = Services::attach("svc_diff_a", null_config);
        let b = Services::attach("svc_diff_b", null_config);
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&Services::current().unwrap(), &b));
        Services::detach();
        assert!(Services::current().is_none());
        Services::evict("svc_diff_a");
        Services::evict("svc_diff_b");
    }

    #[test]
    fn sub_services_are_singletons() {
        let services = Services::obtain("svc_singleton", null_config);
        let j1 = services.journal().unwrap();
        let j2 = services.journal().unwrap();
        assert!(Arc::ptr_eq(&j1, &j2));
        let r1 = services.recoverer().unwrap();
        let r2 = services.recoverer().unwrap();
        assert!(Arc::ptr_eq(&r1, &r2));
        Services::evict("svc_singleton");
    }

    #[test]
    fn failed_incremental_recovery_rolls_registration_back() {
        let services = Services::obtain("svc_reg_rollback", null_config);
        let resource = Arc::new(MockResource::new("pg"));
        // a stale in-doubt branch whose rollback fails transiently
        let gen = UidGenerator::new("svc-test");
        let gtrid = gen.generate_at(os::get_epoch_time_ms() - 120_000);
        resource.add_in_doubt(Xid::new(gtrid, gen.generate()));
        resource.fail_rollbacks(true);
        assert!(services.register_resource(resource.clone()).is_err());
        // the half-registered resource was removed again, so a retry can succeed
        assert!(services.resources().get("pg").is_none());
        resource.fail_rollbacks(false);
        services.register_resource(resource).unwrap();
        assert!(services.resources().get("pg").is_some());
        Services::evict("svc_reg_rollback");
    }
}
