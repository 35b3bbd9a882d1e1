// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Domain Lifecycle Controller
//!
//! Resource configuration and domain start. Before start, queues and ports
//! may be added and mappings are static; after start the dynamic mapper
//! takes over.

use crate::application::context::MappingContext;
use crate::domain::config::{DomainConfig, PortConfig, QueueConfig};
use crate::domain::directory::ResourceDirectory;
use crate::domain::error::MappingError;
use crate::domain::events::MappingEvent;
use crate::domain::ids::{DomainId, PortId, QueueId, Requester};
use chrono::Utc;
use tracing::info;

impl MappingContext<'_> {
    /// Creates a scheduling domain and returns the id the requester uses for it.
    pub fn create_domain(&mut self, requester: Requester, config: DomainConfig) -> Result<DomainId, MappingError> {
        let domain = self.dir.create_domain(requester, config)?;
        let tenancy = self.dir.domain(domain)?.tenancy;

        self.emit(MappingEvent::DomainCreated {
            domain_id: domain,
            num_queues: config.num_queues,
            num_ports: config.num_ports,
            created_at: Utc::now(),
        });
        Ok(DomainId(ResourceDirectory::visible_id(requester, domain.0, &tenancy)))
    }

    /// Configures a queue in `domain` and programs its inflight limit.
    pub fn create_queue(
        &mut self,
        requester: Requester,
        domain: DomainId,
        config: QueueConfig,
    ) -> Result<QueueId, MappingError> {
        let domain = self.dir.resolve_configured_domain(requester, domain.0)?;
        let queue = self.dir.create_queue(requester, domain, config)?;
        self.device.set_inflight_limit(queue, config.inflight_limit);

        let tenancy = self.dir.queue(queue)?.tenancy;
        Ok(QueueId(ResourceDirectory::visible_id(requester, queue.0, &tenancy)))
    }

    /// Configures a port in `domain` and applies its initial enable state.
    pub fn create_port(
        &mut self,
        requester: Requester,
        domain: DomainId,
        config: PortConfig,
    ) -> Result<PortId, MappingError> {
        let domain = self.dir.resolve_configured_domain(requester, domain.0)?;
        let port = self.dir.create_port(requester, domain, config)?;
        if config.enabled {
            self.device.enable_port(port);
        } else {
            self.device.disable_port(port);
        }

        let tenancy = self.dir.port(port)?.tenancy;
        Ok(PortId(ResourceDirectory::visible_id(requester, port.0, &tenancy)))
    }

    /// Starts scheduling in `domain`.
    ///
    /// Grants enqueue permission on every configured queue. From here on,
    /// new mappings go through the dynamic mapper.
    pub fn start_domain(&mut self, domain: DomainId) -> Result<(), MappingError> {
        let d = self.dir.domain(domain)?;
        d.ensure_startable()?;

        for queue in d.queues() {
            self.device.set_write_permission(*queue, true);
        }
        let num_queues = d.queues().len();
        self.dir.domain_mut(domain)?.mark_started()?;

        info!(%domain, num_queues, "Started scheduling domain");
        self.emit(MappingEvent::DomainStarted {
            domain_id: domain,
            started_at: Utc::now(),
        });
        Ok(())
    }
}
