// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Plan replay against the simulated device
//!
//! A plan is a YAML list of steps. Requests carry the ids the requester
//! sees (virtual ids when `vdev` is set); device steps use physical ids.
//!
//! ```yaml
//! steps:
//!   - action: create_domain
//!     num_queues: 1
//!     num_ports: 1
//!   - action: create_queue
//!     domain: 0
//!   - action: create_port
//!     domain: 0
//!   - action: start_domain
//!     domain: 0
//!   - action: queue_inflight
//!     queue: 0
//!     count: 3
//!   - action: map
//!     domain: 0
//!     port: 0
//!     queue: 0
//!     priority: 2
//!   - action: queue_inflight
//!     queue: 0
//!     count: 0
//!   - action: settle
//! ```

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use qidmap_core::application::{MappingService, PendingCounts, PortView, StandardMappingService};
use qidmap_core::domain::{
    DomainConfig, DomainId, MapperConfigManifest, MappingOutcome, PortConfig, PortId, QueueConfig,
    QueueId, ReconciliationWorker, Requester, ResourceDirectory, VdevId,
};
use qidmap_core::infrastructure::{EventBus, EventReceiver, PollingWorker, SimulatedDevice};

#[derive(Args)]
pub struct SimulateArgs {
    /// YAML plan to replay
    #[arg(value_name = "PLAN")]
    plan: PathBuf,

    /// Print mapping events after each step
    #[arg(long)]
    events: bool,

    /// Format of the final port tables
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

// ============================================================================
// Plan
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan {:?}", path))?;
        Self::from_yaml_str(&content).with_context(|| format!("Invalid plan {:?}", path))
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    CreateDomain {
        #[serde(default)]
        vdev: Option<u32>,
        num_queues: u32,
        num_ports: u32,
    },
    CreateQueue {
        #[serde(default)]
        vdev: Option<u32>,
        domain: u32,
        #[serde(default)]
        inflight_limit: Option<u32>,
    },
    CreatePort {
        #[serde(default)]
        vdev: Option<u32>,
        domain: u32,
        #[serde(default)]
        disabled: bool,
    },
    StartDomain {
        #[serde(default)]
        vdev: Option<u32>,
        domain: u32,
    },
    Map {
        #[serde(default)]
        vdev: Option<u32>,
        domain: u32,
        port: u32,
        queue: u32,
        #[serde(default)]
        priority: u8,
    },
    Unmap {
        #[serde(default)]
        vdev: Option<u32>,
        domain: u32,
        port: u32,
        queue: u32,
    },
    EnablePort {
        #[serde(default)]
        vdev: Option<u32>,
        domain: u32,
        port: u32,
    },
    DisablePort {
        #[serde(default)]
        vdev: Option<u32>,
        domain: u32,
        port: u32,
    },
    /// Steady in-flight count of a physical queue.
    QueueInflight { queue: u32, count: u32 },
    /// Steady in-flight count of a physical port.
    PortInflight { port: u32, count: u32 },
    /// One reconciliation pass run inline.
    Reconcile,
    /// Wait for the background worker to run out of work.
    Settle {
        #[serde(default = "default_settle_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_settle_timeout_ms() -> u64 {
    1000
}

fn requester(vdev: Option<u32>) -> Requester {
    vdev.map_or(Requester::Physical, |id| Requester::Vdev(VdevId(id)))
}

// ============================================================================
// Simulator
// ============================================================================

/// What a successful step produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepReport {
    Created(u32),
    Outcome(MappingOutcome),
    Remaining(u32),
    Done,
}

impl std::fmt::Display for StepReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created(id) => write!(f, "id {}", id),
            Self::Outcome(MappingOutcome::Completed) => write!(f, "completed"),
            Self::Outcome(MappingOutcome::Pending) => write!(f, "pending"),
            Self::Remaining(n) => write!(f, "{} pending", n),
            Self::Done => write!(f, "ok"),
        }
    }
}

/// Final state of one domain created by the plan.
#[derive(Debug, Serialize)]
pub struct DomainReport {
    pub requester: Requester,
    pub domain_id: u32,
    pub pending: PendingCounts,
    pub ports: Vec<PortView>,
}

pub struct Simulator {
    service: Arc<StandardMappingService>,
    device: Arc<SimulatedDevice>,
    worker: Arc<PollingWorker>,
    domains: Vec<(Requester, DomainId)>,
}

impl Simulator {
    pub fn new(config: &MapperConfigManifest) -> Self {
        let device = Arc::new(SimulatedDevice::new());
        let worker = Arc::new(PollingWorker::new(config.spec.reconciliation));
        let service = Arc::new(StandardMappingService::new(
            ResourceDirectory::new(config.spec.device),
            device.clone(),
            worker.clone(),
            Arc::new(EventBus::with_default_capacity()),
        ));

        Self {
            service,
            device,
            worker,
            domains: Vec::new(),
        }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        self.service.event_bus()
    }

    pub fn start_worker(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let service: Arc<dyn MappingService> = self.service.clone();
        self.worker.clone().start(service, shutdown)
    }

    pub async fn apply(&mut self, step: &Step) -> Result<StepReport> {
        let service = &self.service;
        let report = match *step {
            Step::CreateDomain { vdev, num_queues, num_ports } => {
                let who = requester(vdev);
                let id = service.create_domain(who, DomainConfig { num_queues, num_ports })?;
                self.domains.push((who, id));
                StepReport::Created(id.0)
            }
            Step::CreateQueue { vdev, domain, inflight_limit } => {
                let mut config = QueueConfig::default();
                if let Some(limit) = inflight_limit {
                    config.inflight_limit = limit;
                }
                let id = service.create_queue(requester(vdev), DomainId(domain), config)?;
                StepReport::Created(id.0)
            }
            Step::CreatePort { vdev, domain, disabled } => {
                let config = PortConfig { enabled: !disabled };
                let id = service.create_port(requester(vdev), DomainId(domain), config)?;
                StepReport::Created(id.0)
            }
            Step::StartDomain { vdev, domain } => {
                service.start_domain(requester(vdev), DomainId(domain))?;
                StepReport::Done
            }
            Step::Map { vdev, domain, port, queue, priority } => StepReport::Outcome(service.map_qid(
                requester(vdev),
                DomainId(domain),
                PortId(port),
                QueueId(queue),
                priority,
            )?),
            Step::Unmap { vdev, domain, port, queue } => StepReport::Outcome(service.unmap_qid(
                requester(vdev),
                DomainId(domain),
                PortId(port),
                QueueId(queue),
            )?),
            Step::EnablePort { vdev, domain, port } => {
                service.enable_port(requester(vdev), DomainId(domain), PortId(port))?;
                StepReport::Done
            }
            Step::DisablePort { vdev, domain, port } => {
                service.disable_port(requester(vdev), DomainId(domain), PortId(port))?;
                StepReport::Done
            }
            Step::QueueInflight { queue, count } => {
                self.device.set_queue_inflight(QueueId(queue), count);
                StepReport::Done
            }
            Step::PortInflight { port, count } => {
                self.device.set_port_inflight(PortId(port), count);
                StepReport::Done
            }
            Step::Reconcile => StepReport::Remaining(service.reconcile()?),
            Step::Settle { timeout_ms } => {
                self.settle(Duration::from_millis(timeout_ms)).await?;
                StepReport::Done
            }
        };
        Ok(report)
    }

    /// Wait until the worker has disarmed itself.
    async fn settle(&self, timeout: Duration) -> Result<()> {
        let worker = self.worker.clone();
        tokio::time::timeout(timeout, async move {
            while worker.is_armed() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .with_context(|| format!("Work still pending after {:?}", timeout))
    }

    pub fn reports(&self) -> Result<Vec<DomainReport>> {
        self.domains
            .iter()
            .map(|(who, domain)| -> Result<DomainReport> {
                Ok(DomainReport {
                    requester: *who,
                    domain_id: domain.0,
                    pending: self.service.domain_pending_counts(*who, *domain)?,
                    ports: self.service.domain_ports(*who, *domain)?,
                })
            })
            .collect()
    }
}

// ============================================================================
// Command
// ============================================================================

pub async fn execute(args: SimulateArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = MapperConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    let plan = Plan::from_yaml_file(&args.plan)?;
    info!(steps = plan.steps.len(), "Replaying plan {:?}", args.plan);

    let mut simulator = Simulator::new(&config);
    let mut events = simulator.event_bus().subscribe();
    let shutdown = CancellationToken::new();
    let worker = simulator.start_worker(shutdown.clone());

    let mut failures = 0usize;
    for (index, step) in plan.steps.iter().enumerate() {
        debug!(index, ?step, "Applying step");
        match simulator.apply(step).await {
            Ok(report) => println!("{:>3} {:?} -> {}", index, step, report.to_string().green()),
            Err(e) => {
                failures += 1;
                println!("{:>3} {:?} -> {}", index, step, format!("{:#}", e).red());
            }
        }
        if args.events {
            print_events(&mut events);
        }
    }

    shutdown.cancel();
    worker.await.context("Reconciliation worker panicked")?;

    let reports = simulator.reports()?;
    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => print_reports(&reports),
    }

    if failures > 0 {
        println!();
        println!("{}", format!("{} step(s) failed", failures).yellow());
    }

    Ok(())
}

fn print_events(events: &mut EventReceiver) {
    for event in events.drain() {
        match serde_json::to_string(&event) {
            Ok(line) => println!("    {}", line.dimmed()),
            Err(e) => println!("    {}", format!("unprintable event: {}", e).red()),
        }
    }
}

fn print_reports(reports: &[DomainReport]) {
    for report in reports {
        println!();
        println!(
            "{} (requester {:?}) additions={} removals={}",
            format!("Domain {}", report.domain_id).bold(),
            report.requester,
            report.pending.pending_additions,
            report.pending.pending_removals
        );
        for port in &report.ports {
            let status = if port.enabled { "enabled".green() } else { "disabled".yellow() };
            println!(
                "  port {} (physical {}) {} mappings={} pending_removals={}",
                port.port_id, port.physical_id, status, port.num_mappings, port.num_pending_removals
            );
            for slot in port.slots.iter().filter(|s| s.state != "unmapped") {
                print!("    [{}] {} queue={:?} priority={}", slot.index, slot.state, slot.queue_id, slot.priority);
                if let Some(next) = slot.pending_queue_id {
                    print!(" then queue={} priority={:?}", next, slot.pending_priority);
                }
                println!();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRAINING_MAP: &str = r#"
steps:
  - action: create_domain
    num_queues: 1
    num_ports: 1
  - action: create_queue
    domain: 0
  - action: create_port
    domain: 0
  - action: start_domain
    domain: 0
  - action: queue_inflight
    queue: 0
    count: 3
  - action: map
    domain: 0
    port: 0
    queue: 0
    priority: 2
  - action: reconcile
  - action: queue_inflight
    queue: 0
    count: 0
  - action: reconcile
"#;

    async fn replay(simulator: &mut Simulator, plan: &Plan) -> Vec<Result<StepReport>> {
        let mut reports = Vec::new();
        for step in &plan.steps {
            reports.push(simulator.apply(step).await);
        }
        reports
    }

    #[test]
    fn test_plan_parsing() {
        let plan = Plan::from_yaml_str(DRAINING_MAP).unwrap();
        assert_eq!(plan.steps.len(), 9);
        assert_eq!(
            plan.steps[5],
            Step::Map { vdev: None, domain: 0, port: 0, queue: 0, priority: 2 }
        );
        assert_eq!(plan.steps[6], Step::Reconcile);

        assert!(Plan::from_yaml_str("steps:\n  - action: explode\n").is_err());
    }

    #[tokio::test]
    async fn test_replay_of_draining_map() {
        let plan = Plan::from_yaml_str(DRAINING_MAP).unwrap();
        let mut simulator = Simulator::new(&MapperConfigManifest::default());

        let reports: Vec<StepReport> = replay(&mut simulator, &plan)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(reports[0], StepReport::Created(0));
        assert_eq!(reports[5], StepReport::Outcome(MappingOutcome::Pending));
        assert_eq!(reports[6], StepReport::Remaining(1));
        assert_eq!(reports[8], StepReport::Remaining(0));

        let domains = simulator.reports().unwrap();
        assert_eq!(domains.len(), 1);
        let port = &domains[0].ports[0];
        assert_eq!(port.num_mappings, 1);
        assert_eq!(port.slots[0].state, "mapped");
        assert_eq!(port.slots[0].priority, 2);
        assert_eq!(domains[0].pending, PendingCounts::default());
    }

    #[tokio::test]
    async fn test_failed_step_does_not_stop_replay() {
        let plan = Plan::from_yaml_str(
            r#"
steps:
  - action: create_domain
    num_queues: 1
    num_ports: 1
  - action: map
    domain: 0
    port: 0
    queue: 0
    priority: 9
  - action: create_queue
    domain: 0
"#,
        )
        .unwrap();
        let mut simulator = Simulator::new(&MapperConfigManifest::default());

        let reports = replay(&mut simulator, &plan).await;
        assert!(reports[1].is_err());
        assert_eq!(reports[2].as_ref().unwrap(), &StepReport::Created(0));
    }

    #[tokio::test]
    async fn test_settle_waits_for_worker() {
        let plan = Plan::from_yaml_str(
            r#"
steps:
  - action: create_domain
    vdev: 4
    num_queues: 1
    num_ports: 1
  - action: create_queue
    vdev: 4
    domain: 0
  - action: create_port
    vdev: 4
    domain: 0
  - action: start_domain
    vdev: 4
    domain: 0
  - action: port_inflight
    port: 0
    count: 2
  - action: map
    vdev: 4
    domain: 0
    port: 0
    queue: 0
  - action: unmap
    vdev: 4
    domain: 0
    port: 0
    queue: 0
  - action: port_inflight
    port: 0
    count: 0
  - action: settle
    timeout_ms: 5000
"#,
        )
        .unwrap();
        let mut simulator = Simulator::new(&MapperConfigManifest::default());
        let shutdown = CancellationToken::new();
        let worker = simulator.start_worker(shutdown.clone());

        let reports = replay(&mut simulator, &plan).await;
        assert_eq!(reports[6].as_ref().unwrap(), &StepReport::Outcome(MappingOutcome::Pending));
        assert_eq!(reports[8].as_ref().unwrap(), &StepReport::Done);

        let domains = simulator.reports().unwrap();
        assert_eq!(domains[0].requester, Requester::Vdev(VdevId(4)));
        assert_eq!(domains[0].ports[0].num_mappings, 0);
        assert!(domains[0].ports[0].enabled);

        shutdown.cancel();
        worker.await.unwrap();
    }

    #[test]
    fn test_plan_file_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.yaml");
        std::fs::write(&path, DRAINING_MAP).unwrap();
        assert_eq!(Plan::from_yaml_file(&path).unwrap().steps.len(), 9);
        assert!(Plan::from_yaml_file(dir.path().join("missing.yaml")).is_err());
    }
}
