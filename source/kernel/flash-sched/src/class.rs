// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: FLASH scheduling class: host lifecycle callbacks mapped onto the accelerator protocol
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: unit tests below + tests/class_host.rs against the in-memory accelerator
//! PUBLIC API: SchedClass, FlashClass (install/stats/try_pick_next), TickOutcome
//! DEPENDS_ON: client::AcceleratorClient, rq::FlashRq, balance, types::HostCore
//! INVARIANTS:
//!   - the accelerator is the only authority on order; run-queue counts are advisory
//!   - pick_next on an empty run queue issues no device traffic
//!   - an unresolvable pick or a timed-out reply yields "nothing to run" for that tick
//!   - put_prev never re-sends a removal
//!
//! Every callback is invoked by the host core with the processor's scheduling
//! lock held, so callbacks for one processor never overlap. Callbacks for
//! different processors do, which is why the client serializes bridge access.

use alloc::boxed::Box;

use flash_wire::{ChangeKind, EntityId, TaskState};
use log::{debug, info, warn};

use crate::balance;
use crate::bridge::{Attachment, DeviceBridge};
use crate::client::AcceleratorClient;
use crate::config::{DesyncPolicy, FlashConfig};
use crate::error::{Error, Result};
use crate::rq::FlashRq;
use crate::stats::FlashStats;
use crate::types::{CpuId, Entity, HostCore, Schedulable};

/// Result of a tick-time consultation of the accelerator.
#[must_use = "tick outcomes must be handled"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The accelerator agrees with what is running.
    Keep,
    /// A reschedule of the running entity was requested.
    Resched,
    /// No decision this tick (timeout or bridge error).
    NoDecision,
}

/// Callbacks a host scheduler core invokes on a scheduling-policy provider.
pub trait SchedClass {
    type Task;

    /// Chooses the processor a newly created task should join.
    fn choose_processor(&self, task: &Self::Task) -> CpuId;
    /// The task became runnable on `cpu`.
    fn on_admit(&self, cpu: CpuId, task: &Self::Task) -> Result<()>;
    /// The task left `cpu`'s run queue.
    fn on_remove(&self, cpu: CpuId, task: &Self::Task) -> Result<()>;
    /// The running task yielded voluntarily.
    fn on_yield(&self, cpu: CpuId);
    /// A task woke up and may preempt the running one.
    fn on_check_preempt(&self, cpu: CpuId, candidate: &Self::Task);
    /// Selects the next task to run, or `None` to fall through to the next class.
    fn pick_next(&self, cpu: CpuId) -> Option<Self::Task>;
    /// The previously running task is being switched out.
    fn on_put_prev(&self, cpu: CpuId, task: &Self::Task);
    /// Periodic tick while `current` runs on `cpu`.
    fn on_tick(&self, cpu: CpuId, current: &Self::Task) -> TickOutcome;
    /// The task just switched into this class. Returns whether a reschedule was requested.
    fn on_switched_to(&self, cpu: CpuId, task: &Self::Task) -> bool;
}

/// The FLASH scheduling class bound to one accelerator and one host core.
pub struct FlashClass<B, H> {
    client: AcceleratorClient<B>,
    host: H,
    rqs: Box<[FlashRq]>,
    config: FlashConfig,
}

impl<B: DeviceBridge, H: HostCore> FlashClass<B, H> {
    /// Installs the class. Fails when no accelerator is attached.
    pub fn install(bridge: Attachment<B>, host: H, config: FlashConfig) -> Result<Self> {
        let Attachment::Attached(bridge) = bridge else {
            warn!(target: "flash", "install refused: accelerator not attached");
            return Err(Error::DeviceUnavailable);
        };
        let rqs = (0..config.max_cpus()).map(|_| FlashRq::new()).collect();
        info!(
            target: "flash",
            "installed: cpus={} reply_spin_budget={} desync={:?}",
            config.max_cpus(),
            config.reply_spin_budget(),
            config.desync_policy()
        );
        Ok(Self {
            client: AcceleratorClient::new(bridge, config.reply_spin_budget()),
            host,
            rqs,
            config,
        })
    }

    fn rq(&self, cpu: CpuId) -> Result<&FlashRq> {
        self.rqs.get(cpu.as_index()).ok_or(Error::InvalidCpu { cpu })
    }

    /// Current run-queue count of `cpu`, or `None` for an unknown processor.
    pub fn nr_running(&self, cpu: CpuId) -> Option<usize> {
        self.rqs.get(cpu.as_index()).map(FlashRq::count)
    }

    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn client(&self) -> &AcceleratorClient<B> {
        &self.client
    }

    pub fn stats(&self) -> FlashStats {
        self.client.stats()
    }

    /// [`SchedClass::pick_next`] with the failure reason preserved.
    pub fn try_pick_next(&self, cpu: CpuId) -> Result<Option<H::Task>> {
        if self.rq(cpu)?.count() == 0 {
            return Ok(None);
        }
        let id = self.client.query_next()?;
        match self.host.lookup(id) {
            Some(task) => Ok(Some(task)),
            None => {
                self.on_desync(cpu, id);
                Err(Error::UnknownEntity { id })
            }
        }
    }

    fn on_desync(&self, cpu: CpuId, id: EntityId) {
        self.client.counters().desync();
        warn!(target: "flash::class", "cpu{}: accelerator picked unknown entity {}", cpu, id);
        if self.config.desync_policy() == DesyncPolicy::RetireUnknown {
            let ghost = Entity::new(id, 0, TaskState::DEAD);
            if let Err(err) = self.client.notify_change(ChangeKind::STATE_CHANGED, &ghost) {
                warn!(target: "flash::class", "cpu{}: retiring {} failed: {}", cpu, id, err);
            }
        }
    }

    fn request_resched(&self, cpu: CpuId) {
        self.client.counters().resched_request();
        self.host.resched_curr(cpu);
    }
}

impl<B: DeviceBridge, H: HostCore> SchedClass for FlashClass<B, H> {
    type Task = H::Task;

    fn choose_processor(&self, task: &H::Task) -> CpuId {
        let cpu = balance::choose_processor(&self.rqs);
        debug!(target: "flash::class", "placing {} on cpu{}", task.entity().id, cpu);
        cpu
    }

    fn on_admit(&self, cpu: CpuId, task: &H::Task) -> Result<()> {
        self.rq(cpu)?.admit(&self.client, &task.entity())
    }

    fn on_remove(&self, cpu: CpuId, task: &H::Task) -> Result<()> {
        self.rq(cpu)?.remove(&self.client, &task.entity())
    }

    fn on_yield(&self, _cpu: CpuId) {}

    fn on_check_preempt(&self, _cpu: CpuId, _candidate: &H::Task) {}

    fn pick_next(&self, cpu: CpuId) -> Option<H::Task> {
        match self.try_pick_next(cpu) {
            Ok(task) => task,
            Err(err) => {
                debug!(target: "flash::class", "cpu{}: no pick this tick: {}", cpu, err);
                None
            }
        }
    }

    fn on_put_prev(&self, _cpu: CpuId, _task: &H::Task) {}

    fn on_tick(&self, cpu: CpuId, current: &H::Task) -> TickOutcome {
        match self.client.query_next() {
            Ok(id) if id == current.entity().id => TickOutcome::Keep,
            Ok(id) => {
                debug!(
                    target: "flash::class",
                    "cpu{}: accelerator prefers {} over {}",
                    cpu,
                    id,
                    current.entity().id
                );
                self.request_resched(cpu);
                TickOutcome::Resched
            }
            Err(_) => TickOutcome::NoDecision,
        }
    }

    fn on_switched_to(&self, cpu: CpuId, task: &H::Task) -> bool {
        if !task.on_rq() {
            return false;
        }
        let preempt = match self.host.current(cpu) {
            Some(curr) => curr.entity().id != task.entity().id && !curr.class().outranks_flash(),
            None => true,
        };
        if preempt {
            self.request_resched(cpu);
        }
        preempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{Request, Response};
    use crate::types::ClassKind;
    use core::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::vec::Vec;

    #[derive(Clone, Debug, PartialEq)]
    struct Task {
        entity: Entity,
        class: ClassKind,
        on_rq: bool,
    }

    impl Task {
        fn flash(id: u16, priority: u8) -> Self {
            Self {
                entity: Entity::new(EntityId::from_raw(id), priority, TaskState::RUNNABLE),
                class: ClassKind::Flash,
                on_rq: true,
            }
        }
    }

    impl Schedulable for Task {
        fn entity(&self) -> Entity {
            self.entity
        }
        fn class(&self) -> ClassKind {
            self.class
        }
        fn on_rq(&self) -> bool {
            self.on_rq
        }
    }

    #[derive(Default)]
    struct Host {
        tasks: HashMap<u16, Task>,
        current: RefCell<HashMap<u16, Task>>,
        resched: RefCell<Vec<CpuId>>,
    }

    impl Host {
        fn with_tasks(tasks: &[Task]) -> Self {
            Self {
                tasks: tasks.iter().map(|t| (t.entity.id.as_raw(), t.clone())).collect(),
                ..Self::default()
            }
        }
    }

    impl HostCore for Host {
        type Task = Task;
        fn lookup(&self, id: EntityId) -> Option<Task> {
            self.tasks.get(&id.as_raw()).cloned()
        }
        fn current(&self, cpu: CpuId) -> Option<Task> {
            self.current.borrow().get(&cpu.as_raw()).cloned()
        }
        fn resched_curr(&self, cpu: CpuId) {
            self.resched.borrow_mut().push(cpu);
        }
    }

    /// Answers every schedule request with a fixed word and records traffic.
    #[derive(Default)]
    struct FixedReply {
        reply: Cell<Option<u32>>,
        requests: RefCell<Vec<Request>>,
    }

    impl FixedReply {
        fn answering(word: u32) -> Self {
            let bridge = Self::default();
            bridge.reply.set(Some(word));
            bridge
        }
    }

    impl DeviceBridge for FixedReply {
        fn request(&self, request: Request) -> Result<Response> {
            self.requests.borrow_mut().push(request);
            match request {
                Request::Change(_) => Ok(Response::Accepted),
                Request::Schedule { spin_budget } => match self.reply.get() {
                    Some(word) => Ok(Response::Reply(word)),
                    None => Err(Error::Timeout { spins: spin_budget }),
                },
            }
        }
    }

    fn install(bridge: FixedReply, host: Host) -> FlashClass<FixedReply, Host> {
        FlashClass::install(Attachment::Attached(bridge), host, FlashConfig::new()).unwrap()
    }

    fn schedule_requests(class: &FlashClass<FixedReply, Host>) -> usize {
        class
            .client()
            .bridge()
            .requests
            .borrow()
            .iter()
            .filter(|r| matches!(r, Request::Schedule { .. }))
            .count()
    }

    #[test]
    fn detached_bridge_is_refused() {
        let res = FlashClass::install(Attachment::<FixedReply>::Detached, Host::default(), FlashConfig::new());
        assert!(matches!(res, Err(Error::DeviceUnavailable)));
    }

    #[test]
    fn pick_on_empty_queue_skips_the_device() {
        let class = install(FixedReply::answering(1), Host::with_tasks(&[Task::flash(1, 0)]));
        assert_eq!(class.pick_next(CpuId::BOOT), None);
        assert_eq!(schedule_requests(&class), 0);
    }

    #[test]
    fn pick_resolves_accelerator_choice() {
        let a = Task::flash(1, 0);
        let b = Task::flash(2, 0);
        let class = install(FixedReply::answering(2), Host::with_tasks(&[a.clone(), b.clone()]));
        class.on_admit(CpuId::BOOT, &a).unwrap();
        class.on_admit(CpuId::BOOT, &b).unwrap();
        assert_eq!(class.pick_next(CpuId::BOOT), Some(b));
        assert_eq!(schedule_requests(&class), 1);
    }

    #[test]
    fn unknown_id_skips_tick_and_counts_desync() {
        let a = Task::flash(1, 0);
        let class = install(FixedReply::answering(99), Host::with_tasks(&[a.clone()]));
        class.on_admit(CpuId::BOOT, &a).unwrap();
        assert_eq!(
            class.try_pick_next(CpuId::BOOT),
            Err(Error::UnknownEntity { id: EntityId::from_raw(99) })
        );
        assert_eq!(class.pick_next(CpuId::BOOT), None);
        assert_eq!(class.stats().desyncs, 2);
    }

    #[test]
    fn retire_policy_kills_unknown_id() {
        let a = Task::flash(1, 0);
        let cfg = FlashConfig::new().with_desync_policy(DesyncPolicy::RetireUnknown);
        let class = FlashClass::install(
            Attachment::Attached(FixedReply::answering(42)),
            Host::with_tasks(&[a.clone()]),
            cfg,
        )
        .unwrap();
        class.on_admit(CpuId::BOOT, &a).unwrap();
        assert_eq!(class.pick_next(CpuId::BOOT), None);
        let requests = class.client().bridge().requests.borrow();
        assert!(matches!(
            requests.last(),
            Some(Request::Change(msg))
                if msg.id == EntityId::from_raw(42)
                    && msg.state == TaskState::DEAD
                    && msg.kind == ChangeKind::STATE_CHANGED
        ));
    }

    #[test]
    fn timeout_yields_no_pick() {
        let a = Task::flash(1, 0);
        let class = install(FixedReply::default(), Host::with_tasks(&[a.clone()]));
        class.on_admit(CpuId::BOOT, &a).unwrap();
        assert_eq!(class.pick_next(CpuId::BOOT), None);
        assert_eq!(class.stats().timeouts, 1);
    }

    #[test]
    fn tick_reschedules_only_on_disagreement() {
        let a = Task::flash(1, 0);
        let b = Task::flash(2, 0);
        let class = install(FixedReply::answering(2), Host::with_tasks(&[a.clone(), b.clone()]));

        assert_eq!(class.on_tick(CpuId::BOOT, &a), TickOutcome::Resched);
        assert_eq!(*class.host().resched.borrow(), [CpuId::BOOT]);

        assert_eq!(class.on_tick(CpuId::BOOT, &b), TickOutcome::Keep);
        assert_eq!(class.host().resched.borrow().len(), 1);
    }

    #[test]
    fn tick_without_reply_makes_no_decision() {
        let a = Task::flash(1, 0);
        let class = install(FixedReply::default(), Host::with_tasks(&[a.clone()]));
        assert_eq!(class.on_tick(CpuId::BOOT, &a), TickOutcome::NoDecision);
        assert!(class.host().resched.borrow().is_empty());
    }

    #[test]
    fn put_prev_yield_and_check_preempt_are_silent() {
        let a = Task::flash(1, 0);
        let class = install(FixedReply::answering(1), Host::with_tasks(&[a.clone()]));
        class.on_put_prev(CpuId::BOOT, &a);
        class.on_yield(CpuId::BOOT);
        class.on_check_preempt(CpuId::BOOT, &a);
        assert!(class.client().bridge().requests.borrow().is_empty());
    }

    #[test]
    fn switched_to_respects_fixed_priority_classes() {
        let incoming = Task::flash(5, 0);
        let mut rt = Task::flash(6, 0);
        rt.class = ClassKind::Realtime;
        let fair = Task { class: ClassKind::Fair, ..Task::flash(7, 0) };
        let class = install(FixedReply::answering(5), Host::with_tasks(&[]));

        class.host().current.borrow_mut().insert(0, rt);
        assert!(!class.on_switched_to(CpuId::BOOT, &incoming));

        class.host().current.borrow_mut().insert(0, fair);
        assert!(class.on_switched_to(CpuId::BOOT, &incoming));

        class.host().current.borrow_mut().insert(0, incoming.clone());
        assert!(!class.on_switched_to(CpuId::BOOT, &incoming));

        let sleeping = Task { on_rq: false, ..Task::flash(8, 0) };
        assert!(!class.on_switched_to(CpuId::BOOT, &sleeping));

        // cpu1 runs nothing at all.
        let idle_cpu = CpuId::from_raw(1);
        assert!(class.on_switched_to(idle_cpu, &incoming));

        assert_eq!(*class.host().resched.borrow(), [CpuId::BOOT, idle_cpu]);
        assert!(class.client().bridge().requests.borrow().is_empty());
    }

    #[test]
    fn invalid_cpu_is_rejected() {
        let a = Task::flash(1, 0);
        let class = install(FixedReply::answering(1), Host::with_tasks(&[a.clone()]));
        let cpu = CpuId::from_raw(9);
        assert_eq!(class.on_admit(cpu, &a), Err(Error::InvalidCpu { cpu }));
        assert_eq!(class.nr_running(cpu), None);
    }

    #[test]
    fn new_entities_go_to_least_loaded_cpu() {
        let tasks: Vec<Task> = (1..=7).map(|id| Task::flash(id, 0)).collect();
        let class = install(FixedReply::answering(1), Host::with_tasks(&tasks));
        let layout = [3usize, 1, 1, 2];
        let mut next = tasks.iter();
        for (cpu, n) in layout.iter().enumerate() {
            for _ in 0..*n {
                let task = next.next().unwrap();
                class.on_admit(CpuId::from_raw(cpu as u16), task).unwrap();
            }
        }
        let newcomer = Task::flash(100, 0);
        assert_eq!(class.choose_processor(&newcomer), CpuId::from_raw(1));
    }
}
