//! Optimistic mutations: apply now, confirm or roll back when the server answers.
//!
//! Every operator mutation goes through [`Coordinator::begin`], which validates
//! it, records what it is about to change, marks the job pending and applies
//! the speculative change to the store. The returned [`Ticket`] carries the
//! request to send. Its result comes back through [`Coordinator::confirm`] or
//! [`Coordinator::fail`]; both clear the pending mark.
//!
//! Each operation moves through `AppliedSpeculatively → Confirmed | RolledBack`
//! exactly once.

use crate::api::{JobPatch, JobsApi};
use crate::model::{Job, JobId, JobStatus};
use crate::poller::SettleGoal;
use crate::reducer::{Action, JobStore};
use color_eyre::eyre::Result;
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create {
        title: String,
        profile_id: Option<String>,
    },
    Rename {
        job_id: JobId,
        title: String,
    },
    Reassign {
        job_id: JobId,
        profile_id: String,
    },
    /// `profile_id` overrides the job's own profile for this run.
    Start {
        job_id: JobId,
        profile_id: Option<String>,
    },
    Stop {
        job_id: JobId,
    },
    Delete {
        job_id: JobId,
    },
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::Create { .. } => MutationKind::Create,
            Self::Rename { .. } => MutationKind::Rename,
            Self::Reassign { .. } => MutationKind::Reassign,
            Self::Start { .. } => MutationKind::Start,
            Self::Stop { .. } => MutationKind::Stop,
            Self::Delete { .. } => MutationKind::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Rename,
    Reassign,
    Start,
    Stop,
    Delete,
}

impl MutationKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Rename => "Rename",
            Self::Reassign => "Profile change",
            Self::Start => "Start",
            Self::Stop => "Stop",
            Self::Delete => "Delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(u64);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpPhase {
    AppliedSpeculatively,
    Confirmed,
    RolledBack,
}

/// One job field touched by a speculative change.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Title(String),
    Profile(Option<String>),
    Status(JobStatus),
    StopRequested(bool),
}

impl Field {
    fn holds_in(&self, job: &Job) -> bool {
        match self {
            Self::Title(title) => job.title == *title,
            Self::Profile(profile) => job.profile_id == *profile,
            Self::Status(status) => job.status == *status,
            Self::StopRequested(requested) => job.stop_requested == *requested,
        }
    }

    fn write_to(self, job: &mut Job) {
        match self {
            Self::Title(title) => job.title = title,
            Self::Profile(profile) => job.profile_id = profile,
            Self::Status(status) => job.status = status,
            Self::StopRequested(requested) => job.stop_requested = requested,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Rollback {
    /// Failed create: drop the placeholder.
    Discard,
    /// Restore `before` unless the server has since overwritten `speculative`.
    Field { before: Field, speculative: Field },
    /// Failed delete: put the job back where it was.
    Reinsert { job: Job, position: usize },
    /// The server removed the job while its delete was in flight; a failure
    /// changes nothing and is not worth a notice.
    AlreadyGone,
}

/// What a create actually sent, to spot edits made during the round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Sent {
    title: String,
    profile_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingOp {
    pub id: OpId,
    pub kind: MutationKind,
    pub job_id: JobId,
    pub phase: OpPhase,
    rollback: Rollback,
    sent: Option<Sent>,
}

impl PendingOp {
    fn resolve(&mut self, phase: OpPhase) {
        debug_assert_eq!(self.phase, OpPhase::AppliedSpeculatively, "{} resolved twice", self.id);
        self.phase = phase;
    }
}

/// The network half of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Create {
        title: String,
        profile_id: Option<String>,
    },
    Update {
        job_id: JobId,
        patch: JobPatch,
    },
    Start {
        job_id: JobId,
        profile_id: Option<String>,
    },
    Stop {
        job_id: JobId,
    },
    Delete {
        job_id: JobId,
    },
}

impl Request {
    pub async fn send(self, api: &dyn JobsApi) -> Result<Response> {
        match self {
            Self::Create { title, profile_id } => api
                .create_job(&title, profile_id.as_deref())
                .await
                .map(Response::Job),
            Self::Update { job_id, patch } => api.update_job(&job_id, &patch).await.map(Response::Job),
            Self::Start { job_id, profile_id } => api
                .start_job(&job_id, profile_id.as_deref())
                .await
                .map(Response::Job),
            Self::Stop { job_id } => api.stop_job(&job_id).await.map(Response::Job),
            Self::Delete { job_id } => api.delete_job(&job_id).await.map(|()| Response::Deleted),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Job(Job),
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub op_id: OpId,
    pub request: Request,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("{0} is busy with another change")]
    Busy(JobId),
    #[error("no such job: {0}")]
    UnknownJob(JobId),
    #[error("cannot {action} a {status} job")]
    InvalidStatus {
        action: &'static str,
        status: JobStatus,
    },
    #[error("a create is already in progress")]
    CreateInFlight,
    #[error("{0} is still being created")]
    NotCreatedYet(JobId),
    #[error("no profile selected for {0}")]
    MissingProfile(JobId),
}

/// How a confirmed operation ended and what the engine should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub op_id: OpId,
    pub kind: MutationKind,
    /// Server id of the job; differs from the pending id after a create.
    pub job_id: JobId,
    /// Fields edited on a placeholder during its create round trip.
    pub follow_up: Option<JobPatch>,
    pub settle: Option<SettleGoal>,
}

/// A rolled-back operation and the notice to show for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub op_id: OpId,
    pub kind: MutationKind,
    pub job_id: JobId,
    pub notice: String,
}

#[derive(Debug)]
pub struct Coordinator {
    next_op: u64,
    next_temp: i64,
    ops: HashMap<OpId, PendingOp>,
    /// Jobs with an unresolved optimistic change (the pending-operation ledger).
    pending: HashSet<JobId>,
    create: Option<OpId>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self {
            next_op: 1,
            next_temp: -1,
            ops: HashMap::new(),
            pending: HashSet::new(),
            create: None,
        }
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self, job_id: &JobId) -> bool {
        self.pending.contains(job_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_outstanding_create(&self) -> bool {
        self.create.is_some()
    }

    pub fn op(&self, op_id: OpId) -> Option<&PendingOp> {
        self.ops.get(&op_id)
    }

    /// Validate `mutation`, apply it speculatively and hand back the request to
    /// send. `Ok(None)` means the change was purely local: an edit to a job
    /// whose create is still in flight, carried over once it lands.
    pub fn begin(&mut self, mutation: Mutation, store: &mut JobStore) -> Result<Option<Ticket>, Rejection> {
        match mutation {
            Mutation::Create { title, profile_id } => self.begin_create(title, profile_id, store).map(Some),
            Mutation::Rename { job_id, title } => {
                let patch = JobPatch::title(title.clone());
                self.begin_edit(MutationKind::Rename, job_id, Field::Title(title), patch, store)
            }
            Mutation::Reassign { job_id, profile_id } => {
                let patch = JobPatch::profile(profile_id.clone());
                self.begin_edit(MutationKind::Reassign, job_id, Field::Profile(Some(profile_id)), patch, store)
            }
            Mutation::Start { job_id, profile_id } => {
                let job = self.target(&job_id, store)?;
                if !job.status.can_start() {
                    return Err(Rejection::InvalidStatus {
                        action: "start",
                        status: job.status,
                    });
                }
                if profile_id.is_none() && job.profile_id.is_none() {
                    return Err(Rejection::MissingProfile(job_id));
                }
                let rollback = speculate(store, &job, Field::Status(JobStatus::Starting));
                let request = Request::Start {
                    job_id: job_id.clone(),
                    profile_id,
                };
                Ok(Some(self.record(MutationKind::Start, job_id, rollback, request)))
            }
            Mutation::Stop { job_id } => {
                let job = self.target(&job_id, store)?;
                if !job.status.can_stop() {
                    return Err(Rejection::InvalidStatus {
                        action: "stop",
                        status: job.status,
                    });
                }
                // The outcome status is the server's call; only mark the request.
                let rollback = speculate(store, &job, Field::StopRequested(true));
                let request = Request::Stop { job_id: job_id.clone() };
                Ok(Some(self.record(MutationKind::Stop, job_id, rollback, request)))
            }
            Mutation::Delete { job_id } => {
                let job = self.target(&job_id, store)?;
                let position = store.position(&job_id).unwrap_or(store.len());
                store.apply(Action::Delete(job_id.clone()));
                let request = Request::Delete { job_id: job_id.clone() };
                Ok(Some(self.record(
                    MutationKind::Delete,
                    job_id,
                    Rollback::Reinsert { job, position },
                    request,
                )))
            }
        }
    }

    /// The job a start, stop or delete acts on, if it may be acted on now.
    fn target(&self, job_id: &JobId, store: &JobStore) -> Result<Job, Rejection> {
        let job = store
            .get(job_id)
            .cloned()
            .ok_or_else(|| Rejection::UnknownJob(job_id.clone()))?;
        if job_id.is_temporary() {
            return Err(Rejection::NotCreatedYet(job_id.clone()));
        }
        if self.pending.contains(job_id) {
            return Err(Rejection::Busy(job_id.clone()));
        }
        Ok(job)
    }

    fn begin_edit(
        &mut self,
        kind: MutationKind,
        job_id: JobId,
        change: Field,
        patch: JobPatch,
        store: &mut JobStore,
    ) -> Result<Option<Ticket>, Rejection> {
        let Some(job) = store.get(&job_id).cloned() else {
            return Err(Rejection::UnknownJob(job_id));
        };
        if job_id.is_temporary() {
            edit_locally(store, job, change);
            return Ok(None);
        }
        if self.pending.contains(&job_id) {
            return Err(Rejection::Busy(job_id));
        }
        let rollback = speculate(store, &job, change);
        let request = Request::Update {
            job_id: job_id.clone(),
            patch,
        };
        Ok(Some(self.record(kind, job_id, rollback, request)))
    }

    fn begin_create(
        &mut self,
        title: String,
        profile_id: Option<String>,
        store: &mut JobStore,
    ) -> Result<Ticket, Rejection> {
        if self.create.is_some() {
            return Err(Rejection::CreateInFlight);
        }
        let temp_id = JobId::temporary(self.next_temp);
        self.next_temp -= 1;

        let mut placeholder = Job::new(temp_id.clone(), title.clone());
        placeholder.profile_id.clone_from(&profile_id);
        store.apply(Action::Upsert(placeholder));

        let sent = Sent {
            title: title.clone(),
            profile_id: profile_id.clone(),
        };
        let request = Request::Create { title, profile_id };
        let ticket = self.record(MutationKind::Create, temp_id, Rollback::Discard, request);
        if let Some(op) = self.ops.get_mut(&ticket.op_id) {
            op.sent = Some(sent);
        }
        self.create = Some(ticket.op_id);
        Ok(ticket)
    }

    fn record(&mut self, kind: MutationKind, job_id: JobId, rollback: Rollback, request: Request) -> Ticket {
        let id = OpId(self.next_op);
        self.next_op += 1;
        tracing::debug!(op = %id, kind = kind.label(), %job_id, "applied speculatively");
        self.pending.insert(job_id.clone());
        self.ops.insert(
            id,
            PendingOp {
                id,
                kind,
                job_id,
                phase: OpPhase::AppliedSpeculatively,
                rollback,
                sent: None,
            },
        );
        Ticket { op_id: id, request }
    }

    fn take(&mut self, op_id: OpId) -> Option<PendingOp> {
        let op = self.ops.remove(&op_id)?;
        self.pending.remove(&op.job_id);
        if self.create == Some(op_id) {
            self.create = None;
        }
        Some(op)
    }

    /// Apply the server's answer. Returns `None` for an unknown or already
    /// resolved operation.
    pub fn confirm(&mut self, op_id: OpId, response: Response, store: &mut JobStore) -> Option<Resolution> {
        let mut op = self.take(op_id)?;
        op.resolve(OpPhase::Confirmed);
        tracing::debug!(op = %op_id, kind = op.kind.label(), job_id = %op.job_id, "confirmed");

        let mut resolution = Resolution {
            op_id,
            kind: op.kind,
            job_id: op.job_id.clone(),
            follow_up: None,
            settle: match op.kind {
                MutationKind::Start => Some(SettleGoal::Start),
                MutationKind::Stop => Some(SettleGoal::Stop),
                _ => None,
            },
        };

        match (op.kind, response) {
            (MutationKind::Create, Response::Job(real)) => {
                let (real, patch) = carry_forward(real, store.get(&op.job_id), op.sent.as_ref());
                resolution.job_id = real.id.clone();
                store.apply(Action::Replace {
                    temp_id: op.job_id,
                    job: real,
                });
                if !patch.is_empty() {
                    // Held pending until the follow-up update answers.
                    self.pending.insert(resolution.job_id.clone());
                    resolution.follow_up = Some(patch);
                }
            }
            (MutationKind::Create, Response::Deleted) => {
                tracing::warn!(op = %op_id, "create answered without a job");
                store.apply(Action::Delete(op.job_id));
            }
            (MutationKind::Delete, _) => store.apply(Action::Delete(op.job_id)),
            (_, Response::Job(job)) => {
                // A push may have deleted it meanwhile; do not resurrect.
                if store.contains(&job.id) {
                    store.apply(Action::Upsert(job));
                }
            }
            (_, Response::Deleted) => {}
        }
        Some(resolution)
    }

    /// Roll back after a failed request. Returns `None` for an unknown or
    /// already resolved operation, so a notice is produced at most once, and
    /// for a delete whose job the server removed anyway.
    pub fn fail(&mut self, op_id: OpId, error: &str, store: &mut JobStore) -> Option<Failure> {
        let mut op = self.take(op_id)?;
        op.resolve(OpPhase::RolledBack);
        if op.rollback == Rollback::AlreadyGone {
            tracing::debug!(op = %op_id, job_id = %op.job_id, error, "delete failed but job is gone");
            return None;
        }
        tracing::warn!(op = %op_id, kind = op.kind.label(), job_id = %op.job_id, error, "rolled back");

        match op.rollback {
            Rollback::Discard => store.apply(Action::Delete(op.job_id.clone())),
            Rollback::Field { before, speculative } => {
                if let Some(job) = store.get(&op.job_id) {
                    if speculative.holds_in(job) {
                        let mut restored = job.clone();
                        before.write_to(&mut restored);
                        store.apply(Action::Upsert(restored));
                    }
                }
            }
            Rollback::Reinsert { job, position } => {
                if !store.contains(&job.id) {
                    store.apply(Action::Restore { job, position });
                }
            }
            Rollback::AlreadyGone => {}
        }

        Some(Failure {
            op_id,
            kind: op.kind,
            job_id: op.job_id,
            notice: format!("{} failed: {error}", op.kind.label()),
        })
    }

    /// Jobs with a delete request in flight.
    pub fn pending_deletes(&self) -> Vec<JobId> {
        self.ops
            .values()
            .filter(|op| matches!(op.rollback, Rollback::Reinsert { .. }))
            .map(|op| op.job_id.clone())
            .collect()
    }

    /// The server removed `job_id` on its own. A delete still in flight for it
    /// must not restore the job if the request then fails.
    pub fn server_deleted(&mut self, job_id: &JobId) {
        for op in self.ops.values_mut() {
            if &op.job_id == job_id && matches!(op.rollback, Rollback::Reinsert { .. }) {
                op.rollback = Rollback::AlreadyGone;
            }
        }
    }

    /// Release the pending mark held while a post-create update is in flight.
    pub fn finish_follow_up(&mut self, job_id: &JobId) {
        self.pending.remove(job_id);
    }
}

fn speculate(store: &mut JobStore, job: &Job, change: Field) -> Rollback {
    let before = match &change {
        Field::Title(_) => Field::Title(job.title.clone()),
        Field::Profile(_) => Field::Profile(job.profile_id.clone()),
        Field::Status(_) => Field::Status(job.status),
        Field::StopRequested(_) => Field::StopRequested(job.stop_requested),
    };
    let mut next = job.clone();
    change.clone().write_to(&mut next);
    store.apply(Action::Upsert(next));
    Rollback::Field {
        before,
        speculative: change,
    }
}

fn edit_locally(store: &mut JobStore, mut job: Job, change: Field) {
    change.write_to(&mut job);
    store.apply(Action::Upsert(job));
}

/// Copy fields the operator changed on the placeholder after the create was
/// sent onto the real job, and build the update that tells the server.
fn carry_forward(mut real: Job, placeholder: Option<&Job>, sent: Option<&Sent>) -> (Job, JobPatch) {
    let mut patch = JobPatch::default();
    let (Some(placeholder), Some(sent)) = (placeholder, sent) else {
        return (real, patch);
    };
    if placeholder.title != sent.title && real.title != placeholder.title {
        real.title.clone_from(&placeholder.title);
        patch.title = Some(placeholder.title.clone());
    }
    if placeholder.profile_id != sent.profile_id && real.profile_id != placeholder.profile_id {
        if let Some(profile) = &placeholder.profile_id {
            real.profile_id = Some(profile.clone());
            patch.profile_id = Some(profile.clone());
        }
    }
    (real, patch)
}
