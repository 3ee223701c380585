//! Scripted in-memory CloudFront for engine and workflow tests.
//!
//! `FakeApi` keeps one object map behind a mutex and logs every call it
//! receives, so tests can assert on call order as well as outcomes. Objects
//! converge on their own: after a create or update the next
//! `deploy_reads` reads report the kind's pending status, then its target.

use crate::error::{ApiError, ApiResult};
use crate::resources::{CertificateBinding, Lifecycle, ManagedCertificate, ResourceApi};
use crate::types::{ETag, ResourceHandle, ResourceKind, Versioned};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Body returned by [`FakeApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeBody {
    pub id: String,
    pub status: Option<String>,
    pub enabled: bool,
    pub comment: String,
    pub certificate: Option<String>,
}

/// Desired configuration accepted by [`FakeApi`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeConfig {
    pub enabled: bool,
    pub comment: String,
    pub certificate: Option<String>,
}

impl FakeConfig {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = comment.to_string();
        self
    }

    #[must_use]
    pub fn with_certificate(mut self, arn: &str) -> Self {
        self.certificate = Some(arn.to_string());
        self
    }
}

/// One call received by [`FakeApi`], recorded before any injected failure fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `status` is what the read reported; `None` when the object was absent
    /// or has no status.
    Get { id: String, status: Option<String> },
    Create,
    Update {
        id: String,
        enabled: bool,
        comment: String,
        certificate: Option<String>,
    },
    Delete(String),
    GetCertificate(String),
    /// Disabling the dependent policy with this id.
    DetachDependent(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Op {
    Get,
    Create,
    Update,
    Delete,
}

#[derive(Debug)]
struct Object {
    body: FakeBody,
    version: u32,
    pending_reads: u32,
    script: VecDeque<String>,
    /// Reads left before a deleted object stops being visible.
    linger: Option<u32>,
}

impl Object {
    fn etag(&self) -> ETag {
        ETag::new(format!("{}-v{}", self.body.id, self.version))
    }

    fn versioned(&self) -> Versioned<FakeBody> {
        Versioned::new(self.body.clone(), self.etag())
    }
}

#[derive(Debug)]
struct Dependent {
    id: String,
    exists: bool,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<String, Object>,
    calls: Vec<Call>,
    failures: HashMap<Op, VecDeque<ApiError>>,
    certificates: VecDeque<ApiResult<ManagedCertificate>>,
    dependents: HashMap<String, Dependent>,
    next_id: u32,
    deploy_reads: u32,
    linger_reads: u32,
}

impl State {
    fn injected(&mut self, op: Op) -> ApiResult<()> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn live(&mut self, id: &str) -> ApiResult<&mut Object> {
        self.objects
            .get_mut(id)
            .filter(|object| object.linger.is_none())
            .ok_or_else(|| ApiError::not_found(format!("{id} does not exist")))
    }
}

pub struct FakeApi {
    lifecycle: Lifecycle,
    state: Mutex<State>,
}

impl FakeApi {
    pub fn new(kind: ResourceKind) -> Self {
        Self::with_lifecycle(Lifecycle::for_kind(kind))
    }

    pub fn with_lifecycle(lifecycle: Lifecycle) -> Self {
        Self {
            lifecycle,
            state: Mutex::new(State {
                deploy_reads: 1,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn has_enabled_flag(&self) -> bool {
        matches!(
            self.lifecycle.kind,
            ResourceKind::Distribution
                | ResourceKind::DistributionTenant
                | ResourceKind::ConnectionGroup
        )
    }

    fn pending_status(&self) -> Option<String> {
        self.lifecycle
            .deploy
            .as_ref()
            .and_then(|deploy| deploy.pending.first())
            .map(|s| (*s).to_string())
    }

    fn target_status(&self) -> Option<String> {
        self.lifecycle
            .deploy
            .as_ref()
            .and_then(|deploy| deploy.target.first())
            .map(|s| (*s).to_string())
    }

    fn insert(
        &self,
        id: &str,
        enabled: bool,
        status: Option<String>,
        pending_reads: u32,
    ) -> ResourceHandle {
        let object = Object {
            body: FakeBody {
                id: id.to_string(),
                status,
                enabled,
                comment: String::new(),
                certificate: None,
            },
            version: 1,
            pending_reads,
            script: VecDeque::new(),
            linger: None,
        };
        self.state().objects.insert(id.to_string(), object);
        ResourceHandle::new(id)
    }

    /// Seed an object that has finished deploying.
    pub fn seed_deployed(&self, id: &str, enabled: bool) -> ResourceHandle {
        self.insert(id, enabled, self.target_status(), 0)
    }

    /// Seed an object whose next `pending_reads` reads report it still deploying.
    pub fn seed_in_progress(&self, id: &str, enabled: bool, pending_reads: u32) -> ResourceHandle {
        self.insert(id, enabled, self.pending_status(), pending_reads)
    }

    /// Number of pending reads an object reports after each create or update.
    pub fn set_deploy_reads(&self, reads: u32) {
        self.state().deploy_reads = reads;
    }

    /// Number of reads a deleted object stays visible for.
    pub fn set_linger_reads(&self, reads: u32) {
        self.state().linger_reads = reads;
    }

    /// Statuses the next reads report, in order; the last one repeats.
    pub fn script_statuses(&self, handle: &ResourceHandle, statuses: &[&str]) {
        if let Some(object) = self.state().objects.get_mut(handle.as_str()) {
            object.script = statuses.iter().map(|s| (*s).to_string()).collect();
        }
    }

    pub fn set_certificate(&self, handle: &ResourceHandle, arn: &str) {
        if let Some(object) = self.state().objects.get_mut(handle.as_str()) {
            object.body.certificate = Some(arn.to_string());
        }
    }

    /// Managed certificate statuses for the next lookups; the last one repeats.
    pub fn script_certificate(&self, statuses: &[&str], arn: &str) {
        let mut state = self.state();
        state.certificates = statuses
            .iter()
            .map(|status| {
                Ok(ManagedCertificate {
                    certificate_arn: Some(arn.to_string()),
                    status: (*status).to_string(),
                })
            })
            .collect();
    }

    /// Attach a dependent policy that must be disabled before `handle` is deleted.
    pub fn attach_dependent(&self, handle: &ResourceHandle, id: &str) {
        self.state().dependents.insert(
            handle.to_string(),
            Dependent {
                id: id.to_string(),
                exists: true,
            },
        );
    }

    /// Attach a dependent policy id whose policy has already been deleted.
    pub fn attach_missing_dependent(&self, handle: &ResourceHandle, id: &str) {
        self.state().dependents.insert(
            handle.to_string(),
            Dependent {
                id: id.to_string(),
                exists: false,
            },
        );
    }

    pub fn fail_next_get(&self, error: ApiError) {
        self.fail_next(Op::Get, error);
    }

    pub fn fail_next_create(&self, error: ApiError) {
        self.fail_next(Op::Create, error);
    }

    pub fn fail_next_update(&self, error: ApiError) {
        self.fail_next(Op::Update, error);
    }

    pub fn fail_next_delete(&self, error: ApiError) {
        self.fail_next(Op::Delete, error);
    }

    fn fail_next(&self, op: Op, error: ApiError) {
        self.state().failures.entry(op).or_default().push_back(error);
    }

    /// Bump the version as an out-of-band writer would.
    pub fn touch(&self, handle: &ResourceHandle) {
        if let Some(object) = self.state().objects.get_mut(handle.as_str()) {
            object.version += 1;
        }
    }

    /// Delete out-of-band, honoring the configured linger reads.
    pub fn remove(&self, handle: &ResourceHandle) {
        let mut state = self.state();
        let linger = state.linger_reads;
        if let Some(object) = state.objects.get_mut(handle.as_str()) {
            object.linger = Some(linger);
        }
    }

    pub fn exists(&self, handle: &ResourceHandle) -> bool {
        self.state()
            .objects
            .get(handle.as_str())
            .is_some_and(|object| object.linger.is_none())
    }

    pub fn body(&self, handle: &ResourceHandle) -> Option<FakeBody> {
        self.state()
            .objects
            .get(handle.as_str())
            .map(|object| object.body.clone())
    }

    pub fn current_etag(&self, handle: &ResourceHandle) -> ETag {
        self.state()
            .objects
            .get(handle.as_str())
            .map_or_else(|| ETag::new("missing"), Object::etag)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| predicate(c)).count()
    }

    fn read(&self, id: &str) -> ApiResult<Versioned<FakeBody>> {
        let target = self.target_status();
        let pending = self.pending_status();
        let mut state = self.state();

        let result = match state.objects.get_mut(id) {
            None => Err(ApiError::not_found(format!("{id} does not exist"))),
            Some(object) => match object.linger {
                Some(0) => Err(ApiError::not_found(format!("{id} does not exist"))),
                Some(left) => {
                    object.linger = Some(left - 1);
                    Ok(object.versioned())
                }
                None => {
                    if object.script.len() > 1 {
                        object.body.status = object.script.pop_front();
                    } else if let Some(last) = object.script.front() {
                        object.body.status = Some(last.clone());
                    } else if object.pending_reads > 0 {
                        object.pending_reads -= 1;
                        object.body.status.clone_from(&pending);
                    } else {
                        object.body.status.clone_from(&target);
                    }
                    Ok(object.versioned())
                }
            },
        };

        if result.is_err() {
            state.objects.retain(|_, object| object.linger != Some(0));
        }
        let status = result.as_ref().ok().and_then(|v| v.body.status.clone());
        state.calls.push(Call::Get {
            id: id.to_string(),
            status,
        });
        result
    }
}

#[async_trait]
impl ResourceApi for FakeApi {
    type Body = FakeBody;
    type Config = FakeConfig;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn status(&self, body: &FakeBody) -> Option<String> {
        body.status.clone()
    }

    fn is_enabled(&self, body: &FakeBody) -> Option<bool> {
        self.has_enabled_flag().then_some(body.enabled)
    }

    fn disabled_config(&self, body: &FakeBody) -> Option<FakeConfig> {
        self.has_enabled_flag().then(|| FakeConfig {
            enabled: false,
            comment: body.comment.clone(),
            certificate: body.certificate.clone(),
        })
    }

    async fn detach_dependents(&self, handle: &ResourceHandle, _body: &FakeBody) -> ApiResult<bool> {
        let pending = self.pending_status();
        let mut state = self.state();
        let Some(dependent) = state.dependents.remove(handle.as_str()) else {
            return Ok(false);
        };
        state.calls.push(Call::DetachDependent(dependent.id.clone()));
        if !dependent.exists {
            return Err(ApiError::from_code(
                Some("NoSuchContinuousDeploymentPolicy"),
                format!("{} does not exist", dependent.id),
            ));
        }

        let deploy_reads = state.deploy_reads;
        if let Some(object) = state.objects.get_mut(handle.as_str()) {
            object.version += 1;
            object.body.status = pending;
            object.pending_reads = deploy_reads;
            object.script.clear();
        }
        Ok(true)
    }

    async fn get(&self, handle: &ResourceHandle) -> ApiResult<Versioned<FakeBody>> {
        let injected = self.state().injected(Op::Get);
        if let Err(error) = injected {
            self.state().calls.push(Call::Get {
                id: handle.to_string(),
                status: None,
            });
            return Err(error);
        }
        self.read(handle.as_str())
    }

    async fn create(&self, config: &FakeConfig) -> ApiResult<(ResourceHandle, Versioned<FakeBody>)> {
        let status = self.pending_status();
        let mut state = self.state();
        state.calls.push(Call::Create);
        state.injected(Op::Create)?;

        state.next_id += 1;
        let id = format!("FAKE{:04}", state.next_id);
        let object = Object {
            body: FakeBody {
                id: id.clone(),
                status,
                enabled: config.enabled,
                comment: config.comment.clone(),
                certificate: config.certificate.clone(),
            },
            version: 1,
            pending_reads: state.deploy_reads,
            script: VecDeque::new(),
            linger: None,
        };
        let created = object.versioned();
        state.objects.insert(id.clone(), object);
        Ok((ResourceHandle::new(id), created))
    }

    async fn update(
        &self,
        handle: &ResourceHandle,
        etag: &ETag,
        config: &FakeConfig,
    ) -> ApiResult<Versioned<FakeBody>> {
        let status = self.pending_status();
        let mut state = self.state();
        state.calls.push(Call::Update {
            id: handle.to_string(),
            enabled: config.enabled,
            comment: config.comment.clone(),
            certificate: config.certificate.clone(),
        });
        state.injected(Op::Update)?;

        let deploy_reads = state.deploy_reads;
        let object = state.live(handle.as_str())?;
        if object.etag() != *etag {
            return Err(ApiError::stale_token(format!(
                "If-Match {etag} does not match {}",
                object.etag()
            )));
        }
        object.version += 1;
        object.body.enabled = config.enabled;
        object.body.comment.clone_from(&config.comment);
        object.body.certificate.clone_from(&config.certificate);
        object.body.status = status;
        object.pending_reads = deploy_reads;
        object.script.clear();
        Ok(object.versioned())
    }

    async fn delete(&self, handle: &ResourceHandle, etag: &ETag) -> ApiResult<()> {
        let enabled_flag = self.has_enabled_flag();
        let pending = self.pending_status();
        let mut state = self.state();
        state.calls.push(Call::Delete(handle.to_string()));
        state.injected(Op::Delete)?;

        let linger = state.linger_reads;
        let object = state.live(handle.as_str())?;
        if object.etag() != *etag {
            return Err(ApiError::stale_token(format!(
                "If-Match {etag} does not match {}",
                object.etag()
            )));
        }
        let deploying = pending.is_some() && object.body.status == pending;
        if enabled_flag && (object.body.enabled || deploying) {
            return Err(ApiError::from_code(
                Some("DistributionNotDisabled"),
                format!("{handle} must be disabled and deployed before deletion"),
            ));
        }
        object.linger = Some(linger);
        Ok(())
    }
}

#[async_trait]
impl CertificateBinding for FakeApi {
    fn bound_certificate(&self, body: &FakeBody) -> Option<String> {
        body.certificate.clone()
    }

    fn bind_certificate(&self, body: &FakeBody, certificate_arn: &str) -> ApiResult<FakeConfig> {
        Ok(FakeConfig {
            enabled: body.enabled,
            comment: body.comment.clone(),
            certificate: Some(certificate_arn.to_string()),
        })
    }

    async fn get_managed_certificate(&self, handle: &ResourceHandle) -> ApiResult<ManagedCertificate> {
        let mut state = self.state();
        state.calls.push(Call::GetCertificate(handle.to_string()));
        let next = if state.certificates.len() > 1 {
            state.certificates.pop_front()
        } else {
            state.certificates.front().cloned()
        };
        next.unwrap_or_else(|| {
            Err(ApiError::not_found(format!(
                "no managed certificate for {handle}"
            )))
        })
    }
}
