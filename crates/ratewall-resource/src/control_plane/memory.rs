//! In-memory control plane for testing.
//!
//! This module provides [`InMemoryControlPlane`], an implementation of the
//! [`ControlPlane`] trait that keeps web ACLs in process memory and enforces
//! lock tokens the same way the real service does.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No persistence, no distribution
//! - **Rule summaries only**: Replaced rules are kept as [`RuleSummary`]
//! - **Scripted faults**: Failures are injected with [`Fault`], one per call

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{ControlPlane, ExternalResourceState, LockToken, MutationResult};
use crate::error::{Error, Result};
use crate::rule::{RateRule, RuleSummary, TargetAcl};

/// A scripted failure for the next call of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Transport failure (connection reset).
    Transport,
    /// The web ACL is reported missing.
    NotFound,
    /// Another writer updates the web ACL just before the call.
    ConcurrentWrite,
    /// The service answers with this HTTP status and changes nothing.
    Status(u16),
    /// The call panics.
    Panic,
}

#[derive(Debug, Clone)]
struct AclRecord {
    arn: String,
    rules: Vec<RuleSummary>,
    lock_token: String,
}

#[derive(Debug, Default)]
struct ControlPlaneState {
    acls: HashMap<TargetAcl, AclRecord>,
    next_token: u64,
    fetch_faults: VecDeque<Fault>,
    apply_faults: VecDeque<Fault>,
    applied: Vec<(TargetAcl, RateRule)>,
}

impl ControlPlaneState {
    fn issue_token(&mut self) -> String {
        self.next_token += 1;
        format!("tok-{}", self.next_token)
    }
}

/// In-memory control plane for testing.
///
/// Tokens are issued as `tok-1`, `tok-2`, ... in order, across all web ACLs.
///
/// ## Example
///
/// ```rust
/// use ratewall_resource::control_plane::memory::InMemoryControlPlane;
/// use ratewall_resource::rule::{Scope, TargetAcl};
///
/// let control_plane = InMemoryControlPlane::new()
///     .with_acl(TargetAcl::new("acl1", "id1", Scope::Regional));
/// assert_eq!(control_plane.apply_calls(), 0);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryControlPlane {
    state: RwLock<ControlPlaneState>,
    rotate_on_fetch: bool,
    fetch_calls: AtomicUsize,
    apply_calls: AtomicUsize,
}

/// Converts a lock poison error to an internal error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::internal("control plane state lock poisoned")
}

fn fault_error(fault: Fault, target: &TargetAcl) -> Error {
    match fault {
        Fault::NotFound => Error::ResourceNotFound {
            name: target.name.clone(),
            id: target.id.clone(),
            scope: target.scope.to_string(),
        },
        Fault::Status(code) => {
            Error::control_plane_status(format!("service returned HTTP {code}"), code)
        }
        Fault::Transport | Fault::ConcurrentWrite | Fault::Panic => {
            Error::control_plane("connection reset by peer")
        }
    }
}

impl InMemoryControlPlane {
    /// Creates an empty control plane.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a web ACL with no rules.
    #[must_use]
    pub fn with_acl(self, target: TargetAcl) -> Self {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let lock_token = state.issue_token();
            let arn = format!(
                "arn:aws:wafv2:us-east-1:000000000000:{}/webacl/{}/{}",
                target.scope.as_str().to_ascii_lowercase(),
                target.name,
                target.id
            );
            state.acls.insert(
                target,
                AclRecord {
                    arn,
                    rules: Vec::new(),
                    lock_token,
                },
            );
        }
        self
    }

    /// Issues a fresh token on every fetch, as if other writers kept
    /// touching the web ACL between invocations.
    #[must_use]
    pub const fn with_token_rotation_on_fetch(mut self) -> Self {
        self.rotate_on_fetch = true;
        self
    }

    /// Installs a pre-existing rule, issuing a new token.
    ///
    /// # Errors
    ///
    /// Returns an error if the web ACL is unknown or the lock is poisoned.
    pub fn seed_rule(&self, target: &TargetAcl, rule: RuleSummary) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        let token = state.issue_token();
        let record = state
            .acls
            .get_mut(target)
            .ok_or_else(|| fault_error(Fault::NotFound, target))?;
        record.rules.push(rule);
        record.lock_token = token;
        Ok(())
    }

    /// Makes the next fetch fail with `fault`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn fail_next_fetch(&self, fault: Fault) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.fetch_faults.push_back(fault);
        Ok(())
    }

    /// Makes the next rule application fail with `fault`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn fail_next_apply(&self, fault: Fault) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.apply_faults.push_back(fault);
        Ok(())
    }

    /// Number of fetch calls made so far.
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Number of rule applications attempted so far.
    #[must_use]
    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    /// Returns the rules currently installed on a web ACL.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn rules(&self, target: &TargetAcl) -> Result<Option<Vec<RuleSummary>>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.acls.get(target).map(|record| record.rules.clone()))
    }

    /// Returns the token a conditional update must currently present.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn current_token(&self, target: &TargetAcl) -> Result<Option<String>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.acls.get(target).map(|record| record.lock_token.clone()))
    }

    /// Returns every accepted mutation in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn applied(&self) -> Result<Vec<(TargetAcl, RateRule)>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.applied.clone())
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn fetch(&self, target: &TargetAcl) -> Result<ExternalResourceState> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.write().map_err(poison_err)?;
        if let Some(fault) = state.fetch_faults.pop_front() {
            drop(state);
            if fault == Fault::Panic {
                panic!("injected panic while fetching {target}");
            }
            return Err(fault_error(fault, target));
        }

        let fresh_token = self.rotate_on_fetch.then(|| state.issue_token());
        let record = state
            .acls
            .get_mut(target)
            .ok_or_else(|| fault_error(Fault::NotFound, target))?;
        if let Some(token) = fresh_token {
            record.lock_token = token;
        }

        let fetched = ExternalResourceState {
            target: target.clone(),
            arn: Some(record.arn.clone()),
            rules: record.rules.clone(),
            lock_token: LockToken::new(record.lock_token.clone()),
        };
        drop(state);
        Ok(fetched)
    }

    async fn apply_rate_limit(
        &self,
        target: &TargetAcl,
        rule: &RateRule,
        lock_token: LockToken,
    ) -> Result<MutationResult> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.write().map_err(poison_err)?;
        let fault = state.apply_faults.pop_front();
        match fault {
            Some(Fault::Panic) => {
                drop(state);
                panic!("injected panic while updating {target}");
            }
            Some(Fault::Status(code)) => return Ok(MutationResult::from_status(code, None)),
            Some(Fault::ConcurrentWrite) => {
                let token = state.issue_token();
                if let Some(record) = state.acls.get_mut(target) {
                    record.lock_token = token;
                }
            }
            Some(other) => return Err(fault_error(other, target)),
            None => {}
        }

        let next_token = state.issue_token();
        let record = state
            .acls
            .get_mut(target)
            .ok_or_else(|| fault_error(Fault::NotFound, target))?;

        if record.lock_token != lock_token.as_str() {
            return Err(Error::StaleLockToken {
                name: target.name.clone(),
                id: target.id.clone(),
            });
        }

        record.rules = vec![RuleSummary::from(rule)];
        record.lock_token.clone_from(&next_token);
        state.applied.push((target.clone(), rule.clone()));
        drop(state);

        Ok(MutationResult::from_status(200, Some(next_token)))
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
