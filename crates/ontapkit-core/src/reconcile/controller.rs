// ── Lifecycle driver ──
//
// Sequences create/read/update/delete/import for one `Resource` against one
// connection profile. Every failure is recorded once in the caller's
// `Diagnostics` and surfaces as a `Halt`.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ontapkit_api::{JobLink, Operation, RestClient};

use super::diff::{check_update, diff, has_gated_fields, present};
use super::version::check_version_gates;
use super::{ReconcileIdentity, Resource, StateMap};
use crate::context::ProviderContext;
use crate::diagnostics::{Diagnostics, Halt};
use crate::error::{CoreError, ErrorKind};

/// Result of a successful create: the new object's identity and its state as
/// read back from the cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub identity: ReconcileIdentity,
    pub state: StateMap,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Found {
        identity: ReconcileIdentity,
        state: StateMap,
    },
    /// The object no longer exists remotely; the caller should forget it.
    Gone,
}

/// Result of an update. `changes` is exactly what was sent; empty means no
/// request was made.
#[derive(Debug, Clone, PartialEq)]
pub struct Updated {
    pub identity: ReconcileIdentity,
    pub changes: StateMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing to delete; the object was already removed.
    AlreadyGone,
}

#[derive(Debug, Deserialize)]
struct Collection {
    #[serde(default)]
    records: Vec<Value>,
}

/// Drives the generic lifecycle for one object type on one profile.
pub struct Reconciler<'a, R> {
    ctx: &'a ProviderContext,
    profile: String,
    client: Arc<RestClient>,
    resource: R,
    cancel: CancellationToken,
}

impl<'a, R: Resource> Reconciler<'a, R> {
    /// Resolve `profile` (empty = the only configured profile) and build the
    /// client tagged `"{kind}/{crate version}"`.
    pub fn connect(
        ctx: &'a ProviderContext,
        profile: &str,
        resource: R,
        diags: &mut Diagnostics,
    ) -> Result<Self, Halt> {
        let cancel = ctx.cancel_token().child_token();
        Self::connect_with_cancel(ctx, profile, resource, cancel, diags)
    }

    /// Like [`connect`](Self::connect), but every request and job wait made
    /// through this reconciler also stops when `cancel` fires. Cancelling it
    /// leaves the context and other reconcilers usable.
    pub fn connect_with_cancel(
        ctx: &'a ProviderContext,
        profile: &str,
        resource: R,
        cancel: CancellationToken,
        diags: &mut Diagnostics,
    ) -> Result<Self, Halt> {
        let operation = format!("configure {}", resource.kind());
        let tag = format!("{}/{}", resource.kind(), env!("CARGO_PKG_VERSION"));

        let connected = ctx
            .registry()
            .resolve(profile)
            .and_then(|p| Ok((p.name.clone(), ctx.factory().build(p, &tag)?)));

        match connected {
            Ok((profile, client)) => Ok(Self {
                ctx,
                profile,
                client,
                resource,
                cancel,
            }),
            Err(e) => Err(diags.report(&operation, None, &e)),
        }
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// Name of the resolved connection profile.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    // ── Create ───────────────────────────────────────────────────────

    pub async fn create(
        &self,
        desired: &StateMap,
        diags: &mut Diagnostics,
    ) -> Result<Created, Halt> {
        let operation = self.operation("create");
        let fields = present(desired);

        let (identity, resp) = match self.create_remote(&fields).await {
            Ok(created) => created,
            Err(e) => return Err(diags.report(&operation, None, &e)),
        };

        // The cluster accepted the create; a wait that ends without a
        // verdict still leaves an object behind.
        if let Err(e) = self.await_job(&resp).await {
            let identity = matches!(e.kind(), ErrorKind::Timeout | ErrorKind::Cancelled)
                .then_some(&identity);
            return Err(diags.report(&operation, identity, &e));
        }
        debug!(kind = self.resource.kind(), %identity, "created, reading back");

        match self.fetch(&identity).await {
            Ok(Some((identity, state))) => Ok(Created { identity, state }),
            Ok(None) => {
                let e = CoreError::NotFound {
                    target: format!("{} {identity}", self.resource.kind()),
                    message: "object not found when reading back after create".into(),
                };
                Err(diags.report(&operation, Some(&identity), &e))
            }
            Err(e) => Err(diags.report(&operation, Some(&identity), &e)),
        }
    }

    /// Send the create and derive the new identity from the returned record,
    /// or from `fields` when the cluster returns none.
    async fn create_remote(
        &self,
        fields: &StateMap,
    ) -> Result<(ReconcileIdentity, Value), CoreError> {
        self.check_versions(fields).await?;

        let op = Operation::post(self.resource.collection_path())
            .with_query("return_records", "true")
            .with_body(self.resource.to_body(fields));
        let resp: Value = self.client.execute_with(&op, &self.cancel).await?;

        let record = resp
            .get("records")
            .and_then(Value::as_array)
            .and_then(|records| records.first())
            .cloned();

        let identity = match record {
            Some(record) => {
                let record = self.resource.from_record(record)?;
                self.resource.identity_from_record(&record)?
            }
            None => self.resource.identity_from_record(fields)?,
        };
        Ok((identity, resp))
    }

    // ── Read ─────────────────────────────────────────────────────────

    pub async fn read(
        &self,
        identity: &ReconcileIdentity,
        diags: &mut Diagnostics,
    ) -> Result<ReadOutcome, Halt> {
        let operation = self.operation("read");

        match self.fetch(identity).await {
            Ok(Some((identity, state))) => Ok(ReadOutcome::Found { identity, state }),
            Ok(None) => {
                self.gone(&operation, identity, diags);
                Ok(ReadOutcome::Gone)
            }
            Err(e) => Err(diags.report(&operation, Some(identity), &e)),
        }
    }

    /// Read the record for `identity`. `None` means the cluster reports no
    /// such object.
    async fn fetch(
        &self,
        identity: &ReconcileIdentity,
    ) -> Result<Option<(ReconcileIdentity, StateMap)>, CoreError> {
        let record = match self.resource.record_path(identity) {
            Some(path) => {
                let op = Operation::get(path).with_params(self.resource.read_query());
                match self.client.execute_with::<Value>(&op, &self.cancel).await {
                    Ok(record) => Some(record),
                    Err(e) if e.is_not_found() => None,
                    Err(e) => return Err(e.into()),
                }
            }
            None => self.lookup(identity).await?,
        };

        let Some(record) = record else {
            return Ok(None);
        };
        let state = self.resource.from_record(record)?;
        let identity = self.resource.identity_from_record(&state)?;
        Ok(Some((identity, state)))
    }

    /// Locate a record through a collection query. More than one match is a
    /// conflict: the identity is not specific enough.
    async fn lookup(&self, identity: &ReconcileIdentity) -> Result<Option<Value>, CoreError> {
        let op = Operation::get(self.resource.collection_path())
            .with_params(self.resource.lookup_query(identity))
            .with_params(self.resource.read_query());
        let collection: Collection = self.client.execute_with(&op, &self.cancel).await?;

        let mut records = collection.records.into_iter();
        match (records.next(), records.next()) {
            (None, _) => Ok(None),
            (Some(record), None) => Ok(Some(record)),
            (Some(_), Some(_)) => Err(CoreError::Conflict {
                message: format!(
                    "{} lookup for {identity} matched {} records; expected one",
                    self.resource.kind(),
                    2 + records.count()
                ),
                code: None,
            }),
        }
    }

    // ── Update ───────────────────────────────────────────────────────

    pub async fn update(
        &self,
        identity: &ReconcileIdentity,
        desired: &StateMap,
        prior: &StateMap,
        diags: &mut Diagnostics,
    ) -> Result<Updated, Halt> {
        let operation = self.operation("update");
        let changes = diff(desired, prior);

        match self.update_remote(identity, &changes).await {
            Ok(identity) => Ok(Updated { identity, changes }),
            Err(e) => Err(diags.report(&operation, Some(identity), &e)),
        }
    }

    async fn update_remote(
        &self,
        identity: &ReconcileIdentity,
        changes: &StateMap,
    ) -> Result<ReconcileIdentity, CoreError> {
        check_update(self.resource.fields(), changes)?;
        if changes.is_empty() {
            debug!(kind = self.resource.kind(), %identity, "no changes, skipping update");
            return Ok(identity.clone());
        }
        self.check_versions(changes).await?;

        let Some((identity, path)) = self.locate(identity).await? else {
            return Err(CoreError::NotFound {
                target: format!("{} {identity}", self.resource.kind()),
                message: "object to update does not exist".into(),
            });
        };

        debug!(kind = self.resource.kind(), %identity, fields = changes.len(), "patching");
        let op = Operation::patch(path).with_body(self.resource.to_body(changes));
        let resp: Value = self.client.execute_with(&op, &self.cancel).await?;
        self.await_job(&resp).await?;
        Ok(identity)
    }

    // ── Delete ───────────────────────────────────────────────────────

    pub async fn delete(
        &self,
        identity: &ReconcileIdentity,
        diags: &mut Diagnostics,
    ) -> Result<DeleteOutcome, Halt> {
        let operation = self.operation("delete");

        match self.delete_remote(identity).await {
            Ok(outcome) => {
                if outcome == DeleteOutcome::AlreadyGone {
                    self.gone(&operation, identity, diags);
                }
                Ok(outcome)
            }
            Err(e) => Err(diags.report(&operation, Some(identity), &e)),
        }
    }

    async fn delete_remote(&self, identity: &ReconcileIdentity) -> Result<DeleteOutcome, CoreError> {
        let Some((identity, path)) = self.locate(identity).await? else {
            return Ok(DeleteOutcome::AlreadyGone);
        };

        debug!(kind = self.resource.kind(), %identity, "deleting");
        let op = Operation::delete(path);
        let resp = match self.client.execute_with::<Value>(&op, &self.cancel).await {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => return Ok(DeleteOutcome::AlreadyGone),
            Err(e) => return Err(e.into()),
        };

        // Only the DELETE itself may report the object missing; a job that
        // fails or vanishes after acceptance is an error.
        self.await_job(&resp).await?;
        Ok(DeleteOutcome::Deleted)
    }

    // ── Import ───────────────────────────────────────────────────────

    /// Parse an import key into an identity. Follow with [`read`](Self::read)
    /// to obtain the state.
    pub fn import(&self, key: &str, diags: &mut Diagnostics) -> Result<ReconcileIdentity, Halt> {
        self.resource
            .import_format()
            .identity(key)
            .map_err(|e| diags.report(&self.operation("import"), None, &e))
    }

    // ── Shared steps ─────────────────────────────────────────────────

    fn operation(&self, verb: &str) -> String {
        format!("{verb} {}", self.resource.kind())
    }

    fn gone(&self, operation: &str, identity: &ReconcileIdentity, diags: &mut Diagnostics) {
        warn!(kind = self.resource.kind(), %identity, "{operation}: object not found remotely");
        diags.warning(
            format!("{operation}: object not found"),
            format!(
                "{} {identity} no longer exists and will be removed from state",
                self.resource.kind()
            ),
        );
    }

    /// Direct record path for `identity`, resolving it by lookup when it
    /// lacks one. `None` when the lookup finds nothing.
    async fn locate(
        &self,
        identity: &ReconcileIdentity,
    ) -> Result<Option<(ReconcileIdentity, String)>, CoreError> {
        if let Some(path) = self.resource.record_path(identity) {
            return Ok(Some((identity.clone(), path)));
        }

        let Some(record) = self.lookup(identity).await? else {
            return Ok(None);
        };
        let resolved = self
            .resource
            .identity_from_record(&self.resource.from_record(record)?)?;
        let path = self.resource.record_path(&resolved).ok_or_else(|| {
            CoreError::Internal(format!(
                "{} identity {resolved} has no record path after lookup",
                self.resource.kind()
            ))
        })?;
        Ok(Some((resolved, path)))
    }

    /// Wait for the job a response refers to, if any.
    async fn await_job(&self, resp: &Value) -> Result<(), CoreError> {
        if let Some(link) = JobLink::from_response(resp) {
            self.ctx
                .poller()
                .await_job(&*self.client, &link, &self.cancel)
                .await?;
        }
        Ok(())
    }

    /// Fetch the cluster version only when `fields` contains a gated field.
    async fn check_versions(&self, fields: &StateMap) -> Result<(), CoreError> {
        let rules = self.resource.fields();
        if !has_gated_fields(rules, fields) {
            return Ok(());
        }
        let version = self
            .ctx
            .cluster_version(&self.profile, &*self.client, &self.cancel)
            .await?;
        check_version_gates(rules, fields, version)
    }
}
