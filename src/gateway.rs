//! Public access: share tokens, visit counting and public snapshots.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    ChatflowError, GraphModel, Result,
    store::{Store, data::VersionRow, query::Query},
    utils,
};

#[derive(Clone)]
pub struct PublicGateway {
    store: Arc<Store>,
}

impl PublicGateway {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
        }
    }

    /// The version a share token points at.
    ///
    /// Unknown and cleared tokens both fail with the same `NotFound`.
    pub fn resolve_token(
        &self,
        token: &str,
    ) -> Result<VersionRow> {
        let token = token.trim();
        if token.is_empty() {
            return Err(not_found());
        }
        let page = self.store.versions().query(&Query::new().filter("public_token", token).set_limit(1))?;
        page.rows.into_iter().next().ok_or_else(not_found)
    }

    /// Count a visit for `token`. Failures are logged and swallowed.
    pub fn record_visit(
        &self,
        token: &str,
    ) {
        match self.store.atomic().and_then(|atomic| atomic.record_visit(token)) {
            Ok(true) => debug!(token, "visit recorded"),
            Ok(false) => debug!(token, "visit for unknown token ignored"),
            Err(e) => warn!(token, error = %e, "failed to record visit"),
        }
    }

    /// Resolve a token, count the visit and load the variable-substituted snapshot.
    pub fn public_snapshot(
        &self,
        token: &str,
    ) -> Result<GraphModel> {
        let version = self.resolve_token(token)?;
        self.record_visit(token);
        self.store.snapshot(&version.id)
    }

    /// Resolve a token, count the visit and load the version with its templates unresolved.
    pub fn public_graph(
        &self,
        token: &str,
    ) -> Result<GraphModel> {
        let version = self.resolve_token(token)?;
        self.record_visit(token);
        self.store.version_graph(&version.id)
    }

    /// Current token of a version, creating one when missing or when `force` is set.
    ///
    /// A new token replaces the previous one immediately and resets the visit counter.
    pub fn get_or_create_link(
        &self,
        version_id: &str,
        force: bool,
    ) -> Result<String> {
        let mut version = self.store.versions().find(version_id)?;
        if let Some(token) = &version.public_token
            && !force
        {
            return Ok(token.clone());
        }

        let token = utils::share_token();
        version.public_token = Some(token.clone());
        version.visit_count = 0;
        self.store.versions().update(&version)?;
        info!(version = version_id, "share link created");
        Ok(token)
    }

    pub fn public_link(
        &self,
        version_id: &str,
    ) -> Result<Option<String>> {
        Ok(self.store.versions().find(version_id)?.public_token)
    }

    /// Revoke the share token of a version.
    pub fn clear_link(
        &self,
        version_id: &str,
    ) -> Result<()> {
        let mut version = self.store.versions().find(version_id)?;
        if version.public_token.take().is_some() {
            self.store.versions().update(&version)?;
            info!(version = version_id, "share link cleared");
        }
        Ok(())
    }
}

fn not_found() -> ChatflowError {
    ChatflowError::NotFound("public link".to_string())
}
