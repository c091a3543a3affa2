//! Metadata resolver: kind-based dispatch over the provider clients
//!
//! The resolver owns the dispatch table from media kind to a primary
//! provider plus an optional fallback. Provider failures are absorbed
//! here: an unreachable or misbehaving catalog yields an empty
//! candidate list (logged), while caller mistakes such as a bad ISBN
//! propagate as validation errors.

pub mod isbn;

use crate::core::error::{LendError, Result};
use crate::providers::{MediaKind, MediaRecord, ProviderClient};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

type ClientRef = Arc<dyn ProviderClient>;

/// Primary provider and optional fallback for one media kind
struct Route {
    primary: ClientRef,
    fallback: Option<ClientRef>,
}

pub struct Resolver {
    routes: HashMap<MediaKind, Route>,
}

/// Builder mapping media kinds onto provider clients
#[derive(Default)]
pub struct ResolverBuilder {
    routes: HashMap<MediaKind, Route>,
}

impl ResolverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, kind: MediaKind, primary: ClientRef) -> Self {
        self.routes.insert(
            kind,
            Route {
                primary,
                fallback: None,
            },
        );
        self
    }

    pub fn route_with_fallback(
        mut self,
        kind: MediaKind,
        primary: ClientRef,
        fallback: ClientRef,
    ) -> Self {
        self.routes.insert(
            kind,
            Route {
                primary,
                fallback: Some(fallback),
            },
        );
        self
    }

    pub fn build(self) -> Resolver {
        Resolver {
            routes: self.routes,
        }
    }
}

impl Resolver {
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    /// Resolve a kind and query into at most five candidates.
    ///
    /// Identifier-based kinds validate the identifier first and fail
    /// with `ValidationError` before any network call. The fallback
    /// provider runs exactly once, and only when the primary produced
    /// nothing. Provider-level failures degrade to an empty list.
    pub async fn resolve(&self, kind: MediaKind, query: &str) -> Result<Vec<MediaRecord>> {
        let query = if kind.is_identifier_based() {
            isbn::validate(query)?
        } else {
            let trimmed = query.trim();
            if trimmed.is_empty() {
                return Err(LendError::ValidationError(
                    "search query must not be empty".to_string(),
                ));
            }
            trimmed.to_string()
        };

        let Some(route) = self.routes.get(&kind) else {
            return Err(LendError::InvalidRequest(format!(
                "no provider configured for kind {}",
                kind
            )));
        };

        let candidates = self.attempt(&route.primary, kind, &query).await;
        if !candidates.is_empty() {
            return Ok(candidates);
        }

        if let Some(fallback) = &route.fallback {
            debug!(
                kind = %kind,
                provider = fallback.name(),
                "primary returned nothing, trying fallback"
            );
            return Ok(self.attempt(fallback, kind, &query).await);
        }

        Ok(candidates)
    }

    /// Kinds this resolver can serve with at least one enabled provider
    pub fn available_kinds(&self) -> Vec<MediaKind> {
        let mut kinds: Vec<MediaKind> = MediaKind::all()
            .iter()
            .copied()
            .filter(|kind| {
                self.routes.get(kind).is_some_and(|route| {
                    route.primary.enabled()
                        || route.fallback.as_ref().is_some_and(|f| f.enabled())
                })
            })
            .collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    async fn attempt(&self, client: &ClientRef, kind: MediaKind, query: &str) -> Vec<MediaRecord> {
        if !client.enabled() {
            debug!(provider = client.name(), "provider disabled, skipping");
            return Vec::new();
        }

        match client.search(kind, query).await {
            Ok(records) => {
                debug!(
                    provider = client.name(),
                    kind = %kind,
                    candidates = records.len(),
                    "provider search complete"
                );
                records
            }
            Err(e) if e.is_provider_level() => {
                warn!(
                    provider = client.name(),
                    kind = %kind,
                    error = %e,
                    "provider search failed, treating as no candidates"
                );
                Vec::new()
            }
            Err(e) => {
                // Clients only emit provider-level errors from search
                warn!(provider = client.name(), error = %e, "unexpected search error");
                Vec::new()
            }
        }
    }
}
