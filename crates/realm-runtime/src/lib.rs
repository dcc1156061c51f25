#![deny(warnings)]

//! Application runtime: configuration and the projection service.
//!
//! The service enforces the calculator's calling contract (months bounds,
//! ownership, hydration) before handing a loaded domain to `realm_econ`.

use persistence::StoreError;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use realm_core::{validate_domain_tree, Domain, DomainId, Principal, ValidationError};
use realm_econ::{calculate_financials, ProjectionResult};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

mod settings;

pub use settings::{
    AppConfig, ConfigError, ProjectionConfig, ENV_DATABASE_URL, ENV_PREFIX, ENV_RNG_SEED,
};

/// Errors produced by the projection service.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("months must be at least 1, got {0}")]
    InvalidMonths(i32),
    #[error("months {requested} exceeds the limit of {max}")]
    MonthsTooLarge { requested: i32, max: i32 },
    #[error("domain {0} not found")]
    NotFound(DomainId),
    /// Stored rows violate a domain invariant (e.g. edited outside the store API).
    #[error("domain {id} is invalid: {source}")]
    Invalid {
        id: DomainId,
        source: ValidationError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runs projections for callers acting on their own (or, for admins, any)
/// domains. Holds no mutable state; each call gets its own generator.
#[derive(Clone, Debug, Default)]
pub struct ProjectionService {
    config: ProjectionConfig,
}

impl ProjectionService {
    pub fn new(config: ProjectionConfig) -> Self {
        Self { config }
    }

    /// Requested months, or the configured default.
    pub fn months_or_default(&self, months: Option<i32>) -> i32 {
        months.unwrap_or(self.config.default_months)
    }

    pub fn check_months(&self, months: i32) -> Result<(), ProjectionError> {
        if months < 1 {
            return Err(ProjectionError::InvalidMonths(months));
        }
        if months > self.config.max_months {
            return Err(ProjectionError::MonthsTooLarge {
                requested: months,
                max: self.config.max_months,
            });
        }
        Ok(())
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.config.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Project an already loaded domain. No bounds checks beyond the
    /// calculator's own.
    pub fn project_loaded(&self, domain: &Domain, months: i32) -> ProjectionResult {
        calculate_financials(domain, months, &mut self.rng())
    }

    /// Load the domain on behalf of `principal` and project it.
    pub async fn project(
        &self,
        pool: &SqlitePool,
        principal: &Principal,
        id: DomainId,
        months: i32,
    ) -> Result<ProjectionResult, ProjectionError> {
        self.check_months(months)?;
        let Some(domain) = persistence::load_domain(pool, principal, id).await? else {
            warn!(domain_id = id.0, user_id = principal.user_id.0, "projection for unknown domain");
            return Err(ProjectionError::NotFound(id));
        };
        validate_domain_tree(&domain).map_err(|source| {
            warn!(domain_id = id.0, error = %source, "stored domain fails validation");
            ProjectionError::Invalid { id, source }
        })?;
        let result = self.project_loaded(&domain, months);
        info!(
            domain_id = id.0,
            months,
            total_income = result.total_income,
            total_expenses = result.total_expenses,
            net_total = result.net_total,
            "projection complete"
        );
        Ok(result)
    }
}
