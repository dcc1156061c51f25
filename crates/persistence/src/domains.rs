//! Owner-gated storage for domains and their enterprises, heroes and troops.
//!
//! A domain the principal may not access is reported exactly like a missing
//! one, so callers cannot probe for other users' rows.

use crate::StoreError;
use chrono::Utc;
use realm_core::{
    sanitize_text, validate_domain, validate_enterprise, validate_hero, validate_troop, Domain,
    DomainId, Enterprise, Figure, Hero, Principal, Role, Troop, UserId, MAX_NAME_LEN, MAX_NOTES_LEN,
};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

/// Listing row for a domain, with child counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainSummary {
    pub id: DomainId,
    pub owner_id: UserId,
    pub name: String,
    pub enterprises: i64,
    pub heroes: i64,
    pub troops: i64,
}

/// Writable fields of a domain.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DomainInput {
    pub name: String,
    pub notes: Option<String>,
    pub income: Figure,
    pub upkeep_cost: Figure,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnterpriseInput {
    pub name: String,
    pub income: Figure,
    pub upkeep_cost: Figure,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeroInput {
    pub name: String,
    pub wage: i64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TroopInput {
    pub name: String,
    pub quantity: i64,
    pub wage: i64,
}

/// Columns backing one stored figure.
#[derive(Clone, Copy, Debug)]
enum FigureColumns {
    Income,
    Upkeep,
}

impl FigureColumns {
    /// Fixed value, lower limit, upper limit.
    fn names(self) -> (&'static str, &'static str, &'static str) {
        match self {
            FigureColumns::Income => ("income", "income_lower_limit", "income_upper_limit"),
            FigureColumns::Upkeep => ("upkeep_cost", "upkeep_lower_limit", "upkeep_upper_limit"),
        }
    }
}

fn figure_from_row(row: &SqliteRow, columns: FigureColumns) -> Result<Figure, StoreError> {
    let (fixed, lower, upper) = columns.names();
    Ok(Figure::from_parts(
        row.try_get(fixed)?,
        row.try_get(lower)?,
        row.try_get(upper)?,
    ))
}

/// Sanitize and validate a domain payload, returning the record to store.
fn prepare_domain(owner_id: UserId, id: DomainId, input: DomainInput) -> Result<Domain, StoreError> {
    let notes = input
        .notes
        .map(|n| sanitize_text(&n, MAX_NOTES_LEN))
        .filter(|n| !n.is_empty());
    let domain = Domain {
        id,
        owner_id,
        name: sanitize_text(&input.name, MAX_NAME_LEN),
        notes,
        income: input.income,
        upkeep_cost: input.upkeep_cost,
        enterprises: vec![],
        heroes: vec![],
        troops: vec![],
    };
    validate_domain(&domain)?;
    Ok(domain)
}

/// Look up a domain's owner and check the principal may touch it.
async fn authorize(
    pool: &SqlitePool,
    principal: &Principal,
    id: DomainId,
) -> Result<UserId, StoreError> {
    let owner: Option<(i64,)> = sqlx::query_as("SELECT owner_id FROM domains WHERE id = ?")
        .bind(id.0)
        .fetch_optional(pool)
        .await?;
    match owner {
        Some((owner,)) if principal.can_access(UserId(owner)) => Ok(UserId(owner)),
        Some(_) => {
            debug!(domain_id = id.0, user_id = principal.user_id.0, "domain access denied");
            Err(StoreError::NotFound)
        }
        None => Err(StoreError::NotFound),
    }
}

/// Create a domain owned by the principal.
pub async fn create_domain(
    pool: &SqlitePool,
    principal: &Principal,
    input: DomainInput,
) -> Result<Domain, StoreError> {
    let mut domain = prepare_domain(principal.user_id, DomainId(0), input)?;
    let (inc, inc_lo, inc_hi) = domain.income.into_parts();
    let (up, up_lo, up_hi) = domain.upkeep_cost.into_parts();
    let now = Utc::now();
    let done = sqlx::query(
        r#"INSERT INTO domains (
            owner_id, name, notes,
            income, income_lower_limit, income_upper_limit,
            upkeep_cost, upkeep_lower_limit, upkeep_upper_limit,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(domain.owner_id.0)
    .bind(&domain.name)
    .bind(&domain.notes)
    .bind(inc)
    .bind(inc_lo)
    .bind(inc_hi)
    .bind(up)
    .bind(up_lo)
    .bind(up_hi)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    domain.id = DomainId(done.last_insert_rowid());
    info!(domain_id = domain.id.0, owner_id = domain.owner_id.0, "domain created");
    Ok(domain)
}

/// Replace a domain's own fields. Children are untouched.
pub async fn update_domain(
    pool: &SqlitePool,
    principal: &Principal,
    id: DomainId,
    input: DomainInput,
) -> Result<(), StoreError> {
    let owner = authorize(pool, principal, id).await?;
    let domain = prepare_domain(owner, id, input)?;
    let (inc, inc_lo, inc_hi) = domain.income.into_parts();
    let (up, up_lo, up_hi) = domain.upkeep_cost.into_parts();
    sqlx::query(
        r#"UPDATE domains SET
            name = ?, notes = ?,
            income = ?, income_lower_limit = ?, income_upper_limit = ?,
            upkeep_cost = ?, upkeep_lower_limit = ?, upkeep_upper_limit = ?,
            updated_at = ?
        WHERE id = ?"#,
    )
    .bind(&domain.name)
    .bind(&domain.notes)
    .bind(inc)
    .bind(inc_lo)
    .bind(inc_hi)
    .bind(up)
    .bind(up_lo)
    .bind(up_hi)
    .bind(Utc::now())
    .bind(id.0)
    .execute(pool)
    .await?;
    info!(domain_id = id.0, "domain updated");
    Ok(())
}

/// Delete a domain; enterprises, heroes and troops go with it.
pub async fn delete_domain(
    pool: &SqlitePool,
    principal: &Principal,
    id: DomainId,
) -> Result<(), StoreError> {
    authorize(pool, principal, id).await?;
    sqlx::query("DELETE FROM domains WHERE id = ?")
        .bind(id.0)
        .execute(pool)
        .await?;
    info!(domain_id = id.0, "domain deleted");
    Ok(())
}

/// Domains visible to the principal, with child counts.
pub async fn list_domains(
    pool: &SqlitePool,
    principal: &Principal,
) -> Result<Vec<DomainSummary>, StoreError> {
    let rows = sqlx::query(
        r#"SELECT d.id, d.owner_id, d.name,
            (SELECT COUNT(*) FROM enterprises e WHERE e.domain_id = d.id) AS enterprises,
            (SELECT COUNT(*) FROM heroes h WHERE h.domain_id = d.id) AS heroes,
            (SELECT COUNT(*) FROM troops t WHERE t.domain_id = d.id) AS troops
        FROM domains d
        WHERE d.owner_id = ? OR ?
        ORDER BY d.id"#,
    )
    .bind(principal.user_id.0)
    .bind(principal.role == Role::Admin)
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| -> Result<DomainSummary, StoreError> {
            Ok(DomainSummary {
                id: DomainId(row.try_get("id")?),
                owner_id: UserId(row.try_get("owner_id")?),
                name: row.try_get("name")?,
                enterprises: row.try_get("enterprises")?,
                heroes: row.try_get("heroes")?,
                troops: row.try_get("troops")?,
            })
        })
        .collect()
}

/// Load a domain with all of its children, or `None` if the principal
/// cannot see it.
pub async fn load_domain(
    pool: &SqlitePool,
    principal: &Principal,
    id: DomainId,
) -> Result<Option<Domain>, StoreError> {
    let row = sqlx::query(
        r#"SELECT id, owner_id, name, notes,
            income, income_lower_limit, income_upper_limit,
            upkeep_cost, upkeep_lower_limit, upkeep_upper_limit
        FROM domains WHERE id = ?"#,
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let owner_id = UserId(row.try_get("owner_id")?);
    if !principal.can_access(owner_id) {
        debug!(domain_id = id.0, user_id = principal.user_id.0, "domain hidden from principal");
        return Ok(None);
    }

    let enterprises = sqlx::query(
        r#"SELECT id, name,
            income, income_lower_limit, income_upper_limit,
            upkeep_cost, upkeep_lower_limit, upkeep_upper_limit
        FROM enterprises WHERE domain_id = ? ORDER BY id"#,
    )
    .bind(id.0)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|r| -> Result<Enterprise, StoreError> {
        Ok(Enterprise {
            id: r.try_get("id")?,
            domain_id: id,
            name: r.try_get("name")?,
            income: figure_from_row(r, FigureColumns::Income)?,
            upkeep_cost: figure_from_row(r, FigureColumns::Upkeep)?,
        })
    })
    .collect::<Result<Vec<_>, StoreError>>()?;

    let heroes = sqlx::query("SELECT id, name, wage FROM heroes WHERE domain_id = ? ORDER BY id")
        .bind(id.0)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|r| -> Result<Hero, StoreError> {
            Ok(Hero {
                id: r.try_get("id")?,
                domain_id: id,
                name: r.try_get("name")?,
                wage: r.try_get("wage")?,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    let troops =
        sqlx::query("SELECT id, name, quantity, wage FROM troops WHERE domain_id = ? ORDER BY id")
            .bind(id.0)
            .fetch_all(pool)
            .await?
            .iter()
            .map(|r| -> Result<Troop, StoreError> {
                Ok(Troop {
                    id: r.try_get("id")?,
                    domain_id: id,
                    name: r.try_get("name")?,
                    quantity: r.try_get("quantity")?,
                    wage: r.try_get("wage")?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

    Ok(Some(Domain {
        id,
        owner_id,
        name: row.try_get("name")?,
        notes: row.try_get("notes")?,
        income: figure_from_row(&row, FigureColumns::Income)?,
        upkeep_cost: figure_from_row(&row, FigureColumns::Upkeep)?,
        enterprises,
        heroes,
        troops,
    }))
}

pub async fn add_enterprise(
    pool: &SqlitePool,
    principal: &Principal,
    domain_id: DomainId,
    input: EnterpriseInput,
) -> Result<Enterprise, StoreError> {
    authorize(pool, principal, domain_id).await?;
    let mut enterprise = Enterprise {
        id: 0,
        domain_id,
        name: sanitize_text(&input.name, MAX_NAME_LEN),
        income: input.income,
        upkeep_cost: input.upkeep_cost,
    };
    validate_enterprise(&enterprise)?;
    let (inc, inc_lo, inc_hi) = enterprise.income.into_parts();
    let (up, up_lo, up_hi) = enterprise.upkeep_cost.into_parts();
    let done = sqlx::query(
        r#"INSERT INTO enterprises (
            domain_id, name,
            income, income_lower_limit, income_upper_limit,
            upkeep_cost, upkeep_lower_limit, upkeep_upper_limit
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(domain_id.0)
    .bind(&enterprise.name)
    .bind(inc)
    .bind(inc_lo)
    .bind(inc_hi)
    .bind(up)
    .bind(up_lo)
    .bind(up_hi)
    .execute(pool)
    .await?;
    enterprise.id = done.last_insert_rowid();
    info!(domain_id = domain_id.0, enterprise_id = enterprise.id, "enterprise added");
    Ok(enterprise)
}

pub async fn add_hero(
    pool: &SqlitePool,
    principal: &Principal,
    domain_id: DomainId,
    input: HeroInput,
) -> Result<Hero, StoreError> {
    authorize(pool, principal, domain_id).await?;
    let mut hero = Hero {
        id: 0,
        domain_id,
        name: sanitize_text(&input.name, MAX_NAME_LEN),
        wage: input.wage,
    };
    validate_hero(&hero)?;
    let done = sqlx::query("INSERT INTO heroes (domain_id, name, wage) VALUES (?, ?, ?)")
        .bind(domain_id.0)
        .bind(&hero.name)
        .bind(hero.wage)
        .execute(pool)
        .await?;
    hero.id = done.last_insert_rowid();
    info!(domain_id = domain_id.0, hero_id = hero.id, "hero added");
    Ok(hero)
}

pub async fn add_troop(
    pool: &SqlitePool,
    principal: &Principal,
    domain_id: DomainId,
    input: TroopInput,
) -> Result<Troop, StoreError> {
    authorize(pool, principal, domain_id).await?;
    let mut troop = Troop {
        id: 0,
        domain_id,
        name: sanitize_text(&input.name, MAX_NAME_LEN),
        quantity: input.quantity,
        wage: input.wage,
    };
    validate_troop(&troop)?;
    let done = sqlx::query("INSERT INTO troops (domain_id, name, quantity, wage) VALUES (?, ?, ?, ?)")
        .bind(domain_id.0)
        .bind(&troop.name)
        .bind(troop.quantity)
        .bind(troop.wage)
        .execute(pool)
        .await?;
    troop.id = done.last_insert_rowid();
    info!(domain_id = domain_id.0, troop_id = troop.id, "troop added");
    Ok(troop)
}

/// Delete a child row after checking the principal may access its domain.
async fn delete_child(
    pool: &SqlitePool,
    principal: &Principal,
    table: &'static str,
    id: i64,
) -> Result<(), StoreError> {
    let select = format!("SELECT domain_id FROM {table} WHERE id = ?");
    let parent: Option<(i64,)> = sqlx::query_as(&select)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let (domain_id,) = parent.ok_or(StoreError::NotFound)?;
    authorize(pool, principal, DomainId(domain_id)).await?;
    let delete = format!("DELETE FROM {table} WHERE id = ?");
    sqlx::query(&delete)
        .bind(id)
        .execute(pool)
        .await?;
    info!(table, id, domain_id, "child row deleted");
    Ok(())
}

pub async fn delete_enterprise(
    pool: &SqlitePool,
    principal: &Principal,
    id: i64,
) -> Result<(), StoreError> {
    delete_child(pool, principal, "enterprises", id).await
}

pub async fn delete_hero(pool: &SqlitePool, principal: &Principal, id: i64) -> Result<(), StoreError> {
    delete_child(pool, principal, "heroes", id).await
}

pub async fn delete_troop(pool: &SqlitePool, principal: &Principal, id: i64) -> Result<(), StoreError> {
    delete_child(pool, principal, "troops", id).await
}
