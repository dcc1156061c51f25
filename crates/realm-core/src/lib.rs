#![deny(warnings)]

//! Core domain models and invariants for the realm ledger.
//!
//! This crate defines the serializable records tracked per user (domains and
//! their enterprises, heroes and troops) together with validation helpers that
//! guarantee the invariants the projection calculator relies on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

mod sanitize;

pub use sanitize::{sanitize_text, MAX_NAME_LEN, MAX_NOTES_LEN};

/// Largest accepted monetary amount for any figure bound or wage.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Unique identifier for a user account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Unique identifier for a domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DomainId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A financial figure: either a constant, an inclusive range sampled each
/// month, or nothing at all (treated as zero).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Figure {
    /// No value configured.
    #[default]
    Unset,
    /// Constant amount.
    Fixed { value: i64 },
    /// Inclusive `[lower, upper]` interval.
    Range { lower: i64, upper: i64 },
}

impl Figure {
    /// Build a figure from its storage columns.
    ///
    /// A fixed value takes precedence; a range needs both bounds.
    pub fn from_parts(fixed: Option<i64>, lower: Option<i64>, upper: Option<i64>) -> Self {
        match (fixed, lower, upper) {
            (Some(value), _, _) => Figure::Fixed { value },
            (None, Some(lower), Some(upper)) => Figure::Range { lower, upper },
            _ => Figure::Unset,
        }
    }

    /// Split into `(fixed, lower, upper)` storage columns.
    pub fn into_parts(self) -> (Option<i64>, Option<i64>, Option<i64>) {
        match self {
            Figure::Unset => (None, None, None),
            Figure::Fixed { value } => (Some(value), None, None),
            Figure::Range { lower, upper } => (None, Some(lower), Some(upper)),
        }
    }

    pub fn fixed(value: i64) -> Self {
        Figure::Fixed { value }
    }

    pub fn range(lower: i64, upper: i64) -> Self {
        Figure::Range { lower, upper }
    }
}

/// A fantasy territory and everything on its books.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    pub id: DomainId,
    /// Owning user.
    pub owner_id: UserId,
    pub name: String,
    pub notes: Option<String>,
    pub income: Figure,
    pub upkeep_cost: Figure,
    pub enterprises: Vec<Enterprise>,
    pub heroes: Vec<Hero>,
    pub troops: Vec<Troop>,
}

/// A business, guild or trade operation belonging to a domain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enterprise {
    pub id: i64,
    pub domain_id: DomainId,
    pub name: String,
    pub income: Figure,
    pub upkeep_cost: Figure,
}

/// A character on the domain's payroll.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hero {
    pub id: i64,
    pub domain_id: DomainId,
    pub name: String,
    /// Monthly wage (>= 0).
    pub wage: i64,
}

/// A military unit group on the domain's payroll.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Troop {
    pub id: i64,
    pub domain_id: DomainId,
    pub name: String,
    /// Head count; informational only.
    pub quantity: i64,
    /// Monthly wage for the whole group (>= 0).
    pub wage: i64,
}

/// Account roles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Player,
    GameMaster,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Player => "player",
            Role::GameMaster => "game_master",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "player" => Ok(Role::Player),
            "game_master" | "gm" => Ok(Role::GameMaster),
            "admin" => Ok(Role::Admin),
            other => Err(ValidationError::UnknownRole(other.to_string())),
        }
    }
}

/// A registered account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub email_verified: bool,
}

/// The authenticated caller on whose behalf an operation runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Owners see their own rows; admins see everything.
    pub fn can_access(&self, owner_id: UserId) -> bool {
        self.role == Role::Admin || self.user_id == owner_id
    }

    pub fn can_manage_roles(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Validation errors for domain invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// A fixed value and a range were both supplied.
    #[error("{0}: fixed value and range are mutually exclusive")]
    FixedAndRange(&'static str),
    /// Only one bound of a range was supplied.
    #[error("{0}: range needs both a lower and an upper limit")]
    IncompleteRange(&'static str),
    /// Lower limit above upper limit.
    #[error("{field}: lower limit {lower} exceeds upper limit {upper}")]
    InvertedRange {
        field: &'static str,
        lower: i64,
        upper: i64,
    },
    /// Amounts must be non-negative.
    #[error("{0}: negative amount is invalid")]
    NegativeAmount(&'static str),
    /// Amount above [`MAX_AMOUNT`].
    #[error("{0}: amount exceeds the limit of {}", MAX_AMOUNT)]
    AmountTooLarge(&'static str),
    /// Name is empty after sanitization.
    #[error("{0} must not be empty")]
    EmptyName(&'static str),
    /// Email address is malformed.
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    /// Role code is not recognised.
    #[error("unknown role: {0}")]
    UnknownRole(String),
}

/// Validate the raw storage columns of a figure before they are combined.
pub fn validate_figure_parts(
    field: &'static str,
    fixed: Option<i64>,
    lower: Option<i64>,
    upper: Option<i64>,
) -> Result<(), ValidationError> {
    if [fixed, lower, upper].iter().flatten().any(|v| *v < 0) {
        return Err(ValidationError::NegativeAmount(field));
    }
    if [fixed, lower, upper].iter().flatten().any(|v| *v > MAX_AMOUNT) {
        return Err(ValidationError::AmountTooLarge(field));
    }
    match (fixed, lower, upper) {
        (Some(_), None, None) | (None, None, None) => Ok(()),
        (Some(_), _, _) => Err(ValidationError::FixedAndRange(field)),
        (None, Some(lower), Some(upper)) if lower > upper => {
            Err(ValidationError::InvertedRange { field, lower, upper })
        }
        (None, Some(_), Some(_)) => Ok(()),
        (None, _, _) => Err(ValidationError::IncompleteRange(field)),
    }
}

/// Validate an already-combined figure.
pub fn validate_figure(field: &'static str, figure: &Figure) -> Result<(), ValidationError> {
    let (fixed, lower, upper) = figure.into_parts();
    validate_figure_parts(field, fixed, lower, upper)
}

fn validate_name(field: &'static str, name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName(field));
    }
    Ok(())
}

fn validate_wage(field: &'static str, wage: i64) -> Result<(), ValidationError> {
    if wage < 0 {
        return Err(ValidationError::NegativeAmount(field));
    }
    if wage > MAX_AMOUNT {
        return Err(ValidationError::AmountTooLarge(field));
    }
    Ok(())
}

/// Validate a domain's own fields (children are validated separately).
pub fn validate_domain(d: &Domain) -> Result<(), ValidationError> {
    validate_name("domain name", &d.name)?;
    validate_figure("income", &d.income)?;
    validate_figure("upkeepCost", &d.upkeep_cost)?;
    Ok(())
}

pub fn validate_enterprise(e: &Enterprise) -> Result<(), ValidationError> {
    validate_name("enterprise name", &e.name)?;
    validate_figure("income", &e.income)?;
    validate_figure("upkeepCost", &e.upkeep_cost)?;
    Ok(())
}

pub fn validate_hero(h: &Hero) -> Result<(), ValidationError> {
    validate_name("hero name", &h.name)?;
    validate_wage("wage", h.wage)
}

pub fn validate_troop(t: &Troop) -> Result<(), ValidationError> {
    validate_name("troop name", &t.name)?;
    if t.quantity < 0 {
        return Err(ValidationError::NegativeAmount("quantity"));
    }
    validate_wage("wage", t.wage)
}

/// Validate a domain together with all of its children.
pub fn validate_domain_tree(d: &Domain) -> Result<(), ValidationError> {
    validate_domain(d)?;
    for e in &d.enterprises {
        validate_enterprise(e)?;
    }
    for h in &d.heroes {
        validate_hero(h)?;
    }
    for t in &d.troops {
        validate_troop(t)?;
    }
    Ok(())
}

/// Trim and lowercase an email address, rejecting obviously malformed input.
pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_ascii_lowercase();
    let mut parts = email.split('@');
    let valid = matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(local), Some(host), None)
            if !local.is_empty() && !host.is_empty() && !host.starts_with('.') && !host.ends_with('.')
    );
    if !valid || email.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail(raw.to_string()));
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn domain() -> Domain {
        Domain {
            id: DomainId(1),
            owner_id: UserId(7),
            name: "Stonehold".to_string(),
            notes: None,
            income: Figure::fixed(100),
            upkeep_cost: Figure::range(10, 20),
            enterprises: vec![Enterprise {
                id: 1,
                domain_id: DomainId(1),
                name: "Mill".to_string(),
                income: Figure::Unset,
                upkeep_cost: Figure::fixed(3),
            }],
            heroes: vec![Hero {
                id: 1,
                domain_id: DomainId(1),
                name: "Aldric".to_string(),
                wage: 10,
            }],
            troops: vec![Troop {
                id: 1,
                domain_id: DomainId(1),
                name: "Pikemen".to_string(),
                quantity: 20,
                wage: 5,
            }],
        }
    }

    #[test]
    fn fixed_value_takes_precedence() {
        assert_eq!(Figure::from_parts(Some(5), Some(1), Some(9)), Figure::fixed(5));
        assert_eq!(Figure::from_parts(None, Some(1), Some(9)), Figure::range(1, 9));
        assert_eq!(Figure::from_parts(None, Some(1), None), Figure::Unset);
        assert_eq!(Figure::from_parts(None, None, None), Figure::Unset);
    }

    #[test]
    fn figure_parts_validation() {
        assert!(validate_figure_parts("income", Some(5), None, None).is_ok());
        assert!(validate_figure_parts("income", None, None, None).is_ok());
        assert!(validate_figure_parts("income", None, Some(50), Some(50)).is_ok());
        assert_eq!(
            validate_figure_parts("income", Some(5), Some(1), None),
            Err(ValidationError::FixedAndRange("income"))
        );
        assert_eq!(
            validate_figure_parts("income", None, None, Some(3)),
            Err(ValidationError::IncompleteRange("income"))
        );
        assert_eq!(
            validate_figure_parts("income", None, Some(9), Some(3)),
            Err(ValidationError::InvertedRange {
                field: "income",
                lower: 9,
                upper: 3
            })
        );
        assert_eq!(
            validate_figure_parts("income", Some(-1), None, None),
            Err(ValidationError::NegativeAmount("income"))
        );
    }

    #[test]
    fn amounts_above_limit_rejected() {
        assert!(validate_figure_parts("income", Some(MAX_AMOUNT), None, None).is_ok());
        assert_eq!(
            validate_figure_parts("income", Some(i64::MAX / 2 + 1), None, None),
            Err(ValidationError::AmountTooLarge("income"))
        );
        assert_eq!(
            validate_figure_parts("upkeepCost", None, Some(0), Some(MAX_AMOUNT + 1)),
            Err(ValidationError::AmountTooLarge("upkeepCost"))
        );
        let mut d = domain();
        d.troops[0].wage = i64::MAX;
        assert_eq!(
            validate_domain_tree(&d),
            Err(ValidationError::AmountTooLarge("wage"))
        );
    }

    #[test]
    fn domain_tree_validates() {
        let mut d = domain();
        validate_domain_tree(&d).unwrap();
        d.heroes[0].wage = -1;
        assert_eq!(
            validate_domain_tree(&d),
            Err(ValidationError::NegativeAmount("wage"))
        );
        let mut d = domain();
        d.name = "   ".into();
        assert_eq!(
            validate_domain(&d),
            Err(ValidationError::EmptyName("domain name"))
        );
    }

    #[test]
    fn domain_serializes_camel_case() {
        let d = domain();
        let s = serde_json::to_string(&d).unwrap();
        assert!(s.contains("\"upkeepCost\":{\"kind\":\"range\",\"lower\":10,\"upper\":20}"));
        assert!(s.contains("\"ownerId\":7"));
        let back: Domain = serde_json::from_str(&s).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn role_codes() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" GM ".parse::<Role>().unwrap(), Role::GameMaster);
        assert_eq!(Role::GameMaster.to_string(), "game_master");
        assert!("king".parse::<Role>().is_err());
    }

    #[test]
    fn principal_access() {
        let owner = Principal::new(UserId(1), Role::Player);
        let other = Principal::new(UserId(2), Role::GameMaster);
        let admin = Principal::new(UserId(3), Role::Admin);
        assert!(owner.can_access(UserId(1)));
        assert!(!other.can_access(UserId(1)));
        assert!(admin.can_access(UserId(1)));
        assert!(!other.can_manage_roles());
        assert!(admin.can_manage_roles());
    }

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email("  Lord@Keep.Example ").unwrap(), "lord@keep.example");
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("a@b@c").is_err());
        assert!(normalize_email("@keep.example").is_err());
        assert!(normalize_email("lord@").is_err());
        assert!(normalize_email("lo rd@keep.example").is_err());
    }

    proptest! {
        #[test]
        fn parts_roundtrip_preserves_valid_figures(lower in 0i64..10_000, width in 0i64..10_000, fixed in 0i64..10_000) {
            let range = Figure::range(lower, lower + width);
            let (f, l, u) = range.into_parts();
            prop_assert!(validate_figure_parts("income", f, l, u).is_ok());
            prop_assert_eq!(Figure::from_parts(f, l, u), range);

            let fixed = Figure::fixed(fixed);
            let (f, l, u) = fixed.into_parts();
            prop_assert_eq!(Figure::from_parts(f, l, u), fixed);
        }

        #[test]
        fn inverted_ranges_rejected(lower in 1i64..10_000, gap in 1i64..1_000) {
            let upper = (lower - gap).max(0);
            prop_assume!(upper < lower);
            let inverted = validate_figure_parts("income", None, Some(lower), Some(upper));
            let is_inverted_range = matches!(inverted, Err(ValidationError::InvertedRange { .. }));
            prop_assert!(is_inverted_range);
        }
    }
}
