#![deny(warnings)]

//! Headless CLI for managing domains and running financial projections.

use anyhow::{anyhow, bail, Context, Result};
use persistence::{DomainInput, EnterpriseInput, HeroInput, TokenPurpose, TroopInput};
use realm_core::{validate_figure_parts, DomainId, Figure, Principal, Role, UserId};
use realm_econ::ProjectionResult;
use realm_runtime::{AppConfig, ProjectionService};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: realm [--config <path>] <command> [options]

commands:
  init [--admin <email>]   (defaults to admin_email from config)
  add-user <email> [player|game_master|admin]
  set-role --as <user> <user-id> <role>
  issue-token --user <id> <verify|reset>
  redeem-token <token> <verify|reset>
  add-domain --as <user> --name <name> [--notes <text>]
             [--income N | --income-range L U] [--upkeep N | --upkeep-range L U]
  add-enterprise --as <user> --domain <id> --name <name> [income/upkeep flags]
  add-hero --as <user> --domain <id> --name <name> --wage N
  add-troop --as <user> --domain <id> --name <name> --wage N [--quantity N]
  delete-domain --as <user> --domain <id>
  list --as <user>
  show --as <user> --domain <id>
  project --as <user> --domain <id> [--months N] [--json]";

/// Flags taking two values; `--json` takes none; everything else takes one.
fn flag_arity(name: &str) -> usize {
    match name {
        "income-range" | "upkeep-range" => 2,
        "json" => 0,
        _ => 1,
    }
}

#[derive(Debug, Default)]
struct Args {
    command: String,
    positional: Vec<String>,
    flags: HashMap<String, Vec<String>>,
}

impl Args {
    fn parse<I: Iterator<Item = String>>(mut it: I) -> Result<Self> {
        let mut args = Args::default();
        while let Some(arg) = it.next() {
            if let Some(name) = arg.strip_prefix("--") {
                let values = (0..flag_arity(name))
                    .map(|_| it.next().ok_or_else(|| anyhow!("--{name} needs a value")))
                    .collect::<Result<Vec<_>>>()?;
                args.flags.insert(name.to_string(), values);
            } else if args.command.is_empty() {
                args.command = arg;
            } else {
                args.positional.push(arg);
            }
        }
        Ok(args)
    }

    fn has(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    fn flag(&self, name: &str) -> Option<&str> {
        self.flags.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.flag(name).ok_or_else(|| anyhow!("missing --{name}\n\n{USAGE}"))
    }

    fn number<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.flag(name)
            .map(|v| v.parse().map_err(|_| anyhow!("--{name}: not a number: {v}")))
            .transpose()
    }

    fn positional_arg(&self, idx: usize, what: &str) -> Result<&str> {
        self.positional
            .get(idx)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("missing {what}\n\n{USAGE}"))
    }

    /// Build a figure from `--<name> N` or `--<name>-range L U`.
    fn figure(&self, name: &'static str) -> Result<Figure> {
        let fixed = self.number::<i64>(name)?;
        let (lower, upper) = match self.flags.get(&format!("{name}-range")) {
            Some(v) => (
                Some(v[0].parse::<i64>().with_context(|| format!("--{name}-range lower"))?),
                Some(v[1].parse::<i64>().with_context(|| format!("--{name}-range upper"))?),
            ),
            None => (None, None),
        };
        validate_figure_parts(name, fixed, lower, upper)?;
        Ok(Figure::from_parts(fixed, lower, upper))
    }
}

fn parse_purpose(s: &str) -> Result<TokenPurpose> {
    match s {
        "verify" => Ok(TokenPurpose::EmailVerification),
        "reset" => Ok(TokenPurpose::PasswordReset),
        other => bail!("unknown token purpose: {other}"),
    }
}

async fn acting_as(pool: &SqlitePool, args: &Args) -> Result<Principal> {
    let id: i64 = args.number("as")?.ok_or_else(|| anyhow!("missing --as\n\n{USAGE}"))?;
    persistence::principal_for(pool, UserId(id))
        .await
        .with_context(|| format!("user {id}"))
}

fn domain_arg(args: &Args) -> Result<DomainId> {
    args.number("domain")?
        .map(DomainId)
        .ok_or_else(|| anyhow!("missing --domain\n\n{USAGE}"))
}

fn print_projection(domain: DomainId, r: &ProjectionResult) {
    println!("Projection | domain: {} | months: {}", domain, r.total_months);
    println!(
        "{:>5} {:>10} {:>10} {:>10} {:>10} {:>8} {:>8} {:>10}",
        "month", "dom.inc", "dom.upk", "ent.inc", "ent.upk", "heroes", "troops", "net"
    );
    for m in &r.monthly_breakdown {
        println!(
            "{:>5} {:>10} {:>10} {:>10} {:>10} {:>8} {:>8} {:>10}",
            m.month,
            m.domain_income,
            m.domain_upkeep,
            m.enterprise_income,
            m.enterprise_upkeep,
            m.hero_wages,
            m.troop_wages,
            m.net_income
        );
    }
    println!(
        "Totals | income: {} | expenses: {} | net: {} | avg/month: {:.1}",
        r.total_income,
        r.total_expenses,
        r.net_total,
        r.average_net().unwrap_or(0.0)
    );
}

async fn run(args: Args, config: AppConfig) -> Result<()> {
    persistence::ensure_parent_dir(&config.database_url)?;
    let pool = persistence::init_db(&config.database_url).await?;

    match args.command.as_str() {
        "init" => {
            if let Some(email) = args.flag("admin").or(config.admin_email.as_deref()) {
                let admin = persistence::ensure_admin(&pool, email).await?;
                println!("admin {} | id: {}", admin.email, admin.id);
            }
            println!("database ready at {}", config.database_url);
        }
        "add-user" => {
            let role = match args.positional.get(1) {
                Some(r) => r.parse::<Role>()?,
                None => Role::Player,
            };
            let user = persistence::create_user(&pool, args.positional_arg(0, "email")?, role).await?;
            println!("user {} | id: {} | role: {}", user.email, user.id, user.role);
        }
        "set-role" => {
            let actor = acting_as(&pool, &args).await?;
            let target: i64 = args.positional_arg(0, "user id")?.parse().context("user id")?;
            let role: Role = args.positional_arg(1, "role")?.parse()?;
            let user = persistence::set_role(&pool, &actor, UserId(target), role).await?;
            println!("user {} | role: {}", user.id, user.role);
        }
        "issue-token" => {
            let user: i64 = args.number("user")?.ok_or_else(|| anyhow!("missing --user"))?;
            let purpose = parse_purpose(args.positional_arg(0, "token purpose")?)?;
            let token =
                persistence::issue_token(&pool, UserId(user), purpose, purpose.default_ttl()).await?;
            println!("{token}");
        }
        "redeem-token" => {
            let token = args.positional_arg(0, "token")?;
            let purpose = parse_purpose(args.positional_arg(1, "token purpose")?)?;
            let user = persistence::consume_token(&pool, token, purpose).await?;
            println!("token accepted for user {}", user);
        }
        "add-domain" => {
            let principal = acting_as(&pool, &args).await?;
            let input = DomainInput {
                name: args.required("name")?.to_string(),
                notes: args.flag("notes").map(str::to_string),
                income: args.figure("income")?,
                upkeep_cost: args.figure("upkeep")?,
            };
            let d = persistence::create_domain(&pool, &principal, input).await?;
            println!("domain {} | id: {}", d.name, d.id);
        }
        "add-enterprise" => {
            let principal = acting_as(&pool, &args).await?;
            let input = EnterpriseInput {
                name: args.required("name")?.to_string(),
                income: args.figure("income")?,
                upkeep_cost: args.figure("upkeep")?,
            };
            let e = persistence::add_enterprise(&pool, &principal, domain_arg(&args)?, input).await?;
            println!("enterprise {} | id: {}", e.name, e.id);
        }
        "add-hero" => {
            let principal = acting_as(&pool, &args).await?;
            let input = HeroInput {
                name: args.required("name")?.to_string(),
                wage: args.number("wage")?.unwrap_or(0),
            };
            let h = persistence::add_hero(&pool, &principal, domain_arg(&args)?, input).await?;
            println!("hero {} | id: {}", h.name, h.id);
        }
        "add-troop" => {
            let principal = acting_as(&pool, &args).await?;
            let input = TroopInput {
                name: args.required("name")?.to_string(),
                quantity: args.number("quantity")?.unwrap_or(0),
                wage: args.number("wage")?.unwrap_or(0),
            };
            let t = persistence::add_troop(&pool, &principal, domain_arg(&args)?, input).await?;
            println!("troop {} | id: {}", t.name, t.id);
        }
        "delete-domain" => {
            let principal = acting_as(&pool, &args).await?;
            let id = domain_arg(&args)?;
            persistence::delete_domain(&pool, &principal, id).await?;
            println!("domain {} deleted", id);
        }
        "list" => {
            let principal = acting_as(&pool, &args).await?;
            for d in persistence::list_domains(&pool, &principal).await? {
                println!(
                    "{:>4} | {} | owner: {} | enterprises: {} | heroes: {} | troops: {}",
                    d.id, d.name, d.owner_id, d.enterprises, d.heroes, d.troops
                );
            }
        }
        "show" => {
            let principal = acting_as(&pool, &args).await?;
            let id = domain_arg(&args)?;
            let d = persistence::load_domain(&pool, &principal, id)
                .await?
                .ok_or_else(|| anyhow!("domain {id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&d)?);
        }
        "project" => {
            let principal = acting_as(&pool, &args).await?;
            let id = domain_arg(&args)?;
            let svc = ProjectionService::new(config.projection.clone());
            let months = svc.months_or_default(args.number("months")?);
            let result = svc.project(&pool, &principal, id, months).await?;
            if args.has("json") {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_projection(id, &result);
            }
        }
        "" => bail!("{USAGE}"),
        other => bail!("unknown command: {other}\n\n{USAGE}"),
    }
    Ok(())
}

/// Stderr log subscriber driven entirely by `filter`.
fn log_subscriber(filter: EnvFilter) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging setup: RUST_LOG, else info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    log_subscriber(filter).init();

    let args = Args::parse(std::env::args().skip(1))?;
    let config = AppConfig::load(args.flag("config").map(PathBuf::from).as_deref())?;
    info!(command = %args.command, db = %config.database_url, "starting CLI");
    run(args, config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Args {
        Args::parse(line.split_whitespace().map(String::from)).unwrap()
    }

    #[test]
    fn parses_commands_flags_and_positionals() {
        let a = parse("--config realm.yaml project --as 3 --domain 7 --json --months 6");
        assert_eq!(a.command, "project");
        assert_eq!(a.flag("config"), Some("realm.yaml"));
        assert_eq!(a.number::<i64>("domain").unwrap(), Some(7));
        assert_eq!(a.number::<i32>("months").unwrap(), Some(6));
        assert!(a.has("json"));

        let a = parse("set-role --as 1 2 admin");
        assert_eq!(a.positional, vec!["2", "admin"]);
    }

    #[test]
    fn figures_from_flags() {
        let a = parse("add-domain --income 500 --upkeep-range 10 20");
        assert_eq!(a.figure("income").unwrap(), Figure::fixed(500));
        assert_eq!(a.figure("upkeep").unwrap(), Figure::range(10, 20));

        let a = parse("add-domain --name X");
        assert_eq!(a.figure("income").unwrap(), Figure::Unset);

        let a = parse("add-domain --income 5 --income-range 1 9");
        assert!(a.figure("income").is_err());
        let a = parse("add-domain --income-range 9 1");
        assert!(a.figure("income").is_err());
    }

    #[test]
    fn missing_values_are_errors() {
        let short = ["add-domain", "--income-range", "1"];
        assert!(Args::parse(short.into_iter().map(String::from)).is_err());
        let a = parse("project --months many");
        assert!(a.number::<i32>("months").is_err());
        assert!(a.required("name").is_err());
    }

    #[test]
    fn log_filter_directives_are_honoured() {
        use tracing::Level;

        let debug = log_subscriber(EnvFilter::new("debug"));
        tracing::subscriber::with_default(debug, || {
            assert!(tracing::enabled!(Level::DEBUG));
            assert!(!tracing::enabled!(Level::TRACE));
        });
        let warn = log_subscriber(EnvFilter::new("warn"));
        tracing::subscriber::with_default(warn, || {
            assert!(!tracing::enabled!(Level::INFO));
            assert!(tracing::enabled!(Level::WARN));
        });
    }

    #[test]
    fn token_purposes() {
        assert_eq!(parse_purpose("verify").unwrap(), TokenPurpose::EmailVerification);
        assert_eq!(parse_purpose("reset").unwrap(), TokenPurpose::PasswordReset);
        assert!(parse_purpose("other").is_err());
    }
}
