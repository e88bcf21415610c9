//! Maintenance binary operating directly on the autobill database.
//!
//! Runs with the service stopped or against a copy; everything here goes
//! through the same engine ops the server uses.

use std::error::Error;

use clap::{Args, Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;

use engine::{
    Binding, BillKind, Capture, Engine, EventKind, ExtractorSpec, FieldMatch, MatchOp, RuleSpec,
};

#[derive(Parser)]
#[command(name = "autobill-admin", about = "autobill maintenance commands")]
struct Cli {
    /// Path to the sqlite database file.
    #[arg(long, default_value = "autobill.db", env = "AUTOBILL_DB")]
    database: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the default rule set (replaces any stored rules).
    SeedRules,
    /// Delete records older than the retention horizon.
    Sweep,
    /// Re-classify unmatched records against the current rule set.
    Retest,
    /// Print recent bill heads.
    List(ListArgs),
}

#[derive(Args)]
struct ListArgs {
    #[arg(long, default_value_t = 20)]
    limit: u64,
}

fn default_rules() -> Vec<RuleSpec> {
    vec![RuleSpec {
        name: "BankSMS".to_string(),
        priority: 10,
        app_scope: String::new(),
        event_scope: EventKind::Sms,
        enabled: true,
        auto_record: false,
        matcher: vec![FieldMatch {
            field: "body".to_string(),
            op: MatchOp::Contains,
            value: "消费".to_string(),
        }],
        extractor: ExtractorSpec {
            kind: BillKind::Expend,
            money: Capture {
                field: "body".to_string(),
                pattern: r"消费([0-9,]+\.?[0-9]*)元".to_string(),
            },
            account_from: Some(Binding::Capture(Capture {
                field: "body".to_string(),
                pattern: r"尾号([0-9]+)".to_string(),
            })),
            account_to: None,
            category: None,
            remark: None,
            tag: None,
            currency: None,
        },
    }]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    let db = Database::connect(format!("sqlite:{}?mode=rwc", cli.database)).await?;
    Migrator::up(&db, None).await?;
    let engine = Engine::builder().database(db).build().await?;

    match cli.command {
        Commands::SeedRules => {
            let rules = default_rules();
            let count = rules.len();
            let version = engine.replace_rules(rules).await?;
            println!("installed {count} rules, ruleset version {version}");
        }
        Commands::Sweep => {
            let deleted = engine.sweep_retention().await?;
            println!("deleted {deleted} expired records");
        }
        Commands::Retest => {
            let report = engine.retest_unmatched().await?;
            println!("retested {}, matched {}", report.retested, report.matched);
        }
        Commands::List(args) => {
            let bills = engine.bills_page(args.limit, 0).await?;
            for bill in bills {
                println!(
                    "#{:<6} {:<10} {:>12} {}  {:<20} {}  [{}]",
                    bill.id,
                    bill.state.as_str(),
                    bill.money.to_string(),
                    bill.currency,
                    bill.kind.as_str(),
                    bill.occurred_at.format("%Y-%m-%d %H:%M:%S"),
                    if bill.matched {
                        bill.rule_name.as_str()
                    } else {
                        "unmatched"
                    },
                );
            }
        }
    }

    Ok(())
}
