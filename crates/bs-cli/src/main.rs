//! Backend Simulator CLI
//!
//! CLI tool for editing the rule store and trying requests against the
//! interception engine.

mod fetch;
mod http;
mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use bs_core::{MatchKind, Matcher, RuleId, RuleSet, Variant};
use bs_rules::{decode_entries, RuleDraft, RuleList};

use crate::fetch::{cmd_fetch, FetchArgs};
use crate::store::{load_store, save_store};

#[derive(Parser)]
#[command(name = "bs-cli")]
#[command(about = "Backend Simulator rule store and request tools")]
struct Cli {
    /// Rule store file
    #[arg(short, long, global = true, default_value = "backend-simulator.json")]
    store: PathBuf,

    /// Substitution variant (custom-response or error-code)
    #[arg(long, global = true, default_value = "custom-response")]
    variant: Variant,

    /// Log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List and edit rules
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },

    /// Turn the simulator on
    Enable,

    /// Turn the simulator off
    Disable,

    /// Report invalid and shadowed rules
    Check,

    /// Show which rule a completed request would match
    Explain {
        /// HTTP verb
        verb: String,
        /// Final request URL
        url: String,
    },

    /// Perform a request through the engine
    Fetch {
        /// HTTP verb
        verb: String,
        /// Request URL
        url: String,

        /// Request body
        #[arg(short, long)]
        body: Option<String>,

        /// Request header ("Name: value"), repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Print the native response headers
        #[arg(short, long)]
        include: bool,
    },
}

#[derive(Subcommand)]
enum RulesCommand {
    /// Print the rule list in stored order
    List,

    /// Add a rule
    Add(RuleArgs),

    /// Replace a rule (appends when the id is unknown)
    Update {
        id: u64,
        #[command(flatten)]
        rule: RuleArgs,
    },

    /// Remove a rule
    Remove { id: u64 },

    /// Remove every rule
    Clear,
}

#[derive(Args)]
struct RuleArgs {
    /// URL to match (query-less prefix with --partial)
    #[arg(long)]
    url: String,

    /// HTTP verb
    #[arg(long, default_value = "GET")]
    verb: String,

    /// Status code to force
    #[arg(long)]
    code: String,

    /// Response body (custom-response variant)
    #[arg(long, default_value = "")]
    body: String,

    /// Also match the URL with any query string
    #[arg(long)]
    partial: bool,
}

impl RuleArgs {
    fn draft(&self) -> RuleDraft {
        RuleDraft::new(&self.url, &self.verb, &self.code)
            .with_body(&self.body)
            .with_partial_url_match(self.partial)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let store = cli.store.as_path();
    let result = match cli.command {
        Commands::Rules { command } => match command {
            RulesCommand::List => cmd_rules_list(store, cli.variant),
            RulesCommand::Add(rule) => cmd_rules_add(store, &rule.draft()),
            RulesCommand::Update { id, rule } => cmd_rules_update(store, RuleId(id), &rule.draft()),
            RulesCommand::Remove { id } => cmd_rules_remove(store, RuleId(id)),
            RulesCommand::Clear => cmd_rules_clear(store),
        },
        Commands::Enable => cmd_set_enabled(store, true),
        Commands::Disable => cmd_set_enabled(store, false),
        Commands::Check => cmd_check(store, cli.variant),
        Commands::Explain { verb, url } => cmd_explain(store, cli.variant, &verb, &url),
        Commands::Fetch {
            verb,
            url,
            body,
            headers,
            include,
        } => cmd_fetch(
            store,
            cli.variant,
            &FetchArgs {
                verb: &verb,
                url: &url,
                body: body.as_deref(),
                headers: &headers,
                include_headers: include,
            },
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn enabled_label(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

fn cmd_rules_list(store: &Path, variant: Variant) -> Result<(), String> {
    let document = load_store(store)?;
    let rules = document.rules();

    if rules.is_empty() {
        println!("No rules in '{}'", store.display());
    } else {
        println!("{:<15} {:<7} {:<5} {:<7} URL", "ID", "VERB", "CODE", "MATCH");
        for rule in rules.iter() {
            let kind = if rule.partial_url_match && variant.supports_partial_match() {
                "prefix"
            } else {
                "exact"
            };
            println!(
                "{:<15} {:<7} {:<5} {:<7} {}",
                rule.id, rule.verb, rule.outcome.status, kind, rule.url
            );
            if variant == Variant::CustomResponse && !rule.outcome.body.is_empty() {
                println!("{:<15} body: {}", "", rule.outcome.body);
            }
        }
        println!();
    }

    println!("{} rules, simulator {}", rules.len(), enabled_label(document.enabled));
    Ok(())
}

fn cmd_rules_add(store: &Path, draft: &RuleDraft) -> Result<(), String> {
    let mut document = load_store(store)?;
    let mut rules = document.rules();
    let rule = rules.add(draft).map_err(|e| e.to_string())?;
    document.set_rules(&rules);
    save_store(store, &document)?;

    println!("Added rule {}: {} {} -> {}", rule.id, rule.verb, rule.url, rule.outcome.status);
    Ok(())
}

fn cmd_rules_update(store: &Path, id: RuleId, draft: &RuleDraft) -> Result<(), String> {
    let mut document = load_store(store)?;
    let mut rules = document.rules();
    let existed = rules.get(id).is_some();
    let rule = rules.update(id, draft).map_err(|e| e.to_string())?;
    document.set_rules(&rules);
    save_store(store, &document)?;

    let action = if existed { "Updated" } else { "Added" };
    println!("{} rule {}: {} {} -> {}", action, rule.id, rule.verb, rule.url, rule.outcome.status);
    Ok(())
}

fn cmd_rules_remove(store: &Path, id: RuleId) -> Result<(), String> {
    let mut document = load_store(store)?;
    let mut rules = document.rules();
    if !rules.remove(id) {
        return Err(format!("No rule with id {}", id));
    }
    document.set_rules(&rules);
    save_store(store, &document)?;

    println!("Removed rule {}", id);
    Ok(())
}

fn cmd_rules_clear(store: &Path) -> Result<(), String> {
    let mut document = load_store(store)?;
    let removed = document.rules().len();
    document.set_rules(&RuleList::new());
    save_store(store, &document)?;

    println!("Removed {} rules", removed);
    Ok(())
}

fn cmd_set_enabled(store: &Path, enabled: bool) -> Result<(), String> {
    let mut document = load_store(store)?;
    document.enabled = enabled;
    save_store(store, &document)?;

    println!("Simulator {}", enabled_label(enabled));
    Ok(())
}

fn cmd_check(store: &Path, variant: Variant) -> Result<(), String> {
    let document = load_store(store)?;
    let (rules, invalid) = decode_entries(&document.entries);

    for entry in &invalid {
        println!("  entry {}: invalid: {}", entry.index, entry.reason);
    }
    for rule in rules.iter().filter(|rule| rule.partial_url_match) {
        if rule.url.contains('?') {
            println!("  rule {}: prefix URL contains a query string and can never match", rule.id);
        } else if !variant.supports_partial_match() {
            println!("  rule {}: prefix matching is ignored by the {} variant", rule.id, variant);
        }
    }

    let shadowed = RuleList::from_rules(rules).shadowed();
    for entry in &shadowed {
        let note = if entry.verb_differs { ", which answers a different verb" } else { "" };
        println!(
            "  rule {} is shadowed by rule {} ({}){}",
            entry.hidden, entry.by, entry.url, note
        );
    }

    let total = document.entries.as_array().map_or(0, Vec::len);
    println!(
        "Store '{}': {} entries, {} invalid, {} shadowed, simulator {}",
        store.display(),
        total,
        invalid.len(),
        shadowed.len(),
        enabled_label(document.enabled)
    );

    if !invalid.is_empty() {
        return Err(format!("{} invalid entries", invalid.len()));
    }
    Ok(())
}

fn cmd_explain(store: &Path, variant: Variant, verb: &str, url: &str) -> Result<(), String> {
    let document = load_store(store)?;
    let matcher = Matcher::new(Arc::new(RuleSet::from_entries_value(&document.entries)), variant);

    if !document.enabled {
        println!("Note: simulator is disabled; requests currently pass through untouched");
    }

    let Some(found) = matcher.match_request(url, verb) else {
        println!("{} {}: no rule matches; the native response is delivered", verb, url);
        return Ok(());
    };

    let substitution = found.substitution(variant);
    let kind = match found.kind {
        MatchKind::Exact => "exact",
        MatchKind::Partial => "prefix",
    };
    println!("{} {}: matched rule {} ({} match)", verb, url, found.rule.id, kind);
    println!("  Rule URL:    {}", found.rule.url);
    println!("  Status:      {}", substitution.status);
    println!(
        "  Status text: {}",
        substitution.status_text.as_deref().unwrap_or("(native)")
    );
    println!("  Body:        {}", substitution.body.text());
    Ok(())
}
